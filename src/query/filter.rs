//! WHERE evaluation and positional join
//!
//! With one input the predicate is evaluated for every row. With several
//! inputs the fragments are aligned on their identifier columns: only the
//! identifier range shared by all inputs is considered, and the predicate
//! is evaluated once per position in that range.

use tracing::debug;

use crate::error::{Error, Result};
use crate::expr::{evaluate, is_aggregating, Node};
use crate::fragment::Fragment;
use crate::query::binding::RowBinder;
use crate::query::source::{QueryContext, Selection, Source};

/// Select the rows of `sources` that satisfy `where_clause`
pub fn filter(
    sources: &[Source],
    where_clause: Option<&Node>,
    ctx: &QueryContext<'_>,
) -> Result<Selection> {
    if let Some(node) = where_clause {
        if is_aggregating(node, ctx.registry) {
            return Err(Error::exec("aggregate functions are not allowed in WHERE"));
        }
    }

    let candidates = match sources {
        [] => return Err(Error::exec("query has no input fragment")),
        [only] => Selection::full(only.fragment.row_count()),
        _ => {
            if where_clause.is_none() {
                return Err(Error::exec(
                    "a WHERE clause is required when selecting from several fragments",
                ));
            }
            align(sources)?
        }
    };

    let node = match where_clause {
        Some(node) => node,
        None => return Ok(candidates),
    };

    let binder = RowBinder::bind(node, sources, ctx.args)?;
    let mut kept = Vec::with_capacity(candidates.len());
    for k in 0..candidates.len() {
        let table = binder.table(ctx, sources, &candidates, k)?;
        if evaluate(node, &table)?.is_truthy("WHERE clause")? {
            kept.push(candidates.rows()[k]);
        }
    }

    debug!(
        inputs = sources.len(),
        candidates = candidates.len(),
        kept = kept.len(),
        "WHERE evaluated"
    );

    let mut selection = candidates;
    selection.set_rows(kept);
    Ok(selection)
}

/// Identifier range of a fragment, checking the ids are unique, ascending
/// and contiguous; `None` for an empty fragment
pub fn id_range(frag: &Fragment) -> Result<Option<(i64, i64)>> {
    let ids = frag.ids()?;
    let (first, last) = match (ids.first(), ids.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return Ok(None),
    };
    for (i, id) in ids.iter().enumerate() {
        if *id != first + i as i64 {
            return Err(Error::exec(format!(
                "identifiers of fragment '{}' are not unique, ascending and contiguous at row {}",
                frag.name(),
                i
            )));
        }
    }
    Ok(Some((first, last)))
}

/// Positional join: intersect identifier ranges and offset each input
fn align(sources: &[Source]) -> Result<Selection> {
    let mut ranges = Vec::with_capacity(sources.len());
    for source in sources {
        ranges.push(id_range(&source.fragment)?);
    }

    let ranges: Vec<(i64, i64)> = match ranges.into_iter().collect::<Option<Vec<_>>>() {
        Some(r) => r,
        None => return Ok(Selection::new(vec![0; sources.len()], Vec::new())),
    };

    let low = ranges.iter().map(|r| r.0).max().unwrap_or(0);
    let high = ranges.iter().map(|r| r.1).min().unwrap_or(-1);
    if low > high {
        return Ok(Selection::new(vec![0; sources.len()], Vec::new()));
    }

    let offsets = ranges.iter().map(|r| (low - r.0) as usize).collect();
    let span = (high - low + 1) as usize;
    debug!(low, high, span, "fragments aligned on identifier");
    Ok(Selection::new(offsets, (0..span).collect()))
}

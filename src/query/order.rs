//! ORDER BY, LIMIT and OFFSET

use std::cmp::Ordering;

use tracing::debug;

use crate::error::{Error, Result};
use crate::fragment::{FieldType, Fragment};
use crate::query::binding::resolve_field;
use crate::query::source::{Selection, Source};

/// Decoded sort key of one row
#[derive(Debug, Clone, Copy)]
enum SortKey {
    Long(i64),
    Real(f64),
}

impl SortKey {
    fn cmp(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (SortKey::Long(a), SortKey::Long(b)) => a.cmp(b),
            (SortKey::Real(a), SortKey::Real(b)) => a.total_cmp(b),
            (SortKey::Long(a), SortKey::Real(b)) => (*a as f64).total_cmp(b),
            (SortKey::Real(a), SortKey::Long(b)) => a.total_cmp(&(*b as f64)),
        }
    }
}

/// Stable ascending insertion sort
fn insertion_sort<T>(items: &mut [T], cmp: impl Fn(&T, &T) -> Ordering) {
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && cmp(&items[j - 1], &items[j]) == Ordering::Greater {
            items.swap(j - 1, j);
            j -= 1;
        }
    }
}

fn sort_key(frag: &Fragment, row: usize, field: usize) -> Result<SortKey> {
    let value = frag.value(row, field)?;
    match frag.schema().fields()[field].field_type {
        FieldType::Long => Ok(SortKey::Long(value.get_long_value("ORDER BY")?)),
        FieldType::Real => Ok(SortKey::Real(value.get_double_value("ORDER BY")?)),
        other => Err(Error::exec(format!(
            "ORDER BY needs a LONG or REAL column, got {}",
            other
        ))),
    }
}

/// Sort the selection ascending on one named column
pub fn order_selection(field: &str, sources: &[Source], selection: &mut Selection) -> Result<()> {
    let (source, index) = resolve_field(field, sources)?;
    let frag = &sources[source].fragment;

    let mut keyed = Vec::with_capacity(selection.len());
    for k in 0..selection.len() {
        keyed.push((sort_key(frag, selection.row(source, k), index)?, selection.rows()[k]));
    }
    // An empty selection still has to name a sortable column
    if keyed.is_empty() && !frag.schema().fields()[index].field_type.is_numeric() {
        return Err(Error::exec(format!("ORDER BY column '{}' is not numeric", field)));
    }

    insertion_sort(&mut keyed, |a, b| a.0.cmp(&b.0));
    selection.set_rows(keyed.into_iter().map(|(_, row)| row).collect());
    debug!(field, rows = selection.len(), "selection ordered");
    Ok(())
}

/// Sort a materialised fragment ascending on one named column
pub fn order_fragment(frag: &mut Fragment, field: &str) -> Result<()> {
    let index = frag.field_index(field)?;
    let mut keyed = Vec::with_capacity(frag.row_count());
    for row in 0..frag.row_count() {
        keyed.push((sort_key(frag, row, index)?, row));
    }
    insertion_sort(&mut keyed, |a, b| a.0.cmp(&b.0));
    let order: Vec<usize> = keyed.into_iter().map(|(_, row)| row).collect();
    frag.reorder(&order)
}

/// LIMIT/OFFSET window; zero limit means unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limit {
    pub offset: usize,
    pub limit: usize,
}

impl Limit {
    /// Parse `[limit]` or `[offset, limit]`
    pub fn parse(entries: &[String]) -> Result<Option<Self>> {
        let num = |s: &String| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| Error::ParseError(format!("invalid limit value '{}'", s)))
        };
        match entries {
            [] => Ok(None),
            [limit] => Ok(Some(Limit {
                offset: 0,
                limit: num(limit)?,
            })),
            [offset, limit] => Ok(Some(Limit {
                offset: num(offset)?,
                limit: num(limit)?,
            })),
            _ => Err(Error::ParseError(format!(
                "limit takes one or two values, got {}",
                entries.len()
            ))),
        }
    }

    /// Restrict a selection to the window
    pub fn apply(&self, selection: &mut Selection) {
        let rows = selection.rows();
        let start = self.offset.min(rows.len());
        let end = if self.limit == 0 {
            rows.len()
        } else {
            start.saturating_add(self.limit).min(rows.len())
        };
        let window = rows[start..end].to_vec();
        selection.set_rows(window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Value;
    use crate::fragment::Schema;
    use std::sync::Arc;

    fn source(rows: &[(i64, f64, &str)]) -> Vec<Source> {
        let schema = Schema::from_pairs([
            ("id", FieldType::Long),
            ("v", FieldType::Real),
            ("tag", FieldType::String),
        ]);
        let mut f = Fragment::new("f", schema);
        for (id, v, t) in rows {
            f.push_values(&[Value::Long(*id), Value::Double(*v), Value::Str(t.to_string())])
                .unwrap();
        }
        vec![Source::new(Arc::new(f))]
    }

    #[test]
    fn test_order_is_stable() {
        let sources = source(&[(1, 2.0, "a"), (2, 1.0, "b"), (3, 2.0, "c"), (4, 1.0, "d")]);
        let mut sel = Selection::full(4);
        order_selection("v", &sources, &mut sel).unwrap();
        assert_eq!(sel.rows(), &[1, 3, 0, 2]);

        assert!(order_selection("tag", &sources, &mut sel).is_err());
    }

    #[test]
    fn test_order_fragment() {
        let sources = source(&[(3, 0.0, "x"), (1, 0.0, "y"), (2, 0.0, "z")]);
        let mut frag = (*sources[0].fragment).clone();
        order_fragment(&mut frag, "id").unwrap();
        assert_eq!(frag.ids().unwrap(), vec![1, 2, 3]);
        assert!(order_fragment(&mut frag, "tag").is_err());
    }

    #[test]
    fn test_limit_offset_bounds() {
        let mut sel = Selection::full(5);
        Limit { offset: 1, limit: 2 }.apply(&mut sel);
        assert_eq!(sel.rows(), &[1, 2]);

        let mut sel = Selection::full(5);
        Limit { offset: 3, limit: 0 }.apply(&mut sel);
        assert_eq!(sel.rows(), &[3, 4]);

        let mut sel = Selection::full(5);
        Limit { offset: 9, limit: 2 }.apply(&mut sel);
        assert!(sel.is_empty());
    }

    #[test]
    fn test_limit_parse() {
        let one = vec!["2".to_string()];
        assert_eq!(Limit::parse(&one).unwrap(), Some(Limit { offset: 0, limit: 2 }));
        let two = vec!["1".to_string(), "2".to_string()];
        assert_eq!(Limit::parse(&two).unwrap(), Some(Limit { offset: 1, limit: 2 }));
        assert!(Limit::parse(&["x".to_string()]).is_err());
        assert!(Limit::parse(&[]).unwrap().is_none());
    }
}

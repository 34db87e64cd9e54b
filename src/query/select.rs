//! SELECT pipeline
//!
//! WHERE (or positional join), ORDER BY, LIMIT/OFFSET, GROUP BY and finally
//! the projection into a new fragment.

use tracing::info;

use crate::error::Result;
use crate::expr::parse_expression;
use crate::fragment::Fragment;
use crate::query::filter::filter;
use crate::query::group::{group_rows, parse_group_clause};
use crate::query::order::{order_selection, Limit};
use crate::query::project::{project, Projection};
use crate::query::source::{QueryContext, Source};

/// Everything a SELECT needs besides its inputs
#[derive(Debug, Clone, Default)]
pub struct SelectRequest {
    /// Output fragment name
    pub name: String,
    pub fields: Vec<String>,
    pub aliases: Vec<String>,
    pub where_clause: Option<String>,
    pub group: Vec<String>,
    pub order: Option<String>,
    pub limit: Option<Limit>,
    pub sequential_id: Option<i64>,
}

/// Run a SELECT over `sources`
pub fn execute_select(
    request: &SelectRequest,
    sources: &[Source],
    ctx: &QueryContext<'_>,
) -> Result<Fragment> {
    let where_node = request
        .where_clause
        .as_deref()
        .map(parse_expression)
        .transpose()?;
    let group_node = parse_group_clause(&request.group)?;

    let mut selection = filter(sources, where_node.as_ref(), ctx)?;
    if let Some(field) = &request.order {
        order_selection(field, sources, &mut selection)?;
    }
    if let Some(limit) = &request.limit {
        limit.apply(&mut selection);
    }

    let groups = match &group_node {
        Some(node) => Some(group_rows(node, sources, &selection, ctx)?),
        None => None,
    };

    let projection = Projection {
        name: &request.name,
        fields: &request.fields,
        aliases: &request.aliases,
        sequential_id: request.sequential_id,
        group_by: group_node.as_ref(),
    };
    let out = project(&projection, sources, &selection, groups.as_deref(), ctx)?;
    info!(
        name = %request.name,
        inputs = sources.len(),
        rows = out.row_count(),
        "select finished"
    );
    Ok(out)
}

//! GROUP BY
//!
//! Rows are grouped by the text key of one expression over identifier
//! columns. Groups keep first-seen order.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::expr::{evaluate, is_aggregating, parse_expression, Node, Value};
use crate::query::binding::{Binding, RowBinder};
use crate::query::source::{QueryContext, Selection, Source};

/// One group of selected rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub key: String,
    /// Positions in the selection, in selection order
    pub members: Vec<usize>,
}

/// Text key of a grouping value
pub fn group_key(value: &Value) -> Result<String> {
    match value {
        Value::Double(d) => Ok(format!("{:.6}", d)),
        Value::Long(l) => Ok(l.to_string()),
        Value::Str(s) => Ok(s.clone()),
        Value::Binary(_) => Err(Error::exec("GROUP BY expression produced a binary value")),
    }
}

/// Parse the `group` multi-value, which must hold exactly one expression
pub fn parse_group_clause(entries: &[String]) -> Result<Option<Node>> {
    match entries {
        [] => Ok(None),
        [one] => parse_expression(one).map(Some),
        _ => Err(Error::exec(format!(
            "GROUP BY takes exactly one expression, got {}",
            entries.len()
        ))),
    }
}

/// Group the selected rows by `node`
pub fn group_rows(
    node: &Node,
    sources: &[Source],
    selection: &Selection,
    ctx: &QueryContext<'_>,
) -> Result<Vec<Group>> {
    if is_aggregating(node, ctx.registry) {
        return Err(Error::exec("aggregate functions are not allowed in GROUP BY"));
    }

    let binder = RowBinder::bind(node, sources, ctx.args)?;
    for (name, binding) in binder.bindings() {
        if let Binding::Field { source, field } = binding {
            let id = sources[*source].fragment.id_field_index()?;
            if id != *field {
                return Err(Error::exec(format!(
                    "GROUP BY may only reference identifier columns, '{}' is not one",
                    name
                )));
            }
        }
    }

    let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();
    for k in 0..selection.len() {
        let table = binder.table(ctx, sources, selection, k)?;
        let key = group_key(&evaluate(node, &table)?)?;
        groups.entry(key).or_default().push(k);
    }

    debug!(rows = selection.len(), groups = groups.len(), "rows grouped");
    Ok(groups
        .into_iter()
        .map(|(key, members)| Group { key, members })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::FunctionRegistry;
    use crate::fragment::{FieldType, Fragment, Schema};
    use std::sync::Arc;

    fn sources() -> Vec<Source> {
        let schema = Schema::from_pairs([("id", FieldType::Long), ("v", FieldType::Real)]);
        let mut f = Fragment::new("f", schema);
        for id in 1..=6 {
            f.push_values(&[Value::Long(id), Value::Double(id as f64)]).unwrap();
        }
        vec![Source::new(Arc::new(f))]
    }

    #[test]
    fn test_group_keys() {
        assert_eq!(group_key(&Value::Double(1.5)).unwrap(), "1.500000");
        assert_eq!(group_key(&Value::Long(-3)).unwrap(), "-3");
        assert_eq!(group_key(&Value::Str("a".into())).unwrap(), "a");
        assert!(group_key(&Value::Binary(bytes::Bytes::new())).is_err());
    }

    #[test]
    fn test_group_first_seen_order() {
        let registry = FunctionRegistry::builtin();
        let ctx = QueryContext::new(&registry, &[]);
        let sources = sources();
        let sel = Selection::full(6);

        let node = parse_expression("id MOD 3").unwrap();
        let groups = group_rows(&node, &sources, &sel, &ctx).unwrap();
        let keys: Vec<_> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["1", "2", "0"]);
        assert_eq!(groups[0].members, vec![0, 3]);
        assert_eq!(groups[2].members, vec![2, 5]);
    }

    #[test]
    fn test_group_idempotent_on_identifier() {
        let registry = FunctionRegistry::builtin();
        let ctx = QueryContext::new(&registry, &[]);
        let sources = sources();
        let sel = Selection::full(6);

        let node = parse_expression("oph_id(id, 2)").unwrap();
        let first = group_rows(&node, &sources, &sel, &ctx).unwrap();
        let second = group_rows(&node, &sources, &sel, &ctx).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|g| g.members.len() == 2));
    }

    #[test]
    fn test_group_independent_of_row_order() {
        let registry = FunctionRegistry::builtin();
        let ctx = QueryContext::new(&registry, &[]);
        let sources = sources();
        let node = parse_expression("oph_id(id, 2)").unwrap();

        let ids_by_key = |sel: &Selection| {
            let groups = group_rows(&node, &sources, sel, &ctx).unwrap();
            groups
                .into_iter()
                .map(|g| {
                    let mut ids: Vec<usize> = g.members.iter().map(|&k| sel.row(0, k) + 1).collect();
                    ids.sort_unstable();
                    (g.key, ids)
                })
                .collect::<Vec<_>>()
        };

        let ordered = ids_by_key(&Selection::full(6));
        let permuted = ids_by_key(&Selection::new(vec![0], vec![3, 0, 2, 1, 5, 4]));

        // First-seen order follows the permuted input: ids 4, 1, 3, 2, 6, 5
        let keys: Vec<_> = permuted.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["2", "1", "3"]);
        assert_eq!(permuted[0].1, vec![3, 4]);
        assert_eq!(permuted[1].1, vec![1, 2]);
        assert_eq!(permuted[2].1, vec![5, 6]);

        let mut sorted = permuted.clone();
        sorted.sort();
        assert_eq!(sorted, ordered);
    }

    #[test]
    fn test_group_rejects_non_identifier() {
        let registry = FunctionRegistry::builtin();
        let ctx = QueryContext::new(&registry, &[]);
        let node = parse_expression("v").unwrap();
        assert!(group_rows(&node, &sources(), &Selection::full(6), &ctx).is_err());

        let two = vec!["id".to_string(), "id".to_string()];
        assert!(parse_group_clause(&two).is_err());
        assert!(parse_group_clause(&[]).unwrap().is_none());
    }
}

//! SELECT projection
//!
//! Turns the selected (and optionally grouped) rows into an output fragment.
//! Each output column is one of:
//! - a literal, replicated for every output row
//! - a positional argument `?N`, replicated likewise
//! - a field reference, copied from the input bytes
//! - an expression, evaluated per row
//!
//! Under GROUP BY, aggregates and columns identical to the grouping
//! expression yield one row per group. Any other field reference or scalar
//! expression emits once per member. Every column has to yield the same
//! number of rows, so such a column is rejected unless each group holds a
//! single row.

use bytes::Bytes;
use std::collections::HashSet;
use tracing::debug;

use crate::error::{Error, Result};
use crate::expr::{parse_expression, Emission, GroupEvaluator, Node, Value};
use crate::fragment::{encode_value, Field, FieldType, Fragment, Record, Schema};
use crate::query::binding::{arg_value, placeholder_position, resolve_field, RowBinder};
use crate::query::group::Group;
use crate::query::source::{QueryContext, Selection, Source};

/// Classified output column
#[derive(Debug, Clone)]
pub enum Column {
    Literal(Value),
    Arg(Value),
    Field { source: usize, field: usize },
    Expr(Node),
}

impl Column {
    /// Classify one `field` entry
    pub fn classify(text: &str, sources: &[Source], ctx: &QueryContext<'_>) -> Result<Self> {
        Self::from_node(parse_expression(text)?, sources, ctx)
    }

    /// Classify a parsed `field` entry
    pub fn from_node(node: Node, sources: &[Source], ctx: &QueryContext<'_>) -> Result<Self> {
        match node {
            Node::Literal(v) => Ok(Column::Literal(v)),
            Node::Variable(name) => match placeholder_position(&name) {
                Some(position) => arg_value(ctx.args, position).map(Column::Arg),
                None => {
                    let (source, field) = resolve_field(&name, sources)?;
                    Ok(Column::Field { source, field })
                }
            },
            node => Ok(Column::Expr(node)),
        }
    }
}

/// Output field type for a value
pub fn field_type_of(value: &Value) -> FieldType {
    match value {
        Value::Long(_) => FieldType::Long,
        Value::Double(_) => FieldType::Real,
        Value::Str(_) => FieldType::String,
        Value::Binary(_) => FieldType::Blob,
    }
}

/// Projection request
#[derive(Debug, Clone, Default)]
pub struct Projection<'a> {
    /// Output fragment name
    pub name: &'a str,
    /// `field` entries
    pub fields: &'a [String],
    /// `field_alias` entries, empty or one per field
    pub aliases: &'a [String],
    /// Renumber identifier columns from this base
    pub sequential_id: Option<i64>,
    /// The GROUP BY expression, when grouped
    pub group_by: Option<&'a Node>,
}

/// One finished output column
struct ColumnData {
    field: Field,
    cells: Vec<Bytes>,
}

/// Project the selection into a new fragment
pub fn project(
    projection: &Projection<'_>,
    sources: &[Source],
    selection: &Selection,
    groups: Option<&[Group]>,
    ctx: &QueryContext<'_>,
) -> Result<Fragment> {
    if projection.fields.is_empty() {
        return Err(Error::NullParam("field".to_string()));
    }
    if !projection.aliases.is_empty() && projection.aliases.len() != projection.fields.len() {
        return Err(Error::exec(format!(
            "{} field aliases given for {} fields",
            projection.aliases.len(),
            projection.fields.len()
        )));
    }

    let expected = groups.map_or(selection.len(), |g| g.len());
    let mut seen = HashSet::new();
    let mut identifier_taken = false;
    let mut columns = Vec::with_capacity(projection.fields.len());

    for (i, text) in projection.fields.iter().enumerate() {
        let node = parse_expression(text)?;
        // Constant within a group, so one row per group
        let keyed = projection.group_by == Some(&node);
        let column = Column::from_node(node, sources, ctx)?;
        let mut data = match &column {
            Column::Literal(v) | Column::Arg(v) => {
                let ty = field_type_of(v);
                let cell = encode_value(v, ty)?;
                ColumnData {
                    field: Field::new(text.trim(), ty, i),
                    cells: vec![cell; expected],
                }
            }
            Column::Field { source, field } => field_column(
                *source,
                *field,
                sources,
                selection,
                groups,
                keyed,
                projection.sequential_id,
            )?,
            Column::Expr(node) => {
                expr_column(text.trim(), node, sources, selection, groups, keyed, ctx)?
            }
        };

        if data.cells.len() != expected {
            return Err(Error::exec(format!(
                "column '{}' produced {} rows, expected {}",
                text,
                data.cells.len(),
                expected
            )));
        }

        if let Some(alias) = projection.aliases.get(i) {
            data.field.name = alias.clone();
        }
        if !seen.insert(data.field.name.clone()) {
            return Err(Error::exec(format!("duplicate output field '{}'", data.field.name)));
        }
        if data.field.identifier {
            data.field.identifier = !identifier_taken;
            identifier_taken = true;
        }
        columns.push(data);
    }

    let schema = Schema::from_fields(columns.iter().map(|c| c.field.clone()).collect());
    let mut out = Fragment::new(projection.name, schema);
    out.reserve_exact(expected);
    for row in 0..expected {
        out.push_record(Record::new(
            columns.iter().map(|c| c.cells[row].clone()).collect(),
        ))?;
    }

    debug!(
        name = projection.name,
        columns = columns.len(),
        rows = expected,
        grouped = groups.is_some(),
        "projection built"
    );
    Ok(out)
}

fn field_column(
    source: usize,
    field: usize,
    sources: &[Source],
    selection: &Selection,
    groups: Option<&[Group]>,
    keyed: bool,
    sequential_id: Option<i64>,
) -> Result<ColumnData> {
    let frag = &sources[source].fragment;
    let def = &frag.schema().fields()[field];
    let is_id = frag.schema().id_field_index() == Some(field);

    let order: Vec<usize> = match groups {
        Some(groups) if keyed => groups.iter().filter_map(|g| g.members.last().copied()).collect(),
        Some(groups) => groups.iter().flat_map(|g| g.members.iter().copied()).collect(),
        None => (0..selection.len()).collect(),
    };

    let mut cells = Vec::with_capacity(order.len());
    for (out_row, k) in order.into_iter().enumerate() {
        let cell = match sequential_id {
            Some(base) if is_id => {
                let id = i64::try_from(out_row)
                    .ok()
                    .and_then(|row| base.checked_add(row))
                    .ok_or_else(|| Error::exec("sequential_id overflows the identifier range"))?;
                encode_value(&Value::Long(id), FieldType::Long)?
            }
            _ => frag.records()[selection.row(source, k)]
                .field(field)
                .cloned()
                .ok_or_else(|| Error::exec(format!("record has no field {}", field)))?,
        };
        cells.push(cell);
    }

    Ok(ColumnData {
        field: Field::new(def.name.clone(), def.field_type, 0).identifier(is_id),
        cells,
    })
}

fn expr_column(
    name: &str,
    node: &Node,
    sources: &[Source],
    selection: &Selection,
    groups: Option<&[Group]>,
    keyed: bool,
    ctx: &QueryContext<'_>,
) -> Result<ColumnData> {
    let binder = RowBinder::bind(node, sources, ctx.args)?;
    let mut eval = GroupEvaluator::new(node, ctx.registry);
    let mut values = Vec::new();

    match groups {
        Some(groups) => {
            for group in groups {
                eval.notify_group_boundary();
                let n = group.members.len();
                for (i, &k) in group.members.iter().enumerate() {
                    let last = i + 1 == n;
                    if !last && keyed && !eval.is_aggregating() {
                        continue;
                    }
                    eval.set_last_row(last);
                    let table = binder.table(ctx, sources, selection, k)?;
                    if let Emission::Emit(v) = eval.evaluate_row(&table)? {
                        values.push(v);
                    }
                }
            }
        }
        None => {
            for k in 0..selection.len() {
                eval.notify_group_boundary();
                eval.set_last_row(true);
                let table = binder.table(ctx, sources, selection, k)?;
                if let Emission::Emit(v) = eval.evaluate_row(&table)? {
                    values.push(v);
                }
            }
        }
    }

    let ty = values.first().map_or(FieldType::Real, field_type_of);
    let cells = values
        .iter()
        .map(|v| encode_value(v, ty))
        .collect::<Result<Vec<_>>>()?;

    Ok(ColumnData {
        field: Field::new(name, ty, 0),
        cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::FunctionRegistry;
    use crate::query::args::BinaryArg;
    use crate::query::group::group_rows;
    use std::sync::Arc;

    fn sources() -> Vec<Source> {
        let schema = Schema::from_pairs([("id", FieldType::Long), ("v", FieldType::Real)]);
        let mut f = Fragment::new("f", schema);
        for (id, v) in [(1, 10.0), (2, 20.0), (3, 30.0), (4, 40.0)] {
            f.push_values(&[Value::Long(id), Value::Double(v)]).unwrap();
        }
        vec![Source::new(Arc::new(f))]
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_column_kinds() {
        let registry = FunctionRegistry::builtin();
        let args = [BinaryArg::Varchar("tag".into())];
        let ctx = QueryContext::new(&registry, &args);
        let sources = sources();
        let fields = strings(&["id", "7", "?1", "v * 2"]);
        let aliases = strings(&["id", "seven", "label", "twice"]);
        let projection = Projection {
            name: "out",
            fields: &fields,
            aliases: &aliases,
            sequential_id: None,
            group_by: None,
        };

        let out = project(&projection, &sources, &Selection::full(4), None, &ctx).unwrap();
        assert_eq!(out.row_count(), 4);
        assert_eq!(
            out.schema().field_types(),
            vec![FieldType::Long, FieldType::Long, FieldType::String, FieldType::Real]
        );
        assert_eq!(out.schema().id_field_index(), Some(0));
        assert_eq!(out.value(3, 3).unwrap(), Value::Double(80.0));
        assert_eq!(out.value(0, 2).unwrap(), Value::Str("tag".into()));
    }

    #[test]
    fn test_sequential_id() {
        let registry = FunctionRegistry::builtin();
        let ctx = QueryContext::new(&registry, &[]);
        let sources = sources();
        let fields = strings(&["id", "v"]);
        let projection = Projection {
            name: "out",
            fields: &fields,
            aliases: &[],
            sequential_id: Some(100),
            group_by: None,
        };
        let sel = Selection::new(vec![0], vec![1, 3]);
        let out = project(&projection, &sources, &sel, None, &ctx).unwrap();
        assert_eq!(out.ids().unwrap(), vec![100, 101]);
        assert_eq!(out.value(1, 1).unwrap(), Value::Double(40.0));
    }

    #[test]
    fn test_grouped_aggregate() {
        let registry = FunctionRegistry::builtin();
        let ctx = QueryContext::new(&registry, &[]);
        let sources = sources();
        let sel = Selection::full(4);
        let key = parse_expression("oph_id(id, 2)").unwrap();
        let groups = group_rows(&key, &sources, &sel, &ctx).unwrap();

        let fields = strings(&["oph_id(id, 2)", "oph_sum(v)"]);
        let aliases = strings(&["block", "total"]);
        let projection = Projection {
            name: "out",
            fields: &fields,
            aliases: &aliases,
            sequential_id: None,
            group_by: Some(&key),
        };
        let out = project(&projection, &sources, &sel, Some(&groups), &ctx).unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.value(0, 1).unwrap(), Value::Double(30.0));
        assert_eq!(out.value(1, 1).unwrap(), Value::Double(70.0));

        assert_eq!(out.value(1, 0).unwrap(), Value::Long(2));

        // Per-member columns cannot line up with the groups
        for field in ["v", "v * 2", "oph_id(id, 4)"] {
            let fields = strings(&["oph_count(v)", field]);
            let projection = Projection {
                name: "out",
                fields: &fields,
                group_by: Some(&key),
                ..Default::default()
            };
            let err = project(&projection, &sources, &sel, Some(&groups), &ctx).unwrap_err();
            assert!(matches!(err, Error::ExecutionError(_)), "{}: {}", field, err);
        }
    }

    #[test]
    fn test_grouped_per_member_columns_on_single_row_groups() {
        let registry = FunctionRegistry::builtin();
        let ctx = QueryContext::new(&registry, &[]);
        let sources = sources();
        let sel = Selection::new(vec![0], vec![2, 0, 3]);
        let key = parse_expression("id").unwrap();
        let groups = group_rows(&key, &sources, &sel, &ctx).unwrap();

        let fields = strings(&["id", "v", "oph_sum(v)"]);
        let projection = Projection {
            name: "out",
            fields: &fields,
            group_by: Some(&key),
            ..Default::default()
        };
        let out = project(&projection, &sources, &sel, Some(&groups), &ctx).unwrap();
        assert_eq!(out.ids().unwrap(), vec![3, 1, 4]);
        assert_eq!(out.value(0, 1).unwrap(), Value::Double(30.0));
        assert_eq!(out.value(2, 2).unwrap(), Value::Double(40.0));
    }

    #[test]
    fn test_empty_selection_defaults_to_real() {
        let registry = FunctionRegistry::builtin();
        let ctx = QueryContext::new(&registry, &[]);
        let fields = strings(&["v + 1"]);
        let projection = Projection {
            name: "out",
            fields: &fields,
            aliases: &[],
            sequential_id: None,
            group_by: None,
        };
        let out = project(&projection, &sources(), &Selection::new(vec![0], vec![]), None, &ctx)
            .unwrap();
        assert_eq!(out.row_count(), 0);
        assert_eq!(out.schema().field_types(), vec![FieldType::Real]);
    }

    #[test]
    fn test_rejects_duplicates_and_bad_aliases() {
        let registry = FunctionRegistry::builtin();
        let ctx = QueryContext::new(&registry, &[]);
        let fields = strings(&["id", "id"]);
        let projection = Projection {
            name: "out",
            fields: &fields,
            aliases: &[],
            sequential_id: None,
            group_by: None,
        };
        assert!(project(&projection, &sources(), &Selection::full(4), None, &ctx).is_err());

        let fields = strings(&["id"]);
        let aliases = strings(&["a", "b"]);
        let projection = Projection {
            name: "out",
            fields: &fields,
            aliases: &aliases,
            sequential_id: None,
            group_by: None,
        };
        assert!(project(&projection, &sources(), &Selection::full(4), None, &ctx).is_err());
    }
}

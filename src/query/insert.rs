//! INSERT and MULTI-INSERT row building
//!
//! Each value text is classified as a placeholder `?N`, a quoted string, a
//! long, a double or, failing those, an expression evaluated without row
//! context. Unquoted text is taken literally for STRING and BLOB fields.

use tracing::debug;

use crate::error::{Error, Result};
use crate::expr::{evaluate, parse_expression, SymbolTable, Value};
use crate::fragment::{encode_value, FieldType, Record, Schema};
use crate::query::args::unquote;
use crate::query::binding::{arg_value, placeholder_position};
use crate::query::source::QueryContext;

fn is_quoted(text: &str) -> bool {
    let t = text.trim();
    t.len() >= 2
        && ((t.starts_with('\'') && t.ends_with('\'')) || (t.starts_with('"') && t.ends_with('"')))
}

/// Turn one value text into a value for a field of type `field_type`
pub fn classify_value(text: &str, field_type: FieldType, ctx: &QueryContext<'_>) -> Result<Value> {
    let t = text.trim();
    if let Some(position) = placeholder_position(t) {
        return arg_value(ctx.args, position);
    }
    if is_quoted(t) {
        return Ok(Value::Str(unquote(t).to_string()));
    }
    if let Ok(l) = t.parse::<i64>() {
        return Ok(Value::Long(l));
    }
    if let Ok(d) = t.parse::<f64>() {
        return Ok(Value::Double(d));
    }
    if matches!(field_type, FieldType::String | FieldType::Blob) {
        return Ok(Value::Str(t.to_string()));
    }

    let node = parse_expression(t)?;
    let table = SymbolTable::new(ctx.registry, ctx.headroom);
    evaluate(&node, &table)
}

/// Check the named fields against the schema; empty means schema order
fn check_fields(schema: &Schema, fields: &[String]) -> Result<()> {
    if fields.is_empty() {
        return Ok(());
    }
    let expected = schema.field_names();
    if fields.len() != expected.len() || fields.iter().zip(&expected).any(|(a, b)| a != b) {
        return Err(Error::exec(format!(
            "insert fields [{}] do not match fragment fields [{}]",
            fields.join(", "),
            expected.join(", ")
        )));
    }
    Ok(())
}

fn encode_row(schema: &Schema, values: &[String], ctx: &QueryContext<'_>) -> Result<Record> {
    let cells = schema
        .fields()
        .iter()
        .zip(values)
        .map(|(field, text)| {
            let value = classify_value(text, field.field_type, ctx)?;
            encode_value(&value, field.field_type)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Record::new(cells))
}

/// Build one record from parallel field/value lists
pub fn build_record(
    schema: &Schema,
    fields: &[String],
    values: &[String],
    ctx: &QueryContext<'_>,
) -> Result<Record> {
    check_fields(schema, fields)?;
    if values.len() != schema.field_count() {
        return Err(Error::exec(format!(
            "insert needs {} values, got {}",
            schema.field_count(),
            values.len()
        )));
    }
    encode_row(schema, values, ctx)
}

/// Build a batch of records from one flat value list
pub fn build_records(
    schema: &Schema,
    fields: &[String],
    values: &[String],
    ctx: &QueryContext<'_>,
) -> Result<Vec<Record>> {
    check_fields(schema, fields)?;
    let width = schema.field_count();
    if width == 0 || values.is_empty() || values.len() % width != 0 {
        return Err(Error::exec(format!(
            "multi-insert value count {} is not a multiple of {} fields",
            values.len(),
            width
        )));
    }

    let records = values
        .chunks(width)
        .map(|row| encode_row(schema, row, ctx))
        .collect::<Result<Vec<_>>>()?;
    debug!(rows = records.len(), "multi-insert batch encoded");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::FunctionRegistry;
    use crate::query::args::BinaryArg;
    use bytes::Bytes;

    fn schema() -> Schema {
        Schema::from_pairs([
            ("id", FieldType::Long),
            ("v", FieldType::Real),
            ("label", FieldType::String),
        ])
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_classify_values() {
        let registry = FunctionRegistry::builtin();
        let args = [BinaryArg::Blob(Bytes::from_static(b"\x01"))];
        let ctx = QueryContext::new(&registry, &args);

        assert_eq!(classify_value("42", FieldType::Long, &ctx).unwrap(), Value::Long(42));
        assert_eq!(classify_value("2.5", FieldType::Real, &ctx).unwrap(), Value::Double(2.5));
        assert_eq!(
            classify_value("'x y'", FieldType::String, &ctx).unwrap(),
            Value::Str("x y".into())
        );
        assert_eq!(
            classify_value("plain", FieldType::String, &ctx).unwrap(),
            Value::Str("plain".into())
        );
        assert_eq!(
            classify_value("oph_id(5, 2)", FieldType::Long, &ctx).unwrap(),
            Value::Long(3)
        );
        assert!(matches!(
            classify_value("?1", FieldType::Blob, &ctx).unwrap(),
            Value::Binary(_)
        ));
        assert!(classify_value("?2", FieldType::Blob, &ctx).is_err());
    }

    #[test]
    fn test_build_record() {
        let registry = FunctionRegistry::builtin();
        let ctx = QueryContext::new(&registry, &[]);
        let schema = schema();

        let record = build_record(
            &schema,
            &strings(&["id", "v", "label"]),
            &strings(&["1", "10", "'a'"]),
            &ctx,
        )
        .unwrap();
        assert_eq!(record.value(1, FieldType::Real).unwrap(), Value::Double(10.0));
        assert_eq!(record.field_length(2), 2);

        assert!(build_record(&schema, &strings(&["v", "id", "label"]), &strings(&["1", "2", "x"]), &ctx)
            .is_err());
        assert!(build_record(&schema, &[], &strings(&["1", "2"]), &ctx).is_err());
        assert!(build_record(&schema, &[], &strings(&["x", "2", "y"]), &ctx).is_err());
    }

    #[test]
    fn test_build_records() {
        let registry = FunctionRegistry::builtin();
        let ctx = QueryContext::new(&registry, &[]);
        let schema = schema();
        let values = strings(&["1", "1.5", "a", "2", "2.5", "b"]);

        let records = build_records(&schema, &[], &values, &ctx).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].value(0, FieldType::Long).unwrap(), Value::Long(2));

        assert!(build_records(&schema, &[], &values[..4], &ctx).is_err());
    }
}

//! Variable binding
//!
//! Resolves the free variables of an expression to input fields or
//! positional arguments, then fills a fresh symbol table per row.

use crate::error::{Error, Result};
use crate::expr::{Node, SymbolTable, Value};
use crate::query::args::BinaryArg;
use crate::query::source::{QueryContext, Selection, Source};

/// What a variable name refers to
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Field `field` of input `source`
    Field { source: usize, field: usize },
    /// Constant from a positional argument
    Arg(Value),
}

/// Parse a `?N` placeholder into its 1-based position
pub fn placeholder_position(name: &str) -> Option<usize> {
    name.strip_prefix('?')?.parse().ok().filter(|n| *n > 0)
}

/// Value of positional argument `?position`
pub fn arg_value(args: &[BinaryArg], position: usize) -> Result<Value> {
    args.get(position.wrapping_sub(1))
        .ok_or_else(|| {
            Error::exec(format!(
                "argument ?{} not supplied ({} given)",
                position,
                args.len()
            ))
        })?
        .to_value(position)
}

/// Resolve a field reference: `field`, `frag.field`, `alias.field` or
/// `db.frag.field`
pub fn resolve_field(name: &str, sources: &[Source]) -> Result<(usize, usize)> {
    match name.rsplit_once('.') {
        Some((prefix, field)) => {
            let source = sources
                .iter()
                .position(|s| s.answers_to(prefix))
                .ok_or_else(|| Error::FieldNotFound(field.to_string(), prefix.to_string()))?;
            Ok((source, sources[source].fragment.field_index(field)?))
        }
        None => match sources {
            [only] => Ok((0, only.fragment.field_index(name)?)),
            [] => Err(Error::exec(format!("no input fragment for field '{}'", name))),
            _ => Err(Error::exec(format!(
                "field '{}' is ambiguous across {} fragments; qualify it",
                name,
                sources.len()
            ))),
        },
    }
}

/// Resolve one variable name
pub fn resolve_variable(name: &str, sources: &[Source], args: &[BinaryArg]) -> Result<Binding> {
    match placeholder_position(name) {
        Some(position) => arg_value(args, position).map(Binding::Arg),
        None => resolve_field(name, sources).map(|(source, field)| Binding::Field { source, field }),
    }
}

/// The resolved variables of one expression
#[derive(Debug, Clone, Default)]
pub struct RowBinder {
    vars: Vec<(String, Binding)>,
}

impl RowBinder {
    /// Resolve every free variable of `node`
    pub fn bind(node: &Node, sources: &[Source], args: &[BinaryArg]) -> Result<Self> {
        let vars = node
            .variables()
            .into_iter()
            .map(|name| Ok((name.to_string(), resolve_variable(name, sources, args)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { vars })
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.vars.iter().map(|(n, b)| (n.as_str(), b))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Build the symbol table for selected entry `k`
    pub fn table(
        &self,
        ctx: &QueryContext<'_>,
        sources: &[Source],
        selection: &Selection,
        k: usize,
    ) -> Result<SymbolTable> {
        let mut table = SymbolTable::new(ctx.registry, self.vars.len() + ctx.headroom);
        for (name, binding) in &self.vars {
            let value = match binding {
                Binding::Field { source, field } => sources[*source]
                    .fragment
                    .value(selection.row(*source, k), *field)?,
                Binding::Arg(v) => v.clone(),
            };
            table.add_variable(name, value)?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{parse_expression, FunctionRegistry};
    use crate::fragment::{FieldType, Fragment, Schema};
    use std::sync::Arc;

    fn source(name: &str) -> Source {
        let schema = Schema::from_pairs([("id", FieldType::Long), ("v", FieldType::Real)]);
        let mut frag = Fragment::new(name, schema);
        frag.push_values(&[Value::Long(1), Value::Double(4.0)]).unwrap();
        Source::new(Arc::new(frag))
    }

    #[test]
    fn test_resolve_names() {
        let sources = vec![
            source("a").with_db(Some("db".into())),
            source("b").with_alias(Some("x".into())),
        ];
        assert_eq!(resolve_field("a.v", &sources).unwrap(), (0, 1));
        assert_eq!(resolve_field("db.a.id", &sources).unwrap(), (0, 0));
        assert_eq!(resolve_field("x.v", &sources).unwrap(), (1, 1));
        assert!(resolve_field("v", &sources).is_err());
        assert!(matches!(
            resolve_field("c.v", &sources),
            Err(Error::FieldNotFound(..))
        ));
        assert_eq!(resolve_field("v", &sources[..1]).unwrap(), (0, 1));
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholder_position("?3"), Some(3));
        assert_eq!(placeholder_position("?0"), None);
        assert_eq!(placeholder_position("v"), None);

        let args = [BinaryArg::Double(1.5)];
        assert_eq!(
            resolve_variable("?1", &[], &args).unwrap(),
            Binding::Arg(Value::Double(1.5))
        );
        assert!(resolve_variable("?2", &[], &args).is_err());
    }

    #[test]
    fn test_row_table() {
        let registry = FunctionRegistry::builtin();
        let args = [BinaryArg::Long(2)];
        let ctx = QueryContext::new(&registry, &args);
        let sources = vec![source("a")];
        let node = parse_expression("v * ?1 + v").unwrap();

        let binder = RowBinder::bind(&node, &sources, &args).unwrap();
        assert_eq!(binder.len(), 2);

        let table = binder
            .table(&ctx, &sources, &Selection::full(1), 0)
            .unwrap();
        assert_eq!(table.lookup_variable("v").unwrap(), &Value::Double(4.0));
        assert_eq!(table.capacity(), registry.len() + 2);
    }
}

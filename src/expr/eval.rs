//! Expression evaluator
//!
//! A recursive tree walk that resolves variables and functions through a
//! [`SymbolTable`]. Operators coerce their operands to `f64`; arithmetic
//! yields a Double while comparison and logic yield a Long 0/1.
//!
//! Aggregate functions keep one accumulator per call site. Inside a
//! [`GroupEvaluator`] an aggregating expression is [`Emission::Suppressed`]
//! for every member of a group except the last one, which emits the rolled-up
//! value. Plain [`evaluate`] treats each call as a one-row group.

use super::ast::{BinaryOperator, Node, UnaryOperator};
use super::functions::{Accumulator, FunctionKind, FunctionRegistry};
use super::symtable::SymbolTable;
use super::value::Value;
use crate::error::{Error, Result};

/// Outcome of evaluating one row
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    /// The row produced an output value
    Emit(Value),
    /// The row was absorbed by an aggregate and produces no output
    Suppressed,
}

/// Evaluate an expression for a single row
pub fn evaluate(node: &Node, symtable: &SymbolTable) -> Result<Value> {
    let mut accumulators = Vec::new();
    let mut walker = Walker {
        accumulators: &mut accumulators,
        last_row: true,
        next_site: 0,
    };
    match walker.eval(node, symtable)? {
        Emission::Emit(v) => Ok(v),
        Emission::Suppressed => Err(Error::exec("expression produced no value")),
    }
}

/// True when any function called by `node` is an aggregate
pub fn is_aggregating(node: &Node, registry: &FunctionRegistry) -> bool {
    node.function_names()
        .into_iter()
        .any(|name| registry.get(name).map_or(false, |f| f.is_aggregate()))
}

/// Stateful evaluator for expressions walked group by group
pub struct GroupEvaluator<'n> {
    node: &'n Node,
    accumulators: Vec<Option<Box<dyn Accumulator>>>,
    last_row: bool,
    aggregating: bool,
}

impl<'n> GroupEvaluator<'n> {
    pub fn new(node: &'n Node, registry: &FunctionRegistry) -> Self {
        Self {
            node,
            accumulators: Vec::new(),
            last_row: false,
            aggregating: is_aggregating(node, registry),
        }
    }

    /// Whether this expression emits once per group rather than once per row
    pub fn is_aggregating(&self) -> bool {
        self.aggregating
    }

    /// Mark the next evaluated row as the final member of its group
    pub fn set_last_row(&mut self, last: bool) {
        self.last_row = last;
    }

    /// Discard accumulated state before starting a new group
    pub fn notify_group_boundary(&mut self) {
        self.accumulators.clear();
        self.last_row = false;
    }

    /// Evaluate the expression for the row bound in `symtable`
    pub fn evaluate_row(&mut self, symtable: &SymbolTable) -> Result<Emission> {
        let mut walker = Walker {
            accumulators: &mut self.accumulators,
            last_row: self.last_row,
            next_site: 0,
        };
        walker.eval(self.node, symtable)
    }
}

struct Walker<'a> {
    accumulators: &'a mut Vec<Option<Box<dyn Accumulator>>>,
    last_row: bool,
    next_site: usize,
}

impl Walker<'_> {
    fn eval(&mut self, node: &Node, symtable: &SymbolTable) -> Result<Emission> {
        match node {
            Node::Literal(v) => Ok(Emission::Emit(v.clone())),

            Node::Variable(name) => symtable
                .lookup_variable(name)
                .map(|v| Emission::Emit(v.clone())),

            Node::FunctionCall { name, args } => {
                let def = *symtable.lookup_function(name)?;
                def.arity.check(name, args.len())?;


                let mut values = Vec::with_capacity(args.len());
                let mut suppressed = false;
                for arg in args {
                    match self.eval(arg, symtable)? {
                        Emission::Emit(v) => values.push(v),
                        Emission::Suppressed => suppressed = true,
                    }
                }

                match def.kind {
                    FunctionKind::Scalar(body) => {
                        if suppressed {
                            Ok(Emission::Suppressed)
                        } else {
                            body(&values).map(Emission::Emit)
                        }
                    }
                    FunctionKind::Aggregate(factory) => {
                        if suppressed {
                            return Err(Error::exec(format!(
                                "aggregate '{}' cannot take an aggregate argument",
                                name
                            )));
                        }
                        let site = self.next_site;
                        self.next_site += 1;
                        if self.accumulators.len() <= site {
                            self.accumulators.resize_with(site + 1, || None);
                        }
                        let acc = self.accumulators[site].get_or_insert_with(factory);
                        acc.update(&values)?;
                        if self.last_row {
                            acc.finish().map(Emission::Emit)
                        } else {
                            Ok(Emission::Suppressed)
                        }
                    }
                }
            }

            Node::BinaryOp { left, op, right } => {
                let l = self.eval(left, symtable)?;
                let r = self.eval(right, symtable)?;
                match (l, r) {
                    (Emission::Emit(l), Emission::Emit(r)) => {
                        apply_binary(*op, &l, &r).map(Emission::Emit)
                    }
                    _ => Ok(Emission::Suppressed),
                }
            }

            Node::UnaryOp { op, expr } => match self.eval(expr, symtable)? {
                Emission::Emit(v) => apply_unary(*op, &v).map(Emission::Emit),
                Emission::Suppressed => Ok(Emission::Suppressed),
            },
        }
    }
}

fn apply_binary(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value> {
    let context = format!("operator {}", op.symbol());
    let l = left.get_double_value(&context)?;
    let r = right.get_double_value(&context)?;

    let value = match op {
        BinaryOperator::Add => Value::Double(l + r),
        BinaryOperator::Sub => Value::Double(l - r),
        BinaryOperator::Mul => Value::Double(l * r),
        BinaryOperator::Div => {
            if r == 0.0 {
                return Err(Error::DivisionByZero);
            }
            Value::Double(l / r)
        }
        BinaryOperator::Mod => {
            let (a, b) = (l as i32, r as i32);
            if b == 0 {
                return Err(Error::DivisionByZero);
            }
            Value::Long(a.wrapping_rem(b) as i64)
        }
        BinaryOperator::Eq => Value::from_bool(l == r),
        BinaryOperator::Neq => Value::from_bool(l != r),
        BinaryOperator::Lt => Value::from_bool(l < r),
        BinaryOperator::Gt => Value::from_bool(l > r),
        BinaryOperator::Lte => Value::from_bool(l <= r),
        BinaryOperator::Gte => Value::from_bool(l >= r),
        BinaryOperator::And => Value::from_bool(l != 0.0 && r != 0.0),
        BinaryOperator::Or => Value::from_bool(l != 0.0 || r != 0.0),
    };
    Ok(value)
}

fn apply_unary(op: UnaryOperator, value: &Value) -> Result<Value> {
    match op {
        UnaryOperator::Not => Ok(Value::from_bool(value.get_double_value("operator NOT")? == 0.0)),
        UnaryOperator::Neg => Ok(Value::Double(-value.get_double_value("operator -")?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse_expression;

    fn eval_text(text: &str) -> Result<Value> {
        let registry = FunctionRegistry::builtin();
        let table = SymbolTable::new(&registry, 0);
        evaluate(&parse_expression(text)?, &table)
    }

    #[test]
    fn test_literal_round_trip() {
        for d in [0.0, -1.25, 1e300, f64::MIN_POSITIVE] {
            let table = SymbolTable::new(&FunctionRegistry::new(), 0);
            let v = evaluate(&Node::Literal(Value::Double(d)), &table).unwrap();
            assert_eq!(v, Value::Double(d));
        }
        for l in [0, -7, i64::MAX, i64::MIN] {
            let table = SymbolTable::new(&FunctionRegistry::new(), 0);
            let v = evaluate(&Node::Literal(Value::Long(l)), &table).unwrap();
            assert_eq!(v, Value::Long(l));
        }
    }

    #[test]
    fn test_arithmetic_coercion() {
        assert_eq!(eval_text("2 + 3.0").unwrap(), Value::Double(5.0));
        assert_eq!(eval_text("2 + 3").unwrap(), Value::Double(5.0));
        assert_eq!(eval_text("7 = 7").unwrap(), Value::Long(1));
        assert_eq!(eval_text("5 MOD 3").unwrap(), Value::Long(2));
        assert_eq!(eval_text("7.9 % 2.2").unwrap(), Value::Long(1));
        assert_eq!(eval_text("1 AND 0").unwrap(), Value::Long(0));
        assert_eq!(eval_text("NOT 0 OR 0").unwrap(), Value::Long(1));
        assert_eq!(eval_text("-(1 + 1)").unwrap(), Value::Double(-2.0));
        assert_eq!(eval_text("-(2)").unwrap(), Value::Long(-2));
    }

    #[test]
    fn test_operator_errors() {
        assert!(matches!(eval_text("1 / 0"), Err(Error::DivisionByZero)));
        assert!(matches!(eval_text("1 MOD 0"), Err(Error::DivisionByZero)));
        assert!(matches!(
            eval_text("'a' + 1"),
            Err(Error::ArgType { .. })
        ));
    }

    #[test]
    fn test_unknown_symbols() {
        assert!(matches!(eval_text("x + 1"), Err(Error::UnknownSymbol(_))));
        assert!(matches!(eval_text("nope(1)"), Err(Error::UnknownSymbol(_))));
    }

    #[test]
    fn test_arity_enforcement() {
        assert!(matches!(eval_text("oph_id(1)"), Err(Error::ArgCount { .. })));
        assert!(matches!(
            eval_text("oph_id(1, 2, 3)"),
            Err(Error::ArgCount { .. })
        ));
        assert_eq!(eval_text("oph_id(5, 2)").unwrap(), Value::Long(3));
        assert!(matches!(
            eval_text("oph_id_to_index(1)"),
            Err(Error::ArgCount { .. })
        ));
        assert!(eval_text("oph_id_to_index(1, 2)").is_ok());
        assert!(eval_text("oph_id_to_index(1, 2, 3)").is_ok());
    }

    #[test]
    fn test_variables_resolve_through_table() {
        let registry = FunctionRegistry::builtin();
        let mut table = SymbolTable::new(&registry, 2);
        table.add_double("f.v", 20.0).unwrap();
        table.add_long("?1", 15).unwrap();
        let node = parse_expression("f.v > ?1").unwrap();
        assert_eq!(evaluate(&node, &table).unwrap(), Value::Long(1));
    }

    #[test]
    fn test_group_evaluator_suppresses_until_last_row() {
        let registry = FunctionRegistry::builtin();
        let node = parse_expression("oph_sum(v) * 2").unwrap();
        let mut eval = GroupEvaluator::new(&node, &registry);
        assert!(eval.is_aggregating());

        let mut outputs = Vec::new();
        for group in [vec![1.0, 2.0], vec![10.0]] {
            eval.notify_group_boundary();
            for (i, v) in group.iter().enumerate() {
                let mut table = SymbolTable::new(&registry, 1);
                table.add_double("v", *v).unwrap();
                eval.set_last_row(i + 1 == group.len());
                outputs.push(eval.evaluate_row(&table).unwrap());
            }
        }

        assert_eq!(
            outputs,
            vec![
                Emission::Suppressed,
                Emission::Emit(Value::Double(6.0)),
                Emission::Emit(Value::Double(20.0)),
            ]
        );
    }

    #[test]
    fn test_scalar_expression_emits_every_row() {
        let registry = FunctionRegistry::builtin();
        let node = parse_expression("oph_id(id, 2)").unwrap();
        let mut eval = GroupEvaluator::new(&node, &registry);
        assert!(!eval.is_aggregating());

        let mut table = SymbolTable::new(&registry, 1);
        table.add_long("id", 3).unwrap();
        eval.set_last_row(false);
        assert_eq!(
            eval.evaluate_row(&table).unwrap(),
            Emission::Emit(Value::Long(2))
        );
    }

    #[test]
    fn test_aggregate_sites_accumulate_separately() {
        let registry = FunctionRegistry::builtin();
        let node = parse_expression("oph_max(v) - oph_min(v) + oph_count(v)").unwrap();
        let mut eval = GroupEvaluator::new(&node, &registry);
        eval.notify_group_boundary();

        let values = [3.0, 1.0, 7.0];
        let mut last = Emission::Suppressed;
        for (i, v) in values.iter().enumerate() {
            let mut table = SymbolTable::new(&registry, 1);
            table.add_double("v", *v).unwrap();
            eval.set_last_row(i + 1 == values.len());
            last = eval.evaluate_row(&table).unwrap();
        }
        assert_eq!(last, Emission::Emit(Value::Double(9.0)));
    }

    #[test]
    fn test_nested_aggregate_is_rejected() {
        let registry = FunctionRegistry::builtin();
        let node = parse_expression("oph_sum(oph_max(v))").unwrap();
        let mut eval = GroupEvaluator::new(&node, &registry);
        let mut table = SymbolTable::new(&registry, 1);
        table.add_double("v", 1.0).unwrap();
        eval.set_last_row(false);
        assert!(eval.evaluate_row(&table).is_err());
    }
}

//! Expression Abstract Syntax Tree
//!
//! Nodes own their children; dropping the root frees the whole tree.

use super::value::Value;

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Constant value
    Literal(Value),
    /// Free variable, resolved through the symbol table
    Variable(String),
    /// Function call with arguments in source order
    FunctionCall { name: String, args: Vec<Node> },
    /// Binary operation
    BinaryOp {
        left: Box<Node>,
        op: BinaryOperator,
        right: Box<Node>,
    },
    /// Unary operation
    UnaryOp { op: UnaryOperator, expr: Box<Node> },
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Mul,
    Div,
    Add,
    Sub,
    Mod,
    // Comparison
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    // Logical
    And,
    Or,
}

impl BinaryOperator {
    /// True for operators that yield a Double
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Add | BinaryOperator::Sub
        )
    }

    /// Operator symbol used in error messages
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mod => "MOD",
            BinaryOperator::Eq => "=",
            BinaryOperator::Neq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Lte => "<=",
            BinaryOperator::Gte => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
        }
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// Logical NOT
    Not,
    /// Arithmetic negation
    Neg,
}

impl Node {
    /// Convenience constructor for a binary node
    pub fn binary(left: Node, op: BinaryOperator, right: Node) -> Self {
        Node::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Convenience constructor for a variable node
    pub fn var(name: impl Into<String>) -> Self {
        Node::Variable(name.into())
    }

    /// Collect distinct variable names in first-appearance order
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Node::Literal(_) => {}
            Node::Variable(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Node::FunctionCall { args, .. } => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
            Node::BinaryOp { left, right, .. } => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
            Node::UnaryOp { expr, .. } => expr.collect_variables(out),
        }
    }

    /// Visit every function call name, outermost first
    pub fn function_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_functions(&mut out);
        out
    }

    fn collect_functions<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Node::Literal(_) | Node::Variable(_) => {}
            Node::FunctionCall { name, args } => {
                out.push(name);
                for arg in args {
                    arg.collect_functions(out);
                }
            }
            Node::BinaryOp { left, right, .. } => {
                left.collect_functions(out);
                right.collect_functions(out);
            }
            Node::UnaryOp { expr, .. } => expr.collect_functions(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variables_are_deduplicated() {
        // a + oph_id(a, b)
        let node = Node::binary(
            Node::var("a"),
            BinaryOperator::Add,
            Node::FunctionCall {
                name: "oph_id".to_string(),
                args: vec![Node::var("a"), Node::var("b")],
            },
        );
        assert_eq!(node.variables(), vec!["a", "b"]);
        assert_eq!(node.function_names(), vec!["oph_id"]);
    }
}

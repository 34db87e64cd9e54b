//! Function registry
//!
//! Built-in functions are registered once when the engine starts. Every
//! descriptor carries its implementation as a function pointer, so a declared
//! function without a body cannot be built.

use indexmap::IndexMap;
use std::fmt;

use super::value::Value;
use crate::error::{Error, Result};

/// Argument-count rule of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many arguments
    Fixed(usize),
    /// At least this many arguments
    Variadic(usize),
}

impl Arity {
    /// Validate an argument count against this rule
    pub fn check(&self, name: &str, given: usize) -> Result<()> {
        let ok = match *self {
            Arity::Fixed(n) => given == n,
            Arity::Variadic(min) => given >= min,
        };
        if ok {
            return Ok(());
        }
        let required = match *self {
            Arity::Fixed(n) => n.to_string(),
            Arity::Variadic(min) => format!("at least {}", min),
        };
        Err(Error::ArgCount {
            name: name.to_string(),
            required,
            given,
        })
    }
}

/// Per-row function body
pub type ScalarFn = fn(&[Value]) -> Result<Value>;

/// Running state of one aggregate call site
pub trait Accumulator: Send {
    /// Feed one row's arguments
    fn update(&mut self, args: &[Value]) -> Result<()>;
    /// Produce the rolled-up value and reset for the next group
    fn finish(&mut self) -> Result<Value>;
}

/// Creates a fresh accumulator
pub type AccumulatorFactory = fn() -> Box<dyn Accumulator>;

/// How a function produces output
#[derive(Clone, Copy)]
pub enum FunctionKind {
    /// One output per row
    Scalar(ScalarFn),
    /// One output per group
    Aggregate(AccumulatorFactory),
}

impl fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Scalar(_) => write!(f, "Scalar"),
            FunctionKind::Aggregate(_) => write!(f, "Aggregate"),
        }
    }
}

/// Function descriptor stored in the symbol table
#[derive(Debug, Clone, Copy)]
pub struct FunctionDef {
    pub name: &'static str,
    pub arity: Arity,
    pub kind: FunctionKind,
}

impl FunctionDef {
    pub const fn scalar(name: &'static str, arity: Arity, body: ScalarFn) -> Self {
        Self {
            name,
            arity,
            kind: FunctionKind::Scalar(body),
        }
    }

    pub const fn aggregate(name: &'static str, arity: Arity, factory: AccumulatorFactory) -> Self {
        Self {
            name,
            arity,
            kind: FunctionKind::Aggregate(factory),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, FunctionKind::Aggregate(_))
    }
}

/// Registered functions, in registration order
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: IndexMap<&'static str, FunctionDef>,
}

impl FunctionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in function
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for def in BUILTINS {
            // Names in BUILTINS are distinct
            registry.functions.insert(def.name, *def);
        }
        registry
    }

    /// Add a function; names must be unique
    pub fn register(&mut self, def: FunctionDef) -> Result<()> {
        if self.functions.contains_key(def.name) {
            return Err(Error::exec(format!(
                "function '{}' is already registered",
                def.name
            )));
        }
        self.functions.insert(def.name, def);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionDef> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

const BUILTINS: &[FunctionDef] = &[
    FunctionDef::scalar("oph_id", Arity::Fixed(2), oph_id),
    FunctionDef::scalar("oph_id2", Arity::Fixed(3), oph_id2),
    FunctionDef::scalar("oph_id_to_index", Arity::Variadic(2), oph_id_to_index),
    FunctionDef::scalar("oph_id_to_index2", Arity::Fixed(3), oph_id_to_index2),
    FunctionDef::scalar("oph_is_in_subset", Arity::Fixed(4), oph_is_in_subset),
    FunctionDef::aggregate("oph_count", Arity::Fixed(1), Count::boxed),
    FunctionDef::aggregate("oph_sum", Arity::Fixed(1), Sum::boxed),
    FunctionDef::aggregate("oph_avg", Arity::Fixed(1), Avg::boxed),
    FunctionDef::aggregate("oph_min", Arity::Fixed(1), Extreme::boxed_min),
    FunctionDef::aggregate("oph_max", Arity::Fixed(1), Extreme::boxed_max),
];

// ========== Tile mapping ==========

fn positive(value: &Value, func: &str, what: &str) -> Result<i64> {
    let v = value.get_long_value(func)?;
    if v <= 0 {
        return Err(Error::exec(format!("{}: {} must be positive", func, what)));
    }
    Ok(v)
}

fn overflow(func: &str) -> Error {
    Error::exec(format!("{}: integer overflow", func))
}

/// Zero-based position of a 1-based identifier
fn zero_based(id: i64, func: &str) -> Result<i64> {
    id.checked_sub(1).ok_or_else(|| overflow(func))
}

/// Block number containing `id` when ids are grouped by `size`
fn oph_id(args: &[Value]) -> Result<Value> {
    let id = args[0].get_long_value("oph_id")?;
    let size = positive(&args[1], "oph_id", "size")?;
    Ok(Value::Long(zero_based(id, "oph_id")? / size + 1))
}

/// Id after collapsing a middle extent of length `size` above blocks of `block`
fn oph_id2(args: &[Value]) -> Result<Value> {
    let id = args[0].get_long_value("oph_id2")?;
    let size = positive(&args[1], "oph_id2", "size")?;
    let block = positive(&args[2], "oph_id2", "block")?;
    let zero = zero_based(id, "oph_id2")?;
    let extent = size.checked_mul(block).ok_or_else(|| overflow("oph_id2"))?;
    (zero / extent)
        .checked_mul(block)
        .and_then(|v| v.checked_add(zero % block + 1))
        .map(Value::Long)
        .ok_or_else(|| overflow("oph_id2"))
}

/// 1-based index along an extent of `size` whose inner block is `block`
fn oph_id_to_index2(args: &[Value]) -> Result<Value> {
    let id = args[0].get_long_value("oph_id_to_index2")?;
    let block = positive(&args[1], "oph_id_to_index2", "block")?;
    let size = positive(&args[2], "oph_id_to_index2", "size")?;
    Ok(Value::Long((zero_based(id, "oph_id_to_index2")? / block) % size + 1))
}

/// Mixed-radix digit of `id` for the first listed extent; later extents vary faster
fn oph_id_to_index(args: &[Value]) -> Result<Value> {
    let id = args[0].get_long_value("oph_id_to_index")?;
    let outer = positive(&args[1], "oph_id_to_index", "size")?;
    let mut inner: i64 = 1;
    for arg in &args[2..] {
        inner = inner
            .checked_mul(positive(arg, "oph_id_to_index", "size")?)
            .ok_or_else(|| Error::exec("oph_id_to_index: extent product overflows"))?;
    }
    Ok(Value::Long((zero_based(id, "oph_id_to_index")? / inner) % outer + 1))
}

/// 1 when `id` lies on the lattice start, start+step, ... up to end
fn oph_is_in_subset(args: &[Value]) -> Result<Value> {
    let id = args[0].get_long_value("oph_is_in_subset")?;
    let start = args[1].get_long_value("oph_is_in_subset")?;
    let step = positive(&args[2], "oph_is_in_subset", "step")?;
    let end = args[3].get_long_value("oph_is_in_subset")?;
    if id < start || id > end {
        return Ok(Value::from_bool(false));
    }
    let offset = id
        .checked_sub(start)
        .ok_or_else(|| overflow("oph_is_in_subset"))?;
    Ok(Value::from_bool(offset % step == 0))
}

// ========== Aggregates ==========

#[derive(Default)]
struct Count {
    rows: i64,
}

impl Count {
    fn boxed() -> Box<dyn Accumulator> {
        Box::<Count>::default()
    }
}

impl Accumulator for Count {
    fn update(&mut self, _args: &[Value]) -> Result<()> {
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<Value> {
        Ok(Value::Long(std::mem::take(&mut self.rows)))
    }
}

#[derive(Default)]
struct Sum {
    total: f64,
}

impl Sum {
    fn boxed() -> Box<dyn Accumulator> {
        Box::<Sum>::default()
    }
}

impl Accumulator for Sum {
    fn update(&mut self, args: &[Value]) -> Result<()> {
        self.total += args[0].get_double_value("oph_sum")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<Value> {
        Ok(Value::Double(std::mem::take(&mut self.total)))
    }
}

#[derive(Default)]
struct Avg {
    total: f64,
    rows: u64,
}

impl Avg {
    fn boxed() -> Box<dyn Accumulator> {
        Box::<Avg>::default()
    }
}

impl Accumulator for Avg {
    fn update(&mut self, args: &[Value]) -> Result<()> {
        self.total += args[0].get_double_value("oph_avg")?;
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<Value> {
        if self.rows == 0 {
            return Err(Error::exec("oph_avg: empty group"));
        }
        let avg = self.total / self.rows as f64;
        *self = Avg::default();
        Ok(Value::Double(avg))
    }
}

struct Extreme {
    current: Option<f64>,
    want_max: bool,
}

impl Extreme {
    fn boxed_min() -> Box<dyn Accumulator> {
        Box::new(Extreme {
            current: None,
            want_max: false,
        })
    }

    fn boxed_max() -> Box<dyn Accumulator> {
        Box::new(Extreme {
            current: None,
            want_max: true,
        })
    }
}

impl Accumulator for Extreme {
    fn update(&mut self, args: &[Value]) -> Result<()> {
        let context = if self.want_max { "oph_max" } else { "oph_min" };
        let v = args[0].get_double_value(context)?;
        self.current = Some(match self.current {
            None => v,
            Some(c) if self.want_max => c.max(v),
            Some(c) => c.min(v),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<Value> {
        self.current
            .take()
            .map(Value::Double)
            .ok_or_else(|| Error::exec("oph_min/oph_max: empty group"))
    }
}

//! Symbol table
//!
//! A fixed-capacity registry of names bound either to a variable value or to
//! a function descriptor. Capacity is `builtin functions + additional_size`
//! and never grows; callers size `additional_size` for the variables they
//! are about to bind.

use bytes::Bytes;
use indexmap::IndexMap;

use super::functions::{FunctionDef, FunctionRegistry};
use super::value::Value;
use crate::error::{Error, Result};

/// One slot of the table
#[derive(Debug, Clone)]
pub enum Symbol {
    Variable(Value),
    Function(FunctionDef),
}

/// Name -> symbol registry with a hard capacity
#[derive(Debug, Clone)]
pub struct SymbolTable {
    slots: IndexMap<String, Symbol>,
    capacity: usize,
}

impl SymbolTable {
    /// Create a table pre-loaded with every registered function plus
    /// `additional_size` free slots
    pub fn new(registry: &FunctionRegistry, additional_size: usize) -> Self {
        let capacity = registry.len() + additional_size;
        let mut slots = IndexMap::with_capacity(capacity);
        for def in registry.iter() {
            slots.insert(def.name.to_string(), Symbol::Function(*def));
        }
        Self { slots, capacity }
    }

    /// Bind or update a variable
    pub fn add_variable(&mut self, name: &str, value: Value) -> Result<()> {
        if let Some(slot) = self.slots.get_mut(name) {
            return match slot {
                Symbol::Variable(v) => {
                    *v = value;
                    Ok(())
                }
                Symbol::Function(_) => Err(Error::exec(format!(
                    "'{}' names a function and cannot be rebound",
                    name
                ))),
            };
        }

        if self.slots.len() >= self.capacity {
            return Err(Error::SymtableFull(self.capacity));
        }
        self.slots.insert(name.to_string(), Symbol::Variable(value));
        Ok(())
    }

    pub fn add_double(&mut self, name: &str, value: f64) -> Result<()> {
        self.add_variable(name, Value::Double(value))
    }

    pub fn add_long(&mut self, name: &str, value: i64) -> Result<()> {
        self.add_variable(name, Value::Long(value))
    }

    pub fn add_string(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        self.add_variable(name, Value::Str(value.into()))
    }

    pub fn add_binary(&mut self, name: &str, value: Bytes) -> Result<()> {
        self.add_variable(name, Value::Binary(value))
    }

    /// Look up a bound variable
    pub fn lookup_variable(&self, name: &str) -> Result<&Value> {
        match self.slots.get(name) {
            Some(Symbol::Variable(v)) => Ok(v),
            _ => Err(Error::UnknownSymbol(name.to_string())),
        }
    }

    /// Look up a function
    pub fn lookup_function(&self, name: &str) -> Result<&FunctionDef> {
        match self.slots.get(name) {
            Some(Symbol::Function(f)) => Ok(f),
            _ => Err(Error::UnknownSymbol(name.to_string())),
        }
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_fixed() {
        let registry = FunctionRegistry::builtin();
        let mut table = SymbolTable::new(&registry, 2);
        assert_eq!(table.capacity(), registry.len() + 2);

        table.add_long("a", 1).unwrap();
        table.add_double("b", 2.0).unwrap();
        assert!(matches!(
            table.add_string("c", "x"),
            Err(Error::SymtableFull(_))
        ));
        // Updating an existing name needs no free slot
        table.add_long("a", 5).unwrap();
        assert_eq!(table.lookup_variable("a").unwrap(), &Value::Long(5));
    }

    #[test]
    fn test_zero_headroom() {
        let registry = FunctionRegistry::builtin();
        let mut table = SymbolTable::new(&registry, 0);
        assert_eq!(table.len(), registry.len());
        assert!(matches!(
            table.add_long("x", 1),
            Err(Error::SymtableFull(_))
        ));
    }

    #[test]
    fn test_functions_and_variables_do_not_mix() {
        let registry = FunctionRegistry::builtin();
        let mut table = SymbolTable::new(&registry, 1);
        table.add_binary("?1", Bytes::from_static(b"\x01\x02")).unwrap();

        assert!(table.lookup_function("oph_id").is_ok());
        assert!(matches!(
            table.lookup_variable("oph_id"),
            Err(Error::UnknownSymbol(_))
        ));
        assert!(matches!(
            table.lookup_function("?1"),
            Err(Error::UnknownSymbol(_))
        ));
        assert!(table.add_long("oph_id", 3).is_err());
    }
}

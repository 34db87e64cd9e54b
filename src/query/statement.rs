//! Running statements
//!
//! CREATE-FRAGMENT opens a statement that collects rows over a declared
//! number of INSERT/MULTI-INSERT runs. The terminal run hands back the
//! finished fragment for storage.

use tracing::debug;

use crate::error::{Error, Result};
use crate::fragment::{Fragment, Record, Schema};

/// A fragment under construction
#[derive(Debug)]
pub struct RunningStatement {
    db: String,
    device: Option<String>,
    fragment: Fragment,
    total_runs: usize,
    current_run: usize,
    size_bytes: usize,
    carried_rows: usize,
}

impl RunningStatement {
    /// Open a statement expecting `total_runs` insert runs
    pub fn open(
        db: impl Into<String>,
        name: impl Into<String>,
        device: Option<String>,
        schema: Schema,
        total_runs: usize,
    ) -> Self {
        Self {
            db: db.into(),
            device,
            fragment: Fragment::new(name, schema),
            total_runs,
            current_run: 0,
            size_bytes: 0,
            carried_rows: 0,
        }
    }

    pub fn db(&self) -> &str {
        &self.db
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn frag_name(&self) -> &str {
        self.fragment.name()
    }

    pub fn schema(&self) -> &Schema {
        self.fragment.schema()
    }

    pub fn total_runs(&self) -> usize {
        self.total_runs
    }

    pub fn current_run(&self) -> usize {
        self.current_run
    }

    /// Encoded bytes accumulated so far
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Rows carried over from earlier runs
    pub fn carried_rows(&self) -> usize {
        self.carried_rows
    }

    /// Whether the statement is complete without further runs
    pub fn is_complete(&self) -> bool {
        self.current_run >= self.total_runs
    }

    /// Append one run's records; returns true when this run was terminal
    pub fn append(&mut self, records: Vec<Record>, final_statement: bool) -> Result<bool> {
        if self.is_complete() {
            return Err(Error::exec(format!(
                "statement for '{}' already received its {} run(s)",
                self.fragment.name(),
                self.total_runs
            )));
        }

        self.current_run += 1;
        let terminal = final_statement || self.current_run == self.total_runs;
        if terminal {
            // The final size is known now
            self.fragment.reserve_exact(records.len());
        }

        for record in records {
            self.size_bytes += record.size_bytes();
            self.fragment.push_record(record)?;
        }
        self.carried_rows = self.fragment.row_count();

        debug!(
            frag = self.fragment.name(),
            run = self.current_run,
            total_runs = self.total_runs,
            rows = self.carried_rows,
            bytes = self.size_bytes,
            terminal,
            "statement run appended"
        );
        Ok(terminal)
    }

    /// Consume the statement and return the built fragment
    pub fn finish(self) -> Fragment {
        self.fragment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Value;
    use crate::fragment::FieldType;

    fn record(id: i64) -> Record {
        Record::from_values(&[Value::Long(id)], &[FieldType::Long]).unwrap()
    }

    #[test]
    fn test_runs_until_terminal() {
        let schema = Schema::from_pairs([("id", FieldType::Long)]);
        let mut stmt = RunningStatement::open("db", "f", None, schema, 2);

        assert!(!stmt.append(vec![record(1), record(2)], false).unwrap());
        assert_eq!(stmt.carried_rows(), 2);
        assert!(stmt.append(vec![record(3)], false).unwrap());
        assert_eq!(stmt.size_bytes(), 24);
        assert!(stmt.append(vec![record(4)], false).is_err());

        let frag = stmt.finish();
        assert_eq!(frag.ids().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_final_statement_flag_ends_early() {
        let schema = Schema::from_pairs([("id", FieldType::Long)]);
        let mut stmt = RunningStatement::open("db", "f", Some("mem".into()), schema, 5);
        assert!(stmt.append(vec![record(1)], true).unwrap());
        assert_eq!(stmt.device(), Some("mem"));
        assert_eq!(stmt.finish().row_count(), 1);
    }

    #[test]
    fn test_rejects_wrong_width() {
        let schema = Schema::from_pairs([("id", FieldType::Long), ("v", FieldType::Real)]);
        let mut stmt = RunningStatement::open("db", "f", None, schema, 1);
        assert!(stmt.append(vec![record(1)], false).is_err());
    }
}

//! Fragment producers
//!
//! A producer builds a fragment from an external source for
//! `create_frag_from_file`. Producers are registered by name on the engine.

use bytes::{BufMut, BytesMut};
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{Error, Result};
use crate::expr::Value;
use crate::fragment::{Field, FieldType, Fragment, Schema};

/// Descriptor of one dimension of the source array
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionDescriptor {
    pub dim_type: String,
    pub index: usize,
    /// 1-based, inclusive
    pub start: i64,
    /// 1-based, inclusive; 0 means up to the end
    pub end: i64,
}

/// Everything a producer needs to build a fragment
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerRequest {
    pub src_path: PathBuf,
    pub measure: String,
    /// Maximum number of rows to produce
    pub nrows: Option<usize>,
    /// Identifier of the first produced row
    pub id_start: i64,
    pub dims: Vec<DimensionDescriptor>,
}

/// Source of externally produced fragments
pub trait FragmentProducer: Send + Sync {
    fn produce(&self, request: &ProducerRequest) -> Result<Fragment>;
}

/// Reads a text file with one row of numbers per line
///
/// Each line becomes one row `(id_dim, <measure>)` where the measure is the
/// line's numbers packed as little-endian `f64` in a BLOB. An explicit
/// dimension descriptor restricts the columns kept from each line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextProducer;

impl FragmentProducer for TextProducer {
    fn produce(&self, request: &ProducerRequest) -> Result<Fragment> {
        let text = fs::read_to_string(&request.src_path)?;
        let schema = Schema::from_fields(vec![
            Field::new("id_dim", FieldType::Long, 0).identifier(true),
            Field::new(request.measure.clone(), FieldType::Blob, 1),
        ]);
        let mut frag = Fragment::new(request.measure.clone(), schema);

        let lines = text.lines().filter(|l| !l.trim().is_empty());
        let limit = request.nrows.unwrap_or(usize::MAX);
        for (i, line) in lines.take(limit).enumerate() {
            let numbers = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
                .map(|t| {
                    t.parse::<f64>().map_err(|_| {
                        Error::Api(format!("line {}: '{}' is not a number", i + 1, t))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let kept = select_columns(&numbers, request.dims.first())?;
            let mut packed = BytesMut::with_capacity(kept.len() * 8);
            for v in kept {
                packed.put_f64_le(*v);
            }
            frag.push_values(&[
                Value::Long(request.id_start + i as i64),
                Value::Binary(packed.freeze()),
            ])?;
        }

        if let Some(n) = request.nrows {
            if frag.row_count() < n {
                return Err(Error::Api(format!(
                    "'{}' holds {} rows, {} requested",
                    request.src_path.display(),
                    frag.row_count(),
                    n
                )));
            }
        }

        debug!(
            src = %request.src_path.display(),
            rows = frag.row_count(),
            "text source imported"
        );
        Ok(frag)
    }
}

fn select_columns<'a>(numbers: &'a [f64], dim: Option<&DimensionDescriptor>) -> Result<&'a [f64]> {
    let dim = match dim {
        Some(d) => d,
        None => return Ok(numbers),
    };
    let start = dim.start.max(1) as usize;
    let end = if dim.end <= 0 {
        numbers.len()
    } else {
        dim.end as usize
    };
    if start > end || end > numbers.len() {
        return Err(Error::Api(format!(
            "dimension range {}..{} outside 1..{}",
            start,
            end,
            numbers.len()
        )));
    }
    Ok(&numbers[start - 1..end])
}

//! Query argument surface
//!
//! A query is a `key=value;key=value;...` string. A value may hold several
//! entries separated by `|`; quoted text (`'...'` or `"..."`) is kept intact
//! by both separators. Positional binary arguments travel alongside the query
//! and are referenced from expressions as `?1`, `?2`, ...

use bytes::Bytes;
use indexmap::IndexMap;
use nom::{
    branch::alt,
    bytes::complete::{is_not, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, opt, recognize},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, separated_pair, terminated},
    IResult,
};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::expr::Value;

/// Keys understood by the dispatcher
pub const KNOWN_KEYS: &[&str] = &[
    "operation",
    "frag_name",
    "db_name",
    "device",
    "field",
    "field_type",
    "field_alias",
    "value",
    "from",
    "from_alias",
    "where",
    "group",
    "order",
    "limit",
    "sequential_id",
    "run",
    "final_statement",
    "src_path",
    "measure",
    "nrows",
    "id_start",
    "dim_type",
    "dim_index",
    "dim_start",
    "dim_end",
    "producer",
];

/// Operations accepted by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateDb,
    DropDb,
    CreateFrag,
    Insert,
    MultiInsert,
    CreateFragSelect,
    CreateFragFromFile,
    Select,
    DropFrag,
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "create_db" => Ok(Operation::CreateDb),
            "drop_db" => Ok(Operation::DropDb),
            "create_frag" => Ok(Operation::CreateFrag),
            "insert" => Ok(Operation::Insert),
            "multi_insert" => Ok(Operation::MultiInsert),
            "create_frag_select" => Ok(Operation::CreateFragSelect),
            "create_frag_from_file" => Ok(Operation::CreateFragFromFile),
            "select" => Ok(Operation::Select),
            "drop_frag" => Ok(Operation::DropFrag),
            other => Err(Error::ParseError(format!("unknown operation '{}'", other))),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::CreateDb => "create_db",
            Operation::DropDb => "drop_db",
            Operation::CreateFrag => "create_frag",
            Operation::Insert => "insert",
            Operation::MultiInsert => "multi_insert",
            Operation::CreateFragSelect => "create_frag_select",
            Operation::CreateFragFromFile => "create_frag_from_file",
            Operation::Select => "select",
            Operation::DropFrag => "drop_frag",
        };
        write!(f, "{}", name)
    }
}

// ========== Grammar ==========

fn key(input: &str) -> IResult<&str, &str> {
    delimited(
        multispace0,
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        multispace0,
    )(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(delimited(char('\''), opt(is_not("'")), char('\''))),
        recognize(delimited(char('"'), opt(is_not("\"")), char('"'))),
    ))(input)
}

fn value(input: &str) -> IResult<&str, &str> {
    recognize(many0(alt((quoted, is_not(";'\"")))))(input)
}

fn pair(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(key, char('='), value)(input)
}

fn pairs(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    all_consuming(terminated(
        separated_list0(char(';'), pair),
        terminated(opt(char(';')), multispace0),
    ))(input)
}

fn multi_entry(input: &str) -> IResult<&str, &str> {
    recognize(many0(alt((quoted, is_not("|'\"")))))(input)
}

fn multi_values(input: &str) -> IResult<&str, Vec<&str>> {
    all_consuming(separated_list1(char('|'), multi_entry))(input)
}

/// Split a multi-value on `|`, keeping quoted sections whole
pub fn split_multi(text: &str) -> Result<Vec<String>> {
    let (_, parts) = multi_values(text)
        .map_err(|e| Error::ParseError(format!("malformed multi-value '{}': {}", text, e)))?;
    Ok(parts.into_iter().map(|p| p.trim().to_string()).collect())
}

/// Parsed `key=value` arguments of one query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryArgs {
    entries: IndexMap<String, String>,
}

impl QueryArgs {
    /// Parse a query string
    pub fn parse(text: &str) -> Result<Self> {
        let (_, parsed) = pairs(text)
            .map_err(|e| Error::ParseError(format!("malformed query '{}': {}", text, e)))?;

        let mut entries = IndexMap::with_capacity(parsed.len());
        for (k, v) in parsed {
            let k = k.to_lowercase();
            if !KNOWN_KEYS.contains(&k.as_str()) {
                return Err(Error::ParseError(format!("unknown query key '{}'", k)));
            }
            if entries.insert(k.clone(), v.trim().to_string()).is_some() {
                return Err(Error::ParseError(format!("duplicate query key '{}'", k)));
            }
        }
        Ok(Self { entries })
    }

    /// Raw value of `key`, treating an empty value as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Value of a mandatory key
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| Error::NullParam(key.to_string()))
    }

    /// `|`-separated entries of `key` (empty when absent)
    pub fn multi(&self, key: &str) -> Result<Vec<String>> {
        match self.get(key) {
            Some(v) => split_multi(v),
            None => Ok(Vec::new()),
        }
    }

    /// `|`-separated entries of a mandatory key
    pub fn require_multi(&self, key: &str) -> Result<Vec<String>> {
        split_multi(self.require(key)?)
    }

    /// Integer value of `key`
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.get(key)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| Error::ParseError(format!("'{}' must be an integer, got '{}'", key, v)))
            })
            .transpose()
    }

    /// Non-negative integer value of `key`
    pub fn get_usize(&self, key: &str) -> Result<Option<usize>> {
        self.get(key)
            .map(|v| {
                v.parse::<usize>().map_err(|_| {
                    Error::ParseError(format!("'{}' must be a non-negative integer, got '{}'", key, v))
                })
            })
            .transpose()
    }

    /// Boolean flag: `yes`, `true` or `1`
    pub fn flag(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(|v| v.to_lowercase()).as_deref(),
            Some("yes" | "true" | "1")
        )
    }

    /// The `operation` key
    pub fn operation(&self) -> Result<Operation> {
        self.require("operation")?.parse()
    }
}

/// Typed positional argument
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryArg {
    Long(i64),
    Double(f64),
    Varchar(String),
    Blob(Bytes),
    Null,
}

impl BinaryArg {
    /// Convert into an expression value
    pub fn to_value(&self, position: usize) -> Result<Value> {
        match self {
            BinaryArg::Long(v) => Ok(Value::Long(*v)),
            BinaryArg::Double(v) => Ok(Value::Double(*v)),
            BinaryArg::Varchar(s) => Ok(Value::Str(s.clone())),
            BinaryArg::Blob(b) => Ok(Value::Binary(b.clone())),
            BinaryArg::Null => Err(Error::exec(format!("argument ?{} is null", position))),
        }
    }

    /// Parse a `type:payload|type:payload|...` list
    ///
    /// Types are `long`, `double`, `varchar`, `blob` (hex payload) and the
    /// bare word `null`.
    pub fn parse_list(text: &str) -> Result<Vec<BinaryArg>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        split_multi(text)?
            .iter()
            .map(|item| BinaryArg::parse_one(item))
            .collect()
    }

    fn parse_one(item: &str) -> Result<BinaryArg> {
        if item.eq_ignore_ascii_case("null") {
            return Ok(BinaryArg::Null);
        }
        let (ty, payload) = item
            .split_once(':')
            .ok_or_else(|| Error::ParseError(format!("binary argument '{}' has no type", item)))?;
        let bad = || Error::ParseError(format!("invalid {} argument '{}'", ty, payload));
        match ty.trim().to_lowercase().as_str() {
            "long" => payload.trim().parse().map(BinaryArg::Long).map_err(|_| bad()),
            "double" => payload.trim().parse().map(BinaryArg::Double).map_err(|_| bad()),
            "varchar" => Ok(BinaryArg::Varchar(unquote(payload).to_string())),
            "blob" => decode_hex(payload.trim())
                .map(|b| BinaryArg::Blob(Bytes::from(b)))
                .ok_or_else(bad),
            other => Err(Error::ParseError(format!("unknown argument type '{}'", other))),
        }
    }
}

/// Strip one layer of matching quotes
pub fn unquote(text: &str) -> &str {
    let t = text.trim();
    for q in ['\'', '"'] {
        if t.len() >= 2 && t.starts_with(q) && t.ends_with(q) {
            return &t[1..t.len() - 1];
        }
    }
    t
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

//! Query execution module
//!
//! This module contains the shared engine context, the per-connection
//! session dispatcher and the fragment producer interface.

pub mod context;
pub mod executor;
pub mod producer;

pub use context::EngineContext;
pub use executor::{QueryResult, Session};
pub use producer::{DimensionDescriptor, FragmentProducer, ProducerRequest, TextProducer};

#![deny(warnings)]

//! Core domain models and invariants for fence quoting.
//!
//! This crate defines the serializable catalog (units, materials, products,
//! variation groups and options), quotes with their product entries and rate
//! configurations, the calculated-quote records produced by pricing, and
//! validation helpers that guard the invariants pricing relies on.

pub mod calculated;
pub mod catalog;
pub mod ids;
pub mod materialized;
pub mod model;
pub mod quote;
pub mod validate;

pub use calculated::*;
pub use catalog::*;
pub use ids::*;
pub use materialized::*;
pub use model::*;
pub use quote::*;
pub use validate::*;

use thiserror::Error;

/// Failure to parse a stored enum value.
#[derive(Debug, Error, PartialEq)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

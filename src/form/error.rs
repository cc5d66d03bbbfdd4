//! Form engine errors.
//!
//! These are usage errors: returned synchronously, never retried.
//! Validation failures are values ([`FieldError`](super::validation::FieldError))
//! and never show up here.

use thiserror::Error;

use crate::form::value::Path;
use crate::platform::view_state::StoreError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("cannot assign a tracked node directly, create a copy instead")]
    TrackedNode,

    #[error("expected an object or array, found {found}")]
    NotContainer { found: &'static str },

    #[error("{path} is not an array")]
    NotAnArray { path: String },

    #[error("invalid array index {key:?} at {path}")]
    InvalidIndex { path: String, key: String },

    #[error("unknown node")]
    UnknownNode,

    #[error("assignment would make a node its own descendant")]
    Cycle,

    #[error("no container at {path}")]
    MissingPath { path: String },
}

#[derive(Error, Debug)]
pub enum FormError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("no field registered at {path}")]
    UnknownField { path: Path },

    #[error("view state store failed: {0}")]
    Store(#[from] StoreError),
}

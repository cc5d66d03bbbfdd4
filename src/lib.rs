//! Reactive data binding for UI components.
//!
//! - [`form`]: a path-addressable data tree, fields with debounced
//!   validation, and the [`FormContext`](form::FormContext) tying them
//!   together.
//! - [`hooks`]: observables, eager state, singletons, dependency
//!   injection and async state.
//! - [`dataview`]: filtered, sorted, paged list projections.
//! - [`platform`]: the document host and view-state stores the engine
//!   talks to.
//!
//! Everything runs on one thread, driven by a [`Runtime`].

pub mod config;
pub mod dataview;
pub mod form;
pub mod hooks;
pub mod logging;
pub mod platform;
pub mod runtime;

pub use config::{ConfigError, EngineConfig};
pub use dataview::{DataView, DataViewState, SortOrder};
pub use form::{Field, FieldProps, FormContext, FormOptions, Path, Value};
pub use runtime::{Runtime, RuntimeSettings};

//! Reactive form state.
//!
//! [`DataTree`] holds the data, [`Field`]s bind slots of it to validation
//! state, and [`FormContext`] ties both together.

pub mod context;
pub mod error;
pub mod events;
pub mod field;
pub mod kinds;
pub mod tree;
pub mod validation;
pub mod value;

pub use context::{FocusFlags, FocusTarget, FormContext, FormOptions};
pub use error::{DataError, FormError};
pub use events::{DataChange, ValidateRequest, ValidationChange};
pub use field::{Field, FieldKey, FieldProps, ParentRef};
pub use kinds::{FieldKind, FieldType, PostHook};
pub use tree::{DataTree, NodeId, NodeKind};
pub use validation::{
    ErrorFormatter, FieldError, ValidateInput, ValidationError, ValidationFuture, ValidationKind, Validator,
};
pub use value::{Key, Path, Value};

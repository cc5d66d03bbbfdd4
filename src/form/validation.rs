//! Validation errors, formatters and the per-field request queue.

use std::fmt;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;

use crate::form::context::FormContext;
use crate::form::value::{Path, Value};
use crate::runtime::TimerId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValidationKind {
    Required,
    Min,
    Max,
    Pattern,
    Custom(String),
}

/// Structured validation failure. Its text is produced lazily by the
/// formatter chain, falling back to [`ValidationError::builtin_message`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub kind: ValidationKind,
    pub message: Option<String>,
    pub args: IndexMap<String, Value>,
}

impl ValidationError {
    pub fn new(kind: ValidationKind) -> Self {
        Self {
            kind,
            message: None,
            args: IndexMap::new(),
        }
    }

    pub fn required() -> Self {
        Self::new(ValidationKind::Required)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn builtin_message(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        let arg = |name: &str| {
            self.args
                .get(name)
                .map(Value::to_display_string)
                .unwrap_or_default()
        };
        match &self.kind {
            ValidationKind::Required => "This field is required".to_string(),
            ValidationKind::Min => format!("Must be at least {}", arg("min")),
            ValidationKind::Max => format!("Must be at most {}", arg("max")),
            ValidationKind::Pattern => "Invalid format".to_string(),
            ValidationKind::Custom(name) => format!("Invalid value ({name})"),
        }
    }
}

/// Turns a [`ValidationError`] into text, or declines with `None`.
pub type ErrorFormatter = Rc<dyn Fn(&ValidationError) -> Option<String>>;

/// A field's error state.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    Message(String),
    Rich(ValidationError),
}

impl FieldError {
    /// Interpret a handler's reply. Falsy values mean "valid".
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_truthy() {
            return None;
        }
        Some(Self::Message(value.to_display_string()))
    }

    pub fn as_rich(&self) -> Option<&ValidationError> {
        match self {
            Self::Rich(error) => Some(error),
            Self::Message(_) => None,
        }
    }

    /// Text for this error, asking each formatter in turn.
    pub fn message_with<'a>(&self, formatters: impl IntoIterator<Item = &'a ErrorFormatter>) -> String {
        match self {
            Self::Message(message) => message.clone(),
            Self::Rich(error) => formatters
                .into_iter()
                .find_map(|format| format(error))
                .unwrap_or_else(|| error.builtin_message()),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(message) => f.write_str(message),
            Self::Rich(error) => f.write_str(&error.builtin_message()),
        }
    }
}

impl From<&str> for FieldError {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

impl From<String> for FieldError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<ValidationError> for FieldError {
    fn from(error: ValidationError) -> Self {
        Self::Rich(error)
    }
}

pub type ValidationFuture = LocalBoxFuture<'static, Option<FieldError>>;

/// What a validator sees.
#[derive(Clone)]
pub struct ValidateInput {
    pub value: Value,
    pub name: Option<Path>,
    pub form: Option<FormContext>,
}

/// Field-level `onValidate` handler.
#[derive(Clone)]
pub struct Validator(Rc<dyn Fn(&ValidateInput) -> ValidationFuture>);

impl Validator {
    pub fn new(f: impl Fn(&ValidateInput) -> ValidationFuture + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// A validator that answers synchronously.
    pub fn sync(f: impl Fn(&ValidateInput) -> Option<FieldError> + 'static) -> Self {
        Self::new(move |input| {
            let result = f(input);
            async move { result }.boxed_local()
        })
    }

    pub fn call(&self, input: &ValidateInput) -> ValidationFuture {
        (self.0)(input)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator")
    }
}

/// What to do after a request was queued with [`ValidationLocks::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// Nothing in flight: start a run for this ticket now.
    Start(u64),
    /// A run is in flight; this request waits behind it.
    Queued,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settle {
    /// The run is current: apply its result.
    Apply,
    /// A newer request is queued: start it, discard this result.
    Restart(u64),
    /// The run was invalidated: discard it.
    Discard,
}

/// Per-field validation queue: at most one run in flight, plus at most one
/// queued request. A newer queued request supersedes an older one, and a
/// result only applies if its ticket is still the latest issued.
#[derive(Default)]
pub(crate) struct ValidationLocks {
    issued: u64,
    in_flight: Option<u64>,
    queued: bool,
    waiters: Vec<oneshot::Sender<Option<FieldError>>>,
    debounce: Option<TimerId>,
}

impl ValidationLocks {
    pub(crate) fn request(&mut self) -> (Dispatch, oneshot::Receiver<Option<FieldError>>) {
        self.issued += 1;
        let (sender, receiver) = oneshot::channel();
        self.waiters.push(sender);
        let dispatch = if self.in_flight.is_some() {
            if self.queued {
                tracing::trace!(ticket = self.issued, "queued validation superseded");
            }
            self.queued = true;
            Dispatch::Queued
        } else {
            self.in_flight = Some(self.issued);
            Dispatch::Start(self.issued)
        };
        (dispatch, receiver)
    }

    pub(crate) fn finish(&mut self, ticket: u64) -> Settle {
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }
        if self.queued && self.in_flight.is_none() {
            self.queued = false;
            self.in_flight = Some(self.issued);
            return Settle::Restart(self.issued);
        }
        if ticket == self.issued {
            Settle::Apply
        } else {
            Settle::Discard
        }
    }

    /// Resolve every waiter with `result`.
    pub(crate) fn resolve(&mut self, result: Option<FieldError>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }

    /// Make every outstanding run stale and release its waiters.
    pub(crate) fn invalidate(&mut self) {
        self.issued += 1;
        self.queued = false;
        self.resolve(None);
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.in_flight.is_some() || self.queued
    }

    pub(crate) fn replace_debounce(&mut self, timer: Option<TimerId>) -> Option<TimerId> {
        std::mem::replace(&mut self.debounce, timer)
    }
}

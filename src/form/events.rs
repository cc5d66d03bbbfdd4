//! Events a form emits and the listener sets behind them.

use std::rc::Rc;

use crate::form::validation::ValidationFuture;
use crate::form::value::{Path, Value};
use crate::hooks::observable::{Listeners, Subscription};
use crate::platform::dom::Reply;

pub use crate::form::tree::DataChange;

/// Payload of a `validate` request.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidateRequest {
    pub name: Option<Path>,
    pub value: Value,
}

/// Emitted when a field's validity or message changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationChange {
    pub name: Option<Path>,
    pub is_valid: bool,
    pub message: Option<String>,
}

type ResetListener = dyn Fn();
type ValidateHandler = dyn Fn(&ValidateRequest) -> Option<ValidationFuture>;
type ValidationChangeListener = dyn Fn(&ValidationChange);
type BeforeLeaveHandler = dyn Fn() -> Option<Reply>;

pub(crate) struct FormEvents {
    reset: Rc<Listeners<ResetListener>>,
    validate: Rc<Listeners<ValidateHandler>>,
    validation_change: Rc<Listeners<ValidationChangeListener>>,
    before_leave: Rc<Listeners<BeforeLeaveHandler>>,
}

impl FormEvents {
    pub(crate) fn new() -> Self {
        Self {
            reset: Listeners::new(),
            validate: Listeners::new(),
            validation_change: Listeners::new(),
            before_leave: Listeners::new(),
        }
    }

    pub(crate) fn on_reset(&self, listener: impl Fn() + 'static) -> Subscription {
        self.reset.add(Rc::new(listener))
    }

    pub(crate) fn on_validate(
        &self,
        handler: impl Fn(&ValidateRequest) -> Option<ValidationFuture> + 'static,
    ) -> Subscription {
        self.validate.add(Rc::new(handler))
    }

    pub(crate) fn on_validation_change(&self, listener: impl Fn(&ValidationChange) + 'static) -> Subscription {
        self.validation_change.add(Rc::new(listener))
    }

    pub(crate) fn on_before_leave(&self, handler: impl Fn() -> Option<Reply> + 'static) -> Subscription {
        self.before_leave.add(Rc::new(handler))
    }

    pub(crate) fn emit_reset(&self) {
        for listener in self.reset.snapshot() {
            listener();
        }
    }

    /// First handler to answer wins.
    pub(crate) fn emit_validate(&self, request: &ValidateRequest) -> Option<ValidationFuture> {
        self.validate.snapshot().into_iter().find_map(|handler| handler(request))
    }

    pub(crate) fn emit_validation_change(&self, change: &ValidationChange) {
        for listener in self.validation_change.snapshot() {
            listener(change);
        }
    }

    pub(crate) fn emit_before_leave(&self) -> Option<Reply> {
        self.before_leave.snapshot().into_iter().find_map(|handler| handler())
    }
}

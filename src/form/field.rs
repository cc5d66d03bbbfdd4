//! Field registration, value sync and validation.
//!
//! A field is bound either to a named slot in its form's tree or to a value
//! it holds itself. Its identity is its [`FieldKey`]: the parent node plus
//! slot name, so a re-render with the same binding reuses the same state,
//! and a binding that resolves to a different node starts fresh.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::form::context::{FormContext, FormInner};
use crate::form::error::FormError;
use crate::form::events::{ValidateRequest, ValidationChange};
use crate::form::kinds::{FieldKind, PostHook};
use crate::form::tree::NodeId;
use crate::form::validation::{
    Dispatch, ErrorFormatter, FieldError, Settle, ValidateInput, ValidationError, ValidationFuture,
    ValidationLocks, Validator,
};
use crate::form::value::{Key, Path, Value};
use crate::hooks::observable::{Listeners, Subscription};
use crate::hooks::reducer::Update;
use crate::hooks::render::RenderTrigger;
use crate::platform::dom::ElementId;
use crate::runtime::Runtime;

/// Where a named field's slot lives.
#[derive(Debug, Clone, PartialEq)]
pub enum ParentRef {
    Node(NodeId),
    Path(Path),
}

/// Stable identity of a field binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Slot { parent: NodeId, name: Key },
    Local(u64),
}

/// Render-time configuration of a field.
#[derive(Clone, Default)]
pub struct FieldProps {
    pub name: Option<Key>,
    pub parent: Option<ParentRef>,
    pub kind: FieldKind,
    /// Controlled value. When set, the caller owns the state.
    pub value: Option<Value>,
    pub on_change: Option<Rc<dyn Fn(Value)>>,
    pub default_value: Option<Value>,
    pub required: bool,
    pub disabled: bool,
    pub on_validate: Option<Validator>,
    pub format_error: Option<ErrorFormatter>,
    pub clear_on_unmount: bool,
    pub element: Option<ElementId>,
}

impl FieldProps {
    pub fn named(name: impl Into<Key>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn unnamed() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: ParentRef) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn under(self, path: impl Into<Path>) -> Self {
        self.parent(ParentRef::Path(path.into()))
    }

    pub fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn controlled(mut self, value: impl Into<Value>, on_change: impl Fn(Value) + 'static) -> Self {
        self.value = Some(value.into());
        self.on_change = Some(Rc::new(on_change));
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn on_validate(mut self, validator: Validator) -> Self {
        self.on_validate = Some(validator);
        self
    }

    pub fn format_error(mut self, formatter: ErrorFormatter) -> Self {
        self.format_error = Some(formatter);
        self
    }

    pub fn clear_on_unmount(mut self, clear: bool) -> Self {
        self.clear_on_unmount = clear;
        self
    }

    pub fn element(mut self, element: ElementId) -> Self {
        self.element = Some(element);
        self
    }

    pub fn is_controlled(&self) -> bool {
        self.value.is_some()
    }
}

impl fmt::Debug for FieldProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldProps")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("required", &self.required)
            .field("disabled", &self.disabled)
            .finish_non_exhaustive()
    }
}

/// Handle to one field. Cloning is cheap.
#[derive(Clone)]
pub struct Field {
    pub(crate) inner: Rc<FieldInner>,
}

pub(crate) struct FieldInner {
    runtime: Runtime,
    form: Weak<FormInner>,
    local_id: u64,
    key: RefCell<Option<FieldKey>>,
    props: RefCell<FieldProps>,
    value: RefCell<Value>,
    error: RefCell<Option<FieldError>>,
    version: Cell<u64>,
    display: RefCell<Option<String>>,
    locks: RefCell<ValidationLocks>,
    triggers: RefCell<Vec<RenderTrigger>>,
    watchers: Rc<Listeners<dyn Fn(&Value)>>,
    registered: Cell<bool>,
    last_reported: RefCell<Option<(bool, Option<String>)>>,
}

thread_local! {
    static NEXT_LOCAL: Cell<u64> = const { Cell::new(0) };
}

impl Field {
    pub(crate) fn create(runtime: &Runtime, form: Weak<FormInner>) -> Self {
        let local_id = NEXT_LOCAL.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Self {
            inner: Rc::new(FieldInner {
                runtime: runtime.clone(),
                form,
                local_id,
                key: RefCell::new(None),
                props: RefCell::new(FieldProps::default()),
                value: RefCell::new(Value::Null),
                error: RefCell::new(None),
                version: Cell::new(0),
                display: RefCell::new(None),
                locks: RefCell::new(ValidationLocks::default()),
                triggers: RefCell::new(Vec::new()),
                watchers: Listeners::new(),
                registered: Cell::new(false),
                last_reported: RefCell::new(None),
            }),
        }
    }

    /// A field with no form. Its value always lives in the field.
    pub fn standalone(runtime: &Runtime, props: FieldProps) -> Self {
        let field = Self::create(runtime, Weak::new());
        let props = FieldProps { name: None, ..props };
        let initial = props
            .value
            .clone()
            .or_else(|| props.kind.default_value())
            .or_else(|| props.default_value.clone())
            .unwrap_or_default();
        let initial = if props.is_controlled() {
            initial
        } else {
            props.kind.normalize_value(initial)
        };
        *field.inner.key.borrow_mut() = Some(FieldKey::Local(field.inner.local_id));
        *field.inner.value.borrow_mut() = initial;
        *field.inner.props.borrow_mut() = props;
        field.run_post_hook();
        field
    }

    pub fn ptr_eq(&self, other: &Field) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn form(&self) -> Option<FormContext> {
        self.inner.form.upgrade().map(FormContext::from_inner)
    }

    // -- reads ---------------------------------------------------------------

    pub fn key(&self) -> Option<FieldKey> {
        self.inner.key.borrow().clone()
    }

    pub fn props(&self) -> FieldProps {
        self.inner.props.borrow().clone()
    }

    pub fn kind(&self) -> FieldKind {
        self.inner.props.borrow().kind.clone()
    }

    pub fn is_controlled(&self) -> bool {
        self.inner.props.borrow().is_controlled()
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.props.borrow().disabled
    }

    pub fn is_required(&self) -> bool {
        self.inner.props.borrow().required
    }

    pub fn is_registered(&self) -> bool {
        self.inner.registered.get()
    }

    pub fn element(&self) -> Option<ElementId> {
        self.inner.props.borrow().element
    }

    /// Current value. Named uncontrolled fields read through to the tree.
    /// A missing slot, or one under a detached parent, reads as the kind's
    /// empty value.
    pub fn value(&self) -> Value {
        if !self.is_controlled() {
            if let (Some(FieldKey::Slot { parent, name }), Some(form)) = (self.key(), self.form()) {
                let tree = form.tree();
                return tree
                    .is_attached(parent)
                    .then(|| tree.get(parent, name))
                    .flatten()
                    .or_else(|| self.kind().default_value())
                    .unwrap_or_default();
            }
        }
        self.inner.value.borrow().clone()
    }

    /// False for a named field whose parent node was truncated away or
    /// replaced. Such a field is inert until it is rendered again.
    pub fn is_attached(&self) -> bool {
        match (self.key(), self.form()) {
            (Some(FieldKey::Slot { parent, .. }), Some(form)) => form.tree().is_attached(parent),
            _ => true,
        }
    }

    /// Bumped on every value replacement.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Display text derived by the field kind.
    pub fn display(&self) -> Option<String> {
        self.inner.display.borrow().clone()
    }

    pub fn error(&self) -> Option<FieldError> {
        self.inner.error.borrow().clone()
    }

    /// The error's text, formatted when it is read.
    pub fn error_message(&self) -> Option<String> {
        let error = self.error()?;
        let mut chain: Vec<ErrorFormatter> = Vec::new();
        if let Some(format) = self.inner.props.borrow().format_error.clone() {
            chain.push(format);
        }
        if let Some(format) = self.form().and_then(|form| form.format_error()) {
            chain.push(format);
        }
        if let Some(format) = self.inner.runtime.default_error_formatter() {
            chain.push(format);
        }
        Some(error.message_with(chain.iter()))
    }

    /// Path of a named field's slot, while its parent is attached.
    pub fn path(&self) -> Option<Path> {
        let FieldKey::Slot { parent, name } = self.key()? else {
            return None;
        };
        let form = self.form()?;
        Some(form.tree().path_of(parent)?.join(name))
    }

    pub fn is_empty(&self) -> bool {
        let value = self.value();
        self.inner.props.borrow().kind.is_empty(&value)
    }

    /// Required and empty, without running validators.
    pub fn violates_required(&self) -> bool {
        self.is_required() && self.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.inner.error.borrow().is_none() && !self.violates_required()
    }

    pub fn is_validating(&self) -> bool {
        self.inner.locks.borrow().is_pending()
    }

    // -- render --------------------------------------------------------------

    /// Apply new props. Re-keys the field when its binding moved.
    pub fn render(&self, props: FieldProps) -> Result<(), FormError> {
        let previous = self.key();
        let was_controlled = self.is_controlled();
        *self.inner.props.borrow_mut() = props;
        let key = self.resolve_key()?;

        if previous.as_ref() != Some(&key) {
            *self.inner.key.borrow_mut() = Some(key);
            if previous.is_some() {
                self.discard_validation();
                self.write_error(None);
            }
            if let Some(form) = self.form() {
                form.register(self);
            }
            let initial = self.initial_value()?;
            self.replace_value(initial);
        } else if self.is_controlled() {
            let controlled = self.inner.props.borrow().value.clone().unwrap_or_default();
            if !was_controlled || controlled != *self.inner.value.borrow() {
                self.replace_value(controlled);
            }
        }
        self.run_post_hook();
        if let Some(form) = self.form() {
            form.invalidate_validity();
        }
        Ok(())
    }

    fn resolve_key(&self) -> Result<FieldKey, FormError> {
        let (name, parent) = {
            let props = self.inner.props.borrow();
            (props.name.clone(), props.parent.clone())
        };
        let (Some(name), Some(form)) = (name, self.form()) else {
            return Ok(FieldKey::Local(self.inner.local_id));
        };
        let tree = form.tree();
        let parent = match parent {
            Some(ParentRef::Node(node)) => node,
            Some(ParentRef::Path(path)) => form.script(|| tree.ensure_container(&path))?,
            None => tree.root(),
        };
        Ok(FieldKey::Slot { parent, name })
    }

    /// Initial value for a fresh binding: controlled value, else the
    /// existing slot, else the kind's default, else the caller's default.
    fn initial_value(&self) -> Result<Value, FormError> {
        let props = self.props();
        if let Some(value) = props.value {
            return Ok(value);
        }
        let slot = match (self.key(), self.form()) {
            (Some(FieldKey::Slot { parent, name }), Some(form)) => Some((parent, name, form)),
            _ => None,
        };
        let existing = slot
            .as_ref()
            .and_then(|(parent, name, form)| form.tree().get(*parent, name.clone()));
        let raw = existing
            .clone()
            .or_else(|| props.kind.default_value())
            .or(props.default_value)
            .unwrap_or_default();
        let value = props.kind.normalize_value(raw);

        if let Some((parent, name, form)) = slot {
            if existing.as_ref() != Some(&value) && self.owns_value() {
                let tree = form.tree();
                form.script(|| tree.set(parent, name, value.clone()))?;
            }
        }
        Ok(value)
    }

    fn owns_value(&self) -> bool {
        match (self.key(), self.form()) {
            (Some(key @ FieldKey::Slot { .. }), Some(form)) => form
                .owner_of(&key)
                .map_or(true, |owner| owner.ptr_eq(self)),
            _ => true,
        }
    }

    fn run_post_hook(&self) {
        let mut hook = PostHook {
            value: self.value(),
            version: self.version(),
            display: self.inner.display.borrow().clone(),
        };
        self.inner.props.borrow().kind.post_hook(&mut hook);
        *self.inner.display.borrow_mut() = hook.display;
    }

    // -- value ---------------------------------------------------------------

    /// Write a new value.
    ///
    /// Controlled fields only report it through `on_change`. Named fields
    /// write into the tree. Unnamed fields keep it locally.
    pub fn set_value(&self, value: impl Into<Value>) -> Result<(), FormError> {
        self.apply(Update::Replace(value.into()))
    }

    pub fn update_value(&self, f: impl FnOnce(&Value) -> Value + 'static) -> Result<(), FormError> {
        self.apply(Update::with(f))
    }

    fn apply(&self, update: Update<Value>) -> Result<(), FormError> {
        let next = match update {
            Update::Replace(value) => value,
            Update::With(f) => f(&self.value()),
        };
        if self.is_controlled() {
            let on_change = self.inner.props.borrow().on_change.clone();
            if let Some(on_change) = on_change {
                on_change(next);
            }
            return Ok(());
        }
        match (self.key(), self.form()) {
            (Some(FieldKey::Slot { parent, name }), Some(form)) => {
                form.tree().set(parent, name, next)?;
            }
            _ => {
                if next != *self.inner.value.borrow() {
                    self.replace_value(next);
                    self.run_post_hook();
                    self.schedule_validation();
                    if let Some(form) = self.form() {
                        form.invalidate_validity();
                    }
                }
            }
        }
        Ok(())
    }

    fn replace_value(&self, value: Value) {
        *self.inner.value.borrow_mut() = value.clone();
        self.inner.version.set(self.inner.version.get() + 1);
        for watcher in self.inner.watchers.snapshot() {
            watcher(&value);
        }
        self.request_render();
    }

    /// Pull the tree value after a flushed change touching this field.
    /// Returns whether the value differed.
    pub(crate) fn resync(&self, validate: bool) -> bool {
        if self.is_controlled() {
            return false;
        }
        let current = self.value();
        if current == *self.inner.value.borrow() {
            return false;
        }
        self.replace_value(current);
        self.run_post_hook();
        if validate {
            self.schedule_validation();
        }
        true
    }

    /// Drop state tied to a parent that left the tree.
    pub(crate) fn detach_state(&self) {
        self.discard_validation();
        self.resync(false);
        if self.inner.error.borrow_mut().take().is_some() {
            self.request_render();
        }
    }

    /// Reset after the form's data was replaced.
    pub(crate) fn reset_state(&self) {
        self.discard_validation();
        let value = if self.is_controlled() {
            self.inner.props.borrow().value.clone().unwrap_or_default()
        } else {
            self.value()
        };
        self.replace_value(value);
        self.run_post_hook();
        self.write_error(None);
    }

    pub fn watch(&self, callback: impl Fn(&Value) + 'static) -> Subscription {
        self.inner.watchers.add(Rc::new(callback))
    }

    /// Schedule `trigger` whenever value or error changes.
    pub fn attach_trigger(&self, trigger: RenderTrigger) {
        self.inner.triggers.borrow_mut().push(trigger);
    }

    fn request_render(&self) {
        for trigger in self.inner.triggers.borrow().iter() {
            trigger.schedule();
        }
    }

    // -- errors --------------------------------------------------------------

    pub fn set_error(&self, error: Option<FieldError>) {
        self.write_error(error);
    }

    pub fn update_error(&self, f: impl FnOnce(Option<&FieldError>) -> Option<FieldError>) {
        let next = f(self.inner.error.borrow().as_ref());
        self.write_error(next);
    }

    fn write_error(&self, error: Option<FieldError>) {
        let changed = *self.inner.error.borrow() != error;
        *self.inner.error.borrow_mut() = error;
        if !changed {
            return;
        }
        self.request_render();
        if let Some(form) = self.form() {
            form.invalidate_validity();
        }
        self.report_validity();
    }

    fn report_validity(&self) {
        let is_valid = self.inner.error.borrow().is_none();
        let message = self.error_message();
        let state = (is_valid, message.clone());
        if self.inner.last_reported.borrow().as_ref() == Some(&state) {
            return;
        }
        let first = self.inner.last_reported.replace(Some(state)).is_none();
        if first && is_valid {
            return;
        }
        if let Some(form) = self.form() {
            form.emit_validation_change(
                self,
                ValidationChange {
                    name: self.path(),
                    is_valid,
                    message,
                },
            );
        }
    }

    // -- validation ----------------------------------------------------------

    /// Request a validation run.
    ///
    /// At most one run is in flight per field. A request made meanwhile
    /// waits, and only the latest waiting request runs. Every caller gets
    /// the result of the latest request.
    pub fn validate(&self) -> LocalBoxFuture<'static, Option<FieldError>> {
        let (dispatch, receiver) = self.inner.locks.borrow_mut().request();
        if let Dispatch::Start(ticket) = dispatch {
            self.start_run(ticket);
        }
        async move { receiver.await.ok().flatten() }.boxed_local()
    }

    fn start_run(&self, ticket: u64) {
        let run = self.run_validators();
        let weak = Rc::downgrade(&self.inner);
        let _task = self.inner.runtime.spawn(async move {
            let result = run.await;
            if let Some(inner) = weak.upgrade() {
                Field { inner }.settle(ticket, result);
            }
        });
    }

    fn settle(&self, ticket: u64, result: Option<FieldError>) {
        let settle = self.inner.locks.borrow_mut().finish(ticket);
        match settle {
            Settle::Apply => {
                self.write_error(result.clone());
                self.inner.locks.borrow_mut().resolve(result);
            }
            Settle::Restart(next) => {
                tracing::trace!(ticket, next, "validation result superseded");
                self.start_run(next);
            }
            Settle::Discard => {
                tracing::trace!(ticket, "stale validation discarded");
            }
        }
    }

    /// Explicit handler first, then the `validate` event, then the implicit
    /// required check.
    fn run_validators(&self) -> ValidationFuture {
        let props = self.props();
        let value = self.value();
        let form = self.form();
        let input = ValidateInput {
            value: value.clone(),
            name: self.path(),
            form: form.clone(),
        };
        let explicit = props.on_validate.as_ref().map(|validator| validator.call(&input));
        let event = form.as_ref().and_then(|form| {
            form.dispatch_validate(
                self,
                ValidateRequest {
                    name: input.name.clone(),
                    value: value.clone(),
                },
            )
        });
        let required = props.required && props.kind.is_empty(&value);
        async move {
            if let Some(explicit) = explicit {
                if let Some(error) = explicit.await {
                    return Some(error);
                }
            }
            if let Some(event) = event {
                if let Some(error) = event.await {
                    return Some(error);
                }
            }
            required.then(|| FieldError::Rich(ValidationError::required()))
        }
        .boxed_local()
    }

    pub(crate) fn schedule_validation(&self) {
        let Some(form) = self.form() else {
            return;
        };
        if !form.validate_on_change() || self.is_disabled() {
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        let timer = self
            .inner
            .runtime
            .set_timeout(form.debounce(), move || {
                if let Some(inner) = weak.upgrade() {
                    let field = Field { inner };
                    field.inner.locks.borrow_mut().replace_debounce(None);
                    drop(field.validate());
                }
            });
        let previous = self.inner.locks.borrow_mut().replace_debounce(Some(timer));
        if let Some(previous) = previous {
            self.inner.runtime.clear_timeout(previous);
        }
    }

    fn discard_validation(&self) {
        let timer = {
            let mut locks = self.inner.locks.borrow_mut();
            locks.invalidate();
            locks.replace_debounce(None)
        };
        if let Some(timer) = timer {
            self.inner.runtime.clear_timeout(timer);
        }
    }

    // -- lifecycle -----------------------------------------------------------

    /// Focus the bound element.
    pub fn focus(&self) -> bool {
        match (self.element(), self.form().and_then(|form| form.dom())) {
            (Some(element), Some(dom)) => dom.focus(element),
            _ => false,
        }
    }

    /// Remove the field from its form.
    ///
    /// With `clear_on_unmount`, the slot is deleted on the next tick unless
    /// another field has claimed the same binding by then.
    pub fn unmount(&self) {
        self.discard_validation();
        let Some(form) = self.form() else {
            self.inner.registered.set(false);
            return;
        };
        form.unregister(self);
        let clear = self.inner.props.borrow().clear_on_unmount;
        if let (true, Some(key @ FieldKey::Slot { .. })) = (clear, self.key()) {
            let weak = Rc::downgrade(&form.inner);
            self.inner.runtime.set_timeout(Duration::ZERO, move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let form = FormContext::from_inner(inner);
                if form.owner_of(&key).is_some() {
                    return;
                }
                if let FieldKey::Slot { parent, name } = key {
                    let tree = form.tree();
                    if let Err(error) = form.script(|| tree.delete(parent, name)) {
                        tracing::debug!(%error, "skipped clearing unmounted field");
                    }
                }
            });
        }
    }

    pub(crate) fn set_registered(&self, registered: bool) {
        self.inner.registered.set(registered);
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("key", &*self.inner.key.borrow())
            .field("value", &*self.inner.value.borrow())
            .field("error", &*self.inner.error.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;

    #[test]
    fn standalone_field_keeps_value_locally() {
        let rt = Runtime::new();
        let field = Field::standalone(&rt, FieldProps::unnamed().kind(FieldKind::numeric()));
        assert_eq!(field.value(), Value::Null);
        field.set_value("12").unwrap();
        assert_eq!(field.value(), Value::from("12"));
        assert_eq!(field.version(), 1);
    }

    #[test]
    fn controlled_field_reports_through_on_change() {
        let rt = Runtime::new();
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        let field = Field::standalone(
            &rt,
            FieldProps::unnamed().controlled("a", move |v| *s.borrow_mut() = Some(v)),
        );
        field.set_value("b").unwrap();
        assert_eq!(field.value(), Value::from("a"));
        assert_eq!(*seen.borrow(), Some(Value::from("b")));
    }

    #[test]
    fn standalone_validation_applies_latest_result() {
        let rt = Runtime::new();
        let gates: Rc<RefCell<Vec<oneshot::Sender<Option<FieldError>>>>> = Rc::new(RefCell::new(Vec::new()));
        let g = Rc::clone(&gates);
        let validator = Validator::new(move |_| {
            let (tx, rx) = oneshot::channel();
            g.borrow_mut().push(tx);
            async move { rx.await.ok().flatten() }.boxed_local()
        });
        let field = Field::standalone(&rt, FieldProps::unnamed().on_validate(validator));

        let _first = field.validate();
        let _second = field.validate();
        rt.run_until_idle();
        assert_eq!(gates.borrow().len(), 1, "second request waits");

        let first_gate = gates.borrow_mut().remove(0);
        let _ = first_gate.send(Some(FieldError::from("stale")));
        rt.run_until_idle();
        assert_eq!(field.error(), None, "stale result never applied");

        let second_gate = gates.borrow_mut().remove(0);
        let _ = second_gate.send(Some(FieldError::from("fresh")));
        rt.run_until_idle();
        assert_eq!(field.error(), Some(FieldError::from("fresh")));
    }

    #[test]
    fn error_message_uses_field_formatter_lazily() {
        let rt = Runtime::new();
        let field = Field::standalone(&rt, FieldProps::unnamed());
        field.set_error(Some(ValidationError::required().into()));
        assert_eq!(field.error_message().as_deref(), Some("This field is required"));

        rt.set_default_error_formatter(Some(Rc::new(|_: &ValidationError| Some("late".into()))));
        assert_eq!(field.error_message().as_deref(), Some("late"));
    }
}

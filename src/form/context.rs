//! The form orchestrator.
//!
//! A [`FormContext`] owns one [`DataTree`], the registry of fields bound to
//! it, aggregate validity, the navigation lock and the link to a view-state
//! store. It is a cheap handle: clones share the same form.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use indexmap::IndexMap;

use crate::form::error::FormError;
use crate::form::events::{DataChange, FormEvents, ValidateRequest, ValidationChange};
use crate::form::field::{Field, FieldKey, FieldProps};
use crate::form::tree::{DataTree, NodeKind};
use crate::form::validation::{ErrorFormatter, FieldError, ValidationFuture};
use crate::form::value::{Path, Value};
use crate::hooks::observable::{Observable, Subscription};
use crate::platform::dom::{DomHost, ElementId, EventDetail, Reply};
use crate::platform::view_state::{NoopStore, ViewStateStore};
use crate::runtime::Runtime;

bitflags::bitflags! {
    /// Which fields [`FormContext::focus`] may pick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FocusFlags: u8 {
        const ERROR_FIELD = 1;
        const EMPTY_FIELD = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FocusTarget {
    Path(Path),
    Flags(FocusFlags),
}

impl From<FocusFlags> for FocusTarget {
    fn from(flags: FocusFlags) -> Self {
        Self::Flags(flags)
    }
}

impl From<Path> for FocusTarget {
    fn from(path: Path) -> Self {
        Self::Path(path)
    }
}

impl From<&str> for FocusTarget {
    fn from(path: &str) -> Self {
        Self::Path(Path::parse(path))
    }
}

#[derive(Clone)]
pub struct FormOptions {
    pub initial: Value,
    /// Falls back to the runtime setting.
    pub validate_on_change: Option<bool>,
    /// Falls back to the runtime setting.
    pub debounce: Option<Duration>,
    pub prevent_leave: bool,
    pub auto_persist: bool,
    pub format_error: Option<ErrorFormatter>,
    pub enter_key_hint: Option<String>,
    pub dom: Option<Rc<dyn DomHost>>,
    pub element: Option<ElementId>,
    pub store: Option<Rc<dyn ViewStateStore>>,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            initial: Value::object(),
            validate_on_change: None,
            debounce: None,
            prevent_leave: false,
            auto_persist: false,
            format_error: None,
            enter_key_hint: None,
            dom: None,
            element: None,
            store: None,
        }
    }
}

impl FormOptions {
    pub fn new(initial: impl Into<Value>) -> Self {
        Self {
            initial: initial.into(),
            ..Self::default()
        }
    }

    pub fn validate_on_change(mut self, enabled: bool) -> Self {
        self.validate_on_change = Some(enabled);
        self
    }

    pub fn debounce(mut self, delay: Duration) -> Self {
        self.debounce = Some(delay);
        self
    }

    pub fn prevent_leave(mut self, enabled: bool) -> Self {
        self.prevent_leave = enabled;
        self
    }

    pub fn auto_persist(mut self, enabled: bool) -> Self {
        self.auto_persist = enabled;
        self
    }

    pub fn format_error(mut self, formatter: ErrorFormatter) -> Self {
        self.format_error = Some(formatter);
        self
    }

    pub fn enter_key_hint(mut self, hint: impl Into<String>) -> Self {
        self.enter_key_hint = Some(hint.into());
        self
    }

    pub fn dom(mut self, dom: Rc<dyn DomHost>) -> Self {
        self.dom = Some(dom);
        self
    }

    pub fn element(mut self, element: ElementId) -> Self {
        self.element = Some(element);
        self
    }

    pub fn store(mut self, store: Rc<dyn ViewStateStore>) -> Self {
        self.store = Some(store);
        self
    }
}

impl fmt::Debug for FormOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormOptions")
            .field("initial", &self.initial)
            .field("validate_on_change", &self.validate_on_change)
            .field("debounce", &self.debounce)
            .field("prevent_leave", &self.prevent_leave)
            .field("auto_persist", &self.auto_persist)
            .field("element", &self.element)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct FormContext {
    pub(crate) inner: Rc<FormInner>,
}

pub(crate) struct FormInner {
    runtime: Runtime,
    tree: DataTree,
    initial: Value,
    validate_on_change: bool,
    debounce: Duration,
    prevent_leave: bool,
    auto_persist: bool,
    format_error: RefCell<Option<ErrorFormatter>>,
    enter_key_hint: Option<String>,
    dom: Option<Rc<dyn DomHost>>,
    element: Cell<Option<ElementId>>,
    store: Rc<dyn ViewStateStore>,
    events: FormEvents,
    fields: RefCell<Vec<Field>>,
    validity: Observable<bool>,
    validity_dirty: Cell<bool>,
    validity_scheduled: Cell<bool>,
    validity_epoch: Cell<u64>,
    skip_validation: Cell<bool>,
    script_depth: Cell<usize>,
    persisted: Cell<bool>,
    leave_lock: RefCell<Option<oneshot::Sender<()>>>,
    subscriptions: RefCell<Vec<Subscription>>,
}

impl FormContext {
    /// Create a form. Data found in the store replaces `options.initial`.
    pub fn new(runtime: &Runtime, options: FormOptions) -> Result<Self, FormError> {
        let settings = runtime.settings();
        let store: Rc<dyn ViewStateStore> = options.store.unwrap_or_else(|| Rc::new(NoopStore));
        let tree = DataTree::new(runtime, options.initial.clone())?;
        if let Some(saved) = store.get() {
            tree.replace_root(saved)?;
            tree.flush();
            tracing::debug!("form restored from view state");
        }

        let form = Self {
            inner: Rc::new(FormInner {
                runtime: runtime.clone(),
                validity_epoch: Cell::new(tree.epoch()),
                tree,
                initial: options.initial,
                validate_on_change: options
                    .validate_on_change
                    .unwrap_or(settings.validate_on_change),
                debounce: options.debounce.unwrap_or(settings.validation_debounce),
                prevent_leave: options.prevent_leave,
                auto_persist: options.auto_persist,
                format_error: RefCell::new(options.format_error),
                enter_key_hint: options.enter_key_hint,
                dom: options.dom,
                element: Cell::new(options.element),
                store,
                events: FormEvents::new(),
                fields: RefCell::new(Vec::new()),
                validity: Observable::new(true),
                validity_dirty: Cell::new(false),
                validity_scheduled: Cell::new(false),
                skip_validation: Cell::new(false),
                script_depth: Cell::new(0),
                persisted: Cell::new(false),
                leave_lock: RefCell::new(None),
                subscriptions: RefCell::new(Vec::new()),
            }),
        };

        let weak = Rc::downgrade(&form.inner);
        let on_change = form.inner.tree.subscribe(move |change| {
            if let Some(inner) = weak.upgrade() {
                FormContext::from_inner(inner).sync_fields(change);
            }
        });
        let weak = Rc::downgrade(&form.inner);
        let on_mutation = form.inner.tree.on_mutation(move |_| {
            if let Some(inner) = weak.upgrade() {
                FormContext::from_inner(inner).acquire_leave_lock();
            }
        });
        form.inner
            .subscriptions
            .borrow_mut()
            .extend([on_change, on_mutation]);
        Ok(form)
    }

    pub(crate) fn from_inner(inner: Rc<FormInner>) -> Self {
        Self { inner }
    }

    pub fn ptr_eq(&self, other: &FormContext) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub fn tree(&self) -> &DataTree {
        &self.inner.tree
    }

    pub fn dom(&self) -> Option<Rc<dyn DomHost>> {
        self.inner.dom.clone()
    }

    pub fn element(&self) -> Option<ElementId> {
        self.inner.element.get()
    }

    pub fn validate_on_change(&self) -> bool {
        self.inner.validate_on_change
    }

    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    pub fn prevents_leave(&self) -> bool {
        self.inner.prevent_leave
    }

    pub fn enter_key_hint(&self) -> Option<&str> {
        self.inner.enter_key_hint.as_deref()
    }

    pub fn format_error(&self) -> Option<ErrorFormatter> {
        self.inner.format_error.borrow().clone()
    }

    /// Replace the form-level formatter. Errors already set pick it up the
    /// next time their text is read.
    pub fn set_format_error(&self, formatter: Option<ErrorFormatter>) {
        *self.inner.format_error.borrow_mut() = formatter;
    }

    // -- fields --------------------------------------------------------------

    /// Register a new field rendered with `props`.
    pub fn field(&self, props: FieldProps) -> Result<Field, FormError> {
        let field = Field::create(&self.inner.runtime, Rc::downgrade(&self.inner));
        field.render(props)?;
        Ok(field)
    }

    pub fn fields(&self) -> Vec<Field> {
        self.inner.fields.borrow().clone()
    }

    pub(crate) fn register(&self, field: &Field) {
        {
            let mut fields = self.inner.fields.borrow_mut();
            if !fields.iter().any(|f| f.ptr_eq(field)) {
                fields.push(field.clone());
            }
        }
        field.set_registered(true);
        self.invalidate_validity();
    }

    pub(crate) fn unregister(&self, field: &Field) {
        self.inner.fields.borrow_mut().retain(|f| !f.ptr_eq(field));
        field.set_registered(false);
        self.invalidate_validity();
    }

    /// The field that owns the value at `key`: the first specific field
    /// bound there, else the first container field.
    pub(crate) fn owner_of(&self, key: &FieldKey) -> Option<Field> {
        let fields = self.inner.fields.borrow();
        let mut bound = fields.iter().filter(|f| f.key().as_ref() == Some(key));
        let first = bound.next()?.clone();
        if !first.kind().is_container() {
            return Some(first);
        }
        Some(bound.find(|f| !f.kind().is_container()).cloned().unwrap_or(first))
    }

    fn is_owner(&self, field: &Field) -> bool {
        match field.key() {
            Some(key @ FieldKey::Slot { .. }) => self
                .owner_of(&key)
                .is_some_and(|owner| owner.ptr_eq(field)),
            _ => true,
        }
    }

    /// Registered, enabled, attached fields that own their value.
    fn active_fields(&self) -> Vec<Field> {
        self.fields()
            .into_iter()
            .filter(|f| !f.is_disabled() && f.is_attached() && self.is_owner(f))
            .collect()
    }

    fn field_at(&self, path: &Path) -> Option<Field> {
        self.fields()
            .into_iter()
            .filter(|f| f.path().as_ref() == Some(path))
            .find(|f| self.is_owner(f))
    }

    fn sync_fields(&self, change: &DataChange) {
        let validate = self.inner.validate_on_change && !self.inner.skip_validation.get();
        for field in self.fields() {
            match field.path() {
                Some(path) if change.contains(&path) => {
                    field.resync(validate && self.is_owner(&field));
                }
                Some(_) => {}
                None if !field.is_attached() => field.detach_state(),
                None => {}
            }
        }
        self.invalidate_validity();
    }

    // -- validity ------------------------------------------------------------

    /// Whether every active field is free of errors and required-empty
    /// violations. Recomputed lazily.
    pub fn is_valid(&self) -> bool {
        self.refresh_validity();
        self.inner.validity.get()
    }

    /// Called with the new validity whenever it flips.
    pub fn watch_validity(&self, callback: impl Fn(bool) + 'static) -> Subscription {
        self.inner.validity.watch(move |valid, _| callback(*valid))
    }

    pub(crate) fn invalidate_validity(&self) {
        self.inner.validity_dirty.set(true);
        if self.inner.validity_scheduled.replace(true) {
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        self.inner.runtime.queue_microtask(move || {
            if let Some(inner) = weak.upgrade() {
                inner.validity_scheduled.set(false);
                FormContext::from_inner(inner).refresh_validity();
            }
        });
    }

    fn refresh_validity(&self) {
        let epoch = self.inner.tree.epoch();
        let stale_epoch = self.inner.validity_epoch.replace(epoch) != epoch;
        if !self.inner.validity_dirty.replace(false) && !stale_epoch {
            return;
        }
        let valid = self.active_fields().iter().all(Field::is_valid);
        self.inner.validity.set(valid);
    }

    // -- errors and values ---------------------------------------------------

    pub fn get_errors(&self) -> IndexMap<Path, FieldError> {
        self.fields()
            .into_iter()
            .filter_map(|f| Some((f.path()?, f.error()?)))
            .collect()
    }

    pub fn get_error(&self, path: impl Into<Path>) -> Option<FieldError> {
        self.field_at(&path.into())?.error()
    }

    pub fn set_error(&self, path: impl Into<Path>, error: Option<FieldError>) -> Result<(), FormError> {
        let path = path.into();
        let field = self
            .field_at(&path)
            .ok_or(FormError::UnknownField { path })?;
        field.set_error(error);
        Ok(())
    }

    /// An owned copy of the value at `path`.
    pub fn get_value(&self, path: impl Into<Path>) -> Option<Value> {
        self.inner.tree.lookup(&path.into())
    }

    /// Write a copy of `value` at `path` as a script change.
    pub fn set_value(&self, path: impl Into<Path>, value: impl Into<Value>) -> Result<(), FormError> {
        let path = path.into();
        let value = value.into();
        self.script(|| self.inner.tree.set_path(&path, value))?;
        Ok(())
    }

    pub fn snapshot(&self) -> Value {
        self.inner.tree.snapshot()
    }

    // -- validation ----------------------------------------------------------

    /// Validate every active field, or those at or below one of
    /// `prefixes`. Resolves to whether all of them passed.
    pub fn validate(&self, prefixes: Vec<Path>) -> LocalBoxFuture<'static, bool> {
        let runs: Vec<_> = self
            .active_fields()
            .into_iter()
            .filter(|f| {
                prefixes.is_empty()
                    || f.path()
                        .is_some_and(|path| prefixes.iter().any(|prefix| path.starts_with(prefix)))
            })
            .map(|f| f.validate())
            .collect();
        async move { future::join_all(runs).await.iter().all(Option::is_none) }.boxed_local()
    }

    pub fn validate_all(&self) -> LocalBoxFuture<'static, bool> {
        self.validate(Vec::new())
    }

    /// Local `validate` listeners first, then the host event.
    pub(crate) fn dispatch_validate(&self, field: &Field, request: ValidateRequest) -> Option<ValidationFuture> {
        if let Some(local) = self.inner.events.emit_validate(&request) {
            return Some(local);
        }
        let dom = self.dom()?;
        let target = field.element().or(self.element())?;
        let detail = EventDetail::Validate {
            name: request.name.map(|p| p.to_string()).unwrap_or_default(),
            value: request.value,
        };
        let reply = dom.emit("validate", target, detail, true)?;
        Some(
            reply
                .map(|answer| answer.as_ref().and_then(FieldError::from_value))
                .boxed_local(),
        )
    }

    pub(crate) fn emit_validation_change(&self, field: &Field, change: ValidationChange) {
        self.inner.events.emit_validation_change(&change);
        let target = field.element().or(self.element());
        if let (Some(dom), Some(target)) = (self.dom(), target) {
            let detail = EventDetail::ValidationChange {
                name: change.name.map(|p| p.to_string()).unwrap_or_default(),
                is_valid: change.is_valid,
                message: change.message,
            };
            let _ = dom.emit("validationChange", target, detail, true);
        }
    }

    // -- lifecycle -----------------------------------------------------------

    /// Replace the data with `data`, or with the initial data, keeping the
    /// root's identity. Every field is resynchronised and its error cleared.
    pub fn reset(&self, data: Option<Value>) -> Result<(), FormError> {
        let data = data.unwrap_or_else(|| self.inner.initial.clone());
        let tree = &self.inner.tree;
        self.inner.skip_validation.set(true);
        let replaced = {
            let inner = Rc::clone(&self.inner);
            let _restore = scopeguard::guard((), move |_| inner.skip_validation.set(false));
            self.script(|| tree.batch(|| tree.replace_root(data)))
        };
        replaced?;
        for field in self.fields() {
            field.reset_state();
        }
        self.invalidate_validity();
        self.unlock();
        self.inner.events.emit_reset();
        tracing::debug!(fields = self.inner.fields.borrow().len(), "form reset");
        Ok(())
    }

    /// Reset to an empty container of the root's kind.
    pub fn clear(&self) -> Result<(), FormError> {
        let empty = match self.inner.tree.kind(self.inner.tree.root()) {
            Some(NodeKind::Array) => Value::array(),
            _ => Value::object(),
        };
        self.reset(Some(empty))
    }

    /// Run `f` as one data batch.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.tree.batch(f)
    }

    /// Run `f` with its data changes marked as script-driven. Script changes
    /// never take the navigation lock.
    pub fn script<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.script_depth.set(self.inner.script_depth.get() + 1);
        let inner = Rc::clone(&self.inner);
        let _exit = scopeguard::guard((), move |_| {
            inner.script_depth.set(inner.script_depth.get().saturating_sub(1));
        });
        f()
    }

    /// Save the data to the store. Disables auto-persist on unmount.
    pub fn persist(&self) -> Result<(), FormError> {
        self.inner.store.set(self.snapshot(), false)?;
        self.inner.persisted.set(true);
        self.unlock();
        Ok(())
    }

    /// Load the data from the store. Returns whether the store had any.
    pub fn restore(&self) -> Result<bool, FormError> {
        match self.inner.store.get() {
            Some(data) => {
                self.reset(Some(data))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Listen for the host `reset` event on `element`.
    pub fn bind_element(&self, element: ElementId) {
        self.inner.element.set(Some(element));
        let Some(dom) = self.dom() else {
            return;
        };
        let weak = Rc::downgrade(&self.inner);
        let subscription = dom.on(
            element,
            "reset",
            Rc::new(move |_: &EventDetail| {
                if let Some(inner) = weak.upgrade() {
                    if let Err(error) = FormContext::from_inner(inner).reset(None) {
                        tracing::warn!(%error, "form reset from host event failed");
                    }
                }
                None
            }),
        );
        self.inner.subscriptions.borrow_mut().push(subscription);
    }

    /// Tear the form down: auto-persist unless [`persist`](Self::persist)
    /// already ran, release the navigation lock and dispose the store.
    pub fn unmount(&self) {
        if self.inner.auto_persist && !self.inner.persisted.get() {
            if let Err(error) = self.persist() {
                tracing::warn!(%error, "auto-persist on unmount failed");
            }
        }
        self.unlock();
        self.inner.store.dispose();
        for field in std::mem::take(&mut *self.inner.fields.borrow_mut()) {
            field.set_registered(false);
        }
        self.inner.subscriptions.borrow_mut().clear();
    }

    // -- focus ---------------------------------------------------------------

    /// Focus the element of the field at a path, or of the first field in
    /// document order matching the flags.
    pub fn focus(&self, target: impl Into<FocusTarget>) -> bool {
        let Some(dom) = self.dom() else {
            return false;
        };
        let candidate = match target.into() {
            FocusTarget::Path(path) => self.field_at(&path),
            FocusTarget::Flags(flags) => {
                let mut matching: Vec<Field> = self
                    .active_fields()
                    .into_iter()
                    .filter(|f| f.element().is_some())
                    .filter(|f| {
                        (flags.contains(FocusFlags::ERROR_FIELD) && !f.is_valid())
                            || (flags.contains(FocusFlags::EMPTY_FIELD) && f.is_empty())
                    })
                    .collect();
                matching.sort_by_key(|f| {
                    f.element()
                        .and_then(|el| dom.document_position(el))
                        .unwrap_or(usize::MAX)
                });
                matching.into_iter().next()
            }
        };
        match candidate.and_then(|f| f.element()) {
            Some(element) => dom.focus(element),
            None => false,
        }
    }

    // -- navigation lock -----------------------------------------------------

    pub fn is_locked(&self) -> bool {
        self.inner.leave_lock.borrow().is_some()
    }

    fn acquire_leave_lock(&self) {
        if !self.inner.prevent_leave || self.inner.script_depth.get() > 0 || self.is_locked() {
            return;
        }
        let Some(dom) = self.dom() else {
            return;
        };
        if dom.event_source().is_script() {
            return;
        }
        let (sender, receiver) = oneshot::channel::<()>();
        *self.inner.leave_lock.borrow_mut() = Some(sender);
        let element = self.element().unwrap_or(ElementId::ROOT);
        let weak = Rc::downgrade(&self.inner);
        tracing::debug!(?element, "navigation lock acquired");
        dom.prevent_leave(
            element,
            async move {
                let _ = receiver.await;
            }
            .boxed_local(),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    FormContext::from_inner(inner).handle_force_leave();
                }
            }),
        );
    }

    /// The user is leaving anyway. An unanswered `beforeLeave` releases the
    /// lock; an answer of `false` keeps it.
    fn handle_force_leave(&self) {
        let reply = self.inner.events.emit_before_leave().or_else(|| {
            let dom = self.dom()?;
            let target = self.element().unwrap_or(ElementId::ROOT);
            dom.emit("beforeLeave", target, EventDetail::Empty, true)
        });
        let Some(reply) = reply else {
            self.unlock();
            return;
        };
        let weak: Weak<FormInner> = Rc::downgrade(&self.inner);
        let _task = self.inner.runtime.spawn(async move {
            let answer = reply.await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if answer == Some(Value::Bool(false)) {
                tracing::debug!("leave rejected, navigation lock kept");
            } else {
                FormContext::from_inner(inner).unlock();
            }
        });
    }

    /// Release the navigation lock, if held.
    pub fn unlock(&self) {
        let sender = self.inner.leave_lock.borrow_mut().take();
        if let Some(sender) = sender {
            let _ = sender.send(());
            tracing::debug!("navigation lock released");
        }
    }

    // -- events --------------------------------------------------------------

    pub fn on_data_change(&self, listener: impl Fn(&DataChange) + 'static) -> Subscription {
        self.inner.tree.subscribe(listener)
    }

    pub fn on_reset(&self, listener: impl Fn() + 'static) -> Subscription {
        self.inner.events.on_reset(listener)
    }

    /// A handler returning `Some` answers the request; later handlers and
    /// the host event are skipped.
    pub fn on_validate(
        &self,
        handler: impl Fn(&ValidateRequest) -> Option<ValidationFuture> + 'static,
    ) -> Subscription {
        self.inner.events.on_validate(handler)
    }

    pub fn on_validation_change(&self, listener: impl Fn(&ValidationChange) + 'static) -> Subscription {
        self.inner.events.on_validation_change(listener)
    }

    /// Consulted when the user leaves while the form is locked. Resolve to
    /// `Some(false)` to keep the lock.
    pub fn on_before_leave(&self, handler: impl Fn() -> Option<Reply> + 'static) -> Subscription {
        self.inner.events.on_before_leave(handler)
    }
}

impl fmt::Debug for FormContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormContext")
            .field("tree", &self.inner.tree)
            .field("fields", &self.inner.fields.borrow().len())
            .field("locked", &self.is_locked())
            .finish()
    }
}

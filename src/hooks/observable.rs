//! Observable properties.
//!
//! Two shapes of the same primitive:
//!
//! - [`Observable<T>`]: one typed, version-tracked cell.
//! - [`ObservableObject`]: a string-keyed bag of [`Value`]s where individual
//!   keys are made observable with [`ObservableObject::define`]. Writing a
//!   key that was never defined is a plain write with no notification.
//!
//! # Invariants
//!
//! 1. A write passes through the transform (if any) before comparison; the
//!    transform's output is what gets stored.
//! 2. Watchers fire synchronously, in registration order, only when the
//!    stored value changed under [`SameValue`].
//! 3. Watchers are invoked with no internal borrow held, so they may read or
//!    write the same observable.
//! 4. Whole-object watchers ([`ObservableObject::watch_all`]) receive one
//!    [`ObjectChange`] per synchronous burst, delivered as a microtask.
//! 5. Dropping a [`Subscription`] removes the callback before the next
//!    notification.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::form::value::Value;
use crate::hooks::same::SameValue;
use crate::runtime::Runtime;

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// RAII guard that unregisters a callback when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A subscription with nothing to release.
    pub fn empty() -> Self {
        Self { unsubscribe: None }
    }

    /// Keep the callback registered for the lifetime of its source.
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Ordered callback list shared by every emitter in the crate.
pub(crate) struct Listeners<F: ?Sized> {
    entries: RefCell<Vec<(u64, Rc<F>)>>,
    next_id: Cell<u64>,
}

impl<F: ?Sized + 'static> Listeners<F> {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            entries: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        })
    }

    pub(crate) fn add(self: &Rc<Self>, callback: Rc<F>) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push((id, callback));
        let weak: Weak<Self> = Rc::downgrade(self);
        Subscription::new(move || {
            if let Some(list) = weak.upgrade() {
                list.entries.borrow_mut().retain(|(entry, _)| *entry != id);
            }
        })
    }

    /// Callbacks registered right now. Taken before invoking any of them so
    /// callbacks may subscribe or unsubscribe freely.
    pub(crate) fn snapshot(&self) -> Vec<Rc<F>> {
        self.entries
            .borrow()
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Observable<T>
// ---------------------------------------------------------------------------

type Transform<T> = Box<dyn Fn(T, &T) -> T>;
type Watcher<T> = dyn Fn(&T, &T);

/// A shared, version-tracked value with synchronous change notification.
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

struct ObservableInner<T> {
    value: RefCell<T>,
    transform: Option<Transform<T>>,
    watchers: Rc<Listeners<Watcher<T>>>,
    version: Cell<u64>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + SameValue + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self::build(value, None)
    }

    /// Create an observable whose writes pass through `transform(new, old)`.
    pub fn with_transform(value: T, transform: impl Fn(T, &T) -> T + 'static) -> Self {
        Self::build(value, Some(Box::new(transform)))
    }

    fn build(value: T, transform: Option<Transform<T>>) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                value: RefCell::new(value),
                transform,
                watchers: Listeners::new(),
                version: Cell::new(0),
            }),
        }
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Number of changing writes so far.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Write a value. Returns whether the stored value changed.
    pub fn set(&self, value: T) -> bool {
        let old = self.get();
        let value = match &self.inner.transform {
            Some(transform) => transform(value, &old),
            None => value,
        };
        if old.same_value(&value) {
            return false;
        }
        *self.inner.value.borrow_mut() = value.clone();
        self.inner.version.set(self.inner.version.get() + 1);
        for watcher in self.inner.watchers.snapshot() {
            watcher(&value, &old);
        }
        true
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = self.with(f);
        self.set(next)
    }

    /// Register `callback(new, old)`.
    pub fn watch(&self, callback: impl Fn(&T, &T) + 'static) -> Subscription {
        self.inner.watchers.add(Rc::new(callback))
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.len()
    }

    /// A detached setter, as handed out by [`define_observable`].
    pub fn setter(&self) -> impl Fn(T) {
        let this = self.clone();
        move |value| {
            this.set(value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ObservableObject
// ---------------------------------------------------------------------------

/// Transform applied to writes of one key: `transform(new, old)`.
pub type ValueTransform = Rc<dyn Fn(Value, &Value) -> Value>;
type KeyWatcher = dyn Fn(&Value, &Value);
type BatchWatcher = dyn Fn(&ObjectChange);

/// Batched notification delivered to [`ObservableObject::watch_all`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectChange {
    /// Final value of every key written during the burst.
    pub new_values: IndexMap<String, Value>,
}

struct Prop {
    value: Value,
    observable: bool,
    transform: Option<ValueTransform>,
}

/// A keyed bag of values with per-key and whole-object watchers.
#[derive(Clone)]
pub struct ObservableObject {
    inner: Rc<ObjectInner>,
}

struct ObjectInner {
    runtime: Runtime,
    props: RefCell<IndexMap<String, Prop>>,
    watchers: RefCell<HashMap<String, Rc<Listeners<KeyWatcher>>>>,
    batch_watchers: Rc<Listeners<BatchWatcher>>,
    pending: RefCell<IndexMap<String, Value>>,
    flush_scheduled: Cell<bool>,
}

impl ObservableObject {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                runtime: runtime.clone(),
                props: RefCell::new(IndexMap::new()),
                watchers: RefCell::new(HashMap::new()),
                batch_watchers: Listeners::new(),
                pending: RefCell::new(IndexMap::new()),
                flush_scheduled: Cell::new(false),
            }),
        }
    }

    /// Make `key` observable with an initial value and optional transform.
    ///
    /// Redefining a key keeps its watchers and replaces value and transform.
    pub fn define(
        &self,
        key: impl Into<String>,
        initial: impl Into<Value>,
        transform: Option<ValueTransform>,
    ) -> impl Fn(Value) {
        let key = key.into();
        self.inner.props.borrow_mut().insert(
            key.clone(),
            Prop {
                value: initial.into(),
                observable: true,
                transform,
            },
        );
        let weak = Rc::downgrade(&self.inner);
        move |value| {
            if let Some(inner) = weak.upgrade() {
                ObservableObject { inner }.set(&key, value);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner
            .props
            .borrow()
            .get(key)
            .map(|prop| prop.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.props.borrow().contains_key(key)
    }

    pub fn is_observable(&self, key: &str) -> bool {
        self.inner
            .props
            .borrow()
            .get(key)
            .is_some_and(|prop| prop.observable)
    }

    /// Write a key. Returns whether watchers were notified.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let (old, transform) = {
            let mut props = self.inner.props.borrow_mut();
            match props.get_mut(key) {
                Some(prop) if prop.observable => (prop.value.clone(), prop.transform.clone()),
                Some(prop) => {
                    prop.value = value;
                    return false;
                }
                None => {
                    props.insert(
                        key.to_string(),
                        Prop {
                            value,
                            observable: false,
                            transform: None,
                        },
                    );
                    return false;
                }
            }
        };

        let value = match transform {
            Some(transform) => transform(value, &old),
            None => value,
        };
        if old.same_value(&value) {
            return false;
        }
        if let Some(prop) = self.inner.props.borrow_mut().get_mut(key) {
            prop.value = value.clone();
        }

        let watchers = self.inner.watchers.borrow().get(key).cloned();
        if let Some(watchers) = watchers {
            for watcher in watchers.snapshot() {
                watcher(&value, &old);
            }
        }
        self.record(key, value);
        true
    }

    /// Remove a key. Removal is a plain write and notifies nobody.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner
            .props
            .borrow_mut()
            .shift_remove(key)
            .map(|prop| prop.value)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.props.borrow().keys().cloned().collect()
    }

    pub fn to_map(&self) -> IndexMap<String, Value> {
        self.inner
            .props
            .borrow()
            .iter()
            .map(|(key, prop)| (key.clone(), prop.value.clone()))
            .collect()
    }

    /// Watch a single key: `callback(new, old)`.
    pub fn watch(&self, key: &str, callback: impl Fn(&Value, &Value) + 'static) -> Subscription {
        let listeners = Rc::clone(
            self.inner
                .watchers
                .borrow_mut()
                .entry(key.to_string())
                .or_insert_with(Listeners::new),
        );
        listeners.add(Rc::new(callback))
    }

    /// Watch every observable key, one batched notification per burst.
    pub fn watch_all(&self, callback: impl Fn(&ObjectChange) + 'static) -> Subscription {
        self.inner.batch_watchers.add(Rc::new(callback))
    }

    fn record(&self, key: &str, value: Value) {
        if self.inner.batch_watchers.is_empty() {
            return;
        }
        self.inner
            .pending
            .borrow_mut()
            .insert(key.to_string(), value);
        if self.inner.flush_scheduled.replace(true) {
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        self.inner.runtime.queue_microtask(move || {
            if let Some(inner) = weak.upgrade() {
                ObservableObject { inner }.flush();
            }
        });
    }

    fn flush(&self) {
        self.inner.flush_scheduled.set(false);
        let new_values = std::mem::take(&mut *self.inner.pending.borrow_mut());
        if new_values.is_empty() {
            return;
        }
        let change = ObjectChange { new_values };
        for watcher in self.inner.batch_watchers.snapshot() {
            watcher(&change);
        }
    }
}

impl fmt::Debug for ObservableObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableObject")
            .field("keys", &self.keys())
            .finish()
    }
}

/// Define an observable key on `object` and return its setter.
pub fn define_observable(
    object: &ObservableObject,
    key: &str,
    initial: impl Into<Value>,
    transform: Option<ValueTransform>,
) -> impl Fn(Value) {
    object.define(key.to_owned(), initial, transform)
}

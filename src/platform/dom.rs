//! DOM/event collaborator.
//!
//! The engine never touches a real document. Everything it needs from one
//! goes through [`DomHost`]: listener binding, event dispatch with optional
//! bubbling, focus, the source of the current input event, and the
//! navigation-lock primitive. [`HeadlessDom`] is an in-memory host with a
//! parent-linked element table, used by tests and by hosts without a
//! document.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;

use crate::form::value::Value;
use crate::hooks::observable::Subscription;
use crate::runtime::Runtime;

/// Opaque element handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

impl ElementId {
    /// The document root. Always present.
    pub const ROOT: ElementId = ElementId(0);
}

/// What produced the event currently being handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventSource {
    #[default]
    Script,
    Mouse,
    Keyboard,
    Touch,
    Other,
}

impl EventSource {
    pub fn is_script(self) -> bool {
        self == Self::Script
    }
}

/// Payload carried by an emitted event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDetail {
    Empty,
    Validate { name: String, value: Value },
    ValidationChange { name: String, is_valid: bool, message: Option<String> },
    Error { message: String },
}

/// Asynchronous answer from an event handler.
pub type Reply = LocalBoxFuture<'static, Option<Value>>;

/// `None` means "not handled, keep looking".
pub type EventHandler = Rc<dyn Fn(&EventDetail) -> Option<Reply>>;

pub trait DomHost {
    /// Bind `handler` to `event` on `target`. Dropping the subscription unbinds.
    fn on(&self, target: ElementId, event: &str, handler: EventHandler) -> Subscription;

    /// Dispatch `event` on `target`, walking ancestors when `bubbles` is set.
    /// Returns the first handler's reply, or `None` when nobody handled it.
    fn emit(&self, event: &str, target: ElementId, detail: EventDetail, bubbles: bool) -> Option<Reply>;

    fn focus(&self, element: ElementId) -> bool;

    fn active_element(&self) -> Option<ElementId>;

    fn set_active_element(&self, element: Option<ElementId>);

    fn event_source(&self) -> EventSource;

    /// Block navigation away from `element` until `pending` completes.
    /// `on_force_leave` runs if the user leaves anyway.
    fn prevent_leave(
        &self,
        element: ElementId,
        pending: LocalBoxFuture<'static, ()>,
        on_force_leave: Box<dyn FnOnce()>,
    );

    /// Position of `element` in document order, when known.
    fn document_position(&self, element: ElementId) -> Option<usize> {
        let _ = element;
        None
    }
}

struct Element {
    parent: Option<ElementId>,
    focusable: bool,
}

struct LeaveLock {
    element: ElementId,
    released: Rc<Cell<bool>>,
    on_force_leave: Option<Box<dyn FnOnce()>>,
}

type HandlerList = Vec<(u64, EventHandler)>;

/// In-memory [`DomHost`].
#[derive(Clone)]
pub struct HeadlessDom {
    inner: Rc<HeadlessInner>,
}

struct HeadlessInner {
    runtime: Runtime,
    elements: RefCell<Vec<Element>>,
    handlers: RefCell<HashMap<(ElementId, String), HandlerList>>,
    next_handler: Cell<u64>,
    active: Cell<Option<ElementId>>,
    source: Cell<EventSource>,
    locks: RefCell<Vec<LeaveLock>>,
    emitted: RefCell<Vec<(String, ElementId, EventDetail)>>,
}

impl HeadlessDom {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            inner: Rc::new(HeadlessInner {
                runtime: runtime.clone(),
                elements: RefCell::new(vec![Element {
                    parent: None,
                    focusable: false,
                }]),
                handlers: RefCell::new(HashMap::new()),
                next_handler: Cell::new(0),
                active: Cell::new(None),
                source: Cell::new(EventSource::Script),
                locks: RefCell::new(Vec::new()),
                emitted: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Append a focusable element under `parent`. Creation order is
    /// document order.
    pub fn create_element(&self, parent: ElementId) -> ElementId {
        let mut elements = self.inner.elements.borrow_mut();
        let id = ElementId(elements.len() as u64);
        elements.push(Element {
            parent: Some(parent),
            focusable: true,
        });
        id
    }

    pub fn set_event_source(&self, source: EventSource) {
        self.inner.source.set(source);
    }

    /// Run `f` as if it were handling an event from `source`.
    pub fn with_source<R>(&self, source: EventSource, f: impl FnOnce() -> R) -> R {
        let previous = self.inner.source.replace(source);
        let inner = Rc::clone(&self.inner);
        let _restore = scopeguard::guard((), move |_| inner.source.set(previous));
        f()
    }

    /// Leave locks whose pending work has not completed.
    pub fn pending_leave_locks(&self) -> usize {
        self.inner
            .locks
            .borrow()
            .iter()
            .filter(|lock| !lock.released.get())
            .count()
    }

    /// Simulate the user navigating away from `element` regardless of locks.
    /// Returns how many force-leave callbacks ran.
    pub fn force_leave(&self, element: ElementId) -> usize {
        let callbacks: Vec<Box<dyn FnOnce()>> = self
            .inner
            .locks
            .borrow_mut()
            .iter_mut()
            .filter(|lock| lock.element == element && !lock.released.get())
            .filter_map(|lock| lock.on_force_leave.take())
            .collect();
        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        count
    }

    /// Every event emitted so far, oldest first.
    pub fn emitted(&self) -> Vec<(String, ElementId, EventDetail)> {
        self.inner.emitted.borrow().clone()
    }

    fn parent_of(&self, element: ElementId) -> Option<ElementId> {
        self.inner
            .elements
            .borrow()
            .get(element.0 as usize)
            .and_then(|el| el.parent)
    }

    fn handlers_for(&self, element: ElementId, event: &str) -> Vec<EventHandler> {
        self.inner
            .handlers
            .borrow()
            .get(&(element, event.to_string()))
            .map(|list| list.iter().map(|(_, h)| Rc::clone(h)).collect())
            .unwrap_or_default()
    }
}

impl DomHost for HeadlessDom {
    fn on(&self, target: ElementId, event: &str, handler: EventHandler) -> Subscription {
        let id = self.inner.next_handler.get();
        self.inner.next_handler.set(id + 1);
        let key = (target, event.to_string());
        self.inner
            .handlers
            .borrow_mut()
            .entry(key.clone())
            .or_default()
            .push((id, handler));
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Some(list) = inner.handlers.borrow_mut().get_mut(&key) {
                    list.retain(|(entry, _)| *entry != id);
                }
            }
        })
    }

    fn emit(&self, event: &str, target: ElementId, detail: EventDetail, bubbles: bool) -> Option<Reply> {
        self.inner
            .emitted
            .borrow_mut()
            .push((event.to_string(), target, detail.clone()));
        let mut current = Some(target);
        while let Some(element) = current {
            for handler in self.handlers_for(element, event) {
                if let Some(reply) = handler(&detail) {
                    return Some(reply);
                }
            }
            if !bubbles {
                break;
            }
            current = self.parent_of(element);
        }
        None
    }

    fn focus(&self, element: ElementId) -> bool {
        let focusable = self
            .inner
            .elements
            .borrow()
            .get(element.0 as usize)
            .is_some_and(|el| el.focusable);
        if focusable {
            self.inner.active.set(Some(element));
        }
        focusable
    }

    fn active_element(&self) -> Option<ElementId> {
        self.inner.active.get()
    }

    fn set_active_element(&self, element: Option<ElementId>) {
        self.inner.active.set(element);
    }

    fn event_source(&self) -> EventSource {
        self.inner.source.get()
    }

    fn prevent_leave(
        &self,
        element: ElementId,
        pending: LocalBoxFuture<'static, ()>,
        on_force_leave: Box<dyn FnOnce()>,
    ) {
        let released = Rc::new(Cell::new(false));
        let flag = Rc::clone(&released);
        let _task = self.inner.runtime.spawn(async move {
            pending.await;
            flag.set(true);
        });
        self.inner.locks.borrow_mut().push(LeaveLock {
            element,
            released,
            on_force_leave: Some(on_force_leave),
        });
    }

    fn document_position(&self, element: ElementId) -> Option<usize> {
        let known = (element.0 as usize) < self.inner.elements.borrow().len();
        known.then_some(element.0 as usize)
    }
}

impl fmt::Debug for HeadlessDom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessDom")
            .field("elements", &self.inner.elements.borrow().len())
            .field("active", &self.inner.active.get())
            .field("source", &self.inner.source.get())
            .finish()
    }
}

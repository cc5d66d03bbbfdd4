//! Async-load state cell.
//!
//! [`AsyncState::run`] aborts whatever load is in flight and starts a new
//! one on the runtime executor. Only the most recent load may settle the
//! state. Failures are stored, never dropped: a failure no local handler
//! claims is re-emitted as an `error` event through the [`DomHost`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::{AbortHandle, Abortable, Aborted};

use crate::hooks::observable::{Observable, Subscription};
use crate::hooks::same::SameValue;
use crate::hooks::scope::Scope;
use crate::platform::dom::{DomHost, ElementId, EventDetail};
use crate::runtime::Runtime;

#[derive(Debug, thiserror::Error)]
pub enum AsyncError<E> {
    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(E),
}

impl<E> AsyncError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Observable state of an [`AsyncState`].
#[derive(Debug)]
pub struct AsyncSnapshot<T, E> {
    pub loading: bool,
    pub value: Option<Rc<T>>,
    pub error: Option<Rc<AsyncError<E>>>,
}

impl<T, E> Clone for AsyncSnapshot<T, E> {
    fn clone(&self) -> Self {
        Self {
            loading: self.loading,
            value: self.value.clone(),
            error: self.error.clone(),
        }
    }
}

impl<T, E> Default for AsyncSnapshot<T, E> {
    fn default() -> Self {
        Self {
            loading: false,
            value: None,
            error: None,
        }
    }
}

impl<T, E> SameValue for AsyncSnapshot<T, E> {
    fn same_value(&self, other: &Self) -> bool {
        self.loading == other.loading
            && self.value.same_value(&other.value)
            && self.error.same_value(&other.error)
    }
}

type ErrorHandler<E> = Rc<dyn Fn(&AsyncError<E>) -> bool>;

pub struct AsyncState<T, E> {
    inner: Rc<AsyncInner<T, E>>,
}

struct AsyncInner<T, E> {
    runtime: Runtime,
    state: Observable<AsyncSnapshot<T, E>>,
    generation: Cell<u64>,
    abort: RefCell<Option<AbortHandle>>,
    on_error: RefCell<Option<ErrorHandler<E>>>,
    host: RefCell<Option<(Rc<dyn DomHost>, ElementId)>>,
}

impl<T, E> Clone for AsyncState<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static, E: fmt::Display + 'static> AsyncState<T, E> {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            inner: Rc::new(AsyncInner {
                runtime: runtime.clone(),
                state: Observable::new(AsyncSnapshot::default()),
                generation: Cell::new(0),
                abort: RefCell::new(None),
                on_error: RefCell::new(None),
                host: RefCell::new(None),
            }),
        }
    }

    /// Element whose `error` channel receives unhandled failures.
    pub fn bind_element(&self, host: Rc<dyn DomHost>, element: ElementId) {
        *self.inner.host.borrow_mut() = Some((host, element));
    }

    /// Local failure handler. Returning `true` claims the error.
    pub fn set_error_handler(&self, handler: impl Fn(&AsyncError<E>) -> bool + 'static) {
        *self.inner.on_error.borrow_mut() = Some(Rc::new(handler));
    }

    pub fn snapshot(&self) -> AsyncSnapshot<T, E> {
        self.inner.state.get()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.with(|s| s.loading)
    }

    pub fn value(&self) -> Option<Rc<T>> {
        self.inner.state.with(|s| s.value.clone())
    }

    pub fn error(&self) -> Option<Rc<AsyncError<E>>> {
        self.inner.state.with(|s| s.error.clone())
    }

    pub fn watch(&self, callback: impl Fn(&AsyncSnapshot<T, E>) + 'static) -> Subscription {
        self.inner.state.watch(move |new, _| callback(new))
    }

    /// Start a load, cancelling the previous one.
    pub fn run(&self, load: impl Future<Output = Result<T, E>> + 'static) {
        self.abort_in_flight();
        let generation = self.inner.generation.get() + 1;
        self.inner.generation.set(generation);

        let (handle, registration) = AbortHandle::new_pair();
        *self.inner.abort.borrow_mut() = Some(handle);
        self.inner.state.update(|s| AsyncSnapshot {
            loading: true,
            value: s.value.clone(),
            error: None,
        });

        let weak = Rc::downgrade(&self.inner);
        let load = Abortable::new(load, registration);
        let _task = self.inner.runtime.spawn(async move {
            let outcome = load.await;
            if let Some(inner) = weak.upgrade() {
                AsyncState { inner }.settle(generation, outcome);
            }
        });
    }

    /// Cancel the in-flight load. Its state settles as cancelled.
    pub fn abort(&self) {
        if let Some(handle) = self.inner.abort.borrow().as_ref() {
            handle.abort();
        }
    }

    fn abort_in_flight(&self) {
        if let Some(handle) = self.inner.abort.borrow_mut().take() {
            handle.abort();
        }
    }

    fn settle(&self, generation: u64, outcome: Result<Result<T, E>, Aborted>) {
        if generation != self.inner.generation.get() {
            return;
        }
        self.inner.abort.borrow_mut().take();
        match outcome {
            Ok(Ok(value)) => {
                self.inner.state.set(AsyncSnapshot {
                    loading: false,
                    value: Some(Rc::new(value)),
                    error: None,
                });
            }
            Ok(Err(error)) => {
                let error = Rc::new(AsyncError::Failed(error));
                self.inner.state.update(|s| AsyncSnapshot {
                    loading: false,
                    value: s.value.clone(),
                    error: Some(Rc::clone(&error)),
                });
                self.report(&error);
            }
            Err(Aborted) => {
                tracing::debug!(generation, "async load cancelled");
                self.inner.state.update(|s| AsyncSnapshot {
                    loading: false,
                    value: s.value.clone(),
                    error: Some(Rc::new(AsyncError::Cancelled)),
                });
            }
        }
    }

    fn report(&self, error: &AsyncError<E>) {
        let handler = self.inner.on_error.borrow().clone();
        if handler.is_some_and(|handler| handler(error)) {
            return;
        }
        let host = self.inner.host.borrow().clone();
        let message = error.to_string();
        let handled = host.is_some_and(|(host, element)| {
            host.emit(
                "error",
                element,
                EventDetail::Error {
                    message: message.clone(),
                },
                true,
            )
            .is_some()
        });
        if !handled {
            tracing::warn!(error = %message, "unhandled async load failure");
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for AsyncState<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncState")
            .field("state", &self.inner.state)
            .field("generation", &self.inner.generation.get())
            .finish()
    }
}

/// Async state owned by `scope`: re-renders on change, aborts on unmount.
pub fn use_async<T: 'static, E: fmt::Display + 'static>(scope: &Scope) -> AsyncState<T, E> {
    let state = scope.memo(|| {
        let state = AsyncState::new(scope.runtime());
        let trigger = scope.trigger().clone();
        scope.hold(state.watch(move |_| trigger.schedule()));
        let owned = state.clone();
        scope.on_unmount(move || owned.abort());
        state
    });
    (*state).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::dom::HeadlessDom;
    use futures::channel::oneshot;
    use futures::FutureExt;

    #[test]
    fn successful_load_stores_value() {
        let rt = Runtime::new();
        let state = AsyncState::<u32, String>::new(&rt);
        state.run(async { Ok(7) });
        assert!(state.is_loading());
        rt.run_until_idle();
        assert!(!state.is_loading());
        assert_eq!(state.value().as_deref(), Some(&7));
    }

    #[test]
    fn newer_run_cancels_older() {
        let rt = Runtime::new();
        let state = AsyncState::<&'static str, String>::new(&rt);
        let (tx, rx) = oneshot::channel::<()>();
        state.run(async move {
            let _ = rx.await;
            Ok("stale")
        });
        state.run(async { Ok("fresh") });
        let _ = tx.send(());
        rt.run_until_idle();
        assert_eq!(state.value().as_deref(), Some(&"fresh"));
        assert!(state.error().is_none());
    }

    #[test]
    fn abort_settles_as_cancelled() {
        let rt = Runtime::new();
        let state = AsyncState::<u8, String>::new(&rt);
        let (_tx, rx) = oneshot::channel::<()>();
        state.run(async move {
            let _ = rx.await;
            Ok(1)
        });
        rt.run_until_idle();
        state.abort();
        rt.run_until_idle();
        assert!(!state.is_loading());
        assert!(state.error().is_some_and(|e| e.is_cancelled()));
    }

    #[test]
    fn local_handler_claims_failure() {
        let rt = Runtime::new();
        let dom = HeadlessDom::new(&rt);
        let state = AsyncState::<u8, String>::new(&rt);
        state.bind_element(Rc::new(dom.clone()), ElementId::ROOT);
        state.set_error_handler(|_| true);
        state.run(async { Err(String::from("boom")) });
        rt.run_until_idle();
        assert!(dom.emitted().is_empty());
        assert_eq!(state.error().map(|e| e.to_string()).as_deref(), Some("boom"));
    }

    #[test]
    fn unhandled_failure_bubbles_to_host() {
        let rt = Runtime::new();
        let dom = HeadlessDom::new(&rt);
        let child = dom.create_element(ElementId::ROOT);
        let caught = Rc::new(Cell::new(false));
        let c = Rc::clone(&caught);
        let _sub = dom.on(
            ElementId::ROOT,
            "error",
            Rc::new(move |_: &EventDetail| {
                c.set(true);
                Some(async { None::<crate::form::value::Value> }.boxed_local())
            }),
        );
        let state = AsyncState::<u8, String>::new(&rt);
        state.bind_element(Rc::new(dom.clone()), child);
        state.run(async { Err(String::from("offline")) });
        rt.run_until_idle();
        assert!(caught.get());
    }
}

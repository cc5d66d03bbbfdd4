//! Eager state cells.
//!
//! ```text
//! Action ──→ Reducer ──→ State ──→ View
//!    ↑                              │
//!    └──────────────────────────────┘
//! ```
//!
//! Dispatching runs the reducer right away. The new state is visible to the
//! next read, and the owner's [`RenderTrigger`] is scheduled only when the
//! state actually changed under [`SameValue`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::hooks::render::RenderTrigger;
use crate::hooks::same::SameValue;
use crate::hooks::scope::Scope;

type ReduceFn<S, A> = Rc<dyn Fn(&S, A) -> S>;
type SameFn<S> = Rc<dyn Fn(&S, &S) -> bool>;

/// A state cell whose dispatch applies the reducer synchronously.
pub struct EagerReducer<S, A> {
    state: Rc<RefCell<S>>,
    reducer: ReduceFn<S, A>,
    same: SameFn<S>,
    trigger: RenderTrigger,
}

impl<S, A> Clone for EagerReducer<S, A> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            reducer: Rc::clone(&self.reducer),
            same: Rc::clone(&self.same),
            trigger: self.trigger.clone(),
        }
    }
}

impl<S: Clone + SameValue + 'static, A: 'static> EagerReducer<S, A> {
    pub fn new(trigger: RenderTrigger, reducer: impl Fn(&S, A) -> S + 'static, initial: S) -> Self {
        Self::build(trigger, Rc::new(reducer), initial, Rc::new(S::same_value))
    }

    /// Like [`new`](Self::new), computing the initial state on demand.
    pub fn lazy(
        trigger: RenderTrigger,
        reducer: impl Fn(&S, A) -> S + 'static,
        init: impl FnOnce() -> S,
    ) -> Self {
        Self::new(trigger, reducer, init())
    }
}

impl<S: Clone + 'static, A: 'static> EagerReducer<S, A> {
    fn build(trigger: RenderTrigger, reducer: ReduceFn<S, A>, initial: S, same: SameFn<S>) -> Self {
        Self {
            state: Rc::new(RefCell::new(initial)),
            reducer,
            same,
            trigger,
        }
    }

    pub fn state(&self) -> S {
        self.state.borrow().clone()
    }

    /// Apply `action`. Returns whether the state changed.
    pub fn dispatch(&self, action: A) -> bool {
        let current = self.state();
        let next = (self.reducer)(&current, action);
        if (self.same)(&current, &next) {
            return false;
        }
        *self.state.borrow_mut() = next;
        self.trigger.schedule();
        true
    }

    /// A detached dispatcher.
    pub fn dispatcher(&self) -> impl Fn(A) -> bool {
        let this = self.clone();
        move |action| this.dispatch(action)
    }
}

impl<S: fmt::Debug, A> fmt::Debug for EagerReducer<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerReducer")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

/// Action accepted by [`EagerState`]: a literal value or an updater.
pub enum Update<T> {
    Replace(T),
    With(Box<dyn FnOnce(&T) -> T>),
}

impl<T> Update<T> {
    pub fn with(f: impl FnOnce(&T) -> T + 'static) -> Self {
        Self::With(Box::new(f))
    }

    fn apply(self, previous: &T) -> T {
        match self {
            Self::Replace(value) => value,
            Self::With(f) => f(previous),
        }
    }
}

/// [`EagerReducer`] specialised to plain replacement and updater functions.
#[derive(Clone)]
pub struct EagerState<T> {
    cell: EagerReducer<T, Update<T>>,
}

impl<T: Clone + SameValue + 'static> EagerState<T> {
    pub fn new(trigger: RenderTrigger, initial: T) -> Self {
        Self {
            cell: EagerReducer::new(trigger, |state: &T, update: Update<T>| update.apply(state), initial),
        }
    }

    pub fn get(&self) -> T {
        self.cell.state()
    }

    pub fn set(&self, value: T) -> bool {
        self.cell.dispatch(Update::Replace(value))
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T + 'static) -> bool {
        self.cell.dispatch(Update::with(f))
    }
}

impl<T: fmt::Debug> fmt::Debug for EagerState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerState")
            .field("state", &*self.cell.state.borrow())
            .finish()
    }
}

/// Eager reducer bound to `scope`'s render trigger. The reducer and
/// initial state of the first render are kept for the mount's lifetime.
pub fn use_eager_reducer<S, A>(
    scope: &Scope,
    reducer: impl Fn(&S, A) -> S + 'static,
    init: impl FnOnce() -> S,
) -> EagerReducer<S, A>
where
    S: Clone + SameValue + 'static,
    A: 'static,
{
    let cell = scope.memo(|| EagerReducer::lazy(scope.trigger().clone(), reducer, init));
    (*cell).clone()
}

pub fn use_eager_state<T: Clone + SameValue + 'static>(scope: &Scope, initial: T) -> EagerState<T> {
    let cell = scope.memo(|| EagerState::new(scope.trigger().clone(), initial));
    (*cell).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    #[test]
    fn dispatch_is_visible_immediately() {
        let rt = Runtime::new();
        let trigger = RenderTrigger::new(&rt, || {});
        let cell = EagerReducer::new(trigger.clone(), |s: &i32, a: i32| s + a, 1);

        assert!(cell.dispatch(2));
        assert_eq!(cell.state(), 3);
        rt.run_until_idle();
        assert_eq!(trigger.render_count(), 1);
    }

    #[test]
    fn unchanged_state_schedules_nothing() {
        let trigger = RenderTrigger::noop();
        let cell = EagerReducer::new(trigger.clone(), |s: &i32, _: ()| *s, 0);
        assert!(!cell.dispatch(()));
        assert_eq!(trigger.render_count(), 0);
    }

    #[test]
    fn signed_zero_counts_as_change_but_nan_does_not() {
        let trigger = RenderTrigger::noop();
        let state = EagerState::new(trigger.clone(), 0.0f64);
        assert!(state.set(-0.0));
        assert!(state.set(f64::NAN));
        assert!(!state.set(f64::NAN));
        assert_eq!(trigger.render_count(), 2);
    }

    #[test]
    fn rc_state_compares_by_identity() {
        let trigger = RenderTrigger::noop();
        let first = Rc::new(vec![1]);
        let state = EagerState::new(trigger, Rc::clone(&first));
        assert!(!state.set(Rc::clone(&first)));
        assert!(state.set(Rc::new(vec![1])));
    }

    #[test]
    fn updater_sees_previous_value() {
        let state = EagerState::new(RenderTrigger::noop(), 5);
        state.update(|prev| prev * 2);
        assert_eq!(state.get(), 10);
    }
}

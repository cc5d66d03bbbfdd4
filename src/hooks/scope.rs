//! Per-mount lifetime owner.
//!
//! A [`Scope`] stands in for one mounted consumer of the rendering
//! collaborator. It carries the consumer's [`RenderTrigger`], owns the
//! [`Subscription`]s created while setting it up, and runs unmount cleanups
//! in reverse registration order. Dropping a scope unmounts it.
//!
//! Each `use_*` call takes the next memo slot of the current render pass,
//! so hooks must be called in the same order on every render.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::hooks::observable::Subscription;
use crate::hooks::render::RenderTrigger;
use crate::runtime::Runtime;

pub struct Scope {
    runtime: Runtime,
    trigger: RenderTrigger,
    strict: bool,
    subscriptions: RefCell<Vec<Subscription>>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    slots: RefCell<Vec<Option<Rc<dyn Any>>>>,
    cursor: Cell<usize>,
    mounted: Cell<bool>,
}

impl Scope {
    /// Mount a scope. The strict flag comes from the runtime settings.
    pub fn new(runtime: &Runtime, trigger: RenderTrigger) -> Self {
        let strict = runtime.settings().strict;
        Self::with_strict(runtime, trigger, strict)
    }

    pub fn with_strict(runtime: &Runtime, trigger: RenderTrigger, strict: bool) -> Self {
        Self {
            runtime: runtime.clone(),
            trigger,
            strict,
            subscriptions: RefCell::new(Vec::new()),
            cleanups: RefCell::new(Vec::new()),
            slots: RefCell::new(Vec::new()),
            cursor: Cell::new(0),
            mounted: Cell::new(true),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn trigger(&self) -> &RenderTrigger {
        &self.trigger
    }

    /// Whether the host double-invokes setup/teardown for this mount.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    /// Run one render pass. Hook calls inside `f` find the state their
    /// counterparts created on earlier passes.
    pub fn render<R>(&self, f: impl FnOnce(&Scope) -> R) -> R {
        self.begin_render();
        f(self)
    }

    /// Rewind the memo cursor to the first slot.
    pub fn begin_render(&self) {
        self.cursor.set(0);
    }

    /// The value stored in the next memo slot, created by `init` the first
    /// time the slot is reached. A slot holding another type is replaced.
    pub fn memo<T: 'static>(&self, init: impl FnOnce() -> T) -> Rc<T> {
        let index = self.cursor.get();
        self.cursor.set(index + 1);
        let existing = self.slots.borrow().get(index).cloned().flatten();
        if let Some(slot) = existing {
            match slot.downcast::<T>() {
                Ok(value) => return value,
                Err(_) => tracing::warn!(index, "hook order changed between renders"),
            }
        }
        let value = Rc::new(init());
        let mut slots = self.slots.borrow_mut();
        if slots.len() <= index {
            slots.resize_with(index + 1, || None);
        }
        slots[index] = Some(Rc::clone(&value) as Rc<dyn Any>);
        value
    }

    /// Memo slots filled so far.
    pub fn slot_count(&self) -> usize {
        self.slots.borrow().iter().filter(|slot| slot.is_some()).count()
    }

    /// Keep `subscription` alive until unmount.
    pub fn hold(&self, subscription: Subscription) {
        if self.is_mounted() {
            self.subscriptions.borrow_mut().push(subscription);
        }
    }

    /// Run `cleanup` on unmount. Runs immediately if already unmounted.
    pub fn on_unmount(&self, cleanup: impl FnOnce() + 'static) {
        if self.is_mounted() {
            self.cleanups.borrow_mut().push(Box::new(cleanup));
        } else {
            cleanup();
        }
    }

    /// Release held subscriptions and run cleanups, newest first.
    pub fn unmount(&self) {
        if !self.mounted.replace(false) {
            return;
        }
        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        drop(subscriptions);
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
        let slots = std::mem::take(&mut *self.slots.borrow_mut());
        drop(slots);
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("strict", &self.strict)
            .field("mounted", &self.is_mounted())
            .field("subscriptions", &self.subscriptions.borrow().len())
            .field("cleanups", &self.cleanups.borrow().len())
            .field("slots", &self.slot_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn cleanups_run_in_reverse_order_once() {
        let rt = Runtime::new();
        let scope = Scope::new(&rt, RenderTrigger::noop());
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let log = Rc::clone(&log);
            scope.on_unmount(move || log.borrow_mut().push(tag));
        }
        scope.unmount();
        scope.unmount();
        assert_eq!(*log.borrow(), vec!["second", "first"]);
    }

    #[test]
    fn held_subscriptions_release_on_unmount() {
        let rt = Runtime::new();
        let released = Rc::new(Cell::new(false));
        {
            let scope = Scope::new(&rt, RenderTrigger::noop());
            let r = Rc::clone(&released);
            scope.hold(Subscription::new(move || r.set(true)));
            assert!(!released.get());
        }
        assert!(released.get());
    }

    #[test]
    fn memo_slots_survive_renders() {
        let rt = Runtime::new();
        let scope = Scope::new(&rt, RenderTrigger::noop());
        let built = Rc::new(Cell::new(0));
        let pass = || {
            scope.render(|scope| {
                let b = Rc::clone(&built);
                let first = scope.memo(move || {
                    b.set(b.get() + 1);
                    "first"
                });
                let second = scope.memo(|| 2u8);
                (*first, *second)
            })
        };
        assert_eq!(pass(), ("first", 2));
        assert_eq!(pass(), ("first", 2));
        assert_eq!(built.get(), 1);
        assert_eq!(scope.slot_count(), 2);

        scope.begin_render();
        assert_eq!(*scope.memo(|| 7i64), 7, "mismatched slot is replaced");
    }

    #[test]
    fn strict_flag_defaults_from_runtime() {
        let rt = Runtime::new();
        rt.update_settings(|s| s.strict = true);
        assert!(Scope::new(&rt, RenderTrigger::noop()).is_strict());
    }
}

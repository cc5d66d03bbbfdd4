//! Re-render trigger supplied by the rendering collaborator.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::runtime::Runtime;

/// Requests a re-render of one mounted consumer.
///
/// Any number of [`schedule`](Self::schedule) calls within one synchronous
/// task collapse into a single render, delivered as a microtask.
#[derive(Clone)]
pub struct RenderTrigger {
    inner: Rc<TriggerInner>,
}

struct TriggerInner {
    runtime: Option<Runtime>,
    render: Box<dyn Fn()>,
    scheduled: Cell<bool>,
    renders: Cell<u64>,
}

impl RenderTrigger {
    pub fn new(runtime: &Runtime, render: impl Fn() + 'static) -> Self {
        Self {
            inner: Rc::new(TriggerInner {
                runtime: Some(runtime.clone()),
                render: Box::new(render),
                scheduled: Cell::new(false),
                renders: Cell::new(0),
            }),
        }
    }

    /// A trigger that only counts requests.
    pub fn noop() -> Self {
        Self {
            inner: Rc::new(TriggerInner {
                runtime: None,
                render: Box::new(|| {}),
                scheduled: Cell::new(false),
                renders: Cell::new(0),
            }),
        }
    }

    pub fn schedule(&self) {
        if self.inner.scheduled.replace(true) {
            return;
        }
        match &self.inner.runtime {
            Some(runtime) => {
                let weak = Rc::downgrade(&self.inner);
                runtime.queue_microtask(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.fire();
                    }
                });
            }
            None => self.inner.fire(),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.inner.scheduled.get()
    }

    /// Renders delivered so far.
    pub fn render_count(&self) -> u64 {
        self.inner.renders.get()
    }
}

impl TriggerInner {
    fn fire(&self) {
        self.scheduled.set(false);
        self.renders.set(self.renders.get() + 1);
        (self.render)();
    }
}

impl fmt::Debug for RenderTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTrigger")
            .field("scheduled", &self.is_scheduled())
            .field("renders", &self.render_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedules_coalesce_into_one_render() {
        let rt = Runtime::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let trigger = RenderTrigger::new(&rt, move || h.set(h.get() + 1));

        trigger.schedule();
        trigger.schedule();
        assert!(trigger.is_scheduled());
        rt.run_until_idle();

        assert_eq!(hits.get(), 1);
        assert_eq!(trigger.render_count(), 1);
        assert!(!trigger.is_scheduled());
    }

    #[test]
    fn noop_trigger_counts_immediately() {
        let trigger = RenderTrigger::noop();
        trigger.schedule();
        trigger.schedule();
        assert_eq!(trigger.render_count(), 2);
    }
}

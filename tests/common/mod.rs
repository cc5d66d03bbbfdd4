//! Shared test utilities.

#![allow(dead_code, unused_imports)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bindery::form::{DataChange, DataTree, FormContext, FormOptions, Value};
use bindery::hooks::Subscription;
use bindery::platform::{DomHost, ElementId, HeadlessDom};
use bindery::Runtime;

/// Build a [`Value`] from a `serde_json::json!` literal.
pub fn val(json: serde_json::Value) -> Value {
    Value::from(json)
}

pub fn tree(rt: &Runtime, json: serde_json::Value) -> DataTree {
    DataTree::new(rt, val(json)).expect("container data")
}

pub fn form(rt: &Runtime, json: serde_json::Value) -> FormContext {
    FormContext::new(rt, FormOptions::new(val(json))).expect("container data")
}

/// A form wired to a fresh headless document, bound to one element.
pub fn form_with_dom(rt: &Runtime, options: FormOptions) -> (FormContext, HeadlessDom, ElementId) {
    let dom = HeadlessDom::new(rt);
    let element = dom.create_element(ElementId::ROOT);
    let host: Rc<dyn DomHost> = Rc::new(dom.clone());
    let form = FormContext::new(rt, options.dom(host).element(element)).expect("container data");
    (form, dom, element)
}

/// Every `DataChange` the tree emits, as sorted path strings.
pub struct ChangeLog {
    entries: Rc<RefCell<Vec<Vec<String>>>>,
    _subscription: Subscription,
}

impl ChangeLog {
    pub fn attach(tree: &DataTree) -> Self {
        let entries = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&entries);
        let subscription = tree.subscribe(move |change: &DataChange| {
            let mut paths = change.path_strings();
            paths.sort();
            sink.borrow_mut().push(paths);
        });
        Self {
            entries,
            _subscription: subscription,
        }
    }

    pub fn events(&self) -> Vec<Vec<String>> {
        self.entries.borrow().clone()
    }

    pub fn count(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// A shared call counter.
#[derive(Clone, Default)]
pub struct Counter(Rc<Cell<usize>>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.0.set(self.0.get() + 1);
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }
}

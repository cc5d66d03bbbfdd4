//! Collaborators the engine talks to: the document host and view-state
//! persistence.

pub mod dom;
pub mod view_state;

pub use dom::{DomHost, ElementId, EventDetail, EventHandler, EventSource, HeadlessDom, Reply};
pub use view_state::{FileStore, MemoryBackend, MemoryStore, NoopStore, StoreError, ViewStateStore};

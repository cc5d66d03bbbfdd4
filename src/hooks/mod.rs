//! Reactive primitives shared by forms and data views.

pub mod async_state;
pub mod dependency;
pub mod observable;
pub mod reducer;
pub mod render;
pub mod same;
pub mod scope;
pub mod singleton;

pub use async_state::{use_async, AsyncError, AsyncSnapshot, AsyncState};
pub use dependency::{create_dependency, provide_dependency, use_dependency, Dependency, Provider};
pub use observable::{define_observable, ObjectChange, Observable, ObservableObject, Subscription, ValueTransform};
pub use reducer::{use_eager_reducer, use_eager_state, EagerReducer, EagerState, Update};
pub use render::RenderTrigger;
pub use same::{same_value_zero, SameValue};
pub use scope::Scope;
pub use singleton::{
    is_singleton_disposed, use_singleton, DisposeIntent, Singleton, SingletonId, SingletonRegistry,
    SingletonState,
};

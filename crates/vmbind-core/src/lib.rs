#![forbid(unsafe_code)]

//! Change-notifying view models for declarative UI bindings.
//!
//! - [`ChangeNotifier`]: per-object property-change channel.
//! - [`ObservableList`]: a list of view models that republishes element
//!   changes and raises structural events.
//! - [`Interceptor`]: the core of hand-written decorators that raise change
//!   events after broadcastable calls.
//! - [`ViewModelRegistry`]: binds view-model interfaces to implementations in
//!   a [`Container`], served as decorators.
//!
//! Everything is single-threaded (`Rc`/`RefCell`).

pub mod broadcast;
pub mod config;
pub mod container;
pub mod intercept;
pub mod list;
pub mod notifier;
pub mod registry;
pub mod view_model;

pub use broadcast::{BroadcastDescriptor, MemberKind};
pub use config::{AmbiguityPolicy, ConfigError, Lifetime, RegistryConfig};
pub use container::{Arguments, Container, InterfaceKey, ResolveError};
pub use intercept::Interceptor;
pub use list::{
    COUNT_PROPERTY, CollectionAction, CollectionChanged, ErasedList, INDEXER_PROPERTY, ListError,
    ObservableList,
};
pub use notifier::{
    ChangeNotifier, EventChannel, HandlerId, ObjectId, PropertyChanged, Subscription,
};
pub use registry::{
    Implementation, ImplementationBuilder, RegistrationReport, RegistryError, SkipReason,
    ViewModelInterface, ViewModelRegistry, register_view_models,
};
pub use view_model::ViewModel;

/// Re-exported for implementing [`ViewModel::report_update`] and
/// [`ViewModel::dispose_async`].
pub use async_trait::async_trait;

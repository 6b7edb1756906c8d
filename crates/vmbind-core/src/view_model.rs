#![forbid(unsafe_code)]

//! The view-model marker capability.
//!
//! Every view-model interface extends [`ViewModel`]. A view model owns a
//! [`ChangeNotifier`] and exposes it; everything else (raising, disposal,
//! the asynchronous update acknowledgement) has default behavior built on
//! that notifier.
//!
//! # Invariants
//!
//! 1. A broadcastable mutation raises exactly one event naming the mutated
//!    property, after the mutation is applied.
//! 2. `dispose()` releases every subscriber of the view model's notifier.

use async_trait::async_trait;

use crate::notifier::{ChangeNotifier, ObjectId};

/// Marker capability shared by every view-model interface.
///
/// Implementors only have to provide [`ViewModel::notifier`]. Decorators
/// forward every method to the instance they wrap, so subscribers attached to
/// either see the same events.
#[async_trait(?Send)]
pub trait ViewModel: 'static {
    /// The view model's change channel.
    fn notifier(&self) -> &ChangeNotifier;

    /// Identity of this view model (the notifier's identity).
    fn object_id(&self) -> ObjectId {
        self.notifier().id()
    }

    /// Raise a change event for `property_name`.
    fn raise_property_changed(&self, property_name: &str) {
        self.notifier().notify(property_name);
    }

    /// Asynchronous acknowledgement that `property_name` changed.
    ///
    /// Awaited by [`Interceptor::intercept_async`] after each emitted event.
    ///
    /// [`Interceptor::intercept_async`]: crate::intercept::Interceptor::intercept_async
    async fn report_update(&self, _property_name: &str) {}

    /// Release all event links.
    fn dispose(&self) {
        self.notifier().clear();
    }

    /// Asynchronous disposal. Defaults to [`ViewModel::dispose`].
    async fn dispose_async(&self) {
        self.dispose();
    }
}

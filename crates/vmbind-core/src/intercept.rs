#![forbid(unsafe_code)]

//! Call interception for view-model decorators.
//!
//! A decorator is a hand-written type implementing a view-model interface by
//! holding an [`Interceptor`] and routing every interface call through it:
//!
//! ```ignore
//! impl<V: Counter> Counter for CounterProxy<V> {
//!     fn set_count(&self, value: i32) {
//!         self.0.intercept("set_count", |vm| vm.set_count(value))
//!     }
//! }
//! ```
//!
//! After the real call returns, the interceptor looks the member up in the
//! interface's [`BroadcastDescriptor`] and raises one change event per target
//! property on the **wrapped** view model's notifier, so subscribers attached
//! to the real instance observe decorator-triggered changes too.
//!
//! # Failure Modes
//!
//! - A panicking call unwinds before any event is raised.
//! - [`Interceptor::try_intercept`] raises nothing when the call returns `Err`.
//! - A member missing from the descriptor raises nothing (no error).

use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::broadcast::BroadcastDescriptor;
use crate::view_model::ViewModel;

/// The real instance plus the broadcast metadata of the interface it is
/// exposed through.
pub struct Interceptor<V: ?Sized> {
    target: Rc<V>,
    descriptor: Rc<BroadcastDescriptor>,
}

impl<V: ?Sized> Clone for Interceptor<V> {
    fn clone(&self) -> Self {
        Self {
            target: Rc::clone(&self.target),
            descriptor: Rc::clone(&self.descriptor),
        }
    }
}

impl<V: ?Sized> fmt::Debug for Interceptor<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("interface", &self.descriptor.interface())
            .finish_non_exhaustive()
    }
}

impl<V: ViewModel + ?Sized> Interceptor<V> {
    #[must_use]
    pub fn new(target: Rc<V>, descriptor: Rc<BroadcastDescriptor>) -> Self {
        Self { target, descriptor }
    }

    /// The wrapped instance.
    #[must_use]
    pub fn target(&self) -> &Rc<V> {
        &self.target
    }

    #[must_use]
    pub fn descriptor(&self) -> &BroadcastDescriptor {
        &self.descriptor
    }

    /// Run `call` against the wrapped instance, then raise the events
    /// declared for `member`.
    pub fn intercept<R>(&self, member: &str, call: impl FnOnce(&V) -> R) -> R {
        let result = call(self.target.as_ref());
        self.broadcast(member);
        result
    }

    /// Like [`Self::intercept`], but raises nothing when `call` fails.
    pub fn try_intercept<T, E>(
        &self,
        member: &str,
        call: impl FnOnce(&V) -> Result<T, E>,
    ) -> Result<T, E> {
        let value = call(self.target.as_ref())?;
        self.broadcast(member);
        Ok(value)
    }

    /// Like [`Self::intercept`], additionally awaiting the view model's
    /// [`ViewModel::report_update`] after each raised event.
    pub async fn intercept_async<R>(&self, member: &str, call: impl FnOnce(&V) -> R) -> R {
        let result = call(self.target.as_ref());
        for property in self.descriptor.targets(member) {
            self.raise(member, property);
            self.target.report_update(property).await;
        }
        result
    }

    fn broadcast(&self, member: &str) {
        for property in self.descriptor.targets(member) {
            self.raise(member, property);
        }
    }

    fn raise(&self, member: &str, property: &str) {
        trace!(
            interface = self.descriptor.interface(),
            member,
            property,
            "intercepted call broadcasts"
        );
        self.target.raise_property_changed(property);
    }
}

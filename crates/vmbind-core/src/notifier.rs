#![forbid(unsafe_code)]

//! Change notification channels.
//!
//! # Design
//!
//! [`EventChannel<E>`] is a shared, reference-counted list of handlers
//! (`Rc<..>` interior). [`ChangeNotifier`] layers an object identity on top of
//! an `EventChannel<PropertyChanged>` and is the channel every view model and
//! observable list exposes.
//!
//! # Dispatch
//!
//! - Handlers run synchronously, in subscription order.
//! - The handler list is snapshotted before dispatch, so handlers may
//!   subscribe or unsubscribe from inside a callback. A handler added during
//!   dispatch first runs on the next emit. A handler removed during dispatch
//!   is skipped from the moment its removal takes effect.
//! - No borrow is held while a handler runs.
//!
//! # Failure Modes
//!
//! - **Handler panic**: propagates to the caller of `emit()`/`notify()` and
//!   aborts the rest of that dispatch round. Handlers are not isolated.
//! - **Subscription leak**: a [`Subscription`] kept alive forever keeps its
//!   handler registered. Dropping the guard unsubscribes immediately.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a registered handler, unique within one channel.
pub type HandlerId = u64;

/// Process-unique identity of a notifying object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocate a fresh identity.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A "named property changed" event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChanged {
    /// The object whose property changed.
    pub sender: ObjectId,
    /// Name of the changed property.
    pub property_name: String,
}

impl PropertyChanged {
    #[must_use]
    pub fn new(sender: ObjectId, property_name: impl Into<String>) -> Self {
        Self {
            sender,
            property_name: property_name.into(),
        }
    }
}

struct HandlerSlot<E> {
    id: HandlerId,
    active: Cell<bool>,
    callback: Box<dyn Fn(&E)>,
}

struct ChannelInner<E> {
    handlers: RefCell<Vec<Rc<HandlerSlot<E>>>>,
    next_id: Cell<HandlerId>,
}

impl<E> ChannelInner<E> {
    fn remove(&self, id: HandlerId) -> bool {
        let removed = {
            let mut handlers = self.handlers.borrow_mut();
            handlers
                .iter()
                .position(|slot| slot.id == id)
                .map(|pos| handlers.remove(pos))
        };
        // The slot (and its captured state) is dropped outside the borrow.
        match removed {
            Some(slot) => {
                slot.active.set(false);
                true
            }
            None => false,
        }
    }
}

/// Type-erased removal so [`Subscription`] does not carry the event type.
trait Unsubscribe {
    fn unsubscribe(&self, id: HandlerId) -> bool;
}

impl<E> Unsubscribe for ChannelInner<E> {
    fn unsubscribe(&self, id: HandlerId) -> bool {
        self.remove(id)
    }
}

/// A shared, ordered list of event handlers.
///
/// Cloning an `EventChannel` creates a new handle to the **same** handler
/// list.
pub struct EventChannel<E> {
    inner: Rc<ChannelInner<E>>,
}

impl<E> Clone for EventChannel<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("subscriber_count", &self.inner.handlers.borrow().len())
            .finish()
    }
}

impl<E: 'static> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> EventChannel<E> {
    /// Create an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ChannelInner {
                handlers: RefCell::new(Vec::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    /// Register `callback` and return an RAII guard that removes it on drop.
    pub fn subscribe(&self, callback: impl Fn(&E) + 'static) -> Subscription {
        let id = self.add_handler(callback);
        let erased: Rc<dyn Unsubscribe> = self.inner.clone();
        Subscription {
            channel: Rc::downgrade(&erased),
            id,
        }
    }

    /// Register `callback` without a guard. Pair with [`Self::unsubscribe`].
    pub fn add_handler(&self, callback: impl Fn(&E) + 'static) -> HandlerId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.handlers.borrow_mut().push(Rc::new(HandlerSlot {
            id,
            active: Cell::new(true),
            callback: Box::new(callback),
        }));
        id
    }

    /// Remove the handler identified by `id`.
    ///
    /// Returns `false` if it was not registered (safe to call repeatedly).
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        self.inner.remove(id)
    }

    /// Whether `id` is currently registered.
    #[must_use]
    pub fn is_subscribed(&self, id: HandlerId) -> bool {
        self.inner.handlers.borrow().iter().any(|slot| slot.id == id)
    }

    /// Dispatch `event` to every registered handler.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Rc<HandlerSlot<E>>> = self.inner.handlers.borrow().clone();
        for slot in &snapshot {
            if slot.active.get() {
                (slot.callback)(event);
            }
        }
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.handlers.borrow().len()
    }

    /// Remove every handler.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.inner.handlers.borrow_mut());
        for slot in &drained {
            slot.active.set(false);
        }
    }
}

/// RAII guard for a registered handler.
///
/// Dropping the guard removes the handler from its channel. If the channel is
/// already gone the drop is a no-op.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    channel: Weak<dyn Unsubscribe>,
    id: HandlerId,
}

impl Subscription {
    /// Identifier of the guarded handler.
    #[must_use]
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Explicitly unsubscribe. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.unsubscribe(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Property-change channel of a single object.
///
/// Cloning shares both the identity and the handler list.
#[derive(Clone)]
pub struct ChangeNotifier {
    id: ObjectId,
    channel: EventChannel<PropertyChanged>,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("id", &self.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    /// Create a notifier with a fresh [`ObjectId`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ObjectId::next(),
            channel: EventChannel::new(),
        }
    }

    /// Identity reported as the sender of every event raised by [`Self::notify`].
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn subscribe(&self, handler: impl Fn(&PropertyChanged) + 'static) -> Subscription {
        self.channel.subscribe(handler)
    }

    pub fn add_handler(&self, handler: impl Fn(&PropertyChanged) + 'static) -> HandlerId {
        self.channel.add_handler(handler)
    }

    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        self.channel.unsubscribe(id)
    }

    /// Raise a change event for `property_name` with this object as sender.
    pub fn notify(&self, property_name: impl Into<String>) {
        if self.channel.subscriber_count() == 0 {
            return;
        }
        self.channel
            .emit(&PropertyChanged::new(self.id, property_name));
    }

    /// Re-raise an event produced elsewhere, keeping its sender.
    pub fn forward(&self, event: &PropertyChanged) {
        self.channel.emit(event);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.channel.subscriber_count()
    }

    /// Drop every subscriber.
    pub fn clear(&self) {
        self.channel.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&PropertyChanged) + 'static) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        (log, move |e: &PropertyChanged| {
            sink.borrow_mut().push(e.property_name.clone())
        })
    }

    #[test]
    fn notify_without_subscribers_is_noop() {
        let notifier = ChangeNotifier::new();
        notifier.notify("Anything");
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn notify_reaches_subscriber_with_sender() {
        let notifier = ChangeNotifier::new();
        let seen = Rc::new(RefCell::new(None));
        let seen_clone = Rc::clone(&seen);
        let _sub = notifier.subscribe(move |e| *seen_clone.borrow_mut() = Some(e.clone()));

        notifier.notify("Title");

        let event = seen.borrow().clone().expect("event delivered");
        assert_eq!(event.sender, notifier.id());
        assert_eq!(event.property_name, "Title");
    }

    #[test]
    fn dispatch_order_is_subscription_order() {
        let channel = EventChannel::<u8>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l1 = Rc::clone(&log);
        let _a = channel.subscribe(move |_| l1.borrow_mut().push('A'));
        let l2 = Rc::clone(&log);
        let _b = channel.subscribe(move |_| l2.borrow_mut().push('B'));
        let l3 = Rc::clone(&log);
        let _c = channel.subscribe(move |_| l3.borrow_mut().push('C'));

        channel.emit(&0);
        assert_eq!(*log.borrow(), vec!['A', 'B', 'C']);
    }

    #[test]
    fn dropping_subscription_unsubscribes_eagerly() {
        let notifier = ChangeNotifier::new();
        let (log, handler) = recorder();
        let sub = notifier.subscribe(handler);
        assert_eq!(notifier.subscriber_count(), 1);

        drop(sub);
        assert_eq!(notifier.subscriber_count(), 0);

        notifier.notify("Gone");
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn unsubscribe_by_id_is_idempotent() {
        let notifier = ChangeNotifier::new();
        let id = notifier.add_handler(|_| {});
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
    }

    #[test]
    fn handler_removed_during_dispatch_is_skipped() {
        let channel = EventChannel::<()>::new();
        let hits = Rc::new(Cell::new(0u32));
        let victim_id = Rc::new(Cell::new(0));

        let remover_channel = channel.clone();
        let victim = Rc::clone(&victim_id);
        let _first = channel.subscribe(move |_| {
            remover_channel.unsubscribe(victim.get());
        });
        let hits_clone = Rc::clone(&hits);
        victim_id.set(channel.add_handler(move |_| hits_clone.set(hits_clone.get() + 1)));

        channel.emit(&());
        assert_eq!(hits.get(), 0);
        assert_eq!(channel.subscriber_count(), 1);
    }

    #[test]
    fn handler_added_during_dispatch_waits_for_next_round() {
        let channel = EventChannel::<()>::new();
        let hits = Rc::new(Cell::new(0u32));
        let added = Rc::new(Cell::new(false));

        let inner_channel = channel.clone();
        let hits_clone = Rc::clone(&hits);
        let added_clone = Rc::clone(&added);
        let _adder = channel.subscribe(move |_| {
            if !added_clone.replace(true) {
                let hits = Rc::clone(&hits_clone);
                inner_channel.add_handler(move |_| hits.set(hits.get() + 1));
            }
        });

        channel.emit(&());
        assert_eq!(hits.get(), 0);
        channel.emit(&());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn subscription_outliving_channel_drops_quietly() {
        let sub = {
            let notifier = ChangeNotifier::new();
            notifier.subscribe(|_| {})
        };
        drop(sub);
    }

    #[test]
    fn clear_removes_all_handlers() {
        let notifier = ChangeNotifier::new();
        let (log, handler) = recorder();
        let _sub = notifier.subscribe(handler);
        notifier.add_handler(|_| {});
        notifier.clear();

        assert_eq!(notifier.subscriber_count(), 0);
        notifier.notify("After");
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn forward_keeps_source_sender() {
        let source = ChangeNotifier::new();
        let relay = ChangeNotifier::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = relay.subscribe(move |e| seen_clone.borrow_mut().push(e.sender));

        relay.forward(&PropertyChanged::new(source.id(), "X"));
        assert_eq!(*seen.borrow(), vec![source.id()]);
    }

    #[test]
    fn clones_share_handlers() {
        let a = ChangeNotifier::new();
        let b = a.clone();
        let (log, handler) = recorder();
        let _sub = a.subscribe(handler);

        b.notify("Shared");
        assert_eq!(*log.borrow(), vec!["Shared".to_string()]);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    #[should_panic(expected = "handler failure")]
    fn handler_panic_propagates() {
        let notifier = ChangeNotifier::new();
        let _sub = notifier.subscribe(|_| panic!("handler failure"));
        notifier.notify("Boom");
    }
}

#![forbid(unsafe_code)]

//! View-side consumption of view models.
//!
//! A [`ViewBase`] binds exactly one view model (its *context*). Once
//! initialized it listens to the context's change channel. Each change runs
//! the property handler (copying view-model state into the view) and counts a
//! render request; teardown drops that listener.
//!
//! A change the view itself pushes into the context through
//! [`ViewBase::bind_setter_with_view_model`] is marked view-originated. The
//! echoed event for that property is swallowed once: no handler call, no
//! render request.
//!
//! # Lifecycle
//!
//! ```text
//! inject / from_container ──► on_initialized ──► (changes → render requests)
//!                                   │
//!                        unbind_events / dispose
//! ```
//!
//! # Invariants
//!
//! 1. At most one listener from a view to its context at any time.
//! 2. After `unbind_events` or `dispose`, context changes no longer request
//!    renders.
//! 3. `dispose` runs once; later calls are no-ops.
//! 4. A view-originated mark is cleared by the first matching event.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};
use vmbind_core::{Container, PropertyChanged, ResolveError, Subscription, ViewModel};

type RenderHook = Rc<dyn Fn(&PropertyChanged)>;
type PropertyHandler<V> = Rc<dyn Fn(&V, &str)>;

/// A component bound to one view model.
pub struct ViewBase<V: ViewModel + ?Sized> {
    context: Rc<V>,
    binding: Option<Subscription>,
    render_requests: Rc<Cell<u64>>,
    hook: Option<RenderHook>,
    handler: Option<PropertyHandler<V>>,
    view_originated: Rc<RefCell<HashSet<String>>>,
    disposed: bool,
}

impl<V: ViewModel + ?Sized> fmt::Debug for ViewBase<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewBase")
            .field("context", &self.context.object_id())
            .field("bound", &self.binding.is_some())
            .field("render_requests", &self.render_requests.get())
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl<V: ViewModel + ?Sized> ViewBase<V> {
    /// Bind to `context`. Events are not observed until
    /// [`Self::on_initialized`].
    #[must_use]
    pub fn inject(context: Rc<V>) -> Self {
        Self {
            context,
            binding: None,
            render_requests: Rc::new(Cell::new(0)),
            hook: None,
            handler: None,
            view_originated: Rc::new(RefCell::new(HashSet::new())),
            disposed: false,
        }
    }

    /// Resolve the context from `container`.
    pub fn from_container(container: &Container) -> Result<Self, ResolveError> {
        Ok(Self::inject(container.resolve::<V>()?))
    }

    /// Run `hook` on every change that requests a render.
    #[must_use]
    pub fn with_render_hook(mut self, hook: impl Fn(&PropertyChanged) + 'static) -> Self {
        self.hook = Some(Rc::new(hook));
        self
    }

    /// Run `handler` with the context and the property name on every change
    /// not originated by this view, before the render request is counted.
    ///
    /// Applies to bindings made afterwards.
    #[must_use]
    pub fn with_property_handler(mut self, handler: impl Fn(&V, &str) + 'static) -> Self {
        self.handler = Some(Rc::new(handler));
        self
    }

    #[must_use]
    pub fn context(&self) -> &Rc<V> {
        &self.context
    }

    /// The component is ready: start listening to the context.
    pub fn on_initialized(&mut self) {
        self.bind_events();
    }

    /// Subscribe to the context. A no-op when already bound or disposed.
    pub fn bind_events(&mut self) {
        if self.binding.is_some() || self.disposed {
            return;
        }
        let requests = Rc::clone(&self.render_requests);
        let hook = self.hook.clone();
        let handler = self.handler.clone();
        let view_originated = Rc::clone(&self.view_originated);
        let context = Rc::downgrade(&self.context);
        self.binding = Some(self.context.notifier().subscribe(move |event| {
            if view_originated.borrow_mut().remove(&event.property_name) {
                trace!(property = %event.property_name, "view-originated change skipped");
                return;
            }
            if let (Some(handler), Some(context)) = (&handler, context.upgrade()) {
                handler(context.as_ref(), &event.property_name);
            }
            requests.set(requests.get() + 1);
            if let Some(hook) = &hook {
                hook(event);
            }
        }));
        trace!(context = %self.context.object_id(), "view bound");
    }

    /// Push a view-side value into the context through `write`, marking
    /// `property` as view-originated so its echoed change does not re-render
    /// this view.
    ///
    /// The mark stays until an event for `property` arrives.
    pub fn bind_setter_with_view_model<R>(
        &self,
        property: &str,
        write: impl FnOnce(&V) -> R,
    ) -> R {
        self.view_originated
            .borrow_mut()
            .insert(property.to_string());
        write(self.context.as_ref())
    }

    /// Whether `property` is still marked view-originated.
    #[must_use]
    pub fn is_view_originated(&self, property: &str) -> bool {
        self.view_originated.borrow().contains(property)
    }

    /// Stop listening to the context.
    pub fn unbind_events(&mut self) {
        if self.binding.take().is_some() {
            trace!(context = %self.context.object_id(), "view unbound");
        }
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Number of changes observed while bound.
    #[must_use]
    pub fn render_requests(&self) -> u64 {
        self.render_requests.get()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Unbind and dispose the context.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.unbind_events();
        self.disposed = true;
        self.context.dispose();
        debug!(context = %self.context.object_id(), "view disposed");
    }

    /// Unbind and await the context's asynchronous disposal.
    pub async fn dispose_async(&mut self) {
        if self.disposed {
            return;
        }
        self.unbind_events();
        self.disposed = true;
        self.context.dispose_async().await;
        debug!(context = %self.context.object_id(), "view disposed");
    }
}

impl<V: ViewModel + ?Sized> Drop for ViewBase<V> {
    fn drop(&mut self) {
        self.unbind_events();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use vmbind_core::{ChangeNotifier, async_trait};

    trait Clock: ViewModel {
        fn tick(&self);
    }

    #[derive(Default)]
    struct ClockVm {
        notifier: ChangeNotifier,
        ticks: Cell<u32>,
        label: RefCell<String>,
        disposals: Cell<u32>,
    }

    impl ClockVm {
        fn set_label(&self, label: &str) {
            *self.label.borrow_mut() = label.to_string();
            self.notifier.notify("Label");
        }
    }

    #[async_trait(?Send)]
    impl ViewModel for ClockVm {
        fn notifier(&self) -> &ChangeNotifier {
            &self.notifier
        }

        fn dispose(&self) {
            self.disposals.set(self.disposals.get() + 1);
            self.notifier.clear();
        }
    }

    impl Clock for ClockVm {
        fn tick(&self) {
            self.ticks.set(self.ticks.get() + 1);
            self.notifier.notify("Ticks");
        }
    }

    #[test]
    fn changes_request_renders_once_initialized() {
        let vm = Rc::new(ClockVm::default());
        let mut view = ViewBase::inject(Rc::clone(&vm));

        vm.tick();
        assert_eq!(view.render_requests(), 0);

        view.on_initialized();
        vm.tick();
        vm.tick();
        assert_eq!(view.render_requests(), 2);
    }

    #[test]
    fn bind_is_idempotent() {
        let vm = Rc::new(ClockVm::default());
        let mut view = ViewBase::inject(Rc::clone(&vm));
        view.bind_events();
        view.bind_events();
        assert_eq!(vm.notifier().subscriber_count(), 1);
        vm.tick();
        assert_eq!(view.render_requests(), 1);
    }

    #[test]
    fn unbind_stops_render_requests() {
        let vm = Rc::new(ClockVm::default());
        let mut view = ViewBase::inject(Rc::clone(&vm));
        view.on_initialized();
        view.unbind_events();

        vm.tick();
        assert_eq!(view.render_requests(), 0);
        assert!(!view.is_bound());
        assert_eq!(vm.notifier().subscriber_count(), 0);
    }

    #[test]
    fn render_hook_sees_property_names() {
        let vm = Rc::new(ClockVm::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut view = ViewBase::inject(Rc::clone(&vm))
            .with_render_hook(move |e| sink.borrow_mut().push(e.property_name.clone()));
        view.on_initialized();
        vm.tick();
        assert_eq!(*seen.borrow(), vec!["Ticks".to_string()]);
    }

    #[test]
    fn dispose_runs_once_and_disposes_context() {
        let vm = Rc::new(ClockVm::default());
        let mut view = ViewBase::inject(Rc::clone(&vm));
        view.on_initialized();
        view.dispose();
        view.dispose();

        assert_eq!(vm.disposals.get(), 1);
        assert!(view.is_disposed());
        view.bind_events();
        assert!(!view.is_bound());
    }

    #[test]
    fn dispose_async_unbinds_and_disposes() {
        let vm = Rc::new(ClockVm::default());
        let mut view = ViewBase::inject(Rc::clone(&vm));
        view.on_initialized();
        pollster::block_on(view.dispose_async());

        assert_eq!(vm.disposals.get(), 1);
        vm.tick();
        assert_eq!(view.render_requests(), 0);
    }

    #[test]
    fn dropping_view_releases_binding() {
        let vm = Rc::new(ClockVm::default());
        {
            let mut view = ViewBase::inject(Rc::clone(&vm));
            view.on_initialized();
            assert_eq!(vm.notifier().subscriber_count(), 1);
        }
        assert_eq!(vm.notifier().subscriber_count(), 0);
    }

    #[test]
    fn view_originated_change_does_not_rerender() {
        let vm = Rc::new(ClockVm::default());
        let mut view = ViewBase::inject(Rc::clone(&vm));
        view.on_initialized();

        view.bind_setter_with_view_model("Label", |vm| vm.set_label("typed"));
        assert_eq!(vm.label.borrow().as_str(), "typed");
        assert_eq!(view.render_requests(), 0);
        assert!(!view.is_view_originated("Label"));

        vm.set_label("external");
        assert_eq!(view.render_requests(), 1);
    }

    #[test]
    fn view_originated_mark_only_swallows_its_own_property() {
        let vm = Rc::new(ClockVm::default());
        let mut view = ViewBase::inject(Rc::clone(&vm));
        view.on_initialized();

        view.bind_setter_with_view_model("Label", |_| ());
        vm.tick();
        assert_eq!(view.render_requests(), 1);
        assert!(view.is_view_originated("Label"));

        vm.set_label("echo");
        assert_eq!(view.render_requests(), 1);
        vm.set_label("next");
        assert_eq!(view.render_requests(), 2);
    }

    #[test]
    fn property_handler_copies_view_model_state() {
        let vm = Rc::new(ClockVm::default());
        let shown = Rc::new(RefCell::new(String::new()));
        let target = Rc::clone(&shown);
        let mut view =
            ViewBase::inject(Rc::clone(&vm)).with_property_handler(move |vm, property| {
                if property == "Label" {
                    *target.borrow_mut() = vm.label.borrow().clone();
                }
            });
        view.on_initialized();

        vm.set_label("from model");
        assert_eq!(shown.borrow().as_str(), "from model");

        view.bind_setter_with_view_model("Label", |vm| vm.set_label("from view"));
        assert_eq!(shown.borrow().as_str(), "from model");
        assert_eq!(view.render_requests(), 1);
    }

    #[test]
    fn binding_does_not_keep_context_alive() {
        let vm = Rc::new(ClockVm::default());
        let mut view = ViewBase::inject(Rc::clone(&vm)).with_property_handler(|_, _| {});
        view.on_initialized();
        assert_eq!(Rc::strong_count(&vm), 2);
        drop(view);
        assert_eq!(Rc::strong_count(&vm), 1);
    }

    #[test]
    fn from_container_resolves_interface() {
        let mut container = Container::new();
        container.add_transient::<dyn Clock>(|_| Ok(Rc::new(ClockVm::default())));
        let mut view = ViewBase::<dyn Clock>::from_container(&container).unwrap();
        view.on_initialized();
        view.context().tick();
        assert_eq!(view.render_requests(), 1);

        let missing = ViewBase::<ClockVm>::from_container(&container);
        assert!(matches!(missing, Err(ResolveError::NotRegistered { .. })));
    }
}

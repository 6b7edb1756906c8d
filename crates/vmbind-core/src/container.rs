#![forbid(unsafe_code)]

//! Minimal dependency container.
//!
//! Services are keyed by [`InterfaceKey`] (the `TypeId` of the interface,
//! usually a `dyn Trait`) and handed out as `Rc<I>`. Each registration carries
//! a [`Lifetime`]:
//!
//! - `Transient`: the factory runs on every resolve.
//! - `Singleton`: the factory runs once; later resolves share the result.
//!
//! # Invariants
//!
//! 1. At most one registration per key; registering again replaces it.
//! 2. A key currently being resolved cannot be resolved again further down
//!    the same chain (reported as [`ResolveError::Cycle`]).
//! 3. Factory failures are reported from `resolve`, never at registration.

use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use tracing::{debug, warn};

pub use crate::config::Lifetime;

/// A resolved service: an `Rc<dyn Any>` whose payload is the `Rc<I>` handed
/// to callers.
pub type Service = Rc<dyn Any>;

/// Erased factory stored in the container.
pub type Factory = Rc<dyn Fn(&Container) -> Result<Service, ResolveError>>;

/// Identity of a resolvable interface.
#[derive(Clone, Copy)]
pub struct InterfaceKey {
    id: TypeId,
    name: &'static str,
}

impl InterfaceKey {
    /// Key for interface `I` (typically `dyn Trait`).
    #[must_use]
    pub fn of<I: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<I>(),
            name: type_name::<I>(),
        }
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for InterfaceKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for InterfaceKey {}

impl Hash for InterfaceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for InterfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for InterfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Errors from resolving a service.
#[derive(Debug, Clone)]
pub enum ResolveError {
    /// Nothing is registered for the interface.
    NotRegistered { interface: &'static str },
    /// A constructor dependency could not be resolved.
    Dependency {
        interface: &'static str,
        dependency: &'static str,
        source: Box<ResolveError>,
    },
    /// The interface depends on itself, directly or transitively.
    Cycle { interface: &'static str },
    /// The stored service is not an `Rc` of the requested interface.
    TypeMismatch { interface: &'static str },
    /// The constructor itself failed.
    Construction {
        interface: &'static str,
        message: String,
    },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRegistered { interface } => write!(f, "no registration for {interface}"),
            Self::Dependency {
                interface,
                dependency,
                source,
            } => write!(
                f,
                "cannot build {interface}: dependency {dependency} failed: {source}"
            ),
            Self::Cycle { interface } => write!(f, "dependency cycle through {interface}"),
            Self::TypeMismatch { interface } => {
                write!(f, "registered service is not an Rc<{interface}>")
            }
            Self::Construction { interface, message } => {
                write!(f, "constructing {interface} failed: {message}")
            }
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Dependency { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

struct Registration {
    lifetime: Lifetime,
    factory: Factory,
}

/// Interface-to-factory bindings plus the singleton cache.
#[derive(Default)]
pub struct Container {
    registrations: HashMap<InterfaceKey, Registration>,
    singletons: RefCell<HashMap<InterfaceKey, Service>>,
    resolving: RefCell<Vec<InterfaceKey>>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registrations", &self.registrations.len())
            .field("singletons", &self.singletons.borrow().len())
            .finish()
    }
}

/// Pops the resolution stack on every exit path.
struct ResolveFrame<'a> {
    stack: &'a RefCell<Vec<InterfaceKey>>,
}

impl Drop for ResolveFrame<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

impl Container {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to an erased factory, replacing any previous binding.
    pub fn register_factory(&mut self, key: InterfaceKey, lifetime: Lifetime, factory: Factory) {
        if self
            .registrations
            .insert(key, Registration { lifetime, factory })
            .is_some()
        {
            debug!(interface = key.name(), "replacing existing registration");
        }
        self.singletons.borrow_mut().remove(&key);
    }

    /// Register a factory that runs on every resolve.
    pub fn add_transient<I: ?Sized + 'static>(
        &mut self,
        factory: impl Fn(&Container) -> Result<Rc<I>, ResolveError> + 'static,
    ) {
        self.register_factory(InterfaceKey::of::<I>(), Lifetime::Transient, erase(factory));
    }

    /// Register a factory that runs once.
    pub fn add_singleton<I: ?Sized + 'static>(
        &mut self,
        factory: impl Fn(&Container) -> Result<Rc<I>, ResolveError> + 'static,
    ) {
        self.register_factory(InterfaceKey::of::<I>(), Lifetime::Singleton, erase(factory));
    }

    /// Register an existing instance.
    pub fn add_instance<I: ?Sized + 'static>(&mut self, instance: Rc<I>) {
        self.add_singleton(move |_| Ok(Rc::clone(&instance)));
    }

    /// Resolve `I`.
    pub fn resolve<I: ?Sized + 'static>(&self) -> Result<Rc<I>, ResolveError> {
        let key = InterfaceKey::of::<I>();
        let service = self.resolve_service(key)?;
        downcast::<I>(&service)
    }

    /// Resolve `I`, returning `Ok(None)` when nothing is registered.
    pub fn try_resolve<I: ?Sized + 'static>(&self) -> Result<Option<Rc<I>>, ResolveError> {
        if self.is_registered::<I>() {
            self.resolve::<I>().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Resolve an erased service by key.
    pub fn resolve_service(&self, key: InterfaceKey) -> Result<Service, ResolveError> {
        let registration = self
            .registrations
            .get(&key)
            .ok_or(ResolveError::NotRegistered {
                interface: key.name(),
            })?;

        if registration.lifetime == Lifetime::Singleton {
            if let Some(cached) = self.singletons.borrow().get(&key) {
                return Ok(Rc::clone(cached));
            }
        }

        if self.resolving.borrow().contains(&key) {
            warn!(interface = key.name(), "dependency cycle detected");
            return Err(ResolveError::Cycle {
                interface: key.name(),
            });
        }
        self.resolving.borrow_mut().push(key);
        let frame = ResolveFrame {
            stack: &self.resolving,
        };
        let service = (registration.factory)(self);
        drop(frame);

        let service = service.inspect_err(|err| {
            debug!(interface = key.name(), error = %err, "resolve failed");
        })?;
        if registration.lifetime == Lifetime::Singleton {
            self.singletons
                .borrow_mut()
                .insert(key, Rc::clone(&service));
        }
        Ok(service)
    }

    #[must_use]
    pub fn is_registered<I: ?Sized + 'static>(&self) -> bool {
        self.contains_key(InterfaceKey::of::<I>())
    }

    #[must_use]
    pub fn contains_key(&self, key: InterfaceKey) -> bool {
        self.registrations.contains_key(&key)
    }

    /// Lifetime of the registration for `key`, if any.
    #[must_use]
    pub fn lifetime_of(&self, key: InterfaceKey) -> Option<Lifetime> {
        self.registrations.get(&key).map(|r| r.lifetime)
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Registered keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = InterfaceKey> + '_ {
        self.registrations.keys().copied()
    }
}

fn erase<I: ?Sized + 'static>(
    factory: impl Fn(&Container) -> Result<Rc<I>, ResolveError> + 'static,
) -> Factory {
    Rc::new(move |container: &Container| -> Result<Service, ResolveError> {
        let service: Service = Rc::new(factory(container)?);
        Ok(service)
    })
}

/// Recover the typed `Rc<I>` from an erased service.
pub fn downcast<I: ?Sized + 'static>(service: &Service) -> Result<Rc<I>, ResolveError> {
    service
        .downcast_ref::<Rc<I>>()
        .cloned()
        .ok_or(ResolveError::TypeMismatch {
            interface: type_name::<I>(),
        })
}

/// Constructor arguments resolved from a container, in declaration order.
pub struct Arguments {
    interface: InterfaceKey,
    values: VecDeque<(InterfaceKey, Service)>,
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("interface", &self.interface)
            .field(
                "remaining",
                &self.values.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Arguments {
    /// Resolve every key in `dependencies` for the construction of `interface`.
    ///
    /// Failures are wrapped in [`ResolveError::Dependency`], except cycles,
    /// which pass through unchanged.
    pub fn resolve(
        container: &Container,
        interface: InterfaceKey,
        dependencies: &[InterfaceKey],
    ) -> Result<Self, ResolveError> {
        let mut values = VecDeque::with_capacity(dependencies.len());
        for &dependency in dependencies {
            let service =
                container
                    .resolve_service(dependency)
                    .map_err(|source| match source {
                        ResolveError::Cycle { .. } => source,
                        source => ResolveError::Dependency {
                            interface: interface.name(),
                            dependency: dependency.name(),
                            source: Box::new(source),
                        },
                    })?;
            values.push_back((dependency, service));
        }
        Ok(Self { interface, values })
    }

    /// No arguments.
    #[must_use]
    pub fn empty(interface: InterfaceKey) -> Self {
        Self {
            interface,
            values: VecDeque::new(),
        }
    }

    /// Take the next argument, which must be an `Rc<I>`.
    pub fn take<I: ?Sized + 'static>(&mut self) -> Result<Rc<I>, ResolveError> {
        let expected = InterfaceKey::of::<I>();
        let Some((key, service)) = self.values.pop_front() else {
            return Err(ResolveError::Construction {
                interface: self.interface.name(),
                message: format!("missing constructor argument {}", expected.name()),
            });
        };
        if key != expected {
            return Err(ResolveError::Construction {
                interface: self.interface.name(),
                message: format!(
                    "constructor asked for {} but next argument is {}",
                    expected.name(),
                    key.name()
                ),
            });
        }
        downcast::<I>(&service)
    }

    /// Arguments not yet taken.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

#![forbid(unsafe_code)]

//! Explicit view-model registration.
//!
//! The host declares two tables up front:
//!
//! - candidate interfaces ([`ViewModelInterface`]), each with the interfaces
//!   it extends;
//! - implementations ([`Implementation`]), each with a constructor, its
//!   constructor dependencies and the interfaces it provides. Every provided
//!   interface carries its [`BroadcastDescriptor`] and the decorator that
//!   wraps an [`Interceptor`] into that interface.
//!
//! [`ViewModelRegistry::register_all`] matches the two and binds each
//! interface with exactly one implementation in a [`Container`]. Resolving
//! such an interface resolves the dependencies, runs the constructor and
//! hands out the decorator, never the raw instance.
//!
//! # Invariants
//!
//! 1. Only interfaces that reach [`ViewModel`] through `extends` edges are
//!    considered. The marker itself is never registered.
//! 2. Every candidate ends up in the report exactly once, as registered or
//!    skipped.
//! 3. Under [`AmbiguityPolicy::Error`] an ambiguous candidate fails the whole
//!    call before anything is registered.
//!
//! # Failure Modes
//!
//! Discovery problems (no implementation, several implementations, not a view
//! model) degrade to a partial registration. Construction problems surface
//! later, from `Container::resolve`.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::broadcast::BroadcastDescriptor;
use crate::config::{AmbiguityPolicy, RegistryConfig};
use crate::container::{Arguments, Container, Factory, InterfaceKey, ResolveError, Service};
use crate::intercept::Interceptor;
use crate::view_model::ViewModel;

/// A candidate interface and the interfaces it directly extends.
#[derive(Debug, Clone)]
pub struct ViewModelInterface {
    key: InterfaceKey,
    extends: Vec<InterfaceKey>,
}

impl ViewModelInterface {
    /// Declare interface `I` (typically `dyn Trait`).
    #[must_use]
    pub fn of<I: ?Sized + 'static>() -> Self {
        Self {
            key: InterfaceKey::of::<I>(),
            extends: Vec::new(),
        }
    }

    /// Declare that this interface extends `P`.
    #[must_use]
    pub fn extends<P: ?Sized + 'static>(mut self) -> Self {
        let parent = InterfaceKey::of::<P>();
        if !self.extends.contains(&parent) {
            self.extends.push(parent);
        }
        self
    }

    #[must_use]
    pub fn key(&self) -> InterfaceKey {
        self.key
    }

    #[must_use]
    pub fn parents(&self) -> &[InterfaceKey] {
        &self.extends
    }
}

/// Builds the decorated service from already-resolved arguments.
type ProvidedFactory = Rc<dyn Fn(Arguments) -> Result<Service, ResolveError>>;

type Constructor<V> = Rc<dyn Fn(&mut Arguments) -> Result<V, ResolveError>>;

/// A concrete view model and the interfaces it can be resolved as.
pub struct Implementation {
    name: &'static str,
    dependencies: Rc<[InterfaceKey]>,
    provides: Vec<(InterfaceKey, ProvidedFactory)>,
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field(
                "provides",
                &self.provides.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Implementation {
    /// Start describing implementation `V`.
    ///
    /// `constructor` receives the dependencies declared with
    /// [`ImplementationBuilder::depends_on`], in declaration order.
    pub fn of<V: ViewModel>(
        name: &'static str,
        constructor: impl Fn(&mut Arguments) -> Result<V, ResolveError> + 'static,
    ) -> ImplementationBuilder<V> {
        ImplementationBuilder {
            name,
            constructor: Rc::new(constructor),
            dependencies: Vec::new(),
            provides: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn dependencies(&self) -> &[InterfaceKey] {
        &self.dependencies
    }

    /// Whether this implementation can be resolved as `key`.
    #[must_use]
    pub fn provides(&self, key: InterfaceKey) -> bool {
        self.provided(key).is_some()
    }

    fn provided(&self, key: InterfaceKey) -> Option<&ProvidedFactory> {
        self.provides
            .iter()
            .find(|(provided, _)| *provided == key)
            .map(|(_, factory)| factory)
    }
}

/// Builder returned by [`Implementation::of`].
pub struct ImplementationBuilder<V> {
    name: &'static str,
    constructor: Constructor<V>,
    dependencies: Vec<InterfaceKey>,
    provides: Vec<(InterfaceKey, ProvidedFactory)>,
}

impl<V: ViewModel> ImplementationBuilder<V> {
    /// Append constructor dependency `I`.
    #[must_use]
    pub fn depends_on<I: ?Sized + 'static>(mut self) -> Self {
        self.dependencies.push(InterfaceKey::of::<I>());
        self
    }

    /// Declare that `V` is resolvable as `I`, through the decorator built by
    /// `wrap`.
    #[must_use]
    pub fn provides<I: ?Sized + 'static>(
        mut self,
        descriptor: BroadcastDescriptor,
        wrap: impl Fn(Interceptor<V>) -> Rc<I> + 'static,
    ) -> Self {
        let key = InterfaceKey::of::<I>();
        let descriptor = Rc::new(descriptor);
        let constructor = Rc::clone(&self.constructor);
        let factory: ProvidedFactory = Rc::new(
            move |mut arguments: Arguments| -> Result<Service, ResolveError> {
                let instance = Rc::new(constructor(&mut arguments)?);
                let decorator = wrap(Interceptor::new(instance, Rc::clone(&descriptor)));
                let service: Service = Rc::new(decorator);
                Ok(service)
            },
        );
        self.provides.retain(|(provided, _)| *provided != key);
        self.provides.push((key, factory));
        self
    }

    #[must_use]
    pub fn build(self) -> Implementation {
        Implementation {
            name: self.name,
            dependencies: self.dependencies.into(),
            provides: self.provides,
        }
    }
}

/// Why a candidate interface was not registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No implementation provides the interface.
    NotFound,
    /// Several implementations provide it (their names, in table order).
    Ambiguous(Vec<&'static str>),
    /// The interface does not extend the view-model marker.
    NotViewModel,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("no implementation"),
            Self::Ambiguous(names) => {
                write!(f, "ambiguous between {}", names.join(", "))
            }
            Self::NotViewModel => f.write_str("not a view-model interface"),
        }
    }
}

/// Outcome of [`ViewModelRegistry::register_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    /// Registered interfaces with the implementation bound to each.
    pub registered: Vec<(InterfaceKey, &'static str)>,
    pub skipped: Vec<(InterfaceKey, SkipReason)>,
}

impl RegistrationReport {
    #[must_use]
    pub fn is_registered(&self, key: InterfaceKey) -> bool {
        self.registered.iter().any(|(k, _)| *k == key)
    }

    /// Skip reason for `key`, if it was skipped.
    #[must_use]
    pub fn skip_reason(&self, key: InterfaceKey) -> Option<&SkipReason> {
        self.skipped
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, reason)| reason)
    }
}

/// Errors that abort registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    Ambiguous {
        interface: &'static str,
        implementations: Vec<&'static str>,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ambiguous {
                interface,
                implementations,
            } => write!(
                f,
                "{interface} has several implementations: {}",
                implementations.join(", ")
            ),
        }
    }
}

impl std::error::Error for RegistryError {}

enum Plan<'a> {
    Register(&'a Implementation, &'a ProvidedFactory),
    Skip(SkipReason),
}

/// Binds view-model interfaces to their implementations.
#[derive(Debug, Clone)]
pub struct ViewModelRegistry {
    config: RegistryConfig,
    marker: InterfaceKey,
}

impl Default for ViewModelRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl ViewModelRegistry {
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            marker: InterfaceKey::of::<dyn ViewModel>(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register every candidate with exactly one implementation.
    pub fn register_all(
        &self,
        candidates: &[ViewModelInterface],
        implementations: &[Implementation],
        container: &mut Container,
    ) -> Result<RegistrationReport, RegistryError> {
        let mut seen = HashSet::new();
        let mut plans = Vec::new();
        for candidate in candidates {
            if !seen.insert(candidate.key) {
                continue;
            }
            let plan = self.plan(candidate.key, candidates, implementations)?;
            plans.push((candidate.key, plan));
        }

        let mut report = RegistrationReport::default();
        for (key, plan) in plans {
            match plan {
                Plan::Register(implementation, provided) => {
                    container.register_factory(
                        key,
                        self.config.lifetime,
                        bind(key, implementation, provided),
                    );
                    debug!(
                        interface = key.name(),
                        implementation = implementation.name,
                        lifetime = ?self.config.lifetime,
                        "view model registered"
                    );
                    report.registered.push((key, implementation.name));
                }
                Plan::Skip(reason) => {
                    debug!(interface = key.name(), %reason, "view model skipped");
                    report.skipped.push((key, reason));
                }
            }
        }
        Ok(report)
    }

    fn plan<'a>(
        &self,
        key: InterfaceKey,
        candidates: &[ViewModelInterface],
        implementations: &'a [Implementation],
    ) -> Result<Plan<'a>, RegistryError> {
        if !self.is_view_model(key, candidates) {
            return Ok(Plan::Skip(SkipReason::NotViewModel));
        }
        let matches: Vec<(&Implementation, &ProvidedFactory)> = implementations
            .iter()
            .filter_map(|implementation| {
                implementation
                    .provided(key)
                    .map(|provided| (implementation, provided))
            })
            .collect();
        match matches.as_slice() {
            [] => Ok(Plan::Skip(SkipReason::NotFound)),
            [(implementation, provided)] => Ok(Plan::Register(*implementation, *provided)),
            several => {
                let names: Vec<&'static str> = several.iter().map(|(i, _)| i.name).collect();
                warn!(
                    interface = key.name(),
                    implementations = ?names,
                    policy = ?self.config.ambiguity,
                    "ambiguous view model implementations"
                );
                match self.config.ambiguity {
                    AmbiguityPolicy::Skip => Ok(Plan::Skip(SkipReason::Ambiguous(names))),
                    AmbiguityPolicy::Error => Err(RegistryError::Ambiguous {
                        interface: key.name(),
                        implementations: names,
                    }),
                }
            }
        }
    }

    /// Whether `key` reaches the marker through declared `extends` edges.
    fn is_view_model(&self, key: InterfaceKey, candidates: &[ViewModelInterface]) -> bool {
        if key == self.marker {
            return false;
        }
        let mut visited = HashSet::new();
        let mut pending = vec![key];
        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            for declared in candidates.iter().filter(|c| c.key == current) {
                for &parent in &declared.extends {
                    if parent == self.marker {
                        return true;
                    }
                    pending.push(parent);
                }
            }
        }
        false
    }
}

fn bind(key: InterfaceKey, implementation: &Implementation, provided: &ProvidedFactory) -> Factory {
    let dependencies = Rc::clone(&implementation.dependencies);
    let provided = Rc::clone(provided);
    Rc::new(move |container: &Container| -> Result<Service, ResolveError> {
        let arguments = Arguments::resolve(container, key, &dependencies)?;
        provided(arguments)
    })
}

/// Register with the default configuration.
pub fn register_view_models(
    candidates: &[ViewModelInterface],
    implementations: &[Implementation],
    container: &mut Container,
) -> Result<RegistrationReport, RegistryError> {
    ViewModelRegistry::default().register_all(candidates, implementations, container)
}

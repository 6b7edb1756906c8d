#![forbid(unsafe_code)]
#![allow(dead_code)]

//! Shared fixtures: a `Person` view-model interface, its implementation and
//! decorator, plus a `Directory` that depends on it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::Level;
use vmbind_core::{
    BroadcastDescriptor, ChangeNotifier, Implementation, Interceptor, ViewModel,
    ViewModelInterface, async_trait,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::INFO)
        .try_init();
}

pub trait Person: ViewModel {
    fn name(&self) -> String;
    fn set_name(&self, name: &str);
    fn age(&self) -> u32;
    fn set_age(&self, age: u32);
    fn birthday(&self);
}

#[derive(Default)]
pub struct PersonVm {
    notifier: ChangeNotifier,
    name: RefCell<String>,
    age: Cell<u32>,
    pub acknowledged: RefCell<Vec<String>>,
}

impl PersonVm {
    pub fn named(name: &str, age: u32) -> Rc<Self> {
        let vm = Self::default();
        *vm.name.borrow_mut() = name.to_string();
        vm.age.set(age);
        Rc::new(vm)
    }
}

#[async_trait(?Send)]
impl ViewModel for PersonVm {
    fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    async fn report_update(&self, property_name: &str) {
        self.acknowledged
            .borrow_mut()
            .push(property_name.to_string());
    }
}

impl Person for PersonVm {
    fn name(&self) -> String {
        self.name.borrow().clone()
    }
    fn set_name(&self, name: &str) {
        *self.name.borrow_mut() = name.to_string();
    }
    fn age(&self) -> u32 {
        self.age.get()
    }
    fn set_age(&self, age: u32) {
        self.age.set(age);
    }
    fn birthday(&self) {
        self.age.set(self.age.get() + 1);
    }
}

/// Decorator serving `dyn Person`.
pub struct PersonProxy<V: Person + ?Sized>(pub Interceptor<V>);

#[async_trait(?Send)]
impl<V: Person + ?Sized> ViewModel for PersonProxy<V> {
    fn notifier(&self) -> &ChangeNotifier {
        self.0.target().notifier()
    }

    async fn report_update(&self, property_name: &str) {
        self.0.target().report_update(property_name).await;
    }

    fn dispose(&self) {
        self.0.target().dispose();
    }
}

impl<V: Person + ?Sized> Person for PersonProxy<V> {
    fn name(&self) -> String {
        self.0.intercept("name", |vm| vm.name())
    }
    fn set_name(&self, name: &str) {
        self.0.intercept("set_name", |vm| vm.set_name(name));
    }
    fn age(&self) -> u32 {
        self.0.intercept("age", |vm| vm.age())
    }
    fn set_age(&self, age: u32) {
        self.0.intercept("set_age", |vm| vm.set_age(age));
    }
    fn birthday(&self) {
        self.0.intercept("birthday", |vm| vm.birthday());
    }
}

pub fn person_descriptor() -> BroadcastDescriptor {
    BroadcastDescriptor::new("Person")
        .broadcast_property("name")
        .property("age")
        .method("birthday", ["age"])
}

pub trait Directory: ViewModel {
    fn owner(&self) -> Rc<dyn Person>;
}

pub struct DirectoryVm {
    notifier: ChangeNotifier,
    owner: Rc<dyn Person>,
}

impl ViewModel for DirectoryVm {
    fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }
}

impl Directory for DirectoryVm {
    fn owner(&self) -> Rc<dyn Person> {
        Rc::clone(&self.owner)
    }
}

pub struct DirectoryProxy(pub Interceptor<DirectoryVm>);

impl ViewModel for DirectoryProxy {
    fn notifier(&self) -> &ChangeNotifier {
        self.0.target().notifier()
    }
}

impl Directory for DirectoryProxy {
    fn owner(&self) -> Rc<dyn Person> {
        self.0.intercept("owner", |vm| vm.owner())
    }
}

pub fn interfaces() -> Vec<ViewModelInterface> {
    vec![
        ViewModelInterface::of::<dyn Person>().extends::<dyn ViewModel>(),
        ViewModelInterface::of::<dyn Directory>().extends::<dyn ViewModel>(),
    ]
}

pub fn implementations() -> Vec<Implementation> {
    vec![
        Implementation::of("PersonVm", |_| Ok(PersonVm::default()))
            .provides::<dyn Person>(person_descriptor(), |i| Rc::new(PersonProxy(i)))
            .build(),
        Implementation::of("DirectoryVm", |args| {
            Ok(DirectoryVm {
                notifier: ChangeNotifier::new(),
                owner: args.take::<dyn Person>()?,
            })
        })
        .depends_on::<dyn Person>()
        .provides::<dyn Directory>(BroadcastDescriptor::new("Directory"), |i| {
            Rc::new(DirectoryProxy(i))
        })
        .build(),
    ]
}

/// Records property names raised on a notifier.
pub fn record(notifier: &ChangeNotifier) -> (Rc<RefCell<Vec<String>>>, vmbind_core::Subscription) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let subscription = notifier.subscribe(move |e| sink.borrow_mut().push(e.property_name.clone()));
    (log, subscription)
}

#![forbid(unsafe_code)]

//! Observable list of view models.
//!
//! # Design
//!
//! [`ObservableList<T>`] owns an ordered `Vec<Rc<T>>` plus, in a parallel
//! vector, one [`Subscription`] per element. Each subscription forwards the
//! element's own property changes to the list's [`ChangeNotifier`] under the
//! label `Label[index].Property`.
//!
//! Structural mutations raise, in order:
//!
//! 1. one [`CollectionChanged`] event carrying the [`CollectionAction`];
//! 2. `"Count"` when the length changed;
//! 3. `"Index[]"`.
//!
//! | Operation   | Action   | Property events        |
//! |-------------|----------|------------------------|
//! | `add`       | `Add`    | `Count`, `Index[]`     |
//! | `insert`    | `Add`    | `Count`, `Index[]`     |
//! | `set`       | `Add`    | `Index[]`              |
//! | `remove_at` | `Remove` | `Count`, `Index[]`     |
//! | `remove`    | `Remove` | `Count`, `Index[]`     |
//! | `clear`     | `Reset`  | `Count`, `Index[]`     |
//! | `copy_to`   | none     | none                   |
//!
//! # Invariants
//!
//! 1. Every element in the list has exactly one live subscription from the
//!    list.
//! 2. An element's subscription is dropped before the element leaves the
//!    list (remove, replace, clear, dispose, drop).
//! 3. A failed call leaves the list unchanged and raises nothing.
//!
//! # Known Limitation
//!
//! The index in a forwarded label is the index the element had when it was
//! subscribed. Later inserts and removals shift elements without relabelling
//! them, so the label can go stale relative to the element's position.

use std::any::{Any, type_name};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::notifier::{ChangeNotifier, EventChannel, PropertyChanged, Subscription};
use crate::view_model::ViewModel;

/// Property event raised when the length changes.
pub const COUNT_PROPERTY: &str = "Count";
/// Property event raised on every structural mutation.
pub const INDEXER_PROPERTY: &str = "Index[]";

/// Kind of structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionAction {
    Add,
    Remove,
    Reset,
}

/// A structural change of an [`ObservableList`].
pub struct CollectionChanged<T: ?Sized> {
    pub action: CollectionAction,
    /// Element added or removed. `None` for `Reset`.
    pub item: Option<Rc<T>>,
    /// Position of `item`. `None` for `Reset`.
    pub index: Option<usize>,
}

impl<T: ?Sized> Clone for CollectionChanged<T> {
    fn clone(&self) -> Self {
        Self {
            action: self.action,
            item: self.item.clone(),
            index: self.index,
        }
    }
}

impl<T: ?Sized> fmt::Debug for CollectionChanged<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionChanged")
            .field("action", &self.action)
            .field("has_item", &self.item.is_some())
            .field("index", &self.index)
            .finish()
    }
}

/// Errors from list operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    IndexOutOfRange { index: usize, len: usize },
    /// A value of the wrong type was handed to the erased facade.
    InvalidCast { expected: &'static str },
    /// The list was disposed.
    Disposed,
}

impl fmt::Display for ListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            Self::InvalidCast { expected } => write!(f, "value is not a {expected}"),
            Self::Disposed => f.write_str("list has been disposed"),
        }
    }
}

impl std::error::Error for ListError {}

struct ElementLink {
    label_index: usize,
    _subscription: Subscription,
}

/// An ordered list of view models that republishes their changes.
pub struct ObservableList<T: ViewModel + ?Sized> {
    items: Vec<Rc<T>>,
    links: Vec<ElementLink>,
    property_changed: ChangeNotifier,
    collection_changed: EventChannel<CollectionChanged<T>>,
    item_label: Rc<str>,
    disposed: bool,
}

impl<T: ViewModel + ?Sized> fmt::Debug for ObservableList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableList")
            .field("len", &self.items.len())
            .field("item_label", &self.item_label)
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl<T: ViewModel + ?Sized> Default for ObservableList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ViewModel + ?Sized> ObservableList<T> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            links: Vec::with_capacity(capacity),
            property_changed: ChangeNotifier::new(),
            collection_changed: EventChannel::new(),
            item_label: Rc::from(short_type_name::<T>()),
            disposed: false,
        }
    }

    /// Create a list holding `items`. Each item is subscribed at its index;
    /// no events are raised.
    pub fn from_items(items: impl IntoIterator<Item = Rc<T>>) -> Self {
        let mut list = Self::new();
        for item in items {
            let index = list.items.len();
            list.links.push(list.link(&item, index));
            list.items.push(item);
        }
        list
    }

    /// Create a list by mapping each element of `source` to a view model.
    pub fn from_mapped<S>(
        source: impl IntoIterator<Item = S>,
        map: impl FnMut(S) -> Rc<T>,
    ) -> Self {
        Self::from_items(source.into_iter().map(map))
    }

    /// Set the label used in forwarded element events
    /// (defaults to the short type name of `T`).
    ///
    /// Applies to elements subscribed afterwards.
    #[must_use]
    pub fn with_item_label(mut self, label: impl Into<String>) -> Self {
        self.item_label = Rc::from(label.into());
        self
    }

    /// The list's property-change channel (`Count`, `Index[]`, forwarded
    /// element changes).
    #[must_use]
    pub fn property_changed(&self) -> &ChangeNotifier {
        &self.property_changed
    }

    /// Subscribe to structural changes.
    pub fn subscribe_collection_changed(
        &self,
        handler: impl Fn(&CollectionChanged<T>) + 'static,
    ) -> Subscription {
        self.collection_changed.subscribe(handler)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn get(&self, index: usize) -> Result<&Rc<T>, ListError> {
        self.ensure_live()?;
        self.items.get(index).ok_or(ListError::IndexOutOfRange {
            index,
            len: self.items.len(),
        })
    }

    /// Whether `item` (by identity) is in the list.
    #[must_use]
    pub fn contains(&self, item: &Rc<T>) -> bool {
        self.index_of(item).is_some()
    }

    /// Position of `item` (by identity).
    #[must_use]
    pub fn index_of(&self, item: &Rc<T>) -> Option<usize> {
        self.items.iter().position(|candidate| Rc::ptr_eq(candidate, item))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rc<T>> {
        self.items.iter()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Rc<T>> {
        self.items.clone()
    }

    /// Index encoded in the forwarded label of the element at `index`.
    #[must_use]
    pub fn label_index(&self, index: usize) -> Option<usize> {
        self.links.get(index).map(|link| link.label_index)
    }

    /// Append `item`, returning its index.
    pub fn add(&mut self, item: Rc<T>) -> Result<usize, ListError> {
        self.ensure_live()?;
        let index = self.items.len();
        self.links.push(self.link(&item, index));
        self.items.push(Rc::clone(&item));
        self.raise(
            CollectionAction::Add,
            Some(item),
            Some(index),
            &[COUNT_PROPERTY, INDEXER_PROPERTY],
        );
        Ok(index)
    }

    /// Insert `item` at `index`, shifting later elements.
    pub fn insert(&mut self, index: usize, item: Rc<T>) -> Result<(), ListError> {
        self.ensure_live()?;
        if index > self.items.len() {
            return Err(ListError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        self.links.insert(index, self.link(&item, index));
        self.items.insert(index, Rc::clone(&item));
        self.raise(
            CollectionAction::Add,
            Some(item),
            Some(index),
            &[COUNT_PROPERTY, INDEXER_PROPERTY],
        );
        Ok(())
    }

    /// Replace the element at `index`, returning the previous occupant.
    ///
    /// The previous occupant's subscription is dropped.
    pub fn set(&mut self, index: usize, item: Rc<T>) -> Result<Rc<T>, ListError> {
        self.ensure_live()?;
        self.check_index(index)?;
        let link = self.link(&item, index);
        drop(std::mem::replace(&mut self.links[index], link));
        let previous = std::mem::replace(&mut self.items[index], Rc::clone(&item));
        self.raise(
            CollectionAction::Add,
            Some(item),
            Some(index),
            &[INDEXER_PROPERTY],
        );
        Ok(previous)
    }

    /// Remove and return the element at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<Rc<T>, ListError> {
        self.ensure_live()?;
        self.check_index(index)?;
        drop(self.links.remove(index));
        let item = self.items.remove(index);
        self.raise(
            CollectionAction::Remove,
            Some(Rc::clone(&item)),
            Some(index),
            &[COUNT_PROPERTY, INDEXER_PROPERTY],
        );
        Ok(item)
    }

    /// Remove `item` (by identity). Returns `false`, raising nothing, when it
    /// is not in the list.
    pub fn remove(&mut self, item: &Rc<T>) -> Result<bool, ListError> {
        self.ensure_live()?;
        match self.index_of(item) {
            Some(index) => self.remove_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    /// Remove every element. Raises a single `Reset`.
    pub fn clear(&mut self) -> Result<(), ListError> {
        self.ensure_live()?;
        self.links.clear();
        self.items.clear();
        self.raise(
            CollectionAction::Reset,
            None,
            None,
            &[COUNT_PROPERTY, INDEXER_PROPERTY],
        );
        Ok(())
    }

    /// Copy the elements into `target` starting at `offset`. Raises nothing.
    pub fn copy_to(&self, target: &mut [Option<Rc<T>>], offset: usize) -> Result<(), ListError> {
        self.ensure_live()?;
        let room = target.len().saturating_sub(offset);
        if offset > target.len() || room < self.items.len() {
            return Err(ListError::IndexOutOfRange {
                index: offset.saturating_add(self.items.len()),
                len: target.len(),
            });
        }
        for (slot, item) in target[offset..].iter_mut().zip(&self.items) {
            *slot = Some(Rc::clone(item));
        }
        Ok(())
    }

    /// Drop every element subscription and release storage and listeners.
    ///
    /// Calling it again is a no-op.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.links = Vec::new();
        self.items = Vec::new();
        self.property_changed.clear();
        self.collection_changed.clear();
        self.disposed = true;
        trace!(list = %self.property_changed.id(), "observable list disposed");
    }

    fn link(&self, item: &T, index: usize) -> ElementLink {
        let relay = self.property_changed.clone();
        let label = Rc::clone(&self.item_label);
        let subscription = item.notifier().subscribe(move |event: &PropertyChanged| {
            relay.forward(&PropertyChanged::new(
                event.sender,
                format!("{label}[{index}].{}", event.property_name),
            ));
        });
        ElementLink {
            label_index: index,
            _subscription: subscription,
        }
    }

    fn raise(
        &self,
        action: CollectionAction,
        item: Option<Rc<T>>,
        index: Option<usize>,
        properties: &[&str],
    ) {
        trace!(
            list = %self.property_changed.id(),
            ?action,
            ?index,
            len = self.items.len(),
            "collection changed"
        );
        self.collection_changed.emit(&CollectionChanged {
            action,
            item,
            index,
        });
        for property in properties {
            self.property_changed.notify(*property);
        }
    }

    fn ensure_live(&self) -> Result<(), ListError> {
        if self.disposed {
            Err(ListError::Disposed)
        } else {
            Ok(())
        }
    }

    fn check_index(&self, index: usize) -> Result<(), ListError> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(ListError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })
        }
    }
}

impl<'a, T: ViewModel + ?Sized> IntoIterator for &'a ObservableList<T> {
    type Item = &'a Rc<T>;
    type IntoIter = std::slice::Iter<'a, Rc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Object-typed facade over an [`ObservableList`].
///
/// Values travel as `Rc<dyn Any>`; a value that is not an `Rc<T>` fails
/// with [`ListError::InvalidCast`].
pub trait ErasedList {
    fn len_any(&self) -> usize;
    fn get_any(&self, index: usize) -> Result<Rc<dyn Any>, ListError>;
    fn add_any(&mut self, value: Rc<dyn Any>) -> Result<usize, ListError>;
    fn insert_any(&mut self, index: usize, value: Rc<dyn Any>) -> Result<(), ListError>;
    fn set_any(&mut self, index: usize, value: Rc<dyn Any>) -> Result<(), ListError>;
    fn remove_any(&mut self, value: &Rc<dyn Any>) -> Result<bool, ListError>;
    /// Incompatible values are simply not contained.
    fn contains_any(&self, value: &Rc<dyn Any>) -> bool;
}

fn cast<T: Any>(value: Rc<dyn Any>) -> Result<Rc<T>, ListError> {
    value.downcast::<T>().map_err(|_| ListError::InvalidCast {
        expected: type_name::<T>(),
    })
}

impl<T: ViewModel> ErasedList for ObservableList<T> {
    fn len_any(&self) -> usize {
        self.len()
    }

    fn get_any(&self, index: usize) -> Result<Rc<dyn Any>, ListError> {
        let item: Rc<dyn Any> = Rc::<T>::clone(self.get(index)?);
        Ok(item)
    }

    fn add_any(&mut self, value: Rc<dyn Any>) -> Result<usize, ListError> {
        let item = cast::<T>(value)?;
        self.add(item)
    }

    fn insert_any(&mut self, index: usize, value: Rc<dyn Any>) -> Result<(), ListError> {
        let item = cast::<T>(value)?;
        self.insert(index, item)
    }

    fn set_any(&mut self, index: usize, value: Rc<dyn Any>) -> Result<(), ListError> {
        let item = cast::<T>(value)?;
        self.set(index, item).map(|_| ())
    }

    fn remove_any(&mut self, value: &Rc<dyn Any>) -> Result<bool, ListError> {
        let item = cast::<T>(Rc::clone(value))?;
        self.remove(&item)
    }

    fn contains_any(&self, value: &Rc<dyn Any>) -> bool {
        cast::<T>(Rc::clone(value)).is_ok_and(|item| self.contains(&item))
    }
}

/// Last path segment of `T`'s type name, without generics or `dyn`.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let full = full.strip_prefix("dyn ").unwrap_or(full);
    let base = full.split(['<', ' ']).next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

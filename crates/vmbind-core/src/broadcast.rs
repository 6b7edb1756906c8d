#![forbid(unsafe_code)]

//! Broadcast descriptors: which member invocations raise which property
//! change events.
//!
//! A [`BroadcastDescriptor`] is supplied alongside a view-model interface and
//! read by [`Interceptor`](crate::intercept::Interceptor). It records:
//!
//! - declared properties, each either broadcast (self-naming) or silent;
//! - methods and the property names they broadcast, in declaration order.
//!
//! Setters follow the `set_<property>` naming convention.
//!
//! | Member                      | Resolution                          |
//! |-----------------------------|-------------------------------------|
//! | `set_P`, `P` broadcast      | `Setter { broadcast: true }` → `P`  |
//! | `set_P`, `P` declared only  | `Setter { broadcast: false }` → ∅   |
//! | method with broadcast list  | `Method` → listed names             |
//! | anything else               | `Unknown` → ∅                       |

use std::collections::HashMap;

/// Prefix that marks a property setter member.
pub const SETTER_PREFIX: &str = "set_";

#[derive(Debug, Clone, Default)]
struct PropertyEntry {
    /// Empty for silent properties, `[name]` for broadcast ones.
    targets: Vec<String>,
}

/// How a member identifier resolved against a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind<'a> {
    /// Setter of a declared property.
    Setter { property: &'a str, broadcast: bool },
    /// Method with at least one broadcast property.
    Method(&'a [String]),
    /// Nothing declared for this member.
    Unknown,
}

/// Per-interface broadcast metadata.
#[derive(Debug, Clone, Default)]
pub struct BroadcastDescriptor {
    interface: String,
    properties: HashMap<String, PropertyEntry>,
    methods: HashMap<String, Vec<String>>,
}

impl BroadcastDescriptor {
    /// Empty descriptor for `interface` (used in diagnostics only).
    #[must_use]
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            ..Self::default()
        }
    }

    /// Declare a property whose setter raises no event.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.properties.entry(name.into()).or_default();
        self
    }

    /// Declare a property whose setter raises a change event on its own name.
    #[must_use]
    pub fn broadcast_property(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let targets = vec![name.clone()];
        self.properties.insert(name, PropertyEntry { targets });
        self
    }

    /// Declare that calling `method` broadcasts `properties`, in order.
    ///
    /// Repeated declarations for the same method append. A property name is
    /// kept once per method.
    #[must_use]
    pub fn method<I, S>(mut self, method: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = self.methods.entry(method.into()).or_default();
        for property in properties {
            let property = property.into();
            if !list.contains(&property) {
                list.push(property);
            }
        }
        self
    }

    /// Interface name this descriptor belongs to.
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Resolve `member` to its declared kind.
    ///
    /// A setter-shaped name whose property is not declared falls through to
    /// the method table.
    #[must_use]
    pub fn resolve(&self, member: &str) -> MemberKind<'_> {
        if let Some((property, entry)) = member
            .strip_prefix(SETTER_PREFIX)
            .and_then(|p| self.properties.get_key_value(p))
        {
            return MemberKind::Setter {
                property: property.as_str(),
                broadcast: !entry.targets.is_empty(),
            };
        }
        match self.methods.get(member) {
            Some(list) if !list.is_empty() => MemberKind::Method(list),
            _ => MemberKind::Unknown,
        }
    }

    /// Property names to broadcast after `member` runs.
    #[must_use]
    pub fn targets(&self, member: &str) -> &[String] {
        if let Some(entry) = member
            .strip_prefix(SETTER_PREFIX)
            .and_then(|p| self.properties.get(p))
        {
            return &entry.targets;
        }
        self.methods
            .get(member)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether `property` is declared as broadcast.
    #[must_use]
    pub fn is_broadcast(&self, property: &str) -> bool {
        self.properties
            .get(property)
            .is_some_and(|entry| !entry.targets.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> BroadcastDescriptor {
        BroadcastDescriptor::new("Counter")
            .broadcast_property("count")
            .property("label")
            .method("increment", ["count"])
            .method("reset_all", ["count", "label"])
    }

    #[test]
    fn broadcast_setter_targets_itself() {
        let d = descriptor();
        assert_eq!(d.targets("set_count"), ["count".to_string()]);
        assert_eq!(
            d.resolve("set_count"),
            MemberKind::Setter {
                property: "count",
                broadcast: true
            }
        );
    }

    #[test]
    fn silent_setter_targets_nothing() {
        let d = descriptor();
        assert!(d.targets("set_label").is_empty());
        assert_eq!(
            d.resolve("set_label"),
            MemberKind::Setter {
                property: "label",
                broadcast: false
            }
        );
    }

    #[test]
    fn method_targets_in_declaration_order() {
        let d = descriptor();
        assert_eq!(d.targets("reset_all"), ["count", "label"]);
    }

    #[test]
    fn repeated_method_declarations_append_without_duplicates() {
        let d = BroadcastDescriptor::new("X")
            .method("touch", ["a"])
            .method("touch", ["b", "a"]);
        assert_eq!(d.targets("touch"), ["a", "b"]);
    }

    #[test]
    fn setter_shaped_method_falls_through_to_method_table() {
        let d = BroadcastDescriptor::new("X").method("set_up", ["ready"]);
        assert_eq!(d.targets("set_up"), ["ready"]);
        assert!(matches!(d.resolve("set_up"), MemberKind::Method(_)));
    }

    #[test]
    fn unknown_member_targets_nothing() {
        let d = descriptor();
        assert!(d.targets("get_count").is_empty());
        assert_eq!(d.resolve("refresh"), MemberKind::Unknown);
    }

    #[test]
    fn is_broadcast_reports_declaration() {
        let d = descriptor();
        assert!(d.is_broadcast("count"));
        assert!(!d.is_broadcast("label"));
        assert!(!d.is_broadcast("missing"));
        assert_eq!(d.interface(), "Counter");
    }
}

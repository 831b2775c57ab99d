//! Cross-reference resolution and the reference cache
//!
//! References in the XML are strings: `EntityType="Self.Customer"`,
//! `TypeName="IsTypeOf(Model.Customer)"`, `StoreEntitySet="Customers"`.
//! They are resolved against the realized collections and memoized per
//! (holder, slot). The cache keeps a reverse table so a removed target can
//! clear every entry pointing at it.

use std::collections::{HashMap, HashSet};
use tracing::trace;

use super::collection::CollectionKey;
use super::{EdmxModel, ObjectId, ObjectKind, Section};

/// Case-insensitive name comparison used by every lookup
pub fn names_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Which reference of a holder is cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum RefSlot {
    EntityType,
    BaseType,
    Association,
    AssociationSet,
    EndType(u8),
    EndSet(u8),
    EntitySet,
    StoreEntitySet,
    Property,
    Column,
    Function,
    FunctionImport,
}

#[derive(Debug, Default)]
pub(crate) struct RefCache {
    resolved: HashMap<(ObjectId, RefSlot), ObjectId>,
    dependents: HashMap<ObjectId, HashSet<(ObjectId, RefSlot)>>,
}

impl RefCache {
    pub fn get(&self, holder: ObjectId, slot: RefSlot) -> Option<ObjectId> {
        self.resolved.get(&(holder, slot)).copied()
    }

    pub fn store(&mut self, holder: ObjectId, slot: RefSlot, target: ObjectId) {
        if let Some(previous) = self.resolved.insert((holder, slot), target) {
            if previous != target {
                if let Some(holders) = self.dependents.get_mut(&previous) {
                    holders.remove(&(holder, slot));
                }
            }
        }
        self.dependents
            .entry(target)
            .or_default()
            .insert((holder, slot));
    }

    pub fn forget(&mut self, holder: ObjectId, slot: RefSlot) {
        if let Some(target) = self.resolved.remove(&(holder, slot)) {
            if let Some(holders) = self.dependents.get_mut(&target) {
                holders.remove(&(holder, slot));
            }
        }
    }

    /// Drop every cached reference pointing at `target`
    pub fn invalidate_target(&mut self, target: ObjectId) -> usize {
        let Some(holders) = self.dependents.remove(&target) else {
            return 0;
        };
        for key in &holders {
            self.resolved.remove(key);
        }
        holders.len()
    }

    /// Drop every cached reference held by `holder`
    pub fn forget_holder(&mut self, holder: ObjectId) {
        let slots: Vec<RefSlot> = self
            .resolved
            .keys()
            .filter(|(h, _)| *h == holder)
            .map(|(_, slot)| *slot)
            .collect();
        for slot in slots {
            self.forget(holder, slot);
        }
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }
}

/// A reference as written in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QualifiedRef<'a> {
    pub is_type_of: bool,
    pub is_collection: bool,
    pub qualifier: Option<&'a str>,
    pub name: &'a str,
}

impl<'a> QualifiedRef<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let mut inner = raw.trim();
        let mut is_type_of = false;
        let mut is_collection = false;
        if let Some(rest) = inner.strip_prefix("IsTypeOf(").and_then(|r| r.strip_suffix(')')) {
            is_type_of = true;
            inner = rest.trim();
        } else if let Some(rest) = inner.strip_prefix("Collection(").and_then(|r| r.strip_suffix(')')) {
            is_collection = true;
            inner = rest.trim();
        }
        let (qualifier, name) = match inner.rsplit_once('.') {
            Some((qualifier, name)) => (Some(qualifier), name),
            None => (None, inner),
        };
        Self {
            is_type_of,
            is_collection,
            qualifier,
            name,
        }
    }

    /// Same reference with a different simple name
    pub fn with_name(&self, name: &str) -> String {
        let base = match self.qualifier {
            Some(qualifier) => format!("{}.{}", qualifier, name),
            None => name.to_string(),
        };
        if self.is_type_of {
            format!("IsTypeOf({})", base)
        } else if self.is_collection {
            format!("Collection({})", base)
        } else {
            base
        }
    }
}

impl EdmxModel {
    /// Whether a reference qualifier names the section's namespace or alias
    pub(crate) fn qualifier_matches(&self, section: Section, qualifier: Option<&str>) -> bool {
        let Some(qualifier) = qualifier else {
            return true;
        };
        // Container-scoped references ("Container.Set") qualify by container name
        [self.namespace(section), self.alias(section), self.container_name(section)]
            .into_iter()
            .flatten()
            .any(|candidate| names_match(candidate, qualifier))
    }

    /// Whether `raw` refers to the object named `name` of a section
    pub(crate) fn refers_to(&self, section: Section, raw: &str, name: &str) -> bool {
        let reference = QualifiedRef::parse(raw);
        names_match(reference.name, name) && self.qualifier_matches(section, reference.qualifier)
    }

    /// Resolve a reference against a section-level collection
    pub(crate) fn resolve_in(&mut self, section: Section, kind: ObjectKind, raw: &str) -> Option<ObjectId> {
        let reference = QualifiedRef::parse(raw);
        if !self.qualifier_matches(section, reference.qualifier) {
            return None;
        }
        self.lookup(CollectionKey::section(section, kind), reference.name)
    }

    /// Resolve a member of an owner object by simple name
    pub(crate) fn resolve_member(&mut self, owner: ObjectId, kind: ObjectKind, name: &str) -> Option<ObjectId> {
        self.lookup(CollectionKey::object(owner, kind), name)
    }

    /// Memoized resolution of one reference of a live holder
    pub(crate) fn resolve_cached(
        &mut self,
        holder: ObjectId,
        slot: RefSlot,
        resolve: impl FnOnce(&mut Self) -> Option<ObjectId>,
    ) -> Option<ObjectId> {
        if !self.is_live_id(holder) {
            return None;
        }
        if let Some(target) = self.refs.get(holder, slot) {
            if self.is_live_id(target) {
                trace!(holder = holder.index(), ?slot, "Reference cache hit");
                return Some(target);
            }
            self.refs.forget(holder, slot);
        }
        let target = resolve(self)?;
        self.refs.store(holder, slot, target);
        Some(target)
    }

    /// Attribute of a holder's node, owned so resolution can borrow the model mutably
    pub(crate) fn attr_of(&self, holder: ObjectId, attribute: &str) -> Option<String> {
        self.tree
            .attr(self.record(holder).node, attribute)
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_references() {
        let plain = QualifiedRef::parse("Customer");
        assert_eq!(plain.qualifier, None);
        assert_eq!(plain.name, "Customer");

        let qualified = QualifiedRef::parse("Northwind.Model.Customer");
        assert_eq!(qualified.qualifier, Some("Northwind.Model"));
        assert_eq!(qualified.name, "Customer");

        let type_of = QualifiedRef::parse("IsTypeOf(Self.Customer)");
        assert!(type_of.is_type_of);
        assert_eq!(type_of.qualifier, Some("Self"));
        assert_eq!(type_of.with_name("Client"), "IsTypeOf(Self.Client)");

        let collection = QualifiedRef::parse("Collection(Model.Order)");
        assert!(collection.is_collection);
        assert_eq!(collection.with_name("Invoice"), "Collection(Model.Invoice)");
    }

    #[test]
    fn test_names_match_ignores_case() {
        assert!(names_match("Customer", "customer"));
        assert!(names_match("ÄPFEL", "äpfel"));
        assert!(!names_match("Customer", "Customers"));
    }

    #[test]
    fn test_cache_invalidation_by_target() {
        let mut cache = RefCache::default();
        let (a, b, target, other) = (ObjectId(1), ObjectId(2), ObjectId(3), ObjectId(4));
        cache.store(a, RefSlot::EntityType, target);
        cache.store(b, RefSlot::BaseType, target);
        cache.store(b, RefSlot::EntitySet, other);

        assert_eq!(cache.invalidate_target(target), 2);
        assert_eq!(cache.get(a, RefSlot::EntityType), None);
        assert_eq!(cache.get(b, RefSlot::EntitySet), Some(other));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_retarget_drops_old_dependent() {
        let mut cache = RefCache::default();
        let (holder, first, second) = (ObjectId(1), ObjectId(2), ObjectId(3));
        cache.store(holder, RefSlot::EntityType, first);
        cache.store(holder, RefSlot::EntityType, second);

        assert_eq!(cache.invalidate_target(first), 0);
        assert_eq!(cache.get(holder, RefSlot::EntityType), Some(second));

        cache.forget_holder(holder);
        assert_eq!(cache.len(), 0);
    }
}

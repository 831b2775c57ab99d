//! Lazily enumerated, name-indexed object collections

use std::collections::HashMap;
use tracing::{debug, warn};

use super::diagnostics::{DiagnosticCode, DiagnosticItem};
use super::resolve::names_match;
use super::{EdmxModel, ObjectId, ObjectKind, Section};
use crate::xml::NodeId;

/// Who owns a collection: a document section or another object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Owner {
    Section(Section),
    Object(ObjectId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CollectionKey {
    pub owner: Owner,
    pub kind: ObjectKind,
}

impl CollectionKey {
    pub fn section(section: Section, kind: ObjectKind) -> Self {
        Self {
            owner: Owner::Section(section),
            kind,
        }
    }

    pub fn object(owner: ObjectId, kind: ObjectKind) -> Self {
        Self {
            owner: Owner::Object(owner),
            kind,
        }
    }
}

/// Realized members of one collection, in document order
#[derive(Debug, Default)]
pub(crate) struct LazyCollection {
    entries: Vec<(String, ObjectId)>,
    index: HashMap<String, ObjectId>,
}

impl LazyCollection {
    pub fn ids(&self) -> Vec<ObjectId> {
        self.entries.iter().map(|(_, id)| *id).collect()
    }

    /// Exact match first, then case-insensitive in document order
    pub fn get(&self, name: &str) -> Option<ObjectId> {
        if let Some(&id) = self.index.get(name) {
            return Some(id);
        }
        self.entries
            .iter()
            .find(|(key, _)| names_match(key, name))
            .map(|(_, id)| *id)
    }

    /// Another member whose name matches case-insensitively
    pub fn conflicting(&self, name: &str, except: Option<ObjectId>) -> Option<ObjectId> {
        self.entries
            .iter()
            .find(|(key, id)| Some(*id) != except && names_match(key, name))
            .map(|(_, id)| *id)
    }

    /// Returns false when the exact name is already taken
    pub fn insert(&mut self, name: String, id: ObjectId) -> bool {
        if self.index.contains_key(&name) {
            return false;
        }
        self.index.insert(name.clone(), id);
        self.entries.push((name, id));
        true
    }

    pub fn rekey(&mut self, id: ObjectId, new_name: &str) {
        let Some(entry) = self.entries.iter_mut().find(|(_, entry_id)| *entry_id == id) else {
            return;
        };
        let old_name = std::mem::replace(&mut entry.0, new_name.to_string());
        if self.index.get(&old_name) == Some(&id) {
            self.index.remove(&old_name);
        }
        self.index.entry(new_name.to_string()).or_insert(id);
    }

    pub fn remove(&mut self, id: ObjectId) {
        if let Some(position) = self.entries.iter().position(|(_, entry_id)| *entry_id == id) {
            let (name, _) = self.entries.remove(position);
            if self.index.get(&name) == Some(&id) {
                self.index.remove(&name);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl EdmxModel {
    /// Members of a collection, realizing it on first use
    pub(crate) fn collection(&mut self, key: CollectionKey) -> Vec<ObjectId> {
        self.ensure_collection(key);
        self.collections
            .get(&key)
            .map(LazyCollection::ids)
            .unwrap_or_default()
    }

    /// Member of a collection by name
    pub(crate) fn lookup(&mut self, key: CollectionKey, name: &str) -> Option<ObjectId> {
        self.ensure_collection(key);
        self.collections.get(&key)?.get(name)
    }

    pub(crate) fn ensure_collection(&mut self, key: CollectionKey) {
        if self.collections.contains_key(&key) || self.materializing.contains(&key) {
            return;
        }
        self.materializing.insert(key);
        self.collection_queries += 1;

        let section = self.collection_section(key);
        let nodes = self.collection_nodes(key);
        let mut collection = LazyCollection::default();

        for node in nodes {
            let name = self.name_of_node(key.kind, node).to_string();
            if name.is_empty() {
                self.record_problem(
                    key.kind,
                    "",
                    DiagnosticCode::MissingName,
                    format!("{} without a {} attribute", key.kind, key.kind.name_attribute()),
                    section,
                );
                continue;
            }
            if collection.contains(&name) {
                self.record_problem(
                    key.kind,
                    &name,
                    DiagnosticCode::DuplicateName,
                    format!("duplicate {} '{}' ignored", key.kind, name),
                    section,
                );
                continue;
            }
            if let Some((code, message)) = self.structural_problem(key.kind, node, section) {
                self.record_problem(key.kind, &name, code, message, section);
                continue;
            }
            let id = match self.node_objects.get(&node) {
                Some(&id) => id,
                None => self.register(key.kind, section, node, key),
            };
            collection.insert(name, id);
        }

        debug!(
            kind = %key.kind,
            section = %section,
            count = collection.len(),
            "Collection enumerated"
        );
        self.materializing.remove(&key);
        self.collections.insert(key, collection);
    }

    /// Register a freshly created node in an (enumerated) collection
    pub(crate) fn adopt(&mut self, key: CollectionKey, node: NodeId) -> ObjectId {
        self.ensure_collection(key);
        // The enumeration may already have picked the node up
        if let Some(&id) = self.node_objects.get(&node) {
            return id;
        }
        let section = self.collection_section(key);
        let name = self.name_of_node(key.kind, node).to_string();
        let id = self.register(key.kind, section, node, key);
        if let Some(collection) = self.collections.get_mut(&key) {
            collection.insert(name, id);
        }
        id
    }

    /// Collections whose names must not collide with a member of `key`
    fn sibling_keys(key: CollectionKey) -> Vec<CollectionKey> {
        use ObjectKind::*;
        let kinds: &[ObjectKind] = match key.kind {
            EntityType | Association => &[EntityType, Association],
            EntitySet | AssociationSet | FunctionImport => &[EntitySet, AssociationSet, FunctionImport],
            Property | NavigationProperty => &[Property, NavigationProperty],
            _ => return vec![key],
        };
        kinds
            .iter()
            .map(|kind| CollectionKey {
                owner: key.owner,
                kind: *kind,
            })
            .collect()
    }

    /// Existing object whose name collides with `name` in `key` or its sibling collections
    pub(crate) fn name_conflict(&mut self, key: CollectionKey, name: &str, except: Option<ObjectId>) -> Option<ObjectId> {
        for sibling in Self::sibling_keys(key) {
            self.ensure_collection(sibling);
            if let Some(existing) = self
                .collections
                .get(&sibling)
                .and_then(|c| c.conflicting(name, except))
            {
                return Some(existing);
            }
        }
        None
    }

    pub(crate) fn collection_section(&self, key: CollectionKey) -> Section {
        match key.owner {
            Owner::Section(section) => section,
            Owner::Object(owner) => self.record(owner).section,
        }
    }

    fn collection_nodes(&self, key: CollectionKey) -> Vec<NodeId> {
        let parent = match key.owner {
            Owner::Object(owner) => Some(self.record(owner).node),
            Owner::Section(section) => self.section_parent(section, key.kind),
        };
        parent
            .map(|p| self.tree.children_named(p, key.kind.element_name()))
            .unwrap_or_default()
    }

    fn section_parent(&self, section: Section, kind: ObjectKind) -> Option<NodeId> {
        use ObjectKind::*;
        match kind {
            EntityType | Association | Function => self.schema_node(section),
            EntitySet | AssociationSet | FunctionImport => self.container_node(section),
            EntitySetMapping | AssociationSetMapping | FunctionImportMapping => self.container_mapping_node(),
            Shape | Connector => self.sections.diagram,
            _ => None,
        }
    }

    pub(crate) fn container_mapping_node(&self) -> Option<NodeId> {
        self.tree
            .first_child_named(self.sections.mapping, "EntityContainerMapping")
    }

    /// Integrity problems that keep a node from being realized
    fn structural_problem(&mut self, kind: ObjectKind, node: NodeId, section: Section) -> Option<(DiagnosticCode, String)> {
        let required_reference = match kind {
            ObjectKind::EntitySet => Some(("EntityType", ObjectKind::EntityType)),
            ObjectKind::AssociationSet => Some(("Association", ObjectKind::Association)),
            ObjectKind::NavigationProperty => Some(("Relationship", ObjectKind::Association)),
            ObjectKind::Association => {
                let ends = self.tree.children_named(node, "End").len();
                if ends != 2 {
                    return Some((
                        DiagnosticCode::MalformedAssociation,
                        format!("association must have exactly two ends, found {}", ends),
                    ));
                }
                None
            }
            _ => None,
        };

        let (attribute, target_kind) = required_reference?;
        let Some(reference) = self.tree.attr(node, attribute).map(str::to_string) else {
            return Some((
                DiagnosticCode::UnresolvedReference,
                format!("{} has no {} attribute", kind, attribute),
            ));
        };
        if self.resolve_in(section, target_kind, &reference).is_none() {
            return Some((
                DiagnosticCode::UnresolvedReference,
                format!("{} '{}' not found", target_kind, reference),
            ));
        }
        None
    }

    fn record_problem(&mut self, kind: ObjectKind, name: &str, code: DiagnosticCode, message: String, section: Section) {
        warn!(code = code.as_str(), kind = %kind, name, "{}", message);
        self.diagnostics.push(
            DiagnosticItem::new(kind, name, code, message).with_context(format!("section: {}", section)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> ObjectId {
        ObjectId(n)
    }

    #[test]
    fn test_lookup_is_exact_first_then_case_insensitive() {
        let mut collection = LazyCollection::default();
        assert!(collection.insert("customer".to_string(), id(1)));
        assert!(collection.insert("Customer".to_string(), id(2)));
        assert!(!collection.insert("Customer".to_string(), id(3)));

        assert_eq!(collection.get("Customer"), Some(id(2)));
        assert_eq!(collection.get("customer"), Some(id(1)));
        assert_eq!(collection.get("CUSTOMER"), Some(id(1)));
        assert_eq!(collection.get("Order"), None);
    }

    #[test]
    fn test_rekey_and_remove() {
        let mut collection = LazyCollection::default();
        collection.insert("Customer".to_string(), id(1));
        collection.insert("Order".to_string(), id(2));

        collection.rekey(id(1), "Client");
        assert_eq!(collection.get("Customer"), None);
        assert_eq!(collection.get("Client"), Some(id(1)));
        assert_eq!(collection.ids(), vec![id(1), id(2)]);

        collection.remove(id(2));
        assert_eq!(collection.get("Order"), None);
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_conflicting_ignores_self() {
        let mut collection = LazyCollection::default();
        collection.insert("Customer".to_string(), id(1));
        assert_eq!(collection.conflicting("CUSTOMER", None), Some(id(1)));
        assert_eq!(collection.conflicting("customer", Some(id(1))), None);
    }
}

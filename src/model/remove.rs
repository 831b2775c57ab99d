//! Cascading removal
//!
//! Removing an object removes everything that cannot exist without it
//! (its members, the sets and mappings built on it, its diagram shape)
//! and scrubs the string references that would otherwise dangle. Each
//! removed object produces exactly one `Removed` event, dependents first.

use tracing::debug;

use super::collection::CollectionKey;
use super::events::ModelEvent;
use super::resolve::names_match;
use super::{
    Association, AssociationSet, EdmxModel, End, EntitySet, EntityType, EntityTypeMapping, Function,
    FunctionImport, MappingCondition, MappingFragment, ModelObject, ObjectId, ObjectKind, ObjectState, Property, Section,
};
use crate::error::{ModelError, Result};
use crate::xml::NodeId;

/// XML edits that keep the document consistent once an object is gone
#[derive(Debug, Default)]
struct Scrub {
    detach: Vec<NodeId>,
    remove_attributes: Vec<(NodeId, &'static str)>,
    set_attributes: Vec<(NodeId, &'static str, String)>,
}

fn child_kinds(kind: ObjectKind) -> &'static [ObjectKind] {
    match kind {
        ObjectKind::EntityType => &[ObjectKind::Property, ObjectKind::NavigationProperty],
        ObjectKind::Function | ObjectKind::FunctionImport => &[ObjectKind::Parameter],
        ObjectKind::EntitySetMapping => &[ObjectKind::EntityTypeMapping],
        ObjectKind::EntityTypeMapping => &[ObjectKind::MappingFragment],
        ObjectKind::MappingFragment => &[ObjectKind::ScalarPropertyMapping, ObjectKind::MappingCondition],
        _ => &[],
    }
}

impl EdmxModel {
    /// Remove an object and its dependents; `Ok(false)` when it was already removed
    pub fn remove<H: ModelObject>(&mut self, handle: H) -> Result<bool> {
        let id = handle.object_id();
        let record = self.checked_record(handle)?;
        if record.kind != H::KIND {
            return Err(ModelError::InvalidModelObject {
                kind: H::KIND,
                name: self.name_of_id(id).to_string(),
                reason: format!("handle refers to a {}", record.kind),
            });
        }
        if record.state != ObjectState::Live {
            return Ok(false);
        }
        let before = self.removed_count();
        self.remove_id(id);
        debug!(
            kind = %record.kind,
            removed = self.removed_count() - before,
            "Object removed"
        );
        Ok(true)
    }

    fn removed_count(&self) -> usize {
        self.objects
            .iter()
            .filter(|r| r.state == ObjectState::Removed)
            .count()
    }

    pub(crate) fn remove_id(&mut self, id: ObjectId) {
        if !self.is_live_id(id) {
            return;
        }
        let record = *self.record(id);
        let name = self.name_of_id(id).to_string();

        // Everything is computed while the object still resolves
        for kind in child_kinds(record.kind) {
            self.ensure_collection(CollectionKey::object(id, *kind));
        }
        let mut dependents: Vec<ObjectId> = self
            .objects
            .iter()
            .enumerate()
            .filter(|(_, r)| r.owner == Some(id) && r.state == ObjectState::Live)
            .map(|(index, _)| ObjectId(index))
            .collect();
        for dependent in self.cascade_targets(id) {
            if !dependents.contains(&dependent) {
                dependents.push(dependent);
            }
        }
        let scrub = self.scrub_plan(id);

        self.objects[id.index()].state = ObjectState::Removing;
        for dependent in dependents {
            self.remove_id(dependent);
        }
        for node in scrub.detach {
            self.tree.detach(node);
        }
        for (node, attribute) in scrub.remove_attributes {
            self.tree.remove_attr(node, attribute);
        }
        for (node, attribute, value) in scrub.set_attributes {
            self.tree.set_attr(node, attribute, &value);
        }

        self.tree.detach(record.node);
        self.node_objects.remove(&record.node);
        self.objects[id.index()].state = ObjectState::Removed;
        self.emit(ModelEvent::Removed {
            object: id,
            kind: record.kind,
            name,
        });

        if let Some(parent) = record.owner {
            self.prune_empty_parent(record.kind, parent);
        }
    }

    /// A type mapping without fragments, or a set mapping without type mappings, goes too
    fn prune_empty_parent(&mut self, kind: ObjectKind, parent: ObjectId) {
        if !self.is_live_id(parent) {
            return;
        }
        let remaining = match kind {
            ObjectKind::MappingFragment => self.mapping_fragments(EntityTypeMapping::from_object_id(parent)).len(),
            ObjectKind::EntityTypeMapping => self
                .entity_type_mappings(super::EntitySetMapping::from_object_id(parent))
                .len(),
            _ => return,
        };
        if remaining == 0 {
            self.remove_id(parent);
        }
    }

    /// Objects outside the removed object's subtree that depend on it
    fn cascade_targets(&mut self, id: ObjectId) -> Vec<ObjectId> {
        let record = *self.record(id);
        let section = record.section;
        let mut targets = Vec::new();
        match record.kind {
            ObjectKind::EntityType => {
                let entity_type = EntityType::from_object_id(id);
                for set in self.entity_sets(section) {
                    if self.entity_type_of_set(set) == Some(entity_type) {
                        targets.push(set.object_id());
                    }
                }
                for association in self.associations(section) {
                    let touches = [End::From, End::To]
                        .into_iter()
                        .any(|end| self.end_type(association, end) == Some(entity_type));
                    if touches {
                        targets.push(association.object_id());
                    }
                }
                if section == Section::Conceptual {
                    for set_mapping in self.entity_set_mappings() {
                        for type_mapping in self.entity_type_mappings(set_mapping) {
                            let mapped = self.type_mapping_targets(type_mapping);
                            if mapped.len() == 1 && mapped[0].0 == entity_type {
                                targets.push(type_mapping.object_id());
                            }
                        }
                    }
                    if let Some(shape) = self.shape_of(entity_type) {
                        targets.push(shape.object_id());
                    }
                }
            }
            ObjectKind::EntitySet => {
                let set = EntitySet::from_object_id(id);
                for association_set in self.association_sets(section) {
                    let bound = [End::From, End::To]
                        .into_iter()
                        .any(|end| self.end_set(association_set, end) == Some(set));
                    if bound {
                        targets.push(association_set.object_id());
                    }
                }
                if section == Section::Conceptual {
                    if let Some(mapping) = self.entity_set_mapping_of(set) {
                        targets.push(mapping.object_id());
                    }
                } else {
                    for set_mapping in self.entity_set_mappings() {
                        for type_mapping in self.entity_type_mappings(set_mapping) {
                            for fragment in self.mapping_fragments(type_mapping) {
                                if self.fragment_store_set(fragment) == Some(set) {
                                    targets.push(fragment.object_id());
                                }
                            }
                        }
                    }
                    for mapping in self.association_set_mappings() {
                        if self.association_set_mapping_store_set(mapping) == Some(set) {
                            targets.push(mapping.object_id());
                        }
                    }
                }
            }
            ObjectKind::Association => {
                let association = Association::from_object_id(id);
                for set in self.association_sets(section) {
                    if self.association_of_set(set) == Some(association) {
                        targets.push(set.object_id());
                    }
                }
                if section == Section::Conceptual {
                    for entity_type in self.entity_types(section) {
                        for navigation in self.navigation_properties(entity_type) {
                            if self.navigation_association(navigation) == Some(association) {
                                targets.push(navigation.object_id());
                            }
                        }
                    }
                    if let Some(connector) = self.connector_of(association) {
                        targets.push(connector.object_id());
                    }
                }
            }
            ObjectKind::AssociationSet if section == Section::Conceptual => {
                let set = AssociationSet::from_object_id(id);
                for mapping in self.association_set_mappings() {
                    if self.mapped_association_set(mapping) == Some(set) {
                        targets.push(mapping.object_id());
                    }
                }
            }
            ObjectKind::Property => {
                let property = Property::from_object_id(id);
                for fragment in self.all_fragments() {
                    for mapping in self.scalar_property_mappings(fragment) {
                        let hit = if section == Section::Conceptual {
                            self.mapped_property(mapping) == Some(property)
                        } else {
                            self.mapped_column(mapping) == Some(property)
                        };
                        if hit {
                            targets.push(mapping.object_id());
                        }
                    }
                    if section == Section::Storage {
                        for condition in self.conditions(fragment) {
                            if self.condition_column(condition) == Some(property) {
                                targets.push(condition.object_id());
                            }
                        }
                    }
                }
                if section == Section::Conceptual {
                    targets.extend(
                        self.member_conditions(property)
                            .into_iter()
                            .map(|condition| condition.object_id()),
                    );
                }
            }
            ObjectKind::Function => {
                let function = Function::from_object_id(id);
                for mapping in self.function_import_mappings() {
                    if self.mapped_function(mapping) == Some(function) {
                        targets.push(mapping.object_id());
                    }
                }
            }
            ObjectKind::FunctionImport => {
                let import = FunctionImport::from_object_id(id);
                for mapping in self.function_import_mappings() {
                    if self.mapped_function_import(mapping) == Some(import) {
                        targets.push(mapping.object_id());
                    }
                }
            }
            _ => {}
        }
        targets
    }

    /// `Name` conditions testing a conceptual property, in fragments mapping
    /// its owner or a descendant that inherits it
    fn member_conditions(&mut self, property: Property) -> Vec<MappingCondition> {
        let Some(owner) = self.owning_type(property) else {
            return Vec::new();
        };
        let name = self.name(property).to_string();
        let mut family = vec![owner];
        for descendant in self.descendants(owner).unwrap_or_default() {
            if self.property(descendant, &name).is_none() {
                family.push(descendant);
            }
        }

        let mut conditions = Vec::new();
        for set_mapping in self.entity_set_mappings() {
            for type_mapping in self.entity_type_mappings(set_mapping) {
                let covers = self
                    .type_mapping_targets(type_mapping)
                    .iter()
                    .any(|(target, _)| family.contains(target));
                if !covers {
                    continue;
                }
                for fragment in self.mapping_fragments(type_mapping) {
                    for condition in self.conditions(fragment) {
                        let node = self.node_of(condition);
                        let tests_member = self.tree.attr(node, "ColumnName").is_none()
                            && self
                                .tree
                                .attr(node, "Name")
                                .is_some_and(|n| names_match(n, &name));
                        if tests_member {
                            conditions.push(condition);
                        }
                    }
                }
            }
        }
        conditions
    }

    fn all_fragments(&mut self) -> Vec<MappingFragment> {
        let mut fragments = Vec::new();
        for set_mapping in self.entity_set_mappings() {
            for type_mapping in self.entity_type_mappings(set_mapping) {
                fragments.extend(self.mapping_fragments(type_mapping));
            }
        }
        fragments
    }

    /// String references to the object that are edited rather than cascaded
    fn scrub_plan(&mut self, id: ObjectId) -> Scrub {
        let record = *self.record(id);
        let section = record.section;
        let mut scrub = Scrub::default();
        match record.kind {
            ObjectKind::EntityType => {
                let entity_type = EntityType::from_object_id(id);
                for candidate in self.entity_types(section) {
                    if candidate != entity_type && self.base_type(candidate) == Some(entity_type) {
                        scrub.remove_attributes.push((self.node_of(candidate), "BaseType"));
                    }
                }
                if section == Section::Conceptual {
                    for set_mapping in self.entity_set_mappings() {
                        for type_mapping in self.entity_type_mappings(set_mapping) {
                            let mapped = self.type_mapping_targets(type_mapping);
                            if mapped.len() <= 1 || !mapped.iter().any(|(t, _)| *t == entity_type) {
                                continue;
                            }
                            let node = self.node_of(type_mapping);
                            let raw = self.tree.attr(node, "TypeName").unwrap_or("").to_string();
                            let kept: Vec<&str> = raw
                                .split(';')
                                .map(str::trim)
                                .filter(|part| {
                                    !part.is_empty()
                                        && !self.refers_to(Section::Conceptual, part, self.name(entity_type))
                                })
                                .collect();
                            scrub.set_attributes.push((node, "TypeName", kept.join(";")));
                        }
                    }
                }
            }
            ObjectKind::EntitySet if section == Section::Conceptual => {
                let set = EntitySet::from_object_id(id);
                for import in self.function_imports() {
                    if self.function_import_entity_set(import) == Some(set) {
                        scrub.remove_attributes.push((self.node_of(import), "EntitySet"));
                    }
                }
            }
            ObjectKind::Property => {
                self.property_scrub(Property::from_object_id(id), &mut scrub);
            }
            _ => {}
        }
        scrub
    }

    fn property_scrub(&mut self, property: Property, scrub: &mut Scrub) {
        let section = self.section_of(property);
        let name = self.name(property).to_string();
        let Some(owner) = self.owning_type(property) else {
            return;
        };

        // Key
        if let Some(key) = self.tree.first_child_named(self.node_of(owner), "Key") {
            let refs = self.tree.children_named(key, "PropertyRef");
            let matching: Vec<NodeId> = refs
                .iter()
                .copied()
                .filter(|r| self.tree.attr(*r, "Name").is_some_and(|n| names_match(n, &name)))
                .collect();
            if !matching.is_empty() && matching.len() == refs.len() {
                scrub.detach.push(key);
            } else {
                scrub.detach.extend(matching);
            }
        }

        let mut family = vec![owner];
        family.extend(self.descendants(owner).unwrap_or_default());

        // Referential constraints: drop the principal/dependent pair naming the property
        for association in self.associations(section) {
            let Some(constraint_node) = self
                .tree
                .first_child_named(self.node_of(association), "ReferentialConstraint")
            else {
                continue;
            };
            let (Some(principal), Some(dependent)) = (
                self.tree.first_child_named(constraint_node, "Principal"),
                self.tree.first_child_named(constraint_node, "Dependent"),
            ) else {
                continue;
            };
            let principal_refs = self.tree.children_named(principal, "PropertyRef");
            let dependent_refs = self.tree.children_named(dependent, "PropertyRef");
            let mut indexes: Vec<usize> = Vec::new();
            for (side, refs) in [(principal, &principal_refs), (dependent, &dependent_refs)] {
                let role = self.tree.attr(side, "Role").unwrap_or("").to_string();
                let end_type = self
                    .end_for_role(association, &role)
                    .and_then(|end| self.end_type(association, end));
                if !end_type.is_some_and(|t| family.contains(&t)) {
                    continue;
                }
                for (index, reference) in refs.iter().enumerate() {
                    let named = self
                        .tree
                        .attr(*reference, "Name")
                        .is_some_and(|n| names_match(n, &name));
                    if named && !indexes.contains(&index) {
                        indexes.push(index);
                    }
                }
            }
            if indexes.is_empty() {
                continue;
            }
            if indexes.len() >= principal_refs.len().max(dependent_refs.len()) {
                scrub.detach.push(constraint_node);
                continue;
            }
            for index in indexes {
                scrub.detach.extend(principal_refs.get(index).copied());
                scrub.detach.extend(dependent_refs.get(index).copied());
            }
        }

        // Association set mapping end scalars
        for mapping in self.association_set_mappings() {
            let node = self.node_of(mapping);
            if section == Section::Conceptual {
                let Some(association) = self
                    .mapped_association_set(mapping)
                    .and_then(|set| self.association_of_set(set))
                else {
                    continue;
                };
                for end_property in self.tree.children_named(node, "EndProperty") {
                    let role = self.tree.attr(end_property, "Name").unwrap_or("").to_string();
                    let end_type = self
                        .end_for_role(association, &role)
                        .and_then(|end| self.end_type(association, end));
                    if !end_type.is_some_and(|t| family.contains(&t)) {
                        continue;
                    }
                    for scalar in self.tree.children_named(end_property, "ScalarProperty") {
                        if self.tree.attr(scalar, "Name").is_some_and(|n| names_match(n, &name)) {
                            scrub.detach.push(scalar);
                        }
                    }
                }
            } else {
                let table = self
                    .association_set_mapping_store_set(mapping)
                    .and_then(|set| self.entity_type_of_set(set));
                if table != Some(owner) {
                    continue;
                }
                let mut candidates: Vec<NodeId> = self
                    .tree
                    .children_named(node, "EndProperty")
                    .into_iter()
                    .flat_map(|end| self.tree.children_named(end, "ScalarProperty"))
                    .collect();
                candidates.extend(self.tree.children_named(node, "Condition"));
                for scalar in candidates {
                    if self
                        .tree
                        .attr(scalar, "ColumnName")
                        .is_some_and(|n| names_match(n, &name))
                    {
                        scrub.detach.push(scalar);
                    }
                }
            }
        }
    }
}

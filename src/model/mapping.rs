//! Conceptual-to-storage mapping (MSL)
//!
//! EntitySetMapping -> EntityTypeMapping -> MappingFragment ->
//! ScalarProperty / Condition, plus association set mappings and function
//! import mappings, all under the single `EntityContainerMapping`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::association::End;
use super::collection::CollectionKey;
use super::resolve::{names_match, QualifiedRef, RefSlot};
use super::{
    typed, AssociationSet, AssociationSetMapping, EdmxModel, EntitySet, EntitySetMapping, EntityType,
    EntityTypeMapping, Function, FunctionImport, FunctionImportMapping, MappingCondition, MappingFragment,
    ModelObject, ObjectKind, Property, ScalarPropertyMapping, Section,
};
use crate::error::{ModelError, Result};
use crate::xml::{Fallback, NodeId};

/// Right-hand side of a mapping `Condition`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionValue {
    Value(String),
    IsNull(bool),
}

/// Scalar pairs of one `EndProperty` of an association set mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndPropertyMapping {
    pub role: String,
    /// (property name, column name)
    pub pairs: Vec<(String, String)>,
}

impl EdmxModel {
    fn ensure_container_mapping(&mut self) -> Result<NodeId> {
        if let Some(node) = self.container_mapping_node() {
            return Ok(node);
        }
        let storage = self.ensure_container(Section::Storage)?;
        let conceptual = self.ensure_container(Section::Conceptual)?;
        let storage_name = self.tree.attr(storage, "Name").unwrap_or("").to_string();
        let conceptual_name = self.tree.attr(conceptual, "Name").unwrap_or("").to_string();
        let mapping = self.sections.mapping;
        let node = self.new_child_element(
            mapping,
            "EntityContainerMapping",
            &[
                ("StorageEntityContainer", storage_name.as_str()),
                ("CdmEntityContainer", conceptual_name.as_str()),
            ],
        );
        self.tree.append_child(mapping, node);
        Ok(node)
    }

    fn owner_of<P: ModelObject>(&self, id: super::ObjectId) -> Option<P> {
        self.record(id).owner.map(P::from_object_id)
    }

    fn unrelated(&self, from: String, to: String, reason: &str) -> ModelError {
        ModelError::InvalidAssociation {
            from,
            to,
            reason: reason.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Entity set mappings
    // ------------------------------------------------------------------

    pub fn entity_set_mappings(&mut self) -> Vec<EntitySetMapping> {
        typed(self.collection(CollectionKey::section(Section::Mapping, ObjectKind::EntitySetMapping)))
    }

    pub fn entity_set_mapping(&mut self, name: &str) -> Option<EntitySetMapping> {
        self.lookup(
            CollectionKey::section(Section::Mapping, ObjectKind::EntitySetMapping),
            name,
        )
        .map(EntitySetMapping::from_object_id)
    }

    pub fn mapped_entity_set(&mut self, mapping: EntitySetMapping) -> Option<EntitySet> {
        let id = mapping.object_id();
        self.resolve_cached(id, RefSlot::EntitySet, |model| {
            let raw = model.attr_of(id, "Name")?;
            model.resolve_in(Section::Conceptual, ObjectKind::EntitySet, &raw)
        })
        .map(EntitySet::from_object_id)
    }

    pub fn entity_set_mapping_of(&mut self, set: EntitySet) -> Option<EntitySetMapping> {
        self.entity_set_mappings()
            .into_iter()
            .find(|mapping| self.mapped_entity_set(*mapping) == Some(set))
    }

    pub fn add_entity_set_mapping(&mut self, set: EntitySet) -> Result<EntitySetMapping> {
        self.live_in(set, Section::Conceptual)?;
        let name = self.name(set).to_string();
        let key = CollectionKey::section(Section::Mapping, ObjectKind::EntitySetMapping);
        self.ensure_unique(key, ObjectKind::EntitySetMapping, &name, None)?;

        let container = self.ensure_container_mapping()?;
        let node = self.new_child_element(container, "EntitySetMapping", &[("Name", name.as_str())]);
        self.tree
            .insert_after_last(container, &["EntitySetMapping"], node, Fallback::First);
        Ok(EntitySetMapping::from_object_id(self.adopt(key, node)))
    }

    /// Map a conceptual set onto a store set: set mapping, type mapping and
    /// fragment are reused or created, and every effective property with a
    /// same-named column gets a scalar mapping
    pub fn map_entity_set(&mut self, set: EntitySet, store_set: EntitySet) -> Result<EntitySetMapping> {
        self.live_in(set, Section::Conceptual)?;
        self.live_in(store_set, Section::Storage)?;
        let entity_type = self
            .entity_type_of_set(set)
            .ok_or_else(|| ModelError::InvalidModelObject {
                kind: ObjectKind::EntitySet,
                name: self.full_name(set),
                reason: "entity type not found".to_string(),
            })?;
        let store_type = self
            .entity_type_of_set(store_set)
            .ok_or_else(|| ModelError::InvalidModelObject {
                kind: ObjectKind::EntitySet,
                name: self.full_name(store_set),
                reason: "store entity type not found".to_string(),
            })?;

        let mapping = match self.entity_set_mapping_of(set) {
            Some(mapping) => mapping,
            None => self.add_entity_set_mapping(set)?,
        };
        let existing_type_mapping = self
            .entity_type_mappings(mapping)
            .into_iter()
            .find(|tm| self.mapped_entity_type(*tm) == Some(entity_type));
        let type_mapping = match existing_type_mapping {
            Some(type_mapping) => type_mapping,
            None => self.add_entity_type_mapping(mapping, entity_type, true)?,
        };
        let existing_fragment = self
            .mapping_fragments(type_mapping)
            .into_iter()
            .find(|f| self.fragment_store_set(*f) == Some(store_set));
        let fragment = match existing_fragment {
            Some(fragment) => fragment,
            None => self.add_mapping_fragment(type_mapping, store_set)?,
        };

        let mapped: Vec<Property> = self
            .scalar_property_mappings(fragment)
            .into_iter()
            .filter_map(|spm| self.mapped_property(spm))
            .collect();
        let columns = self.properties(store_type);
        for property in self.effective_properties(entity_type)? {
            if mapped.contains(&property) {
                continue;
            }
            let name = self.name(property).to_string();
            let column = columns
                .iter()
                .copied()
                .find(|column| names_match(self.name(*column), &name));
            if let Some(column) = column {
                self.add_scalar_property_mapping(fragment, property, column)?;
            }
        }
        debug!(
            set = %self.full_name(set),
            store_set = %self.full_name(store_set),
            "Entity set mapped"
        );
        Ok(mapping)
    }

    /// Store sets the fragments for `entity_type` write to (exact type mappings
    /// and `IsTypeOf` mappings of the type or an ancestor)
    pub fn store_entity_sets_for(&mut self, mapping: EntitySetMapping, entity_type: EntityType) -> Vec<EntitySet> {
        let mut sets = Vec::new();
        for type_mapping in self.entity_type_mappings(mapping) {
            if !self.type_mapping_applies_to(type_mapping, entity_type) {
                continue;
            }
            for fragment in self.mapping_fragments(type_mapping) {
                if let Some(set) = self.fragment_store_set(fragment) {
                    if !sets.contains(&set) {
                        sets.push(set);
                    }
                }
            }
        }
        sets
    }

    // ------------------------------------------------------------------
    // Entity type mappings
    // ------------------------------------------------------------------

    pub fn entity_type_mappings(&mut self, mapping: EntitySetMapping) -> Vec<EntityTypeMapping> {
        if !self.is_live_id(mapping.object_id()) {
            return Vec::new();
        }
        typed(self.collection(CollectionKey::object(
            mapping.object_id(),
            ObjectKind::EntityTypeMapping,
        )))
    }

    pub fn add_entity_type_mapping(
        &mut self,
        mapping: EntitySetMapping,
        entity_type: EntityType,
        is_type_of: bool,
    ) -> Result<EntityTypeMapping> {
        let record = self.live(mapping)?;
        self.live_in(entity_type, Section::Conceptual)?;
        let set_type = self
            .mapped_entity_set(mapping)
            .and_then(|set| self.entity_type_of_set(set));
        let related = match set_type {
            Some(set_type) => set_type == entity_type || self.ancestors(entity_type)?.contains(&set_type),
            None => false,
        };
        if !related {
            return Err(self.unrelated(
                self.full_name(entity_type),
                self.name(mapping).to_string(),
                "entity type is not held by the mapped entity set",
            ));
        }

        let qualified = self.qualified(Section::Conceptual, self.name(entity_type));
        let type_name = if is_type_of {
            format!("IsTypeOf({})", qualified)
        } else {
            qualified
        };
        let key = CollectionKey::object(mapping.object_id(), ObjectKind::EntityTypeMapping);
        self.ensure_unique(key, ObjectKind::EntityTypeMapping, &type_name, None)?;

        let node = self.new_child_element(record.node, "EntityTypeMapping", &[("TypeName", type_name.as_str())]);
        self.tree
            .insert_after_last(record.node, &["EntityTypeMapping"], node, Fallback::Last);
        Ok(EntityTypeMapping::from_object_id(self.adopt(key, node)))
    }

    /// Conceptual types named by `TypeName` (`;`-separated), with their IsTypeOf flag
    pub(crate) fn type_mapping_targets(&mut self, type_mapping: EntityTypeMapping) -> Vec<(EntityType, bool)> {
        let Some(raw) = self.attr_of(type_mapping.object_id(), "TypeName") else {
            return Vec::new();
        };
        raw.split(';')
            .filter(|part| !part.trim().is_empty())
            .filter_map(|part| {
                let is_type_of = QualifiedRef::parse(part).is_type_of;
                self.resolve_in(Section::Conceptual, ObjectKind::EntityType, part)
                    .map(|id| (EntityType::from_object_id(id), is_type_of))
            })
            .collect()
    }

    pub fn mapped_entity_type(&mut self, type_mapping: EntityTypeMapping) -> Option<EntityType> {
        let id = type_mapping.object_id();
        self.resolve_cached(id, RefSlot::EntityType, |model| {
            model
                .type_mapping_targets(type_mapping)
                .first()
                .map(|(t, _)| t.object_id())
        })
        .map(EntityType::from_object_id)
    }

    pub fn is_type_of(&self, type_mapping: EntityTypeMapping) -> bool {
        self.tree
            .attr(self.node_of(type_mapping), "TypeName")
            .is_some_and(|raw| QualifiedRef::parse(raw.split(';').next().unwrap_or("")).is_type_of)
    }

    /// Whether the type mapping covers instances of `entity_type`
    pub fn type_mapping_applies_to(&mut self, type_mapping: EntityTypeMapping, entity_type: EntityType) -> bool {
        let targets = self.type_mapping_targets(type_mapping);
        if targets.iter().any(|(target, _)| *target == entity_type) {
            return true;
        }
        let ancestors = self.ancestors(entity_type).unwrap_or_default();
        targets
            .iter()
            .any(|(target, is_type_of)| *is_type_of && ancestors.contains(target))
    }

    // ------------------------------------------------------------------
    // Mapping fragments
    // ------------------------------------------------------------------

    pub fn mapping_fragments(&mut self, type_mapping: EntityTypeMapping) -> Vec<MappingFragment> {
        if !self.is_live_id(type_mapping.object_id()) {
            return Vec::new();
        }
        typed(self.collection(CollectionKey::object(
            type_mapping.object_id(),
            ObjectKind::MappingFragment,
        )))
    }

    pub fn add_mapping_fragment(&mut self, type_mapping: EntityTypeMapping, store_set: EntitySet) -> Result<MappingFragment> {
        let record = self.live(type_mapping)?;
        self.live_in(store_set, Section::Storage)?;
        let name = self.name(store_set).to_string();
        let key = CollectionKey::object(type_mapping.object_id(), ObjectKind::MappingFragment);
        self.ensure_unique(key, ObjectKind::MappingFragment, &name, None)?;

        let node = self.new_child_element(record.node, "MappingFragment", &[("StoreEntitySet", name.as_str())]);
        self.tree
            .insert_after_last(record.node, &["MappingFragment"], node, Fallback::Last);
        Ok(MappingFragment::from_object_id(self.adopt(key, node)))
    }

    pub fn fragment_store_set(&mut self, fragment: MappingFragment) -> Option<EntitySet> {
        let id = fragment.object_id();
        self.resolve_cached(id, RefSlot::StoreEntitySet, |model| {
            let raw = model.attr_of(id, "StoreEntitySet")?;
            model.resolve_in(Section::Storage, ObjectKind::EntitySet, &raw)
        })
        .map(EntitySet::from_object_id)
    }

    /// Store table behind a fragment
    pub(crate) fn fragment_store_type(&mut self, fragment: MappingFragment) -> Option<EntityType> {
        let set = self.fragment_store_set(fragment)?;
        self.entity_type_of_set(set)
    }

    // ------------------------------------------------------------------
    // Scalar property mappings
    // ------------------------------------------------------------------

    pub fn scalar_property_mappings(&mut self, fragment: MappingFragment) -> Vec<ScalarPropertyMapping> {
        if !self.is_live_id(fragment.object_id()) {
            return Vec::new();
        }
        typed(self.collection(CollectionKey::object(
            fragment.object_id(),
            ObjectKind::ScalarPropertyMapping,
        )))
    }

    pub fn add_scalar_property_mapping(
        &mut self,
        fragment: MappingFragment,
        property: Property,
        column: Property,
    ) -> Result<ScalarPropertyMapping> {
        let record = self.live(fragment)?;
        self.live_in(property, Section::Conceptual)?;
        self.live_in(column, Section::Storage)?;

        let type_mapping: Option<EntityTypeMapping> = self.owner_of(fragment.object_id());
        let mut member_of_mapped_type = false;
        if let Some(type_mapping) = type_mapping {
            for (target, _) in self.type_mapping_targets(type_mapping) {
                if self.effective_properties(target)?.contains(&property) {
                    member_of_mapped_type = true;
                    break;
                }
            }
        }
        if !member_of_mapped_type {
            return Err(self.unrelated(
                self.full_name(property),
                self.full_name(column),
                "property is not a member of the mapped entity type",
            ));
        }
        if self.fragment_store_type(fragment) != self.owning_type(column) {
            return Err(self.unrelated(
                self.full_name(property),
                self.full_name(column),
                "column does not belong to the fragment's store entity set",
            ));
        }

        let name = self.name(property).to_string();
        let column_name = self.name(column).to_string();
        let key = CollectionKey::object(fragment.object_id(), ObjectKind::ScalarPropertyMapping);
        self.ensure_unique(key, ObjectKind::ScalarPropertyMapping, &name, None)?;

        let node = self.new_child_element(
            record.node,
            "ScalarProperty",
            &[("Name", name.as_str()), ("ColumnName", column_name.as_str())],
        );
        self.tree
            .insert_after_last(record.node, &["ScalarProperty"], node, Fallback::First);
        Ok(ScalarPropertyMapping::from_object_id(self.adopt(key, node)))
    }

    /// Map one property onto a column through the existing set mapping of
    /// the entity type; `InvalidAssociation` when no fragment relates them
    pub fn add_scalar_mapping(
        &mut self,
        entity_type: EntityType,
        property: Property,
        column: Property,
    ) -> Result<ScalarPropertyMapping> {
        self.live_in(entity_type, Section::Conceptual)?;
        self.live_in(property, Section::Conceptual)?;
        self.live_in(column, Section::Storage)?;
        let table = self
            .owning_type(column)
            .map(|t| self.full_name(t))
            .unwrap_or_default();

        let Some(mapping) = self
            .entity_set_of(entity_type)
            .and_then(|set| self.entity_set_mapping_of(set))
        else {
            return Err(self.unrelated(
                self.full_name(entity_type),
                table,
                "entity type has no entity set mapping",
            ));
        };

        // Exact type mappings before IsTypeOf mappings of an ancestor
        let mut candidates: Vec<EntityTypeMapping> = Vec::new();
        let type_mappings = self.entity_type_mappings(mapping);
        for type_mapping in &type_mappings {
            if self.mapped_entity_type(*type_mapping) == Some(entity_type) {
                candidates.push(*type_mapping);
            }
        }
        for type_mapping in type_mappings {
            if !candidates.contains(&type_mapping) && self.type_mapping_applies_to(type_mapping, entity_type) {
                candidates.push(type_mapping);
            }
        }

        let column_table = self.owning_type(column);
        for type_mapping in candidates {
            for fragment in self.mapping_fragments(type_mapping) {
                if self.fragment_store_type(fragment) == column_table {
                    return self.add_scalar_property_mapping(fragment, property, column);
                }
            }
        }
        Err(self.unrelated(
            self.full_name(entity_type),
            table,
            "no mapping fragment relates the entity type to this table",
        ))
    }

    /// Conceptual property named by a scalar mapping
    pub fn mapped_property(&mut self, mapping: ScalarPropertyMapping) -> Option<Property> {
        let id = mapping.object_id();
        let fragment: MappingFragment = self.owner_of(id)?;
        let type_mapping: EntityTypeMapping = self.owner_of(fragment.object_id())?;
        self.resolve_cached(id, RefSlot::Property, |model| {
            let name = model.attr_of(id, "Name")?;
            model
                .type_mapping_targets(type_mapping)
                .into_iter()
                .find_map(|(target, _)| model.effective_property(target, &name))
                .map(|p| p.object_id())
        })
        .map(Property::from_object_id)
    }

    /// Store column named by a scalar mapping
    pub fn mapped_column(&mut self, mapping: ScalarPropertyMapping) -> Option<Property> {
        let id = mapping.object_id();
        let fragment: MappingFragment = self.owner_of(id)?;
        self.resolve_cached(id, RefSlot::Column, |model| {
            let column = model.attr_of(id, "ColumnName")?;
            let table = model.fragment_store_type(fragment)?;
            model.property(table, &column).map(|p| p.object_id())
        })
        .map(Property::from_object_id)
    }

    // ------------------------------------------------------------------
    // Conditions
    // ------------------------------------------------------------------

    pub fn conditions(&mut self, fragment: MappingFragment) -> Vec<MappingCondition> {
        if !self.is_live_id(fragment.object_id()) {
            return Vec::new();
        }
        typed(self.collection(CollectionKey::object(
            fragment.object_id(),
            ObjectKind::MappingCondition,
        )))
    }

    /// Add a discriminator condition on a store column of the fragment's table
    pub fn add_condition(
        &mut self,
        fragment: MappingFragment,
        column: Property,
        value: ConditionValue,
    ) -> Result<MappingCondition> {
        let record = self.live(fragment)?;
        self.live_in(column, Section::Storage)?;
        if self.fragment_store_type(fragment) != self.owning_type(column) {
            return Err(self.unrelated(
                self.name(fragment).to_string(),
                self.full_name(column),
                "column does not belong to the fragment's store entity set",
            ));
        }
        let column_name = self.name(column).to_string();
        let key = CollectionKey::object(fragment.object_id(), ObjectKind::MappingCondition);
        self.ensure_unique(key, ObjectKind::MappingCondition, &column_name, None)?;

        let node = self.new_child_element(record.node, "Condition", &[("ColumnName", column_name.as_str())]);
        match &value {
            ConditionValue::Value(v) => self.tree.set_attr(node, "Value", v),
            ConditionValue::IsNull(is_null) => self.tree.set_attr(node, "IsNull", &is_null.to_string()),
        }
        self.tree
            .insert_after_last(record.node, &["Condition", "ScalarProperty"], node, Fallback::Last);
        Ok(MappingCondition::from_object_id(self.adopt(key, node)))
    }

    pub fn condition_value(&self, condition: MappingCondition) -> Option<ConditionValue> {
        let node = self.node_of(condition);
        if let Some(value) = self.tree.attr(node, "Value") {
            return Some(ConditionValue::Value(value.to_string()));
        }
        self.tree
            .attr(node, "IsNull")
            .map(|v| ConditionValue::IsNull(v.eq_ignore_ascii_case("true")))
    }

    /// Store column tested by a condition (`None` for conceptual `Name` conditions)
    pub fn condition_column(&mut self, condition: MappingCondition) -> Option<Property> {
        let id = condition.object_id();
        let owner = self.record(id).owner?;
        if self.record(owner).kind != ObjectKind::MappingFragment {
            return None;
        }
        let fragment = MappingFragment::from_object_id(owner);
        self.resolve_cached(id, RefSlot::Column, |model| {
            let column = model.attr_of(id, "ColumnName")?;
            let table = model.fragment_store_type(fragment)?;
            model.property(table, &column).map(|p| p.object_id())
        })
        .map(Property::from_object_id)
    }

    // ------------------------------------------------------------------
    // Association set mappings
    // ------------------------------------------------------------------

    pub fn association_set_mappings(&mut self) -> Vec<AssociationSetMapping> {
        typed(self.collection(CollectionKey::section(
            Section::Mapping,
            ObjectKind::AssociationSetMapping,
        )))
    }

    /// Map an association set onto the store set holding its foreign key; one
    /// empty `EndProperty` is created per role
    pub fn add_association_set_mapping(
        &mut self,
        set: AssociationSet,
        store_set: EntitySet,
    ) -> Result<AssociationSetMapping> {
        self.live_in(set, Section::Conceptual)?;
        self.live_in(store_set, Section::Storage)?;
        let association = self
            .association_of_set(set)
            .ok_or_else(|| ModelError::InvalidModelObject {
                kind: ObjectKind::AssociationSet,
                name: self.full_name(set),
                reason: "association not found".to_string(),
            })?;
        let name = self.name(set).to_string();
        let key = CollectionKey::section(Section::Mapping, ObjectKind::AssociationSetMapping);
        self.ensure_unique(key, ObjectKind::AssociationSetMapping, &name, None)?;

        let type_name = self.qualified(Section::Conceptual, self.name(association));
        let store_name = self.name(store_set).to_string();
        let container = self.ensure_container_mapping()?;
        let node = self.new_child_element(
            container,
            "AssociationSetMapping",
            &[
                ("Name", name.as_str()),
                ("TypeName", type_name.as_str()),
                ("StoreEntitySet", store_name.as_str()),
            ],
        );
        for end in self.association_ends(association) {
            let end_property = self.new_child_element(node, "EndProperty", &[("Name", end.role.as_str())]);
            self.tree.append_child(node, end_property);
        }
        self.tree.insert_after_last(
            container,
            &["AssociationSetMapping", "EntitySetMapping"],
            node,
            Fallback::Last,
        );
        Ok(AssociationSetMapping::from_object_id(self.adopt(key, node)))
    }

    pub fn mapped_association_set(&mut self, mapping: AssociationSetMapping) -> Option<AssociationSet> {
        let id = mapping.object_id();
        self.resolve_cached(id, RefSlot::AssociationSet, |model| {
            let raw = model.attr_of(id, "Name")?;
            model.resolve_in(Section::Conceptual, ObjectKind::AssociationSet, &raw)
        })
        .map(AssociationSet::from_object_id)
    }

    pub fn association_set_mapping_store_set(&mut self, mapping: AssociationSetMapping) -> Option<EntitySet> {
        let id = mapping.object_id();
        self.resolve_cached(id, RefSlot::StoreEntitySet, |model| {
            let raw = model.attr_of(id, "StoreEntitySet")?;
            model.resolve_in(Section::Storage, ObjectKind::EntitySet, &raw)
        })
        .map(EntitySet::from_object_id)
    }

    /// Map a key member of one end onto a column of the mapping's store set
    pub fn add_end_property_mapping(
        &mut self,
        mapping: AssociationSetMapping,
        end: End,
        property: Property,
        column: Property,
    ) -> Result<()> {
        let record = self.live(mapping)?;
        self.live_in(property, Section::Conceptual)?;
        self.live_in(column, Section::Storage)?;
        let association = self
            .mapped_association_set(mapping)
            .and_then(|set| self.association_of_set(set))
            .ok_or_else(|| ModelError::InvalidModelObject {
                kind: ObjectKind::AssociationSetMapping,
                name: self.name(mapping).to_string(),
                reason: "association set not found".to_string(),
            })?;
        let role = self
            .association_ends(association)
            .get(end.index())
            .map(|e| e.role.clone())
            .unwrap_or_default();

        let end_type = self.end_type(association, end);
        let member = match end_type {
            Some(end_type) => self.effective_properties(end_type)?.contains(&property),
            None => false,
        };
        if !member {
            return Err(self.unrelated(
                self.full_name(property),
                self.full_name(column),
                "property is not a member of the association end type",
            ));
        }
        let table = self
            .association_set_mapping_store_set(mapping)
            .and_then(|set| self.entity_type_of_set(set));
        if table != self.owning_type(column) {
            return Err(self.unrelated(
                self.full_name(property),
                self.full_name(column),
                "column does not belong to the mapping's store entity set",
            ));
        }

        let existing = self
            .tree
            .children_named(record.node, "EndProperty")
            .into_iter()
            .find(|n| self.tree.attr(*n, "Name").is_some_and(|r| names_match(r, &role)));
        let end_node = match existing {
            Some(node) => node,
            None => {
                let created = self.new_child_element(record.node, "EndProperty", &[("Name", role.as_str())]);
                self.tree
                    .insert_after_last(record.node, &["EndProperty"], created, Fallback::First);
                created
            }
        };
        let property_name = self.name(property).to_string();
        let column_name = self.name(column).to_string();
        let scalar = self.new_child_element(
            end_node,
            "ScalarProperty",
            &[("Name", property_name.as_str()), ("ColumnName", column_name.as_str())],
        );
        self.tree.append_child(end_node, scalar);
        Ok(())
    }

    pub fn end_property_mappings(&self, mapping: AssociationSetMapping) -> Vec<EndPropertyMapping> {
        self.tree
            .children_named(self.node_of(mapping), "EndProperty")
            .into_iter()
            .map(|end| EndPropertyMapping {
                role: self.tree.attr(end, "Name").unwrap_or("").to_string(),
                pairs: self
                    .tree
                    .children_named(end, "ScalarProperty")
                    .into_iter()
                    .map(|sp| {
                        (
                            self.tree.attr(sp, "Name").unwrap_or("").to_string(),
                            self.tree.attr(sp, "ColumnName").unwrap_or("").to_string(),
                        )
                    })
                    .collect(),
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Function import mappings
    // ------------------------------------------------------------------

    pub fn function_import_mappings(&mut self) -> Vec<FunctionImportMapping> {
        typed(self.collection(CollectionKey::section(
            Section::Mapping,
            ObjectKind::FunctionImportMapping,
        )))
    }

    pub fn add_function_import_mapping(
        &mut self,
        import: FunctionImport,
        function: Function,
    ) -> Result<FunctionImportMapping> {
        self.live_in(import, Section::Conceptual)?;
        self.live_in(function, Section::Storage)?;
        let name = self.name(import).to_string();
        let key = CollectionKey::section(Section::Mapping, ObjectKind::FunctionImportMapping);
        self.ensure_unique(key, ObjectKind::FunctionImportMapping, &name, None)?;

        let function_name = self.qualified(Section::Storage, self.name(function));
        let container = self.ensure_container_mapping()?;
        let node = self.new_child_element(
            container,
            "FunctionImportMapping",
            &[
                ("FunctionImportName", name.as_str()),
                ("FunctionName", function_name.as_str()),
            ],
        );
        self.tree.append_child(container, node);
        Ok(FunctionImportMapping::from_object_id(self.adopt(key, node)))
    }

    pub fn mapped_function_import(&mut self, mapping: FunctionImportMapping) -> Option<FunctionImport> {
        let id = mapping.object_id();
        self.resolve_cached(id, RefSlot::FunctionImport, |model| {
            let raw = model.attr_of(id, "FunctionImportName")?;
            model.resolve_in(Section::Conceptual, ObjectKind::FunctionImport, &raw)
        })
        .map(FunctionImport::from_object_id)
    }

    pub fn mapped_function(&mut self, mapping: FunctionImportMapping) -> Option<Function> {
        let id = mapping.object_id();
        self.resolve_cached(id, RefSlot::Function, |model| {
            let raw = model.attr_of(id, "FunctionName")?;
            model.resolve_in(Section::Storage, ObjectKind::Function, &raw)
        })
        .map(Function::from_object_id)
    }
}

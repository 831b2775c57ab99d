//! Schema-level objects: entity types, entity sets, functions, function imports

use tracing::debug;

use super::collection::CollectionKey;
use super::resolve::RefSlot;
use super::{
    typed, validate_name, EdmxModel, EntitySet, EntityType, Function, FunctionImport, ModelObject, ObjectId,
    ObjectKind, Section,
};
use crate::error::{ModelError, Result};
use crate::xml::Fallback;

impl EdmxModel {
    /// Fail with `NameCollision` when `name` is taken in `key` or a sibling collection
    pub(crate) fn ensure_unique(
        &mut self,
        key: CollectionKey,
        kind: ObjectKind,
        name: &str,
        except: Option<ObjectId>,
    ) -> Result<()> {
        match self.name_conflict(key, name, except) {
            Some(_) => Err(ModelError::NameCollision {
                kind,
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn require_schema_section(&self, kind: ObjectKind, name: &str, section: Section) -> Result<()> {
        match section {
            Section::Conceptual | Section::Storage => Ok(()),
            found => Err(ModelError::WrongSection {
                kind,
                name: name.to_string(),
                expected: Section::Conceptual,
                found,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Entity types
    // ------------------------------------------------------------------

    pub fn entity_types(&mut self, section: Section) -> Vec<EntityType> {
        typed(self.collection(CollectionKey::section(section, ObjectKind::EntityType)))
    }

    /// Entity type by bare, namespace- or alias-qualified name
    pub fn entity_type(&mut self, section: Section, name: &str) -> Option<EntityType> {
        self.resolve_in(section, ObjectKind::EntityType, name)
            .map(EntityType::from_object_id)
    }

    pub fn add_entity_type(&mut self, section: Section, name: &str) -> Result<EntityType> {
        self.require_schema_section(ObjectKind::EntityType, name, section)?;
        validate_name(ObjectKind::EntityType, name)?;
        let key = CollectionKey::section(section, ObjectKind::EntityType);
        self.ensure_unique(key, ObjectKind::EntityType, name, None)?;

        let schema = section_schema(self, section)?;
        let node = self.new_child_element(schema, "EntityType", &[("Name", name)]);
        self.tree
            .insert_after_last(schema, &["EntityType", "EntityContainer"], node, Fallback::Last);
        debug!(section = %section, name, "Entity type added");
        Ok(EntityType::from_object_id(self.adopt(key, node)))
    }

    // ------------------------------------------------------------------
    // Entity sets
    // ------------------------------------------------------------------

    pub fn entity_sets(&mut self, section: Section) -> Vec<EntitySet> {
        typed(self.collection(CollectionKey::section(section, ObjectKind::EntitySet)))
    }

    pub fn entity_set(&mut self, section: Section, name: &str) -> Option<EntitySet> {
        self.resolve_in(section, ObjectKind::EntitySet, name)
            .map(EntitySet::from_object_id)
    }

    /// Add an entity set of `entity_type` to the type's section container
    pub fn add_entity_set(&mut self, name: &str, entity_type: EntityType) -> Result<EntitySet> {
        let section = self.live(entity_type)?.section;
        validate_name(ObjectKind::EntitySet, name)?;
        let key = CollectionKey::section(section, ObjectKind::EntitySet);
        self.ensure_unique(key, ObjectKind::EntitySet, name, None)?;

        let container = self.ensure_container(section)?;
        let type_ref = self.qualified(section, self.name(entity_type));
        let node = self.new_child_element(container, "EntitySet", &[("Name", name), ("EntityType", type_ref.as_str())]);
        self.tree
            .insert_after_last(container, &["EntitySet"], node, Fallback::First);
        debug!(section = %section, name, entity_type = %type_ref, "Entity set added");
        Ok(EntitySet::from_object_id(self.adopt(key, node)))
    }

    pub fn entity_type_of_set(&mut self, set: EntitySet) -> Option<EntityType> {
        let id = set.object_id();
        let section = self.record(id).section;
        self.resolve_cached(id, RefSlot::EntityType, |model| {
            let raw = model.attr_of(id, "EntityType")?;
            model.resolve_in(section, ObjectKind::EntityType, &raw)
        })
        .map(EntityType::from_object_id)
    }

    pub fn set_entity_type_of_set(&mut self, set: EntitySet, entity_type: EntityType) -> Result<()> {
        let record = self.live(set)?;
        self.live_in(entity_type, record.section)?;
        let value = self.qualified(record.section, self.name(entity_type));
        self.tree.set_attr(record.node, "EntityType", &value);
        self.refs.forget(set.object_id(), RefSlot::EntityType);
        Ok(())
    }

    /// Entity set holding instances of `entity_type`, directly or through a base type
    pub fn entity_set_of(&mut self, entity_type: EntityType) -> Option<EntitySet> {
        let section = self.section_of(entity_type);
        let mut candidates = vec![entity_type];
        candidates.extend(self.ancestors(entity_type).unwrap_or_default());

        let sets: Vec<(EntitySet, Option<EntityType>)> = self
            .entity_sets(section)
            .into_iter()
            .map(|set| (set, self.entity_type_of_set(set)))
            .collect();
        candidates.into_iter().find_map(|candidate| {
            sets.iter()
                .find(|(_, set_type)| *set_type == Some(candidate))
                .map(|(set, _)| *set)
        })
    }

    /// Database schema of a store entity set (`Schema` or `store:Schema`)
    pub fn store_schema_name(&self, set: EntitySet) -> Option<&str> {
        let node = self.node_of(set);
        self.tree.attr_local(node, "Schema")
    }

    // ------------------------------------------------------------------
    // Store functions and function imports
    // ------------------------------------------------------------------

    pub fn functions(&mut self) -> Vec<Function> {
        typed(self.collection(CollectionKey::section(Section::Storage, ObjectKind::Function)))
    }

    pub fn function(&mut self, name: &str) -> Option<Function> {
        self.resolve_in(Section::Storage, ObjectKind::Function, name)
            .map(Function::from_object_id)
    }

    pub fn add_function(&mut self, name: &str) -> Result<Function> {
        validate_name(ObjectKind::Function, name)?;
        let key = CollectionKey::section(Section::Storage, ObjectKind::Function);
        self.ensure_unique(key, ObjectKind::Function, name, None)?;

        let schema = self.sections.storage;
        let node = self.new_child_element(
            schema,
            "Function",
            &[
                ("Name", name),
                ("Aggregate", "false"),
                ("BuiltIn", "false"),
                ("NiladicFunction", "false"),
                ("IsComposable", "false"),
                ("ParameterTypeSemantics", "AllowImplicitConversion"),
            ],
        );
        self.tree
            .insert_after_last(schema, &["Function", "Association", "EntityType"], node, Fallback::Last);
        Ok(Function::from_object_id(self.adopt(key, node)))
    }

    pub fn function_imports(&mut self) -> Vec<FunctionImport> {
        typed(self.collection(CollectionKey::section(Section::Conceptual, ObjectKind::FunctionImport)))
    }

    pub fn function_import(&mut self, name: &str) -> Option<FunctionImport> {
        self.resolve_in(Section::Conceptual, ObjectKind::FunctionImport, name)
            .map(FunctionImport::from_object_id)
    }

    /// Add a function import; `return_type` is written verbatim (e.g. `Collection(Model.Customer)`)
    pub fn add_function_import(&mut self, name: &str, return_type: Option<&str>) -> Result<FunctionImport> {
        validate_name(ObjectKind::FunctionImport, name)?;
        let key = CollectionKey::section(Section::Conceptual, ObjectKind::FunctionImport);
        self.ensure_unique(key, ObjectKind::FunctionImport, name, None)?;

        let container = self.ensure_container(Section::Conceptual)?;
        let node = self.new_child_element(container, "FunctionImport", &[("Name", name)]);
        if let Some(return_type) = return_type {
            self.tree.set_attr(node, "ReturnType", return_type);
        }
        self.tree.insert_after_last(
            container,
            &["FunctionImport", "AssociationSet", "EntitySet"],
            node,
            Fallback::Last,
        );
        Ok(FunctionImport::from_object_id(self.adopt(key, node)))
    }

    pub fn function_import_return_type(&self, import: FunctionImport) -> Option<&str> {
        self.tree.attr(self.node_of(import), "ReturnType")
    }

    /// Entity set a function import returns instances of
    pub fn function_import_entity_set(&mut self, import: FunctionImport) -> Option<EntitySet> {
        let id = import.object_id();
        self.resolve_cached(id, RefSlot::EntitySet, |model| {
            let raw = model.attr_of(id, "EntitySet")?;
            model.resolve_in(Section::Conceptual, ObjectKind::EntitySet, &raw)
        })
        .map(EntitySet::from_object_id)
    }
}

fn section_schema(model: &EdmxModel, section: Section) -> Result<crate::xml::NodeId> {
    model
        .schema_node(section)
        .ok_or(ModelError::MissingSection("Schema"))
}

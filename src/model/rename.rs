//! Renaming with reference rewriting
//!
//! Every attribute that refers to the renamed object by name is rewritten
//! in the same call, so the document never holds a dangling reference.
//! Object identities do not change; only the collection keys move.

use tracing::debug;

use super::events::ModelEvent;
use super::resolve::{names_match, QualifiedRef};
use super::{
    validate_name, Association, EdmxModel, End, EntityType, ModelObject, ObjectId, ObjectKind, Property, Section,
};
use crate::error::{ModelError, Result};
use crate::xml::NodeId;

/// How a referencing attribute names its target
#[derive(Debug, Clone, Copy)]
enum Match {
    /// Bare member name (`PropertyRef`, `StoreEntitySet`, `ColumnName`)
    Simple,
    /// Namespace-, alias- or container-qualified reference into a section
    Qualified(Section),
    /// `;`-separated list of qualified references (`EntityTypeMapping@TypeName`)
    TypeList(Section),
}

#[derive(Debug)]
struct Rewrite {
    node: NodeId,
    attribute: &'static str,
    value: String,
}

struct Rewrites<'a> {
    old: &'a str,
    new: &'a str,
    edits: Vec<Rewrite>,
}

impl<'a> Rewrites<'a> {
    fn scan(&mut self, model: &EdmxModel, nodes: impl IntoIterator<Item = NodeId>, attribute: &'static str, how: Match) {
        for node in nodes {
            let Some(raw) = model.tree.attr(node, attribute) else {
                continue;
            };
            let value = match how {
                Match::Simple => names_match(raw.trim(), self.old).then(|| self.new.to_string()),
                Match::Qualified(section) => model
                    .refers_to(section, raw, self.old)
                    .then(|| QualifiedRef::parse(raw).with_name(self.new)),
                Match::TypeList(section) => {
                    let mut changed = false;
                    let parts: Vec<String> = raw
                        .split(';')
                        .map(|part| {
                            if model.refers_to(section, part, self.old) {
                                changed = true;
                                QualifiedRef::parse(part).with_name(self.new)
                            } else {
                                part.trim().to_string()
                            }
                        })
                        .collect();
                    changed.then(|| parts.join(";"))
                }
            };
            if let Some(value) = value {
                self.edits.push(Rewrite {
                    node,
                    attribute,
                    value,
                });
            }
        }
    }
}

impl EdmxModel {
    /// Rename an object and every reference to it
    pub fn rename<H: ModelObject>(&mut self, handle: H, new_name: &str) -> Result<()> {
        let record = self.live(handle)?;
        let id = handle.object_id();
        if !record.kind.has_identifier_name() {
            return Err(ModelError::InvalidModelObject {
                kind: record.kind,
                name: self.name_of_id(id).to_string(),
                reason: "objects of this kind are named after the object they map".to_string(),
            });
        }
        let old_name = self.name_of_id(id).to_string();
        if old_name == new_name {
            return Ok(());
        }
        validate_name(record.kind, new_name)?;
        self.ensure_unique(record.collection, record.kind, new_name, Some(id))?;

        let edits = self.reference_rewrites(id, &old_name, new_name)?;
        let rewritten = edits.len();
        for edit in edits {
            self.apply_rewrite(edit);
        }
        let attribute = self.name_attribute_of_node(record.kind, record.node);
        self.tree.set_attr(record.node, attribute, new_name);

        debug!(
            kind = %record.kind,
            old_name = %old_name,
            new_name,
            references = rewritten,
            "Object renamed"
        );
        self.emit(ModelEvent::NameChanged {
            object: id,
            kind: record.kind,
            old_name,
            new_name: new_name.to_string(),
        });
        Ok(())
    }

    /// Write one rewritten attribute, re-keying the holder when the attribute is its name
    fn apply_rewrite(&mut self, edit: Rewrite) {
        let name_attribute = self
            .node_objects
            .get(&edit.node)
            .map(|holder| {
                let record = *self.record(*holder);
                (*holder, record, self.name_attribute_of_node(record.kind, edit.node))
            });
        self.tree.set_attr(edit.node, edit.attribute, &edit.value);
        if let Some((holder, record, attribute)) = name_attribute {
            if attribute == edit.attribute {
                if let Some(collection) = self.collections.get_mut(&record.collection) {
                    collection.rekey(holder, &edit.value);
                }
            }
        }
    }

    fn elements_in(&self, root: Option<NodeId>, local: &str) -> Vec<NodeId> {
        root.map(|root| {
            self.tree
                .descendant_elements(root)
                .into_iter()
                .filter(|node| self.tree.local_name(*node) == Some(local))
                .collect()
        })
        .unwrap_or_default()
    }

    fn key_ref_nodes(&self, entity_type: EntityType) -> Vec<NodeId> {
        self.tree
            .first_child_named(self.node_of(entity_type), "Key")
            .map(|key| self.tree.children_named(key, "PropertyRef"))
            .unwrap_or_default()
    }

    /// `PropertyRef`s of the constraint side played by `role`
    fn constraint_ref_nodes(&self, association: Association, role: &str) -> Vec<NodeId> {
        let Some(constraint) = self
            .tree
            .first_child_named(self.node_of(association), "ReferentialConstraint")
        else {
            return Vec::new();
        };
        self.tree
            .child_elements(constraint)
            .filter(|side| {
                self.tree
                    .attr(*side, "Role")
                    .is_some_and(|r| names_match(r, role))
            })
            .flat_map(|side| self.tree.children_named(side, "PropertyRef"))
            .collect()
    }

    fn reference_rewrites(&mut self, id: ObjectId, old: &str, new: &str) -> Result<Vec<Rewrite>> {
        let record = *self.record(id);
        let section = record.section;
        let schema = self.schema_node(section);
        let mapping = Some(self.sections.mapping);
        let conceptual = section == Section::Conceptual;
        let mut rewrites = Rewrites {
            old,
            new,
            edits: Vec::new(),
        };

        match record.kind {
            ObjectKind::EntityType => {
                let sets = self.elements_in(schema, "EntitySet");
                rewrites.scan(self, sets, "EntityType", Match::Qualified(section));
                let ends = self.elements_in(schema, "End");
                rewrites.scan(self, ends, "Type", Match::Qualified(section));
                let types = self.elements_in(schema, "EntityType");
                rewrites.scan(self, types, "BaseType", Match::Qualified(section));
                if conceptual {
                    let imports = self.elements_in(schema, "FunctionImport");
                    rewrites.scan(self, imports, "ReturnType", Match::Qualified(section));
                    let type_mappings = self.elements_in(mapping, "EntityTypeMapping");
                    rewrites.scan(self, type_mappings, "TypeName", Match::TypeList(section));
                    let shapes = self.elements_in(self.sections.diagram, "EntityTypeShape");
                    rewrites.scan(self, shapes, "EntityType", Match::Qualified(section));
                }
            }
            ObjectKind::EntitySet => {
                if conceptual {
                    let ends = self.elements_in(schema, "End");
                    rewrites.scan(self, ends, "EntitySet", Match::Simple);
                    let imports = self.elements_in(schema, "FunctionImport");
                    rewrites.scan(self, imports, "EntitySet", Match::Simple);
                    let set_mappings = self.elements_in(mapping, "EntitySetMapping");
                    rewrites.scan(self, set_mappings, "Name", Match::Simple);
                } else {
                    let ends = self.elements_in(schema, "End");
                    rewrites.scan(self, ends, "EntitySet", Match::Simple);
                    for local in ["MappingFragment", "AssociationSetMapping", "EntitySetMapping"] {
                        let nodes = self.elements_in(mapping, local);
                        rewrites.scan(self, nodes, "StoreEntitySet", Match::Simple);
                    }
                }
            }
            ObjectKind::Association => {
                let sets = self.elements_in(schema, "AssociationSet");
                rewrites.scan(self, sets, "Association", Match::Qualified(section));
                if conceptual {
                    let navigations = self.elements_in(schema, "NavigationProperty");
                    rewrites.scan(self, navigations, "Relationship", Match::Qualified(section));
                    let set_mappings = self.elements_in(mapping, "AssociationSetMapping");
                    rewrites.scan(self, set_mappings, "TypeName", Match::Qualified(section));
                    let connectors = self.elements_in(self.sections.diagram, "AssociationConnector");
                    rewrites.scan(self, connectors, "Association", Match::Qualified(section));
                }
            }
            ObjectKind::AssociationSet if conceptual => {
                let set_mappings = self.elements_in(mapping, "AssociationSetMapping");
                rewrites.scan(self, set_mappings, "Name", Match::Simple);
            }
            ObjectKind::Function => {
                let import_mappings = self.elements_in(mapping, "FunctionImportMapping");
                rewrites.scan(self, import_mappings, "FunctionName", Match::Qualified(Section::Storage));
            }
            ObjectKind::FunctionImport => {
                let import_mappings = self.elements_in(mapping, "FunctionImportMapping");
                rewrites.scan(self, import_mappings, "FunctionImportName", Match::Simple);
            }
            ObjectKind::Property => {
                self.property_rewrites(Property::from_object_id(id), &mut rewrites)?;
            }
            _ => {}
        }
        Ok(rewrites.edits)
    }

    fn property_rewrites(&mut self, property: Property, rewrites: &mut Rewrites<'_>) -> Result<()> {
        let section = self.section_of(property);
        let owner = self
            .owning_type(property)
            .ok_or(ModelError::Detached { kind: ObjectKind::Property })?;

        // The owner plus every descendant that sees this property
        let mut family = vec![owner];
        for descendant in self.descendants(owner)? {
            if self.property(descendant, rewrites.old).is_none() {
                family.push(descendant);
            }
        }

        let keys = self.key_ref_nodes(owner);
        rewrites.scan(self, keys, "Name", Match::Simple);

        for association in self.associations(section) {
            for (index, end) in self.association_ends(association).into_iter().enumerate() {
                let end_kind = if index == 0 { End::From } else { End::To };
                let end_type = self.end_type(association, end_kind);
                if end_type.is_some_and(|t| family.contains(&t)) {
                    let refs = self.constraint_ref_nodes(association, &end.role);
                    rewrites.scan(self, refs, "Name", Match::Simple);
                }
            }
        }

        if section == Section::Conceptual {
            self.conceptual_mapping_rewrites(&family, rewrites);
        } else {
            self.store_mapping_rewrites(owner, rewrites);
        }
        Ok(())
    }

    fn conceptual_mapping_rewrites(&mut self, family: &[EntityType], rewrites: &mut Rewrites<'_>) {
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
                    let node = self.node_of(fragment);
                    let scalars = self.tree.children_named(node, "ScalarProperty");
                    rewrites.scan(self, scalars, "Name", Match::Simple);
                    // Conditions on conceptual members use Name
                    let conditions: Vec<NodeId> = self
                        .tree
                        .children_named(node, "Condition")
                        .into_iter()
                        .filter(|c| self.tree.attr(*c, "ColumnName").is_none())
                        .collect();
                    rewrites.scan(self, conditions, "Name", Match::Simple);
                }
            }
        }

        for set_mapping in self.association_set_mappings() {
            let Some(association) = self
                .mapped_association_set(set_mapping)
                .and_then(|set| self.association_of_set(set))
            else {
                continue;
            };
            let node = self.node_of(set_mapping);
            for end_property in self.tree.children_named(node, "EndProperty") {
                let role = self.tree.attr(end_property, "Name").unwrap_or("").to_string();
                let end_type = self
                    .end_for_role(association, &role)
                    .and_then(|end| self.end_type(association, end));
                if end_type.is_some_and(|t| family.contains(&t)) {
                    let scalars = self.tree.children_named(end_property, "ScalarProperty");
                    rewrites.scan(self, scalars, "Name", Match::Simple);
                }
            }
        }
    }

    fn store_mapping_rewrites(&mut self, table: EntityType, rewrites: &mut Rewrites<'_>) {
        for set_mapping in self.entity_set_mappings() {
            for type_mapping in self.entity_type_mappings(set_mapping) {
                for fragment in self.mapping_fragments(type_mapping) {
                    if self.fragment_store_type(fragment) != Some(table) {
                        continue;
                    }
                    let node = self.node_of(fragment);
                    for local in ["ScalarProperty", "Condition"] {
                        let nodes = self.tree.children_named(node, local);
                        rewrites.scan(self, nodes, "ColumnName", Match::Simple);
                    }
                }
            }
        }

        for set_mapping in self.association_set_mappings() {
            let store_type = self
                .association_set_mapping_store_set(set_mapping)
                .and_then(|set| self.entity_type_of_set(set));
            if store_type != Some(table) {
                continue;
            }
            let node = self.node_of(set_mapping);
            let scalars: Vec<NodeId> = self
                .tree
                .children_named(node, "EndProperty")
                .into_iter()
                .flat_map(|end| self.tree.children_named(end, "ScalarProperty"))
                .collect();
            rewrites.scan(self, scalars, "ColumnName", Match::Simple);
            let conditions = self.tree.children_named(node, "Condition");
            rewrites.scan(self, conditions, "ColumnName", Match::Simple);
        }
    }
}

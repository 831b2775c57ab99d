//! Associations, association sets and navigation properties

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::collection::CollectionKey;
use super::resolve::{names_match, RefSlot};
use super::{
    typed, validate_name, Association, AssociationSet, EdmxModel, EntitySet, EntityType, ModelObject,
    NavigationProperty, ObjectKind, Property, Section,
};
use crate::error::{ModelError, Result};
use crate::xml::{Fallback, NodeId};

/// Association end multiplicity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Multiplicity {
    /// `1`
    One,
    /// `0..1`
    ZeroOrOne,
    /// `*`
    Many,
}

impl Multiplicity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::One => "1",
            Self::ZeroOrOne => "0..1",
            Self::Many => "*",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "1" => Some(Self::One),
            "0..1" => Some(Self::ZeroOrOne),
            "*" => Some(Self::Many),
            _ => None,
        }
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One of the two ends of an association, in document order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum End {
    From,
    To,
}

impl End {
    pub fn index(self) -> usize {
        match self {
            Self::From => 0,
            Self::To => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::From => Self::To,
            Self::To => Self::From,
        }
    }

    fn slot(self) -> u8 {
        self.index() as u8
    }
}

/// An association end as written in the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationEnd {
    pub role: String,
    /// Raw `Type` reference
    pub type_name: String,
    pub multiplicity: Option<Multiplicity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferentialConstraint {
    pub principal_role: String,
    pub principal_keys: Vec<String>,
    pub dependent_role: String,
    pub dependent_keys: Vec<String>,
}

/// New association description for `add_association`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationSpec {
    pub name: String,
    pub from: (EntityType, Multiplicity),
    pub to: (EntityType, Multiplicity),
    /// (member of the from end, member of the to end)
    pub key_pairs: Vec<(Property, Property)>,
    /// Create navigation properties on both conceptual end types
    pub navigation: bool,
}

impl AssociationSpec {
    pub fn new(name: impl Into<String>, from: (EntityType, Multiplicity), to: (EntityType, Multiplicity)) -> Self {
        Self {
            name: name.into(),
            from,
            to,
            key_pairs: Vec::new(),
            navigation: true,
        }
    }

    pub fn key_pair(mut self, from_member: Property, to_member: Property) -> Self {
        self.key_pairs.push((from_member, to_member));
        self
    }

    pub fn without_navigation(mut self) -> Self {
        self.navigation = false;
        self
    }
}

impl EdmxModel {
    // ------------------------------------------------------------------
    // Associations
    // ------------------------------------------------------------------

    pub fn associations(&mut self, section: Section) -> Vec<Association> {
        typed(self.collection(CollectionKey::section(section, ObjectKind::Association)))
    }

    pub fn association(&mut self, section: Section, name: &str) -> Option<Association> {
        self.resolve_in(section, ObjectKind::Association, name)
            .map(Association::from_object_id)
    }

    /// Create an association with its ends, optional referential constraint,
    /// an association set (when both end types have entity sets) and, on the
    /// conceptual side, navigation properties on both end types
    pub fn add_association(&mut self, spec: AssociationSpec) -> Result<Association> {
        let (from_type, from_multiplicity) = spec.from;
        let (to_type, to_multiplicity) = spec.to;
        let section = self.live(from_type)?.section;
        self.live_in(to_type, section)?;
        validate_name(ObjectKind::Association, &spec.name)?;
        let key = CollectionKey::section(section, ObjectKind::Association);
        self.ensure_unique(key, ObjectKind::Association, &spec.name, None)?;
        let schema = self
            .schema_node(section)
            .ok_or(ModelError::MissingSection("Schema"))?;

        let from_role = self.name(from_type).to_string();
        let mut to_role = self.name(to_type).to_string();
        if names_match(&from_role, &to_role) {
            to_role.push('1');
        }

        for (from_member, to_member) in &spec.key_pairs {
            self.check_member_of(&spec.name, *from_member, from_type)?;
            self.check_member_of(&spec.name, *to_member, to_type)?;
        }
        if !spec.key_pairs.is_empty()
            && from_multiplicity == Multiplicity::Many
            && to_multiplicity == Multiplicity::Many
        {
            return Err(ModelError::InvalidAssociation {
                from: self.full_name(from_type),
                to: self.full_name(to_type),
                reason: "a many-to-many association cannot carry a referential constraint".to_string(),
            });
        }

        let node = self.new_child_element(schema, "Association", &[("Name", spec.name.as_str())]);
        for (role, end_type, multiplicity) in [
            (&from_role, from_type, from_multiplicity),
            (&to_role, to_type, to_multiplicity),
        ] {
            let type_ref = self.qualified(section, self.name(end_type));
            let end = self.new_child_element(
                node,
                "End",
                &[
                    ("Role", role.as_str()),
                    ("Type", type_ref.as_str()),
                    ("Multiplicity", multiplicity.as_str()),
                ],
            );
            self.tree.append_child(node, end);
        }

        if !spec.key_pairs.is_empty() {
            // The principal is the single-valued end opposite a many end
            let principal_is_from = match (from_multiplicity, to_multiplicity) {
                (Multiplicity::Many, _) => false,
                (_, Multiplicity::Many) => true,
                (Multiplicity::One, Multiplicity::ZeroOrOne) => true,
                _ => false,
            };
            let from_names: Vec<String> = spec.key_pairs.iter().map(|(m, _)| self.name(*m).to_string()).collect();
            let to_names: Vec<String> = spec.key_pairs.iter().map(|(_, m)| self.name(*m).to_string()).collect();
            let (principal, dependent) = if principal_is_from {
                ((&from_role, &from_names), (&to_role, &to_names))
            } else {
                ((&to_role, &to_names), (&from_role, &from_names))
            };

            let constraint = self.new_child_element(node, "ReferentialConstraint", &[]);
            for (element, (role, names)) in [("Principal", principal), ("Dependent", dependent)] {
                let side = self.new_child_element(node, element, &[("Role", role.as_str())]);
                for name in names {
                    let reference = self.new_child_element(node, "PropertyRef", &[("Name", name.as_str())]);
                    self.tree.append_child(side, reference);
                }
                self.tree.append_child(constraint, side);
            }
            self.tree.append_child(node, constraint);
        }

        self.tree
            .insert_after_last(schema, &["Association", "EntityType"], node, Fallback::Last);
        let association = Association::from_object_id(self.adopt(key, node));
        debug!(section = %section, name = %spec.name, "Association added");

        if self.entity_set_of(from_type).is_some() && self.entity_set_of(to_type).is_some() {
            let set_name = self.unique_name(
                CollectionKey::section(section, ObjectKind::AssociationSet),
                &spec.name,
            );
            self.add_association_set(&set_name, association)?;
        }

        if spec.navigation && section == Section::Conceptual {
            let relationship = self.qualified(section, &spec.name);
            for (owner, own_role, other_role) in [
                (from_type, &from_role, &to_role),
                (to_type, &to_role, &from_role),
            ] {
                self.add_navigation_node(owner, &relationship, own_role, other_role);
            }
        }

        Ok(association)
    }

    fn add_navigation_node(&mut self, owner: EntityType, relationship: &str, from_role: &str, to_role: &str) -> NavigationProperty {
        let key = CollectionKey::object(owner.object_id(), ObjectKind::NavigationProperty);
        let name = self.unique_name(key, to_role);
        let owner_node = self.node_of(owner);
        let node = self.new_child_element(
            owner_node,
            "NavigationProperty",
            &[
                ("Name", name.as_str()),
                ("Relationship", relationship),
                ("FromRole", from_role),
                ("ToRole", to_role),
            ],
        );
        self.tree.insert_after_last(
            owner_node,
            &["NavigationProperty", "Property", "Key"],
            node,
            Fallback::Last,
        );
        NavigationProperty::from_object_id(self.adopt(key, node))
    }

    /// `base`, or `base` with the smallest numeric suffix that is free in `key`
    pub(crate) fn unique_name(&mut self, key: CollectionKey, base: &str) -> String {
        if self.name_conflict(key, base, None).is_none() {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}{}", base, n))
            .find(|candidate| self.name_conflict(key, candidate, None).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    fn check_member_of(&mut self, association: &str, member: Property, end_type: EntityType) -> Result<()> {
        self.live(member)?;
        let owner = self.owning_type(member);
        let mut allowed = vec![end_type];
        allowed.extend(self.ancestors(end_type)?);
        if owner.is_some_and(|o| allowed.contains(&o)) {
            return Ok(());
        }
        Err(ModelError::InvalidAssociation {
            from: association.to_string(),
            to: self.full_name(member),
            reason: format!("property is not a member of '{}'", self.full_name(end_type)),
        })
    }

    fn end_nodes(&self, node: NodeId) -> Vec<NodeId> {
        self.tree.children_named(node, "End")
    }

    pub fn association_ends(&self, association: Association) -> Vec<AssociationEnd> {
        self.end_nodes(self.node_of(association))
            .into_iter()
            .map(|end| AssociationEnd {
                role: self.tree.attr(end, "Role").unwrap_or("").to_string(),
                type_name: self.tree.attr(end, "Type").unwrap_or("").to_string(),
                multiplicity: self.tree.attr(end, "Multiplicity").and_then(Multiplicity::parse),
            })
            .collect()
    }

    /// Which end plays `role`
    pub fn end_for_role(&self, association: Association, role: &str) -> Option<End> {
        let ends = self.association_ends(association);
        let index = ends.iter().position(|e| names_match(&e.role, role))?;
        match index {
            0 => Some(End::From),
            1 => Some(End::To),
            _ => None,
        }
    }

    pub fn end_type(&mut self, association: Association, end: End) -> Option<EntityType> {
        let id = association.object_id();
        let section = self.record(id).section;
        self.resolve_cached(id, RefSlot::EndType(end.slot()), |model| {
            let raw = model.association_ends(association).get(end.index())?.type_name.clone();
            model.resolve_in(section, ObjectKind::EntityType, &raw)
        })
        .map(EntityType::from_object_id)
    }

    pub fn referential_constraint(&self, association: Association) -> Option<ReferentialConstraint> {
        let constraint = self
            .tree
            .first_child_named(self.node_of(association), "ReferentialConstraint")?;
        let side = |local: &str| -> Option<(String, Vec<String>)> {
            let node = self.tree.first_child_named(constraint, local)?;
            let role = self.tree.attr(node, "Role")?.to_string();
            let keys = self
                .tree
                .children_named(node, "PropertyRef")
                .into_iter()
                .filter_map(|r| self.tree.attr(r, "Name").map(str::to_string))
                .collect();
            Some((role, keys))
        };
        let (principal_role, principal_keys) = side("Principal")?;
        let (dependent_role, dependent_keys) = side("Dependent")?;
        Some(ReferentialConstraint {
            principal_role,
            principal_keys,
            dependent_role,
            dependent_keys,
        })
    }

    /// Resolved (principal, dependent) member pairs of the referential constraint
    pub fn key_member_pairs(&mut self, association: Association) -> Vec<(Property, Property)> {
        let Some(constraint) = self.referential_constraint(association) else {
            return Vec::new();
        };
        let principal_type = self
            .end_for_role(association, &constraint.principal_role)
            .and_then(|end| self.end_type(association, end));
        let dependent_type = self
            .end_for_role(association, &constraint.dependent_role)
            .and_then(|end| self.end_type(association, end));
        let (Some(principal_type), Some(dependent_type)) = (principal_type, dependent_type) else {
            return Vec::new();
        };
        constraint
            .principal_keys
            .iter()
            .zip(&constraint.dependent_keys)
            .filter_map(|(principal, dependent)| {
                Some((
                    self.effective_property(principal_type, principal)?,
                    self.effective_property(dependent_type, dependent)?,
                ))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Association sets
    // ------------------------------------------------------------------

    pub fn association_sets(&mut self, section: Section) -> Vec<AssociationSet> {
        typed(self.collection(CollectionKey::section(section, ObjectKind::AssociationSet)))
    }

    pub fn association_set(&mut self, section: Section, name: &str) -> Option<AssociationSet> {
        self.resolve_in(section, ObjectKind::AssociationSet, name)
            .map(AssociationSet::from_object_id)
    }

    /// Add a set for `association`; both end types need entity sets
    pub fn add_association_set(&mut self, name: &str, association: Association) -> Result<AssociationSet> {
        let section = self.live(association)?.section;
        validate_name(ObjectKind::AssociationSet, name)?;
        let key = CollectionKey::section(section, ObjectKind::AssociationSet);
        self.ensure_unique(key, ObjectKind::AssociationSet, name, None)?;

        let mut ends = Vec::new();
        for (end, info) in [End::From, End::To].into_iter().zip(self.association_ends(association)) {
            let set = self.end_type(association, end).and_then(|t| self.entity_set_of(t));
            match set {
                Some(set) => ends.push((info.role, self.name(set).to_string())),
                None => {
                    return Err(ModelError::InvalidAssociation {
                        from: self.full_name(association),
                        to: info.type_name,
                        reason: "end type has no entity set".to_string(),
                    })
                }
            }
        }

        let container = self.ensure_container(section)?;
        let association_ref = self.qualified(section, self.name(association));
        let node = self.new_child_element(
            container,
            "AssociationSet",
            &[("Name", name), ("Association", association_ref.as_str())],
        );
        for (role, set) in &ends {
            let end = self.new_child_element(node, "End", &[("Role", role.as_str()), ("EntitySet", set.as_str())]);
            self.tree.append_child(node, end);
        }
        self.tree
            .insert_after_last(container, &["AssociationSet", "EntitySet"], node, Fallback::Last);
        Ok(AssociationSet::from_object_id(self.adopt(key, node)))
    }

    pub fn association_of_set(&mut self, set: AssociationSet) -> Option<Association> {
        let id = set.object_id();
        let section = self.record(id).section;
        self.resolve_cached(id, RefSlot::Association, |model| {
            let raw = model.attr_of(id, "Association")?;
            model.resolve_in(section, ObjectKind::Association, &raw)
        })
        .map(Association::from_object_id)
    }

    /// Entity set bound to one end of an association set (matched by role)
    pub fn end_set(&mut self, set: AssociationSet, end: End) -> Option<EntitySet> {
        let id = set.object_id();
        let section = self.record(id).section;
        let role = self
            .association_of_set(set)
            .and_then(|a| self.association_ends(a).get(end.index()).map(|e| e.role.clone()));
        self.resolve_cached(id, RefSlot::EndSet(end.slot()), |model| {
            let set_ends = model.end_nodes(model.record(id).node);
            let node = role
                .as_deref()
                .and_then(|role| {
                    set_ends.iter().copied().find(|n| {
                        model.tree.attr(*n, "Role").is_some_and(|r| names_match(r, role))
                    })
                })
                .or_else(|| set_ends.get(end.index()).copied())?;
            let raw = model.tree.attr(node, "EntitySet")?.to_string();
            model.resolve_in(section, ObjectKind::EntitySet, &raw)
        })
        .map(EntitySet::from_object_id)
    }

    // ------------------------------------------------------------------
    // Navigation properties
    // ------------------------------------------------------------------

    pub fn navigation_properties(&mut self, entity_type: EntityType) -> Vec<NavigationProperty> {
        if !self.is_live_id(entity_type.object_id()) {
            return Vec::new();
        }
        typed(self.collection(CollectionKey::object(
            entity_type.object_id(),
            ObjectKind::NavigationProperty,
        )))
    }

    pub fn navigation_property(&mut self, entity_type: EntityType, name: &str) -> Option<NavigationProperty> {
        if !self.is_live_id(entity_type.object_id()) {
            return None;
        }
        self.resolve_member(entity_type.object_id(), ObjectKind::NavigationProperty, name)
            .map(NavigationProperty::from_object_id)
    }

    pub fn navigation_association(&mut self, navigation: NavigationProperty) -> Option<Association> {
        let id = navigation.object_id();
        let section = self.record(id).section;
        self.resolve_cached(id, RefSlot::Association, |model| {
            let raw = model.attr_of(id, "Relationship")?;
            model.resolve_in(section, ObjectKind::Association, &raw)
        })
        .map(Association::from_object_id)
    }

    /// Entity type at the `ToRole` end
    pub fn navigation_target(&mut self, navigation: NavigationProperty) -> Option<EntityType> {
        let association = self.navigation_association(navigation)?;
        let to_role = self.attr_of(navigation.object_id(), "ToRole")?;
        let end = self.end_for_role(association, &to_role)?;
        self.end_type(association, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplicity_round_trip() {
        for multiplicity in [Multiplicity::One, Multiplicity::ZeroOrOne, Multiplicity::Many] {
            assert_eq!(Multiplicity::parse(multiplicity.as_str()), Some(multiplicity));
        }
        assert_eq!(Multiplicity::parse("0..*"), None);
    }

    #[test]
    fn test_end_helpers() {
        assert_eq!(End::From.other(), End::To);
        assert_eq!(End::To.index(), 1);
    }
}

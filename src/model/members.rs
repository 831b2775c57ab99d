//! Entity type members (properties, keys, facets) and function parameters

use serde::{Deserialize, Serialize};
use std::fmt;

use super::collection::CollectionKey;
use super::resolve::names_match;
use super::{
    typed, validate_name, EdmxModel, EntityType, Function, FunctionImport, ModelObject, ObjectKind, Parameter,
    Property, Section,
};
use crate::error::{ModelError, Result};
use crate::version::ANNOTATION_NAMESPACE;
use crate::xml::{split_qname, Fallback, NodeId};

/// `MaxLength` facet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxLength {
    Max,
    Length(u32),
}

impl MaxLength {
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("max") {
            return Some(Self::Max);
        }
        value.trim().parse().ok().map(Self::Length)
    }
}

impl fmt::Display for MaxLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => write!(f, "Max"),
            Self::Length(n) => write!(f, "{}", n),
        }
    }
}

/// How the store produces a column value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreGeneratedPattern {
    None,
    Identity,
    Computed,
}

impl StoreGeneratedPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Identity => "Identity",
            Self::Computed => "Computed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [Self::None, Self::Identity, Self::Computed]
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

/// Optional facets of a scalar property; `None` means the attribute is absent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFacets {
    pub nullable: Option<bool>,
    pub max_length: Option<MaxLength>,
    pub fixed_length: Option<bool>,
    pub unicode: Option<bool>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub default_value: Option<String>,
    pub store_generated_pattern: Option<StoreGeneratedPattern>,
}

/// New property description for `add_property`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySpec {
    pub name: String,
    pub type_name: String,
    pub key: bool,
    pub facets: PropertyFacets,
}

impl PropertySpec {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// Key members are never nullable
    pub fn key(mut self) -> Self {
        self.key = true;
        self.facets.nullable = Some(false);
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.facets.nullable = Some(nullable);
        self
    }

    pub fn max_length(mut self, max_length: MaxLength) -> Self {
        self.facets.max_length = Some(max_length);
        self
    }

    pub fn identity(mut self) -> Self {
        self.facets.store_generated_pattern = Some(StoreGeneratedPattern::Identity);
        self
    }

    pub fn facets(mut self, facets: PropertyFacets) -> Self {
        self.facets = facets;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterMode {
    In,
    Out,
    InOut,
}

impl ParameterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "In",
            Self::Out => "Out",
            Self::InOut => "InOut",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [Self::In, Self::Out, Self::InOut]
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

/// Objects that declare parameters
pub trait ParameterOwner: ModelObject {}

impl ParameterOwner for Function {}
impl ParameterOwner for FunctionImport {}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        v if v.eq_ignore_ascii_case("true") => Some(true),
        v if v.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

impl EdmxModel {
    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    pub fn properties(&mut self, entity_type: EntityType) -> Vec<Property> {
        if !self.is_live_id(entity_type.object_id()) {
            return Vec::new();
        }
        typed(self.collection(CollectionKey::object(entity_type.object_id(), ObjectKind::Property)))
    }

    /// Declared (not inherited) property by name
    pub fn property(&mut self, entity_type: EntityType, name: &str) -> Option<Property> {
        if !self.is_live_id(entity_type.object_id()) {
            return None;
        }
        self.resolve_member(entity_type.object_id(), ObjectKind::Property, name)
            .map(Property::from_object_id)
    }

    pub fn add_property(&mut self, entity_type: EntityType, spec: PropertySpec) -> Result<Property> {
        let owner = self.live(entity_type)?;
        validate_name(ObjectKind::Property, &spec.name)?;
        let key = CollectionKey::object(entity_type.object_id(), ObjectKind::Property);
        self.ensure_unique(key, ObjectKind::Property, &spec.name, None)?;

        let node = self.new_child_element(
            owner.node,
            "Property",
            &[("Name", spec.name.as_str()), ("Type", spec.type_name.as_str())],
        );
        self.write_facets(node, owner.section, &spec.facets);
        self.tree
            .insert_after_last(owner.node, &["Property", "Key", "Documentation"], node, Fallback::First);
        let property = Property::from_object_id(self.adopt(key, node));
        if spec.key {
            self.set_key(property, true)?;
        }
        Ok(property)
    }

    /// Entity type declaring the property
    pub fn owning_type(&self, property: Property) -> Option<EntityType> {
        self.record(property.object_id())
            .owner
            .map(EntityType::from_object_id)
    }

    pub fn property_type(&self, property: Property) -> Option<&str> {
        self.tree.attr(self.node_of(property), "Type")
    }

    pub fn set_property_type(&mut self, property: Property, type_name: &str) -> Result<()> {
        let record = self.live(property)?;
        if type_name.trim().is_empty() {
            return Err(ModelError::InvalidModelObject {
                kind: ObjectKind::Property,
                name: self.name(property).to_string(),
                reason: "property type cannot be empty".to_string(),
            });
        }
        self.tree.set_attr(record.node, "Type", type_name);
        Ok(())
    }

    pub fn facets(&self, property: Property) -> PropertyFacets {
        let node = self.node_of(property);
        let attr = |name: &str| self.tree.attr(node, name);
        PropertyFacets {
            nullable: attr("Nullable").and_then(parse_bool),
            max_length: attr("MaxLength").and_then(MaxLength::parse),
            fixed_length: attr("FixedLength").and_then(parse_bool),
            unicode: attr("Unicode").and_then(parse_bool),
            precision: attr("Precision").and_then(|v| v.trim().parse().ok()),
            scale: attr("Scale").and_then(|v| v.trim().parse().ok()),
            default_value: attr("DefaultValue").map(str::to_string),
            store_generated_pattern: self
                .tree
                .attr_local(node, "StoreGeneratedPattern")
                .and_then(StoreGeneratedPattern::parse),
        }
    }

    /// Replace every facet attribute of the property
    pub fn set_facets(&mut self, property: Property, facets: &PropertyFacets) -> Result<()> {
        let record = self.live(property)?;
        self.write_facets(record.node, record.section, facets);
        Ok(())
    }

    /// Absent `Nullable` means nullable
    pub fn is_nullable(&self, property: Property) -> bool {
        self.facets(property).nullable.unwrap_or(true)
    }

    pub fn set_nullable(&mut self, property: Property, nullable: bool) -> Result<()> {
        self.live(property)?;
        let mut facets = self.facets(property);
        facets.nullable = Some(nullable);
        self.set_facets(property, &facets)
    }

    pub fn set_max_length(&mut self, property: Property, max_length: Option<MaxLength>) -> Result<()> {
        self.live(property)?;
        let mut facets = self.facets(property);
        facets.max_length = max_length;
        self.set_facets(property, &facets)
    }

    pub fn set_store_generated_pattern(
        &mut self,
        property: Property,
        pattern: Option<StoreGeneratedPattern>,
    ) -> Result<()> {
        self.live(property)?;
        let mut facets = self.facets(property);
        facets.store_generated_pattern = pattern;
        self.set_facets(property, &facets)
    }

    fn write_facets(&mut self, node: NodeId, section: Section, facets: &PropertyFacets) {
        let text = |b: Option<bool>| b.map(|b| b.to_string());
        let values = [
            ("Nullable", text(facets.nullable)),
            ("DefaultValue", facets.default_value.clone()),
            ("MaxLength", facets.max_length.map(|m| m.to_string())),
            ("FixedLength", text(facets.fixed_length)),
            ("Unicode", text(facets.unicode)),
            ("Precision", facets.precision.map(|p| p.to_string())),
            ("Scale", facets.scale.map(|s| s.to_string())),
        ];
        for (name, value) in values {
            match value {
                Some(value) => self.tree.set_attr(node, name, &value),
                None => {
                    self.tree.remove_attr(node, name);
                }
            }
        }

        self.tree.remove_attr_local(node, "StoreGeneratedPattern");
        if let Some(pattern) = facets.store_generated_pattern {
            let attribute = match section {
                // The conceptual schema carries it as a designer annotation
                Section::Conceptual => format!("{}:StoreGeneratedPattern", self.annotation_prefix()),
                _ => "StoreGeneratedPattern".to_string(),
            };
            self.tree.set_attr(node, &attribute, pattern.as_str());
        }
    }

    /// Prefix bound to the annotation namespace on the conceptual schema, declared on demand
    fn annotation_prefix(&mut self) -> String {
        let schema = self.sections.conceptual;
        let declared = self.tree.attributes(schema).iter().find_map(|a| {
            match split_qname(&a.name) {
                (Some("xmlns"), prefix) if a.value == ANNOTATION_NAMESPACE => Some(prefix.to_string()),
                _ => None,
            }
        });
        match declared {
            Some(prefix) => prefix,
            None => {
                self.tree
                    .set_attr(schema, "xmlns:annotation", ANNOTATION_NAMESPACE);
                "annotation".to_string()
            }
        }
    }

    // ------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------

    /// Names listed in the type's own `<Key>`
    pub fn key_names(&self, entity_type: EntityType) -> Vec<String> {
        let node = self.node_of(entity_type);
        self.tree
            .first_child_named(node, "Key")
            .map(|key| {
                self.tree
                    .children_named(key, "PropertyRef")
                    .into_iter()
                    .filter_map(|r| self.tree.attr(r, "Name").map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_key(&self, property: Property) -> bool {
        let Some(owner) = self.owning_type(property) else {
            return false;
        };
        let name = self.name(property);
        self.key_names(owner).iter().any(|k| names_match(k, name))
    }

    /// Add the property to (or drop it from) its owner's key
    pub fn set_key(&mut self, property: Property, key: bool) -> Result<()> {
        let record = self.live(property)?;
        let owner = self
            .owning_type(property)
            .ok_or(ModelError::Detached { kind: ObjectKind::Property })?;
        let owner_node = self.node_of(owner);
        let name = self.name(property).to_string();

        if key {
            let key_node = match self.tree.first_child_named(owner_node, "Key") {
                Some(existing) => existing,
                None => {
                    let created = self.new_child_element(owner_node, "Key", &[]);
                    self.tree
                        .insert_after_last(owner_node, &["Documentation"], created, Fallback::First);
                    created
                }
            };
            let listed = self
                .tree
                .children_named(key_node, "PropertyRef")
                .into_iter()
                .any(|r| self.tree.attr(r, "Name").is_some_and(|n| names_match(n, &name)));
            if !listed {
                let reference = self.new_child_element(key_node, "PropertyRef", &[("Name", name.as_str())]);
                self.tree.append_child(key_node, reference);
            }
            self.tree.set_attr(record.node, "Nullable", "false");
        } else if let Some(key_node) = self.tree.first_child_named(owner_node, "Key") {
            for reference in self.tree.children_named(key_node, "PropertyRef") {
                if self.tree.attr(reference, "Name").is_some_and(|n| names_match(n, &name)) {
                    self.tree.detach(reference);
                }
            }
            if self.tree.child_elements(key_node).next().is_none() {
                self.tree.detach(key_node);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    pub fn parameters<O: ParameterOwner>(&mut self, owner: O) -> Vec<Parameter> {
        if !self.is_live_id(owner.object_id()) {
            return Vec::new();
        }
        typed(self.collection(CollectionKey::object(owner.object_id(), ObjectKind::Parameter)))
    }

    pub fn add_parameter<O: ParameterOwner>(
        &mut self,
        owner: O,
        name: &str,
        type_name: &str,
        mode: ParameterMode,
    ) -> Result<Parameter> {
        let record = self.live(owner)?;
        validate_name(ObjectKind::Parameter, name)?;
        let key = CollectionKey::object(owner.object_id(), ObjectKind::Parameter);
        self.ensure_unique(key, ObjectKind::Parameter, name, None)?;

        let node = self.new_child_element(
            record.node,
            "Parameter",
            &[("Name", name), ("Type", type_name), ("Mode", mode.as_str())],
        );
        self.tree
            .insert_after_last(record.node, &["Parameter"], node, Fallback::Last);
        Ok(Parameter::from_object_id(self.adopt(key, node)))
    }

    pub fn parameter_type(&self, parameter: Parameter) -> Option<&str> {
        self.tree.attr(self.node_of(parameter), "Type")
    }

    pub fn parameter_mode(&self, parameter: Parameter) -> Option<ParameterMode> {
        self.tree
            .attr(self.node_of(parameter), "Mode")
            .and_then(ParameterMode::parse)
    }
}

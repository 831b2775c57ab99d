//! EDMX Object Model
//!
//! `EdmxModel` owns the XML tree and an arena of object records. Every
//! model object (entity type, set, association, mapping, shape, ...) is a
//! typed `Copy` handle over a stable `ObjectId`; all reads and writes go
//! through the model, which keeps the XML, the name indexes and the
//! reference caches in step.
//!
//! Wrappers are realized lazily: a collection walks its XML the first time
//! it is enumerated or searched, and the same handle is returned on every
//! later call.

pub mod association;
pub mod collection;
pub mod diagnostics;
pub mod diagram;
pub mod events;
pub mod inheritance;
pub mod loader;
pub mod mapping;
pub mod members;
pub mod remove;
pub mod rename;
pub mod resolve;
pub mod schema;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::version::EdmxVersion;
use crate::xml::{NodeId, XmlTree};

use collection::{CollectionKey, LazyCollection, Owner};
use diagnostics::Diagnostics;
use events::{Listeners, ModelEvent};
use resolve::RefCache;

pub use association::{AssociationEnd, AssociationSpec, End, Multiplicity, ReferentialConstraint};
pub use diagnostics::{DiagnosticCode, DiagnosticItem, Severity};
pub use diagram::ShapeBounds;
pub use events::SubscriptionId;
pub use mapping::{ConditionValue, EndPropertyMapping};
pub use members::{MaxLength, ParameterMode, ParameterOwner, PropertyFacets, PropertySpec, StoreGeneratedPattern};

/// Stable identity of a model object for the lifetime of its model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(usize);

impl ObjectId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Document section an object lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    Conceptual,
    Storage,
    Mapping,
    Diagram,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Conceptual => "conceptual",
            Self::Storage => "storage",
            Self::Mapping => "mapping",
            Self::Diagram => "diagram",
        };
        write!(f, "{}", name)
    }
}

/// Kind of a model object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    EntityType,
    EntitySet,
    Association,
    AssociationSet,
    Property,
    NavigationProperty,
    Function,
    FunctionImport,
    Parameter,
    EntitySetMapping,
    EntityTypeMapping,
    MappingFragment,
    ScalarPropertyMapping,
    MappingCondition,
    AssociationSetMapping,
    FunctionImportMapping,
    Shape,
    Connector,
}

impl ObjectKind {
    /// Local name of the XML element backing this kind
    pub fn element_name(self) -> &'static str {
        match self {
            Self::EntityType => "EntityType",
            Self::EntitySet => "EntitySet",
            Self::Association => "Association",
            Self::AssociationSet => "AssociationSet",
            Self::Property => "Property",
            Self::NavigationProperty => "NavigationProperty",
            Self::Function => "Function",
            Self::FunctionImport => "FunctionImport",
            Self::Parameter => "Parameter",
            Self::EntitySetMapping => "EntitySetMapping",
            Self::EntityTypeMapping => "EntityTypeMapping",
            Self::MappingFragment => "MappingFragment",
            Self::ScalarPropertyMapping => "ScalarProperty",
            Self::MappingCondition => "Condition",
            Self::AssociationSetMapping => "AssociationSetMapping",
            Self::FunctionImportMapping => "FunctionImportMapping",
            Self::Shape => "EntityTypeShape",
            Self::Connector => "AssociationConnector",
        }
    }

    /// Attribute holding the object's name (its key in the owning collection)
    pub fn name_attribute(self) -> &'static str {
        match self {
            Self::EntityTypeMapping => "TypeName",
            Self::MappingFragment => "StoreEntitySet",
            Self::MappingCondition => "ColumnName",
            Self::FunctionImportMapping => "FunctionImportName",
            Self::Shape => "EntityType",
            Self::Connector => "Association",
            _ => "Name",
        }
    }

    /// Whether the name is a declared EDM identifier (as opposed to a
    /// reference to some other object's name)
    pub fn has_identifier_name(self) -> bool {
        matches!(
            self,
            Self::EntityType
                | Self::EntitySet
                | Self::Association
                | Self::AssociationSet
                | Self::Property
                | Self::NavigationProperty
                | Self::Function
                | Self::FunctionImport
                | Self::Parameter
        )
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Lifecycle of an object record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObjectState {
    Live,
    /// Cascade in progress
    Removing,
    Removed,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ObjectRecord {
    pub kind: ObjectKind,
    pub section: Section,
    pub node: NodeId,
    pub owner: Option<ObjectId>,
    pub collection: CollectionKey,
    pub state: ObjectState,
}

/// Typed handle to a model object
///
/// A handle belongs to the `EdmxModel` that returned it. Mutating calls
/// reject ids another model issued beyond this model's arena; plain
/// getters assume the handle came from the model they are called on.
pub trait ModelObject: Copy + Eq + std::hash::Hash + fmt::Debug {
    const KIND: ObjectKind;

    fn object_id(self) -> ObjectId;

    #[doc(hidden)]
    fn from_object_id(id: ObjectId) -> Self;
}

macro_rules! model_handles {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(ObjectId);

            impl ModelObject for $name {
                const KIND: ObjectKind = ObjectKind::$name;

                fn object_id(self) -> ObjectId {
                    self.0
                }

                fn from_object_id(id: ObjectId) -> Self {
                    Self(id)
                }
            }

            impl From<$name> for ObjectId {
                fn from(handle: $name) -> Self {
                    handle.0
                }
            }
        )*
    };
}

model_handles! {
    /// Conceptual entity type or store table
    EntityType;
    /// Conceptual entity set or store entity set
    EntitySet;
    /// Conceptual association or store foreign key
    Association;
    AssociationSet;
    /// Scalar member of an entity type (a column on the storage side)
    Property;
    NavigationProperty;
    /// Store function
    Function;
    FunctionImport;
    Parameter;
    EntitySetMapping;
    EntityTypeMapping;
    MappingFragment;
    ScalarPropertyMapping;
    MappingCondition;
    AssociationSetMapping;
    FunctionImportMapping;
    /// Diagram shape of an entity type
    Shape;
    /// Diagram connector of an association
    Connector;
}

/// Section root nodes
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sections {
    /// CSDL `Schema`
    pub conceptual: NodeId,
    /// SSDL `Schema`
    pub storage: NodeId,
    /// MSL `Mapping`
    pub mapping: NodeId,
    /// `Diagram` element, when the document has a layout
    pub diagram: Option<NodeId>,
    /// Root of the side-file document the diagram was read from
    pub diagram_document: Option<NodeId>,
}

/// Counters describing the realized object graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStats {
    pub objects: usize,
    pub live_objects: usize,
    pub enumerated_collections: usize,
    /// Number of times a collection walked its XML
    pub collection_queries: usize,
    pub cached_references: usize,
    pub pending_events: usize,
}

/// In-memory EDMX document with its lazily realized object graph
pub struct EdmxModel {
    pub(crate) tree: XmlTree,
    pub(crate) version: EdmxVersion,
    pub(crate) sections: Sections,
    pub(crate) config: ModelConfig,
    pub(crate) objects: Vec<ObjectRecord>,
    pub(crate) node_objects: HashMap<NodeId, ObjectId>,
    pub(crate) collections: HashMap<CollectionKey, LazyCollection>,
    pub(crate) materializing: HashSet<CollectionKey>,
    pub(crate) refs: RefCache,
    pub(crate) listeners: Listeners,
    pub(crate) journal: Vec<ModelEvent>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) collection_queries: usize,
}

impl fmt::Debug for EdmxModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdmxModel")
            .field("version", &self.version)
            .field("namespace", &self.namespace(Section::Conceptual))
            .field("stats", &self.stats())
            .finish()
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::RegexBuilder::new(r"^[\p{L}\p{Nl}_][\p{L}\p{Nl}\p{Nd}\p{Mn}\p{Mc}\p{Pc}\p{Cf}]{0,479}$")
            .size_limit(256 * (1 << 20))
            .build()
            .expect("identifier pattern is valid")
    })
}

fn namespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[\p{L}_][\p{L}\p{Nd}_]*(\.[\p{L}_][\p{L}\p{Nd}_]*)*$")
            .expect("namespace pattern is valid")
    })
}

/// Check an EDM simple identifier
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

/// Check a dotted EDM namespace name
pub fn is_valid_namespace(name: &str) -> bool {
    namespace_pattern().is_match(name)
}

pub(crate) fn validate_name(kind: ObjectKind, name: &str) -> Result<()> {
    let valid = if kind.has_identifier_name() {
        is_valid_identifier(name)
    } else {
        !name.trim().is_empty()
    };
    if valid {
        Ok(())
    } else {
        Err(ModelError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

pub(crate) fn typed<H: ModelObject>(ids: impl IntoIterator<Item = ObjectId>) -> Vec<H> {
    ids.into_iter().map(H::from_object_id).collect()
}

impl EdmxModel {
    pub fn version(&self) -> EdmxVersion {
        self.version
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ModelConfig {
        &mut self.config
    }

    /// Raw XML tree
    pub fn xml(&self) -> &XmlTree {
        &self.tree
    }

    /// XML element backing an object
    pub fn node_of<H: ModelObject>(&self, handle: H) -> NodeId {
        self.record(handle.object_id()).node
    }

    /// Schema `Namespace` of the conceptual or storage section
    pub fn namespace(&self, section: Section) -> Option<&str> {
        self.schema_node(section)
            .and_then(|schema| self.tree.attr(schema, "Namespace"))
    }

    /// Schema `Alias` of the conceptual or storage section
    pub fn alias(&self, section: Section) -> Option<&str> {
        self.schema_node(section)
            .and_then(|schema| self.tree.attr(schema, "Alias"))
    }

    /// `EntityContainer` name of the conceptual or storage section
    pub fn container_name(&self, section: Section) -> Option<&str> {
        self.container_node(section)
            .and_then(|container| self.tree.attr(container, "Name"))
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            objects: self.objects.len(),
            live_objects: self
                .objects
                .iter()
                .filter(|r| r.state == ObjectState::Live)
                .count(),
            enumerated_collections: self.collections.len(),
            collection_queries: self.collection_queries,
            cached_references: self.refs.len(),
            pending_events: self.journal.len(),
        }
    }

    // ------------------------------------------------------------------
    // Generic object API
    // ------------------------------------------------------------------

    /// Current name of any object ("" when the attribute is missing)
    pub fn name<H: ModelObject>(&self, handle: H) -> &str {
        self.name_of_id(handle.object_id())
    }

    /// Name qualified by namespace, container or owner
    pub fn full_name<H: ModelObject>(&self, handle: H) -> String {
        self.full_name_of_id(handle.object_id())
    }

    pub fn section_of<H: ModelObject>(&self, handle: H) -> Section {
        self.record(handle.object_id()).section
    }

    pub fn is_removed<H: ModelObject>(&self, handle: H) -> bool {
        !self.is_live_id(handle.object_id())
    }

    // ------------------------------------------------------------------
    // Internals shared by the submodules
    // ------------------------------------------------------------------

    /// Handles are only valid for the model that issued them
    pub(crate) fn record(&self, id: ObjectId) -> &ObjectRecord {
        &self.objects[id.0]
    }

    /// Record of a handle's object, or an error for an id this model never issued
    pub(crate) fn checked_record<H: ModelObject>(&self, handle: H) -> Result<ObjectRecord> {
        self.objects
            .get(handle.object_id().0)
            .copied()
            .ok_or_else(|| ModelError::InvalidModelObject {
                kind: H::KIND,
                name: String::new(),
                reason: "handle was not issued by this model".to_string(),
            })
    }

    pub(crate) fn is_live_id(&self, id: ObjectId) -> bool {
        self.objects
            .get(id.0)
            .is_some_and(|r| r.state == ObjectState::Live)
    }

    /// Record of a live object of the handle's kind
    pub(crate) fn live<H: ModelObject>(&self, handle: H) -> Result<ObjectRecord> {
        let record = self.checked_record(handle)?;
        if record.kind != H::KIND {
            return Err(ModelError::InvalidModelObject {
                kind: H::KIND,
                name: self.name_of_id(handle.object_id()).to_string(),
                reason: format!("handle refers to a {}", record.kind),
            });
        }
        if record.state != ObjectState::Live {
            return Err(ModelError::Detached { kind: record.kind });
        }
        Ok(record)
    }

    /// Like `live`, additionally requiring a section
    pub(crate) fn live_in<H: ModelObject>(&self, handle: H, expected: Section) -> Result<ObjectRecord> {
        let record = self.live(handle)?;
        if record.section != expected {
            return Err(ModelError::WrongSection {
                kind: record.kind,
                name: self.name_of_id(handle.object_id()).to_string(),
                expected,
                found: record.section,
            });
        }
        Ok(record)
    }

    pub(crate) fn register(
        &mut self,
        kind: ObjectKind,
        section: Section,
        node: NodeId,
        collection: CollectionKey,
    ) -> ObjectId {
        let owner = match collection.owner {
            Owner::Object(owner) => Some(owner),
            Owner::Section(_) => None,
        };
        let id = ObjectId(self.objects.len());
        self.objects.push(ObjectRecord {
            kind,
            section,
            node,
            owner,
            collection,
            state: ObjectState::Live,
        });
        self.node_objects.insert(node, id);
        id
    }

    pub(crate) fn name_of_node(&self, kind: ObjectKind, node: NodeId) -> &str {
        let value = match kind {
            ObjectKind::MappingCondition => self
                .tree
                .attr(node, "ColumnName")
                .or_else(|| self.tree.attr(node, "Name")),
            _ => self.tree.attr(node, kind.name_attribute()),
        };
        value.unwrap_or("")
    }

    /// Attribute actually used for the name of an existing node
    pub(crate) fn name_attribute_of_node(&self, kind: ObjectKind, node: NodeId) -> &'static str {
        match kind {
            ObjectKind::MappingCondition if self.tree.attr(node, "ColumnName").is_none() => "Name",
            _ => kind.name_attribute(),
        }
    }

    pub(crate) fn name_of_id(&self, id: ObjectId) -> &str {
        let record = self.record(id);
        self.name_of_node(record.kind, record.node)
    }

    pub(crate) fn full_name_of_id(&self, id: ObjectId) -> String {
        let record = *self.record(id);
        let name = self.name_of_id(id);
        match record.kind {
            ObjectKind::EntityType | ObjectKind::Association | ObjectKind::Function => {
                match self.namespace(record.section) {
                    Some(namespace) => format!("{}.{}", namespace, name),
                    None => name.to_string(),
                }
            }
            ObjectKind::EntitySet | ObjectKind::AssociationSet | ObjectKind::FunctionImport => {
                match self.container_name(record.section) {
                    Some(container) => format!("{}.{}", container, name),
                    None => name.to_string(),
                }
            }
            ObjectKind::Property | ObjectKind::NavigationProperty | ObjectKind::Parameter => {
                match record.owner {
                    Some(owner) => format!("{}.{}", self.full_name_of_id(owner), name),
                    None => name.to_string(),
                }
            }
            _ => name.to_string(),
        }
    }

    /// Reference to a schema-level object as written by this model
    pub(crate) fn qualified(&self, section: Section, name: &str) -> String {
        match self.namespace(section) {
            Some(namespace) => format!("{}.{}", namespace, name),
            None => name.to_string(),
        }
    }

    pub(crate) fn schema_node(&self, section: Section) -> Option<NodeId> {
        match section {
            Section::Conceptual => Some(self.sections.conceptual),
            Section::Storage => Some(self.sections.storage),
            Section::Mapping | Section::Diagram => None,
        }
    }

    pub(crate) fn container_node(&self, section: Section) -> Option<NodeId> {
        self.schema_node(section)
            .and_then(|schema| self.tree.first_child_named(schema, "EntityContainer"))
    }

    /// Entity container of a schema, created on demand
    pub(crate) fn ensure_container(&mut self, section: Section) -> Result<NodeId> {
        if let Some(container) = self.container_node(section) {
            return Ok(container);
        }
        let schema = self
            .schema_node(section)
            .ok_or(ModelError::MissingSection("EntityContainer"))?;
        let namespace = self.namespace(section).unwrap_or("Model").replace('.', "");
        let name = format!("{}Container", namespace);
        let element = self.tree.qualified_like(schema, "EntityContainer");
        let container = self.tree.new_element_with(element, &[("Name", name.as_str())]);
        // Containers precede the type declarations
        self.tree.insert_child(schema, 0, container);
        Ok(container)
    }

    /// New element named like its future parent's namespace prefix
    pub(crate) fn new_child_element(&mut self, parent: NodeId, local: &str, attributes: &[(&str, &str)]) -> NodeId {
        let name = self.tree.qualified_like(parent, local);
        self.tree.new_element_with(name, attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("Customer"));
        assert!(is_valid_identifier("_Order2"));
        assert!(is_valid_identifier("Größe"));
        assert!(!is_valid_identifier("2Fast"));
        assert!(!is_valid_identifier("Has Space"));
        assert!(!is_valid_identifier("Dotted.Name"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn test_namespace_validation() {
        assert!(is_valid_namespace("Northwind.Model"));
        assert!(is_valid_namespace("Model"));
        assert!(!is_valid_namespace("Model."));
        assert!(!is_valid_namespace(".Model"));
    }

    #[test]
    fn test_kind_attributes() {
        assert_eq!(ObjectKind::Shape.element_name(), "EntityTypeShape");
        assert_eq!(ObjectKind::Shape.name_attribute(), "EntityType");
        assert_eq!(ObjectKind::EntityType.name_attribute(), "Name");
        assert!(!ObjectKind::MappingFragment.has_identifier_name());
        assert_eq!(ObjectKind::ScalarPropertyMapping.to_string(), "ScalarPropertyMapping");
    }
}

//! EDMX Object Model
//!
//! A lazy, event-synchronized object model over Entity Data Model XML
//! documents: the conceptual schema (CSDL), the storage schema (SSDL), the
//! mapping between them (MSL) and the designer diagram.
//!
//! ## Features
//!
//! - **Lazy Realization**: collections walk their XML on first use and hand
//!   back the same handle on every later call
//! - **Reference Resolution**: bare, namespace- and alias-qualified names and
//!   `IsTypeOf(...)` wrappers, cached per holder
//! - **Synchronized Edits**: renames rewrite every structural reference,
//!   removals cascade to dependents and scrub dangling attributes
//! - **Inheritance**: ancestors, descendants, effective properties and cycle
//!   detection
//! - **Checksums**: SHA256 fingerprints of the model structure
//!
//! ## Layout
//!
//! ```text
//! edmx:Edmx
//! ├── edmx:Runtime
//! │   ├── edmx:StorageModels/Schema      (Section::Storage)
//! │   ├── edmx:ConceptualModels/Schema   (Section::Conceptual)
//! │   └── edmx:Mappings/Mapping          (Section::Mapping)
//! └── edmx:Designer/Diagrams/Diagram     (Section::Diagram, or <file>.diagram)
//! ```
//!
//! ## Example
//!
//! ```
//! use edmx_model::{EdmxModel, EdmxVersion, PropertySpec, Section};
//!
//! let mut model = EdmxModel::create("Shop", EdmxVersion::V3)?;
//! let customer = model.add_entity_type(Section::Conceptual, "Customer")?;
//! model.add_property(customer, PropertySpec::new("Id", "Int32").key())?;
//! model.add_entity_set("Customers", customer)?;
//!
//! model.rename(customer, "Client")?;
//! let set = model.entity_set(Section::Conceptual, "Customers").unwrap();
//! assert_eq!(model.entity_type_of_set(set), Some(customer));
//! # Ok::<(), edmx_model::ModelError>(())
//! ```

pub mod checksum;
pub mod config;
pub mod error;
pub mod model;
pub mod version;
pub mod xml;

pub use checksum::Checksum;
pub use config::{EventConfig, LoadConfig, ModelConfig, SaveConfig};
pub use error::{ModelError, Result};
pub use model::{
    Association, AssociationEnd, AssociationSet, AssociationSetMapping, AssociationSpec,
    ConditionValue, Connector, DiagnosticCode, DiagnosticItem, EdmxModel, End, EndPropertyMapping,
    EntitySet, EntitySetMapping, EntityType, EntityTypeMapping, Function, FunctionImport,
    FunctionImportMapping, MappingCondition, MappingFragment, MaxLength, ModelObject, ModelStats,
    Multiplicity, NavigationProperty, ObjectId, ObjectKind, Parameter, ParameterMode, Property,
    PropertyFacets, PropertySpec, ReferentialConstraint, ScalarPropertyMapping, Section, Severity,
    Shape, ShapeBounds, StoreGeneratedPattern,
};
pub use model::diagnostics::Diagnostics;
pub use model::events::ModelEvent;
pub use version::EdmxVersion;

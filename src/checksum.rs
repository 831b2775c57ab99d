//! Structural fingerprints of EDMX models
//!
//! Two documents that differ only in formatting, attribute order or the
//! "Last updated" marker produce the same checksum.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::model::{EdmxModel, Section};

/// SHA256 checksum of model content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from a JSON value
    pub fn from_json(value: &Value) -> Self {
        // serde_json maps keep their keys sorted, so equal values serialize identically
        let canonical = serde_json::to_string(value).unwrap_or_default();
        Self::from_bytes(canonical.as_bytes())
    }

    /// Fingerprint of everything the object model exposes
    pub fn of_model(model: &mut EdmxModel) -> Self {
        Self::from_json(&model_structure(model))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that a model still matches this checksum
    pub fn verify_model(&self, model: &mut EdmxModel) -> bool {
        Self::of_model(model) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn schema_structure(model: &mut EdmxModel, section: Section) -> Value {
    let mut entity_types = Vec::new();
    for entity_type in model.entity_types(section) {
        let base = model.base_type(entity_type).map(|b| model.full_name(b));
        let mut properties = Vec::new();
        for property in model.properties(entity_type) {
            properties.push(json!({
                "name": model.name(property),
                "type": model.property_type(property),
                "facets": to_value(&model.facets(property)),
            }));
        }
        let mut navigation = Vec::new();
        for nav in model.navigation_properties(entity_type) {
            let target = model.navigation_target(nav).map(|t| model.full_name(t));
            navigation.push(json!({ "name": model.name(nav), "target": target }));
        }
        entity_types.push(json!({
            "name": model.full_name(entity_type),
            "base": base,
            "abstract": model.is_abstract(entity_type),
            "key": model.key_names(entity_type),
            "properties": properties,
            "navigation": navigation,
        }));
    }

    let mut entity_sets = Vec::new();
    for set in model.entity_sets(section) {
        let entity_type = model.entity_type_of_set(set).map(|t| model.full_name(t));
        entity_sets.push(json!({ "name": model.full_name(set), "type": entity_type }));
    }

    let mut associations = Vec::new();
    for association in model.associations(section) {
        associations.push(json!({
            "name": model.full_name(association),
            "ends": to_value(&model.association_ends(association)),
            "constraint": to_value(&model.referential_constraint(association)),
        }));
    }

    let mut association_sets = Vec::new();
    for set in model.association_sets(section) {
        let association = model.association_of_set(set).map(|a| model.full_name(a));
        association_sets.push(json!({ "name": model.full_name(set), "association": association }));
    }

    json!({
        "namespace": model.namespace(section),
        "entity_types": entity_types,
        "entity_sets": entity_sets,
        "associations": associations,
        "association_sets": association_sets,
    })
}

fn mapping_structure(model: &mut EdmxModel) -> Value {
    let mut set_mappings = Vec::new();
    for set_mapping in model.entity_set_mappings() {
        let mut type_mappings = Vec::new();
        for type_mapping in model.entity_type_mappings(set_mapping) {
            let mut fragments = Vec::new();
            for fragment in model.mapping_fragments(type_mapping) {
                let mut scalars = Vec::new();
                for scalar in model.scalar_property_mappings(fragment) {
                    let column = model
                        .xml()
                        .attr(model.node_of(scalar), "ColumnName")
                        .map(str::to_string);
                    scalars.push(json!([model.name(scalar), column]));
                }
                let mut conditions = Vec::new();
                for condition in model.conditions(fragment) {
                    conditions.push(json!([model.name(condition), to_value(&model.condition_value(condition))]));
                }
                fragments.push(json!({
                    "store_set": model.name(fragment),
                    "scalars": scalars,
                    "conditions": conditions,
                }));
            }
            type_mappings.push(json!({ "type": model.name(type_mapping), "fragments": fragments }));
        }
        set_mappings.push(json!({ "name": model.name(set_mapping), "types": type_mappings }));
    }

    let mut association_mappings = Vec::new();
    for mapping in model.association_set_mappings() {
        let store_set = model
            .association_set_mapping_store_set(mapping)
            .map(|s| model.name(s).to_string());
        association_mappings.push(json!({
            "name": model.name(mapping),
            "store_set": store_set,
            "ends": to_value(&model.end_property_mappings(mapping)),
        }));
    }

    let mut import_mappings = Vec::new();
    for mapping in model.function_import_mappings() {
        let function = model.mapped_function(mapping).map(|f| model.full_name(f));
        import_mappings.push(json!([model.name(mapping), function]));
    }

    json!({
        "entity_sets": set_mappings,
        "association_sets": association_mappings,
        "function_imports": import_mappings,
    })
}

fn model_structure(model: &mut EdmxModel) -> Value {
    let conceptual = schema_structure(model, Section::Conceptual);
    let storage = schema_structure(model, Section::Storage);

    let mut functions = Vec::new();
    for function in model.functions() {
        let mut parameters = Vec::new();
        for parameter in model.parameters(function) {
            parameters.push(json!([
                model.name(parameter),
                model.parameter_type(parameter),
                to_value(&model.parameter_mode(parameter)),
            ]));
        }
        functions.push(json!({ "name": model.full_name(function), "parameters": parameters }));
    }
    let mut imports = Vec::new();
    for import in model.function_imports() {
        let mut parameters = Vec::new();
        for parameter in model.parameters(import) {
            parameters.push(json!([model.name(parameter), model.parameter_type(parameter)]));
        }
        imports.push(json!({
            "name": model.full_name(import),
            "return_type": model.function_import_return_type(import),
            "parameters": parameters,
        }));
    }

    let mapping = mapping_structure(model);

    let mut shapes = Vec::new();
    for shape in model.shapes() {
        shapes.push(json!([model.name(shape), to_value(&model.shape_bounds(shape))]));
    }
    let mut connectors = Vec::new();
    for connector in model.connectors() {
        connectors.push(json!(model.name(connector)));
    }

    json!({
        "version": model.version().version_attribute(),
        "conceptual": conceptual,
        "storage": storage,
        "functions": functions,
        "function_imports": imports,
        "mapping": mapping,
        "diagram": { "shapes": shapes, "connectors": connectors },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::EdmxVersion;

    #[test]
    fn test_checksum_consistency() {
        let value = json!({"name": "test", "version": "1.0.0"});
        assert_eq!(Checksum::from_json(&value), Checksum::from_json(&value));
    }

    #[test]
    fn test_checksum_different_content() {
        assert_ne!(
            Checksum::from_json(&json!({"name": "test1"})),
            Checksum::from_json(&json!({"name": "test2"}))
        );
    }

    #[test]
    fn test_model_checksum_tracks_changes() {
        let mut model = EdmxModel::create("Model", EdmxVersion::V3).unwrap();
        let empty = Checksum::of_model(&mut model);
        assert!(empty.verify_model(&mut model));
        assert_eq!(empty.as_str().len(), 64);

        model.add_entity_type(Section::Conceptual, "Customer").unwrap();
        assert!(!empty.verify_model(&mut model));
    }
}

//! Loading, creating and saving EDMX documents

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use super::collection::Owner;
use super::diagnostics::Diagnostics;
use super::events::Listeners;
use super::resolve::RefCache;
use super::{is_valid_namespace, EdmxModel, ObjectId, ObjectState, Section, Sections};
use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::version::{EdmxVersion, ANNOTATION_NAMESPACE, STORE_GENERATOR_NAMESPACE};
use crate::xml::{self, NodeId, NodeKind, XmlTree};

/// Prefix of the comment refreshed before the root element on every save
const MARKER_PREFIX: &str = "Last updated:";

/// `<document>.diagram` next to the document
pub fn diagram_side_path(path: &Path) -> PathBuf {
    let mut side = path.as_os_str().to_owned();
    side.push(".diagram");
    PathBuf::from(side)
}

fn require(found: Option<NodeId>, section: &'static str) -> Result<NodeId> {
    found.ok_or(ModelError::MissingSection(section))
}

fn check_schema_namespace(
    tree: &XmlTree,
    node: NodeId,
    detect: fn(&str) -> Option<EdmxVersion>,
) -> Result<EdmxVersion> {
    let uri = tree.namespace_uri(node).unwrap_or("");
    detect(uri).ok_or_else(|| ModelError::UnsupportedVersion(uri.to_string()))
}

impl FromStr for EdmxModel {
    type Err = ModelError;

    fn from_str(xml: &str) -> Result<Self> {
        Self::parse(xml)
    }
}

impl EdmxModel {
    /// Parse a document with the default configuration
    pub fn parse(xml: &str) -> Result<Self> {
        Self::parse_with(xml, ModelConfig::default())
    }

    pub fn parse_with(xml: &str, config: ModelConfig) -> Result<Self> {
        let tree = xml::parse(xml)?;
        Self::from_tree(tree, config)
    }

    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut xml = String::new();
        reader.read_to_string(&mut xml)?;
        Self::parse(&xml)
    }

    /// Load a file with the default configuration
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path, ModelConfig::default())
    }

    /// Load a file; the diagram is taken from `<file>.diagram` when the
    /// configuration allows it and the side file exists
    pub fn load_with(path: impl AsRef<Path>, config: ModelConfig) -> Result<Self> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path)?;
        let side_file = config.load.diagram_side_file;
        let mut model = Self::parse_with(&xml, config)?;

        let side = diagram_side_path(path);
        if side_file && side.exists() {
            let side_xml = std::fs::read_to_string(&side)?;
            model.attach_diagram_document(&side_xml)?;
            debug!(path = %side.display(), "Diagram side file loaded");
        }
        debug!(path = %path.display(), version = %model.version, "Document loaded");
        Ok(model)
    }

    /// Empty document with one container per schema and an empty diagram
    pub fn create(namespace: &str, version: EdmxVersion) -> Result<Self> {
        if !is_valid_namespace(namespace) {
            return Err(ModelError::InvalidNamespace(namespace.to_string()));
        }
        let flat = namespace.replace('.', "");
        let xml = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx Version="{version_attribute}" xmlns:edmx="{edmx}">
  <edmx:Runtime>
    <edmx:StorageModels>
      <Schema Namespace="{namespace}.Store" Alias="Self" Provider="System.Data.SqlClient" ProviderManifestToken="2008" xmlns:store="{store_generator}" xmlns="{ssdl}">
        <EntityContainer Name="{flat}StoreContainer" />
      </Schema>
    </edmx:StorageModels>
    <edmx:ConceptualModels>
      <Schema Namespace="{namespace}" Alias="Self" xmlns:annotation="{annotation}" xmlns="{csdl}">
        <EntityContainer Name="{flat}Container" />
      </Schema>
    </edmx:ConceptualModels>
    <edmx:Mappings>
      <Mapping Space="C-S" xmlns="{msl}">
        <EntityContainerMapping StorageEntityContainer="{flat}StoreContainer" CdmEntityContainer="{flat}Container" />
      </Mapping>
    </edmx:Mappings>
  </edmx:Runtime>
  <edmx:Designer>
    <edmx:Diagrams>
      <edmx:Diagram Name="{namespace}" />
    </edmx:Diagrams>
  </edmx:Designer>
</edmx:Edmx>"#,
            version_attribute = version.version_attribute(),
            edmx = version.edmx_namespace(),
            ssdl = version.ssdl_namespace(),
            csdl = version.csdl_namespace(),
            msl = version.msl_namespace(),
            store_generator = STORE_GENERATOR_NAMESPACE,
            annotation = ANNOTATION_NAMESPACE,
        );
        debug!(namespace, version = %version, "Document created");
        Self::parse(&xml)
    }

    fn from_tree(tree: XmlTree, config: ModelConfig) -> Result<Self> {
        let root = require(tree.root(), "Edmx")?;
        if tree.local_name(root) != Some("Edmx") {
            return Err(ModelError::MissingSection("Edmx"));
        }
        let uri = tree.namespace_uri(root).unwrap_or("");
        let version = EdmxVersion::from_edmx_namespace(uri)
            .ok_or_else(|| ModelError::UnsupportedVersion(uri.to_string()))?;
        if let Some(declared) = tree.attr(root, "Version") {
            if EdmxVersion::parse_version_attribute(declared)? != version {
                return Err(ModelError::UnsupportedVersion(format!(
                    "Version {} does not match namespace {}",
                    declared, uri
                )));
            }
        }

        let runtime = require(tree.first_child_named(root, "Runtime"), "Runtime")?;
        let conceptual = require(tree.path(runtime, &["ConceptualModels", "Schema"]), "ConceptualModels")?;
        let storage = require(tree.path(runtime, &["StorageModels", "Schema"]), "StorageModels")?;
        let mapping = require(tree.path(runtime, &["Mappings", "Mapping"]), "Mappings")?;
        check_schema_namespace(&tree, conceptual, EdmxVersion::from_csdl_namespace)?;
        check_schema_namespace(&tree, storage, EdmxVersion::from_ssdl_namespace)?;
        check_schema_namespace(&tree, mapping, EdmxVersion::from_msl_namespace)?;
        let diagram = tree.path(root, &["Designer", "Diagrams", "Diagram"]);

        debug!(
            version = %version,
            namespace = tree.attr(conceptual, "Namespace").unwrap_or(""),
            has_diagram = diagram.is_some(),
            "Document parsed"
        );
        Ok(Self {
            tree,
            version,
            sections: Sections {
                conceptual,
                storage,
                mapping,
                diagram,
                diagram_document: None,
            },
            config,
            objects: Vec::new(),
            node_objects: HashMap::new(),
            collections: HashMap::new(),
            materializing: HashSet::new(),
            refs: RefCache::default(),
            listeners: Listeners::default(),
            journal: Vec::new(),
            diagnostics: Diagnostics::new(),
            collection_queries: 0,
        })
    }

    /// Take the layout from a separate diagram document; it replaces any
    /// embedded diagram until the next save
    pub fn attach_diagram_document(&mut self, xml: &str) -> Result<()> {
        let side = xml::parse(xml)?;
        let side_root = require(side.root(), "Edmx")?;
        let imported = self.tree.import(&side, side_root);
        let diagram = self
            .tree
            .path(imported, &["Designer", "Diagrams", "Diagram"])
            .ok_or(ModelError::MissingSection("Diagram"))?;
        self.retire_diagram_objects();
        self.sections.diagram = Some(diagram);
        self.sections.diagram_document = Some(imported);
        Ok(())
    }

    /// Shapes and connectors realized from the replaced diagram stop
    /// resolving; the new diagram is enumerated on next use
    fn retire_diagram_objects(&mut self) {
        let retired: Vec<ObjectId> = self
            .objects
            .iter()
            .enumerate()
            .filter(|(_, r)| r.section == Section::Diagram && r.state == ObjectState::Live)
            .map(|(index, _)| ObjectId(index))
            .collect();
        for id in &retired {
            let node = self.objects[id.index()].node;
            self.objects[id.index()].state = ObjectState::Removed;
            self.node_objects.remove(&node);
            self.refs.invalidate_target(*id);
            self.refs.forget_holder(*id);
        }
        self.collections.retain(|key, _| match key.owner {
            Owner::Section(section) => section != Section::Diagram,
            Owner::Object(owner) => !retired.contains(&owner),
        });
        debug!(retired = retired.len(), "Embedded diagram objects retired");
    }

    /// Whether the layout lives in a side document
    pub fn has_diagram_document(&self) -> bool {
        self.sections.diagram_document.is_some()
    }

    fn refresh_marker(&mut self) {
        self.tree.retain_prolog(|kind| {
            !matches!(kind, NodeKind::Comment(text) if text.trim_start().starts_with(MARKER_PREFIX))
        });
        let stamp = chrono::Utc::now().to_rfc3339();
        let marker = self.tree.new_comment(format!(" {} {} ", MARKER_PREFIX, stamp));
        self.tree.push_prolog(marker);
    }

    /// Serialize the main document
    pub fn to_xml_string(&mut self) -> Result<String> {
        if self.config.save.update_marker {
            self.refresh_marker();
        }
        let root = require(self.tree.root(), "Edmx")?;
        xml::write_document(&self.tree, self.tree.prolog(), root, &self.config.write_options())
    }

    /// Serialize the side diagram document, when the layout came from one
    pub fn diagram_xml_string(&self) -> Result<Option<String>> {
        self.sections
            .diagram_document
            .map(|root| xml::write_document(&self.tree, &[], root, &self.config.write_options()))
            .transpose()
    }

    /// Write the document, and the diagram side file when there is one
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let xml = self.to_xml_string()?;
        std::fs::write(path, xml)?;
        if self.config.save.diagram_side_file {
            if let Some(diagram) = self.diagram_xml_string()? {
                let side = diagram_side_path(path);
                std::fs::write(&side, diagram)?;
                debug!(path = %side.display(), "Diagram side file saved");
            }
        }
        debug!(path = %path.display(), "Document saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Section;

    #[test]
    fn test_create_skeleton() {
        let mut model = EdmxModel::create("Northwind.Model", EdmxVersion::V3).unwrap();
        assert_eq!(model.version(), EdmxVersion::V3);
        assert_eq!(model.namespace(Section::Conceptual), Some("Northwind.Model"));
        assert_eq!(model.namespace(Section::Storage), Some("Northwind.Model.Store"));
        assert_eq!(model.container_name(Section::Conceptual), Some("NorthwindModelContainer"));
        assert_eq!(model.diagram_name(), Some("Northwind.Model"));
        assert!(model.entity_types(Section::Conceptual).is_empty());
        assert!(model.diagnose().is_empty());
    }

    #[test]
    fn test_create_rejects_bad_namespace() {
        assert!(matches!(
            EdmxModel::create("Bad..Name", EdmxVersion::V2),
            Err(ModelError::InvalidNamespace(_))
        ));
    }

    #[test]
    fn test_marker_is_replaced_not_duplicated() {
        let mut model = EdmxModel::create("Model", EdmxVersion::V2).unwrap();
        let first = model.to_xml_string().unwrap();
        let second = model.to_xml_string().unwrap();
        assert_eq!(first.matches(MARKER_PREFIX).count(), 1);
        assert_eq!(second.matches(MARKER_PREFIX).count(), 1);
    }

    #[test]
    fn test_missing_mapping_section() {
        let xml = r#"<edmx:Edmx Version="3.0" xmlns:edmx="http://schemas.microsoft.com/ado/2009/11/edmx">
  <edmx:Runtime>
    <edmx:StorageModels><Schema Namespace="S" xmlns="http://schemas.microsoft.com/ado/2009/11/edm/ssdl"/></edmx:StorageModels>
    <edmx:ConceptualModels><Schema Namespace="C" xmlns="http://schemas.microsoft.com/ado/2009/11/edm"/></edmx:ConceptualModels>
  </edmx:Runtime>
</edmx:Edmx>"#;
        assert!(matches!(
            EdmxModel::parse(xml),
            Err(ModelError::MissingSection("Mappings"))
        ));
    }

    #[test]
    fn test_side_path() {
        assert_eq!(
            diagram_side_path(Path::new("/tmp/Model.edmx")),
            PathBuf::from("/tmp/Model.edmx.diagram")
        );
    }
}

//! Round Trip Tests
//!
//! load(save(load(doc))) describes the same model as load(doc), the
//! "Last updated" marker is refreshed rather than accumulated, and a
//! diagram side file is read and written next to its document.

use std::fs;
use std::path::{Path, PathBuf};

use edmx_model::model::loader::diagram_side_path;
use edmx_model::{Checksum, EdmxModel, EdmxVersion, ModelConfig, ModelError, PropertySpec, Section, ShapeBounds};

const SHOP: &str = include_str!("fixtures/shop.edmx");

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

const SIDE_DIAGRAM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx Version="3.0" xmlns:edmx="http://schemas.microsoft.com/ado/2009/11/edmx">
  <edmx:Designer>
    <edmx:Diagrams>
      <edmx:Diagram Name="ShopLayout">
        <edmx:EntityTypeShape EntityType="ShopModel.Customer" Width="2" PointX="5" PointY="5" />
      </edmx:Diagram>
    </edmx:Diagrams>
  </edmx:Designer>
</edmx:Edmx>
"#;

#[test]
fn test_load_from_file() {
    let mut model = EdmxModel::load(fixture_path("shop.edmx")).unwrap();
    assert_eq!(model.version(), EdmxVersion::V3);
    assert_eq!(model.namespace(Section::Conceptual), Some("ShopModel"));
    assert_eq!(model.alias(Section::Storage), Some("Self"));
    assert_eq!(model.container_name(Section::Conceptual), Some("ShopEntities"));
    assert_eq!(model.entity_types(Section::Conceptual).len(), 2);
    assert!(!model.has_diagram_document());
}

#[test]
fn test_serialized_document_reloads_to_same_model() {
    let mut model = EdmxModel::parse(SHOP).unwrap();
    let original = Checksum::of_model(&mut model);

    let xml = model.to_xml_string().unwrap();
    let mut reloaded = EdmxModel::parse(&xml).unwrap();
    assert!(original.verify_model(&mut reloaded));

    let again = reloaded.to_xml_string().unwrap();
    let mut twice = EdmxModel::parse(&again).unwrap();
    assert_eq!(Checksum::of_model(&mut twice), original);
}

#[test]
fn test_edits_survive_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Shop.edmx");

    let mut model = EdmxModel::parse(SHOP).unwrap();
    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();
    model.rename(customer, "Client").unwrap();
    model
        .add_property(customer, PropertySpec::new("Phone", "String").nullable(true))
        .unwrap();
    let order = model.entity_type(Section::Conceptual, "Order").unwrap();
    let shape = model.shape_of(order).unwrap();
    model
        .set_shape_bounds(shape, ShapeBounds::at(4.5, 1.0))
        .unwrap();
    let edited = Checksum::of_model(&mut model);
    model.save(&path).unwrap();

    let mut loaded = EdmxModel::load(&path).unwrap();
    assert_eq!(Checksum::of_model(&mut loaded), edited);
    let client = loaded.entity_type(Section::Conceptual, "Client").unwrap();
    assert!(loaded.property(client, "Phone").is_some());
    let customers = loaded.entity_set(Section::Conceptual, "Customers").unwrap();
    assert_eq!(loaded.entity_type_of_set(customers), Some(client));
    let order = loaded.entity_type(Section::Conceptual, "Order").unwrap();
    let shape = loaded.shape_of(order).unwrap();
    assert_eq!(loaded.shape_bounds(shape).x, 4.5);
}

#[test]
fn test_marker_comment_is_refreshed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Shop.edmx");

    let mut model = EdmxModel::parse(SHOP).unwrap();
    model.save(&path).unwrap();
    let mut loaded = EdmxModel::load(&path).unwrap();
    loaded.save(&path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.matches("Last updated:").count(), 1);
    assert!(text.find("Last updated:").unwrap() < text.find("<edmx:Edmx").unwrap());

    let mut config = ModelConfig::default();
    config.save.update_marker = false;
    let mut quiet = EdmxModel::parse_with(SHOP, config).unwrap();
    assert!(!quiet.to_xml_string().unwrap().contains("Last updated:"));
}

#[test]
fn test_checksum_ignores_formatting() {
    let mut config = ModelConfig::default();
    config.save.indent = 0;
    let mut compact = EdmxModel::parse_with(SHOP, config).unwrap();
    let flat = compact.to_xml_string().unwrap();
    assert!(flat.lines().count() < SHOP.lines().count());

    let mut pretty = EdmxModel::parse(SHOP).unwrap();
    let mut reparsed = EdmxModel::parse(&flat).unwrap();
    assert_eq!(Checksum::of_model(&mut reparsed), Checksum::of_model(&mut pretty));
}

#[test]
fn test_diagram_side_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Shop.edmx");
    fs::write(&path, SHOP).unwrap();
    let side = diagram_side_path(&path);
    fs::write(&side, SIDE_DIAGRAM).unwrap();

    let mut model = EdmxModel::load(&path).unwrap();
    assert!(model.has_diagram_document());
    assert_eq!(model.diagram_name(), Some("ShopLayout"));
    let shapes = model.shapes();
    assert_eq!(shapes.len(), 1);
    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();
    assert_eq!(model.shape_entity_type(shapes[0]), Some(customer));

    model
        .set_shape_bounds(shapes[0], ShapeBounds::at(7.25, 5.0))
        .unwrap();
    model.save(&path).unwrap();

    let side_text = fs::read_to_string(&side).unwrap();
    assert!(side_text.contains(r#"PointX="7.25""#));
    let main_text = fs::read_to_string(&path).unwrap();
    assert!(!main_text.contains("ShopLayout"));

    // Without side-file loading the embedded diagram is used
    let mut config = ModelConfig::default();
    config.load.diagram_side_file = false;
    let mut embedded = EdmxModel::load_with(&path, config).unwrap();
    assert!(!embedded.has_diagram_document());
    assert_eq!(embedded.shapes().len(), 2);
}

#[test]
fn test_attached_diagram_replaces_realized_shapes() {
    let mut model = EdmxModel::parse(SHOP).unwrap();
    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();
    let embedded = model.shapes();
    assert_eq!(embedded.len(), 2);
    let embedded_customer = model.shape_of(customer).unwrap();
    assert_eq!(model.connectors().len(), 1);

    model.attach_diagram_document(SIDE_DIAGRAM).unwrap();
    assert_eq!(model.diagram_name(), Some("ShopLayout"));
    let shapes = model.shapes();
    assert_eq!(shapes.len(), 1);
    assert!(embedded.iter().all(|shape| !shapes.contains(shape)));
    assert!(model.is_removed(embedded_customer));
    let side_customer = model.shape_of(customer).unwrap();
    assert_eq!(shapes, vec![side_customer]);
    assert!(model.connectors().is_empty());

    // The customer already has a shape in the side diagram
    assert!(model.add_shape(customer, ShapeBounds::at(1.0, 1.0)).is_err());
    let order = model.entity_type(Section::Conceptual, "Order").unwrap();
    assert_eq!(model.shape_of(order), None);
    model.add_shape(order, ShapeBounds::at(3.0, 1.0)).unwrap();
    assert_eq!(model.shapes().len(), 2);
}

#[test]
fn test_unsupported_versions_are_rejected() {
    let future = SHOP.replace(
        "http://schemas.microsoft.com/ado/2009/11/edmx",
        "http://schemas.microsoft.com/ado/2012/01/edmx",
    );
    assert!(matches!(
        EdmxModel::parse(&future),
        Err(ModelError::UnsupportedVersion(_))
    ));

    let mismatched = SHOP.replace(r#"Version="3.0""#, r#"Version="2.0""#);
    assert!(matches!(
        EdmxModel::parse(&mismatched),
        Err(ModelError::UnsupportedVersion(_))
    ));

    assert!(matches!(
        EdmxModel::parse("<Edmx"),
        Err(ModelError::Xml(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        EdmxModel::load(dir.path().join("absent.edmx")),
        Err(ModelError::Io(_))
    ));
}

#[test]
fn test_created_model_round_trips() {
    let mut model = EdmxModel::create("Inventory", EdmxVersion::V2).unwrap();
    let item = model.add_entity_type(Section::Conceptual, "Item").unwrap();
    model
        .add_property(item, PropertySpec::new("Id", "Int32").key().identity())
        .unwrap();
    model.add_entity_set("Items", item).unwrap();
    let expected = Checksum::of_model(&mut model);

    let xml = model.to_xml_string().unwrap();
    let mut reloaded: EdmxModel = xml.parse().unwrap();
    assert_eq!(reloaded.version(), EdmxVersion::V2);
    assert_eq!(Checksum::of_model(&mut reloaded), expected);
    assert!(xml.contains("annotation:StoreGeneratedPattern=\"Identity\""));
}

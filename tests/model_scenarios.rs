//! Object Model Scenarios
//!
//! Edits against the shop fixture and against models built from scratch:
//! mapping construction, rename propagation, cascading removal, lazy
//! enumeration and integrity diagnostics.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use edmx_model::{
    AssociationSpec, ConditionValue, DiagnosticCode, EdmxModel, EdmxVersion, End, ModelConfig, ModelError, ModelEvent,
    ModelObject, Multiplicity, ObjectId, ObjectKind, PropertySpec, Section, Severity, ShapeBounds,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn shop() -> EdmxModel {
    init_tracing();
    EdmxModel::parse(include_str!("fixtures/shop.edmx")).unwrap()
}

fn broken() -> EdmxModel {
    init_tracing();
    EdmxModel::parse(include_str!("fixtures/broken.edmx")).unwrap()
}

fn names<H: ModelObject>(model: &EdmxModel, handles: &[H]) -> Vec<String> {
    handles.iter().map(|h| model.name(*h).to_string()).collect()
}

// =============================================================================
// Mapping Construction
// =============================================================================

#[test]
fn test_customer_set_mapping_from_scratch() {
    init_tracing();
    let mut model = EdmxModel::create("Shop", EdmxVersion::V3).unwrap();

    let customer = model.add_entity_type(Section::Conceptual, "Customer").unwrap();
    let id = model.add_property(customer, PropertySpec::new("Id", "Int32").key()).unwrap();
    let name = model.add_property(customer, PropertySpec::new("Name", "String")).unwrap();
    let customers = model.add_entity_set("Customers", customer).unwrap();

    let table = model.add_entity_type(Section::Storage, "Customers").unwrap();
    let id_column = model.add_property(table, PropertySpec::new("Id", "int").key()).unwrap();
    let name_column = model.add_property(table, PropertySpec::new("Name", "nvarchar")).unwrap();
    let store_set = model.add_entity_set("Customers", table).unwrap();

    let mapping = model.map_entity_set(customers, store_set).unwrap();
    assert_eq!(model.name(mapping), "Customers");
    assert_eq!(model.mapped_entity_set(mapping), Some(customers));
    assert_eq!(model.entity_set_mapping_of(customers), Some(mapping));

    let type_mappings = model.entity_type_mappings(mapping);
    assert_eq!(type_mappings.len(), 1);
    assert!(model.is_type_of(type_mappings[0]));
    assert_eq!(model.mapped_entity_type(type_mappings[0]), Some(customer));

    let fragments = model.mapping_fragments(type_mappings[0]);
    assert_eq!(fragments.len(), 1);
    assert_eq!(model.fragment_store_set(fragments[0]), Some(store_set));

    let scalars = model.scalar_property_mappings(fragments[0]);
    assert_eq!(scalars.len(), 2);
    let pairs: Vec<_> = scalars
        .iter()
        .map(|s| (model.mapped_property(*s), model.mapped_column(*s)))
        .collect();
    assert!(pairs.contains(&(Some(id), Some(id_column))));
    assert!(pairs.contains(&(Some(name), Some(name_column))));

    assert_eq!(model.store_entity_sets_for(mapping, customer), vec![store_set]);

    // Mapping again reuses everything
    assert_eq!(model.map_entity_set(customers, store_set).unwrap(), mapping);
    assert_eq!(model.scalar_property_mappings(fragments[0]).len(), 2);

    let report = model.diagnose();
    assert!(!report.has_errors(), "{}", report.format_all());
}

#[test]
fn test_scalar_mapping_requires_related_fragment() {
    let mut model = shop();
    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();
    let phone = model.add_property(customer, PropertySpec::new("Phone", "String")).unwrap();

    let customers_table = model.entity_type(Section::Storage, "Customers").unwrap();
    let orders_table = model.entity_type(Section::Storage, "Orders").unwrap();
    let phone_column = model
        .add_property(customers_table, PropertySpec::new("Phone", "nvarchar"))
        .unwrap();
    let total_column = model.property(orders_table, "Total").unwrap();

    // Customers are never written to the Orders table
    assert!(matches!(
        model.add_scalar_mapping(customer, phone, total_column),
        Err(ModelError::InvalidAssociation { .. })
    ));

    let scalar = model.add_scalar_mapping(customer, phone, phone_column).unwrap();
    assert_eq!(model.mapped_property(scalar), Some(phone));
    assert_eq!(model.mapped_column(scalar), Some(phone_column));

    // A type without any set mapping
    let supplier = model.add_entity_type(Section::Conceptual, "Supplier").unwrap();
    let supplier_id = model.add_property(supplier, PropertySpec::new("Id", "Int32").key()).unwrap();
    assert!(matches!(
        model.add_scalar_mapping(supplier, supplier_id, phone_column),
        Err(ModelError::InvalidAssociation { .. })
    ));
}

#[test]
fn test_conditions_and_association_set_mappings() {
    let mut model = shop();
    let orders = model.entity_set(Section::Conceptual, "Orders").unwrap();
    let mapping = model.entity_set_mapping_of(orders).unwrap();
    let type_mapping = model.entity_type_mappings(mapping)[0];
    let fragment = model.mapping_fragments(type_mapping)[0];

    let orders_table = model.entity_type(Section::Storage, "Orders").unwrap();
    let archived = model
        .add_property(orders_table, PropertySpec::new("Archived", "bit"))
        .unwrap();
    let condition = model
        .add_condition(fragment, archived, ConditionValue::Value("0".to_string()))
        .unwrap();
    assert_eq!(model.conditions(fragment), vec![condition]);
    assert_eq!(model.condition_column(condition), Some(archived));
    assert_eq!(
        model.condition_value(condition),
        Some(ConditionValue::Value("0".to_string()))
    );

    let association_set = model
        .association_set(Section::Conceptual, "Order_Customer")
        .unwrap();
    let store_orders = model.entity_set(Section::Storage, "Orders").unwrap();
    let set_mapping = model
        .add_association_set_mapping(association_set, store_orders)
        .unwrap();
    assert_eq!(model.mapped_association_set(set_mapping), Some(association_set));
    assert_eq!(model.association_set_mapping_store_set(set_mapping), Some(store_orders));

    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();
    let customer_id = model.property(customer, "Id").unwrap();
    let foreign_key = model.property(orders_table, "CustomerId").unwrap();
    model
        .add_end_property_mapping(set_mapping, End::From, customer_id, foreign_key)
        .unwrap();

    let ends = model.end_property_mappings(set_mapping);
    let customer_end = ends.iter().find(|e| e.role == "Customer").unwrap();
    assert_eq!(
        customer_end.pairs,
        vec![("Id".to_string(), "CustomerId".to_string())]
    );
}

#[test]
fn test_association_wiring() {
    init_tracing();
    let mut model = EdmxModel::create("Shop", EdmxVersion::V3).unwrap();
    let customer = model.add_entity_type(Section::Conceptual, "Customer").unwrap();
    let customer_id = model.add_property(customer, PropertySpec::new("Id", "Int32").key()).unwrap();
    model.add_entity_set("Customers", customer).unwrap();
    let order = model.add_entity_type(Section::Conceptual, "Order").unwrap();
    model.add_property(order, PropertySpec::new("Id", "Int32").key()).unwrap();
    let order_customer = model.add_property(order, PropertySpec::new("CustomerId", "Int32")).unwrap();
    model.add_entity_set("Orders", order).unwrap();

    let association = model
        .add_association(
            AssociationSpec::new(
                "Order_Customer",
                (customer, Multiplicity::One),
                (order, Multiplicity::Many),
            )
            .key_pair(customer_id, order_customer),
        )
        .unwrap();

    assert_eq!(model.end_type(association, End::From), Some(customer));
    assert_eq!(model.end_type(association, End::To), Some(order));
    assert_eq!(model.key_member_pairs(association), vec![(customer_id, order_customer)]);

    let constraint = model.referential_constraint(association).unwrap();
    assert_eq!(constraint.principal_role, "Customer");
    assert_eq!(constraint.dependent_keys, vec!["CustomerId".to_string()]);

    let sets = model.association_sets(Section::Conceptual);
    assert_eq!(sets.len(), 1);
    assert_eq!(model.association_of_set(sets[0]), Some(association));
    let orders = model.entity_set(Section::Conceptual, "Orders").unwrap();
    assert_eq!(model.end_set(sets[0], End::To), Some(orders));

    let navigation = model.navigation_properties(customer);
    assert_eq!(names(&model, &navigation), vec!["Order"]);
    assert_eq!(model.navigation_target(navigation[0]), Some(order));
    assert_eq!(model.navigation_association(navigation[0]), Some(association));

    // Many-to-many associations carry no constraint
    assert!(matches!(
        model.add_association(
            AssociationSpec::new("Bad", (customer, Multiplicity::Many), (order, Multiplicity::Many))
                .key_pair(customer_id, order_customer)
        ),
        Err(ModelError::InvalidAssociation { .. })
    ));
}

// =============================================================================
// Rename Propagation
// =============================================================================

#[test]
fn test_order_customer_key_pair_rename() {
    let mut model = shop();
    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();
    let order = model.entity_type(Section::Conceptual, "Order").unwrap();
    let association = model.association(Section::Conceptual, "Order_Customer").unwrap();
    let customer_id = model.property(customer, "Id").unwrap();
    let order_id = model.property(order, "Id").unwrap();
    let foreign_key = model.property(order, "CustomerId").unwrap();

    model.rename(foreign_key, "ClientId").unwrap();
    model.rename(customer_id, "CustomerKey").unwrap();

    assert_eq!(model.key_member_pairs(association), vec![(customer_id, foreign_key)]);
    let constraint = model.referential_constraint(association).unwrap();
    assert_eq!(constraint.principal_keys, vec!["CustomerKey".to_string()]);
    assert_eq!(constraint.dependent_keys, vec!["ClientId".to_string()]);

    assert_eq!(model.key_names(customer), vec!["CustomerKey".to_string()]);
    assert_eq!(model.key_names(order), vec!["Id".to_string()]);
    assert_eq!(model.name(order_id), "Id");

    // Mapping fragments follow the conceptual names, columns stay put
    let orders_set = model.entity_set(Section::Conceptual, "Orders").unwrap();
    let mapping = model.entity_set_mapping_of(orders_set).unwrap();
    let type_mapping = model.entity_type_mappings(mapping)[0];
    let fragment = model.mapping_fragments(type_mapping)[0];
    let scalars = model.scalar_property_mappings(fragment);
    assert_eq!(names(&model, &scalars), vec!["Id", "ClientId", "Total"]);
    let renamed = scalars[1];
    assert_eq!(model.mapped_property(renamed), Some(foreign_key));
    assert_eq!(
        model.xml().attr(model.node_of(renamed), "ColumnName"),
        Some("CustomerId")
    );

    // The store foreign key is a different model
    let store_fk = model.association(Section::Storage, "FK_Orders_Customers").unwrap();
    let store_constraint = model.referential_constraint(store_fk).unwrap();
    assert_eq!(store_constraint.dependent_keys, vec!["CustomerId".to_string()]);

    assert!(!model.diagnose().has_errors());
}

#[test]
fn test_entity_type_rename_rewrites_references() {
    let mut model = shop();
    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();
    let customers = model.entity_set(Section::Conceptual, "Customers").unwrap();
    let association = model.association(Section::Conceptual, "Order_Customer").unwrap();
    let shape = model.shape_of(customer).unwrap();

    model.take_events();
    model.rename(customer, "Client").unwrap();

    assert_eq!(model.name(customer), "Client");
    assert_eq!(model.full_name(customer), "ShopModel.Client");
    assert_eq!(model.entity_type(Section::Conceptual, "Client"), Some(customer));
    assert_eq!(model.entity_type(Section::Conceptual, "Customer"), None);

    let set_node = model.node_of(customers);
    assert_eq!(model.xml().attr(set_node, "EntityType"), Some("ShopModel.Client"));
    assert_eq!(model.association_ends(association)[0].type_name, "ShopModel.Client");
    assert_eq!(model.xml().attr(model.node_of(shape), "EntityType"), Some("ShopModel.Client"));
    assert_eq!(model.shape_entity_type(shape), Some(customer));

    let mapping = model.entity_set_mapping_of(customers).unwrap();
    let type_mapping = model.entity_type_mappings(mapping)[0];
    assert_eq!(model.name(type_mapping), "IsTypeOf(ShopModel.Client)");
    assert_eq!(model.mapped_entity_type(type_mapping), Some(customer));

    let events = model.take_events();
    assert_eq!(
        events,
        vec![ModelEvent::NameChanged {
            object: customer.into(),
            kind: ObjectKind::EntityType,
            old_name: "Customer".to_string(),
            new_name: "Client".to_string(),
        }]
    );
}

#[test]
fn test_rename_rejects_collisions_and_bad_names() {
    let mut model = shop();
    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();

    assert!(matches!(
        model.rename(customer, "order"),
        Err(ModelError::NameCollision { kind: ObjectKind::EntityType, .. })
    ));
    // Types and associations share a namespace scope
    assert!(matches!(
        model.rename(customer, "Order_Customer"),
        Err(ModelError::NameCollision { .. })
    ));
    assert!(matches!(
        model.rename(customer, "Not Valid"),
        Err(ModelError::InvalidName { .. })
    ));
    // Changing only the case of its own name is fine
    model.rename(customer, "CUSTOMER").unwrap();
    assert_eq!(model.name(customer), "CUSTOMER");
}

#[test]
fn test_listeners_see_events() {
    let mut model = shop();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let subscription = model.subscribe(move |event| {
        sink.borrow_mut().push(event.kind());
    });

    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();
    let email = model.property(customer, "Email").unwrap();
    model.rename(email, "Mail").unwrap();
    assert_eq!(*seen.borrow(), vec![ObjectKind::Property]);

    assert!(model.unsubscribe(subscription));
    model.rename(email, "EmailAddress").unwrap();
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(model.events().len(), 2);
}

#[test]
fn test_journal_can_be_turned_off() {
    init_tracing();
    let mut config = ModelConfig::default();
    config.events.journal = false;
    let mut model = EdmxModel::parse_with(include_str!("fixtures/shop.edmx"), config).unwrap();
    let seen = Rc::new(RefCell::new(0usize));
    let sink = Rc::clone(&seen);
    model.subscribe(move |_| *sink.borrow_mut() += 1);

    let order = model.entity_type(Section::Conceptual, "Order").unwrap();
    assert!(model.remove(order).unwrap());
    assert!(*seen.borrow() > 1);
    assert!(model.events().is_empty());
    assert_eq!(model.stats().pending_events, 0);
}

// =============================================================================
// Removal
// =============================================================================

#[test]
fn test_remove_is_idempotent() {
    let mut model = shop();
    let order = model.entity_type(Section::Conceptual, "Order").unwrap();
    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();
    model.take_events();

    assert!(model.remove(order).unwrap());
    let events = model.take_events();
    let removed: Vec<_> = events.iter().map(|e| e.object()).collect();
    let distinct: HashSet<_> = removed.iter().copied().collect();
    assert_eq!(removed.len(), distinct.len());
    assert_eq!(removed.last(), Some(&ObjectId::from(order)));

    assert!(!model.remove(order).unwrap());
    assert!(model.take_events().is_empty());
    assert!(model.is_removed(order));

    assert_eq!(model.entity_type(Section::Conceptual, "Order"), None);
    let sets = model.entity_sets(Section::Conceptual);
    assert_eq!(names(&model, &sets), vec!["Customers"]);
    assert!(model.associations(Section::Conceptual).is_empty());
    assert!(model.association_sets(Section::Conceptual).is_empty());
    assert!(model.navigation_properties(customer).is_empty());
    assert_eq!(model.shapes().len(), 1);
    assert!(model.connectors().is_empty());
    let mappings = model.entity_set_mappings();
    assert_eq!(names(&model, &mappings), vec!["Customers"]);

    // Store side is untouched
    assert_eq!(model.entity_types(Section::Storage).len(), 2);
    assert!(!model.diagnose().has_errors());
}

#[test]
fn test_store_set_removal_prunes_its_sole_mapping() {
    let mut model = shop();
    let store_orders = model.entity_set(Section::Storage, "Orders").unwrap();

    assert!(model.remove(store_orders).unwrap());

    assert_eq!(model.entity_set_mapping("Orders"), None);
    assert_eq!(model.entity_set_mappings().len(), 1);
    assert!(model.association_sets(Section::Storage).is_empty());
    assert!(model.entity_set(Section::Conceptual, "Orders").is_some());

    let report = model.diagnose();
    assert!(!report.has_errors());
    let unmapped: Vec<_> = report.with_code(DiagnosticCode::UnmappedEntitySet).collect();
    assert_eq!(unmapped.len(), 1);
    assert_eq!(unmapped[0].name, "ShopEntities.Orders");
    assert_eq!(unmapped[0].severity(), Severity::Info);
}

#[test]
fn test_property_removal_scrubs_key_and_mappings() {
    let mut model = shop();
    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();
    let email = model.property(customer, "Email").unwrap();
    let customers = model.entity_set(Section::Conceptual, "Customers").unwrap();
    let mapping = model.entity_set_mapping_of(customers).unwrap();
    let type_mapping = model.entity_type_mappings(mapping)[0];
    let fragment = model.mapping_fragments(type_mapping)[0];

    assert!(model.remove(email).unwrap());
    let scalars = model.scalar_property_mappings(fragment);
    assert_eq!(names(&model, &scalars), vec!["Id", "Name"]);
    assert_eq!(model.property(customer, "Email"), None);
}

#[test]
fn test_handles_from_another_model_are_rejected() {
    let mut model = shop();
    model.diagnose();
    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();
    let phone = model.add_property(customer, PropertySpec::new("Phone", "String")).unwrap();

    let mut other = EdmxModel::create("Other", EdmxVersion::V3).unwrap();
    assert!(matches!(
        other.remove(phone),
        Err(ModelError::InvalidModelObject { kind: ObjectKind::Property, .. })
    ));
    assert!(matches!(
        other.set_nullable(phone, false),
        Err(ModelError::InvalidModelObject { .. })
    ));
    assert!(other.is_removed(phone));
    assert!(!model.is_removed(phone));
}

#[test]
fn test_property_removal_drops_conditions_on_it() {
    init_tracing();
    let xml = include_str!("fixtures/shop.edmx").replace(
        r#"<MappingFragment StoreEntitySet="Customers">"#,
        r#"<MappingFragment StoreEntitySet="Customers"><Condition Name="Email" IsNull="false" />"#,
    );
    let mut model = EdmxModel::parse(&xml).unwrap();
    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();
    let email = model.property(customer, "Email").unwrap();
    let customers = model.entity_set(Section::Conceptual, "Customers").unwrap();
    let mapping = model.entity_set_mapping_of(customers).unwrap();
    let type_mapping = model.entity_type_mappings(mapping)[0];
    let fragment = model.mapping_fragments(type_mapping)[0];
    let conditions = model.conditions(fragment);
    assert_eq!(names(&model, &conditions), vec!["Email"]);
    assert_eq!(model.condition_column(conditions[0]), None);

    assert!(model.remove(email).unwrap());
    assert!(model.conditions(fragment).is_empty());
    assert!(model.is_removed(conditions[0]));
    assert!(model
        .events()
        .iter()
        .any(|e| e.kind() == ObjectKind::MappingCondition && e.object() == conditions[0].object_id()));
    let saved = model.to_xml_string().unwrap();
    assert!(!saved.contains(r#"Condition Name="Email""#));
}

// =============================================================================
// Lazy Enumeration and Lookup
// =============================================================================

#[test]
fn test_enumeration_is_memoized() {
    let mut model = shop();
    let first = model.entity_types(Section::Conceptual);
    let queries = model.stats().collection_queries;
    let second = model.entity_types(Section::Conceptual);
    assert_eq!(first, second);
    assert_eq!(model.stats().collection_queries, queries);

    let customer = first[0];
    let via_lookup = model.property(customer, "Id").unwrap();
    let via_list = model.properties(customer)[0];
    assert_eq!(via_lookup, via_list);
    assert_eq!(model.property(customer, "Id"), Some(via_lookup));
}

#[test]
fn test_lookup_accepts_qualified_and_case_insensitive_names() {
    let mut model = shop();
    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();
    assert_eq!(model.entity_type(Section::Conceptual, "customer"), Some(customer));
    assert_eq!(model.entity_type(Section::Conceptual, "Self.Customer"), Some(customer));
    assert_eq!(model.entity_type(Section::Conceptual, "ShopModel.Customer"), Some(customer));
    assert_eq!(model.entity_type(Section::Conceptual, "Elsewhere.Customer"), None);
    assert_eq!(model.entity_type(Section::Conceptual, "Nobody"), None);

    let customers = model.entity_set(Section::Conceptual, "Customers").unwrap();
    assert_eq!(model.entity_set_of(customer), Some(customers));
    assert_eq!(model.entity_type_of_set(customers), Some(customer));
}

#[test]
fn test_inheritance_queries() {
    let mut model = shop();
    let customer = model.entity_type(Section::Conceptual, "Customer").unwrap();
    let vip = model.add_entity_type(Section::Conceptual, "VipCustomer").unwrap();
    let gold = model.add_entity_type(Section::Conceptual, "GoldCustomer").unwrap();
    model.set_base_type(vip, Some(customer)).unwrap();
    model.set_base_type(gold, Some(vip)).unwrap();
    let level = model.add_property(vip, PropertySpec::new("Level", "Int32")).unwrap();
    let vip_email = model.add_property(gold, PropertySpec::new("Email", "String")).unwrap();

    assert_eq!(model.ancestors(gold).unwrap(), vec![vip, customer]);
    assert_eq!(model.descendants(customer).unwrap(), vec![vip, gold]);
    assert_eq!(model.root_type(gold).unwrap(), customer);

    let effective = model.effective_properties(gold).unwrap();
    assert_eq!(names(&model, &effective), vec!["Id", "Name", "Email", "Level"]);
    assert!(effective.contains(&vip_email));
    assert!(effective.contains(&level));
    assert_eq!(
        model.key_properties(gold).unwrap(),
        vec![model.property(customer, "Id").unwrap()]
    );

    // Derived types are still held by the base type's set
    let customers = model.entity_set(Section::Conceptual, "Customers").unwrap();
    assert_eq!(model.entity_set_of(gold), Some(customers));

    assert!(matches!(
        model.set_base_type(customer, Some(gold)),
        Err(ModelError::InheritanceCycle { .. })
    ));
    assert!(model.inheritance_cycles().is_empty());
}

#[test]
fn test_diagram_shapes_and_connectors() {
    init_tracing();
    let mut model = EdmxModel::create("Shop", EdmxVersion::V3).unwrap();
    let customer = model.add_entity_type(Section::Conceptual, "Customer").unwrap();
    let order = model.add_entity_type(Section::Conceptual, "Order").unwrap();
    let association = model
        .add_association(
            AssociationSpec::new("Order_Customer", (customer, Multiplicity::One), (order, Multiplicity::Many))
                .without_navigation(),
        )
        .unwrap();

    let customer_shape = model.add_shape(customer, ShapeBounds::at(0.75, 0.75)).unwrap();
    model.add_shape(order, ShapeBounds::at(3.0, 0.75)).unwrap();
    assert!(matches!(
        model.add_shape(customer, ShapeBounds::default()),
        Err(ModelError::NameCollision { .. })
    ));

    let connector = model.add_connector(association).unwrap();
    assert_eq!(model.connector_association(connector), Some(association));
    assert_eq!(model.connector_points(connector).len(), 2);
    assert_eq!(model.connector_of(association), Some(connector));

    let moved = ShapeBounds {
        height: Some(2.5),
        ..ShapeBounds::at(1.0, 2.0)
    };
    model.set_shape_bounds(customer_shape, moved).unwrap();
    assert_eq!(model.shape_bounds(customer_shape), moved);

    // Removing the type removes its shape and, through the association, the connector
    model.remove(customer).unwrap();
    assert_eq!(model.shapes().len(), 1);
    assert!(model.connectors().is_empty());
}

// =============================================================================
// Diagnostics
// =============================================================================

#[test]
fn test_enumeration_records_problems_and_continues() {
    let mut model = broken();
    let types = model.entity_types(Section::Conceptual);
    assert_eq!(names(&model, &types), vec!["Product", "Chicken", "Egg", "Note"]);

    let codes: Vec<_> = model.model_errors().all().iter().map(|d| d.code).collect();
    assert!(codes.contains(&DiagnosticCode::MissingName));
    assert!(codes.contains(&DiagnosticCode::DuplicateName));

    let sets = model.entity_sets(Section::Conceptual);
    assert_eq!(names(&model, &sets), vec!["Products"]);
    assert!(model.association_sets(Section::Conceptual).is_empty());
    let associations = model.associations(Section::Conceptual);
    assert_eq!(names(&model, &associations), vec!["Mirror"]);
}

#[test]
fn test_diagnose_reports_integrity_problems() {
    let mut model = broken();
    let report = model.diagnose();
    let codes: HashSet<_> = report.all().iter().map(|d| d.code).collect();

    for expected in [
        DiagnosticCode::MissingName,
        DiagnosticCode::DuplicateName,
        DiagnosticCode::UnresolvedReference,
        DiagnosticCode::MalformedAssociation,
        DiagnosticCode::DanglingKeyReference,
        DiagnosticCode::DuplicateRole,
        DiagnosticCode::InheritanceCycle,
        DiagnosticCode::MissingKey,
        DiagnosticCode::UnmappedEntitySet,
    ] {
        assert!(codes.contains(&expected), "missing {:?} in\n{}", expected, report.format_all());
    }
    assert!(report.has_errors());
    assert_eq!(report.warning_count(), 1);

    let unresolved = report.with_code(DiagnosticCode::UnresolvedReference).count();
    assert_eq!(unresolved, 3);

    // Enumeration problems are recorded once
    let again = model.diagnose();
    assert_eq!(again.len(), report.len());

    let chicken = model.entity_type(Section::Conceptual, "Chicken").unwrap();
    assert!(matches!(
        model.ancestors(chicken),
        Err(ModelError::InheritanceCycle { .. })
    ));
}

#[test]
fn test_diagnostics_serialize() {
    let mut model = broken();
    let report = model.diagnose();
    let json = serde_json::to_value(report.all()).unwrap();
    let first = &json[0];
    assert!(first.get("code").is_some());
    assert!(first.get("message").is_some());
}

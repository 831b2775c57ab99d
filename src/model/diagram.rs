//! Designer layout: entity type shapes and association connectors

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::collection::CollectionKey;
use super::resolve::RefSlot;
use super::{typed, Association, Connector, EdmxModel, EntityType, ModelObject, ObjectKind, Section, Shape};
use crate::error::{ModelError, Result};
use crate::xml::{Fallback, NodeId};

/// Position and size of a shape, in designer inches
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    /// Absent lets the designer size the shape to its members
    pub height: Option<f64>,
    pub expanded: bool,
}

impl Default for ShapeBounds {
    fn default() -> Self {
        Self {
            x: 0.75,
            y: 0.75,
            width: 1.5,
            height: None,
            expanded: true,
        }
    }
}

impl ShapeBounds {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }
}

fn parse_number(value: Option<&str>) -> Option<f64> {
    value.and_then(|v| v.trim().parse().ok())
}

impl EdmxModel {
    /// `Name` of the diagram, when the document has one
    pub fn diagram_name(&self) -> Option<&str> {
        self.sections
            .diagram
            .and_then(|diagram| self.tree.attr(diagram, "Name"))
    }

    /// Diagram element, creating `Designer/Diagrams/Diagram` under the root when missing
    fn ensure_diagram(&mut self) -> Result<NodeId> {
        if let Some(diagram) = self.sections.diagram {
            return Ok(diagram);
        }
        let root = self.tree.root().ok_or(ModelError::MissingSection("Edmx"))?;
        let designer = match self.tree.first_child_named(root, "Designer") {
            Some(designer) => designer,
            None => {
                let created = self.new_child_element(root, "Designer", &[]);
                self.tree.append_child(root, created);
                created
            }
        };
        let diagrams = match self.tree.first_child_named(designer, "Diagrams") {
            Some(diagrams) => diagrams,
            None => {
                let created = self.new_child_element(designer, "Diagrams", &[]);
                self.tree.append_child(designer, created);
                created
            }
        };
        let name = self.namespace(Section::Conceptual).unwrap_or("Model").to_string();
        let diagram = self.new_child_element(diagrams, "Diagram", &[("Name", name.as_str())]);
        self.tree.append_child(diagrams, diagram);
        self.sections.diagram = Some(diagram);
        debug!(name = %name, "Diagram created");
        Ok(diagram)
    }

    // ------------------------------------------------------------------
    // Shapes
    // ------------------------------------------------------------------

    pub fn shapes(&mut self) -> Vec<Shape> {
        typed(self.collection(CollectionKey::section(Section::Diagram, ObjectKind::Shape)))
    }

    pub fn shape_entity_type(&mut self, shape: Shape) -> Option<EntityType> {
        let id = shape.object_id();
        self.resolve_cached(id, RefSlot::EntityType, |model| {
            let raw = model.attr_of(id, "EntityType")?;
            model.resolve_in(Section::Conceptual, ObjectKind::EntityType, &raw)
        })
        .map(EntityType::from_object_id)
    }

    pub fn shape_of(&mut self, entity_type: EntityType) -> Option<Shape> {
        self.shapes()
            .into_iter()
            .find(|shape| self.shape_entity_type(*shape) == Some(entity_type))
    }

    pub fn add_shape(&mut self, entity_type: EntityType, bounds: ShapeBounds) -> Result<Shape> {
        self.live_in(entity_type, Section::Conceptual)?;
        if self.shape_of(entity_type).is_some() {
            return Err(ModelError::NameCollision {
                kind: ObjectKind::Shape,
                name: self.full_name(entity_type),
            });
        }
        let diagram = self.ensure_diagram()?;
        let reference = self.qualified(Section::Conceptual, self.name(entity_type));
        let node = self.new_child_element(diagram, "EntityTypeShape", &[("EntityType", reference.as_str())]);
        self.write_bounds(node, &bounds);
        self.tree
            .insert_after_last(diagram, &["EntityTypeShape"], node, Fallback::First);
        let key = CollectionKey::section(Section::Diagram, ObjectKind::Shape);
        Ok(Shape::from_object_id(self.adopt(key, node)))
    }

    pub fn shape_bounds(&self, shape: Shape) -> ShapeBounds {
        let node = self.node_of(shape);
        let defaults = ShapeBounds::default();
        ShapeBounds {
            x: parse_number(self.tree.attr(node, "PointX")).unwrap_or(defaults.x),
            y: parse_number(self.tree.attr(node, "PointY")).unwrap_or(defaults.y),
            width: parse_number(self.tree.attr(node, "Width")).unwrap_or(defaults.width),
            height: parse_number(self.tree.attr(node, "Height")),
            expanded: self
                .tree
                .attr(node, "IsExpanded")
                .map_or(true, |v| !v.eq_ignore_ascii_case("false")),
        }
    }

    pub fn set_shape_bounds(&mut self, shape: Shape, bounds: ShapeBounds) -> Result<()> {
        let record = self.live(shape)?;
        self.write_bounds(record.node, &bounds);
        Ok(())
    }

    fn write_bounds(&mut self, node: NodeId, bounds: &ShapeBounds) {
        self.tree.set_attr(node, "Width", &bounds.width.to_string());
        self.tree.set_attr(node, "PointX", &bounds.x.to_string());
        self.tree.set_attr(node, "PointY", &bounds.y.to_string());
        match bounds.height {
            Some(height) => self.tree.set_attr(node, "Height", &height.to_string()),
            None => {
                self.tree.remove_attr(node, "Height");
            }
        }
        if bounds.expanded {
            self.tree.remove_attr(node, "IsExpanded");
        } else {
            self.tree.set_attr(node, "IsExpanded", "false");
        }
    }

    // ------------------------------------------------------------------
    // Connectors
    // ------------------------------------------------------------------

    pub fn connectors(&mut self) -> Vec<Connector> {
        typed(self.collection(CollectionKey::section(Section::Diagram, ObjectKind::Connector)))
    }

    pub fn connector_association(&mut self, connector: Connector) -> Option<Association> {
        let id = connector.object_id();
        self.resolve_cached(id, RefSlot::Association, |model| {
            let raw = model.attr_of(id, "Association")?;
            model.resolve_in(Section::Conceptual, ObjectKind::Association, &raw)
        })
        .map(Association::from_object_id)
    }

    pub fn connector_of(&mut self, association: Association) -> Option<Connector> {
        self.connectors()
            .into_iter()
            .find(|connector| self.connector_association(*connector) == Some(association))
    }

    /// Add a connector; when both end types have shapes it is routed from
    /// the right edge of the first to the left edge of the second
    pub fn add_connector(&mut self, association: Association) -> Result<Connector> {
        self.live_in(association, Section::Conceptual)?;
        if self.connector_of(association).is_some() {
            return Err(ModelError::NameCollision {
                kind: ObjectKind::Connector,
                name: self.full_name(association),
            });
        }
        let diagram = self.ensure_diagram()?;
        let reference = self.qualified(Section::Conceptual, self.name(association));
        let node = self.new_child_element(diagram, "AssociationConnector", &[("Association", reference.as_str())]);

        let from = self
            .end_type(association, super::End::From)
            .and_then(|t| self.shape_of(t))
            .map(|s| self.shape_bounds(s));
        let to = self
            .end_type(association, super::End::To)
            .and_then(|t| self.shape_of(t))
            .map(|s| self.shape_bounds(s));
        if let (Some(from), Some(to)) = (from, to) {
            let middle = |b: &ShapeBounds| b.y + b.height.unwrap_or(1.0) / 2.0;
            for (x, y) in [(from.x + from.width, middle(&from)), (to.x, middle(&to))] {
                let point = self.new_child_element(
                    node,
                    "ConnectorPoint",
                    &[("PointX", x.to_string().as_str()), ("PointY", y.to_string().as_str())],
                );
                self.tree.append_child(node, point);
            }
        }

        self.tree.insert_after_last(
            diagram,
            &["AssociationConnector", "EntityTypeShape"],
            node,
            Fallback::Last,
        );
        let key = CollectionKey::section(Section::Diagram, ObjectKind::Connector);
        Ok(Connector::from_object_id(self.adopt(key, node)))
    }

    pub fn connector_points(&self, connector: Connector) -> Vec<(f64, f64)> {
        self.tree
            .children_named(self.node_of(connector), "ConnectorPoint")
            .into_iter()
            .filter_map(|point| {
                Some((
                    parse_number(self.tree.attr(point, "PointX"))?,
                    parse_number(self.tree.attr(point, "PointY"))?,
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bounds() {
        let bounds = ShapeBounds::at(3.0, 1.25);
        assert_eq!(bounds.x, 3.0);
        assert_eq!(bounds.width, 1.5);
        assert!(bounds.expanded);
        assert_eq!(parse_number(Some(" 2.5 ")), Some(2.5));
        assert_eq!(parse_number(Some("wide")), None);
    }
}

//! Entity type inheritance
//!
//! `BaseType` chains are followed with an explicit visited set, so a loop in
//! the document surfaces as `InheritanceCycle` instead of recursing forever.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

use super::resolve::{names_match, RefSlot};
use super::{EdmxModel, EntityType, ModelObject, ObjectKind, Property, Section};
use crate::error::{ModelError, Result};

/// BaseType edges (base -> derived) of one section
struct InheritanceGraph {
    graph: DiGraph<EntityType, ()>,
    indices: HashMap<EntityType, NodeIndex>,
}

impl EdmxModel {
    pub fn base_type(&mut self, entity_type: EntityType) -> Option<EntityType> {
        let id = entity_type.object_id();
        let section = self.record(id).section;
        self.resolve_cached(id, RefSlot::BaseType, |model| {
            let raw = model.attr_of(id, "BaseType")?;
            model.resolve_in(section, ObjectKind::EntityType, &raw)
        })
        .map(EntityType::from_object_id)
    }

    pub(crate) fn has_base_type_attribute(&self, entity_type: EntityType) -> bool {
        self.tree.attr(self.node_of(entity_type), "BaseType").is_some()
    }

    /// Set or clear the base type; refuses to introduce a cycle
    pub fn set_base_type(&mut self, entity_type: EntityType, base: Option<EntityType>) -> Result<()> {
        let record = self.live_in(entity_type, Section::Conceptual)?;
        match base {
            Some(base) => {
                self.live_in(base, Section::Conceptual)?;
                if base == entity_type || self.ancestors(base)?.contains(&entity_type) {
                    return Err(ModelError::InheritanceCycle {
                        name: self.full_name(entity_type),
                    });
                }
                let value = self.qualified(Section::Conceptual, self.name(base));
                self.tree.set_attr(record.node, "BaseType", &value);
            }
            None => {
                self.tree.remove_attr(record.node, "BaseType");
            }
        }
        self.refs.forget(entity_type.object_id(), RefSlot::BaseType);
        Ok(())
    }

    pub fn is_abstract(&self, entity_type: EntityType) -> bool {
        self.tree
            .attr(self.node_of(entity_type), "Abstract")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn set_abstract(&mut self, entity_type: EntityType, is_abstract: bool) -> Result<()> {
        let record = self.live_in(entity_type, Section::Conceptual)?;
        if is_abstract {
            self.tree.set_attr(record.node, "Abstract", "true");
        } else {
            self.tree.remove_attr(record.node, "Abstract");
        }
        Ok(())
    }

    /// Base types, nearest first
    pub fn ancestors(&mut self, entity_type: EntityType) -> Result<Vec<EntityType>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([entity_type]);
        let mut current = entity_type;
        while let Some(base) = self.base_type(current) {
            if !seen.insert(base) {
                return Err(ModelError::InheritanceCycle {
                    name: self.full_name(entity_type),
                });
            }
            chain.push(base);
            current = base;
        }
        Ok(chain)
    }

    /// Topmost ancestor (the type itself when it has no base)
    pub fn root_type(&mut self, entity_type: EntityType) -> Result<EntityType> {
        Ok(self
            .ancestors(entity_type)?
            .last()
            .copied()
            .unwrap_or(entity_type))
    }

    /// Every type deriving from `entity_type`, breadth-first
    pub fn descendants(&mut self, entity_type: EntityType) -> Result<Vec<EntityType>> {
        let section = self.section_of(entity_type);
        let inheritance = self.inheritance_graph(section);
        let Some(&start) = inheritance.indices.get(&entity_type) else {
            return Ok(Vec::new());
        };

        let mut visited = HashSet::new();
        let mut found = Vec::new();
        let mut bfs = Bfs::new(&inheritance.graph, start);
        while let Some(index) = bfs.next(&inheritance.graph) {
            visited.insert(index);
            if index != start {
                found.push(inheritance.graph[index]);
            }
        }
        // With single inheritance a reachable loop must run back through the start
        if inheritance
            .graph
            .neighbors_directed(start, Direction::Incoming)
            .any(|base| visited.contains(&base))
        {
            return Err(ModelError::InheritanceCycle {
                name: self.full_name(entity_type),
            });
        }
        Ok(found)
    }

    /// Groups of conceptual types whose BaseType chains loop
    pub fn inheritance_cycles(&mut self) -> Vec<Vec<EntityType>> {
        let inheritance = self.inheritance_graph(Section::Conceptual);
        kosaraju_scc(&inheritance.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1
                    || inheritance
                        .graph
                        .edges_directed(scc[0], Direction::Outgoing)
                        .any(|e| e.target() == scc[0])
            })
            .map(|scc| scc.into_iter().map(|index| inheritance.graph[index]).collect())
            .collect()
    }

    /// Declared and inherited properties, base first; a derived property
    /// masks a base property of the same name in place
    pub fn effective_properties(&mut self, entity_type: EntityType) -> Result<Vec<Property>> {
        let mut chain = self.ancestors(entity_type)?;
        chain.reverse();
        chain.push(entity_type);

        let mut properties: Vec<(String, Property)> = Vec::new();
        for owner in chain {
            for property in self.properties(owner) {
                let name = self.name(property).to_string();
                match properties.iter_mut().find(|(existing, _)| names_match(existing, &name)) {
                    Some(slot) => *slot = (name, property),
                    None => properties.push((name, property)),
                }
            }
        }
        Ok(properties.into_iter().map(|(_, p)| p).collect())
    }

    /// Property visible on `entity_type` by name, searching the type then its ancestors
    pub fn effective_property(&mut self, entity_type: EntityType, name: &str) -> Option<Property> {
        if let Some(property) = self.property(entity_type, name) {
            return Some(property);
        }
        let ancestors = self.ancestors(entity_type).unwrap_or_default();
        ancestors
            .into_iter()
            .find_map(|ancestor| self.property(ancestor, name))
    }

    /// Key members, declared on the root of the hierarchy
    pub fn key_properties(&mut self, entity_type: EntityType) -> Result<Vec<Property>> {
        let root = self.root_type(entity_type)?;
        let names = self.key_names(root);
        Ok(names
            .iter()
            .filter_map(|name| self.property(root, name))
            .collect())
    }

    fn inheritance_graph(&mut self, section: Section) -> InheritanceGraph {
        let types = self.entity_types(section);
        let mut graph = DiGraph::with_capacity(types.len(), types.len());
        let mut indices = HashMap::with_capacity(types.len());
        for entity_type in &types {
            indices.insert(*entity_type, graph.add_node(*entity_type));
        }
        for entity_type in types {
            if let Some(base) = self.base_type(entity_type) {
                if let (Some(&from), Some(&to)) = (indices.get(&base), indices.get(&entity_type)) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        InheritanceGraph { graph, indices }
    }
}

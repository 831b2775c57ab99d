//! XML Document Tree
//!
//! A small owned DOM stored in an arena. Nodes are addressed by `NodeId`
//! and never move; detaching a node only unlinks it from its parent, so
//! wrappers holding a `NodeId` stay valid (they just stop being reachable
//! from the root).
//!
//! Several documents can share one arena: a side file is imported as a
//! detached subtree and written out separately.

pub mod reader;
pub mod writer;

pub use reader::parse;
pub use writer::{write_document, WriteOptions};

/// Stable index of a node in an `XmlTree`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A single attribute as written in the document (qualified name kept verbatim)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Node payload
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element {
        name: String,
        attributes: Vec<Attribute>,
    },
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed XML tree
#[derive(Debug, Clone, Default)]
pub struct XmlTree {
    nodes: Vec<Node>,
    /// Comments that precede the root element
    prolog: Vec<NodeId>,
    root: Option<NodeId>,
}

/// Split `prefix:local` into its parts
pub fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

impl XmlTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Create a detached element
    pub fn new_element(&mut self, name: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Element {
            name: name.into(),
            attributes: Vec::new(),
        })
    }

    /// Create a detached element with attributes
    pub fn new_element_with(&mut self, name: impl Into<String>, attributes: &[(&str, &str)]) -> NodeId {
        let id = self.new_element(name);
        for (key, value) in attributes {
            self.set_attr(id, key, value);
        }
        id
    }

    pub fn new_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    pub fn new_cdata(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::CData(text.into()))
    }

    pub fn new_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Comment(text.into()))
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn prolog(&self) -> &[NodeId] {
        &self.prolog
    }

    pub fn push_prolog(&mut self, id: NodeId) {
        self.prolog.push(id);
    }

    /// Keep only the prolog nodes matching `keep`
    pub fn retain_prolog(&mut self, mut keep: impl FnMut(&NodeKind) -> bool) {
        let nodes = &self.nodes;
        self.prolog.retain(|id| keep(&nodes[id.0].kind));
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element { .. })
    }

    /// Qualified element name
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.name(id).map(|n| split_qname(n).1)
    }

    pub fn prefix(&self, id: NodeId) -> Option<&str> {
        self.name(id).and_then(|n| split_qname(n).0)
    }

    /// Build a qualified name sharing the prefix of `like`
    pub fn qualified_like(&self, like: NodeId, local: &str) -> String {
        match self.prefix(like) {
            Some(prefix) => format!("{}:{}", prefix, local),
            None => local.to_string(),
        }
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Attribute by exact qualified name
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Attribute by local name, whatever its prefix (namespace declarations excluded)
    pub fn attr_local(&self, id: NodeId, local: &str) -> Option<&str> {
        self.attr(id, local).or_else(|| {
            self.attributes(id)
                .iter()
                .find(|a| {
                    let (prefix, name) = split_qname(&a.name);
                    prefix.is_some_and(|p| p != "xmlns") && name == local
                })
                .map(|a| a.value.as_str())
        })
    }

    /// Set (replace or append) an attribute
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[id.0].kind {
            match attributes.iter_mut().find(|a| a.name == name) {
                Some(existing) => existing.value = value.to_string(),
                None => attributes.push(Attribute {
                    name: name.to_string(),
                    value: value.to_string(),
                }),
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[id.0].kind {
            let index = attributes.iter().position(|a| a.name == name)?;
            return Some(attributes.remove(index).value);
        }
        None
    }

    /// Remove an attribute matched by local name (any non-xmlns prefix)
    pub fn remove_attr_local(&mut self, id: NodeId, local: &str) -> Option<String> {
        let name = self
            .attributes(id)
            .iter()
            .find(|a| {
                let (prefix, name) = split_qname(&a.name);
                name == local && prefix != Some("xmlns")
            })
            .map(|a| a.name.clone())?;
        self.remove_attr(id, &name)
    }

    /// Concatenated text/CDATA content of the direct children
    pub fn text(&self, id: NodeId) -> String {
        self.children(id)
            .iter()
            .filter_map(|c| match &self.nodes[c.0].kind {
                NodeKind::Text(t) | NodeKind::CData(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |c| self.is_element(*c))
    }

    /// Direct child elements with the given local name, in document order
    pub fn children_named(&self, id: NodeId, local: &str) -> Vec<NodeId> {
        self.child_elements(id)
            .filter(|c| self.local_name(*c) == Some(local))
            .collect()
    }

    pub fn first_child_named(&self, id: NodeId, local: &str) -> Option<NodeId> {
        self.child_elements(id)
            .find(|c| self.local_name(*c) == Some(local))
    }

    /// Follow a path of local names from `id`, taking the first match at each step
    pub fn path(&self, id: NodeId, steps: &[&str]) -> Option<NodeId> {
        steps
            .iter()
            .try_fold(id, |node, step| self.first_child_named(node, step))
    }

    /// All descendant elements of `id` (pre-order, `id` excluded)
    pub fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if !self.is_element(node) {
                continue;
            }
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Resolve the namespace URI of an element from in-scope `xmlns` declarations
    pub fn namespace_uri(&self, id: NodeId) -> Option<&str> {
        let declaration = match self.prefix(id) {
            Some(prefix) => format!("xmlns:{}", prefix),
            None => "xmlns".to_string(),
        };
        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(uri) = self.attr(node, &declaration) {
                return Some(uri);
            }
            current = self.parent(node);
        }
        None
    }

    /// Whether `id` is still reachable from `ancestor` through parent links
    pub fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
    }

    /// Insert `child` right after the last child element named `after_local`,
    /// or at `fallback` when there is none
    pub fn insert_after_last(&mut self, parent: NodeId, after_local: &[&str], child: NodeId, fallback: Fallback) {
        let position = self
            .children(parent)
            .iter()
            .rposition(|c| {
                self.local_name(*c)
                    .is_some_and(|name| after_local.contains(&name))
            });
        match (position, fallback) {
            (Some(index), _) => self.insert_child(parent, index + 1, child),
            (None, Fallback::First) => self.insert_child(parent, 0, child),
            (None, Fallback::Last) => self.append_child(parent, child),
        }
    }

    /// Unlink a node from its parent; the node itself stays in the arena
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    /// Deep-copy `node` out of `other` into this arena as a detached subtree
    pub fn import(&mut self, other: &XmlTree, node: NodeId) -> NodeId {
        let copy = self.alloc(other.kind(node).clone());
        for &child in other.children(node) {
            let child_copy = self.import(other, child);
            self.append_child(copy, child_copy);
        }
        copy
    }
}

/// Where `insert_after_last` puts a node when no sibling matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    First,
    Last,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> XmlTree {
        parse(
            r#"<a:Root xmlns:a="urn:a" xmlns="urn:default">
                <Item Name="one" a:Flag="x"/>
                <Item Name="two"><Note>hello</Note></Item>
                <Other/>
            </a:Root>"#,
        )
        .unwrap()
    }

    #[test]
    fn test_children_named_and_attributes() {
        let tree = sample();
        let root = tree.root().unwrap();
        let items = tree.children_named(root, "Item");
        assert_eq!(items.len(), 2);
        assert_eq!(tree.attr(items[0], "Name"), Some("one"));
        assert_eq!(tree.attr_local(items[0], "Flag"), Some("x"));
        assert_eq!(tree.text(tree.first_child_named(items[1], "Note").unwrap()), "hello");
    }

    #[test]
    fn test_namespace_resolution() {
        let tree = sample();
        let root = tree.root().unwrap();
        assert_eq!(tree.namespace_uri(root), Some("urn:a"));
        let other = tree.first_child_named(root, "Other").unwrap();
        assert_eq!(tree.namespace_uri(other), Some("urn:default"));
    }

    #[test]
    fn test_insert_after_last_and_detach() {
        let mut tree = sample();
        let root = tree.root().unwrap();
        let new_item = tree.new_element_with("Item", &[("Name", "three")]);
        tree.insert_after_last(root, &["Item"], new_item, Fallback::Last);
        let items = tree.children_named(root, "Item");
        assert_eq!(items.last().copied(), Some(new_item));
        assert_eq!(tree.local_name(tree.children(root)[3]), Some("Other"));

        tree.detach(new_item);
        assert_eq!(tree.children_named(root, "Item").len(), 2);
        assert!(!tree.is_within(new_item, root));
        assert_eq!(tree.attr(new_item, "Name"), Some("three"));
    }

    #[test]
    fn test_import_subtree() {
        let source = sample();
        let mut target = XmlTree::new();
        let copied = target.import(&source, source.root().unwrap());
        assert_eq!(target.name(copied), Some("a:Root"));
        assert_eq!(target.descendant_elements(copied).len(), 4);
        assert!(target.parent(copied).is_none());
    }
}

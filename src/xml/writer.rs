//! XML serialization of an `XmlTree`

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

use super::{NodeId, NodeKind, XmlTree};
use crate::error::{xml_error, Result};

/// Output formatting
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Spaces per nesting level; 0 writes everything on one line
    pub indent: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { indent: 2 }
    }
}

/// Serialize `root` (with the given prolog nodes) as a standalone document
pub fn write_document(tree: &XmlTree, prolog: &[NodeId], root: NodeId, options: &WriteOptions) -> Result<String> {
    let mut writer = if options.indent > 0 {
        Writer::new_with_indent(Vec::new(), b' ', options.indent)
    } else {
        Writer::new(Vec::new())
    };

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_error)?;
    for &node in prolog {
        write_node(&mut writer, tree, node)?;
    }
    write_node(&mut writer, tree, root)?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).map_err(xml_error)
}

fn write_node<W: Write>(writer: &mut Writer<W>, tree: &XmlTree, id: NodeId) -> Result<()> {
    match tree.kind(id) {
        NodeKind::Element { name, attributes } => {
            let mut start = BytesStart::new(name.as_str());
            for attribute in attributes {
                start.push_attribute((attribute.name.as_str(), attribute.value.as_str()));
            }
            let children = tree.children(id);
            if children.is_empty() {
                writer.write_event(Event::Empty(start)).map_err(xml_error)?;
            } else {
                writer.write_event(Event::Start(start)).map_err(xml_error)?;
                for &child in children {
                    write_node(writer, tree, child)?;
                }
                writer
                    .write_event(Event::End(BytesEnd::new(name.as_str())))
                    .map_err(xml_error)?;
            }
        }
        NodeKind::Text(text) => {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(xml_error)?;
        }
        NodeKind::CData(text) => {
            writer
                .write_event(Event::CData(BytesCData::new(text.as_str())))
                .map_err(xml_error)?;
        }
        NodeKind::Comment(text) => {
            writer
                .write_event(Event::Comment(BytesText::from_escaped(text.as_str())))
                .map_err(xml_error)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn test_write_escapes_and_reparses() {
        let source = r#"<Root a="x &amp; &quot;y&quot;"><!-- c --><Child>1 &lt; 2</Child><Empty/></Root>"#;
        let tree = parse(source).unwrap();
        let out = write_document(&tree, tree.prolog(), tree.root().unwrap(), &WriteOptions::default()).unwrap();
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(out.contains("<Empty/>"));

        let again = parse(&out).unwrap();
        let root = again.root().unwrap();
        assert_eq!(again.attr(root, "a"), Some("x & \"y\""));
        assert_eq!(again.text(again.first_child_named(root, "Child").unwrap()), "1 < 2");
    }

    #[test]
    fn test_write_without_indent_is_single_line() {
        let tree = parse("<Root><A/><B/></Root>").unwrap();
        let out = write_document(&tree, &[], tree.root().unwrap(), &WriteOptions { indent: 0 }).unwrap();
        assert_eq!(out.trim_end().lines().count(), 1);
    }
}

//! XML parsing into an `XmlTree`

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{NodeId, XmlTree};
use crate::error::{xml_error, ModelError, Result};

/// Parse a complete document. Whitespace-only text is dropped; declarations,
/// processing instructions and doctypes are not retained.
pub fn parse(input: &str) -> Result<XmlTree> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut tree = XmlTree::new();
    let mut stack: Vec<NodeId> = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                let id = element_from(&mut tree, &e)?;
                attach(&mut tree, &stack, id)?;
                stack.push(id);
            }
            Event::Empty(e) => {
                let id = element_from(&mut tree, &e)?;
                attach(&mut tree, &stack, id)?;
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(e) => {
                if let Some(&parent) = stack.last() {
                    let text = e.unescape().map_err(xml_error)?.into_owned();
                    if !text.is_empty() {
                        let id = tree.new_text(text);
                        tree.append_child(parent, id);
                    }
                }
            }
            Event::CData(e) => {
                if let Some(&parent) = stack.last() {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    let id = tree.new_cdata(text);
                    tree.append_child(parent, id);
                }
            }
            Event::Comment(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                let id = tree.new_comment(text);
                match stack.last() {
                    Some(&parent) => tree.append_child(parent, id),
                    // Comments after the root element are dropped
                    None if tree.root().is_none() => tree.push_prolog(id),
                    None => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ModelError::Xml("unexpected end of document: unclosed element".to_string()));
    }
    if tree.root().is_none() {
        return Err(ModelError::Xml("document has no root element".to_string()));
    }
    Ok(tree)
}

fn element_from(tree: &mut XmlTree, start: &BytesStart<'_>) -> Result<NodeId> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let id = tree.new_element(name);
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_error)?;
        tree.set_attr(id, &key, &value);
    }
    Ok(id)
}

fn attach(tree: &mut XmlTree, stack: &[NodeId], id: NodeId) -> Result<()> {
    match stack.last() {
        Some(&parent) => tree.append_child(parent, id),
        None if tree.root().is_none() => tree.set_root(id),
        None => return Err(ModelError::Xml("document has more than one root element".to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::NodeKind;

    #[test]
    fn test_parse_prolog_comment_and_text() {
        let tree = parse(
            "<?xml version=\"1.0\"?>\n<!-- header -->\n<Root><A x=\"1 &amp; 2\">t &lt; u</A></Root>",
        )
        .unwrap();
        assert_eq!(tree.prolog().len(), 1);
        assert_eq!(tree.kind(tree.prolog()[0]), &NodeKind::Comment(" header ".to_string()));

        let root = tree.root().unwrap();
        let a = tree.first_child_named(root, "A").unwrap();
        assert_eq!(tree.attr(a, "x"), Some("1 & 2"));
        assert_eq!(tree.text(a), "t < u");
    }

    #[test]
    fn test_parse_rejects_missing_root() {
        assert!(parse("<!-- nothing here -->").is_err());
    }

    #[test]
    fn test_parse_rejects_mismatched_tags() {
        assert!(parse("<Root><A></B></Root>").is_err());
    }
}

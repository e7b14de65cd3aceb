//! Small helpers over the html5ever reference-counted DOM.

use anyhow::{Context, Result};
use html5ever::parse_document;
use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{StrTendril, TendrilSink};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};

pub fn parse_html(html: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(html)
}

pub fn serialize_document(document: &Handle) -> Result<String> {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = document.clone().into();
    serialize(&mut buf, &serializable, SerializeOpts::default())
        .context("Failed to serialize document")?;
    String::from_utf8(buf).context("Serialized document is not valid UTF-8")
}

pub fn element_name(node: &Handle) -> Option<&str> {
    match node.data {
        NodeData::Element { ref name, .. } => Some(&*name.local),
        _ => None,
    }
}

/// All elements named `name` below `node`, in document order.
pub fn find_elements(node: &Handle, name: &str) -> Vec<Handle> {
    let mut found = Vec::new();
    collect_elements(node, &|n| element_name(n) == Some(name), &mut found);
    found
}

/// All elements below `node` carrying attribute `attr`, in document order.
pub fn find_elements_with_attr(node: &Handle, attr: &str) -> Vec<Handle> {
    let mut found = Vec::new();
    collect_elements(node, &|n| get_attr(n, attr).is_some(), &mut found);
    found
}

fn collect_elements(node: &Handle, matches: &dyn Fn(&Handle) -> bool, found: &mut Vec<Handle>) {
    for child in node.children.borrow().iter() {
        if element_name(child).is_some() && matches(child) {
            found.push(child.clone());
        }
        collect_elements(child, matches, found);
    }
}

pub fn get_attr(node: &Handle, attr: &str) -> Option<String> {
    match node.data {
        NodeData::Element { ref attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == attr)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

/// Overwrites an existing attribute. Returns false when the node has no
/// such attribute.
pub fn set_attr(node: &Handle, attr: &str, value: &str) -> bool {
    match node.data {
        NodeData::Element { ref attrs, .. } => {
            match attrs.borrow_mut().iter_mut().find(|a| &*a.name.local == attr) {
                Some(existing) => {
                    existing.value = StrTendril::from_slice(value);
                    true
                }
                None => false,
            }
        }
        _ => false,
    }
}

/// Concatenated text of the direct text children, e.g. a `<style>` body.
pub fn text_content(node: &Handle) -> String {
    let mut text = String::new();
    for child in node.children.borrow().iter() {
        if let NodeData::Text { ref contents } = child.data {
            text.push_str(&contents.borrow());
        }
    }
    text
}

/// Replaces the direct text children with a single text node holding
/// `text`. Nodes without text children are left alone.
pub fn set_text_content(node: &Handle, text: &str) {
    let mut children = node.children.borrow_mut();
    let mut replaced = false;
    children.retain(|child| match child.data {
        NodeData::Text { ref contents } => {
            if replaced {
                return false;
            }
            *contents.borrow_mut() = StrTendril::from_slice(text);
            replaced = true;
            true
        }
        _ => true,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_and_rewrites_attributes() {
        let dom = parse_html(r#"<html><head><link rel="stylesheet" href="a.css"></head><body><img src="x.png"></body></html>"#);

        let links = find_elements(&dom.document, "link");
        assert_eq!(links.len(), 1);
        assert_eq!(get_attr(&links[0], "href").as_deref(), Some("a.css"));

        assert!(set_attr(&links[0], "href", "/theme/a.css"));
        assert!(!set_attr(&links[0], "title", "nope"));

        let html = serialize_document(&dom.document).unwrap();
        assert!(html.contains(r#"href="/theme/a.css""#));
        assert!(!html.contains("title="));
    }

    #[test]
    fn rewrites_style_text() {
        let dom = parse_html("<html><head><style>body { color: red; }</style></head><body></body></html>");
        let styles = find_elements(&dom.document, "style");

        assert_eq!(text_content(&styles[0]), "body { color: red; }");
        set_text_content(&styles[0], "body { color: blue; }");

        let html = serialize_document(&dom.document).unwrap();
        assert!(html.contains("<style>body { color: blue; }</style>"));
    }

    #[test]
    fn finds_elements_with_attribute() {
        let dom = parse_html(r#"<body><div style="color: red"><p style="x">t</p></div><span>n</span></body>"#);
        let styled = find_elements_with_attr(&dom.document, "style");
        assert_eq!(styled.len(), 2);
        assert_eq!(element_name(&styled[0]), Some("div"));
    }
}

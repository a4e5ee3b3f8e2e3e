//! Small element tree over quick-xml events.
//!
//! Element and attribute names are stored by local name, so namespaced build
//! descriptors and plain rule files are queried the same way.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid XML: {message}")]
pub struct XmlError {
    pub message: String,
}

impl XmlError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader.read_event().map_err(|err| {
                XmlError::new(format!("at byte {}: {err}", reader.buffer_position()))
            })?;
            match event {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::new("unexpected closing tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map_err(|err| XmlError::new(err.to_string()))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&value);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::new(format!("unclosed element <{}>", open.name)));
        }
        root.ok_or_else(|| XmlError::new("document has no root element"))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn text(&self) -> &str {
        self.text.trim()
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(Element::text)
    }

    /// First element reached by following `path` one child name at a time.
    pub fn find(&self, path: &[&str]) -> Option<&Element> {
        let mut current = self;
        for segment in path {
            current = current.child(segment)?;
        }
        Some(current)
    }

    /// Every element reached by following `path`, in document order.
    pub fn find_all(&self, path: &[&str]) -> Vec<&Element> {
        let mut current = vec![self];
        for segment in path {
            current = current
                .into_iter()
                .flat_map(|element| element.children_named(segment))
                .collect();
        }
        current
    }

    /// Every descendant (excluding `self`) in document order.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut pending = self.children.iter().rev().collect::<Vec<_>>();
        while let Some(element) = pending.pop() {
            out.push(element);
            pending.extend(element.children.iter().rev());
        }
        out
    }

    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        self.descendants()
            .into_iter()
            .filter(|element| element.name == name)
            .collect()
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, XmlError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|err| XmlError::new(err.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|err| XmlError::new(err.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        ..Element::default()
    })
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlError::new("document has more than one root element"));
    }
    *root = Some(element);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespaced_document_by_local_name() {
        let xml = r#"<?xml version="1.0"?>
<m:project xmlns:m="http://maven.apache.org/POM/4.0.0">
  <m:groupId>org.example</m:groupId>
  <m:build><m:plugins>
    <m:plugin><m:artifactId>a</m:artifactId></m:plugin>
    <m:plugin><m:artifactId>b</m:artifactId></m:plugin>
  </m:plugins></m:build>
</m:project>"#;
        let root = Element::parse(xml).expect("parse");
        assert_eq!(root.name, "project");
        assert_eq!(root.child_text("groupId"), Some("org.example"));

        let artifacts = root
            .find_all(&["build", "plugins", "plugin", "artifactId"])
            .into_iter()
            .map(Element::text)
            .collect::<Vec<_>>();
        assert_eq!(artifacts, vec!["a", "b"]);
        assert_eq!(root.descendants_named("plugin").len(), 2);
    }

    #[test]
    fn reads_attributes_and_entities() {
        let root = Element::parse(r#"<rule ref="a&amp;b"><exclude name="X"/>1 &lt; 2</rule>"#)
            .expect("parse");
        assert_eq!(root.attribute("ref"), Some("a&b"));
        assert_eq!(root.child("exclude").and_then(|e| e.attribute("name")), Some("X"));
        assert_eq!(root.text(), "1 < 2");
    }

    #[test]
    fn rejects_broken_documents() {
        assert!(Element::parse("<project><build></project>").is_err());
        assert!(Element::parse("<project>").is_err());
        assert!(Element::parse("   ").is_err());
        assert!(Element::parse("<a/><b/>").is_err());
    }
}

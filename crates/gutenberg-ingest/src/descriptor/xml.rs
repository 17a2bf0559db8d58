// Namespace-resolved element tree
//
// RDF descriptors are small (a few KB) so they are loaded into a minimal
// in-memory tree and queried with ElementTree-style paths instead of being
// processed as an event stream. Names are compared as (namespace URI, local
// name) pairs, never by prefix.

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;

use crate::error::DescriptorError;

pub const PGTERMS: &str = "http://www.gutenberg.org/2009/pgterms/";
pub const DCTERMS: &str = "http://purl.org/dc/terms/";
pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

/// A (namespace URI, local name) pair
pub type Tag<'a> = (&'a str, &'a str);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<Attribute>,
    /// Concatenated character data directly inside this element
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// Parse a document and return its root element
    pub fn parse(document: &str) -> Result<Element, DescriptorError> {
        let mut reader = NsReader::from_str(document);
        reader.config_mut().trim_text(true);

        // stack[0] is a synthetic document node
        let mut stack: Vec<Element> = vec![Element::default()];

        loop {
            let (resolved, event) = reader.read_resolved_event()?;
            let namespace = namespace_of(resolved)?;

            match event {
                Event::Start(start) => {
                    let element = Element::open(&reader, namespace, &start)?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = Element::open(&reader, namespace, &start)?;
                    push_child(&mut stack, element)?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(unbalanced)?;
                    push_child(&mut stack, element)?;
                }
                Event::Text(text) => {
                    let text = text.unescape()?;
                    append_text(&mut stack, &text)?;
                }
                Event::CData(cdata) => {
                    let text = String::from_utf8_lossy(&cdata).into_owned();
                    append_text(&mut stack, &text)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if stack.len() != 1 {
            return Err(DescriptorError::Malformed(
                "document ended inside an open element".into(),
            ));
        }

        let mut document_node = stack.pop().ok_or_else(unbalanced)?;
        match document_node.children.len() {
            1 => Ok(document_node.children.remove(0)),
            0 => Err(DescriptorError::Malformed("document has no root element".into())),
            _ => Err(DescriptorError::Malformed(
                "document has more than one root element".into(),
            )),
        }
    }

    fn open(
        reader: &NsReader<&[u8]>,
        namespace: Option<String>,
        start: &quick_xml::events::BytesStart<'_>,
    ) -> Result<Element, DescriptorError> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }
            let (resolved, local) = reader.resolve_attribute(attr.key);
            let namespace = namespace_of(resolved)?;
            attributes.push(Attribute {
                namespace,
                name: String::from_utf8_lossy(local.as_ref()).into_owned(),
                value: attr.unescape_value()?.into_owned(),
            });
        }

        Ok(Element {
            namespace,
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    pub fn is(&self, (namespace, name): Tag<'_>) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    /// Value of a namespaced attribute
    pub fn attribute(&self, (namespace, name): Tag<'_>) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name && a.namespace.as_deref() == Some(namespace))
            .map(|a| a.value.as_str())
    }

    /// Character data, or None when empty
    pub fn text(&self) -> Option<&str> {
        if self.text.is_empty() {
            None
        } else {
            Some(&self.text)
        }
    }

    /// All elements below this one in document order
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        for child in &self.children {
            out.push(child);
            out.extend(child.descendants());
        }
        out
    }

    /// Equivalent of ElementTree's `findall(".//a/b/c")`: the first step
    /// matches any descendant, every further step matches direct children.
    pub fn find_all(&self, path: &[Tag<'_>]) -> Vec<&Element> {
        let Some((first, rest)) = path.split_first() else {
            return Vec::new();
        };

        let mut current: Vec<&Element> = self
            .descendants()
            .into_iter()
            .filter(|e| e.is(*first))
            .collect();

        for step in rest {
            current = current
                .into_iter()
                .flat_map(|e| e.children.iter().filter(|c| c.is(*step)))
                .collect();
        }
        current
    }

    /// First match of [`Element::find_all`]
    pub fn find(&self, path: &[Tag<'_>]) -> Option<&Element> {
        self.find_all(path).into_iter().next()
    }

    /// Text of the first match
    pub fn find_text(&self, path: &[Tag<'_>]) -> Option<&str> {
        self.find(path).and_then(Element::text)
    }
}

fn namespace_of(resolved: ResolveResult<'_>) -> Result<Option<String>, DescriptorError> {
    match resolved {
        ResolveResult::Bound(Namespace(ns)) => Ok(Some(String::from_utf8_lossy(ns).into_owned())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(DescriptorError::Malformed(format!(
            "undeclared namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

fn push_child(stack: &mut [Element], element: Element) -> Result<(), DescriptorError> {
    let parent = stack.last_mut().ok_or_else(unbalanced)?;
    parent.children.push(element);
    Ok(())
}

fn append_text(stack: &mut [Element], text: &str) -> Result<(), DescriptorError> {
    if stack.len() == 1 {
        if text.trim().is_empty() {
            return Ok(());
        }
        return Err(DescriptorError::Malformed(
            "character data outside the root element".into(),
        ));
    }
    let current = stack.last_mut().ok_or_else(unbalanced)?;
    current.text.push_str(text);
    Ok(())
}

fn unbalanced() -> DescriptorError {
    DescriptorError::Malformed("unbalanced element nesting".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:pgterms="http://www.gutenberg.org/2009/pgterms/">
  <pgterms:ebook rdf:about="ebooks/84">
    <pgterms:bookshelf>
      <rdf:Description><rdf:value>Gothic Fiction</rdf:value></rdf:Description>
    </pgterms:bookshelf>
    <pgterms:bookshelf>
      <rdf:Description><rdf:value>Science Fiction &amp; Fantasy</rdf:value></rdf:Description>
    </pgterms:bookshelf>
  </pgterms:ebook>
</rdf:RDF>"#;

    #[test]
    fn test_resolves_namespaces_and_attributes() {
        let root = Element::parse(DOC).unwrap();
        assert!(root.is((RDF, "RDF")));

        let ebook = root.find(&[(PGTERMS, "ebook")]).unwrap();
        assert_eq!(ebook.attribute((RDF, "about")), Some("ebooks/84"));
        assert_eq!(ebook.attribute((PGTERMS, "about")), None);
    }

    #[test]
    fn test_path_query_descends_then_follows_children() {
        let root = Element::parse(DOC).unwrap();
        let values: Vec<_> = root
            .find_all(&[(PGTERMS, "bookshelf"), (RDF, "Description"), (RDF, "value")])
            .into_iter()
            .filter_map(Element::text)
            .collect();
        assert_eq!(values, vec!["Gothic Fiction", "Science Fiction & Fantasy"]);

        // second step must be a direct child
        assert!(root.find(&[(PGTERMS, "ebook"), (RDF, "value")]).is_none());
    }

    #[test]
    fn test_prefix_does_not_matter() {
        let doc = r#"<x:root xmlns:x="http://www.w3.org/1999/02/22-rdf-syntax-ns#"><x:value>v</x:value></x:root>"#;
        let root = Element::parse(doc).unwrap();
        assert_eq!(root.find_text(&[(RDF, "value")]), Some("v"));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(
            Element::parse("<a><b></a>"),
            Err(DescriptorError::Malformed(_))
        ));
        assert!(matches!(
            Element::parse("<a><b>"),
            Err(DescriptorError::Malformed(_))
        ));
        assert!(matches!(
            Element::parse("not xml at all"),
            Err(DescriptorError::Malformed(_))
        ));
        assert!(matches!(
            Element::parse("<p:a/>"),
            Err(DescriptorError::Malformed(_))
        ));
    }
}

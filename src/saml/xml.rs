//! Namespace-aware XML tree with canonical serialization.
//!
//! Signed SAML messages are verified against their canonical form, so the
//! tree keeps exactly what canonicalization needs: qualified names, the
//! namespace bindings in scope, normalized attribute values and text.
//! Comments and processing instructions are dropped; DTDs are refused.

use std::collections::BTreeMap;

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Syntax(String),

    #[error("document type declarations are not accepted")]
    DocType,

    #[error("unbound namespace prefix: {0}")]
    UnboundPrefix(String),

    #[error("document has no root element")]
    Empty,
}

fn syntax(e: impl std::fmt::Display) -> XmlError {
    XmlError::Syntax(e.to_string())
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Element {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    /// Bindings in scope, declared here or inherited. `""` is the default
    /// namespace; an empty URI means undeclared.
    scope: BTreeMap<String, String>,
}

impl Element {
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.local == local && self.namespace() == Some(namespace)
    }

    /// Value of an unqualified attribute.
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.prefix.is_none() && a.local == local)
            .map(|a| a.value.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.is(namespace, local))
    }

    pub fn child(&self, namespace: &str, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(namespace, local))
    }

    /// Concatenated character data of the direct children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Every `ID` attribute value in the subtree, in document order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids<'a>(&'a self, ids: &mut Vec<&'a str>) {
        if let Some(id) = self.attribute("ID") {
            ids.push(id);
        }
        for element in self.elements() {
            element.collect_ids(ids);
        }
    }

    fn push_text(&mut self, text: String) {
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(&text);
        } else {
            self.children.push(Node::Text(text));
        }
    }
}

/// Parse a document into its root element.
pub fn parse(xml: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event().map_err(syntax)? {
            Event::Start(start) => {
                let element = open_element(&start, stack.last().map(|e| &e.scope))?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = open_element(&start, stack.last().map(|e| &e.scope))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| syntax("unexpected closing tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let raw = std::str::from_utf8(&text).map_err(syntax)?;
                match stack.last_mut() {
                    Some(parent) => {
                        let normalized = normalize_newlines(raw);
                        let value = unescape(&normalized).map_err(syntax)?;
                        parent.push_text(value.into_owned());
                    }
                    None if raw.trim().is_empty() => {}
                    None => return Err(syntax("text outside the root element")),
                }
            }
            Event::CData(data) => {
                let raw = std::str::from_utf8(&data).map_err(syntax)?;
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| syntax("CDATA outside the root element"))?;
                parent.push_text(normalize_newlines(raw));
            }
            Event::DocType(_) => return Err(XmlError::DocType),
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) => {}
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(syntax("unclosed element"));
    }
    root.ok_or(XmlError::Empty)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_some() => return Err(syntax("more than one root element")),
        None => *root = Some(element),
    }
    Ok(())
}

fn open_element(
    start: &BytesStart,
    parent: Option<&BTreeMap<String, String>>,
) -> Result<Element, XmlError> {
    let mut scope = parent.cloned().unwrap_or_default();
    let mut plain = Vec::new();

    for attribute in start.attributes() {
        let attribute = attribute.map_err(syntax)?;
        let key = std::str::from_utf8(attribute.key.as_ref()).map_err(syntax)?;
        let raw = std::str::from_utf8(&attribute.value).map_err(syntax)?;
        let value = attribute_value(raw)?;

        if key == "xmlns" {
            scope.insert(String::new(), value);
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.insert(prefix.to_string(), value);
        } else {
            plain.push((key.to_string(), value));
        }
    }

    let qname = start.name();
    let name = std::str::from_utf8(qname.as_ref()).map_err(syntax)?;
    let (prefix, local) = split_name(name);
    let namespace = resolve(&scope, prefix.as_deref())?;

    let mut attributes = Vec::with_capacity(plain.len());
    for (key, value) in plain {
        let (prefix, local) = split_name(&key);
        // Unprefixed attributes are in no namespace, whatever the default.
        let namespace = match prefix.as_deref() {
            Some(p) => resolve(&scope, Some(p))?,
            None => None,
        };
        attributes.push(Attribute {
            prefix,
            local,
            namespace,
            value,
        });
    }

    Ok(Element {
        prefix,
        local,
        namespace,
        attributes,
        children: Vec::new(),
        scope,
    })
}

fn split_name(name: &str) -> (Option<String>, String) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, name.to_string()),
    }
}

fn resolve(
    scope: &BTreeMap<String, String>,
    prefix: Option<&str>,
) -> Result<Option<String>, XmlError> {
    match prefix {
        Some("xml") => Ok(Some(XML_NAMESPACE.to_string())),
        Some(prefix) => scope
            .get(prefix)
            .filter(|uri| !uri.is_empty())
            .cloned()
            .map(Some)
            .ok_or_else(|| XmlError::UnboundPrefix(prefix.to_string())),
        None => Ok(scope.get("").filter(|uri| !uri.is_empty()).cloned()),
    }
}

fn normalize_newlines(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// Attribute-value normalization: literal whitespace becomes a space before
/// references are expanded.
fn attribute_value(raw: &str) -> Result<String, XmlError> {
    let spaced: String = normalize_newlines(raw)
        .chars()
        .map(|c| if matches!(c, '\t' | '\n') { ' ' } else { c })
        .collect();
    Ok(unescape(&spaced).map_err(syntax)?.into_owned())
}

/// Canonical XML flavour used by a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Canonicalization {
    /// Canonical XML 1.0, without comments.
    Inclusive,
    /// Exclusive XML canonicalization 1.0, without comments.
    Exclusive,
}

/// Serialize `apex` in canonical form, leaving out the `exclude` subtree.
///
/// `inclusive_prefixes` is the exclusive method's InclusiveNamespaces
/// PrefixList; `#default` names the default namespace.
pub fn canonicalize(
    apex: &Element,
    method: Canonicalization,
    inclusive_prefixes: &[String],
    exclude: Option<&Element>,
) -> String {
    let mut out = String::new();
    let writer = CanonicalWriter {
        method,
        inclusive_prefixes: inclusive_prefixes
            .iter()
            .map(|p| if p == "#default" { String::new() } else { p.clone() })
            .collect(),
        exclude,
    };
    writer.element(apex, &BTreeMap::new(), &mut out);
    out
}

struct CanonicalWriter<'a> {
    method: Canonicalization,
    inclusive_prefixes: Vec<String>,
    exclude: Option<&'a Element>,
}

impl CanonicalWriter<'_> {
    fn element(&self, element: &Element, rendered: &BTreeMap<String, String>, out: &mut String) {
        let mut declarations = BTreeMap::new();
        for (prefix, uri) in self.candidate_bindings(element) {
            if !prefix.is_empty() && uri.is_empty() {
                continue;
            }
            let current = rendered.get(&prefix).map(String::as_str).unwrap_or("");
            if current != uri {
                declarations.insert(prefix, uri);
            }
        }

        let name = qualified(element.prefix.as_deref(), &element.local);
        out.push('<');
        out.push_str(&name);
        for (prefix, uri) in &declarations {
            if prefix.is_empty() {
                out.push_str(" xmlns=\"");
            } else {
                out.push_str(" xmlns:");
                out.push_str(prefix);
                out.push_str("=\"");
            }
            escape_attribute(uri, out);
            out.push('"');
        }

        let mut attributes: Vec<&Attribute> = element.attributes.iter().collect();
        attributes.sort_by(|a, b| {
            let a_ns = a.namespace.as_deref().unwrap_or("");
            let b_ns = b.namespace.as_deref().unwrap_or("");
            (a_ns, a.local.as_str()).cmp(&(b_ns, b.local.as_str()))
        });
        for attribute in attributes {
            out.push(' ');
            out.push_str(&qualified(attribute.prefix.as_deref(), &attribute.local));
            out.push_str("=\"");
            escape_attribute(&attribute.value, out);
            out.push('"');
        }
        out.push('>');

        let mut context = rendered.clone();
        context.extend(declarations);

        for node in &element.children {
            match node {
                Node::Text(text) => escape_text(text, out),
                Node::Element(child) => {
                    if self.exclude.is_some_and(|excluded| std::ptr::eq(excluded, child)) {
                        continue;
                    }
                    self.element(child, &context, out);
                }
            }
        }

        out.push_str("</");
        out.push_str(&name);
        out.push('>');
    }

    fn candidate_bindings(&self, element: &Element) -> Vec<(String, String)> {
        match self.method {
            Canonicalization::Inclusive => element
                .scope
                .iter()
                .map(|(p, u)| (p.clone(), u.clone()))
                .collect(),
            Canonicalization::Exclusive => {
                let mut prefixes = vec![element.prefix.clone().unwrap_or_default()];
                prefixes.extend(
                    element
                        .attributes
                        .iter()
                        .filter_map(|a| a.prefix.clone())
                        .filter(|p| p != "xml"),
                );
                prefixes.extend(
                    self.inclusive_prefixes
                        .iter()
                        .filter(|p| element.scope.contains_key(*p))
                        .cloned(),
                );
                prefixes.sort();
                prefixes.dedup();
                prefixes
                    .into_iter()
                    .map(|p| {
                        let uri = element.scope.get(&p).cloned().unwrap_or_default();
                        (p, uri)
                    })
                    .collect()
            }
        }
    }
}

fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}:{}", prefix, local),
        None => local.to_string(),
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

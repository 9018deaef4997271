//! Namespace normalization for NX-API replies.
//!
//! Replies to some show commands carry prefixed elements
//! (`<nf:rpc-reply>`, `<nf:data>`). Both helpers here leave a document that
//! can be queried with plain local names.
use crate::error::{NxapiClientError, NxapiClientResult};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::OnceLock;
use xmltree::{Element, XMLNode};

type Scope = HashMap<String, String>;

fn prefixed_tag() -> &'static Regex {
    static PREFIXED_TAG: OnceLock<Regex> = OnceLock::new();
    PREFIXED_TAG.get_or_init(|| {
        Regex::new(r"<(/?)[A-Za-z_][A-Za-z0-9_.\-]*:").expect("valid prefixed tag pattern")
    })
}

/// Rewrites `<prefix:local ...>` and `</prefix:local>` to their local
/// names. Attributes and text content are left as they are.
pub fn strip_namespaces(xml: &str) -> Cow<'_, str> {
    prefixed_tag().replace_all(xml, "<${1}")
}

/// Tree variant of [`strip_namespaces`]: drops prefix, namespace URI and
/// namespace declarations from every element.
pub fn strip_element_namespaces(element: &mut Element) {
    element.prefix = None;
    element.namespace = None;
    element.namespaces = None;
    for child in element.children.iter_mut() {
        if let XMLNode::Element(child) = child {
            strip_element_namespaces(child);
        }
    }
}

/// Builds an element tree, recovering where the device output is not
/// well-formed: mismatched or missing end tags are closed implicitly, stray
/// `&` in text is kept literally and undeclared prefixes are accepted.
/// Fails only when no root element can be read at all.
pub fn parse_element(xml: &str) -> NxapiClientResult<Element> {
    let mut reader = Reader::from_str(xml.trim());
    reader.check_end_names(false);

    let mut stack: Vec<(Element, Scope)> = Vec::new();
    let mut root: Option<Element> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let opened = start_element(&start, stack.last().map(|(_, scope)| scope));
                stack.push(opened);
            }
            Ok(Event::Empty(start)) => {
                let (element, _) = start_element(&start, stack.last().map(|(_, scope)| scope));
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(end)) => {
                let name = lossy(end.name().local_name().as_ref());
                if stack.iter().any(|(element, _)| element.name == name) {
                    while let Some((element, _)) = stack.pop() {
                        let closed = element.name == name;
                        attach(&mut stack, &mut root, element);
                        if closed {
                            break;
                        }
                    }
                }
            }
            Ok(Event::Text(text)) => {
                let text = lenient_unescape(&lossy(&text));
                if let Some((parent, _)) = stack.last_mut() {
                    if !text.trim().is_empty() {
                        parent.children.push(XMLNode::Text(text));
                    }
                }
            }
            Ok(Event::CData(data)) => {
                if let Some((parent, _)) = stack.last_mut() {
                    parent.children.push(XMLNode::CData(lossy(&data)));
                }
            }
            Ok(Event::Comment(comment)) => {
                if let Some((parent, _)) = stack.last_mut() {
                    parent.children.push(XMLNode::Comment(lossy(&comment)));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                if stack.is_empty() && root.is_none() {
                    return Err(NxapiClientError::Xml(err));
                }
                break;
            }
        }
    }
    while let Some((element, _)) = stack.pop() {
        attach(&mut stack, &mut root, element);
    }

    root.ok_or_else(|| NxapiClientError::MalformedResponse("no root element".to_string()))
}

fn start_element(start: &BytesStart<'_>, parent: Option<&Scope>) -> (Element, Scope) {
    let name = start.name();
    let mut element = Element::new(&lossy(name.local_name().as_ref()));
    element.prefix = name.prefix().map(|prefix| lossy(prefix.as_ref()));

    let mut scope = parent.cloned().unwrap_or_default();
    let mut attributes = start.attributes();
    attributes.with_checks(false);
    for attribute in attributes.flatten() {
        let key = lossy(attribute.key.as_ref());
        let value = lenient_unescape(&lossy(&attribute.value));
        if key == "xmlns" {
            scope.insert(String::new(), value);
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.insert(prefix.to_string(), value);
        } else {
            let local = lossy(attribute.key.local_name().as_ref());
            element.attributes.insert(local, value);
        }
    }
    element.namespace = scope
        .get(element.prefix.as_deref().unwrap_or_default())
        .cloned();

    (element, scope)
}

fn attach(stack: &mut [(Element, Scope)], root: &mut Option<Element>, element: Element) {
    if let Some((parent, _)) = stack.last_mut() {
        parent.children.push(XMLNode::Element(element));
    } else if root.is_none() {
        *root = Some(element);
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Resolves the entity references it recognises and keeps any other `&`
/// as a literal character.
fn lenient_unescape(raw: &str) -> String {
    if let Ok(text) = unescape(raw) {
        return text.into_owned();
    }
    let mut text = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        text.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let end = rest[1..]
            .find(|c: char| c == ';' || c == '&' || c == '<' || c.is_whitespace())
            .map(|i| i + 1);
        if let Some(end) = end.filter(|&end| rest[end..].starts_with(';')) {
            if let Ok(decoded) = unescape(&rest[..=end]) {
                text.push_str(&decoded);
                rest = &rest[end + 1..];
                continue;
            }
        }
        text.push('&');
        rest = &rest[1..];
    }
    text.push_str(rest);
    text
}

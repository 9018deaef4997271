use crate::error::{NxapiClientError, NxapiClientResult};
use crate::message::{DecodeMode, ResolvedFormatting};
use crate::namespace::{parse_element, strip_element_namespaces, strip_namespaces};
use crate::STATUS_OK;
use core::fmt;
use core::fmt::Display;
use log::{error, trace};
use serde_derive::Deserialize;
use serde_json::Value;
use std::borrow::Cow;
use xmltree::{Element, XMLNode};

/// Output payload of a single command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Xml(Element),
    Text(String),
    Json(Value),
}

impl CommandOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CommandOutput::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            CommandOutput::Xml(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            CommandOutput::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Result of one command in a batch. `output` is `None` when the device
/// returned no body for the command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub ok: bool,
    pub command: String,
    pub output: Option<CommandOutput>,
}

/// `<clierror>` elements found in a reply. Any of them fails the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CliErrors(pub Vec<Element>);

impl CliErrors {
    pub fn elements(&self) -> &[Element] {
        &self.0
    }

    pub fn messages(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|element| text_content(element).trim().to_string())
            .collect()
    }
}

impl Display for CliErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages().join("\n"))
    }
}

#[derive(Debug, Deserialize)]
struct JsonReply {
    ins_api: JsonInsApi,
}

#[derive(Debug, Deserialize)]
struct JsonInsApi {
    outputs: JsonOutputs,
}

#[derive(Debug, Deserialize)]
struct JsonOutputs {
    output: OneOrMany<JsonOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonOutput {
    code: String,
    #[serde(default)]
    input: String,
    #[serde(default)]
    body: Option<Value>,
}

/// Decodes a reply body into one result per submitted command, in
/// submission order.
pub fn decode(
    raw: &str,
    formatting: &ResolvedFormatting,
    strip_ns: bool,
) -> NxapiClientResult<Vec<CommandResult>> {
    let results = match formatting.decode_mode() {
        DecodeMode::Json => decode_json(raw)?,
        DecodeMode::XmlTree => decode_xml(raw, strip_ns, body_is_xml)?,
        DecodeMode::XmlText => decode_xml(raw, strip_ns, body_is_text)?,
    };
    trace!("Decoded {} command results", results.len());
    Ok(results)
}

pub fn failed_results(results: Vec<CommandResult>) -> Vec<CommandResult> {
    results.into_iter().filter(|result| !result.ok).collect()
}

fn decode_json(raw: &str) -> NxapiClientResult<Vec<CommandResult>> {
    let reply: JsonReply = serde_json::from_str(raw)?;
    Ok(reply
        .ins_api
        .outputs
        .output
        .into_vec()
        .into_iter()
        .map(|output| CommandResult {
            ok: output.code == STATUS_OK,
            command: output.input.trim().to_string(),
            output: output.body.map(CommandOutput::Json),
        })
        .collect())
}

/// Decodes the reply to a `cli_conf` batch. Rejected lines come back with
/// `<clierror>` next to a non-200 code; they are reported per command
/// instead of failing the batch, since the accepted lines are already
/// applied.
pub fn decode_config(raw: &str) -> NxapiClientResult<Vec<CommandResult>> {
    let root = parse_element(raw)?;
    let results = output_results(&root, body_is_xml)?;
    trace!("Decoded {} configuration results", results.len());
    Ok(results)
}

fn decode_xml(
    raw: &str,
    strip_ns: bool,
    get_output: fn(&Element) -> CommandOutput,
) -> NxapiClientResult<Vec<CommandResult>> {
    let text = if strip_ns {
        strip_namespaces(raw)
    } else {
        Cow::Borrowed(raw)
    };
    let mut root = parse_element(&text)?;
    if strip_ns {
        strip_element_namespaces(&mut root);
    }

    let mut cli_errors = Vec::new();
    find_all(&root, "clierror", &mut cli_errors);
    if !cli_errors.is_empty() {
        let errors = CliErrors(cli_errors);
        error!("Device rejected command batch: {}", errors);
        return Err(NxapiClientError::CliError(errors));
    }

    output_results(&root, get_output)
}

fn output_results(
    root: &Element,
    get_output: fn(&Element) -> CommandOutput,
) -> NxapiClientResult<Vec<CommandResult>> {
    let outputs = root.get_child("outputs").ok_or_else(|| {
        NxapiClientError::MalformedResponse(format!("<{}> has no <outputs> element", root.name))
    })?;

    Ok(child_elements(outputs, "output")
        .map(|output| CommandResult {
            ok: child_text(output, "code").trim() == STATUS_OK,
            command: child_text(output, "input").trim().to_string(),
            output: output.get_child("body").map(get_output),
        })
        .collect())
}

fn body_is_text(body: &Element) -> CommandOutput {
    CommandOutput::Text(
        body.get_text()
            .map(|text| text.trim().to_string())
            .unwrap_or_default(),
    )
}

fn body_is_xml(body: &Element) -> CommandOutput {
    CommandOutput::Xml(body.clone())
}

fn child_elements<'a>(parent: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    parent.children.iter().filter_map(move |node| match node {
        XMLNode::Element(element) if element.name == name => Some(element),
        _ => None,
    })
}

fn child_text<'a>(parent: &'a Element, name: &str) -> Cow<'a, str> {
    parent
        .get_child(name)
        .and_then(|child| child.get_text())
        .unwrap_or(Cow::Borrowed(""))
}

fn find_all(element: &Element, name: &str, found: &mut Vec<Element>) {
    for node in element.children.iter() {
        if let XMLNode::Element(child) = node {
            if child.name == name {
                found.push(child.clone());
            }
            find_all(child, name, found);
        }
    }
}

fn text_content(element: &Element) -> String {
    let mut text = String::new();
    for node in element.children.iter() {
        match node {
            XMLNode::Text(s) | XMLNode::CData(s) => text.push_str(s),
            XMLNode::Element(child) => text.push_str(&text_content(child)),
            _ => {}
        }
    }
    text
}

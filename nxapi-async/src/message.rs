use crate::{error, DEFAULT_SESSION_ID, NXAPI_VERSION};
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use quick_xml::escape::unescape;
use quick_xml::se::Serializer;
use serde_derive::Serialize;

/// Device execution mode for every command in a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CommandType {
    #[default]
    CliShow,
    CliShowAscii,
    CliConf,
    Bash,
}

impl CommandType {
    pub const ALL: [CommandType; 4] = [
        CommandType::CliShow,
        CommandType::CliShowAscii,
        CommandType::CliConf,
        CommandType::Bash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::CliShow => "cli_show",
            CommandType::CliShowAscii => "cli_show_ascii",
            CommandType::CliConf => "cli_conf",
            CommandType::Bash => "bash",
        }
    }
}

impl Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = error::NxapiClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command_type = s.to_lowercase();
        CommandType::ALL
            .into_iter()
            .find(|t| t.as_str() == command_type)
            .ok_or_else(|| error::NxapiClientError::UnknownCommandType {
                expected: CommandType::ALL.iter().map(|t| t.to_string()).collect(),
                unknown: s.to_string(),
            })
    }
}

/// Response encoding. `Text` is never sent on the wire, it resolves to
/// `xml` with [`CommandType::CliShowAscii`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    #[default]
    Xml,
    Json,
    Text,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Xml, OutputFormat::Json, OutputFormat::Text];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Xml => "xml",
            OutputFormat::Json => "json",
            OutputFormat::Text => "text",
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = error::NxapiClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let output_format = s.to_lowercase();
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == output_format)
            .ok_or_else(|| error::NxapiClientError::UnknownOutputFormat {
                expected: OutputFormat::ALL.iter().map(|f| f.to_string()).collect(),
                unknown: s.to_string(),
            })
    }
}

/// Client-wide formatting defaults, fixed when the device is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormattingDefaults {
    pub command_type: CommandType,
    pub output_format: OutputFormat,
}

/// Per-call formatting request. Unset fields fall back to [`FormattingDefaults`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Formatting {
    pub command_type: Option<CommandType>,
    pub output_format: Option<OutputFormat>,
    pub session_id: Option<String>,
}

impl Formatting {
    pub fn new() -> Formatting {
        Formatting::default()
    }

    pub fn with_output_format(output_format: Option<OutputFormat>) -> Formatting {
        Formatting {
            output_format,
            ..Formatting::default()
        }
    }

    pub fn command_type(mut self, command_type: CommandType) -> Formatting {
        self.command_type = Some(command_type);
        self
    }

    pub fn output_format(mut self, output_format: OutputFormat) -> Formatting {
        self.output_format = Some(output_format);
        self
    }

    pub fn session_id(mut self, session_id: &str) -> Formatting {
        self.session_id = Some(session_id.to_string());
        self
    }

    /// Builds formatting from raw option values. A missing value and an
    /// empty value both leave the field unset, so both resolve to the
    /// client default.
    pub fn from_options(
        command_type: Option<&str>,
        output_format: Option<&str>,
    ) -> error::NxapiClientResult<Formatting> {
        let command_type = match command_type.filter(|s| !s.is_empty()) {
            Some(s) => Some(CommandType::from_str(s)?),
            None => None,
        };
        let output_format = match output_format.filter(|s| !s.is_empty()) {
            Some(s) => Some(OutputFormat::from_str(s)?),
            None => None,
        };
        Ok(Formatting {
            command_type,
            output_format,
            session_id: None,
        })
    }

    pub fn resolve(&self, defaults: &FormattingDefaults) -> ResolvedFormatting {
        let mut command_type = self.command_type.unwrap_or(defaults.command_type);
        let mut output_format = self.output_format.unwrap_or(defaults.output_format);
        if output_format == OutputFormat::Text {
            command_type = CommandType::CliShowAscii;
            output_format = OutputFormat::Xml;
        }
        let session_id = self
            .session_id
            .as_deref()
            .filter(|sid| !sid.is_empty())
            .unwrap_or(DEFAULT_SESSION_ID)
            .to_string();

        ResolvedFormatting {
            command_type,
            output_format,
            session_id,
        }
    }
}

/// Formatting as it goes on the wire: every field concrete, `output_format`
/// is never [`OutputFormat::Text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFormatting {
    pub command_type: CommandType,
    pub output_format: OutputFormat,
    pub session_id: String,
}

impl ResolvedFormatting {
    pub fn decode_mode(&self) -> DecodeMode {
        match self.output_format {
            OutputFormat::Json => DecodeMode::Json,
            OutputFormat::Xml | OutputFormat::Text => match self.command_type {
                CommandType::CliShowAscii => DecodeMode::XmlText,
                CommandType::CliShow | CommandType::CliConf | CommandType::Bash => {
                    DecodeMode::XmlTree
                }
            },
        }
    }
}

/// How the response body is turned into per-command outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    Json,
    XmlTree,
    XmlText,
}

#[derive(Debug, Serialize)]
#[serde(rename(serialize = "ins_api"))]
pub struct Envelope {
    version: String,
    #[serde(rename = "type")]
    command_type: String,
    chunk: u8,
    sid: String,
    input: String,
    output_format: String,
}

impl Envelope {
    pub fn new(input: &str, formatting: &ResolvedFormatting) -> Envelope {
        Envelope {
            version: NXAPI_VERSION.to_string(),
            command_type: formatting.command_type.to_string(),
            chunk: 0,
            sid: formatting.session_id.clone(),
            input: input.to_string(),
            output_format: formatting.output_format.to_string(),
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Renders the request document. The command input goes out verbatim;
    /// callers are responsible for XML-safe command text.
    pub fn to_xml(&self) -> error::NxapiClientResult<String> {
        use serde::Serialize;
        let mut buffer = String::with_capacity(256);
        let mut ser = Serializer::with_root(&mut buffer, Some("ins_api"))?;
        ser.indent(' ', 0);
        self.serialize(ser)?;
        let body = unescape(buffer.as_str())
            .map_err(|err| error::NxapiClientError::new(format!("envelope encoding: {}", err)))?;
        Ok(format!("<?xml version=\"1.0\"?>\n{}", body))
    }
}

impl Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let xml = self.to_xml().map_err(|_| fmt::Error)?;
        write!(f, "{}", xml)
    }
}

pub fn join_commands<S: AsRef<str>>(commands: &[S], separator: &str) -> String {
    commands
        .iter()
        .map(|command| command.as_ref())
        .collect::<Vec<_>>()
        .join(separator)
}

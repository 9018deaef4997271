use crate::response::CliErrors;
use thiserror::Error;

pub type NxapiClientResult<T> = Result<T, NxapiClientError>;

#[derive(Debug, Error)]
pub enum NxapiClientError {
    #[error("required 'command' or 'commands'")]
    MissingCommand,
    #[error("missing required authentication")]
    MissingAuthentication,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
    #[error("command rejected by device:\n{0}")]
    CliError(CliErrors),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    #[error(transparent)]
    SerializingFailure(#[from] quick_xml::DeError),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("unknown command type {}, (expected {:?})", unknown, expected)]
    UnknownCommandType {
        expected: Vec<String>,
        unknown: String,
    },
    #[error("unknown output format {}, (expected {:?})", unknown, expected)]
    UnknownOutputFormat {
        expected: Vec<String>,
        unknown: String,
    },
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl NxapiClientError {
    pub fn new(msg: String) -> Self {
        NxapiClientError::Anyhow(anyhow::Error::msg(msg))
    }
}

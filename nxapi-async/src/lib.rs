//! # nxapi-async
//!
//! ```toml
//! nxapi-async = "^0.1.0"
//! ```
//!
//! ## Example
//!
//! Here is a basic example:
//!
//! ```rust,no_run
//! use nxapi_async::device::Device;
//! use nxapi_async::message::OutputFormat;
//!
//! # async fn run() -> nxapi_async::error::NxapiClientResult<()> {
//! let device = Device::builder()
//!     .host("switch1.example.net")
//!     .username("admin")
//!     .password("secret")
//!     .build()?;
//!
//! let version = device
//!     .cli("show version", Some(OutputFormat::Text), false)
//!     .await?;
//! println!("{}", version.output.and_then(|o| o.as_text().map(String::from)).unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
pub mod device;
pub mod error;
pub mod message;
pub mod namespace;
pub mod response;
pub mod transport;

pub const NXAPI_PATH: &str = "/ins";
pub const NXAPI_VERSION: &str = "1.0";
pub const DEFAULT_SESSION_ID: &str = "sid";
pub const COMMAND_SEPARATOR: &str = " ;";
pub const CONFIG_SEPARATOR: &str = " ; ";
pub const STATUS_OK: &str = "200";

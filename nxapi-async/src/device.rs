use crate::error::{NxapiClientError, NxapiClientResult};
use crate::message::{
    join_commands, CommandType, Envelope, Formatting, FormattingDefaults, OutputFormat,
    ResolvedFormatting,
};
use crate::response::{decode, decode_config, failed_results, CommandOutput, CommandResult};
use crate::transport::http::{HttpTransport, TlsConfig, DEFAULT_TIMEOUT};
use crate::transport::Transport;
use crate::{COMMAND_SEPARATOR, CONFIG_SEPARATOR};
use core::time::Duration;
use log::{debug, warn};
use std::env;
use tokio::net::TcpStream;
use tokio::time::timeout;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Commands for a single call: one command or an ordered batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandInput {
    Single(String),
    Batch(Vec<String>),
}

impl From<&str> for CommandInput {
    fn from(command: &str) -> Self {
        CommandInput::Single(command.to_string())
    }
}

impl From<Vec<String>> for CommandInput {
    fn from(commands: Vec<String>) -> Self {
        CommandInput::Batch(commands)
    }
}

impl From<&[&str]> for CommandInput {
    fn from(commands: &[&str]) -> Self {
        CommandInput::Batch(commands.iter().map(|c| c.to_string()).collect())
    }
}

/// Shape of a [`Device::run`] result follows the shape of its input.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    Single(CommandResult),
    Batch(Vec<CommandResult>),
}

pub struct Device {
    transport: Box<dyn Transport + 'static>,
    defaults: FormattingDefaults,
    address: Option<(String, u16)>,
}

impl Device {
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    pub fn with_transport<T>(transport: T, defaults: FormattingDefaults) -> Device
    where
        T: Transport + 'static,
    {
        Device {
            transport: Box::from(transport),
            defaults,
            address: None,
        }
    }

    pub fn defaults(&self) -> &FormattingDefaults {
        &self.defaults
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.transport.timeout()
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.transport.set_timeout(timeout)
    }

    /// Runs one command and returns its result.
    pub async fn cli(
        &self,
        command: &str,
        output_format: Option<OutputFormat>,
        strip_ns: bool,
    ) -> NxapiClientResult<CommandResult> {
        if command.is_empty() {
            return Err(NxapiClientError::MissingCommand);
        }
        let results = self
            .execute(command, Formatting::with_output_format(output_format), strip_ns)
            .await?;
        results.into_iter().next().ok_or_else(|| {
            NxapiClientError::MalformedResponse("reply holds no command output".to_string())
        })
    }

    /// Runs `commands` as one batch. Results come back in submission order.
    pub async fn exec<S: AsRef<str>>(
        &self,
        commands: &[S],
        output_format: Option<OutputFormat>,
        strip_ns: bool,
    ) -> NxapiClientResult<Vec<CommandResult>> {
        if commands.is_empty() {
            return Err(NxapiClientError::MissingCommand);
        }
        let input = join_commands(commands, COMMAND_SEPARATOR);
        self.execute(&input, Formatting::with_output_format(output_format), strip_ns)
            .await
    }

    pub async fn run(
        &self,
        input: CommandInput,
        output_format: Option<OutputFormat>,
        strip_ns: bool,
    ) -> NxapiClientResult<RunOutput> {
        match input {
            CommandInput::Single(command) => self
                .cli(&command, output_format, strip_ns)
                .await
                .map(RunOutput::Single),
            CommandInput::Batch(commands) => self
                .exec(&commands, output_format, strip_ns)
                .await
                .map(RunOutput::Batch),
        }
    }

    /// Runs `commands` with formatting given as raw option strings, such as
    /// values read from a config file. `None` and `""` both fall back to the
    /// device defaults; an unrecognised value fails before any request.
    pub async fn exec_with_options<S: AsRef<str>>(
        &self,
        commands: &[S],
        command_type: Option<&str>,
        output_format: Option<&str>,
        strip_ns: bool,
    ) -> NxapiClientResult<Vec<CommandResult>> {
        if commands.is_empty() {
            return Err(NxapiClientError::MissingCommand);
        }
        let formatting = Formatting::from_options(command_type, output_format)?;
        let input = join_commands(commands, COMMAND_SEPARATOR);
        self.execute(&input, formatting, strip_ns).await
    }

    /// Sends an already joined command string with explicit formatting.
    /// One call is one HTTP exchange.
    pub async fn execute(
        &self,
        input: &str,
        formatting: Formatting,
        strip_ns: bool,
    ) -> NxapiClientResult<Vec<CommandResult>> {
        let formatting = formatting.resolve(&self.defaults);
        let reply = self.send(input, &formatting).await?;
        decode(&reply, &formatting, strip_ns)
    }

    async fn send(&self, input: &str, formatting: &ResolvedFormatting) -> NxapiClientResult<String> {
        debug!(
            "Sending '{}' as {}/{}",
            input, formatting.command_type, formatting.output_format
        );
        let envelope = Envelope::new(input, formatting);
        self.transport.post(envelope.to_xml()?).await
    }

    /// Applies multi-line configuration in one `cli_conf` batch and returns
    /// the lines the device did not accept. An empty vector means every
    /// line was applied.
    pub async fn push_config(&self, content: &str) -> NxapiClientResult<Vec<CommandResult>> {
        let lines: Vec<&str> = content
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .collect();
        if lines.is_empty() {
            return Err(NxapiClientError::MissingCommand);
        }
        let formatting = Formatting::new()
            .command_type(CommandType::CliConf)
            .output_format(OutputFormat::Xml)
            .resolve(&self.defaults);
        let reply = self
            .send(&join_commands(&lines, CONFIG_SEPARATOR), &formatting)
            .await?;
        let results = decode_config(&reply)?;

        let failed = failed_results(results);
        for result in &failed {
            warn!("Configuration line rejected: '{}'", result.command);
        }
        Ok(failed)
    }

    /// Returns the running configuration, as text unless another format is
    /// requested.
    pub async fn get_config(
        &self,
        output_format: Option<OutputFormat>,
    ) -> NxapiClientResult<Option<CommandOutput>> {
        let result = self
            .cli(
                "show running-config",
                Some(output_format.unwrap_or(OutputFormat::Text)),
                true,
            )
            .await?;
        Ok(result.output)
    }

    /// Checks that the NX-API port accepts TCP connections. Devices built
    /// around a custom transport have no address and report `false`.
    pub async fn check_connection(&self) -> bool {
        let Some((host, port)) = &self.address else {
            return false;
        };
        match timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), *port))).await {
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                debug!(target: host, "Connection check failed: {}", err);
                false
            }
            Err(_) => {
                debug!(target: host, "Connection check timed out");
                false
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    host: Option<String>,
    scheme: String,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    timeout: Duration,
    tls: TlsConfig,
    defaults: FormattingDefaults,
}

impl Default for DeviceBuilder {
    fn default() -> Self {
        DeviceBuilder {
            host: None,
            scheme: "https".to_string(),
            port: None,
            username: None,
            password: None,
            timeout: DEFAULT_TIMEOUT,
            tls: TlsConfig::default(),
            defaults: FormattingDefaults::default(),
        }
    }
}

impl DeviceBuilder {
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    pub fn scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_lowercase();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn command_type(mut self, command_type: CommandType) -> Self {
        self.defaults.command_type = command_type;
        self
    }

    pub fn output_format(mut self, output_format: OutputFormat) -> Self {
        self.defaults.output_format = output_format;
        self
    }

    /// Fills unset fields from `NXAPI_HOST`, `NXAPI_PORT`, `NXAPI_USERNAME`
    /// and `NXAPI_PASSWORD`.
    pub fn from_env(self) -> NxapiClientResult<Self> {
        self.from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`DeviceBuilder::from_env`] with variables read through
    /// `lookup`.
    pub fn from_lookup<F>(mut self, lookup: F) -> NxapiClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.host.is_none() {
            self.host = lookup("NXAPI_HOST");
        }
        if self.port.is_none() {
            if let Some(port) = lookup("NXAPI_PORT") {
                self.port = Some(port.parse().map_err(|err| {
                    NxapiClientError::new(format!("invalid NXAPI_PORT '{}': {}", port, err))
                })?);
            }
        }
        if self.username.is_none() {
            self.username = lookup("NXAPI_USERNAME");
        }
        if self.password.is_none() {
            self.password = lookup("NXAPI_PASSWORD");
        }
        Ok(self)
    }

    pub fn build(self) -> NxapiClientResult<Device> {
        let host = self
            .host
            .ok_or_else(|| NxapiClientError::new("No host provided".to_string()))?;
        let (username, password) = match (self.username, self.password) {
            (Some(username), Some(password)) => (username, password),
            _ => return Err(NxapiClientError::MissingAuthentication),
        };
        let port = match self.port {
            Some(port) => port,
            None => default_port(&self.scheme)?,
        };

        let base_url = format!("{}://{}:{}", self.scheme, host, port);
        let transport = HttpTransport::new(&base_url, &username, &password, &self.tls, self.timeout)?;
        debug!(target: &host, "NX-API endpoint {}", transport.url());

        Ok(Device {
            transport: Box::from(transport),
            defaults: self.defaults,
            address: Some((host, port)),
        })
    }
}

fn default_port(scheme: &str) -> NxapiClientResult<u16> {
    match scheme {
        "https" => Ok(443),
        "http" => Ok(80),
        _ => Err(NxapiClientError::new(format!("unsupported scheme: {}", scheme))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Echoes every command of the batch back with status 200. Commands
    /// starting with `bad` are rejected with a `<clierror>` and status 400.
    #[derive(Clone, Default)]
    struct EchoDevice {
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl EchoDevice {
        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn element_text<'a>(xml: &'a str, name: &str) -> &'a str {
        let open = format!("<{}>", name);
        let close = format!("</{}>", name);
        let start = xml.find(&open).unwrap() + open.len();
        let end = xml.find(&close).unwrap();
        &xml[start..end]
    }

    #[async_trait]
    impl Transport for EchoDevice {
        async fn post(&self, body: String) -> NxapiClientResult<String> {
            self.requests.lock().unwrap().push(body.clone());
            let input = element_text(&body, "input");
            let ascii = element_text(&body, "type") == "cli_show_ascii";
            let separator = if input.contains(CONFIG_SEPARATOR) {
                CONFIG_SEPARATOR
            } else {
                COMMAND_SEPARATOR
            };
            let outputs: String = input
                .split(separator)
                .map(|command| {
                    let body = if ascii {
                        format!("\n  output of {}  \n", command)
                    } else {
                        format!("<echo>{}</echo>", command)
                    };
                    if command.starts_with("bad") {
                        return format!(
                            "<output><input>{}</input><msg>Input CLI command error</msg>\
                             <clierror>% Invalid command at '^' marker.</clierror>\
                             <code>400</code></output>",
                            command
                        );
                    }
                    format!(
                        "<output><body>{}</body><input>{}</input><code>200</code></output>",
                        body, command
                    )
                })
                .collect();
            Ok(format!("<ins_api><outputs>{}</outputs></ins_api>", outputs))
        }
    }

    /// Fails every request, so any network use is visible to the test.
    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn post(&self, _body: String) -> NxapiClientResult<String> {
            panic!("no request expected");
        }
    }

    #[tokio::test]
    async fn test_exec_preserves_order() {
        let echo = EchoDevice::default();
        let device = Device::with_transport(echo.clone(), FormattingDefaults::default());
        let commands = ["show version", "show clock", "show interface brief"];
        let results = device.exec(&commands, None, false).await.unwrap();

        assert_eq!(results.len(), commands.len());
        for (result, command) in results.iter().zip(commands) {
            assert!(result.ok);
            assert_eq!(result.command, command);
        }
        let requests = echo.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            element_text(&requests[0], "input"),
            "show version ;show clock ;show interface brief"
        );
    }

    #[tokio::test]
    async fn test_cli_text_requests_ascii_xml() {
        let echo = EchoDevice::default();
        let device = Device::with_transport(echo.clone(), FormattingDefaults::default());
        let result = device
            .cli("show clock", Some(OutputFormat::Text), false)
            .await
            .unwrap();

        assert_eq!(
            result.output,
            Some(CommandOutput::Text("output of show clock".to_string()))
        );
        let request = &echo.requests()[0];
        assert_eq!(element_text(request, "type"), "cli_show_ascii");
        assert_eq!(element_text(request, "output_format"), "xml");
    }

    #[tokio::test]
    async fn test_run_follows_input_shape() {
        let device = Device::with_transport(EchoDevice::default(), FormattingDefaults::default());

        let single = device.run("show clock".into(), None, false).await.unwrap();
        assert!(matches!(single, RunOutput::Single(ref r) if r.command == "show clock"));

        let batch: &[&str] = &["show clock"];
        let batch = device.run(batch.into(), None, false).await.unwrap();
        match batch {
            RunOutput::Batch(results) => assert_eq!(results.len(), 1),
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_command_fails_before_io() {
        let device = Device::with_transport(Unreachable, FormattingDefaults::default());
        let err = device.cli("", None, false).await.unwrap_err();
        assert!(matches!(err, NxapiClientError::MissingCommand));

        let empty: [&str; 0] = [];
        let err = device.exec(&empty, None, false).await.unwrap_err();
        assert!(matches!(err, NxapiClientError::MissingCommand));

        let err = device
            .run(CommandInput::Batch(vec![]), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, NxapiClientError::MissingCommand));

        let err = device.push_config("\n  \n").await.unwrap_err();
        assert!(matches!(err, NxapiClientError::MissingCommand));
    }

    #[tokio::test]
    async fn test_device_defaults_apply() {
        let echo = EchoDevice::default();
        let defaults = FormattingDefaults {
            command_type: CommandType::Bash,
            output_format: OutputFormat::Xml,
        };
        let device = Device::with_transport(echo.clone(), defaults);
        device.cli("uname -a", None, false).await.unwrap();
        assert_eq!(element_text(&echo.requests()[0], "type"), "bash");
    }

    #[tokio::test]
    async fn test_push_config_reports_rejected_lines() {
        let echo = EchoDevice::default();
        let device = Device::with_transport(echo.clone(), FormattingDefaults::default());
        let failed = device
            .push_config("interface Ethernet1/1\n  description uplink\nbad line\n")
            .await
            .unwrap();

        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].command, "bad line");
        let request = &echo.requests()[0];
        assert_eq!(element_text(request, "type"), "cli_conf");
        assert_eq!(
            element_text(request, "input"),
            "interface Ethernet1/1 ;   description uplink ; bad line"
        );
    }

    #[tokio::test]
    async fn test_rejected_show_command_fails_batch() {
        let device = Device::with_transport(EchoDevice::default(), FormattingDefaults::default());
        let err = device.cli("bad command", None, false).await.unwrap_err();
        match err {
            NxapiClientError::CliError(errors) => {
                assert_eq!(errors.messages(), vec!["% Invalid command at '^' marker."])
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exec_with_options_falls_back_on_empty() {
        let echo = EchoDevice::default();
        let defaults = FormattingDefaults {
            command_type: CommandType::Bash,
            output_format: OutputFormat::Xml,
        };
        let device = Device::with_transport(echo.clone(), defaults);
        device
            .exec_with_options(&["uname -a"], Some(""), None, false)
            .await
            .unwrap();
        device
            .exec_with_options(&["show clock"], Some("cli_show"), Some(""), false)
            .await
            .unwrap();

        let requests = echo.requests();
        assert_eq!(element_text(&requests[0], "type"), "bash");
        assert_eq!(element_text(&requests[1], "type"), "cli_show");
        assert_eq!(element_text(&requests[1], "output_format"), "xml");
    }

    #[tokio::test]
    async fn test_exec_with_options_rejects_unknown_values() {
        let device = Device::with_transport(Unreachable, FormattingDefaults::default());
        let err = device
            .exec_with_options(&["show clock"], Some("cli_shw"), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, NxapiClientError::UnknownCommandType { .. }));
    }

    #[tokio::test]
    async fn test_get_config_defaults_to_text() {
        let echo = EchoDevice::default();
        let device = Device::with_transport(echo.clone(), FormattingDefaults::default());
        let config = device.get_config(None).await.unwrap();
        assert_eq!(
            config.as_ref().and_then(|o| o.as_text()),
            Some("output of show running-config")
        );
    }

    #[tokio::test]
    async fn test_check_connection_without_address() {
        let device = Device::with_transport(Unreachable, FormattingDefaults::default());
        assert!(!device.check_connection().await);
        assert_eq!(device.timeout(), None);
    }

    #[test]
    fn test_builder_requires_authentication() {
        let err = Device::builder()
            .host("10.0.0.1")
            .username("admin")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, NxapiClientError::MissingAuthentication));

        let err = Device::builder()
            .username("admin")
            .password("secret")
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("No host provided"));
    }

    #[test]
    fn test_builder_default_ports() {
        let mut device = Device::builder()
            .host("10.0.0.1")
            .username("admin")
            .password("secret")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(device.address, Some(("10.0.0.1".to_string(), 443)));
        assert_eq!(device.timeout(), Some(Duration::from_secs(5)));
        device.set_timeout(Duration::from_secs(90));
        assert_eq!(device.timeout(), Some(Duration::from_secs(90)));

        let device = Device::builder()
            .scheme("HTTP")
            .host("10.0.0.1")
            .username("admin")
            .password("secret")
            .build()
            .unwrap();
        assert_eq!(device.address, Some(("10.0.0.1".to_string(), 80)));

        let err = Device::builder()
            .scheme("ftp")
            .host("10.0.0.1")
            .username("admin")
            .password("secret")
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("unsupported scheme"));
    }

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_builder_from_lookup() {
        let lookup = lookup_from(&[
            ("NXAPI_HOST", "leaf-7.lab"),
            ("NXAPI_PORT", "8443"),
            ("NXAPI_USERNAME", "admin"),
            ("NXAPI_PASSWORD", "secret"),
        ]);
        let device = Device::builder().from_lookup(lookup).unwrap().build().unwrap();
        assert_eq!(device.address, Some(("leaf-7.lab".to_string(), 8443)));

        let err = Device::builder()
            .from_lookup(lookup_from(&[("NXAPI_PORT", "eighty")]))
            .err()
            .unwrap();
        assert!(err.to_string().contains("invalid NXAPI_PORT"));
    }

    #[test]
    fn test_builder_from_lookup_keeps_explicit_values() {
        let lookup = lookup_from(&[
            ("NXAPI_HOST", "leaf-7.lab"),
            ("NXAPI_PORT", "eighty"),
            ("NXAPI_USERNAME", "operator"),
            ("NXAPI_PASSWORD", "secret"),
        ]);
        let device = Device::builder()
            .host("spine-1.lab")
            .port(8080)
            .from_lookup(lookup)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(device.address, Some(("spine-1.lab".to_string(), 8080)));
    }
}

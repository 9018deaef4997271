use crate::error::NxapiClientResult;
use crate::transport::Transport;
use crate::NXAPI_PATH;
use async_trait::async_trait;
use core::time::Duration;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::tls::Version;
use reqwest::Client;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// TLS policy for the HTTPS connection. Switches running older NX-OS
/// releases often present self-signed certificates and only speak TLS 1.0/1.1.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub accept_invalid_certs: bool,
    pub min_tls_version: Option<Version>,
}

impl TlsConfig {
    /// Accepts any certificate and any protocol version from TLS 1.0 up.
    ///
    /// This covers the certificate and protocol-floor part of the policy
    /// older NX-OS releases need. It does not restrict cipher suites to
    /// `HIGH:!DH:!aNULL`: reqwest exposes no cipher list, so the TLS
    /// backend's default suites are offered.
    pub fn insecure() -> TlsConfig {
        TlsConfig {
            accept_invalid_certs: true,
            min_tls_version: Some(Version::TLS_1_0),
        }
    }
}

pub struct HttpTransport {
    client: Client,
    url: Url,
    username: String,
    password: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        tls: &TlsConfig,
        timeout: Duration,
    ) -> NxapiClientResult<HttpTransport> {
        let url = Url::parse(base_url)?.join(NXAPI_PATH)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));

        let mut builder = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(tls.accept_invalid_certs);
        if let Some(version) = tls.min_tls_version {
            builder = builder.min_tls_version(version);
        }

        Ok(HttpTransport {
            client: builder.build()?,
            url,
            username: username.to_string(),
            password: password.to_string(),
            timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, body: String) -> NxapiClientResult<String> {
        debug!(target: self.url.as_str(), "Request:\n{}", body);
        let response = self
            .client
            .post(self.url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .timeout(self.timeout)
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        let reply = response.text().await?;
        debug!(target: self.url.as_str(), "Reply:\n{}", reply);
        Ok(reply)
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

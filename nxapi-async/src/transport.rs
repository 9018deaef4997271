use crate::error::NxapiClientResult;
use async_trait::async_trait;
use core::time::Duration;

pub mod http;

/// Trait for NX-API transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request document and returns the reply body. Non-success
    /// statuses are errors; the body of such a reply is never returned.
    async fn post(&self, body: String) -> NxapiClientResult<String>;

    fn timeout(&self) -> Option<Duration> {
        None
    }

    fn set_timeout(&mut self, _timeout: Duration) {}
}

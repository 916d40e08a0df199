//! Traffic-flow provider seam.

mod tomtom;

pub use tomtom::{parse_flow_payload, TomTomClient};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A provider's point-in-time speed reading for one coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowSample {
    pub current_speed: f64,
    pub free_flow_speed: f64,
    /// 0 when the provider omits it.
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("provider request failed: {0}")]
    Network(String),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("malformed provider payload: {0}")]
    MalformedPayload(String),
    #[error("provider payload is missing {0}")]
    MissingField(&'static str),
}

#[async_trait]
pub trait FlowSource: Send + Sync {
    async fn fetch(&self, lat: f64, lon: f64) -> Result<FlowSample, ProviderError>;
}

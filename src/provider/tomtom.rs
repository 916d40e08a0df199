use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;

use super::{FlowSample, FlowSource, ProviderError};
use crate::config::ProviderSettings;

#[derive(Debug, Deserialize)]
struct FlowResponse {
    #[serde(rename = "flowSegmentData")]
    flow_segment_data: Option<FlowSegmentData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowSegmentData {
    current_speed: Option<f64>,
    free_flow_speed: Option<f64>,
    confidence: Option<f64>,
}

/// Decode a flowSegmentData response body.
pub fn parse_flow_payload(body: &[u8]) -> Result<FlowSample, ProviderError> {
    let response: FlowResponse = serde_json::from_slice(body)
        .map_err(|err| ProviderError::MalformedPayload(err.to_string()))?;

    let segment = response
        .flow_segment_data
        .ok_or(ProviderError::MissingField("flowSegmentData"))?;

    Ok(FlowSample {
        current_speed: segment
            .current_speed
            .ok_or(ProviderError::MissingField("flowSegmentData.currentSpeed"))?,
        free_flow_speed: segment
            .free_flow_speed
            .ok_or(ProviderError::MissingField("flowSegmentData.freeFlowSpeed"))?,
        confidence: segment.confidence.unwrap_or(0.0),
    })
}

/// Client for the TomTom Flow Segment Data endpoint.
pub struct TomTomClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl TomTomClient {
    pub fn new(settings: &ProviderSettings) -> anyhow::Result<Self> {
        let timeout = settings.timeout();
        let http = HttpClient::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            timeout,
        })
    }

    fn map_request_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else if let Some(status) = err.status() {
            ProviderError::Status(status.as_u16())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl FlowSource for TomTomClient {
    async fn fetch(&self, lat: f64, lon: f64) -> Result<FlowSample, ProviderError> {
        let point = format!("{lat},{lon}");
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("point", point.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|err| self.map_request_error(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| self.map_request_error(err))?;
        parse_flow_payload(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_payload() {
        let body = br#"{"flowSegmentData":{"frc":"FRC2","currentSpeed":32,"freeFlowSpeed":40,"confidence":0.95}}"#;
        let sample = parse_flow_payload(body).unwrap();
        assert_eq!(sample.current_speed, 32.0);
        assert_eq!(sample.free_flow_speed, 40.0);
        assert_eq!(sample.confidence, 0.95);
    }

    #[test]
    fn missing_confidence_defaults_to_zero() {
        let body = br#"{"flowSegmentData":{"currentSpeed":20,"freeFlowSpeed":40}}"#;
        assert_eq!(parse_flow_payload(body).unwrap().confidence, 0.0);
    }

    #[test]
    fn missing_current_speed_is_reported() {
        let body = br#"{"flowSegmentData":{"freeFlowSpeed":40}}"#;
        match parse_flow_payload(body) {
            Err(ProviderError::MissingField(field)) => {
                assert_eq!(field, "flowSegmentData.currentSpeed")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(
            parse_flow_payload(b"<html>rate limited</html>"),
            Err(ProviderError::MalformedPayload(_))
        ));
    }

    #[test]
    fn error_envelope_without_segment_is_missing_field() {
        let body = br#"{"error":"Point too far from nearest existing segment."}"#;
        assert!(matches!(
            parse_flow_payload(body),
            Err(ProviderError::MissingField("flowSegmentData"))
        ));
    }
}

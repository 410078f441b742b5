use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use url::Url;

use super::{Detector, Entity, sort_and_drop_overlaps, validate_texts};
use crate::error::ShroudError;

const INFO_PATH: &str = "/api/info";
const INVOKE_PATH: &str = "/api/invoke";
const BATCH_PATH: &str = "/api/batch";

/// Detector backed by a remote GLiNER-style entity recognition service.
///
/// Construction probes the service's `info` endpoint for its model id,
/// default entity set and default threshold. Transport failures on the
/// detection endpoints are retried with bounded exponential backoff and
/// surface as [`ShroudError::DetectorUnavailable`] once exhausted; the
/// wrapper treats that as fatal for the turn.
pub struct RemoteDetector {
    client: reqwest::Client,
    base_url: Url,
    model_id: String,
    entities: Vec<String>,
    default_threshold: f32,
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    model_id: String,
    default_entities: Vec<String>,
    default_threshold: f32,
    api_key_required: bool,
    #[serde(default)]
    configured_use_case: Option<String>,
}

#[derive(Serialize)]
struct InvokeRequest<'a> {
    text: &'a str,
    threshold: f32,
    entity_types: &'a [String],
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    texts: &'a [String],
    threshold: f32,
    entity_types: &'a [String],
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    entities: Vec<Entity>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    entities: Vec<Vec<Entity>>,
}

impl RemoteDetector {
    /// Probes the service and builds a detector bound to it.
    ///
    /// `supported_entities` overrides the service's default entity set when
    /// given. Fails with a configuration error when the service demands an
    /// API key and none is supplied.
    pub async fn connect(
        base_url: &str,
        api_key: Option<String>,
        supported_entities: Option<Vec<String>>,
        timeout: Duration,
    ) -> Result<Self, ShroudError> {
        let base_url = Url::parse(base_url)?;

        let probe = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ShroudError::Configuration(e.to_string()))?;
        let info_url = base_url.join(INFO_PATH)?;
        let info: InfoResponse = retrying(|| async {
            let resp = probe.get(info_url.clone()).send().await?;
            resp.error_for_status()?.json::<InfoResponse>().await
        })
        .await?;

        log::debug!(
            "entity recognition endpoint: model={} use_case={:?} entities={:?}",
            info.model_id,
            info.configured_use_case,
            info.default_entities
        );

        if info.api_key_required && api_key.is_none() {
            return Err(ShroudError::Configuration(
                "detector service requires an API key and none is configured".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        if let Some(key) = &api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| ShroudError::Configuration(e.to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ShroudError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            model_id: info.model_id,
            entities: supported_entities.unwrap_or(info.default_entities),
            default_threshold: info.default_threshold,
        })
    }

    /// Model identifier reported by the remote service.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Single-text detection endpoint.
    pub async fn invoke(
        &self,
        text: &str,
        threshold: Option<f32>,
    ) -> Result<Vec<Entity>, ShroudError> {
        if text.trim().is_empty() {
            return Err(ShroudError::InvalidInput(
                "input text must not be empty".to_string(),
            ));
        }
        let body = InvokeRequest {
            text,
            threshold: threshold.unwrap_or(self.default_threshold),
            entity_types: &self.entities,
        };
        let resp: InvokeResponse = self.post_json(INVOKE_PATH, &body).await?;
        Ok(sort_and_drop_overlaps(resp.entities))
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ShroudError> {
        let url = self.base_url.join(path)?;
        retrying(|| async {
            let resp = self.client.post(url.clone()).json(body).send().await?;
            resp.error_for_status()?.json::<R>().await
        })
        .await
    }
}

#[async_trait]
impl Detector for RemoteDetector {
    fn supported_entities(&self) -> &[String] {
        &self.entities
    }

    fn default_threshold(&self) -> f32 {
        self.default_threshold
    }

    async fn detect(
        &self,
        texts: &[String],
        threshold: Option<f32>,
    ) -> Result<Vec<Vec<Entity>>, ShroudError> {
        validate_texts(texts)?;
        let body = BatchRequest {
            texts,
            threshold: threshold.unwrap_or(self.default_threshold),
            entity_types: &self.entities,
        };
        let resp: BatchResponse = self.post_json(BATCH_PATH, &body).await?;
        if resp.entities.len() != texts.len() {
            return Err(ShroudError::DetectorUnavailable(format!(
                "detector returned {} result lists for {} inputs",
                resp.entities.len(),
                texts.len()
            )));
        }
        Ok(resp
            .entities
            .into_iter()
            .map(sort_and_drop_overlaps)
            .collect())
    }
}

fn retry_policy() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(250))
        .with_max_elapsed_time(Some(Duration::from_secs(5)))
        .build()
}

/// Runs `op` under bounded exponential backoff. Client-side errors (4xx) are
/// not retried; everything else is considered transient.
async fn retrying<T, F, Fut>(mut op: F) -> Result<T, ShroudError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, reqwest::Error>>,
{
    let mut policy = retry_policy();
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.status().is_some_and(|s| s.is_client_error()) => {
                return Err(ShroudError::DetectorUnavailable(err.to_string()));
            }
            Err(err) => match policy.next_backoff() {
                Some(delay) => {
                    log::warn!("detector call failed ({err}), retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(ShroudError::DetectorUnavailable(err.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_payload_parses() {
        let raw = r#"{
            "configured_use_case": "pii",
            "model_id": "gliner-multi-pii",
            "default_entities": ["person", "email", "iban"],
            "default_threshold": 0.45,
            "api_key_required": false
        }"#;
        let info: InfoResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(info.model_id, "gliner-multi-pii");
        assert_eq!(info.default_entities.len(), 3);
        assert!(!info.api_key_required);
    }

    #[test]
    fn batch_payload_parses_with_type_alias() {
        let raw = r#"{"entities": [[
            {"start": 8, "end": 20, "text": "Alice Müller", "type": "person", "score": 0.93}
        ], []]}"#;
        let batch: BatchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(batch.entities[0][0].label, "person");
        assert!(batch.entities[1].is_empty());
    }

    #[test]
    fn batch_request_shape_is_stable() {
        let texts = vec!["hi".to_string()];
        let types = vec!["person".to_string()];
        let body = BatchRequest {
            texts: &texts,
            threshold: 0.5,
            entity_types: &types,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("texts").is_some());
        assert!(json.get("threshold").is_some());
        assert!(json.get("entity_types").is_some());
    }
}

//! Home Assistant REST client
//!
//! Thin wrapper over `POST /api/services/<domain>/<service>` used by the
//! `ha_*` actions.

use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Request timeout for a single service call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum HaError {
    #[error("request to Home Assistant failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Home Assistant returned {status} for service '{service}'")]
    Status { service: String, status: StatusCode },
}

/// Client for the Home Assistant HTTP API
#[derive(Clone)]
pub struct HaClient {
    client: Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for HaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HaClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HaClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, HaError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call a service such as `light/toggle` with JSON service data
    pub async fn call_service(&self, service: &str, data: Value) -> Result<(), HaError> {
        let url = format!("{}/api/services/{}", self.base_url, service);
        debug!(service, data = %data, "Calling Home Assistant service");

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .json(&data)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HaError::Status {
                service: service.to_string(),
                status,
            });
        }
        Ok(())
    }

    pub async fn toggle_light(&self, entity_id: &str) -> Result<(), HaError> {
        self.call_service("light/toggle", json!({ "entity_id": entity_id }))
            .await
    }

    /// Turn a light on, merging `extra` into the service data
    pub async fn turn_on_light(&self, entity_id: &str, extra: Value) -> Result<(), HaError> {
        let mut data = json!({ "entity_id": entity_id });
        if let (Some(obj), Value::Object(extra)) = (data.as_object_mut(), extra) {
            obj.extend(extra);
        }
        self.call_service("light/turn_on", data).await
    }

    /// Brightness as a percentage (0-100)
    pub async fn set_brightness(&self, entity_id: &str, percent: u8) -> Result<(), HaError> {
        self.turn_on_light(entity_id, json!({ "brightness_pct": percent }))
            .await
    }

    pub async fn set_color(&self, entity_id: &str, rgb: [u8; 3]) -> Result<(), HaError> {
        self.turn_on_light(entity_id, json!({ "rgb_color": rgb })).await
    }

    pub async fn set_color_temp(&self, entity_id: &str, kelvin: u32) -> Result<(), HaError> {
        self.turn_on_light(entity_id, json!({ "color_temp_kelvin": kelvin }))
            .await
    }
}

//! # Device Geolocation
//!
//! Resolves the country a device is registered in, through the platform's device
//! address API. The listener has to grant the address permission first; without it the
//! API answers 403 and the skill asks for consent instead of guessing.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum GeoError {
    /// The listener has not granted the address permission.
    #[error("device address permission not granted")]
    PermissionDenied,

    /// Anything else: network failure, timeout, unexpected status, bad body.
    #[error("device address lookup failed: {0}")]
    LookupFailed(String),
}

/// What the lookup needs to know about the requesting device.
#[derive(Debug, Clone, Default)]
pub struct DeviceLookup {
    pub device_id: String,
    pub api_endpoint: Option<String>,
    pub api_access_token: Option<String>,
}

/// Device address as returned by the platform. Only `country_code` drives behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAddress {
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state_or_region: Option<String>,
}

impl DeviceAddress {
    pub fn with_country(code: impl Into<String>) -> Self {
        Self {
            country_code: Some(code.into()),
            ..Self::default()
        }
    }

    /// Country code, `None` when missing or blank.
    pub fn country(&self) -> Option<&str> {
        self.country_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }
}

#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn resolve(&self, device: &DeviceLookup) -> Result<DeviceAddress, GeoError>;
}

/// Calls `{apiEndpoint}/v1/devices/{deviceId}/settings/address`.
#[derive(Debug, Clone)]
pub struct HttpGeolocator {
    client: reqwest::Client,
}

impl HttpGeolocator {
    pub fn new(timeout: Duration) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeoError::LookupFailed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

/// Address URL for a device. The device id is pushed as one path segment, so
/// reserved characters in it are percent-encoded.
fn address_url(endpoint: &str, device_id: &str) -> Result<Url, GeoError> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| GeoError::LookupFailed(format!("invalid API endpoint {endpoint}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| GeoError::LookupFailed(format!("API endpoint {endpoint} cannot be a base")))?
        .pop_if_empty()
        .extend(["v1", "devices", device_id, "settings", "address"]);
    Ok(url)
}

#[async_trait]
impl Geolocator for HttpGeolocator {
    async fn resolve(&self, device: &DeviceLookup) -> Result<DeviceAddress, GeoError> {
        let endpoint = device
            .api_endpoint
            .as_deref()
            .ok_or_else(|| GeoError::LookupFailed("request carries no API endpoint".into()))?;
        let token = device
            .api_access_token
            .as_deref()
            .ok_or_else(|| GeoError::LookupFailed("request carries no API token".into()))?;

        let url = address_url(endpoint, &device.device_id)?;
        debug!(url = %url, "Resolving device address");

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| GeoError::LookupFailed(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<DeviceAddress>()
                .await
                .map_err(|e| GeoError::LookupFailed(format!("invalid address body: {e}"))),
            StatusCode::FORBIDDEN => Err(GeoError::PermissionDenied),
            status => {
                warn!(status = %status.as_u16(), device_id = %device.device_id, "Address API error");
                Err(GeoError::LookupFailed(format!("address API returned {}", status)))
            }
        }
    }
}

//! Hue bridge REST binding
//!
//! Handles all HTTP communication with a Hue bridge: catalog fetches over
//! the id-keyed resource maps, command execution against the group action
//! and light state endpoints, and user registration via the link button.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::action::{Change, CommandAction, Target};
use crate::bridge::{BridgeAccess, ConnectionProvider};
use crate::catalog::{Group, Light, Scene};

const DEVICE_TYPE: &str = "lumio#rust";

/// REST client for a single registered bridge user.
pub struct HueBridge {
    client: Client,
    /// `http://<host>/api/<username>`, no trailing slash.
    base: String,
}

impl HueBridge {
    pub fn new(host: &str, username: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(format!("lumio/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            client,
            base: format!("{}/api/{username}", root_url(host)),
        })
    }

    /// Fetch the bridge config, verifying the username is registered.
    pub async fn check(&self) -> Result<()> {
        let config: Value = self.get("config").await?;
        // Unregistered users still get a short config without a whitelist.
        if config.get("whitelist").is_none() {
            bail!("bridge user is not registered");
        }
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{path}", self.base);
        log::debug!("GET {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("bridge returned {status} for {url}");
        }

        let body: Value = response
            .json()
            .await
            .with_context(|| format!("parsing response from {url}"))?;
        check_bridge_errors(&body)?;
        serde_json::from_value(body).with_context(|| format!("decoding response from {url}"))
    }

    async fn put(&self, path: &str, body: Value) -> Result<()> {
        let url = format!("{}/{path}", self.base);
        log::debug!("PUT {url} {body}");

        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("bridge returned {status} for {url}");
        }

        let body: Value = response
            .json()
            .await
            .with_context(|| format!("parsing response from {url}"))?;
        check_bridge_errors(&body)
    }
}

#[derive(Debug, Deserialize)]
struct GroupAttributes {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LightAttributes {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SceneAttributes {
    name: String,
    #[serde(default)]
    group: String,
}

#[async_trait]
impl BridgeAccess for HueBridge {
    async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let raw: HashMap<String, GroupAttributes> = self.get("groups").await?;
        Ok(numeric_ids(raw)
            .map(|(id, attrs)| Group {
                id,
                name: attrs.name,
            })
            .collect())
    }

    async fn fetch_lights(&self) -> Result<Vec<Light>> {
        let raw: HashMap<String, LightAttributes> = self.get("lights").await?;
        Ok(numeric_ids(raw)
            .map(|(id, attrs)| Light {
                id,
                name: attrs.name,
            })
            .collect())
    }

    async fn fetch_scenes(&self) -> Result<Vec<Scene>> {
        let raw: HashMap<String, SceneAttributes> = self.get("scenes").await?;
        Ok(raw
            .into_iter()
            .map(|(id, attrs)| Scene {
                id,
                name: attrs.name,
                group: attrs.group,
            })
            .collect())
    }

    async fn execute(&self, action: &CommandAction) -> Result<()> {
        let path = match &action.target {
            Target::Group { id, .. } => format!("groups/{id}/action"),
            Target::Light { id, .. } => format!("lights/{id}/state"),
        };
        let body = match &action.change {
            Change::On => json!({ "on": true }),
            Change::Off => json!({ "on": false }),
            Change::Scene { id, .. } => json!({ "scene": id }),
            Change::Color(color) => {
                let xy = color_xy(color)
                    .ok_or_else(|| anyhow!("not a valid color expression: {color:?}"))?;
                json!({ "on": true, "xy": xy })
            }
        };
        self.put(&path, body).await
    }
}

/// Decode the id-keyed resource keys as numeric ids, skipping (with a
/// warning) anything the bridge reports under a non-numeric key.
fn numeric_ids<T>(raw: HashMap<String, T>) -> impl Iterator<Item = (u32, T)> {
    raw.into_iter().filter_map(|(key, value)| match key.parse() {
        Ok(id) => Some((id, value)),
        Err(_) => {
            log::warn!("skipping resource with non-numeric id {key:?}");
            None
        }
    })
}

/// Hue responses carry errors as array elements, usually with status 200.
fn check_bridge_errors(body: &Value) -> Result<()> {
    let Some(items) = body.as_array() else {
        return Ok(());
    };
    for item in items {
        if let Some(error) = item.get("error") {
            let description = error
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown bridge error");
            bail!("bridge error: {description}");
        }
    }
    Ok(())
}

/// CIE xy chromaticity for a CSS color expression, for the light state
/// `xy` field. Linearized sRGB through the D65 transform; black falls back
/// to the white point.
fn color_xy(css: &str) -> Option<[f64; 2]> {
    let color = csscolorparser::parse(css).ok()?;
    let r = linearize(color.r);
    let g = linearize(color.g);
    let b = linearize(color.b);

    let x = 0.4124 * r + 0.3576 * g + 0.1805 * b;
    let y = 0.2126 * r + 0.7152 * g + 0.0722 * b;
    let z = 0.0193 * r + 0.1192 * g + 0.9505 * b;

    let sum = x + y + z;
    if sum == 0.0 {
        return Some([0.3127, 0.3290]);
    }
    Some([x / sum, y / sum])
}

fn linearize(channel: f64) -> f64 {
    if channel <= 0.04045 {
        channel / 12.92
    } else {
        ((channel + 0.055) / 1.055).powf(2.4)
    }
}

fn root_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

/// Connects to a bridge, registering a new user when none is configured.
///
/// Registration requires the bridge link button to have been pressed; the
/// bridge's "link button not pressed" error propagates to the caller, who
/// may simply retry the link action after pressing it.
pub struct HueConnector {
    host: String,
    username: Option<String>,
}

impl HueConnector {
    pub fn new(host: impl Into<String>, username: Option<String>) -> Self {
        Self {
            host: host.into(),
            username,
        }
    }

    async fn register(&self) -> Result<String> {
        let url = format!("{}/api", root_url(&self.host));
        log::info!("registering new bridge user at {url}");

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(format!("lumio/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;

        let body: Value = client
            .post(&url)
            .json(&json!({ "devicetype": DEVICE_TYPE }))
            .send()
            .await
            .with_context(|| format!("request to {url}"))?
            .json()
            .await
            .with_context(|| format!("parsing response from {url}"))?;
        check_bridge_errors(&body)?;

        body.get(0)
            .and_then(|item| item.get("success"))
            .and_then(|success| success.get("username"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("bridge returned no username"))
    }
}

#[async_trait]
impl ConnectionProvider for HueConnector {
    async fn connect(&self) -> Result<Arc<dyn BridgeAccess>> {
        let bridge = match &self.username {
            Some(username) => {
                let bridge = HueBridge::new(&self.host, username)?;
                bridge.check().await?;
                bridge
            }
            None => {
                let username = self.register().await?;
                log::info!("registered new bridge user");
                HueBridge::new(&self.host, &username)?
            }
        };
        Ok(Arc::new(bridge))
    }
}

//! Collaborator traits for talking to a lighting bridge
//!
//! The engine itself never speaks a wire protocol. It consumes two
//! collaborators: [`BridgeAccess`] fetches catalog data and applies resolved
//! actions to real hardware, and [`ConnectionProvider`] establishes a bridge
//! handle on the first link. The stock Hue REST implementations live in
//! [`crate::hue`]; tests substitute in-memory fakes.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::action::CommandAction;
use crate::catalog::{Group, Light, Scene};

/// Read and write access to a lighting bridge.
///
/// The three fetches may fail independently; the engine treats a refresh as
/// all-or-nothing and never publishes a partial catalog.
#[async_trait]
pub trait BridgeAccess: Send + Sync {
    /// Fetch all groups (rooms/zones) known to the bridge.
    async fn fetch_groups(&self) -> Result<Vec<Group>>;

    /// Fetch all individual lights known to the bridge.
    async fn fetch_lights(&self) -> Result<Vec<Light>>;

    /// Fetch all preset scenes known to the bridge.
    async fn fetch_scenes(&self) -> Result<Vec<Scene>>;

    /// Apply a resolved command to the bridge.
    async fn execute(&self, action: &CommandAction) -> Result<()>;
}

/// Establishes a connection to a bridge.
///
/// Invoked at most once per link attempt; credential discovery and
/// persistence are the provider's business, not the engine's.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn BridgeAccess>>;
}

//! Catalog data model and snapshots
//!
//! A [`Snapshot`] is an immutable, internally consistent copy of the groups,
//! lights and scenes known to a bridge at one point in time. A refresh builds
//! a brand-new snapshot from one consistent read; the previously published
//! one is dropped once no query holds a reference to it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::bridge::BridgeAccess;

/// A named collection of lights (a room or zone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: u32,
    pub name: String,
}

/// A single controllable light.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Light {
    pub id: u32,
    pub name: String,
}

/// A preset lighting state scoped to exactly one group.
///
/// Scene ids are opaque strings on the wire; `group` holds the owning group
/// id in the bridge's decimal-string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub name: String,
    pub group: String,
}

/// An immutable copy of the catalog, read-only once constructed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub groups: Vec<Group>,
    pub lights: Vec<Light>,
    pub scenes: Vec<Scene>,
}

impl Snapshot {
    /// Build a snapshot from one consistent bridge read.
    ///
    /// The three fetches run concurrently and are joined; if any of them
    /// fails the whole snapshot is rejected, so callers never observe a
    /// partial catalog.
    pub async fn fetch(bridge: &dyn BridgeAccess) -> Result<Snapshot> {
        let (mut groups, mut lights, mut scenes) = tokio::try_join!(
            bridge.fetch_groups(),
            bridge.fetch_lights(),
            bridge.fetch_scenes(),
        )
        .context("fetching catalog from bridge")?;

        // Wire ordering is not guaranteed; sort so identical catalog state
        // always yields identical snapshots.
        groups.sort_by_key(|g| g.id);
        lights.sort_by_key(|l| l.id);
        scenes.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(Snapshot {
            groups,
            lights,
            scenes,
        })
    }

    /// Iterate over the scenes owned by the given group.
    pub fn scenes_in_group(&self, group_id: u32) -> impl Iterator<Item = &Scene> {
        let id = group_id.to_string();
        self.scenes.iter().filter(move |s| s.group == id)
    }
}

//! lumio - fuzzy command resolution for Hue lighting bridges
//!
//! Turns free-form text like "turn off kitchen" into a ranked list of
//! concrete lighting actions against the rooms, lights and scenes of a
//! linked bridge. Input is split into candidate (entity, change) queries,
//! each candidate is fuzzy-scored against a cached catalog snapshot, and
//! the surviving actions are ranked by a deterministic score tuple. The
//! [`Engine`] owns the snapshot and refreshes it in the background, so
//! queries are fast and never block on the bridge.
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumio::{Engine, HueConnector};
//!
//! # async fn run() -> Result<(), lumio::EngineError> {
//! let connector = HueConnector::new("192.168.1.2", Some("username".to_string()));
//! let engine = Engine::with_connector(Arc::new(connector));
//! engine.link().await?;
//! engine.refresh_now().await?;
//!
//! for ranked in engine.query("turn off kitchen").await? {
//!     println!("{}", ranked.action);
//! }
//! # Ok(())
//! # }
//! ```

mod action;
mod bridge;
mod catalog;
mod engine;
mod hue;
mod index;
mod query;
mod rank;
mod score;

pub use action::{Action, Change, CommandAction, SpecialAction, Target, LINK_ACTION_ID};
pub use bridge::{BridgeAccess, ConnectionProvider};
pub use catalog::{Group, Light, Scene, Snapshot};
pub use engine::{Engine, EngineError};
pub use hue::{HueBridge, HueConnector};
pub use index::Resolver;
pub use query::{parse_queries, Query};
pub use rank::{RankedAction, Results, ScoreVector};
pub use score::{MatchSamples, ScoreBuffer, Scorer, NO_MATCH};

//! Candidate actions produced by resolution
//!
//! An [`Action`] is either a command against a catalog entity (a target plus
//! a resolved change) or a special pseudo-action such as "link bridge",
//! which is returned instead of, never mixed with, catalog results.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Id of the only special action currently defined.
pub const LINK_ACTION_ID: &str = "link";

/// The entity a command applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Group { id: u32, name: String },
    Light { id: u32, name: String },
}

impl Target {
    pub fn id(&self) -> u32 {
        match self {
            Target::Group { id, .. } | Target::Light { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Target::Group { name, .. } | Target::Light { name, .. } => name,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Group { name, .. } => write!(f, "room {name:?}"),
            Target::Light { name, .. } => write!(f, "light {name:?}"),
        }
    }
}

/// A resolved change to apply to a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    On,
    Off,
    Scene { id: String, name: String },
    /// Canonical lowercase hex, e.g. "#ff0000".
    Color(String),
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::On => write!(f, "turn on"),
            Change::Off => write!(f, "turn off"),
            Change::Scene { name, .. } => write!(f, "activate {name:?}"),
            Change::Color(color) => write!(f, "turn {color}"),
        }
    }
}

/// A command against a catalog entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAction {
    pub target: Target,
    pub change: Change,
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.change)
    }
}

/// A non-catalog pseudo-action surfaced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialAction {
    pub id: String,
    pub message: String,
}

impl SpecialAction {
    /// The "link bridge" action, returned whenever no bridge is linked.
    pub fn link() -> Self {
        Self {
            id: LINK_ACTION_ID.to_string(),
            message: "Link bridge".to_string(),
        }
    }
}

/// A candidate result of command resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Command(CommandAction),
    Special(SpecialAction),
}

impl Action {
    pub fn command(target: Target, change: Change) -> Self {
        Action::Command(CommandAction { target, change })
    }

    pub fn as_command(&self) -> Option<&CommandAction> {
        match self {
            Action::Command(command) => Some(command),
            Action::Special(_) => None,
        }
    }

    pub fn is_special(&self) -> bool {
        matches!(self, Action::Special(_))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Command(command) => command.fmt(f),
            Action::Special(special) => write!(f, "special {:?}", special.id),
        }
    }
}

//! Result ranking
//!
//! Every candidate action is finalized into a fixed [`ScoreVector`] 4-tuple
//! (match quality, kind priority, entity index, change index). The whole
//! system treats numerically smaller tuples as better matches, so ranking is
//! a single ascending lexicographic stable sort with no special-cased
//! comparators; actions with identical tuples keep their generation order.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::action::{Action, Change, CommandAction, Target};
use crate::score::MatchSamples;

/// The ordered (matchQuality, kindPriority, entityIndex, changeIndex) tuple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreVector(pub [f64; 4]);

impl ScoreVector {
    /// Finalize the raw sample buffer of an action into its score tuple.
    pub fn compute(action: &Action, samples: &MatchSamples) -> Self {
        ScoreVector([
            match_quality(samples),
            kind_priority(action),
            entity_index(action),
            change_index(action),
        ])
    }

    /// Ascending lexicographic comparison; total over non-NaN scores.
    pub fn cmp_lex(&self, other: &ScoreVector) -> Ordering {
        for (a, b) in self.0.iter().zip(&other.0) {
            match a.total_cmp(b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

/// Combine all retained samples into one quality value.
///
/// The per-column maximum favors whichever split best explains the input
/// rather than averaging over noisy splits; the sum is negated so smaller
/// tuples rank better.
fn match_quality(samples: &MatchSamples) -> f64 {
    let Some(first) = samples.first() else {
        return 0.0;
    };
    let mut maxes = *first;
    for sample in &samples[1..] {
        for (max, &value) in maxes.iter_mut().zip(sample) {
            if value > *max {
                *max = value;
            }
        }
    }
    -(maxes[0] + maxes[1])
}

/// Fixed precedence over target/change kinds; room-level actions generally
/// outrank per-light actions on ties.
fn kind_priority(action: &Action) -> f64 {
    let command = match action {
        Action::Command(command) => command,
        Action::Special(_) => return 5.0,
    };
    match (&command.target, &command.change) {
        (Target::Group { .. }, Change::On | Change::Off) => 0.0,
        (Target::Group { .. }, Change::Color(_)) => 1.0,
        (Target::Group { .. }, Change::Scene { .. }) => 2.0,
        (Target::Light { .. }, Change::On | Change::Off) => 3.0,
        // Assembly never attaches a scene to a light; should that change,
        // it ranks with the other per-light changes, below Special.
        (Target::Light { .. }, Change::Color(_) | Change::Scene { .. }) => 4.0,
    }
}

/// Deterministic tie-break among same-kind entities.
fn entity_index(action: &Action) -> f64 {
    match action {
        Action::Command(command) => -f64::from(command.target.id()),
        Action::Special(_) => 0.0,
    }
}

/// Deterministic tie-break among change kinds.
fn change_index(action: &Action) -> f64 {
    let command = match action {
        Action::Command(command) => command,
        Action::Special(_) => return 0.0,
    };
    match &command.change {
        Change::Scene { id, .. } => id.parse::<i64>().map(|i| i as f64).unwrap_or(0.0),
        Change::On => 1.0,
        Change::Off => 2.0,
        Change::Color(_) => 0.0,
    }
}

/// A resolved action together with its finalized score tuple and the raw
/// score samples that produced it, for callers that want debug output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAction {
    pub action: Action,
    pub score: ScoreVector,
    pub samples: MatchSamples,
}

impl RankedAction {
    /// The single "link bridge" result returned before any bridge is linked.
    pub fn link_special() -> Self {
        let action = Action::Special(crate::action::SpecialAction::link());
        let score = ScoreVector::compute(&action, &MatchSamples::new());
        RankedAction {
            action,
            score,
            samples: MatchSamples::new(),
        }
    }
}

/// Accumulates candidate actions and produces the deterministic ranking.
#[derive(Debug, Default)]
pub struct Results {
    ranked: Vec<RankedAction>,
}

impl Results {
    pub fn with_capacity(capacity: usize) -> Self {
        Results {
            ranked: Vec::with_capacity(capacity),
        }
    }

    /// Add a command candidate with its retained score samples.
    pub fn add(&mut self, target: Target, change: Change, samples: MatchSamples) {
        let action = Action::Command(CommandAction { target, change });
        let score = ScoreVector::compute(&action, &samples);
        self.ranked.push(RankedAction {
            action,
            score,
            samples,
        });
    }

    /// Finish, sorting ascending and lexicographically. The sort is stable,
    /// so identical tuples preserve generation order.
    pub fn into_ranked(mut self) -> Vec<RankedAction> {
        self.ranked.sort_by(|a, b| a.score.cmp_lex(&b.score));
        self.ranked
    }
}

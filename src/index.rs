//! Action assembly
//!
//! The resolver runs the candidate queries against one catalog snapshot:
//! every entity whose name survives the name-dimension pass is combined
//! with every change kind applicable to its kind (groups take on/off,
//! color and their own scenes; lights take on/off and color), and every
//! surviving (name, change) pair becomes one candidate action carrying all
//! of its raw score samples.

use crate::action::{Change, Target};
use crate::catalog::Snapshot;
use crate::query::Query;
use crate::rank::{RankedAction, Results};
use crate::score::{ScoreBuffer, Scorer};

/// Resolves candidate queries against snapshots.
///
/// Owns the scorer and the scratch buffer, which is cleared before each
/// entity so no scores leak between entities or calls.
#[derive(Default)]
pub struct Resolver {
    scorer: Scorer,
    buffer: ScoreBuffer,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a set of candidate queries into a ranked action list.
    ///
    /// Pure with respect to the snapshot: identical queries against an
    /// unchanged snapshot produce identical ordered results.
    pub fn resolve(&mut self, snapshot: &Snapshot, queries: &[Query]) -> Vec<RankedAction> {
        let Resolver { scorer, buffer } = self;
        let mut results = Results::with_capacity(snapshot.groups.len() + snapshot.lights.len());

        for group in &snapshot.groups {
            buffer.reset(queries);
            if !buffer.score_names(|q| scorer.text(&q.name, &group.name)) {
                continue;
            }
            let target = || Target::Group {
                id: group.id,
                name: group.name.clone(),
            };

            let samples = buffer.finalize(|q| scorer.on_off(&q.change, true));
            if !samples.is_empty() {
                results.add(target(), Change::On, samples);
            }

            let samples = buffer.finalize(|q| scorer.on_off(&q.change, false));
            if !samples.is_empty() {
                results.add(target(), Change::Off, samples);
            }

            let (samples, color) = buffer.finalize_color();
            if let (false, Some(color)) = (samples.is_empty(), color) {
                results.add(target(), Change::Color(color), samples);
            }

            // Scenes are reachable only through their owning group.
            for scene in snapshot.scenes_in_group(group.id) {
                let samples = buffer.finalize(|q| scorer.scene_name(&q.change, &scene.name));
                if !samples.is_empty() {
                    results.add(
                        target(),
                        Change::Scene {
                            id: scene.id.clone(),
                            name: scene.name.clone(),
                        },
                        samples,
                    );
                }
            }
        }

        for light in &snapshot.lights {
            buffer.reset(queries);
            if !buffer.score_names(|q| scorer.text(&q.name, &light.name)) {
                continue;
            }
            let target = || Target::Light {
                id: light.id,
                name: light.name.clone(),
            };

            let samples = buffer.finalize(|q| scorer.on_off(&q.change, true));
            if !samples.is_empty() {
                results.add(target(), Change::On, samples);
            }

            let samples = buffer.finalize(|q| scorer.on_off(&q.change, false));
            if !samples.is_empty() {
                results.add(target(), Change::Off, samples);
            }

            let (samples, color) = buffer.finalize_color();
            if let (false, Some(color)) = (samples.is_empty(), color) {
                results.add(target(), Change::Color(color), samples);
            }
        }

        results.into_ranked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, Change, Target};
    use crate::catalog::{Group, Light, Scene};
    use crate::query::parse_queries;

    fn snapshot() -> Snapshot {
        Snapshot {
            groups: vec![Group {
                id: 1,
                name: "Kitchen".to_string(),
            }],
            lights: vec![Light {
                id: 10,
                name: "Lamp".to_string(),
            }],
            scenes: vec![
                Scene {
                    id: "5".to_string(),
                    name: "Reading".to_string(),
                    group: "1".to_string(),
                },
                Scene {
                    id: "7".to_string(),
                    name: "Reading".to_string(),
                    group: "2".to_string(),
                },
            ],
        }
    }

    fn resolve(input: &str) -> Vec<RankedAction> {
        Resolver::new().resolve(&snapshot(), &parse_queries(input))
    }

    fn commands(ranked: &[RankedAction]) -> Vec<(Target, Change)> {
        ranked
            .iter()
            .map(|r| {
                let command = r.action.as_command().expect("command action");
                (command.target.clone(), command.change.clone())
            })
            .collect()
    }

    #[test]
    fn test_turn_off_kitchen_resolves_to_group_off() {
        let ranked = resolve("turn off kitchen");
        assert!(!ranked.is_empty());

        let first = ranked[0].action.as_command().unwrap();
        assert_eq!(
            first.target,
            Target::Group {
                id: 1,
                name: "Kitchen".to_string()
            }
        );
        assert_eq!(first.change, Change::Off);

        // Lamp shares no overlap with the input and must not surface.
        for (target, _) in commands(&ranked) {
            assert!(matches!(target, Target::Group { .. }));
        }
    }

    #[test]
    fn test_scene_resolves_only_for_owning_group() {
        let ranked = resolve("kitchen to reading");

        let scenes: Vec<_> = commands(&ranked)
            .into_iter()
            .filter_map(|(target, change)| match change {
                Change::Scene { id, .. } => Some((target, id)),
                _ => None,
            })
            .collect();

        // Scene "7" belongs to group 2 and must never surface for group 1.
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].1, "5");
        assert_eq!(scenes[0].0.id(), 1);
    }

    #[test]
    fn test_scene_ranks_first_for_scene_query() {
        let ranked = resolve("kitchen to reading");
        let first = ranked[0].action.as_command().unwrap();
        assert!(matches!(&first.change, Change::Scene { id, .. } if id == "5"));
    }

    #[test]
    fn test_color_change_resolves() {
        let ranked = resolve("kitchen to #ff0000");
        let first = ranked[0].action.as_command().unwrap();
        assert_eq!(first.change, Change::Color("#ff0000".to_string()));
        assert_eq!(first.target.id(), 1);
    }

    #[test]
    fn test_non_color_yields_no_color_action() {
        let ranked = resolve("kitchen to notacolor");
        for (_, change) in commands(&ranked) {
            assert!(!matches!(change, Change::Color(_)));
        }
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let first = resolve("kitchen on");
        let second = resolve("kitchen on");
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_duplicate_actions() {
        let ranked = resolve("kitchen");
        let mut seen = Vec::new();
        for (target, change) in commands(&ranked) {
            let key = (target, change);
            assert!(!seen.contains(&key), "duplicate action {key:?}");
            seen.push(key);
        }
    }

    #[test]
    fn test_empty_queries_yield_no_actions() {
        let ranked = Resolver::new().resolve(&snapshot(), &[]);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_unconstrained_change_offers_on_and_off() {
        // "kitchen" alone leaves the change unconstrained; both switches
        // surface, on before off.
        let ranked = resolve("kitchen");
        let changes: Vec<Change> = commands(&ranked)
            .into_iter()
            .filter(|(target, _)| target.id() == 1)
            .map(|(_, change)| change)
            .collect();
        let on = changes.iter().position(|c| *c == Change::On);
        let off = changes.iter().position(|c| *c == Change::Off);
        assert!(on.is_some() && off.is_some());
        assert!(on < off);
    }
}

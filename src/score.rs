//! Fuzzy match scoring
//!
//! Two pure, deterministic, case-insensitive scorers drive resolution:
//! entity-name scoring (fuzzy subsequence gate plus Levenshtein distance
//! normalized by target length) and change scoring (on/off keywords, scene
//! names, CSS color expressions). Scores live in [0, 1] with 0 meaning an
//! exact match; [`NO_MATCH`] marks candidates to discard, never a numeric
//! worst case.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher as FuzzyMatcherTrait;

use crate::query::Query;

/// Sentinel for fragments sharing no fuzzy overlap with the target.
pub const NO_MATCH: f64 = -1.0;

/// Raw (name score, change score) samples, one per surviving candidate
/// query. All samples are retained; finalization takes per-column maxima.
pub type MatchSamples = Vec<[f64; 2]>;

/// Fuzzy scorer for query fragments.
pub struct Scorer {
    matcher: SkimMatcherV2,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer {
    pub fn new() -> Self {
        Self {
            matcher: SkimMatcherV2::default(),
        }
    }

    /// Score a fragment against a target string.
    ///
    /// An empty target is a perfect match, so unnamed entities are never
    /// penalized. An empty fragment matches everything at the weakest valid
    /// score. Otherwise the fragment must fuzzy-match the target as a
    /// subsequence or [`NO_MATCH`] is returned, and the score is the edit
    /// distance normalized by the target length.
    pub fn text(&self, fragment: &str, target: &str) -> f64 {
        if target.is_empty() {
            return 0.0;
        }
        let fragment = fragment.to_lowercase();
        let target = target.to_lowercase();
        if fragment.is_empty() {
            return 1.0;
        }
        if self.matcher.fuzzy_match(&target, &fragment).is_none() {
            return NO_MATCH;
        }
        let len = target.chars().count();
        levenshtein(&fragment, &target) as f64 / len as f64
    }

    /// Score a change fragment against the literal "on"/"off" keyword.
    pub fn on_off(&self, fragment: &str, on: bool) -> f64 {
        self.text(fragment, if on { "on" } else { "off" })
    }

    /// Score a change fragment against a scene name.
    pub fn scene_name(&self, fragment: &str, name: &str) -> f64 {
        self.text(fragment, name)
    }
}

/// Parse a change fragment as a CSS color expression (hex, named or
/// functional syntax).
///
/// Only fully opaque colors resolve; the canonical lowercase hex string is
/// returned alongside a perfect score.
pub fn parse_color(fragment: &str) -> Option<(String, f64)> {
    match csscolorparser::parse(fragment) {
        Ok(color) if color.a >= 1.0 => Some((color.to_hex_string(), 0.0)),
        _ => None,
    }
}

/// Levenshtein distance between two strings, by character.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev_row: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr_row = vec![0; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_chars.len()]
}

/// Scratch buffer for scoring one entity against all candidate queries.
///
/// `reset` clears any prior state, so a single buffer can be reused across
/// entities within one resolution pass without leaking scores between them.
#[derive(Debug, Default)]
pub struct ScoreBuffer {
    queries: Vec<Query>,
    names: Vec<f64>,
}

impl ScoreBuffer {
    /// Load a fresh set of candidate queries, dropping all prior state.
    pub fn reset(&mut self, queries: &[Query]) {
        self.queries.clear();
        self.queries.extend_from_slice(queries);
        self.names.clear();
    }

    /// Run the name-dimension pass, discarding non-matching candidates.
    ///
    /// Returns false when no candidate survives, in which case the entity
    /// can be skipped entirely.
    pub fn score_names(&mut self, mut scoring: impl FnMut(&Query) -> f64) -> bool {
        let queries = std::mem::take(&mut self.queries);
        self.names.clear();
        for query in queries {
            let score = scoring(&query);
            if score < 0.0 {
                continue;
            }
            self.names.push(score);
            self.queries.push(query);
        }
        !self.queries.is_empty()
    }

    /// Run a change-dimension pass without consuming the survivors.
    ///
    /// Every candidate whose change fragment matches contributes one
    /// (name score, change score) sample.
    pub fn finalize(&self, mut scoring: impl FnMut(&Query) -> f64) -> MatchSamples {
        let mut samples = MatchSamples::new();
        for (query, &name_score) in self.queries.iter().zip(&self.names) {
            let score = scoring(query);
            if score < 0.0 {
                continue;
            }
            samples.push([name_score, score]);
        }
        samples
    }

    /// Change-dimension pass for colors, carrying the canonical color of the
    /// first matching candidate as a typed annotation.
    pub fn finalize_color(&self) -> (MatchSamples, Option<String>) {
        let mut samples = MatchSamples::new();
        let mut annotation = None;
        for (query, &name_score) in self.queries.iter().zip(&self.names) {
            let Some((color, score)) = parse_color(&query.change) else {
                continue;
            };
            if annotation.is_none() {
                annotation = Some(color);
            }
            samples.push([name_score, score]);
        }
        (samples, annotation)
    }
}

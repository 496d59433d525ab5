//! Query candidate generation
//!
//! Command word order is not fixed: "turn off kitchen", "kitchen off" and
//! "kitchen to reading scene" all mean something. Rather than hand-coding
//! grammar rules, the generator enumerates every contiguous split of the
//! input into a (name fragment, change fragment) pair, in both orders, and
//! lets the scorer discover which split corresponds to a real entity name
//! versus a real change expression.

use std::fmt;

/// A single candidate interpretation of the input.
///
/// `name` is fuzzy-matched against entity names, `change` against a change
/// expression (on/off keyword, scene name, color). Either fragment may be
/// empty, which matches everything weakly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub name: String,
    pub change: String,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} -> {:?}", self.name, self.change)
    }
}

/// Words that carry no signal for matching and are dropped during
/// normalization ("turn off the kitchen" == "kitchen off").
fn is_filler_word(word: &str) -> bool {
    matches!(
        word,
        "the" | "a" | "an" | "to" | "in" | "at" | "for" | "and" | "my" | "please" | "turn"
    )
}

/// Normalize input into lowercase content tokens.
fn tokenize(input: &str) -> Vec<String> {
    input
        .split_whitespace()
        .map(|s| s.to_lowercase())
        .filter(|s| !is_filler_word(s))
        .collect()
}

/// Generate all candidate queries for the input.
///
/// For n content tokens this yields exactly 2(n+1) candidates: for every
/// split point i the pair (name=tokens[..i], change=tokens[i..]) and its
/// swap. Empty input yields no candidates. Performs no catalog lookups and
/// cannot fail.
pub fn parse_queries(input: &str) -> Vec<Query> {
    let tokens = tokenize(input);
    let n = tokens.len();
    if n == 0 {
        return Vec::new();
    }

    let mut queries = Vec::with_capacity(2 * (n + 1));
    for i in 0..=n {
        let head = tokens[..i].join(" ");
        let tail = tokens[i..].join(" ");
        queries.push(Query {
            name: head.clone(),
            change: tail.clone(),
        });
        queries.push(Query {
            name: tail,
            change: head,
        });
    }
    queries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("turn off the kitchen"), vec!["off", "kitchen"]);
        assert_eq!(tokenize("Kitchen TO Reading"), vec!["kitchen", "reading"]);
        assert_eq!(tokenize("  multiple   spaces  "), vec!["multiple", "spaces"]);
        assert!(tokenize("").is_empty());
        assert!(tokenize("turn the to").is_empty());
    }

    #[test]
    fn test_is_filler_word() {
        assert!(is_filler_word("the"));
        assert!(is_filler_word("to"));
        assert!(is_filler_word("turn"));
        assert!(!is_filler_word("on"));
        assert!(!is_filler_word("off"));
        assert!(!is_filler_word("kitchen"));
    }

    #[test]
    fn test_candidate_count() {
        for (input, n) in [
            ("kitchen", 1),
            ("kitchen off", 2),
            ("turn off kitchen lights now", 4),
        ] {
            let queries = parse_queries(input);
            assert_eq!(queries.len(), 2 * (n + 1), "input {input:?}");
        }
    }

    #[test]
    fn test_empty_input_yields_no_candidates() {
        assert!(parse_queries("").is_empty());
        assert!(parse_queries("   ").is_empty());
        assert!(parse_queries("turn the").is_empty());
    }

    #[test]
    fn test_every_split_appears_in_both_orders() {
        let queries = parse_queries("off kitchen");
        // Splits of ["off", "kitchen"] at i = 0, 1, 2, each with its swap.
        let expect = |name: &str, change: &str| Query {
            name: name.to_string(),
            change: change.to_string(),
        };
        for pair in [
            expect("", "off kitchen"),
            expect("off kitchen", ""),
            expect("off", "kitchen"),
            expect("kitchen", "off"),
        ] {
            assert!(queries.contains(&pair), "missing candidate {pair}");
        }
    }

    #[test]
    fn test_filler_words_do_not_change_candidates() {
        assert_eq!(
            parse_queries("turn off the kitchen"),
            parse_queries("off kitchen")
        );
        assert_eq!(
            parse_queries("kitchen to reading"),
            parse_queries("kitchen reading")
        );
    }
}

//! Obfuscation heuristic.
//!
//! Counts three signals that rarely appear in hand-written plugin code:
//! long string literals with no whitespace, runs of hex/unicode escapes,
//! and chained bracket-string property access (`a["x"]["y"]["z"]`).

use regex_lite::Regex;
use std::sync::LazyLock;

static LONG_OPAQUE_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""[^"\s]{100,}"|'[^'\s]{100,}'"#).expect("invalid built-in obfuscation pattern")
});

static ESCAPE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\\x[0-9a-fA-F]{2}|\\u[0-9a-fA-F]{4}){4,}")
        .expect("invalid built-in obfuscation pattern")
});

static BRACKET_CHAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:\[\s*['"][^'"\]]*['"]\s*\]){3,}"#)
        .expect("invalid built-in obfuscation pattern")
});

/// Per-signal counts for one source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ObfuscationScore {
    pub long_strings: usize,
    pub escape_runs: usize,
    pub bracket_chains: usize,
}

impl ObfuscationScore {
    pub fn total(&self) -> usize {
        self.long_strings + self.escape_runs + self.bracket_chains
    }
}

pub(crate) fn score(source: &str) -> ObfuscationScore {
    ObfuscationScore {
        long_strings: LONG_OPAQUE_STRING.find_iter(source).count(),
        escape_runs: ESCAPE_RUN.find_iter(source).count(),
        bracket_chains: BRACKET_CHAIN.find_iter(source).count(),
    }
}

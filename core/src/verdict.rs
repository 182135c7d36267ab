//! Verdict classification for free-text analysis responses.
//!
//! The analysis service is asked to answer with a labeled `VERDICT:` section
//! carrying one of two glyphs, but nothing enforces that format. The
//! classifier therefore layers several rules, and whenever the text does not
//! say clearly that the rules were broken it answers "no violation": a false
//! positive escalates disruption of the user's session, a false negative
//! only delays it by a cycle.

use serde::{Deserialize, Serialize};

/// Glyph the service uses for "follows the rules".
pub const COMPLIANT_GLYPH: char = '○';

/// Glyph the service uses for "violates the rules".
pub const VIOLATING_GLYPH: char = '×';

/// Labels that introduce a verdict section. Matched ASCII-case-insensitively
/// and followed by `:` or `：`.
const SECTION_MARKERS: &[&str] = &["verdict", "判定"];

/// Characters tolerated between a marker, its colon and the glyph.
const DECORATION: &[char] = &['*', '_', '`', '#', '[', ']', '(', ')', '"', '\''];

/// Words that suggest a violation when no glyph settled the question.
const VIOLATION_KEYWORDS: &[&str] = &[
    "violation",
    "violates",
    "violating",
    "not allowed",
    "inappropriate",
    "違反",
    "問題あり",
    "不適切",
];

/// Which transport produced the response.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// Gemini HTTP API.
    Api,
    /// `gemini` command-line tool.
    Cli,
}

impl std::fmt::Display for VerdictSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api => f.write_str("api"),
            Self::Cli => f.write_str("cli"),
        }
    }
}

/// Which rule decided the classification.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerdictBasis {
    /// A labeled verdict section carried a glyph.
    LabeledSection,
    /// Labeled sections disagreed with each other.
    ConflictingSections,
    /// A line started with a glyph.
    LeadingGlyph,
    /// Violation keywords without a compliant glyph.
    AmbiguousKeywords { keywords: Vec<String> },
    /// Nothing in the text pointed either way.
    NoSignal,
    /// Empty or whitespace-only text.
    Empty,
}

impl VerdictBasis {
    /// Whether the result is a fail-closed fallback rather than a reading.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            Self::ConflictingSections | Self::AmbiguousKeywords { .. } | Self::NoSignal
        )
    }
}

/// Output of [`classify`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub is_violation: bool,
    pub display_text: String,
    pub basis: VerdictBasis,
}

/// Classified outcome of one analysis response.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_violation: bool,
    pub raw_text: String,
    pub display_text: String,
    pub basis: VerdictBasis,
    pub source: VerdictSource,
}

impl Verdict {
    pub fn from_response(raw_text: String, source: VerdictSource) -> Self {
        let Classification {
            is_violation,
            display_text,
            basis,
        } = classify(&raw_text);
        Self {
            is_violation,
            raw_text,
            display_text,
            basis,
            source,
        }
    }
}

/// Classify raw verdict text. Total and side-effect free.
pub fn classify(raw_text: &str) -> Classification {
    let trimmed = raw_text.trim();
    if trimmed.is_empty() {
        return Classification {
            is_violation: false,
            display_text: "(empty response)".to_string(),
            basis: VerdictBasis::Empty,
        };
    }
    let display_text = trimmed.to_string();

    let labeled = labeled_glyphs(trimmed);
    if let Some(&first) = labeled.first() {
        if labeled.iter().all(|&violation| violation == first) {
            return Classification {
                is_violation: first,
                display_text,
                basis: VerdictBasis::LabeledSection,
            };
        }
        return Classification {
            is_violation: false,
            display_text,
            basis: VerdictBasis::ConflictingSections,
        };
    }

    if let Some(is_violation) = leading_glyph(trimmed) {
        return Classification {
            is_violation,
            display_text,
            basis: VerdictBasis::LeadingGlyph,
        };
    }

    let lower = trimmed.to_lowercase();
    let keywords: Vec<String> = VIOLATION_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .map(|kw| (*kw).to_string())
        .collect();
    let basis = if !keywords.is_empty() && !trimmed.contains(COMPLIANT_GLYPH) {
        VerdictBasis::AmbiguousKeywords { keywords }
    } else {
        VerdictBasis::NoSignal
    };

    Classification {
        is_violation: false,
        display_text,
        basis,
    }
}

fn glyph_meaning(c: char) -> Option<bool> {
    match c {
        VIOLATING_GLYPH => Some(true),
        COMPLIANT_GLYPH => Some(false),
        _ => None,
    }
}

/// Glyphs found right after each labeled section, in order of appearance.
fn labeled_glyphs(text: &str) -> Vec<bool> {
    let mut found = Vec::new();
    for (idx, _) in text.char_indices() {
        for marker in SECTION_MARKERS {
            let Some(candidate) = text.get(idx..idx + marker.len()) else {
                continue;
            };
            if !candidate.eq_ignore_ascii_case(marker) {
                continue;
            }
            if let Some(violation) = glyph_after_marker(&text[idx + marker.len()..]) {
                found.push(violation);
            }
        }
    }
    found
}

fn glyph_after_marker(rest: &str) -> Option<bool> {
    let rest = skip_decoration(rest);
    let rest = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('：'))?;
    let rest = skip_decoration(rest);
    rest.chars().next().and_then(glyph_meaning)
}

fn skip_decoration(s: &str) -> &str {
    s.trim_start_matches(|c: char| c.is_whitespace() || DECORATION.contains(&c))
}

/// First line whose content starts with a glyph.
fn leading_glyph(text: &str) -> Option<bool> {
    text.lines()
        .filter_map(|line| skip_decoration(line).chars().next())
        .find_map(glyph_meaning)
}

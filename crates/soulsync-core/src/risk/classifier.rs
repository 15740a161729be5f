//! Keyword classifier with label precedence.
//!
//! Pattern groups are tried in severity order and the first group with any match wins.
//! A closed `{{Label}}` tag ending the text overrides keyword matching. Tags elsewhere and
//! unterminated fragments are removed from the display text but never suppress keywords.

use super::label::{strip_labels, trailing_label, LabelTag};
use super::{Confidence, RiskAssessment, RiskCategory};
use once_cell::sync::Lazy;
use regex::Regex;

/// Ordered `(category, patterns)` pairs. Earlier groups take priority.
pub const PATTERN_GROUPS: &[(RiskCategory, &[&str])] = &[
    (
        RiskCategory::Suicidal,
        &[
            r"kill(?:ing)? myself",
            r"suicid(?:e|al)",
            r"want(?:ed)? to die",
            r"end (?:it all|my life)",
            r"better off dead",
            r"no reason to live",
            r"self[- ]?harm(?:ing)?",
            r"hurt(?:ing)? myself",
            r"cut(?:ting)? myself",
            r"take my own life",
            r"overdos(?:e|ing)",
            r"(?:don['’]?t|do not) want to (?:live|be alive|wake up)",
        ],
    ),
    (
        RiskCategory::Depression,
        &[
            r"depress(?:ed|ion|ing)",
            r"hopeless(?:ness)?",
            r"worthless",
            r"empty inside",
            r"nothing matters",
            r"can['’]?t get out of bed",
            r"numb",
            r"lost (?:all )?interest",
            r"miserable",
        ],
    ),
    (
        RiskCategory::MoodShift,
        &[
            r"mood swings?",
            r"manic",
            r"mania",
            r"bipolar",
            r"racing thoughts",
            r"ups and downs",
        ],
    ),
    (
        RiskCategory::Personality,
        &[
            r"(?:don['’]?t|do not) know who i am",
            r"identity crisis",
            r"abandon(?:ed|ment)?",
            r"everyone leaves",
            r"unstable relationships?",
            r"fear of being alone",
        ],
    ),
    (
        RiskCategory::Anxiety,
        &[
            r"anxi(?:ous|ety)",
            r"panic(?:king| attacks?)?",
            r"worr(?:ied|y|ying)",
            r"nervous",
            r"on edge",
            r"heart (?:is )?racing",
            r"can['’]?t breathe",
            r"scared",
            r"afraid",
        ],
    ),
    (
        RiskCategory::Stress,
        &[
            r"stress(?:ed|ful)?",
            r"overwhelm(?:ed|ing)?",
            r"pressure",
            r"burn(?:ed|t)? out",
            r"burnout",
            r"exhausted",
            r"deadlines?",
            r"tense",
        ],
    ),
];

static COMPILED_GROUPS: Lazy<Vec<(RiskCategory, Regex)>> = Lazy::new(|| {
    PATTERN_GROUPS
        .iter()
        .map(|(category, patterns)| {
            let alternation = patterns.join("|");
            let re = Regex::new(&format!(r"(?i)\b(?:{})\b", alternation))
                .expect("built-in risk patterns are valid");
            (*category, re)
        })
        .collect()
});

/// Stateless classifier over the built-in pattern groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskClassifier;

impl RiskClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a single text. A closed tag at the end of `text` wins over keywords;
    /// otherwise keywords are matched against the full text. Empty text is `none`.
    pub fn classify(&self, text: &str) -> RiskAssessment {
        let stripped = strip_labels(text);
        if let Some(tag) = trailing_label(text) {
            return from_label(&tag, text, stripped.display);
        }
        let (category, confidence) = match match_keywords(text) {
            Some(c) => (c, Confidence::RegexMatch),
            None => (RiskCategory::None, Confidence::FallbackDefault),
        };
        RiskAssessment {
            category,
            source_text: text.to_string(),
            display_text: stripped.display,
            confidence,
        }
    }

    /// Classify a turn using the generator's reply when it carries a tag, otherwise the
    /// user's own words. `display_text` is always the reply with tags removed.
    pub fn assess(&self, user_text: &str, generator_output: &str) -> RiskAssessment {
        let reply = strip_labels(generator_output);
        if let Some(tag) = reply.label {
            return from_label(&tag, generator_output, reply.display);
        }
        let (category, confidence) = match match_keywords(user_text) {
            Some(c) => (c, Confidence::RegexMatch),
            None => (RiskCategory::None, Confidence::FallbackDefault),
        };
        RiskAssessment {
            category,
            source_text: user_text.to_string(),
            display_text: reply.display,
            confidence,
        }
    }
}

fn from_label(tag: &LabelTag, source: &str, display: String) -> RiskAssessment {
    let confidence = match tag {
        LabelTag::Known(_) => Confidence::ModelLabel,
        LabelTag::Unknown(_) | LabelTag::Malformed => Confidence::FallbackDefault,
    };
    RiskAssessment {
        category: tag.category(),
        source_text: source.to_string(),
        display_text: display,
        confidence,
    }
}

fn match_keywords(text: &str) -> Option<RiskCategory> {
    if text.trim().is_empty() {
        return None;
    }
    COMPILED_GROUPS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(category, _)| *category)
}

//! Risk vocabulary shared by every surface: one canonical category enum, its severity tiers,
//! and the immutable assessment attached to a chat turn.

mod classifier;
mod label;

pub use classifier::{RiskClassifier, PATTERN_GROUPS};
pub use label::{strip_labels, trailing_label, LabelStreamFilter, LabelTag, StrippedText, MAX_LABEL_LEN};

use serde::{Deserialize, Serialize};

/// Severity tier. `None < Elevated < Severe < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Elevated,
    Severe,
    Critical,
}

/// Emotional-risk category for a chat turn.
///
/// Elevated categories share a tier; compare tiers with [`RiskCategory::level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    None,
    Stress,
    Anxiety,
    Personality,
    MoodShift,
    Depression,
    Suicidal,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 7] = [
        Self::None,
        Self::Stress,
        Self::Anxiety,
        Self::Personality,
        Self::MoodShift,
        Self::Depression,
        Self::Suicidal,
    ];

    pub fn level(&self) -> RiskLevel {
        match self {
            Self::None => RiskLevel::None,
            Self::Stress | Self::Anxiety | Self::Personality | Self::MoodShift => RiskLevel::Elevated,
            Self::Depression => RiskLevel::Severe,
            Self::Suicidal => RiskLevel::Critical,
        }
    }

    /// Anything above `None` qualifies for the consent gate.
    pub fn is_actionable(&self) -> bool {
        self.level() > RiskLevel::None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Stress => "stress",
            Self::Anxiety => "anxiety",
            Self::Personality => "personality",
            Self::MoodShift => "mood_shift",
            Self::Depression => "depression",
            Self::Suicidal => "suicidal",
        }
    }

    /// Human-readable state used in notification copy.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::None => "No concern",
            Self::Stress => "Stress",
            Self::Anxiety => "Anxiety",
            Self::Personality => "Identity and relationship concerns",
            Self::MoodShift => "Mood fluctuations",
            Self::Depression => "Depression",
            Self::Suicidal => "Thoughts of self-harm",
        }
    }

    /// Parse a generator label (`Normal`, `Depression`, `Suicidal`, `Anxiety`, `Bipolar`,
    /// `Stress`, `Personality`, `Personality disorder`). Exact match, case-insensitive.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(Self::None),
            "stress" => Some(Self::Stress),
            "anxiety" => Some(Self::Anxiety),
            "personality" | "personality disorder" => Some(Self::Personality),
            "bipolar" => Some(Self::MoodShift),
            "depression" => Some(Self::Depression),
            "suicidal" => Some(Self::Suicidal),
            _ => None,
        }
    }

    /// Deterministic score shown to moderators; monotone in severity.
    pub fn risk_score(&self) -> f32 {
        match self {
            Self::None => 0.0,
            Self::Stress => 0.35,
            Self::Anxiety => 0.4,
            Self::Personality => 0.45,
            Self::MoodShift => 0.5,
            Self::Depression => 0.7,
            Self::Suicidal => 0.95,
        }
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the category was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    RegexMatch,
    ModelLabel,
    FallbackDefault,
}

/// Classification result for one turn. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub category: RiskCategory,
    /// Text as received, tags included.
    pub source_text: String,
    /// Text safe to show the end user: every label tag removed, whitespace trimmed.
    pub display_text: String,
    pub confidence: Confidence,
}

impl RiskAssessment {
    pub fn level(&self) -> RiskLevel {
        self.category.level()
    }
}

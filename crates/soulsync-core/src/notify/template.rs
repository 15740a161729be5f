//! Alert copy sent to emergency contacts. Plain text, deterministic for a given context.

use crate::risk::{RiskCategory, RiskLevel};
use chrono::{DateTime, Utc};

pub const HELPLINE_LINE: &str =
    "Crisis support (US): call or text 988 (Suicide & Crisis Lifeline), or text HOME to 741741.";

/// Inputs for one alert.
#[derive(Debug, Clone)]
pub struct AlertContext<'a> {
    pub category: RiskCategory,
    pub user_name: &'a str,
    pub contact_name: Option<&'a str>,
    /// Optional empathetic sentence from the text generator.
    pub framing: Option<&'a str>,
    pub at: DateTime<Utc>,
}

fn situation(category: RiskCategory, user: &str) -> String {
    match category {
        RiskCategory::Suicidal => format!(
            "URGENT: {user} may be having thoughts of self-harm or suicide. Please reach out to them \
             right away, and contact emergency services if they may be in danger."
        ),
        RiskCategory::Depression => format!(
            "{user} appears to be going through signs of depression. Your support and understanding \
             could mean a lot right now."
        ),
        RiskCategory::Anxiety => format!(
            "{user} is showing signs of strong anxiety. Your reassurance could really help."
        ),
        RiskCategory::Stress => format!(
            "{user} seems to be under a lot of stress. A caring check-in could make a difference."
        ),
        RiskCategory::MoodShift => format!(
            "{user} may be experiencing mood fluctuations. Steady support from you could help."
        ),
        RiskCategory::Personality => format!(
            "{user} seems to be working through identity and relationship concerns. Your understanding could help."
        ),
        RiskCategory::None => format!("{user} may need some emotional support at the moment."),
    }
}

fn actions(category: RiskCategory) -> &'static [&'static str] {
    if category.level() == RiskLevel::Critical {
        &[
            "Call or text them now.",
            "If they are in immediate danger, call 911.",
            "Encourage them to contact 988, the Suicide & Crisis Lifeline.",
            "Stay with them until help arrives if you can.",
        ]
    } else {
        &[
            "Reach out with a caring message or call.",
            "Listen without judgment.",
            "Encourage them to talk to a professional.",
            "Check in again over the next few days.",
        ]
    }
}

/// Build the alert text.
pub fn compose_alert(ctx: &AlertContext<'_>) -> String {
    let user = match ctx.user_name.trim() {
        "" => "Your friend",
        name => name,
    };
    let mut lines: Vec<String> = vec!["SoulSync Alert".to_string(), String::new()];

    if let Some(contact) = ctx.contact_name.map(str::trim).filter(|c| !c.is_empty()) {
        lines.push(format!("Hi {contact},"));
    }
    if let Some(framing) = ctx.framing.map(str::trim).filter(|f| !f.is_empty()) {
        lines.push(framing.to_string());
    }
    lines.push(situation(ctx.category, user));
    lines.push(String::new());
    lines.push(format!("User: {user}"));
    lines.push(format!("Detected state: {}", ctx.category.display_name()));
    lines.push(format!("Time: {}", ctx.at.format("%Y-%m-%d %H:%M UTC")));
    lines.push(String::new());
    lines.push("What you can do:".to_string());
    lines.extend(actions(ctx.category).iter().map(|a| format!("- {a}")));
    lines.push(String::new());
    lines.push(HELPLINE_LINE.to_string());
    lines.push("Automated message from SoulSync.".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx(category: RiskCategory) -> AlertContext<'static> {
        AlertContext {
            category,
            user_name: "Alex",
            contact_name: Some("Sam"),
            framing: None,
            at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn critical_copy_is_urgent_with_emergency_numbers() {
        let text = compose_alert(&ctx(RiskCategory::Suicidal));
        assert!(text.starts_with("SoulSync Alert"));
        assert!(text.contains("Hi Sam,"));
        assert!(text.contains("URGENT: Alex"));
        assert!(text.contains("911"));
        assert!(text.contains("988"));
        assert!(text.contains("text HOME to 741741"));
        assert!(text.contains("Time: 2026-03-01 09:30 UTC"));
    }

    #[test]
    fn elevated_copy_is_a_check_in() {
        let text = compose_alert(&ctx(RiskCategory::Stress));
        assert!(!text.contains("URGENT"));
        assert!(text.contains("Alex seems to be under a lot of stress"));
        assert!(text.contains("Detected state: Stress"));
        assert!(text.ends_with("Automated message from SoulSync."));
    }

    #[test]
    fn framing_and_missing_names() {
        let mut c = ctx(RiskCategory::Depression);
        c.framing = Some("  Thank you for being there for them.  ");
        c.contact_name = None;
        c.user_name = " ";
        let text = compose_alert(&c);
        assert!(text.contains("\nThank you for being there for them.\n"));
        assert!(!text.contains("Hi "));
        assert!(text.contains("User: Your friend"));
    }

    #[test]
    fn same_context_same_text() {
        assert_eq!(
            compose_alert(&ctx(RiskCategory::Anxiety)),
            compose_alert(&ctx(RiskCategory::Anxiety))
        );
    }
}

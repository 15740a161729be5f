//! Classifier behaviour through the public API.

use soulsync_core::{strip_labels, Confidence, LabelStreamFilter, LabelTag, RiskCategory, RiskClassifier, RiskLevel};

#[test]
fn first_matching_group_wins() {
    let c = RiskClassifier::new();
    let cases = [
        ("I'm stressed, anxious, depressed and I want to end it all", RiskCategory::Suicidal),
        ("anxious and depressed", RiskCategory::Depression),
        ("manic one day, panicking the next", RiskCategory::MoodShift),
        ("everyone leaves me and I'm nervous", RiskCategory::Personality),
        ("on edge because of the pressure", RiskCategory::Anxiety),
        ("feeling burnt out", RiskCategory::Stress),
        ("we went hiking, lovely weather", RiskCategory::None),
    ];
    for (text, expected) in cases {
        assert_eq!(c.classify(text).category, expected, "{text}");
    }
}

#[test]
fn label_beats_keywords_and_is_stripped() {
    let a = RiskClassifier::new().classify("Glad you had a nice walk! {{Normal}}");
    assert_eq!(a.category, RiskCategory::None);
    assert_eq!(a.confidence, Confidence::ModelLabel);
    assert_eq!(a.display_text, "Glad you had a nice walk!");

    let a = RiskClassifier::new().classify("I had a fine day {{Bipolar}}");
    assert_eq!(a.category, RiskCategory::MoodShift);
    assert_eq!(a.level(), RiskLevel::Elevated);
}

#[test]
fn unterminated_fragment_in_user_text_keeps_keywords() {
    let a = RiskClassifier::new().classify("I want to die {{Suic");
    assert_eq!(a.category, RiskCategory::Suicidal);
    assert_eq!(a.confidence, Confidence::RegexMatch);
    assert_eq!(a.display_text, "I want to die");
}

#[test]
fn only_a_closing_tag_counts_as_a_label() {
    let c = RiskClassifier::new();
    for text in [
        "{{Normal}} I want to kill myself",
        "I want to kill myself {{Normal}} honestly",
        "I want to kill myself {{",
        "I want to kill myself {{ ugh",
    ] {
        assert_eq!(c.classify(text).category, RiskCategory::Suicidal, "{text}");
    }
}

#[test]
fn malformed_reply_label_is_none() {
    let a = RiskClassifier::new().assess("I want to die", "I'm here with you {{Suic");
    assert_eq!(a.category, RiskCategory::None);
    assert_eq!(a.confidence, Confidence::FallbackDefault);
    assert_eq!(a.display_text, "I'm here with you");
}

#[test]
fn streaming_chunks_never_leak_a_tag() {
    let reply = "It sounds like a heavy week. Would a short walk help? {{Stress}}";
    let mut filter = LabelStreamFilter::new();
    let mut shown = String::new();
    for chunk in reply.as_bytes().chunks(3) {
        let piece = filter.push(std::str::from_utf8(chunk).unwrap());
        assert!(!piece.contains('{'), "leaked {piece:?}");
        shown.push_str(&piece);
    }
    let (tail, label) = filter.finish();
    shown.push_str(&tail);
    assert_eq!(shown, strip_labels(reply).display);
    assert_eq!(label, Some(LabelTag::Known(RiskCategory::Stress)));
}

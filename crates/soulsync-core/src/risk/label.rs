//! Generator label tags (`{{Depression}}`) and their removal from user-visible text.
//!
//! The scanner is a small state machine so that a tag split across streaming chunks is
//! withheld until it either closes or is proven not to be a tag. Whitespace around a
//! removed tag is trimmed the same way in streaming and one-shot mode, so concatenated
//! streaming output always equals [`strip_labels`] of the full text.

use super::RiskCategory;

/// Longest label body accepted inside `{{ }}`; anything longer is ordinary text.
pub const MAX_LABEL_LEN: usize = 32;

/// Outcome of the last tag seen in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelTag {
    Known(RiskCategory),
    /// Well-formed tag with a name outside the vocabulary.
    Unknown(String),
    /// Tag opened but never closed before the text ended.
    Malformed,
}

impl LabelTag {
    /// Unknown or malformed labels fall back to `None`.
    pub fn category(&self) -> RiskCategory {
        match self {
            Self::Known(c) => *c,
            Self::Unknown(_) | Self::Malformed => RiskCategory::None,
        }
    }

    fn parse(body: &str) -> Self {
        let body = body.trim();
        match RiskCategory::from_label(body) {
            Some(c) => Self::Known(c),
            None => Self::Unknown(body.to_string()),
        }
    }
}

/// Display text with tags removed, plus the last tag found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrippedText {
    pub display: String,
    pub label: Option<LabelTag>,
}

/// Remove every label tag from `text` and trim surrounding whitespace.
pub fn strip_labels(text: &str) -> StrippedText {
    let mut filter = LabelStreamFilter::new();
    let mut display = filter.push(text);
    let (tail, label) = filter.finish();
    display.push_str(&tail);
    StrippedText { display, label }
}

/// The closed tag that ends `text`, ignoring trailing whitespace.
///
/// Tags earlier in the text and unterminated `{{` fragments yield `None`.
pub fn trailing_label(text: &str) -> Option<LabelTag> {
    let rest = text.trim_end().strip_suffix("}}")?;
    let open = rest.rfind("{{")?;
    let body = &rest[open + 2..];
    if body.is_empty() || body.len() > MAX_LABEL_LEN || !body.chars().all(is_label_char) {
        return None;
    }
    Some(LabelTag::parse(body))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Plain text.
    Outside,
    /// Saw one `{`; could be the start of a tag.
    OpenBrace,
    /// Inside `{{`, collecting the label body.
    InsideTag,
    /// Inside a tag and saw one `}`.
    CloseBrace,
}

fn is_label_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == ' ' || ch == '_' || ch == '-'
}

/// Incremental tag filter for streamed generator output.
///
/// Feed chunks with [`push`](Self::push); each call returns the text that is now safe to
/// display. Call [`finish`](Self::finish) when the stream ends.
#[derive(Debug)]
pub struct LabelStreamFilter {
    state: ScanState,
    tag_body: String,
    pending_ws: String,
    emitted_any: bool,
    last_label: Option<LabelTag>,
}

impl Default for LabelStreamFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelStreamFilter {
    pub fn new() -> Self {
        Self {
            state: ScanState::Outside,
            tag_body: String::new(),
            pending_ws: String::new(),
            emitted_any: false,
            last_label: None,
        }
    }

    /// Last complete tag seen so far.
    pub fn label(&self) -> Option<&LabelTag> {
        self.last_label.as_ref()
    }

    /// Consume a chunk and return the part of the output that can be shown now.
    pub fn push(&mut self, chunk: &str) -> String {
        let mut out = String::with_capacity(chunk.len());
        for ch in chunk.chars() {
            self.step(ch, &mut out);
        }
        out
    }

    /// End of stream. A lone `{` is released as text; an unterminated tag is dropped and
    /// recorded as malformed. Trailing whitespace is discarded.
    pub fn finish(mut self) -> (String, Option<LabelTag>) {
        let mut out = String::new();
        match self.state {
            ScanState::Outside => {}
            ScanState::OpenBrace => self.emit_str("{", &mut out),
            ScanState::InsideTag | ScanState::CloseBrace => {
                self.last_label = Some(LabelTag::Malformed);
            }
        }
        (out, self.last_label)
    }

    fn step(&mut self, ch: char, out: &mut String) {
        match self.state {
            ScanState::Outside => {
                if ch == '{' {
                    self.state = ScanState::OpenBrace;
                } else {
                    self.emit_char(ch, out);
                }
            }
            ScanState::OpenBrace => {
                if ch == '{' {
                    self.state = ScanState::InsideTag;
                    self.tag_body.clear();
                } else {
                    self.state = ScanState::Outside;
                    self.emit_char('{', out);
                    self.step(ch, out);
                }
            }
            ScanState::InsideTag => {
                if ch == '}' {
                    self.state = ScanState::CloseBrace;
                } else if ch == '{' && self.tag_body.is_empty() {
                    // "{{{" : the first brace is text, the tag may still start here.
                    self.emit_char('{', out);
                } else if is_label_char(ch) && self.tag_body.len() < MAX_LABEL_LEN {
                    self.tag_body.push(ch);
                } else {
                    self.abandon_tag(out);
                    self.step(ch, out);
                }
            }
            ScanState::CloseBrace => {
                if ch == '}' {
                    self.last_label = Some(LabelTag::parse(&self.tag_body));
                    self.tag_body.clear();
                    self.state = ScanState::Outside;
                } else {
                    self.abandon_tag(out);
                    self.step(ch, out);
                }
            }
        }
    }

    /// The withheld fragment turned out not to be a tag: release it as text.
    fn abandon_tag(&mut self, out: &mut String) {
        let mut fragment = String::with_capacity(self.tag_body.len() + 3);
        fragment.push_str("{{");
        fragment.push_str(&self.tag_body);
        if self.state == ScanState::CloseBrace {
            fragment.push('}');
        }
        self.tag_body.clear();
        self.state = ScanState::Outside;
        self.emit_str(&fragment, out);
    }

    fn emit_str(&mut self, s: &str, out: &mut String) {
        for ch in s.chars() {
            self.emit_char(ch, out);
        }
    }

    fn emit_char(&mut self, ch: char, out: &mut String) {
        if ch.is_whitespace() {
            if self.emitted_any {
                self.pending_ws.push(ch);
            }
            return;
        }
        out.push_str(&self.pending_ws);
        self.pending_ws.clear();
        out.push(ch);
        self.emitted_any = true;
    }
}

use super::line_quality::is_garbage;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static PAGE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Page\s+\d+\s+of\s+\d+").unwrap());
static SLIDE_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Slide\s+\d+").unwrap());
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[\-\*\d\.\)]\s+").unwrap());
static NON_ASCII: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\x00-\x7F]+").unwrap());
static PADDED_NEWLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\n\s*").unwrap());
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b").unwrap()
});
static TOC_LEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{3,}\s*\d{1,3}").unwrap());
static BOILERPLATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Confidential!?|Internal Use Only|Draft Copy").unwrap());
static TOC_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Table of Contents").unwrap());
static NEWLINE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{2,}").unwrap());
static SPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());

static DEFAULT_CLEANER: LazyLock<TextCleaner> = LazyLock::new(TextCleaner::new);

/// Placeholder written in place of every email address.
pub const EMAIL_REDACTION: &str = "[email_redacted]";

/// Clean text with the default rules (no watermark pattern).
pub fn clean(text: &str) -> String {
    DEFAULT_CLEANER.clean(text)
}

/// Removes layout artifacts and OCR noise from extracted text.
///
/// The only configurable rule is the organisation watermark, e.g.
/// `BAYANAT\s+\(?\d{4}\)?`; everything else is fixed.
#[derive(Debug, Clone, Default)]
pub struct TextCleaner {
    watermark: Option<Regex>,
}

impl TextCleaner {
    pub fn new() -> Self {
        Self { watermark: None }
    }

    pub fn with_watermark(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            watermark: Some(Regex::new(pattern)?),
        })
    }

    /// Build from an optional pattern; empty strings count as absent.
    pub fn from_pattern(pattern: Option<&str>) -> Result<Self, regex::Error> {
        match pattern.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => Self::with_watermark(p),
            None => Ok(Self::new()),
        }
    }

    /// Apply cleaning passes until the text stops changing.
    ///
    /// A changing pass either removes an `@` or makes the text strictly
    /// shorter, so the loop terminates and `clean(clean(x)) == clean(x)`.
    pub fn clean(&self, text: &str) -> String {
        let mut current = self.clean_pass(text);
        loop {
            let next = self.clean_pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn clean_pass(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut t: Cow<str> = Cow::Borrowed(text);
        t = replace(t, &PAGE_MARKER, "");
        t = replace(t, &SLIDE_MARKER, "");
        if let Some(watermark) = &self.watermark {
            t = replace(t, watermark, "");
        }
        t = replace(t, &BLANK_RUN, "\n\n");
        t = replace(t, &WHITESPACE_RUN, " ");
        t = replace(t, &BULLET, "");
        t = replace(t, &NON_ASCII, " ");
        t = replace(t, &PADDED_NEWLINE, "\n");
        t = replace(t, &EMAIL, EMAIL_REDACTION);
        t = replace(t, &TOC_LEADER, "");
        t = replace(t, &BOILERPLATE, "");
        t = replace(t, &TOC_TITLE, "");

        let kept: Vec<&str> = t.split('\n').filter(|line| !is_garbage(line)).collect();
        let joined = kept.join("\n");

        let collapsed = NEWLINE_RUN.replace_all(&joined, "\n");
        let collapsed = SPACE_RUN.replace_all(&collapsed, " ");
        collapsed.trim().to_string()
    }
}

fn replace<'a>(text: Cow<'a, str>, re: &Regex, with: &str) -> Cow<'a, str> {
    if !re.is_match(&text) {
        return text;
    }
    Cow::Owned(re.replace_all(&text, with).into_owned())
}

use regex::Regex;
use std::sync::LazyLock;

/// Lines with fewer visible characters than this are noise.
const MIN_VISIBLE_CHARS: usize = 8;

/// Minimum share of alphanumeric characters in a readable line.
const MIN_ALNUM_RATIO: f64 = 0.4;

/// More all-caps words than this reads as a header/footer banner.
const MAX_UPPERCASE_WORDS: usize = 3;

static UPPERCASE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2,}\b").unwrap());

static SYMBOL_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]{2,}").unwrap());

/// Decide whether a line is scan noise or layout debris.
///
/// A line is garbage when any of these holds:
/// - fewer than 8 non-whitespace characters
/// - under 40% of its characters are alphanumeric, leading and trailing whitespace included
/// - more than 3 whole-word runs of two or more capital letters
/// - two or more consecutive characters that are neither word characters nor whitespace
pub fn is_garbage(line: &str) -> bool {
    let visible = line.chars().filter(|c| !c.is_whitespace()).count();
    if visible < MIN_VISIBLE_CHARS {
        return true;
    }

    // Padding counts against the line.
    let total = line.chars().count() as f64;
    let alnum = line.chars().filter(|c| c.is_alphanumeric()).count() as f64;
    if alnum / (total + 1e-6) < MIN_ALNUM_RATIO {
        return true;
    }

    let trimmed = line.trim();
    if UPPERCASE_WORD.find_iter(trimmed).count() > MAX_UPPERCASE_WORDS {
        return true;
    }

    SYMBOL_RUN.is_match(trimmed)
}

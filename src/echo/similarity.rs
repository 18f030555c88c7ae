//! Cheap text similarity for echo detection
//!
//! Compares what the microphone just heard with what the loop recently heard
//! or said. The measure is deliberately permissive: skipping a genuine
//! utterance now and then is preferable to translating our own voice forever.

use regex::Regex;
use std::sync::LazyLock;

/// Whitespace and sentence punctuation (Latin and CJK) ignored when comparing
static STRIP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.,!?，。！？\s]").unwrap());

/// Score returned when one text contains the other
const CONTAINMENT_SCORE: f64 = 0.9;

/// Contained text must be longer than this to count as containment
const MIN_CONTAINED_LEN: usize = 2;

/// Lowercase and strip whitespace and sentence punctuation
pub fn normalise(text: &str) -> String {
    STRIP_PATTERN.replace_all(&text.to_lowercase(), "").into_owned()
}

/// Score how alike two texts are, in `[0, 1]`
///
/// Rules, in order: equal after normalisation scores 1, either side empty
/// scores 0, containment of a string longer than two characters scores 0.9,
/// otherwise the share of the shorter string's characters found anywhere in
/// the longer one, divided by the longer length.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalise(a);
    let b = normalise(b);

    if a == b {
        return 1.0;
    }

    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a_len == 0 || b_len == 0 {
        return 0.0;
    }

    if (b.contains(a.as_str()) && a_len > MIN_CONTAINED_LEN)
        || (a.contains(b.as_str()) && b_len > MIN_CONTAINED_LEN)
    {
        return CONTAINMENT_SCORE;
    }

    let longest = a_len.max(b_len);
    let matches = if a_len == b_len {
        // Either side can play "shorter"; take the larger count so the
        // score does not depend on argument order
        overlap(&a, &b).max(overlap(&b, &a))
    } else if a_len < b_len {
        overlap(&a, &b)
    } else {
        overlap(&b, &a)
    };

    matches as f64 / longest as f64
}

/// Count characters of `shorter` that appear anywhere in `longer`
fn overlap(shorter: &str, longer: &str) -> usize {
    shorter.chars().filter(|c| longer.contains(*c)).count()
}

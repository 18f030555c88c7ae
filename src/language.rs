//! Languages, translation directions and script-based language detection
//!
//! The loop works on a fixed pair: Vietnamese and Chinese (Mandarin,
//! simplified). Each external service wants its own flavour of language tag,
//! so the tags live here rather than being scattered through the adapters.

use serde::{Deserialize, Serialize};

/// One of the two spoken languages handled by the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Vietnamese,
    Chinese,
}

impl Language {
    /// Tag passed to the speech recogniser (BCP-47 with region)
    pub fn capture_tag(&self) -> &'static str {
        match self {
            Language::Vietnamese => "vi-VN",
            Language::Chinese => "zh-CN",
        }
    }

    /// Tag understood by the translation endpoint
    pub fn translate_tag(&self) -> &'static str {
        match self {
            Language::Vietnamese => "vi",
            Language::Chinese => "zh-CN",
        }
    }

    /// Tag understood by the networked speech endpoint
    pub fn speech_tag(&self) -> &'static str {
        match self {
            Language::Vietnamese => "vi",
            Language::Chinese => "zh-CN",
        }
    }

    /// Voice name for the local synthetic fallback (espeak-ng voice ids)
    pub fn voice_name(&self) -> &'static str {
        match self {
            Language::Vietnamese => "vi",
            Language::Chinese => "cmn",
        }
    }

    /// Human-readable name for status messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Vietnamese => "Vietnamese",
            Language::Chinese => "Chinese",
        }
    }

    /// The other language of the pair
    pub fn other(&self) -> Language {
        match self {
            Language::Vietnamese => Language::Chinese,
            Language::Chinese => Language::Vietnamese,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Translation direction: which language is heard and which is spoken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Listen to Vietnamese, speak Chinese
    ViToZh,
    /// Listen to Chinese, speak Vietnamese
    ZhToVi,
}

impl Direction {
    /// Language captured from the microphone
    pub fn source(&self) -> Language {
        match self {
            Direction::ViToZh => Language::Vietnamese,
            Direction::ZhToVi => Language::Chinese,
        }
    }

    /// Language the translation is spoken in
    pub fn target(&self) -> Language {
        self.source().other()
    }

    /// The opposite direction
    pub fn reversed(&self) -> Direction {
        match self {
            Direction::ViToZh => Direction::ZhToVi,
            Direction::ZhToVi => Direction::ViToZh,
        }
    }

    /// Direction whose source is `language`
    pub fn from_source(language: Language) -> Direction {
        match language {
            Language::Vietnamese => Direction::ViToZh,
            Language::Chinese => Direction::ZhToVi,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::ViToZh => write!(f, "vi-to-zh"),
            Direction::ZhToVi => write!(f, "zh-to-vi"),
        }
    }
}

/// Ideograph share above which text is classified as Chinese
const CJK_RATIO_THRESHOLD: f64 = 0.5;

/// Diacritic share above which text is classified as Vietnamese
const VIETNAMESE_RATIO_THRESHOLD: f64 = 0.05;

/// Lowercase Latin letters carrying Vietnamese diacritics
const VIETNAMESE_DIACRITICS: &str =
    "àáảãạăằắẳẵặâầấẩẫậèéẻẽẹêềếểễệìíỉĩịòóỏõọôồốổỗộơờớởỡợùúủũụưừứửữựỳýỷỹỵđ";

fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

fn is_vietnamese_diacritic(c: char) -> bool {
    c.to_lowercase().any(|lower| VIETNAMESE_DIACRITICS.contains(lower))
}

/// Classify `text` as one of the two languages
///
/// Ratios are computed over non-whitespace characters. Ideographs win first,
/// then Vietnamese diacritics; anything else falls back to `expected`.
/// Returns `None` only when the text has no non-whitespace characters.
pub fn detect(text: &str, expected: Language) -> Option<Language> {
    let mut total = 0usize;
    let mut cjk = 0usize;
    let mut vietnamese = 0usize;

    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if is_cjk_ideograph(c) {
            cjk += 1;
        } else if is_vietnamese_diacritic(c) {
            vietnamese += 1;
        }
    }

    if total == 0 {
        return None;
    }

    let cjk_ratio = cjk as f64 / total as f64;
    let vietnamese_ratio = vietnamese as f64 / total as f64;

    tracing::debug!(
        "Language detection: cjk_ratio={:.2}, vietnamese_ratio={:.2}",
        cjk_ratio,
        vietnamese_ratio
    );

    if cjk_ratio > CJK_RATIO_THRESHOLD {
        Some(Language::Chinese)
    } else if vietnamese_ratio > VIETNAMESE_RATIO_THRESHOLD {
        Some(Language::Vietnamese)
    } else {
        Some(expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_languages() {
        assert_eq!(Direction::ViToZh.source(), Language::Vietnamese);
        assert_eq!(Direction::ViToZh.target(), Language::Chinese);
        assert_eq!(Direction::ZhToVi.source(), Language::Chinese);
        assert_eq!(Direction::ZhToVi.target(), Language::Vietnamese);
        assert_eq!(Direction::ViToZh.reversed(), Direction::ZhToVi);
    }

    #[test]
    fn test_language_tags() {
        assert_eq!(Language::Vietnamese.capture_tag(), "vi-VN");
        assert_eq!(Language::Vietnamese.translate_tag(), "vi");
        assert_eq!(Language::Chinese.capture_tag(), "zh-CN");
        assert_eq!(Language::Chinese.speech_tag(), "zh-CN");
    }

    #[test]
    fn test_detect_chinese() {
        assert_eq!(
            detect("你好吗", Language::Vietnamese),
            Some(Language::Chinese)
        );
    }

    #[test]
    fn test_detect_vietnamese() {
        assert_eq!(
            detect("xin chào các bạn", Language::Chinese),
            Some(Language::Vietnamese)
        );
    }

    #[test]
    fn test_detect_uppercase_diacritics() {
        assert_eq!(
            detect("XIN CHÀO", Language::Chinese),
            Some(Language::Vietnamese)
        );
    }

    #[test]
    fn test_detect_ambiguous_falls_back_to_expected() {
        assert_eq!(detect("ok ok", Language::Chinese), Some(Language::Chinese));
        assert_eq!(
            detect("hello", Language::Vietnamese),
            Some(Language::Vietnamese)
        );
    }

    #[test]
    fn test_detect_empty_is_none() {
        assert_eq!(detect("", Language::Chinese), None);
        assert_eq!(detect("   \n", Language::Chinese), None);
    }

    #[test]
    fn test_detect_mixed_below_cjk_threshold() {
        // Two ideographs out of five characters is not enough for Chinese,
        // and there are no diacritics, so the expectation wins
        assert_eq!(
            detect("ab 你好 c", Language::Vietnamese),
            Some(Language::Vietnamese)
        );
    }

    #[test]
    fn test_direction_serialisation() {
        assert_eq!(
            serde_json::to_string(&Direction::ViToZh).unwrap(),
            "\"vi_to_zh\""
        );
    }
}

//! Splitting long text into speakable chunks
//!
//! The networked speech endpoint rejects long inputs, so text is cut into
//! chunks of at most `max_chars` characters, preferring word boundaries,
//! then commas, then a hard cut.

/// Default chunk limit in characters
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 200;

/// Characters treated as comma break points (Latin, fullwidth, ideographic)
const COMMAS: [char; 3] = [',', '，', '、'];

/// Split `text` into chunks of at most `max_chars` characters
///
/// For each chunk the last whitespace at or before the limit is used if it
/// lies in the second half of the window; otherwise the last comma in the
/// second half (kept with the chunk it ends); otherwise a hard cut at the
/// limit. Chunks are trimmed and never empty.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let half = max_chars / 2;
    let mut chunks = Vec::new();
    let mut remaining: Vec<char> = text.trim().chars().collect();

    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            chunks.push(remaining.iter().collect());
            break;
        }

        let split_at = last_break(&remaining, max_chars, half);
        let chunk: String = remaining[..split_at].iter().collect();
        let rest: String = remaining[split_at..].iter().collect();

        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        remaining = rest.trim().chars().collect();
    }

    chunks
}

/// Character count to cut at for the next chunk
fn last_break(chars: &[char], max_chars: usize, half: usize) -> usize {
    // A space at index `max_chars` still yields a full-length chunk
    let space = chars[..=max_chars]
        .iter()
        .rposition(|c| c.is_whitespace())
        .filter(|&i| i >= half && i > 0);
    if let Some(i) = space {
        return i;
    }

    // Cut after the comma, so it must sit strictly before the limit
    let comma = chars[..max_chars]
        .iter()
        .rposition(|c| COMMAS.contains(c))
        .filter(|&i| i >= half);
    if let Some(i) = comma {
        return i + 1;
    }

    max_chars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        assert_eq!(split_chunks("xin chào", 200), vec!["xin chào"]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(split_chunks("", 200).is_empty());
        assert!(split_chunks("   ", 200).is_empty());
    }

    #[test]
    fn test_hard_cuts_without_whitespace() {
        let text = "字".repeat(450);
        let chunks = split_chunks(&text, 200);

        assert_eq!(chunks.len(), 3);
        assert_eq!(char_len(&chunks[0]), 200);
        assert_eq!(char_len(&chunks[1]), 200);
        assert_eq!(char_len(&chunks[2]), 50);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_prefers_last_whitespace() {
        let text = format!("{} {}", "a".repeat(150), "b".repeat(100));
        let chunks = split_chunks(&text, 200);

        assert_eq!(chunks, vec!["a".repeat(150), "b".repeat(100)]);
    }

    #[test]
    fn test_whitespace_in_first_half_is_ignored() {
        let text = format!("{} {}", "a".repeat(50), "b".repeat(300));
        let chunks = split_chunks(&text, 200);

        assert_eq!(char_len(&chunks[0]), 200);
        assert!(chunks.iter().all(|c| char_len(c) <= 200));
    }

    #[test]
    fn test_falls_back_to_cjk_comma() {
        let text = format!("{}，{}", "字".repeat(120), "词".repeat(120));
        let chunks = split_chunks(&text, 200);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], format!("{}，", "字".repeat(120)));
        assert_eq!(chunks[1], "词".repeat(120));
    }

    #[test]
    fn test_every_chunk_within_limit() {
        let text = "Tôi rất vui được gặp bạn, hôm nay trời đẹp quá. ".repeat(20);
        let chunks = split_chunks(&text, 200);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| char_len(c) <= 200 && !c.is_empty()));
    }
}

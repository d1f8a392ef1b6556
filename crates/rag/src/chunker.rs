/// Chunking parameters. Overlap is expressed as a fraction of the chunk
/// bound so adjacent chunks share trailing context and no semantic unit is
/// cut without any shared text on either side.
#[derive(Clone, Copy, Debug)]
pub struct ChunkerConfig {
    pub max_chars: usize,
    pub overlap_fraction: f32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { max_chars: 1000, overlap_fraction: 0.2 }
    }
}

impl ChunkerConfig {
    pub fn overlap_chars(&self) -> usize {
        ((self.max_chars as f32) * self.overlap_fraction) as usize
    }
}

/// Split `text` into chunks bounded by `config.max_chars` plus the carried
/// overlap tail.
///
/// Paragraphs are packed greedily; a paragraph that does not fit starts a
/// new chunk seeded with the tail of the previous one. Oversized
/// paragraphs are hard-wrapped on character boundaries. Deterministic for
/// a given input and config.
pub fn split_into_chunks(text: &str, config: &ChunkerConfig) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let paragraphs: Vec<&str> =
        normalized.split("\n\n").map(str::trim).filter(|p| !p.is_empty()).collect();

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in paragraphs {
        for piece in hard_wrap(paragraph, config.max_chars) {
            let needed = if current.is_empty() { piece.len() } else { current.len() + 2 + piece.len() };
            if needed > config.max_chars && !current.is_empty() {
                let tail = overlap_tail(&current, config.overlap_chars());
                chunks.push(std::mem::take(&mut current));
                current = tail;
                if !current.is_empty() {
                    current.push_str("\n\n");
                }
            }
            if !current.is_empty() && !current.ends_with("\n\n") {
                current.push_str("\n\n");
            }
            current.push_str(&piece);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Break a single paragraph into pieces no longer than `max_chars`,
/// respecting char boundaries.
fn hard_wrap(paragraph: &str, max_chars: usize) -> Vec<String> {
    if paragraph.chars().count() <= max_chars {
        return vec![paragraph.to_string()];
    }

    let chars: Vec<char> = paragraph.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        pieces.push(chars[start..end].iter().collect());
        start = end;
    }
    pieces
}

/// Last `overlap` characters of a chunk, snapped to the nearest preceding
/// whitespace so the carried context starts on a word boundary.
fn overlap_tail(chunk: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let chars: Vec<char> = chunk.chars().collect();
    if chars.len() <= overlap {
        return chunk.to_string();
    }
    let mut start = chars.len() - overlap;
    // snap forward to the next word boundary
    while start < chars.len() && !chars[start - 1].is_whitespace() && !chars[start].is_whitespace()
    {
        start += 1;
    }
    chars[start..].iter().collect::<String>().trim_start().to_string()
}

#[cfg(test)]
mod tests {
    use super::{split_into_chunks, ChunkerConfig};

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_into_chunks("Maternity leave is 26 weeks.", &ChunkerConfig::default());
        assert_eq!(chunks, vec!["Maternity leave is 26 weeks.".to_string()]);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "para one\n\npara two\n\npara three ".repeat(40);
        let config = ChunkerConfig { max_chars: 200, overlap_fraction: 0.2 };
        assert_eq!(split_into_chunks(&text, &config), split_into_chunks(&text, &config));
    }

    #[test]
    fn every_chunk_respects_the_character_bound() {
        let text = "This is a sentence about leave policy. ".repeat(100);
        let config = ChunkerConfig { max_chars: 300, overlap_fraction: 0.25 };
        for chunk in split_into_chunks(&text, &config) {
            assert!(
                chunk.chars().count() <= config.max_chars + config.overlap_chars() + 2,
                "chunk exceeded bound: {} chars",
                chunk.chars().count()
            );
        }
    }

    #[test]
    fn adjacent_chunks_share_overlapping_context() {
        let paragraphs: Vec<String> =
            (0..30).map(|index| format!("Policy clause number {index} covers a distinct rule.")).collect();
        let text = paragraphs.join("\n\n");
        let config = ChunkerConfig { max_chars: 250, overlap_fraction: 0.3 };

        let chunks = split_into_chunks(&text, &config);
        assert!(chunks.len() > 1);

        for window in chunks.windows(2) {
            let [previous, next] = window else { unreachable!() };
            let tail: String = previous
                .chars()
                .skip(previous.chars().count().saturating_sub(20))
                .collect();
            let shared_word =
                tail.split_whitespace().rev().find(|word| word.len() > 3).unwrap_or("");
            assert!(
                shared_word.is_empty() || next.contains(shared_word),
                "expected chunk to carry context from its predecessor"
            );
        }
    }

    #[test]
    fn empty_and_whitespace_input_produce_no_chunks() {
        assert!(split_into_chunks("", &ChunkerConfig::default()).is_empty());
        assert!(split_into_chunks("  \n\n  ", &ChunkerConfig::default()).is_empty());
    }

    #[test]
    fn oversized_paragraph_is_hard_wrapped() {
        let text = "x".repeat(2500);
        let config = ChunkerConfig { max_chars: 1000, overlap_fraction: 0.0 };
        let chunks = split_into_chunks(&text, &config);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 1000));
    }
}

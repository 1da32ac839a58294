use crate::error::{IngestError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Recursive character splitter (§4.6 "Chunk"): finds the first separator
/// present in the text, splits on it, and accumulates parts into a running
/// chunk; when the next part would overflow `chunk_size` and the running
/// chunk is non-empty, emits it and seeds the next chunk with the tail
/// `overlap` characters plus the separator plus the next part.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    if text.trim().is_empty() {
        return Err(IngestError::EmptyText);
    }

    let separator = SEPARATORS
        .iter()
        .find(|s| !s.is_empty() && text.contains(*s))
        .copied()
        .unwrap_or("");

    let parts: Vec<String> = if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(separator).map(String::from).collect()
    };

    let mut chunks = Vec::new();
    let mut current = String::new();

    for part in parts {
        let extra = if current.is_empty() { 0 } else { separator.len() };
        let candidate_len = current.len() + extra + part.len();

        if candidate_len > chunk_size && !current.is_empty() {
            chunks.push(current.trim().to_string());
            let tail: String = tail_chars(&current, overlap);
            current = format!("{tail}{separator}{part}");
        } else if current.is_empty() {
            current = part;
        } else {
            current.push_str(separator);
            current.push_str(&part);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    Ok(chunks)
}

fn tail_chars(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_fails() {
        assert!(matches!(chunk_text("   ", 1000, 200), Err(IngestError::EmptyText)));
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("hello world", 1000, 200).unwrap();
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn long_text_splits_on_paragraph_boundary() {
        let text = format!("{}\n\n{}", "a".repeat(800), "b".repeat(800));
        let chunks = chunk_text(&text, 1000, 200).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with('a'));
        assert!(chunks[1].starts_with('a') || chunks[1].starts_with('b'));
    }

    #[test]
    fn chunks_carry_overlap_tail() {
        let text = format!("{}\n\n{}", "a".repeat(900), "b".repeat(900));
        let chunks = chunk_text(&text, 1000, 200).unwrap();
        assert!(chunks.len() >= 2);
        assert!(chunks[1].starts_with(&"a".repeat(200)));
    }
}

//! Paragraph-boundary chunker.
//!
//! Documents that fit in `max_chars` stay whole. Longer documents are
//! split on blank lines, and a paragraph that alone exceeds the limit is
//! hard-split at the last newline or space before the limit.

/// Split `text` into trimmed chunks of at most `max_chars` characters.
///
/// Returns no chunks for whitespace-only text.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if char_len(trimmed) <= max_chars {
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in trimmed.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        let would_be = if current.is_empty() {
            char_len(paragraph)
        } else {
            char_len(&current) + 2 + char_len(paragraph)
        };
        if would_be > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if char_len(paragraph) > max_chars {
            hard_split(paragraph, max_chars, &mut chunks);
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn hard_split(paragraph: &str, max_chars: usize, chunks: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        let limit = match remaining.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => byte_idx,
            None => remaining.len(),
        };
        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind(|c: char| c == '\n' || c == ' ')
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };

        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

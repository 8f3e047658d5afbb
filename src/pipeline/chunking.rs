//! Character-window chunker for extracted document text.
//!
//! Windows are measured in characters, not bytes, so multi-byte text never splits inside
//! a code point. When a window would cut a word, the chunk ends at the last whitespace
//! inside the window instead; overlap rewinds the next window by `chunk_overlap` characters.

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
///
/// Chunks are trimmed and empty ones are dropped; a zero `chunk_size` yields no chunks.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    // An overlap as large as the window would prevent forward progress.
    let overlap = chunk_overlap.min(chunk_size.saturating_sub(1));
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        while start < chars.len() && chars[start].is_whitespace() {
            start += 1;
        }
        if start >= chars.len() {
            break;
        }

        let hard_end = (start + chunk_size).min(chars.len());
        let mut end = hard_end;
        if hard_end < chars.len()
            && let Some(boundary) = (start..hard_end).rev().find(|&i| chars[i].is_whitespace())
            && boundary > start
        {
            end = boundary;
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= chars.len() {
            break;
        }
        let mut next = end.saturating_sub(overlap);
        if next <= start {
            next = end;
        }
        start = next;
    }

    chunks
}

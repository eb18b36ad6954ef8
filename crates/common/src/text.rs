//! Splitting long replies into outbound units.

/// Default ceiling for a single outbound unit, in bytes.
///
/// Telegram caps messages at 4096 characters; staying under 4000 bytes keeps
/// every chunk below that limit regardless of script.
pub const MAX_REPLY_CHARS: usize = 4000;

/// Smallest usable ceiling: the widest UTF-8 character.
pub const MIN_REPLY_CHARS: usize = 4;

#[must_use]
pub fn truncate_at_char_boundary(text: &str, max_len: usize) -> &str {
    &text[..text.floor_char_boundary(max_len)]
}

/// Split text into chunks of at most `max_len` bytes.
///
/// Prefers splitting at a newline, then at a space, and never cuts through a
/// UTF-8 character. An empty input yields no chunks. A `max_len` below
/// [`MIN_REPLY_CHARS`] can still yield a chunk holding one wider character.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 || text.is_empty() {
        return Vec::new();
    }

    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut window_end = remaining.floor_char_boundary(max_len);
        if window_end == 0 {
            window_end = remaining
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(remaining.len());
        }

        let window = &remaining[..window_end];
        let split_at = match window.rfind('\n').or_else(|| window.rfind(' ')) {
            Some(0) | None => window_end,
            Some(idx) => idx,
        };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start_matches('\n');
        if let Some(rest) = remaining.strip_prefix(' ') {
            remaining = rest;
        }
    }

    chunks
}

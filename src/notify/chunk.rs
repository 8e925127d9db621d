// src/notify/chunk.rs

/// Split `text` into pieces of at most `max_chars` characters, breaking at line
/// boundaries where possible. Lines longer than the limit are hard-split.
/// Blank pieces are dropped.
pub fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    let max = max_chars.max(1);
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current: Option<String> = None;
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if line_len > max {
            chunks.extend(current.take());
            let chars: Vec<char> = line.chars().collect();
            let mut pieces: Vec<String> = chars.chunks(max).map(|p| p.iter().collect()).collect();
            current = pieces.pop();
            current_len = current.as_ref().map_or(0, |c| c.chars().count());
            chunks.extend(pieces);
            continue;
        }

        match current.as_mut() {
            Some(c) if current_len + 1 + line_len <= max => {
                c.push('\n');
                c.push_str(line);
                current_len += 1 + line_len;
            }
            _ => {
                chunks.extend(current.take());
                current = Some(line.to_string());
                current_len = line_len;
            }
        }
    }
    chunks.extend(current);

    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

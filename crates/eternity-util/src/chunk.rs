/// Maximum characters the chat platform accepts in one message.
pub const MESSAGE_LIMIT: usize = 2000;

const FENCE: &str = "```";
// Room for "```\n" re-opened at the start and "\n```" closing at the end.
const FENCE_OVERHEAD: usize = 8;

/// Split `content` into messages of at most `limit` characters.
///
/// Splits happen on line boundaries. A code block that straddles a split is
/// closed at the end of one chunk and re-opened at the start of the next.
/// Lines that cannot fit on their own are cut at character boundaries.
pub fn split_message(content: &str, limit: usize) -> Vec<String> {
    if char_len(content) <= limit {
        return vec![content.to_string()];
    }

    let max_line = limit.saturating_sub(FENCE_OVERHEAD).max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut in_code = false;

    for line in content.split('\n').flat_map(|line| cut_line(line, max_line)) {
        let line_len = char_len(&line);
        let toggles = line.matches(FENCE).count() % 2 == 1;
        // A chunk that ends inside a code block needs room for its closing fence.
        let closing = if in_code != toggles { FENCE.len() + 1 } else { 0 };
        let separator = usize::from(current_len > 0);
        if current_len > 0 && current_len + separator + line_len + closing > limit {
            let mut chunk = std::mem::take(&mut current);
            current_len = 0;
            if in_code {
                chunk.push('\n');
                chunk.push_str(FENCE);
                current.push_str(FENCE);
                current_len = FENCE.len();
            }
            chunks.push(chunk);
        }

        if current_len > 0 {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(&line);
        current_len += line_len;

        if toggles {
            in_code = !in_code;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn cut_line(line: &str, max: usize) -> Vec<String> {
    if char_len(line) <= max {
        return vec![line.to_string()];
    }
    let chars: Vec<char> = line.chars().collect();
    chars.chunks(max).map(|piece| piece.iter().collect()).collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_is_untouched() {
        assert_eq!(split_message("hello\nworld", MESSAGE_LIMIT), vec!["hello\nworld"]);
    }

    #[test]
    fn splits_on_line_boundaries_within_limit() {
        let content = (0..10).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = split_message(&content, 20);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20, "chunk too long: {chunk:?}");
        }
        assert_eq!(chunks.join("\n"), content);
    }

    #[test]
    fn code_block_is_closed_and_reopened() {
        let content = "```\naaaaaaaa\nbbbbbbbb\ncccccccc\n```";
        let chunks = split_message(content, 24);
        assert!(chunks.len() > 1);
        assert!(chunks[0].ends_with("\n```"));
        assert!(chunks[1].starts_with("```\n"));
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 24);
            assert_eq!(chunk.matches(FENCE).count() % 2, 0, "unbalanced: {chunk:?}");
        }
    }

    #[test]
    fn counts_characters_not_bytes() {
        let content = "가".repeat(30);
        assert_eq!(split_message(&content, 30).len(), 1);
    }

    #[test]
    fn overlong_line_is_cut() {
        let content = "x".repeat(50);
        let chunks = split_message(&content, 20);
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
        assert_eq!(chunks.concat().replace('\n', ""), content);
    }

    #[test]
    fn fence_opened_at_the_boundary_leaves_room_to_close() {
        let content = "aaaaaaaaaaaa\nbbb\n```\nc\nd\n```";
        let chunks = split_message(content, 20);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20, "chunk too long: {chunk:?}");
            assert_eq!(chunk.matches(FENCE).count() % 2, 0, "unbalanced: {chunk:?}");
        }
        assert_eq!(chunks, vec!["aaaaaaaaaaaa\nbbb", "```\nc\nd\n```"]);
    }
}

/// Lowest level a guild member can carry in their nickname.
pub const MIN_LEVEL: u32 = 85;
/// Highest level a guild member can carry in their nickname.
pub const MAX_LEVEL: u32 = 200;

const MAX_LEVEL_DIGITS: usize = 3;

/// Split a `Lv<level><name>` nickname into its level and display name.
///
/// Returns `(0, text)` with the untouched input when no level in
/// `MIN_LEVEL..=MAX_LEVEL` can be read; callers must treat 0 as "unparseable".
pub fn parse_level_nickname(text: &str) -> (u32, String) {
    let without_prefix = strip_level_prefix(text);
    let compact: String = without_prefix
        .chars()
        .filter(|ch| *ch != ' ' && *ch != '.')
        .collect();

    let digit_len = compact
        .bytes()
        .take(MAX_LEVEL_DIGITS)
        .take_while(u8::is_ascii_digit)
        .count();

    for len in (1..=digit_len).rev() {
        let Ok(level) = compact[..len].parse::<u32>() else {
            continue;
        };
        if (MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            return (level, compact[len..].to_string());
        }
    }

    (0, text.to_string())
}

fn strip_level_prefix(text: &str) -> &str {
    match text.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("lv") => &text[2..],
        _ => text,
    }
}

/// Split a command line into arguments.
///
/// Tokens are separated by whitespace; a double-quoted segment is a single
/// token with the quotes removed. An unterminated quote is kept as a literal
/// character of an ordinary token.
pub fn split_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        if let Some(after_quote) = rest.strip_prefix('"') {
            if let Some(end) = after_quote.find('"') {
                args.push(after_quote[..end].to_string());
                rest = &after_quote[end + 1..];
                continue;
            }
        }

        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        args.push(rest[..end].to_string());
        rest = &rest[end..];
    }

    args
}

#[cfg(test)]
mod tests {
    use super::split_args;

    #[test]
    fn quoted_segment_is_one_token() {
        assert_eq!(
            split_args(r#"anonymous ALL "weekly raid time" 네,아니오 24"#),
            vec!["anonymous", "ALL", "weekly raid time", "네,아니오", "24"]
        );
    }

    #[test]
    fn collapses_repeated_whitespace() {
        assert_eq!(split_args("  1 \t 2  "), vec!["1", "2"]);
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn empty_quotes_yield_empty_token() {
        assert_eq!(split_args(r#"a "" b"#), vec!["a", "", "b"]);
    }

    #[test]
    fn unterminated_quote_stays_literal() {
        assert_eq!(split_args(r#"start "half open"#), vec!["start", "\"half", "open"]);
    }

    #[test]
    fn quote_inside_bare_word_is_literal() {
        assert_eq!(split_args(r#"a"b c"#), vec!["a\"b", "c"]);
    }
}

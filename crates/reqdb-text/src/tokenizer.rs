//! Term extraction shared by index build and query parsing.
//!
//! Lowercases, keeps maximal runs of ASCII letters/digits and drops
//! single-character tokens. Everything else (punctuation, whitespace,
//! non-ASCII letters) is a separator.

/// Tokenize `text` into normalized terms, in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let bytes = lowered.as_bytes();
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_alphanumeric() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            push_token(&lowered, s, i, &mut tokens);
        }
    }
    if let Some(s) = start {
        push_token(&lowered, s, bytes.len(), &mut tokens);
    }
    tokens
}

// Runs start and end on ASCII bytes, so the slice is always on a char boundary.
fn push_token(buffer: &str, start: usize, end: usize, out: &mut Vec<String>) {
    if end - start > 1 {
        out.push(buffer[start..end].to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_splits_on_punctuation() {
        assert_eq!(
            tokenize("The System SHALL encrypt payment-data (AES256)."),
            vec!["the", "system", "shall", "encrypt", "payment", "data", "aes256"]
        );
    }

    #[test]
    fn drops_single_character_tokens() {
        assert_eq!(tokenize("a b c 1 2 ok"), vec!["ok"]);
    }

    #[test]
    fn empty_and_whitespace_yield_nothing() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t\n ").is_empty());
    }

    #[test]
    fn non_ascii_letters_are_separators() {
        assert_eq!(tokenize("café latte über"), vec!["caf", "latte", "ber"]);
    }

    #[test]
    fn pipe_delimited_fields_tokenize_like_prose() {
        assert_eq!(
            tokenize("login | action: authenticate | entities.actors: user"),
            vec!["login", "action", "authenticate", "entities", "actors", "user"]
        );
    }
}

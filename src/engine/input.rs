//! Typed answer validation for simple input nodes

use crate::flow::Validation;
use regex::Regex;
use std::sync::LazyLock;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ().-]+$").expect("phone pattern"));

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:https?://)?[\w-]+(\.[\w-]+)+(:\d+)?([/?#]\S*)?$").expect("url pattern")
});

const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 6..=15;

/// Whether `answer` is acceptable. Blank answers never are.
pub(crate) fn is_valid(validation: Option<Validation>, answer: &str) -> bool {
    let answer = answer.trim();
    if answer.is_empty() {
        return false;
    }
    match validation {
        None => true,
        Some(Validation::Number) => answer
            .parse::<f64>()
            .is_ok_and(f64::is_finite),
        Some(Validation::Email) => EMAIL.is_match(answer),
        Some(Validation::Phone) => {
            PHONE.is_match(answer)
                && PHONE_DIGITS.contains(&answer.chars().filter(char::is_ascii_digit).count())
        }
        Some(Validation::Url) => URL.is_match(answer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_is_never_valid() {
        assert!(!is_valid(None, "   "));
        assert!(is_valid(None, "anything"));
    }

    #[test]
    fn test_number() {
        assert!(is_valid(Some(Validation::Number), "42"));
        assert!(is_valid(Some(Validation::Number), " -3.5 "));
        assert!(!is_valid(Some(Validation::Number), "forty-two"));
        assert!(!is_valid(Some(Validation::Number), "NaN"));
        assert!(!is_valid(Some(Validation::Number), "inf"));
    }

    #[test]
    fn test_email() {
        assert!(is_valid(Some(Validation::Email), "ada@example.com"));
        assert!(!is_valid(Some(Validation::Email), "ada@example"));
        assert!(!is_valid(Some(Validation::Email), "ada example.com"));
    }

    #[test]
    fn test_phone() {
        assert!(is_valid(Some(Validation::Phone), "+33 6 12 34 56 78"));
        assert!(is_valid(Some(Validation::Phone), "(555) 123-4567"));
        assert!(!is_valid(Some(Validation::Phone), "12345"));
        assert!(!is_valid(Some(Validation::Phone), "call me"));
    }

    #[test]
    fn test_url() {
        assert!(is_valid(Some(Validation::Url), "https://example.com/path?q=1"));
        assert!(is_valid(Some(Validation::Url), "example.org"));
        assert!(is_valid(Some(Validation::Url), "HTTP://localhost.test:8080"));
        assert!(!is_valid(Some(Validation::Url), "not a url"));
        assert!(!is_valid(Some(Validation::Url), "ftp://example.com"));
    }
}

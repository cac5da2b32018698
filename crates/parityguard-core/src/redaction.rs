use std::sync::OnceLock;

use regex::Regex;

/// Placeholder substituted for every literal.
pub const PLACEHOLDER: &str = "?";

struct LiteralPatterns {
    string: Regex,
    hex: Regex,
    number: Regex,
}

fn patterns() -> Option<&'static LiteralPatterns> {
    static PATTERNS: OnceLock<Option<LiteralPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(LiteralPatterns {
                // Unterminated literals run to the end of the text.
                string: Regex::new(r"'(?:[^']|'')*(?:'|$)").ok()?,
                hex: Regex::new(r"\b0[xX][0-9a-fA-F]+\b").ok()?,
                number: Regex::new(r"\b\d+(?:\.\d+)?(?:[eE][+-]?\d+)?\b").ok()?,
            })
        })
        .as_ref()
}

/// Replace string and numeric literals in query text with placeholders.
///
/// Identifiers containing digits (`table1`) are left alone. Applying the
/// function twice yields the same text as applying it once.
pub fn anonymize_literals(text: &str) -> String {
    let Some(patterns) = patterns() else {
        return PLACEHOLDER.to_string();
    };

    let without_strings = patterns.string.replace_all(text, PLACEHOLDER);
    let without_hex = patterns.hex.replace_all(&without_strings, PLACEHOLDER);
    patterns
        .number
        .replace_all(&without_hex, PLACEHOLDER)
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_string_and_numeric_literals() {
        let query = "SELECT * FROM users WHERE email = 'a@b.com' AND age > 42 AND score < 3.5";
        let anonymized = anonymize_literals(query);
        assert_eq!(
            anonymized,
            "SELECT * FROM users WHERE email = ? AND age > ? AND score < ?"
        );
        assert!(!anonymized.contains("a@b.com"));
        assert!(!anonymized.contains("42"));
    }

    #[test]
    fn keeps_identifiers_with_digits() {
        let anonymized = anonymize_literals("SELECT col1 FROM table2 WHERE id = 7");
        assert_eq!(anonymized, "SELECT col1 FROM table2 WHERE id = ?");
    }

    #[test]
    fn handles_escaped_and_unterminated_quotes() {
        let anonymized = anonymize_literals("WHERE name = 'O''Brien' OR note = 'secret");
        assert!(!anonymized.contains("Brien"));
        assert!(!anonymized.contains("secret"));
    }

    #[test]
    fn is_idempotent() {
        let inputs = [
            "UPDATE t SET v = 0x1F, w = '12' WHERE k IN (1, 2, 3)",
            "SELECT 1e10, -4.25, 'x''y'",
            "plain text without literals",
        ];
        for input in inputs {
            let once = anonymize_literals(input);
            let twice = anonymize_literals(&once);
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }
}

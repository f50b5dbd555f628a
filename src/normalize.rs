//! Search text normalization.
//!
//! Both the query and every candidate field go through [`normalize`] before
//! substring comparison, so matching is insensitive to case, punctuation,
//! and surrounding whitespace. The same function is used everywhere; search
//! semantics must be exactly reproducible.

/// Canonical comparison form of arbitrary text.
///
/// Lowercases the input, maps every character that is not an ASCII lowercase
/// letter or digit to a space, and collapses whitespace runs to single
/// spaces with no leading or trailing space. Total and idempotent:
/// `normalize(normalize(x)) == normalize(x)` for all `x`.
pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                ' '
            }
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_trims() {
        assert_eq!(normalize("  Widget  "), "widget");
        assert_eq!(normalize("PROD001"), "prod001");
    }

    #[test]
    fn punctuation_is_insignificant() {
        assert_eq!(normalize("Widget-X!"), normalize("widget x"));
        assert_eq!(normalize("Widget-X!"), "widget x");
        assert_eq!(normalize("a.b,c"), "a b c");
    }

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(normalize("widget \t  x"), "widget x");
        assert_eq!(normalize(" - widget - "), "widget");
    }

    #[test]
    fn non_ascii_is_stripped() {
        assert_eq!(normalize("Möbel"), "m bel");
        assert_eq!(normalize("日本語"), "");
    }

    #[test]
    fn idempotent() {
        for input in ["", "  Widget-X! ", "PROD001", "a  b\tc", "日本 abc"] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn empty_and_whitespace_only() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \t "), "");
        assert_eq!(normalize("!!!"), "");
    }
}

//! Fuzzy matching between element names and candidate attribute values.
//!
//! Case-insensitive, substring- and token-order-independent. Ties are
//! broken by match kind (exact > prefix > substring > token set), then
//! shorter match length, then earlier document order — the last two are
//! the engine's job; this module only classifies.

/// Match quality, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchKind {
    Exact,
    Prefix,
    Substring,
    TokenSet,
}

impl MatchKind {
    /// Score adjustment applied to a tier's base score.
    pub fn score_adjustment(&self) -> f64 {
        match self {
            Self::Exact => 0.0,
            Self::Prefix => -0.01,
            Self::Substring => -0.03,
            Self::TokenSet => -0.05,
        }
    }
}

/// A successful fuzzy match.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    pub kind: MatchKind,
    /// The haystack value that matched, verbatim.
    pub matched: String,
}

/// Normalize for comparison: lowercase, separators to spaces, collapsed.
fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for c in s.chars() {
        let c = if c == '_' || c == '-' || c == '/' { ' ' } else { c };
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.extend(c.to_lowercase());
            last_space = false;
        }
    }
    out.trim_end().to_string()
}

/// Match an element name against a candidate value.
pub fn fuzzy_match(needle: &str, haystack: &str) -> Option<FuzzyMatch> {
    let n = normalize(needle);
    let h = normalize(haystack);
    if n.is_empty() || h.is_empty() {
        return None;
    }

    let kind = if h == n {
        MatchKind::Exact
    } else if h.starts_with(&n) || n.starts_with(&h) {
        MatchKind::Prefix
    } else if h.contains(&n) || n.contains(&h) {
        MatchKind::Substring
    } else {
        // Token-order-independent: every needle token appears in the haystack
        let h_tokens: Vec<&str> = h.split(' ').collect();
        let all_present = n.split(' ').all(|t| h_tokens.contains(&t));
        if !all_present {
            return None;
        }
        MatchKind::TokenSet
    };

    Some(FuzzyMatch {
        kind,
        matched: haystack.to_string(),
    })
}

/// Widened matching for healing reprobes: additionally accepts a majority
/// of needle tokens appearing anywhere in the haystack.
pub fn fuzzy_match_widened(needle: &str, haystack: &str) -> Option<FuzzyMatch> {
    if let Some(m) = fuzzy_match(needle, haystack) {
        return Some(m);
    }
    let n = normalize(needle);
    let h = normalize(haystack);
    let tokens: Vec<&str> = n.split(' ').filter(|t| !t.is_empty()).collect();
    if tokens.is_empty() {
        return None;
    }
    let present = tokens.iter().filter(|t| h.contains(**t)).count();
    if present * 2 > tokens.len() {
        return Some(FuzzyMatch {
            kind: MatchKind::TokenSet,
            matched: haystack.to_string(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_beats_prefix_beats_substring() {
        assert!(MatchKind::Exact < MatchKind::Prefix);
        assert!(MatchKind::Prefix < MatchKind::Substring);
        assert!(MatchKind::Substring < MatchKind::TokenSet);
    }

    #[test]
    fn test_case_insensitive_exact() {
        let m = fuzzy_match("Search Wikipedia", "search wikipedia").unwrap();
        assert_eq!(m.kind, MatchKind::Exact);
    }

    #[test]
    fn test_separator_normalization() {
        let m = fuzzy_match("account name", "Account_Name").unwrap();
        assert_eq!(m.kind, MatchKind::Exact);
        let m = fuzzy_match("account name", "account-name-field").unwrap();
        assert_eq!(m.kind, MatchKind::Prefix);
    }

    #[test]
    fn test_substring_both_directions() {
        let m = fuzzy_match("Search", "Wikipedia Search Box").unwrap();
        assert_eq!(m.kind, MatchKind::Substring);
    }

    #[test]
    fn test_token_order_independent() {
        let m = fuzzy_match("name account", "account name").unwrap();
        assert_eq!(m.kind, MatchKind::TokenSet);
    }

    #[test]
    fn test_no_match() {
        assert!(fuzzy_match("Search", "Navigation menu").is_none());
        assert!(fuzzy_match("", "anything").is_none());
    }

    #[test]
    fn test_widened_accepts_majority_tokens() {
        assert!(fuzzy_match("account name field", "the name of the account").is_none());
        let m = fuzzy_match_widened("account name field", "the name of the account").unwrap();
        assert_eq!(m.kind, MatchKind::TokenSet);

        // Minority of tokens still rejected
        assert!(fuzzy_match_widened("account name field", "zip code").is_none());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn identical_strings_match_exactly(s in "[a-zA-Z][a-zA-Z ]{0,20}") {
                let m = fuzzy_match(&s, &s).unwrap();
                prop_assert_eq!(m.kind, MatchKind::Exact);
            }
        }
    }
}

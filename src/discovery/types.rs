//! Selector records and discovery strategies.

use serde::{Deserialize, Serialize};

/// Discovery strategy that produced a selector.
///
/// Tiers 1-8 map onto the waterfall; `Ordinal` outranks them all when the
/// intent carries a position, and is never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    AriaLabel,
    AriaPlaceholder,
    NameAttr,
    Placeholder,
    LabelFor,
    RoleName,
    DataTest,
    IdClass,
    Ordinal,
}

impl Strategy {
    /// Waterfall position (1-8); ordinal sits outside the waterfall.
    pub fn tier(&self) -> u8 {
        match self {
            Self::AriaLabel => 1,
            Self::AriaPlaceholder => 2,
            Self::NameAttr => 3,
            Self::Placeholder => 4,
            Self::LabelFor => 5,
            Self::RoleName => 6,
            Self::DataTest => 7,
            Self::IdClass => 8,
            Self::Ordinal => 0,
        }
    }

    /// Base confidence before fuzzy-match adjustment.
    pub fn base_score(&self) -> f64 {
        match self {
            Self::AriaLabel => 0.98,
            Self::AriaPlaceholder => 0.96,
            Self::NameAttr => 0.94,
            Self::Placeholder => 0.90,
            Self::LabelFor => 0.86,
            Self::RoleName => 0.95,
            Self::DataTest => 0.80,
            Self::IdClass => 0.70,
            Self::Ordinal => 0.60,
        }
    }

    /// Whether selectors from this strategy are cacheable.
    pub fn is_stable(&self) -> bool {
        match self {
            Self::AriaLabel
            | Self::AriaPlaceholder
            | Self::NameAttr
            | Self::Placeholder
            | Self::LabelFor
            | Self::DataTest => true,
            Self::RoleName | Self::IdClass | Self::Ordinal => false,
        }
    }

    /// Stable ledger/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AriaLabel => "aria_label",
            Self::AriaPlaceholder => "aria_placeholder",
            Self::NameAttr => "name_attr",
            Self::Placeholder => "placeholder",
            Self::LabelFor => "label_for",
            Self::RoleName => "role_name",
            Self::DataTest => "data_test",
            Self::IdClass => "id_class",
            Self::Ordinal => "ordinal",
        }
    }

    /// Parse a stored strategy name.
    pub fn parse(s: &str) -> Option<Self> {
        let strategy = match s {
            "aria_label" => Self::AriaLabel,
            "aria_placeholder" => Self::AriaPlaceholder,
            "name_attr" => Self::NameAttr,
            "placeholder" => Self::Placeholder,
            "label_for" => Self::LabelFor,
            "role_name" => Self::RoleName,
            "data_test" => Self::DataTest,
            "id_class" => Self::IdClass,
            "ordinal" => Self::Ordinal,
            _ => return None,
        };
        Some(strategy)
    }

    /// The eight waterfall strategies in walk order.
    pub fn waterfall() -> [Strategy; 8] {
        [
            Self::AriaLabel,
            Self::AriaPlaceholder,
            Self::NameAttr,
            Self::Placeholder,
            Self::LabelFor,
            Self::RoleName,
            Self::DataTest,
            Self::IdClass,
        ]
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata attached to a discovered selector.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectorMeta {
    /// Waterfall tier (0 for ordinal).
    pub tier: u8,
    /// Short prefix of the DOM fingerprint at discovery time.
    pub dom_hash_prefix: String,
    /// The attribute/text value the fuzzy matcher accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_text: Option<String>,
    /// Position within the role class, for ordinal selectors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<usize>,
    /// Role used for role/ordinal queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Resolved scope container selector, when the intent was scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Whether this record came out of the cache.
    #[serde(default)]
    pub from_cache: bool,
}

/// The output of discovery for one intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorRecord {
    pub selector: String,
    /// Confidence in [0, 1].
    pub score: f64,
    pub strategy: Strategy,
    /// Stable selectors are cacheable; volatile ones never are.
    pub stable: bool,
    pub meta: SelectorMeta,
}

impl SelectorRecord {
    pub fn new(selector: impl Into<String>, strategy: Strategy, score: f64) -> Self {
        Self {
            selector: selector.into(),
            score: score.clamp(0.0, 1.0),
            strategy,
            stable: strategy.is_stable(),
            meta: SelectorMeta {
                tier: strategy.tier(),
                ..SelectorMeta::default()
            },
        }
    }

    pub fn with_matched_text(mut self, text: impl Into<String>) -> Self {
        self.meta.matched_text = Some(text.into());
        self
    }

    pub fn with_dom_hash(mut self, prefix: impl Into<String>) -> Self {
        self.meta.dom_hash_prefix = prefix.into();
        self
    }

    pub fn from_cache(mut self) -> Self {
        self.meta.from_cache = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering_matches_waterfall() {
        let tiers: Vec<u8> = Strategy::waterfall().iter().map(|s| s.tier()).collect();
        assert_eq!(tiers, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_stability_flags() {
        assert!(Strategy::AriaLabel.is_stable());
        assert!(Strategy::DataTest.is_stable());
        assert!(!Strategy::RoleName.is_stable());
        assert!(!Strategy::IdClass.is_stable());
        assert!(!Strategy::Ordinal.is_stable());
    }

    #[test]
    fn test_strategy_name_roundtrip() {
        for strategy in Strategy::waterfall() {
            assert_eq!(Strategy::parse(strategy.as_str()), Some(strategy));
        }
        assert_eq!(Strategy::parse("ordinal"), Some(Strategy::Ordinal));
        assert_eq!(Strategy::parse("nonsense"), None);
    }

    #[test]
    fn test_record_clamps_score() {
        let record = SelectorRecord::new("#x", Strategy::IdClass, 1.7);
        assert_eq!(record.score, 1.0);
        assert!(!record.stable);
    }
}

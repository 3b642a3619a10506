//! The eight discovery tiers as a strategy table.
//!
//! Each tier is a probe `(driver, intent, scope) -> candidate?`; new
//! strategies are added by extending the table, not by subclassing.

use super::fuzzy::{fuzzy_match, fuzzy_match_widened, FuzzyMatch};
use super::guardrails;
use super::types::Strategy;
use crate::browser::{BrowserDriver, ElementSnapshot};
use crate::error::Result;
use crate::plan::{Action, Intent};
use async_trait::async_trait;

/// What a tier probe found.
#[derive(Debug, Clone)]
pub struct TierCandidate {
    pub selector: String,
    pub matched: FuzzyMatch,
    pub snapshot: ElementSnapshot,
}

/// One rung of the discovery waterfall.
#[async_trait]
pub trait DiscoveryTier: Send + Sync {
    /// Which strategy this tier implements.
    fn strategy(&self) -> Strategy;

    /// Probe the page for a candidate matching the intent.
    async fn probe(
        &self,
        driver: &dyn BrowserDriver,
        intent: &Intent,
        scope: Option<&str>,
        widen: bool,
    ) -> Result<Option<TierCandidate>>;
}

/// Pick the best candidate from snapshots by (match kind, value length,
/// document order), after guardrail filtering.
fn pick_best<E, S>(
    intent: &Intent,
    snapshots: &[ElementSnapshot],
    widen: bool,
    extract: E,
    selector_for: S,
) -> Option<TierCandidate>
where
    E: Fn(&ElementSnapshot) -> Option<String>,
    S: Fn(&str) -> String,
{
    let matcher: fn(&str, &str) -> Option<FuzzyMatch> =
        if widen { fuzzy_match_widened } else { fuzzy_match };
    let mut best: Option<((super::fuzzy::MatchKind, usize, usize), TierCandidate)> = None;

    for (idx, snapshot) in snapshots.iter().enumerate() {
        if guardrails::rejects(intent, snapshot) {
            continue;
        }
        let value = match extract(snapshot) {
            Some(v) => v,
            None => continue,
        };
        let matched = match matcher(&intent.element_name, &value) {
            Some(m) => m,
            None => continue,
        };
        let rank = (matched.kind, value.len(), idx);
        let better = best.as_ref().map(|(r, _)| rank < *r).unwrap_or(true);
        if better {
            best = Some((
                rank,
                TierCandidate {
                    selector: selector_for(&value),
                    matched,
                    snapshot: snapshot.clone(),
                },
            ));
        }
    }

    best.map(|(_, c)| c)
}

/// Shared probe for single-attribute tiers.
async fn probe_attribute(
    driver: &dyn BrowserDriver,
    intent: &Intent,
    scope: Option<&str>,
    attr: &str,
    widen: bool,
) -> Result<Option<TierCandidate>> {
    let snapshots = driver.query(&format!("[{}]", attr), scope).await?;
    Ok(pick_best(
        intent,
        &snapshots,
        widen,
        |s| s.attr(attr).map(str::to_string),
        |value| format!("[{}=\"{}\"]", attr, value),
    ))
}

macro_rules! attribute_tier {
    ($name:ident, $strategy:expr, $attr:literal) => {
        pub struct $name;

        #[async_trait]
        impl DiscoveryTier for $name {
            fn strategy(&self) -> Strategy {
                $strategy
            }

            async fn probe(
                &self,
                driver: &dyn BrowserDriver,
                intent: &Intent,
                scope: Option<&str>,
                widen: bool,
            ) -> Result<Option<TierCandidate>> {
                probe_attribute(driver, intent, scope, $attr, widen).await
            }
        }
    };
}

attribute_tier!(AriaLabelTier, Strategy::AriaLabel, "aria-label");
attribute_tier!(AriaPlaceholderTier, Strategy::AriaPlaceholder, "aria-placeholder");
attribute_tier!(NameAttrTier, Strategy::NameAttr, "name");
attribute_tier!(PlaceholderTier, Strategy::Placeholder, "placeholder");

/// Tier 5: a `label[for=id]` whose visible text matches; the target is
/// the referenced element.
pub struct LabelForTier;

#[async_trait]
impl DiscoveryTier for LabelForTier {
    fn strategy(&self) -> Strategy {
        Strategy::LabelFor
    }

    async fn probe(
        &self,
        driver: &dyn BrowserDriver,
        intent: &Intent,
        scope: Option<&str>,
        widen: bool,
    ) -> Result<Option<TierCandidate>> {
        let matcher: fn(&str, &str) -> Option<FuzzyMatch> =
            if widen { fuzzy_match_widened } else { fuzzy_match };
        let labels = driver.query("label", scope).await?;

        for label in &labels {
            let target_id = match label.attr("for") {
                Some(id) if !id.is_empty() => id,
                _ => continue,
            };
            let matched = match matcher(&intent.element_name, &label.text) {
                Some(m) => m,
                None => continue,
            };
            let selector = format!("#{}", target_id);
            let targets = driver.query(&selector, None).await?;
            let target = match targets.first() {
                Some(t) => t,
                None => continue,
            };
            if guardrails::rejects(intent, target) {
                continue;
            }
            return Ok(Some(TierCandidate {
                selector,
                matched,
                snapshot: target.clone(),
            }));
        }
        Ok(None)
    }
}

/// Role fallback order for an action.
fn roles_for_action(action: Action) -> &'static [&'static str] {
    match action {
        Action::Click => &["button", "link", "tab"],
        Action::Fill | Action::Type => &["textbox", "combobox"],
        Action::Select => &["combobox", "listbox"],
        Action::Check | Action::Uncheck => &["checkbox"],
        Action::Press | Action::Focus => &["textbox", "button"],
        Action::Hover => &["link", "button"],
        Action::Wait | Action::Navigate => &["button", "link", "tab"],
    }
}

/// Tier 6: role plus accessible name. Volatile; scores high but is never
/// cached.
pub struct RoleNameTier;

#[async_trait]
impl DiscoveryTier for RoleNameTier {
    fn strategy(&self) -> Strategy {
        Strategy::RoleName
    }

    async fn probe(
        &self,
        driver: &dyn BrowserDriver,
        intent: &Intent,
        scope: Option<&str>,
        widen: bool,
    ) -> Result<Option<TierCandidate>> {
        for role in roles_for_action(intent.action) {
            let snapshots = driver.query_role(role, scope).await?;
            let candidate = pick_best(
                intent,
                &snapshots,
                widen,
                |s| {
                    let name = s.accessible_name();
                    if name.is_empty() {
                        None
                    } else {
                        Some(name.to_string())
                    }
                },
                |value| format!("role={}[name=\"{}\"]", role, value),
            );
            if candidate.is_some() {
                return Ok(candidate);
            }
        }
        Ok(None)
    }
}

const TEST_ATTRS: &[&str] = &["data-testid", "data-test", "data-cy", "data-qa"];

/// Tier 7: dedicated test attributes.
pub struct DataTestTier;

#[async_trait]
impl DiscoveryTier for DataTestTier {
    fn strategy(&self) -> Strategy {
        Strategy::DataTest
    }

    async fn probe(
        &self,
        driver: &dyn BrowserDriver,
        intent: &Intent,
        scope: Option<&str>,
        widen: bool,
    ) -> Result<Option<TierCandidate>> {
        for attr in TEST_ATTRS {
            let candidate = probe_attribute(driver, intent, scope, attr, widen).await?;
            if candidate.is_some() {
                return Ok(candidate);
            }
        }
        Ok(None)
    }
}

/// Tier 8: raw id or class token. Last resort; volatile.
pub struct IdClassTier;

#[async_trait]
impl DiscoveryTier for IdClassTier {
    fn strategy(&self) -> Strategy {
        Strategy::IdClass
    }

    async fn probe(
        &self,
        driver: &dyn BrowserDriver,
        intent: &Intent,
        scope: Option<&str>,
        widen: bool,
    ) -> Result<Option<TierCandidate>> {
        let by_id = driver.query("[id]", scope).await?;
        let candidate = pick_best(
            intent,
            &by_id,
            widen,
            |s| s.attr("id").map(str::to_string),
            |value| format!("#{}", value),
        );
        if candidate.is_some() {
            return Ok(candidate);
        }

        // Class tokens are matched one by one; the selector targets the
        // single best token.
        let matcher: fn(&str, &str) -> Option<FuzzyMatch> =
            if widen { fuzzy_match_widened } else { fuzzy_match };
        let by_class = driver.query("[class]", scope).await?;
        for snapshot in &by_class {
            if guardrails::rejects(intent, snapshot) {
                continue;
            }
            let classes = match snapshot.attr("class") {
                Some(c) => c,
                None => continue,
            };
            for token in classes.split_whitespace() {
                if let Some(matched) = matcher(&intent.element_name, token) {
                    return Ok(Some(TierCandidate {
                        selector: format!(".{}", token),
                        matched,
                        snapshot: snapshot.clone(),
                    }));
                }
            }
        }
        Ok(None)
    }
}

/// The full waterfall, in tier order.
pub fn tier_table() -> Vec<Box<dyn DiscoveryTier>> {
    vec![
        Box::new(AriaLabelTier),
        Box::new(AriaPlaceholderTier),
        Box::new(NameAttrTier),
        Box::new(PlaceholderTier),
        Box::new(LabelForTier),
        Box::new(RoleNameTier),
        Box::new(DataTestTier),
        Box::new(IdClassTier),
    ]
}

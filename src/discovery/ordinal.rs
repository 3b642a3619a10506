//! Ordinal selection: "first video result", "3rd item".
//!
//! Resolved entirely at discovery time by enumerating a role class in
//! document order. The resulting selector is position-dependent, carries
//! `stable = false`, and is never cached.

use super::types::{SelectorRecord, Strategy};
use crate::browser::{with_nth, BrowserDriver};
use crate::error::Result;
use crate::memory::drift;
use crate::plan::Intent;

/// Map an element-type hint onto the role to enumerate.
///
/// The hint can be multi-word ("video result"); any recognized token
/// decides, scanned right to left so the head noun wins.
pub fn role_for_hint(hint: &str) -> &'static str {
    let tokens: Vec<String> = hint
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    for token in tokens.iter().rev() {
        let role = match token.as_str() {
            "video" | "result" | "link" => "link",
            "item" | "option" | "entry" => "listitem",
            "card" | "article" | "post" => "article",
            "button" => "button",
            "heading" | "title" => "heading",
            "tab" => "tab",
            "image" | "thumbnail" | "picture" => "img",
            "row" => "row",
            "field" | "input" | "box" => "textbox",
            _ => continue,
        };
        return role;
    }
    "link"
}

/// Resolve an ordinal intent to the nth element of its role class.
///
/// Returns `None` when the role class has fewer elements than the
/// ordinal asks for; the engine then falls through to the tier walk.
pub async fn probe(
    driver: &dyn BrowserDriver,
    intent: &Intent,
    scope: Option<&str>,
) -> Result<Option<SelectorRecord>> {
    let ordinal = match intent.ordinal {
        Some(n) => n,
        None => return Ok(None),
    };
    let hint = intent.element_type_hint.as_deref().unwrap_or("link");
    let role = role_for_hint(hint);

    let elements = driver.query_role(role, scope).await?;
    let target = match elements.get(ordinal) {
        Some(snapshot) => snapshot,
        None => return Ok(None),
    };

    let selector = with_nth(&format!("role={}", role), ordinal);
    let mut record = SelectorRecord::new(selector, Strategy::Ordinal, Strategy::Ordinal.base_score())
        .with_dom_hash(drift::fingerprint_prefix(target));
    record.meta.ordinal = Some(ordinal);
    record.meta.role = Some(role.to_string());
    record.meta.matched_text = Some(target.accessible_name().to_string());
    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{FakeBrowser, FakeElement, FakePage};
    use crate::plan::Action;

    fn results_page() -> FakePage {
        FakePage::new("u")
            .element(FakeElement::new("a").attr("href", "/watch?v=1").text("Tutorial one"))
            .element(FakeElement::new("a").attr("href", "/watch?v=2").text("Tutorial two"))
            .element(FakeElement::new("a").attr("href", "/watch?v=3").text("Tutorial three"))
    }

    fn ordinal_intent(n: usize, hint: &str) -> Intent {
        let mut intent = Intent::new("nth thing", Action::Click);
        intent.ordinal = Some(n);
        intent.element_type_hint = Some(hint.to_string());
        intent
    }

    #[test]
    fn test_role_mapping() {
        assert_eq!(role_for_hint("video result"), "link");
        assert_eq!(role_for_hint("item"), "listitem");
        assert_eq!(role_for_hint("card"), "article");
        assert_eq!(role_for_hint("unknown noun"), "link");
    }

    #[tokio::test]
    async fn test_probe_selects_nth_in_document_order() {
        let browser = FakeBrowser::new().page(results_page());
        browser.navigate("u").await.unwrap();

        let record = probe(&browser, &ordinal_intent(1, "video result"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.selector, "role=link >> nth=1");
        assert!(!record.stable);
        assert_eq!(record.meta.ordinal, Some(1));
        assert_eq!(record.meta.matched_text.as_deref(), Some("Tutorial two"));
    }

    #[tokio::test]
    async fn test_probe_beyond_count_returns_none() {
        let browser = FakeBrowser::new().page(results_page());
        browser.navigate("u").await.unwrap();

        let record = probe(&browser, &ordinal_intent(9, "video result"), None)
            .await
            .unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_non_ordinal_intent_is_skipped() {
        let browser = FakeBrowser::new().page(results_page());
        browser.navigate("u").await.unwrap();

        let intent = Intent::new("plain", Action::Click);
        assert!(probe(&browser, &intent, None).await.unwrap().is_none());
    }
}

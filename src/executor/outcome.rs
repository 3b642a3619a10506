//! Outcome verification, including the SPA navigation race.

use crate::browser::BrowserDriver;
use crate::error::Result;
use crate::plan::Outcome;
use crate::profile::RuntimeProfile;
use std::time::Duration;

/// Poll the DOM for a text token until the deadline.
async fn poll_for_text(driver: &dyn BrowserDriver, text: &str, budget: Duration) -> Result<bool> {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        if driver.page_contains_text(text).await? {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Poll the configured success-token selectors until the deadline.
async fn poll_for_token_selectors(
    driver: &dyn BrowserDriver,
    selectors: &[String],
    budget: Duration,
) -> Result<bool> {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        for selector in selectors {
            let hits = driver.query(selector, None).await?;
            if hits.iter().any(|h| h.visible) {
                return Ok(true);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Race standard navigation completion against a DOM success token.
///
/// Single-page apps often "navigate" without a document load; whichever
/// waiter resolves first within the profile budget wins, and the loser is
/// cancelled by drop.
pub async fn navigation_race(
    driver: &dyn BrowserDriver,
    from_url: &str,
    token: &str,
    token_selectors: &[String],
    profile: RuntimeProfile,
) -> Result<bool> {
    let budget = profile.budgets().nav_race;

    let nav = driver.wait_for_navigation(from_url, budget);
    let dom_text = poll_for_text(driver, token, budget);
    let dom_token = poll_for_token_selectors(driver, token_selectors, budget);
    tokio::pin!(nav);
    tokio::pin!(dom_text);
    tokio::pin!(dom_token);

    tokio::select! {
        nav_done = &mut nav => {
            match nav_done? {
                true => {
                    let url = driver.current_url().await?;
                    // A completed navigation satisfies `navigates_to` when
                    // the destination carries the token; otherwise give the
                    // DOM token the remaining budget.
                    if url.to_lowercase().contains(&token.to_lowercase()) {
                        Ok(true)
                    } else {
                        poll_for_text(driver, token, Duration::from_millis(250)).await
                    }
                }
                false => Ok(false),
            }
        }
        text_found = &mut dom_text => Ok(text_found?),
        token_found = &mut dom_token => Ok(token_found?),
    }
}

/// Verify a step's declared outcome. `None` outcomes are implicitly
/// satisfied by the action primitive not failing.
pub async fn verify(
    driver: &dyn BrowserDriver,
    outcome: Option<&Outcome>,
    selector: &str,
    expected_value: Option<&str>,
    from_url: &str,
    token_selectors: &[String],
    profile: RuntimeProfile,
) -> Result<bool> {
    match outcome {
        None => Ok(true),
        Some(Outcome::FieldPopulated) => {
            let actual = driver.read_value(selector).await?;
            Ok(expected_value.map(|e| actual == e).unwrap_or(!actual.is_empty()))
        }
        Some(Outcome::NavigatesTo(token)) => {
            navigation_race(driver, from_url, token, token_selectors, profile).await
        }
        Some(Outcome::PageContainsText(text)) => {
            poll_for_text(driver, text, profile.budgets().nav_race).await
        }
    }
}

//! Comment extraction with a headless Chrome session.

use std::ffi::OsStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::models::RawComment;
use crate::stealth;

/// Emoji, pictograph, symbol and dingbat blocks.
static PICTOGRAPHS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        "[",
        r"\x{1F600}-\x{1F64F}", // emoticons
        r"\x{1F300}-\x{1F5FF}", // symbols & pictographs
        r"\x{1F680}-\x{1F6FF}", // transport & map
        r"\x{1F1E0}-\x{1F1FF}", // flags
        r"\x{1F200}-\x{1F251}", // enclosed ideographic supplement
        r"\x{1F900}-\x{1F9FF}", // supplemental symbols & pictographs
        r"\x{1FA70}-\x{1FAFF}", // symbols & pictographs extended-A
        r"\x{2600}-\x{26FF}",   // misc symbols
        r"\x{2700}-\x{27BF}",   // dingbats
        r"\x{24C2}",
        r"\x{FE0F}\x{200D}",    // emoji presentation selector, ZWJ
        "]+"
    ))
    .expect("pictograph pattern is valid")
});

const SCROLL_HEIGHT_JS: &str = "document.documentElement.scrollHeight";
const SCROLL_TO_BOTTOM_JS: &str = "window.scrollTo(0, document.documentElement.scrollHeight);";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub comments: Vec<RawComment>,
    /// False when scrolling hit its round or time limit before the page stopped growing
    pub fully_loaded: bool,
}

/// Anything that can produce the ordered comment list for a page.
#[async_trait]
pub trait CommentSource: Send + Sync {
    async fn fetch_comments(&self, page_url: &str) -> Result<ExtractionOutcome>;
}

pub fn strip_pictographs(text: &str) -> String {
    PICTOGRAPHS.replace_all(text, "").into_owned()
}

/// Cleans scraped texts and drops blanks, keeping page order.
pub fn clean_texts<I, S>(texts: I) -> Vec<RawComment>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    texts
        .into_iter()
        .filter_map(|raw| {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                return None;
            }
            let cleaned = strip_pictographs(raw).trim().to_string();
            (!cleaned.is_empty()).then_some(cleaned)
        })
        .collect()
}

/// The first match is the video's own description, not a comment.
pub fn drop_description(mut texts: Vec<RawComment>) -> Vec<RawComment> {
    if texts.len() > 1 {
        texts.remove(0);
    }
    texts
}

/// Text of every node matching `selector`, in document order.
pub fn select_texts(html: &str, selector: &str) -> Result<Vec<String>> {
    let selector = Selector::parse(selector)
        .map_err(|e| anyhow!("invalid content selector {:?}: {:?}", selector, e))?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .collect())
}

/// Repeats `step` (scroll, pause, measure) until the height stops changing.
///
/// Returns `Ok(false)` when `max_rounds` or `timeout` ran out first.
pub fn scroll_until_stable<F>(
    mut last_height: u64,
    max_rounds: u32,
    timeout: Duration,
    mut step: F,
) -> Result<bool>
where
    F: FnMut() -> Result<u64>,
{
    let started = Instant::now();
    for round in 1..=max_rounds {
        let new_height = step()?;
        debug!("📜 Scroll round {}: height {} -> {}", round, last_height, new_height);
        if new_height == last_height {
            info!("📜 Page height settled at {}px after {} rounds", new_height, round);
            return Ok(true);
        }
        last_height = new_height;
        if started.elapsed() >= timeout {
            warn!("⚠️ Scroll timeout after {} rounds, keeping what is loaded", round);
            return Ok(false);
        }
    }
    warn!("⚠️ Page still growing after {} scroll rounds, keeping what is loaded", max_rounds);
    Ok(false)
}

fn scroll_height(tab: &Arc<Tab>) -> Result<u64> {
    let value = tab
        .evaluate(SCROLL_HEIGHT_JS, false)?
        .value
        .ok_or_else(|| anyhow!("scrollHeight evaluated to nothing"))?;
    value
        .as_f64()
        .map(|h| h as u64)
        .ok_or_else(|| anyhow!("scrollHeight is not a number: {}", value))
}

/// Scrapes comments through a hardened headless Chrome.
pub struct BrowserExtractor {
    config: ExtractionConfig,
}

impl BrowserExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Blocking browser session. The `Browser` owns the Chrome process and
    /// kills it when dropped, on success and on every `?` below.
    fn scrape(config: &ExtractionConfig, page_url: &str) -> Result<ExtractionOutcome> {
        let user_agent = stealth::random_user_agent();
        let args = stealth::launch_args(user_agent);
        debug!("Launching Chrome with User-Agent: {}", user_agent);

        let browser = Browser::new(LaunchOptions {
            headless: false, // new headless mode via args
            sandbox: false,
            window_size: Some(config.window_size),
            args: args.iter().map(OsStr::new).collect(),
            ..Default::default()
        })
        .context("launching Chrome")?;

        let tab = browser.new_tab()?;
        stealth::harden_tab(&tab, &config.locale)?;

        info!("🌐 Navigating to: {}", page_url);
        tab.navigate_to(page_url)
            .with_context(|| format!("navigating to {}", page_url))?;
        tab.wait_until_navigated()?;
        thread::sleep(config.settle_time);

        tab.evaluate(
            &format!("window.scrollTo(0, {});", config.initial_scroll_offset),
            false,
        )?;
        thread::sleep(config.initial_scroll_pause);

        let start_height = scroll_height(&tab)?;
        let fully_loaded = scroll_until_stable(
            start_height,
            config.max_scroll_rounds,
            config.scroll_timeout,
            || {
                tab.evaluate(SCROLL_TO_BOTTOM_JS, false)?;
                thread::sleep(config.scroll_pause);
                scroll_height(&tab)
            },
        )?;

        let html = tab.get_content()?;
        let texts = select_texts(&html, &config.content_selector)?;
        let cleaned = clean_texts(&texts);
        debug!("{} matching nodes, {} non-empty after cleaning", texts.len(), cleaned.len());

        Ok(ExtractionOutcome {
            comments: drop_description(cleaned),
            fully_loaded,
        })
    }
}

#[async_trait]
impl CommentSource for BrowserExtractor {
    async fn fetch_comments(&self, page_url: &str) -> Result<ExtractionOutcome> {
        let config = self.config.clone();
        let url = page_url.to_string();
        let outcome = tokio::task::spawn_blocking(move || Self::scrape(&config, &url))
            .await
            .context("browser task panicked")??;
        info!(
            "✅ Extracted {} comments (fully loaded: {})",
            outcome.comments.len(),
            outcome.fully_loaded
        );
        Ok(outcome)
    }
}

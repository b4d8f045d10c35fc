//! Browser hardening against basic automation detection.
//!
//! - Chrome launch flags that hide the "controlled by automation" banner
//! - A randomized desktop user agent per session
//! - A document-start script masking the usual headless giveaways

use std::sync::Arc;

use anyhow::Result;
use headless_chrome::protocol::cdp::{Emulation::SetLocaleOverride, Page};
use headless_chrome::Tab;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;

static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0",
    ]
});

const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FALLBACK_USER_AGENT)
}

/// Chrome command line for a hardened headless session.
pub fn launch_args(user_agent: &str) -> Vec<String> {
    vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-infobars".to_string(),
        "--mute-audio".to_string(),
        "--headless=new".to_string(),
        format!("--user-agent={}", user_agent),
    ]
}

/// Script evaluated before any page script on every new document.
pub fn get_stealth_script() -> String {
    r#"
        Object.defineProperty(navigator, 'webdriver', {
            get: () => undefined,
        });

        if (!window.chrome) {
            window.chrome = {};
        }
        window.chrome.runtime = window.chrome.runtime || {
            connect: function() {
                return {
                    onMessage: { addListener: function() {}, removeListener: function() {} },
                    postMessage: function() {},
                    disconnect: function() {}
                };
            },
            sendMessage: function() {}
        };

        Object.defineProperty(navigator, 'languages', {
            get: () => ['en-US', 'en'],
        });

        // Headless Chrome reports an empty plugin list
        Object.defineProperty(navigator, 'plugins', {
            get: () => [
                { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' },
                { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' },
                { name: 'Native Client', filename: 'internal-nacl-plugin' }
            ],
        });

        const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
        if (originalQuery) {
            window.navigator.permissions.query = (parameters) => (
                parameters.name === 'notifications' ?
                Promise.resolve({ state: Notification.permission }) :
                originalQuery(parameters)
            );
        }
    "#
    .to_string()
}

/// Installs the stealth script and locale override on a fresh tab.
pub fn harden_tab(tab: &Arc<Tab>, locale: &str) -> Result<()> {
    tab.enable_debugger()?;
    tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
        source: get_stealth_script(),
        world_name: None,
        include_command_line_api: None,
        run_immediately: None,
    })?;
    tab.call_method(SetLocaleOverride {
        locale: Some(locale.to_string()),
    })?;
    Ok(())
}

use crate::scrapers::http::{random_user_agent, FetchError, BROWSER_ACCEPT_LANGUAGE};
use crate::scrapers::traits::PageFetcher;
use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::ffi::OsStr;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const BOT_CHECK_TITLES: [&str; 2] = ["Überprüfung", "Bot Check"];
const SUBMIT_SELECTOR: &str = r#"button[type="submit"], input[type="submit"]"#;

/// Fetches pages through headless Chrome for sites that only render
/// listings after running their scripts.
///
/// Interstitial bot checks get one submit-button click. That may silently
/// fail, in which case the returned HTML is the check page itself and the
/// extractor finds nothing.
pub struct BrowserFetcher {
    timeout: Duration,
}

impl BrowserFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn render(url: &str, timeout: Duration) -> Result<String> {
        info!("[Browser] Launching headless Chrome for {}", url);

        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some((1280, 800)))
            .idle_browser_timeout(timeout * 2)
            .args(vec![OsStr::new("--disable-setuid-sandbox")])
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
        let tab = browser.new_tab().context("Failed to open tab")?;
        tab.set_default_timeout(timeout);
        tab.set_user_agent(random_user_agent(), Some(BROWSER_ACCEPT_LANGUAGE), None)?;

        tab.navigate_to(url)?;
        tab.wait_until_navigated()?;

        let title = tab.get_title().unwrap_or_default();
        if is_bot_check(&title) {
            info!("[Browser] Bot check detected (\"{}\"), trying to submit it", title);
            match tab.find_element(SUBMIT_SELECTOR) {
                Ok(button) => {
                    if let Err(err) = button.click() {
                        warn!("[Browser] Bot check click failed: {:#}", err);
                    } else {
                        // Navigation after the click may never happen
                        let _ = tab.wait_until_navigated();
                        thread::sleep(Duration::from_secs(2));
                    }
                }
                Err(err) => debug!("[Browser] No submit button on bot check: {:#}", err),
            }
        }

        let html = tab.get_content().context("Failed to read rendered HTML")?;
        debug!("[Browser] Rendered {} bytes from {}", html.len(), url);
        Ok(html)
    }
}

/// Whether a document title belongs to an interstitial bot check
pub fn is_bot_check(title: &str) -> bool {
    BOT_CHECK_TITLES.iter().any(|marker| title.contains(marker))
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let url = url.to_string();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || Self::render(&url, timeout))
            .await
            .map_err(|err| FetchError::Browser(err.to_string()))?
            .map_err(|err| FetchError::Browser(format!("{err:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_bot_check_titles() {
        assert!(is_bot_check("Überprüfung Ihres Browsers"));
        assert!(is_bot_check("Bot Check"));
        assert!(!is_bot_check("WG-Zimmer in Berlin"));
        assert!(!is_bot_check(""));
    }
}

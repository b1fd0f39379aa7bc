//! Web search tool
//!
//! Queries the DuckDuckGo HTML endpoint (no API key required) and returns the
//! top result titles as a single summary string.

use crate::error::MangabaError;
use crate::tools::Tool;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

static RESULT_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*>(.*?)</a>"#).unwrap()
});
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

pub struct GoogleSearchTool {
    client: reqwest::Client,
    max_results: usize,
    trigger: Option<Regex>,
}

impl GoogleSearchTool {
    pub fn new() -> Self {
        GoogleSearchTool {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            max_results: 3,
            trigger: None,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    /// Only run for task texts matching `pattern`. An invalid pattern leaves
    /// the tool always-on.
    pub fn with_trigger(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => self.trigger = Some(regex),
            Err(e) => log::warn!("[SEARCH] Invalid trigger pattern '{}': {}", pattern, e),
        }
        self
    }
}

impl Default for GoogleSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GoogleSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn matches(&self, task_text: &str) -> bool {
        match &self.trigger {
            Some(regex) => regex.is_match(task_text),
            None => true,
        }
    }

    async fn run(&self, query: &str) -> Result<String, MangabaError> {
        let url = format!("{}?q={}", SEARCH_ENDPOINT, urlencoding::encode(query));
        log::debug!("[SEARCH] Querying for '{}'", query);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MangabaError::Search(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MangabaError::Search(format!(
                "search returned error status: {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| MangabaError::Search(format!("failed to read response: {}", e)))?;

        let results = extract_results(&body, self.max_results);
        if results.is_empty() {
            return Err(MangabaError::Search(format!(
                "no results found for '{}'",
                query
            )));
        }

        Ok(format!("Search results: {}", results.join(", ")))
    }
}

/// Pull result titles out of the DuckDuckGo HTML page.
fn extract_results(html: &str, max_results: usize) -> Vec<String> {
    RESULT_LINK
        .captures_iter(html)
        .filter_map(|captures| {
            let raw = captures.get(1)?.as_str();
            let title = HTML_TAG.replace_all(raw, "").trim().to_string();
            if title.is_empty() { None } else { Some(title) }
        })
        .take(max_results)
        .collect()
}

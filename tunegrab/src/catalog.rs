//! Catalog scraping via the Chrome remote-debugging protocol.
//!
//! The browser must be launched with `--remote-debugging-port`. The scraper
//! asks the HTTP endpoint for the open tabs, attaches to the target page's
//! WebSocket debugger and evaluates a small extraction script. The resulting
//! list is ordered by vertical page position; that order corresponds 1:1 to
//! the order action icons appear on screen once the page is scrolled to the
//! top, which is the only way an on-screen icon maps back to a named item.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use crate::errors::AutomationError;

/// One catalog entry, in page order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub name: String,
    /// Displayed duration, `MM:SS`.
    pub duration: String,
    /// 0-based vertical position in the page.
    pub page_order: usize,
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// The full item list, ordered top-to-bottom.
    async fn catalog(&self) -> Result<Vec<CatalogItem>, AutomationError>;
}

/// Evaluated in the page; yields `[{name, duration, y}]`. Rows are found by
/// their `MM:SS` duration label in the list's left column, then the row
/// container is walked upward to pick out the title node next to it.
const CATALOG_SCRIPT: &str = r#"
var results = [];
var timeRegex = /^\d{2}:\d{2}$/;
var all = document.querySelectorAll('*');
for (var i = 0; i < all.length; i++) {
    var el = all[i];
    var t = el.textContent ? el.textContent.trim() : '';
    if (!t || !timeRegex.test(t) || el.childNodes.length !== 1) continue;
    var rect = el.getBoundingClientRect();
    if (rect.left > 400) continue;

    var container = el.parentElement;
    for (var j = 0; j < 4 && container; j++) {
        var cRect = container.getBoundingClientRect();
        if (cRect.height > 40 && cRect.height < 150) {
            var nodes = container.querySelectorAll('span, div, p, a');
            for (var k = 0; k < nodes.length; k++) {
                var text = nodes[k].textContent ? nodes[k].textContent.trim() : '';
                if (text &&
                    text.length > 2 &&
                    text.length < 80 &&
                    !timeRegex.test(text) &&
                    ['All Music', 'Favorites', 'All', 'Share', 'Home'].indexOf(text) === -1 &&
                    text.indexOf('\n') === -1 &&
                    nodes[k].childNodes.length <= 2) {
                    results.push({ name: text, duration: t, y: rect.top });
                    break;
                }
            }
            break;
        }
        container = container.parentElement;
    }
}
results;
"#;

#[derive(Debug, Deserialize)]
struct TabInfo {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    url: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    ws_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    name: String,
    duration: String,
    #[serde(default)]
    y: f64,
}

/// Catalog source backed by a live Chrome tab.
pub struct CdpCatalog {
    endpoint: String,
    host_filter: String,
}

impl CdpCatalog {
    pub fn new(endpoint: impl Into<String>, host_filter: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            host_filter: host_filter.into(),
        }
    }

    /// Debugger URL of the target tab: prefer a page whose URL contains the
    /// host filter, fall back to the first page tab.
    async fn debugger_url(&self) -> Result<String, AutomationError> {
        let tabs: Vec<TabInfo> = reqwest::get(format!("{}/json", self.endpoint))
            .await
            .map_err(|e| AutomationError::ScrapeError(format!("debugging endpoint: {e}")))?
            .json()
            .await
            .map_err(|e| AutomationError::ScrapeError(format!("tab listing: {e}")))?;

        let pages: Vec<&TabInfo> = tabs.iter().filter(|t| t.kind == "page").collect();
        let target = pages
            .iter()
            .find(|t| t.url.to_lowercase().contains(&self.host_filter))
            .or_else(|| pages.first())
            .ok_or_else(|| AutomationError::ScrapeError("no browser tabs found".to_string()))?;

        target
            .ws_url
            .clone()
            .ok_or_else(|| AutomationError::ScrapeError("tab has no debugger URL".to_string()))
    }
}

#[async_trait]
impl CatalogSource for CdpCatalog {
    async fn catalog(&self) -> Result<Vec<CatalogItem>, AutomationError> {
        let ws_url = self.debugger_url().await?;
        let (mut ws, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| AutomationError::ScrapeError(format!("debugger socket: {e}")))?;

        let request = json!({
            "id": 1,
            "method": "Runtime.evaluate",
            "params": { "expression": CATALOG_SCRIPT, "returnByValue": true },
        });
        ws.send(Message::Text(request.to_string()))
            .await
            .map_err(|e| AutomationError::ScrapeError(format!("evaluate request: {e}")))?;

        let mut rows: Option<Vec<RawRow>> = None;
        while let Some(msg) = ws.next().await {
            let msg = msg.map_err(|e| AutomationError::ScrapeError(e.to_string()))?;
            let Message::Text(text) = msg else {
                continue;
            };
            let value: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| AutomationError::ScrapeError(format!("malformed reply: {e}")))?;
            if value.get("id").and_then(|i| i.as_i64()) != Some(1) {
                continue;
            }
            if let Some(error) = value.get("error") {
                return Err(AutomationError::ScrapeError(error.to_string()));
            }
            let result = value
                .pointer("/result/result/value")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            rows = Some(serde_json::from_value(result).map_err(|e| {
                AutomationError::ScrapeError(format!("unexpected evaluate result: {e}"))
            })?);
            break;
        }
        let _ = ws.close(None).await;

        let mut rows =
            rows.ok_or_else(|| AutomationError::ScrapeError("no evaluate reply".to_string()))?;
        rows.sort_by(|a, b| a.y.total_cmp(&b.y));
        let items: Vec<CatalogItem> = rows
            .into_iter()
            .enumerate()
            .map(|(page_order, r)| CatalogItem {
                name: r.name,
                duration: r.duration,
                page_order,
            })
            .collect();
        debug!(count = items.len(), "catalog scraped");
        Ok(items)
    }
}

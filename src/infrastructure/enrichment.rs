//! Optional LLM enrichment of listing copy
//!
//! Sends the extracted product to a local Ollama instance and asks for an
//! optimized title, HTML description and keywords. Enrichment is best-effort
//! and opt-in: when it fails or is disabled the scraped copy ships as-is.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::product::ExtractedProduct;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// The JSON object the model is asked to produce inside its response text.
#[derive(Debug, Deserialize)]
struct EnrichedCopy {
    #[serde(rename = "ebayTitle")]
    title: Option<String>,
    #[serde(rename = "ebayHtmlDescription")]
    html_description: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

pub struct EnrichmentClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl EnrichmentClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self { http, base_url: base_url.into(), model: model.into() }
    }

    /// Rewrites title and description in place when the model cooperates.
    /// Keeps the scraped copy on any failure.
    pub async fn enrich(&self, product_id: &str, product: &mut ExtractedProduct) {
        let prompt = build_prompt(product);
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let request = GenerateRequest { model: &self.model, prompt, stream: false };

        let response = match self.http.post(&url).json(&request).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(%product_id, "enrichment endpoint unreachable: {e}");
                return;
            }
        };

        let body = match response.json::<GenerateResponse>().await {
            Ok(b) => b,
            Err(e) => {
                warn!(%product_id, "enrichment response not parseable: {e}");
                return;
            }
        };

        let Some(copy) = extract_embedded_json(&body.response) else {
            warn!(%product_id, "enrichment response carried no usable JSON");
            return;
        };

        if let Some(title) = copy.title.filter(|t| !t.trim().is_empty()) {
            // Target marketplace caps titles at 80 characters.
            product.title = title.chars().take(80).collect();
        }
        if let Some(description) = copy.html_description.filter(|d| !d.trim().is_empty()) {
            product.description = description;
        }
        debug!(%product_id, keywords = copy.keywords.len(), "applied enriched listing copy");
    }
}

fn build_prompt(product: &ExtractedProduct) -> String {
    format!(
        "You are an e-commerce listing copywriter. Given this product, respond with \
         ONLY a JSON object with keys \"ebayTitle\" (max 80 chars), \
         \"ebayHtmlDescription\" and \"keywords\" (array of strings).\n\n\
         Title: {}\nBrand: {}\nFeatures:\n{}",
        product.title,
        product.brand,
        product.features.join("\n")
    )
}

/// Pulls the first balanced JSON object out of free-form model output.
/// Models wrap their JSON in prose and code fences more often than not.
fn extract_embedded_json(text: &str) -> Option<EnrichedCopy> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..=start + offset];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_wrapped_in_prose() {
        let text = "Sure! Here is the listing:\n```json\n{\"ebayTitle\": \"Acme Widget\", \
                    \"ebayHtmlDescription\": \"<p>Great</p>\", \"keywords\": [\"widget\"]}\n```";
        let copy = extract_embedded_json(text).unwrap();
        assert_eq!(copy.title.as_deref(), Some("Acme Widget"));
        assert_eq!(copy.keywords, vec!["widget"]);
    }

    #[test]
    fn garbage_yields_none() {
        assert!(extract_embedded_json("no json here").is_none());
        assert!(extract_embedded_json("{truncated").is_none());
    }
}

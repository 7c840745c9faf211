//! Companion agent client
//!
//! The listing form cannot take image uploads through DOM automation, so a
//! locally running helper receives the image URLs and performs the upload
//! out of band. The companion is optional: any failure here is logged and
//! the item stays Listed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Serialize)]
struct ImageUploadRequest<'a> {
    #[serde(rename = "imageUrls")]
    image_urls: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ImageUploadResponse {
    ok: bool,
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    error: Option<String>,
}

pub struct CompanionClient {
    http: reqwest::Client,
    base_url: String,
}

impl CompanionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { http, base_url: base_url.into() }
    }

    /// Hands the item's image URLs to the companion. Never fails the item:
    /// the return value only says whether the upload was confirmed.
    pub async fn upload_images(&self, product_id: &str, image_urls: &[String]) -> bool {
        if image_urls.is_empty() {
            return true;
        }
        let url = format!("{}/create-listing/images", self.base_url.trim_end_matches('/'));
        let request = ImageUploadRequest { image_urls };

        let response = match self.http.post(&url).json(&request).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(%product_id, "companion agent unreachable: {e}");
                return false;
            }
        };

        match response.json::<ImageUploadResponse>().await {
            Ok(body) if body.ok => {
                info!(
                    %product_id,
                    uploaded = body.count.unwrap_or(image_urls.len()),
                    "companion uploaded images"
                );
                true
            }
            Ok(body) => {
                warn!(
                    %product_id,
                    "companion rejected images: {}",
                    body.error.unwrap_or_else(|| "no reason given".into())
                );
                false
            }
            Err(e) => {
                warn!(%product_id, "companion sent malformed response: {e}");
                false
            }
        }
    }
}

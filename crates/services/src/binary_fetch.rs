use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::capability::BinaryBlob;
use shared::error::AssistantError;
use std::time::Duration;

use crate::browser::{BinaryFetch, FetchedBinary};

/// Binary fetch over HTTP.
pub struct HttpBinaryFetch {
    http: Client,
}

impl HttpBinaryFetch {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; ClarifAI/1.0)")
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl BinaryFetch for HttpBinaryFetch {
    async fn fetch(&self, url: &str) -> Result<FetchedBinary> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {}", response.status()));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let data = response.bytes().await?.to_vec();
        Ok(FetchedBinary { data, content_type })
    }
}

/// Accept a fetched binary only if it declares an image type.
pub fn validate_image(url: &str, fetched: FetchedBinary) -> Result<BinaryBlob, AssistantError> {
    let mime_type = fetched
        .content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !mime_type.starts_with("image/") {
        return Err(AssistantError::MalformedResponse {
            reason: format!(
                "URL does not point to an image. Content-Type: {}",
                fetched.content_type
            ),
        });
    }
    if fetched.data.is_empty() {
        return Err(AssistantError::MalformedResponse {
            reason: format!("image at {} is empty", url),
        });
    }
    Ok(BinaryBlob {
        name: file_name(url),
        mime_type,
        data: fetched.data,
    })
}

/// Last path segment of a URL, or `"image"`.
pub fn file_name(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string())
}

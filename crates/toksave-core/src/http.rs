use std::time::Duration;

use anyhow::Context;
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, REFERER, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::fetcher::{FetchError, MediaContent, VideoClient, VideoDescriptor};
use crate::record::VideoId;

pub const DEFAULT_API_BASE: &str = "https://www.tiktok.com";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

fn default_timeout_secs() -> u64 {
    30
}

/// Settings for [`HttpVideoClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    pub api_base: String,
    /// Random per run when not set.
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            device_id: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Blocking client for the platform's web API.
pub struct HttpVideoClient {
    client: Client,
    api_base: String,
    device_id: String,
}

impl HttpVideoClient {
    pub fn new(config: &HttpClientConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build http client")?;

        let device_id = config
            .device_id
            .clone()
            .unwrap_or_else(|| rand::thread_rng().gen_range(10_000..1_000_000_000u64).to_string());

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            device_id,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_connect() || err.is_timeout() {
        FetchError::TransientNetwork(err.to_string())
    } else {
        FetchError::Other(err.to_string())
    }
}

fn str_at<'a>(value: &'a serde_json::Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(|v| v.as_str())
}

/// Build a descriptor from an item detail response.
fn descriptor_from_detail(id: &VideoId, body: serde_json::Value) -> Result<VideoDescriptor, FetchError> {
    let status_code = body
        .get("statusCode")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    if status_code != 0 {
        return Err(FetchError::NotFound(id.clone()));
    }

    let item = body
        .pointer("/itemInfo/itemStruct")
        .filter(|v| v.is_object())
        .ok_or_else(|| FetchError::NotFound(id.clone()))?;

    let media_url = str_at(item, "/video/playAddr")
        .or_else(|| str_at(item, "/video/downloadAddr"))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| FetchError::NotFound(id.clone()))?
        .to_string();

    let author = str_at(item, "/author/uniqueId")
        .or_else(|| str_at(item, "/author"))
        .unwrap_or_default()
        .to_string();
    let caption = str_at(item, "/desc").unwrap_or_default().to_string();
    let mime_type = str_at(item, "/video/format").map(|format| format!("video/{}", format));

    Ok(VideoDescriptor {
        id: id.clone(),
        author,
        caption,
        media_url,
        mime_type,
        raw: item.clone(),
    })
}

impl VideoClient for HttpVideoClient {
    fn resolve(&self, id: &VideoId) -> Result<VideoDescriptor, FetchError> {
        let url = format!("{}/api/item/detail/", self.api_base);
        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, DEFAULT_USER_AGENT)
            .query(&[("itemId", id.as_str()), ("device_id", self.device_id.as_str())])
            .send()
            .map_err(classify)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(FetchError::NotFound(id.clone()));
        }
        if !status.is_success() {
            return Err(FetchError::Other(format!("GET {} returned {}", url, status)));
        }

        let body: serde_json::Value = response.json().map_err(classify)?;
        descriptor_from_detail(id, body)
    }

    fn download(&self, descriptor: &VideoDescriptor) -> Result<MediaContent, FetchError> {
        let response = self
            .client
            .get(&descriptor.media_url)
            .header(USER_AGENT, DEFAULT_USER_AGENT)
            .header(REFERER, format!("{}/", self.api_base))
            .send()
            .map_err(classify)?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::GONE
        ) {
            return Err(FetchError::NotFound(descriptor.id.clone()));
        }
        if !status.is_success() {
            return Err(FetchError::Other(format!(
                "GET {} returned {}",
                descriptor.media_url, status
            )));
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("video/"))
            .or_else(|| descriptor.mime_type.clone());

        let bytes = response.bytes().map_err(classify)?.to_vec();
        Ok(MediaContent { bytes, mime_type })
    }
}

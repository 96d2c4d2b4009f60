use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Date format used by the activity export ("2021-03-14 09:26:53").
pub const EXPORT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Seconds since the Unix epoch.
pub type Timestamp = i64;

/// One liked or bookmarked entry from the activity export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    #[serde(rename = "Link", default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(rename = "VideoLink", default, skip_serializing_if = "Option::is_none")]
    pub video_link: Option<String>,
    #[serde(rename = "Date", default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Canonical numeric video identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Accepts only non-empty ASCII digit strings.
    pub fn new(raw: &str) -> Option<Self> {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    #[error("malformed date {0:?}")]
    MalformedDate(String),
}

impl ExportRecord {
    pub fn new(link: &str, date: &str) -> Self {
        Self {
            link: Some(link.to_string()),
            video_link: None,
            date: Some(date.to_string()),
        }
    }

    /// `Link` wins over `VideoLink` when both are present.
    pub fn link(&self) -> Option<&str> {
        self.link.as_deref().or(self.video_link.as_deref())
    }

    pub fn video_id(&self) -> Result<VideoId, RecordError> {
        let link = self
            .link()
            .ok_or_else(|| RecordError::MalformedRecord("no Link or VideoLink field".to_string()))?;
        video_id_from_link(link)
    }

    pub fn timestamp(&self) -> Result<Timestamp, RecordError> {
        let date = self
            .date
            .as_deref()
            .ok_or_else(|| RecordError::MalformedDate(String::new()))?;
        timestamp_from_date(date)
    }

    pub fn parse(&self) -> Result<(VideoId, Timestamp), RecordError> {
        Ok((self.video_id()?, self.timestamp()?))
    }
}

/// Extract the id from a share link: the last all-digit path segment.
///
/// Scheme, host, query and fragment do not affect the result, and links
/// without a scheme are accepted.
pub fn video_id_from_link(link: &str) -> Result<VideoId, RecordError> {
    let trimmed = link.trim();
    let parsed = url::Url::parse(trimmed)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| url::Url::parse(&format!("https://{}", trimmed)).ok())
        .ok_or_else(|| RecordError::MalformedRecord(format!("unparseable link {:?}", link)))?;

    parsed
        .path_segments()
        .and_then(|segments| segments.filter_map(VideoId::new).last())
        .ok_or_else(|| RecordError::MalformedRecord(format!("no video id in link {:?}", link)))
}

/// Parse an export date (UTC) into epoch seconds.
pub fn timestamp_from_date(date: &str) -> Result<Timestamp, RecordError> {
    NaiveDateTime::parse_from_str(date.trim(), EXPORT_DATE_FORMAT)
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| RecordError::MalformedDate(date.to_string()))
}

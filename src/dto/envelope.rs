use super::response::ResponseContent;
use crate::error::{MtsError, MtsResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outbound wrapper. `content` is the request already serialized to JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub operator_id: i64,
    pub operation: String,
    pub content: String,
    pub correlation_id: String,
}

/// Inbound wrapper with `content` still undecoded.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawResponseEnvelope {
    #[serde(default)]
    pub timestamp_utc: Option<i64>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    #[serde(default)]
    pub additional_info: Option<HashMap<String, serde_json::Value>>,
}

impl RawResponseEnvelope {
    pub fn parse(text: &str) -> MtsResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Correlation id, if present and non-empty.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Decode `content` through the response type table.
    pub fn decode(self) -> MtsResult<ResponseEnvelope> {
        let content = self
            .content
            .ok_or_else(|| MtsError::InvalidResponse("response has no content".to_string()))?;
        Ok(ResponseEnvelope {
            timestamp_utc: self.timestamp_utc,
            operation: self.operation,
            version: self.version,
            correlation_id: self.correlation_id,
            content: ResponseContent::decode(content)?,
            additional_info: self.additional_info.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub timestamp_utc: Option<i64>,
    pub operation: Option<String>,
    pub version: Option<String>,
    pub correlation_id: Option<String>,
    pub content: ResponseContent,
    pub additional_info: HashMap<String, serde_json::Value>,
}

impl ResponseEnvelope {
    /// `timestampUtc` as a UTC time; the wire value is epoch milliseconds.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp_utc.and_then(DateTime::from_timestamp_millis)
    }
}

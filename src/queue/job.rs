//! Job wire format.

use marquee_common::{LibraryId, MediaId, MediaType, ScanJobId};
use serde::{Deserialize, Serialize};

/// One metadata enrichment request for a single media record.
///
/// Producers push these as JSON. Fields this version does not know about are
/// kept in `extra` so a retry re-serialisation does not strip them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub media_id: MediaId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub library_id: LibraryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub media_type: MediaType,
    /// Force a fresh fetch even when the record already looks complete.
    #[serde(default)]
    pub rescan: bool,
    #[serde(default)]
    pub retry_count: u32,
    /// Parent scan job; when absent the library's latest scan job is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_job_id: Option<ScanJobId>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Job {
    pub fn new(
        media_id: MediaId,
        library_id: LibraryId,
        title: impl Into<String>,
        media_type: MediaType,
    ) -> Self {
        Self {
            media_id,
            title: title.into(),
            year: None,
            library_id,
            folder_path: None,
            filename: None,
            media_type,
            rescan: false,
            retry_count: 0,
            scan_job_id: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn from_payload(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Copy of this job with the retry counter advanced by one.
    pub fn next_attempt(&self) -> Self {
        let mut next = self.clone();
        next.retry_count = next.retry_count.saturating_add(1);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEDIA: &str = "6f1c1b2e-8a44-4f5c-9d57-3c1e7a9b0d11";
    const LIBRARY: &str = "0b7e2f3a-1c5d-4e6f-8a9b-c0d1e2f3a4b5";

    #[test]
    fn test_minimal_payload_defaults() {
        let payload = format!(
            r#"{{"media_id":"{MEDIA}","title":"Heat","library_id":"{LIBRARY}","media_type":"movies"}}"#
        );
        let job = Job::from_payload(&payload).unwrap();

        assert_eq!(job.media_id.to_string(), MEDIA);
        assert_eq!(job.media_type, MediaType::Movie);
        assert_eq!(job.retry_count, 0);
        assert!(!job.rescan);
        assert!(job.year.is_none());
        assert!(job.scan_job_id.is_none());
        assert!(job.extra.is_empty());
    }

    #[test]
    fn test_unknown_fields_survive_retry() {
        let payload = format!(
            r#"{{"media_id":"{MEDIA}","title":"Heat","year":1995,"library_id":"{LIBRARY}",
                "media_type":"movie","retry_count":2,"priority":"high","source":{{"kind":"scan"}}}}"#
        );
        let job = Job::from_payload(&payload).unwrap();
        let retried = job.next_attempt();
        assert_eq!(retried.retry_count, 3);

        let value: serde_json::Value =
            serde_json::from_str(&retried.to_payload().unwrap()).unwrap();
        assert_eq!(value["priority"], "high");
        assert_eq!(value["source"]["kind"], "scan");
        assert_eq!(value["retry_count"], 3);
        assert_eq!(value["year"], 1995);
    }

    #[test]
    fn test_malformed_payload() {
        assert!(Job::from_payload("not json").is_err());
        assert!(Job::from_payload(r#"{"title":"missing ids"}"#).is_err());
    }
}

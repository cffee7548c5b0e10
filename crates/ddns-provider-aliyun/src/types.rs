//! Alidns request encoding and response types

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// RFC 3986 percent-encoding, as required by the canonical query string
pub fn url_encode(s: &str) -> String {
    let mut encoded = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => {
                let _ = write!(encoded, "%{byte:02X}");
            }
        }
    }
    encoded
}

/// Sorted, encoded `k=v&k=v` query string
pub fn canonical_query(params: &[(&str, &str)]) -> String {
    let sorted: BTreeMap<String, String> = params
        .iter()
        .map(|(k, v)| (url_encode(k), url_encode(v)))
        .collect();
    sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Error body returned with a `Code` field
#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "RequestId", default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DescribeDomainRecordsResponse {
    #[serde(rename = "DomainRecords")]
    pub domain_records: Option<DomainRecordsWrapper>,
    #[serde(rename = "TotalCount")]
    pub total_count: Option<u32>,
}

impl DescribeDomainRecordsResponse {
    /// The A record whose RR matches exactly
    ///
    /// `RRKeyWord` is a fuzzy filter, so `home` also returns `home2`.
    pub fn exact(self, rr: &str) -> Option<AliyunRecord> {
        self.domain_records?
            .record?
            .into_iter()
            .find(|r| r.rr == rr && r.record_type == "A")
    }
}

#[derive(Debug, Deserialize)]
pub struct DomainRecordsWrapper {
    #[serde(rename = "Record")]
    pub record: Option<Vec<AliyunRecord>>,
}

#[derive(Debug, Deserialize)]
pub struct AliyunRecord {
    #[serde(rename = "RecordId")]
    pub record_id: String,
    #[serde(rename = "RR")]
    pub rr: String,
    #[serde(rename = "Type")]
    pub record_type: String,
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "TTL", default)]
    pub ttl: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AddDomainRecordResponse {
    #[serde(rename = "RecordId")]
    pub record_id: String,
}

/// Body of update and delete calls; only the request id is returned
#[derive(Debug, Deserialize)]
pub struct AckResponse {
    #[serde(rename = "RequestId", default)]
    pub request_id: Option<String>,
}

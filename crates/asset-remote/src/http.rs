//! HTTP object-store adapter
//!
//! Assets are spread across containers named after the first hex characters
//! of their id. Each asset is one object holding the encoded record, with
//! the metadata mirrored into `X-Object-Meta-*` headers so that a HEAD
//! request can answer metadata lookups.

use crate::error::{RemoteError, Result};
use crate::store::RemoteStore;
use asset_record::{AssetFlags, AssetId, AssetMetadata, AssetRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

const CONTAINER_ID_PREFIX_LEN: usize = 4;
const SLOW_OPERATION: Duration = Duration::from_secs(5);

const META_TYPE: &str = "x-object-meta-type";
const META_LOCAL: &str = "x-object-meta-local";
const META_TEMP: &str = "x-object-meta-temp";
const META_NAME: &str = "x-object-meta-name";
const META_DESCRIPTION: &str = "x-object-meta-description";
const META_CREATED: &str = "x-object-meta-created";
const META_SIZE: &str = "x-object-meta-size";
const META_SHA256: &str = "x-object-meta-sha256";

/// Configuration for the HTTP object store
#[derive(Debug, Clone)]
pub struct HttpRemoteConfig {
    pub base_url: Url,
    pub container_prefix: String,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Send stores without `If-None-Match: *`
    pub allow_overwrite: bool,
}

impl HttpRemoteConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            container_prefix: "assets_".to_string(),
            read_timeout: Duration::from_secs(45),
            write_timeout: Duration::from_secs(10),
            allow_overwrite: false,
        }
    }
}

/// [`RemoteStore`] backed by an HTTP object store
pub struct HttpRemoteStore {
    client: Client,
    config: HttpRemoteConfig,
}

impl HttpRemoteStore {
    pub fn new(config: HttpRemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("asset-remote/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    /// Container for an asset: prefix plus the leading hex chars, uppercased
    pub fn container_name(&self, id: AssetId) -> String {
        let simple = id.simple();
        format!(
            "{}{}",
            self.config.container_prefix,
            simple[..CONTAINER_ID_PREFIX_LEN].to_ascii_uppercase()
        )
    }

    pub fn object_name(id: AssetId) -> String {
        format!("{}.asset", id.simple())
    }

    pub fn object_url(&self, id: AssetId) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.as_str().trim_end_matches('/'),
            self.container_name(id),
            Self::object_name(id)
        )
    }

    fn storage_headers(&self, record: &AssetRecord, body: &[u8]) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let mut put = |name: &'static str, value: String| -> Result<()> {
            let value = HeaderValue::from_str(&value)
                .map_err(|e| RemoteError::Rejected(format!("invalid header {}: {}", name, e)))?;
            headers.insert(name, value);
            Ok(())
        };

        put(META_TYPE, record.asset_type.to_string())?;
        put(META_LOCAL, flag(record.flags.local))?;
        put(META_TEMP, flag(record.flags.temporary))?;
        put(META_NAME, encode_header_text(&record.name))?;
        put(META_DESCRIPTION, encode_header_text(&record.description))?;
        put(META_CREATED, record.create_time.to_rfc3339())?;
        put(META_SIZE, record.data.len().to_string())?;
        put(META_SHA256, sha256_hex(body))?;

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        if !self.config.allow_overwrite {
            headers.insert("if-none-match", HeaderValue::from_static("*"));
        }

        Ok(headers)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn store(&self, record: &AssetRecord) -> Result<()> {
        let body = asset_record::encode(record)?;
        let headers = self.storage_headers(record, &body)?;
        let url = self.object_url(record.id);

        let started = Instant::now();
        let response = self
            .client
            .put(&url)
            .headers(headers)
            .timeout(self.config.write_timeout)
            .body(body)
            .send()
            .await?;
        warn_if_slow("store", record.id, started);

        let status = response.status();
        if status.is_success() {
            debug!(id = %record.id, url = %url, "Stored asset object");
            return Ok(());
        }
        Err(classify_status(record.id, status))
    }

    async fn fetch(&self, id: AssetId) -> Result<Option<AssetRecord>> {
        let started = Instant::now();
        let response = self
            .client
            .get(self.object_url(id))
            .timeout(self.config.read_timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_status(id, status));
        }

        let expected = response
            .headers()
            .get(META_SHA256)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        warn_if_slow("fetch", id, started);

        if let Some(expected) = expected {
            let actual = sha256_hex(&body);
            if !actual.eq_ignore_ascii_case(&expected) {
                return Err(RemoteError::Rejected(format!(
                    "checksum mismatch for asset {}: expected {}, got {}",
                    id, expected, actual
                )));
            }
        }

        let record = asset_record::decode(&body)?;
        if record.id != id {
            return Err(RemoteError::Rejected(format!(
                "object for asset {} holds asset {}",
                id, record.id
            )));
        }
        Ok(Some(record))
    }

    async fn fetch_metadata(&self, id: AssetId) -> Result<Option<AssetMetadata>> {
        let response = self
            .client
            .head(self.object_url(id))
            .timeout(self.config.read_timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_status(id, status));
        }

        metadata_from_headers(id, response.headers()).map(Some)
    }

    async fn delete(&self, id: AssetId) -> Result<bool> {
        let started = Instant::now();
        let response = self
            .client
            .delete(self.object_url(id))
            .timeout(self.config.write_timeout)
            .send()
            .await?;
        warn_if_slow("delete", id, started);

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(classify_status(id, status));
        }
        Ok(true)
    }
}

/// Map a non-success status to a remote error
fn classify_status(id: AssetId, status: StatusCode) -> RemoteError {
    if status == StatusCode::PRECONDITION_FAILED {
        RemoteError::AlreadyExists(id)
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        RemoteError::Timeout
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RemoteError::Connection(format!("object store returned status {}", status))
    } else {
        RemoteError::Rejected(format!("object store returned status {}", status))
    }
}

fn metadata_from_headers(id: AssetId, headers: &HeaderMap) -> Result<AssetMetadata> {
    let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let asset_type = get(META_TYPE)
        .and_then(|v| v.parse::<i8>().ok())
        .ok_or_else(|| RemoteError::Rejected(format!("asset {} has no type header", id)))?;
    let size = get(META_SIZE)
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| RemoteError::Rejected(format!("asset {} has no size header", id)))?;
    let create_time = get(META_CREATED)
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default();

    Ok(AssetMetadata {
        id,
        asset_type,
        flags: AssetFlags {
            local: get(META_LOCAL) == Some("1"),
            temporary: get(META_TEMP) == Some("1"),
        },
        create_time,
        name: get(META_NAME).map(decode_header_text).unwrap_or_default(),
        description: get(META_DESCRIPTION)
            .map(decode_header_text)
            .unwrap_or_default(),
        size,
    })
}

/// Strip control characters and percent-encode so any name fits in a header
fn encode_header_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| *c == '\t' || !c.is_control())
        .collect();
    urlencoding::encode(&cleaned).into_owned()
}

fn decode_header_text(value: &str) -> String {
    urlencoding::decode(value)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

fn flag(value: bool) -> String {
    let flag = if value { "1" } else { "0" };
    flag.to_string()
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn warn_if_slow(operation: &str, id: AssetId, started: Instant) {
    let elapsed = started.elapsed();
    if elapsed >= SLOW_OPERATION {
        warn!(operation, id = %id, elapsed_ms = elapsed.as_millis() as u64, "Slow object store operation");
    }
}

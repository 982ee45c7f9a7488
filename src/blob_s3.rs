//! S3-compatible [`BlobStore`] (AWS S3, Cloudflare R2, MinIO).
//!
//! Objects are read and written with single signed `GET`/`PUT` requests
//! using AWS Signature Version 4, computed with `hmac` + `sha2`.
//!
//! # Addressing
//!
//! | `endpoint_url` | URL |
//! |----------------|-----|
//! | unset | `https://<bucket>.s3.<region>.amazonaws.com/<key>` |
//! | set | `<endpoint_url>/<bucket>/<key>` (path-style) |
//!
//! R2 expects `region = "auto"`.
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID` (required)
//! - `AWS_SECRET_ACCESS_KEY` (required)
//! - `AWS_SESSION_TOKEN` (optional)

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

use repo_index_core::store::BlobStore;

use crate::config::StorageConfig;

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

pub struct S3BlobStore {
    client: reqwest::Client,
    bucket: String,
    region: String,
    /// `(scheme, host)` of a custom endpoint.
    endpoint: Option<(String, String)>,
    creds: AwsCredentials,
}

impl S3BlobStore {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let bucket = config
            .bucket
            .clone()
            .context("storage.bucket required for the s3 backend")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::new(
            client,
            bucket,
            config.region.clone(),
            config.endpoint_url.as_deref(),
            AwsCredentials::from_env()?,
        ))
    }

    pub fn new(
        client: reqwest::Client,
        bucket: String,
        region: String,
        endpoint_url: Option<&str>,
        creds: AwsCredentials,
    ) -> Self {
        let endpoint = endpoint_url.map(split_endpoint);
        Self {
            client,
            bucket,
            region,
            endpoint,
            creds,
        }
    }

    /// Host header and canonical URI for `key`.
    fn locate(&self, key: &str) -> (String, String) {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        match &self.endpoint {
            Some((_, host)) => (host.clone(), format!("/{}/{}", self.bucket, encoded_key)),
            None => (
                format!("{}.s3.{}.amazonaws.com", self.bucket, self.region),
                format!("/{}", encoded_key),
            ),
        }
    }

    fn url(&self, host: &str, canonical_uri: &str) -> String {
        let scheme = self
            .endpoint
            .as_ref()
            .map(|(scheme, _)| scheme.as_str())
            .unwrap_or("https");
        format!("{}://{}{}", scheme, host, canonical_uri)
    }

    fn signed_request(
        &self,
        method: reqwest::Method,
        key: &str,
        body: Option<(&[u8], &str)>,
    ) -> reqwest::RequestBuilder {
        let (host, canonical_uri) = self.locate(key);
        let payload_hash = hex_sha256(body.map(|(b, _)| b).unwrap_or(b""));
        let content_type = body.map(|(_, ct)| ct);

        let headers = sign_request(
            &SigningInput {
                method: method.as_str(),
                host: &host,
                canonical_uri: &canonical_uri,
                payload_hash: &payload_hash,
                content_type,
                region: &self.region,
            },
            &self.creds,
            Utc::now(),
        );

        let mut req = self.client.request(method, self.url(&host, &canonical_uri));
        for (name, value) in headers {
            req = req.header(name, value);
        }
        if let Some((bytes, _)) = body {
            req = req.body(bytes.to_vec());
        }
        req
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let resp = self
            .signed_request(reqwest::Method::GET, key, None)
            .send()
            .await
            .with_context(|| format!("Failed to get s3://{}/{}", self.bucket, key))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(bucket = %self.bucket, key, "object not found");
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("S3 GetObject failed (HTTP {}) for key '{}': {}", status, key, body);
        }
        Ok(Some(resp.bytes().await?.to_vec()))
    }

    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let resp = self
            .signed_request(reqwest::Method::PUT, key, Some((bytes, content_type)))
            .send()
            .await
            .with_context(|| format!("Failed to put s3://{}/{}", self.bucket, key))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("S3 PutObject failed (HTTP {}) for key '{}': {}", status, key, body);
        }
        debug!(bucket = %self.bucket, key, bytes = bytes.len(), "object written");
        Ok(())
    }
}

// ============ AWS SigV4 ============

struct SigningInput<'a> {
    method: &'a str,
    host: &'a str,
    canonical_uri: &'a str,
    payload_hash: &'a str,
    content_type: Option<&'a str>,
    region: &'a str,
}

/// Compute the headers for a SigV4-signed request, `Authorization` included.
fn sign_request(
    input: &SigningInput<'_>,
    creds: &AwsCredentials,
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    let mut headers = vec![
        ("host".to_string(), input.host.to_string()),
        (
            "x-amz-content-sha256".to_string(),
            input.payload_hash.to_string(),
        ),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ct) = input.content_type {
        headers.push(("content-type".to_string(), ct.to_string()));
    }
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        input.method, input.canonical_uri, canonical_headers, signed_headers, input.payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, input.region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, input.region, "s3");
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key_id, credential_scope, signed_headers, signature
    );

    // reqwest sets Host from the URL
    headers.retain(|(k, _)| k != "host");
    headers.push(("authorization".to_string(), authorization));
    headers
}

fn split_endpoint(endpoint: &str) -> (String, String) {
    let (scheme, rest) = match endpoint.split_once("://") {
        Some((scheme, rest)) => (scheme.to_string(), rest),
        None => ("https".to_string(), endpoint),
    };
    (scheme, rest.trim_end_matches('/').to_string())
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding of one path segment (unreserved: `A-Z a-z 0-9 - _ . ~`).
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

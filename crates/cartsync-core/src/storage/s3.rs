//! S3-compatible object storage (MinIO, R2, AWS)

use std::env;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream, Client};
use aws_types::region::Region;

use crate::error::{Error, Result};
use crate::storage::BlobStore;

const ENV_ENDPOINT: &str = "S3_ENDPOINT";
const ENV_BUCKET: &str = "S3_BUCKET";
const ENV_ACCESS_KEY_ID: &str = "S3_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "S3_SECRET_ACCESS_KEY";
const ENV_REGION: &str = "AWS_REGION";

/// S3-compatible storage configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Config {
    /// Endpoint URL, e.g. `http://localhost:9000` for MinIO
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Region; S3-compatible stores usually accept any value
    pub region: String,
    /// Access key id
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

impl S3Config {
    /// Load S3 configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no S3 variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }
}

/// S3-backed blob store.
#[derive(Clone, Debug)]
pub struct S3BlobStore {
    config: S3Config,
}

impl S3BlobStore {
    #[must_use]
    pub const fn new(config: S3Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &S3Config {
        &self.config
    }

    /// Check that the configured bucket is reachable with current credentials.
    pub async fn bucket_is_reachable(&self) -> Result<()> {
        let client = self.client();
        client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|error| storage_error("head_bucket", &self.config.bucket, None, error))?;
        Ok(())
    }

    fn client(&self) -> Client {
        let credentials = Credentials::new(
            self.config.access_key_id.clone(),
            self.config.secret_access_key.clone(),
            None,
            None,
            "cartsync-s3-storage",
        );

        let sdk_config = aws_sdk_s3::config::Builder::new()
            .region(Region::new(self.config.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(&self.config.endpoint)
            .force_path_style(true)
            .build();

        Client::from_conf(sdk_config)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let key = normalize_object_key(key)?;
        let client = self.client();

        client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .content_type("application/octet-stream")
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|error| storage_error("put_object", &self.config.bucket, Some(&key), error))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let key = normalize_object_key(key)?;
        let client = self.client();

        let response = client
            .get_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|error| storage_error("get_object", &self.config.bucket, Some(&key), error))?;

        let payload = response.body.collect().await.map_err(|error| {
            storage_error("get_object_body", &self.config.bucket, Some(&key), error)
        })?;

        Ok(payload.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = normalize_object_key(key)?;
        let client = self.client();

        client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|error| {
                storage_error("delete_object", &self.config.bucket, Some(&key), error)
            })?;

        Ok(())
    }

    async fn head_exists(&self, key: &str) -> Result<bool> {
        let key = normalize_object_key(key)?;
        let client = self.client();

        match client
            .head_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(error) => {
                let service_error = error.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(storage_error(
                        "head_object",
                        &self.config.bucket,
                        Some(&key),
                        service_error,
                    ))
                }
            }
        }
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<S3Config>> {
    let endpoint = lookup(ENV_ENDPOINT).map(|value| value.trim().to_string());
    let bucket = lookup(ENV_BUCKET).map(|value| value.trim().to_string());
    let access_key_id = lookup(ENV_ACCESS_KEY_ID).map(|value| value.trim().to_string());
    let secret_access_key = lookup(ENV_SECRET_ACCESS_KEY).map(|value| value.trim().to_string());
    let region = lookup(ENV_REGION)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "us-east-1".to_string());

    let any_present = endpoint.is_some()
        || bucket.is_some()
        || access_key_id.is_some()
        || secret_access_key.is_some();

    if !any_present {
        return Ok(None);
    }

    let mut missing = Vec::new();
    if endpoint.as_ref().map_or(true, String::is_empty) {
        missing.push(ENV_ENDPOINT);
    }
    if bucket.as_ref().map_or(true, String::is_empty) {
        missing.push(ENV_BUCKET);
    }
    if access_key_id.as_ref().map_or(true, String::is_empty) {
        missing.push(ENV_ACCESS_KEY_ID);
    }
    if secret_access_key.as_ref().map_or(true, String::is_empty) {
        missing.push(ENV_SECRET_ACCESS_KEY);
    }

    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "S3 configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    }

    let endpoint = endpoint.expect("validated above");
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return Err(Error::InvalidInput(
            "S3_ENDPOINT must start with http:// or https://".to_string(),
        ));
    }

    Ok(Some(S3Config {
        endpoint,
        bucket: bucket.expect("validated above"),
        region,
        access_key_id: access_key_id.expect("validated above"),
        secret_access_key: secret_access_key.expect("validated above"),
    }))
}

fn storage_error(
    operation: &str,
    bucket: &str,
    object_key: Option<&str>,
    error: impl std::fmt::Display,
) -> Error {
    let target = object_key.map_or_else(|| bucket.to_string(), |key| format!("{bucket}/{key}"));
    Error::Storage(format!("S3 {operation} failed for {target}: {error}"))
}

fn normalize_object_key(object_key: &str) -> Result<String> {
    let object_key = object_key.trim().trim_matches('/').to_string();
    if object_key.is_empty() {
        return Err(Error::InvalidInput(
            "Storage object_key cannot be empty".to_string(),
        ));
    }
    Ok(object_key)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn parse_from_map(map: &HashMap<&str, &str>) -> Result<Option<S3Config>> {
        parse_config(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn parse_config_none_returns_none() {
        let map = HashMap::new();
        assert!(parse_from_map(&map).unwrap().is_none());
    }

    #[test]
    fn parse_config_requires_all_required_values() {
        let mut map = HashMap::new();
        map.insert(ENV_ENDPOINT, "http://localhost:9000");
        map.insert(ENV_BUCKET, "cartsync-saves");

        let err = parse_from_map(&map).unwrap_err();
        match err {
            Error::InvalidInput(message) => {
                assert!(message.contains(ENV_ACCESS_KEY_ID));
                assert!(message.contains(ENV_SECRET_ACCESS_KEY));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_config_accepts_valid_values_and_defaults_region() {
        let mut map = HashMap::new();
        map.insert(ENV_ENDPOINT, "http://localhost:9000");
        map.insert(ENV_BUCKET, "cartsync-saves");
        map.insert(ENV_ACCESS_KEY_ID, "minioadmin");
        map.insert(ENV_SECRET_ACCESS_KEY, "minioadmin");

        let config = parse_from_map(&map).unwrap().unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.bucket, "cartsync-saves");
    }

    #[test]
    fn parse_config_rejects_bare_host_endpoint() {
        let mut map = HashMap::new();
        map.insert(ENV_ENDPOINT, "localhost:9000");
        map.insert(ENV_BUCKET, "cartsync-saves");
        map.insert(ENV_ACCESS_KEY_ID, "minioadmin");
        map.insert(ENV_SECRET_ACCESS_KEY, "minioadmin");

        let err = parse_from_map(&map).unwrap_err();
        match err {
            Error::InvalidInput(message) => assert!(message.contains("S3_ENDPOINT")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn config_redacts_secret_in_debug() {
        let config = S3Config {
            endpoint: "http://localhost:9000".to_string(),
            bucket: "cartsync-saves".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "sensitive-secret".to_string(),
        };
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("sensitive-secret"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn normalize_object_key_rejects_empty() {
        assert!(normalize_object_key("   ").is_err());
        assert_eq!(normalize_object_key("/a/b/").unwrap(), "a/b");
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "Requires local S3 env vars plus network access"]
    async fn s3_object_roundtrip_put_get_delete() {
        let _ = dotenvy::dotenv();

        let config = S3Config::from_env()
            .expect("S3 env parsing should not error")
            .expect("S3 config should be present");
        let store = S3BlobStore::new(config);

        store.bucket_is_reachable().await.unwrap();

        let key = "integration/cartsync-roundtrip";
        let bytes = b"s3-roundtrip-test";

        store.put(key, bytes).await.unwrap();
        assert!(store.head_exists(key).await.unwrap());
        assert_eq!(store.get(key).await.unwrap(), bytes);

        store.delete(key).await.unwrap();
        assert!(!store.head_exists(key).await.unwrap());
    }
}

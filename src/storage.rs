//! # Storage Abstraction Module
//!
//! This module provides a unified interface for listing, reading and writing files on different
//! storage backends, including local filesystem and Amazon S3. The backend is chosen from the
//! path pattern and configured explicitly through [`StorageConfig`]; nothing is read from or
//! written to process-wide state beyond the AWS SDK's own credential chain.
//!
//! ## Path Patterns
//!
//! - **S3 paths**: `s3://bucket-name/path/to/file.nc`
//! - **Local paths**: `/absolute/path/to/file.nc` or `relative/path/to/file.nc`
//!
//! ## Listing
//!
//! Listing locations name a directory plus an optional name prefix:
//!
//! - `s3://bucket/prods` lists keys of `bucket` starting with `prods`
//! - `../data/mogreps-uk/` lists every file in that directory
//! - `../data/mogreps-uk/prods_op` lists files in it whose names start with `prods_op`
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use mogreps_pair::storage::{StorageBackend, StorageConfig, StorageFactory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StorageConfig::default();
//!     let storage = StorageFactory::from_path("s3://mogreps-uk/prods", &config).await?;
//!
//!     // First hundred keys under the prefix
//!     let keys = storage.list("s3://mogreps-uk/prods", 100).await?;
//!     let data = storage.read(&format!("s3://mogreps-uk/{}", keys[0])).await?;
//!     println!("{} bytes", data.len());
//!
//!     Ok(())
//! }
//! ```

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::{
    get_object::GetObjectError, head_object::HeadObjectError, list_objects_v2::ListObjectsV2Error,
    put_object::PutObjectError,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Region hosting the Mogreps buckets.
pub const DEFAULT_REGION: &str = "eu-west-2";

/// Regional endpoint of the Mogreps buckets.
pub const DEFAULT_ENDPOINT: &str = "https://s3.eu-west-2.amazonaws.com";

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("AWS S3 GetObject error: {0}")]
    S3GetObject(#[from] SdkError<GetObjectError>),

    #[error("AWS S3 PutObject error: {0}")]
    S3PutObject(#[from] SdkError<PutObjectError>),

    #[error("AWS S3 HeadObject error: {0}")]
    S3HeadObject(#[from] SdkError<HeadObjectError>),

    #[error("AWS S3 ListObjectsV2 error: {0}")]
    S3ListObjects(#[from] SdkError<ListObjectsV2Error>),

    #[error("AWS ByteStream error: {0}")]
    ByteStream(String),

    #[error("Invalid S3 path format: {0}")]
    InvalidS3Path(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Connection settings for the S3 backend.
///
/// Requests are signed with SigV4, which is the only signature version the AWS SDK
/// implements, unless `anonymous` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// AWS region of the buckets
    pub region: String,
    /// Custom endpoint, e.g. a regional host or an S3-compatible service
    pub endpoint_url: Option<String>,
    /// Send unsigned requests (public buckets)
    pub anonymous: bool,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`
    pub force_path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            region: DEFAULT_REGION.to_string(),
            endpoint_url: Some(DEFAULT_ENDPOINT.to_string()),
            anonymous: false,
            force_path_style: false,
        }
    }
}

/// Trait defining the interface for storage backends
///
/// All operations are async to fit the AWS SDK; callers in this crate await them one at a time.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads the entire contents of a file
    ///
    /// # Errors
    /// Returns `StorageError::PathNotFound` if the file does not exist
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Writes data to a file, creating it if it doesn't exist
    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()>;

    /// Checks if a file exists at the given path
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Lists up to `max_results` entries under a listing location
    ///
    /// S3 returns object keys in the backend's listing order. The local backend returns
    /// file names sorted alphabetically.
    async fn list(&self, location: &str, max_results: usize) -> StorageResult<Vec<String>>;
}

/// Local filesystem storage backend
#[derive(Debug, Clone)]
pub struct LocalStorage;

#[async_trait::async_trait]
impl StorageBackend for LocalStorage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::PathNotFound(path.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(StorageError::PermissionDenied(path.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        // Create parent directories if they don't exist
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent).await.map_err(StorageError::Io)?;
        }

        match fs::write(path, data).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(StorageError::PermissionDenied(path.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        match fs::metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn list(&self, location: &str, max_results: usize) -> StorageResult<Vec<String>> {
        let path = Path::new(location);
        let is_dir = location.ends_with('/')
            || fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false);

        let (dir, prefix) = if is_dir {
            (path.to_path_buf(), String::new())
        } else {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => Path::new(".").to_path_buf(),
            };
            let prefix = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            (dir, prefix)
        };

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::PathNotFound(dir.to_string_lossy().to_string()));
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) {
                names.push(name);
            }
        }
        names.sort();
        names.truncate(max_results);
        Ok(names)
    }
}

/// Amazon S3 storage backend
///
/// Implements storage operations for S3 objects using the AWS SDK.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
}

impl S3Storage {
    /// Creates a new S3Storage instance from explicit connection settings
    ///
    /// Credentials are loaded from the standard AWS chain (environment variables,
    /// credentials file, IAM roles) unless `config.anonymous` is set.
    pub async fn new(config: &StorageConfig) -> StorageResult<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));
        if let Some(url) = &config.endpoint_url {
            loader = loader.endpoint_url(url);
        }
        if config.anonymous {
            loader = loader.no_credentials();
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();
        debug!(
            "S3 client for region {} (endpoint {:?}, anonymous: {})",
            config.region, config.endpoint_url, config.anonymous
        );

        Ok(S3Storage {
            client: S3Client::from_conf(s3_config),
        })
    }

    /// Creates a new S3Storage instance with custom SDK configuration
    pub fn from_config(config: &aws_config::SdkConfig) -> Self {
        let client = S3Client::new(config);
        S3Storage { client }
    }

    /// Parses an S3 path into bucket and key components
    ///
    /// # Errors
    /// Returns `StorageError::InvalidS3Path` if the path format is invalid
    fn parse_s3_path(s3_path: &str) -> StorageResult<(String, String)> {
        let (bucket, key) = Self::parse_s3_location(s3_path)?;
        if key.is_empty() {
            return Err(StorageError::InvalidS3Path(format!(
                "Invalid S3 path format. Expected 's3://bucket/key': {}",
                s3_path
            )));
        }
        Ok((bucket, key))
    }

    /// Parses an S3 listing location into bucket and (possibly empty) prefix
    fn parse_s3_location(location: &str) -> StorageResult<(String, String)> {
        let Some(without_scheme) = location.strip_prefix("s3://") else {
            return Err(StorageError::InvalidS3Path(format!(
                "S3 path must start with 's3://': {}",
                location
            )));
        };

        let (bucket, prefix) = without_scheme.split_once('/').unwrap_or((without_scheme, ""));
        if bucket.is_empty() {
            return Err(StorageError::InvalidS3Path(format!(
                "Missing bucket name in S3 path: {}",
                location
            )));
        }

        Ok((bucket.to_string(), prefix.to_string()))
    }

    /// Lists up to `max_results` keys of `bucket` starting with `prefix`
    ///
    /// Follows continuation tokens until enough keys are collected or the listing ends.
    pub async fn list_keys(
        &self,
        bucket: &str,
        prefix: &str,
        max_results: usize,
    ) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;
        let page_size = max_results.clamp(1, 1000) as i32;

        while keys.len() < max_results {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .max_keys(page_size);

            if let Some(ref token) = continuation_token {
                request = request.continuation_token(token.clone());
            }

            let response = request.send().await?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                    if keys.len() >= max_results {
                        break;
                    }
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        debug!("Listed {} keys from s3://{}/{}", keys.len(), bucket, prefix);
        Ok(keys)
    }
}

#[async_trait::async_trait]
impl StorageBackend for S3Storage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let (bucket, key) = Self::parse_s3_path(path)?;

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err)
                    if service_err.err().is_no_such_key() =>
                {
                    StorageError::PathNotFound(path.to_string())
                }
                _ => StorageError::S3GetObject(e),
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::ByteStream(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let (bucket, key) = Self::parse_s3_path(path)?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(aws_sdk_s3::primitives::ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(StorageError::S3PutObject)?;

        Ok(())
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let (bucket, key) = Self::parse_s3_path(path)?;

        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(service_err))
                if service_err.err().is_not_found() =>
            {
                Ok(false)
            }
            Err(e) => Err(StorageError::S3HeadObject(e)),
        }
    }

    async fn list(&self, location: &str, max_results: usize) -> StorageResult<Vec<String>> {
        let (bucket, prefix) = Self::parse_s3_location(location)?;
        self.list_keys(&bucket, &prefix, max_results).await
    }
}

/// Storage backend enumeration
#[derive(Debug)]
pub enum Storage {
    Local(LocalStorage),
    S3(S3Storage),
}

#[async_trait::async_trait]
impl StorageBackend for Storage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        match self {
            Storage::Local(storage) => storage.read(path).await,
            Storage::S3(storage) => storage.read(path).await,
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        match self {
            Storage::Local(storage) => storage.write(path, data).await,
            Storage::S3(storage) => storage.write(path, data).await,
        }
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        match self {
            Storage::Local(storage) => storage.exists(path).await,
            Storage::S3(storage) => storage.exists(path).await,
        }
    }

    async fn list(&self, location: &str, max_results: usize) -> StorageResult<Vec<String>> {
        match self {
            Storage::Local(storage) => storage.list(location, max_results).await,
            Storage::S3(storage) => storage.list(location, max_results).await,
        }
    }
}

/// Factory for creating storage backends based on path patterns
///
/// - Paths starting with "s3://" use S3Storage
/// - All other paths use LocalStorage
pub struct StorageFactory;

impl StorageFactory {
    /// Creates a storage backend based on the path format
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use mogreps_pair::storage::{StorageConfig, StorageFactory};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = StorageConfig::default();
    ///     let s3_storage = StorageFactory::from_path("s3://my-bucket/file.nc", &config).await?;
    ///     let local_storage = StorageFactory::from_path("/local/path/file.nc", &config).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn from_path(path: &str, config: &StorageConfig) -> StorageResult<Storage> {
        if Self::is_s3_path(path) {
            let s3_storage = S3Storage::new(config).await?;
            Ok(Storage::S3(s3_storage))
        } else {
            Ok(Storage::Local(LocalStorage))
        }
    }

    /// Determines if a path is an S3 path
    pub fn is_s3_path(path: &str) -> bool {
        path.starts_with("s3://")
    }

    /// Determines if a path is a local path
    pub fn is_local_path(path: &str) -> bool {
        !Self::is_s3_path(path)
    }
}

/// Joins a directory (local or `s3://`) and a file name with a single `/`.
pub fn join_path(root: &str, name: &str) -> String {
    if root.is_empty() {
        name.to_string()
    } else if name.is_empty() || root.ends_with('/') {
        format!("{}{}", root, name)
    } else {
        format!("{}/{}", root, name)
    }
}

/// Name of a listed entry relative to the archive `root`.
///
/// S3 listings return full object keys, so the key prefix of an `s3://` root is stripped.
/// Local listings already return names relative to their directory.
pub fn relative_to_root<'a>(root: &str, entry: &'a str) -> &'a str {
    let Some(without_scheme) = root.strip_prefix("s3://") else {
        return entry;
    };
    match without_scheme.split_once('/') {
        Some((_, prefix)) if !prefix.is_empty() => {
            let prefix = if prefix.ends_with('/') {
                prefix.to_string()
            } else {
                format!("{}/", prefix)
            };
            entry.strip_prefix(prefix.as_str()).unwrap_or(entry)
        }
        _ => entry,
    }
}


#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Ignore by default as it requires AWS credentials and S3 access
    async fn test_s3_storage_real_aws() -> Result<(), Box<dyn std::error::Error>> {
        // Set TEST_S3_BUCKET plus the usual AWS_* credentials to run
        let test_bucket = match std::env::var("TEST_S3_BUCKET") {
            Ok(bucket) => bucket,
            Err(_) => {
                println!("Skipping S3 integration test - set TEST_S3_BUCKET environment variable");
                return Ok(());
            }
        };

        let config = StorageConfig {
            region: std::env::var("AWS_DEFAULT_REGION")
                .unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            endpoint_url: None,
            ..StorageConfig::default()
        };
        let storage = S3Storage::new(&config).await?;
        let s3_path = format!(
            "s3://{}/test-integration/prods_op_mogreps-uk_20160107_03_00_003.nc",
            test_bucket
        );

        storage.write(&s3_path, b"integration").await?;
        assert!(storage.exists(&s3_path).await?);

        let keys = storage
            .list(&format!("s3://{}/test-integration/prods_op", test_bucket), 10)
            .await?;
        assert!(keys.iter().any(|k| k.ends_with("_003.nc")));

        println!("S3 integration test passed with bucket: {}", test_bucket);
        Ok(())
    }
}

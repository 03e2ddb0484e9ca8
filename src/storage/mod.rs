//! Durable blob storage addressed by key.
//!
//! One [`StorageGateway`] is built per run from a storage URL and shared by
//! everything that persists data. Keys are relative to the URL's prefix.

mod local;
mod memory;
mod s3;

use bytes::Bytes;
use futures::TryStreamExt;
use indexmap::IndexMap;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use regex::Regex;
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{InvalidUrlSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

pub use local::LocalConfig;
pub use memory::MemoryConfig;
pub use s3::S3Config;

/// User metadata attached to a stored blob, in insertion order.
pub type BlobMetadata = IndexMap<String, String>;

pub type StorageGatewayRef = Arc<StorageGateway>;

/// Put/get/list over an object store backend.
#[derive(Clone)]
pub struct StorageGateway {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageGateway<{}>", self.canonical_url)
    }
}

const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

const MEMORY_URL: &str = r"^memory://(?P<key>.*)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Local,
    Memory,
}

/// URL matchers in match order. Memory and file schemes come before the bare
/// path pattern.
fn matchers() -> &'static [(Backend, Regex)] {
    static MATCHERS: OnceLock<Vec<(Backend, Regex)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        vec![
            (Backend::Memory, Regex::new(MEMORY_URL).unwrap()),
            (Backend::S3, Regex::new(S3_PATH).unwrap()),
            (Backend::S3, Regex::new(S3_ENDPOINT_URL).unwrap()),
            (Backend::S3, Regex::new(S3_URL).unwrap()),
            (Backend::Local, Regex::new(FILE_URI).unwrap()),
            (Backend::Local, Regex::new(FILE_PATH).unwrap()),
        ]
    })
}

/// Backend configuration parsed from a storage URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
    Memory(MemoryConfig),
}

impl BackendConfig {
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        let found = matchers()
            .iter()
            .find_map(|(backend, regex)| regex.captures(url).map(|caps| (*backend, caps)));

        match found {
            Some((Backend::S3, caps)) => Ok(Self::parse_s3(&caps)),
            Some((Backend::Local, caps)) => Ok(Self::parse_local(&caps)),
            Some((Backend::Memory, caps)) => Ok(Self::parse_memory(&caps)),
            None => InvalidUrlSnafu {
                url: url.to_string(),
            }
            .fail(),
        }
    }

    fn parse_s3(caps: &regex::Captures) -> Self {
        let bucket = caps
            .name("bucket")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| caps.name("region").map(|m| m.as_str().to_string()));

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            caps.name("endpoint").map(|endpoint| {
                let port = caps
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = caps.name("protocol").map_or("https", |p| p.as_str());
                format!("{}://{}:{}", protocol, endpoint.as_str(), port)
            })
        });

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key: non_empty_key(caps),
        })
    }

    fn parse_local(caps: &regex::Captures) -> Self {
        let path = caps.name("path").map_or("", |m| m.as_str());
        let path = format!("/{}", path.trim_start_matches('/'));
        let path = match path.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };
        BackendConfig::Local(LocalConfig { path })
    }

    fn parse_memory(caps: &regex::Captures) -> Self {
        BackendConfig::Memory(MemoryConfig {
            key: non_empty_key(caps),
        })
    }

    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Local(_) => None,
            BackendConfig::Memory(memory) => memory.key.as_ref(),
        }
    }

    /// Whether the backend stores content type and user metadata.
    pub fn supports_attributes(&self) -> bool {
        !matches!(self, BackendConfig::Local(_))
    }
}

fn non_empty_key(caps: &regex::Captures) -> Option<Path> {
    caps.name("key")
        .map(|m| m.as_str().trim_matches('/'))
        .filter(|k| !k.is_empty())
        .map(Path::from)
}

fn request_status<T, E>(result: &Result<T, E>) -> RequestStatus {
    if result.is_ok() {
        RequestStatus::Success
    } else {
        RequestStatus::Error
    }
}

impl StorageGateway {
    /// Build a gateway for `s3://`, `file://`, absolute path or `memory://`
    /// URLs. `options` are passed to the S3 builder.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::S3(config) => Self::construct_s3(config, options),
            BackendConfig::Local(config) => Self::construct_local(config).await,
            BackendConfig::Memory(config) => Ok(Self::construct_memory(config)),
        }
    }

    pub async fn for_url(url: &str) -> Result<Self, StorageError> {
        Self::for_url_with_options(url, HashMap::new()).await
    }

    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Store `bytes` at `key`, replacing any existing blob.
    ///
    /// Content type and metadata are dropped on backends that cannot hold
    /// them.
    pub async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        metadata: &BlobMetadata,
    ) -> Result<(), StorageError> {
        let path = Path::from(key);
        let path = self.qualify_path(&path);

        let mut attributes = Attributes::new();
        if self.config.supports_attributes() {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            for (name, value) in metadata {
                attributes.insert(Attribute::Metadata(name.clone().into()), value.clone().into());
            }
        }
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        let size = bytes.len();
        let start = Instant::now();
        let result = self
            .object_store
            .put_opts(&path, PutPayload::from(bytes), options)
            .await;

        emit!(StorageRequest {
            operation: StorageOperation::Put,
            status: request_status(&result),
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::Put,
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu { key })?;
        debug!("Stored {} bytes at {}", size, path);
        Ok(())
    }

    /// Read the blob at `key`.
    pub async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = Path::from(key);
        let start = Instant::now();
        let result = self.object_store.get(&self.qualify_path(&path)).await;

        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status: request_status(&result),
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::Get,
            duration: start.elapsed(),
        });

        result
            .context(ObjectStoreSnafu { key })?
            .bytes()
            .await
            .context(ObjectStoreSnafu { key })
    }

    /// Keys under `prefix`, relative to the gateway's base and sorted.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix_path = Path::from(prefix);
        let full_prefix = self.qualify_path(&prefix_path);
        let base_parts = self.config.key().map_or(0, |key| key.parts().count());

        let start = Instant::now();
        let result: Result<Vec<_>, _> = self
            .object_store
            .list(Some(&*full_prefix))
            .try_collect()
            .await;

        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: request_status(&result),
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::List,
            duration: start.elapsed(),
        });

        let mut keys: Vec<String> = result
            .context(ObjectStoreSnafu { key: prefix })?
            .into_iter()
            .map(|meta| {
                meta.location
                    .parts()
                    .skip(base_parts)
                    .collect::<Path>()
                    .to_string()
            })
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Qualify a key with the configured base prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }
}

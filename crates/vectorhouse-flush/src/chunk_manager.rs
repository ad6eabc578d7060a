//! Object Store Chunk Manager
//!
//! Thin wrapper over `object_store` that the flush engine writes binlogs
//! through. It adds what the raw trait does not have:
//!
//! - the root path all binlog keys live under
//! - PUT retry with exponential backoff
//! - operation counters (per op, success/fail)
//! - multi-key reads and writes with concurrent dispatch
//!
//! ## Partial reads
//!
//! `multi_read` keeps going on per-key errors and returns whatever it got
//! alongside the first error: callers on stale-flush paths want the
//! successes even when some keys are already compacted away.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore};

use vectorhouse_observability::{labels, FlushMetrics};

use crate::config::FlushConfig;
use crate::error::{Error, Result};

pub struct ChunkManager {
    object_store: Arc<dyn ObjectStore>,
    root_path: String,
    write_retries: u32,
    write_retry_backoff: Duration,
    metrics: FlushMetrics,
}

impl ChunkManager {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        config: &FlushConfig,
        metrics: FlushMetrics,
    ) -> Self {
        Self {
            object_store,
            root_path: config.root_path.clone(),
            write_retries: config.write_retries.max(1),
            write_retry_backoff: Duration::from_millis(config.write_retry_backoff_ms),
            metrics,
        }
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Put one object, retrying with exponential backoff.
    pub async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        let path = Path::from(key);
        let mut backoff = self.write_retry_backoff;

        for attempt in 0..self.write_retries {
            match self.object_store.put(&path, data.clone()).await {
                Ok(_) => {
                    self.metrics
                        .object_ops_total
                        .with_label_values(&[labels::OP_PUT, labels::STATUS_SUCCESS])
                        .inc();
                    tracing::debug!(
                        key = %key,
                        size = data.len(),
                        attempt = attempt + 1,
                        "uploaded binlog object"
                    );
                    return Ok(());
                }
                Err(e) if attempt + 1 < self.write_retries => {
                    self.metrics
                        .object_ops_total
                        .with_label_values(&[labels::OP_PUT, labels::STATUS_FAIL])
                        .inc();
                    tracing::warn!(
                        key = %key,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "binlog upload failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    self.metrics
                        .object_ops_total
                        .with_label_values(&[labels::OP_PUT, labels::STATUS_FAIL])
                        .inc();
                    tracing::error!(key = %key, error = %e, "binlog upload failed after all retries");
                    return Err(e.into());
                }
            }
        }

        unreachable!()
    }

    /// Put several objects, dispatching all keys concurrently.
    pub async fn multi_write(&self, kvs: HashMap<String, Bytes>) -> Result<()> {
        futures::future::try_join_all(
            kvs.into_iter().map(|(key, data)| async move {
                self.write(&key, data).await
            }),
        )
        .await?;
        Ok(())
    }

    /// Get one object's full contents.
    pub async fn read(&self, key: &str) -> Result<Bytes> {
        let path = Path::from(key);
        let result = async {
            let get = self.object_store.get(&path).await?;
            get.bytes().await
        }
        .await;

        match result {
            Ok(bytes) => {
                self.metrics
                    .object_ops_total
                    .with_label_values(&[labels::OP_GET, labels::STATUS_SUCCESS])
                    .inc();
                Ok(bytes)
            }
            Err(e) => {
                self.metrics
                    .object_ops_total
                    .with_label_values(&[labels::OP_GET, labels::STATUS_FAIL])
                    .inc();
                Err(self.map_read_error(key, e))
            }
        }
    }

    /// Get a byte range of one object. A range that runs past the end of
    /// the object reports `UnexpectedEof` with the offending path.
    pub async fn read_at(&self, key: &str, offset: usize, length: usize) -> Result<Bytes> {
        let path = Path::from(key);
        match self
            .object_store
            .get_range(&path, offset..offset + length)
            .await
        {
            Ok(bytes) if bytes.len() < length => Err(Error::UnexpectedEof {
                path: key.to_string(),
            }),
            Ok(bytes) => Ok(bytes),
            Err(e) => Err(self.map_read_error(key, e)),
        }
    }

    /// Get several objects. Per-key failures do not abort the rest: the
    /// result carries every success in input order plus the first error.
    pub async fn multi_read(&self, keys: &[String]) -> (Vec<Option<Bytes>>, Option<Error>) {
        let results =
            futures::future::join_all(keys.iter().map(|key| self.read(key))).await;

        let mut values = Vec::with_capacity(results.len());
        let mut first_err = None;
        for result in results {
            match result {
                Ok(bytes) => values.push(Some(bytes)),
                Err(e) => {
                    values.push(None);
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        (values, first_err)
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = Path::from(key);
        match self.object_store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Size of one object in bytes.
    pub async fn size(&self, key: &str) -> Result<i64> {
        let path = Path::from(key);
        match self.object_store.head(&path).await {
            Ok(meta) => {
                self.metrics
                    .object_ops_total
                    .with_label_values(&[labels::OP_STAT, labels::STATUS_SUCCESS])
                    .inc();
                Ok(meta.size as i64)
            }
            Err(e) => {
                self.metrics
                    .object_ops_total
                    .with_label_values(&[labels::OP_STAT, labels::STATUS_FAIL])
                    .inc();
                Err(self.map_read_error(key, e))
            }
        }
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let path = Path::from(key);
        match self.object_store.delete(&path).await {
            Ok(()) => {
                self.metrics
                    .object_ops_total
                    .with_label_values(&[labels::OP_REMOVE, labels::STATUS_SUCCESS])
                    .inc();
                Ok(())
            }
            Err(e) => {
                self.metrics
                    .object_ops_total
                    .with_label_values(&[labels::OP_REMOVE, labels::STATUS_FAIL])
                    .inc();
                Err(e.into())
            }
        }
    }

    /// List objects under a prefix. With `recursive` unset, only objects
    /// directly under the prefix are returned.
    pub async fn list_with_prefix(&self, prefix: &str, recursive: bool) -> Result<Vec<ObjectMeta>> {
        let path = Path::from(prefix);
        let listed = if recursive {
            self.object_store
                .list(Some(&path))
                .try_collect::<Vec<_>>()
                .await
        } else {
            self.object_store
                .list_with_delimiter(Some(&path))
                .await
                .map(|r| r.objects)
        };

        match listed {
            Ok(objects) => {
                self.metrics
                    .object_ops_total
                    .with_label_values(&[labels::OP_LIST, labels::STATUS_SUCCESS])
                    .inc();
                Ok(objects)
            }
            Err(e) => {
                self.metrics
                    .object_ops_total
                    .with_label_values(&[labels::OP_LIST, labels::STATUS_FAIL])
                    .inc();
                Err(e.into())
            }
        }
    }

    fn map_read_error(&self, key: &str, e: object_store::Error) -> Error {
        match e {
            object_store::Error::NotFound { .. } => Error::KeyNotFound {
                path: key.to_string(),
            },
            other => other.into(),
        }
    }
}

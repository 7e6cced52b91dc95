//! Keyed document store: the remote sink for uploads and the source for
//! lookups.
//!
//! Paths are slash-separated (`products/3017620422003`). `RealtimeDb` speaks
//! the realtime-database REST dialect (`<url>/<path>.json`); `MemoryStore`
//! keeps the same tree in process for dry runs.

use crate::config::Config;
use crate::{IngestError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

pub const CONNECTION_TEST_PATH: &str = "connection_test";

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Merge the top-level keys of `value` into the node at `path`.
    async fn update(&self, path: &str, value: &Value) -> Result<()>;

    /// Replace the node at `path`.
    async fn set(&self, path: &str, value: &Value) -> Result<()>;

    /// Read the node at `path`; `None` when nothing is stored there.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    async fn delete(&self, path: &str) -> Result<()>;
}

/// Write then remove a timestamp probe so bad URLs or credentials fail
/// before any data is sent.
pub async fn verify_connection<S: DocumentStore + ?Sized>(store: &S) -> Result<()> {
    let probe = json!({ "timestamp": chrono::Utc::now().timestamp() });
    store
        .set(CONNECTION_TEST_PATH, &probe)
        .await
        .map_err(|e| IngestError::Connection(e.to_string()))?;
    store
        .delete(CONNECTION_TEST_PATH)
        .await
        .map_err(|e| IngestError::Connection(e.to_string()))?;
    info!("Store connection verified successfully");
    Ok(())
}

/// Fields of a service-account key file that are checked before use.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub project_id: String,
    pub client_email: String,
}

impl ServiceAccount {
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            return Err(IngestError::MissingFile {
                what: "Service account key file",
                path: path.to_path_buf(),
            });
        }
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// REST client for a realtime-database endpoint.
pub struct RealtimeDb {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl RealtimeDb {
    pub fn new(
        base_url: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let url = config.require_database_url()?;
        Self::new(url, config.access_token.clone(), config.request_timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, self.url(path));
        match &self.access_token {
            Some(token) => req.query(&[("access_token", token)]),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, path: &str) -> Result<Response> {
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(IngestError::StoreStatus {
            path: path.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl DocumentStore for RealtimeDb {
    async fn update(&self, path: &str, value: &Value) -> Result<()> {
        debug!(path, "PATCH");
        self.send(self.request(Method::PATCH, path).json(value), path)
            .await?;
        Ok(())
    }

    async fn set(&self, path: &str, value: &Value) -> Result<()> {
        debug!(path, "PUT");
        self.send(self.request(Method::PUT, path).json(value), path)
            .await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>> {
        debug!(path, "GET");
        let response = self.send(self.request(Method::GET, path), path).await?;
        let value: Value = response.json().await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        debug!(path, "DELETE");
        self.send(self.request(Method::DELETE, path), path).await?;
        Ok(())
    }
}

/// In-process document tree with the same path semantics.
#[derive(Debug, Default)]
pub struct MemoryStore {
    root: Mutex<Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of children under `path` (0 if absent or a leaf).
    pub fn child_count(&self, path: &str) -> usize {
        let root = self.root.lock().unwrap_or_else(PoisonError::into_inner);
        lookup(&root, path)
            .and_then(Value::as_object)
            .map_or(0, Map::len)
    }

    fn with_root<T>(&self, f: impl FnOnce(&mut Value) -> T) -> T {
        let mut root = self.root.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut root)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn lookup<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    segments(path).try_fold(root, |node, seg| node.get(seg))
}

/// Walk to `path`, turning leaves on the way into objects.
fn node_mut<'v>(root: &'v mut Value, path: &str) -> &'v mut Value {
    segments(path).fold(root, |node, seg| {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        match node {
            Value::Object(map) => map.entry(seg.to_string()).or_insert(Value::Null),
            other => other,
        }
    })
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn update(&self, path: &str, value: &Value) -> Result<()> {
        let Value::Object(children) = value else {
            return self.set(path, value).await;
        };
        self.with_root(|root| {
            let node = node_mut(root, path);
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            if let Value::Object(map) = node {
                for (key, child) in children {
                    map.insert(key.clone(), child.clone());
                }
            }
        });
        Ok(())
    }

    async fn set(&self, path: &str, value: &Value) -> Result<()> {
        self.with_root(|root| *node_mut(root, path) = value.clone());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let root = self.root.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(lookup(&root, path).filter(|v| !v.is_null()).cloned())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut parts: Vec<&str> = segments(path).collect();
        let Some(last) = parts.pop() else {
            self.with_root(|root| *root = Value::Null);
            return Ok(());
        };
        let parent = parts.join("/");
        self.with_root(|root| {
            if let Some(Value::Object(map)) = lookup_mut(root, &parent) {
                map.remove(last);
            }
        });
        Ok(())
    }
}

fn lookup_mut<'v>(root: &'v mut Value, path: &str) -> Option<&'v mut Value> {
    segments(path).try_fold(root, |node, seg| node.get_mut(seg))
}

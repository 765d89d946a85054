//! Prefix-confined view of a Store

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{Store, StoreError};

/// A [`Store`] view that prepends a fixed prefix to every key.
///
/// Keys handed to and returned from the view are relative to the prefix.
pub struct ScopedStore {
    inner: Arc<dyn Store>,
    prefix: String,
}

impl ScopedStore {
    pub fn new(inner: Arc<dyn Store>, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_key(&self, key: &str) -> Result<String, StoreError> {
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|seg| seg == "..") {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(format!("{}{}", self.prefix, key))
    }
}

#[async_trait]
impl Store for ScopedStore {
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let key = self.full_key(key)?;
        self.inner.put(&key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let key = self.full_key(key)?;
        self.inner.get(&key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let key = self.full_key(key)?;
        self.inner.delete(&key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let full_prefix = format!("{}{}", self.prefix, prefix);
        let entries = self.inner.list(&full_prefix).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(&self.prefix).map(|rel| (rel.to_string(), v)))
            .collect())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.inner.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn keys_are_prefixed_and_stripped() {
        let backing: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let scoped = ScopedStore::new(backing.clone(), "plugins/archive/");

        scoped.put("events/1", json!("a")).await.unwrap();
        assert_eq!(
            backing.get("plugins/archive/events/1").await.unwrap(),
            Some(json!("a"))
        );

        let listed = scoped.list("events/").await.unwrap();
        assert_eq!(listed, vec![("events/1".to_string(), json!("a"))]);
    }

    #[tokio::test]
    async fn sibling_scopes_are_isolated() {
        let backing: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let a = ScopedStore::new(backing.clone(), "plugins/a/");
        let b = ScopedStore::new(backing.clone(), "plugins/b/");

        a.put("secret", json!(1)).await.unwrap();
        assert_eq!(b.get("secret").await.unwrap(), None);
        assert!(b.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn escaping_keys_are_rejected() {
        let scoped = ScopedStore::new(Arc::new(MemoryStore::new()), "plugins/a/");
        for key in ["", "/abs", "../b/secret", "x/../../y"] {
            assert!(
                matches!(scoped.get(key).await, Err(StoreError::InvalidKey(_))),
                "{key} should be rejected"
            );
        }
    }
}

//! Key-value store contract (§6): `get/set/delete/keys/get_all`, namespaced,
//! values are JSON-compatible, with optional TTL.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::error::Result;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>>;
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Value,
        ttl_seconds: Option<u64>,
    ) -> Result<()>;
    async fn delete(&self, namespace: &str, key: &str) -> Result<()>;
    async fn keys(&self, namespace: &str) -> Result<Vec<String>>;
    async fn get_all(&self, namespace: &str) -> Result<HashMap<String, Value>>;
}

/// In-memory implementation, used for tests and single-shot CLI runs with
/// no Postgres backend configured.
#[derive(Default)]
pub struct InMemoryKvStore {
    data: RwLock<HashMap<String, HashMap<String, (Value, Option<std::time::Instant>)>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>> {
        let data = self.data.read().unwrap();
        Ok(data.get(namespace).and_then(|ns| {
            ns.get(key).and_then(|(value, expires_at)| {
                if expires_at.map(|e| e <= std::time::Instant::now()).unwrap_or(false) {
                    None
                } else {
                    Some(value.clone())
                }
            })
        }))
    }

    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Value,
        ttl_seconds: Option<u64>,
    ) -> Result<()> {
        let expires_at = ttl_seconds.map(|secs| std::time::Instant::now() + Duration::from_secs(secs));
        let mut data = self.data.write().unwrap();
        data.entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let mut data = self.data.write().unwrap();
        if let Some(ns) = data.get_mut(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>> {
        let data = self.data.read().unwrap();
        Ok(data
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_all(&self, namespace: &str) -> Result<HashMap<String, Value>> {
        let data = self.data.read().unwrap();
        Ok(data
            .get(namespace)
            .map(|ns| ns.iter().map(|(k, (v, _))| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}

/// Postgres-backed key-value store: one table, namespaced rows, JSONB value,
/// optional `expires_at`, grounded on the teacher's pool-init pattern in
/// `database/postgres.rs`.
pub struct PostgresKvStore {
    pool: PgPool,
}

impl PostgresKvStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresKvStore { pool }
    }
}

#[async_trait]
impl KvStore for PostgresKvStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>> {
        let row: Option<(Value,)> = sqlx::query_as(
            "SELECT value FROM kv_store WHERE namespace = $1 AND key = $2 \
             AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(v,)| v))
    }

    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Value,
        ttl_seconds: Option<u64>,
    ) -> Result<()> {
        let expires_at = ttl_seconds.map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs as i64));

        sqlx::query(
            "INSERT INTO kv_store (namespace, key, value, expires_at, updated_at) \
             VALUES ($1, $2, $3, $4, now()) \
             ON CONFLICT (namespace, key) DO UPDATE SET value = $3, expires_at = $4, updated_at = now()",
        )
        .bind(namespace)
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE namespace = $1 AND key = $2")
            .bind(namespace)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM kv_store WHERE namespace = $1 \
             AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(k,)| k).collect())
    }

    async fn get_all(&self, namespace: &str) -> Result<HashMap<String, Value>> {
        let rows: Vec<(String, Value)> = sqlx::query_as(
            "SELECT key, value FROM kv_store WHERE namespace = $1 \
             AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let store = InMemoryKvStore::new();
        store
            .set("goals", "abc", serde_json::json!({"x": 1}), None)
            .await
            .unwrap();
        let got = store.get("goals", "abc").await.unwrap();
        assert_eq!(got, Some(serde_json::json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_in_memory_delete() {
        let store = InMemoryKvStore::new();
        store.set("ns", "k", serde_json::json!(1), None).await.unwrap();
        store.delete("ns", "k").await.unwrap();
        assert_eq!(store.get("ns", "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_in_memory_keys_and_get_all() {
        let store = InMemoryKvStore::new();
        store.set("ns", "a", serde_json::json!(1), None).await.unwrap();
        store.set("ns", "b", serde_json::json!(2), None).await.unwrap();
        let mut keys = store.keys("ns").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.get_all("ns").await.unwrap().len(), 2);
    }
}

//! Thought Tree (§4.3): a forest of trees, not a graph. Nodes live in an
//! arena keyed by id; `children` is computed by index at read time, never
//! stored as owning pointers (spec.md §9 design note). Backed by the KV
//! store — one JSON blob per goal, mirroring the original's one Redis hash
//! per goal (§6 persisted-state layout).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::KvStore;

const NAMESPACE: &str = "thought_tree";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtType {
    Goal,
    Reasoning,
    Action,
    Result,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtStatus {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thought {
    pub thought_id: Uuid,
    pub goal_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub thought_type: ThoughtType,
    pub status: ThoughtStatus,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// The arena for a single goal's thoughts, as persisted in the KV store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GoalArena {
    root_id: Option<Uuid>,
    nodes: Vec<Thought>,
}

pub struct ThoughtTree {
    kv: Arc<dyn KvStore>,
}

impl ThoughtTree {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        ThoughtTree { kv }
    }

    async fn load(&self, goal_id: Uuid) -> Result<GoalArena> {
        let raw = self.kv.get(NAMESPACE, &goal_id.to_string()).await?;
        Ok(match raw {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => GoalArena::default(),
        })
    }

    async fn save(&self, goal_id: Uuid, arena: &GoalArena) -> Result<()> {
        let value = serde_json::to_value(arena)?;
        self.kv.set(NAMESPACE, &goal_id.to_string(), value, None).await
    }

    pub async fn create_root(&self, goal_id: Uuid, text: &str) -> Result<Thought> {
        let mut arena = self.load(goal_id).await?;

        let thought = Thought {
            thought_id: Uuid::new_v4(),
            goal_id,
            parent_id: None,
            content: text.to_string(),
            thought_type: ThoughtType::Goal,
            status: ThoughtStatus::Active,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        };

        arena.root_id = Some(thought.thought_id);
        arena.nodes.push(thought.clone());
        self.save(goal_id, &arena).await?;
        Ok(thought)
    }

    pub async fn add_thought(
        &self,
        goal_id: Uuid,
        parent_id: Uuid,
        content: &str,
        thought_type: ThoughtType,
        metadata: Option<serde_json::Value>,
    ) -> Result<Thought> {
        let mut arena = self.load(goal_id).await?;

        let thought = Thought {
            thought_id: Uuid::new_v4(),
            goal_id,
            parent_id: Some(parent_id),
            content: content.to_string(),
            thought_type,
            status: ThoughtStatus::Active,
            timestamp: Utc::now(),
            metadata: metadata.unwrap_or(serde_json::Value::Null),
        };

        arena.nodes.push(thought.clone());
        self.save(goal_id, &arena).await?;
        Ok(thought)
    }

    /// Idempotent terminal transition: active -> completed on the root.
    pub async fn complete(&self, goal_id: Uuid, result: Option<&str>) -> Result<()> {
        self.terminate(goal_id, ThoughtStatus::Completed, result).await
    }

    /// Idempotent terminal transition: active -> failed on the root.
    pub async fn fail(&self, goal_id: Uuid, error: &str) -> Result<()> {
        self.terminate(goal_id, ThoughtStatus::Failed, Some(error)).await
    }

    async fn terminate(&self, goal_id: Uuid, status: ThoughtStatus, note: Option<&str>) -> Result<()> {
        let mut arena = self.load(goal_id).await?;
        let Some(root_id) = arena.root_id else {
            return Ok(());
        };

        if let Some(root) = arena.nodes.iter_mut().find(|n| n.thought_id == root_id) {
            if root.status == ThoughtStatus::Active {
                root.status = status;
                if let Some(note) = note {
                    root.metadata = serde_json::json!({ "note": note });
                }
            }
        }

        self.save(goal_id, &arena).await
    }

    pub async fn get_thoughts(&self, goal_id: Uuid) -> Result<Vec<Thought>> {
        let mut arena = self.load(goal_id).await?;
        arena.nodes.sort_by_key(|t| t.timestamp);
        Ok(arena.nodes)
    }

    pub async fn get_root(&self, goal_id: Uuid) -> Result<Option<Thought>> {
        let arena = self.load(goal_id).await?;
        Ok(arena
            .root_id
            .and_then(|id| arena.nodes.into_iter().find(|n| n.thought_id == id)))
    }

    /// Children of a given thought within a goal, computed by index rather
    /// than stored pointers.
    pub async fn get_children(&self, goal_id: Uuid, parent_id: Uuid) -> Result<Vec<Thought>> {
        let arena = self.load(goal_id).await?;
        Ok(arena
            .nodes
            .into_iter()
            .filter(|n| n.parent_id == Some(parent_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryKvStore;

    #[tokio::test]
    async fn test_root_is_parentless_and_reachable() {
        let tree = ThoughtTree::new(Arc::new(InMemoryKvStore::new()));
        let goal_id = Uuid::new_v4();
        let root = tree.create_root(goal_id, "do the thing").await.unwrap();
        assert!(root.parent_id.is_none());

        let child = tree
            .add_thought(goal_id, root.thought_id, "step 1", ThoughtType::Action, None)
            .await
            .unwrap();
        assert_eq!(child.parent_id, Some(root.thought_id));

        let thoughts = tree.get_thoughts(goal_id).await.unwrap();
        assert_eq!(thoughts.len(), 2);

        let fetched_root = tree.get_root(goal_id).await.unwrap().unwrap();
        assert_eq!(fetched_root.thought_id, root.thought_id);
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let tree = ThoughtTree::new(Arc::new(InMemoryKvStore::new()));
        let goal_id = Uuid::new_v4();
        tree.create_root(goal_id, "goal").await.unwrap();

        tree.complete(goal_id, Some("done")).await.unwrap();
        tree.complete(goal_id, Some("done again")).await.unwrap();

        let root = tree.get_root(goal_id).await.unwrap().unwrap();
        assert_eq!(root.status, ThoughtStatus::Completed);
        // second call is a no-op since status was no longer Active
        assert_eq!(root.metadata, serde_json::json!({ "note": "done" }));
    }

    #[tokio::test]
    async fn test_no_thought_is_its_own_parent() {
        let tree = ThoughtTree::new(Arc::new(InMemoryKvStore::new()));
        let goal_id = Uuid::new_v4();
        let root = tree.create_root(goal_id, "goal").await.unwrap();
        let thoughts = tree.get_thoughts(goal_id).await.unwrap();
        for t in &thoughts {
            assert_ne!(Some(t.thought_id), t.parent_id);
        }
        assert!(root.parent_id.is_none());
    }
}

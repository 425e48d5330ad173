//! Event Bus (§4.2): append-only, bounded stream. Events within a single
//! goal are totally ordered by append id; cross-goal ordering is
//! best-effort. Backed by a Postgres table (standing in for the original's
//! Redis stream id) plus an in-process `tokio::sync::broadcast` channel for
//! `subscribe`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::VecDeque;
use std::sync::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::Result;

/// Bound on the append-only stream; oldest entries are trimmed on insert.
pub const MAX_EVENTS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    GoalStart,
    GoalComplete,
    NeuronStart,
    NeuronComplete,
    NeuronError,
    ToolCalled,
    Thought,
    ToolRollback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: i64,
    pub event_type: EventType,
    pub neuron_type: Option<String>,
    pub goal_id: Uuid,
    pub parent_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: Option<i64>,
    pub payload: Value,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub goal_id: Option<Uuid>,
    pub neuron_type: Option<String>,
    pub event_type: Option<EventType>,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn emit(
        &self,
        event_type: EventType,
        goal_id: Uuid,
        neuron_type: Option<&str>,
        parent_id: Option<i64>,
        duration_ms: Option<i64>,
        payload: Value,
    ) -> Result<i64>;

    async fn get_events(&self, filter: EventFilter) -> Result<Vec<Event>>;

    fn subscribe(&self) -> broadcast::Receiver<Event>;

    /// Test-only.
    async fn clear(&self);
}

/// In-process bus: a bounded ring buffer guarded by a lock plus a broadcast
/// channel for live subscribers. Used both as the in-memory test double and
/// as the durable backend's in-process mirror for `subscribe`.
pub struct InMemoryEventBus {
    events: RwLock<VecDeque<Event>>,
    next_id: RwLock<i64>,
    tx: broadcast::Sender<Event>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        InMemoryEventBus {
            events: RwLock::new(VecDeque::new()),
            next_id: RwLock::new(1),
            tx,
        }
    }
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn emit(
        &self,
        event_type: EventType,
        goal_id: Uuid,
        neuron_type: Option<&str>,
        parent_id: Option<i64>,
        duration_ms: Option<i64>,
        payload: Value,
    ) -> Result<i64> {
        let event_id = {
            let mut next_id = self.next_id.write().unwrap();
            let id = *next_id;
            *next_id += 1;
            id
        };

        let event = Event {
            event_id,
            event_type,
            neuron_type: neuron_type.map(|s| s.to_string()),
            goal_id,
            parent_id,
            timestamp: Utc::now(),
            duration_ms,
            payload,
        };

        {
            let mut events = self.events.write().unwrap();
            events.push_back(event.clone());
            while events.len() > MAX_EVENTS {
                events.pop_front();
            }
        }

        let _ = self.tx.send(event);
        Ok(event_id)
    }

    async fn get_events(&self, filter: EventFilter) -> Result<Vec<Event>> {
        let events = self.events.read().unwrap();
        let mut matched: Vec<Event> = events
            .iter()
            .rev()
            .filter(|e| filter.goal_id.map(|g| g == e.goal_id).unwrap_or(true))
            .filter(|e| {
                filter
                    .neuron_type
                    .as_deref()
                    .map(|nt| e.neuron_type.as_deref() == Some(nt))
                    .unwrap_or(true)
            })
            .filter(|e| filter.event_type.map(|t| t == e.event_type).unwrap_or(true))
            .cloned()
            .collect();

        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }

        Ok(matched)
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    async fn clear(&self) {
        self.events.write().unwrap().clear();
        *self.next_id.write().unwrap() = 1;
    }
}

/// Postgres-durable bus. Writes go to `neural_events`; `subscribe` is served
/// from the in-process broadcast channel only (a restart loses live
/// subscribers but not the durable log, which `get_events` still reads).
pub struct PostgresEventBus {
    pool: PgPool,
    tx: broadcast::Sender<Event>,
}

impl PostgresEventBus {
    pub fn new(pool: PgPool) -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        PostgresEventBus { pool, tx }
    }
}

#[async_trait]
impl EventBus for PostgresEventBus {
    async fn emit(
        &self,
        event_type: EventType,
        goal_id: Uuid,
        neuron_type: Option<&str>,
        parent_id: Option<i64>,
        duration_ms: Option<i64>,
        payload: Value,
    ) -> Result<i64> {
        let event_type_str = serde_json::to_value(event_type)?
            .as_str()
            .unwrap_or("unknown")
            .to_string();

        let row: (i64, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO neural_events (event_type, neuron_type, goal_id, parent_id, duration_ms, payload) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING event_id, created_at",
        )
        .bind(&event_type_str)
        .bind(neuron_type)
        .bind(goal_id)
        .bind(parent_id)
        .bind(duration_ms)
        .bind(&payload)
        .fetch_one(&self.pool)
        .await?;

        let (event_id, timestamp) = row;

        // Trim-on-insert: keep only the newest MAX_EVENTS rows.
        sqlx::query(
            "DELETE FROM neural_events WHERE event_id <= ( \
                SELECT event_id FROM neural_events ORDER BY event_id DESC OFFSET $1 LIMIT 1 \
             )",
        )
        .bind(MAX_EVENTS as i64)
        .execute(&self.pool)
        .await
        .ok();

        let event = Event {
            event_id,
            event_type,
            neuron_type: neuron_type.map(|s| s.to_string()),
            goal_id,
            parent_id,
            timestamp,
            duration_ms,
            payload,
        };

        let _ = self.tx.send(event);
        Ok(event_id)
    }

    async fn get_events(&self, filter: EventFilter) -> Result<Vec<Event>> {
        let limit = filter.limit.unwrap_or(100) as i64;
        let rows: Vec<(i64, String, Option<String>, Uuid, Option<i64>, DateTime<Utc>, Option<i64>, Value)> =
            sqlx::query_as(
                "SELECT event_id, event_type, neuron_type, goal_id, parent_id, created_at, duration_ms, payload \
                 FROM neural_events \
                 WHERE ($1::uuid IS NULL OR goal_id = $1) \
                   AND ($2::text IS NULL OR neuron_type = $2) \
                   AND ($3::text IS NULL OR event_type = $3) \
                 ORDER BY event_id DESC LIMIT $4",
            )
            .bind(filter.goal_id)
            .bind(filter.neuron_type.as_deref())
            .bind(
                filter
                    .event_type
                    .and_then(|t| serde_json::to_value(t).ok())
                    .and_then(|v| v.as_str().map(|s| s.to_string())),
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(event_id, event_type, neuron_type, goal_id, parent_id, timestamp, duration_ms, payload)| {
                serde_json::from_value::<EventType>(Value::String(event_type)).ok().map(|event_type| Event {
                    event_id,
                    event_type,
                    neuron_type,
                    goal_id,
                    parent_id,
                    timestamp,
                    duration_ms,
                    payload,
                })
            })
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    async fn clear(&self) {
        let _ = sqlx::query("DELETE FROM neural_events").execute(&self.pool).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_ordered_within_goal() {
        let bus = InMemoryEventBus::new();
        let goal_id = Uuid::new_v4();
        bus.emit(EventType::GoalStart, goal_id, None, None, None, Value::Null)
            .await
            .unwrap();
        bus.emit(EventType::GoalComplete, goal_id, None, None, None, Value::Null)
            .await
            .unwrap();

        let events = bus
            .get_events(EventFilter {
                goal_id: Some(goal_id),
                ..Default::default()
            })
            .await
            .unwrap();

        // newest-first
        assert_eq!(events.len(), 2);
        assert!(events[0].event_id > events[1].event_id);
    }

    #[tokio::test]
    async fn test_trim_on_insert() {
        let bus = InMemoryEventBus::new();
        for _ in 0..(MAX_EVENTS + 10) {
            bus.emit(EventType::Thought, Uuid::new_v4(), None, None, None, Value::Null)
                .await
                .unwrap();
        }
        let events = bus.get_events(EventFilter::default()).await.unwrap();
        assert!(events.len() <= MAX_EVENTS);
    }

    #[tokio::test]
    async fn test_subscribe_receives_live_events() {
        let bus = InMemoryEventBus::new();
        let mut rx = bus.subscribe();
        let goal_id = Uuid::new_v4();
        bus.emit(EventType::GoalStart, goal_id, None, None, None, Value::Null)
            .await
            .unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.goal_id, goal_id);
    }
}

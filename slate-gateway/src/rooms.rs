//! Room metadata directory.
//!
//! The durable store is external; this module defines the lookup contract
//! the gateway needs plus an in-memory implementation. Rooms are created
//! when a user requests a new board or compiler, only the title is ever
//! mutated, and deletion is an explicit owner action (the caller is
//! responsible for evicting live sessions afterwards).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Per-room metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomRecord {
    pub id: String,
    pub title: String,
    /// Absent for personal/ungated rooms.
    pub org_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Room metadata provider: `get` is the contract the authorization path
/// depends on; the rest is board management.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn get(&self, room_id: &str) -> Option<RoomRecord>;
    async fn create(&self, title: &str, org_id: Option<&str>) -> RoomRecord;
    async fn rename(&self, room_id: &str, title: &str) -> Option<RoomRecord>;
    async fn delete(&self, room_id: &str) -> bool;
    /// Org-scoped listing, newest first, optionally filtered by a
    /// case-insensitive title substring.
    async fn list(&self, org_id: Option<&str>, search: Option<&str>) -> Vec<RoomRecord>;
}

/// In-memory directory.
pub struct InMemoryRoomDirectory {
    rooms: RwLock<HashMap<String, RoomRecord>>,
}

impl InMemoryRoomDirectory {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomDirectory for InMemoryRoomDirectory {
    async fn get(&self, room_id: &str) -> Option<RoomRecord> {
        self.rooms.read().await.get(room_id).cloned()
    }

    async fn create(&self, title: &str, org_id: Option<&str>) -> RoomRecord {
        let record = RoomRecord {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            org_id: org_id.map(str::to_string),
            created_at: Utc::now(),
        };
        self.rooms
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        tracing::info!(room = %record.id, title = %record.title, "room created");
        record
    }

    async fn rename(&self, room_id: &str, title: &str) -> Option<RoomRecord> {
        let mut rooms = self.rooms.write().await;
        let record = rooms.get_mut(room_id)?;
        record.title = title.to_string();
        Some(record.clone())
    }

    async fn delete(&self, room_id: &str) -> bool {
        let removed = self.rooms.write().await.remove(room_id).is_some();
        if removed {
            tracing::info!(room = %room_id, "room deleted");
        }
        removed
    }

    async fn list(&self, org_id: Option<&str>, search: Option<&str>) -> Vec<RoomRecord> {
        let rooms = self.rooms.read().await;
        let needle = search.map(str::to_lowercase);
        let mut matches: Vec<RoomRecord> = rooms
            .values()
            .filter(|room| room.org_id.as_deref() == org_id)
            .filter(|room| match &needle {
                Some(needle) => room.title.to_lowercase().contains(needle),
                None => true,
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches
    }
}

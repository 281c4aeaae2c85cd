use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use futures_util::StreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    error::ErrorKind,
    options::FindOptions,
    Collection, Database,
};

use crate::{error::StoreError, models::Alert};

pub const ALERTS_COLLECTION: &str = "alerts";

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create(&self, alert: &Alert) -> Result<(), StoreError>;

    /// Owner's alerts, newest first.
    async fn list_by_owner(&self, owner_id: ObjectId) -> Result<Vec<Alert>, StoreError>;

    /// Returns false when no alert with this id belongs to the owner.
    async fn delete_for_owner(&self, id: ObjectId, owner_id: ObjectId) -> Result<bool, StoreError>;

    /// Untriggered alerts that have an owner.
    async fn find_untriggered(&self) -> Result<Vec<Alert>, StoreError>;

    /// Conditional false -> true flip of `triggered`. Returns false when the
    /// alert was already triggered or no longer exists.
    async fn mark_triggered(&self, id: ObjectId, at: i64) -> Result<bool, StoreError>;

    /// Deletes alerts without an owner, returning how many were removed.
    async fn purge_orphaned(&self) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct MongoAlertStore {
    col: Collection<Alert>,
}

impl MongoAlertStore {
    pub fn new(db: &Database) -> Self {
        Self {
            col: db.collection::<Alert>(ALERTS_COLLECTION),
        }
    }
}

#[async_trait]
impl AlertStore for MongoAlertStore {
    async fn create(&self, alert: &Alert) -> Result<(), StoreError> {
        self.col.insert_one(alert, None).await?;
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: ObjectId) -> Result<Vec<Alert>, StoreError> {
        let opts = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
        let mut cursor = self.col.find(doc! { "owner_id": owner_id }, opts).await?;

        let mut items = Vec::new();
        while let Some(res) = cursor.next().await {
            items.push(res?);
        }
        Ok(items)
    }

    async fn delete_for_owner(&self, id: ObjectId, owner_id: ObjectId) -> Result<bool, StoreError> {
        let res = self
            .col
            .delete_one(doc! { "_id": id, "owner_id": owner_id }, None)
            .await?;
        Ok(res.deleted_count > 0)
    }

    async fn find_untriggered(&self) -> Result<Vec<Alert>, StoreError> {
        let mut cursor = self
            .col
            .find(
                doc! { "triggered": false, "owner_id": { "$exists": true, "$ne": null } },
                None,
            )
            .await?;

        let mut items = Vec::new();
        while let Some(res) = cursor.next().await {
            match res {
                Ok(a) => items.push(a),
                // one undecodable document must not hide the rest
                Err(e) if matches!(*e.kind, ErrorKind::BsonDeserialization(_)) => {
                    tracing::warn!("skipping undecodable alert document: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(items)
    }

    async fn mark_triggered(&self, id: ObjectId, at: i64) -> Result<bool, StoreError> {
        let res = self
            .col
            .update_one(
                doc! { "_id": id, "triggered": false },
                doc! { "$set": { "triggered": true, "triggered_at": at } },
                None,
            )
            .await?;
        Ok(res.matched_count > 0)
    }

    async fn purge_orphaned(&self) -> Result<u64, StoreError> {
        // matches both a missing field and an explicit null
        let res = self.col.delete_many(doc! { "owner_id": null }, None).await?;
        Ok(res.deleted_count)
    }
}

#[derive(Default)]
pub struct MemoryAlertStore {
    alerts: RwLock<Vec<Alert>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record as-is, including ownerless ones.
    pub fn insert_raw(&self, alert: Alert) {
        self.alerts.write().unwrap_or_else(PoisonError::into_inner).push(alert);
    }

    pub fn get(&self, id: ObjectId) -> Option<Alert> {
        self.alerts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.alerts.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn create(&self, alert: &Alert) -> Result<(), StoreError> {
        self.insert_raw(alert.clone());
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: ObjectId) -> Result<Vec<Alert>, StoreError> {
        let guard = self.alerts.read().unwrap_or_else(PoisonError::into_inner);
        let mut items: Vec<Alert> = guard
            .iter()
            .filter(|a| a.owner_id == Some(owner_id))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn delete_for_owner(&self, id: ObjectId, owner_id: ObjectId) -> Result<bool, StoreError> {
        let mut guard = self.alerts.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|a| !(a.id == id && a.owner_id == Some(owner_id)));
        Ok(guard.len() < before)
    }

    async fn find_untriggered(&self) -> Result<Vec<Alert>, StoreError> {
        let guard = self.alerts.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.iter().filter(|a| a.is_armed()).cloned().collect())
    }

    async fn mark_triggered(&self, id: ObjectId, at: i64) -> Result<bool, StoreError> {
        let mut guard = self.alerts.write().unwrap_or_else(PoisonError::into_inner);
        match guard.iter_mut().find(|a| a.id == id && !a.triggered) {
            Some(a) => {
                a.triggered = true;
                a.triggered_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_orphaned(&self) -> Result<u64, StoreError> {
        let mut guard = self.alerts.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|a| a.owner_id.is_some());
        Ok((before - guard.len()) as u64)
    }
}

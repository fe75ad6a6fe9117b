//! Toy lifecycle
//!
//! A toy moves between `created` and `exchanging` until it is removed.
//! Removal is a soft delete and final.

use crate::db::Storage;
use crate::error::{not_found_error, validation_error, AppResult};
use crate::models::{
    CreateToyRequest, ListResponse, Toy, ToyChanges, ToyListRequest, ToyStatus, UpdateToyRequest,
};
use crate::pagination::{split_page, PageRequest};
use std::sync::Arc;
use tracing::{debug, info};

pub struct ToyService {
    storage: Arc<dyn Storage>,
}

impl ToyService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Create a toy once per idempotency token
    pub async fn create(
        &self,
        owner: &str,
        idempotency_token: &str,
        request: CreateToyRequest,
    ) -> AppResult<Toy> {
        if idempotency_token.trim().is_empty() {
            return Err(validation_error("Idempotency token is required"));
        }
        if request.name.trim().is_empty() {
            return Err(validation_error("Toy name must not be empty"));
        }

        if let Some(existing) = self.storage.select_toy_by_token(idempotency_token).await? {
            debug!(toy_id = %existing.toy_id, "Toy token replayed");
            return Ok(existing);
        }

        let toy = Toy::new(
            owner,
            request.name,
            request.description,
            request.photo_url,
            idempotency_token,
        );
        let stored = self.storage.insert_toy(toy).await?;
        info!(toy_id = %stored.toy_id, owner, "Toy created");
        Ok(stored)
    }

    pub async fn update(&self, owner: &str, request: UpdateToyRequest) -> AppResult<Toy> {
        if request.name.trim().is_empty() {
            return Err(validation_error("Toy name must not be empty"));
        }
        let changes = ToyChanges {
            name: request.name,
            description: request.description,
            photo_url: request.photo_url,
        };
        self.storage
            .update_toy(&request.toy_id, owner, &changes)
            .await?
            .ok_or_else(|| not_found_error(format!("Toy {} not found", request.toy_id)))
    }

    /// Move a live toy to `status`; removal goes through `delete`
    pub async fn set_status(&self, toy_id: &str, owner: &str, status: ToyStatus) -> AppResult<Toy> {
        if status == ToyStatus::Removed {
            return Err(validation_error("Use delete to remove a toy"));
        }
        let toy = self
            .storage
            .update_toy_status(toy_id, owner, status)
            .await?
            .ok_or_else(|| not_found_error(format!("Toy {} not found", toy_id)))?;
        info!(toy_id, status = %toy.status, "Toy status changed");
        Ok(toy)
    }

    /// Soft delete. Missing, foreign or already removed toys are not an error.
    pub async fn delete(&self, toy_id: &str, owner: &str) -> AppResult<()> {
        match self
            .storage
            .update_toy_status(toy_id, owner, ToyStatus::Removed)
            .await?
        {
            Some(_) => info!(toy_id, "Toy removed"),
            None => debug!(toy_id, owner, "Nothing to remove"),
        }
        Ok(())
    }

    pub async fn get(&self, toy_id: &str) -> AppResult<Toy> {
        self.storage
            .select_toy(toy_id)
            .await?
            .ok_or_else(|| not_found_error(format!("Toy {} not found", toy_id)))
    }

    pub async fn get_owned(&self, toy_id: &str, owner: &str) -> AppResult<Toy> {
        self.storage
            .select_toy_by_owner(toy_id, owner)
            .await?
            .ok_or_else(|| not_found_error(format!("Toy {} not found", toy_id)))
    }

    pub async fn list(&self, request: &ToyListRequest) -> AppResult<ListResponse<Toy>> {
        let page = PageRequest::new(request.cursor.as_deref(), request.limit)?;
        let rows = self
            .storage
            .list_toys(&request.query, page.after.as_deref(), page.fetch_limit())
            .await?;
        let (items, cursor) = split_page(rows, page.limit, |toy| toy.toy_id.as_str());
        Ok(ListResponse { items, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStorage;
    use crate::error::AppError;
    use crate::models::ToyQuery;
    use pretty_assertions::assert_eq;
    use tokio_test::assert_ok;

    fn service() -> ToyService {
        ToyService::new(Arc::new(MemoryStorage::new()))
    }

    fn bear() -> CreateToyRequest {
        CreateToyRequest {
            name: "Bear".to_string(),
            description: None,
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let toys = service();
        let first = toys.create("u1", "tk1", bear()).await.unwrap();
        let second = toys.create("u1", "tk1", bear()).await.unwrap();
        assert_eq!(first.toy_id, second.toy_id);

        let all = toys.list(&ToyListRequest::default()).await.unwrap();
        assert_eq!(all.items.len(), 1);
    }

    #[tokio::test]
    async fn test_create_requires_name_and_token() {
        let toys = service();
        let mut nameless = bear();
        nameless.name = "  ".into();
        assert!(matches!(
            toys.create("u1", "tk", nameless).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            toys.create("u1", "", bear()).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_status_transitions_for_owner_only() {
        let toys = service();
        let toy = toys.create("u1", "tk", bear()).await.unwrap();

        let moved = toys
            .set_status(&toy.toy_id, "u1", ToyStatus::Exchanging)
            .await
            .unwrap();
        assert_eq!(moved.status, ToyStatus::Exchanging);

        let err = toys
            .set_status(&toy.toy_id, "u2", ToyStatus::Created)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_removed_toy_is_immutable() {
        let toys = service();
        let toy = toys.create("u1", "tk", bear()).await.unwrap();
        assert_ok!(toys.delete(&toy.toy_id, "u1").await);

        assert!(toys
            .set_status(&toy.toy_id, "u1", ToyStatus::Created)
            .await
            .is_err());
        let update = UpdateToyRequest {
            toy_id: toy.toy_id.clone(),
            name: "Zombie".into(),
            description: None,
            photo_url: None,
        };
        assert!(matches!(
            toys.update("u1", update).await,
            Err(AppError::NotFound(_))
        ));
        assert!(toys.get(&toy.toy_id).await.is_err());
        assert!(toys.get_owned(&toy.toy_id, "u1").await.is_err());

        // Deleting again, or deleting something that never existed, still succeeds
        assert_ok!(toys.delete(&toy.toy_id, "u1").await);
        assert_ok!(toys.delete("no-such-toy", "u1").await);

        let listed = toys.list(&ToyListRequest::default()).await.unwrap();
        assert!(listed.items.is_empty());

        let removed_only = toys
            .list(&ToyListRequest {
                query: ToyQuery {
                    statuses: Some(vec![ToyStatus::Removed]),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(removed_only.items.len(), 1);
        assert_eq!(removed_only.items[0].status, ToyStatus::Removed);
    }

    #[tokio::test]
    async fn test_pagination_terminates_without_gaps() {
        let toys = service();
        for i in 0..5 {
            toys.create(&format!("u{}", i % 2), &format!("tk{}", i), bear())
                .await
                .unwrap();
        }
        let mut expected: Vec<String> = toys
            .list(&ToyListRequest::default())
            .await
            .unwrap()
            .items
            .into_iter()
            .map(|t| t.toy_id)
            .collect();
        expected.sort();

        let mut seen = Vec::new();
        let mut cursor = None;
        let mut pages = 0;
        loop {
            let page = toys
                .list(&ToyListRequest {
                    limit: Some(2),
                    cursor: cursor.take(),
                    ..Default::default()
                })
                .await
                .unwrap();
            pages += 1;
            seen.extend(page.items.into_iter().map(|t| t.toy_id));
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_list_filters_by_owner() {
        let toys = service();
        toys.create("u1", "a", bear()).await.unwrap();
        toys.create("u2", "b", bear()).await.unwrap();

        let others = toys
            .list(&ToyListRequest {
                query: ToyQuery {
                    exclude_user_ids: Some(vec!["u1".into()]),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(others.items.len(), 1);
        assert_eq!(others.items[0].user_id, "u2");
    }

    #[tokio::test]
    async fn test_list_rejects_bad_cursor() {
        let toys = service();
        let err = toys
            .list(&ToyListRequest {
                cursor: Some("%%%".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}

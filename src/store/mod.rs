//! Persistence collaborator for the cross-listing workflow.
//!
//! Every read and write the workflow performs goes through [`Store`], so the
//! hosted PostgREST backend and the in-process backend stay interchangeable.

pub mod memory;
pub mod supabase;

use crate::models::{
    CrossListingRequest, HistoryQuery, InventoryItem, MarketplaceListing, NewCrossListingRequest,
    NewMarketplaceListing, RequestFinalization, RequestPage, StatusCounts,
};
use crate::platforms::Platform;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
    #[error("write rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Platforms the user holds an active credential for.
    async fn active_credential_platforms(&self, user_id: Uuid) -> Result<Vec<Platform>, StoreError>;

    async fn count_requests_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Single batch lookup, scoped to the owner. Unknown or foreign ids are simply absent.
    async fn fetch_inventory_items(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<InventoryItem>, StoreError>;

    async fn insert_request(
        &self,
        request: &NewCrossListingRequest,
    ) -> Result<CrossListingRequest, StoreError>;

    async fn fetch_request(&self, id: Uuid) -> Result<Option<CrossListingRequest>, StoreError>;

    async fn fetch_user_request(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CrossListingRequest>, StoreError>;

    /// Moves a `pending` (or resumes an `in_progress`) request to `in_progress`.
    /// Returns `false` when the row is missing or already terminal.
    async fn begin_processing(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Writes terminal fields on an `in_progress` request. Returns `false` if
    /// the row was not `in_progress`.
    async fn finalize_request(
        &self,
        id: Uuid,
        update: &RequestFinalization,
    ) -> Result<bool, StoreError>;

    async fn insert_listing(
        &self,
        listing: &NewMarketplaceListing,
    ) -> Result<MarketplaceListing, StoreError>;

    async fn find_listing(
        &self,
        request_id: Uuid,
        item_id: Uuid,
        platform: Platform,
    ) -> Result<Option<MarketplaceListing>, StoreError>;

    async fn fetch_listings(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<MarketplaceListing>, StoreError>;

    async fn list_requests(
        &self,
        user_id: Uuid,
        query: &HistoryQuery,
    ) -> Result<RequestPage, StoreError>;

    async fn status_counts(&self, user_id: Uuid) -> Result<StatusCounts, StoreError>;

    /// Ids of requests still `pending` or `in_progress`, oldest first.
    async fn unfinished_requests(&self) -> Result<Vec<Uuid>, StoreError>;
}

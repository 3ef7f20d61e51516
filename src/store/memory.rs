use super::{Store, StoreError};
use crate::models::{
    CrossListingRequest, HistoryQuery, InventoryItem, MarketplaceListing, NewCrossListingRequest,
    NewMarketplaceListing, RequestFinalization, RequestPage, RequestStatus, SortField, SortOrder,
    StatusCounts,
};
use crate::platforms::Platform;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering},
    },
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process store used for demo deployments and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    calls: Arc<AtomicUsize>,
    faults: Arc<Faults>,
}

#[derive(Default)]
struct Tables {
    requests: Vec<CrossListingRequest>,
    items: HashMap<Uuid, InventoryItem>,
    listings: Vec<MarketplaceListing>,
    credentials: HashSet<(Uuid, Platform)>,
    finalize_calls: HashMap<Uuid, usize>,
}

#[derive(Default)]
struct Faults {
    listing_insert: AtomicBool,
    request_fetch: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_inventory_item(&self, item: InventoryItem) {
        self.tables.write().await.items.insert(item.id, item);
    }

    #[cfg(test)]
    pub async fn remove_inventory_item(&self, id: Uuid) {
        self.tables.write().await.items.remove(&id);
    }

    pub async fn grant_credential(&self, user_id: Uuid, platform: Platform) {
        self.tables.write().await.credentials.insert((user_id, platform));
    }

    #[cfg(test)]
    pub async fn revoke_credential(&self, user_id: Uuid, platform: Platform) {
        self.tables
            .write()
            .await
            .credentials
            .remove(&(user_id, platform));
    }

    /// Inserts a request row as-is, bypassing the workflow.
    #[cfg(test)]
    pub async fn put_request(&self, request: CrossListingRequest) {
        let mut tables = self.tables.write().await;
        tables.requests.retain(|existing| existing.id != request.id);
        tables.requests.push(request);
    }

    #[cfg(test)]
    pub async fn listings(&self) -> Vec<MarketplaceListing> {
        self.tables.read().await.listings.clone()
    }

    #[cfg(test)]
    pub async fn request_count(&self) -> usize {
        self.tables.read().await.requests.len()
    }

    #[cfg(test)]
    pub async fn finalize_calls(&self, id: Uuid) -> usize {
        self.tables
            .read()
            .await
            .finalize_calls
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of [`Store`] operations served so far.
    #[cfg(test)]
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    #[cfg(test)]
    pub fn fail_listing_inserts(&self, enabled: bool) {
        self.faults.listing_insert.store(enabled, AtomicOrdering::SeqCst);
    }

    #[cfg(test)]
    pub fn fail_request_fetches(&self, enabled: bool) {
        self.faults.request_fetch.store(enabled, AtomicOrdering::SeqCst);
    }

    fn touch(&self) {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

fn compare_requests(a: &CrossListingRequest, b: &CrossListingRequest, field: SortField) -> Ordering {
    match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::CompletedAt => a.completed_at.cmp(&b.completed_at),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn active_credential_platforms(&self, user_id: Uuid) -> Result<Vec<Platform>, StoreError> {
        self.touch();
        let tables = self.tables.read().await;
        let mut platforms: Vec<Platform> = tables
            .credentials
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, platform)| *platform)
            .collect();
        platforms.sort();
        Ok(platforms)
    }

    async fn count_requests_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.touch();
        let tables = self.tables.read().await;
        Ok(tables
            .requests
            .iter()
            .filter(|request| request.user_id == user_id && request.created_at >= since)
            .count() as u64)
    }

    async fn fetch_inventory_items(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<InventoryItem>, StoreError> {
        self.touch();
        let tables = self.tables.read().await;
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| tables.items.get(id))
            .filter(|item| item.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_request(
        &self,
        request: &NewCrossListingRequest,
    ) -> Result<CrossListingRequest, StoreError> {
        self.touch();
        let row = CrossListingRequest {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            source_platform: request.source_platform,
            target_platforms: request.target_platforms.clone(),
            inventory_items: request.inventory_items.clone(),
            status: RequestStatus::Pending,
            optimize_seo: request.optimize_seo,
            generate_descriptions: request.generate_descriptions,
            results: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.tables.write().await.requests.push(row.clone());
        Ok(row)
    }

    async fn fetch_request(&self, id: Uuid) -> Result<Option<CrossListingRequest>, StoreError> {
        self.touch();
        if self.faults.request_fetch.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Request("connection reset".into()));
        }
        let tables = self.tables.read().await;
        Ok(tables.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn fetch_user_request(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CrossListingRequest>, StoreError> {
        self.touch();
        let tables = self.tables.read().await;
        Ok(tables
            .requests
            .iter()
            .find(|r| r.id == id && r.user_id == user_id)
            .cloned())
    }

    async fn begin_processing(&self, id: Uuid) -> Result<bool, StoreError> {
        self.touch();
        let mut tables = self.tables.write().await;
        match tables.requests.iter_mut().find(|r| r.id == id) {
            Some(row) if !row.status.is_terminal() => {
                row.status = RequestStatus::InProgress;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finalize_request(
        &self,
        id: Uuid,
        update: &RequestFinalization,
    ) -> Result<bool, StoreError> {
        self.touch();
        let mut tables = self.tables.write().await;
        *tables.finalize_calls.entry(id).or_insert(0) += 1;
        match tables.requests.iter_mut().find(|r| r.id == id) {
            Some(row) if row.status == RequestStatus::InProgress => {
                row.status = update.status;
                row.results = update.results.clone();
                row.error_message = update.error_message.clone();
                row.completed_at = Some(update.completed_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_listing(
        &self,
        listing: &NewMarketplaceListing,
    ) -> Result<MarketplaceListing, StoreError> {
        self.touch();
        if self.faults.listing_insert.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Rejected("marketplace_listings insert denied".into()));
        }
        let row = MarketplaceListing {
            id: Uuid::new_v4(),
            user_id: listing.user_id,
            inventory_item_id: listing.inventory_item_id,
            cross_listing_request_id: Some(listing.cross_listing_request_id),
            platform: listing.platform,
            platform_listing_id: listing.platform_listing_id.clone(),
            title: listing.title.clone(),
            description: listing.description.clone(),
            price: listing.price,
            status: "active".to_string(),
            quantity: listing.quantity,
            view_url: listing.view_url.clone(),
            listing_date: listing.listing_date,
        };
        self.tables.write().await.listings.push(row.clone());
        Ok(row)
    }

    async fn find_listing(
        &self,
        request_id: Uuid,
        item_id: Uuid,
        platform: Platform,
    ) -> Result<Option<MarketplaceListing>, StoreError> {
        self.touch();
        let tables = self.tables.read().await;
        Ok(tables
            .listings
            .iter()
            .find(|l| {
                l.cross_listing_request_id == Some(request_id)
                    && l.inventory_item_id == item_id
                    && l.platform == platform
            })
            .cloned())
    }

    async fn fetch_listings(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<MarketplaceListing>, StoreError> {
        self.touch();
        let tables = self.tables.read().await;
        Ok(tables
            .listings
            .iter()
            .filter(|l| l.user_id == user_id && ids.contains(&l.id))
            .cloned()
            .collect())
    }

    async fn list_requests(
        &self,
        user_id: Uuid,
        query: &HistoryQuery,
    ) -> Result<RequestPage, StoreError> {
        self.touch();
        let tables = self.tables.read().await;
        let mut matching: Vec<CrossListingRequest> = tables
            .requests
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter(|r| query.status.is_none_or(|status| r.status == status))
            .filter(|r| {
                query
                    .platform
                    .is_none_or(|platform| r.target_platforms.contains(&platform))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            let ordering = compare_requests(a, b, query.sort_by);
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        let total = matching.len() as u64;
        let requests = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .collect();
        Ok(RequestPage { requests, total })
    }

    async fn status_counts(&self, user_id: Uuid) -> Result<StatusCounts, StoreError> {
        self.touch();
        let tables = self.tables.read().await;
        Ok(StatusCounts::tally(
            tables
                .requests
                .iter()
                .filter(|r| r.user_id == user_id)
                .map(|r| &r.status),
        ))
    }

    async fn unfinished_requests(&self) -> Result<Vec<Uuid>, StoreError> {
        self.touch();
        let tables = self.tables.read().await;
        let mut open: Vec<&CrossListingRequest> = tables
            .requests
            .iter()
            .filter(|r| !r.status.is_terminal())
            .collect();
        open.sort_by_key(|r| r.created_at);
        Ok(open.into_iter().map(|r| r.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_request(user_id: Uuid, targets: Vec<Platform>) -> NewCrossListingRequest {
        NewCrossListingRequest {
            user_id,
            source_platform: Platform::Ebay,
            target_platforms: targets,
            inventory_items: vec![Uuid::new_v4()],
            optimize_seo: true,
            generate_descriptions: false,
        }
    }

    #[tokio::test]
    async fn status_transitions_only_move_forward() {
        let store = MemoryStore::new();
        let row = store
            .insert_request(&new_request(Uuid::new_v4(), vec![Platform::Etsy]))
            .await
            .unwrap();
        assert!(store.begin_processing(row.id).await.unwrap());
        let done = RequestFinalization {
            status: RequestStatus::Completed,
            results: Some(vec![]),
            error_message: None,
            completed_at: Utc::now(),
        };
        assert!(store.finalize_request(row.id, &done).await.unwrap());
        assert!(!store.begin_processing(row.id).await.unwrap());
        assert!(!store.finalize_request(row.id, &done).await.unwrap());
        let stored = store.fetch_request(row.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Completed);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn history_filters_by_platform_and_pages() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        for _ in 0..3 {
            store
                .insert_request(&new_request(user, vec![Platform::Ebay, Platform::Etsy]))
                .await
                .unwrap();
        }
        store
            .insert_request(&new_request(user, vec![Platform::Depop]))
            .await
            .unwrap();
        store
            .insert_request(&new_request(Uuid::new_v4(), vec![Platform::Etsy]))
            .await
            .unwrap();

        let query = HistoryQuery {
            page: 2,
            limit: 2,
            platform: Some(Platform::Etsy),
            sort_order: SortOrder::Asc,
            ..HistoryQuery::default()
        };
        let page = store.list_requests(user, &query).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.requests.len(), 1);
        assert_eq!(store.status_counts(user).await.unwrap().pending, 4);
    }

    fn stored(user_id: Uuid, status: RequestStatus, finished_minutes_ago: Option<i64>) -> CrossListingRequest {
        CrossListingRequest {
            id: Uuid::new_v4(),
            user_id,
            source_platform: Platform::Ebay,
            target_platforms: vec![Platform::Etsy],
            inventory_items: vec![Uuid::new_v4()],
            status,
            optimize_seo: true,
            generate_descriptions: false,
            results: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: finished_minutes_ago.map(|m| Utc::now() - chrono::Duration::minutes(m)),
        }
    }

    #[tokio::test]
    async fn history_sorts_by_status_and_completion() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let pending = stored(user, RequestStatus::Pending, None);
        let failed = stored(user, RequestStatus::Failed, Some(5));
        let completed_early = stored(user, RequestStatus::Completed, Some(30));
        let completed_late = stored(user, RequestStatus::Completed, Some(1));
        for row in [&pending, &failed, &completed_early, &completed_late] {
            store.put_request(row.clone()).await;
        }

        let by_status = HistoryQuery {
            sort_by: SortField::Status,
            sort_order: SortOrder::Desc,
            ..HistoryQuery::default()
        };
        let page = store.list_requests(user, &by_status).await.unwrap();
        let statuses: Vec<RequestStatus> = page.requests.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                RequestStatus::Pending,
                RequestStatus::Failed,
                RequestStatus::Completed,
                RequestStatus::Completed,
            ]
        );

        let by_completion = HistoryQuery {
            sort_by: SortField::CompletedAt,
            sort_order: SortOrder::Asc,
            ..HistoryQuery::default()
        };
        let page = store.list_requests(user, &by_completion).await.unwrap();
        let ids: Vec<Uuid> = page.requests.iter().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec![pending.id, completed_early.id, failed.id, completed_late.id]
        );
    }

    #[tokio::test]
    async fn history_filters_by_status() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        for status in [
            RequestStatus::Completed,
            RequestStatus::Failed,
            RequestStatus::Completed,
        ] {
            store.put_request(stored(user, status, Some(1))).await;
        }
        store
            .put_request(stored(Uuid::new_v4(), RequestStatus::Completed, Some(1)))
            .await;

        let query = HistoryQuery {
            status: Some(RequestStatus::Completed),
            ..HistoryQuery::default()
        };
        let page = store.list_requests(user, &query).await.unwrap();
        assert_eq!(page.total, 2);
        assert!(page.requests.iter().all(|r| r.status == RequestStatus::Completed));
    }
}

//! Drives one request from `pending` to a terminal state.
//!
//! Every (item, platform) pair is keyed by the listing it produced, so a
//! crashed or repeated run picks up where the previous one stopped instead of
//! publishing twice.

use super::recorder::Recorder;
use crate::error::CrossListError;
use crate::metrics;
use crate::models::{
    CrossListingRequest, CrossListingResult, InventoryItem, NewMarketplaceListing, RequestStatus,
    ResultStatus,
};
use crate::platforms::Platform;
use crate::publisher::{PublishInput, PublisherRegistry};
use crate::store::{Store, StoreError};
use chrono::Utc;
use std::{collections::HashMap, sync::Arc, time::Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub request_id: Uuid,
    pub status: RequestStatus,
    pub results: Vec<CrossListingResult>,
    pub skipped_items: usize,
}

impl ProcessingOutcome {
    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|result| result.status == ResultStatus::Success)
            .count()
    }
}

#[derive(Clone)]
pub struct ListingProcessor {
    store: Arc<dyn Store>,
    publishers: Arc<PublisherRegistry>,
    recorder: Recorder,
}

impl ListingProcessor {
    pub fn new(store: Arc<dyn Store>, publishers: Arc<PublisherRegistry>) -> Self {
        let recorder = Recorder::new(store.clone());
        Self {
            store,
            publishers,
            recorder,
        }
    }

    pub async fn process(&self, request_id: Uuid) -> Result<ProcessingOutcome, CrossListError> {
        let started = self
            .store
            .begin_processing(request_id)
            .await
            .map_err(|err| CrossListError::internal("request_start_failed", err.to_string()))?;
        if !started {
            return Err(self.not_processable(request_id).await);
        }
        info!(target = "crosslist.processor", request_id = %request_id, "processing_started");

        match self.run_batch(request_id).await {
            Ok((results, skipped_items)) => {
                self.recorder
                    .finalize(
                        request_id,
                        RequestStatus::Completed,
                        Some(results.clone()),
                        None,
                    )
                    .await?;
                let outcome = ProcessingOutcome {
                    request_id,
                    status: RequestStatus::Completed,
                    results,
                    skipped_items,
                };
                info!(
                    target = "crosslist.processor",
                    request_id = %request_id,
                    attempted = outcome.results.len(),
                    succeeded = outcome.succeeded(),
                    skipped_items,
                    "processing_completed"
                );
                Ok(outcome)
            }
            Err(err) => {
                error!(
                    target = "crosslist.processor",
                    request_id = %request_id,
                    code = err.code(),
                    error = %err.detail(),
                    "processing_failed"
                );
                self.recorder
                    .finalize(
                        request_id,
                        RequestStatus::Failed,
                        None,
                        Some(format!("Cross-listing processing failed ({})", err.code())),
                    )
                    .await?;
                Ok(ProcessingOutcome {
                    request_id,
                    status: RequestStatus::Failed,
                    results: Vec::new(),
                    skipped_items: 0,
                })
            }
        }
    }

    /// Finishes whatever a previous process left `pending` or `in_progress`,
    /// one request after another on a background task. Returns how many
    /// requests were picked up.
    pub async fn resume_unfinished(&self) -> Result<usize, StoreError> {
        let unfinished = self.store.unfinished_requests().await?;
        let count = unfinished.len();
        if count == 0 {
            return Ok(0);
        }
        info!(target = "crosslist.processor", count, "resuming_unfinished_requests");
        let processor = self.clone();
        tokio::spawn(async move {
            for request_id in unfinished {
                if let Err(err) = processor.process(request_id).await {
                    warn!(
                        target = "crosslist.processor",
                        request_id = %request_id,
                        code = err.code(),
                        "resume_rejected"
                    );
                }
            }
        });
        Ok(count)
    }

    async fn not_processable(&self, request_id: Uuid) -> CrossListError {
        match self.store.fetch_request(request_id).await {
            Ok(Some(request)) => CrossListError::validation(
                "request_already_finalized",
                format!(
                    "Request {request_id} is already {}",
                    request.status.as_str()
                ),
            ),
            Ok(None) => CrossListError::not_found(
                "request_not_found",
                format!("Request {request_id} not found"),
            ),
            Err(err) => CrossListError::internal("request_lookup_failed", err.to_string()),
        }
    }

    async fn run_batch(
        &self,
        request_id: Uuid,
    ) -> Result<(Vec<CrossListingResult>, usize), CrossListError> {
        let request = self
            .store
            .fetch_request(request_id)
            .await
            .map_err(|err| CrossListError::internal("request_refetch_failed", err.to_string()))?
            .ok_or_else(|| {
                CrossListError::internal("request_vanished", format!("request {request_id} disappeared"))
            })?;
        let items: HashMap<Uuid, InventoryItem> = self
            .store
            .fetch_inventory_items(request.user_id, &request.inventory_items)
            .await
            .map_err(|err| CrossListError::internal("inventory_refetch_failed", err.to_string()))?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        let mut results = Vec::with_capacity(request.pair_count());
        let mut skipped_items = 0;
        for item_id in &request.inventory_items {
            let Some(item) = items.get(item_id) else {
                skipped_items += 1;
                warn!(
                    target = "crosslist.processor",
                    request_id = %request.id,
                    item_id = %item_id,
                    "inventory_item_vanished"
                );
                continue;
            };
            for platform in &request.target_platforms {
                results.push(self.process_pair(&request, item, *platform).await);
            }
        }
        Ok((results, skipped_items))
    }

    async fn process_pair(
        &self,
        request: &CrossListingRequest,
        item: &InventoryItem,
        platform: Platform,
    ) -> CrossListingResult {
        match self.store.find_listing(request.id, item.id, platform).await {
            Ok(Some(existing)) => {
                debug!(
                    target = "crosslist.processor",
                    request_id = %request.id,
                    item_id = %item.id,
                    platform = %platform,
                    "listing_reused"
                );
                return CrossListingResult::success(item.id, &existing);
            }
            Ok(None) => {}
            Err(err) => {
                return CrossListingResult::failed(
                    item.id,
                    platform,
                    format!("Could not check existing listings: {err}"),
                );
            }
        }

        let publisher = match self.publishers.get(platform) {
            Ok(publisher) => publisher,
            Err(err) => return CrossListingResult::failed(item.id, platform, err.to_string()),
        };
        let input = PublishInput {
            item,
            platform,
            optimize_seo: request.optimize_seo,
            generate_descriptions: request.generate_descriptions,
        };
        let started = Instant::now();
        let published = publisher.publish(&input).await;
        metrics::pair_elapsed(platform.as_str(), started.elapsed().as_millis());
        let published = match published {
            Ok(published) => published,
            Err(err) => {
                warn!(
                    target = "crosslist.processor",
                    request_id = %request.id,
                    item_id = %item.id,
                    platform = %platform,
                    error = %err,
                    "publish_failed"
                );
                return CrossListingResult::failed(item.id, platform, err.to_string());
            }
        };

        let row = NewMarketplaceListing {
            user_id: request.user_id,
            inventory_item_id: item.id,
            cross_listing_request_id: request.id,
            platform,
            platform_listing_id: published.platform_listing_id,
            title: published.title,
            description: published.description,
            price: published.price,
            quantity: item.quantity_available.min(1),
            view_url: published.view_url,
            listing_date: Utc::now(),
        };
        match self.store.insert_listing(&row).await {
            Ok(listing) => CrossListingResult::success(item.id, &listing),
            Err(err) => {
                warn!(
                    target = "crosslist.processor",
                    request_id = %request.id,
                    item_id = %item.id,
                    platform = %platform,
                    error = %err,
                    "listing_write_failed"
                );
                CrossListingResult::failed(
                    item.id,
                    platform,
                    format!("Failed to record listing: {err}"),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crosslisting::fixtures;
    use crate::models::{NewCrossListingRequest, SubscriptionTier};
    use crate::platforms::listed_price;
    use crate::store::MemoryStore;

    async fn pending_request(
        store: &MemoryStore,
        user_id: Uuid,
        items: &[Uuid],
        targets: Vec<Platform>,
    ) -> CrossListingRequest {
        store
            .insert_request(&NewCrossListingRequest {
                user_id,
                source_platform: Platform::Ebay,
                target_platforms: targets,
                inventory_items: items.to_vec(),
                optimize_seo: true,
                generate_descriptions: false,
            })
            .await
            .unwrap()
    }

    fn processor(store: &MemoryStore, failure_rate: f64) -> ListingProcessor {
        ListingProcessor::new(Arc::new(store.clone()), fixtures::registry(failure_rate))
    }

    #[tokio::test]
    async fn completes_every_pair_in_input_order() {
        let user = fixtures::user(SubscriptionTier::Professional);
        let (store, items) = fixtures::seeded_store(&user, 2).await;
        let request =
            pending_request(&store, user.id, &items, vec![Platform::Ebay, Platform::Etsy]).await;

        let outcome = processor(&store, 0.0).process(request.id).await.unwrap();
        assert_eq!(outcome.status, RequestStatus::Completed);
        let order: Vec<(Uuid, Platform)> = outcome
            .results
            .iter()
            .map(|r| (r.item_id, r.platform))
            .collect();
        assert_eq!(
            order,
            vec![
                (items[0], Platform::Ebay),
                (items[0], Platform::Etsy),
                (items[1], Platform::Ebay),
                (items[1], Platform::Etsy),
            ]
        );
        assert_eq!(outcome.succeeded(), 4);
        assert_eq!(store.finalize_calls(request.id).await, 1);

        let listings = store.listings().await;
        assert_eq!(listings.len(), 4);
        for listing in &listings {
            assert_eq!(listing.price, listed_price(100.0, listing.platform));
            assert_eq!(listing.quantity, 1);
            assert_eq!(listing.status, "active");
        }

        let row = store.fetch_request(request.id).await.unwrap().unwrap();
        assert_eq!(row.status, RequestStatus::Completed);
        assert_eq!(row.results.as_ref().map(Vec::len), Some(4));
        assert!(row.completed_at.is_some());
        assert!(row.error_message.is_none());
    }

    #[tokio::test]
    async fn publisher_failures_are_recorded_not_fatal() {
        let user = fixtures::user(SubscriptionTier::Starter);
        let (store, items) = fixtures::seeded_store(&user, 1).await;
        let request =
            pending_request(&store, user.id, &items, vec![Platform::Depop, Platform::Mercari]).await;

        let outcome = processor(&store, 1.0).process(request.id).await.unwrap();
        assert_eq!(outcome.status, RequestStatus::Completed);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| r.status == ResultStatus::Failed
            && r.error.as_deref().is_some_and(|e| e.contains("temporarily unavailable"))));
        assert!(store.listings().await.is_empty());
    }

    #[tokio::test]
    async fn vanished_items_are_skipped() {
        let user = fixtures::user(SubscriptionTier::Starter);
        let (store, items) = fixtures::seeded_store(&user, 2).await;
        let request =
            pending_request(&store, user.id, &items, vec![Platform::Ebay, Platform::Etsy]).await;
        store.remove_inventory_item(items[0]).await;

        let outcome = processor(&store, 0.0).process(request.id).await.unwrap();
        assert_eq!(outcome.skipped_items, 1);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| r.item_id == items[1]));
    }

    #[tokio::test]
    async fn listing_write_failure_marks_pair_failed() {
        let user = fixtures::user(SubscriptionTier::Starter);
        let (store, items) = fixtures::seeded_store(&user, 1).await;
        let request = pending_request(&store, user.id, &items, vec![Platform::Etsy]).await;
        store.fail_listing_inserts(true);

        let outcome = processor(&store, 0.0).process(request.id).await.unwrap();
        assert_eq!(outcome.status, RequestStatus::Completed);
        let result = &outcome.results[0];
        assert_eq!(result.status, ResultStatus::Failed);
        assert!(result.error.as_deref().unwrap().starts_with("Failed to record listing"));
    }

    #[tokio::test]
    async fn refetch_failure_fails_whole_request() {
        let user = fixtures::user(SubscriptionTier::Starter);
        let (store, items) = fixtures::seeded_store(&user, 1).await;
        let request = pending_request(&store, user.id, &items, vec![Platform::Etsy]).await;
        store.fail_request_fetches(true);

        let outcome = processor(&store, 0.0).process(request.id).await.unwrap();
        assert_eq!(outcome.status, RequestStatus::Failed);
        store.fail_request_fetches(false);

        let row = store.fetch_request(request.id).await.unwrap().unwrap();
        assert_eq!(row.status, RequestStatus::Failed);
        assert!(row.results.is_none());
        assert!(row.error_message.unwrap().contains("request_refetch_failed"));
        assert_eq!(store.finalize_calls(request.id).await, 1);
        assert!(store.listings().await.is_empty());
    }

    #[tokio::test]
    async fn resumed_run_reuses_existing_listings() {
        let user = fixtures::user(SubscriptionTier::Starter);
        let (store, items) = fixtures::seeded_store(&user, 1).await;
        let request =
            pending_request(&store, user.id, &items, vec![Platform::Ebay, Platform::Etsy]).await;

        // Simulate a run that crashed after the first pair was written.
        assert!(store.begin_processing(request.id).await.unwrap());
        let earlier = store
            .insert_listing(&NewMarketplaceListing {
                user_id: user.id,
                inventory_item_id: items[0],
                cross_listing_request_id: request.id,
                platform: Platform::Ebay,
                platform_listing_id: "EBAY-EARLIER".into(),
                title: "t".into(),
                description: String::new(),
                price: 115.0,
                quantity: 1,
                view_url: "https://www.ebay.com/itm/EBAY-EARLIER".into(),
                listing_date: Utc::now(),
            })
            .await
            .unwrap();

        let outcome = processor(&store, 0.0).process(request.id).await.unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].listing_id, Some(earlier.id));
        assert_eq!(store.listings().await.len(), 2);
    }

    #[tokio::test]
    async fn terminal_requests_are_not_reprocessed() {
        let user = fixtures::user(SubscriptionTier::Starter);
        let (store, items) = fixtures::seeded_store(&user, 1).await;
        let request = pending_request(&store, user.id, &items, vec![Platform::Etsy]).await;
        let processor = processor(&store, 0.0);

        processor.process(request.id).await.unwrap();
        let err = processor.process(request.id).await.unwrap_err();
        assert_eq!(err.code(), "request_already_finalized");
        assert_eq!(store.listings().await.len(), 1);
        assert_eq!(store.finalize_calls(request.id).await, 1);

        let err = processor.process(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "request_not_found");
    }

    #[tokio::test]
    async fn resume_finishes_stranded_requests() {
        let user = fixtures::user(SubscriptionTier::Starter);
        let (store, items) = fixtures::seeded_store(&user, 1).await;
        let stranded = pending_request(&store, user.id, &items, vec![Platform::Depop]).await;
        assert!(store.begin_processing(stranded.id).await.unwrap());
        let queued = pending_request(&store, user.id, &items, vec![Platform::Etsy]).await;

        assert_eq!(processor(&store, 0.0).resume_unfinished().await.unwrap(), 2);
        for _ in 0..100 {
            if store.unfinished_requests().await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        for id in [stranded.id, queued.id] {
            let row = store.fetch_request(id).await.unwrap().unwrap();
            assert_eq!(row.status, RequestStatus::Completed);
            assert_eq!(store.finalize_calls(id).await, 1);
        }
        assert_eq!(processor(&store, 0.0).resume_unfinished().await.unwrap(), 0);
    }
}

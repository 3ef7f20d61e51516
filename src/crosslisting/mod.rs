//! Cross-listing workflow: validate, check entitlement, record, process, report.

pub mod entitlement;
pub mod processor;
pub mod recorder;
pub mod reporter;
pub mod validator;

#[cfg(test)]
pub(crate) mod fixtures;

use crate::error::CrossListError;
use crate::jobs::JobQueue;
use crate::models::{
    AuthUser, CreateCrossListingPayload, CreateCrossListingResponse, HistoryResponse,
    RequestStatus, StatusResponse,
};
use crate::publisher::PublisherRegistry;
use crate::store::{Store, StoreError};
use chrono::{Duration, Utc};
use entitlement::{EntitlementSnapshot, month_start};
use std::sync::Arc;
use tracing::{error, info, warn};

pub use processor::ListingProcessor;
pub use recorder::Recorder;
pub use reporter::HistoryParams;

/// Rough per-pair publishing time used for `estimatedCompletionTime`.
const SECONDS_PER_PAIR: i64 = 3;

/// How a freshly recorded request gets processed.
#[derive(Clone)]
pub enum Dispatch {
    Inline,
    Queued(JobQueue),
}

#[derive(Clone)]
pub struct CrossListingService {
    store: Arc<dyn Store>,
    processor: ListingProcessor,
    recorder: Recorder,
    require_credentials: bool,
    dispatch: Dispatch,
}

fn store_failure(err: StoreError) -> CrossListError {
    CrossListError::internal("store_read_failed", err.to_string())
}

impl CrossListingService {
    pub fn new(
        store: Arc<dyn Store>,
        publishers: Arc<PublisherRegistry>,
        require_credentials: bool,
    ) -> Self {
        Self {
            processor: ListingProcessor::new(store.clone(), publishers),
            recorder: Recorder::new(store.clone()),
            store,
            require_credentials,
            dispatch: Dispatch::Inline,
        }
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn processor(&self) -> ListingProcessor {
        self.processor.clone()
    }

    pub async fn create(
        &self,
        user: &AuthUser,
        payload: &CreateCrossListingPayload,
    ) -> Result<CreateCrossListingResponse, CrossListError> {
        let validated = validator::validate_payload(payload)?;
        entitlement::check_subscription(user)?;

        let active_platforms = if self.require_credentials {
            self.store
                .active_credential_platforms(user.id)
                .await
                .map_err(store_failure)?
        } else {
            Vec::new()
        };
        let monthly_requests = self
            .store
            .count_requests_since(user.id, month_start(Utc::now()))
            .await
            .map_err(store_failure)?;
        let snapshot = EntitlementSnapshot {
            active_platforms,
            monthly_requests,
        };
        entitlement::check_entitlement(
            user,
            &snapshot,
            &validated.target_platforms,
            self.require_credentials,
        )?;

        let items = self
            .store
            .fetch_inventory_items(user.id, &validated.inventory_items)
            .await
            .map_err(store_failure)?;
        validator::validate_items(&validated.inventory_items, &items)?;

        let request = self.recorder.create(user.id, &validated).await?;
        let estimated_completion_time =
            request.created_at + Duration::seconds(request.pair_count() as i64 * SECONDS_PER_PAIR);

        match &self.dispatch {
            Dispatch::Inline => {
                // Own task: a dropped connection must not cancel a batch mid-way.
                let processor = self.processor.clone();
                let request_id = request.id;
                match tokio::spawn(async move { processor.process(request_id).await }).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => warn!(
                        target = "crosslist.processor",
                        request_id = %request.id,
                        error = %err,
                        "inline_processing_error"
                    ),
                    Err(err) => error!(
                        target = "crosslist.processor",
                        request_id = %request.id,
                        error = %err,
                        "inline_processing_aborted"
                    ),
                }
            }
            Dispatch::Queued(queue) => {
                if let Err(err) = queue.enqueue(request.id).await {
                    // The row stays pending and the startup sweep picks it up.
                    warn!(
                        target = "crosslist.jobs",
                        request_id = %request.id,
                        error = %err,
                        "enqueue_failed"
                    );
                }
            }
        }
        info!(
            target = "crosslist.api",
            request_id = %request.id,
            user_id = %user.id,
            "crosslisting_created"
        );

        Ok(CreateCrossListingResponse {
            request_id: request.id,
            status: RequestStatus::Pending,
            estimated_completion_time,
        })
    }

    pub async fn status(
        &self,
        user: &AuthUser,
        request_id: Option<&str>,
    ) -> Result<StatusResponse, CrossListError> {
        reporter::request_status(self.store.as_ref(), user, request_id).await
    }

    pub async fn history(
        &self,
        user: &AuthUser,
        params: HistoryParams,
    ) -> Result<HistoryResponse, CrossListError> {
        let query = params.into_query()?;
        reporter::history(self.store.as_ref(), user, &query).await
    }
}

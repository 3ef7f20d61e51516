use super::validator::ValidatedRequest;
use crate::error::CrossListError;
use crate::metrics;
use crate::models::{
    CrossListingRequest, CrossListingResult, NewCrossListingRequest, RequestFinalization,
    RequestStatus,
};
use crate::store::Store;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Owns the two writes that bracket a request's life: the `pending` insert
/// and the terminal update.
#[derive(Clone)]
pub struct Recorder {
    store: Arc<dyn Store>,
}

impl Recorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        request: &ValidatedRequest,
    ) -> Result<CrossListingRequest, CrossListError> {
        let row = NewCrossListingRequest {
            user_id,
            source_platform: request.source_platform,
            target_platforms: request.target_platforms.clone(),
            inventory_items: request.inventory_items.clone(),
            optimize_seo: request.optimize_seo,
            generate_descriptions: request.generate_descriptions,
        };
        let created = self
            .store
            .insert_request(&row)
            .await
            .map_err(|err| CrossListError::internal("request_write_failed", err.to_string()))?;
        info!(
            target = "crosslist.store",
            request_id = %created.id,
            user_id = %user_id,
            pairs = created.pair_count(),
            "request_recorded"
        );
        Ok(created)
    }

    /// Returns `false` when the row was no longer `in_progress`.
    pub async fn finalize(
        &self,
        id: Uuid,
        status: RequestStatus,
        results: Option<Vec<CrossListingResult>>,
        error_message: Option<String>,
    ) -> Result<bool, CrossListError> {
        let update = RequestFinalization {
            status,
            results,
            error_message,
            completed_at: Utc::now(),
        };
        let applied = self
            .store
            .finalize_request(id, &update)
            .await
            .map_err(|err| CrossListError::internal("request_finalize_failed", err.to_string()))?;
        if applied {
            metrics::request_finalized(status.as_str());
            info!(target = "crosslist.store", request_id = %id, status = status.as_str(), "request_finalized");
        } else {
            warn!(target = "crosslist.store", request_id = %id, "finalize_skipped_not_in_progress");
        }
        Ok(applied)
    }
}

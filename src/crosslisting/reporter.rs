use super::entitlement::month_start;
use crate::error::CrossListError;
use crate::models::{
    AuthUser, HistoryQuery, HistoryResponse, MonthlyUsage, Pagination, RequestStatus,
    RequestStatusView, SortField, SortOrder, StatusResponse,
};
use crate::platforms::Platform;
use crate::store::{Store, StoreError};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

pub const MAX_PAGE_SIZE: u32 = 100;

fn store_failure(err: StoreError) -> CrossListError {
    CrossListError::internal("store_read_failed", err.to_string())
}

/// Raw `/crosslisting/history` query string. Values stay strings so bad input
/// maps to a validation error with a useful code.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    pub platform: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl HistoryParams {
    pub fn into_query(self) -> Result<HistoryQuery, CrossListError> {
        let defaults = HistoryQuery::default();
        let page = match non_blank(self.page.as_deref()) {
            Some(raw) => parse_number(raw, "page")?.max(1),
            None => defaults.page,
        };
        let limit = match non_blank(self.limit.as_deref()) {
            Some(raw) => parse_number(raw, "limit")?.clamp(1, MAX_PAGE_SIZE),
            None => defaults.limit,
        };
        let status = non_blank(self.status.as_deref())
            .map(|raw| {
                RequestStatus::parse(raw).ok_or_else(|| {
                    CrossListError::validation("invalid_status", format!("Unknown status: {raw}"))
                })
            })
            .transpose()?;
        let platform = non_blank(self.platform.as_deref())
            .map(|raw| {
                Platform::parse(raw).ok_or_else(|| {
                    CrossListError::validation("invalid_platform", format!("Unknown platform: {raw}"))
                })
            })
            .transpose()?;
        let sort_by = match non_blank(self.sort_by.as_deref()) {
            Some(raw) => SortField::parse(raw).ok_or_else(|| {
                CrossListError::validation(
                    "invalid_sort",
                    format!("sortBy must be one of createdAt, completedAt, status; got {raw}"),
                )
            })?,
            None => defaults.sort_by,
        };
        let sort_order = match non_blank(self.sort_order.as_deref()) {
            Some(raw) => SortOrder::parse(raw).ok_or_else(|| {
                CrossListError::validation(
                    "invalid_sort",
                    format!("sortOrder must be asc or desc; got {raw}"),
                )
            })?,
            None => defaults.sort_order,
        };
        Ok(HistoryQuery {
            page,
            limit,
            status,
            platform,
            sort_by,
            sort_order,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number(raw: &str, field: &str) -> Result<u32, CrossListError> {
    raw.parse::<u32>().map_err(|_| {
        CrossListError::validation(
            "invalid_pagination",
            format!("{field} must be a positive integer; got {raw}"),
        )
    })
}

pub async fn request_status(
    store: &dyn Store,
    user: &AuthUser,
    request_id: Option<&str>,
) -> Result<StatusResponse, CrossListError> {
    let raw = non_blank(request_id).ok_or_else(|| {
        CrossListError::validation("missing_request_id", "requestId query parameter is required")
    })?;
    let id = Uuid::parse_str(raw).map_err(|_| {
        CrossListError::validation("invalid_request_id", format!("Invalid requestId: {raw}"))
    })?;
    let request = store
        .fetch_user_request(user.id, id)
        .await
        .map_err(store_failure)?
        .ok_or_else(|| {
            CrossListError::not_found("request_not_found", "Cross-listing request not found")
        })?;

    let listings = if request.status == RequestStatus::Completed {
        let ids = request.listing_ids();
        if ids.is_empty() {
            Vec::new()
        } else {
            store
                .fetch_listings(user.id, &ids)
                .await
                .map_err(store_failure)?
        }
    } else {
        Vec::new()
    };
    Ok(StatusResponse {
        request: RequestStatusView {
            progress: request.status.progress(),
            request,
        },
        listings,
    })
}

pub async fn history(
    store: &dyn Store,
    user: &AuthUser,
    query: &HistoryQuery,
) -> Result<HistoryResponse, CrossListError> {
    let page = store
        .list_requests(user.id, query)
        .await
        .map_err(store_failure)?;
    let statistics = store.status_counts(user.id).await.map_err(store_failure)?;
    let used = store
        .count_requests_since(user.id, month_start(Utc::now()))
        .await
        .map_err(store_failure)?;
    let limit = user.subscription_tier.monthly_quota();
    Ok(HistoryResponse {
        requests: page.requests,
        pagination: Pagination::new(query.page, query.limit, page.total),
        statistics,
        monthly_usage: MonthlyUsage {
            used,
            limit,
            remaining: limit.saturating_sub(used),
            tier: user.subscription_tier,
        },
    })
}

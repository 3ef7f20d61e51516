use crate::platforms::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Trial,
    Starter,
    Professional,
    Enterprise,
}

impl SubscriptionTier {
    /// Cross-listing requests allowed per calendar month.
    pub fn monthly_quota(&self) -> u64 {
        match self {
            SubscriptionTier::Trial => 5,
            SubscriptionTier::Starter => 25,
            SubscriptionTier::Professional => 100,
            SubscriptionTier::Enterprise => 1000,
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "trial" => Some(SubscriptionTier::Trial),
            "starter" => Some(SubscriptionTier::Starter),
            "professional" => Some(SubscriptionTier::Professional),
            "enterprise" => Some(SubscriptionTier::Enterprise),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Unpaid,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "active" => Some(SubscriptionStatus::Active),
            "trialing" => Some(SubscriptionStatus::Trialing),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" | "cancelled" => Some(SubscriptionStatus::Canceled),
            "unpaid" => Some(SubscriptionStatus::Unpaid),
            "incomplete" => Some(SubscriptionStatus::Incomplete),
            _ => None,
        }
    }

    pub fn allows_crosslisting(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

/// Caller identity resolved from the bearer token.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: Uuid,
    pub subscription_tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "pending" => Some(RequestStatus::Pending),
            "in_progress" => Some(RequestStatus::InProgress),
            "completed" => Some(RequestStatus::Completed),
            "failed" => Some(RequestStatus::Failed),
            "cancelled" => Some(RequestStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Failed | RequestStatus::Cancelled
        )
    }

    pub fn progress(&self) -> u8 {
        match self {
            RequestStatus::Completed => 100,
            RequestStatus::InProgress => 50,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrossListingRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_platform: Platform,
    pub target_platforms: Vec<Platform>,
    pub inventory_items: Vec<Uuid>,
    pub status: RequestStatus,
    #[serde(rename = "optimizeSEO")]
    pub optimize_seo: bool,
    pub generate_descriptions: bool,
    pub results: Option<Vec<CrossListingResult>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CrossListingRequest {
    pub fn pair_count(&self) -> usize {
        self.inventory_items.len() * self.target_platforms.len()
    }

    /// Listing ids referenced by successful results.
    pub fn listing_ids(&self) -> Vec<Uuid> {
        self.results
            .iter()
            .flatten()
            .filter(|result| result.status == ResultStatus::Success)
            .filter_map(|result| result.listing_id)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct NewCrossListingRequest {
    pub user_id: Uuid,
    pub source_platform: Platform,
    pub target_platforms: Vec<Platform>,
    pub inventory_items: Vec<Uuid>,
    pub optimize_seo: bool,
    pub generate_descriptions: bool,
}

#[derive(Debug, Clone)]
pub struct RequestFinalization {
    pub status: RequestStatus,
    pub results: Option<Vec<CrossListingResult>>,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Failed,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrossListingResult {
    pub item_id: Uuid,
    pub platform: Platform,
    pub status: ResultStatus,
    #[serde(default)]
    pub listing_id: Option<Uuid>,
    #[serde(default)]
    pub platform_listing_id: Option<String>,
    #[serde(default)]
    pub view_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CrossListingResult {
    pub fn success(item_id: Uuid, listing: &MarketplaceListing) -> Self {
        Self {
            item_id,
            platform: listing.platform,
            status: ResultStatus::Success,
            listing_id: Some(listing.id),
            platform_listing_id: Some(listing.platform_listing_id.clone()),
            view_url: Some(listing.view_url.clone()),
            error: None,
        }
    }

    pub fn failed(item_id: Uuid, platform: Platform, error: impl Into<String>) -> Self {
        Self {
            item_id,
            platform,
            status: ResultStatus::Failed,
            listing_id: None,
            platform_listing_id: None,
            view_url: None,
            error: Some(error.into()),
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    pub retail_price: f64,
    pub quantity_available: i32,
    pub status: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl InventoryItem {
    pub fn is_listable(&self) -> bool {
        matches!(self.status.as_str(), "active" | "draft")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceListing {
    pub id: Uuid,
    pub user_id: Uuid,
    pub inventory_item_id: Uuid,
    pub cross_listing_request_id: Option<Uuid>,
    pub platform: Platform,
    pub platform_listing_id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub status: String,
    pub quantity: i32,
    pub view_url: String,
    pub listing_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMarketplaceListing {
    pub user_id: Uuid,
    pub inventory_item_id: Uuid,
    pub cross_listing_request_id: Uuid,
    pub platform: Platform,
    pub platform_listing_id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub quantity: i32,
    pub view_url: String,
    pub listing_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    CompletedAt,
    Status,
}

impl SortField {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "createdAt" | "created_at" => Some(SortField::CreatedAt),
            "completedAt" | "completed_at" => Some(SortField::CompletedAt),
            "status" => Some(SortField::Status),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::CompletedAt => "completed_at",
            SortField::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub page: u32,
    pub limit: u32,
    pub status: Option<RequestStatus>,
    pub platform: Option<Platform>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl HistoryQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            status: None,
            platform: None,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestPage {
    pub requests: Vec<CrossListingRequest>,
    pub total: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub pending: u64,
    pub in_progress: u64,
}

impl StatusCounts {
    pub fn tally<'a>(statuses: impl IntoIterator<Item = &'a RequestStatus>) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            counts.total += 1;
            match status {
                RequestStatus::Completed => counts.completed += 1,
                RequestStatus::Failed => counts.failed += 1,
                RequestStatus::Pending => counts.pending += 1,
                RequestStatus::InProgress => counts.in_progress += 1,
                RequestStatus::Cancelled => {}
            }
        }
        counts
    }
}

// -------- HTTP payloads --------

/// Body of `POST /crosslisting/create`. Fields stay loosely typed so missing
/// and unknown values surface as validation errors instead of decode failures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCrossListingPayload {
    #[serde(default)]
    pub source_platform: Option<String>,
    #[serde(default)]
    pub target_platforms: Option<Vec<String>>,
    #[serde(default)]
    pub inventory_items: Option<Vec<String>>,
    #[serde(default, rename = "optimizeSEO", alias = "optimizeSeo")]
    pub optimize_seo: Option<bool>,
    #[serde(default)]
    pub generate_descriptions: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCrossListingResponse {
    pub request_id: Uuid,
    pub status: RequestStatus,
    pub estimated_completion_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatusView {
    #[serde(flatten)]
    pub request: CrossListingRequest,
    pub progress: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub request: RequestStatusView,
    pub listings: Vec<MarketplaceListing>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit))
        };
        Self {
            page,
            limit,
            total,
            total_pages,
            has_more: u64::from(page) < total_pages,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyUsage {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    pub tier: SubscriptionTier,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub requests: Vec<CrossListingRequest>,
    pub pagination: Pagination,
    pub statistics: StatusCounts,
    pub monthly_usage: MonthlyUsage,
}

/// `{ success, data?, error? }` envelope every endpoint answers with.
#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiErrorBody>,
}

impl<T: Serialize> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiEnvelope<()> {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiErrorBody {
                message: message.into(),
                code: code.into(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub message: String,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_reads_camel_case_and_seo_flag() {
        let payload: CreateCrossListingPayload = serde_json::from_value(serde_json::json!({
            "sourcePlatform": "ebay",
            "targetPlatforms": ["etsy"],
            "inventoryItems": ["4a3c1f2e-0000-4000-8000-000000000001"],
            "optimizeSEO": false,
        }))
        .expect("payload");
        assert_eq!(payload.optimize_seo, Some(false));
        assert_eq!(payload.generate_descriptions, None);
        assert_eq!(payload.target_platforms.unwrap(), vec!["etsy".to_string()]);
    }

    #[test]
    fn pagination_counts_pages() {
        let page = Pagination::new(1, 20, 41);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_more);
        let last = Pagination::new(3, 20, 41);
        assert!(!last.has_more);
        assert_eq!(Pagination::new(1, 20, 0).total_pages, 0);
    }

    #[test]
    fn status_counts_bucket_statuses() {
        let statuses = [
            RequestStatus::Completed,
            RequestStatus::Completed,
            RequestStatus::Failed,
            RequestStatus::InProgress,
            RequestStatus::Cancelled,
        ];
        let counts = StatusCounts::tally(statuses.iter());
        assert_eq!(counts.total, 5);
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.pending, 0);
    }

    #[test]
    fn request_serializes_seo_flag_name() {
        let request = CrossListingRequest {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            source_platform: Platform::Ebay,
            target_platforms: vec![Platform::Etsy],
            inventory_items: vec![],
            status: RequestStatus::InProgress,
            optimize_seo: true,
            generate_descriptions: false,
            results: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["optimizeSEO"], serde_json::json!(true));
        assert_eq!(value["status"], serde_json::json!("in_progress"));
        assert_eq!(value["targetPlatforms"], serde_json::json!(["etsy"]));
    }
}

use super::{Store, StoreError};
use crate::http::build_client;
use crate::models::{
    CrossListingRequest, CrossListingResult, HistoryQuery, InventoryItem, MarketplaceListing,
    NewCrossListingRequest, NewMarketplaceListing, RequestFinalization, RequestPage,
    RequestStatus, SortOrder, StatusCounts, SubscriptionStatus, SubscriptionTier,
};
use crate::platforms::Platform;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, header::CONTENT_RANGE};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::debug;
use urlencoding::encode;
use uuid::Uuid;

const REQUESTS: &str = "cross_listing_requests";
const ITEMS: &str = "inventory_items";
const LISTINGS: &str = "marketplace_listings";
const CREDENTIALS: &str = "platform_credentials";
const USERS: &str = "users";

#[derive(Debug, Clone)]
pub struct SupabaseClient {
    base_url: String,
    service_key: String,
    http: Client,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUserRecord {
    pub id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionRecord {
    pub subscription_tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
}

impl SupabaseClient {
    pub fn new(base_url: &str, service_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            http: build_client(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok()?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|_| std::env::var("SUPABASE_SERVICE_KEY"))
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .ok()?;
        Some(Self::new(&base_url, &service_key))
    }

    fn rest(&self, method: reqwest::Method, path_and_query: &str) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, path_and_query);
        debug!(target = "crosslist.store", %method, url = %url, "postgrest_call");
        self.http
            .request(method, url)
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    async fn send(builder: RequestBuilder) -> Result<Response, StoreError> {
        let response = builder
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected(format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }

    async fn select<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<Vec<T>, StoreError> {
        let response = Self::send(self.rest(reqwest::Method::GET, path_and_query)).await?;
        response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))
    }

    /// Runs a select with `count=exact` and returns `(rows, total)`.
    async fn select_counted<T: DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<(Vec<T>, u64), StoreError> {
        let response = Self::send(
            self.rest(reqwest::Method::GET, path_and_query)
                .header("Prefer", "count=exact"),
        )
        .await?;
        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total);
        let rows: Vec<T> = response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))?;
        let total = total.unwrap_or(rows.len() as u64);
        Ok((rows, total))
    }

    async fn write<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path_and_query: &str,
        body: &Value,
    ) -> Result<Vec<T>, StoreError> {
        let response = Self::send(
            self.rest(method, path_and_query)
                .header("Prefer", "return=representation")
                .json(body),
        )
        .await?;
        response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))
    }

    /// Resolves an end-user access token through Supabase Auth.
    pub async fn fetch_auth_user(&self, token: &str) -> Result<Option<AuthUserRecord>, StoreError> {
        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        if matches!(response.status().as_u16(), 401 | 403 | 404) {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::Request(format!("HTTP {}", response.status())));
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(|err| StoreError::Deserialize(err.to_string()))
    }

    pub async fn fetch_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionRecord>, StoreError> {
        let mut rows: Vec<SubscriptionRecord> = self
            .select(&format!(
                "{USERS}?id=eq.{user_id}&select=subscription_tier,subscription_status&limit=1"
            ))
            .await?;
        Ok(rows.pop())
    }
}

fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next().and_then(|total| total.parse().ok())
}

fn timestamp(value: DateTime<Utc>) -> String {
    encode(&value.to_rfc3339_opts(SecondsFormat::Millis, true)).into_owned()
}

fn id_list(ids: &[Uuid]) -> String {
    let joined = ids
        .iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({joined})")
}

#[derive(Debug, Deserialize)]
struct RequestRow {
    id: Uuid,
    user_id: Uuid,
    source_platform: Platform,
    target_platforms: Vec<Platform>,
    inventory_items: Vec<Uuid>,
    status: RequestStatus,
    #[serde(default = "default_true")]
    optimize_seo: bool,
    #[serde(default)]
    generate_descriptions: bool,
    #[serde(default)]
    results: Option<Vec<CrossListingResult>>,
    #[serde(default)]
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl From<RequestRow> for CrossListingRequest {
    fn from(row: RequestRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            source_platform: row.source_platform,
            target_platforms: row.target_platforms,
            inventory_items: row.inventory_items,
            status: row.status,
            optimize_seo: row.optimize_seo,
            generate_descriptions: row.generate_descriptions,
            results: row.results,
            error_message: row.error_message,
            created_at: row.created_at,
            completed_at: row.completed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InventoryRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    retail_price: Option<f64>,
    #[serde(default)]
    quantity_available: Option<i32>,
    status: String,
    #[serde(default)]
    images: Option<Vec<String>>,
}

impl From<InventoryRow> for InventoryItem {
    fn from(row: InventoryRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            description: row.description,
            brand: row.brand,
            category: row.category,
            condition: row.condition,
            size: row.size,
            retail_price: row.retail_price.unwrap_or(0.0),
            quantity_available: row.quantity_available.unwrap_or(0),
            status: row.status,
            images: row.images.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListingRow {
    id: Uuid,
    user_id: Uuid,
    inventory_item_id: Uuid,
    #[serde(default)]
    cross_listing_request_id: Option<Uuid>,
    platform: Platform,
    platform_listing_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    price: f64,
    status: String,
    quantity: i32,
    #[serde(default)]
    view_url: Option<String>,
    listing_date: DateTime<Utc>,
}

impl From<ListingRow> for MarketplaceListing {
    fn from(row: ListingRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            inventory_item_id: row.inventory_item_id,
            cross_listing_request_id: row.cross_listing_request_id,
            platform: row.platform,
            platform_listing_id: row.platform_listing_id,
            title: row.title.unwrap_or_default(),
            description: row.description.unwrap_or_default(),
            price: row.price,
            status: row.status,
            quantity: row.quantity,
            view_url: row.view_url.unwrap_or_default(),
            listing_date: row.listing_date,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlatformRow {
    platform: Platform,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: Uuid,
}

/// PostgREST-backed [`Store`].
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    client: SupabaseClient,
}

impl SupabaseStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Row count for a request filter, read from `Content-Range` so PostgREST's
    /// `max-rows` cap never truncates it.
    async fn count_requests(&self, filter: &str) -> Result<u64, StoreError> {
        let (_, total) = self
            .client
            .select_counted::<IdRow>(&format!("{REQUESTS}?{filter}&select=id&limit=1"))
            .await?;
        Ok(total)
    }
}

#[async_trait]
impl Store for SupabaseStore {
    async fn active_credential_platforms(&self, user_id: Uuid) -> Result<Vec<Platform>, StoreError> {
        let rows: Vec<PlatformRow> = self
            .client
            .select(&format!(
                "{CREDENTIALS}?user_id=eq.{user_id}&is_active=eq.true&select=platform"
            ))
            .await?;
        Ok(rows.into_iter().map(|row| row.platform).collect())
    }

    async fn count_requests_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.count_requests(&format!(
            "user_id=eq.{user_id}&created_at=gte.{}",
            timestamp(since)
        ))
        .await
    }

    async fn fetch_inventory_items(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<InventoryItem>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<InventoryRow> = self
            .client
            .select(&format!(
                "{ITEMS}?user_id=eq.{user_id}&id={}&select=*",
                id_list(ids)
            ))
            .await?;
        Ok(rows.into_iter().map(InventoryItem::from).collect())
    }

    async fn insert_request(
        &self,
        request: &NewCrossListingRequest,
    ) -> Result<CrossListingRequest, StoreError> {
        let body = json!({
            "user_id": request.user_id,
            "source_platform": request.source_platform,
            "target_platforms": request.target_platforms,
            "inventory_items": request.inventory_items,
            "status": RequestStatus::Pending,
            "optimize_seo": request.optimize_seo,
            "generate_descriptions": request.generate_descriptions,
            "created_at": Utc::now(),
        });
        let mut rows: Vec<RequestRow> = self
            .client
            .write(reqwest::Method::POST, REQUESTS, &body)
            .await?;
        rows.pop()
            .map(CrossListingRequest::from)
            .ok_or_else(|| StoreError::Rejected("insert returned no row".into()))
    }

    async fn fetch_request(&self, id: Uuid) -> Result<Option<CrossListingRequest>, StoreError> {
        let mut rows: Vec<RequestRow> = self
            .client
            .select(&format!("{REQUESTS}?id=eq.{id}&select=*&limit=1"))
            .await?;
        Ok(rows.pop().map(CrossListingRequest::from))
    }

    async fn fetch_user_request(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CrossListingRequest>, StoreError> {
        let mut rows: Vec<RequestRow> = self
            .client
            .select(&format!(
                "{REQUESTS}?id=eq.{id}&user_id=eq.{user_id}&select=*&limit=1"
            ))
            .await?;
        Ok(rows.pop().map(CrossListingRequest::from))
    }

    async fn begin_processing(&self, id: Uuid) -> Result<bool, StoreError> {
        let rows: Vec<IdRow> = self
            .client
            .write(
                reqwest::Method::PATCH,
                &format!("{REQUESTS}?id=eq.{id}&status=in.(pending,in_progress)&select=id"),
                &json!({ "status": RequestStatus::InProgress }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn finalize_request(
        &self,
        id: Uuid,
        update: &RequestFinalization,
    ) -> Result<bool, StoreError> {
        let body = json!({
            "status": update.status,
            "results": update.results,
            "error_message": update.error_message,
            "completed_at": update.completed_at,
        });
        let rows: Vec<IdRow> = self
            .client
            .write(
                reqwest::Method::PATCH,
                &format!("{REQUESTS}?id=eq.{id}&status=eq.in_progress&select=id"),
                &body,
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn insert_listing(
        &self,
        listing: &NewMarketplaceListing,
    ) -> Result<MarketplaceListing, StoreError> {
        let body = json!({
            "user_id": listing.user_id,
            "inventory_item_id": listing.inventory_item_id,
            "cross_listing_request_id": listing.cross_listing_request_id,
            "platform": listing.platform,
            "platform_listing_id": listing.platform_listing_id,
            "title": listing.title,
            "description": listing.description,
            "price": listing.price,
            "status": "active",
            "quantity": listing.quantity,
            "view_url": listing.view_url,
            "listing_date": listing.listing_date,
        });
        let mut rows: Vec<ListingRow> = self
            .client
            .write(reqwest::Method::POST, LISTINGS, &body)
            .await?;
        rows.pop()
            .map(MarketplaceListing::from)
            .ok_or_else(|| StoreError::Rejected("insert returned no row".into()))
    }

    async fn find_listing(
        &self,
        request_id: Uuid,
        item_id: Uuid,
        platform: Platform,
    ) -> Result<Option<MarketplaceListing>, StoreError> {
        let mut rows: Vec<ListingRow> = self
            .client
            .select(&format!(
                "{LISTINGS}?cross_listing_request_id=eq.{request_id}&inventory_item_id=eq.{item_id}&platform=eq.{platform}&select=*&limit=1"
            ))
            .await?;
        Ok(rows.pop().map(MarketplaceListing::from))
    }

    async fn fetch_listings(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<MarketplaceListing>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<ListingRow> = self
            .client
            .select(&format!(
                "{LISTINGS}?user_id=eq.{user_id}&id={}&select=*",
                id_list(ids)
            ))
            .await?;
        Ok(rows.into_iter().map(MarketplaceListing::from).collect())
    }

    async fn list_requests(
        &self,
        user_id: Uuid,
        query: &HistoryQuery,
    ) -> Result<RequestPage, StoreError> {
        let mut path = format!("{REQUESTS}?user_id=eq.{user_id}&select=*");
        if let Some(status) = query.status {
            path.push_str(&format!("&status=eq.{}", status.as_str()));
        }
        if let Some(platform) = query.platform {
            path.push_str(&format!(
                "&target_platforms=cs.{}",
                encode(&format!("{{{platform}}}"))
            ));
        }
        let nulls = match query.sort_order {
            SortOrder::Asc => "nullsfirst",
            SortOrder::Desc => "nullslast",
        };
        path.push_str(&format!(
            "&order={}.{}.{nulls}&limit={}&offset={}",
            query.sort_by.column(),
            query.sort_order.as_str(),
            query.limit,
            query.offset()
        ));
        let (rows, total) = self.client.select_counted::<RequestRow>(&path).await?;
        Ok(RequestPage {
            requests: rows.into_iter().map(CrossListingRequest::from).collect(),
            total,
        })
    }

    async fn status_counts(&self, user_id: Uuid) -> Result<StatusCounts, StoreError> {
        let owner = format!("user_id=eq.{user_id}");
        let bucket = |status: RequestStatus| format!("{owner}&status=eq.{}", status.as_str());
        let completed_filter = bucket(RequestStatus::Completed);
        let failed_filter = bucket(RequestStatus::Failed);
        let pending_filter = bucket(RequestStatus::Pending);
        let in_progress_filter = bucket(RequestStatus::InProgress);
        let (total, completed, failed, pending, in_progress) = tokio::try_join!(
            self.count_requests(&owner),
            self.count_requests(&completed_filter),
            self.count_requests(&failed_filter),
            self.count_requests(&pending_filter),
            self.count_requests(&in_progress_filter),
        )?;
        Ok(StatusCounts {
            total,
            completed,
            failed,
            pending,
            in_progress,
        })
    }

    async fn unfinished_requests(&self) -> Result<Vec<Uuid>, StoreError> {
        let rows: Vec<IdRow> = self
            .client
            .select(&format!(
                "{REQUESTS}?status=in.(pending,in_progress)&select=id&order=created_at.asc"
            ))
            .await?;
        Ok(rows.into_iter().map(|row| row.id).collect())
    }
}

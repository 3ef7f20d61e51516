use crate::cache::SharedCache;
use crate::models::CreateCrossListingResponse;
use std::{sync::Arc, time::Duration};
use tracing::warn;
use uuid::Uuid;

/// Replays the first create response per `(user, Idempotency-Key)`.
/// Cache failures degrade to "no replay" rather than failing the request.
#[derive(Clone)]
pub struct IdempotencyCache {
    cache: Arc<dyn SharedCache>,
    ttl: Duration,
}

impl IdempotencyCache {
    pub fn new(cache: Arc<dyn SharedCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn key(user_id: Uuid, key: &str) -> String {
        format!("idempotency:{user_id}:{key}")
    }

    pub async fn lookup(&self, user_id: Uuid, key: &str) -> Option<CreateCrossListingResponse> {
        match self.cache.get(&Self::key(user_id, key)).await {
            Ok(value) => value.and_then(|raw| serde_json::from_str(&raw).ok()),
            Err(err) => {
                warn!(target = "crosslist.api", error = %err, "idempotency_lookup_failed");
                None
            }
        }
    }

    pub async fn remember(&self, user_id: Uuid, key: &str, response: &CreateCrossListingResponse) {
        let Ok(json) = serde_json::to_string(response) else {
            return;
        };
        if let Err(err) = self
            .cache
            .set_ex(&Self::key(user_id, key), json, self.ttl)
            .await
        {
            warn!(target = "crosslist.api", error = %err, "idempotency_store_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::RequestStatus;
    use chrono::Utc;

    #[tokio::test]
    async fn replays_per_user_and_key() {
        let cache = IdempotencyCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(60));
        let user = Uuid::new_v4();
        let response = CreateCrossListingResponse {
            request_id: Uuid::new_v4(),
            status: RequestStatus::Pending,
            estimated_completion_time: Utc::now(),
        };
        assert!(cache.lookup(user, "k1").await.is_none());
        cache.remember(user, "k1", &response).await;

        let replay = cache.lookup(user, "k1").await.unwrap();
        assert_eq!(replay.request_id, response.request_id);
        assert!(cache.lookup(Uuid::new_v4(), "k1").await.is_none());
        assert!(cache.lookup(user, "k2").await.is_none());
    }
}

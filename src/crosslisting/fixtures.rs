use crate::config::PublisherSettings;
use crate::models::{AuthUser, InventoryItem, SubscriptionStatus, SubscriptionTier};
use crate::platforms::Platform;
use crate::publisher::{DescriptionWriter, PublisherRegistry};
use crate::store::MemoryStore;
use std::sync::Arc;
use uuid::Uuid;

pub fn user(tier: SubscriptionTier) -> AuthUser {
    AuthUser {
        id: Uuid::new_v4(),
        subscription_tier: tier,
        subscription_status: SubscriptionStatus::Active,
    }
}

pub fn item(owner: Uuid, status: &str) -> InventoryItem {
    InventoryItem {
        id: Uuid::new_v4(),
        user_id: owner,
        title: "Levi's 501 Original Jeans".into(),
        description: Some("Dark wash, barely worn.".into()),
        brand: Some("Levi's".into()),
        category: Some("Denim".into()),
        condition: Some("Like new".into()),
        size: Some("32x32".into()),
        retail_price: 100.0,
        quantity_available: 3,
        status: status.into(),
        images: vec![],
    }
}

/// Zero-delay simulated publishers for every platform.
pub fn registry(failure_rate: f64) -> Arc<PublisherRegistry> {
    slow_registry(failure_rate, 0)
}

pub fn slow_registry(failure_rate: f64, delay_ms: u64) -> Arc<PublisherRegistry> {
    let settings = PublisherSettings {
        failure_rate,
        delay_ms,
        seed: Some(42),
    };
    Arc::new(PublisherRegistry::simulated(
        &settings,
        Arc::new(DescriptionWriter::offline()),
    ))
}

/// Store holding `count` active items and credentials for every platform.
pub async fn seeded_store(user: &AuthUser, count: usize) -> (MemoryStore, Vec<Uuid>) {
    let store = MemoryStore::new();
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let item = item(user.id, "active");
        ids.push(item.id);
        store.put_inventory_item(item).await;
    }
    for platform in Platform::ALL {
        store.grant_credential(user.id, platform).await;
    }
    (store, ids)
}

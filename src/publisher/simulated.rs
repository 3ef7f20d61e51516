use super::{DescriptionWriter, PublishError, PublishInput, PublishedListing, Publisher, seo};
use crate::config::PublisherSettings;
use crate::platforms::{Platform, listed_price};
use async_trait::async_trait;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, sleep};
use tracing::debug;
use uuid::Uuid;

/// Test double for a marketplace API: waits a little, fails at a fixed rate,
/// and otherwise returns a synthetic listing.
pub struct SimulatedPublisher {
    platform: Platform,
    failure_rate: f64,
    delay: Duration,
    rng: Mutex<SmallRng>,
    writer: Arc<DescriptionWriter>,
}

impl SimulatedPublisher {
    pub fn new(platform: Platform, settings: &PublisherSettings, writer: Arc<DescriptionWriter>) -> Self {
        let seed = settings
            .seed
            .map(|seed| seed ^ (platform as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
            .unwrap_or_else(rand::random::<u64>);
        Self {
            platform,
            failure_rate: if settings.failure_rate.is_finite() {
                settings.failure_rate.clamp(0.0, 1.0)
            } else {
                0.0
            },
            delay: Duration::from_millis(settings.delay_ms),
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
            writer,
        }
    }

    fn roll_failure(&self) -> bool {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.random_bool(self.failure_rate)
    }

    fn listing_id(&self) -> String {
        let raw = Uuid::new_v4().simple().to_string().to_uppercase();
        format!("{}-{}", self.platform.profile().listing_prefix, &raw[..12])
    }
}

#[async_trait]
impl Publisher for SimulatedPublisher {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn publish(&self, input: &PublishInput<'_>) -> Result<PublishedListing, PublishError> {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        let item = input.item;
        if self.roll_failure() {
            return Err(PublishError::Remote {
                platform: self.platform,
                message: format!(
                    "{} API temporarily unavailable",
                    self.platform.profile().display_name
                ),
            });
        }

        let base_description = match item.description.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ if input.generate_descriptions => self.writer.write(item, self.platform).await,
            _ => String::new(),
        };
        let (title, description) = if input.optimize_seo {
            (
                seo::optimize_title(&item.title, self.platform),
                seo::optimize_description(&base_description, item, self.platform),
            )
        } else {
            (item.title.trim().to_string(), base_description)
        };

        let platform_listing_id = self.listing_id();
        let view_url = format!(
            "{}/{}",
            self.platform.profile().view_url_base,
            platform_listing_id
        );
        debug!(
            target = "crosslist.publisher",
            platform = %self.platform,
            item_id = %item.id,
            listing = %platform_listing_id,
            "simulated_publish"
        );
        Ok(PublishedListing {
            platform_listing_id,
            view_url,
            title,
            description,
            price: listed_price(item.retail_price, self.platform),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InventoryItem;

    fn settings(failure_rate: f64) -> PublisherSettings {
        PublisherSettings {
            failure_rate,
            delay_ms: 0,
            seed: Some(7),
        }
    }

    fn item(description: Option<&str>) -> InventoryItem {
        InventoryItem {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Nike Air Max 90".into(),
            description: description.map(str::to_string),
            brand: Some("Nike".into()),
            category: Some("Sneakers".into()),
            condition: Some("New".into()),
            size: Some("10".into()),
            retail_price: 100.0,
            quantity_available: 3,
            status: "active".into(),
            images: vec![],
        }
    }

    fn publisher(platform: Platform, failure_rate: f64) -> SimulatedPublisher {
        SimulatedPublisher::new(
            platform,
            &settings(failure_rate),
            Arc::new(DescriptionWriter::offline()),
        )
    }

    #[tokio::test]
    async fn publishes_with_fee_and_seo() {
        let item = item(Some("Worn twice."));
        let input = PublishInput {
            item: &item,
            platform: Platform::Ebay,
            optimize_seo: true,
            generate_descriptions: false,
        };
        let listing = publisher(Platform::Ebay, 0.0).publish(&input).await.expect("publish");
        assert_eq!(listing.price, 115.0);
        assert!(listing.platform_listing_id.starts_with("EBAY-"));
        assert!(listing.view_url.ends_with(&listing.platform_listing_id));
        assert_eq!(listing.title, "Nike Air Max 90 - Fast Shipping");
        assert!(listing.description.starts_with("Worn twice.\n\n#ebay"));
    }

    #[tokio::test]
    async fn without_seo_fields_pass_through() {
        let item = item(None);
        let input = PublishInput {
            item: &item,
            platform: Platform::Mercari,
            optimize_seo: false,
            generate_descriptions: false,
        };
        let listing = publisher(Platform::Mercari, 0.0).publish(&input).await.unwrap();
        assert_eq!(listing.title, "Nike Air Max 90");
        assert!(listing.description.is_empty());
    }

    #[tokio::test]
    async fn generated_description_fills_missing_copy() {
        let item = item(None);
        let input = PublishInput {
            item: &item,
            platform: Platform::Etsy,
            optimize_seo: false,
            generate_descriptions: true,
        };
        let listing = publisher(Platform::Etsy, 0.0).publish(&input).await.unwrap();
        assert!(listing.description.contains("Highlights:"));
    }

    #[tokio::test]
    async fn certain_failure_rate_always_fails() {
        let item = item(None);
        let input = PublishInput {
            item: &item,
            platform: Platform::Depop,
            optimize_seo: true,
            generate_descriptions: false,
        };
        let err = publisher(Platform::Depop, 1.0).publish(&input).await.unwrap_err();
        assert!(err.to_string().contains("Depop API temporarily unavailable"));
    }

    #[tokio::test]
    async fn unpriced_item_publishes_at_zero() {
        let mut item = item(None);
        item.retail_price = 0.0;
        let input = PublishInput {
            item: &item,
            platform: Platform::Poshmark,
            optimize_seo: false,
            generate_descriptions: false,
        };
        let listing = publisher(Platform::Poshmark, 0.0).publish(&input).await.unwrap();
        assert_eq!(listing.price, 0.0);
    }
}

//! Marketplace publishing capability.
//!
//! The workflow only depends on [`Publisher`]: an item snapshot goes in,
//! a listing (or a failure) comes out. One implementation is registered per
//! [`Platform`]; the simulated one stands in until real marketplace clients land.

pub mod description;
pub mod seo;
pub mod simulated;

use crate::config::PublisherSettings;
use crate::models::InventoryItem;
use crate::platforms::Platform;
use async_trait::async_trait;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

pub use description::DescriptionWriter;
pub use simulated::SimulatedPublisher;

#[derive(Debug, Clone, Copy)]
pub struct PublishInput<'a> {
    pub item: &'a InventoryItem,
    pub platform: Platform,
    pub optimize_seo: bool,
    pub generate_descriptions: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublishedListing {
    pub platform_listing_id: String,
    pub view_url: String,
    pub title: String,
    pub description: String,
    pub price: f64,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{platform} API error: {message}")]
    Remote { platform: Platform, message: String },
    #[error("no publisher registered for {0}")]
    Unsupported(Platform),
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> Platform;

    async fn publish(&self, input: &PublishInput<'_>) -> Result<PublishedListing, PublishError>;
}

/// Publisher lookup keyed by platform.
#[derive(Clone, Default)]
pub struct PublisherRegistry {
    publishers: HashMap<Platform, Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a [`SimulatedPublisher`] for every platform.
    pub fn simulated(settings: &PublisherSettings, writer: Arc<DescriptionWriter>) -> Self {
        Platform::ALL
            .into_iter()
            .fold(Self::new(), |registry, platform| {
                registry.with(Arc::new(SimulatedPublisher::new(
                    platform,
                    settings,
                    writer.clone(),
                )))
            })
    }

    pub fn with(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publishers.insert(publisher.platform(), publisher);
        self
    }

    pub fn get(&self, platform: Platform) -> Result<&Arc<dyn Publisher>, PublishError> {
        self.publishers
            .get(&platform)
            .ok_or(PublishError::Unsupported(platform))
    }

    /// Platforms without a registered publisher; checked once at startup.
    pub fn missing_platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|platform| !self.publishers.contains_key(platform))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_registry_covers_every_platform() {
        let registry = PublisherRegistry::simulated(
            &PublisherSettings::default(),
            Arc::new(DescriptionWriter::offline()),
        );
        assert!(registry.missing_platforms().is_empty());
        for platform in Platform::ALL {
            assert_eq!(registry.get(platform).unwrap().platform(), platform);
        }
    }

    #[test]
    fn empty_registry_reports_missing_platforms() {
        let registry = PublisherRegistry::new();
        assert_eq!(registry.missing_platforms().len(), Platform::ALL.len());
        assert!(matches!(
            registry.get(Platform::Etsy),
            Err(PublishError::Unsupported(Platform::Etsy))
        ));
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// External marketplaces a listing can be republished to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Ebay,
    Mercari,
    Poshmark,
    #[serde(alias = "facebook")]
    FacebookMarketplace,
    Depop,
    Etsy,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Ebay,
        Platform::Mercari,
        Platform::Poshmark,
        Platform::FacebookMarketplace,
        Platform::Depop,
        Platform::Etsy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ebay => "ebay",
            Platform::Mercari => "mercari",
            Platform::Poshmark => "poshmark",
            Platform::FacebookMarketplace => "facebook_marketplace",
            Platform::Depop => "depop",
            Platform::Etsy => "etsy",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "ebay" => Some(Platform::Ebay),
            "mercari" => Some(Platform::Mercari),
            "poshmark" => Some(Platform::Poshmark),
            "facebook_marketplace" | "facebook" => Some(Platform::FacebookMarketplace),
            "depop" => Some(Platform::Depop),
            "etsy" => Some(Platform::Etsy),
            _ => None,
        }
    }

    pub fn profile(&self) -> &'static PlatformProfile {
        match self {
            Platform::Ebay => &EBAY,
            Platform::Mercari => &MERCARI,
            Platform::Poshmark => &POSHMARK,
            Platform::FacebookMarketplace => &FACEBOOK_MARKETPLACE,
            Platform::Depop => &DEPOP,
            Platform::Etsy => &ETSY,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed per-marketplace constants used by publishers and pricing.
#[derive(Debug, Clone, Copy)]
pub struct PlatformProfile {
    pub display_name: &'static str,
    pub listing_prefix: &'static str,
    pub view_url_base: &'static str,
    pub fee_multiplier: f64,
    pub title_limit: usize,
    pub seo_suffix: &'static str,
    pub hashtags: &'static [&'static str],
}

const EBAY: PlatformProfile = PlatformProfile {
    display_name: "eBay",
    listing_prefix: "EBAY",
    view_url_base: "https://www.ebay.com/itm",
    fee_multiplier: 1.15,
    title_limit: 80,
    seo_suffix: "Fast Shipping",
    hashtags: &["#ebay", "#ebayfinds", "#ebayseller"],
};

const MERCARI: PlatformProfile = PlatformProfile {
    display_name: "Mercari",
    listing_prefix: "MER",
    view_url_base: "https://www.mercari.com/us/item",
    fee_multiplier: 1.10,
    title_limit: 80,
    seo_suffix: "Great Deal",
    hashtags: &["#mercari", "#mercarifinds", "#shopmercari"],
};

const POSHMARK: PlatformProfile = PlatformProfile {
    display_name: "Poshmark",
    listing_prefix: "POSH",
    view_url_base: "https://poshmark.com/listing",
    fee_multiplier: 1.25,
    title_limit: 80,
    seo_suffix: "Posh Style",
    hashtags: &["#poshmark", "#poshmarkfinds", "#shopmycloset"],
};

// Local pickup marketplace, listed without a fee markup.
const FACEBOOK_MARKETPLACE: PlatformProfile = PlatformProfile {
    display_name: "Facebook Marketplace",
    listing_prefix: "FBM",
    view_url_base: "https://www.facebook.com/marketplace/item",
    fee_multiplier: 1.00,
    title_limit: 100,
    seo_suffix: "Local Pickup",
    hashtags: &["#marketplace", "#localpickup", "#forsale"],
};

const DEPOP: PlatformProfile = PlatformProfile {
    display_name: "Depop",
    listing_prefix: "DEP",
    view_url_base: "https://www.depop.com/products",
    fee_multiplier: 1.10,
    title_limit: 65,
    seo_suffix: "Vintage Vibes",
    hashtags: &["#depop", "#vintage", "#y2k", "#streetwear"],
};

const ETSY: PlatformProfile = PlatformProfile {
    display_name: "Etsy",
    listing_prefix: "ETSY",
    view_url_base: "https://www.etsy.com/listing",
    fee_multiplier: 1.08,
    title_limit: 140,
    seo_suffix: "Unique Find",
    hashtags: &["#etsy", "#etsyfinds", "#handpicked"],
};

/// Rounds to whole cents.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Price a listing is published at: base price marked up by the marketplace fee.
pub fn listed_price(base_price: f64, platform: Platform) -> f64 {
    round_cents(base_price * platform.profile().fee_multiplier)
}

use crate::error::CrossListError;
use crate::models::AuthUser;
use crate::platforms::Platform;
use chrono::{DateTime, Datelike, TimeZone, Utc};

/// Entitlement facts fetched for one create call.
#[derive(Debug, Clone, Default)]
pub struct EntitlementSnapshot {
    pub active_platforms: Vec<Platform>,
    pub monthly_requests: u64,
}

/// First instant of `now`'s calendar month, UTC.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

pub fn check_subscription(user: &AuthUser) -> Result<(), CrossListError> {
    if user.subscription_status.allows_crosslisting() {
        return Ok(());
    }
    Err(CrossListError::validation(
        "subscription_inactive",
        format!(
            "Subscription is {}; an active or trialing subscription is required",
            user.subscription_status.as_str()
        ),
    ))
}

/// Target platforms without an active credential, in request order, deduplicated.
pub fn missing_credentials(targets: &[Platform], active: &[Platform]) -> Vec<Platform> {
    let mut missing = Vec::new();
    for platform in targets {
        if !active.contains(platform) && !missing.contains(platform) {
            missing.push(*platform);
        }
    }
    missing
}

pub fn check_credentials(targets: &[Platform], active: &[Platform]) -> Result<(), CrossListError> {
    let missing = missing_credentials(targets, active);
    if missing.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = missing.iter().map(|p| p.as_str()).collect();
    Err(CrossListError::validation(
        "missing_platform_credentials",
        format!(
            "Missing active credentials for platforms: {}",
            names.join(", ")
        ),
    ))
}

pub fn check_quota(user: &AuthUser, monthly_requests: u64) -> Result<(), CrossListError> {
    let quota = user.subscription_tier.monthly_quota();
    if monthly_requests < quota {
        return Ok(());
    }
    Err(CrossListError::validation(
        "monthly_quota_exceeded",
        format!("Monthly cross-listing limit of {quota} reached for your plan"),
    ))
}

/// Runs every entitlement rule against the fetched snapshot. Credentials are
/// skipped when `require_credentials` is off.
pub fn check_entitlement(
    user: &AuthUser,
    snapshot: &EntitlementSnapshot,
    targets: &[Platform],
    require_credentials: bool,
) -> Result<(), CrossListError> {
    check_subscription(user)?;
    if require_credentials {
        check_credentials(targets, &snapshot.active_platforms)?;
    }
    check_quota(user, snapshot.monthly_requests)
}

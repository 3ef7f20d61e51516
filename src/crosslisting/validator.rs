use crate::error::CrossListError;
use crate::models::{CreateCrossListingPayload, InventoryItem};
use crate::platforms::Platform;
use std::collections::HashSet;
use uuid::Uuid;

/// A create payload that passed shape checks; nothing has touched the store yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub source_platform: Platform,
    pub target_platforms: Vec<Platform>,
    pub inventory_items: Vec<Uuid>,
    pub optimize_seo: bool,
    pub generate_descriptions: bool,
}

pub fn validate_payload(payload: &CreateCrossListingPayload) -> Result<ValidatedRequest, CrossListError> {
    let mut missing = Vec::new();
    if payload.source_platform.as_deref().is_none_or(|s| s.trim().is_empty()) {
        missing.push("sourcePlatform");
    }
    if payload.target_platforms.is_none() {
        missing.push("targetPlatforms");
    }
    if payload.inventory_items.is_none() {
        missing.push("inventoryItems");
    }
    let (Some(source), Some(targets), Some(items)) = (
        payload.source_platform.as_deref(),
        payload.target_platforms.as_ref(),
        payload.inventory_items.as_ref(),
    ) else {
        return Err(missing_fields(&missing));
    };
    if !missing.is_empty() {
        return Err(missing_fields(&missing));
    }

    if targets.is_empty() {
        return Err(CrossListError::validation(
            "empty_target_platforms",
            "targetPlatforms must contain at least one platform",
        ));
    }
    if items.is_empty() {
        return Err(CrossListError::validation(
            "empty_inventory_items",
            "inventoryItems must contain at least one item",
        ));
    }

    let mut invalid = Vec::new();
    let source_platform = Platform::parse(source);
    if source_platform.is_none() {
        invalid.push(source.trim().to_string());
    }
    let mut target_platforms = Vec::with_capacity(targets.len());
    for raw in targets {
        match Platform::parse(raw) {
            Some(platform) => target_platforms.push(platform),
            None => invalid.push(raw.trim().to_string()),
        }
    }
    let Some(source_platform) = source_platform.filter(|_| invalid.is_empty()) else {
        return Err(CrossListError::validation(
            "invalid_platform",
            format!(
                "Invalid platforms: {}. Valid platforms: {}",
                invalid.join(", "),
                Platform::ALL.map(|p| p.as_str()).join(", ")
            ),
        ));
    };

    let mut inventory_items = Vec::with_capacity(items.len());
    for raw in items {
        let id = Uuid::parse_str(raw.trim()).map_err(|_| {
            CrossListError::validation(
                "invalid_inventory_item_id",
                format!("Invalid inventory item id: {raw}"),
            )
        })?;
        inventory_items.push(id);
    }

    Ok(ValidatedRequest {
        source_platform,
        target_platforms,
        inventory_items,
        optimize_seo: payload.optimize_seo.unwrap_or(true),
        generate_descriptions: payload.generate_descriptions.unwrap_or(false),
    })
}

fn missing_fields(missing: &[&str]) -> CrossListError {
    CrossListError::validation(
        "missing_required_fields",
        format!("Missing required fields: {}", missing.join(", ")),
    )
}

/// Checks the batch lookup result against the requested ids.
pub fn validate_items(requested: &[Uuid], resolved: &[InventoryItem]) -> Result<(), CrossListError> {
    let wanted: HashSet<Uuid> = requested.iter().copied().collect();
    let found: HashSet<Uuid> = resolved.iter().map(|item| item.id).collect();
    if found.len() != wanted.len() {
        let mut missing: Vec<String> = requested
            .iter()
            .filter(|id| !found.contains(id))
            .map(Uuid::to_string)
            .collect();
        missing.dedup();
        return Err(CrossListError::validation(
            "inventory_items_not_found",
            format!(
                "Some inventory items were not found or do not belong to you: {}",
                missing.join(", ")
            ),
        ));
    }

    let mut offending: Vec<&str> = resolved
        .iter()
        .filter(|item| !item.is_listable())
        .map(|item| item.status.as_str())
        .collect();
    if !offending.is_empty() {
        offending.sort_unstable();
        offending.dedup();
        return Err(CrossListError::validation(
            "inventory_items_not_listable",
            format!(
                "Items must be active or draft to cross-list. Found statuses: {}",
                offending.join(", ")
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn payload() -> CreateCrossListingPayload {
        CreateCrossListingPayload {
            source_platform: Some("ebay".into()),
            target_platforms: Some(vec!["etsy".into(), "poshmark".into()]),
            inventory_items: Some(vec![Uuid::new_v4().to_string()]),
            optimize_seo: None,
            generate_descriptions: None,
        }
    }

    fn item(status: &str) -> InventoryItem {
        InventoryItem {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Item".into(),
            description: None,
            brand: None,
            category: None,
            condition: None,
            size: None,
            retail_price: 10.0,
            quantity_available: 1,
            status: status.into(),
            images: vec![],
        }
    }

    #[test]
    fn defaults_flags_and_keeps_order() {
        let validated = validate_payload(&payload()).expect("valid");
        assert!(validated.optimize_seo);
        assert!(!validated.generate_descriptions);
        assert_eq!(
            validated.target_platforms,
            vec![Platform::Etsy, Platform::Poshmark]
        );
    }

    #[test]
    fn missing_fields_are_named() {
        let err = validate_payload(&CreateCrossListingPayload {
            target_platforms: None,
            inventory_items: None,
            ..payload()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.code(), "missing_required_fields");
        assert!(err.detail().contains("targetPlatforms"));
        assert!(err.detail().contains("inventoryItems"));
        assert!(!err.detail().contains("sourcePlatform"));
    }

    #[test]
    fn empty_lists_are_rejected() {
        let err = validate_payload(&CreateCrossListingPayload {
            target_platforms: Some(vec![]),
            ..payload()
        })
        .unwrap_err();
        assert_eq!(err.code(), "empty_target_platforms");

        let err = validate_payload(&CreateCrossListingPayload {
            inventory_items: Some(vec![]),
            ..payload()
        })
        .unwrap_err();
        assert_eq!(err.code(), "empty_inventory_items");
    }

    #[test]
    fn unknown_platforms_are_listed() {
        let err = validate_payload(&CreateCrossListingPayload {
            source_platform: Some("craigslist".into()),
            target_platforms: Some(vec!["etsy".into(), "offerup".into()]),
            ..payload()
        })
        .unwrap_err();
        assert_eq!(err.code(), "invalid_platform");
        assert!(err.detail().contains("craigslist"));
        assert!(err.detail().contains("offerup"));
    }

    #[test]
    fn duplicate_targets_are_kept() {
        let validated = validate_payload(&CreateCrossListingPayload {
            target_platforms: Some(vec!["etsy".into(), "etsy".into()]),
            ..payload()
        })
        .unwrap();
        assert_eq!(validated.target_platforms.len(), 2);
    }

    #[test]
    fn malformed_item_ids_are_rejected() {
        let err = validate_payload(&CreateCrossListingPayload {
            inventory_items: Some(vec!["not-a-uuid".into()]),
            ..payload()
        })
        .unwrap_err();
        assert_eq!(err.code(), "invalid_inventory_item_id");
    }

    #[test]
    fn unresolved_items_fail() {
        let owned = item("active");
        let stranger = Uuid::new_v4();
        let err = validate_items(&[owned.id, stranger], &[owned]).unwrap_err();
        assert_eq!(err.code(), "inventory_items_not_found");
        assert!(err.detail().contains(&stranger.to_string()));
    }

    #[test]
    fn ineligible_statuses_are_named() {
        let sold = item("sold");
        let archived = item("archived");
        let draft = item("draft");
        let ids = [sold.id, archived.id, draft.id];
        let err = validate_items(&ids, &[sold, archived, draft]).unwrap_err();
        assert_eq!(err.code(), "inventory_items_not_listable");
        assert!(err.detail().contains("archived, sold"));
    }

    #[test]
    fn active_and_draft_items_pass() {
        let a = item("active");
        let b = item("draft");
        assert!(validate_items(&[a.id, b.id, a.id], &[a, b]).is_ok());
    }
}

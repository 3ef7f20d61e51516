use crate::models::InventoryItem;
use crate::platforms::Platform;

const SEPARATOR: &str = " - ";

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => value[..idx].trim_end(),
        None => value,
    }
}

/// Appends the platform's marketing suffix, shortening the base title so the
/// result stays within the platform's title limit.
pub fn optimize_title(title: &str, platform: Platform) -> String {
    let profile = platform.profile();
    let base = collapse_whitespace(title);
    if base.ends_with(profile.seo_suffix) {
        return truncate_chars(&base, profile.title_limit).to_string();
    }
    let reserved = SEPARATOR.chars().count() + profile.seo_suffix.chars().count();
    let room = profile.title_limit.saturating_sub(reserved);
    let base = truncate_chars(&base, room);
    if base.is_empty() {
        return profile.seo_suffix.to_string();
    }
    format!("{base}{SEPARATOR}{}", profile.seo_suffix)
}

fn hashtag(value: &str) -> Option<String> {
    let tag: String = value
        .chars()
        .filter(|ch| ch.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    (!tag.is_empty()).then(|| format!("#{tag}"))
}

/// Appends the platform hashtag block plus tags derived from brand and category.
pub fn optimize_description(description: &str, item: &InventoryItem, platform: Platform) -> String {
    let mut tags: Vec<String> = platform
        .profile()
        .hashtags
        .iter()
        .map(|tag| tag.to_string())
        .collect();
    for extra in [item.brand.as_deref(), item.category.as_deref()]
        .into_iter()
        .flatten()
        .filter_map(hashtag)
    {
        if !tags.contains(&extra) {
            tags.push(extra);
        }
    }
    let body = description.trim_end();
    if body.is_empty() {
        tags.join(" ")
    } else {
        format!("{body}\n\n{}", tags.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn item() -> InventoryItem {
        InventoryItem {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Vintage  Levi's 501 Jeans".into(),
            description: Some("Classic fit.".into()),
            brand: Some("Levi's".into()),
            category: Some("Denim".into()),
            condition: Some("Good".into()),
            size: Some("32x30".into()),
            retail_price: 45.0,
            quantity_available: 1,
            status: "active".into(),
            images: vec![],
        }
    }

    #[test]
    fn title_gets_platform_suffix() {
        let title = optimize_title("Vintage  Levi's 501 Jeans", Platform::Ebay);
        assert_eq!(title, "Vintage Levi's 501 Jeans - Fast Shipping");
    }

    #[test]
    fn long_titles_are_cut_to_the_platform_limit() {
        let long = "ä".repeat(200);
        for platform in Platform::ALL {
            let title = optimize_title(&long, platform);
            assert!(title.chars().count() <= platform.profile().title_limit);
            assert!(title.ends_with(platform.profile().seo_suffix));
        }
    }

    #[test]
    fn suffix_is_not_doubled() {
        let once = optimize_title("Jacket", Platform::Depop);
        assert_eq!(optimize_title(&once, Platform::Depop), once);
    }

    #[test]
    fn description_gets_hashtag_block() {
        let text = optimize_description("Classic fit.", &item(), Platform::Poshmark);
        assert!(text.starts_with("Classic fit.\n\n#poshmark"));
        assert!(text.contains("#levis"));
        assert!(text.contains("#denim"));
    }
}

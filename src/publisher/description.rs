use crate::llm::{LlmClient, LlmMessage};
use crate::models::InventoryItem;
use crate::platforms::Platform;
use std::sync::Arc;
use tracing::warn;

const SYSTEM_PROMPT: &str = "You write concise, policy-compliant resale marketplace listing \
descriptions. Use only the facts provided. Plain text, no markdown, under 120 words.";

/// Produces listing copy for items that have none.
pub struct DescriptionWriter {
    llm: Option<Arc<LlmClient>>,
}

impl DescriptionWriter {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        let llm = llm.is_configured().then_some(llm);
        Self { llm }
    }

    /// Template-only writer.
    pub fn offline() -> Self {
        Self { llm: None }
    }

    pub async fn write(&self, item: &InventoryItem, platform: Platform) -> String {
        let bullets = highlights(item);
        let Some(llm) = &self.llm else {
            return template(&item.title, &bullets);
        };
        let prompt = format!(
            "Write a {market} listing description. Title: {title}. Facts: {bullets:?}.",
            market = platform.profile().display_name,
            title = item.title,
        );
        match llm
            .chat(&[LlmMessage::system(SYSTEM_PROMPT), LlmMessage::user(prompt)])
            .await
        {
            Ok(resp) => resp.text,
            Err(err) => {
                warn!(
                    target = "crosslist.publisher",
                    item_id = %item.id,
                    platform = %platform,
                    error = %err,
                    "llm_description_fallback"
                );
                template(&item.title, &bullets)
            }
        }
    }
}

fn highlights(item: &InventoryItem) -> Vec<String> {
    let mut bullets = Vec::new();
    if let Some(brand) = item.brand.as_deref().filter(|v| !v.trim().is_empty()) {
        bullets.push(format!("Brand: {}", brand.trim()));
    }
    if let Some(condition) = item.condition.as_deref().filter(|v| !v.trim().is_empty()) {
        bullets.push(format!("Condition: {}", condition.trim()));
    }
    if let Some(category) = item.category.as_deref().filter(|v| !v.trim().is_empty()) {
        bullets.push(format!("Category: {}", category.trim()));
    }
    if let Some(size) = item.size.as_deref().filter(|v| !v.trim().is_empty()) {
        bullets.push(format!("Size: {}", size.trim()));
    }
    bullets
}

fn template(title: &str, bullets: &[String]) -> String {
    let mut text = format!("{}\n", title.trim());
    if !bullets.is_empty() {
        text.push_str("\nHighlights:\n");
        for bullet in bullets {
            text.push_str(&format!("- {bullet}\n"));
        }
    }
    text.push_str("\nShips quickly. Message with any questions.");
    text
}

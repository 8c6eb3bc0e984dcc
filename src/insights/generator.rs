//! Insight generator. Asks an LLM for a structured industry analysis.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::llm::costs::estimate_cost;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

use super::model::{Category, GeneratedInsight};

/// Produces the content of an insight for a category.
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate(&self, category: &Category) -> Result<GeneratedInsight, LlmError>;
}

/// Configuration for LLM-backed generation.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Minimum number of salary bands to ask for.
    pub min_roles: usize,
    /// Minimum number of skills and trends to ask for.
    pub min_items: usize,
    /// LLM temperature.
    pub temperature: f32,
    /// Max tokens for LLM response.
    pub max_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            min_roles: 5,
            min_items: 5,
            temperature: 0.2,
            max_tokens: 2048,
        }
    }
}

/// [`InsightGenerator`] backed by an [`LlmProvider`].
pub struct LlmInsightGenerator {
    llm: Arc<dyn LlmProvider>,
    config: GeneratorConfig,
}

impl LlmInsightGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: GeneratorConfig) -> Self {
        Self { llm, config }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a labour-market analyst. Given an industry, describe its current state \
             as a single JSON object with exactly these fields:\n\n\
             {{\n\
             \x20 \"salaryRanges\": [{{\"role\": string, \"min\": number, \"max\": number, \"median\": number, \"location\": string}}],\n\
             \x20 \"growthRate\": number,\n\
             \x20 \"demandLevel\": \"High\" | \"Medium\" | \"Low\",\n\
             \x20 \"topSkills\": [string],\n\
             \x20 \"marketOutlook\": \"Positive\" | \"Neutral\" | \"Negative\",\n\
             \x20 \"keyTrends\": [string],\n\
             \x20 \"recommendedSkills\": [string]\n\
             }}\n\n\
             Rules:\n\
             - Include at least {roles} common roles in salaryRanges, yearly amounts in USD\n\
             - growthRate is a yearly percentage\n\
             - Include at least {items} skills and {items} trends\n\n\
             ONLY output the JSON object. No notes, no markdown.",
            roles = self.config.min_roles,
            items = self.config.min_items,
        )
    }
}

#[async_trait]
impl InsightGenerator for LlmInsightGenerator {
    async fn generate(&self, category: &Category) -> Result<GeneratedInsight, LlmError> {
        info!(category = %category, model = self.llm.model_name(), "Generating industry insight");

        let request = CompletionRequest::new(vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(format!("Industry: {category}")),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm.complete(request).await?;
        debug!(
            category = %category,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            cost = %estimate_cost(self.llm.model_name(), response.input_tokens, response.output_tokens),
            "Insight generation call finished"
        );

        parse_insight(self.llm.model_name(), &response.content)
    }
}

/// Parse an LLM reply into a [`GeneratedInsight`].
fn parse_insight(provider: &str, reply: &str) -> Result<GeneratedInsight, LlmError> {
    let json = extract_json_object(reply).ok_or_else(|| LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: "no JSON object in reply".to_string(),
    })?;

    let generated: GeneratedInsight =
        serde_json::from_str(json).map_err(|e| LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: format!("malformed insight JSON: {e}"),
        })?;

    if !generated.growth_rate.is_finite() {
        return Err(LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: "growthRate is not a finite number".to_string(),
        });
    }

    let inconsistent = generated
        .salary_ranges
        .iter()
        .filter(|r| !r.is_consistent())
        .count();
    if inconsistent > 0 {
        warn!(inconsistent, "Insight reply has salary ranges outside min <= median <= max");
    }

    Ok(generated.normalized())
}

/// Extract a JSON object from LLM output that might contain markdown or extra text.
fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    // Fenced block, with or without a language tag
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

//! Shared fixtures for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::error::LlmError;
use crate::insights::generator::InsightGenerator;
use crate::insights::model::{
    Category, DemandLevel, GeneratedInsight, Insight, MarketOutlook, SalaryRange,
};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
};

/// Generator output with duplicate and blank entries left in.
pub(crate) fn sample_generated() -> GeneratedInsight {
    GeneratedInsight {
        salary_ranges: vec![SalaryRange {
            role: "Software Engineer".to_string(),
            min: Decimal::from(90_000),
            max: Decimal::from(160_000),
            median: Decimal::from(120_000),
            location: "Remote".to_string(),
        }],
        growth_rate: 12.5,
        demand_level: DemandLevel::High,
        top_skills: vec!["Go".into(), " Rust ".into(), "Go".into(), "".into()],
        market_outlook: MarketOutlook::Positive,
        key_trends: vec!["AI tooling".into(), "  ".into()],
        recommended_skills: vec!["Kubernetes".into()],
    }
}

/// A fresh insight for `category`, due a week from now.
pub(crate) fn sample_insight(category: &str) -> Insight {
    Insight::new(
        Category::parse(category).unwrap(),
        sample_generated(),
        Utc::now(),
        chrono::Duration::days(7),
    )
}

/// LLM that replies with a fixed text (or fails) and records requests.
pub(crate) struct ScriptedLlm {
    reply: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub(crate) fn replying(reply: String) -> Self {
        Self {
            reply: Some(reply),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            reply: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (Decimal::ZERO, Decimal::ZERO)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        match &self.reply {
            Some(content) => Ok(CompletionResponse {
                content: content.clone(),
                input_tokens: 100,
                output_tokens: 200,
                finish_reason: FinishReason::Stop,
                response_id: None,
            }),
            None => Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

/// Generator double: counts calls, optionally sleeps or fails.
pub(crate) struct StubGenerator {
    calls: AtomicUsize,
    demand_level: DemandLevel,
    delay: Option<Duration>,
    fail: bool,
}

impl StubGenerator {
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            demand_level: DemandLevel::High,
            delay: None,
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub(crate) fn with_demand_level(mut self, level: DemandLevel) -> Self {
        self.demand_level = level;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InsightGenerator for StubGenerator {
    async fn generate(&self, _category: &Category) -> Result<GeneratedInsight, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(LlmError::InvalidResponse {
                provider: "stub".to_string(),
                reason: "no JSON object in reply".to_string(),
            });
        }
        let mut generated = sample_generated().normalized();
        generated.demand_level = self.demand_level;
        Ok(generated)
    }
}

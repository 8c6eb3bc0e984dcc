//! Industry insights: the cached, AI-generated market analysis shared by
//! every profile in a category.

pub mod generator;
pub mod model;
mod store;

pub use generator::{GeneratorConfig, InsightGenerator, LlmInsightGenerator};
pub use model::{Category, DemandLevel, GeneratedInsight, Insight, MarketOutlook, SalaryRange};
pub use store::{InsightStore, PreparedInsight, RefreshOutcome, RefreshReport};

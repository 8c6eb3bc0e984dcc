//! Industry insight data model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key of an insight: the industry a profile belongs to, e.g. `tech-software`.
///
/// Always trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Category(String);

/// Rejected category input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Industry is required")]
pub struct EmptyCategory;

impl Category {
    pub fn parse(raw: &str) -> Result<Self, EmptyCategory> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EmptyCategory);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Category {
    type Err = EmptyCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// How much hiring demand an industry currently has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DemandLevel {
    Low,
    Medium,
    High,
}

impl DemandLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for DemandLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown demand level '{other}'")),
        }
    }
}

impl TryFrom<String> for DemandLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DemandLevel> for String {
    fn from(level: DemandLevel) -> Self {
        level.as_str().to_string()
    }
}

impl fmt::Display for DemandLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall direction of an industry's job market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MarketOutlook {
    Positive,
    Neutral,
    Negative,
}

impl MarketOutlook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl FromStr for MarketOutlook {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            "negative" => Ok(Self::Negative),
            other => Err(format!("unknown market outlook '{other}'")),
        }
    }
}

impl TryFrom<String> for MarketOutlook {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MarketOutlook> for String {
    fn from(outlook: MarketOutlook) -> Self {
        outlook.as_str().to_string()
    }
}

impl fmt::Display for MarketOutlook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Yearly salary band for one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryRange {
    pub role: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub min: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub max: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub median: Decimal,
    #[serde(default)]
    pub location: String,
}

impl SalaryRange {
    /// `min <= median <= max`, all non-negative.
    pub fn is_consistent(&self) -> bool {
        self.min >= Decimal::ZERO && self.min <= self.median && self.median <= self.max
    }
}

/// Generator output: everything in an [`Insight`] except bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedInsight {
    pub salary_ranges: Vec<SalaryRange>,
    pub growth_rate: f64,
    pub demand_level: DemandLevel,
    pub top_skills: Vec<String>,
    pub market_outlook: MarketOutlook,
    pub key_trends: Vec<String>,
    pub recommended_skills: Vec<String>,
}

impl GeneratedInsight {
    /// Trim and de-duplicate the skill sets, drop blank trends.
    pub fn normalized(mut self) -> Self {
        self.top_skills = normalize_labels(self.top_skills);
        self.recommended_skills = normalize_labels(self.recommended_skills);
        self.key_trends = self
            .key_trends
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }
}

/// Cached knowledge about one category. One row per category, refreshed in
/// place once `next_update` has passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: Uuid,
    pub category: Category,
    pub salary_ranges: Vec<SalaryRange>,
    pub growth_rate: f64,
    pub demand_level: DemandLevel,
    pub top_skills: Vec<String>,
    pub market_outlook: MarketOutlook,
    pub key_trends: Vec<String>,
    pub recommended_skills: Vec<String>,
    pub last_updated: DateTime<Utc>,
    pub next_update: DateTime<Utc>,
}

impl Insight {
    pub fn new(
        category: Category,
        generated: GeneratedInsight,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        let generated = generated.normalized();
        Self {
            id: Uuid::new_v4(),
            category,
            salary_ranges: generated.salary_ranges,
            growth_rate: generated.growth_rate,
            demand_level: generated.demand_level,
            top_skills: generated.top_skills,
            market_outlook: generated.market_outlook,
            key_trends: generated.key_trends,
            recommended_skills: generated.recommended_skills,
            last_updated: now,
            next_update: now + ttl,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_update
    }

    /// Replace the generated fields, keeping id and category.
    pub fn refreshed(
        &self,
        generated: GeneratedInsight,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            id: self.id,
            ..Self::new(self.category.clone(), generated, now, ttl)
        }
    }
}

/// Trim, drop blanks, and de-duplicate while keeping first-seen order.
pub fn normalize_labels(labels: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        let label = label.trim();
        if label.is_empty() || out.iter().any(|seen| seen == label) {
            continue;
        }
        out.push(label.to_string());
    }
    out
}

//! Career profile data model and update payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ProfileError;
use crate::identity::IdentityId;
use crate::insights::model::{Category, Insight, normalize_labels};

/// One user's career attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub identity: IdentityId,
    pub category: Option<Category>,
    pub experience_years: Option<u32>,
    pub bio: Option<String>,
    pub skills: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// A profile is onboarded once it points at an industry.
    pub fn is_onboarded(&self) -> bool {
        self.category.is_some()
    }
}

/// Validated input of a profile update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileUpdate {
    pub category: Category,
    pub experience_years: Option<u32>,
    pub bio: Option<String>,
    pub skills: Vec<String>,
}

impl ProfileUpdate {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            experience_years: None,
            bio: None,
            skills: Vec::new(),
        }
    }

    pub fn with_experience_years(mut self, years: u32) -> Self {
        self.experience_years = Some(years);
        self
    }

    /// Blank bios are stored as no bio.
    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        let bio = bio.into();
        self.bio = if bio.trim().is_empty() { None } else { Some(bio) };
        self
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = normalize_labels(skills.into_iter().map(Into::into).collect());
        self
    }

    /// Validate a loosely-typed payload (e.g. a submitted form).
    ///
    /// `industry` is accepted as an alias of `category`, and `experience`
    /// of `experience_years`. Anything unusable in the optional fields is
    /// treated as absent; `skills` that is not an array of strings becomes
    /// an empty set.
    pub fn from_json(payload: &Value) -> Result<Self, ProfileError> {
        let category = field(payload, &["category", "industry"])
            .and_then(Value::as_str)
            .and_then(|raw| Category::parse(raw).ok())
            .ok_or_else(|| ProfileError::Validation("Industry is required".to_string()))?;

        let experience_years = field(payload, &["experience_years", "experienceYears", "experience"])
            .and_then(Value::as_u64)
            .and_then(|years| u32::try_from(years).ok());

        let mut update = Self::new(category);
        update.experience_years = experience_years;

        if let Some(bio) = field(payload, &["bio"]).and_then(Value::as_str) {
            update = update.with_bio(bio);
        }

        let skills: Option<Vec<String>> = field(payload, &["skills"])
            .and_then(Value::as_array)
            .and_then(|items| {
                items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect()
            });
        if let Some(skills) = skills {
            update = update.with_skills(skills);
        }

        Ok(update)
    }
}

/// First non-null value among `keys`.
fn field<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find(|value| !value.is_null())
}

/// Result of a successful update: the profile and the insight it now points at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatedProfile {
    pub profile: Profile,
    pub insight: Insight,
}

/// The onboarding-relevant projection of a profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSnapshot {
    pub category: Option<Category>,
    pub experience_years: Option<u32>,
    pub bio: Option<String>,
    pub skills: Vec<String>,
    pub insight: Option<Insight>,
}

impl ProfileSnapshot {
    pub fn new(profile: Profile, insight: Option<Insight>) -> Self {
        Self {
            category: profile.category,
            experience_years: profile.experience_years,
            bio: profile.bio,
            skills: profile.skills,
            insight,
        }
    }
}

/// Whether a user has picked an industry yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnboardingStatus {
    pub is_onboarded: bool,
    pub profile: Option<ProfileSnapshot>,
}

impl OnboardingStatus {
    pub fn from_snapshot(profile: Option<ProfileSnapshot>) -> Self {
        Self {
            is_onboarded: profile.as_ref().is_some_and(|p| p.category.is_some()),
            profile,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn full_payload() {
        let update = ProfileUpdate::from_json(&json!({
            "industry": "tech-software",
            "experience": 3,
            "bio": "Backend dev",
            "skills": ["Go", "Rust", "Go"]
        }))
        .unwrap();

        assert_eq!(update.category.as_str(), "tech-software");
        assert_eq!(update.experience_years, Some(3));
        assert_eq!(update.bio.as_deref(), Some("Backend dev"));
        assert_eq!(update.skills, vec!["Go", "Rust"]);
    }

    #[test]
    fn missing_category_is_validation_error() {
        for payload in [json!({}), json!({"category": ""}), json!({"industry": 42}), json!({"category": null})] {
            let err = ProfileUpdate::from_json(&payload).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "payload {payload}");
            assert_eq!(err.to_string(), "Industry is required");
        }
    }

    #[test]
    fn bad_optional_fields_become_absent() {
        let update = ProfileUpdate::from_json(&json!({
            "category": "finance",
            "experienceYears": -2,
            "bio": "   ",
            "skills": "Go, Rust"
        }))
        .unwrap();

        assert_eq!(update.experience_years, None);
        assert_eq!(update.bio, None);
        assert!(update.skills.is_empty());
    }

    #[test]
    fn mixed_skill_array_is_coerced_to_empty() {
        let update = ProfileUpdate::from_json(&json!({
            "category": "finance",
            "skills": ["Excel", 7]
        }))
        .unwrap();
        assert!(update.skills.is_empty());
    }

    #[test]
    fn zero_experience_is_kept() {
        let update = ProfileUpdate::from_json(&json!({"category": "finance", "experience_years": 0}))
            .unwrap();
        assert_eq!(update.experience_years, Some(0));
    }

    #[test]
    fn onboarding_status_derivation() {
        assert!(!OnboardingStatus::from_snapshot(None).is_onboarded);

        let snapshot = ProfileSnapshot {
            category: None,
            experience_years: None,
            bio: None,
            skills: Vec::new(),
            insight: None,
        };
        let status = OnboardingStatus::from_snapshot(Some(snapshot.clone()));
        assert!(!status.is_onboarded);
        assert!(status.profile.is_some());

        let onboarded = ProfileSnapshot {
            category: Some(Category::parse("finance").unwrap()),
            ..snapshot
        };
        assert!(OnboardingStatus::from_snapshot(Some(onboarded)).is_onboarded);
    }
}

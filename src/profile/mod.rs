//! Career profiles: updates and onboarding status.

pub mod model;
mod service;

pub use model::{OnboardingStatus, Profile, ProfileSnapshot, ProfileUpdate, UpdatedProfile};
pub use service::{ProfileService, classify_database_error, classify_insight_error};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::auth::UserRole;

/// A `users` row with role `doctor`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub profile: DoctorProfile,
    #[serde(default)]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u32>,
}

impl Doctor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.profile.first_name, self.profile.last_name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DoctorProfile {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    #[serde(default)]
    pub specialty: String,
    #[serde(default)]
    pub qualifications: Vec<String>,
    #[serde(default)]
    pub experience: i32,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub license_number: String,
    pub hospital_affiliation: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorSearchQuery {
    /// Case-insensitive match on first name, last name or specialty
    pub search: Option<String>,
    /// Exact specialty
    pub specialty: Option<String>,
}

impl DoctorSearchQuery {
    pub fn matches(&self, doctor: &Doctor) -> bool {
        let profile = &doctor.profile;

        if let Some(specialty) = self.specialty.as_deref().filter(|s| !s.is_empty()) {
            if profile.specialty != specialty {
                return false;
            }
        }

        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => {
                let term = term.to_lowercase();
                profile.first_name.to_lowercase().contains(&term)
                    || profile.last_name.to_lowercase().contains(&term)
                    || profile.specialty.to_lowercase().contains(&term)
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Doctor directory timed out")]
    Timeout,

    #[error("Doctor directory unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doctor(first: &str, last: &str, specialty: &str) -> Doctor {
        Doctor {
            id: Uuid::new_v4(),
            email: format!("{}@example.com", first.to_lowercase()),
            role: UserRole::Doctor,
            profile: DoctorProfile {
                first_name: first.to_string(),
                last_name: last.to_string(),
                specialty: specialty.to_string(),
                ..Default::default()
            },
            average_rating: None,
            review_count: None,
        }
    }

    #[test]
    fn test_search_is_case_insensitive_across_fields() {
        let sarah = doctor("Sarah", "Johnson", "Cardiology");
        let query = |term: &str| DoctorSearchQuery { search: Some(term.to_string()), specialty: None };

        assert!(query("sar").matches(&sarah));
        assert!(query("JOHN").matches(&sarah));
        assert!(query("cardio").matches(&sarah));
        assert!(!query("derm").matches(&sarah));
        assert!(query("  ").matches(&sarah));
    }

    #[test]
    fn test_specialty_filter_is_exact() {
        let sarah = doctor("Sarah", "Johnson", "Cardiology");
        let exact = DoctorSearchQuery { search: None, specialty: Some("Cardiology".to_string()) };
        let partial = DoctorSearchQuery { search: None, specialty: Some("cardiology".to_string()) };

        assert!(exact.matches(&sarah));
        assert!(!partial.matches(&sarah));
    }
}

//! Form submission records accepted by the local backend.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Which form on the page produced the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormType {
    GetAQuote,
    JoinOurTeam,
    Contact,
    Unknown,
}

impl FormType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormType::GetAQuote => "get-a-quote",
            FormType::JoinOurTeam => "join-our-team",
            FormType::Contact => "contact",
            FormType::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "get-a-quote" => Some(FormType::GetAQuote),
            "join-our-team" => Some(FormType::JoinOurTeam),
            "contact" => Some(FormType::Contact),
            "unknown" => Some(FormType::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    #[default]
    New,
    Read,
    Contacted,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Form type is required to be one of get-a-quote, join-our-team, contact, unknown")]
    InvalidFormType,
    #[error("Name is required")]
    MissingName,
    #[error("Email is required")]
    MissingEmail,
    #[error("Please add a valid email")]
    InvalidEmail,
}

/// Raw JSON body of `POST /api/submit-form`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionInput {
    pub form_type: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub company: Option<String>,
    pub budget: Option<String>,
    pub services_interested: Option<String>,
    pub page_url: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A validated, persisted submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmission {
    pub id: String,
    pub form_type: FormType,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services_interested: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    pub status: SubmissionStatus,
    /// milliseconds since epoch
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$")
        .unwrap_or_else(|err| panic!("invalid email regex: {err}"))
});

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl SubmissionInput {
    /// Validate and normalise into a record ready for storage.
    pub fn validate(self) -> Result<FormSubmission, ValidationError> {
        let form_type = match trimmed(self.form_type) {
            None => FormType::Unknown,
            Some(raw) => FormType::parse(&raw).ok_or(ValidationError::InvalidFormType)?,
        };
        let name = trimmed(self.name).ok_or(ValidationError::MissingName)?;
        let email = trimmed(self.email)
            .ok_or(ValidationError::MissingEmail)?
            .to_lowercase();
        if !EMAIL_PATTERN.is_match(&email) {
            return Err(ValidationError::InvalidEmail);
        }

        Ok(FormSubmission {
            id: Uuid::new_v4().to_string(),
            form_type,
            name,
            email,
            phone: trimmed(self.phone),
            message: trimmed(self.message),
            company: trimmed(self.company),
            budget: trimmed(self.budget),
            services_interested: trimmed(self.services_interested),
            page_url: trimmed(self.page_url),
            status: SubmissionStatus::New,
            created_at: Utc::now().timestamp_millis(),
            extra: self.extra,
        })
    }
}

/// Filter for listing submissions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionFilter {
    pub form_type: Option<FormType>,
}

/// One page of submissions, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedSubmissions {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub items: Vec<FormSubmission>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(json: serde_json::Value) -> SubmissionInput {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn missing_form_type_defaults_to_unknown() {
        let record = input(serde_json::json!({
            "name": "  Ada ",
            "email": "Ada@Example.COM",
            "budget": "10k",
            "newsletter": true
        }))
        .validate()
        .expect("valid submission");
        assert_eq!(record.form_type, FormType::Unknown);
        assert_eq!(record.name, "Ada");
        assert_eq!(record.email, "ada@example.com");
        assert_eq!(record.budget.as_deref(), Some("10k"));
        assert_eq!(record.extra.get("newsletter"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn rejects_bad_form_type_and_missing_fields() {
        let err = input(serde_json::json!({
            "formType": "spam", "name": "A", "email": "a@b.com"
        }))
        .validate()
        .unwrap_err();
        assert_eq!(err, ValidationError::InvalidFormType);

        let err = input(serde_json::json!({ "formType": "contact", "email": "a@b.com" }))
            .validate()
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingName);

        let err = input(serde_json::json!({ "name": "A", "email": "not-an-email" }))
            .validate()
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidEmail);
    }
}

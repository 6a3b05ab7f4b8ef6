#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::{ContractViolation, UtcSeconds, Validate};
use crate::ticket::TicketKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Contact,
    Newsletter,
    Onboarding,
    GardenInterest,
}

impl SubmissionKind {
    pub fn ticket_kind(self) -> TicketKind {
        match self {
            // Contact submissions persist as questions; the original
            // support queue triages them under that kind.
            SubmissionKind::Contact => TicketKind::Question,
            SubmissionKind::Newsletter => TicketKind::Newsletter,
            SubmissionKind::Onboarding => TicketKind::Onboarding,
            SubmissionKind::GardenInterest => TicketKind::GardenInterest,
        }
    }
}

/// One raw form field: scalar for text/radio inputs, list for
/// multi-selects and checkbox groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
    Scalar(String),
    List(Vec<String>),
}

pub type RawSubmission = BTreeMap<String, FormValue>;

pub fn scalar<'a>(raw: &'a RawSubmission, key: &str) -> Option<&'a str> {
    match raw.get(key) {
        Some(FormValue::Scalar(v)) => Some(v.as_str()),
        Some(FormValue::List(vs)) => vs.first().map(String::as_str),
        None => None,
    }
}

pub fn list<'a>(raw: &'a RawSubmission, key: &str) -> Vec<&'a str> {
    match raw.get(key) {
        Some(FormValue::List(vs)) => vs.iter().map(String::as_str).collect(),
        Some(FormValue::Scalar(v)) if !v.is_empty() => vec![v.as_str()],
        _ => Vec::new(),
    }
}

/// Field-scoped validation errors in first-insertion order, so a
/// client renders messages in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors {
    errors: Vec<(String, String)>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let field = field.into();
        if !self.errors.iter().any(|(f, _)| *f == field) {
            self.errors.push((field, message.into()));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.errors.iter().any(|(f, _)| f == field)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, m)| m.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors.iter().map(|(f, m)| (f.as_str(), m.as_str()))
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.errors.into_iter().collect()
    }
}

/// Per-request context handed to every validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub client_ip: String,
    pub now: UtcSeconds,
    pub session_id: Option<String>,
}

/// Server-issued math challenge and timing state, minted when a form
/// page is served and consumed on submit. Single writer, single
/// reader per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedChallenge {
    pub a: u8,
    pub b: u8,
    pub start_at: UtcSeconds,
    pub expires_at: UtcSeconds,
}

impl IssuedChallenge {
    pub fn answer(&self) -> u16 {
        u16::from(self.a) + u16::from(self.b)
    }
}

impl Validate for IssuedChallenge {
    fn validate(&self) -> Result<(), ContractViolation> {
        for (field, v) in [
            ("issued_challenge.a", self.a),
            ("issued_challenge.b", self.b),
        ] {
            if !(1..=10).contains(&v) {
                return Err(ContractViolation::InvalidRange {
                    field,
                    min: 1.0,
                    max: 10.0,
                    got: f64::from(v),
                });
            }
        }
        if self.expires_at < self.start_at {
            return Err(ContractViolation::InvalidValue {
                field: "issued_challenge.expires_at",
                reason: "must be >= start_at",
            });
        }
        Ok(())
    }
}

/// One titled block of label/value pairs carried into the persisted
/// ticket message (onboarding and garden submissions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSection {
    pub title: String,
    pub fields: Vec<(String, String)>,
}

/// The validated payload handed from the form engine to persistence
/// and dispatch. Transient; never stored as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSubmission {
    pub kind: SubmissionKind,
    /// Assembled full name ("first [middle] last" for onboarding).
    pub name: String,
    /// Lowercased and trimmed.
    pub email: String,
    pub company: Option<String>,
    pub subject: String,
    pub message: String,
    /// Structured detail sections; empty for contact and newsletter.
    pub sections: Vec<SubmissionSection>,
}

impl Validate for ContactSubmission {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.name.trim().is_empty() {
            return Err(ContractViolation::MissingField {
                field: "contact_submission.name",
            });
        }
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err(ContractViolation::InvalidValue {
                field: "contact_submission.email",
                reason: "must be a plausible email",
            });
        }
        if self.email != self.email.trim().to_lowercase() {
            return Err(ContractViolation::InvalidValue {
                field: "contact_submission.email",
                reason: "must be normalized lowercase",
            });
        }
        Ok(())
    }
}

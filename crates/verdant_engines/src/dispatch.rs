#![forbid(unsafe_code)]

//! Best-effort forwarding of accepted submissions to the external
//! platform. A dispatch failure is classified and handed back to the
//! caller for logging and email fallback; it never becomes a user
//! error.

use std::time::Duration;

use serde_json::{json, Value};

use verdant_contracts::config::DispatcherConfig;
use verdant_contracts::submission::{ContactSubmission, SubmissionKind};

pub const HEALTH_CHECK_TIMEOUT_SECONDS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    Timeout,
    Tls,
    Dns,
    Connection,
    Transport { detail: String },
    HttpStatus { status: u16 },
    MalformedResponse { detail: String },
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Timeout => "timeout",
            DispatchError::Tls => "tls",
            DispatchError::Dns => "dns",
            DispatchError::Connection => "connection",
            DispatchError::Transport { .. } => "transport",
            DispatchError::HttpStatus { .. } => "http_status",
            DispatchError::MalformedResponse { .. } => "malformed_response",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Accepted {
        external_reference: Option<String>,
    },
}

/// Last-resort delivery channel used when the platform is down. The
/// implementation is chosen at bootstrap; tests inject a recorder.
pub trait FallbackMailer {
    fn send(&mut self, to: &str, subject: &str, body: &str) -> Result<(), String>;
}

/// Plain-text fallback message carrying the original submission so a
/// human can re-enter it if the platform stays down.
pub fn compose_fallback_email(submission: &ContactSubmission) -> (String, String) {
    let subject = format!("[fallback] {}", submission.subject);
    let mut body = String::new();
    body.push_str(&format!("Name: {}\n", submission.name));
    body.push_str(&format!("Email: {}\n", submission.email));
    if let Some(company) = &submission.company {
        body.push_str(&format!("Company: {company}\n"));
    }
    body.push_str(&format!("Kind: {:?}\n\n", submission.kind));
    body.push_str(&submission.message);
    for section in &submission.sections {
        body.push_str(&format!("\n\n{}\n", section.title));
        for (label, value) in &section.fields {
            body.push_str(&format!("  {label}: {value}\n"));
        }
    }
    (subject, body)
}

fn kind_path(kind: SubmissionKind) -> &'static str {
    match kind {
        SubmissionKind::Contact => "contact/submit/",
        SubmissionKind::Newsletter => "newsletter/signup/",
        SubmissionKind::Onboarding => "onboarding/submit/",
        SubmissionKind::GardenInterest => "garden/interest/",
    }
}

fn dispatch_error_from_ureq(err: ureq::Error) -> DispatchError {
    match err {
        ureq::Error::Status(status, _) => DispatchError::HttpStatus {
            status: status as u16,
        },
        ureq::Error::Transport(transport) => {
            let combined = format!("{:?} {}", transport.kind(), transport);
            classify_transport_error(&combined)
        }
    }
}

fn classify_transport_error(raw: &str) -> DispatchError {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timeout") {
        DispatchError::Timeout
    } else if lower.contains("tls") || lower.contains("ssl") {
        DispatchError::Tls
    } else if lower.contains("dns") {
        DispatchError::Dns
    } else if lower.contains("connection") || lower.contains("connect") {
        DispatchError::Connection
    } else {
        DispatchError::Transport {
            detail: raw.to_string(),
        }
    }
}

/// Pulls the platform's reference id out of an acceptance body. Both
/// key spellings are in the wild.
pub fn extract_external_reference(body: &Value) -> Option<String> {
    for key in ["external_reference", "submission_id"] {
        match body.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

#[derive(Debug)]
pub struct RemoteDispatcher {
    config: DispatcherConfig,
    agent: ureq::Agent,
    quick_agent: ureq::Agent,
}

impl RemoteDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        let agent = agent_with_timeout(Duration::from_secs(config.api_timeout_seconds));
        let quick_agent = agent_with_timeout(Duration::from_secs(config.quick_timeout_seconds));
        Self {
            config,
            agent,
            quick_agent,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/{path}")
    }

    /// POSTs the submission payload to the platform. `quick` switches
    /// to the short timeout for latency-sensitive callers.
    pub fn dispatch(
        &self,
        submission: &ContactSubmission,
        quick: bool,
    ) -> Result<DispatchResult, DispatchError> {
        let url = self.endpoint(kind_path(submission.kind));
        let payload = dispatch_payload(submission);
        let agent = if quick { &self.quick_agent } else { &self.agent };
        let response = agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(payload)
            .map_err(dispatch_error_from_ureq)?;
        let status = response.status();
        if status != 200 && status != 201 {
            return Err(DispatchError::HttpStatus { status });
        }
        let body: Value = response
            .into_json()
            .map_err(|e| DispatchError::MalformedResponse {
                detail: e.to_string(),
            })?;
        Ok(DispatchResult::Accepted {
            external_reference: extract_external_reference(&body),
        })
    }

    /// Liveness probe against the platform's health endpoint.
    pub fn health_check(&self) -> Result<(), DispatchError> {
        let url = self.endpoint("health/");
        let agent = agent_with_timeout(Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECONDS));
        agent.get(&url).call().map_err(dispatch_error_from_ureq)?;
        Ok(())
    }
}

fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent("verdant-site/0.1")
        .build()
}

fn dispatch_payload(submission: &ContactSubmission) -> Value {
    let sections: Vec<Value> = submission
        .sections
        .iter()
        .map(|s| {
            json!({
                "title": s.title,
                "fields": s.fields.iter().map(|(label, value)| {
                    json!({ "label": label, "value": value })
                }).collect::<Vec<Value>>(),
            })
        })
        .collect();
    json!({
        "kind": submission.kind,
        "name": submission.name,
        "email": submission.email,
        "company": submission.company,
        "subject": submission.subject,
        "message": submission.message,
        "sections": sections,
    })
}

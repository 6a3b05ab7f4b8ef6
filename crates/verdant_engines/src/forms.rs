#![forbid(unsafe_code)]

//! Form validation runtimes. Each public form kind gets one validator
//! over the same raw field map; shared anti-abuse rules (honeypots,
//! fill timing, math challenge, per-IP rate limit) run before the
//! field-level schema. Validators are deterministic given their inputs
//! and perform no I/O.

use std::collections::BTreeMap;

use rand::Rng;

use verdant_contracts::submission::{
    list, scalar, ContactSubmission, FieldErrors, IssuedChallenge, RawSubmission, RequestContext,
    SubmissionKind, SubmissionSection,
};
use verdant_contracts::UtcSeconds;

use crate::antispam;

/// User-facing copy. Spam rejections deliberately reuse the generic
/// message so a spammer cannot tell which rule fired.
pub mod messages {
    pub const GENERIC_PROBLEM: &str =
        "There was a problem with your submission. Please try again.";
    pub const RATE_LIMITED: &str =
        "Too many submissions from your address. Please wait an hour and try again.";
    pub const CHALLENGE_WRONG: &str = "Incorrect answer to the verification question.";
    pub const CHALLENGE_EXPIRED: &str =
        "The verification question has expired. Please reload the page.";
}

pub const CONTACT_SUBJECTS: &[&str] = &[
    "general",
    "investment_inquiry",
    "partnership",
    "adviser_partnership",
    "institutional",
    "compliance",
    "support",
];

pub const PRONOUN_CHOICES: &[&str] = &["he/him", "she/her", "they/them", "other"];

pub const EMPLOYMENT_STATUSES: &[&str] = &[
    "full_time",
    "part_time",
    "self_employed",
    "retired",
    "unemployed",
];

/// Statuses whose holders must also name an employer and title.
pub const EMPLOYED_STATUSES: &[&str] = &["full_time", "part_time", "self_employed"];

pub const MARITAL_STATUSES: &[&str] = &[
    "single",
    "married",
    "domestic_partnership",
    "divorced",
    "widowed",
];

pub const LIKERT_CHOICES: &[&str] = &[
    "strongly_agree",
    "agree",
    "neutral",
    "disagree",
    "strongly_disagree",
];

/// The seven risk-profile statements, answered on the Likert scale.
pub const RISK_ITEMS: &[&str] = &[
    "risk_experience",
    "risk_drawdown_comfort",
    "risk_long_horizon",
    "risk_stability_preference",
    "risk_growth_focus",
    "risk_loss_reaction",
    "risk_ethics_priority",
];

pub const ETHICAL_CONSIDERATIONS: &[&str] = &[
    "fossil_fuels",
    "weapons",
    "tobacco",
    "animal_testing",
    "private_prisons",
    "human_rights",
    "environment",
    "other",
];

pub const DIVESTMENT_MOVEMENTS: &[&str] = &[
    "fossil_free",
    "tobacco_free",
    "weapons_divestment",
    "prison_divestment",
    "other",
];

pub const INVESTMENT_EXPERIENCE: &[&str] = &["none", "limited", "good", "extensive"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormEngineConfig {
    pub min_fill_seconds: i64,
    pub max_fill_seconds: i64,
    pub rate_window_seconds: i64,
    pub rate_max: u32,
    /// Pins the math challenge to (1, 1) so end-to-end tests can
    /// submit without scraping the rendered question.
    pub deterministic_test_mode: bool,
}

impl FormEngineConfig {
    pub fn mvp_v1() -> Self {
        Self {
            min_fill_seconds: 10,
            max_fill_seconds: 3600,
            rate_window_seconds: 3600,
            rate_max: 3,
            deterministic_test_mode: false,
        }
    }

    pub fn test_mode() -> Self {
        Self {
            deterministic_test_mode: true,
            ..Self::mvp_v1()
        }
    }
}

/// Sliding-window attempt counter keyed by client IP. Backed by the
/// shared cache in production; in-memory everywhere else.
pub trait RateCounter {
    fn attempts_since(&self, client_ip: &str, window_start: UtcSeconds) -> u32;
    fn record_attempt(&mut self, client_ip: &str, at: UtcSeconds);
}

#[derive(Debug, Default)]
pub struct MemRateCounter {
    attempts: BTreeMap<String, Vec<UtcSeconds>>,
}

impl MemRateCounter {
    pub fn new_in_memory() -> Self {
        Self::default()
    }
}

impl RateCounter for MemRateCounter {
    fn attempts_since(&self, client_ip: &str, window_start: UtcSeconds) -> u32 {
        self.attempts
            .get(client_ip)
            .map(|ts| ts.iter().filter(|t| **t >= window_start).count() as u32)
            .unwrap_or(0)
    }

    fn record_attempt(&mut self, client_ip: &str, at: UtcSeconds) {
        self.attempts
            .entry(client_ip.to_string())
            .or_default()
            .push(at);
    }
}

#[derive(Debug, Clone)]
pub struct FormEngine {
    config: FormEngineConfig,
}

impl FormEngine {
    pub fn new(config: FormEngineConfig) -> Self {
        Self { config }
    }

    pub fn mvp_v1() -> Self {
        Self::new(FormEngineConfig::mvp_v1())
    }

    pub fn config(&self) -> &FormEngineConfig {
        &self.config
    }

    /// Mints the math challenge served with a form page. Operands are
    /// uniform in [1, 10]; deterministic mode pins them to (1, 1).
    pub fn issue_challenge(&self, now: UtcSeconds) -> IssuedChallenge {
        let (a, b) = if self.config.deterministic_test_mode {
            (1, 1)
        } else {
            let mut rng = rand::thread_rng();
            (rng.gen_range(1..=10), rng.gen_range(1..=10))
        };
        IssuedChallenge {
            a,
            b,
            start_at: now,
            expires_at: now.saturating_add(self.config.max_fill_seconds),
        }
    }

    pub fn validate_contact(
        &self,
        raw: &RawSubmission,
        ctx: &RequestContext,
        challenge: Option<&IssuedChallenge>,
        rate: &mut dyn RateCounter,
    ) -> Result<ContactSubmission, FieldErrors> {
        let mut errors = FieldErrors::new();

        let window_start = UtcSeconds(ctx.now.0 - self.config.rate_window_seconds);
        if rate.attempts_since(&ctx.client_ip, window_start) >= self.config.rate_max {
            errors.push("__all__", messages::RATE_LIMITED);
            return Err(errors);
        }
        rate.record_attempt(&ctx.client_ip, ctx.now);

        self.check_honeypots(raw, &mut errors);
        self.check_timing(raw, ctx.now, &mut errors);
        if let Some(challenge) = challenge {
            self.check_challenge(raw, challenge, ctx.now, &mut errors);
        }

        let name = required_text(raw, "name", 100, &mut errors);
        let email = required_email(raw, "email", &mut errors);
        let company = optional_text(raw, "company", 200);
        let subject = required_choice(raw, "subject", CONTACT_SUBJECTS, &mut errors);

        let message = scalar(raw, "message").map(str::trim).unwrap_or("");
        if message.len() < 10 {
            errors.push("message", "Message must be at least 10 characters.");
        } else if message.len() > 2000 {
            errors.push("message", "Message must be at most 2000 characters.");
        } else if antispam::is_spam_content(message) {
            errors.push("message", messages::GENERIC_PROBLEM);
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(ContactSubmission {
            kind: SubmissionKind::Contact,
            name,
            email,
            company,
            subject,
            message: message.to_string(),
            sections: Vec::new(),
        })
    }

    pub fn validate_newsletter(
        &self,
        raw: &RawSubmission,
        _ctx: &RequestContext,
    ) -> Result<ContactSubmission, FieldErrors> {
        let mut errors = FieldErrors::new();
        self.check_honeypots(raw, &mut errors);

        let email = required_email(raw, "email", &mut errors);
        let consent = scalar(raw, "consent")
            .map(|v| v == "true" || v == "on" || v == "yes")
            .unwrap_or(false);

        if !errors.is_empty() {
            return Err(errors);
        }
        let message = if consent {
            format!("Newsletter signup from {email} (consent given)")
        } else {
            format!("Newsletter signup from {email}")
        };
        Ok(ContactSubmission {
            kind: SubmissionKind::Newsletter,
            name: "Newsletter Subscriber".to_string(),
            email,
            company: None,
            subject: "Newsletter Signup".to_string(),
            message,
            sections: Vec::new(),
        })
    }

    pub fn validate_onboarding(
        &self,
        raw: &RawSubmission,
        ctx: &RequestContext,
    ) -> Result<ContactSubmission, FieldErrors> {
        let mut errors = FieldErrors::new();
        self.check_honeypots(raw, &mut errors);
        self.check_timing(raw, ctx.now, &mut errors);

        let first_name = required_text(raw, "first_name", 100, &mut errors);
        let middle_name = optional_text(raw, "middle_name", 100);
        let last_name = required_text(raw, "last_name", 100, &mut errors);
        let email = required_email(raw, "email", &mut errors);
        let phone = required_text(raw, "phone", 40, &mut errors);
        let birthday = required_text(raw, "birthday", 40, &mut errors);

        let pronouns = required_choice(raw, "pronouns", PRONOUN_CHOICES, &mut errors);
        let street_address = required_text(raw, "street_address", 300, &mut errors);
        if !street_address.is_empty() && antispam::looks_like_po_box(&street_address) {
            errors.push(
                "street_address",
                "A physical street address is required; P.O. Boxes cannot be accepted.",
            );
        }
        let city = required_text(raw, "city", 100, &mut errors);
        let state = required_text(raw, "state", 100, &mut errors);
        let zip = required_text(raw, "zip", 20, &mut errors);
        let country = optional_text(raw, "country", 100)
            .unwrap_or_else(|| "United States".to_string());

        let employment_status =
            required_choice(raw, "employment_status", EMPLOYMENT_STATUSES, &mut errors);
        let marital_status =
            required_choice(raw, "marital_status", MARITAL_STATUSES, &mut errors);

        // Conditional post-pass: every cross-field rule lives here, not
        // in the field-level checks above.
        self.onboarding_post_pass(raw, &employment_status, &mut errors);

        for item in RISK_ITEMS {
            required_choice(raw, item, LIKERT_CHOICES, &mut errors);
        }

        let ethical = checked_multi(
            raw,
            "ethical_considerations",
            ETHICAL_CONSIDERATIONS,
            &mut errors,
        );
        let divestments = checked_multi(
            raw,
            "divestment_movements",
            DIVESTMENT_MOVEMENTS,
            &mut errors,
        );

        if let Some(exp) = scalar(raw, "investment_experience") {
            if !INVESTMENT_EXPERIENCE.contains(&exp) {
                errors.push("investment_experience", "Select a valid option.");
            }
        }
        for field in ["net_worth", "liquid_assets", "initial_investment"] {
            if let Some(v) = scalar(raw, field) {
                if v.len() > 50 {
                    errors.push(field, "Value too long.");
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let full_name = match &middle_name {
            Some(middle) => format!("{first_name} {middle} {last_name}"),
            None => format!("{first_name} {last_name}"),
        };
        let sections = onboarding_sections(
            raw,
            &full_name,
            &email,
            &phone,
            &birthday,
            &pronouns,
            &street_address,
            &city,
            &state,
            &zip,
            &country,
            &employment_status,
            &marital_status,
            &ethical,
            &divestments,
        );
        Ok(ContactSubmission {
            kind: SubmissionKind::Onboarding,
            name: full_name.clone(),
            email,
            company: None,
            subject: format!("Onboarding Application - {full_name}"),
            message: format!("Onboarding application from {full_name}."),
            sections,
        })
    }

    pub fn validate_garden_interest(
        &self,
        raw: &RawSubmission,
        _ctx: &RequestContext,
    ) -> Result<ContactSubmission, FieldErrors> {
        let mut errors = FieldErrors::new();
        self.check_honeypots(raw, &mut errors);

        let name = required_text(raw, "name", 100, &mut errors);
        let email = required_email(raw, "email", &mut errors);
        let company = optional_text(raw, "company", 200);
        let interest = optional_text(raw, "interest", 2000)
            .unwrap_or_else(|| "Platform interest registered.".to_string());

        if !errors.is_empty() {
            return Err(errors);
        }
        let sections = vec![SubmissionSection {
            title: "Platform Interest".to_string(),
            fields: vec![
                ("Name".to_string(), name.clone()),
                ("Email".to_string(), email.clone()),
                (
                    "Company".to_string(),
                    company.clone().unwrap_or_else(|| "Individual".to_string()),
                ),
                ("Interest".to_string(), interest.clone()),
            ],
        }];
        Ok(ContactSubmission {
            kind: SubmissionKind::GardenInterest,
            name,
            email,
            company,
            subject: "Garden Platform Interest".to_string(),
            message: interest,
            sections,
        })
    }

    fn check_honeypots(&self, raw: &RawSubmission, errors: &mut FieldErrors) {
        for field in ["website", "honeypot"] {
            if scalar(raw, field).map(str::trim).unwrap_or("").is_empty() {
                continue;
            }
            errors.push(field, messages::GENERIC_PROBLEM);
        }
    }

    /// Fill-time window from the hidden `form_start_time` field. The
    /// rule is skipped when the field is absent or unparseable so a
    /// stripped-down client is not rejected outright.
    fn check_timing(&self, raw: &RawSubmission, now: UtcSeconds, errors: &mut FieldErrors) {
        let Some(start) = scalar(raw, "form_start_time").and_then(|v| v.trim().parse::<i64>().ok())
        else {
            return;
        };
        let elapsed = now.seconds_since(UtcSeconds(start));
        if elapsed < self.config.min_fill_seconds || elapsed > self.config.max_fill_seconds {
            errors.push("form_start_time", messages::GENERIC_PROBLEM);
        }
    }

    fn check_challenge(
        &self,
        raw: &RawSubmission,
        challenge: &IssuedChallenge,
        now: UtcSeconds,
        errors: &mut FieldErrors,
    ) {
        if now > challenge.expires_at {
            errors.push("human_check", messages::CHALLENGE_EXPIRED);
            return;
        }
        let answered = scalar(raw, "human_check")
            .and_then(|v| v.trim().parse::<u16>().ok());
        if answered != Some(challenge.answer()) {
            errors.push("human_check", messages::CHALLENGE_WRONG);
        }
    }

    fn onboarding_post_pass(
        &self,
        raw: &RawSubmission,
        employment_status: &str,
        errors: &mut FieldErrors,
    ) {
        if EMPLOYED_STATUSES.contains(&employment_status) {
            require_present(raw, "employer_name", errors);
            require_present(raw, "job_title", errors);
        }

        if scalar(raw, "pronouns") == Some("other") {
            require_present(raw, "pronouns_other", errors);
        }

        if scalar(raw, "add_co_client") == Some("yes") {
            for field in [
                "co_client_first_name",
                "co_client_last_name",
                "co_client_email",
                "co_client_phone",
                "co_client_birthday",
                "co_client_employment_status",
            ] {
                require_present(raw, field, errors);
            }
            if let Some(status) = scalar(raw, "co_client_employment_status") {
                if EMPLOYED_STATUSES.contains(&status) {
                    require_present(raw, "co_client_employer_name", errors);
                }
            }
            if scalar(raw, "co_client_pronouns") == Some("other") {
                require_present(raw, "co_client_pronouns_other", errors);
            }
            if scalar(raw, "co_client_shares_address") != Some("yes") {
                require_present(raw, "co_client_mailing_address", errors);
            }
        }

        // Any "other" selection in a multi-select needs its free-text
        // companion.
        if list(raw, "ethical_considerations").contains(&"other") {
            require_present(raw, "ethical_considerations_other", errors);
        }
        if list(raw, "divestment_movements").contains(&"other") {
            require_present(raw, "divestment_movements_other", errors);
        }
    }
}

fn required_text(
    raw: &RawSubmission,
    field: &str,
    max_len: usize,
    errors: &mut FieldErrors,
) -> String {
    let value = scalar(raw, field).map(str::trim).unwrap_or("");
    if value.is_empty() {
        errors.push(field, "This field is required.");
    } else if value.len() > max_len {
        errors.push(field, "Value too long.");
    }
    value.to_string()
}

fn optional_text(raw: &RawSubmission, field: &str, max_len: usize) -> Option<String> {
    scalar(raw, field)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            let mut v = v.to_string();
            v.truncate(max_len);
            v
        })
}

fn required_email(raw: &RawSubmission, field: &str, errors: &mut FieldErrors) -> String {
    let value = scalar(raw, field).map(str::trim).unwrap_or("");
    if value.is_empty() {
        errors.push(field, "This field is required.");
        return String::new();
    }
    let normalized = value.to_lowercase();
    if !plausible_email(&normalized) {
        errors.push(field, "Enter a valid email address.");
    } else if antispam::is_blocked_email_domain(&normalized) {
        errors.push(field, "Enter a valid email address.");
    }
    normalized
}

fn plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

fn required_choice(
    raw: &RawSubmission,
    field: &str,
    allowed: &[&str],
    errors: &mut FieldErrors,
) -> String {
    let value = scalar(raw, field).map(str::trim).unwrap_or("");
    if value.is_empty() {
        errors.push(field, "This field is required.");
    } else if !allowed.contains(&value) {
        errors.push(field, "Select a valid option.");
    }
    value.to_string()
}

fn checked_multi(
    raw: &RawSubmission,
    field: &str,
    allowed: &[&str],
    errors: &mut FieldErrors,
) -> Vec<String> {
    let chosen = list(raw, field);
    for choice in &chosen {
        if !allowed.contains(choice) {
            errors.push(field, "Select valid options.");
            break;
        }
    }
    chosen.into_iter().map(str::to_string).collect()
}

fn require_present(raw: &RawSubmission, field: &str, errors: &mut FieldErrors) {
    if scalar(raw, field).map(str::trim).unwrap_or("").is_empty() {
        errors.push(field, "This field is required.");
    }
}

#[allow(clippy::too_many_arguments)]
fn onboarding_sections(
    raw: &RawSubmission,
    full_name: &str,
    email: &str,
    phone: &str,
    birthday: &str,
    pronouns: &str,
    street_address: &str,
    city: &str,
    state: &str,
    zip: &str,
    country: &str,
    employment_status: &str,
    marital_status: &str,
    ethical: &[String],
    divestments: &[String],
) -> Vec<SubmissionSection> {
    let mut sections = Vec::new();

    let mut personal = vec![
        ("Name".to_string(), full_name.to_string()),
        ("Email".to_string(), email.to_string()),
        ("Phone".to_string(), phone.to_string()),
        ("Birthday".to_string(), birthday.to_string()),
        ("Pronouns".to_string(), pronouns.to_string()),
        (
            "Address".to_string(),
            format!("{street_address}, {city}, {state} {zip}, {country}"),
        ),
        ("Marital status".to_string(), marital_status.to_string()),
        (
            "Employment status".to_string(),
            employment_status.to_string(),
        ),
    ];
    if let Some(employer) = scalar(raw, "employer_name") {
        personal.push(("Employer".to_string(), employer.to_string()));
    }
    if let Some(title) = scalar(raw, "job_title") {
        personal.push(("Job title".to_string(), title.to_string()));
    }
    sections.push(SubmissionSection {
        title: "Personal Information".to_string(),
        fields: personal,
    });

    if scalar(raw, "add_co_client") == Some("yes") {
        let mut co = Vec::new();
        for (label, field) in [
            ("First name", "co_client_first_name"),
            ("Last name", "co_client_last_name"),
            ("Email", "co_client_email"),
            ("Phone", "co_client_phone"),
            ("Birthday", "co_client_birthday"),
            ("Pronouns", "co_client_pronouns"),
            ("Employment status", "co_client_employment_status"),
            ("Employer", "co_client_employer_name"),
            ("Mailing address", "co_client_mailing_address"),
        ] {
            if let Some(v) = scalar(raw, field) {
                if !v.trim().is_empty() {
                    co.push((label.to_string(), v.trim().to_string()));
                }
            }
        }
        sections.push(SubmissionSection {
            title: "Co-Client".to_string(),
            fields: co,
        });
    }

    let mut financial = Vec::new();
    for (label, field) in [
        ("Investment experience", "investment_experience"),
        ("Net worth", "net_worth"),
        ("Liquid assets", "liquid_assets"),
        ("Initial investment", "initial_investment"),
    ] {
        if let Some(v) = scalar(raw, field) {
            if !v.trim().is_empty() {
                financial.push((label.to_string(), v.trim().to_string()));
            }
        }
    }
    if !financial.is_empty() {
        sections.push(SubmissionSection {
            title: "Financial Overview".to_string(),
            fields: financial,
        });
    }

    let mut ethical_fields = Vec::new();
    if !ethical.is_empty() {
        ethical_fields.push(("Considerations".to_string(), ethical.join(", ")));
    }
    if let Some(other) = scalar(raw, "ethical_considerations_other") {
        if !other.trim().is_empty() {
            ethical_fields.push(("Considerations (other)".to_string(), other.to_string()));
        }
    }
    if !divestments.is_empty() {
        ethical_fields.push(("Divestment movements".to_string(), divestments.join(", ")));
    }
    if let Some(other) = scalar(raw, "divestment_movements_other") {
        if !other.trim().is_empty() {
            ethical_fields.push(("Divestments (other)".to_string(), other.to_string()));
        }
    }
    if !ethical_fields.is_empty() {
        sections.push(SubmissionSection {
            title: "Ethical Priorities".to_string(),
            fields: ethical_fields,
        });
    }

    let risk: Vec<(String, String)> = RISK_ITEMS
        .iter()
        .filter_map(|item| {
            scalar(raw, item).map(|v| (item.replace('_', " "), v.to_string()))
        })
        .collect();
    if !risk.is_empty() {
        sections.push(SubmissionSection {
            title: "Risk Profile".to_string(),
            fields: risk,
        });
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(now: i64) -> RequestContext {
        RequestContext {
            client_ip: "203.0.113.9".to_string(),
            now: UtcSeconds(now),
            session_id: Some("sess_1".to_string()),
        }
    }

    fn raw(pairs: &[(&str, &str)]) -> RawSubmission {
        pairs
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    verdant_contracts::submission::FormValue::Scalar(v.to_string()),
                )
            })
            .collect()
    }

    fn contact_payload(now: i64) -> RawSubmission {
        raw(&[
            ("name", "Test User"),
            ("email", "TEST@Example.COM"),
            ("subject", "general"),
            (
                "message",
                "I would like to learn more about your services.",
            ),
            ("human_check", "2"),
            ("honeypot", ""),
            ("website", ""),
            ("form_start_time", &(now - 15).to_string()),
        ])
    }

    fn challenge(now: i64) -> IssuedChallenge {
        IssuedChallenge {
            a: 1,
            b: 1,
            start_at: UtcSeconds(now - 15),
            expires_at: UtcSeconds(now + 3600),
        }
    }

    #[test]
    fn at_forms_01_valid_contact_normalizes_email() {
        let engine = FormEngine::new(FormEngineConfig::test_mode());
        let mut rate = MemRateCounter::new_in_memory();
        let now = 1_700_000_000;
        let out = engine
            .validate_contact(&contact_payload(now), &ctx(now), Some(&challenge(now)), &mut rate)
            .unwrap();
        assert_eq!(out.email, "test@example.com");
        assert_eq!(out.subject, "general");
        assert_eq!(out.kind, SubmissionKind::Contact);
    }

    #[test]
    fn at_forms_02_honeypot_rejects_with_generic_message() {
        let engine = FormEngine::new(FormEngineConfig::test_mode());
        let mut rate = MemRateCounter::new_in_memory();
        let now = 1_700_000_000;
        let mut payload = contact_payload(now);
        payload.insert(
            "honeypot".to_string(),
            verdant_contracts::submission::FormValue::Scalar("x".to_string()),
        );
        let errs = engine
            .validate_contact(&payload, &ctx(now), Some(&challenge(now)), &mut rate)
            .unwrap_err();
        assert_eq!(errs.get("honeypot"), Some(messages::GENERIC_PROBLEM));
    }

    #[test]
    fn at_forms_03_wrong_math_answer_rejects() {
        let engine = FormEngine::new(FormEngineConfig::test_mode());
        let mut rate = MemRateCounter::new_in_memory();
        let now = 1_700_000_000;
        let mut payload = contact_payload(now);
        payload.insert(
            "human_check".to_string(),
            verdant_contracts::submission::FormValue::Scalar("7".to_string()),
        );
        let errs = engine
            .validate_contact(&payload, &ctx(now), Some(&challenge(now)), &mut rate)
            .unwrap_err();
        assert!(errs.contains("human_check"));
    }

    #[test]
    fn at_forms_04_too_fast_fill_rejects_and_missing_field_skips() {
        let engine = FormEngine::new(FormEngineConfig::test_mode());
        let mut rate = MemRateCounter::new_in_memory();
        let now = 1_700_000_000;

        let mut fast = contact_payload(now);
        fast.insert(
            "form_start_time".to_string(),
            verdant_contracts::submission::FormValue::Scalar((now - 3).to_string()),
        );
        assert!(engine
            .validate_contact(&fast, &ctx(now), Some(&challenge(now)), &mut rate)
            .is_err());

        let mut absent = contact_payload(now);
        absent.remove("form_start_time");
        assert!(engine
            .validate_contact(&absent, &ctx(now), Some(&challenge(now)), &mut rate)
            .is_ok());
    }

    #[test]
    fn at_forms_05_rate_limit_caps_at_three_and_skips_counting_tripped() {
        let engine = FormEngine::new(FormEngineConfig::test_mode());
        let mut rate = MemRateCounter::new_in_memory();
        let now = 1_700_000_000;
        for _ in 0..3 {
            assert!(engine
                .validate_contact(
                    &contact_payload(now),
                    &ctx(now),
                    Some(&challenge(now)),
                    &mut rate
                )
                .is_ok());
        }
        let errs = engine
            .validate_contact(&contact_payload(now), &ctx(now), Some(&challenge(now)), &mut rate)
            .unwrap_err();
        assert_eq!(errs.get("__all__"), Some(messages::RATE_LIMITED));
        // The tripped attempt is not recorded.
        assert_eq!(
            rate.attempts_since("203.0.113.9", UtcSeconds(now - 3600)),
            3
        );
    }

    #[test]
    fn at_forms_06_blocked_domain_and_bad_subject_reject() {
        let engine = FormEngine::new(FormEngineConfig::test_mode());
        let mut rate = MemRateCounter::new_in_memory();
        let now = 1_700_000_000;
        let mut payload = contact_payload(now);
        payload.insert(
            "email".to_string(),
            verdant_contracts::submission::FormValue::Scalar("user@fake.com".to_string()),
        );
        payload.insert(
            "subject".to_string(),
            verdant_contracts::submission::FormValue::Scalar("marketing".to_string()),
        );
        let errs = engine
            .validate_contact(&payload, &ctx(now), Some(&challenge(now)), &mut rate)
            .unwrap_err();
        assert!(errs.contains("email"));
        assert!(errs.contains("subject"));
    }

    #[test]
    fn at_forms_07_newsletter_minimal_payload_accepted() {
        let engine = FormEngine::mvp_v1();
        let payload = raw(&[("email", "a@b.co"), ("consent", "true"), ("honeypot", "")]);
        let out = engine
            .validate_newsletter(&payload, &ctx(1_700_000_000))
            .unwrap();
        assert_eq!(out.kind, SubmissionKind::Newsletter);
        assert_eq!(out.name, "Newsletter Subscriber");
        assert_eq!(out.subject, "Newsletter Signup");
    }

    fn onboarding_payload(now: i64) -> RawSubmission {
        let mut payload = raw(&[
            ("first_name", "Ada"),
            ("last_name", "Example"),
            ("email", "ada@example.com"),
            ("phone", "555-0100"),
            ("birthday", "1985-04-12"),
            ("pronouns", "she/her"),
            ("street_address", "123 Main Street"),
            ("city", "Portland"),
            ("state", "OR"),
            ("zip", "97201"),
            ("employment_status", "full_time"),
            ("employer_name", "Example Labs"),
            ("job_title", "Engineer"),
            ("marital_status", "single"),
            ("form_start_time", &(now - 120).to_string()),
        ]);
        for item in RISK_ITEMS {
            payload.insert(
                item.to_string(),
                verdant_contracts::submission::FormValue::Scalar("agree".to_string()),
            );
        }
        payload
    }

    #[test]
    fn at_forms_08_onboarding_accepts_and_assembles_name() {
        let engine = FormEngine::mvp_v1();
        let now = 1_700_000_000;
        let out = engine
            .validate_onboarding(&onboarding_payload(now), &ctx(now))
            .unwrap();
        assert_eq!(out.name, "Ada Example");
        assert_eq!(out.subject, "Onboarding Application - Ada Example");
        assert!(out
            .sections
            .iter()
            .any(|s| s.title == "Personal Information"));
        assert!(out.sections.iter().any(|s| s.title == "Risk Profile"));
    }

    #[test]
    fn at_forms_09_po_box_address_rejected() {
        let engine = FormEngine::mvp_v1();
        let now = 1_700_000_000;
        let mut payload = onboarding_payload(now);
        payload.insert(
            "street_address".to_string(),
            verdant_contracts::submission::FormValue::Scalar("P.O. Box 441".to_string()),
        );
        let errs = engine.validate_onboarding(&payload, &ctx(now)).unwrap_err();
        assert!(errs.contains("street_address"));
    }

    #[test]
    fn at_forms_10_co_client_subtree_required_when_added() {
        let engine = FormEngine::mvp_v1();
        let now = 1_700_000_000;
        let mut payload = onboarding_payload(now);
        payload.insert(
            "add_co_client".to_string(),
            verdant_contracts::submission::FormValue::Scalar("yes".to_string()),
        );
        payload.insert(
            "co_client_first_name".to_string(),
            verdant_contracts::submission::FormValue::Scalar("Sam".to_string()),
        );
        let errs = engine.validate_onboarding(&payload, &ctx(now)).unwrap_err();
        assert!(errs.contains("co_client_email"));
        assert!(errs.contains("co_client_last_name"));
        assert!(!errs.contains("co_client_first_name"));
    }

    #[test]
    fn at_forms_11_other_selections_need_free_text() {
        let engine = FormEngine::mvp_v1();
        let now = 1_700_000_000;
        let mut payload = onboarding_payload(now);
        payload.insert(
            "ethical_considerations".to_string(),
            verdant_contracts::submission::FormValue::List(vec![
                "fossil_fuels".to_string(),
                "other".to_string(),
            ]),
        );
        let errs = engine.validate_onboarding(&payload, &ctx(now)).unwrap_err();
        assert!(errs.contains("ethical_considerations_other"));
    }

    #[test]
    fn at_forms_12_unemployed_skips_employer_requirement() {
        let engine = FormEngine::mvp_v1();
        let now = 1_700_000_000;
        let mut payload = onboarding_payload(now);
        payload.insert(
            "employment_status".to_string(),
            verdant_contracts::submission::FormValue::Scalar("retired".to_string()),
        );
        payload.remove("employer_name");
        payload.remove("job_title");
        assert!(engine.validate_onboarding(&payload, &ctx(now)).is_ok());
    }

    #[test]
    fn at_forms_13_deterministic_challenge_is_one_plus_one() {
        let engine = FormEngine::new(FormEngineConfig::test_mode());
        let c = engine.issue_challenge(UtcSeconds(100));
        assert_eq!((c.a, c.b), (1, 1));
        assert_eq!(c.expires_at, UtcSeconds(100 + 3600));

        let live = FormEngine::mvp_v1();
        for _ in 0..32 {
            let c = live.issue_challenge(UtcSeconds(100));
            assert!((1..=10).contains(&c.a));
            assert!((1..=10).contains(&c.b));
        }
    }
}

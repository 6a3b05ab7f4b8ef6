#![forbid(unsafe_code)]

//! The submission pipeline: validate, persist, respond, then forward
//! best-effort. The user-visible outcome is decided the moment the
//! ticket is stored; nothing downstream of persistence can change it.

use sha2::{Digest, Sha256};

use verdant_contracts::submission::{
    ContactSubmission, FieldErrors, IssuedChallenge, RawSubmission, RequestContext,
    SubmissionKind,
};
use verdant_contracts::ticket::{NewTicket, TicketId, TicketPriority, TicketStatus};
use verdant_contracts::CorrelationId;
use verdant_engines::dispatch::{
    compose_fallback_email, DispatchError, DispatchResult, FallbackMailer, RemoteDispatcher,
};
use verdant_engines::forms::{FormEngine, RateCounter};
use verdant_storage::TicketStore;

/// Dispatch seam so the pipeline can be exercised without a network.
pub trait SubmissionDispatcher {
    fn dispatch(&self, submission: &ContactSubmission) -> Result<DispatchResult, DispatchError>;
}

impl SubmissionDispatcher for RemoteDispatcher {
    fn dispatch(&self, submission: &ContactSubmission) -> Result<DispatchResult, DispatchError> {
        RemoteDispatcher::dispatch(self, submission, false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Accepted {
        ticket_id: TicketId,
        message: String,
    },
    Invalid(FieldErrors),
    Failed {
        correlation_id: CorrelationId,
    },
}

fn correlation_id(ctx: &RequestContext, email: &str) -> CorrelationId {
    let mut h = Sha256::new();
    h.update(ctx.now.0.to_be_bytes());
    h.update(ctx.client_ip.as_bytes());
    h.update(email.as_bytes());
    let digest = h.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    CorrelationId(hex)
}

/// Markdown rendering of the structured detail sections, used as the
/// persisted message body for onboarding and garden tickets.
pub fn sections_markdown(submission: &ContactSubmission) -> String {
    let mut out = String::new();
    for section in &submission.sections {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("## {}\n\n", section.title));
        for (label, value) in &section.fields {
            out.push_str(&format!("- **{label}:** {value}\n"));
        }
    }
    out
}

/// Ticket mapping rules, one per submission kind.
pub fn new_ticket_for(submission: &ContactSubmission) -> NewTicket {
    let kind = submission.kind.ticket_kind();
    let (subject, message, status, priority) = match submission.kind {
        SubmissionKind::Contact => (
            format!(
                "{} - {}",
                submission.subject,
                submission.company.as_deref().unwrap_or("Individual")
            ),
            submission.message.clone(),
            TicketStatus::Open,
            TicketPriority::default(),
        ),
        SubmissionKind::Newsletter => (
            "Newsletter Signup".to_string(),
            submission.message.clone(),
            TicketStatus::Resolved,
            TicketPriority::default(),
        ),
        SubmissionKind::Onboarding => (
            submission.subject.clone(),
            sections_markdown(submission),
            TicketStatus::Open,
            TicketPriority::default(),
        ),
        SubmissionKind::GardenInterest => (
            submission.subject.clone(),
            sections_markdown(submission),
            TicketStatus::Open,
            TicketPriority::High,
        ),
    };
    NewTicket {
        name: submission.name.clone(),
        email: submission.email.clone(),
        company: submission.company.clone(),
        subject,
        message,
        kind,
        status,
        priority,
    }
}

fn success_message(kind: SubmissionKind) -> &'static str {
    match kind {
        SubmissionKind::Contact => "Thank you for contacting us. We will be in touch soon.",
        SubmissionKind::Newsletter => "You are subscribed to our newsletter.",
        SubmissionKind::Onboarding => "Thank you for your application. We will review it shortly.",
        SubmissionKind::GardenInterest => "Thanks for your interest. We will keep you posted.",
    }
}

pub struct SubmissionPipeline {
    engine: FormEngine,
    dispatcher: Option<Box<dyn SubmissionDispatcher + Send + Sync>>,
    mailer: Option<Box<dyn FallbackMailer + Send>>,
    fallback_email_to: String,
}

impl SubmissionPipeline {
    pub fn new(
        engine: FormEngine,
        dispatcher: Option<Box<dyn SubmissionDispatcher + Send + Sync>>,
        mailer: Option<Box<dyn FallbackMailer + Send>>,
        fallback_email_to: String,
    ) -> Self {
        Self {
            engine,
            dispatcher,
            mailer,
            fallback_email_to,
        }
    }

    pub fn engine(&self) -> &FormEngine {
        &self.engine
    }

    pub fn submit_contact(
        &mut self,
        raw: &RawSubmission,
        ctx: &RequestContext,
        challenge: Option<&IssuedChallenge>,
        rate: &mut dyn RateCounter,
        store: &mut dyn TicketStore,
    ) -> SubmissionOutcome {
        match self.engine.validate_contact(raw, ctx, challenge, rate) {
            Ok(submission) => self.persist_and_forward(submission, ctx, store),
            Err(errors) => self.invalid(errors, ctx),
        }
    }

    pub fn submit_newsletter(
        &mut self,
        raw: &RawSubmission,
        ctx: &RequestContext,
        store: &mut dyn TicketStore,
    ) -> SubmissionOutcome {
        match self.engine.validate_newsletter(raw, ctx) {
            Ok(submission) => self.persist_and_forward(submission, ctx, store),
            Err(errors) => self.invalid(errors, ctx),
        }
    }

    pub fn submit_onboarding(
        &mut self,
        raw: &RawSubmission,
        ctx: &RequestContext,
        store: &mut dyn TicketStore,
    ) -> SubmissionOutcome {
        match self.engine.validate_onboarding(raw, ctx) {
            Ok(submission) => self.persist_and_forward(submission, ctx, store),
            Err(errors) => self.invalid(errors, ctx),
        }
    }

    pub fn submit_garden_interest(
        &mut self,
        raw: &RawSubmission,
        ctx: &RequestContext,
        store: &mut dyn TicketStore,
    ) -> SubmissionOutcome {
        match self.engine.validate_garden_interest(raw, ctx) {
            Ok(submission) => self.persist_and_forward(submission, ctx, store),
            Err(errors) => self.invalid(errors, ctx),
        }
    }

    fn invalid(&self, errors: FieldErrors, ctx: &RequestContext) -> SubmissionOutcome {
        tracing::info!(client_ip = %ctx.client_ip, errors = errors.len(), "submission rejected");
        SubmissionOutcome::Invalid(errors)
    }

    fn persist_and_forward(
        &mut self,
        submission: ContactSubmission,
        ctx: &RequestContext,
        store: &mut dyn TicketStore,
    ) -> SubmissionOutcome {
        let new_ticket = new_ticket_for(&submission);
        let ticket = match store.insert(new_ticket, ctx.now) {
            Ok(ticket) => ticket,
            Err(e) => {
                let correlation = correlation_id(ctx, &submission.email);
                tracing::error!(
                    correlation_id = %correlation.as_str(),
                    error = ?e,
                    "ticket persistence failed"
                );
                return SubmissionOutcome::Failed {
                    correlation_id: correlation,
                };
            }
        };

        self.forward(&submission, ticket.id, ctx, store);

        SubmissionOutcome::Accepted {
            ticket_id: ticket.id,
            message: success_message(submission.kind).to_string(),
        }
    }

    /// Best-effort leg. Every failure path ends in a log line, never
    /// in a changed outcome.
    fn forward(
        &mut self,
        submission: &ContactSubmission,
        ticket_id: TicketId,
        ctx: &RequestContext,
        store: &mut dyn TicketStore,
    ) {
        let Some(dispatcher) = self.dispatcher.as_deref() else {
            return;
        };
        match dispatcher.dispatch(submission) {
            Ok(DispatchResult::Accepted { external_reference }) => {
                if let Some(reference) = external_reference {
                    if let Err(e) =
                        store.update_external_reference(ticket_id, reference, ctx.now)
                    {
                        tracing::warn!(ticket_id = ticket_id.0, error = ?e, "reference stamp failed");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(ticket_id = ticket_id.0, kind = e.kind(), "dispatch failed");
                self.send_fallback(submission);
            }
        }
    }

    fn send_fallback(&mut self, submission: &ContactSubmission) {
        let Some(mailer) = self.mailer.as_deref_mut() else {
            return;
        };
        let (subject, body) = compose_fallback_email(submission);
        if let Err(detail) = mailer.send(&self.fallback_email_to, &subject, &body) {
            tracing::error!(%detail, "fallback email failed");
        }
    }
}

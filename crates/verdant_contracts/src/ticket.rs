#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{validate_text, ContractViolation, SchemaVersion, UtcSeconds, Validate};

pub const TICKET_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Contact,
    Newsletter,
    Onboarding,
    GardenInterest,
    Question,
    Issue,
    Request,
    Feedback,
}

impl TicketKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketKind::Contact => "contact",
            TicketKind::Newsletter => "newsletter",
            TicketKind::Onboarding => "onboarding",
            TicketKind::GardenInterest => "garden_interest",
            TicketKind::Question => "question",
            TicketKind::Issue => "issue",
            TicketKind::Request => "request",
            TicketKind::Feedback => "feedback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::New => "new",
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }

    /// Status moves only forward through the chain, with a single
    /// allowed reopen edge from Resolved back to Open.
    pub fn can_transition(self, to: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, to),
            (New, Open)
                | (Open, InProgress)
                | (InProgress, Resolved)
                | (Resolved, Closed)
                | (Resolved, Open)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for TicketPriority {
    fn default() -> Self {
        TicketPriority::Medium
    }
}

/// Everything a store needs to mint a ticket. The id and timestamps
/// are assigned at persist time by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub subject: String,
    pub message: String,
    pub kind: TicketKind,
    pub status: TicketStatus,
    pub priority: TicketPriority,
}

impl Validate for NewTicket {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("new_ticket.name", &self.name, 200)?;
        validate_text("new_ticket.email", &self.email, 254)?;
        if !self.email.contains('@') {
            return Err(ContractViolation::InvalidValue {
                field: "new_ticket.email",
                reason: "must contain '@'",
            });
        }
        validate_text("new_ticket.subject", &self.subject, 300)?;
        if self.message.is_empty() {
            return Err(ContractViolation::MissingField {
                field: "new_ticket.message",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportTicket {
    pub schema_version: SchemaVersion,
    pub id: TicketId,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub subject: String,
    pub message: String,
    pub kind: TicketKind,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub external_reference: Option<String>,
    pub created_at: UtcSeconds,
    pub updated_at: UtcSeconds,
}

impl SupportTicket {
    pub fn v1(id: TicketId, new: NewTicket, created_at: UtcSeconds) -> Result<Self, ContractViolation> {
        new.validate()?;
        let t = Self {
            schema_version: TICKET_CONTRACT_VERSION,
            id,
            name: new.name,
            email: new.email,
            company: new.company,
            subject: new.subject,
            message: new.message,
            kind: new.kind,
            status: new.status,
            priority: new.priority,
            external_reference: None,
            created_at,
            updated_at: created_at,
        };
        t.validate()?;
        Ok(t)
    }

    /// The only post-creation mutation the core performs: stamping the
    /// platform reference after a successful dispatch.
    pub fn stamp_external_reference(
        &mut self,
        reference: String,
        now: UtcSeconds,
    ) -> Result<(), ContractViolation> {
        if reference.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "support_ticket.external_reference",
                reason: "must not be empty",
            });
        }
        if now < self.created_at {
            return Err(ContractViolation::InvalidValue {
                field: "support_ticket.updated_at",
                reason: "must be >= created_at",
            });
        }
        self.external_reference = Some(reference);
        self.updated_at = now.max(self.updated_at);
        Ok(())
    }

    pub fn transition_status(
        &mut self,
        to: TicketStatus,
        now: UtcSeconds,
    ) -> Result<(), ContractViolation> {
        if !self.status.can_transition(to) {
            return Err(ContractViolation::InvalidValue {
                field: "support_ticket.status",
                reason: "transition not allowed",
            });
        }
        self.status = to;
        self.updated_at = now.max(self.updated_at);
        Ok(())
    }
}

impl Validate for SupportTicket {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != TICKET_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "support_ticket.schema_version",
                reason: "must match TICKET_CONTRACT_VERSION",
            });
        }
        if self.updated_at < self.created_at {
            return Err(ContractViolation::InvalidValue {
                field: "support_ticket.updated_at",
                reason: "must be >= created_at",
            });
        }
        validate_text("support_ticket.name", &self.name, 200)?;
        validate_text("support_ticket.email", &self.email, 254)?;
        Ok(())
    }
}

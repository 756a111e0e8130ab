use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::workflows::scoring::EmployeeId;

/// Identifier wrapper for rating submissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role asserted by the caller. Credentials are checked upstream; the workflow only
/// enforces what each role may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    Admin,
    SeniorApprover,
    HeadOfFunction,
    TeamLead,
    Analyst,
    Viewer,
}

impl CallerRole {
    pub const fn label(self) -> &'static str {
        match self {
            CallerRole::Admin => "admin",
            CallerRole::SeniorApprover => "senior_approver",
            CallerRole::HeadOfFunction => "head_of_function",
            CallerRole::TeamLead => "team_lead",
            CallerRole::Analyst => "analyst",
            CallerRole::Viewer => "viewer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let role = match normalized.as_str() {
            "admin" => CallerRole::Admin,
            "senior_approver" => CallerRole::SeniorApprover,
            "head_of_function" | "head" => CallerRole::HeadOfFunction,
            "team_lead" => CallerRole::TeamLead,
            "analyst" => CallerRole::Analyst,
            "viewer" => CallerRole::Viewer,
            _ => return None,
        };
        Some(role)
    }
}

impl fmt::Display for CallerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The identity every workflow operation acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub role: CallerRole,
    pub user_id: EmployeeId,
}

impl Caller {
    pub fn new(role: CallerRole, user_id: impl Into<EmployeeId>) -> Self {
        Self {
            role,
            user_id: user_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionState {
    pub const fn label(self) -> &'static str {
        match self {
            SubmissionState::Pending => "pending",
            SubmissionState::Approved => "approved",
            SubmissionState::Rejected => "rejected",
        }
    }
}

/// A batch of ratings proposed by one supervisor for their subordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSubmission {
    pub id: SubmissionId,
    pub tier: String,
    pub submitter: EmployeeId,
    pub target_scope: Vec<EmployeeId>,
    pub grades: BTreeMap<EmployeeId, u8>,
    pub state: SubmissionState,
}

/// Result of an approve or reject call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Approved { submission: RatingSubmission },
    Rejected { submission: RatingSubmission },
    /// The submission was already approved, rejected or discarded by a new period.
    AlreadyResolved { submission_id: SubmissionId },
}

impl Resolution {
    pub fn summary(&self) -> String {
        match self {
            Resolution::Approved { submission } => format!(
                "approved {} rating(s) from {}",
                submission.grades.len(),
                submission.submitter
            ),
            Resolution::Rejected { submission } => {
                format!("rejected submission from {}", submission.submitter)
            }
            Resolution::AlreadyResolved { submission_id } => {
                format!("submission {submission_id} was already resolved")
            }
        }
    }
}

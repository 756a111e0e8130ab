use std::collections::BTreeMap;
use std::io::Read;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use super::domain::{
    Caller, CallerRole, RatingSubmission, Resolution, SubmissionId, SubmissionState,
};
use super::hierarchy::{ApprovalChain, OrgHierarchy};
use super::store::{PeriodStore, PublishedPeriod, StoreError};
use crate::workflows::ingest::{ActivityImporter, IngestOptions, IngestionError};
use crate::workflows::leaderboard::{Leaderboard, LeaderboardQuery, LeaderboardView};
use crate::workflows::scoring::{
    ApprovedRatings, EmployeeId, EmployeeRecordSet, ReportingPeriod, ScoringEngine, ScoringError,
};

/// Mutable state guarded by a single lock so ingest and approvals never interleave.
#[derive(Debug, Default)]
struct WorkflowState {
    published: Option<PublishedPeriod>,
    pending: Vec<RatingSubmission>,
    next_submission: u64,
    revision: u64,
}

impl WorkflowState {
    fn next_submission_id(&mut self) -> SubmissionId {
        self.next_submission += 1;
        SubmissionId(format!("sub-{:06}", self.next_submission))
    }

    fn has_pending_from(&self, submitter: &EmployeeId) -> bool {
        self.pending
            .iter()
            .any(|submission| submission.submitter == *submitter)
    }
}

/// Returned from a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub period: ReportingPeriod,
    pub revision: u64,
    pub employees: usize,
    pub discarded_submissions: usize,
}

/// Service composing the scoring engine, org hierarchy, approval chain and period store.
pub struct RatingWorkflow<S> {
    engine: Arc<ScoringEngine>,
    hierarchy: Arc<OrgHierarchy>,
    chain: ApprovalChain,
    store: Arc<S>,
    ingest: IngestOptions,
    state: Mutex<WorkflowState>,
}

impl<S> RatingWorkflow<S>
where
    S: PeriodStore + 'static,
{
    /// Builds the workflow and restores the last persisted period, if any.
    pub fn new(
        engine: Arc<ScoringEngine>,
        hierarchy: Arc<OrgHierarchy>,
        chain: ApprovalChain,
        store: Arc<S>,
    ) -> Result<Self, RatingWorkflowError> {
        let mut state = WorkflowState::default();
        if let Some(snapshot) = store.load()? {
            info!(
                period = %snapshot.period,
                revision = snapshot.revision,
                employees = snapshot.records.len(),
                approved = snapshot.approved.len(),
                "restored published period"
            );
            state.revision = snapshot.revision;
            state.next_submission = snapshot.submissions_issued;
            state.published = Some(snapshot);
        }

        let ingest = IngestOptions::for_fields(&engine.config().fields);
        Ok(Self {
            engine,
            hierarchy,
            chain,
            store,
            ingest,
            state: Mutex::new(state),
        })
    }

    /// Overrides the export layout; count columns always follow the scoring fields.
    pub fn with_ingest_options(mut self, options: IngestOptions) -> Self {
        self.ingest = IngestOptions {
            count_fields: self.engine.config().fields.all(),
            ..options
        };
        self
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    pub fn chain(&self) -> &ApprovalChain {
        &self.chain
    }

    /// Scores `records` and makes them the active period. Every approved rating and
    /// pending submission from the previous period is discarded.
    pub fn publish(
        &self,
        caller: &Caller,
        period: ReportingPeriod,
        records: EmployeeRecordSet,
    ) -> Result<PublishReceipt, RatingWorkflowError> {
        require_role(caller, CallerRole::Admin, "publish a reporting period")?;

        let scored = self
            .engine
            .compute(&records, &ApprovedRatings::new(), period.month())?;

        let (snapshot, discarded) = {
            let mut state = self.state.lock().expect("workflow mutex poisoned");
            state.revision += 1;
            let snapshot = PublishedPeriod {
                period,
                revision: state.revision,
                published_at: Utc::now(),
                records: scored,
                approved: ApprovedRatings::new(),
                submissions_issued: state.next_submission,
            };
            let discarded = state.pending.len();
            state.pending.clear();
            state.published = Some(snapshot.clone());
            (snapshot, discarded)
        };

        if discarded > 0 {
            warn!(
                discarded,
                period = %period,
                "pending rating submissions discarded by new period"
            );
        }
        info!(
            period = %period,
            revision = snapshot.revision,
            employees = snapshot.records.len(),
            published_by = %caller.user_id,
            "published reporting period"
        );

        self.persist_snapshot(&snapshot)?;

        Ok(PublishReceipt {
            period,
            revision: snapshot.revision,
            employees: snapshot.records.len(),
            discarded_submissions: discarded,
        })
    }

    /// Parses both exports and publishes the merged records.
    pub fn publish_exports<A: Read, B: Read>(
        &self,
        caller: &Caller,
        period: ReportingPeriod,
        activity: A,
        reports: B,
    ) -> Result<PublishReceipt, RatingWorkflowError> {
        require_role(caller, CallerRole::Admin, "publish a reporting period")?;
        let records = ActivityImporter::from_readers(activity, reports, &self.ingest)?;
        self.publish(caller, period, records)
    }

    /// Files a pending submission for the caller's tier. Grades must cover only the
    /// caller's direct subordinates and fall inside the rating scale. The issued id is
    /// persisted with the snapshot, so ids are never handed out twice across restarts.
    pub fn submit(
        &self,
        caller: &Caller,
        grades: BTreeMap<EmployeeId, u8>,
    ) -> Result<RatingSubmission, RatingWorkflowError> {
        let tier = self
            .chain
            .tier_for_submitter(caller.role)
            .ok_or(RatingWorkflowError::Unauthorized {
                role: caller.role,
                action: "submit ratings",
            })?;

        let mut state = self.state.lock().expect("workflow mutex poisoned");
        if state.published.is_none() {
            return Err(RatingWorkflowError::NoPublishedPeriod);
        }
        if state.has_pending_from(&caller.user_id) {
            return Err(RatingWorkflowError::DuplicateSubmission {
                submitter: caller.user_id.clone(),
            });
        }
        if grades.is_empty() {
            return Err(RatingWorkflowError::EmptySubmission);
        }

        let scope = self.hierarchy.subordinates(&caller.user_id);
        let outside: Vec<EmployeeId> = grades
            .keys()
            .filter(|id| !scope.contains(id))
            .cloned()
            .collect();
        if !outside.is_empty() {
            return Err(RatingWorkflowError::ScopeViolation {
                submitter: caller.user_id.clone(),
                outside,
            });
        }

        let scale = self.engine.rating_scale();
        if let Some((employee, grade)) = grades.iter().find(|(_, grade)| !scale.contains(**grade))
        {
            return Err(RatingWorkflowError::GradeOutOfRange {
                employee: employee.clone(),
                grade: *grade,
                min: scale.min,
                max: scale.max,
            });
        }

        let id = state.next_submission_id();
        state.revision += 1;
        let (revision, issued) = (state.revision, state.next_submission);
        let Some(published) = state.published.as_mut() else {
            return Err(RatingWorkflowError::NoPublishedPeriod);
        };
        published.revision = revision;
        published.submissions_issued = issued;
        let snapshot = published.clone();

        let submission = RatingSubmission {
            id,
            tier: tier.name.clone(),
            submitter: caller.user_id.clone(),
            target_scope: scope.to_vec(),
            grades,
            state: SubmissionState::Pending,
        };
        state.pending.push(submission.clone());
        drop(state);

        info!(
            submission = %submission.id,
            tier = %submission.tier,
            submitter = %submission.submitter,
            grades = submission.grades.len(),
            "rating submission filed"
        );

        self.persist_snapshot(&snapshot)?;
        Ok(submission)
    }

    /// Merges the submission's grades into the approved ratings and re-blends every
    /// final score. Resolving an unknown or already-resolved id is a no-op.
    pub fn approve(
        &self,
        caller: &Caller,
        submission_id: &SubmissionId,
    ) -> Result<Resolution, RatingWorkflowError> {
        self.require_approver(caller, "approve ratings")?;

        let (submission, snapshot) = {
            let mut guard = self.state.lock().expect("workflow mutex poisoned");
            let state = &mut *guard;
            let Some(index) = self.locate(state, caller, submission_id)? else {
                return Ok(already_resolved(submission_id));
            };
            let Some(published) = state.published.as_mut() else {
                return Err(RatingWorkflowError::NoPublishedPeriod);
            };

            let mut submission = state.pending.remove(index);
            state.revision += 1;
            published.revision = state.revision;
            published.approved.extend(
                submission
                    .grades
                    .iter()
                    .map(|(id, grade)| (id.clone(), *grade)),
            );
            self.engine
                .refresh_scores(&mut published.records, &published.approved);
            submission.state = SubmissionState::Approved;
            (submission, published.clone())
        };

        info!(
            submission = %submission.id,
            submitter = %submission.submitter,
            approver = %caller.user_id,
            grades = submission.grades.len(),
            revision = snapshot.revision,
            "rating submission approved"
        );

        self.persist_snapshot(&snapshot)?;
        Ok(Resolution::Approved { submission })
    }

    /// Discards the submission; the submitter may file a new one.
    pub fn reject(
        &self,
        caller: &Caller,
        submission_id: &SubmissionId,
    ) -> Result<Resolution, RatingWorkflowError> {
        self.require_approver(caller, "reject ratings")?;

        let mut state = self.state.lock().expect("workflow mutex poisoned");
        let Some(index) = self.locate(&state, caller, submission_id)? else {
            return Ok(already_resolved(submission_id));
        };
        let mut submission = state.pending.remove(index);
        submission.state = SubmissionState::Rejected;
        drop(state);

        info!(
            submission = %submission.id,
            submitter = %submission.submitter,
            approver = %caller.user_id,
            grades = ?submission.grades,
            "rating submission rejected"
        );
        Ok(Resolution::Rejected { submission })
    }

    /// Pending submissions in filing order, optionally narrowed to one tier.
    pub fn pending(&self, tier: Option<&str>) -> Vec<RatingSubmission> {
        let state = self.state.lock().expect("workflow mutex poisoned");
        state
            .pending
            .iter()
            .filter(|submission| tier.map_or(true, |name| submission.tier == name))
            .cloned()
            .collect()
    }

    pub fn has_pending_submission(&self, submitter: &EmployeeId) -> bool {
        let state = self.state.lock().expect("workflow mutex poisoned");
        state.has_pending_from(submitter)
    }

    pub fn approved_ratings(&self) -> ApprovedRatings {
        let state = self.state.lock().expect("workflow mutex poisoned");
        state
            .published
            .as_ref()
            .map(|published| published.approved.clone())
            .unwrap_or_default()
    }

    pub fn published(&self) -> Option<PublishedPeriod> {
        let state = self.state.lock().expect("workflow mutex poisoned");
        state.published.clone()
    }

    /// Ranking over the active period; `None` until something has been published.
    pub fn leaderboard(&self, query: &LeaderboardQuery) -> Option<LeaderboardView> {
        let state = self.state.lock().expect("workflow mutex poisoned");
        state.published.as_ref().map(|published| {
            Leaderboard::build(&published.records, &published.approved, query)
                .view(Some(published.period))
        })
    }

    fn require_approver(
        &self,
        caller: &Caller,
        action: &'static str,
    ) -> Result<(), RatingWorkflowError> {
        if self.chain.approves_any(caller.role) {
            Ok(())
        } else {
            Err(RatingWorkflowError::Unauthorized {
                role: caller.role,
                action,
            })
        }
    }

    /// Finds a pending submission the caller may resolve. `None` when it no longer exists.
    fn locate(
        &self,
        state: &WorkflowState,
        caller: &Caller,
        submission_id: &SubmissionId,
    ) -> Result<Option<usize>, RatingWorkflowError> {
        let Some(index) = state
            .pending
            .iter()
            .position(|submission| submission.id == *submission_id)
        else {
            return Ok(None);
        };

        let submission = &state.pending[index];
        let tier = self.chain.tier(&submission.tier);
        if tier.map(|tier| tier.approver_role) != Some(caller.role) {
            return Err(RatingWorkflowError::Unauthorized {
                role: caller.role,
                action: "resolve submissions from this tier",
            });
        }
        if self.hierarchy.is_supervisor(&caller.user_id)
            && !self
                .hierarchy
                .supervises(&caller.user_id, &submission.submitter)
        {
            return Err(RatingWorkflowError::RoutingViolation {
                approver: caller.user_id.clone(),
                submitter: submission.submitter.clone(),
            });
        }
        Ok(Some(index))
    }

    fn persist_snapshot(&self, snapshot: &PublishedPeriod) -> Result<(), RatingWorkflowError> {
        self.store.save(snapshot).map_err(|source| {
            error!(
                revision = snapshot.revision,
                error = %source,
                "failed to persist period snapshot; in-memory state is ahead of storage"
            );
            RatingWorkflowError::Store(source)
        })
    }
}

fn require_role(
    caller: &Caller,
    required: CallerRole,
    action: &'static str,
) -> Result<(), RatingWorkflowError> {
    if caller.role == required {
        Ok(())
    } else {
        Err(RatingWorkflowError::Unauthorized {
            role: caller.role,
            action,
        })
    }
}

fn already_resolved(submission_id: &SubmissionId) -> Resolution {
    info!(submission = %submission_id, "submission already resolved");
    Resolution::AlreadyResolved {
        submission_id: submission_id.clone(),
    }
}

fn join_ids(ids: &[EmployeeId]) -> String {
    ids.iter()
        .map(EmployeeId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error raised by the rating workflow.
#[derive(Debug, thiserror::Error)]
pub enum RatingWorkflowError {
    #[error("role {role} may not {action}")]
    Unauthorized {
        role: CallerRole,
        action: &'static str,
    },
    #[error("no reporting period has been published")]
    NoPublishedPeriod,
    #[error("{submitter} already has a pending submission")]
    DuplicateSubmission { submitter: EmployeeId },
    #[error("submission contains no grades")]
    EmptySubmission,
    #[error("{submitter} does not supervise: {}", join_ids(.outside))]
    ScopeViolation {
        submitter: EmployeeId,
        outside: Vec<EmployeeId>,
    },
    #[error("grade {grade} for {employee} is outside {min}..={max}")]
    GradeOutOfRange {
        employee: EmployeeId,
        grade: u8,
        min: u8,
        max: u8,
    },
    #[error("{approver} does not supervise submitter {submitter}")]
    RoutingViolation {
        approver: EmployeeId,
        submitter: EmployeeId,
    },
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

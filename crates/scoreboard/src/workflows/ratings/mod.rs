//! Two-tier rating approval: supervisors submit grades for their direct reports, the
//! next tier approves or rejects, and approved grades are blended into final scores.

pub mod domain;
pub mod hierarchy;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use domain::{Caller, CallerRole, RatingSubmission, Resolution, SubmissionId, SubmissionState};
pub use hierarchy::{ApprovalChain, ApprovalTier, HierarchyError, OrgHierarchy};
pub use router::{rating_router, CALLER_ID_HEADER, CALLER_ROLE_HEADER};
pub use service::{PublishReceipt, RatingWorkflow, RatingWorkflowError};
pub use store::{JsonFilePeriodStore, MemoryPeriodStore, PeriodStore, PublishedPeriod, StoreError};

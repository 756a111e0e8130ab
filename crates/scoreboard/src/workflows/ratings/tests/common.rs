use std::sync::Arc;

use axum::response::Response;
use serde_json::Value;

use crate::workflows::ratings::{
    rating_router, ApprovalChain, Caller, CallerRole, MemoryPeriodStore, OrgHierarchy,
    PeriodStore, PublishedPeriod, RatingWorkflow, StoreError,
};
use crate::workflows::scoring::{
    EmployeeId, EmployeeRecord, EmployeeRecordSet, ReportingPeriod, ScoringConfig, ScoringEngine,
};

pub(super) fn engine() -> Arc<ScoringEngine> {
    Arc::new(ScoringEngine::new(ScoringConfig::standard()).expect("standard config is valid"))
}

pub(super) fn hierarchy() -> Arc<OrgHierarchy> {
    Arc::new(
        OrgHierarchy::new([
            ("senior.dir", vec!["head.ops", "head.other"]),
            ("head.ops", vec!["lead.east", "lead.west"]),
            ("head.other", vec!["lead.south"]),
            ("lead.east", vec!["amir.k", "nadia.f"]),
            ("lead.west", vec!["omar.s"]),
        ])
        .expect("valid hierarchy"),
    )
}

pub(super) fn november() -> ReportingPeriod {
    ReportingPeriod::new(2025, 11).expect("valid period")
}

/// Analysts score on maker volume, leads on checker volume; every target is 40.
pub(super) fn records() -> EmployeeRecordSet {
    [
        EmployeeRecord::new(EmployeeId::new("amir.k")).with_count("SEND RFI", 40.0),
        EmployeeRecord::new(EmployeeId::new("nadia.f")).with_count("SEND RFI", 20.0),
        EmployeeRecord::new(EmployeeId::new("omar.s")).with_count("SEND RFI", 10.0),
        EmployeeRecord::new(EmployeeId::new("lead.east")).with_count("CLOSE WITHOUT SAR", 40.0),
        EmployeeRecord::new(EmployeeId::new("lead.west")).with_count("CLOSE WITHOUT SAR", 20.0),
    ]
    .into_iter()
    .collect()
}

pub(super) fn admin() -> Caller {
    Caller::new(CallerRole::Admin, "ops.admin")
}

pub(super) fn lead_east() -> Caller {
    Caller::new(CallerRole::TeamLead, "lead.east")
}

pub(super) fn lead_west() -> Caller {
    Caller::new(CallerRole::TeamLead, "lead.west")
}

pub(super) fn head() -> Caller {
    Caller::new(CallerRole::HeadOfFunction, "head.ops")
}

pub(super) fn other_head() -> Caller {
    Caller::new(CallerRole::HeadOfFunction, "head.other")
}

pub(super) fn senior() -> Caller {
    Caller::new(CallerRole::SeniorApprover, "senior.dir")
}

pub(super) fn grades(entries: &[(&str, u8)]) -> std::collections::BTreeMap<EmployeeId, u8> {
    entries
        .iter()
        .map(|(id, grade)| (EmployeeId::new(id), *grade))
        .collect()
}

pub(super) fn build_workflow_with<S: PeriodStore + 'static>(store: Arc<S>) -> RatingWorkflow<S> {
    RatingWorkflow::new(engine(), hierarchy(), ApprovalChain::two_tier(), store)
        .expect("workflow builds")
}

pub(super) fn build_workflow() -> (RatingWorkflow<MemoryPeriodStore>, Arc<MemoryPeriodStore>) {
    let store = Arc::new(MemoryPeriodStore::default());
    (build_workflow_with(store.clone()), store)
}

pub(super) fn published_workflow() -> (RatingWorkflow<MemoryPeriodStore>, Arc<MemoryPeriodStore>) {
    let (workflow, store) = build_workflow();
    workflow
        .publish(&admin(), november(), records())
        .expect("publish succeeds");
    (workflow, store)
}

pub(super) fn score_of(workflow: &RatingWorkflow<MemoryPeriodStore>, id: &str) -> (f64, f64) {
    let published = workflow.published().expect("period published");
    let record = published
        .records
        .get(&EmployeeId::new(id))
        .expect("record present");
    (record.system_score, record.final_score)
}

pub(super) struct UnavailableStore;

impl PeriodStore for UnavailableStore {
    fn load(&self) -> Result<Option<PublishedPeriod>, StoreError> {
        Ok(None)
    }

    fn save(&self, _snapshot: &PublishedPeriod) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk offline".to_string()))
    }
}

pub(super) fn router_with(workflow: RatingWorkflow<MemoryPeriodStore>) -> axum::Router {
    rating_router(Arc::new(workflow))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

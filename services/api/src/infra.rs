use metrics_exporter_prometheus::PrometheusHandle;
use scoreboard::config::ScoreboardConfig;
use scoreboard::error::AppError;
use scoreboard::workflows::ratings::{
    ApprovalChain, JsonFilePeriodStore, MemoryPeriodStore, OrgHierarchy, PeriodStore,
    PublishedPeriod, RatingWorkflow, StoreError,
};
use scoreboard::workflows::scoring::{
    EmployeeId, FormulaVariant, ReportingPeriod, ScoringConfig, ScoringEngine, SpecialCaseRule,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Snapshot persistence chosen at startup: a JSON file when configured, memory otherwise.
#[derive(Debug)]
pub(crate) enum PeriodBackend {
    File(JsonFilePeriodStore),
    Memory(MemoryPeriodStore),
}

impl PeriodStore for PeriodBackend {
    fn load(&self) -> Result<Option<PublishedPeriod>, StoreError> {
        match self {
            PeriodBackend::File(store) => store.load(),
            PeriodBackend::Memory(store) => store.load(),
        }
    }

    fn save(&self, snapshot: &PublishedPeriod) -> Result<(), StoreError> {
        match self {
            PeriodBackend::File(store) => store.save(snapshot),
            PeriodBackend::Memory(store) => store.save(snapshot),
        }
    }
}

pub(crate) fn build_workflow(
    config: &ScoreboardConfig,
) -> Result<Arc<RatingWorkflow<PeriodBackend>>, AppError> {
    let engine = Arc::new(ScoringEngine::new(config.scoring_rules()?)?);

    let hierarchy = match config.hierarchy()? {
        Some(hierarchy) => hierarchy,
        None => {
            warn!("no org hierarchy configured; rating submissions will be out of scope");
            OrgHierarchy::default()
        }
    };

    let store = match &config.store_path {
        Some(path) => PeriodBackend::File(JsonFilePeriodStore::new(path)),
        None => {
            warn!("no snapshot path configured; published periods are kept in memory only");
            PeriodBackend::Memory(MemoryPeriodStore::default())
        }
    };

    let workflow = RatingWorkflow::new(
        engine,
        Arc::new(hierarchy),
        ApprovalChain::two_tier(),
        Arc::new(store),
    )?
    .with_ingest_options(config.ingest_options());
    Ok(Arc::new(workflow))
}

pub(crate) fn parse_period(raw: &str) -> Result<ReportingPeriod, String> {
    let invalid = || format!("failed to parse '{raw}' as YYYY-MM");
    let (year, month) = raw.trim().split_once('-').ok_or_else(invalid)?;
    let year = year.parse::<i32>().map_err(|_| invalid())?;
    let month = month.parse::<u32>().map_err(|_| invalid())?;
    ReportingPeriod::new(year, month).ok_or_else(invalid)
}

/// Rules used by the demo: a pooled intake queue shared by two leads (one covering
/// January to November, the other December) and one analyst on a discounted tier.
pub(crate) fn demo_scoring_config() -> ScoringConfig {
    ScoringConfig::standard()
        .with_shared_workload_source(EmployeeId::new("intake.pool"))
        .with_special_case(
            SpecialCaseRule::new("lead.east", FormulaVariant::SharedWorkloadLead)
                .in_months(1..=11),
        )
        .with_special_case(
            SpecialCaseRule::new("lead.west", FormulaVariant::SharedWorkloadLead).in_months([12]),
        )
        .with_special_case(SpecialCaseRule::new(
            "trainee.li",
            FormulaVariant::DiscountedTierAnalyst,
        ))
}

pub(crate) fn demo_hierarchy() -> Result<OrgHierarchy, AppError> {
    let hierarchy = OrgHierarchy::new([
        ("senior.dir", vec!["head.ops"]),
        ("head.ops", vec!["lead.east", "lead.west"]),
        ("lead.east", vec!["amir.k", "nadia.f", "trainee.li"]),
        ("lead.west", vec!["omar.s", "priya.r"]),
    ])?;
    Ok(hierarchy)
}

pub(crate) const DEMO_ACTIVITY_CSV: &str = "\
Case activity by owner
Exported for the reporting month
OWNER ID,OWNER NAME,SEND RFI,RECOMMEND CLOSE WITHOUT SAR,RECOMMEND CLOSE AND GENERATE SAR,CLOSE WITHOUT SAR,REJECT RECOMMENDATION,LINK AND CLOSE AS MERGE,CLOSE AND GENERATE SAR
amir.k,Amir K,22,14,3,,,,
nadia.f,Nadia F,18,9,1,,,,
omar.s,Omar S,11,6,,,,,
priya.r,Priya R,25,12,4,,,,
trainee.li,Li T,40,35,2,,,,
intake.pool,Intake Pool,60,40,,,,,
lead.east,Lead East,,,,70,6,4,2
lead.west,Lead West,,,,28,2,1,1
";

pub(crate) const DEMO_REPORT_CSV: &str = "\
TEAM MEMBER,STR,PRI STR
amir.k,2,1
nadia.f,1,
priya.r,3,1
trainee.li,4,
lead.east,1,
";

pub(crate) const DEMO_ACTIVITY_SKIP_ROWS: usize = 2;

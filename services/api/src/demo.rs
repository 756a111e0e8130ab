use crate::infra::{
    demo_hierarchy, demo_scoring_config, DEMO_ACTIVITY_CSV, DEMO_ACTIVITY_SKIP_ROWS,
    DEMO_REPORT_CSV,
};
use chrono::Local;
use clap::Args;
use scoreboard::config::ScoreboardConfig;
use scoreboard::error::AppError;
use scoreboard::workflows::ingest::{ActivityImporter, IngestOptions};
use scoreboard::workflows::leaderboard::{
    Leaderboard, LeaderboardQuery, LeaderboardView, ScoreMetric, DEFAULT_TOP,
};
use scoreboard::workflows::ratings::{
    ApprovalChain, Caller, CallerRole, MemoryPeriodStore, PeriodStore, RatingWorkflow, Resolution,
};
use scoreboard::workflows::scoring::{
    ApprovedRatings, EmployeeId, ReportingPeriod, Role, ScoringEngine,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Case activity export (CSV)
    #[arg(long)]
    pub(crate) activity: PathBuf,
    /// Report count export (CSV)
    #[arg(long)]
    pub(crate) reports: PathBuf,
    /// Reporting period (YYYY-MM)
    #[arg(long, value_parser = crate::infra::parse_period)]
    pub(crate) period: ReportingPeriod,
    /// Scoring rules (JSON). Defaults to the standard rules.
    #[arg(long)]
    pub(crate) rules: Option<PathBuf>,
    /// Preamble rows above the activity export's header
    #[arg(long, default_value_t = 0)]
    pub(crate) skip_rows: usize,
    /// Entries shown per role
    #[arg(long, default_value_t = DEFAULT_TOP)]
    pub(crate) top: usize,
    /// Rank by system score instead of final score
    #[arg(long)]
    pub(crate) system: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Reporting period (YYYY-MM). Defaults to the current month.
    #[arg(long, value_parser = crate::infra::parse_period)]
    pub(crate) period: Option<ReportingPeriod>,
    /// Print the final leaderboards as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let ScoreArgs {
        activity,
        reports,
        period,
        rules,
        skip_rows,
        top,
        system,
    } = args;

    let config = ScoreboardConfig {
        rules_path: rules,
        activity_skip_rows: skip_rows,
        ..ScoreboardConfig::default()
    };
    let engine = ScoringEngine::new(config.scoring_rules()?)?;
    let options =
        IngestOptions::for_fields(&engine.config().fields).with_activity_skip_rows(skip_rows);
    let records = ActivityImporter::from_paths(activity, reports, &options)?;
    let scored = engine.compute(&records, &ApprovedRatings::new(), period.month())?;

    let metric = if system {
        ScoreMetric::System
    } else {
        ScoreMetric::Final
    };

    println!("Scoreboard for {} ({} employees)", period, scored.len());
    for role in Role::ordered() {
        let query = LeaderboardQuery::new(role).by(metric).top(top);
        let view = Leaderboard::build(&scored, &ApprovedRatings::new(), &query).view(Some(period));
        render_leaderboard(&view);
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let period = args
        .period
        .unwrap_or_else(|| ReportingPeriod::containing(Local::now().date_naive()));

    println!("Rating workflow demo for {period}");
    let engine = Arc::new(ScoringEngine::new(demo_scoring_config())?);
    let workflow = RatingWorkflow::new(
        engine,
        Arc::new(demo_hierarchy()?),
        ApprovalChain::two_tier(),
        Arc::new(MemoryPeriodStore::default()),
    )?
    .with_ingest_options(IngestOptions::default().with_activity_skip_rows(DEMO_ACTIVITY_SKIP_ROWS));

    let admin = Caller::new(CallerRole::Admin, "ops.admin");
    let receipt = workflow.publish_exports(
        &admin,
        period,
        DEMO_ACTIVITY_CSV.as_bytes(),
        DEMO_REPORT_CSV.as_bytes(),
    )?;
    println!(
        "- Published {} employees (revision {})",
        receipt.employees, receipt.revision
    );
    render_all(&workflow);

    let head = Caller::new(CallerRole::HeadOfFunction, "head.ops");
    let senior = Caller::new(CallerRole::SeniorApprover, "senior.dir");
    let lead_east = Caller::new(CallerRole::TeamLead, "lead.east");
    let lead_west = Caller::new(CallerRole::TeamLead, "lead.west");

    println!("\nTeam lead ratings");
    let east = workflow.submit(
        &lead_east,
        grades(&[("amir.k", 5), ("nadia.f", 3), ("trainee.li", 4)]),
    )?;
    println!("- {} filed {} ({} grades)", east.submitter, east.id, east.grades.len());
    report_resolution(&workflow.approve(&head, &east.id)?);

    match workflow.submit(&lead_west, grades(&[("omar.s", 2), ("amir.k", 1)])) {
        Ok(submission) => println!("- Unexpectedly accepted {}", submission.id),
        Err(err) => println!("- Refused: {err}"),
    }
    let west = workflow.submit(&lead_west, grades(&[("omar.s", 2), ("priya.r", 5)]))?;
    println!("- {} filed {} ({} grades)", west.submitter, west.id, west.grades.len());
    report_resolution(&workflow.reject(&head, &west.id)?);

    println!("\nHead of function ratings");
    let heads = workflow.submit(&head, grades(&[("lead.east", 4), ("lead.west", 3)]))?;
    println!("- {} filed {} ({} grades)", heads.submitter, heads.id, heads.grades.len());
    report_resolution(&workflow.approve(&senior, &heads.id)?);
    report_resolution(&workflow.approve(&senior, &heads.id)?);

    println!("\nFinal standings");
    let views = render_all(&workflow);
    if args.json {
        match serde_json::to_string_pretty(&views) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("  Leaderboard payload unavailable: {err}"),
        }
    }

    Ok(())
}

fn grades(entries: &[(&str, u8)]) -> BTreeMap<EmployeeId, u8> {
    entries
        .iter()
        .map(|(id, grade)| (EmployeeId::new(id), *grade))
        .collect()
}

fn report_resolution(resolution: &Resolution) {
    println!("- {}", resolution.summary());
}

fn render_all<S: PeriodStore + 'static>(workflow: &RatingWorkflow<S>) -> Vec<LeaderboardView> {
    Role::ordered()
        .into_iter()
        .filter_map(|role| workflow.leaderboard(&LeaderboardQuery::new(role)))
        .inspect(render_leaderboard)
        .collect()
}

pub(crate) fn render_leaderboard(view: &LeaderboardView) {
    let status = if view.provisional {
        " (ratings pending)"
    } else {
        ""
    };
    println!(
        "\n{} leaderboard{} - {}/{} rated",
        view.role_label, status, view.coverage.rated, view.coverage.total
    );
    if view.entries.is_empty() {
        println!("  no employees in this role");
        return;
    }
    for entry in &view.entries {
        let rating = entry
            .approved_rating
            .map(|grade| grade.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {}. {:<12} system {:>7.2} | final {:>7.2} | rating {}",
            entry.rank,
            entry.id.as_str(),
            entry.system_score,
            entry.final_score,
            rating
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::parse_period;

    #[test]
    fn demo_runs_end_to_end() {
        let args = DemoArgs {
            period: Some(parse_period("2025-11").expect("valid period")),
            json: true,
        };
        run_demo(args).expect("demo completes");
    }

    #[test]
    fn score_command_reads_exports_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let activity = dir.path().join("activity.csv");
        let reports = dir.path().join("reports.csv");
        std::fs::write(&activity, DEMO_ACTIVITY_CSV).expect("write activity");
        std::fs::write(&reports, DEMO_REPORT_CSV).expect("write reports");

        let args = ScoreArgs {
            activity,
            reports,
            period: parse_period("2025-12").expect("valid period"),
            rules: None,
            skip_rows: DEMO_ACTIVITY_SKIP_ROWS,
            top: 3,
            system: true,
        };
        run_score(args).expect("score completes");
    }
}

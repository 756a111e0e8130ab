//! Per-role rankings over a scored period.

mod views;

pub use views::{LeaderboardEntry, LeaderboardView, RatingCoverage};

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::workflows::scoring::{
    ApprovedRatings, ReportingPeriod, Role, ScoredRecord, ScoredRecordSet,
};

pub const DEFAULT_TOP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMetric {
    System,
    #[default]
    Final,
}

impl ScoreMetric {
    fn value(self, record: &ScoredRecord) -> f64 {
        match self {
            ScoreMetric::System => record.system_score,
            ScoreMetric::Final => record.final_score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardQuery {
    pub role: Role,
    #[serde(default)]
    pub metric: ScoreMetric,
    #[serde(default = "default_top")]
    pub top: usize,
}

fn default_top() -> usize {
    DEFAULT_TOP
}

impl LeaderboardQuery {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            metric: ScoreMetric::default(),
            top: DEFAULT_TOP,
        }
    }

    pub fn by(mut self, metric: ScoreMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn top(mut self, top: usize) -> Self {
        self.top = top;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leaderboard {
    pub query: LeaderboardQuery,
    pub entries: Vec<LeaderboardEntry>,
    pub coverage: RatingCoverage,
}

impl Leaderboard {
    /// Ranks the role's employees by the chosen metric, highest first, ties broken by
    /// id. Rows without an employee id are never ranked.
    pub fn build(
        records: &ScoredRecordSet,
        approved: &ApprovedRatings,
        query: &LeaderboardQuery,
    ) -> Self {
        let mut candidates: Vec<&ScoredRecord> = records
            .by_role(query.role)
            .filter(|record| !record.id.is_unknown())
            .collect();

        let coverage = RatingCoverage {
            rated: candidates
                .iter()
                .filter(|record| approved.contains_key(&record.id))
                .count(),
            total: candidates.len(),
        };

        candidates.sort_by(|left, right| {
            query
                .metric
                .value(right)
                .partial_cmp(&query.metric.value(left))
                .unwrap_or(Ordering::Equal)
                .then_with(|| left.id.cmp(&right.id))
        });

        let entries = candidates
            .into_iter()
            .take(query.top)
            .enumerate()
            .map(|(index, record)| LeaderboardEntry {
                rank: index + 1,
                id: record.id.clone(),
                formula: record.formula,
                score: query.metric.value(record),
                system_score: record.system_score,
                final_score: record.final_score,
                approved_rating: approved.get(&record.id).copied(),
            })
            .collect();

        Self {
            query: *query,
            entries,
            coverage,
        }
    }

    pub fn view(&self, period: Option<ReportingPeriod>) -> LeaderboardView {
        LeaderboardView {
            period,
            role: self.query.role,
            role_label: self.query.role.label(),
            metric: self.query.metric,
            entries: self.entries.clone(),
            coverage: self.coverage,
            provisional: self.coverage.is_provisional(),
        }
    }
}

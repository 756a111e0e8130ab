use serde::Serialize;

use super::ScoreMetric;
use crate::workflows::scoring::{AppliedFormula, EmployeeId, ReportingPeriod, Role};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub id: EmployeeId,
    pub formula: AppliedFormula,
    pub score: f64,
    pub system_score: f64,
    pub final_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_rating: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RatingCoverage {
    pub rated: usize,
    pub total: usize,
}

impl RatingCoverage {
    /// Final scores still lean on the default rating for someone in this role.
    pub fn is_provisional(&self) -> bool {
        self.rated < self.total
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<ReportingPeriod>,
    pub role: Role,
    pub role_label: &'static str,
    pub metric: ScoreMetric,
    pub entries: Vec<LeaderboardEntry>,
    pub coverage: RatingCoverage,
    pub provisional: bool,
}

use super::config::{FormulaVariant, ScoringConfig};
use super::domain::{EmployeeRecord, EmployeeRecordSet, Role};
use serde::{Deserialize, Serialize};

/// Formula that produced a record's volume, kept for audits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedFormula {
    SharedWorkloadLead,
    DiscountedTierAnalyst,
    TeamLead,
    Analyst,
}

impl AppliedFormula {
    pub const fn role(self) -> Role {
        match self {
            AppliedFormula::SharedWorkloadLead | AppliedFormula::TeamLead => Role::TeamLead,
            AppliedFormula::DiscountedTierAnalyst | AppliedFormula::Analyst => Role::Analyst,
        }
    }
}

/// Count terms read from a record once, before any weighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct VolumeTerms {
    pub maker: f64,
    pub checker: f64,
    pub report: f64,
    pub priority_report: f64,
}

impl VolumeTerms {
    pub(crate) fn from_record(record: &EmployeeRecord, config: &ScoringConfig) -> Self {
        Self {
            maker: record.sum_of(&config.fields.maker),
            checker: record.sum_of(&config.fields.checker),
            report: record.count(&config.fields.report),
            priority_report: record.count(&config.fields.priority_report),
        }
    }
}

pub(crate) struct FormulaSelection {
    pub formula: AppliedFormula,
    pub volume: f64,
    pub target: f64,
}

/// Raw maker volume of the shared-workload source, or zero when it has no record.
pub(crate) fn shared_raw_volume(records: &EmployeeRecordSet, config: &ScoringConfig) -> f64 {
    config
        .shared_workload_source
        .as_ref()
        .and_then(|id| records.get(id))
        .map(|record| record.sum_of(&config.fields.shared_maker))
        .unwrap_or(0.0)
}

/// Resolves the formula for one record. Special cases are checked in configured order,
/// then checker activity, then the analyst fallback; the first match wins.
pub(crate) fn select_formula(
    record: &EmployeeRecord,
    terms: &VolumeTerms,
    config: &ScoringConfig,
    month: u32,
    shared_raw: f64,
) -> FormulaSelection {
    let weights = &config.weights;
    let report_volume =
        terms.report * weights.report + terms.priority_report * weights.priority_report;

    let variant = config
        .special_cases
        .iter()
        .find(|rule| rule.applies_to(&record.id, month))
        .map(|rule| rule.variant);

    match variant {
        Some(FormulaVariant::SharedWorkloadLead) => FormulaSelection {
            formula: AppliedFormula::SharedWorkloadLead,
            volume: (terms.checker - shared_raw)
                + shared_raw * weights.shared_volume_retained
                + report_volume,
            target: config.targets.standard,
        },
        Some(FormulaVariant::DiscountedTierAnalyst) => FormulaSelection {
            formula: AppliedFormula::DiscountedTierAnalyst,
            volume: terms.maker * weights.discounted_maker
                + terms.report * weights.discounted_report,
            target: config.targets.discounted_tier,
        },
        Some(FormulaVariant::Standard) | None if terms.checker > 0.0 => FormulaSelection {
            formula: AppliedFormula::TeamLead,
            volume: terms.checker + report_volume,
            target: config.targets.standard,
        },
        Some(FormulaVariant::Standard) | None => FormulaSelection {
            formula: AppliedFormula::Analyst,
            volume: terms.maker + report_volume,
            target: config.targets.standard,
        },
    }
}

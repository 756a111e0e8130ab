//! Deterministic productivity scoring: role resolution, volume formulas, target
//! normalization and the blend with approved human ratings.

mod config;
pub mod domain;
mod policy;
mod rules;

pub use config::{
    FieldMapping, FormulaVariant, FormulaWeights, NormalizationPolicy, RatingScale,
    ScoringConfig, ScoringConfigError, SpecialCaseRule, TargetTable,
};
pub use domain::{
    ApprovedRatings, EmployeeId, EmployeeRecord, EmployeeRecordSet, ReportingPeriod, Role,
    ScoredRecord, ScoredRecordSet, UNKNOWN_EMPLOYEE,
};
pub use rules::AppliedFormula;

use rules::{select_formula, shared_raw_volume, VolumeTerms};
use tracing::debug;

/// Stateless evaluator applying a validated [`ScoringConfig`] to a period's records.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Result<Self, ScoringConfigError> {
        config.validate()?;
        Ok(Self {
            config: config.normalized(),
        })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn rating_scale(&self) -> &RatingScale {
        &self.config.rating
    }

    /// Scores every record for the given calendar month. Pure: the same records,
    /// ratings and month always produce the same output.
    pub fn compute(
        &self,
        records: &EmployeeRecordSet,
        approved: &ApprovedRatings,
        month: u32,
    ) -> Result<ScoredRecordSet, ScoringError> {
        if !(1..=12).contains(&month) {
            return Err(ScoringError::InvalidMonth(month));
        }

        for record in records.iter() {
            check_counts(record)?;
        }

        let shared_raw = shared_raw_volume(records, &self.config);

        let scored = records
            .iter()
            .map(|record| self.score_record(record, approved, month, shared_raw))
            .collect::<Result<ScoredRecordSet, _>>()?;

        debug!(
            records = scored.len(),
            month,
            shared_raw,
            "scored reporting period"
        );
        Ok(scored)
    }

    /// Re-blends final scores with the current ratings. Role, volume and system score
    /// are left exactly as they were computed.
    pub fn refresh_scores(&self, scored: &mut ScoredRecordSet, approved: &ApprovedRatings) {
        for record in scored.iter_mut() {
            let rating = self.rating_for(&record.id, approved);
            record.final_score = policy::blend(record.system_score, rating, &self.config.rating);
        }
    }

    /// Approved rating for `id`, or the scale default when none has been approved.
    pub fn rating_for(&self, id: &EmployeeId, approved: &ApprovedRatings) -> u8 {
        approved
            .get(id)
            .copied()
            .unwrap_or(self.config.rating.default)
    }

    fn score_record(
        &self,
        record: &EmployeeRecord,
        approved: &ApprovedRatings,
        month: u32,
        shared_raw: f64,
    ) -> Result<ScoredRecord, ScoringError> {
        let terms = VolumeTerms::from_record(record, &self.config);
        let selection = select_formula(record, &terms, &self.config, month, shared_raw);
        let system_score = policy::system_score(
            &self.config.normalization,
            selection.volume,
            selection.target,
            &terms,
        )?;
        let rating = self.rating_for(&record.id, approved);

        Ok(ScoredRecord {
            id: record.id.clone(),
            role: selection.formula.role(),
            formula: selection.formula,
            volume: selection.volume,
            target: selection.target,
            system_score,
            final_score: policy::blend(system_score, rating, &self.config.rating),
        })
    }
}

fn check_counts(record: &EmployeeRecord) -> Result<(), ScoringError> {
    for (field, value) in &record.counts {
        if !value.is_finite() || *value < 0.0 {
            return Err(ScoringError::InvalidCount {
                id: record.id.clone(),
                field: field.clone(),
                value: *value,
            });
        }
    }
    Ok(())
}

/// Scoring failures. None of these are recovered internally.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error(transparent)]
    Configuration(#[from] ScoringConfigError),
    #[error("target for '{name}' is {target}; scoring would divide by zero")]
    ZeroTarget { name: &'static str, target: f64 },
    #[error("month {0} is outside 1..=12")]
    InvalidMonth(u32),
    #[error("count '{field}' for {id} is {value}; counts must be non-negative")]
    InvalidCount {
        id: EmployeeId,
        field: String,
        value: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(config: ScoringConfig) -> ScoringEngine {
        ScoringEngine::new(config).expect("valid scoring config")
    }

    fn analyst(id: &str, rfi: f64, close: f64, reports: f64) -> EmployeeRecord {
        EmployeeRecord::new(EmployeeId::new(id))
            .with_count("SEND RFI", rfi)
            .with_count("RECOMMEND CLOSE WITHOUT SAR", close)
            .with_count("STR", reports)
    }

    fn lead(id: &str, close: f64, reject: f64) -> EmployeeRecord {
        EmployeeRecord::new(EmployeeId::new(id))
            .with_count("CLOSE WITHOUT SAR", close)
            .with_count("REJECT RECOMMENDATION", reject)
    }

    fn special_config() -> ScoringConfig {
        ScoringConfig::standard()
            .with_shared_workload_source(EmployeeId::new("analyst.tier2"))
            .with_special_case(
                SpecialCaseRule::new("lead.north", FormulaVariant::SharedWorkloadLead)
                    .in_months(1..=11),
            )
            .with_special_case(
                SpecialCaseRule::new("lead.south", FormulaVariant::SharedWorkloadLead)
                    .in_months([12]),
            )
            .with_special_case(SpecialCaseRule::new(
                "analyst.tier2",
                FormulaVariant::DiscountedTierAnalyst,
            ))
    }

    #[test]
    fn analyst_example_scores_above_one_hundred() {
        let records: EmployeeRecordSet = [analyst("amir.k", 20.0, 8.0, 1.0)].into_iter().collect();
        let scored = engine(ScoringConfig::standard())
            .compute(&records, &ApprovedRatings::new(), 11)
            .expect("scores");

        let record = scored.get(&EmployeeId::new("AMIR.K")).expect("record");
        assert_eq!(record.role, Role::Analyst);
        assert_eq!(record.volume, 48.0);
        assert_eq!(record.system_score, 114.0);
        assert_eq!(record.final_score, 102.3);
    }

    #[test]
    fn checker_activity_resolves_team_lead() {
        let records: EmployeeRecordSet = [lead("lead.east", 30.0, 6.0)
            .with_count("STR", 1.0)
            .with_count("PRI STR", 2.0)]
        .into_iter()
        .collect();
        let scored = engine(ScoringConfig::standard())
            .compute(&records, &ApprovedRatings::new(), 4)
            .expect("scores");

        let record = scored.get(&EmployeeId::new("lead.east")).expect("record");
        assert_eq!(record.role, Role::TeamLead);
        assert_eq!(record.formula, AppliedFormula::TeamLead);
        assert_eq!(record.volume, 36.0 + 20.0 + 4.0);
        assert_eq!(record.system_score, 135.0);
    }

    #[test]
    fn shared_workload_lead_reallocates_source_volume() {
        let records: EmployeeRecordSet = [
            lead("lead.north", 40.0, 10.0),
            analyst("analyst.tier2", 15.0, 5.0, 0.0)
                .with_count("RECOMMEND CLOSE AND GENERATE SAR", 100.0),
        ]
        .into_iter()
        .collect();
        let scored = engine(special_config())
            .compute(&records, &ApprovedRatings::new(), 6)
            .expect("scores");

        let north = scored.get(&EmployeeId::new("lead.north")).expect("lead");
        // shared raw volume is RFI + close-without-report only: 20
        assert_eq!(north.formula, AppliedFormula::SharedWorkloadLead);
        assert_eq!(north.volume, (50.0 - 20.0) + 20.0 * 0.2);
        assert_eq!(north.role, Role::TeamLead);
        assert_eq!(north.target, 40.0);
    }

    #[test]
    fn shared_workload_rule_falls_through_outside_its_months() {
        let records: EmployeeRecordSet = [
            lead("lead.north", 40.0, 10.0),
            analyst("analyst.tier2", 15.0, 5.0, 0.0),
        ]
        .into_iter()
        .collect();
        let scored = engine(special_config())
            .compute(&records, &ApprovedRatings::new(), 12)
            .expect("scores");

        let north = scored.get(&EmployeeId::new("lead.north")).expect("lead");
        assert_eq!(north.formula, AppliedFormula::TeamLead);
        assert_eq!(north.volume, 50.0);
    }

    #[test]
    fn shared_workload_lead_without_checker_activity_in_window() {
        let records: EmployeeRecordSet = [analyst("lead.south", 0.0, 0.0, 0.0)]
            .into_iter()
            .collect();
        let scored = engine(special_config())
            .compute(&records, &ApprovedRatings::new(), 12)
            .expect("scores");

        // source has no record, so shared raw volume is zero
        let south = scored.get(&EmployeeId::new("lead.south")).expect("lead");
        assert_eq!(south.formula, AppliedFormula::SharedWorkloadLead);
        assert_eq!(south.volume, 0.0);
        assert_eq!(south.system_score, 30.0);
    }

    #[test]
    fn discounted_tier_analyst_uses_dedicated_formula() {
        let records: EmployeeRecordSet = [analyst("analyst.tier2", 100.0, 50.0, 100.0)
            .with_count("RECOMMEND CLOSE AND GENERATE SAR", 50.0)
            .with_count("CLOSE WITHOUT SAR", 9.0)]
        .into_iter()
        .collect();
        let scored = engine(special_config())
            .compute(&records, &ApprovedRatings::new(), 3)
            .expect("scores");

        let record = scored.get(&EmployeeId::new("analyst.tier2")).expect("record");
        assert_eq!(record.formula, AppliedFormula::DiscountedTierAnalyst);
        assert_eq!(record.role, Role::Analyst);
        assert_eq!(record.volume, 200.0 * 0.2 + 100.0 * 0.33);
        assert_eq!(record.target, 200.0);
        assert_eq!(record.system_score, 55.55);
    }

    #[test]
    fn approved_rating_replaces_default_in_blend() {
        let records: EmployeeRecordSet = [analyst("amir.k", 20.0, 8.0, 1.0)].into_iter().collect();
        let mut approved = ApprovedRatings::new();
        approved.insert(EmployeeId::new("amir.k"), 5);
        let scored = engine(ScoringConfig::standard())
            .compute(&records, &approved, 11)
            .expect("scores");

        let record = scored.get(&EmployeeId::new("amir.k")).expect("record");
        assert_eq!(record.final_score, 117.3);
    }

    #[test]
    fn refresh_only_touches_final_scores() {
        let engine = engine(special_config());
        let records: EmployeeRecordSet = [
            lead("lead.north", 40.0, 10.0),
            analyst("analyst.tier2", 15.0, 5.0, 2.0),
            analyst("amir.k", 20.0, 8.0, 1.0),
        ]
        .into_iter()
        .collect();
        let original = engine
            .compute(&records, &ApprovedRatings::new(), 6)
            .expect("scores");

        let mut approved = ApprovedRatings::new();
        approved.insert(EmployeeId::new("amir.k"), 1);
        let mut refreshed = original.clone();
        engine.refresh_scores(&mut refreshed, &approved);

        for (before, after) in original.iter().zip(refreshed.iter()) {
            assert_eq!(before.role, after.role);
            assert_eq!(before.volume, after.volume);
            assert_eq!(before.system_score, after.system_score);
        }
        let amir = refreshed.get(&EmployeeId::new("amir.k")).expect("record");
        assert_eq!(amir.final_score, policy::round2(114.0 * 0.7 + 25.0 * 0.3));
        assert_eq!(
            refreshed.get(&EmployeeId::new("lead.north")),
            original.get(&EmployeeId::new("lead.north"))
        );

        let recomputed = engine.compute(&records, &approved, 6).expect("scores");
        assert_eq!(recomputed, refreshed);
    }

    #[test]
    fn compute_is_idempotent() {
        let engine = engine(special_config());
        let records: EmployeeRecordSet = [
            lead("lead.north", 12.0, 3.0),
            analyst("analyst.tier2", 4.0, 1.0, 0.0),
            analyst("UNKNOWN", 1.0, 0.0, 0.0),
        ]
        .into_iter()
        .collect();
        let first = engine.compute(&records, &ApprovedRatings::new(), 2).expect("scores");
        let second = engine.compute(&records, &ApprovedRatings::new(), 2).expect("scores");
        assert_eq!(first, second);
        assert!(first.get(&EmployeeId::unknown()).is_some());
    }

    #[test]
    fn negative_counts_are_surfaced() {
        let records: EmployeeRecordSet = [analyst("amir.k", -1.0, 0.0, 0.0)].into_iter().collect();
        let error = engine(ScoringConfig::standard())
            .compute(&records, &ApprovedRatings::new(), 1)
            .expect_err("negative count");
        assert!(matches!(error, ScoringError::InvalidCount { value, .. } if value == -1.0));
    }

    #[test]
    fn invalid_month_is_rejected() {
        let error = engine(ScoringConfig::standard())
            .compute(&EmployeeRecordSet::new(), &ApprovedRatings::new(), 0)
            .expect_err("month zero");
        assert_eq!(error, ScoringError::InvalidMonth(0));
    }

    #[test]
    fn engine_refuses_zero_targets() {
        let mut config = ScoringConfig::standard();
        config.targets.discounted_tier = 0.0;
        assert!(matches!(
            ScoringEngine::new(config),
            Err(ScoringConfigError::NonPositiveTarget { .. })
        ));
    }

    #[test]
    fn field_names_are_matched_after_normalization() {
        let mut config = ScoringConfig::standard();
        config.fields.report = "  str ".to_string();
        let records: EmployeeRecordSet = [analyst("amir.k", 20.0, 8.0, 1.0)].into_iter().collect();
        let scored = engine(config)
            .compute(&records, &ApprovedRatings::new(), 5)
            .expect("scores");
        assert_eq!(scored.get(&EmployeeId::new("amir.k")).expect("record").volume, 48.0);
    }
}

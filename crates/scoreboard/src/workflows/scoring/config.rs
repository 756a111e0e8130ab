use serde::{Deserialize, Serialize};

use super::domain::EmployeeId;
use crate::workflows::ingest::normalize_header;

/// Declarative scoring rules: which columns feed which formula term, the weights and
/// targets applied to them, and the per-employee formula overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub fields: FieldMapping,
    pub weights: FormulaWeights,
    pub targets: TargetTable,
    pub normalization: NormalizationPolicy,
    pub special_cases: Vec<SpecialCaseRule>,
    /// Employee whose raw maker volume is reallocated to shared-workload leads.
    pub shared_workload_source: Option<EmployeeId>,
    pub rating: RatingScale,
}

impl ScoringConfig {
    /// Column set, weights and targets used by the monthly case-management exports.
    pub fn standard() -> Self {
        Self {
            fields: FieldMapping::default(),
            weights: FormulaWeights::default(),
            targets: TargetTable::default(),
            normalization: NormalizationPolicy::UncappedLinear,
            special_cases: Vec::new(),
            shared_workload_source: None,
            rating: RatingScale::default(),
        }
    }

    pub fn with_special_case(mut self, rule: SpecialCaseRule) -> Self {
        self.special_cases.push(rule);
        self
    }

    pub fn with_shared_workload_source(mut self, id: EmployeeId) -> Self {
        self.shared_workload_source = Some(id);
        self
    }

    pub fn with_normalization(mut self, policy: NormalizationPolicy) -> Self {
        self.normalization = policy;
        self
    }

    /// Checks every target, weight and rule, returning the first defect found.
    pub fn validate(&self) -> Result<(), ScoringConfigError> {
        self.fields.validate()?;
        self.weights.validate()?;

        positive_target("standard", self.targets.standard)?;
        positive_target("discounted_tier", self.targets.discounted_tier)?;
        if let NormalizationPolicy::CappedRatioMax {
            report_target,
            priority_report_target,
        } = self.normalization
        {
            positive_target("report", report_target)?;
            positive_target("priority_report", priority_report_target)?;
        }

        self.rating.validate()?;

        for rule in &self.special_cases {
            if rule.id.is_unknown() {
                return Err(ScoringConfigError::UnnamedSpecialCase);
            }
            if let Some(month) = rule.months.iter().copied().find(|m| !(1..=12).contains(m)) {
                return Err(ScoringConfigError::InvalidMonth {
                    id: rule.id.clone(),
                    month,
                });
            }
            if rule.variant == FormulaVariant::SharedWorkloadLead
                && self.shared_workload_source.is_none()
            {
                return Err(ScoringConfigError::MissingSharedWorkloadSource {
                    id: rule.id.clone(),
                });
            }
        }

        Ok(())
    }

    /// Field names rewritten to the header form produced by ingestion.
    pub(crate) fn normalized(mut self) -> Self {
        self.fields = self.fields.normalized();
        self
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self::standard()
    }
}

fn positive_target(name: &'static str, value: f64) -> Result<(), ScoringConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ScoringConfigError::NonPositiveTarget { name, value })
    }
}

/// Maps source columns onto the formula's volume terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    /// Case initiation and recommendation actions.
    pub maker: Vec<String>,
    /// Subset of maker actions counted as the shared workload.
    pub shared_maker: Vec<String>,
    /// Review, closure and escalation actions.
    pub checker: Vec<String>,
    pub report: String,
    pub priority_report: String,
}

impl FieldMapping {
    /// Every column the scoring rules read, in declaration order.
    pub fn all(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        let candidates = self
            .maker
            .iter()
            .chain(&self.shared_maker)
            .chain(&self.checker)
            .chain([&self.report, &self.priority_report]);
        for field in candidates {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }
        fields
    }

    fn validate(&self) -> Result<(), ScoringConfigError> {
        if self.all().iter().any(|field| field.trim().is_empty()) {
            return Err(ScoringConfigError::EmptyFieldName);
        }
        Ok(())
    }

    fn normalized(self) -> Self {
        let normalize = |fields: Vec<String>| -> Vec<String> {
            fields.iter().map(|field| normalize_header(field)).collect()
        };
        Self {
            maker: normalize(self.maker),
            shared_maker: normalize(self.shared_maker),
            checker: normalize(self.checker),
            report: normalize_header(&self.report),
            priority_report: normalize_header(&self.priority_report),
        }
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|name| name.to_string()).collect();
        Self {
            maker: owned(&[
                "SEND RFI",
                "RECOMMEND CLOSE WITHOUT SAR",
                "RECOMMEND CLOSE AND GENERATE SAR",
            ]),
            shared_maker: owned(&["SEND RFI", "RECOMMEND CLOSE WITHOUT SAR"]),
            checker: owned(&[
                "CLOSE WITHOUT SAR",
                "REJECT RECOMMENDATION",
                "LINK AND CLOSE AS MERGE",
                "CLOSE AND GENERATE SAR",
            ]),
            report: "STR".to_string(),
            priority_report: "PRI STR".to_string(),
        }
    }
}

/// Multipliers applied to each volume term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormulaWeights {
    pub report: f64,
    pub priority_report: f64,
    /// Share of the reallocated workload a shared-workload lead keeps.
    pub shared_volume_retained: f64,
    pub discounted_maker: f64,
    pub discounted_report: f64,
}

impl FormulaWeights {
    fn validate(&self) -> Result<(), ScoringConfigError> {
        let weights = [
            ("report", self.report),
            ("priority_report", self.priority_report),
            ("shared_volume_retained", self.shared_volume_retained),
            ("discounted_maker", self.discounted_maker),
            ("discounted_report", self.discounted_report),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ScoringConfigError::InvalidWeight { name, value });
            }
        }
        Ok(())
    }
}

impl Default for FormulaWeights {
    fn default() -> Self {
        Self {
            report: 20.0,
            priority_report: 2.0,
            shared_volume_retained: 0.2,
            discounted_maker: 0.2,
            discounted_report: 0.33,
        }
    }
}

/// Volume targets the normalization divides by.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetTable {
    pub standard: f64,
    pub discounted_tier: f64,
}

impl Default for TargetTable {
    fn default() -> Self {
        Self {
            standard: 40.0,
            discounted_tier: 200.0,
        }
    }
}

/// How effective volume is turned into a system score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum NormalizationPolicy {
    /// `volume / target * 70 + 30`, with no upper bound.
    UncappedLinear,
    /// Volume, report and priority-report ratios each capped at 1.0; the best one wins.
    CappedRatioMax {
        report_target: f64,
        priority_report_target: f64,
    },
}

/// Per-employee formula override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaVariant {
    Standard,
    SharedWorkloadLead,
    DiscountedTierAnalyst,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialCaseRule {
    pub id: EmployeeId,
    pub variant: FormulaVariant,
    /// Calendar months the rule applies in; empty means every month.
    #[serde(default)]
    pub months: Vec<u32>,
}

impl SpecialCaseRule {
    pub fn new(id: impl Into<EmployeeId>, variant: FormulaVariant) -> Self {
        Self {
            id: id.into(),
            variant,
            months: Vec::new(),
        }
    }

    pub fn in_months(mut self, months: impl IntoIterator<Item = u32>) -> Self {
        self.months = months.into_iter().collect();
        self
    }

    pub fn applies_to(&self, id: &EmployeeId, month: u32) -> bool {
        self.id == *id && (self.months.is_empty() || self.months.contains(&month))
    }
}

/// Human rating scale and the weights used to blend it with the system score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingScale {
    pub min: u8,
    pub max: u8,
    /// Rating assumed until one is approved.
    pub default: u8,
    pub points_per_grade: f64,
    pub system_weight: f64,
    pub rating_weight: f64,
}

impl RatingScale {
    pub fn contains(&self, grade: u8) -> bool {
        (self.min..=self.max).contains(&grade)
    }

    fn validate(&self) -> Result<(), ScoringConfigError> {
        let weights_valid = [self.points_per_grade, self.system_weight, self.rating_weight]
            .iter()
            .all(|value| value.is_finite() && *value >= 0.0);
        if self.min == 0 || self.min > self.max || !self.contains(self.default) || !weights_valid
        {
            return Err(ScoringConfigError::InvalidRatingScale {
                min: self.min,
                max: self.max,
                default: self.default,
            });
        }
        Ok(())
    }
}

impl Default for RatingScale {
    fn default() -> Self {
        Self {
            min: 1,
            max: 5,
            default: 3,
            points_per_grade: 25.0,
            system_weight: 0.7,
            rating_weight: 0.3,
        }
    }
}

/// Defects in the scoring rules. Always fatal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringConfigError {
    #[error("target '{name}' must be a positive finite number (found {value})")]
    NonPositiveTarget { name: &'static str, value: f64 },
    #[error("weight '{name}' must be a non-negative finite number (found {value})")]
    InvalidWeight { name: &'static str, value: f64 },
    #[error("rating scale {min}..={max} with default {default} is invalid")]
    InvalidRatingScale { min: u8, max: u8, default: u8 },
    #[error("special case for {id} lists invalid month {month}")]
    InvalidMonth { id: EmployeeId, month: u32 },
    #[error("special case for {id} needs a shared_workload_source")]
    MissingSharedWorkloadSource { id: EmployeeId },
    #[error("special case rules must name an employee")]
    UnnamedSpecialCase,
    #[error("field mapping contains an empty column name")]
    EmptyFieldName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_rules_validate() {
        ScoringConfig::standard()
            .validate()
            .expect("standard rules are valid");
    }

    #[test]
    fn zero_target_is_rejected() {
        let mut config = ScoringConfig::standard();
        config.targets.standard = 0.0;
        assert_eq!(
            config.validate(),
            Err(ScoringConfigError::NonPositiveTarget {
                name: "standard",
                value: 0.0
            })
        );
    }

    #[test]
    fn capped_policy_targets_are_checked() {
        let config = ScoringConfig::standard().with_normalization(
            NormalizationPolicy::CappedRatioMax {
                report_target: 2.0,
                priority_report_target: 0.0,
            },
        );
        assert!(matches!(
            config.validate(),
            Err(ScoringConfigError::NonPositiveTarget {
                name: "priority_report",
                ..
            })
        ));
    }

    #[test]
    fn shared_workload_lead_requires_source() {
        let config = ScoringConfig::standard().with_special_case(SpecialCaseRule::new(
            "lead.one",
            FormulaVariant::SharedWorkloadLead,
        ));
        assert!(matches!(
            config.validate(),
            Err(ScoringConfigError::MissingSharedWorkloadSource { .. })
        ));
    }

    #[test]
    fn special_case_months_must_be_calendar_months() {
        let config = ScoringConfig::standard().with_special_case(
            SpecialCaseRule::new("analyst.x", FormulaVariant::DiscountedTierAnalyst)
                .in_months([1, 13]),
        );
        assert!(matches!(
            config.validate(),
            Err(ScoringConfigError::InvalidMonth { month: 13, .. })
        ));
    }

    #[test]
    fn rating_default_must_sit_inside_scale() {
        let mut config = ScoringConfig::standard();
        config.rating.max = 2;
        assert!(matches!(
            config.validate(),
            Err(ScoringConfigError::InvalidRatingScale { .. })
        ));
    }

    #[test]
    fn rules_deserialize_with_defaults() {
        let config: ScoringConfig = serde_json::from_str(
            r#"{
                "special_cases": [
                    {"id": "lead.one", "variant": "shared_workload_lead", "months": [1, 2]},
                    {"id": "analyst.x", "variant": "discounted_tier_analyst"}
                ],
                "shared_workload_source": "analyst.x",
                "normalization": {"policy": "capped_ratio_max", "report_target": 3, "priority_report_target": 5}
            }"#,
        )
        .expect("rules parse");

        assert_eq!(config.targets.standard, 40.0);
        assert_eq!(config.special_cases[0].id.as_str(), "LEAD.ONE");
        assert_eq!(config.special_cases[1].months, Vec::<u32>::new());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn special_case_month_window() {
        let rule = SpecialCaseRule::new("lead.one", FormulaVariant::SharedWorkloadLead)
            .in_months(1..=11);
        let id = EmployeeId::new("LEAD.ONE");
        assert!(rule.applies_to(&id, 11));
        assert!(!rule.applies_to(&id, 12));
        assert!(!rule.applies_to(&EmployeeId::new("other"), 3));
    }
}

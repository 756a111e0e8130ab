use super::config::{NormalizationPolicy, RatingScale};
use super::rules::VolumeTerms;
use super::ScoringError;

const SCORE_FLOOR: f64 = 30.0;
const SCORE_SPAN: f64 = 70.0;

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn system_score(
    policy: &NormalizationPolicy,
    volume: f64,
    target: f64,
    terms: &VolumeTerms,
) -> Result<f64, ScoringError> {
    let volume_ratio = ratio("volume", volume, target)?;

    let normalized = match *policy {
        NormalizationPolicy::UncappedLinear => volume_ratio,
        NormalizationPolicy::CappedRatioMax {
            report_target,
            priority_report_target,
        } => {
            let report_ratio = ratio("report", terms.report, report_target)?;
            let priority_ratio =
                ratio("priority_report", terms.priority_report, priority_report_target)?;
            [volume_ratio, report_ratio, priority_ratio]
                .into_iter()
                .map(|value| value.min(1.0))
                .fold(f64::NEG_INFINITY, f64::max)
        }
    };

    Ok(round2(normalized * SCORE_SPAN + SCORE_FLOOR))
}

pub(crate) fn blend(system_score: f64, rating: u8, scale: &RatingScale) -> f64 {
    let rating_points = f64::from(rating) * scale.points_per_grade;
    round2(system_score * scale.system_weight + rating_points * scale.rating_weight)
}

fn ratio(name: &'static str, value: f64, target: f64) -> Result<f64, ScoringError> {
    if target.is_finite() && target > 0.0 {
        Ok(value / target)
    } else {
        Err(ScoringError::ZeroTarget { name, target })
    }
}

use crate::models::{AnalysisReport, RawAnalysis, RiskLevel};

const FALLBACK_SUMMARY: &str = "Unable to analyze image";
const FALLBACK_CATEGORY: &str = "unknown";
const FALLBACK_STEP: &str = "Consult a healthcare professional";

/// Validate and repair the loosely-typed payload parsed out of the model's
/// text. Every field gets a fixed fallback rather than an error: the caller
/// always receives a complete report. Idempotent.
pub fn normalize(raw: RawAnalysis) -> AnalysisReport {
    let summary = match raw.summary {
        Some(s) if !s.trim().is_empty() => s,
        _ => FALLBACK_SUMMARY.to_string(),
    };

    let likely_categories = match raw.likely_categories {
        Some(cats) => {
            let cats: Vec<String> = cats.into_iter().filter(|c| !c.trim().is_empty()).collect();
            if cats.is_empty() {
                vec![FALLBACK_CATEGORY.to_string()]
            } else {
                cats
            }
        }
        None => vec![FALLBACK_CATEGORY.to_string()],
    };

    let risk_level = match raw.risk_level.as_deref() {
        Some("low") => RiskLevel::Low,
        Some("medium") => RiskLevel::Medium,
        Some("high") => RiskLevel::High,
        _ => RiskLevel::Low,
    };

    let next_steps = match raw.next_steps {
        Some(steps) if !steps.is_empty() => steps,
        _ => vec![FALLBACK_STEP.to_string()],
    };

    let confidence_percentages =
        normalize_confidences(raw.confidence_percentages, likely_categories.len());

    AnalysisReport {
        summary,
        likely_categories,
        confidence_percentages,
        risk_level,
        next_steps,
    }
}

/// Rescale confidence values so they are integers summing to exactly 100,
/// with the rounding residual assigned to the first element. The field is
/// dropped when absent, empty, misaligned with the category list, or without
/// a positive sum — callers must not assume presence.
fn normalize_confidences(raw: Option<Vec<f64>>, category_count: usize) -> Option<Vec<u32>> {
    let values = raw?;
    if values.is_empty() || values.len() != category_count {
        return None;
    }
    let sum: f64 = values.iter().sum();
    if !(sum.is_finite() && sum > 0.0) || values.iter().any(|v| *v < 0.0) {
        return None;
    }

    let mut scaled: Vec<i64> = values
        .iter()
        .map(|v| (v * 100.0 / sum).round() as i64)
        .collect();
    let residual = 100 - scaled.iter().sum::<i64>();
    scaled[0] += residual;
    if scaled[0] < 0 {
        return None;
    }
    Some(scaled.into_iter().map(|v| v as u32).collect())
}

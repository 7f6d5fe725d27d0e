use std::sync::Arc;

use tracing::{info, warn};

use crate::inference::VisionModel;
use crate::models::{AnalysisReport, QualityReport, RegionOfInterest, RiskLevel};
use crate::normalize::normalize;
use crate::preprocessing::ImageOps;

/// Final product of one pipeline run: a complete report, plus the quality
/// metrics when the quality check succeeded.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub report: AnalysisReport,
    pub image_quality: Option<QualityReport>,
}

/// Orchestrates one analysis request as a linear staged pipeline:
/// quality gate, optional region extraction, preprocessing, inference.
///
/// Each stage carries its own recovery policy. The quality gate may
/// short-circuit the whole run (poor input never reaches the model), region
/// extraction and preprocessing are skip-and-continue, and inference failure
/// substitutes a fixed fallback report. `run` never fails: collaborator
/// trouble is absorbed into advisory content.
pub struct AnalysisPipeline {
    image_ops: Arc<dyn ImageOps>,
    model: Arc<dyn VisionModel>,
}

impl AnalysisPipeline {
    pub fn new(image_ops: Arc<dyn ImageOps>, model: Arc<dyn VisionModel>) -> Self {
        Self { image_ops, model }
    }

    pub async fn run(&self, image_base64: &str, roi: Option<&RegionOfInterest>) -> AnalysisOutcome {
        // Quality gate. A failed check is treated as unknown quality, never
        // as a reason to block analysis.
        let image_quality = match self.image_ops.check_quality(image_base64).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "quality check unavailable, continuing without gate");
                None
            }
        };

        if let Some(report) = image_quality {
            if !report.is_good_quality {
                info!(
                    brightness = report.brightness,
                    contrast = report.contrast,
                    sharpness = report.sharpness,
                    "image rejected by quality gate, skipping inference"
                );
                return AnalysisOutcome {
                    report: quality_rejection_report(),
                    image_quality,
                };
            }
        }

        let mut working_image = image_base64.to_string();

        // Region extraction, only when the caller marked a region.
        if let Some(roi) = roi {
            match self.image_ops.extract_region(&working_image, roi).await {
                Ok(cropped) => working_image = cropped,
                Err(e) => {
                    warn!(error = %e, "region extraction failed, analyzing full frame");
                }
            }
        }

        // Preprocessing improves the model's input but is never a gate.
        match self.image_ops.preprocess(&working_image).await {
            Ok(enhanced) => working_image = enhanced,
            Err(e) => {
                warn!(error = %e, "preprocessing failed, using unprocessed image");
            }
        }

        let report = match self.model.analyze(&working_image).await {
            Ok(raw) => normalize(raw),
            Err(e) => {
                warn!(error = %e, "inference failed, substituting fallback report");
                inference_failure_report()
            }
        };

        info!(risk_level = ?report.risk_level, "analysis complete");

        AnalysisOutcome {
            report,
            image_quality,
        }
    }
}

/// Terminal result of the quality gate: advisory retake instructions instead
/// of an analysis.
fn quality_rejection_report() -> AnalysisReport {
    AnalysisReport {
        summary: "The image quality is too low for a reliable look. \
                  Please retake the photo and try again."
            .to_string(),
        likely_categories: vec!["poor_image_quality".to_string()],
        confidence_percentages: None,
        risk_level: RiskLevel::Low,
        next_steps: vec![
            "Retake the photo in bright, even lighting".to_string(),
            "Hold the camera steady and close to the area".to_string(),
            "Make sure the area is in focus before capturing".to_string(),
        ],
    }
}

/// Substituted whenever inference fails; the caller always receives a
/// complete, non-alarming report.
fn inference_failure_report() -> AnalysisReport {
    AnalysisReport {
        summary: "Unable to analyze the image at this time. Please try again later.".to_string(),
        likely_categories: vec!["analysis_error".to_string()],
        confidence_percentages: None,
        risk_level: RiskLevel::Low,
        next_steps: vec![
            "Try taking another photo with better lighting".to_string(),
            "Consult a dermatologist for professional evaluation".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InferenceError, PreprocessError};
    use crate::models::{ImageOperation, ProcessPayload, RawAnalysis};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn good_quality() -> QualityReport {
        QualityReport {
            brightness: 120.0,
            contrast: 45.0,
            sharpness: 80.0,
            is_good_quality: true,
        }
    }

    fn poor_quality() -> QualityReport {
        QualityReport {
            brightness: 20.0,
            contrast: 10.0,
            sharpness: 5.0,
            is_good_quality: false,
        }
    }

    /// Configurable image-ops stub tracking which operations ran.
    #[derive(Default)]
    struct StubImageOps {
        quality: Option<QualityReport>,
        fail_quality: bool,
        fail_roi: bool,
        fail_preprocess: bool,
        preprocess_calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageOps for StubImageOps {
        async fn check_quality(&self, _image: &str) -> Result<QualityReport, PreprocessError> {
            if self.fail_quality {
                return Err(PreprocessError::Unavailable("down".to_string()));
            }
            Ok(self.quality.unwrap_or_else(good_quality))
        }

        async fn extract_region(
            &self,
            image: &str,
            _roi: &RegionOfInterest,
        ) -> Result<String, PreprocessError> {
            if self.fail_roi {
                return Err(PreprocessError::Unavailable("down".to_string()));
            }
            Ok(format!("{image}:cropped"))
        }

        async fn preprocess(&self, image: &str) -> Result<String, PreprocessError> {
            self.preprocess_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_preprocess {
                return Err(PreprocessError::Unavailable("down".to_string()));
            }
            Ok(format!("{image}:enhanced"))
        }

        async fn run_operation(
            &self,
            _operation: ImageOperation,
            _image: &str,
            _roi: Option<&RegionOfInterest>,
        ) -> Result<ProcessPayload, PreprocessError> {
            Ok(ProcessPayload::default())
        }

        async fn is_reachable(&self) -> bool {
            true
        }
    }

    /// Vision stub recording the image it was called with.
    struct StubModel {
        analyze_calls: AtomicUsize,
        last_image: std::sync::Mutex<Option<String>>,
        result: Result<RawAnalysis, ()>,
    }

    impl StubModel {
        fn returning(raw: RawAnalysis) -> Self {
            Self {
                analyze_calls: AtomicUsize::new(0),
                last_image: std::sync::Mutex::new(None),
                result: Ok(raw),
            }
        }

        fn failing() -> Self {
            Self {
                analyze_calls: AtomicUsize::new(0),
                last_image: std::sync::Mutex::new(None),
                result: Err(()),
            }
        }
    }

    #[async_trait]
    impl VisionModel for StubModel {
        async fn analyze(&self, image: &str) -> Result<RawAnalysis, InferenceError> {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_image.lock().unwrap() = Some(image.to_string());
            match &self.result {
                Ok(raw) => Ok(raw.clone()),
                Err(()) => Err(InferenceError::Format("no JSON object".to_string())),
            }
        }

        async fn converse(
            &self,
            _prompt: &str,
            _images: &[String],
        ) -> Result<String, InferenceError> {
            Ok("ok".to_string())
        }
    }

    fn sample_raw() -> RawAnalysis {
        RawAnalysis {
            summary: Some("Mild redness".to_string()),
            likely_categories: Some(vec!["eczema".to_string()]),
            risk_level: Some("medium".to_string()),
            next_steps: Some(vec!["Moisturize".to_string()]),
            confidence_percentages: None,
        }
    }

    #[tokio::test]
    async fn poor_quality_short_circuits_before_inference() {
        let ops = Arc::new(StubImageOps {
            quality: Some(poor_quality()),
            ..Default::default()
        });
        let model = Arc::new(StubModel::returning(sample_raw()));
        let pipeline = AnalysisPipeline::new(ops.clone(), model.clone());

        let outcome = pipeline.run("img", None).await;

        assert_eq!(
            outcome.report.likely_categories,
            vec!["poor_image_quality"]
        );
        assert_eq!(outcome.report.risk_level, RiskLevel::Low);
        assert!(!outcome.image_quality.unwrap().is_good_quality);
        assert_eq!(model.analyze_calls.load(Ordering::SeqCst), 0);
        assert_eq!(ops.preprocess_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn quality_check_failure_never_blocks_analysis() {
        let ops = Arc::new(StubImageOps {
            fail_quality: true,
            ..Default::default()
        });
        let model = Arc::new(StubModel::returning(sample_raw()));
        let pipeline = AnalysisPipeline::new(ops, model.clone());

        let outcome = pipeline.run("img", None).await;

        assert!(outcome.image_quality.is_none());
        assert_eq!(outcome.report.summary, "Mild redness");
        assert_eq!(model.analyze_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preprocessing_failure_falls_back_to_original_image() {
        let ops = Arc::new(StubImageOps {
            fail_preprocess: true,
            ..Default::default()
        });
        let model = Arc::new(StubModel::returning(sample_raw()));
        let pipeline = AnalysisPipeline::new(ops, model.clone());

        let outcome = pipeline.run("img", None).await;

        assert_eq!(outcome.report.summary, "Mild redness");
        assert_eq!(
            model.last_image.lock().unwrap().as_deref(),
            Some("img"),
            "inference must see the original image when preprocessing fails"
        );
    }

    #[tokio::test]
    async fn roi_failure_keeps_full_frame_but_preprocessing_still_runs() {
        let ops = Arc::new(StubImageOps {
            fail_roi: true,
            ..Default::default()
        });
        let model = Arc::new(StubModel::returning(sample_raw()));
        let pipeline = AnalysisPipeline::new(ops, model.clone());

        let roi = RegionOfInterest {
            x: 0.0,
            y: 0.0,
            w: 10.0,
            h: 10.0,
        };
        pipeline.run("img", Some(&roi)).await;

        assert_eq!(
            model.last_image.lock().unwrap().as_deref(),
            Some("img:enhanced")
        );
    }

    #[tokio::test]
    async fn roi_crop_feeds_the_model_the_region() {
        let ops = Arc::new(StubImageOps::default());
        let model = Arc::new(StubModel::returning(sample_raw()));
        let pipeline = AnalysisPipeline::new(ops, model.clone());

        let roi = RegionOfInterest {
            x: 1.0,
            y: 2.0,
            w: 30.0,
            h: 40.0,
        };
        pipeline.run("img", Some(&roi)).await;

        assert_eq!(
            model.last_image.lock().unwrap().as_deref(),
            Some("img:cropped:enhanced")
        );
    }

    #[tokio::test]
    async fn inference_failure_substitutes_fallback_report() {
        let ops = Arc::new(StubImageOps::default());
        let model = Arc::new(StubModel::failing());
        let pipeline = AnalysisPipeline::new(ops, model);

        let outcome = pipeline.run("img", None).await;

        assert_eq!(outcome.report.likely_categories, vec!["analysis_error"]);
        assert_eq!(outcome.report.risk_level, RiskLevel::Low);
        assert!(outcome.image_quality.unwrap().is_good_quality);
    }
}

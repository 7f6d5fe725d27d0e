use serde::{Deserialize, Serialize};

/// Caller-specified rectangular sub-region of the source image, in pixel
/// coordinates of the uploaded frame. Absent means "analyze the whole image".
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Quality metrics produced by the image-processing service. Serialized
/// camelCase at the HTTP boundary; the Python service emits snake_case, which
/// the aliases accept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub brightness: f64,
    pub contrast: f64,
    pub sharpness: f64,
    #[serde(alias = "is_good_quality")]
    pub is_good_quality: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Wire spelling, also used when rendering the level into prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// The untrusted payload parsed out of the model's free-form text. Every
/// field is optional and loosely typed; only [`crate::normalize::normalize`]
/// turns this into an [`AnalysisReport`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAnalysis {
    pub summary: Option<String>,
    pub likely_categories: Option<Vec<String>>,
    pub risk_level: Option<String>,
    pub next_steps: Option<Vec<String>>,
    pub confidence_percentages: Option<Vec<f64>>,
}

/// Validated analysis result returned to the caller.
///
/// Invariants: `likely_categories` and `next_steps` are non-empty; when
/// `confidence_percentages` is present it is aligned 1:1 with
/// `likely_categories` and sums to exactly 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub summary: String,
    pub likely_categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_percentages: Option<Vec<u32>>,
    pub risk_level: RiskLevel,
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of conversation history supplied by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(rename = "imageBase64")]
    pub image_base64: String,
    pub roi: Option<RegionOfInterest>,
}

/// Analysis response body: the report plus the quality metrics when the
/// quality check succeeded.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub report: AnalysisReport,
    #[serde(rename = "imageQuality", skip_serializing_if = "Option::is_none")]
    pub image_quality: Option<QualityReport>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub analysis_context: Option<AnalysisReport>,
    #[serde(default)]
    pub additional_images: Option<Vec<String>>,
    #[serde(default)]
    pub conversation_history: Option<Vec<ChatTurn>>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
}

/// Operations exposed by the image-processing service's `/process` endpoint.
/// `roi` is not listed here: region extraction is internal to the pipeline
/// and not part of the maintenance surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageOperation {
    Edges,
    Preprocess,
    Quality,
    Contrast,
    Skin,
}

impl ImageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageOperation::Edges => "edges",
            ImageOperation::Preprocess => "preprocess",
            ImageOperation::Quality => "quality",
            ImageOperation::Contrast => "contrast",
            ImageOperation::Skin => "skin",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessImageRequest {
    #[serde(rename = "imageBase64")]
    pub image_base64: String,
    pub operation: ImageOperation,
    pub roi: Option<RegionOfInterest>,
}

/// Verbatim payload from the image-processing service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub mod chat;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod preprocessing;
pub mod service;

pub use config::AppConfig;
pub use error::{InferenceError, PreprocessError};
pub use models::{AnalysisReport, QualityReport, RawAnalysis, RegionOfInterest, RiskLevel};
pub use normalize::normalize;
pub use pipeline::{AnalysisOutcome, AnalysisPipeline};
pub use service::{AppState, build_router};

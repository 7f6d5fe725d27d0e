/// Process-wide configuration, read from the environment exactly once at
/// startup and handed to the clients by reference. Nothing re-reads the
/// environment after this.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Credential for the vision model. `None` puts the whole service into
    /// degraded mode: analysis and chat return fixed placeholder content and
    /// no model call is ever attempted.
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    /// Base URL of the OpenCV image-processing service.
    pub python_service_url: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let gemini_model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string());
        let python_service_url = std::env::var("PYTHON_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:8788".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8787);

        Self {
            gemini_api_key,
            gemini_model,
            python_service_url,
            port,
        }
    }

    pub fn degraded_mode(&self) -> bool {
        self.gemini_api_key.is_none()
    }
}

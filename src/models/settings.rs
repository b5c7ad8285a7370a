use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_endpoint: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_endpoint: "http://localhost:11434".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

impl Settings {
    /// Bounds match the settings form: temperature 0.0-2.0, max tokens
    /// 100-4000. An endpoint that does not parse as a URL falls back
    /// to the default.
    pub fn clamped(mut self) -> Self {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.max_tokens = self.max_tokens.clamp(100, 4000);
        if url::Url::parse(self.api_endpoint.trim()).is_err() {
            self.api_endpoint = Settings::default().api_endpoint;
        }
        self
    }
}

use crate::session::Settings;
use serde::{Deserialize, Serialize};

/// Body for `POST /generate` on the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub duration: u8,
    pub bpm: u16,
    pub density: f32,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, settings: Settings) -> Self {
        Self {
            prompt: prompt.into(),
            duration: settings.duration_seconds(),
            bpm: settings.tempo_bpm(),
            density: settings.density(),
        }
    }
}

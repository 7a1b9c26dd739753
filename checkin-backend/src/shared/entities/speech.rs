use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub language_code: String,
    pub name: String,
    pub ssml_gender: String,
}

impl VoiceConfig {
    pub fn new(language_code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            language_code: language_code.into(),
            name: name.into(),
            ssml_gender: "FEMALE".to_string(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self::new("en-US", "en-US-Standard-C")
    }
}

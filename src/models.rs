use serde::{Deserialize, Serialize};

// chatgpt / chatgpt-stream request body
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ChatQueryPayload {
    pub context: String,
    pub query: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

// select-relevant-section request body
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SectionQueryPayload {
    pub context: String,
    pub query: String,
    #[serde(default)]
    pub model: Option<String>,
}

// text-to-speech request body
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SpeechPayload {
    pub text: String,
}

// Response body for every unary action
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct TextOutput {
    pub output: String,
}

use clap::{Parser, Subcommand};
use std::time::Duration;

use crate::backend::OpenAiConfig;
use crate::dispatch::DEFAULT_CHAT_MODEL;
use crate::prompt::{DEFAULT_MAX_CONTEXT_CHARS, DEFAULT_MAX_QUERY_CHARS, PromptLimits};

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "query-gateway")]
#[command(about = "Rate-limited gateway for context-grounded LLM queries")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub gateway: GatewayArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Long-lived HTTP server
    Serve(ServeArgs),
    /// Handle a single request read from stdin and exit
    Invoke(InvokeArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    // Port to run the server on
    #[arg(short, long, env = "GATEWAY_PORT", default_value_t = 8080)]
    pub port: u16,

    // Behave like a host that cannot hold streaming responses open
    #[arg(long)]
    pub no_streaming: bool,

    // How often idle callers are dropped from the rate limiter, in seconds
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval: u64,

    // Use the first X-Forwarded-For hop as caller identity
    #[arg(long)]
    pub trust_forwarded_for: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InvokeArgs {
    // Action name, e.g. "chatgpt" or "speech-to-text"
    pub action: String,

    // Caller identity used for rate limiting
    #[arg(long, default_value = "local")]
    pub caller: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GatewayArgs {
    // Base URL of an OpenAI-compatible API
    #[arg(long, global = true, env = "OPENAI_API_URL", default_value = "https://api.openai.com/v1")]
    pub backend_url: String,

    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    // Model used when a request doesn't name one
    #[arg(long, global = true, env = "OPENAI_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    #[arg(long, global = true, default_value = "whisper-1")]
    pub transcription_model: String,

    #[arg(long, global = true, default_value = "tts-1")]
    pub speech_model: String,

    #[arg(long, global = true, default_value = "alloy")]
    pub voice: String,

    // Timeout for unary backend calls in seconds
    #[arg(long, global = true, default_value_t = 120)]
    pub request_timeout: u64,

    // Rate limit max requests per window
    #[arg(long, global = true, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, global = true, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub rate_window: u64,

    #[arg(long, global = true, default_value_t = DEFAULT_MAX_CONTEXT_CHARS)]
    pub max_context_chars: usize,

    #[arg(long, global = true, default_value_t = DEFAULT_MAX_QUERY_CHARS)]
    pub max_query_chars: usize,
}

impl GatewayArgs {
    pub fn backend_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            base_url: self.backend_url.clone(),
            api_key: self.api_key.clone(),
            transcription_model: self.transcription_model.clone(),
            speech_model: self.speech_model.clone(),
            voice: self.voice.clone(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(self.request_timeout),
        }
    }

    pub fn prompt_limits(&self) -> PromptLimits {
        PromptLimits {
            max_context_chars: self.max_context_chars,
            max_query_chars: self.max_query_chars,
        }
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }
}

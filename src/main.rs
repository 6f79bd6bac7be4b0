use clap::Parser; // for cli
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use query_gateway::backend::OpenAiBackend;
use query_gateway::config::{Args, Command};
use query_gateway::dispatch::{Dispatcher, HostCapabilities};
use query_gateway::gateway::Gateway;
use query_gateway::rate_limit::RateLimiter;
use query_gateway::state::AppState;
use query_gateway::{invoke, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stderr keeps stdout free for the invoke host's response
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "query_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let settings = &args.gateway;

    let backend = Arc::new(OpenAiBackend::new(settings.backend_config())?);
    let dispatcher = Dispatcher::new(
        backend.clone(),
        backend,
        settings.prompt_limits(),
        settings.chat_model.clone(),
    );
    let limiter = Arc::new(RateLimiter::new(settings.rate_limit as usize, settings.rate_window()));

    match args.command {
        Command::Serve(serve) => {
            let capabilities = if serve.no_streaming {
                HostCapabilities::PER_INVOCATION
            } else {
                HostCapabilities::LONG_LIVED
            };

            info!("Forwarding to backend at {}", settings.backend_url);
            info!(
                "Rate limit: {} requests per {} seconds",
                settings.rate_limit, settings.rate_window
            );
            info!("Streaming: {}", capabilities.streaming);

            let state = Arc::new(AppState {
                gateway: Arc::new(Gateway::new(limiter, dispatcher, capabilities)),
                trust_forwarded_for: serve.trust_forwarded_for,
            });
            server::serve(state, serve.port, Duration::from_secs(serve.sweep_interval)).await
        }
        Command::Invoke(request) => {
            let gateway = Gateway::new(limiter, dispatcher, HostCapabilities::PER_INVOCATION);
            let response = invoke::run(&gateway, &request.caller, &request.action).await?;
            info!(action = %request.action, status = response.status, "invocation finished");
            Ok(())
        }
    }
}

//! Fleet Chat Gateway server binary.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fleet_chat_gateway::adapters::agent::{HostedAgentClient, HostedAgentConfig, MockAgentBackend};
use fleet_chat_gateway::adapters::http::{app_router, ChatAppState};
use fleet_chat_gateway::adapters::session::{spawn_session_sweeper, InMemorySessionRegistry};
use fleet_chat_gateway::application::{AgentStreamClient, AgentStreamConfig, StreamChatHandler};
use fleet_chat_gateway::config::{
    AgentBackendKind, AgentConfig, AppConfig, ServerConfig, ValidationError,
};
use fleet_chat_gateway::ports::{AgentBackend, SessionRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    let backend = build_backend(&config.agent)?;

    let registry = Arc::new(
        InMemorySessionRegistry::new(backend.clone()).with_ttl(config.sessions.ttl()),
    );
    let shutdown = CancellationToken::new();
    let sweeper = config.sessions.ttl().map(|_| {
        spawn_session_sweeper(
            registry.clone() as Arc<dyn SessionRegistry>,
            config.sessions.sweep_interval(),
            shutdown.clone(),
        )
    });

    let agent = Arc::new(AgentStreamClient::with_config(
        backend,
        AgentStreamConfig {
            poll_interval: config.agent.poll_interval(),
            max_run_duration: config.agent.max_run_duration(),
            channel_capacity: config.streaming.channel_capacity,
        },
    ));
    let handler = Arc::new(StreamChatHandler::new(registry, agent));

    let state = ChatAppState::new(handler)
        .with_channel_capacity(config.streaming.channel_capacity)
        .with_keep_alive(config.streaming.keep_alive());
    let app = app_router(state, &config.server.cors_origins_list())?;

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %addr,
        environment = ?config.server.environment,
        backend = ?config.agent.backend,
        "Fleet chat gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    shutdown.cancel();
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }
    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if server.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_backend(agent: &AgentConfig) -> Result<Arc<dyn AgentBackend>, Box<dyn std::error::Error>> {
    match agent.backend {
        AgentBackendKind::Mock => {
            tracing::warn!("Using the canned mock agent backend");
            Ok(Arc::new(MockAgentBackend::new().with_fragments([
                "Thanks for your question. ",
                "This gateway is running with the local mock agent, ",
                "so no vehicle data was consulted.",
            ])))
        }
        AgentBackendKind::Hosted => {
            let (Some(base_url), Some(api_key), Some(assistant_id)) =
                (&agent.base_url, &agent.api_key, &agent.assistant_id)
            else {
                return Err(ValidationError::MissingRequired(
                    "FLEET_CHAT__AGENT__BASE_URL, FLEET_CHAT__AGENT__API_KEY, \
                     FLEET_CHAT__AGENT__ASSISTANT_ID",
                )
                .into());
            };

            let mut hosted =
                HostedAgentConfig::new(base_url.as_str(), api_key.as_str(), assistant_id.as_str())
                    .with_timeout(agent.timeout())
                    .with_max_retries(agent.max_retries);
            if let Some(version) = &agent.api_version {
                hosted = hosted.with_api_version(version.as_str());
            }

            Ok(Arc::new(HostedAgentClient::new(hosted)?))
        }
    }
}

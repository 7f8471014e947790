//! Trivia Royale Back binary entrypoint wiring the session actor, WebSocket and health routes.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trivia_royale_back::{
    config::GameConfig,
    routes,
    services::{
        advice::{AdviceService, UnavailableAdvisor},
        bots::load_bot_names,
        broadcast::Broadcaster,
        coordinator::SessionCoordinator,
        questions::QuestionBank,
    },
    state::{AppState, SharedState, hub::RoomHub},
};

const API_KEY_ENV: &str = "GOOGLE_API_KEY";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(GameConfig::load());
    let questions = QuestionBank::from_csv_path(&config.questions_path).with_context(|| {
        format!(
            "loading question bank from {}",
            config.questions_path.display()
        )
    })?;
    info!(questions = questions.len(), "question bank loaded");
    let bot_names = load_bot_names(&config.bot_names_path);

    let hub = Arc::new(RoomHub::new());
    let broadcaster: Arc<dyn Broadcaster> = hub.clone();
    let session = SessionCoordinator::spawn(
        Arc::clone(&config),
        broadcaster,
        Arc::new(questions),
        build_advice_service(&config),
        bot_names,
    );

    let app_state = AppState::new(config, hub, session);
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(5001);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the advice backend: Gemini when a key is configured, a fixed reply otherwise.
fn build_advice_service(config: &GameConfig) -> Arc<dyn AdviceService> {
    let Some(api_key) = env::var(API_KEY_ENV).ok().filter(|key| !key.trim().is_empty()) else {
        warn!("{API_KEY_ENV} not set; advice power-up will reply with a fallback");
        return Arc::new(UnavailableAdvisor);
    };

    gemini_advisor(config, api_key)
}

#[cfg(feature = "gemini-advice")]
fn gemini_advisor(config: &GameConfig, api_key: String) -> Arc<dyn AdviceService> {
    use trivia_royale_back::services::advice::GeminiAdvisor;

    match GeminiAdvisor::new(&config.advice_model, api_key) {
        Ok(advisor) => {
            info!(model = %config.advice_model, "advice service configured");
            Arc::new(advisor)
        }
        Err(err) => {
            warn!(error = %err, "failed to build advice client; using fallback");
            Arc::new(UnavailableAdvisor)
        }
    }
}

#[cfg(not(feature = "gemini-advice"))]
fn gemini_advisor(_config: &GameConfig, _api_key: String) -> Arc<dyn AdviceService> {
    warn!("built without the gemini-advice feature; advice power-up disabled");
    Arc::new(UnavailableAdvisor)
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

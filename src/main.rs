use crossing_eta::estimation::selector::ModelSelector;
use crossing_eta::{api, config, estimation, state};
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tracing::Level;

fn init_tracing(level: Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level()?);
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "crossing-eta starting"
    );

    let layout = config.track_layout()?;
    let train = config.train_profile()?;
    let selector = load_selector(&config)?;
    tracing::info!(
        sensors = layout.sensors().len(),
        default_train_length = train.default_length,
        known_train_length = ?train.known_length,
        tier = %selector.tier(),
        "Prediction pipeline configured"
    );

    report_warning_time(&config)?;

    let mut app_state = state::AppState::new(layout, train.default_length);
    app_state.set_known_train_length(train.known_length);
    app_state.set_window(config.event_window(&selector)?);
    app_state.set_crossing_config(config.crossing_config()?);
    app_state.set_selector(selector);
    let state = Arc::new(RwLock::new(app_state));

    let app = api::router(Arc::clone(&state));
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn report_warning_time(config: &config::Config) -> Result<(), config::ConfigError> {
    match config.warning_check()? {
        Some(check) if check.meets_requirement() => tracing::info!(
            available_secs = check.available_secs,
            required_secs = check.required_secs,
            "Furthest sensor gives enough warning"
        ),
        Some(check) => tracing::warn!(
            available_secs = check.available_secs,
            required_secs = check.required_secs,
            shortfall_secs = check.shortfall_secs(),
            "Furthest sensor is too close for the fastest train"
        ),
        None => tracing::debug!("No max_train_speed configured, skipping warning check"),
    }
    Ok(())
}

/// Load the configured artifact, falling back to physics when allowed.
fn load_selector(config: &config::Config) -> Result<ModelSelector, estimation::ModelError> {
    let fallback = config.fallback_to_physics();
    let Some(path) = config.model_path() else {
        tracing::info!("No model path configured, using physics model");
        return Ok(ModelSelector::physics());
    };

    match estimation::load_model_from_path(path) {
        Ok(selector) => {
            tracing::info!(path = %path.display(), "Estimation model loaded");
            Ok(selector.with_physics_fallback(fallback))
        }
        Err(e) if fallback => {
            tracing::warn!(error = %e, "Failed to load model, using physics model");
            Ok(ModelSelector::physics())
        }
        Err(e) => {
            tracing::error!(error = %e, path = %path.display(), "Failed to load model");
            Err(e)
        }
    }
}

pub mod config;
pub mod index;
pub mod relay;

use std::future::Future;

use anyhow::Context;
use axum::{extract::FromRef, routing::get, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use relay::{Relay, RelayError};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub relay: Relay,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            relay: Relay::new(),
            config,
        }
    }
}

pub fn app(state: AppState) -> Router {
    let cors = state.config.cors_layer();

    Router::new()
        .route("/", get(index::index))
        .merge(relay::router())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("server stopped unexpectedly")
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> Result<String, RelayError>;
    fn get_obj_field(&self, field: &str) -> Result<&Value, RelayError>;
    fn get_array_field(&self, field: &str) -> Result<&Vec<Value>, RelayError>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> Result<String, RelayError> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> Result<&Value, RelayError> {
        self.get(field)
        .ok_or(format!("expected {field} in {self}").into())
    }

    fn get_array_field(&self, field: &str) -> Result<&Vec<Value>, RelayError> {
        Ok(
            self.get_obj_field(field)?
            .as_array()
            .ok_or(format!("expected {field} in {self} to be array"))?
        )
    }
}

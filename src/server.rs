//! HTTP API over the inventory service.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::ServerSettings;
use crate::service::{InventoryService, ServiceError};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InventoryService>,
    pub pretty_json: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/local-images", get(local_images))
        .route("/harbor-images", get(harbor_images))
        .route("/images", get(all_images))
        .with_state(state)
}

/// Binds `host:port` and serves until the process exits.
pub async fn serve(service: Arc<InventoryService>, settings: &ServerSettings) -> std::io::Result<()> {
    let app = router(AppState {
        service,
        pretty_json: settings.pretty_json,
    });

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Inventory API listening");

    axum::serve(listener, app).await
}

async fn local_images(State(state): State<AppState>) -> Response {
    match state.service.local_images().await {
        Ok(images) => json_response(StatusCode::OK, &images, state.pretty_json),
        Err(e) => error_response(&e, "Failed to list local images", state.pretty_json),
    }
}

async fn harbor_images(State(state): State<AppState>) -> Response {
    match state.service.registry_inventory().await {
        Ok(inventory) => {
            for failure in &inventory.failures {
                warn!(
                    unit = %failure.unit,
                    url = %failure.url,
                    error = %failure.error,
                    "Registry unit skipped"
                );
            }
            json_response(StatusCode::OK, &inventory.images, state.pretty_json)
        }
        Err(e) => error_response(&e, "Failed to list registry images", state.pretty_json),
    }
}

async fn all_images(State(state): State<AppState>) -> Response {
    let unified = state.service.unified().await;
    json_response(StatusCode::OK, &unified, state.pretty_json)
}

fn error_response(err: &ServiceError, summary: &str, pretty: bool) -> Response {
    let status = match err {
        ServiceError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Source(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!(error = %err, "{}", summary);
    json_response(
        status,
        &json!({ "error": summary, "details": err.to_string() }),
        pretty,
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: &T, pretty: bool) -> Response {
    let encoded = if pretty {
        serde_json::to_string_pretty(body)
    } else {
        serde_json::to_string(body)
    };

    match encoded {
        Ok(text) => (status, [(header::CONTENT_TYPE, "application/json")], text).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

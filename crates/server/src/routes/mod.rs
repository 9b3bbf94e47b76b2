use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, Method},
    middleware,
    routing::{IntoMakeService, get},
};
use deployment::Deployment;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    DeploymentImpl,
    middleware::{REQUEST_ID_HEADER, request_id_middleware},
};

pub mod converter;
pub mod health;
pub mod schematic;

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}

/// The full application router, mounted under `/api` and at the root paths
/// older clients call
pub fn app(deployment: DeploymentImpl) -> Router {
    let max_upload_bytes = deployment.config().max_upload_bytes;

    let base_routes = Router::new()
        .route("/health", get(health::health_check))
        .merge(converter::router(&deployment))
        .merge(schematic::router(&deployment))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(deployment);

    Router::new()
        .nest("/api", base_routes.clone())
        .merge(base_routes)
        .layer(cors())
        .layer(middleware::from_fn(request_id_middleware))
}

pub fn router(deployment: DeploymentImpl) -> IntoMakeService<Router> {
    app(deployment).into_make_service()
}

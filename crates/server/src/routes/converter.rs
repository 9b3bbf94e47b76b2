use axum::{
    Json, Router,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use deployment::Deployment;
use services::services::{
    adapters::{CoordinateRepresentation, ExportOptions},
    conversion::Payload,
    validation::{ValidationError, validate_geometry_request},
};

use crate::{DeploymentImpl, error::ApiError};

/// Query parameters of a geometry conversion. `railway_option_types` may be
/// repeated, with or without the `[]` suffix.
#[derive(Debug, Default)]
struct GeometryParams {
    polygon: Option<String>,
    mode: Option<String>,
    option_types: Vec<String>,
    author: Option<String>,
    organisation: Option<String>,
    coordinate_representation: Option<String>,
    filename: Option<String>,
}

impl GeometryParams {
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "polygon" => params.polygon = Some(value),
                "mode" => params.mode = Some(value),
                "railway_option_types[]" | "railway_option_types" => {
                    params.option_types.push(value)
                }
                "author" => params.author = Some(value),
                "organisation" => params.organisation = Some(value),
                "coordinate_representation" => params.coordinate_representation = Some(value),
                "filename" => params.filename = Some(value),
                _ => {}
            }
        }
        params
    }

    fn export_options(&self, defaults: ExportOptions) -> Result<ExportOptions, ValidationError> {
        let mut export = defaults;
        if let Some(author) = &self.author {
            export.author = author.clone();
        }
        if let Some(organisation) = &self.organisation {
            export.organisation = organisation.clone();
        }
        if let Some(raw) = &self.coordinate_representation {
            export.coordinate_representation = CoordinateRepresentation::parse(raw)
                .ok_or_else(|| ValidationError::UnknownCoordinateRepresentation(raw.clone()))?;
        }
        export.filename = self.filename.clone();
        Ok(export)
    }
}

pub async fn run_orm_converter(
    State(deployment): State<DeploymentImpl>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let params = GeometryParams::from_pairs(pairs);
    let request = validate_geometry_request(
        params.polygon.as_deref(),
        params.mode.as_deref(),
        &params.option_types,
    )?;
    let conversion = deployment.conversion();
    let export = params.export_options(conversion.export_defaults())?;

    tracing::info!(
        mode = ?request.mode,
        option_types = ?request.option_types,
        "Starting geometry conversion"
    );

    match conversion.convert_geometry(&request, export).await? {
        Payload::PlanInline(document) => {
            Ok(([(header::CONTENT_TYPE, "application/xml")], document).into_response())
        }
        Payload::Routes(routes) => Ok(Json(routes).into_response()),
        other => Err(ApiError::InternalError(format!(
            "Unexpected payload for geometry conversion: {}",
            payload_kind(&other)
        ))),
    }
}

fn payload_kind(payload: &Payload) -> &'static str {
    match payload {
        Payload::PlanInline(_) => "inline plan",
        Payload::PlanFile(_) => "plan file",
        Payload::Routes(_) => "routes",
        Payload::Schematic(_) => "schematic",
    }
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/run-orm-converter", get(run_orm_converter))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;
    use crate::routes::testing::{body_bytes, body_json, test_app};

    const SQUARE: &str = "%5B(0%2C0)%2C(0%2C1)%2C(1%2C1)%2C(1%2C0)%5D";

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_params_collect_repeated_option_types() {
        let params = GeometryParams::from_pairs(vec![
            ("polygon".into(), "[(0,0)]".into()),
            ("railway_option_types[]".into(), "rail".into()),
            ("railway_option_types".into(), "tram".into()),
        ]);
        assert_eq!(params.option_types, vec!["rail", "tram"]);
        assert_eq!(params.polygon.as_deref(), Some("[(0,0)]"));
    }

    #[test]
    fn test_unknown_coordinate_representation() {
        let params = GeometryParams {
            coordinate_representation: Some("mercator".into()),
            ..Default::default()
        };
        assert_eq!(
            params.export_options(ExportOptions::default()),
            Err(ValidationError::UnknownCoordinateRepresentation(
                "mercator".into()
            ))
        );
    }

    #[tokio::test]
    async fn test_empty_option_types_is_bad_request() {
        let app = test_app();
        let uri = format!("/api/run-orm-converter?polygon={SQUARE}&mode=routes");
        let response = app.router.oneshot(get_request(&uri)).await.unwrap();

        assert_eq!(response.status(), 400);
        let body = body_json(response).await;
        assert_eq!(body["message"], "No option types specified");
        assert_eq!(app.geometry.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_polygon_reported_first() {
        let app = test_app();
        let response = app
            .router
            .oneshot(get_request("/run-orm-converter"))
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body = body_json(response).await;
        assert_eq!(body["message"], "No location specified");
    }

    #[tokio::test]
    async fn test_empty_polygon_is_a_missing_location() {
        let app = test_app();
        let response = app
            .router
            .oneshot(get_request("/api/run-orm-converter?polygon=%5B%5D"))
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body = body_json(response).await;
        assert_eq!(body["message"], "No location specified");
        assert_eq!(app.geometry.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_routes_mode_returns_json_array() {
        let app = test_app();
        let uri = format!(
            "/api/run-orm-converter?polygon={SQUARE}&mode=routes&railway_option_types%5B%5D=rail"
        );
        let response = app.router.oneshot(get_request(&uri)).await.unwrap();

        assert_eq!(response.status(), 200);
        let body = body_json(response).await;
        let routes = body.as_array().unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(app.geometry.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_planpro_mode_returns_xml() {
        let app = test_app();
        let uri = format!(
            "/run-orm-converter?polygon={SQUARE}&mode=planpro&railway_option_types%5B%5D=rail&author=A"
        );
        let response = app.router.oneshot(get_request(&uri)).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/xml"
        );
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(body.contains("PlanPro_Schnittstelle"));
        assert!(body.contains("<Wert>A</Wert>"));
    }
}

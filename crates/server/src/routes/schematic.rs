use axum::{
    Extension, Form, Json, Router,
    extract::{Multipart, Query, State, rejection::FormRejection},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use services::services::validation::{ExportFormat, ValidationError, validate_plan_upload};
use topology::SchematicGraph;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, middleware::RequestId};

#[derive(Debug, Serialize)]
pub struct SchematicResponse {
    pub import_id: Uuid,
    pub filename: String,
    pub graph: SchematicGraph,
}

/// Multipart fields of a schematic upload
#[derive(Debug, Default)]
struct UploadForm {
    filename: Option<String>,
    bytes: Vec<u8>,
    pp_version: Option<String>,
    signal_types: Option<String>,
    scale: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    form.filename = field.file_name().map(str::to_string);
                    form.bytes = field.bytes().await?.to_vec();
                }
                "pp_version" => form.pp_version = Some(field.text().await?),
                "signal_types" => form.signal_types = Some(field.text().await?),
                "scale" => form.scale = Some(field.text().await?),
                _ => {}
            }
        }
        Ok(form)
    }

    fn scale(&self) -> Result<f64, ApiError> {
        match self.scale.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(1.0),
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|s| s.is_finite() && *s > 0.0)
                .ok_or_else(|| ApiError::BadRequest(format!("Invalid scale: {raw}"))),
        }
    }
}

pub async fn run_schematic_converter(
    State(deployment): State<DeploymentImpl>,
    Extension(request_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<SchematicResponse>>, ApiError> {
    let form = UploadForm::read(multipart).await?;
    let upload = validate_plan_upload(
        form.filename.as_deref(),
        form.pp_version.as_deref(),
        form.signal_types.as_deref(),
    )?;
    let scale = form.scale()?;

    tracing::info!(
        request_id = %request_id.as_str(),
        filename = %upload.filename,
        version = upload.version.as_str(),
        bytes = form.bytes.len(),
        "Converting uploaded plan"
    );

    let import = deployment
        .conversion()
        .convert_plan_file(&upload, &form.bytes, scale)
        .await?;

    Ok(Json(ApiResponse::success(SchematicResponse {
        import_id: import.import_id,
        filename: import.filename,
        graph: import.graph,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadParams {
    pub import_id: Option<String>,
    pub format: Option<String>,
}

impl DownloadParams {
    /// Form fields win over query parameters
    fn merge(self, form: Option<DownloadParams>) -> Self {
        let form = form.unwrap_or_default();
        Self {
            import_id: form.import_id.or(self.import_id),
            format: form.format.or(self.format),
        }
    }

    fn import_id(&self) -> Result<Uuid, ValidationError> {
        let raw = self
            .import_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ValidationError::NoImportId)?;
        Uuid::parse_str(raw).map_err(|_| ValidationError::InvalidImportId(raw.to_string()))
    }

    fn format(&self) -> Result<ExportFormat, ValidationError> {
        match self.format.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            Some(raw) => raw.parse(),
            None => Ok(ExportFormat::Ppxml),
        }
    }
}

pub async fn download_schematic(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<DownloadParams>,
    form: Result<Form<DownloadParams>, FormRejection>,
) -> Result<Response, ApiError> {
    let params = query.merge(form.ok().map(|Form(form)| form));
    let import_id = params.import_id()?;
    let format = params.format()?;

    let conversion = deployment.conversion();
    let file = conversion.retrieve_cached_export(import_id, format).await?;
    let bytes = tokio::fs::read(&file.path).await;
    conversion.release_file(&file).await;
    let bytes = bytes?;

    tracing::info!(%import_id, format = format.extension(), "Serving cached export");

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.download_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/run-schematic-converter", post(run_schematic_converter))
        .route(
            "/schematic-converter/download-schematic",
            post(download_schematic),
        )
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;
    use crate::routes::testing::{
        BOUNDARY, TestApp, body_bytes, body_json, multipart_body, plan_document, test_app,
    };

    fn upload_request(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/run-schematic-converter")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    async fn upload_plan(app: &TestApp) -> String {
        let document = plan_document();
        let request = upload_request(&[
            ("file", Some("plan.ppxml"), document.as_str()),
            ("pp_version", None, "1.10"),
            ("signal_types", None, "false"),
        ]);
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), 200);

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["filename"], "plan.ppxml");
        assert!(!body["data"]["graph"]["nodes"].as_array().unwrap().is_empty());
        body["data"]["import_id"].as_str().unwrap().to_string()
    }

    fn download_request(query: &str, form: Option<&str>) -> Request<Body> {
        let builder = Request::builder()
            .method("POST")
            .uri(format!("/schematic-converter/download-schematic{query}"));
        match form {
            Some(form) => builder
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[test]
    fn test_download_params() {
        let query = DownloadParams {
            import_id: Some("from-query".into()),
            format: Some("json".into()),
        };
        let form = DownloadParams {
            import_id: Some("from-form".into()),
            format: None,
        };
        let params = query.merge(Some(form));
        assert_eq!(params.import_id.as_deref(), Some("from-form"));
        assert_eq!(params.format(), Ok(ExportFormat::Json));
        assert_eq!(
            params.import_id(),
            Err(ValidationError::InvalidImportId("from-form".into()))
        );
        assert_eq!(DownloadParams::default().format(), Ok(ExportFormat::Ppxml));
    }

    #[tokio::test]
    async fn test_wrong_extension_is_rejected_without_writing() {
        let app = test_app();
        let request = upload_request(&[
            ("file", Some("plan.txt"), "not a plan"),
            ("pp_version", None, "1.10"),
        ]);
        let response = app.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), 400);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Invalid file extension, expected .ppxml");
        assert_eq!(
            app.deployment.conversion().files().file_count().unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_unsupported_version_is_rejected() {
        let app = test_app();
        let document = plan_document();
        let request = upload_request(&[
            ("file", Some("plan.ppxml"), document.as_str()),
            ("pp_version", None, "2.0"),
        ]);
        let response = app.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), 400);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Unsupported PlanPro version: 2.0");
    }

    #[tokio::test]
    async fn test_upload_then_download_plan() {
        let app = test_app();
        let import_id = upload_plan(&app).await;

        let form = format!("import_id={import_id}");
        let response = app
            .router
            .clone()
            .oneshot(download_request("", Some(&form)))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/xml"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"schematic.ppxml\""
        );
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(body.contains("PlanPro_Schnittstelle"));
        assert!(body.contains("S2"));

        // only the cached upload remains once the export has been served
        assert_eq!(
            app.deployment.conversion().files().file_count().unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_download_json_by_query() {
        let app = test_app();
        let import_id = upload_plan(&app).await;

        let query = format!("?import_id={import_id}&format=json");
        let response = app
            .router
            .clone()
            .oneshot(download_request(&query, None))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = body_json(response).await;
        assert!(body["nodes"].is_array());
        assert!(body["edges"].is_array());
    }

    #[tokio::test]
    async fn test_download_unknown_import_is_not_found() {
        let app = test_app();
        let query = format!("?import_id={}", Uuid::new_v4());
        let response = app
            .router
            .oneshot(download_request(&query, None))
            .await
            .unwrap();

        assert_eq!(response.status(), 404);
        let body = body_json(response).await;
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("No prior import"));
    }

    #[tokio::test]
    async fn test_download_without_import_id() {
        let app = test_app();
        let response = app
            .router
            .oneshot(download_request("", None))
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body = body_json(response).await;
        assert_eq!(body["message"], "No import id specified");
    }
}

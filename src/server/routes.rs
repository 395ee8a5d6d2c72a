//! Form submission API and health routes.

use super::wire::ParsedRequest;
use super::{HttpResponse, ServerConfig};
use crate::models::{FormType, SubmissionFilter, SubmissionInput};
use crate::storage;
use chrono::Utc;
use serde_json::json;

pub const SERVICE_NAME: &str = "assetshim";
const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

pub fn is_api_path(path: &str) -> bool {
    path == "/health" || path == "/api" || path.starts_with("/api/")
}

fn with_cors(response: HttpResponse, config: &ServerConfig) -> HttpResponse {
    response
        .with_header("Access-Control-Allow-Origin", &config.frontend_origin)
        .with_header("Vary", "Origin")
}

fn failure(status: u16, error: &str) -> HttpResponse {
    HttpResponse::json(status, &json!({ "success": false, "error": error }))
}

fn unavailable() -> HttpResponse {
    failure(503, "Submission storage is not configured")
}

pub(crate) async fn handle(config: &ServerConfig, request: &ParsedRequest) -> HttpResponse {
    let response = match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => HttpResponse::new(204)
            .with_header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
            .with_header("Access-Control-Allow-Headers", "Content-Type, Authorization")
            .with_header("Access-Control-Max-Age", "600"),
        ("GET" | "HEAD", "/health") => HttpResponse::json(
            200,
            &json!({ "ok": true, "service": SERVICE_NAME, "time": Utc::now().to_rfc3339() }),
        ),
        ("GET" | "HEAD", "/api") => HttpResponse::json(
            200,
            &json!({
                "success": true,
                "message": "Asset Shim API v1",
                "status": "active",
            }),
        ),
        ("POST", "/api/submit-form") => submit_form(&request.body).await,
        ("GET" | "HEAD", "/api/get-submissions") => get_submissions(request).await,
        _ => failure(404, "Endpoint not found"),
    };
    with_cors(response, config)
}

async fn submit_form(body: &[u8]) -> HttpResponse {
    if !storage::is_initialized() {
        return unavailable();
    }
    let input: SubmissionInput = match serde_json::from_slice(body) {
        Ok(input) => input,
        Err(err) => {
            tracing::debug!("Rejecting submission body: {}", err);
            return failure(400, "Request body must be a JSON object");
        }
    };
    let submission = match input.validate() {
        Ok(submission) => submission,
        Err(err) => return failure(400, &err.to_string()),
    };

    let id = submission.id.clone();
    let created_at = submission.created_at;
    let form_type = submission.form_type;
    if let Err(err) = storage::persist_submission(submission).await {
        tracing::error!("Failed to persist submission: {}", err);
        return failure(500, "Server Error: Could not save submission");
    }
    tracing::info!(id = %id, form_type = form_type.as_str(), "Form submission stored");

    HttpResponse::json(
        201,
        &json!({
            "success": true,
            "message": "Form submitted successfully",
            "submissionId": id,
            "data": { "id": id, "createdAt": created_at },
        }),
    )
}

fn parse_bounded(raw: Option<&str>, default: u32, max: u32) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .map(|v| v.clamp(1, max))
        .unwrap_or(default)
}

async fn get_submissions(request: &ParsedRequest) -> HttpResponse {
    if !storage::is_initialized() {
        return unavailable();
    }
    let form_type = match request
        .query_param("type")
        .or_else(|| request.query_param("formType"))
    {
        Some(raw) => match FormType::parse(raw) {
            Some(form_type) => Some(form_type),
            None => return failure(400, &format!("Unknown form type: {}", raw)),
        },
        None => None,
    };
    let limit = parse_bounded(request.query_param("limit"), DEFAULT_LIMIT, MAX_LIMIT);
    let page = parse_bounded(request.query_param("page"), 1, u32::MAX);

    let filter = SubmissionFilter { form_type };
    match storage::query_submissions(&filter, page - 1, limit).await {
        Ok(result) => HttpResponse::json(
            200,
            &json!({
                "success": true,
                "count": result.items.len(),
                "total": result.total,
                "page": page,
                "submissions": result.items,
            }),
        ),
        Err(err) => {
            tracing::error!("Failed to query submissions: {}", err);
            failure(500, "Failed to retrieve data")
        }
    }
}

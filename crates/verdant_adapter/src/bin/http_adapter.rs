#![forbid(unsafe_code)]

use std::{
    env,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Path, Query, RawForm, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use verdant_adapter::{
    parse_pagination, push_raw_field, raw_submission_from_json, AdapterRuntime,
    ApiSubmissionResponse, BrochureAccess,
};
use verdant_contracts::brochure::{BrochureKind, BrochureOptions};
use verdant_contracts::submission::RawSubmission;
use verdant_os::submission::SubmissionOutcome;

type SharedRuntime = Arc<Mutex<AdapterRuntime>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let bind = env::var("VERDANT_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8000".to_string());
    let addr: SocketAddr = bind.parse()?;
    let runtime: SharedRuntime = Arc::new(Mutex::new(AdapterRuntime::from_env()));

    let app = Router::new()
        .route("/contact/submit/", post(contact_submit))
        .route("/newsletter/signup/", post(newsletter_signup))
        .route("/onboarding/submit/", post(onboarding_submit))
        .route("/api/contact/", post(api_contact))
        .route("/api/newsletter/", post(api_newsletter))
        .route("/api/garden/interest/", post(api_garden_interest))
        .route("/api/status/", get(api_status))
        .route("/api/navigation/", get(api_navigation))
        .route("/api/footer-links/", get(api_footer_links))
        .route("/api/media-items/", get(api_media_items))
        .route("/pdf/executive-summary/", get(pdf_executive_summary))
        .route("/pdf/strategy-performance/", get(pdf_strategy_performance))
        .route(
            "/pdf/strategy-performance/:slug/",
            get(pdf_strategy_performance_slug),
        )
        .route("/pdf/ddq-package/", get(pdf_ddq_package))
        .route("/pdf/custom-prospect/", get(pdf_custom_prospect))
        .with_state(runtime);

    tracing::info!(%addr, "verdant_adapter_http listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_htmx(headers: &HeaderMap) -> bool {
    headers
        .get("hx-request")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn referer_or_root(headers: &HeaderMap) -> String {
    headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "/".to_string())
}

fn parse_form(body: &[u8]) -> RawSubmission {
    let mut raw = RawSubmission::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        push_raw_field(&mut raw, &key, value.into_owned());
    }
    raw
}

fn with_runtime<T>(
    runtime: &SharedRuntime,
    f: impl FnOnce(&mut AdapterRuntime) -> T,
) -> Result<T, Response> {
    match runtime.lock() {
        Ok(mut rt) => Ok(f(&mut rt)),
        Err(_) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "adapter runtime lock poisoned",
        )
            .into_response()),
    }
}

async fn contact_submit(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    RawForm(body): RawForm,
) -> Response {
    let raw = parse_form(&body);
    // Success and failure both land back on the contact page; the page
    // itself reads the outcome out of band.
    if let Err(resp) = with_runtime(&runtime, |rt| {
        let ctx = rt.request_context(&client_ip(&headers), session_id(&headers));
        rt.submit_contact(&raw, &ctx)
    }) {
        return resp;
    }
    Redirect::to("/contact/").into_response()
}

async fn newsletter_signup(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    RawForm(body): RawForm,
) -> Response {
    let raw = parse_form(&body);
    let outcome = match with_runtime(&runtime, |rt| {
        let ctx = rt.request_context(&client_ip(&headers), session_id(&headers));
        rt.submit_newsletter(&raw, &ctx)
    }) {
        Ok(outcome) => outcome,
        Err(resp) => return resp,
    };
    if is_htmx(&headers) {
        let fragment = match outcome {
            SubmissionOutcome::Accepted { .. } => {
                "<p class=\"newsletter-ok\">You are subscribed. Thank you.</p>"
            }
            SubmissionOutcome::Invalid(_) => {
                "<p class=\"newsletter-error\">Please check your email address and try again.</p>"
            }
            SubmissionOutcome::Failed { .. } => {
                "<p class=\"newsletter-error\">Something went wrong. Please try again later.</p>"
            }
        };
        return Html(fragment).into_response();
    }
    Redirect::to(&referer_or_root(&headers)).into_response()
}

async fn onboarding_submit(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    RawForm(body): RawForm,
) -> Response {
    let raw = parse_form(&body);
    let outcome = match with_runtime(&runtime, |rt| {
        let ctx = rt.request_context(&client_ip(&headers), session_id(&headers));
        rt.submit_onboarding(&raw, &ctx)
    }) {
        Ok(outcome) => outcome,
        Err(resp) => return resp,
    };
    let accepted = matches!(outcome, SubmissionOutcome::Accepted { .. });
    if is_htmx(&headers) {
        let fragment = if accepted {
            "<p class=\"onboarding-ok\">Thank you for your application.</p>"
        } else {
            "<p class=\"onboarding-error\">Please correct the highlighted fields.</p>"
        };
        return Html(fragment).into_response();
    }
    if accepted {
        Redirect::to("/onboarding/thank-you/").into_response()
    } else {
        Redirect::to("/onboarding/").into_response()
    }
}

fn api_response(outcome: SubmissionOutcome) -> Response {
    match outcome {
        SubmissionOutcome::Accepted { ticket_id, message } => (
            StatusCode::CREATED,
            Json(ApiSubmissionResponse {
                success: true,
                ticket_id: Some(ticket_id.0),
                message: Some(message),
                errors: None,
            }),
        )
            .into_response(),
        SubmissionOutcome::Invalid(errors) => (
            StatusCode::BAD_REQUEST,
            Json(ApiSubmissionResponse {
                success: false,
                ticket_id: None,
                message: None,
                errors: Some(errors.into_map()),
            }),
        )
            .into_response(),
        SubmissionOutcome::Failed { correlation_id } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiSubmissionResponse {
                success: false,
                ticket_id: None,
                message: Some(format!(
                    "Something went wrong. Reference: {}",
                    correlation_id.as_str()
                )),
                errors: None,
            }),
        )
            .into_response(),
    }
}

async fn api_contact(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let raw = raw_submission_from_json(&body);
    match with_runtime(&runtime, |rt| {
        // API clients never saw the math challenge; it is defaulted
        // server-side by submitting without one.
        let ctx = rt.request_context(&client_ip(&headers), session_id(&headers));
        rt.submit_contact(&raw, &ctx)
    }) {
        Ok(outcome) => api_response(outcome),
        Err(resp) => resp,
    }
}

async fn api_newsletter(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let raw = raw_submission_from_json(&body);
    match with_runtime(&runtime, |rt| {
        let ctx = rt.request_context(&client_ip(&headers), session_id(&headers));
        rt.submit_newsletter(&raw, &ctx)
    }) {
        Ok(outcome) => api_response(outcome),
        Err(resp) => resp,
    }
}

async fn api_garden_interest(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let raw = raw_submission_from_json(&body);
    match with_runtime(&runtime, |rt| {
        let ctx = rt.request_context(&client_ip(&headers), session_id(&headers));
        rt.submit_garden_interest(&raw, &ctx)
    }) {
        Ok(outcome) => api_response(outcome),
        Err(resp) => resp,
    }
}

async fn api_status(State(runtime): State<SharedRuntime>) -> Response {
    match with_runtime(&runtime, |rt| rt.status()) {
        Ok(status) => Json(status).into_response(),
        Err(resp) => resp,
    }
}

async fn api_navigation(State(runtime): State<SharedRuntime>) -> Response {
    match with_runtime(&runtime, |rt| rt.navigation()) {
        Ok(nav) => Json(serde_json::json!({ "items": nav.primary })).into_response(),
        Err(resp) => resp,
    }
}

async fn api_footer_links(State(runtime): State<SharedRuntime>) -> Response {
    match with_runtime(&runtime, |rt| rt.navigation()) {
        Ok(nav) => Json(serde_json::json!({ "items": nav.footer })).into_response(),
        Err(resp) => resp,
    }
}

#[derive(Debug, Deserialize)]
struct PageParams {
    page: Option<String>,
    per_page: Option<String>,
}

async fn api_media_items(
    State(runtime): State<SharedRuntime>,
    Query(params): Query<PageParams>,
) -> Response {
    let (page, per_page) = parse_pagination(params.page.as_deref(), params.per_page.as_deref());
    match with_runtime(&runtime, |rt| rt.media_items(page, per_page)) {
        Ok(items) => Json(items).into_response(),
        Err(resp) => resp,
    }
}

fn staff(headers: &HeaderMap, runtime: &AdapterRuntime) -> bool {
    let token = headers.get("x-staff-token").and_then(|v| v.to_str().ok());
    runtime.is_staff(token)
}

fn pdf_response(result: Result<(Vec<u8>, String), BrochureAccess>) -> Response {
    match result {
        Ok((bytes, filename)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{filename}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(BrochureAccess::Forbidden) => {
            (StatusCode::FORBIDDEN, "staff access required").into_response()
        }
        Err(BrochureAccess::Render(e)) => {
            tracing::error!(error = ?e, "brochure render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "brochure generation failed").into_response()
        }
    }
}

async fn pdf_executive_summary(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
) -> Response {
    match with_runtime(&runtime, |rt| {
        let staff = staff(&headers, rt);
        rt.generate_brochure(
            BrochureKind::ExecutiveSummary,
            BrochureOptions::default(),
            staff,
        )
    }) {
        Ok(result) => pdf_response(result),
        Err(resp) => resp,
    }
}

async fn pdf_strategy_performance(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
) -> Response {
    match with_runtime(&runtime, |rt| {
        let staff = staff(&headers, rt);
        rt.generate_brochure(
            BrochureKind::StrategyPerformance,
            BrochureOptions::default(),
            staff,
        )
    }) {
        Ok(result) => pdf_response(result),
        Err(resp) => resp,
    }
}

async fn pdf_strategy_performance_slug(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Response {
    match with_runtime(&runtime, |rt| {
        let staff = staff(&headers, rt);
        rt.generate_brochure(
            BrochureKind::StrategyPerformance,
            BrochureOptions {
                strategy_slug: Some(slug),
                ..BrochureOptions::default()
            },
            staff,
        )
    }) {
        Ok(result) => pdf_response(result),
        Err(resp) => resp,
    }
}

async fn pdf_ddq_package(State(runtime): State<SharedRuntime>, headers: HeaderMap) -> Response {
    match with_runtime(&runtime, |rt| {
        let staff = staff(&headers, rt);
        rt.generate_brochure(BrochureKind::DdqPackage, BrochureOptions::default(), staff)
    }) {
        Ok(result) => pdf_response(result),
        Err(resp) => resp,
    }
}

#[derive(Debug, Deserialize)]
struct ProspectParams {
    prospect: Option<String>,
}

async fn pdf_custom_prospect(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Query(params): Query<ProspectParams>,
) -> Response {
    match with_runtime(&runtime, |rt| {
        let staff = staff(&headers, rt);
        rt.generate_brochure(
            BrochureKind::CustomProspect,
            BrochureOptions {
                prospect_name: params.prospect.clone(),
                ..BrochureOptions::default()
            },
            staff,
        )
    }) {
        Ok(result) => pdf_response(result),
        Err(resp) => resp,
    }
}

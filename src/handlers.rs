//! HTTP route handlers for the site node.
//!
//! Public pages and the inline-edit API, team sign-in, and the admin panel
//! with its project upload, settings and resync actions.
//!
//! Edit mode and pending edits belong to one browser, named by the
//! `orca_client` cookie; handlers that touch them mint the cookie on first use.

use crate::auth::{SESSION_COOKIE, SESSION_TTL_HOURS};
use crate::local_store::ClientId;
use crate::models::{AssetClass, Notice, NoticeKind, SiteSettings};
use crate::reconcile::{EditOutcome, SAVED_LOCALLY_NOTICE};
use crate::remote::Identity;
use crate::templates::{render_admin, render_denied, render_login, render_site, AdminPage, SitePage};
use crate::upload::{ProjectSubmission, SelectedFile};
use crate::{AdminAccess, AppState, SiteError};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Helpers
// ============================================================================

async fn settings_snapshot(state: &AppState) -> SiteSettings {
    state.view.read().await.settings.clone()
}

/// The browser's client id, plus the cookie to set when it had none.
fn client_id(jar: &CookieJar) -> (ClientId, Option<String>) {
    match ClientId::from_jar(jar) {
        Some(client) => (client, None),
        None => {
            let client = ClientId::generate();
            let cookie = client.cookie();
            (client, Some(cookie))
        }
    }
}

fn with_client_cookie(cookie: Option<String>, response: Response) -> Response {
    match cookie {
        Some(cookie) => with_cookie(cookie, response),
        None => response,
    }
}

fn pending_count(state: &AppState, client: &ClientId) -> usize {
    state
        .outbox(client)
        .entries()
        .map(|e| e.len())
        .unwrap_or_else(|e| {
            warn!(error = %e, "could not read pending edits");
            0
        })
}

fn with_cookie(cookie: String, response: Response) -> Response {
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            let mut headers = HeaderMap::new();
            headers.insert(SET_COOKIE, value);
            (headers, response).into_response()
        }
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to build session cookie").into_response(),
    }
}

/// The signed-in team member, or the page to show instead.
async fn require_admin(state: &AppState, jar: &CookieJar) -> Result<Identity, Response> {
    let access = state.admin_access(jar).await.map_err(IntoResponse::into_response)?;
    let settings = settings_snapshot(state).await;
    match access {
        AdminAccess::Granted(identity) => Ok(identity),
        AdminAccess::Denied(identity) => {
            Err((StatusCode::FORBIDDEN, Html(render_denied(&settings, &identity))).into_response())
        }
        AdminAccess::Anonymous => Err((
            StatusCode::UNAUTHORIZED,
            Html(render_login(&settings, None, state.auth_enabled())),
        )
            .into_response()),
    }
}

/// The admin panel as `client` sees it. Without a flash notice, the
/// browser's pending-edit notice is shown.
async fn render_panel(state: &AppState, client: &ClientId, identity: &Identity, flash: Option<Notice>) -> Response {
    let view = match state.view_for(client).await {
        Ok(view) => view,
        Err(e) => return e.into_response(),
    };
    let notice = flash.or(view.notice);
    let settings = view.settings;
    let pending = match state.outbox(client).entries() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    Html(render_admin(&AdminPage {
        settings: &settings,
        identity,
        pending: &pending,
        notice: notice.as_ref(),
        policy: state.pipeline.policy(),
    }))
    .into_response()
}

// ============================================================================
// Public Site
// ============================================================================

#[derive(Deserialize, Default)]
pub struct IndexQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub tag: String,
}

pub async fn index(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<IndexQuery>,
) -> Response {
    state.refresh().await;
    let (client, new_cookie) = client_id(&jar);

    let edit_mode = state.edit_mode(&client).unwrap_or_else(|e| {
        warn!(error = %e, "could not read edit mode");
        false
    });
    let signed_in = matches!(state.current_identity(&jar).await, Ok(Some(_)));
    let pending = pending_count(&state, &client);

    let view = match state.view_for(&client).await {
        Ok(view) => view,
        Err(e) => return e.into_response(),
    };
    let page = Html(render_site(&SitePage {
        view: &view,
        query: &query.q,
        tag: &query.tag,
        edit_mode,
        signed_in,
        auth_enabled: state.auth_enabled(),
        pending,
        large_model_bytes: state.config.large_model_bytes,
    }));
    with_client_cookie(new_cookie, page.into_response())
}

pub async fn content_api(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    state.refresh().await;
    let (client, new_cookie) = client_id(&jar);
    let pending = match state.outbox(&client).entries() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let edit_mode = state.edit_mode(&client).unwrap_or(false);
    let view = match state.view_for(&client).await {
        Ok(view) => view,
        Err(e) => return e.into_response(),
    };
    let body = Json(json!({
        "settings": view.settings,
        "projects": view.projects,
        "projectSource": view.project_source,
        "notice": view.notice,
        "editMode": edit_mode,
        "pending": pending,
    }));
    with_client_cookie(new_cookie, body.into_response())
}

// ============================================================================
// Inline Editing API
// ============================================================================

#[derive(Deserialize)]
pub struct EditFieldBody {
    pub value: String,
}

pub async fn edit_field(
    Path(field): Path<String>,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<EditFieldBody>,
) -> Response {
    // a browser without a client cookie has never turned edit mode on
    let Some(client) = ClientId::from_jar(&jar) else {
        return (StatusCode::CONFLICT, "Edit mode is off").into_response();
    };
    match state.edit_mode(&client) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::CONFLICT, "Edit mode is off").into_response(),
        Err(e) => return e.into_response(),
    }

    let identity = state.current_identity(&jar).await.unwrap_or_else(|e| {
        warn!(error = %e, "could not read session");
        None
    });
    let auth = identity.as_ref().map(|i| &i.credentials);

    match state
        .reconciler
        .edit_field(&state.view, &client, &field, &body.value, auth)
        .await
    {
        Ok(EditOutcome::Synced) => Json(json!({ "status": "synced" })).into_response(),
        Ok(EditOutcome::SavedLocally { reason }) => Json(json!({
            "status": "savedLocally",
            "reason": reason,
            "notice": SAVED_LOCALLY_NOTICE,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct EditModeBody {
    pub enabled: bool,
}

pub async fn set_edit_mode(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<EditModeBody>,
) -> Response {
    let (client, new_cookie) = client_id(&jar);
    match state.local.set_edit_mode(&client, body.enabled) {
        Ok(()) => {
            info!(enabled = body.enabled, "edit mode changed");
            with_client_cookie(new_cookie, Json(json!({ "editMode": body.enabled })).into_response())
        }
        Err(e) => e.into_response(),
    }
}

pub async fn discard_pending_field(
    Path(field): Path<String>,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Response {
    let Some(client) = ClientId::from_jar(&jar) else {
        return Json(json!({ "discarded": false })).into_response();
    };
    match state.reconciler.discard_pending(&client, &field) {
        Ok(discarded) => Json(json!({ "discarded": discarded })).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn discard_all_pending(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let Some(client) = ClientId::from_jar(&jar) else {
        return Json(json!({ "discarded": 0 })).into_response();
    };
    match state.reconciler.discard_all_pending(&client) {
        Ok(count) => Json(json!({ "discarded": count })).into_response(),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Authentication Handlers
// ============================================================================

pub async fn admin_page(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    state.refresh().await;
    let identity = match require_admin(&state, &jar).await {
        Ok(identity) => identity,
        Err(page) => return page,
    };
    let (client, new_cookie) = client_id(&jar);
    with_client_cookie(new_cookie, render_panel(&state, &client, &identity, None).await)
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

pub async fn login_submit(State(state): State<Arc<AppState>>, axum::Form(form): axum::Form<LoginForm>) -> Response {
    let settings = settings_snapshot(&state).await;
    let Some(sessions) = &state.sessions else {
        return Html(render_login(&settings, None, false)).into_response();
    };

    {
        let limit = state.login_rate_limit.lock().unwrap_or_else(|e| e.into_inner());
        if limit.is_locked() {
            let page = render_login(&settings, Some("Too many failed attempts. Try again shortly."), true);
            return (StatusCode::TOO_MANY_REQUESTS, Html(page)).into_response();
        }
    }

    let identity = match state.identity.sign_in(form.email.trim(), &form.password).await {
        Ok(identity) => identity,
        Err(e) => {
            let message = if e.is_transient() {
                "Could not reach the sign-in service. Try again."
            } else {
                state
                    .login_rate_limit
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .record_failure();
                "Invalid email or password."
            };
            warn!(error = %e, "sign-in failed");
            return (StatusCode::UNAUTHORIZED, Html(render_login(&settings, Some(message), true))).into_response();
        }
    };
    state
        .login_rate_limit
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .reset();

    let token = match sessions.create(&identity) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "failed to create session");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session").into_response();
        }
    };

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age={}",
        SESSION_COOKIE,
        token,
        SESSION_TTL_HOURS * 3600
    );
    with_cookie(cookie, Redirect::to("/admin").into_response())
}

pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let (Some(sessions), Some(cookie)) = (&state.sessions, jar.get(SESSION_COOKIE)) {
        if let Err(e) = sessions.revoke(cookie.value()) {
            warn!(error = %e, "failed to revoke session");
        }
    }
    let cookie = format!("{}=; Path=/; HttpOnly; Secure; Max-Age=0", SESSION_COOKIE);
    with_cookie(cookie, Redirect::to("/").into_response())
}

// ============================================================================
// Admin Actions
// ============================================================================

/// Multipart text fields and files, keyed by form field name. File inputs
/// left empty by the browser are skipped.
struct FormParts {
    text: BTreeMap<String, Vec<String>>,
    files: BTreeMap<String, SelectedFile>,
}

impl FormParts {
    fn text(&self, name: &str) -> String {
        self.text
            .get(name)
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or_default()
    }
}

async fn read_form(mut multipart: Multipart) -> Result<FormParts, Response> {
    let mut parts = FormParts {
        text: BTreeMap::new(),
        files: BTreeMap::new(),
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err((StatusCode::BAD_REQUEST, format!("Failed to read form: {}", e)).into_response()),
        };
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        match field.bytes().await {
            Ok(bytes) => match file_name {
                Some(file_name) if !file_name.is_empty() => {
                    parts.files.insert(
                        name,
                        SelectedFile {
                            file_name,
                            content_type,
                            data: bytes.to_vec(),
                        },
                    );
                }
                Some(_) => {}
                None => parts
                    .text
                    .entry(name)
                    .or_default()
                    .push(String::from_utf8_lossy(&bytes).into_owned()),
            },
            Err(e) => {
                return Err((StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e)).into_response())
            }
        }
    }
    Ok(parts)
}

fn project_submission(mut parts: FormParts) -> ProjectSubmission {
    let mut submission = ProjectSubmission {
        title: parts.text("title"),
        description: parts.text("description"),
        summary: parts.text("summary"),
        youtube: parts.text("youtube"),
        model_details: parts.text("modelDetails"),
        project_details: parts.text("projectDetails"),
        impact: parts.text("impact"),
        tags: parts.text.remove("tags").unwrap_or_default(),
        ..ProjectSubmission::default()
    };
    for class in AssetClass::PROJECT {
        if let Some(file) = parts.files.remove(class.form_field()) {
            submission.files.insert(class, file);
        }
    }
    submission
}

pub async fn create_project(State(state): State<Arc<AppState>>, jar: CookieJar, multipart: Multipart) -> Response {
    let identity = match require_admin(&state, &jar).await {
        Ok(identity) => identity,
        Err(page) => return page,
    };
    let parts = match read_form(multipart).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };
    let submission = project_submission(parts);
    let title = submission.title.trim().to_string();

    let progress = state.begin_upload();
    let notice = match state
        .pipeline
        .submit(submission, Some(progress), Some(&identity.credentials))
        .await
    {
        Ok(report) => {
            state.refresh().await;
            match report.warning_message() {
                Some(warning) => Notice::flash(NoticeKind::Warning, warning),
                None => Notice::flash(NoticeKind::Success, format!("Project \"{}\" added successfully!", title)),
            }
        }
        Err(e) => {
            warn!(error = %e, "project submission failed");
            Notice::flash(NoticeKind::Error, e.to_string())
        }
    };

    let (client, new_cookie) = client_id(&jar);
    with_client_cookie(new_cookie, render_panel(&state, &client, &identity, Some(notice)).await)
}

pub async fn save_settings(State(state): State<Arc<AppState>>, jar: CookieJar, multipart: Multipart) -> Response {
    let identity = match require_admin(&state, &jar).await {
        Ok(identity) => identity,
        Err(page) => return page,
    };
    let mut parts = match read_form(multipart).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };
    let (client, new_cookie) = client_id(&jar);

    let mut fields = BTreeMap::new();
    fields.insert("tagline".to_string(), parts.text("tagline"));
    fields.insert("about".to_string(), parts.text("about"));

    let result: Result<(), SiteError> = async {
        if let Some(logo) = parts.files.remove(AssetClass::Image.form_field()) {
            let url = state.pipeline.upload_logo(logo, Some(&identity.credentials)).await?;
            fields.insert("logo".to_string(), url);
        }
        state
            .reconciler
            .save_settings(&state.view, &client, &fields, Some(&identity.credentials))
            .await
    }
    .await;

    let notice = match result {
        Ok(()) => Notice::flash(NoticeKind::Success, "Settings saved!"),
        Err(e) => {
            warn!(error = %e, "settings form failed");
            Notice::flash(NoticeKind::Error, format!("Upload failed: {}", e))
        }
    };
    with_client_cookie(new_cookie, render_panel(&state, &client, &identity, Some(notice)).await)
}

pub async fn resync(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let identity = match require_admin(&state, &jar).await {
        Ok(identity) => identity,
        Err(page) => return page,
    };
    let (client, new_cookie) = client_id(&jar);

    let notice = match state
        .reconciler
        .resync_pending(&state.view, &client, Some(&identity.credentials))
        .await
    {
        Ok(report) => {
            state.refresh().await;
            let kind = if report.failed.is_empty() {
                NoticeKind::Success
            } else {
                NoticeKind::Warning
            };
            Notice::flash(kind, report.summary())
        }
        Err(e) => Notice::flash(NoticeKind::Error, e.to_string()),
    };
    with_client_cookie(new_cookie, render_panel(&state, &client, &identity, Some(notice)).await)
}

pub async fn upload_progress(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    match state.current_identity(&jar).await {
        Ok(Some(_)) => Json(state.upload_progress()).into_response(),
        Ok(None) => (StatusCode::UNAUTHORIZED, "Not signed in").into_response(),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Fallbacks
// ============================================================================

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html("<h1>Not found</h1><p><a href=\"/\">Back to the site</a></p>")).into_response()
}

/// Body for requests whose handler panicked.
pub fn panic_response(_err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    error!("request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html("<h1>Something went wrong</h1><p>Please reload the page.</p>"),
    )
        .into_response()
}

#[cfg(test)]
#[path = "handlers_test.rs"]
mod handlers_test;

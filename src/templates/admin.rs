//! Admin surface: sign-in, access denied, and the team panel with the
//! project upload form, settings form and pending-edit list.

use crate::models::{AssetClass, Notice, SiteSettings, PROJECT_TAGS};
use crate::outbox::PendingEdit;
use crate::remote::Identity;
use crate::upload::{AssetPolicy, UploadPolicy};

use super::components::{base_html, html_escape, nav_bar};

// ============================================================================
// Sign-in
// ============================================================================

pub fn render_login(settings: &SiteSettings, error: Option<&str>, auth_enabled: bool) -> String {
    let body = if !auth_enabled {
        r#"<div class="notice error"><span class="text">Team sign-in is not configured on this site.</span></div>"#
            .to_string()
    } else {
        let error_html = error
            .map(|e| format!(r#"<div class="notice error"><span class="text">{}</span></div>"#, html_escape(e)))
            .unwrap_or_default();
        format!(
            r#"<div class="login-form panel">
                <h2>Team sign-in</h2>
                {error}
                <form method="POST" action="/admin/login">
                    <div class="form-row">
                        <label for="email">Email</label>
                        <input type="email" id="email" name="email" autocomplete="username" autofocus required>
                    </div>
                    <div class="form-row">
                        <label for="password">Password</label>
                        <input type="password" id="password" name="password" autocomplete="current-password" required>
                    </div>
                    <button class="btn" type="submit">Sign in</button>
                </form>
            </div>"#,
            error = error_html,
        )
    };
    base_html("Sign in", &nav_bar(settings, false, auth_enabled), None, &body)
}

pub fn render_denied(settings: &SiteSettings, identity: &Identity) -> String {
    let body = format!(
        r#"<div class="login-form panel">
            <h2>Access denied</h2>
            <p>{email} is signed in but is not a team member.</p>
            <p><a href="/admin/logout">Sign out</a> and use a team account.</p>
        </div>"#,
        email = html_escape(&identity.email),
    );
    base_html("Access denied", &nav_bar(settings, true, true), None, &body)
}

// ============================================================================
// Admin Panel
// ============================================================================

pub struct AdminPage<'a> {
    pub settings: &'a SiteSettings,
    pub identity: &'a Identity,
    pub pending: &'a [PendingEdit],
    pub notice: Option<&'a Notice>,
    pub policy: &'a UploadPolicy,
}

fn accept_attr(class: AssetClass) -> String {
    class.allowed_extensions().join(",")
}

fn file_input(class: AssetClass, policy: &UploadPolicy) -> String {
    let note = match policy.policy_for(class) {
        AssetPolicy::Required => "upload failure cancels the submission",
        AssetPolicy::Optional => "optional, skipped if it fails",
    };
    format!(
        r#"<div class="form-row">
            <label for="{field}">{label} file ({exts})</label>
            <input type="file" id="{field}" name="{field}" accept="{accept}">
            <div class="form-hint">Max {max} MB; {note}.</div>
        </div>"#,
        field = class.form_field(),
        label = class.label(),
        exts = class.allowed_extensions().join(", "),
        accept = accept_attr(class),
        max = policy.max_bytes / (1024 * 1024),
        note = note,
    )
}

fn project_form(policy: &UploadPolicy) -> String {
    let tags: String = PROJECT_TAGS
        .iter()
        .map(|t| {
            format!(
                r#"<label><input type="checkbox" name="tags" value="{t}"> {t}</label>"#,
                t = html_escape(t)
            )
        })
        .collect();
    let files: String = AssetClass::PROJECT
        .iter()
        .map(|c| file_input(*c, policy))
        .collect();

    format!(
        r#"<section class="panel">
            <h2>Add project</h2>
            <form id="project-form" method="POST" action="/admin/projects" enctype="multipart/form-data">
                <div class="form-grid">
                    <div class="form-row">
                        <label for="title">Title *</label>
                        <input type="text" id="title" name="title" required>
                    </div>
                    <div class="form-row">
                        <label for="youtube">YouTube link</label>
                        <input type="url" id="youtube" name="youtube">
                    </div>
                </div>
                <div class="form-row">
                    <label for="description">Description *</label>
                    <textarea id="description" name="description" required></textarea>
                </div>
                <div class="form-row">
                    <label for="summary">Summary</label>
                    <textarea id="summary" name="summary"></textarea>
                </div>
                <div class="form-grid">
                    <div class="form-row">
                        <label for="modelDetails">Model details</label>
                        <textarea id="modelDetails" name="modelDetails"></textarea>
                    </div>
                    <div class="form-row">
                        <label for="projectDetails">Project details</label>
                        <textarea id="projectDetails" name="projectDetails"></textarea>
                    </div>
                </div>
                <div class="form-row">
                    <label for="impact">Impact</label>
                    <textarea id="impact" name="impact"></textarea>
                </div>
                <div class="form-row">
                    <label>Tags</label>
                    <div class="checkbox-row">{tags}</div>
                </div>
                {files}
                <button class="btn" id="project-submit" type="submit">Add project</button>
                <div class="progress" id="model-progress"><div class="bar"></div></div>
                <div class="form-hint" id="model-progress-label"></div>
            </form>
        </section>"#,
        tags = tags,
        files = files,
    )
}

fn settings_form(settings: &SiteSettings) -> String {
    let logo = settings.get("logo");
    let preview = if logo.is_empty() {
        String::new()
    } else {
        format!(
            r#"<div class="form-hint">Current logo: <a href="{0}" target="_blank" rel="noopener">{0}</a></div>"#,
            html_escape(logo)
        )
    };
    format!(
        r#"<section class="panel">
            <h2>Site settings</h2>
            <form method="POST" action="/admin/settings" enctype="multipart/form-data">
                <div class="form-row">
                    <label for="tagline">Tagline</label>
                    <input type="text" id="tagline" name="tagline" value="{tagline}">
                </div>
                <div class="form-row">
                    <label for="about">About the team</label>
                    <textarea id="about" name="about" rows="8">{about}</textarea>
                </div>
                <div class="form-row">
                    <label for="logoFile">Logo ({exts})</label>
                    <input type="file" id="logoFile" name="logoFile" accept="{accept}">
                    {preview}
                </div>
                <button class="btn" type="submit">Save settings</button>
            </form>
        </section>"#,
        tagline = html_escape(settings.get("tagline")),
        about = html_escape(settings.get("about")),
        exts = AssetClass::Image.allowed_extensions().join(", "),
        accept = accept_attr(AssetClass::Image),
        preview = preview,
    )
}

fn pending_list(pending: &[PendingEdit]) -> String {
    if pending.is_empty() {
        return r#"<section class="panel"><h2>Local edits</h2><p class="form-hint">All edits are saved to the cloud.</p></section>"#
            .to_string();
    }
    let items: String = pending
        .iter()
        .map(|edit| {
            format!(
                r#"<li>
                    <span class="field">{field}</span>
                    <span class="value" title="{value}">{value}</span>
                    <span class="when">{when}</span>
                    <button class="btn secondary small" type="button" onclick="discardField('{field_js}')">Discard</button>
                </li>"#,
                field = html_escape(&edit.field),
                field_js = html_escape(&edit.field),
                value = html_escape(&edit.value),
                when = edit.recorded_at.format("%Y-%m-%d %H:%M UTC"),
            )
        })
        .collect();
    format!(
        r#"<section class="panel">
            <h2>Local edits</h2>
            <p class="form-hint">These edits were saved on this site node only. Sync pushes them to the cloud.</p>
            <ul class="pending-list">{items}</ul>
            <form method="POST" action="/admin/resync" style="margin-top: 1rem">
                <button class="btn" type="submit">Sync {count} edit(s)</button>
            </form>
        </section>"#,
        items = items,
        count = pending.len(),
    )
}

const ADMIN_SCRIPT: &str = r#"
<script>
async function discardField(field) {
    if (!confirm('Discard the local edit to ' + field + '?')) return;
    const res = await fetch('/api/pending/' + encodeURIComponent(field) + '/discard', { method: 'POST' });
    if (res.ok) {
        window.location.reload();
    } else {
        showNotice('error', await res.text(), false);
    }
}

(function () {
    const form = document.getElementById('project-form');
    if (!form) return;
    const bar = document.querySelector('#model-progress .bar');
    const wrap = document.getElementById('model-progress');
    const label = document.getElementById('model-progress-label');
    form.addEventListener('submit', () => {
        const button = document.getElementById('project-submit');
        button.disabled = true;
        button.textContent = 'Uploading...';
        if (!document.getElementById('modelFile').value) return;
        wrap.classList.add('active');
        setInterval(async () => {
            try {
                const res = await fetch('/api/admin/progress');
                if (!res.ok) return;
                const p = await res.json();
                bar.style.width = p.percent + '%';
                label.textContent = p.uploading ? 'Model upload: ' + p.percent + '%' : 'Saving project...';
            } catch (err) {
                console.error('Progress poll failed:', err);
            }
        }, 500);
    });
})();
</script>
"#;

pub fn render_admin(page: &AdminPage) -> String {
    let body = format!(
        r#"<div class="admin-header">
            <h1>Admin panel</h1>
            <span class="who">Signed in as {email} &middot; <a href="/admin/logout">Sign out</a></span>
        </div>
        {pending}
        {project}
        {settings}
        {script}"#,
        email = html_escape(&page.identity.email),
        pending = pending_list(page.pending),
        project = project_form(page.policy),
        settings = settings_form(page.settings),
        script = ADMIN_SCRIPT,
    );
    base_html("Admin", &nav_bar(page.settings, true, true), page.notice, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::Credentials;
    use chrono::Utc;

    fn identity() -> Identity {
        Identity {
            uid: "uid-1".to_string(),
            email: "lead@orca.space".to_string(),
            credentials: Credentials {
                id_token: "t".to_string(),
            },
            expires_in: 3600,
            refresh_token: String::new(),
        }
    }

    #[test]
    fn test_admin_page_lists_pending_edits() {
        let settings = SiteSettings::default();
        let identity = identity();
        let policy = UploadPolicy::default();
        let pending = vec![PendingEdit {
            field: "tagline".to_string(),
            value: "<local>".to_string(),
            recorded_at: Utc::now(),
            version: 1,
        }];
        let html = render_admin(&AdminPage {
            settings: &settings,
            identity: &identity,
            pending: &pending,
            notice: None,
            policy: &policy,
        });
        assert!(html.contains("discardField('tagline')"));
        assert!(html.contains("&lt;local&gt;"));
        assert!(html.contains("Sync 1 edit(s)"));
        assert!(html.contains(r#"name="modelFile" accept=".glb,.gltf""#));
        assert!(html.contains("upload failure cancels the submission"));
    }

    #[test]
    fn test_login_without_secret_explains() {
        let html = render_login(&SiteSettings::default(), None, false);
        assert!(html.contains("not configured"));
        assert!(!html.contains("<form"));
    }

    #[test]
    fn test_denied_names_account() {
        let html = render_denied(&SiteSettings::default(), &identity());
        assert!(html.contains("lead@orca.space is signed in but is not a team member."));
    }
}

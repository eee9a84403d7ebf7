//! Shared HTML components for the ORCA site.
//!
//! Contains the navigation bar, notice banner and base HTML template.

use crate::models::{Notice, NoticeKind, SiteSettings};

use super::styles::STYLE;

/// Milliseconds before a non-sticky notice hides itself.
const FLASH_DISMISS_MS: u32 = 5000;

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

// ============================================================================
// Navigation Bar
// ============================================================================

pub fn nav_bar(settings: &SiteSettings, signed_in: bool, auth_enabled: bool) -> String {
    let logo = settings.get("logo");
    let logo_html = if logo.is_empty() {
        String::new()
    } else {
        format!(r#"<img src="{}" alt="">"#, html_escape(logo))
    };

    let auth_link = if signed_in {
        r#"<a href="/admin">Admin</a><a href="/admin/logout">Sign out</a>"#
    } else if auth_enabled {
        r#"<a href="/admin">Team sign-in</a>"#
    } else {
        ""
    };

    format!(
        r##"<nav class="nav-bar">
            <a class="brand" href="/">{logo}<span>{title}</span></a>
            <span class="spacer"></span>
            <a href="/#projects">Projects</a>
            <a href="/#team">Team</a>
            <a href="/#about">About</a>
            {auth}
        </nav>"##,
        logo = logo_html,
        title = html_escape(settings.site_title()),
        auth = auth_link,
    )
}

// ============================================================================
// Notices
// ============================================================================

fn notice_class(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::Info => "info",
        NoticeKind::Success => "success",
        NoticeKind::Warning => "warning",
        NoticeKind::Error => "error",
    }
}

/// Sticky notices stay until the condition behind them clears; flashes hide
/// themselves after a few seconds.
pub fn notice_banner(notice: Option<&Notice>) -> String {
    let Some(notice) = notice else {
        return r#"<div id="notice-slot"></div>"#.to_string();
    };
    let dismiss = if notice.sticky {
        String::new()
    } else {
        format!(r#" data-dismiss-ms="{}""#, FLASH_DISMISS_MS)
    };
    format!(
        r#"<div id="notice-slot"><div class="notice {class}"{dismiss} role="status">
            <span class="text">{text}</span>
            <button type="button" onclick="this.parentElement.remove()" aria-label="Dismiss">&times;</button>
        </div></div>"#,
        class = notice_class(notice.kind),
        dismiss = dismiss,
        text = html_escape(&notice.text),
    )
}

// ============================================================================
// Base HTML Template
// ============================================================================

pub fn base_html(title: &str, nav: &str, notice: Option<&Notice>, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{STYLE}</style>
</head>
<body>
    {nav}
    <div class="container">
        {notice}
        {content}
    </div>
    <script>
    // Show a notice from script, replacing whatever is in the slot
    function showNotice(kind, text, sticky) {{
        const slot = document.getElementById('notice-slot');
        if (!slot) return;
        const div = document.createElement('div');
        div.className = 'notice ' + kind;
        div.setAttribute('role', 'status');
        const span = document.createElement('span');
        span.className = 'text';
        span.textContent = text;
        const close = document.createElement('button');
        close.type = 'button';
        close.innerHTML = '&times;';
        close.onclick = () => div.remove();
        div.appendChild(span);
        div.appendChild(close);
        slot.replaceChildren(div);
        if (!sticky) {{
            setTimeout(() => div.remove(), {dismiss_ms});
        }}
    }}

    document.querySelectorAll('.notice[data-dismiss-ms]').forEach(el => {{
        setTimeout(() => el.remove(), parseInt(el.dataset.dismissMs, 10));
    }});
    </script>
</body>
</html>"#,
        title = html_escape(title),
        STYLE = STYLE,
        nav = nav,
        notice = notice_banner(notice),
        content = content,
        dismiss_ms = FLASH_DISMISS_MS,
    )
}

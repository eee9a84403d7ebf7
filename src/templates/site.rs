//! Public site page: hero, project catalog, team and about sections.

use crate::models::{team_members, AssetClass, Project, ViewerQuality, PROJECT_TAGS};
use crate::sync::{filter_projects, ProjectSource, ViewState};

use super::components::{base_html, html_escape, nav_bar};

pub struct SitePage<'a> {
    pub view: &'a ViewState,
    pub query: &'a str,
    pub tag: &'a str,
    pub edit_mode: bool,
    pub signed_in: bool,
    pub auth_enabled: bool,
    /// Number of settings edits waiting in the local outbox.
    pub pending: usize,
    pub large_model_bytes: u64,
}

// ============================================================================
// Editable Fields
// ============================================================================

fn editable(tag: &str, field: &str, class: &str, value: &str, edit_mode: bool, placeholder: &str) -> String {
    let shown = if value.is_empty() && edit_mode {
        placeholder
    } else {
        value
    };
    format!(
        r#"<{tag} class="{class}" data-field="{field}"{editable}>{text}</{tag}>"#,
        tag = tag,
        class = class,
        field = field,
        editable = if edit_mode { r#" contenteditable="true""# } else { "" },
        text = html_escape(shown),
    )
}

// ============================================================================
// Projects
// ============================================================================

fn tag_href(tag: &str, query: &str) -> String {
    let mut href = format!("/?tag={}", urlencoding::encode(tag));
    if !query.is_empty() {
        href.push_str(&format!("&q={}", urlencoding::encode(query)));
    }
    href.push_str("#projects");
    href
}

fn filters_html(query: &str, active: &str) -> String {
    let active = if active.is_empty() { "all" } else { active };
    let mut chips = String::new();
    for tag in std::iter::once("all").chain(PROJECT_TAGS.iter().copied()) {
        chips.push_str(&format!(
            r#"<a class="tag-chip{active}" href="{href}">{label}</a>"#,
            active = if tag == active { " active" } else { "" },
            href = html_escape(&tag_href(tag, query)),
            label = if tag == "all" { "All" } else { tag },
        ));
    }
    format!(
        r##"<form class="project-filters" method="get" action="/#projects">
            <input type="text" name="q" placeholder="Search projects..." value="{query}">
            <input type="hidden" name="tag" value="{tag}">
            <button class="btn secondary" type="submit">Search</button>
        </form>
        <div class="project-filters">{chips}</div>"##,
        query = html_escape(query),
        tag = html_escape(active),
        chips = chips,
    )
}

fn viewer_html(project: &Project, large_model_bytes: u64) -> String {
    let Some(url) = project.model_url.as_deref() else {
        return String::new();
    };
    let quality = ViewerQuality::for_model_size(project.model_size, large_model_bytes);
    format!(
        r#"<div class="model-viewer" data-model-url="{url}" data-shadows="{shadows}" data-antialias="{aa}" data-min-dpr="{dpr}" data-debounce-ms="{debounce}">3D preview</div>"#,
        url = html_escape(url),
        shadows = quality.shadows,
        aa = quality.antialias,
        dpr = quality.min_dpr,
        debounce = quality.debounce_ms,
    )
}

fn project_card(project: &Project, large_model_bytes: u64) -> String {
    let tags: String = project
        .tags
        .iter()
        .map(|t| format!(r#"<span class="tag-chip">{}</span>"#, html_escape(t)))
        .collect();

    let mut links = String::new();
    for (class, label) in [
        (AssetClass::Model, "Model"),
        (AssetClass::Dataset, "Dataset"),
        (AssetClass::Paper, "Paper"),
        (AssetClass::Document, "Document"),
    ] {
        if let Some(url) = project.asset_url(class) {
            links.push_str(&format!(
                r#"<a href="{}" target="_blank" rel="noopener">{}</a>"#,
                html_escape(url),
                label
            ));
        }
    }
    if !project.youtube.is_empty() {
        links.push_str(&format!(
            r#"<a href="{}" target="_blank" rel="noopener">Video</a>"#,
            html_escape(&project.youtube)
        ));
    }

    let metrics = if project.metrics.is_empty() {
        String::new()
    } else {
        let items: Vec<String> = project
            .metrics
            .iter()
            .map(|(k, v)| format!("{}: {}", html_escape(k), html_escape(v)))
            .collect();
        format!(r#"<div class="metrics">{}</div>"#, items.join(" · "))
    };

    let summary = if project.summary.is_empty() {
        String::new()
    } else {
        format!(r#"<p class="desc">{}</p>"#, html_escape(&project.summary))
    };

    format!(
        r#"<article class="project-card" id="project-{id}">
            {viewer}
            <h3>{title}</h3>
            <p class="desc">{desc}</p>
            {summary}
            <div class="tags">{tags}</div>
            {metrics}
            <div class="links">{links}</div>
        </article>"#,
        id = html_escape(&project.id),
        viewer = viewer_html(project, large_model_bytes),
        title = html_escape(&project.title),
        desc = html_escape(&project.description),
        summary = summary,
        tags = tags,
        metrics = metrics,
        links = links,
    )
}

fn projects_html(page: &SitePage) -> String {
    let projects = filter_projects(&page.view.projects, page.query, page.tag);
    let note = if page.view.project_source == ProjectSource::Sample {
        r#"<p class="sample-note">Showing sample projects.</p>"#
    } else {
        ""
    };
    let grid = if projects.is_empty() {
        r#"<p class="empty">No projects match your search.</p>"#.to_string()
    } else {
        let cards: String = projects
            .iter()
            .map(|p| project_card(p, page.large_model_bytes))
            .collect();
        format!(r#"<div class="project-grid">{}</div>"#, cards)
    };
    format!(
        r#"<section id="projects">
            <h2>Projects</h2>
            {filters}
            {note}
            {grid}
        </section>"#,
        filters = filters_html(page.query, page.tag),
        note = note,
        grid = grid,
    )
}

// ============================================================================
// Team
// ============================================================================

fn team_html() -> String {
    let cards: String = team_members()
        .iter()
        .map(|m| {
            let img = m
                .image
                .as_deref()
                .map(|src| format!(r#"<img src="{}" alt="">"#, html_escape(src)))
                .unwrap_or_default();
            format!(
                r#"<div class="team-card">{img}<h3>{name}</h3><div class="role">{role}</div><p class="bio">{bio}</p></div>"#,
                img = img,
                name = html_escape(&m.name),
                role = html_escape(&m.role),
                bio = html_escape(&m.bio),
            )
        })
        .collect();
    format!(r#"<section id="team"><h2>Team</h2><div class="team-grid">{}</div></section>"#, cards)
}

// ============================================================================
// Page
// ============================================================================

const EDIT_SCRIPT: &str = r#"
<script>
async function setEditMode(enabled) {
    const res = await fetch('/api/edit-mode', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify({ enabled })
    });
    if (res.ok) {
        window.location.reload();
    } else {
        showNotice('error', await res.text(), false);
    }
}

async function discardPending() {
    if (!confirm('Discard all local edits that were not saved to the cloud?')) return;
    const res = await fetch('/api/pending/discard', { method: 'POST' });
    if (res.ok) {
        window.location.reload();
    } else {
        showNotice('error', await res.text(), false);
    }
}

document.querySelectorAll('[data-field][contenteditable="true"]').forEach(el => {
    el.dataset.original = el.textContent;
    el.addEventListener('keydown', e => {
        if (e.key === 'Enter' && el.tagName !== 'P') {
            e.preventDefault();
            el.blur();
        }
    });
    el.addEventListener('blur', async () => {
        const value = el.textContent.trim();
        if (value === el.dataset.original.trim()) return;
        try {
            const res = await fetch('/api/settings/' + encodeURIComponent(el.dataset.field), {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ value })
            });
            if (!res.ok) {
                showNotice('error', await res.text(), false);
                return;
            }
            const out = await res.json();
            el.dataset.original = value;
            if (out.status === 'synced') {
                showNotice('success', 'Saved.', false);
            } else {
                showNotice('warning', out.notice, true);
            }
        } catch (err) {
            showNotice('error', 'Could not reach the site: ' + err, false);
        }
    });
});
</script>
"#;

pub fn render_site(page: &SitePage) -> String {
    let settings = &page.view.settings;
    let edit = page.edit_mode;

    let hero = format!(
        r#"<section class="hero">
            {title}
            {tagline}
            {desc}
        </section>"#,
        title = editable("h1", "siteTitle", "title", settings.site_title(), edit, "Site title"),
        tagline = editable("p", "tagline", "tagline", settings.get("tagline"), edit, "Add a tagline"),
        desc = editable("p", "heroDesc", "desc", settings.get("heroDesc"), edit, "Describe the mission"),
    );

    let about = format!(
        r#"<section id="about"><h2>About</h2>{}</section>"#,
        editable("p", "about", "about", settings.get("about"), edit, "Write about the team")
    );

    let pending = if page.pending > 0 {
        format!(
            r##"<p class="form-hint">{} local edit(s) not yet saved to the cloud. <a href="/admin">Sync</a> or <a href="#" onclick="discardPending(); return false;">discard them</a>.</p>"##,
            page.pending
        )
    } else {
        String::new()
    };

    let toggle = format!(
        r#"<button type="button" class="edit-toggle{on}" onclick="setEditMode({next})">{label}</button>"#,
        on = if edit { " on" } else { "" },
        next = !edit,
        label = if edit { "Done editing" } else { "Edit page" },
    );

    let content = format!(
        "{pending}{hero}{projects}{team}{about}<footer>&copy; {title}</footer>{toggle}{script}",
        pending = pending,
        hero = hero,
        projects = projects_html(page),
        team = team_html(),
        about = about,
        title = html_escape(settings.site_title()),
        toggle = toggle,
        script = EDIT_SCRIPT,
    );

    base_html(
        settings.site_title(),
        &nav_bar(settings, page.signed_in, page.auth_enabled),
        page.view.notice.as_ref(),
        &content,
    )
}

//! CSS styles for the ORCA site.
//!
//! Contains the main STYLE constant with all CSS for the public site and the
//! admin panel.

// ============================================================================
// CSS Styles
// ============================================================================

pub const STYLE: &str = r#"
/* Deep orbit theme */
:root {
    --space-900: #020617;
    --space-800: #0f172a;
    --space-700: #1e293b;
    --space-600: #334155;
    --space-400: #94a3b8;
    --space-200: #e2e8f0;

    --orange: #ea580c;
    --orange-light: #fb923c;
    --red: #dc2626;
    --green: #16a34a;
    --amber: #d97706;
    --sky: #0ea5e9;

    --bg: var(--space-900);
    --fg: var(--space-200);
    --muted: var(--space-400);
    --panel: var(--space-800);
    --border: var(--space-700);
    --link: var(--orange-light);
    --accent: var(--orange);
}

* { box-sizing: border-box; margin: 0; padding: 0; }

body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
    line-height: 1.6;
    color: var(--fg);
    background: var(--bg);
}

.container {
    max-width: 1100px;
    margin: 0 auto;
    padding: 1rem 1.5rem 3rem;
}

a { color: var(--link); text-decoration: none; }
a:hover { text-decoration: underline; }

h1, h2, h3 { font-weight: 700; color: #fff; margin-top: 1.5em; margin-bottom: 0.5em; }
h1 { font-size: 2.6rem; line-height: 1.15; }
h2 { font-size: 1.6rem; }
h3 { font-size: 1.15rem; }

/* Navigation */
.nav-bar {
    display: flex;
    align-items: center;
    gap: 1.25rem;
    padding: 0.8rem 1.5rem;
    background: rgba(15, 23, 42, 0.92);
    border-bottom: 1px solid var(--border);
    position: sticky;
    top: 0;
    z-index: 10;
}
.nav-bar .brand { display: flex; align-items: center; gap: 0.6rem; color: #fff; font-weight: 700; font-size: 1.1rem; }
.nav-bar .brand img { height: 32px; width: auto; border-radius: 4px; }
.nav-bar .spacer { flex: 1; }
.nav-bar a { color: var(--muted); }
.nav-bar a:hover { color: #fff; text-decoration: none; }

/* Notices */
.notice {
    margin: 1rem 0;
    padding: 0.75rem 1rem;
    border-radius: 8px;
    border: 1px solid var(--border);
    display: flex;
    gap: 1rem;
    align-items: center;
}
.notice .text { flex: 1; }
.notice.info { background: rgba(14, 165, 233, 0.12); border-color: var(--sky); }
.notice.success { background: rgba(22, 163, 74, 0.12); border-color: var(--green); }
.notice.warning { background: rgba(217, 119, 6, 0.14); border-color: var(--amber); }
.notice.error { background: rgba(220, 38, 38, 0.14); border-color: var(--red); }
.notice button { background: none; border: none; color: var(--muted); cursor: pointer; font-size: 1.2rem; }

/* Hero */
.hero { padding: 3rem 0 2rem; }
.hero .tagline { color: var(--orange-light); font-size: 1.2rem; margin-top: 0.5rem; }
.hero .desc { color: var(--muted); max-width: 720px; margin-top: 1rem; }

[data-field][contenteditable="true"] {
    outline: 1px dashed var(--orange);
    outline-offset: 4px;
    cursor: text;
}
[data-field][contenteditable="true"]:focus { outline-style: solid; }

.edit-toggle {
    position: fixed;
    bottom: 1.5rem;
    right: 1.5rem;
    padding: 0.6rem 1.1rem;
    border-radius: 999px;
    border: 1px solid var(--accent);
    background: var(--panel);
    color: #fff;
    cursor: pointer;
}
.edit-toggle.on { background: var(--accent); }

/* Projects */
.project-filters { display: flex; gap: 0.75rem; flex-wrap: wrap; margin: 1rem 0; }
.project-filters input[type="text"] { flex: 1; min-width: 220px; }
.tag-chip {
    padding: 0.3rem 0.8rem;
    border-radius: 999px;
    border: 1px solid var(--border);
    color: var(--muted);
    font-size: 0.85rem;
}
.tag-chip.active { border-color: var(--accent); color: #fff; background: rgba(234, 88, 12, 0.2); }

.project-grid {
    display: grid;
    grid-template-columns: repeat(auto-fill, minmax(300px, 1fr));
    gap: 1.25rem;
}
.project-card {
    background: var(--panel);
    border: 1px solid var(--border);
    border-radius: 12px;
    padding: 1.25rem;
    display: flex;
    flex-direction: column;
    gap: 0.6rem;
}
.project-card h3 { margin: 0; }
.project-card .desc { color: var(--muted); font-size: 0.95rem; }
.project-card .tags { display: flex; gap: 0.4rem; flex-wrap: wrap; }
.project-card .links { display: flex; gap: 1rem; flex-wrap: wrap; font-size: 0.9rem; margin-top: auto; }
.project-card .metrics { font-size: 0.8rem; color: var(--muted); }
.model-viewer {
    height: 200px;
    border-radius: 8px;
    background: radial-gradient(circle at 50% 40%, var(--space-700), var(--space-900));
    display: flex;
    align-items: center;
    justify-content: center;
    color: var(--muted);
    font-size: 0.85rem;
}
.sample-note { color: var(--muted); font-size: 0.85rem; margin-bottom: 0.75rem; }
.empty { color: var(--muted); padding: 2rem 0; }

/* Team */
.team-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(200px, 1fr)); gap: 1rem; }
.team-card { background: var(--panel); border: 1px solid var(--border); border-radius: 12px; padding: 1rem; text-align: center; }
.team-card img { width: 96px; height: 96px; border-radius: 50%; object-fit: cover; background: var(--space-700); }
.team-card .role { color: var(--orange-light); font-size: 0.9rem; }
.team-card .bio { color: var(--muted); font-size: 0.85rem; }

/* Forms */
input[type="text"], input[type="email"], input[type="password"], input[type="url"], textarea, select {
    width: 100%;
    padding: 0.6rem 0.8rem;
    background: var(--space-800);
    border: 1px solid var(--border);
    border-radius: 8px;
    color: #fff;
    font: inherit;
}
textarea { min-height: 110px; resize: vertical; }
input:focus, textarea:focus { outline: 2px solid var(--accent); border-color: transparent; }
label { display: block; font-size: 0.9rem; color: var(--muted); margin-bottom: 0.3rem; }
.form-row { margin-bottom: 1rem; }
.form-grid { display: grid; grid-template-columns: 1fr 1fr; gap: 1rem; }
.form-hint { font-size: 0.8rem; color: var(--muted); margin-top: 0.25rem; }
.checkbox-row { display: flex; gap: 1rem; flex-wrap: wrap; }
.checkbox-row label { display: flex; gap: 0.35rem; align-items: center; color: var(--fg); }

.btn {
    display: inline-block;
    padding: 0.65rem 1.3rem;
    border-radius: 8px;
    border: none;
    background: linear-gradient(90deg, var(--orange), var(--red));
    color: #fff;
    font-weight: 600;
    cursor: pointer;
}
.btn:disabled { opacity: 0.6; cursor: progress; }
.btn.secondary { background: var(--space-700); }
.btn.small { padding: 0.3rem 0.7rem; font-size: 0.85rem; }

/* Admin */
.panel {
    background: var(--panel);
    border: 1px solid var(--border);
    border-radius: 12px;
    padding: 1.5rem;
    margin-top: 1.5rem;
}
.panel h2 { margin-top: 0; }
.login-form { max-width: 420px; margin: 4rem auto; }
.admin-header { display: flex; align-items: center; justify-content: space-between; gap: 1rem; }
.admin-header .who { color: var(--muted); font-size: 0.9rem; }
.pending-list { list-style: none; }
.pending-list li {
    display: flex;
    gap: 1rem;
    align-items: center;
    padding: 0.5rem 0;
    border-bottom: 1px solid var(--border);
}
.pending-list .field { font-weight: 600; min-width: 90px; }
.pending-list .value { flex: 1; color: var(--muted); overflow: hidden; text-overflow: ellipsis; white-space: nowrap; }
.pending-list .when { font-size: 0.8rem; color: var(--muted); }

.progress { height: 10px; background: var(--space-700); border-radius: 999px; overflow: hidden; margin-top: 0.5rem; display: none; }
.progress.active { display: block; }
.progress .bar { height: 100%; width: 0; background: var(--accent); transition: width 0.3s; }

footer { margin-top: 3rem; padding: 1.5rem 0; border-top: 1px solid var(--border); color: var(--muted); font-size: 0.85rem; text-align: center; }

@media (max-width: 700px) {
    h1 { font-size: 2rem; }
    .form-grid { grid-template-columns: 1fr; }
}
"#;

//! HTML templates and styling for the ORCA site.
//!
//! ## Module Structure
//!
//! - `styles` - CSS constant for the whole site
//! - `components` - Shared HTML components (nav bar, notices, base template)
//! - `site` - Public page with inline editing
//! - `admin` - Sign-in and the team admin panel

mod admin;
mod components;
mod site;
mod styles;

pub use admin::{render_admin, render_denied, render_login, AdminPage};
pub use components::{base_html, html_escape, nav_bar, notice_banner};
pub use site::{render_site, SitePage};
pub use styles::STYLE;

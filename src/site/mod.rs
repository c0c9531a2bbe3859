//! HTTP surface: compiled pages, static assets and the analytics dashboard
//!
//! | Path            | Served from                  | Counted |
//! |-----------------|------------------------------|---------|
//! | `/`             | `<build>/index.html`         | yes     |
//! | `/<p>`          | `<build>/<p>.html`           | yes     |
//! | `/assets/*`     | assets directory             | no      |
//! | `/favicon.ico`  | favicon file                 | no      |
//! | `/analytics`    | dashboard (optional auth)    | no      |

pub mod handlers;
pub mod path;
pub mod routes;
pub mod static_files;

pub use handlers::SiteState;
pub use path::PagePath;
pub use routes::create_site_router;

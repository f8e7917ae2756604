/// API routes and handlers
pub mod accounts;
pub mod admin;
pub mod content;
pub mod middleware;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(accounts::routes())
        .merge(content::routes())
        .merge(admin::routes())
}

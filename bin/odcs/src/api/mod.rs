//! Thin HTTP/JSON surface (spec §6). Deliberately direct axum handlers
//! rather than the trait-dispatch `Resolve<Args>` pattern the teacher's
//! larger multi-resource API uses — ODCS exposes a single resource with
//! five routes, so a per-operation trait impl buys nothing here. Simplified
//! from the teacher's layered auth/routing; noted in DESIGN.md.

mod composes;

use axum::{Router, routing::get};

pub fn app() -> Router {
  Router::new()
    .route("/version", get(|| async { env!("CARGO_PKG_VERSION") }))
    .nest("/composes", composes::router())
}

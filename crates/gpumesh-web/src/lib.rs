//! HTTP ops surface for the gpumesh aggregation service.

pub mod routes;

pub use routes::{create_router, AppState};

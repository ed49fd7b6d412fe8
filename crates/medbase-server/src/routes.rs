//! Router assembly: the FHIR REST surface plus the authorization server.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{bundle, read, search, write};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let auth_router = medbase_auth::http::router(state.auth.clone());

    let fhir = Router::new()
        .route("/fhir", post(bundle::process_bundle))
        .route(
            "/fhir/{resource_type}",
            get(search::search_resources).post(write::create_resource),
        )
        .route(
            "/fhir/{resource_type}/{id}",
            get(read::read_resource)
                .put(write::update_resource)
                .delete(write::delete_resource),
        )
        .route(
            "/fhir/{resource_type}/{id}/_history/{version_id}",
            get(read::read_version),
        )
        .with_state(state);

    fhir.merge(auth_router)
}

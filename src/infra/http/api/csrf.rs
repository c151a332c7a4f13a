//! CSRF token issuance. Exempt from the guard itself; the token binds to
//! whatever identity the verification middleware will later derive for the
//! same caller.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::{IntoResponse, Response};

use crate::infra::http::envelope::ApiResponse;
use crate::infra::http::session::{SessionContext, peer_of, request_identity};

use super::state::ApiState;

pub async fn issue_token(State(state): State<ApiState>, request: Request<Body>) -> Response {
    let session = request.extensions().get::<SessionContext>();
    let identity = request_identity(session, request.headers(), peer_of(&request));
    let token = state.csrf.issue(&identity);

    ApiResponse::ok(serde_json::json!({
        "csrf_token": token,
        "expires_in_seconds": state.csrf.token_ttl().as_secs(),
    }))
    .into_response()
}

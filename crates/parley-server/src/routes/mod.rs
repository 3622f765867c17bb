pub mod agents;
pub mod reply;
pub mod session;

use crate::state::AppState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use parley::errors::AgentError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
}

/// A request rejected before any conversation work starts
#[derive(Debug)]
pub(crate) struct Rejection(pub AgentError);

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            AgentError::RequestValidation(_) => StatusCode::BAD_REQUEST,
            AgentError::AgentNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AgentError> for Rejection {
    fn from(err: AgentError) -> Self {
        Rejection(err)
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (self.status(), self.0.to_string()).into_response()
    }
}

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(reply::routes(state.clone()))
        .merge(agents::routes(state.clone()))
        .merge(session::routes(state))
}

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use wikid_core::error::PageError;
use wikid_core::page::PageStore;
use wikid_core::render::Renderer;

use crate::state::AppState;

/// A page action defined purely in terms of an already validated title.
///
/// Operations never see raw paths: they are only reachable through
/// [`Guarded`], which has checked the title against the route grammar.
/// The request is handed over by value so an operation can consume its
/// body.
pub trait PageOperation<S: PageStore, R: Renderer>: Send + Sync + 'static {
    fn call<'a>(
        &'a self,
        state: &'a AppState<S, R>,
        title: String,
        req: Request,
    ) -> impl Future<Output = Result<Response, PageError>> + Send + 'a;
}

/// Wraps an operation so every call validates the title first.
///
/// An invalid path is answered with `404` here and the wrapped operation is
/// never invoked.
pub struct Guarded<Op> {
    op: Op,
}

/// Produces the guarded request handler for `op`.
pub fn make_handler<Op>(op: Op) -> Guarded<Op> {
    Guarded { op }
}

impl<Op> Guarded<Op> {
    /// Runs the operation for the title found in `path`, the
    /// percent-decoded request path.
    pub async fn handle<S, R>(&self, state: &AppState<S, R>, path: &str, req: Request) -> Response
    where
        S: PageStore,
        R: Renderer,
        Op: PageOperation<S, R>,
    {
        let title = match state.titles.extract_title(path) {
            Ok(title) => title,
            Err(e) => {
                debug!(path = %path, error = %e, "Rejected page path");
                return e.into_response();
            }
        };
        self.op
            .call(state, title, req)
            .await
            .unwrap_or_else(IntoResponse::into_response)
    }

    #[cfg(test)]
    pub(crate) fn operation(&self) -> &Op {
        &self.op
    }
}

use std::sync::Arc;

use axum::extract::rejection::PathRejection;
use axum::extract::{DefaultBodyLimit, Path, Request, State};
use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter, on};
use tracing::debug;

use wikid_core::error::PageError;
use wikid_core::page::PageStore;
use wikid_core::render::Renderer;

use crate::handler::{Guarded, PageOperation, make_handler};
use crate::ops::{Edit, MethodNotAllowed, Save, View};
use crate::state::AppState;

/// State shared by every route.
pub type SharedState<S, R> = Arc<AppState<S, R>>;

/// Largest request body accepted, which bounds the save form.
pub const MAX_BODY_LEN: usize = 1024 * 1024;

/// The page operation a path prefix selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    View,
    Edit,
    Save,
}

impl Route {
    #[must_use]
    pub fn pattern(self) -> &'static str {
        match self {
            Self::View => "/view/{title}",
            Self::Edit => "/edit/{title}",
            Self::Save => "/save/{title}",
        }
    }

    /// Methods the route is served under. `HEAD` follows `GET`.
    fn methods(self) -> MethodFilter {
        match self {
            Self::View | Self::Edit => MethodFilter::GET,
            Self::Save => MethodFilter::POST,
        }
    }

    fn allow(self) -> &'static str {
        match self {
            Self::View | Self::Edit => "GET, HEAD",
            Self::Save => "POST",
        }
    }

    /// The request path as the title grammar sees it, rebuilt from the
    /// percent-decoded title segment.
    fn path_for(self, title: &str) -> String {
        let prefix = match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::Save => "save",
        };
        format!("/{prefix}/{title}")
    }
}

/// Builds the page router over `state`.
///
/// Paths outside the three page routes are `404`. On a page route every
/// method goes through the title guard first, so an invalid title is `404`
/// whatever the method, and a valid one under the wrong method is `405`.
pub fn router<S: PageStore, R: Renderer>(state: AppState<S, R>) -> axum::Router {
    axum::Router::new()
        .route(Route::View.pattern(), guarded(Route::View, View))
        .route(Route::Edit.pattern(), guarded(Route::Edit, Edit))
        .route(Route::Save.pattern(), guarded(Route::Save, Save))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_LEN))
        .with_state(Arc::new(state))
}

fn guarded<Op, S, R>(route: Route, op: Op) -> MethodRouter<SharedState<S, R>>
where
    Op: PageOperation<S, R>,
    S: PageStore,
    R: Renderer,
{
    let op = Arc::new(make_handler(op));
    let wrong_method = Arc::new(make_handler(MethodNotAllowed {
        allow: route.allow(),
    }));

    on(
        route.methods(),
        move |State(state): State<SharedState<S, R>>,
              title: Result<Path<String>, PathRejection>,
              req: Request| dispatch(op, route, state, title, req),
    )
    .fallback(
        move |State(state): State<SharedState<S, R>>,
              title: Result<Path<String>, PathRejection>,
              req: Request| dispatch(wrong_method, route, state, title, req),
    )
}

async fn dispatch<Op, S, R>(
    handler: Arc<Guarded<Op>>,
    route: Route,
    state: SharedState<S, R>,
    title: Result<Path<String>, PathRejection>,
    req: Request,
) -> Response
where
    Op: PageOperation<S, R>,
    S: PageStore,
    R: Renderer,
{
    // A segment that does not decode to UTF-8 is checked raw, and its `%`
    // fails the grammar.
    let path = match title {
        Ok(Path(title)) => route.path_for(&title),
        Err(_) => req.uri().path().to_string(),
    };
    handler.handle(&state, &path, req).await
}

async fn not_found(uri: Uri) -> Response {
    debug!(path = %uri.path(), "No page route");
    PageError::InvalidPath(uri.path().to_string()).into_response()
}

//! The three page operations: view, edit and save.
//!
//! Each one receives a title that has already passed the route grammar.
//! Missing pages are not errors here: `view` turns a miss into a redirect to
//! the editor, and `edit` substitutes an empty page.

use axum::extract::rejection::FormRejection;
use axum::extract::{Form, FromRequest, Query, Request};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use tracing::{info, warn};

use wikid_core::error::PageError;
use wikid_core::page::{Page, PageStore};
use wikid_core::render::Renderer;

use crate::handler::PageOperation;
use crate::state::AppState;

/// Fields posted by the edit form.
#[derive(Debug, Default, Deserialize)]
struct SaveForm {
    body: Option<String>,
}

/// `302 Found` pointing at `location`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Renders `page` with the named template.
fn render_page<S, R: Renderer>(
    state: &AppState<S, R>,
    template: &str,
    page: &Page,
) -> Result<Response, PageError> {
    let html = state
        .renderer
        .render(template, page)
        .inspect_err(|e| warn!(template, title = %page.title, error = %e, "Render failed"))?;
    Ok(Html(html).into_response())
}

/// The posted `body` value: the form body first, then the query string.
///
/// A request whose body is not a urlencoded form contributes no fields, so
/// only the query string is consulted.
async fn save_body(req: Request) -> Result<String, PageError> {
    let from_query = Query::<SaveForm>::try_from_uri(req.uri())
        .map(|Query(form)| form.body)
        .unwrap_or_default();

    match Form::<SaveForm>::from_request(req, &()).await {
        Ok(Form(form)) => Ok(form.body.or(from_query).unwrap_or_default()),
        Err(FormRejection::InvalidFormContentType(_)) => Ok(from_query.unwrap_or_default()),
        Err(e) => Err(e.into()),
    }
}

/// `GET /view/<title>`: shows a stored page or redirects to its editor.
pub struct View;

impl<S: PageStore, R: Renderer> PageOperation<S, R> for View {
    fn call<'a>(
        &'a self,
        state: &'a AppState<S, R>,
        title: String,
        _req: Request,
    ) -> impl Future<Output = Result<Response, PageError>> + Send + 'a {
        async move {
            match state.store.load(&title).await {
                Ok(page) => render_page(state, "view", &page),
                Err(e) => {
                    if !e.is_not_found() {
                        warn!(title = %title, error = %e, "Load failed, sending to editor");
                    }
                    Ok(found(&format!("/edit/{title}")))
                }
            }
        }
    }
}

/// `GET /edit/<title>`: the edit form, empty for pages never saved.
pub struct Edit;

impl<S: PageStore, R: Renderer> PageOperation<S, R> for Edit {
    fn call<'a>(
        &'a self,
        state: &'a AppState<S, R>,
        title: String,
        _req: Request,
    ) -> impl Future<Output = Result<Response, PageError>> + Send + 'a {
        async move {
            let page = match state.store.load(&title).await {
                Ok(page) => page,
                Err(e) => {
                    if !e.is_not_found() {
                        warn!(title = %title, error = %e, "Load failed, editing empty page");
                    }
                    Page::empty(title)
                }
            };
            render_page(state, "edit", &page)
        }
    }
}

/// `POST /save/<title>`: stores the posted `body` field and redirects to
/// the page view.
pub struct Save;

impl<S: PageStore, R: Renderer> PageOperation<S, R> for Save {
    fn call<'a>(
        &'a self,
        state: &'a AppState<S, R>,
        title: String,
        req: Request,
    ) -> impl Future<Output = Result<Response, PageError>> + Send + 'a {
        async move {
            let page = Page::new(title, save_body(req).await?);
            state
                .store
                .save(&page)
                .await
                .inspect_err(|e| warn!(title = %page.title, error = %e, "Save failed"))?;

            info!(title = %page.title, bytes = page.body.len(), "Page saved");
            Ok(found(&format!("/view/{}", page.title)))
        }
    }
}

/// Answers a known page route reached with the wrong method.
///
/// Guarded like the page operations, so a bad title still gets `404`.
pub struct MethodNotAllowed {
    /// Value of the `Allow` header.
    pub allow: &'static str,
}

impl<S: PageStore, R: Renderer> PageOperation<S, R> for MethodNotAllowed {
    fn call<'a>(
        &'a self,
        _state: &'a AppState<S, R>,
        _title: String,
        _req: Request,
    ) -> impl Future<Output = Result<Response, PageError>> + Send + 'a {
        async move {
            Ok((
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, self.allow)],
                "405 method not allowed\n",
            )
                .into_response())
        }
    }
}

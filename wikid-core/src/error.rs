use std::io;

use axum::extract::rejection::FormRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures raised by a [`PageStore`](crate::page::PageStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// No backing file exists for the title.
    #[error("page {title:?} not found")]
    NotFound { title: String },

    /// Any other I/O failure while reading or writing a page.
    #[error("{action} page {title:?}: {source}")]
    Io {
        action: &'static str,
        title: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Classifies a read failure, folding a missing file into
    /// [`StoreError::NotFound`].
    pub fn read(title: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound {
                title: title.to_string(),
            }
        } else {
            Self::io("read", title, source)
        }
    }

    /// A write failure is always an I/O error, even when the storage root is
    /// missing.
    pub fn write(title: &str, source: io::Error) -> Self {
        Self::io("write", title, source)
    }

    fn io(action: &'static str, title: &str, source: io::Error) -> Self {
        Self::Io {
            action,
            title: title.to_string(),
            source,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Failures raised by a [`Renderer`](crate::render::Renderer).
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    #[error("template {name:?}: {message}")]
    Parse { name: String, message: String },

    #[error("failed to load template {name:?}: {source}")]
    Load {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Errors a page request can end in.
///
/// Each variant maps to the HTTP status the dispatcher answers with.
/// `NotFound` is normally recovered inside the page operations and never
/// reaches the client as-is.
#[derive(Debug, Error)]
pub enum PageError {
    /// The request path does not match `/(view|edit|save)/<alphanumeric>`.
    #[error("invalid page path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Render(#[from] RenderError),

    /// The save form could not be decoded.
    #[error("invalid form body: {0}")]
    Form(#[from] FormRejection),
}

/// Body sent with every `404`, whatever the cause.
pub const NOT_FOUND_BODY: &str = "404 page not found\n";

impl PageError {
    /// Returns the HTTP status code for this error.
    ///
    /// - Invalid path, missing page: 404 Not Found
    /// - Undecodable form: the extractor's own status (413 or 422)
    /// - Storage and render failures: 500 Internal Server Error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPath(_) => StatusCode::NOT_FOUND,
            Self::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Form(e) => e.status(),
            Self::Store(_) | Self::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PageError {
    /// Not-found answers never reveal the offending path; every other error
    /// carries its text, newline terminated.
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = if status == StatusCode::NOT_FOUND {
            NOT_FOUND_BODY.to_string()
        } else {
            format!("{self}\n")
        };
        (status, body).into_response()
    }
}

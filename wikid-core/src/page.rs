use std::borrow::Cow;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StoreError;

/// File extension appended to a title to form its storage filename.
const PAGE_EXT: &str = "txt";

/// A single wiki page: its title and raw body bytes.
///
/// Pages are built per request, either from stored bytes or from form input,
/// and are never cached between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub title: String,
    pub body: Vec<u8>,
}

impl Page {
    pub fn new(title: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// A page that has never been saved: title only, empty body.
    pub fn empty(title: impl Into<String>) -> Self {
        Self::new(title, Vec::new())
    }

    /// The body as text, replacing invalid UTF-8 sequences.
    #[must_use]
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Maps a page title to persisted content.
///
/// Titles handed to a store have already passed the
/// [`TitleValidator`](crate::title::TitleValidator), so implementations do
/// not sanitise them again.
pub trait PageStore: Send + Sync + 'static {
    /// Reads the full body stored under `title`.
    ///
    /// Returns [`StoreError::NotFound`] when nothing is stored for `title`.
    fn load<'a>(
        &'a self,
        title: &'a str,
    ) -> impl Future<Output = Result<Page, StoreError>> + Send + 'a;

    /// Persists `page.body` under `page.title`, replacing any prior content.
    fn save<'a>(&'a self, page: &'a Page)
    -> impl Future<Output = Result<(), StoreError>> + Send + 'a;
}

/// A [`PageStore`] keeping one `<title>.txt` file per page under `root`.
///
/// There is no locking: two overlapping saves to the same title race and the
/// last write wins.
#[derive(Debug, Clone)]
pub struct FilePageStore {
    root: PathBuf,
}

impl FilePageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `title`.
    #[must_use]
    pub fn path_for(&self, title: &str) -> PathBuf {
        self.root.join(format!("{title}.{PAGE_EXT}"))
    }
}

impl PageStore for FilePageStore {
    fn load<'a>(
        &'a self,
        title: &'a str,
    ) -> impl Future<Output = Result<Page, StoreError>> + Send + 'a {
        async move {
            let path = self.path_for(title);
            let body = fs::read(&path)
                .await
                .map_err(|e| StoreError::read(title, e))?;
            debug!(title = %title, bytes = body.len(), "Loaded page");
            Ok(Page::new(title, body))
        }
    }

    fn save<'a>(
        &'a self,
        page: &'a Page,
    ) -> impl Future<Output = Result<(), StoreError>> + Send + 'a {
        async move {
            let path = self.path_for(&page.title);
            let mut options = fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            options.mode(0o600);

            let io_err = |e| StoreError::write(&page.title, e);
            let mut file = options.open(&path).await.map_err(io_err)?;
            file.write_all(&page.body).await.map_err(io_err)?;
            file.flush().await.map_err(io_err)?;
            debug!(title = %page.title, bytes = page.body.len(), "Saved page");
            Ok(())
        }
    }
}

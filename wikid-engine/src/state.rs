use tracing::info;

use wikid_core::page::{FilePageStore, PageStore};
use wikid_core::render::{Renderer, Templates};
use wikid_core::title::TitleValidator;

use crate::server::ServerConfig;

/// Everything a page operation needs, built once at startup and shared
/// read-only by every connection.
pub struct AppState<S, R> {
    pub store: S,
    pub titles: TitleValidator,
    pub renderer: R,
}

impl<S: PageStore, R: Renderer> AppState<S, R> {
    pub fn new(store: S, titles: TitleValidator, renderer: R) -> Self {
        Self {
            store,
            titles,
            renderer,
        }
    }
}

impl AppState<FilePageStore, Templates> {
    /// Builds the production state: file store rooted at `data_dir`, the
    /// default route grammar, and templates from `templates_dir` or the
    /// built-in set.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured template directory cannot be loaded.
    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let renderer = match &config.templates_dir {
            Some(dir) => {
                info!(dir = %dir.display(), "Loading templates");
                Templates::load_dir(dir).await?
            }
            None => Templates::builtin(),
        };
        Ok(Self::new(
            FilePageStore::new(&config.data_dir),
            TitleValidator::new(),
            renderer,
        ))
    }
}

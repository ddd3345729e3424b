//! Periodic refresh of the newest catalog pages.

use super::ingest_page;
use crate::error::JobResult;
use konakore_core::config::RecentConfig;
use konakore_core::{JobName, RecentState};
use konakore_metadata::{MetadataStore, load_job_state, save_job_state};
use konakore_remote::CatalogClient;
use std::sync::Arc;
use tracing::{info, warn};

pub struct RecentRefresh {
    store: Arc<dyn MetadataStore>,
    catalog: CatalogClient,
    config: RecentConfig,
}

impl RecentRefresh {
    pub fn new(store: Arc<dyn MetadataStore>, catalog: CatalogClient, config: RecentConfig) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// Refresh one page of the rotating window and move the cursor.
    ///
    /// Ingest failures are logged and the cursor still rotates; the next
    /// invocation covers the next page. Returns the page that was attempted.
    pub async fn run_once(&self) -> JobResult<u32> {
        let mut state: RecentState = load_job_state(self.store.as_ref(), JobName::RecentRefresh)
            .await?
            .unwrap_or_default();
        let page = state.current_page;

        match ingest_page(self.store.as_ref(), &self.catalog, page).await {
            Ok(ingested) => info!(page, stored = ingested.stored, "recent page refreshed"),
            Err(e) => warn!(page, error = %e, "recent refresh failed"),
        }

        state.advance(self.config.page_window);
        save_job_state(self.store.as_ref(), JobName::RecentRefresh, &state).await?;
        Ok(page)
    }
}

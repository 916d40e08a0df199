use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::Database;

use super::collect::Collector;
use super::loop_worker::{crawl_loop, Clock, CrawlSettings};

/// Owns the background crawl task and its cancellation token.
pub struct CrawlerController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for CrawlerController {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlerController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(
        &mut self,
        db: Database,
        collector: Arc<Collector>,
        settings: CrawlSettings,
        clock: Clock,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("crawler already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(crawl_loop(
            db,
            collector,
            settings,
            clock,
            cancel_token.clone(),
        ));

        info!("crawler started");
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancel the loop and wait for it to finish its current step.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("crawl loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

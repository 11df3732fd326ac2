// src/pipeline/session/sweep.rs

//! Sweeping a list of lesson links for video lessons.
//!
//! Links are split into batches that run as synthetic groups named
//! `groups-batch-{n}`, in preview mode, keeping video lessons with or
//! without images. Batches run concurrently up to the configured bound.

use futures::stream::{self, StreamExt};

use super::{RunHandle, ScrapeSession};
use crate::error::{AppError, Result};
use crate::models::{
    GroupResult, ItemFilters, LessonItem, Progress, ScrapeMode, ScrapeResult, Stage, Status,
};
use crate::services::GroupRequest;

/// Name of the synthetic group for batch `index`.
pub fn batch_group_name(index: usize) -> String {
    format!("groups-batch-{index}")
}

impl ScrapeSession {
    /// Process `links` in batches of `batch_size` and return every video
    /// lesson found, in link order.
    ///
    /// Failed batches are logged and skipped. Batch results also appear in
    /// [`results`](Self::results) under their synthetic group names.
    pub async fn sweep(&self, links: &[String], batch_size: usize) -> Result<Vec<LessonItem>> {
        if links.is_empty() {
            return Err(AppError::validation("no links to sweep"));
        }

        let batches: Vec<Vec<String>> = links
            .chunks(batch_size.max(1))
            .map(<[String]>::to_vec)
            .collect();
        let run = self.begin_run(Status::new(
            Stage::Fetching,
            format!("Sweeping {} links", links.len()),
        ))?;
        self.state().results = ScrapeResult::default();

        let result = self.run_sweep(&run, batches).await;
        self.finish(&run, result, |items| {
            format!("All batches processed: {} video lessons found", items.len())
        })
    }

    async fn run_sweep(&self, run: &RunHandle, batches: Vec<Vec<String>>) -> Result<Vec<LessonItem>> {
        let cancel = &run.cancel;
        let mut progress = Progress::new(batches.len());
        self.publish(
            run,
            Status::new(Stage::Processing, "Processing batches...").with_progress(progress.clone()),
        );

        let fetcher = self.fetcher(self.config.http.base_url.clone());
        let request = GroupRequest {
            mode: ScrapeMode::Preview,
            selection: None,
            filters: ItemFilters::video_only(),
        };

        let mut outcomes = stream::iter(batches.into_iter().enumerate())
            .map(|(index, links)| {
                let fetcher = &fetcher;
                let request = &request;
                async move {
                    let name = batch_group_name(index);
                    let outcome = fetcher.process_group(&name, &links, request, cancel).await;
                    (name, outcome)
                }
            })
            .buffered(self.config.assembler.sweep_concurrency.max(1));

        let mut found = Vec::new();
        while let Some((name, outcome)) = outcomes.next().await {
            match outcome {
                Ok(outcome) => {
                    found.extend(outcome.items.iter().cloned());
                    self.update_state(run, |state| {
                        state.results.upsert(GroupResult {
                            name,
                            items: outcome.items,
                        })
                    });
                }
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => log::warn!("Batch {name} failed: {error}"),
            }

            progress.advance();
            self.publish(
                run,
                Status::new(Stage::Processing, "Processing batches...")
                    .with_progress(progress.clone()),
            );
        }

        Ok(found)
    }
}

// src/pipeline/session.rs

//! Scrape session: the state machine that owns status, results and
//! selection for one user of the scraper.
//!
//! A run moves `idle → fetching → parsing → processing → complete`, or
//! `→ downloading → complete` when materializing a selection. Any run may
//! end in `error` or `cancelled` instead. Every status change is published
//! on a broadcast channel; dropping a receiver unsubscribes it.
//!
//! State sits behind a short-held lock that is never kept across an
//! `.await`. Each run gets its own cancellation token and run id; status
//! updates from a run that was superseded by `reset` are discarded.

mod materialize;
mod sweep;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::cache::FetchCache;
use crate::error::{AppError, Result};
use crate::models::{
    Config, GroupResult, ItemFilters, Progress, ScrapeMode, ScrapeResult, Stage, Status,
};
use crate::services::{
    BoundedFetcher, GroupRequest, GroupSelection, MarkupExtractor, SelectionModel,
};
use crate::utils::http::{HttpTransport, Transport, with_cancel};
use crate::utils::url::origin;

pub use materialize::LessonDocument;

/// Capacity of the status channel; slow subscribers skip ahead.
const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Target of a selection change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemTarget {
    /// Every item currently known in the group
    All,
    /// One item by title
    Item(String),
}

struct SessionState {
    status: Status,
    results: ScrapeResult,
    selection: SelectionModel,
    documents: Vec<LessonDocument>,
    filters: ItemFilters,
    run_id: u64,
    cancel: CancellationToken,
}

/// Identity of the run a task belongs to.
#[derive(Clone)]
struct RunHandle {
    id: u64,
    cancel: CancellationToken,
}

/// Orchestrates scraping, selection and materialization.
pub struct ScrapeSession {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    cache: Arc<FetchCache>,
    extractor: Arc<MarkupExtractor>,
    state: Mutex<SessionState>,
    status_tx: broadcast::Sender<Status>,
}

impl ScrapeSession {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let extractor = MarkupExtractor::new(&config.selectors, &config.video)?;
        let cache = FetchCache::new(config.fetcher.cache_ttl());
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            transport,
            cache: Arc::new(cache),
            extractor: Arc::new(extractor),
            state: Mutex::new(SessionState {
                status: Status::idle(),
                results: ScrapeResult::default(),
                selection: SelectionModel::new(),
                documents: Vec::new(),
                filters: ItemFilters::default(),
                run_id: 0,
                cancel: CancellationToken::new(),
            }),
            status_tx,
        })
    }

    /// Session backed by the `reqwest` transport.
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = HttpTransport::from_config(&config.http)?;
        Self::new(config, Arc::new(transport))
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    pub fn status(&self) -> Status {
        self.state().status.clone()
    }

    /// Receive every status published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Status> {
        self.status_tx.subscribe()
    }

    /// Groups processed so far, in page order.
    pub fn results(&self) -> ScrapeResult {
        self.state().results.clone()
    }

    pub fn selection(&self) -> SelectionModel {
        self.state().selection.clone()
    }

    /// Documents produced by the latest materialization.
    pub fn documents(&self) -> Vec<LessonDocument> {
        self.state().documents.clone()
    }

    pub fn filters(&self) -> ItemFilters {
        self.state().filters
    }

    pub fn set_filters(&self, filters: ItemFilters) {
        self.state().filters = filters;
    }

    pub fn set_selection(&self, group: &str, target: ItemTarget, value: bool) {
        let mut state = self.state();
        match target {
            ItemTarget::All => state.selection.select_group(group, value),
            ItemTarget::Item(title) => state.selection.select_item(group, &title, value),
        }
    }

    pub fn select_all(&self, value: bool) {
        self.state().selection.select_all(value);
    }

    /// Cancel the active run, if any. In-flight requests are dropped; groups
    /// already processed stay in the results.
    pub fn cancel(&self) {
        let state = self.state();
        if state.status.stage.is_active() {
            log::info!("Cancelling {} run", state.status.stage);
        }
        state.cancel.cancel();
    }

    /// Abort any run and return to an empty idle session.
    pub fn reset(&self) {
        let status = {
            let mut state = self.state();
            state.cancel.cancel();
            state.run_id += 1;
            state.cancel = CancellationToken::new();
            state.results = ScrapeResult::default();
            state.selection.clear();
            state.documents.clear();
            state.status = Status::idle();
            state.status.clone()
        };
        self.cache.purge_expired();
        let _ = self.status_tx.send(status);
    }

    /// Open a new run with `status`. Rejected while another run is active.
    fn begin_run(&self, status: Status) -> Result<RunHandle> {
        let handle = {
            let mut state = self.state();
            if state.status.stage.is_active() {
                return Err(AppError::validation(format!(
                    "a run is already in progress ({})",
                    state.status.stage
                )));
            }
            if !state.status.stage.can_advance_to(status.stage) {
                return Err(AppError::validation(format!(
                    "cannot start {} from {}",
                    status.stage, state.status.stage
                )));
            }
            state.run_id += 1;
            state.cancel = CancellationToken::new();
            state.status = status.clone();
            RunHandle {
                id: state.run_id,
                cancel: state.cancel.clone(),
            }
        };
        log::info!("Stage -> {}: {}", status.stage, status.message);
        let _ = self.status_tx.send(status);
        Ok(handle)
    }

    /// Publish a status for `run` if it is still current and the stage
    /// change keeps the run monotonic.
    fn publish(&self, run: &RunHandle, status: Status) {
        {
            let mut state = self.state();
            if state.run_id != run.id {
                return;
            }
            let from = state.status.stage;
            if !from.can_advance_to(status.stage) {
                log::debug!("Dropping status {} after {}", status.stage, from);
                return;
            }
            if from != status.stage {
                log::info!("Stage -> {}: {}", status.stage, status.message);
            }
            state.status = status.clone();
        }
        let _ = self.status_tx.send(status);
    }

    /// Apply `f` to the session state if `run` is still current. Returns
    /// whether it was applied.
    fn update_state(&self, run: &RunHandle, f: impl FnOnce(&mut SessionState)) -> bool {
        let mut state = self.state();
        if state.run_id != run.id {
            log::debug!("Discarding state update from superseded run {}", run.id);
            return false;
        }
        f(&mut state);
        true
    }

    /// Modify the progress of the current status and republish it.
    fn update_progress(&self, run: &RunHandle, message: Option<String>, f: impl FnOnce(&mut Progress)) {
        let mut status = {
            let state = self.state();
            if state.run_id != run.id {
                return;
            }
            state.status.clone()
        };
        if let Some(message) = message {
            status.message = message;
        }
        f(status.progress.get_or_insert_with(Progress::default));
        self.publish(run, status);
    }

    /// Finish `run` with the outcome of its body.
    fn finish<T>(&self, run: &RunHandle, result: Result<T>, done: impl FnOnce(&T) -> String) -> Result<T> {
        match &result {
            Ok(value) => {
                let progress = self.status().progress;
                let mut status = Status::new(Stage::Complete, done(value));
                status.progress = progress;
                self.publish(run, status);
            }
            Err(error) => {
                let message = if error.is_cancelled() {
                    "Process cancelled by user".to_string()
                } else {
                    log::error!("Run failed: {error}");
                    "Process failed".to_string()
                };
                let mut status = Status::failed(message, error);
                status.progress = self.status().progress;
                self.publish(run, status);
            }
        }
        result
    }

    fn fetcher(&self, base_url: Option<String>) -> BoundedFetcher {
        let fetcher = BoundedFetcher::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.cache),
            Arc::clone(&self.extractor),
            self.config.fetcher.clone(),
        );
        match base_url {
            Some(base) => fetcher.with_base_url(base),
            None => fetcher,
        }
    }

    /// Scrape the course page at `url`.
    ///
    /// Returns the groups processed. On cancellation or failure the error is
    /// returned and published, while groups finished before it stay
    /// available through [`results`](Self::results).
    pub async fn start(&self, url: &str, mode: ScrapeMode) -> Result<ScrapeResult> {
        let run = self.begin_run(Status::new(Stage::Fetching, format!("Fetching {url}")))?;
        self.state().results = ScrapeResult::default();

        let result = self.run_scrape(&run, url, mode).await;
        self.finish(&run, result, |scraped| {
            format!(
                "Scraped {} lessons in {} groups",
                scraped.item_count(),
                scraped.groups.len()
            )
        })
    }

    async fn run_scrape(&self, run: &RunHandle, url: &str, mode: ScrapeMode) -> Result<ScrapeResult> {
        let cancel = &run.cancel;
        let html = with_cancel(cancel, self.transport.get_text(url)).await?;

        self.publish(run, Status::new(Stage::Parsing, "Parsing groups"));
        let base = match &self.config.http.base_url {
            Some(base) => base.clone(),
            None => origin(url)?,
        };
        let groups = self.extractor.parse_groups(&html, &base)?;

        let mut filters = ItemFilters::default();
        self.update_state(run, |state| {
            for (name, _) in &groups {
                state.selection.ensure_group(name);
            }
            filters = state.filters;
        });

        let mut progress = Progress::new(groups.len());
        self.publish(
            run,
            Status::new(Stage::Processing, format!("Found {} groups", groups.len()))
                .with_progress(progress.clone()),
        );

        let fetcher = self.fetcher(Some(base));
        for (name, links) in &groups {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            progress.group = Some(name.clone());
            self.publish(
                run,
                Status::new(Stage::Processing, format!("Processing {name}"))
                    .with_progress(progress.clone()),
            );

            let request = GroupRequest {
                mode,
                selection: self.group_selection(name),
                filters,
            };
            match fetcher.process_group(name, links, &request, cancel).await {
                Ok(outcome) => {
                    self.update_state(run, |state| {
                        state
                            .selection
                            .register_items(name, outcome.items.iter().map(|item| &item.title));
                        state.results.upsert(GroupResult {
                            name: name.clone(),
                            items: outcome.items,
                        });
                    });
                }
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => log::warn!("Group {name} failed: {error}"),
            }

            progress.advance();
            self.publish(
                run,
                Status::new(Stage::Processing, format!("Processed {name}"))
                    .with_progress(progress.clone()),
            );
        }

        Ok(self.results())
    }

    fn group_selection(&self, group: &str) -> Option<GroupSelection> {
        self.state().selection.group(group).cloned()
    }
}

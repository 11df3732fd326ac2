// src/pipeline/session/materialize.rs

//! Turning the current selection into documents.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;

use super::{RunHandle, ScrapeSession};
use crate::error::{AppError, Result};
use crate::models::{LessonItem, Progress, QualityTier, ScrapeResult, Stage, Status};
use crate::services::{AssembledDocument, DocumentAssembler};
use crate::utils::http::with_cancel;

/// A document produced for one selected lesson.
#[derive(Debug, Clone)]
pub struct LessonDocument {
    pub group: String,
    pub lesson: String,
    pub document: AssembledDocument,
}

/// Lesson counters shared by groups materialized side by side.
struct LessonCounter {
    done: AtomicUsize,
    total: usize,
}

impl LessonCounter {
    /// Mark one lesson finished and return overall completion in percent.
    fn finish_one(&self) -> u8 {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        ((done.min(self.total) * 100) / self.total.max(1)) as u8
    }
}

impl ScrapeSession {
    /// Assemble one document per selected lesson at the given quality.
    ///
    /// Rejected with a selection error before any work when nothing is
    /// selected. Selected groups are processed a few at a time; lessons
    /// within a group run one after another. A lesson that cannot be
    /// assembled is logged and left out. Documents of groups finished before
    /// a cancellation remain available through [`documents`](Self::documents).
    pub async fn materialize(&self, tier: QualityTier) -> Result<Vec<LessonDocument>> {
        let (selected, results) = {
            let state = self.state();
            (state.selection.selected_items(), state.results.clone())
        };
        if selected.is_empty() {
            return Err(AppError::selection("No items selected for download"));
        }

        let run = self.begin_run(
            Status::new(Stage::Downloading, "Preparing downloads...")
                .with_progress(Progress::new(selected.len())),
        )?;
        self.state().documents.clear();

        let result = self.run_materialize(&run, &selected, &results, tier).await;
        self.finish(&run, result, |documents| {
            format!("Materialized {} documents", documents.len())
        })
    }

    async fn run_materialize(
        &self,
        run: &RunHandle,
        selected: &[(String, Vec<String>)],
        results: &ScrapeResult,
        tier: QualityTier,
    ) -> Result<Vec<LessonDocument>> {
        let assembler = DocumentAssembler::new(
            Arc::clone(&self.transport),
            self.config.assembler.clone(),
        );
        let counter = LessonCounter {
            done: AtomicUsize::new(0),
            total: selected.iter().map(|(_, titles)| titles.len()).sum(),
        };
        let mut documents = Vec::new();

        for chunk in selected.chunks(self.config.assembler.group_chunk.max(1)) {
            if run.cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let outcomes = join_all(chunk.iter().map(|(group, titles)| {
                self.materialize_group(run, &assembler, &counter, results, group, titles, tier)
            }))
            .await;

            // Keep selection order even though the chunk's groups interleave.
            let mut failure = None;
            for outcome in outcomes {
                match outcome {
                    Ok(group_documents) => {
                        self.update_state(run, |state| {
                            state.documents.extend(group_documents.iter().cloned())
                        });
                        documents.extend(group_documents);
                    }
                    Err(error) => {
                        failure.get_or_insert(error);
                    }
                }
            }
            if let Some(error) = failure {
                return Err(error);
            }
        }

        Ok(documents)
    }

    #[allow(clippy::too_many_arguments)]
    async fn materialize_group(
        &self,
        run: &RunHandle,
        assembler: &DocumentAssembler,
        counter: &LessonCounter,
        results: &ScrapeResult,
        group: &str,
        titles: &[String],
        tier: QualityTier,
    ) -> Result<Vec<LessonDocument>> {
        let mut documents = Vec::new();
        for title in titles {
            self.update_progress(run, Some(format!("Downloading {group} - {title}...")), |p| {
                p.group = Some(group.to_string());
            });

            match Self::lesson(results, group, title) {
                Some(item) => {
                    let assembled = with_cancel(
                        &run.cancel,
                        assembler.assemble(group, title, &item.images, tier),
                    )
                    .await;
                    match assembled {
                        Ok(document) => documents.push(LessonDocument {
                            group: group.to_string(),
                            lesson: title.clone(),
                            document,
                        }),
                        Err(error) if error.is_cancelled() => return Err(error),
                        Err(error) => log::warn!("[{group}] Could not assemble {title:?}: {error}"),
                    }
                }
                None => log::warn!("[{group}] Selected lesson {title:?} has no scraped content"),
            }

            let percent = counter.finish_one();
            self.update_progress(run, None, |p| p.download_progress = Some(percent));
        }

        self.update_progress(run, None, Progress::advance);
        Ok(documents)
    }

    fn lesson<'a>(results: &'a ScrapeResult, group: &str, title: &str) -> Option<&'a LessonItem> {
        results.group(group).and_then(|g| g.find(title))
    }
}

//! Batched, bounded-concurrency comment retrieval under a global budget.

use futures::future::join_all;
use harvest_core::{
    flatten, AuthError, CancelSignal, FetchBudget, FlatComment, HarvestConfig, Post, PostComments,
};
use reddit_client::pacing::{jittered_delay, pause};
use reddit_client::CommentTreeFetcher;
use std::future::Future;
use tracing::{debug, info};

/// Produces the flattened comments of one post. Only an authentication
/// failure is an error; anything else should come back as an empty list.
pub trait CommentSource: Send + Sync {
    fn comments_for(
        &self,
        post: &Post,
    ) -> impl Future<Output = Result<Vec<FlatComment>, AuthError>> + Send;
}

impl CommentSource for CommentTreeFetcher {
    async fn comments_for(&self, post: &Post) -> Result<Vec<FlatComment>, AuthError> {
        let nodes = self
            .fetch_tree(&post.permalink, self.request_limit(), self.config().sort)
            .await?;
        Ok(flatten(&nodes, &post.id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSettings {
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub inter_batch_jitter_ms: u64,
    pub comments_per_post_cap: usize,
    pub target_comment_budget: usize,
}

impl ScheduleSettings {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            batch_size: config.schedule.batch_size,
            inter_batch_delay_ms: config.schedule.inter_batch_delay_ms,
            inter_batch_jitter_ms: config.schedule.inter_batch_jitter_ms,
            comments_per_post_cap: config.comments.comments_per_post_cap,
            target_comment_budget: config.comments.target_comment_budget,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleOutcome {
    /// Admitted posts in discovery order, with their admitted comments.
    pub entries: Vec<PostComments>,
    pub batches_completed: usize,
    pub comments_admitted: usize,
    pub cancelled: bool,
    pub budget_exhausted: bool,
}

#[derive(Debug)]
pub struct BatchScheduler<S> {
    source: S,
    settings: ScheduleSettings,
}

impl<S: CommentSource> BatchScheduler<S> {
    pub fn new(source: S, settings: ScheduleSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    /// Fetches comments for `posts` batch by batch. `on_progress` receives
    /// `(posts_admitted, posts_total)` after every finished batch; posts
    /// dropped once the budget runs out are not counted. A batch interrupted
    /// by cancellation is discarded whole.
    pub async fn run<F>(
        &self,
        posts: Vec<Post>,
        cancel: &CancelSignal,
        mut on_progress: F,
    ) -> Result<ScheduleOutcome, AuthError>
    where
        F: FnMut(usize, usize),
    {
        let total = posts.len();
        let batch_size = self.settings.batch_size.max(1);
        let batch_count = total.div_ceil(batch_size);
        let mut budget = FetchBudget::new(self.settings.target_comment_budget);
        let mut outcome = ScheduleOutcome::default();

        for (index, batch) in posts.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            debug!("Dispatching batch {}/{} ({} posts)", index + 1, batch_count, batch.len());
            let fetches = join_all(batch.iter().map(|post| self.source.comments_for(post)));
            let results = tokio::select! {
                results = fetches => results,
                _ = cancel.cancelled() => {
                    info!("Batch {} abandoned on cancellation", index + 1);
                    outcome.cancelled = true;
                    break;
                }
            };

            for (post, result) in batch.iter().zip(results) {
                let mut comments = result?;
                comments.truncate(self.settings.comments_per_post_cap);

                let admission = budget.admit(comments);
                outcome.entries.push(PostComments {
                    post: post.clone(),
                    comments: admission.accepted,
                });
                if admission.should_stop {
                    outcome.budget_exhausted = true;
                    break;
                }
            }

            outcome.batches_completed += 1;
            on_progress(outcome.entries.len(), total);

            if outcome.budget_exhausted {
                info!(
                    "Comment budget of {} reached after batch {}",
                    budget.target_total(),
                    index + 1
                );
                break;
            }
            if index + 1 < batch_count {
                let delay = jittered_delay(
                    self.settings.inter_batch_delay_ms,
                    self.settings.inter_batch_jitter_ms,
                );
                if !pause(delay, cancel).await {
                    outcome.cancelled = true;
                    break;
                }
            }
        }

        outcome.comments_admitted = budget.consumed();
        Ok(outcome)
    }
}

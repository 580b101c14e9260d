//! Drives one harvest from search to assembled dataset.

use crate::events::{publish, HarvestEvent, RunPhase};
use crate::scheduler::{BatchScheduler, ScheduleSettings};
use chrono::Utc;
use harvest_core::{
    assemble, AssemblyContext, AuthError, CancelSignal, CoreError, Dataset, HarvestConfig,
    RunStatus,
};
use reddit_client::metrics::ApiMetrics;
use reddit_client::{RedditClient, SearchStop};
use std::time::Instant;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub dataset: Dataset,
    pub search_stop: SearchStop,
    pub pages_fetched: usize,
    pub posts_discovered: usize,
    pub budget_exhausted: bool,
    pub api_metrics: ApiMetrics,
    pub token_refreshes: u64,
}

impl HarvestReport {
    pub fn status(&self) -> RunStatus {
        self.dataset.metadata().status
    }
}

/// Owns the account connection, so the cached token outlives single runs.
#[derive(Debug)]
pub struct Harvester {
    config: HarvestConfig,
    client: RedditClient,
    phase: watch::Sender<RunPhase>,
    subscribers: Vec<UnboundedSender<HarvestEvent>>,
}

impl Harvester {
    pub fn new(config: HarvestConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let client = RedditClient::from_config(&config)?;
        let (phase, _) = watch::channel(RunPhase::Idle);

        Ok(Self {
            config,
            client,
            phase,
            subscribers: Vec::new(),
        })
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn client(&self) -> &RedditClient {
        &self.client
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<HarvestEvent> {
        let (sender, receiver) = unbounded_channel();
        self.subscribers.push(sender);
        receiver
    }

    /// Runs search, comment retrieval and assembly. Cancellation still
    /// yields a dataset, tagged cancelled; only authentication failures are
    /// returned as errors.
    pub async fn run(&self, cancel: &CancelSignal) -> Result<HarvestReport, CoreError> {
        let started = Instant::now();
        let fetched_at = Utc::now();
        let query = self.config.search.query.trim().to_string();
        info!("Starting harvest for '{}' ({})", query, self.config.strategy_tag());

        self.set_phase(RunPhase::SearchingPosts);
        let search = self
            .client
            .search_paginator()
            .search(&self.config.search, cancel)
            .await
            .map_err(|e| self.fail(e))?;

        let pages_fetched = search.pages_fetched;
        let posts_discovered = search.posts.len();
        publish(
            &self.subscribers,
            HarvestEvent::PostsDiscovered {
                posts: posts_discovered,
                pages: pages_fetched,
            },
        );

        let mut status = RunStatus::Completed;
        let mut budget_exhausted = false;
        let entries = if search.was_cancelled() {
            status = RunStatus::Cancelled;
            Vec::new()
        } else {
            self.set_phase(RunPhase::FetchingComments);
            let scheduler = BatchScheduler::new(
                self.client.comment_fetcher(self.config.comments.clone()),
                ScheduleSettings::from_config(&self.config),
            );

            let subscribers = &self.subscribers;
            let outcome = scheduler
                .run(search.posts, cancel, |completed, total| {
                    info!("Fetched comments for {}/{} posts", completed, total);
                    publish(subscribers, HarvestEvent::BatchCompleted { completed, total });
                })
                .await
                .map_err(|e| self.fail(e))?;

            if outcome.budget_exhausted {
                budget_exhausted = true;
                publish(
                    &self.subscribers,
                    HarvestEvent::BudgetExhausted {
                        target: self.config.comments.target_comment_budget,
                    },
                );
            }
            if outcome.cancelled {
                status = RunStatus::Cancelled;
            }
            outcome.entries
        };

        if status == RunStatus::Completed {
            self.set_phase(RunPhase::Assembling);
        } else {
            warn!("Harvest cancelled, assembling partial dataset");
        }

        let dataset = assemble(
            &query,
            entries,
            AssemblyContext {
                strategy_tag: self.config.strategy_tag(),
                status,
                target_comment_budget: self.config.comments.target_comment_budget,
                fetched_at,
                fetch_duration: started.elapsed(),
            },
        );

        self.set_phase(match status {
            RunStatus::Completed => RunPhase::Completed,
            RunStatus::Cancelled => RunPhase::Cancelled,
        });
        info!(
            "Harvest finished: {} posts, {} comments in {:.2}s",
            dataset.metadata().total_posts,
            dataset.metadata().total_comments,
            dataset.metadata().fetch_duration_secs
        );

        Ok(HarvestReport {
            dataset,
            search_stop: search.stop,
            pages_fetched,
            posts_discovered,
            budget_exhausted,
            api_metrics: self.client.api().get_metrics().await,
            token_refreshes: self.client.tokens().refresh_count(),
        })
    }

    fn set_phase(&self, phase: RunPhase) {
        let previous = self.phase.send_replace(phase);
        info!("Harvest phase: {} -> {}", previous, phase);
        publish(&self.subscribers, HarvestEvent::PhaseChanged { phase });
    }

    fn fail(&self, error: AuthError) -> CoreError {
        error!("Harvest aborted: {}", error);
        self.set_phase(RunPhase::Failed);
        CoreError::Auth(error)
    }
}

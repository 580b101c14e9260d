use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    SearchingPosts,
    FetchingComments,
    Assembling,
    Completed,
    Cancelled,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::Completed | RunPhase::Cancelled | RunPhase::Failed
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::SearchingPosts => "searching posts",
            RunPhase::FetchingComments => "fetching comments",
            RunPhase::Assembling => "assembling",
            RunPhase::Completed => "completed",
            RunPhase::Cancelled => "cancelled",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Progress notifications pushed to subscribers while a run is in flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HarvestEvent {
    PhaseChanged { phase: RunPhase },
    PostsDiscovered { posts: usize, pages: usize },
    BatchCompleted { completed: usize, total: usize },
    BudgetExhausted { target: usize },
}

/// Sends `event` to every live subscriber. Dropped receivers are ignored.
pub(crate) fn publish(subscribers: &[UnboundedSender<HarvestEvent>], event: HarvestEvent) {
    for subscriber in subscribers {
        let _ = subscriber.send(event.clone());
    }
}

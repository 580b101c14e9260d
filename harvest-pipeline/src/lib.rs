pub mod events;
pub mod export;
pub mod harvester;
pub mod scheduler;

pub use events::{HarvestEvent, RunPhase};
pub use export::{default_output_path, export_dataset};
pub use harvester::{HarvestReport, Harvester};
pub use scheduler::{BatchScheduler, CommentSource, ScheduleOutcome, ScheduleSettings};

pub mod conflict;
pub mod efficiency;
pub mod optimizer;
pub mod recommendation;
pub mod suggestion;

pub use optimizer::ScheduleOptimizationService;
pub use suggestion::{
    DeclineAllMerges, SessionMergePolicy, SuggestionGenerator, SuggestionThresholds,
};

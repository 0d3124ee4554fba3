pub mod gateways;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

// Re-export the core engine types for external use
pub use models::{
    ConflictSeverity, ConflictType, OptimizationResult, OptimizationSuggestion,
    OptimizeScheduleRequest, Schedule, ScheduleConflict, ScheduleError, SuggestionType, TimeSlot,
};
pub use services::ScheduleOptimizationService;

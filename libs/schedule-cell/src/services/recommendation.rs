// libs/schedule-cell/src/services/recommendation.rs
use crate::models::{OptimizationSuggestion, ScheduleConflict, SuggestionType};

/// Turn applied changes into short natural-language summaries for display.
pub fn build_recommendations(
    applied: &[OptimizationSuggestion],
    resolved: &[ScheduleConflict],
    unresolved_count: usize,
    efficiency_improvement: f64,
    estimated_time_saved_minutes: i64,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    for conflict in resolved {
        recommendations.push(format!("Resolved {}: {}", conflict.conflict_type, conflict.description));
    }

    for suggestion in applied {
        let action = match suggestion.suggestion_type {
            SuggestionType::Reschedule => "Rescheduled",
            SuggestionType::ReassignTherapist => "Reassigned therapist for",
            SuggestionType::ChangeRoom => "Changed room for",
            SuggestionType::CombineSessions => "Combined sessions around",
        };
        recommendations.push(format!(
            "{} appointment {} (saves ~{} minutes)",
            action, suggestion.original_appointment_id, suggestion.estimated_savings_minutes,
        ));
    }

    if efficiency_improvement > 0.0 {
        recommendations.push(format!(
            "Schedule efficiency improved by {:.1} points",
            efficiency_improvement
        ));
    }

    if estimated_time_saved_minutes > 0 {
        recommendations.push(format!(
            "Estimated {} minutes of therapist time recovered",
            estimated_time_saved_minutes
        ));
    }

    if unresolved_count > 0 {
        recommendations.push(format!(
            "{} conflicts remain and need manual attention",
            unresolved_count
        ));
    }

    if recommendations.is_empty() {
        recommendations.push("Schedule is already optimal - no changes applied".to_string());
    }

    recommendations
}

//! Dashboard aggregation over a user's scheduled sessions

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::storage::models::{ScheduledSession, SessionStatus};

/// Figures shown on the user dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub completed_workouts: usize,
    /// Completed share of this month's sessions, rounded percent
    pub adherence_rate: u32,
    pub upcoming_sessions: usize,
    pub total_sessions_this_month: usize,
    pub completed_this_month: usize,
}

impl DashboardStats {
    pub fn compute(sessions: &[ScheduledSession], today: NaiveDate) -> Self {
        let in_month = |date: NaiveDate| date.year() == today.year() && date.month() == today.month();

        let completed_workouts = sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Completed)
            .count();
        let this_month: Vec<&ScheduledSession> =
            sessions.iter().filter(|s| in_month(s.scheduled_date)).collect();
        let completed_this_month = this_month
            .iter()
            .filter(|s| s.status == SessionStatus::Completed)
            .count();
        let upcoming_sessions = sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Scheduled && s.scheduled_date >= today)
            .count();

        let adherence_rate = if this_month.is_empty() {
            0
        } else {
            ((completed_this_month as f64 / this_month.len() as f64) * 100.0).round() as u32
        };

        Self {
            completed_workouts,
            adherence_rate,
            upcoming_sessions,
            total_sessions_this_month: this_month.len(),
            completed_this_month,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(date: &str, status: SessionStatus) -> ScheduledSession {
        ScheduledSession {
            id: format!("s-{}", date),
            user_id: "u1".to_string(),
            plan_session_id: "ps1".to_string(),
            scheduled_date: date.parse().unwrap(),
            status,
            notes: None,
        }
    }

    #[test]
    fn test_empty_history() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        assert_eq!(DashboardStats::compute(&[], today), DashboardStats::default());
    }

    #[test]
    fn test_month_adherence_and_upcoming() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let sessions = vec![
            session("2025-02-27", SessionStatus::Completed),
            session("2025-03-03", SessionStatus::Completed),
            session("2025-03-05", SessionStatus::Missed),
            session("2025-03-10", SessionStatus::Completed),
            session("2025-03-14", SessionStatus::Scheduled),
            session("2025-04-02", SessionStatus::Scheduled),
        ];
        let stats = DashboardStats::compute(&sessions, today);
        assert_eq!(stats.completed_workouts, 3);
        assert_eq!(stats.total_sessions_this_month, 4);
        assert_eq!(stats.completed_this_month, 2);
        assert_eq!(stats.adherence_rate, 50);
        assert_eq!(stats.upcoming_sessions, 2);
    }
}

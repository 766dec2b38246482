//! Cron scheduler for scheduled-task events.
//!
//! Each configured [`ScheduleEntry`] fires on its cron expression and
//! delivers its description to the target session as a system note.
//! Entries with invalid expressions or for another agent are logged and
//! skipped.

use crate::sessions::SessionStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use estate_common::config::ScheduleEntry;
use std::str::FromStr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A parsed schedule entry.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub entry: ScheduleEntry,
    schedule: Schedule,
}

impl ScheduledTask {
    pub fn new(entry: ScheduleEntry) -> Result<Self> {
        let schedule = parse_expression(&entry.expression)?;
        Ok(Self { entry, schedule })
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(after).next()
    }
}

/// Parse a cron expression. Five-field crontab syntax gets a seconds field.
pub fn parse_expression(expression: &str) -> Result<Schedule> {
    let expression = expression.trim();
    let field_count = expression.split_whitespace().count();

    let normalized = match field_count {
        5 => format!("0 {expression}"),
        6 | 7 => expression.to_string(),
        _ => anyhow::bail!(
            "Invalid cron expression: {expression} (expected 5, 6, or 7 fields, got {field_count})"
        ),
    };

    Schedule::from_str(&normalized).with_context(|| format!("Invalid cron expression: {expression}"))
}

/// Runs scheduled tasks against a session store.
#[derive(Debug)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
}

impl Scheduler {
    /// Parse entries for `agent_name`, skipping the ones that cannot run.
    pub fn from_entries(entries: &[ScheduleEntry], agent_name: &str) -> Self {
        let mut tasks = Vec::new();
        for entry in entries {
            if entry.agent != agent_name {
                tracing::warn!(agent = %entry.agent, session = %entry.session, "Skipping schedule for unknown agent");
                continue;
            }
            match ScheduledTask::new(entry.clone()) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    tracing::error!(expression = %entry.expression, error = %e, "Skipping invalid schedule");
                }
            }
        }
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Next fire time after `now` and the tasks due at it.
    pub fn next_due(&self, now: &DateTime<Utc>) -> Option<(DateTime<Utc>, Vec<&ScheduledTask>)> {
        let next = self.tasks.iter().filter_map(|t| t.next_after(now)).min()?;
        let due = self
            .tasks
            .iter()
            .filter(|t| t.next_after(now) == Some(next))
            .collect();
        Some((next, due))
    }

    /// Start the scheduler loop. It stops when `shutdown` fires.
    pub fn spawn(self, sessions: SessionStore, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(tasks = self.len(), "Scheduler started");
            loop {
                let now = Utc::now();
                let Some((next, due)) = self.next_due(&now) else {
                    shutdown.cancelled().await;
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                for task in due {
                    let session = sessions.get_or_create(&task.entry.session).await;
                    tracing::info!(
                        session_id = %task.entry.session,
                        fire_time = %next,
                        "Delivering scheduled task"
                    );
                    session.run_scheduled_task(&task.entry.description).await;
                }
            }
            tracing::info!("Scheduler shutting down");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(expression: &str) -> ScheduleEntry {
        ScheduleEntry {
            agent: "real-estate-agent".into(),
            session: "alice".into(),
            expression: expression.into(),
            description: "send the morning listings digest".into(),
        }
    }

    #[test]
    fn five_field_expression_gets_seconds() {
        let schedule = parse_expression("30 9 * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = schedule.after(&from).next().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 9, 30, 0).unwrap());
    }

    #[test]
    fn invalid_expressions_are_rejected() {
        assert!(parse_expression("* *").is_err());
        assert!(parse_expression("0 61 * * * *").is_err());
    }

    #[test]
    fn from_entries_skips_bad_and_foreign_entries() {
        let mut foreign = entry("0 0 9 * * *");
        foreign.agent = "other-agent".into();
        let scheduler = Scheduler::from_entries(
            &[entry("0 0 9 * * *"), entry("not a cron"), foreign],
            "real-estate-agent",
        );
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn next_due_groups_simultaneous_tasks() {
        let mut evening = entry("0 0 18 * * *");
        evening.session = "bob".into();
        let scheduler = Scheduler::from_entries(
            &[entry("0 0 9 * * *"), entry("0 0 9 * * *"), evening],
            "real-estate-agent",
        );
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();

        let (next, due) = scheduler.next_due(&now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
        assert_eq!(due.len(), 2);
        assert!(Scheduler::from_entries(&[], "x").next_due(&now).is_none());
    }

    struct Silent;

    #[async_trait::async_trait]
    impl estate_agent::GenerationSource for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn generate(
            &self,
            _request: estate_agent::GenerationRequest,
        ) -> Result<estate_agent::GenerationStream, estate_agent::PipelineError> {
            Err(estate_agent::PipelineError::GenerationFailure("silent".into()))
        }
    }

    #[test]
    fn spawned_scheduler_delivers_and_stops() {
        let store = SessionStore::new(
            "real-estate-agent",
            std::sync::Arc::new(estate_tools::builtin_registry()),
            std::sync::Arc::new(Silent),
            estate_agent::SessionOptions::default(),
        );
        let scheduler = Scheduler::from_entries(&[entry("* * * * * *")], "real-estate-agent");
        let shutdown = CancellationToken::new();

        let history = tokio_test::block_on(async {
            let handle = scheduler.spawn(store.clone(), shutdown.clone());
            tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
            shutdown.cancel();
            handle.await.unwrap();
            store.get("alice").await.unwrap().history().await
        });

        assert!(!history.is_empty());
        assert!(history.iter().all(|m| m.role == estate_agent::Role::System
            && m.content == "Running scheduled task: send the morning listings digest"));
    }
}

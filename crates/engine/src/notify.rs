use std::collections::HashSet;

use buildwatch_core::models::{BuildResult, Notification, NotificationKind, Project, ProjectStatus};
use time::{Duration, UtcDateTime};

/// Decides which status changes are worth telling the user about, and when.
///
/// Deliveries are spaced at least `gap` apart no matter how close together the triggering
/// updates arrive.
#[derive(Debug)]
pub struct NotificationScheduler {
    gap: Duration,
    next_available_delivery: UtcDateTime,
    /// Projects with a failure the user was already told about.
    notified: HashSet<String>,
}

impl NotificationScheduler {
    pub fn new(gap: Duration, now: UtcDateTime) -> Self {
        Self { gap, next_available_delivery: now, notified: HashSet::new() }
    }

    /// Reserves the next delivery slot.
    pub fn next_available_notification_time(&mut self, now: UtcDateTime) -> UtcDateTime {
        let candidate = now + self.gap;
        let at = self.next_available_delivery.max(candidate);
        self.next_available_delivery = at + self.gap;
        at
    }

    /// Called once for every accepted status update.
    pub fn on_update(
        &mut self,
        project: &Project,
        status: &ProjectStatus,
        now: UtcDateTime,
    ) -> Option<Notification> {
        let project_id = &project.project_id;
        let (kind, title, body) = match status.last_known_status {
            BuildResult::Failure if !self.notified.contains(project_id) => {
                self.notified.insert(project_id.clone());
                let body = status.culprits.clone().unwrap_or_default();
                (NotificationKind::Failed, format!("{} failed", project.title), body)
            }
            BuildResult::Success if self.notified.remove(project_id) => {
                (NotificationKind::Fixed, format!("{} fixed", project.title), String::new())
            }
            _ => return None,
        };
        Some(Notification {
            project_id: project_id.clone(),
            kind,
            title,
            body,
            deliver_at: self.next_available_notification_time(now),
        })
    }

    pub fn forget(&mut self, project_id: &str) -> bool { self.notified.remove(project_id) }

    #[cfg(test)]
    fn is_notified(&self, project_id: &str) -> bool { self.notified.contains(project_id) }
}

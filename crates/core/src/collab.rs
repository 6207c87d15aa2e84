//! Interfaces the polling engine uses to reach the rest of the application.

use std::future::Future;

use anyhow::Result;
use time::UtcDateTime;

use crate::models::{BuildResult, Notification, Project, ProjectInfo, ProjectStatus};

/// Delivers notifications to the user.
pub trait Notifier: Send + Sync + 'static {
    /// Schedules `notification` for display at its delivery time. Must not block.
    fn present_notification(&self, notification: &Notification);
}

/// Receives indicator changes for display.
pub trait StatusListener: Send + Sync + 'static {
    fn on_summary_changed(&self, indicator: BuildResult);

    /// `annotated` marks projects excluded from the summary.
    fn on_project_status_changed(&self, project: &Project, indicator: BuildResult, annotated: bool);
}

/// Storage of the configured projects and their last known status.
pub trait ProjectSource: Send + Sync + 'static {
    /// Projects without a deletion date, in list order.
    fn list_active_projects(&self) -> impl Future<Output = Result<Vec<ProjectInfo>>> + Send;

    /// Physically removes projects deleted at or before `cutoff`. Returns the number removed.
    fn purge_projects_deleted_before(
        &self,
        cutoff: UtcDateTime,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Stores the status of a project unless the stored one is at least as recent. Returns
    /// false if the stored status was kept.
    fn save_status(
        &self,
        project_id: &str,
        status: &ProjectStatus,
    ) -> impl Future<Output = Result<bool>> + Send;
}

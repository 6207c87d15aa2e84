//! The polling engine: a single task that owns every piece of mutable tracking state.
//!
//! Inputs arrive as [`Command`]s through an [`EngineHandle`]. Status requests run in their own
//! tasks and report back with [`Command::Completed`], so bookkeeping for one result never
//! interleaves with another.

pub mod notify;
pub mod store;
pub mod summary;

use std::{collections::HashSet, future::Future, sync::Arc};

use anyhow::{Context, Result, anyhow};
use buildwatch_core::{
    collab::{Notifier, ProjectSource, StatusListener},
    config::PollConfig,
    models::{BuildResult, Project, ProjectInfo},
};
use buildwatch_jenkins::{FetchResult, StatusFetcher};
use time::{Duration, UtcDateTime};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    notify::NotificationScheduler,
    store::{ApplyOutcome, ProjectStatusStore, UpsertOutcome},
    summary::{SummaryAggregator, summarize},
};

const COMMAND_BUFFER: usize = 256;

/// Performs the status request for one project.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch_status(&self, project: &Project) -> impl Future<Output = FetchResult> + Send;
}

impl Fetcher for StatusFetcher {
    fn fetch_status(&self, project: &Project) -> impl Future<Output = FetchResult> + Send {
        StatusFetcher::fetch(self, &project.url, &project.username, &project.token)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub notification_gap: Duration,
    pub purge_after: Duration,
}

impl From<&PollConfig> for EngineConfig {
    fn from(config: &PollConfig) -> Self {
        Self { notification_gap: config.notification_gap(), purge_after: config.purge_after() }
    }
}

#[derive(Debug)]
pub enum Command {
    /// Start a poll of every active project.
    Tick,
    Completed { project_id: String, result: FetchResult },
    /// A project was deleted; stop tracking it right away.
    Deleted { project_id: String },
    /// Purge projects deleted long enough ago.
    Sweep,
    Snapshot(oneshot::Sender<Snapshot>),
}

/// The overall indicator and every active project, in list order.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub summary: BuildResult,
    pub projects: Vec<ProjectInfo>,
}

#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| anyhow!("Engine is not running"))
    }

    pub async fn tick(&self) -> Result<()> { self.send(Command::Tick).await }

    #[cfg(test)]
    async fn complete(&self, project_id: String, result: FetchResult) -> Result<()> {
        self.send(Command::Completed { project_id, result }).await
    }

    pub async fn deleted(&self, project_id: String) -> Result<()> {
        self.send(Command::Deleted { project_id }).await
    }

    pub async fn sweep(&self) -> Result<()> { self.send(Command::Sweep).await }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.context("Engine dropped snapshot request")
    }
}

pub struct Engine<S, F> {
    source: S,
    fetcher: Arc<F>,
    notifier: Arc<dyn Notifier>,
    listener: Arc<dyn StatusListener>,
    config: EngineConfig,
    store: ProjectStatusStore,
    scheduler: NotificationScheduler,
    summary: SummaryAggregator,
    rx: mpsc::Receiver<Command>,
    // Weak so that in-flight requests alone do not keep the engine alive
    tx: mpsc::WeakSender<Command>,
}

impl<S, F> Engine<S, F>
where
    S: ProjectSource,
    F: Fetcher,
{
    pub fn new(
        source: S,
        fetcher: F,
        notifier: Arc<dyn Notifier>,
        listener: Arc<dyn StatusListener>,
        config: EngineConfig,
    ) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let engine = Self {
            source,
            fetcher: Arc::new(fetcher),
            notifier,
            listener,
            config,
            store: ProjectStatusStore::new(),
            scheduler: NotificationScheduler::new(config.notification_gap, UtcDateTime::now()),
            summary: SummaryAggregator::new(),
            rx,
            tx: tx.downgrade(),
        };
        (engine, EngineHandle { tx })
    }

    pub fn spawn(self) -> JoinHandle<()> { tokio::spawn(self.run()) }

    /// Processes commands until every [`EngineHandle`] is dropped.
    pub async fn run(mut self) {
        self.publish_summary();
        while let Some(command) = self.rx.recv().await {
            if let Err(e) = self.handle(command).await {
                tracing::error!("Engine command failed: {:?}", e);
            }
        }
        tracing::debug!("Engine stopped");
    }

    async fn handle(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Tick => self.tick().await,
            Command::Completed { project_id, result } => self.completed(&project_id, result).await,
            Command::Deleted { project_id } => {
                self.deleted(&project_id);
                Ok(())
            }
            Command::Sweep => self.sweep().await,
            Command::Snapshot(reply) => {
                let snapshot =
                    Snapshot { summary: self.summary.current(), projects: self.store.snapshot() };
                // The requester may have given up
                let _ = reply.send(snapshot);
                Ok(())
            }
        }
    }

    async fn tick(&mut self) -> Result<()> {
        let projects =
            self.source.list_active_projects().await.context("Failed to list projects")?;
        self.sync(projects, UtcDateTime::now());
        let active = self.store.active();
        if active.is_empty() {
            tracing::debug!("No projects to poll");
            return Ok(());
        }
        tracing::debug!("Polling {} projects", active.len());
        for info in active {
            let project = info.project.clone();
            let fetcher = self.fetcher.clone();
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let result = fetcher.fetch_status(&project).await;
                let Some(tx) = tx.upgrade() else {
                    return;
                };
                let project_id = project.project_id;
                if tx.send(Command::Completed { project_id, result }).await.is_err() {
                    tracing::debug!("Engine stopped before status arrived");
                }
            });
        }
        Ok(())
    }

    /// Brings the tracked projects in line with the active list from the source.
    fn sync(&mut self, projects: Vec<ProjectInfo>, now: UtcDateTime) {
        let ids =
            projects.iter().map(|info| info.project.project_id.clone()).collect::<HashSet<_>>();
        for info in projects {
            let project_id = info.project.project_id.clone();
            match self.store.upsert(info) {
                UpsertOutcome::Updated => {}
                outcome => {
                    if outcome == UpsertOutcome::Reconfigured {
                        tracing::info!(%project_id, "Project reconfigured");
                        self.scheduler.forget(&project_id);
                    }
                    if let Some(info) = self.store.get(&project_id) {
                        self.listener.on_project_status_changed(
                            &info.project,
                            info.status.last_known_status,
                            info.project.ignore_for_summary,
                        );
                    }
                }
            }
        }
        for project_id in self.store.retain_active(&ids, now) {
            tracing::info!(%project_id, "Project no longer active");
            self.scheduler.forget(&project_id);
        }
        self.publish_summary();
    }

    async fn completed(&mut self, project_id: &str, result: FetchResult) -> Result<()> {
        let (previous, current) = match self.store.apply(project_id, &result) {
            ApplyOutcome::Discarded => {
                tracing::debug!(project_id, "Discarded stale status");
                return Ok(());
            }
            ApplyOutcome::Applied { previous, current } => (previous, current),
        };
        let Some(info) = self.store.get(project_id).cloned() else {
            return Ok(());
        };
        if previous != current {
            tracing::info!(project_id, title = %info.project.title, "{} -> {}", previous, current);
        }
        if let Some(notification) =
            self.scheduler.on_update(&info.project, &info.status, UtcDateTime::now())
        {
            self.notifier.present_notification(&notification);
        }
        self.listener.on_project_status_changed(
            &info.project,
            current,
            info.project.ignore_for_summary,
        );
        self.publish_summary();
        let saved = self
            .source
            .save_status(project_id, &info.status)
            .await
            .with_context(|| format!("Failed to save status of project {project_id}"))?;
        if !saved {
            // Reset for new connection settings; picked up on the next tick
            tracing::debug!(project_id, "Stored status is newer, not saving");
        }
        Ok(())
    }

    fn deleted(&mut self, project_id: &str) {
        if self.store.mark_deleted(project_id, UtcDateTime::now()) {
            tracing::info!(project_id, "Project deleted");
            self.scheduler.forget(project_id);
            self.publish_summary();
        }
    }

    async fn sweep(&mut self) -> Result<()> {
        let cutoff = purge_cutoff(UtcDateTime::now(), self.config.purge_after);
        let purged = self
            .source
            .purge_projects_deleted_before(cutoff)
            .await
            .context("Failed to purge deleted projects")?;
        for project_id in self.store.purge(cutoff) {
            self.scheduler.forget(&project_id);
        }
        if purged > 0 {
            tracing::info!("Purged {} deleted projects", purged);
        }
        Ok(())
    }

    fn publish_summary(&mut self) {
        let indicator = summarize(self.store.iter().map(|info| (&info.project, &info.status)));
        if let Some(indicator) = self.summary.update(indicator) {
            tracing::debug!("Summary is now {}", indicator);
            self.listener.on_summary_changed(indicator);
        }
    }
}

/// Projects deleted at or before the returned time may be removed for good.
pub fn purge_cutoff(now: UtcDateTime, purge_after: Duration) -> UtcDateTime { now - purge_after }

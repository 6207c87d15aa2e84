use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::log;

use crate::AppState;

pub type Scheduler = JobScheduler;

pub async fn create(state: AppState) -> Result<Scheduler> {
    let sched = JobScheduler::new().await?;

    // Every poll interval: Request the status of all active projects
    {
        let engine = state.engine.clone();
        sched
            .add(Job::new_repeated_async(state.config.poll.interval(), move |_uuid, _l| {
                let engine = engine.clone();
                Box::pin(async move {
                    if let Err(e) = engine.tick().await {
                        log::error!("Failed to start poll: {:?}", e);
                    }
                })
            })?)
            .await?;
    }

    // Every 1 hour: Purge projects deleted long enough ago
    {
        let engine = state.engine.clone();
        sched
            .add(Job::new_async("every 1 hour", move |_uuid, _l| {
                let engine = engine.clone();
                Box::pin(async move {
                    if let Err(e) = engine.sweep().await {
                        log::error!("Failed to purge deleted projects: {:?}", e);
                    }
                })
            })?)
            .await?;
    }

    sched.start().await?;

    // The repeated job first fires one interval from now
    state.engine.sweep().await?;
    state.engine.tick().await?;
    Ok(sched)
}

use std::time::Duration;

use anyhow::{Context, Result};
use buildwatch_core::{
    collab::{Notifier, StatusListener},
    models::{BuildResult, Notification, NotificationKind, Project},
    util::format_timestamp,
};
use serde::Serialize;
use time::UtcDateTime;
use url::Url;

/// Delivers notifications at their scheduled time, to a webhook when one is configured and
/// to the log otherwise.
#[derive(Clone)]
pub struct DeliveryNotifier {
    client: reqwest::Client,
    webhook_url: Option<Url>,
}

#[derive(Serialize)]
struct NotificationPayload<'a> {
    project_id: &'a str,
    kind: NotificationKind,
    title: &'a str,
    body: &'a str,
    deliver_at: String,
}

impl DeliveryNotifier {
    pub fn new(webhook_url: Option<Url>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("buildwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, webhook_url })
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            tracing::info!(
                kind = ?notification.kind,
                "{}: {}",
                notification.title,
                notification.body
            );
            return Ok(());
        };
        let payload = NotificationPayload {
            project_id: &notification.project_id,
            kind: notification.kind,
            title: &notification.title,
            body: &notification.body,
            deliver_at: format_timestamp(notification.deliver_at),
        };
        self.client
            .post(url.clone())
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("Failed to post notification to {url}"))?;
        Ok(())
    }
}

impl Notifier for DeliveryNotifier {
    fn present_notification(&self, notification: &Notification) {
        let notifier = self.clone();
        let notification = notification.clone();
        tokio::spawn(async move {
            let delay = notification.deliver_at - UtcDateTime::now();
            if let Ok(delay) = Duration::try_from(delay) {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = notifier.deliver(&notification).await {
                tracing::warn!("{:?}", e);
            }
        });
    }
}

/// Reports indicator changes to the log.
pub struct LogListener;

impl StatusListener for LogListener {
    fn on_summary_changed(&self, indicator: BuildResult) {
        tracing::info!("Overall status: {}", indicator);
    }

    fn on_project_status_changed(
        &self,
        project: &Project,
        indicator: BuildResult,
        annotated: bool,
    ) {
        tracing::debug!(
            project_id = %project.project_id,
            ignored = annotated,
            "{} is {}",
            project.title,
            indicator
        );
    }
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, extract::State, routing::post};
    use serde_json::Value;
    use tokio::{net::TcpListener, sync::mpsc};

    use super::*;

    type Received = (UtcDateTime, Value);

    async fn receive(State(tx): State<mpsc::UnboundedSender<Received>>, Json(body): Json<Value>) {
        let _ = tx.send((UtcDateTime::now(), body));
    }

    async fn webhook() -> (Url, mpsc::UnboundedReceiver<Received>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let router = Router::new().route("/hook", post(receive)).with_state(tx);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        (Url::parse(&format!("http://{addr}/hook")).unwrap(), rx)
    }

    #[tokio::test]
    async fn posts_at_delivery_time() {
        let (url, mut rx) = webhook().await;
        let notifier = DeliveryNotifier::new(Some(url)).unwrap();
        let deliver_at = UtcDateTime::now() + time::Duration::milliseconds(200);
        notifier.present_notification(&Notification {
            project_id: "p1".to_string(),
            kind: NotificationKind::Failed,
            title: "nightly failed".to_string(),
            body: "Culprits: alice".to_string(),
            deliver_at,
        });
        let (received_at, body) =
            tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert!(received_at >= deliver_at);
        assert_eq!(body["project_id"], "p1");
        assert_eq!(body["kind"], "failed");
        assert_eq!(body["title"], "nightly failed");
        assert_eq!(body["body"], "Culprits: alice");
    }
}

//! Best-effort notification fan-out. Lifecycle operations enqueue messages on
//! an unbounded channel and return immediately; a background worker delivers
//! them over HTTP. A failed delivery is logged and dropped, it never fails or
//! delays the request that triggered it, and one bad message never stops the
//! ones behind it.

pub mod templates;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::core::config::AppConfig;
use crate::tickets::models::{Ticket, TicketComment};

use templates::{EmailNotificationRequest, SlackNotificationRequest};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Email(EmailNotificationRequest),
    Slack(SlackNotificationRequest),
}

impl OutboundMessage {
    fn service(&self) -> &'static str {
        match self {
            OutboundMessage::Email(_) => "email",
            OutboundMessage::Slack(_) => "slack",
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{service} service returned status {status}")]
    Rejected { service: &'static str, status: u16 },
}

/// Handle held by the lifecycle engine. Cloneable; enqueueing never blocks.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: UnboundedSender<OutboundMessage>,
    config: Arc<AppConfig>,
}

impl NotificationDispatcher {
    /// Dispatcher wired to a caller-owned receiver. Used when the consumer is
    /// not the standard worker (tests drain the receiver directly).
    pub fn channel(config: Arc<AppConfig>) -> (Self, UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, config }, rx)
    }

    pub fn send_ticket_created_notifications(&self, ticket: &Ticket, student_email: &str) {
        self.enqueue(OutboundMessage::Email(templates::new_ticket_admin_email(
            &self.config,
            ticket,
            student_email,
        )));
        self.enqueue(OutboundMessage::Email(
            templates::ticket_created_confirmation_email(&self.config, ticket, student_email),
        ));
        self.enqueue(OutboundMessage::Slack(templates::new_ticket_slack_message(
            &self.config,
            ticket,
            student_email,
        )));
    }

    pub fn send_completion_notification(&self, ticket: &Ticket, resolver_email: &str) {
        self.enqueue(OutboundMessage::Slack(
            templates::ticket_completed_slack_message(&self.config, ticket, resolver_email),
        ));
    }

    pub fn send_admin_reply_notification(
        &self,
        ticket: &Ticket,
        comment: &TicketComment,
        student_email: &str,
    ) {
        self.enqueue(OutboundMessage::Email(templates::admin_reply_email(
            &self.config,
            ticket,
            comment,
            student_email,
        )));
    }

    fn enqueue(&self, message: OutboundMessage) {
        if self.tx.send(message).is_err() {
            log::warn!("notification worker is gone, dropping outbound message");
        }
    }
}

/// Starts the delivery worker and returns the dispatcher feeding it.
pub fn spawn_notification_worker(config: Arc<AppConfig>) -> NotificationDispatcher {
    let (dispatcher, rx) = NotificationDispatcher::channel(config.clone());
    tokio::spawn(run_worker(config, rx));
    dispatcher
}

/// Drains the queue until every sender is dropped. Failures are logged per
/// message; the loop always moves on to the next one.
pub async fn run_worker(config: Arc<AppConfig>, mut rx: UnboundedReceiver<OutboundMessage>) {
    let client = match reqwest::Client::builder().timeout(DELIVERY_TIMEOUT).build() {
        Ok(client) => client,
        Err(err) => {
            log::error!("failed to build notification http client: {err}");
            return;
        }
    };

    while let Some(message) = rx.recv().await {
        let service = message.service();
        if let Err(err) = deliver(&client, &config, &message).await {
            log::warn!("failed to deliver {service} notification: {err}");
        }
    }
}

async fn deliver(
    client: &reqwest::Client,
    config: &AppConfig,
    message: &OutboundMessage,
) -> Result<(), DeliveryError> {
    let n = &config.notifications;
    let response = match message {
        OutboundMessage::Email(payload) => {
            client
                .post(format!("{}/send", n.email_service_url))
                .bearer_auth(&n.email_service_token)
                .json(payload)
                .send()
                .await?
        }
        OutboundMessage::Slack(payload) => {
            client
                .post(format!("{}/send", n.slack_service_url))
                .bearer_auth(&n.slack_service_token)
                .json(payload)
                .send()
                .await?
        }
    };

    let status = response.status();
    if status == reqwest::StatusCode::OK || status == reqwest::StatusCode::ACCEPTED {
        Ok(())
    } else {
        Err(DeliveryError::Rejected {
            service: message.service(),
            status: status.as_u16(),
        })
    }
}

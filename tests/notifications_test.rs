//! End-to-end checks for the notification worker against stubbed HTTP
//! delivery services.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use supportserver::core::config::{
    AppConfig, AuthConfig, DatabaseConfig, FrontendConfig, NotificationConfig, ServerConfig,
};
use supportserver::notifications::{run_worker, NotificationDispatcher};
use supportserver::tickets::models::{Ticket, TicketKind, TicketPriority, TicketStatus};

fn test_config(email_url: &str, slack_url: &str) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseConfig {
            url: "postgres://localhost/unused".into(),
            max_connections: 1,
        },
        auth: AuthConfig {
            jwt_secret: "test-secret".into(),
        },
        notifications: NotificationConfig {
            email_service_url: email_url.trim_end_matches('/').to_string(),
            email_service_token: "email-tok".into(),
            slack_service_url: slack_url.trim_end_matches('/').to_string(),
            slack_service_token: "slack-tok".into(),
            admin_emails: vec!["admin@campus.edu".into()],
            support_email: "support@campus.edu".into(),
            slack_channel: "#campus-support".into(),
            platform_name: "Campus".into(),
        },
        frontend: FrontendConfig {
            base_url: "http://localhost:3000".into(),
        },
    }
}

fn ticket() -> Ticket {
    Ticket {
        id: Uuid::new_v4(),
        ticket_number: "TKT-1700000000000123".into(),
        title: "Video will not play".into(),
        description: "Lecture 4 video stalls at 00:30".into(),
        status: TicketStatus::Open,
        priority: TicketPriority::Medium,
        kind: TicketKind::Technical,
        student_id: "stu-1".into(),
        instructor_id: None,
        course_id: None,
        category_id: None,
        metadata: serde_json::json!({ "studentEmail": "stu-1@campus.edu" }),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        resolved_at: None,
        closed_at: None,
    }
}

async fn wait_until_matched(mock: &mockito::Mock) {
    for _ in 0..200 {
        if mock.matched_async().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("delivery service was not called in time");
}

#[tokio::test]
async fn worker_delivers_created_notifications_with_bearer_tokens() {
    let mut email_server = mockito::Server::new_async().await;
    let mut slack_server = mockito::Server::new_async().await;

    let email_mock = email_server
        .mock("POST", "/send")
        .match_header("authorization", "Bearer email-tok")
        .match_header("content-type", "application/json")
        .expect(2)
        .with_status(202)
        .create_async()
        .await;
    let slack_mock = slack_server
        .mock("POST", "/send")
        .match_header("authorization", "Bearer slack-tok")
        .expect(1)
        .with_status(200)
        .create_async()
        .await;

    let config = Arc::new(test_config(&email_server.url(), &slack_server.url()));
    let (dispatcher, rx) = NotificationDispatcher::channel(config.clone());
    let worker = tokio::spawn(run_worker(config, rx));

    dispatcher.send_ticket_created_notifications(&ticket(), "stu-1@campus.edu");
    drop(dispatcher);

    wait_until_matched(&email_mock).await;
    wait_until_matched(&slack_mock).await;
    email_mock.assert_async().await;
    slack_mock.assert_async().await;

    // All senders dropped, so the worker drains and exits.
    worker.await.unwrap();
}

#[tokio::test]
async fn one_failed_delivery_does_not_block_the_queue() {
    let mut email_server = mockito::Server::new_async().await;
    let mut slack_server = mockito::Server::new_async().await;

    let email_mock = email_server
        .mock("POST", "/send")
        .expect(2)
        .with_status(500)
        .create_async()
        .await;
    let slack_mock = slack_server
        .mock("POST", "/send")
        .expect(1)
        .with_status(200)
        .create_async()
        .await;

    let config = Arc::new(test_config(&email_server.url(), &slack_server.url()));
    let (dispatcher, rx) = NotificationDispatcher::channel(config.clone());
    let worker = tokio::spawn(run_worker(config, rx));

    // Emails are rejected by the stub; the trailing Slack message must still
    // go out.
    dispatcher.send_ticket_created_notifications(&ticket(), "stu-1@campus.edu");
    drop(dispatcher);

    wait_until_matched(&slack_mock).await;
    email_mock.assert_async().await;
    slack_mock.assert_async().await;

    worker.await.unwrap();
}

#[tokio::test]
async fn completion_posts_to_slack_only() {
    let mut email_server = mockito::Server::new_async().await;
    let mut slack_server = mockito::Server::new_async().await;

    let email_mock = email_server
        .mock("POST", "/send")
        .expect(0)
        .create_async()
        .await;
    let slack_mock = slack_server
        .mock("POST", "/send")
        .match_header("authorization", "Bearer slack-tok")
        .expect(1)
        .with_status(202)
        .create_async()
        .await;

    let config = Arc::new(test_config(&email_server.url(), &slack_server.url()));
    let (dispatcher, rx) = NotificationDispatcher::channel(config.clone());
    let worker = tokio::spawn(run_worker(config, rx));

    let mut resolved = ticket();
    resolved.status = TicketStatus::Resolved;
    dispatcher.send_completion_notification(&resolved, "ins-1@campus.edu");
    drop(dispatcher);

    wait_until_matched(&slack_mock).await;
    email_mock.assert_async().await;
    slack_mock.assert_async().await;

    worker.await.unwrap();
}

//! Wire payloads for the downstream email and Slack delivery services, plus
//! the builders that fill them in for each lifecycle event.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::config::AppConfig;
use crate::tickets::models::{Ticket, TicketComment};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailNotificationRequest {
    pub to: Vec<String>,
    pub subject: String,
    pub template_id: String,
    pub template_data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackNotificationRequest {
    pub channel: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<SlackBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    pub template_data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<SlackText>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<SlackElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackText {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackElement {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
}

fn button(text: &str, value: String, action_id: &str) -> SlackElement {
    SlackElement {
        kind: "button".into(),
        text: Some(text.into()),
        value: Some(value),
        action_id: Some(action_id.into()),
    }
}

/// Email to the admin distribution list about a freshly created ticket.
pub fn new_ticket_admin_email(
    config: &AppConfig,
    ticket: &Ticket,
    student_email: &str,
) -> EmailNotificationRequest {
    let n = &config.notifications;
    EmailNotificationRequest {
        to: n.admin_emails.clone(),
        subject: format!(
            "{} Support - New Ticket #{}",
            n.platform_name, ticket.ticket_number
        ),
        template_id: "new_ticket_admin_notification".into(),
        template_data: json!({
            "ticketNumber": ticket.ticket_number,
            "ticketTitle": ticket.title,
            "ticketType": ticket.kind.as_str(),
            "priority": ticket.priority.as_str(),
            "studentEmail": student_email,
            "ticketUrl": format!("{}/admin/tickets/{}", config.frontend.base_url, ticket.id),
            "courseId": ticket.course_id,
            "platformName": n.platform_name,
            "createdAt": ticket.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }),
        reply_to: Some(student_email.to_string()),
    }
}

/// Confirmation email back to the student who opened the ticket.
pub fn ticket_created_confirmation_email(
    config: &AppConfig,
    ticket: &Ticket,
    student_email: &str,
) -> EmailNotificationRequest {
    let n = &config.notifications;
    EmailNotificationRequest {
        to: vec![student_email.to_string()],
        subject: format!(
            "{} Support - Ticket Created #{}",
            n.platform_name, ticket.ticket_number
        ),
        template_id: "ticket_created_confirmation".into(),
        template_data: json!({
            "ticketNumber": ticket.ticket_number,
            "ticketTitle": ticket.title,
            "ticketType": ticket.kind.as_str(),
            "priority": ticket.priority.as_str(),
            "ticketUrl": format!("{}/tickets/{}", config.frontend.base_url, ticket.id),
            "platformName": n.platform_name,
            "supportEmail": n.support_email,
        }),
        reply_to: None,
    }
}

/// Slack message to the support channel with view/reply buttons.
pub fn new_ticket_slack_message(
    config: &AppConfig,
    ticket: &Ticket,
    student_email: &str,
) -> SlackNotificationRequest {
    let n = &config.notifications;
    SlackNotificationRequest {
        channel: n.slack_channel.clone(),
        message: format!("New {} Support Ticket Created", n.platform_name),
        blocks: vec![
            SlackBlock {
                kind: "section".into(),
                text: Some(SlackText {
                    kind: "mrkdwn".into(),
                    text: format!(
                        "*New {} Support Ticket*\n*Ticket:* #{}\n*Title:* {}\n*Type:* {}\n*Priority:* {}\n*Student:* {}",
                        n.platform_name,
                        ticket.ticket_number,
                        ticket.title,
                        ticket.kind.as_str(),
                        ticket.priority.as_str(),
                        student_email,
                    ),
                }),
                elements: Vec::new(),
            },
            SlackBlock {
                kind: "section".into(),
                text: None,
                elements: vec![
                    button("View Ticket", ticket.id.to_string(), "view_ticket"),
                    button("Reply", ticket.id.to_string(), "reply_ticket"),
                ],
            },
        ],
        thread_ts: None,
        template_data: json!({
            "ticketId": ticket.id.to_string(),
            "ticketNumber": ticket.ticket_number,
        }),
    }
}

/// Slack message posted when a ticket is resolved.
pub fn ticket_completed_slack_message(
    config: &AppConfig,
    ticket: &Ticket,
    resolver_email: &str,
) -> SlackNotificationRequest {
    let n = &config.notifications;
    SlackNotificationRequest {
        channel: n.slack_channel.clone(),
        message: "Ticket Completed".into(),
        blocks: vec![SlackBlock {
            kind: "section".into(),
            text: Some(SlackText {
                kind: "mrkdwn".into(),
                text: format!(
                    "*Ticket Completed*\n*Ticket:* #{}\n*Title:* {}\n*Completed by:* {}\n*Status:* {}",
                    ticket.ticket_number,
                    ticket.title,
                    resolver_email,
                    ticket.status.as_str(),
                ),
            }),
            elements: Vec::new(),
        }],
        thread_ts: None,
        template_data: json!({
            "ticketId": ticket.id.to_string(),
            "ticketNumber": ticket.ticket_number,
            "status": ticket.status.as_str(),
        }),
    }
}

/// Email to the student when staff reply on their ticket.
pub fn admin_reply_email(
    config: &AppConfig,
    ticket: &Ticket,
    comment: &TicketComment,
    student_email: &str,
) -> EmailNotificationRequest {
    let n = &config.notifications;
    EmailNotificationRequest {
        to: vec![student_email.to_string()],
        subject: format!(
            "{} Support - Reply to Ticket #{}",
            n.platform_name, ticket.ticket_number
        ),
        template_id: "admin_reply_notification".into(),
        template_data: json!({
            "ticketNumber": ticket.ticket_number,
            "ticketTitle": ticket.title,
            "replyMessage": comment.content,
            "ticketUrl": format!("{}/tickets/{}", config.frontend.base_url, ticket.id),
            "platformName": n.platform_name,
        }),
        reply_to: Some(n.support_email.clone()),
    }
}

//! Ticket lifecycle engine. Owns authorization, validation, state
//! transitions, history recording and notification fan-out. Handlers stay
//! thin; everything that must hold regardless of transport lives here.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde_json::json;
use uuid::Uuid;

use crate::core::error::ServiceError;
use crate::core::middleware::{AuthenticatedUser, Role};
use crate::notifications::NotificationDispatcher;
use crate::store::{Pagination, Stores, TicketFilters};

use super::models::{
    Ticket, TicketComment, TicketDetail, TicketHistory, TicketKind, TicketPriority, TicketStatus,
};
use super::{CreateCommentRequest, CreateTicketRequest, UpdateTicketRequest};

const TICKET_NUMBER_ATTEMPTS: usize = 5;

/// Which slice of the ticket corpus a listing reads.
#[derive(Debug, Clone)]
pub enum TicketScope {
    Student(String),
    Course(String),
    Instructor(String),
}

#[derive(Clone)]
pub struct TicketLifecycle {
    stores: Arc<Stores>,
    dispatcher: NotificationDispatcher,
}

impl TicketLifecycle {
    pub fn new(stores: Arc<Stores>, dispatcher: NotificationDispatcher) -> Self {
        Self { stores, dispatcher }
    }

    pub async fn create_ticket(
        &self,
        user: &AuthenticatedUser,
        req: CreateTicketRequest,
    ) -> Result<Ticket, ServiceError> {
        let email = user.require_email()?.to_string();

        let title = req.title.trim().to_string();
        if title.is_empty() {
            return Err(ServiceError::validation("Title is required"));
        }
        let description = req.description.trim().to_string();
        if description.is_empty() {
            return Err(ServiceError::validation("Description is required"));
        }
        if let Some(category_id) = req.category_id {
            if self.stores.category.get_by_id(category_id).await?.is_none() {
                return Err(ServiceError::validation("Unknown category"));
            }
        }

        let ticket_number = self.allocate_ticket_number().await?;
        let now = Utc::now();

        // The student's address rides along in metadata so later staff
        // replies can reach them without a user-service lookup.
        let mut metadata = match req.metadata {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        metadata.insert("studentEmail".into(), json!(email));

        let ticket = Ticket {
            id: Uuid::new_v4(),
            ticket_number,
            title,
            description,
            status: TicketStatus::Open,
            priority: req.priority.unwrap_or(TicketPriority::Medium),
            kind: req.kind.unwrap_or(TicketKind::General),
            student_id: user.id.clone(),
            instructor_id: None,
            course_id: req.course_id,
            category_id: req.category_id,
            metadata: serde_json::Value::Object(metadata),
            created_at: now,
            updated_at: now,
            resolved_at: None,
            closed_at: None,
        };

        self.stores.ticket.create(&ticket).await?;
        self.record_history(
            ticket.id,
            &user.id,
            "created",
            None,
            Some(TicketStatus::Open.as_str().into()),
            "Ticket created",
        )
        .await;
        self.dispatcher
            .send_ticket_created_notifications(&ticket, &email);

        Ok(ticket)
    }

    pub async fn get_ticket(
        &self,
        user: &AuthenticatedUser,
        id: Uuid,
    ) -> Result<TicketDetail, ServiceError> {
        let ticket = self.load(id).await?;
        self.authorize_read(user, &ticket)?;
        let category = match ticket.category_id {
            Some(category_id) => self.stores.category.get_by_id(category_id).await?,
            None => None,
        };
        let comment_count = self
            .stores
            .comment
            .count_for_ticket(id, user.is_elevated())
            .await?;
        Ok(TicketDetail {
            ticket,
            category,
            comment_count,
        })
    }

    pub async fn list_tickets(
        &self,
        user: &AuthenticatedUser,
        scope: &TicketScope,
        filters: &TicketFilters,
        pagination: &Pagination,
    ) -> Result<(Vec<Ticket>, i64), ServiceError> {
        self.authorize_scope(user, scope)?;
        match scope {
            TicketScope::Student(student_id) => {
                self.stores
                    .ticket
                    .get_by_student_id(student_id, filters, pagination)
                    .await
            }
            TicketScope::Course(course_id) => {
                self.stores
                    .ticket
                    .get_by_course_id(course_id, filters, pagination)
                    .await
            }
            TicketScope::Instructor(instructor_id) => {
                self.stores
                    .ticket
                    .get_by_instructor_id(instructor_id, filters, pagination)
                    .await
            }
        }
    }

    /// Unscoped listing across every student and course.
    pub async fn list_all_tickets(
        &self,
        user: &AuthenticatedUser,
        filters: &TicketFilters,
        pagination: &Pagination,
    ) -> Result<(Vec<Ticket>, i64), ServiceError> {
        if user.role != Role::Admin {
            return Err(ServiceError::forbidden(
                "Only admins can list tickets across all users",
            ));
        }
        self.stores.ticket.list(filters, pagination).await
    }

    pub async fn update_ticket(
        &self,
        user: &AuthenticatedUser,
        id: Uuid,
        req: UpdateTicketRequest,
    ) -> Result<Ticket, ServiceError> {
        if !user.is_elevated() {
            return Err(ServiceError::forbidden(
                "Only instructors and admins can update tickets",
            ));
        }

        let mut ticket = self.load(id).await?;
        if ticket.status.is_terminal() {
            return Err(ServiceError::conflict("Ticket is already completed"));
        }

        let old_status = ticket.status;
        let now = Utc::now();

        if let Some(title) = req.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(ServiceError::validation("Title is required"));
            }
            ticket.title = title;
        }
        if let Some(description) = req.description {
            let description = description.trim().to_string();
            if description.is_empty() {
                return Err(ServiceError::validation("Description is required"));
            }
            ticket.description = description;
        }
        if let Some(priority) = req.priority {
            ticket.priority = priority;
        }
        if let Some(kind) = req.kind {
            ticket.kind = kind;
        }
        if let Some(category_id) = req.category_id {
            if self.stores.category.get_by_id(category_id).await?.is_none() {
                return Err(ServiceError::validation("Unknown category"));
            }
            ticket.category_id = Some(category_id);
        }
        if let Some(instructor_id) = req.instructor_id {
            ticket.instructor_id = Some(instructor_id);
        }
        if let Some(course_id) = req.course_id {
            ticket.course_id = Some(course_id);
        }
        // Metadata patches merge key by key so the creation-time entries
        // (the student's address among them) survive.
        if let Some(serde_json::Value::Object(patch)) = req.metadata {
            if let serde_json::Value::Object(existing) = &mut ticket.metadata {
                existing.extend(patch);
            } else {
                ticket.metadata = serde_json::Value::Object(patch);
            }
        }
        if let Some(status) = req.status {
            ticket.status = status;
            // resolved_at is non-null exactly when the ticket is resolved or
            // closed, so a straight-to-closed patch stamps it too.
            match status {
                TicketStatus::Resolved => {
                    ticket.resolved_at = ticket.resolved_at.or(Some(now));
                }
                TicketStatus::Closed => {
                    ticket.resolved_at = ticket.resolved_at.or(Some(now));
                    ticket.closed_at = Some(now);
                }
                _ => {}
            }
        }
        ticket.updated_at = now;

        self.stores.ticket.update(&ticket).await?;

        let (old_value, new_value) = if ticket.status != old_status {
            (
                Some(old_status.as_str().to_string()),
                Some(ticket.status.as_str().to_string()),
            )
        } else {
            (None, None)
        };
        self.record_history(id, &user.id, "updated", old_value, new_value, "Ticket updated")
            .await;

        Ok(ticket)
    }

    pub async fn complete_ticket(
        &self,
        user: &AuthenticatedUser,
        id: Uuid,
    ) -> Result<Ticket, ServiceError> {
        if !user.is_elevated() {
            return Err(ServiceError::forbidden(
                "Only instructors and admins can complete tickets",
            ));
        }
        let resolver_email = user.require_email()?.to_string();

        let mut ticket = self.load(id).await?;
        let old_status = ticket.status;
        if old_status.is_terminal() {
            return Err(ServiceError::conflict("Ticket is already completed"));
        }

        let now = Utc::now();
        // The store re-checks terminality inside the update, so two racing
        // completers cannot both win.
        if !self.stores.ticket.complete(id, now).await? {
            return Err(ServiceError::conflict("Ticket is already completed"));
        }

        ticket.status = TicketStatus::Resolved;
        ticket.resolved_at = Some(now);
        ticket.updated_at = now;

        self.record_history(
            id,
            &user.id,
            "completed",
            Some(old_status.as_str().into()),
            Some(TicketStatus::Resolved.as_str().into()),
            &format!("Ticket completed by {}", user.role.as_str()),
        )
        .await;
        self.dispatcher
            .send_completion_notification(&ticket, &resolver_email);

        Ok(ticket)
    }

    pub async fn reopen_ticket(
        &self,
        user: &AuthenticatedUser,
        id: Uuid,
    ) -> Result<Ticket, ServiceError> {
        if user.role != Role::Admin {
            return Err(ServiceError::forbidden("Only admins can reopen tickets"));
        }

        let mut ticket = self.load(id).await?;
        let old_status = ticket.status;
        if !old_status.is_terminal() {
            return Err(ServiceError::conflict("Ticket is not completed"));
        }

        let now = Utc::now();
        self.stores.ticket.reopen(id, now).await?;

        ticket.status = TicketStatus::Open;
        ticket.resolved_at = None;
        ticket.closed_at = None;
        ticket.updated_at = now;

        self.record_history(
            id,
            &user.id,
            "reopened",
            Some(old_status.as_str().into()),
            Some(TicketStatus::Open.as_str().into()),
            "Ticket reopened",
        )
        .await;

        Ok(ticket)
    }

    pub async fn assign_ticket(
        &self,
        user: &AuthenticatedUser,
        id: Uuid,
        instructor_id: &str,
    ) -> Result<Ticket, ServiceError> {
        if !user.is_elevated() {
            return Err(ServiceError::forbidden(
                "Only instructors and admins can assign tickets",
            ));
        }
        if instructor_id.trim().is_empty() {
            return Err(ServiceError::validation("Instructor ID is required"));
        }

        let mut ticket = self.load(id).await?;
        if ticket.status.is_terminal() {
            return Err(ServiceError::conflict("Ticket is already completed"));
        }

        let now = Utc::now();
        let previous = ticket.instructor_id.clone();
        self.stores
            .ticket
            .assign_instructor(id, instructor_id, now)
            .await?;

        ticket.instructor_id = Some(instructor_id.to_string());
        ticket.updated_at = now;

        self.record_history(
            id,
            &user.id,
            "assigned",
            previous,
            Some(instructor_id.to_string()),
            "Ticket assigned",
        )
        .await;

        Ok(ticket)
    }

    pub async fn delete_ticket(
        &self,
        user: &AuthenticatedUser,
        id: Uuid,
    ) -> Result<(), ServiceError> {
        if user.role != Role::Admin {
            return Err(ServiceError::forbidden("Only admins can delete tickets"));
        }
        self.load(id).await?;
        self.stores.attachment.delete_by_ticket_id(id).await?;
        self.stores.ticket.delete(id).await?;
        Ok(())
    }

    pub async fn add_comment(
        &self,
        user: &AuthenticatedUser,
        ticket_id: Uuid,
        req: CreateCommentRequest,
    ) -> Result<TicketComment, ServiceError> {
        let ticket = self.load(ticket_id).await?;
        self.authorize_read(user, &ticket)?;

        let content = req.content.trim().to_string();
        if content.is_empty() {
            return Err(ServiceError::validation("Comment content is required"));
        }
        let is_internal = req.is_internal.unwrap_or(false);
        if is_internal && !user.is_elevated() {
            return Err(ServiceError::forbidden(
                "Only instructors and admins can add internal comments",
            ));
        }

        let now = Utc::now();
        let comment = TicketComment {
            id: Uuid::new_v4(),
            ticket_id,
            author_id: user.id.clone(),
            content,
            is_internal,
            metadata: req.metadata.unwrap_or_else(|| json!({})),
            created_at: now,
            updated_at: now,
        };

        self.stores.comment.create(&comment).await?;
        self.stores.ticket.touch(ticket_id, now).await?;
        self.record_history(ticket_id, &user.id, "commented", None, None, "Comment added")
            .await;

        if user.is_elevated() && !is_internal {
            if let Some(student_email) =
                ticket.metadata.get("studentEmail").and_then(|v| v.as_str())
            {
                self.dispatcher
                    .send_admin_reply_notification(&ticket, &comment, student_email);
            }
        }

        Ok(comment)
    }

    pub async fn update_comment(
        &self,
        user: &AuthenticatedUser,
        comment_id: Uuid,
        content: &str,
    ) -> Result<TicketComment, ServiceError> {
        let mut comment = self
            .stores
            .comment
            .get_by_id(comment_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Comment not found"))?;
        if comment.author_id != user.id && user.role != Role::Admin {
            return Err(ServiceError::forbidden(
                "Only the author can edit a comment",
            ));
        }
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(ServiceError::validation("Comment content is required"));
        }
        comment.content = content;
        comment.updated_at = Utc::now();
        self.stores.comment.update(&comment).await?;
        Ok(comment)
    }

    pub async fn delete_comment(
        &self,
        user: &AuthenticatedUser,
        comment_id: Uuid,
    ) -> Result<(), ServiceError> {
        let comment = self
            .stores
            .comment
            .get_by_id(comment_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Comment not found"))?;
        if comment.author_id != user.id && user.role != Role::Admin {
            return Err(ServiceError::forbidden(
                "Only the author can delete a comment",
            ));
        }
        self.stores.attachment.delete_by_comment_id(comment_id).await?;
        self.stores.comment.delete(comment_id).await?;
        Ok(())
    }

    pub async fn list_comments(
        &self,
        user: &AuthenticatedUser,
        ticket_id: Uuid,
    ) -> Result<Vec<TicketComment>, ServiceError> {
        let ticket = self.load(ticket_id).await?;
        self.authorize_read(user, &ticket)?;
        self.stores
            .comment
            .get_by_ticket_id(ticket_id, user.is_elevated())
            .await
    }

    pub async fn ticket_history(
        &self,
        user: &AuthenticatedUser,
        ticket_id: Uuid,
        action: Option<&str>,
    ) -> Result<Vec<TicketHistory>, ServiceError> {
        if !user.is_elevated() {
            return Err(ServiceError::forbidden(
                "Only instructors and admins can view ticket history",
            ));
        }
        self.load(ticket_id).await?;
        match action {
            Some(_) => {
                self.stores
                    .history
                    .get_change_history(ticket_id, action)
                    .await
            }
            None => self.stores.history.get_by_ticket_id(ticket_id).await,
        }
    }

    async fn load(&self, id: Uuid) -> Result<Ticket, ServiceError> {
        self.stores
            .ticket
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Ticket not found"))
    }

    fn authorize_read(
        &self,
        user: &AuthenticatedUser,
        ticket: &Ticket,
    ) -> Result<(), ServiceError> {
        if user.is_elevated() || ticket.student_id == user.id {
            Ok(())
        } else {
            Err(ServiceError::forbidden("Access denied"))
        }
    }

    fn authorize_scope(
        &self,
        user: &AuthenticatedUser,
        scope: &TicketScope,
    ) -> Result<(), ServiceError> {
        match scope {
            TicketScope::Student(student_id) => {
                if user.is_elevated() || user.id == *student_id {
                    Ok(())
                } else {
                    Err(ServiceError::forbidden("Access denied"))
                }
            }
            TicketScope::Course(_) => {
                if user.is_elevated() {
                    Ok(())
                } else {
                    Err(ServiceError::forbidden(
                        "Only instructors and admins can list course tickets",
                    ))
                }
            }
            TicketScope::Instructor(instructor_id) => {
                if !user.is_elevated() {
                    return Err(ServiceError::forbidden(
                        "Only instructors and admins can list instructor tickets",
                    ));
                }
                if user.role != Role::Admin && user.id != *instructor_id {
                    return Err(ServiceError::forbidden("Access denied"));
                }
                Ok(())
            }
        }
    }

    /// Time-derived candidate plus a random suffix; re-rolled on collision.
    async fn allocate_ticket_number(&self) -> Result<String, ServiceError> {
        for _ in 0..TICKET_NUMBER_ATTEMPTS {
            let candidate = format!(
                "TKT-{}{:03}",
                Utc::now().timestamp_millis(),
                rand::thread_rng().gen_range(0..1000)
            );
            if self
                .stores
                .ticket
                .get_by_ticket_number(&candidate)
                .await?
                .is_none()
            {
                return Ok(candidate);
            }
        }
        Err(ServiceError::Persistence(
            "could not allocate a unique ticket number".into(),
        ))
    }

    /// History is best effort relative to the operation that triggered it. A
    /// failed append is logged, never surfaced to the caller.
    async fn record_history(
        &self,
        ticket_id: Uuid,
        actor_id: &str,
        action: &str,
        old_value: Option<String>,
        new_value: Option<String>,
        description: &str,
    ) {
        let entry = TicketHistory {
            id: Uuid::new_v4(),
            ticket_id,
            actor_id: actor_id.to_string(),
            action: action.to_string(),
            old_value,
            new_value,
            description: Some(description.to_string()),
            metadata: json!({}),
            created_at: Utc::now(),
        };
        if let Err(err) = self.stores.history.create(&entry).await {
            log::warn!("failed to record history for ticket {ticket_id}: {err}");
        }
    }
}

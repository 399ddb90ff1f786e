//! File attachments. Files live in external object storage; only their
//! metadata and URL are recorded here. An attachment hangs off exactly one
//! parent, a ticket or a comment.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::ServiceError;
use crate::core::middleware::AuthenticatedUser;
use crate::core::schema::attachments;
use crate::core::state::AppState;
use crate::tickets::models::Ticket;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = attachments)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
    pub file_name: String,
    pub file_url: String,
    pub file_type: Option<String>,
    pub uploaded_by: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttachmentRequest {
    pub ticket_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
    pub file_name: String,
    pub file_url: String,
    pub file_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

fn authorize_ticket_access(user: &AuthenticatedUser, ticket: &Ticket) -> Result<(), ServiceError> {
    if user.is_elevated() || ticket.student_id == user.id {
        Ok(())
    } else {
        Err(ServiceError::forbidden("Access denied"))
    }
}

async fn create_attachment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateAttachmentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    if req.file_name.trim().is_empty() || req.file_url.trim().is_empty() {
        return Err(ServiceError::validation("File name and URL are required"));
    }

    // Exactly one parent.
    let ticket_id = match (req.ticket_id, req.comment_id) {
        (Some(ticket_id), None) => ticket_id,
        (None, Some(comment_id)) => {
            let comment = state
                .stores
                .comment
                .get_by_id(comment_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Comment not found"))?;
            comment.ticket_id
        }
        _ => {
            return Err(ServiceError::validation(
                "Attachment must reference a ticket or a comment, not both",
            ))
        }
    };

    let ticket = state
        .stores
        .ticket
        .get_by_id(ticket_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Ticket not found"))?;
    authorize_ticket_access(&user, &ticket)?;

    let attachment = Attachment {
        id: Uuid::new_v4(),
        ticket_id: req.ticket_id,
        comment_id: req.comment_id,
        file_name: req.file_name,
        file_url: req.file_url,
        file_type: req.file_type,
        uploaded_by: user.id.clone(),
        metadata: req.metadata.unwrap_or_else(|| serde_json::json!({})),
        created_at: Utc::now(),
    };
    state.stores.attachment.create(&attachment).await?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

async fn list_ticket_attachments(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(ticket_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let ticket = state
        .stores
        .ticket
        .get_by_id(ticket_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Ticket not found"))?;
    authorize_ticket_access(&user, &ticket)?;

    let attachments = state.stores.attachment.get_by_ticket_id(ticket_id).await?;
    Ok(Json(attachments))
}

async fn list_comment_attachments(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(comment_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let comment = state
        .stores
        .comment
        .get_by_id(comment_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Comment not found"))?;
    let ticket = state
        .stores
        .ticket
        .get_by_id(comment.ticket_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Ticket not found"))?;
    authorize_ticket_access(&user, &ticket)?;

    let attachments = state
        .stores
        .attachment
        .get_by_comment_id(comment_id)
        .await?;
    Ok(Json(attachments))
}

async fn delete_attachment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let attachment = state
        .stores
        .attachment
        .get_by_id(id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Attachment not found"))?;

    if attachment.uploaded_by != user.id && !user.is_elevated() {
        return Err(ServiceError::forbidden("Access denied"));
    }

    state.stores.attachment.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_attachments_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/attachments", post(create_attachment))
        .route("/attachments/:id", delete(delete_attachment))
        .route("/tickets/:id/attachments", get(list_ticket_attachments))
        .route("/comments/:id/attachments", get(list_comment_attachments))
}

//! Ticket HTTP surface. Handlers translate between the wire and the
//! lifecycle engine and hold no business rules of their own.

pub mod engine;
pub mod models;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::ServiceError;
use crate::core::middleware::{AuthenticatedUser, Role};
use crate::core::state::AppState;
use crate::store::{OrderBy, OrderDir, Pagination, TicketFilters};

use engine::TicketScope;
use models::{TicketKind, TicketPriority, TicketStatus};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: String,
    pub priority: Option<TicketPriority>,
    #[serde(rename = "type")]
    pub kind: Option<TicketKind>,
    pub course_id: Option<String>,
    pub category_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    #[serde(rename = "type")]
    pub kind: Option<TicketKind>,
    pub instructor_id: Option<String>,
    pub course_id: Option<String>,
    pub category_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTicketRequest {
    pub instructor_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub content: String,
    pub is_internal: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommentRequest {
    pub content: String,
}

/// Listing parameters. Unknown enum values are a validation error; unknown
/// order fields silently fall back to the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTicketsQuery {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub instructor_id: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    pub from_date: Option<chrono::DateTime<chrono::Utc>>,
    pub to_date: Option<chrono::DateTime<chrono::Utc>>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub order_by: Option<String>,
    pub order_dir: Option<String>,
}

impl ListTicketsQuery {
    fn filters(&self) -> Result<TicketFilters, ServiceError> {
        Ok(TicketFilters {
            status: self
                .status
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(ServiceError::validation)?,
            priority: self
                .priority
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(ServiceError::validation)?,
            kind: self
                .kind
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(ServiceError::validation)?,
            category_id: self.category_id,
            course_id: self.course_id.clone(),
            instructor_id: self.instructor_id.clone(),
            search: self.search.clone().filter(|s| !s.trim().is_empty()),
            from_date: self.from_date,
            to_date: self.to_date,
        })
    }

    fn pagination(&self) -> Pagination {
        let defaults = Pagination::default();
        Pagination {
            page: self.page.unwrap_or(defaults.page).max(1),
            page_size: self.page_size.unwrap_or(defaults.page_size).max(0),
            order_by: self
                .order_by
                .as_deref()
                .map(OrderBy::parse)
                .unwrap_or(defaults.order_by),
            order_dir: self
                .order_dir
                .as_deref()
                .map(OrderDir::parse)
                .unwrap_or(defaults.order_dir),
        }
    }

    /// Explicit scope parameters win; without one, students fall back to
    /// their own tickets and admins to the unscoped listing.
    fn scope(&self, user: &AuthenticatedUser) -> Option<TicketScope> {
        if let Some(student_id) = &self.student_id {
            return Some(TicketScope::Student(student_id.clone()));
        }
        if let Some(course_id) = &self.course_id {
            return Some(TicketScope::Course(course_id.clone()));
        }
        if let Some(instructor_id) = &self.instructor_id {
            return Some(TicketScope::Instructor(instructor_id.clone()));
        }
        if user.role == Role::Admin {
            None
        } else {
            Some(TicketScope::Student(user.id.clone()))
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub action: Option<String>,
}

async fn create_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateTicketRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let ticket = state.engine.create_ticket(&user, req).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn get_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.engine.get_ticket(&user, id).await?;
    Ok(Json(detail))
}

async fn list_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListTicketsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let filters = query.filters()?;
    let pagination = query.pagination();

    let (items, total) = match query.scope(&user) {
        Some(scope) => {
            state
                .engine
                .list_tickets(&user, &scope, &filters, &pagination)
                .await?
        }
        None => {
            state
                .engine
                .list_all_tickets(&user, &filters, &pagination)
                .await?
        }
    };

    Ok(Json(json!({
        "items": items,
        "total": total,
        "page": pagination.page,
        "pageSize": pagination.page_size,
    })))
}

/// Staff queue. Admins may pass `instructorId` to inspect another queue;
/// instructors always get their own.
async fn list_instructor_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListTicketsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let filters = query.filters()?;
    let pagination = query.pagination();
    let instructor_id = query.instructor_id.clone().unwrap_or_else(|| user.id.clone());
    let scope = TicketScope::Instructor(instructor_id);

    let (items, total) = state
        .engine
        .list_tickets(&user, &scope, &filters, &pagination)
        .await?;
    Ok(Json(json!({
        "items": items,
        "total": total,
        "page": pagination.page,
        "pageSize": pagination.page_size,
    })))
}

async fn list_course_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(course_id): Path<String>,
    Query(query): Query<ListTicketsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let filters = query.filters()?;
    let pagination = query.pagination();
    let scope = TicketScope::Course(course_id);

    let (items, total) = state
        .engine
        .list_tickets(&user, &scope, &filters, &pagination)
        .await?;
    Ok(Json(json!({
        "items": items,
        "total": total,
        "page": pagination.page,
        "pageSize": pagination.page_size,
    })))
}

async fn update_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let ticket = state.engine.update_ticket(&user, id, req).await?;
    Ok(Json(ticket))
}

async fn complete_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let ticket = state.engine.complete_ticket(&user, id).await?;
    Ok(Json(json!({
        "message": "Ticket completed successfully",
        "ticket": ticket,
    })))
}

async fn reopen_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let ticket = state.engine.reopen_ticket(&user, id).await?;
    Ok(Json(ticket))
}

async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignTicketRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let ticket = state
        .engine
        .assign_ticket(&user, id, &req.instructor_id)
        .await?;
    Ok(Json(ticket))
}

async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.engine.delete_ticket(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_comment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let comment = state.engine.add_comment(&user, id, req).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn list_comments(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let comments = state.engine.list_comments(&user, id).await?;
    Ok(Json(comments))
}

async fn update_comment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let comment = state.engine.update_comment(&user, id, &req.content).await?;
    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.engine.delete_comment(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ticket_history(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let entries = state
        .engine
        .ticket_history(&user, id, query.action.as_deref())
        .await?;
    Ok(Json(entries))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tickets", post(create_ticket).get(list_tickets))
        .route("/tickets/:id", get(get_ticket).delete(delete_ticket))
        .route("/tickets/:id/complete", post(complete_ticket))
        .route(
            "/tickets/:id/comments",
            post(add_comment).get(list_comments),
        )
        .route("/tickets/:id/history", get(ticket_history))
        .route("/comments/:id", put(update_comment).delete(delete_comment))
        .route("/instructor/tickets", get(list_instructor_tickets))
        .route("/instructor/tickets/:id", put(update_ticket))
        .route("/instructor/tickets/:id/assign", post(assign_ticket))
        .route("/instructor/tickets/:id/reopen", post(reopen_ticket))
        .route("/courses/:course_id/tickets", get(list_course_tickets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_rejects_unknown_status() {
        let query = ListTicketsQuery {
            status: Some("escalated".into()),
            ..Default::default()
        };
        assert!(matches!(
            query.filters(),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn list_query_defaults_to_first_page() {
        let query = ListTicketsQuery::default();
        let pagination = query.pagination();
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.page_size, 10);
        assert_eq!(pagination.order_by, OrderBy::CreatedAt);
        assert_eq!(pagination.order_dir, OrderDir::Desc);
    }

    #[test]
    fn scope_defaults_to_self_for_students() {
        let query = ListTicketsQuery::default();
        let user = AuthenticatedUser {
            id: "stu-1".into(),
            email: None,
            role: Role::Student,
        };
        assert!(matches!(
            query.scope(&user),
            Some(TicketScope::Student(id)) if id == "stu-1"
        ));

        let admin = AuthenticatedUser {
            id: "adm-1".into(),
            email: None,
            role: Role::Admin,
        };
        assert!(query.scope(&admin).is_none());
    }
}

//! Persistence contracts for tickets, comments, categories, attachments and
//! history, plus the filter/pagination model shared by every listing.
//!
//! Read-by-id returns `Ok(None)` when the row is absent; every other failure
//! is a persistence error. Filters compose conjunctively: an absent field
//! contributes no predicate at all.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::attachments::Attachment;
use crate::categories::Category;
use crate::core::error::ServiceError;
use crate::core::state::DbPool;
use crate::tickets::models::{
    Ticket, TicketComment, TicketHistory, TicketKind, TicketPriority, TicketStatus,
};

/// Optional, independently combinable ticket predicates. The free-text search
/// matches ticket number, title or description, case-insensitive substring.
#[derive(Debug, Clone, Default)]
pub struct TicketFilters {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub kind: Option<TicketKind>,
    pub category_id: Option<Uuid>,
    pub course_id: Option<String>,
    pub instructor_id: Option<String>,
    pub search: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

/// Sortable columns. Anything outside this allow-list falls back to
/// `created_at`, so an unchecked field name can never reach the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    CreatedAt,
    UpdatedAt,
    Priority,
    Status,
    TicketNumber,
}

impl OrderBy {
    pub fn parse(value: &str) -> Self {
        match value {
            "updatedAt" | "updated_at" => OrderBy::UpdatedAt,
            "priority" => OrderBy::Priority,
            "status" => OrderBy::Status,
            "ticketNumber" | "ticket_number" => OrderBy::TicketNumber,
            _ => OrderBy::CreatedAt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDir {
    Asc,
    Desc,
}

impl OrderDir {
    /// Invalid values are ignored in favor of the default, never an error.
    pub fn parse(value: &str) -> Self {
        match value {
            "ASC" | "asc" => OrderDir::Asc,
            _ => OrderDir::Desc,
        }
    }
}

/// 1-indexed pagination. A page size of 0 means unbounded.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
    pub order_by: OrderBy,
    pub order_dir: OrderDir,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
            order_by: OrderBy::CreatedAt,
            order_dir: OrderDir::Desc,
        }
    }
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.page_size
    }
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn create(&self, ticket: &Ticket) -> Result<(), ServiceError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Ticket>, ServiceError>;
    async fn get_by_ticket_number(&self, number: &str) -> Result<Option<Ticket>, ServiceError>;
    async fn get_by_student_id(
        &self,
        student_id: &str,
        filters: &TicketFilters,
        pagination: &Pagination,
    ) -> Result<(Vec<Ticket>, i64), ServiceError>;
    async fn get_by_course_id(
        &self,
        course_id: &str,
        filters: &TicketFilters,
        pagination: &Pagination,
    ) -> Result<(Vec<Ticket>, i64), ServiceError>;
    async fn get_by_instructor_id(
        &self,
        instructor_id: &str,
        filters: &TicketFilters,
        pagination: &Pagination,
    ) -> Result<(Vec<Ticket>, i64), ServiceError>;
    /// Unscoped listing. The count reflects the filtered set before
    /// pagination is applied.
    async fn list(
        &self,
        filters: &TicketFilters,
        pagination: &Pagination,
    ) -> Result<(Vec<Ticket>, i64), ServiceError>;
    async fn update(&self, ticket: &Ticket) -> Result<(), ServiceError>;
    /// Resolve the ticket unless it is already terminal. The guard lives in
    /// the update itself; `false` means another writer got there first (or the
    /// ticket was already resolved/closed).
    async fn complete(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, ServiceError>;
    /// Administrative reopen: back to `open`, resolution timestamps cleared.
    async fn reopen(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), ServiceError>;
    async fn assign_instructor(
        &self,
        id: Uuid,
        instructor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError>;
    /// Refresh `updated_at` only (e.g. when a comment lands).
    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), ServiceError>;
    async fn delete(&self, id: Uuid) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn create(&self, comment: &TicketComment) -> Result<(), ServiceError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<TicketComment>, ServiceError>;
    /// Internal comments are only returned when `include_internal` is set.
    async fn get_by_ticket_id(
        &self,
        ticket_id: Uuid,
        include_internal: bool,
    ) -> Result<Vec<TicketComment>, ServiceError>;
    async fn update(&self, comment: &TicketComment) -> Result<(), ServiceError>;
    async fn delete(&self, id: Uuid) -> Result<(), ServiceError>;
    async fn count_for_ticket(
        &self,
        ticket_id: Uuid,
        include_internal: bool,
    ) -> Result<i64, ServiceError>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn create(&self, category: &Category) -> Result<(), ServiceError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Category>, ServiceError>;
    async fn get_all(&self, active_only: bool) -> Result<Vec<Category>, ServiceError>;
    async fn update(&self, category: &Category) -> Result<(), ServiceError>;
    /// Categories are never hard-deleted; retiring one deactivates it so
    /// existing tickets keep their label.
    async fn set_active(&self, id: Uuid, is_active: bool) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn create(&self, attachment: &Attachment) -> Result<(), ServiceError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Attachment>, ServiceError>;
    async fn get_by_ticket_id(&self, ticket_id: Uuid) -> Result<Vec<Attachment>, ServiceError>;
    async fn get_by_comment_id(&self, comment_id: Uuid) -> Result<Vec<Attachment>, ServiceError>;
    async fn delete(&self, id: Uuid) -> Result<(), ServiceError>;
    async fn delete_by_ticket_id(&self, ticket_id: Uuid) -> Result<(), ServiceError>;
    async fn delete_by_comment_id(&self, comment_id: Uuid) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn create(&self, entry: &TicketHistory) -> Result<(), ServiceError>;
    async fn get_by_ticket_id(&self, ticket_id: Uuid) -> Result<Vec<TicketHistory>, ServiceError>;
    async fn get_change_history(
        &self,
        ticket_id: Uuid,
        action: Option<&str>,
    ) -> Result<Vec<TicketHistory>, ServiceError>;
}

/// The full persistence surface, injected into the lifecycle engine.
pub struct Stores {
    pub ticket: Arc<dyn TicketStore>,
    pub comment: Arc<dyn CommentStore>,
    pub category: Arc<dyn CategoryStore>,
    pub attachment: Arc<dyn AttachmentStore>,
    pub history: Arc<dyn HistoryStore>,
}

impl Stores {
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            ticket: Arc::new(postgres::PgTicketStore::new(pool.clone())),
            comment: Arc::new(postgres::PgCommentStore::new(pool.clone())),
            category: Arc::new(postgres::PgCategoryStore::new(pool.clone())),
            attachment: Arc::new(postgres::PgAttachmentStore::new(pool.clone())),
            history: Arc::new(postgres::PgHistoryStore::new(pool)),
        }
    }
}

//! Diesel-backed stores. Optional filters are applied structurally to boxed
//! queries; an absent filter never reaches the query at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use uuid::Uuid;

use crate::attachments::Attachment;
use crate::categories::Category;
use crate::core::error::ServiceError;
use crate::core::schema::{attachments, categories, ticket_comments, ticket_history, tickets};
use crate::core::state::DbPool;
use crate::tickets::models::{Ticket, TicketComment, TicketHistory, TicketStatus};

use super::{
    AttachmentStore, CategoryStore, CommentStore, HistoryStore, OrderBy, OrderDir, Pagination,
    TicketFilters, TicketStore,
};

/// Appends one predicate per present filter field. Works on any boxable
/// query over the tickets table (row selects and count selects alike).
macro_rules! apply_ticket_filters {
    ($query:expr, $f:expr) => {{
        let mut q = $query.into_boxed();
        if let Some(status) = $f.status {
            q = q.filter(tickets::status.eq(status));
        }
        if let Some(priority) = $f.priority {
            q = q.filter(tickets::priority.eq(priority));
        }
        if let Some(kind) = $f.kind {
            q = q.filter(tickets::kind.eq(kind));
        }
        if let Some(category_id) = $f.category_id {
            q = q.filter(tickets::category_id.eq(category_id));
        }
        if let Some(course_id) = &$f.course_id {
            q = q.filter(tickets::course_id.eq(course_id.clone()));
        }
        if let Some(instructor_id) = &$f.instructor_id {
            q = q.filter(tickets::instructor_id.eq(instructor_id.clone()));
        }
        if let Some(search) = &$f.search {
            let pattern = format!("%{search}%");
            q = q.filter(
                tickets::ticket_number
                    .ilike(pattern.clone())
                    .or(tickets::title.ilike(pattern.clone()))
                    .or(tickets::description.ilike(pattern)),
            );
        }
        if let Some(from) = $f.from_date {
            q = q.filter(tickets::created_at.ge(from));
        }
        if let Some(to) = $f.to_date {
            q = q.filter(tickets::created_at.le(to));
        }
        q
    }};
}

fn apply_order<'a>(
    q: tickets::BoxedQuery<'a, Pg>,
    pagination: &Pagination,
) -> tickets::BoxedQuery<'a, Pg> {
    match (pagination.order_by, pagination.order_dir) {
        (OrderBy::CreatedAt, OrderDir::Asc) => q.order(tickets::created_at.asc()),
        (OrderBy::CreatedAt, OrderDir::Desc) => q.order(tickets::created_at.desc()),
        (OrderBy::UpdatedAt, OrderDir::Asc) => q.order(tickets::updated_at.asc()),
        (OrderBy::UpdatedAt, OrderDir::Desc) => q.order(tickets::updated_at.desc()),
        (OrderBy::Priority, OrderDir::Asc) => q.order(tickets::priority.asc()),
        (OrderBy::Priority, OrderDir::Desc) => q.order(tickets::priority.desc()),
        (OrderBy::Status, OrderDir::Asc) => q.order(tickets::status.asc()),
        (OrderBy::Status, OrderDir::Desc) => q.order(tickets::status.desc()),
        (OrderBy::TicketNumber, OrderDir::Asc) => q.order(tickets::ticket_number.asc()),
        (OrderBy::TicketNumber, OrderDir::Desc) => q.order(tickets::ticket_number.desc()),
    }
}

pub struct PgTicketStore {
    pool: DbPool,
}

impl PgTicketStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn create(&self, ticket: &Ticket) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(tickets::table)
            .values(ticket)
            .execute(&mut conn)?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Ticket>, ServiceError> {
        let mut conn = self.pool.get()?;
        Ok(tickets::table
            .find(id)
            .first::<Ticket>(&mut conn)
            .optional()?)
    }

    async fn get_by_ticket_number(&self, number: &str) -> Result<Option<Ticket>, ServiceError> {
        let mut conn = self.pool.get()?;
        Ok(tickets::table
            .filter(tickets::ticket_number.eq(number))
            .first::<Ticket>(&mut conn)
            .optional()?)
    }

    async fn get_by_student_id(
        &self,
        student_id: &str,
        filters: &TicketFilters,
        pagination: &Pagination,
    ) -> Result<(Vec<Ticket>, i64), ServiceError> {
        let mut conn = self.pool.get()?;

        let total: i64 = apply_ticket_filters!(
            tickets::table
                .filter(tickets::student_id.eq(student_id.to_string()))
                .select(count_star()),
            filters
        )
        .first(&mut conn)?;

        let mut q = apply_ticket_filters!(
            tickets::table.filter(tickets::student_id.eq(student_id.to_string())),
            filters
        );
        q = apply_order(q, pagination);
        if pagination.page_size > 0 {
            q = q.limit(pagination.page_size).offset(pagination.offset());
        }
        let items = q.load::<Ticket>(&mut conn)?;
        Ok((items, total))
    }

    async fn get_by_course_id(
        &self,
        course_id: &str,
        filters: &TicketFilters,
        pagination: &Pagination,
    ) -> Result<(Vec<Ticket>, i64), ServiceError> {
        let mut conn = self.pool.get()?;

        let total: i64 = apply_ticket_filters!(
            tickets::table
                .filter(tickets::course_id.eq(course_id.to_string()))
                .select(count_star()),
            filters
        )
        .first(&mut conn)?;

        let mut q = apply_ticket_filters!(
            tickets::table.filter(tickets::course_id.eq(course_id.to_string())),
            filters
        );
        q = apply_order(q, pagination);
        if pagination.page_size > 0 {
            q = q.limit(pagination.page_size).offset(pagination.offset());
        }
        let items = q.load::<Ticket>(&mut conn)?;
        Ok((items, total))
    }

    async fn get_by_instructor_id(
        &self,
        instructor_id: &str,
        filters: &TicketFilters,
        pagination: &Pagination,
    ) -> Result<(Vec<Ticket>, i64), ServiceError> {
        let mut conn = self.pool.get()?;

        let total: i64 = apply_ticket_filters!(
            tickets::table
                .filter(tickets::instructor_id.eq(instructor_id.to_string()))
                .select(count_star()),
            filters
        )
        .first(&mut conn)?;

        let mut q = apply_ticket_filters!(
            tickets::table.filter(tickets::instructor_id.eq(instructor_id.to_string())),
            filters
        );
        q = apply_order(q, pagination);
        if pagination.page_size > 0 {
            q = q.limit(pagination.page_size).offset(pagination.offset());
        }
        let items = q.load::<Ticket>(&mut conn)?;
        Ok((items, total))
    }

    async fn list(
        &self,
        filters: &TicketFilters,
        pagination: &Pagination,
    ) -> Result<(Vec<Ticket>, i64), ServiceError> {
        let mut conn = self.pool.get()?;

        let total: i64 =
            apply_ticket_filters!(tickets::table.select(count_star()), filters).first(&mut conn)?;

        let mut q = apply_ticket_filters!(tickets::table, filters);
        q = apply_order(q, pagination);
        if pagination.page_size > 0 {
            q = q.limit(pagination.page_size).offset(pagination.offset());
        }
        let items = q.load::<Ticket>(&mut conn)?;
        Ok((items, total))
    }

    async fn update(&self, ticket: &Ticket) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::update(tickets::table.find(ticket.id))
            .set((
                tickets::title.eq(ticket.title.clone()),
                tickets::description.eq(ticket.description.clone()),
                tickets::status.eq(ticket.status),
                tickets::priority.eq(ticket.priority),
                tickets::kind.eq(ticket.kind),
                tickets::instructor_id.eq(ticket.instructor_id.clone()),
                tickets::course_id.eq(ticket.course_id.clone()),
                tickets::category_id.eq(ticket.category_id),
                tickets::metadata.eq(ticket.metadata.clone()),
                tickets::updated_at.eq(ticket.updated_at),
                tickets::resolved_at.eq(ticket.resolved_at),
                tickets::closed_at.eq(ticket.closed_at),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn complete(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, ServiceError> {
        let mut conn = self.pool.get()?;
        // Terminal guard enforced by the update itself, not a prior read.
        let updated = diesel::update(
            tickets::table
                .find(id)
                .filter(tickets::status.ne(TicketStatus::Resolved))
                .filter(tickets::status.ne(TicketStatus::Closed)),
        )
        .set((
            tickets::status.eq(TicketStatus::Resolved),
            tickets::resolved_at.eq(Some(now)),
            tickets::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
        Ok(updated > 0)
    }

    async fn reopen(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::update(tickets::table.find(id))
            .set((
                tickets::status.eq(TicketStatus::Open),
                tickets::resolved_at.eq(None::<DateTime<Utc>>),
                tickets::closed_at.eq(None::<DateTime<Utc>>),
                tickets::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn assign_instructor(
        &self,
        id: Uuid,
        instructor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::update(tickets::table.find(id))
            .set((
                tickets::instructor_id.eq(Some(instructor_id.to_string())),
                tickets::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::update(tickets::table.find(id))
            .set(tickets::updated_at.eq(now))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::delete(tickets::table.find(id)).execute(&mut conn)?;
        Ok(())
    }
}

pub struct PgCommentStore {
    pool: DbPool,
}

impl PgCommentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommentStore for PgCommentStore {
    async fn create(&self, comment: &TicketComment) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(ticket_comments::table)
            .values(comment)
            .execute(&mut conn)?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<TicketComment>, ServiceError> {
        let mut conn = self.pool.get()?;
        Ok(ticket_comments::table
            .find(id)
            .first::<TicketComment>(&mut conn)
            .optional()?)
    }

    async fn get_by_ticket_id(
        &self,
        ticket_id: Uuid,
        include_internal: bool,
    ) -> Result<Vec<TicketComment>, ServiceError> {
        let mut conn = self.pool.get()?;
        let mut q = ticket_comments::table
            .filter(ticket_comments::ticket_id.eq(ticket_id))
            .into_boxed();
        if !include_internal {
            q = q.filter(ticket_comments::is_internal.eq(false));
        }
        Ok(q.order(ticket_comments::created_at.asc())
            .load::<TicketComment>(&mut conn)?)
    }

    async fn update(&self, comment: &TicketComment) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::update(ticket_comments::table.find(comment.id))
            .set((
                ticket_comments::content.eq(comment.content.clone()),
                ticket_comments::metadata.eq(comment.metadata.clone()),
                ticket_comments::updated_at.eq(comment.updated_at),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::delete(ticket_comments::table.find(id)).execute(&mut conn)?;
        Ok(())
    }

    async fn count_for_ticket(
        &self,
        ticket_id: Uuid,
        include_internal: bool,
    ) -> Result<i64, ServiceError> {
        let mut conn = self.pool.get()?;
        let mut q = ticket_comments::table
            .filter(ticket_comments::ticket_id.eq(ticket_id))
            .select(count_star())
            .into_boxed();
        if !include_internal {
            q = q.filter(ticket_comments::is_internal.eq(false));
        }
        Ok(q.first(&mut conn)?)
    }
}

pub struct PgCategoryStore {
    pool: DbPool,
}

impl PgCategoryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CategoryStore for PgCategoryStore {
    async fn create(&self, category: &Category) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(categories::table)
            .values(category)
            .execute(&mut conn)?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Category>, ServiceError> {
        let mut conn = self.pool.get()?;
        Ok(categories::table
            .find(id)
            .first::<Category>(&mut conn)
            .optional()?)
    }

    async fn get_all(&self, active_only: bool) -> Result<Vec<Category>, ServiceError> {
        let mut conn = self.pool.get()?;
        let mut q = categories::table.into_boxed();
        if active_only {
            q = q.filter(categories::is_active.eq(true));
        }
        Ok(q.order(categories::name.asc()).load::<Category>(&mut conn)?)
    }

    async fn update(&self, category: &Category) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::update(categories::table.find(category.id))
            .set((
                categories::name.eq(category.name.clone()),
                categories::description.eq(category.description.clone()),
                categories::color.eq(category.color.clone()),
                categories::is_active.eq(category.is_active),
                categories::updated_at.eq(category.updated_at),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::update(categories::table.find(id))
            .set((
                categories::is_active.eq(is_active),
                categories::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }
}

pub struct PgAttachmentStore {
    pool: DbPool,
}

impl PgAttachmentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttachmentStore for PgAttachmentStore {
    async fn create(&self, attachment: &Attachment) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(attachments::table)
            .values(attachment)
            .execute(&mut conn)?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Attachment>, ServiceError> {
        let mut conn = self.pool.get()?;
        Ok(attachments::table
            .find(id)
            .first::<Attachment>(&mut conn)
            .optional()?)
    }

    async fn get_by_ticket_id(&self, ticket_id: Uuid) -> Result<Vec<Attachment>, ServiceError> {
        let mut conn = self.pool.get()?;
        Ok(attachments::table
            .filter(attachments::ticket_id.eq(Some(ticket_id)))
            .order(attachments::created_at.asc())
            .load::<Attachment>(&mut conn)?)
    }

    async fn get_by_comment_id(&self, comment_id: Uuid) -> Result<Vec<Attachment>, ServiceError> {
        let mut conn = self.pool.get()?;
        Ok(attachments::table
            .filter(attachments::comment_id.eq(Some(comment_id)))
            .order(attachments::created_at.asc())
            .load::<Attachment>(&mut conn)?)
    }

    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::delete(attachments::table.find(id)).execute(&mut conn)?;
        Ok(())
    }

    async fn delete_by_ticket_id(&self, ticket_id: Uuid) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::delete(attachments::table.filter(attachments::ticket_id.eq(Some(ticket_id))))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn delete_by_comment_id(&self, comment_id: Uuid) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::delete(attachments::table.filter(attachments::comment_id.eq(Some(comment_id))))
            .execute(&mut conn)?;
        Ok(())
    }
}

pub struct PgHistoryStore {
    pool: DbPool,
}

impl PgHistoryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn create(&self, entry: &TicketHistory) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(ticket_history::table)
            .values(entry)
            .execute(&mut conn)?;
        Ok(())
    }

    async fn get_by_ticket_id(&self, ticket_id: Uuid) -> Result<Vec<TicketHistory>, ServiceError> {
        let mut conn = self.pool.get()?;
        Ok(ticket_history::table
            .filter(ticket_history::ticket_id.eq(ticket_id))
            .order(ticket_history::created_at.asc())
            .load::<TicketHistory>(&mut conn)?)
    }

    async fn get_change_history(
        &self,
        ticket_id: Uuid,
        action: Option<&str>,
    ) -> Result<Vec<TicketHistory>, ServiceError> {
        let mut conn = self.pool.get()?;
        let mut q = ticket_history::table
            .filter(ticket_history::ticket_id.eq(ticket_id))
            .into_boxed();
        if let Some(action) = action {
            q = q.filter(ticket_history::action.eq(action.to_string()));
        }
        Ok(q.order(ticket_history::created_at.asc())
            .load::<TicketHistory>(&mut conn)?)
    }
}

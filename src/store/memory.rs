//! In-memory stores for exercising the lifecycle engine without a database.
//! Filter, ordering and pagination semantics mirror the Postgres stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::attachments::Attachment;
use crate::categories::Category;
use crate::core::error::ServiceError;
use crate::tickets::models::{Ticket, TicketComment, TicketHistory, TicketStatus};

use super::{
    AttachmentStore, CategoryStore, CommentStore, HistoryStore, OrderBy, OrderDir, Pagination,
    Stores, TicketFilters, TicketStore,
};

#[derive(Default)]
pub struct MemoryState {
    pub tickets: Vec<Ticket>,
    pub comments: Vec<TicketComment>,
    pub categories: Vec<Category>,
    pub attachments: Vec<Attachment>,
    pub history: Vec<TicketHistory>,
}

#[derive(Clone, Default)]
pub struct MemoryStores {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_stores(self) -> Stores {
        Stores {
            ticket: Arc::new(self.clone()),
            comment: Arc::new(self.clone()),
            category: Arc::new(self.clone()),
            attachment: Arc::new(self.clone()),
            history: Arc::new(self),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&MemoryState) -> R) -> R {
        f(&self.state.lock().unwrap())
    }
}

fn matches(ticket: &Ticket, filters: &TicketFilters) -> bool {
    if let Some(status) = filters.status {
        if ticket.status != status {
            return false;
        }
    }
    if let Some(priority) = filters.priority {
        if ticket.priority != priority {
            return false;
        }
    }
    if let Some(kind) = filters.kind {
        if ticket.kind != kind {
            return false;
        }
    }
    if let Some(category_id) = filters.category_id {
        if ticket.category_id != Some(category_id) {
            return false;
        }
    }
    if let Some(course_id) = &filters.course_id {
        if ticket.course_id.as_deref() != Some(course_id.as_str()) {
            return false;
        }
    }
    if let Some(instructor_id) = &filters.instructor_id {
        if ticket.instructor_id.as_deref() != Some(instructor_id.as_str()) {
            return false;
        }
    }
    if let Some(search) = &filters.search {
        let needle = search.to_lowercase();
        let hit = ticket.ticket_number.to_lowercase().contains(&needle)
            || ticket.title.to_lowercase().contains(&needle)
            || ticket.description.to_lowercase().contains(&needle);
        if !hit {
            return false;
        }
    }
    if let Some(from) = filters.from_date {
        if ticket.created_at < from {
            return false;
        }
    }
    if let Some(to) = filters.to_date {
        if ticket.created_at > to {
            return false;
        }
    }
    true
}

fn sort_and_page(mut items: Vec<Ticket>, pagination: &Pagination) -> Vec<Ticket> {
    items.sort_by(|a, b| {
        let ord = match pagination.order_by {
            OrderBy::CreatedAt => a.created_at.cmp(&b.created_at),
            OrderBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            OrderBy::Priority => a.priority.as_str().cmp(b.priority.as_str()),
            OrderBy::Status => a.status.as_str().cmp(b.status.as_str()),
            OrderBy::TicketNumber => a.ticket_number.cmp(&b.ticket_number),
        };
        match pagination.order_dir {
            OrderDir::Asc => ord,
            OrderDir::Desc => ord.reverse(),
        }
    });
    if pagination.page_size > 0 {
        items
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.page_size as usize)
            .collect()
    } else {
        items
    }
}

fn listing(
    all: &[Ticket],
    base: impl Fn(&Ticket) -> bool,
    filters: &TicketFilters,
    pagination: &Pagination,
) -> (Vec<Ticket>, i64) {
    let filtered: Vec<Ticket> = all
        .iter()
        .filter(|t| base(t) && matches(t, filters))
        .cloned()
        .collect();
    let total = filtered.len() as i64;
    (sort_and_page(filtered, pagination), total)
}

#[async_trait]
impl TicketStore for MemoryStores {
    async fn create(&self, ticket: &Ticket) -> Result<(), ServiceError> {
        self.state.lock().unwrap().tickets.push(ticket.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Ticket>, ServiceError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tickets
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn get_by_ticket_number(&self, number: &str) -> Result<Option<Ticket>, ServiceError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tickets
            .iter()
            .find(|t| t.ticket_number == number)
            .cloned())
    }

    async fn get_by_student_id(
        &self,
        student_id: &str,
        filters: &TicketFilters,
        pagination: &Pagination,
    ) -> Result<(Vec<Ticket>, i64), ServiceError> {
        let state = self.state.lock().unwrap();
        Ok(listing(
            &state.tickets,
            |t| t.student_id == student_id,
            filters,
            pagination,
        ))
    }

    async fn get_by_course_id(
        &self,
        course_id: &str,
        filters: &TicketFilters,
        pagination: &Pagination,
    ) -> Result<(Vec<Ticket>, i64), ServiceError> {
        let state = self.state.lock().unwrap();
        Ok(listing(
            &state.tickets,
            |t| t.course_id.as_deref() == Some(course_id),
            filters,
            pagination,
        ))
    }

    async fn get_by_instructor_id(
        &self,
        instructor_id: &str,
        filters: &TicketFilters,
        pagination: &Pagination,
    ) -> Result<(Vec<Ticket>, i64), ServiceError> {
        let state = self.state.lock().unwrap();
        Ok(listing(
            &state.tickets,
            |t| t.instructor_id.as_deref() == Some(instructor_id),
            filters,
            pagination,
        ))
    }

    async fn list(
        &self,
        filters: &TicketFilters,
        pagination: &Pagination,
    ) -> Result<(Vec<Ticket>, i64), ServiceError> {
        let state = self.state.lock().unwrap();
        Ok(listing(&state.tickets, |_| true, filters, pagination))
    }

    async fn update(&self, ticket: &Ticket) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.tickets.iter_mut().find(|t| t.id == ticket.id) {
            *existing = ticket.clone();
        }
        Ok(())
    }

    async fn complete(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, ServiceError> {
        let mut state = self.state.lock().unwrap();
        match state.tickets.iter_mut().find(|t| t.id == id) {
            Some(ticket) if !ticket.status.is_terminal() => {
                ticket.status = TicketStatus::Resolved;
                ticket.resolved_at = Some(now);
                ticket.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reopen(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(ticket) = state.tickets.iter_mut().find(|t| t.id == id) {
            ticket.status = TicketStatus::Open;
            ticket.resolved_at = None;
            ticket.closed_at = None;
            ticket.updated_at = now;
        }
        Ok(())
    }

    async fn assign_instructor(
        &self,
        id: Uuid,
        instructor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(ticket) = state.tickets.iter_mut().find(|t| t.id == id) {
            ticket.instructor_id = Some(instructor_id.to_string());
            ticket.updated_at = now;
        }
        Ok(())
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(ticket) = state.tickets.iter_mut().find(|t| t.id == id) {
            ticket.updated_at = now;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.state.lock().unwrap().tickets.retain(|t| t.id != id);
        Ok(())
    }
}

#[async_trait]
impl CommentStore for MemoryStores {
    async fn create(&self, comment: &TicketComment) -> Result<(), ServiceError> {
        self.state.lock().unwrap().comments.push(comment.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<TicketComment>, ServiceError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .comments
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn get_by_ticket_id(
        &self,
        ticket_id: Uuid,
        include_internal: bool,
    ) -> Result<Vec<TicketComment>, ServiceError> {
        let mut comments: Vec<TicketComment> = self
            .state
            .lock()
            .unwrap()
            .comments
            .iter()
            .filter(|c| c.ticket_id == ticket_id && (include_internal || !c.is_internal))
            .cloned()
            .collect();
        comments.sort_by_key(|c| c.created_at);
        Ok(comments)
    }

    async fn update(&self, comment: &TicketComment) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.comments.iter_mut().find(|c| c.id == comment.id) {
            *existing = comment.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.state.lock().unwrap().comments.retain(|c| c.id != id);
        Ok(())
    }

    async fn count_for_ticket(
        &self,
        ticket_id: Uuid,
        include_internal: bool,
    ) -> Result<i64, ServiceError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .comments
            .iter()
            .filter(|c| c.ticket_id == ticket_id && (include_internal || !c.is_internal))
            .count() as i64)
    }
}

#[async_trait]
impl CategoryStore for MemoryStores {
    async fn create(&self, category: &Category) -> Result<(), ServiceError> {
        self.state.lock().unwrap().categories.push(category.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Category>, ServiceError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .categories
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn get_all(&self, active_only: bool) -> Result<Vec<Category>, ServiceError> {
        let mut categories: Vec<Category> = self
            .state
            .lock()
            .unwrap()
            .categories
            .iter()
            .filter(|c| !active_only || c.is_active)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn update(&self, category: &Category) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.categories.iter_mut().find(|c| c.id == category.id) {
            *existing = category.clone();
        }
        Ok(())
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(category) = state.categories.iter_mut().find(|c| c.id == id) {
            category.is_active = is_active;
            category.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl AttachmentStore for MemoryStores {
    async fn create(&self, attachment: &Attachment) -> Result<(), ServiceError> {
        self.state
            .lock()
            .unwrap()
            .attachments
            .push(attachment.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Attachment>, ServiceError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .attachments
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn get_by_ticket_id(&self, ticket_id: Uuid) -> Result<Vec<Attachment>, ServiceError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .attachments
            .iter()
            .filter(|a| a.ticket_id == Some(ticket_id))
            .cloned()
            .collect())
    }

    async fn get_by_comment_id(&self, comment_id: Uuid) -> Result<Vec<Attachment>, ServiceError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .attachments
            .iter()
            .filter(|a| a.comment_id == Some(comment_id))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.state.lock().unwrap().attachments.retain(|a| a.id != id);
        Ok(())
    }

    async fn delete_by_ticket_id(&self, ticket_id: Uuid) -> Result<(), ServiceError> {
        self.state
            .lock()
            .unwrap()
            .attachments
            .retain(|a| a.ticket_id != Some(ticket_id));
        Ok(())
    }

    async fn delete_by_comment_id(&self, comment_id: Uuid) -> Result<(), ServiceError> {
        self.state
            .lock()
            .unwrap()
            .attachments
            .retain(|a| a.comment_id != Some(comment_id));
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryStores {
    async fn create(&self, entry: &TicketHistory) -> Result<(), ServiceError> {
        self.state.lock().unwrap().history.push(entry.clone());
        Ok(())
    }

    async fn get_by_ticket_id(&self, ticket_id: Uuid) -> Result<Vec<TicketHistory>, ServiceError> {
        let mut entries: Vec<TicketHistory> = self
            .state
            .lock()
            .unwrap()
            .history
            .iter()
            .filter(|h| h.ticket_id == ticket_id)
            .cloned()
            .collect();
        entries.sort_by_key(|h| h.created_at);
        Ok(entries)
    }

    async fn get_change_history(
        &self,
        ticket_id: Uuid,
        action: Option<&str>,
    ) -> Result<Vec<TicketHistory>, ServiceError> {
        let mut entries: Vec<TicketHistory> = self
            .state
            .lock()
            .unwrap()
            .history
            .iter()
            .filter(|h| h.ticket_id == ticket_id && action.map_or(true, |a| h.action == a))
            .cloned()
            .collect();
        entries.sort_by_key(|h| h.created_at);
        Ok(entries)
    }
}

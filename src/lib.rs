pub mod api_router;
pub mod attachments;
pub mod categories;
pub mod core;
pub mod notifications;
pub mod store;
pub mod tickets;

use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

use crate::categories::Category;
use crate::core::schema::{ticket_comments, ticket_history, tickets};

/// Ticket lifecycle states. `resolved` and `closed` are terminal for the
/// normal flow; only the administrative reopen leaves them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromSqlRow, AsExpression,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "camelCase")]
pub enum TicketStatus {
    Open,
    InProgress,
    WaitingForCustomer,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "inProgress",
            TicketStatus::WaitingForCustomer => "waitingForCustomer",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TicketStatus::Open),
            "inProgress" => Ok(TicketStatus::InProgress),
            "waitingForCustomer" => Ok(TicketStatus::WaitingForCustomer),
            "resolved" => Ok(TicketStatus::Resolved),
            "closed" => Ok(TicketStatus::Closed),
            other => Err(format!("unknown ticket status: {other}")),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromSqlRow, AsExpression,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
            TicketPriority::Urgent => "urgent",
        }
    }
}

impl std::str::FromStr for TicketPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TicketPriority::Low),
            "medium" => Ok(TicketPriority::Medium),
            "high" => Ok(TicketPriority::High),
            "urgent" => Ok(TicketPriority::Urgent),
            other => Err(format!("unknown ticket priority: {other}")),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromSqlRow, AsExpression,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum TicketKind {
    General,
    Technical,
    Course,
    Assignment,
    Grading,
    Platform,
    Content,
}

impl TicketKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketKind::General => "general",
            TicketKind::Technical => "technical",
            TicketKind::Course => "course",
            TicketKind::Assignment => "assignment",
            TicketKind::Grading => "grading",
            TicketKind::Platform => "platform",
            TicketKind::Content => "content",
        }
    }
}

impl std::str::FromStr for TicketKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(TicketKind::General),
            "technical" => Ok(TicketKind::Technical),
            "course" => Ok(TicketKind::Course),
            "assignment" => Ok(TicketKind::Assignment),
            "grading" => Ok(TicketKind::Grading),
            "platform" => Ok(TicketKind::Platform),
            "content" => Ok(TicketKind::Content),
            other => Err(format!("unknown ticket type: {other}")),
        }
    }
}

macro_rules! text_enum_sql {
    ($name:ident) => {
        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                s.parse::<$name>().map_err(|e| e.into())
            }
        }
    };
}

text_enum_sql!(TicketStatus);
text_enum_sql!(TicketPriority);
text_enum_sql!(TicketKind);

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = tickets)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    #[serde(rename = "type")]
    pub kind: TicketKind,
    pub student_id: String,
    pub instructor_id: Option<String>,
    pub course_id: Option<String>,
    pub category_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Ticket plus its category when one is referenced. The comment count only
/// includes internal notes for elevated readers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketDetail {
    pub ticket: Ticket,
    pub category: Option<Category>,
    pub comment_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_comments)]
#[serde(rename_all = "camelCase")]
pub struct TicketComment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: String,
    pub content: String,
    pub is_internal: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable audit-log row. Exactly one is appended per state-changing
/// lifecycle operation; never mutated or deleted by normal operations.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_history)]
#[serde(rename_all = "camelCase")]
pub struct TicketHistory {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub actor_id: String,
    pub action: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

//! Ticket categories. The active set is public so the intake form can
//! populate its dropdown; everything else is admin-only.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::ServiceError;
use crate::core::middleware::{AuthenticatedUser, Role};
use crate::core::schema::categories;
use crate::core::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = categories)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCategoriesQuery {
    pub include_inactive: Option<bool>,
}

fn require_admin(user: &AuthenticatedUser) -> Result<(), ServiceError> {
    if user.role == Role::Admin {
        Ok(())
    } else {
        Err(ServiceError::forbidden(
            "Only admins can manage categories",
        ))
    }
}

/// Unauthenticated listing of active categories.
pub async fn list_public_categories(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServiceError> {
    let categories = state.stores.category.get_all(true).await?;
    Ok(Json(categories))
}

async fn list_categories(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListCategoriesQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let include_inactive = query.include_inactive.unwrap_or(false) && user.is_elevated();
    let categories = state.stores.category.get_all(!include_inactive).await?;
    Ok(Json(categories))
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    require_admin(&user)?;
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ServiceError::validation("Category name is required"));
    }

    let now = Utc::now();
    let category = Category {
        id: Uuid::new_v4(),
        name,
        description: req.description,
        color: req.color,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    state.stores.category.create(&category).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCategoryRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    require_admin(&user)?;
    let mut category = state
        .stores
        .category
        .get_by_id(id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Category not found"))?;

    if let Some(name) = req.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::validation("Category name is required"));
        }
        category.name = name;
    }
    if let Some(description) = req.description {
        category.description = Some(description);
    }
    if let Some(color) = req.color {
        category.color = Some(color);
    }
    if let Some(is_active) = req.is_active {
        category.is_active = is_active;
    }
    category.updated_at = Utc::now();

    state.stores.category.update(&category).await?;
    Ok(Json(category))
}

async fn delete_category(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    require_admin(&user)?;
    state
        .stores
        .category
        .get_by_id(id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Category not found"))?;

    // Deactivate instead of deleting so existing tickets keep their label.
    state.stores.category.set_active(id, false).await?;
    Ok(Json(json!({ "message": "Category deactivated" })))
}

pub fn configure_categories_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/:id",
            put(update_category).delete(delete_category),
        )
}

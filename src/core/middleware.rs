use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::error::ServiceError;
use crate::core::state::AppState;

/// Closed role set derived once from the verified token. Everything past the
/// middleware treats this as an opaque capability tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

impl Role {
    pub fn from_claim(value: &str) -> Self {
        match value {
            "admin" => Role::Admin,
            "instructor" => Role::Instructor,
            _ => Role::Student,
        }
    }

    /// Instructors and admins may triage, assign and resolve tickets.
    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Instructor | Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
        }
    }
}

/// Verified identity carried through a single request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: Option<String>,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_elevated(&self) -> bool {
        self.role.is_elevated()
    }

    /// Write operations that fan out notifications need a sender address.
    pub fn require_email(&self) -> Result<&str, ServiceError> {
        self.email
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ServiceError::unauthorized("User email not found in request"))
    }
}

/// Claims as issued by the platform's identity service. Newer tokens nest the
/// user object, older ones carry flat userId/role/email claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub user: Option<UserClaims>,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub id: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "userType")]
    pub user_type: Option<String>,
}

/// Rejects the request when the bearer token is missing or invalid, otherwise
/// inserts the `AuthenticatedUser` into request extensions.
pub async fn authentication_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let user = match authenticate(&request, &state.config.auth.jwt_secret) {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    request.extensions_mut().insert(user);
    next.run(request).await
}

fn authenticate(request: &Request<Body>, secret: &str) -> Result<AuthenticatedUser, ServiceError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::unauthorized("Authorization header required"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .ok_or_else(|| ServiceError::unauthorized("Authorization header must be a bearer token"))?;

    let claims = validate_jwt(token, secret)?;
    user_from_claims(claims)
}

fn validate_jwt(token: &str, secret: &str) -> Result<TokenClaims, ServiceError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp"]);

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    match decode::<TokenClaims>(token, &decoding_key, &validation) {
        Ok(token_data) => Ok(token_data.claims),
        Err(err) => match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                Err(ServiceError::unauthorized("Token expired"))
            }
            _ => Err(ServiceError::unauthorized("Invalid token")),
        },
    }
}

fn user_from_claims(claims: TokenClaims) -> Result<AuthenticatedUser, ServiceError> {
    // Nested user object wins over the flat legacy claims.
    if let Some(user) = claims.user {
        let id = user
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::unauthorized("User ID not found in token"))?;
        let role = Role::from_claim(user.user_type.as_deref().unwrap_or("student"));
        return Ok(AuthenticatedUser {
            id,
            email: user.email,
            role,
        });
    }

    let id = claims
        .user_id
        .or(claims.sub)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServiceError::unauthorized("User ID not found in token"))?;
    let role = Role::from_claim(claims.role.as_deref().unwrap_or("student"));
    Ok(AuthenticatedUser {
        id,
        email: claims.email,
        role,
    })
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or((
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Authentication required" })),
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(claims: &serde_json::Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn nested_user_claims_map_to_role() {
        let token = make_token(
            &serde_json::json!({
                "user": { "id": "u-1", "email": "u1@x.edu", "userType": "instructor" },
                "exp": far_future(),
            }),
            "s3cret",
        );
        let claims = validate_jwt(&token, "s3cret").unwrap();
        let user = user_from_claims(claims).unwrap();
        assert_eq!(user.id, "u-1");
        assert_eq!(user.role, Role::Instructor);
        assert!(user.is_elevated());
    }

    #[test]
    fn flat_claims_fall_back_to_student() {
        let token = make_token(
            &serde_json::json!({ "sub": "u-2", "email": "u2@x.edu", "exp": far_future() }),
            "s3cret",
        );
        let claims = validate_jwt(&token, "s3cret").unwrap();
        let user = user_from_claims(claims).unwrap();
        assert_eq!(user.role, Role::Student);
        assert!(!user.is_elevated());
    }

    #[test]
    fn missing_user_id_fails_closed() {
        let token = make_token(
            &serde_json::json!({ "email": "x@x.edu", "exp": far_future() }),
            "s3cret",
        );
        let claims = validate_jwt(&token, "s3cret").unwrap();
        assert!(matches!(
            user_from_claims(claims),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = make_token(
            &serde_json::json!({ "sub": "u-3", "exp": far_future() }),
            "other",
        );
        assert!(validate_jwt(&token, "s3cret").is_err());
    }

    #[test]
    fn unknown_role_defaults_to_student() {
        assert_eq!(Role::from_claim("superuser"), Role::Student);
        assert_eq!(Role::from_claim("admin"), Role::Admin);
    }
}

// JWT-Only Authentication Middleware untuk Payment Service

use crate::{config::AppState, error::AppError, utils::jwt};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

// Authentication context untuk user yang sudah terautentikasi.
// Identity SELALU mengalir eksplisit dari sini ke domain calls, tidak
// pernah dibaca dari ambient/thread-local state.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub email: String,
    pub role: String,
}

// Axum extractor implementation untuk AuthUser
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}

// Extract Bearer token dari Authorization header
fn extract_jwt_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get("authorization")
        .ok_or_else(|| {
            AppError::unauthorized("Authorization header dengan Bearer token diperlukan")
        })?
        .to_str()
        .map_err(|_| AppError::unauthorized("Invalid Authorization header format"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::unauthorized("Bearer token format diperlukan"))?;

    Ok(token.to_string())
}

// JWT authentication middleware; webhook dan health tidak lewat sini,
// router memisahkan public routes secara eksplisit
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_jwt_token(request.headers())?;

    let claims = jwt::validate_token(&token, &state.config.jwt_secret)
        .map_err(|_| AppError::unauthorized("Token tidak valid atau expired"))?;

    let auth_user = AuthUser {
        user_id: claims.sub,
        email: claims.email.clone(),
        role: claims.role.clone(),
    };

    // Inject ke request extensions agar bisa di-extract oleh handlers
    request.extensions_mut().insert(auth_user.clone());

    tracing::debug!(
        "User authenticated - ID: {}, Role: {}, Endpoint: {}",
        auth_user.user_id,
        auth_user.role,
        request.uri().path()
    );

    Ok(next.run(request).await)
}

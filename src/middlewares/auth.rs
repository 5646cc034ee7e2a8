use axum::body::Body;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::COOKIE,
        request::{Parts, Request},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::env;

use crate::error::ApiError;

#[derive(Serialize, Deserialize)]
pub struct Claims {
    /// The user's hex `_id`, the only identity the rest of the system sees.
    pub sub: String,
    pub exp: usize,
}

pub async fn auth_middleware(req: Request<Body>, next: Next) -> impl IntoResponse {
    let (mut parts, body) = req.into_parts();
    let cookie_header = match parts.headers.get(COOKIE) {
        Some(value) => value.to_str().unwrap_or(""),
        None => {
            return ApiError::Unauthenticated("missing session cookie".to_string())
                .into_response();
        }
    };

    let token = cookie_header
        .split(';')
        .map(|s| s.trim())
        .find_map(|s| s.strip_prefix("token="))
        .map(|s| s.to_string());

    let token = match token {
        Some(t) => t,
        None => {
            return ApiError::Unauthenticated("missing session token".to_string())
                .into_response();
        }
    };

    let secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    let decoding_key = DecodingKey::from_secret(secret.as_ref());

    match decode::<Claims>(&token, &decoding_key, &Validation::default()) {
        Ok(token_data) => {
            // Attach user ID to extensions
            parts.extensions.insert(token_data.claims.sub);
            let req = Request::from_parts(parts, body);
            next.run(req).await
        }
        Err(_) => ApiError::Unauthenticated("invalid session token".to_string()).into_response(),
    }
}

// Extension to extract user_id from request
#[derive(Clone)]
pub struct UserId(pub String);

impl UserId {
    /// The caller's ObjectId; fails for tokens minted against a different
    /// user-id scheme.
    pub fn object_id(&self) -> Result<ObjectId, ApiError> {
        ObjectId::parse_str(&self.0)
            .map_err(|_| ApiError::Unauthenticated("malformed user id in token".to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<String>()
            .cloned()
            .map(UserId)
            .ok_or_else(|| {
                ApiError::Unauthenticated("not authenticated".to_string()).into_response()
            })
    }
}

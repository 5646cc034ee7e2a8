use axum::{
    Router,
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use mongodb::Collection;
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use serde::Deserialize;
use std::env;

use argon2::{Algorithm, Argon2, Params, Version};
use argon2::{PasswordHasher, PasswordVerifier};
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, SaltString};
use tracing::info;

use crate::AppState;
use crate::error::ApiError;
use crate::middlewares::auth::{Claims, UserId};
use crate::models::user::{User, UserView};

fn argon2() -> Argon2<'static> {
    let params = Params::new(65536, 8, 4, Some(32)).expect("valid argon2 params");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
    name: String,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let collection: Collection<User> = state.db.collection("users");

    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::invalid_input("a valid email address is required"));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::invalid_input(
            "password must be at least 8 characters",
        ));
    }

    // Check if email already exists
    if collection
        .find_one(doc! { "email": &email }, None)
        .await?
        .is_some()
    {
        return Err(ApiError::conflict("email is already registered"));
    }

    // Generate salt and hash password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = argon2()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?
        .to_string();

    let name = if req.name.trim().is_empty() {
        email.clone()
    } else {
        req.name.trim().to_string()
    };

    let user = User {
        id: None,
        email,
        password_hash,
        name,
        picture: None,
        address: None,
        created_at: DateTime::now(),
    };

    // The unique email index turns a concurrent double-register into a
    // duplicate-key error, which maps to Conflict.
    let result = collection.insert_one(&user, None).await?;
    let id = result
        .inserted_id
        .as_object_id()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("insert returned no ObjectId")))?;
    info!(user = %id.to_hex(), "registered user");

    let mut created = user;
    created.id = Some(id);
    Ok((StatusCode::CREATED, Json(UserView::from(created))).into_response())
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let collection: Collection<User> = state.db.collection("users");
    let email = req.email.trim().to_lowercase();

    let invalid = || ApiError::Unauthenticated("invalid credentials".to_string());

    let user = collection
        .find_one(doc! { "email": &email }, None)
        .await?
        .ok_or_else(invalid)?;

    let parsed_hash = PasswordHash::new(&user.password_hash).map_err(|_| invalid())?;
    if argon2()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(invalid());
    }

    let user_id = user.id.ok_or_else(invalid)?;
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    let claims = Claims {
        sub: user_id.to_hex(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(24)).timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("token encoding failed: {e}")))?;

    let cookie = format!(
        "token={}; HttpOnly; Path=/; Max-Age=86400; SameSite=Strict",
        token
    );

    Ok((
        StatusCode::OK,
        [("Set-Cookie", cookie.as_str())],
        Json(UserView::from(user)),
    )
        .into_response())
}

async fn me(State(state): State<AppState>, user_id: UserId) -> Result<Json<UserView>, ApiError> {
    let user = find_user(&state, &user_id).await?;
    Ok(Json(UserView::from(user)))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfilePatch {
    name: Option<String>,
    picture: Option<String>,
    address: Option<String>,
}

async fn update_profile(
    State(state): State<AppState>,
    user_id: UserId,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<UserView>, ApiError> {
    let collection: Collection<User> = state.db.collection("users");
    let caller = user_id.object_id()?;

    let mut set = doc! {};
    if let Some(name) = patch.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::invalid_input("name cannot be empty"));
        }
        set.insert("name", name);
    }
    if let Some(picture) = patch.picture {
        set.insert("picture", picture);
    }
    if let Some(address) = patch.address {
        set.insert("address", address);
    }
    if set.is_empty() {
        return Err(ApiError::invalid_input("no profile fields in request"));
    }

    collection
        .update_one(doc! { "_id": caller }, doc! { "$set": set }, None)
        .await?;

    let user = find_user(&state, &user_id).await?;
    Ok(Json(UserView::from(user)))
}

pub(crate) async fn find_user(state: &AppState, user_id: &UserId) -> Result<User, ApiError> {
    let collection: Collection<User> = state.db.collection("users");
    let caller: ObjectId = user_id.object_id()?;
    collection
        .find_one(doc! { "_id": caller }, None)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("unknown user".to_string()))
}

/// Public: account creation and session issuance.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

/// Behind the auth middleware: the caller's own profile.
pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(me))
        .route("/auth/profile", put(update_profile))
}

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use axum_extra::{headers::Cookie, typed_header::TypedHeader};
use chrono::{Duration as ChronoDuration, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedPerson,
    care::{directory::{self, NewPerson}, workflow, Person, PersonType},
    error::{AppError, AppResult},
    models::{NewRefreshToken, RefreshToken},
    routes::ensure_max_len,
    schema::refresh_tokens::{self, dsl as refresh_dsl},
    state::AppState,
};

const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub person_id: i32,
    pub role: PersonType,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub person_id: i32,
    pub role: PersonType,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let role = payload
        .role
        .parse::<PersonType>()
        .map_err(AppError::bad_request)?;
    validate_registration(&payload)?;

    let phone_number = payload
        .phone_number
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let fields = NewPerson {
        email: &payload.email,
        password: &payload.password,
        first_name: payload.first_name.trim(),
        last_name: payload.last_name.trim(),
        phone_number,
    };

    let mut conn = state.db()?;
    let person = workflow::register(&mut conn, role, &fields)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            person_id: person.id,
            role: person.person_type,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let role = payload
        .role
        .as_deref()
        .map(str::parse::<PersonType>)
        .transpose()
        .map_err(AppError::bad_request)?;

    let mut conn = state.db()?;
    let person = workflow::login(&mut conn, role, &payload.email, &payload.password)?;
    tracing::info!(
        person_id = person.id,
        person_type = %person.person_type,
        "login succeeded"
    );

    issue_session(&state, &mut conn, &person)
}

pub async fn refresh(
    State(state): State<AppState>,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let cookies = jar.ok_or_else(AppError::unauthorized)?;
    let refresh_value = cookies
        .get(REFRESH_COOKIE_NAME)
        .ok_or_else(AppError::unauthorized)?;

    let hashed = hash_refresh_token(refresh_value);
    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();

    let token = refresh_dsl::refresh_tokens
        .filter(refresh_dsl::token_hash.eq(&hashed))
        .filter(refresh_dsl::revoked_at.is_null())
        .filter(refresh_dsl::expires_at.gt(now))
        .first::<RefreshToken>(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    diesel::update(refresh_dsl::refresh_tokens.filter(refresh_dsl::id.eq(token.id)))
        .set((
            refresh_dsl::revoked_at.eq(now),
            refresh_dsl::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let person_type = token
        .person_type
        .parse::<PersonType>()
        .map_err(AppError::internal)?;
    let person = crate::care::directory::get_by_id(&mut conn, person_type, token.person_id)?
        .ok_or_else(AppError::unauthorized)?;

    issue_session(&state, &mut conn, &person)
}

pub async fn logout(
    State(state): State<AppState>,
    caller: AuthenticatedPerson,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, StatusCode)> {
    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();
    let mut rows_affected = 0;

    if let Some(value) = jar.as_ref().and_then(|cookies| cookies.get(REFRESH_COOKIE_NAME)) {
        let hashed = hash_refresh_token(value);
        rows_affected = diesel::update(
            refresh_dsl::refresh_tokens
                .filter(refresh_dsl::token_hash.eq(hashed))
                .filter(refresh_dsl::person_id.eq(caller.person_id))
                .filter(refresh_dsl::person_type.eq(caller.role.as_str()))
                .filter(refresh_dsl::revoked_at.is_null()),
        )
        .set((
            refresh_dsl::revoked_at.eq(now),
            refresh_dsl::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
    }

    if rows_affected == 0 {
        diesel::update(
            refresh_dsl::refresh_tokens
                .filter(refresh_dsl::person_id.eq(caller.person_id))
                .filter(refresh_dsl::person_type.eq(caller.role.as_str()))
                .filter(refresh_dsl::revoked_at.is_null()),
        )
        .set((
            refresh_dsl::revoked_at.eq(now),
            refresh_dsl::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
    }

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_refresh_cookie(&state)?);
    Ok((headers, StatusCode::NO_CONTENT))
}

pub async fn me(caller: AuthenticatedPerson) -> Json<AuthenticatedPerson> {
    Json(caller)
}

fn validate_registration(payload: &RegisterRequest) -> AppResult<()> {
    let email = payload.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::bad_request("a valid email is required"));
    }
    if payload.password.is_empty() {
        return Err(AppError::bad_request("password must not be empty"));
    }
    if payload.first_name.trim().is_empty() || payload.last_name.trim().is_empty() {
        return Err(AppError::bad_request(
            "first_name and last_name must not be empty",
        ));
    }
    ensure_max_len("email", email, directory::MAX_EMAIL_LEN)?;
    ensure_max_len("first_name", payload.first_name.trim(), directory::MAX_NAME_LEN)?;
    ensure_max_len("last_name", payload.last_name.trim(), directory::MAX_NAME_LEN)?;
    if let Some(phone) = payload.phone_number.as_deref() {
        ensure_max_len("phone_number", phone.trim(), directory::MAX_PHONE_LEN)?;
    }
    Ok(())
}

fn issue_session(
    state: &AppState,
    conn: &mut PgConnection,
    person: &Person,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let access_token = state
        .jwt
        .generate_token(person.id, person.person_type, &person.email)
        .map_err(AppError::from)?;

    let now = Utc::now();
    let refresh_value = generate_refresh_token();
    let refresh_expires_at = now + ChronoDuration::days(state.config.refresh_token_expiry_days);

    let new_refresh = NewRefreshToken {
        id: Uuid::new_v4(),
        person_id: person.id,
        person_type: person.person_type.as_str().to_string(),
        token_hash: hash_refresh_token(&refresh_value),
        issued_at: now.naive_utc(),
        expires_at: refresh_expires_at.naive_utc(),
    };

    diesel::insert_into(refresh_tokens::table)
        .values(&new_refresh)
        .execute(conn)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        build_refresh_cookie(state, &refresh_value, refresh_expires_at)?,
    );

    Ok((
        headers,
        Json(LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: state.config.jwt_expiry_minutes * 60,
            person_id: person.id,
            role: person.person_type,
        }),
    ))
}

fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn build_refresh_cookie(
    state: &AppState,
    token: &str,
    expires_at: chrono::DateTime<Utc>,
) -> AppResult<HeaderValue> {
    let max_age = ChronoDuration::days(state.config.refresh_token_expiry_days).num_seconds();

    let mut parts = vec![format!("{}={}", REFRESH_COOKIE_NAME, token)];
    parts.push("Path=/api/auth".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    parts.push(format!("Max-Age={}", max_age));
    parts.push(format!("Expires={}", expires_at.to_rfc2822()));
    push_cookie_scope(state, &mut parts);

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}

fn build_clear_refresh_cookie(state: &AppState) -> AppResult<HeaderValue> {
    let mut parts = vec![format!("{}=", REFRESH_COOKIE_NAME)];
    parts.push("Path=/api/auth".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    parts.push("Max-Age=0".into());
    parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".into());
    push_cookie_scope(state, &mut parts);

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}

fn push_cookie_scope(state: &AppState, parts: &mut Vec<String>) {
    if state.config.refresh_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &state.config.refresh_cookie_domain {
        parts.push(format!("Domain={}", domain));
    }
}

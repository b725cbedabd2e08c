use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::OnceLock;

use actix_web::cookie::{Cookie, SameSite};
use actix_web::http::header;
use actix_web::{dev::Payload, web, FromRequest, HttpMessage, HttpRequest, HttpResponse};
use futures_util::future::{ready, Ready};
use jsonwebtoken::{encode, EncodingKey, Header};
use regex::Regex;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::config::*;
use crate::core::db::session_key;
use crate::core::errors::{Api, ApiError, ApiResult, FieldErrors, Failure, Mode, View, ViewResult};
use crate::core::helpers::{hash_password, now_iso, validate_uuid, verify_password};
use crate::models::models::{Claims, SessionData, User};
use crate::state::AppState;
use crate::templates;
use crate::users::{find_user, find_user_by_username, insert_user};

/// The user behind the current request's session cookie.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub session_id: String,
    pub user_id: String,
    pub username: String,
}

/// Extractor for routes that need a logged-in user.
///
/// The mode decides what an anonymous caller gets back: a redirect to
/// `/login` for pages, a 401 body for the JSON API.
pub struct Authenticated<M> {
    pub user: SessionUser,
    _mode: PhantomData<M>,
}

pub type ViewUser = Authenticated<View>;
pub type ApiUser = Authenticated<Api>;

impl<M> Deref for Authenticated<M> {
    type Target = SessionUser;

    fn deref(&self) -> &SessionUser {
        &self.user
    }
}

impl<M: Mode> FromRequest for Authenticated<M> {
    type Error = Failure<M>;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<SessionUser>() {
            Some(user) => ready(Ok(Authenticated {
                user: user.clone(),
                _mode: PhantomData,
            })),
            None => ready(Err(ApiError::Unauthenticated.into())),
        }
    }
}

// === Sessions ===

pub fn create_session(state: &AppState, user_id: &str) -> anyhow::Result<String> {
    let session_id = Uuid::new_v4().to_string();
    let data = SessionData {
        user_id: user_id.to_string(),
        created_at: now_iso(),
    };
    state.store.set_json(&session_key(&session_id), &data)?;
    Ok(session_id)
}

/// Looks up a live session. Expired sessions are deleted on the way.
pub fn resolve_session(state: &AppState, session_id: &str) -> anyhow::Result<Option<SessionUser>> {
    if !validate_uuid(session_id) {
        return Ok(None);
    }
    let key = session_key(session_id);
    let Some(data) = state.store.get_json::<SessionData>(&key)? else {
        return Ok(None);
    };

    let expired = match chrono::DateTime::parse_from_rfc3339(&data.created_at) {
        Ok(created) => {
            let age = chrono::Utc::now() - created.with_timezone(&chrono::Utc);
            age.num_hours() >= state.config.session_hours
        }
        Err(_) => true,
    };
    if expired {
        state.store.delete(&key)?;
        return Ok(None);
    }

    // The user may have been removed from the store by hand.
    let Some(user) = find_user(&state.store, &data.user_id)? else {
        state.store.delete(&key)?;
        return Ok(None);
    };

    Ok(Some(SessionUser {
        session_id: session_id.to_string(),
        user_id: user.id,
        username: user.username,
    }))
}

pub fn destroy_session(state: &AppState, session_id: &str) -> anyhow::Result<()> {
    state.store.delete(&session_key(session_id))
}

pub fn session_cookie(session_id: &str) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, session_id.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build(name, "").path("/").finish();
    cookie.make_removal();
    cookie
}

/// Signed bearer token handed out at login, separate from the session.
pub fn issue_token(config: &Config, user: &User) -> anyhow::Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user.id.clone(),
        username: user.username.clone(),
        iat: now,
        exp: now + config.token_expiration_hours * 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("Failed to sign token: {}", e))
}

// === Registration ===

#[derive(Debug, Deserialize, Default)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Regex should compile"))
}

pub fn register_user(state: &AppState, form: &RegisterForm) -> Result<User, ApiError> {
    let mut errors = FieldErrors::new();

    let email = form.email.trim();
    if email.is_empty() {
        errors.add("email", "Email is required.");
    } else if !email_regex().is_match(email) {
        errors.add("email", "Invalid email format.");
    }

    let username = form.username.trim().to_string();
    let username_len = username.chars().count();
    if username.is_empty() {
        errors.add("username", "Username is required.");
    } else if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&username_len) {
        errors.add(
            "username",
            format!(
                "Username must be between {} and {} characters.",
                MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
            ),
        );
    }

    let number = form.number.trim();
    let parsed_number = if number.is_empty() {
        errors.add("number", "Contact Number is required.");
        None
    } else {
        match number.parse::<i64>() {
            Ok(n) => Some(n),
            Err(_) => {
                errors.add("number", "Contact Number must be a number.");
                None
            }
        }
    };

    if form.password.is_empty() {
        errors.add("password", "No password was given");
    } else if form.password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.add(
            "password",
            format!("Password must be at least {} characters long.", MIN_PASSWORD_LENGTH),
        );
    }

    if !username.is_empty() && find_user_by_username(&state.store, &username)?.is_some() {
        errors.add("username", "A user with the given username is already registered");
    }

    errors.into_result()?;

    let now = now_iso();
    let user = User {
        id: Uuid::new_v4().to_string(),
        email: email.to_string(),
        username,
        password: hash_password(&form.password)?,
        number: parsed_number.unwrap_or_default(),
        city: String::new(),
        gender: String::new(),
        profileimage: String::new(),
        posts: Vec::new(),
        save_post: Vec::new(),
        created_at: now.clone(),
        updated_at: now,
    };
    insert_user(&state.store, &user)?;

    info!("Registered user {}", user.username);
    Ok(user)
}

pub fn authenticate(state: &AppState, username: &str, password: &str) -> Result<User, ApiError> {
    match find_user_by_username(&state.store, username.trim())? {
        Some(user) if verify_password(password, &user.password) => Ok(user),
        _ => Err(ApiError::Authentication),
    }
}

// === Handlers ===

pub async fn signin_page() -> ViewResult {
    Ok(templates::signin_page()?)
}

pub async fn login_page() -> ViewResult {
    Ok(templates::login_page()?)
}

pub async fn register(state: web::Data<AppState>, form: web::Form<RegisterForm>) -> ViewResult {
    let user = register_user(&state, &form)?;
    let session_id = create_session(&state, &user.id)?;

    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/index"))
        .cookie(session_cookie(&session_id))
        .finish())
}

pub async fn login(state: web::Data<AppState>, form: web::Form<LoginForm>) -> ViewResult {
    let user = authenticate(&state, &form.username, &form.password)?;
    let session_id = create_session(&state, &user.id)?;
    let token = issue_token(&state.config, &user)?;

    info!("User {} logged in", user.username);
    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/index"))
        .cookie(session_cookie(&session_id))
        .cookie(
            Cookie::build(TOKEN_COOKIE, token)
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .finish(),
        )
        .finish())
}

pub async fn api_login(state: web::Data<AppState>, creds: web::Json<LoginForm>) -> ApiResult {
    let user = authenticate(&state, &creds.username, &creds.password)?;
    let session_id = create_session(&state, &user.id)?;
    let token = issue_token(&state.config, &user)?;

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(&session_id))
        .json(serde_json::json!({
            "token": token,
            "user_id": user.id,
            "username": user.username,
        })))
}

pub async fn logout(state: web::Data<AppState>, auth: ViewUser) -> ViewResult {
    destroy_session(&state, &auth.session_id)?;
    info!("User {} logged out", auth.username);

    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/"))
        .cookie(removal_cookie(SESSION_COOKIE))
        .cookie(removal_cookie(TOKEN_COOKIE))
        .finish())
}

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::{ApiUser, ViewUser};
use crate::core::db::{user_key, username_key, Store, USERS_LIST_KEY};
use crate::core::errors::{ApiError, ApiResult, FieldErrors, ViewResult};
use crate::core::helpers::{now_iso, sanitize_text};
use crate::models::models::{User, UserSummary};
use crate::state::AppState;
use crate::templates;

const MAX_PROFILE_FIELD_LENGTH: usize = 100;

pub fn find_user(store: &Store, user_id: &str) -> anyhow::Result<Option<User>> {
    store.get_json::<User>(&user_key(user_id))
}

pub fn find_user_by_username(store: &Store, username: &str) -> anyhow::Result<Option<User>> {
    match store.get_json::<String>(&username_key(username))? {
        Some(id) => find_user(store, &id),
        None => Ok(None),
    }
}

/// The user behind a session, or `NotFound` if it has since disappeared.
pub fn load_user(store: &Store, user_id: &str) -> Result<User, ApiError> {
    find_user(store, user_id)?.ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

pub fn insert_user(store: &Store, user: &User) -> anyhow::Result<()> {
    store.set_json(&user_key(&user.id), user)?;
    store.set_json(&username_key(&user.username), &user.id)?;

    let mut users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    users.push(user.id.clone());
    store.set_json(USERS_LIST_KEY, &users)
}

pub fn save_user(store: &Store, user: &mut User) -> anyhow::Result<()> {
    user.updated_at = now_iso();
    store.set_json(&user_key(&user.id), user)
}

/// Every user, in registration order.
pub fn list_users(store: &Store) -> anyhow::Result<Vec<User>> {
    let ids: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    let mut users = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(u) = find_user(store, &id)? {
            users.push(u);
        }
    }
    Ok(users)
}

#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    pub city: Option<String>,
    pub gender: Option<String>,
}

fn profile_field(name: &str, value: &str) -> Result<String, ApiError> {
    let clean = sanitize_text(value);
    if clean.chars().count() > MAX_PROFILE_FIELD_LENGTH {
        return Err(ApiError::Validation(FieldErrors::single(
            name,
            format!("{} must be at most {} characters.", name, MAX_PROFILE_FIELD_LENGTH),
        )));
    }
    Ok(clean)
}

pub fn update_profile_fields(store: &Store, user_id: &str, form: &ProfileForm) -> Result<User, ApiError> {
    let mut user = load_user(store, user_id)?;
    if let Some(city) = &form.city {
        user.city = profile_field("city", city)?;
    }
    if let Some(gender) = &form.gender {
        user.gender = profile_field("gender", gender)?;
    }
    save_user(store, &mut user)?;
    Ok(user)
}

// === Handlers ===

pub async fn index_page(state: web::Data<AppState>, auth: ViewUser) -> ViewResult {
    let user = load_user(&state.store, &auth.user_id)?;
    Ok(templates::index_page(&user)?)
}

pub async fn profile_page(state: web::Data<AppState>, auth: ViewUser) -> ViewResult {
    let user = load_user(&state.store, &auth.user_id)?;
    Ok(templates::profile_page(&user)?)
}

pub async fn update_profile(
    state: web::Data<AppState>,
    auth: ViewUser,
    form: web::Form<ProfileForm>,
) -> ViewResult {
    let user = update_profile_fields(&state.store, &auth.user_id, &form)?;
    Ok(templates::profile_page(&user)?)
}

pub async fn api_me(state: web::Data<AppState>, auth: ApiUser) -> ApiResult {
    let user = load_user(&state.store, &auth.user_id)?;
    Ok(HttpResponse::Ok().json(UserSummary::from(&user)))
}

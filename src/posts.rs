use std::collections::HashMap;
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::{ApiUser, ViewUser};
use crate::config::*;
use crate::core::db::Store;
use crate::core::errors::{ApiError, ApiResult, FieldErrors, ViewResult};
use crate::core::helpers::{now_iso, sanitize_text, validate_uuid};
use crate::models::models::{NewPost, OwnerPosts, Post, User};
use crate::state::AppState;
use crate::templates;
use crate::uploads::{read_upload_form, remove_all, store_all, UploadForm};
use crate::users::{find_user, list_users, load_user, save_user};

// === Validation ===

fn required_text(
    fields: &HashMap<String, String>,
    errors: &mut FieldErrors,
    name: &str,
    message: &str,
    max_len: usize,
) -> String {
    let value = sanitize_text(fields.get(name).map(String::as_str).unwrap_or_default());
    if value.is_empty() {
        errors.add(name, message);
    } else if value.chars().count() > max_len {
        errors.add(name, format!("{} must be at most {} characters.", name, max_len));
    }
    value
}

fn required_number<T: std::str::FromStr + Default>(
    fields: &HashMap<String, String>,
    errors: &mut FieldErrors,
    name: &str,
    label: &str,
) -> T {
    let raw = fields.get(name).map(|v| v.trim()).unwrap_or_default();
    if raw.is_empty() {
        errors.add(name, format!("{} is required.", label));
        return T::default();
    }
    match raw.parse::<T>() {
        Ok(n) => n,
        Err(_) => {
            errors.add(name, format!("{} must be a number.", label));
            T::default()
        }
    }
}

pub fn validate_post_fields(fields: &HashMap<String, String>) -> Result<NewPost, ApiError> {
    let mut errors = FieldErrors::new();

    let kind = required_text(fields, &mut errors, "type", "Type of room is required.", MAX_TEXT_FIELD_LENGTH);
    let city = required_text(fields, &mut errors, "city", "City name is required.", MAX_TEXT_FIELD_LENGTH);
    let state = required_text(fields, &mut errors, "state", "State is required.", MAX_TEXT_FIELD_LENGTH);
    let location = required_text(fields, &mut errors, "location", "Location is required.", MAX_TEXT_FIELD_LENGTH);
    let area = required_text(fields, &mut errors, "area", "Area Street is required.", MAX_TEXT_FIELD_LENGTH);
    let description = required_text(
        fields,
        &mut errors,
        "description",
        "Description is required.",
        MAX_DESCRIPTION_LENGTH,
    );
    let pincode: i64 = required_number(fields, &mut errors, "pincode", "Pincode");
    let number: i64 = required_number(fields, &mut errors, "number", "Contact number");
    let price: f64 = required_number(fields, &mut errors, "price", "Price");
    if !price.is_finite() || price < 0.0 {
        errors.add("price", "Price must be a non-negative number.");
    }

    errors.into_result()?;

    Ok(NewPost {
        kind,
        city,
        state,
        location,
        pincode,
        area,
        description,
        price,
        number,
    })
}

// === Lifecycle ===

/// Validates the form, stores its images and appends the post to the owner.
///
/// The owner is re-read after the uploads and written back whole, so a
/// concurrent change to the same user can be lost.
pub async fn create_post(state: &AppState, user_id: &str, form: UploadForm) -> Result<(User, Post), ApiError> {
    if find_user(&state.store, user_id)?.is_none() {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    let fields = validate_post_fields(&form.fields)?;

    let stored = store_all(Arc::clone(&state.images), form.images).await?;

    let now = now_iso();
    let post = Post {
        id: Uuid::new_v4().to_string(),
        kind: fields.kind,
        city: fields.city,
        state: fields.state,
        location: fields.location,
        pincode: fields.pincode,
        area: fields.area,
        description: fields.description,
        price: fields.price,
        number: fields.number,
        images: stored.iter().map(|s| s.reference.clone()).collect(),
        created_at: now.clone(),
        updated_at: now,
    };

    let saved = load_user(&state.store, user_id).and_then(|mut user| {
        user.posts.push(post.clone());
        save_user(&state.store, &mut user)?;
        Ok(user)
    });
    match saved {
        Ok(user) => {
            info!("User {} created post {} with {} image(s)", user.username, post.id, post.images.len());
            Ok((user, post))
        }
        Err(e) => {
            remove_all(state.images.as_ref(), &stored).await;
            Err(e)
        }
    }
}

/// Removes a post from the caller's own listings only.
pub fn delete_post(store: &Store, user_id: &str, post_id: &str) -> Result<User, ApiError> {
    let mut user = load_user(store, user_id)?;

    let index = user
        .posts
        .iter()
        .position(|p| p.id == post_id)
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    let removed = user.posts.remove(index);
    save_user(store, &mut user)?;

    info!("User {} deleted post {}", user.username, removed.id);
    Ok(user)
}

/// Every user's username and posts.
pub fn list_all(store: &Store) -> anyhow::Result<Vec<OwnerPosts>> {
    Ok(list_users(store)?
        .into_iter()
        .map(|u| OwnerPosts {
            username: u.username,
            posts: u.posts,
        })
        .collect())
}

pub fn get_post_by_id(store: &Store, post_id: &str) -> Result<Post, ApiError> {
    if validate_uuid(post_id) {
        for user in list_users(store)? {
            if let Some(post) = user.find_post(post_id) {
                return Ok(post.clone());
            }
        }
    }
    Err(ApiError::NotFound("Post not found".to_string()))
}

// === Pagination ===

const MAX_PAGE: usize = 1_000_000;

#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl PageQuery {
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).clamp(1, MAX_PAGE)
    }

    pub fn per_page(&self) -> usize {
        self.per_page.unwrap_or(POSTS_PER_PAGE).clamp(1, MAX_POSTS_PER_PAGE)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.page.saturating_mul(self.per_page) < self.total
    }
}

pub fn paginate<T>(items: Vec<T>, query: &PageQuery) -> Page<T> {
    let page = query.page();
    let per_page = query.per_page();
    let total = items.len();
    let items = items
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .collect();
    Page { items, page, per_page, total }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListedPost {
    pub username: String,
    pub post: Post,
}

pub fn listed_posts(store: &Store) -> anyhow::Result<Vec<ListedPost>> {
    Ok(list_all(store)?
        .into_iter()
        .flat_map(|owner| {
            let username = owner.username;
            owner.posts.into_iter().map(move |post| ListedPost {
                username: username.clone(),
                post,
            })
        })
        .collect())
}

// === View handlers ===

pub async fn listroom_page(state: web::Data<AppState>, auth: ViewUser) -> ViewResult {
    let user = load_user(&state.store, &auth.user_id)?;
    Ok(templates::listroom_page(&user)?)
}

pub async fn upload_post(state: web::Data<AppState>, auth: ViewUser, payload: Multipart) -> ViewResult {
    let form = read_upload_form(payload).await?;
    let (user, _post) = create_post(&state, &auth.user_id, form).await?;
    Ok(templates::profile_page(&user)?)
}

pub async fn delete_post_page(
    state: web::Data<AppState>,
    auth: ViewUser,
    path: web::Path<String>,
) -> ViewResult {
    let user = delete_post(&state.store, &auth.user_id, &path)?;
    Ok(templates::profile_page(&user)?)
}

pub async fn findroom_page(
    state: web::Data<AppState>,
    auth: ViewUser,
    query: web::Query<PageQuery>,
) -> ViewResult {
    let user = load_user(&state.store, &auth.user_id)?;
    let page = paginate(listed_posts(&state.store)?, &query);
    Ok(templates::findroom_page(&user, &page)?)
}

/// Post detail page. Open to anonymous visitors; failures answer in JSON.
pub async fn card_page(
    state: web::Data<AppState>,
    viewer: Option<ViewUser>,
    path: web::Path<String>,
) -> ApiResult {
    let post = get_post_by_id(&state.store, &path)?;
    let viewer = match viewer {
        Some(auth) => find_user(&state.store, &auth.user_id)?,
        None => None,
    };
    Ok(templates::card_page(&post, viewer.as_ref())?)
}

// === API handlers ===

pub async fn api_list_posts(
    state: web::Data<AppState>,
    _auth: ApiUser,
    query: web::Query<PageQuery>,
) -> ApiResult {
    let page = paginate(listed_posts(&state.store)?, &query);
    Ok(HttpResponse::Ok().json(page))
}

pub async fn api_get_post(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let post = get_post_by_id(&state.store, &path)?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn api_create_post(state: web::Data<AppState>, auth: ApiUser, payload: Multipart) -> ApiResult {
    let form = read_upload_form(payload).await?;
    let (_user, post) = create_post(&state, &auth.user_id, form).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Post uploaded successfully",
        "post": post,
    })))
}

pub async fn api_delete_post(
    state: web::Data<AppState>,
    auth: ApiUser,
    path: web::Path<String>,
) -> ApiResult {
    delete_post(&state.store, &auth.user_id, &path)?;
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn valid_fields() -> HashMap<String, String> {
        fields(&[
            ("type", "2 BHK"),
            ("city", "Indore"),
            ("state", "MP"),
            ("location", "Vijay Nagar"),
            ("pincode", "452010"),
            ("area", "Scheme 54"),
            ("description", "Furnished, <i>quiet</i> street"),
            ("price", "8500.50"),
            ("number", "9123456789"),
        ])
    }

    #[test]
    fn valid_fields_are_parsed_and_cleaned() {
        let post = validate_post_fields(&valid_fields()).unwrap();
        assert_eq!(post.kind, "2 BHK");
        assert_eq!(post.pincode, 452010);
        assert_eq!(post.price, 8500.5);
        assert_eq!(post.description, "Furnished, quiet street");
    }

    #[test]
    fn missing_and_malformed_fields_are_all_reported() {
        let mut f = valid_fields();
        f.remove("state");
        f.insert("pincode".to_string(), "abc".to_string());
        f.insert("price".to_string(), "-5".to_string());
        f.insert("city".to_string(), "   ".to_string());

        match validate_post_fields(&f) {
            Err(ApiError::Validation(errors)) => {
                assert_eq!(errors.0.get("state").unwrap(), "State is required.");
                assert_eq!(errors.0.get("pincode").unwrap(), "Pincode must be a number.");
                assert!(errors.0.contains_key("price"));
                assert!(errors.0.contains_key("city"));
                assert_eq!(errors.0.len(), 4);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn pagination_clamps_inputs() {
        let items: Vec<u32> = (0..45).collect();

        let first = paginate(items.clone(), &PageQuery::default());
        assert_eq!(first.items.len(), POSTS_PER_PAGE);
        assert!(first.has_next());

        let last = paginate(items.clone(), &PageQuery { page: Some(3), per_page: None });
        assert_eq!(last.items, (40..45).collect::<Vec<_>>());
        assert!(!last.has_next());

        let zero = paginate(items.clone(), &PageQuery { page: Some(0), per_page: Some(0) });
        assert_eq!(zero.page, 1);
        assert_eq!(zero.items, vec![0]);

        let beyond = paginate(items.clone(), &PageQuery { page: Some(99), per_page: Some(1000) });
        assert_eq!(beyond.per_page, MAX_POSTS_PER_PAGE);
        assert!(beyond.items.is_empty());

        let huge = paginate(items, &PageQuery { page: Some(usize::MAX), per_page: Some(usize::MAX) });
        assert_eq!(huge.page, MAX_PAGE);
        assert!(huge.items.is_empty());
        assert!(!huge.has_next());
    }
}

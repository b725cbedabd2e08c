use std::collections::HashMap;
use std::sync::OnceLock;

use actix_web::HttpResponse;
use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::{Captures, Regex};
use rust_embed::RustEmbed;

use crate::models::models::{Post, User};
use crate::posts::{ListedPost, Page};

#[derive(RustEmbed)]
#[folder = "templates"]
struct Templates;

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\{\{([A-Z_]+)\}\}").expect("Regex should compile"))
}

/// Fills `{{NAME}}` placeholders in one pass; inserted values are not rescanned.
fn render(name: &str, values: &HashMap<&str, String>) -> anyhow::Result<String> {
    let template = Templates::get(name)
        .ok_or_else(|| anyhow::anyhow!("Template {} not found", name))?
        .data
        .to_vec();
    let template = String::from_utf8(template)?;

    Ok(placeholder_regex()
        .replace_all(&template, |caps: &Captures| {
            values.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned())
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

fn page(name: &str, user: Option<&User>, mut values: HashMap<&str, String>) -> anyhow::Result<HttpResponse> {
    values.insert("NAV", nav(user));
    Ok(html(render(name, &values)?))
}

fn nav(user: Option<&User>) -> String {
    match user {
        Some(u) => format!(
            r#"<a href="/index">Home</a><a href="/findroom">Find room</a><a href="/listroom">List room</a><a href="/profile">{}</a><a href="/logout">Logout</a>"#,
            encode_text(&u.username)
        ),
        None => r#"<a href="/">Sign up</a><a href="/login">Login</a>"#.to_string(),
    }
}

/// Remote references are full URLs; local ones are bare file names.
pub fn image_src(reference: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        reference.to_string()
    } else {
        format!("/images/uploads/{}", reference)
    }
}

fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("{:.0}", price)
    } else {
        format!("{:.2}", price)
    }
}

fn post_card(post: &Post, owner: Option<&str>, deletable: bool) -> String {
    let cover = post
        .images
        .first()
        .map(|img| {
            format!(
                r#"<img class="cover" src="{}" alt="room photo">"#,
                encode_double_quoted_attribute(&image_src(img))
            )
        })
        .unwrap_or_else(|| r#"<div class="cover empty">No photos</div>"#.to_string());
    let owner = owner
        .map(|name| format!(r#"<p class="owner">Listed by {}</p>"#, encode_text(name)))
        .unwrap_or_default();
    let delete = if deletable {
        format!(
            r#"<a class="danger" href="/delete/{}">Delete</a>"#,
            encode_double_quoted_attribute(&post.id)
        )
    } else {
        String::new()
    };

    format!(
        r#"<article class="card">{cover}<h3><a href="/card/{id}">{kind} in {city}</a></h3><p>{area}, {location}</p><p class="price">&#8377; {price}</p>{owner}{delete}</article>"#,
        cover = cover,
        id = encode_double_quoted_attribute(&post.id),
        kind = encode_text(&post.kind),
        city = encode_text(&post.city),
        area = encode_text(&post.area),
        location = encode_text(&post.location),
        price = format_price(post.price),
        owner = owner,
        delete = delete,
    )
}

fn empty_state(message: &str) -> String {
    format!(r#"<p class="empty">{}</p>"#, encode_text(message))
}

pub fn signin_page() -> anyhow::Result<HttpResponse> {
    page("signin.html", None, HashMap::new())
}

pub fn login_page() -> anyhow::Result<HttpResponse> {
    page("login.html", None, HashMap::new())
}

pub fn index_page(user: &User) -> anyhow::Result<HttpResponse> {
    let mut values = HashMap::new();
    values.insert("USERNAME", encode_text(&user.username).to_string());
    values.insert("POST_COUNT", user.posts.len().to_string());
    page("index.html", Some(user), values)
}

pub fn listroom_page(user: &User) -> anyhow::Result<HttpResponse> {
    let mut values = HashMap::new();
    values.insert("CONTACT_NUMBER", user.number.to_string());
    page("listroom.html", Some(user), values)
}

pub fn profile_page(user: &User) -> anyhow::Result<HttpResponse> {
    let cards = if user.posts.is_empty() {
        empty_state("You have not listed any rooms yet.")
    } else {
        user.posts.iter().map(|p| post_card(p, None, true)).collect()
    };

    let mut values = HashMap::new();
    values.insert("USERNAME", encode_text(&user.username).to_string());
    values.insert("EMAIL", encode_text(&user.email).to_string());
    values.insert("NUMBER", user.number.to_string());
    values.insert("CITY", encode_double_quoted_attribute(&user.city).to_string());
    values.insert("GENDER", encode_double_quoted_attribute(&user.gender).to_string());
    values.insert("POST_CARDS", cards);
    page("profile.html", Some(user), values)
}

pub fn findroom_page(user: &User, listing: &Page<ListedPost>) -> anyhow::Result<HttpResponse> {
    let cards = if listing.items.is_empty() {
        empty_state("No rooms listed yet.")
    } else {
        listing
            .items
            .iter()
            .map(|l| post_card(&l.post, Some(&l.username), false))
            .collect()
    };

    let mut pager = String::new();
    if listing.page > 1 {
        pager.push_str(&format!(
            r#"<a href="/findroom?page={}&amp;per_page={}">Previous</a>"#,
            listing.page - 1,
            listing.per_page
        ));
    }
    if listing.has_next() {
        pager.push_str(&format!(
            r#"<a href="/findroom?page={}&amp;per_page={}">Next</a>"#,
            listing.page.saturating_add(1),
            listing.per_page
        ));
    }

    let mut values = HashMap::new();
    values.insert("TOTAL", listing.total.to_string());
    values.insert("POST_CARDS", cards);
    values.insert("PAGER", pager);
    page("findroom.html", Some(user), values)
}

pub fn card_page(post: &Post, viewer: Option<&User>) -> anyhow::Result<HttpResponse> {
    let gallery: String = post
        .images
        .iter()
        .map(|img| {
            format!(
                r#"<img src="{}" alt="room photo">"#,
                encode_double_quoted_attribute(&image_src(img))
            )
        })
        .collect();

    let mut values = HashMap::new();
    values.insert("TYPE", encode_text(&post.kind).to_string());
    values.insert("CITY", encode_text(&post.city).to_string());
    values.insert("STATE", encode_text(&post.state).to_string());
    values.insert("LOCATION", encode_text(&post.location).to_string());
    values.insert("AREA", encode_text(&post.area).to_string());
    values.insert("PINCODE", post.pincode.to_string());
    values.insert("PRICE", format_price(post.price));
    values.insert("NUMBER", post.number.to_string());
    values.insert("DESCRIPTION", encode_text(&post.description).to_string());
    values.insert("GALLERY", gallery);
    page("card.html", viewer, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> Post {
        Post {
            id: "6f1c1b7e-93c5-4d1e-9a57-2f0f6d3b8a11".to_string(),
            kind: "PG".to_string(),
            city: "Bhopal".to_string(),
            state: "MP".to_string(),
            location: "MP Nagar".to_string(),
            pincode: 462011,
            area: "Zone 1".to_string(),
            description: "Near <market>".to_string(),
            price: 4000.0,
            number: 9000000000,
            images: vec!["abc.png".to_string(), "https://cdn.example/x.jpg".to_string()],
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn image_sources() {
        assert_eq!(image_src("abc.png"), "/images/uploads/abc.png");
        assert_eq!(image_src("https://cdn.example/x.jpg"), "https://cdn.example/x.jpg");
    }

    #[test]
    fn placeholders_in_values_are_left_alone() {
        let mut values = HashMap::new();
        values.insert("NAV", "{{NAV}}".to_string());
        let out = render("login.html", &values).unwrap();
        assert!(out.contains("{{NAV}}"));
    }

    #[actix_web::test]
    async fn card_escapes_user_text() {
        let resp = card_page(&post(), None).unwrap();
        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("Near &lt;market&gt;"));
        assert!(body.contains(r#"src="/images/uploads/abc.png""#));
        assert!(body.contains(r#"src="https://cdn.example/x.jpg""#));
        assert!(body.contains("4000"));
    }
}

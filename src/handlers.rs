use actix_web::web;

use crate::{auth, posts, static_server, users};

/// Every route of the application.
///
/// Pages answer auth failures with redirects; everything under `/api`
/// answers with JSON and a 401.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(auth::signin_page))
        .route("/register", web::post().to(auth::register))
        .route("/login", web::get().to(auth::login_page))
        .route("/login", web::post().to(auth::login))
        .route("/logout", web::get().to(auth::logout))
        .route("/index", web::get().to(users::index_page))
        .route("/profile", web::get().to(users::profile_page))
        .route("/profile", web::post().to(users::update_profile))
        .route("/listroom", web::get().to(posts::listroom_page))
        .route("/uploadpost", web::post().to(posts::upload_post))
        .route("/delete/{post_id}", web::get().to(posts::delete_post_page))
        .route("/findroom", web::get().to(posts::findroom_page))
        .route("/card/{post_id}", web::get().to(posts::card_page))
        .route("/static/{path:.*}", web::get().to(static_server::serve_static))
        .route("/images/uploads/{name}", web::get().to(static_server::serve_upload))
        .service(
            web::scope("/api")
                .route("/login", web::post().to(auth::api_login))
                .route("/me", web::get().to(users::api_me))
                .route("/posts", web::get().to(posts::api_list_posts))
                .route("/posts", web::post().to(posts::api_create_post))
                .route("/posts/{post_id}", web::get().to(posts::api_get_post))
                .route("/posts/{post_id}", web::delete().to(posts::api_delete_post)),
        );
}

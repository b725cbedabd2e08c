use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub number: i64,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub profileimage: String,
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default, rename = "savePost")]
    pub save_post: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn find_post(&self, post_id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == post_id)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub city: String,
    pub state: String,
    pub location: String,
    pub pincode: i64,
    pub area: String,
    pub description: String,
    pub price: f64,
    pub number: i64,
    #[serde(default)]
    pub images: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Validated listing fields, waiting for their images.
#[derive(Clone, Debug, PartialEq)]
pub struct NewPost {
    pub kind: String,
    pub city: String,
    pub state: String,
    pub location: String,
    pub pincode: i64,
    pub area: String,
    pub description: String,
    pub price: f64,
    pub number: i64,
}

/// Public view of a user, without the password hash.
#[derive(Serialize, Clone, Debug)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub username: String,
    pub number: i64,
    pub city: String,
    pub gender: String,
    pub profileimage: String,
    pub posts: Vec<Post>,
    #[serde(rename = "savePost")]
    pub save_post: Vec<String>,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            email: u.email.clone(),
            username: u.username.clone(),
            number: u.number,
            city: u.city.clone(),
            gender: u.gender.clone(),
            profileimage: u.profileimage.clone(),
            posts: u.posts.clone(),
            save_post: u.save_post.clone(),
        }
    }
}

/// One owner's listings, as returned by the browse endpoints.
#[derive(Serialize, Clone, Debug)]
pub struct OwnerPosts {
    pub username: String,
    pub posts: Vec<Post>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionData {
    pub user_id: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

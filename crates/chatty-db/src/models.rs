/// Database row types — these map directly to SQLite rows.
/// Distinct from chatty-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: Option<String>,
    pub profile_pic: String,
    pub auth_provider: String,
    pub google_id: Option<String>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image: Option<String>,
    pub created_at: String,
}

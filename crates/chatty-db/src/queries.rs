use crate::models::{MessageRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

/// Friend-relationship state machine errors. Preconditions are evaluated by
/// the store itself (WHERE clauses / row constraints), never from a cached
/// view, so a failed transition is always reported against current state.
#[derive(Debug, thiserror::Error)]
pub enum FriendError {
    #[error("you are already friends with this user")]
    AlreadyFriends,
    #[error("a friend request is already pending between you and this user")]
    AlreadyPending,
    #[error("friend request not found or already handled")]
    RequestNotFound,
    #[error("this user is not in your friends list")]
    NotFriends,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for FriendError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.into())
    }
}

/// Errors from user inserts/updates. UNIQUE index violations (username,
/// email, google_id) surface as `Duplicate` — the constraint is the
/// authority, not a pre-check.
#[derive(Debug, thiserror::Error)]
pub enum UserWriteError {
    #[error("username or email already in use")]
    Duplicate,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for UserWriteError {
    fn from(e: rusqlite::Error) -> Self {
        if is_unique_violation(&e) {
            Self::Duplicate
        } else {
            Self::Storage(e.into())
        }
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _)
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
}

/// Canonical unordered pair: friendships are keyed by (lo, hi) with lo < hi.
fn ordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a < b { (a, b) } else { (b, a) }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &UserRow) -> std::result::Result<(), UserWriteError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (id, username, email, password, profile_pic, auth_provider, google_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id,
                user.username,
                user.email,
                user.password,
                user.profile_pic,
                user.auth_provider,
                user.google_id,
                user.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", email))
    }

    pub fn get_user_by_google_id(&self, google_id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "google_id = ?1", google_id))
    }

    /// Resolve a user by username OR email — the form friend requests use.
    pub fn get_user_by_identifier(&self, identifier: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1 OR email = ?1", identifier))
    }

    pub fn username_taken(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<String> = conn
                .query_row(
                    "SELECT id FROM users WHERE username = ?1",
                    [username],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Everyone except the given user, for the chat sidebar.
    pub fn list_users_except(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users u WHERE u.id != ?1 ORDER BY u.username"
            ))?;
            let rows = stmt
                .query_map([user_id], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Partial profile update: NULL arguments leave the column untouched.
    pub fn update_profile(
        &self,
        user_id: &str,
        username: Option<&str>,
        profile_pic: Option<&str>,
    ) -> std::result::Result<(), UserWriteError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE users
             SET username = COALESCE(?2, username),
                 profile_pic = COALESCE(?3, profile_pic)
             WHERE id = ?1",
            params![user_id, username, profile_pic],
        )?;
        Ok(())
    }

    // -- Friend relationship state machine --
    //
    // One friendships row per pair. Transitions:
    //   no row            --send-->    pending (requester = sender)
    //   pending           --accept-->  friends   (receiver only)
    //   pending           --reject-->  no row    (receiver only)
    //   friends           --remove-->  no row
    // Each transition is a single statement whose WHERE clause carries the
    // precondition, so concurrent callers can never half-apply a change.

    pub fn send_friend_request(
        &self,
        sender_id: &str,
        receiver_id: &str,
    ) -> std::result::Result<(), FriendError> {
        let (lo, hi) = ordered_pair(sender_id, receiver_id);
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(anyhow::Error::from)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT state FROM friendships WHERE user_lo = ?1 AND user_hi = ?2",
                [lo, hi],
                |row| row.get(0),
            )
            .optional()?;

        match existing.as_deref() {
            Some("friends") => return Err(FriendError::AlreadyFriends),
            // Covers both "you already sent one" and "they already sent you one"
            Some(_) => return Err(FriendError::AlreadyPending),
            None => {}
        }

        // INSERT OR IGNORE: if another request for the same pair raced past
        // the check above, the primary key rejects it and we report pending.
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO friendships (user_lo, user_hi, state, requester_id, created_at)
             VALUES (?1, ?2, 'pending', ?3, ?4)",
            params![lo, hi, sender_id, now_rfc3339()],
        )?;
        if inserted == 0 {
            return Err(FriendError::AlreadyPending);
        }

        tx.commit().map_err(anyhow::Error::from)?;
        Ok(())
    }

    pub fn accept_friend_request(
        &self,
        receiver_id: &str,
        sender_id: &str,
    ) -> std::result::Result<(), FriendError> {
        let (lo, hi) = ordered_pair(receiver_id, sender_id);
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE friendships SET state = 'friends'
             WHERE user_lo = ?1 AND user_hi = ?2 AND state = 'pending' AND requester_id = ?3",
            params![lo, hi, sender_id],
        )?;
        if updated == 0 {
            return Err(FriendError::RequestNotFound);
        }
        Ok(())
    }

    pub fn reject_friend_request(
        &self,
        receiver_id: &str,
        sender_id: &str,
    ) -> std::result::Result<(), FriendError> {
        let (lo, hi) = ordered_pair(receiver_id, sender_id);
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM friendships
             WHERE user_lo = ?1 AND user_hi = ?2 AND state = 'pending' AND requester_id = ?3",
            params![lo, hi, sender_id],
        )?;
        if deleted == 0 {
            return Err(FriendError::RequestNotFound);
        }
        Ok(())
    }

    pub fn remove_friend(
        &self,
        user_id: &str,
        friend_id: &str,
    ) -> std::result::Result<(), FriendError> {
        let (lo, hi) = ordered_pair(user_id, friend_id);
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM friendships
             WHERE user_lo = ?1 AND user_hi = ?2 AND state = 'friends'",
            params![lo, hi],
        )?;
        if deleted == 0 {
            return Err(FriendError::NotFriends);
        }
        Ok(())
    }

    pub fn list_friends(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.query_partners(user_id, "f.state = 'friends'")
    }

    /// Pending requests sent TO this user (the other side is the requester).
    pub fn list_incoming_requests(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.query_partners(user_id, "f.state = 'pending' AND f.requester_id != ?1")
    }

    /// Pending requests sent BY this user.
    pub fn list_outgoing_requests(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.query_partners(user_id, "f.state = 'pending' AND f.requester_id = ?1")
    }

    fn query_partners(&self, user_id: &str, filter: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM friendships f
                 JOIN users u ON u.id = CASE WHEN f.user_lo = ?1 THEN f.user_hi ELSE f.user_lo END
                 WHERE (f.user_lo = ?1 OR f.user_hi = ?1) AND {filter}
                 ORDER BY u.username"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, image, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    msg.id,
                    msg.sender_id,
                    msg.receiver_id,
                    msg.text,
                    msg.image,
                    msg.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Both directions of a conversation, ascending by creation time.
    pub fn get_conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, text, image, created_at
                 FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map([user_a, user_b], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        text: row.get(3)?,
                        image: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

const USER_COLUMNS: &str =
    "u.id, u.username, u.email, u.password, u.profile_pic, u.auth_provider, u.google_id, u.created_at";

fn query_user(conn: &Connection, filter: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE {filter}");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], map_user_row).optional()?;
    Ok(row)
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        profile_pic: row.get(4)?,
        auth_provider: row.get(5)?,
        google_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

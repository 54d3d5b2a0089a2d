use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL UNIQUE,
            email         TEXT NOT NULL UNIQUE,
            password      TEXT,
            profile_pic   TEXT NOT NULL DEFAULT '',
            auth_provider TEXT NOT NULL DEFAULT 'email'
                          CHECK (auth_provider IN ('email', 'google')),
            google_id     TEXT UNIQUE,
            created_at    TEXT NOT NULL
        );

        -- One row per unordered pair of users. The state machine for a pair
        -- (unrelated / pending / friends) is a single row, so every
        -- transition is one atomic statement.
        CREATE TABLE IF NOT EXISTS friendships (
            user_lo       TEXT NOT NULL REFERENCES users(id),
            user_hi       TEXT NOT NULL REFERENCES users(id),
            state         TEXT NOT NULL CHECK (state IN ('pending', 'friends')),
            requester_id  TEXT NOT NULL REFERENCES users(id),
            created_at    TEXT NOT NULL,
            PRIMARY KEY (user_lo, user_hi),
            CHECK (user_lo < user_hi)
        );

        CREATE INDEX IF NOT EXISTS idx_friendships_hi
            ON friendships(user_hi);

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            sender_id   TEXT NOT NULL REFERENCES users(id),
            receiver_id TEXT NOT NULL REFERENCES users(id),
            text        TEXT,
            image       TEXT,
            created_at  TEXT NOT NULL,
            CHECK (text IS NOT NULL OR image IS NOT NULL)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, receiver_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

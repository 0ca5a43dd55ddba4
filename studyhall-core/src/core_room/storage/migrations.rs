//! Database migrations for the room subsystem
//!
//! Provides versioned migrations for the room storage schema. Each migration
//! is applied atomically and tracked in the room_schema_version table.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current schema version for core_room
pub const CURRENT_ROOM_SCHEMA_VERSION: i32 = 1;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
    pub down_sql: Option<&'static str>,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial room, membership, and invitation schema",
        up_sql: r#"
            -- Schema version tracking for core_room
            CREATE TABLE IF NOT EXISTS room_schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );

            -- Rooms (study groups)
            CREATE TABLE IF NOT EXISTS rooms (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                visibility TEXT NOT NULL CHECK(visibility IN ('Public', 'Private')),
                code TEXT NOT NULL UNIQUE,
                owner_id TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                current_members INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                last_activity INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_rooms_owner ON rooms(owner_id);
            CREATE INDEX IF NOT EXISTS idx_rooms_active ON rooms(is_active, last_activity);

            -- Memberships (join table with roles)
            CREATE TABLE IF NOT EXISTS memberships (
                room_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('Owner', 'Moderator', 'Member')),
                is_favorite INTEGER NOT NULL DEFAULT 0,
                is_silenced INTEGER NOT NULL DEFAULT 0,
                joined_at INTEGER NOT NULL,
                PRIMARY KEY (room_id, user_id),
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_memberships_user ON memberships(user_id);
            CREATE INDEX IF NOT EXISTS idx_memberships_role ON memberships(room_id, role);

            -- Direct invitations
            CREATE TABLE IF NOT EXISTS invitations (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                invitee_id TEXT NOT NULL,
                inviter_id TEXT NOT NULL,
                status TEXT NOT NULL CHECK(status IN ('Pending', 'Accepted', 'Declined', 'Expired')),
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                responded_at INTEGER,
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_invitations_room ON invitations(room_id);
            CREATE INDEX IF NOT EXISTS idx_invitations_invitee ON invitations(invitee_id, status);
            -- At most one live invitation per (room, invitee)
            CREATE UNIQUE INDEX IF NOT EXISTS idx_invitations_pending
                ON invitations(room_id, invitee_id)
                WHERE status = 'Pending';

            -- Access requests
            CREATE TABLE IF NOT EXISTS access_requests (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                message TEXT,
                status TEXT NOT NULL CHECK(status IN ('Pending', 'Approved', 'Rejected')),
                reviewed_by TEXT,
                reviewed_at INTEGER,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_requests_room ON access_requests(room_id, status);
            -- At most one open request per (room, user)
            CREATE UNIQUE INDEX IF NOT EXISTS idx_requests_pending
                ON access_requests(room_id, user_id)
                WHERE status = 'Pending';

            -- Shareable invite links
            CREATE TABLE IF NOT EXISTS invite_links (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                code TEXT NOT NULL UNIQUE,
                created_by TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            -- A room carries at most one active link
            CREATE UNIQUE INDEX IF NOT EXISTS idx_links_active
                ON invite_links(room_id)
                WHERE is_active = 1;

            -- Moderation audit trail (append-only)
            CREATE TABLE IF NOT EXISTS moderation_log (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                moderator_id TEXT NOT NULL,
                target_user_id TEXT NOT NULL,
                action TEXT NOT NULL CHECK(action IN ('Promote', 'Demote', 'Kick')),
                created_at INTEGER NOT NULL,
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_moderation_room ON moderation_log(room_id, created_at);
        "#,
        down_sql: Some(
            r#"
            DROP INDEX IF EXISTS idx_moderation_room;
            DROP TABLE IF EXISTS moderation_log;

            DROP INDEX IF EXISTS idx_links_active;
            DROP TABLE IF EXISTS invite_links;

            DROP INDEX IF EXISTS idx_requests_pending;
            DROP INDEX IF EXISTS idx_requests_room;
            DROP TABLE IF EXISTS access_requests;

            DROP INDEX IF EXISTS idx_invitations_pending;
            DROP INDEX IF EXISTS idx_invitations_invitee;
            DROP INDEX IF EXISTS idx_invitations_room;
            DROP TABLE IF EXISTS invitations;

            DROP INDEX IF EXISTS idx_memberships_role;
            DROP INDEX IF EXISTS idx_memberships_user;
            DROP TABLE IF EXISTS memberships;

            DROP INDEX IF EXISTS idx_rooms_active;
            DROP INDEX IF EXISTS idx_rooms_owner;
            DROP TABLE IF EXISTS rooms;

            DROP TABLE IF EXISTS room_schema_version;
        "#,
        ),
    }]
}

/// Get current schema version from database
fn get_current_version(pool: &Pool<SqliteConnectionManager>) -> Result<i32, rusqlite::Error> {
    let conn = pool.get().map_err(|e| {
        rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to get connection: {}", e),
        )))
    })?;

    // Ensure schema_version table exists
    conn.execute(
        "CREATE TABLE IF NOT EXISTS room_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Result<i32, _> = conn.query_row(
        "SELECT version FROM room_schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    );

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> Result<(), rusqlite::Error> {
    let current_version = get_current_version(pool)?;
    let migrations = get_migrations();

    let pending_migrations: Vec<_> = migrations
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending_migrations.is_empty() {
        return Ok(());
    }

    let conn = pool.get().map_err(|e| {
        rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to get connection: {}", e),
        )))
    })?;

    for migration in pending_migrations {
        let tx = conn.unchecked_transaction()?;

        tx.execute_batch(migration.up_sql)?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as i64;

        tx.execute(
            "INSERT INTO room_schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, now],
        )?;

        tx.commit()?;

        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applied room schema migration"
        );
    }

    Ok(())
}

/// Get the latest migration version available
pub fn get_latest_version() -> i32 {
    get_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}

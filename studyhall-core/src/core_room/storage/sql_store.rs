//! SQL-backed storage for rooms, memberships, invitations, requests, links,
//! and the moderation log
//!
//! The store owns the connection pool and the transaction boundary. Row-level
//! helpers take a plain `&Connection` so the manager can compose several of
//! them inside one `transaction` call; every multi-row operation in the
//! subsystem commits or rolls back as a unit.

use super::super::error::RoomError;
use super::super::invite::{InviteLink, Invitation};
use super::super::membership::Membership;
use super::super::moderation::ModerationEntry;
use super::super::request::AccessRequest;
use super::super::room::Room;
use super::super::types::{
    ConversationId, EntryId, InviteId, InviteStatus, LinkId, ModerationAction, RequestId,
    RequestStatus, Role, RoomId, RoomVisibility, Timestamp, UserId,
};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

/// Pooled SQLite store for the room subsystem
pub struct RoomSqlStore {
    pool: Pool<SqliteConnectionManager>,
}

impl RoomSqlStore {
    /// Create a store over an existing pool and run pending migrations
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Result<Self, RoomError> {
        super::migrations::migrate(&pool)?;
        Ok(Self { pool })
    }

    /// Open a file-backed store
    pub fn open(
        path: &Path,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> Result<Self, RoomError> {
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.busy_timeout(busy_timeout)
        });
        let pool = Pool::builder().max_size(max_connections).build(manager)?;
        Self::new(pool)
    }

    /// Create an in-memory store (tests and ephemeral embedding).
    ///
    /// Each `:memory:` connection is its own database, so the pool is pinned
    /// to a single connection.
    pub fn memory() -> Result<Self, RoomError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.pragma_update(None, "foreign_keys", "ON"));
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::new(pool)
    }

    /// Run `f` inside an IMMEDIATE transaction.
    ///
    /// IMMEDIATE takes the write lock up front, so the precondition reads
    /// inside `f` see a state no concurrent writer can invalidate before
    /// commit. Any error rolls the whole transaction back.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, RoomError>,
    ) -> Result<T, RoomError> {
        let conn = self.pool.get()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run a read-only `f` on a pooled connection
    pub fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, RoomError>,
    ) -> Result<T, RoomError> {
        let conn = self.pool.get()?;
        f(&conn)
    }
}

// ===== Row mapping =====

fn invalid_column(idx: usize, name: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(idx, name.to_string(), rusqlite::types::Type::Text)
}

fn map_room(row: &Row<'_>) -> rusqlite::Result<Room> {
    let visibility_str: String = row.get(3)?;
    let visibility =
        RoomVisibility::parse(&visibility_str).ok_or_else(|| invalid_column(3, "visibility"))?;

    Ok(Room {
        id: RoomId::new(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        visibility,
        code: row.get(4)?,
        owner_id: UserId::new(row.get(5)?),
        conversation_id: ConversationId::new(row.get(6)?),
        current_members: row.get::<_, i64>(7)?.max(0) as u32,
        is_active: row.get::<_, i64>(8)? != 0,
        created_at: Timestamp::from_millis(row.get::<_, i64>(9)?.max(0) as u64),
        last_activity: Timestamp::from_millis(row.get::<_, i64>(10)?.max(0) as u64),
    })
}

fn map_membership(row: &Row<'_>) -> rusqlite::Result<Membership> {
    let role_str: String = row.get(2)?;
    let role = Role::parse(&role_str).ok_or_else(|| invalid_column(2, "role"))?;

    Ok(Membership {
        room_id: RoomId::new(row.get(0)?),
        user_id: UserId::new(row.get(1)?),
        role,
        is_favorite: row.get::<_, i64>(3)? != 0,
        is_silenced: row.get::<_, i64>(4)? != 0,
        joined_at: Timestamp::from_millis(row.get::<_, i64>(5)?.max(0) as u64),
    })
}

fn map_invitation(row: &Row<'_>) -> rusqlite::Result<Invitation> {
    let status_str: String = row.get(4)?;
    let status = InviteStatus::parse(&status_str).ok_or_else(|| invalid_column(4, "status"))?;

    Ok(Invitation {
        id: InviteId::new(row.get(0)?),
        room_id: RoomId::new(row.get(1)?),
        invitee_id: UserId::new(row.get(2)?),
        inviter_id: UserId::new(row.get(3)?),
        status,
        created_at: Timestamp::from_millis(row.get::<_, i64>(5)?.max(0) as u64),
        expires_at: Timestamp::from_millis(row.get::<_, i64>(6)?.max(0) as u64),
        responded_at: row
            .get::<_, Option<i64>>(7)?
            .map(|t| Timestamp::from_millis(t.max(0) as u64)),
    })
}

fn map_request(row: &Row<'_>) -> rusqlite::Result<AccessRequest> {
    let status_str: String = row.get(4)?;
    let status = RequestStatus::parse(&status_str).ok_or_else(|| invalid_column(4, "status"))?;

    Ok(AccessRequest {
        id: RequestId::new(row.get(0)?),
        room_id: RoomId::new(row.get(1)?),
        user_id: UserId::new(row.get(2)?),
        message: row.get(3)?,
        status,
        reviewed_by: row.get::<_, Option<String>>(5)?.map(UserId::new),
        reviewed_at: row
            .get::<_, Option<i64>>(6)?
            .map(|t| Timestamp::from_millis(t.max(0) as u64)),
        created_at: Timestamp::from_millis(row.get::<_, i64>(7)?.max(0) as u64),
    })
}

fn map_link(row: &Row<'_>) -> rusqlite::Result<InviteLink> {
    Ok(InviteLink {
        id: LinkId::new(row.get(0)?),
        room_id: RoomId::new(row.get(1)?),
        code: row.get(2)?,
        created_by: UserId::new(row.get(3)?),
        expires_at: Timestamp::from_millis(row.get::<_, i64>(4)?.max(0) as u64),
        is_active: row.get::<_, i64>(5)? != 0,
    })
}

fn map_entry(row: &Row<'_>) -> rusqlite::Result<ModerationEntry> {
    let action_str: String = row.get(4)?;
    let action =
        ModerationAction::parse(&action_str).ok_or_else(|| invalid_column(4, "action"))?;

    Ok(ModerationEntry {
        id: EntryId::new(row.get(0)?),
        room_id: RoomId::new(row.get(1)?),
        moderator_id: UserId::new(row.get(2)?),
        target_user_id: UserId::new(row.get(3)?),
        action,
        created_at: Timestamp::from_millis(row.get::<_, i64>(5)?.max(0) as u64),
    })
}

const ROOM_COLS: &str =
    "id, name, description, visibility, code, owner_id, conversation_id, current_members, \
     is_active, created_at, last_activity";
const MEMBERSHIP_COLS: &str = "room_id, user_id, role, is_favorite, is_silenced, joined_at";
const INVITATION_COLS: &str =
    "id, room_id, invitee_id, inviter_id, status, created_at, expires_at, responded_at";
const REQUEST_COLS: &str =
    "id, room_id, user_id, message, status, reviewed_by, reviewed_at, created_at";
const LINK_COLS: &str = "id, room_id, code, created_by, expires_at, is_active";
const ENTRY_COLS: &str = "id, room_id, moderator_id, target_user_id, action, created_at";

// ===== Room rows =====

pub fn insert_room(conn: &Connection, room: &Room) -> Result<(), RoomError> {
    conn.execute(
        &format!("INSERT INTO rooms ({ROOM_COLS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
        params![
            &room.id.0,
            &room.name,
            &room.description,
            room.visibility.as_str(),
            &room.code,
            &room.owner_id.0,
            &room.conversation_id.0,
            room.current_members as i64,
            room.is_active as i64,
            room.created_at.as_millis() as i64,
            room.last_activity.as_millis() as i64,
        ],
    )?;
    Ok(())
}

pub fn find_room(conn: &Connection, room_id: &RoomId) -> Result<Option<Room>, RoomError> {
    let room = conn
        .query_row(
            &format!("SELECT {ROOM_COLS} FROM rooms WHERE id = ?"),
            params![&room_id.0],
            map_room,
        )
        .optional()?;
    Ok(room)
}

pub fn find_room_by_code(conn: &Connection, code: &str) -> Result<Option<Room>, RoomError> {
    let room = conn
        .query_row(
            &format!("SELECT {ROOM_COLS} FROM rooms WHERE code = ?"),
            params![code],
            map_room,
        )
        .optional()?;
    Ok(room)
}

pub fn update_room_meta(conn: &Connection, room: &Room) -> Result<(), RoomError> {
    conn.execute(
        "UPDATE rooms SET name = ?, description = ?, visibility = ?, last_activity = ?
         WHERE id = ?",
        params![
            &room.name,
            &room.description,
            room.visibility.as_str(),
            room.last_activity.as_millis() as i64,
            &room.id.0,
        ],
    )?;
    Ok(())
}

pub fn touch_room(conn: &Connection, room_id: &RoomId, now: Timestamp) -> Result<(), RoomError> {
    conn.execute(
        "UPDATE rooms SET last_activity = ? WHERE id = ?",
        params![now.as_millis() as i64, &room_id.0],
    )?;
    Ok(())
}

pub fn set_room_owner(
    conn: &Connection,
    room_id: &RoomId,
    owner_id: &UserId,
) -> Result<(), RoomError> {
    conn.execute(
        "UPDATE rooms SET owner_id = ? WHERE id = ?",
        params![&owner_id.0, &room_id.0],
    )?;
    Ok(())
}

/// Close a room for good; closed rooms stay closed
pub fn deactivate_room(conn: &Connection, room_id: &RoomId) -> Result<(), RoomError> {
    conn.execute(
        "UPDATE rooms SET is_active = 0 WHERE id = ?",
        params![&room_id.0],
    )?;
    Ok(())
}

/// Recompute the stored member count from the memberships table
pub fn sync_member_count(conn: &Connection, room_id: &RoomId) -> Result<u32, RoomError> {
    let count = member_count(conn, room_id)?;
    conn.execute(
        "UPDATE rooms SET current_members = ? WHERE id = ?",
        params![count as i64, &room_id.0],
    )?;
    Ok(count)
}

pub fn code_exists(conn: &Connection, code: &str) -> Result<bool, RoomError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM rooms WHERE code = ?",
            params![code],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn list_active_rooms(conn: &Connection) -> Result<Vec<Room>, RoomError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ROOM_COLS} FROM rooms WHERE is_active = 1 ORDER BY last_activity DESC"
    ))?;
    let rooms = stmt
        .query_map([], map_room)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rooms)
}

/// Active rooms the user belongs to, most recently active first
pub fn rooms_for_user(
    conn: &Connection,
    user_id: &UserId,
) -> Result<Vec<(Room, Membership)>, RoomError> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.name, r.description, r.visibility, r.code, r.owner_id, \
                r.conversation_id, r.current_members, r.is_active, r.created_at, r.last_activity, \
                m.room_id, m.user_id, m.role, m.is_favorite, m.is_silenced, m.joined_at
         FROM rooms r
         JOIN memberships m ON m.room_id = r.id
         WHERE m.user_id = ? AND r.is_active = 1
         ORDER BY r.last_activity DESC",
    )?;
    let rows = stmt
        .query_map(params![&user_id.0], |row| {
            let room = map_room(row)?;
            let role_str: String = row.get(13)?;
            let role = Role::parse(&role_str).ok_or_else(|| invalid_column(13, "role"))?;
            let membership = Membership {
                room_id: RoomId::new(row.get(11)?),
                user_id: UserId::new(row.get(12)?),
                role,
                is_favorite: row.get::<_, i64>(14)? != 0,
                is_silenced: row.get::<_, i64>(15)? != 0,
                joined_at: Timestamp::from_millis(row.get::<_, i64>(16)?.max(0) as u64),
            };
            Ok((room, membership))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Hard-delete a room and everything that references it, dependents first
pub fn delete_room_rows(conn: &Connection, room_id: &RoomId) -> Result<(), RoomError> {
    conn.execute(
        "DELETE FROM invitations WHERE room_id = ?",
        params![&room_id.0],
    )?;
    conn.execute(
        "DELETE FROM access_requests WHERE room_id = ?",
        params![&room_id.0],
    )?;
    conn.execute(
        "DELETE FROM invite_links WHERE room_id = ?",
        params![&room_id.0],
    )?;
    conn.execute(
        "DELETE FROM moderation_log WHERE room_id = ?",
        params![&room_id.0],
    )?;
    conn.execute(
        "DELETE FROM memberships WHERE room_id = ?",
        params![&room_id.0],
    )?;
    conn.execute("DELETE FROM rooms WHERE id = ?", params![&room_id.0])?;
    Ok(())
}

// ===== Membership rows =====

pub fn insert_membership(conn: &Connection, membership: &Membership) -> Result<(), RoomError> {
    conn.execute(
        &format!("INSERT INTO memberships ({MEMBERSHIP_COLS}) VALUES (?, ?, ?, ?, ?, ?)"),
        params![
            &membership.room_id.0,
            &membership.user_id.0,
            membership.role.as_str(),
            membership.is_favorite as i64,
            membership.is_silenced as i64,
            membership.joined_at.as_millis() as i64,
        ],
    )?;
    Ok(())
}

pub fn find_membership(
    conn: &Connection,
    room_id: &RoomId,
    user_id: &UserId,
) -> Result<Option<Membership>, RoomError> {
    let membership = conn
        .query_row(
            &format!("SELECT {MEMBERSHIP_COLS} FROM memberships WHERE room_id = ? AND user_id = ?"),
            params![&room_id.0, &user_id.0],
            map_membership,
        )
        .optional()?;
    Ok(membership)
}

pub fn delete_membership(
    conn: &Connection,
    room_id: &RoomId,
    user_id: &UserId,
) -> Result<bool, RoomError> {
    let rows = conn.execute(
        "DELETE FROM memberships WHERE room_id = ? AND user_id = ?",
        params![&room_id.0, &user_id.0],
    )?;
    Ok(rows > 0)
}

pub fn update_membership_role(
    conn: &Connection,
    room_id: &RoomId,
    user_id: &UserId,
    role: Role,
) -> Result<(), RoomError> {
    conn.execute(
        "UPDATE memberships SET role = ? WHERE room_id = ? AND user_id = ?",
        params![role.as_str(), &room_id.0, &user_id.0],
    )?;
    Ok(())
}

pub fn set_membership_flags(
    conn: &Connection,
    room_id: &RoomId,
    user_id: &UserId,
    is_favorite: bool,
    is_silenced: bool,
) -> Result<(), RoomError> {
    conn.execute(
        "UPDATE memberships SET is_favorite = ?, is_silenced = ? WHERE room_id = ? AND user_id = ?",
        params![
            is_favorite as i64,
            is_silenced as i64,
            &room_id.0,
            &user_id.0
        ],
    )?;
    Ok(())
}

pub fn list_memberships(conn: &Connection, room_id: &RoomId) -> Result<Vec<Membership>, RoomError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEMBERSHIP_COLS} FROM memberships WHERE room_id = ? \
         ORDER BY joined_at ASC, user_id ASC"
    ))?;
    let members = stmt
        .query_map(params![&room_id.0], map_membership)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(members)
}

pub fn member_count(conn: &Connection, room_id: &RoomId) -> Result<u32, RoomError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memberships WHERE room_id = ?",
        params![&room_id.0],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u32)
}

/// Pick the member who inherits ownership when `excluding` leaves:
/// oldest-joined moderator first, then oldest-joined member. Millisecond
/// ties resolve by user id so the choice is deterministic.
pub fn succession_candidate(
    conn: &Connection,
    room_id: &RoomId,
    excluding: &UserId,
) -> Result<Option<Membership>, RoomError> {
    for role in [Role::Moderator, Role::Member] {
        let candidate = conn
            .query_row(
                &format!(
                    "SELECT {MEMBERSHIP_COLS} FROM memberships \
                     WHERE room_id = ? AND user_id != ? AND role = ? \
                     ORDER BY joined_at ASC, user_id ASC LIMIT 1"
                ),
                params![&room_id.0, &excluding.0, role.as_str()],
                map_membership,
            )
            .optional()?;
        if candidate.is_some() {
            return Ok(candidate);
        }
    }
    Ok(None)
}

/// Users holding Owner or Moderator in the room
pub fn authority_ids(conn: &Connection, room_id: &RoomId) -> Result<Vec<UserId>, RoomError> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM memberships \
         WHERE room_id = ? AND role IN ('Owner', 'Moderator') \
         ORDER BY joined_at ASC",
    )?;
    let ids = stmt
        .query_map(params![&room_id.0], |row| {
            Ok(UserId::new(row.get(0)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

// ===== Invitation rows =====

pub fn insert_invitation(conn: &Connection, invitation: &Invitation) -> Result<(), RoomError> {
    conn.execute(
        &format!("INSERT INTO invitations ({INVITATION_COLS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"),
        params![
            &invitation.id.0,
            &invitation.room_id.0,
            &invitation.invitee_id.0,
            &invitation.inviter_id.0,
            invitation.status.as_str(),
            invitation.created_at.as_millis() as i64,
            invitation.expires_at.as_millis() as i64,
            invitation.responded_at.map(|t| t.as_millis() as i64),
        ],
    )?;
    Ok(())
}

pub fn find_invitation(
    conn: &Connection,
    invite_id: &InviteId,
) -> Result<Option<Invitation>, RoomError> {
    let invitation = conn
        .query_row(
            &format!("SELECT {INVITATION_COLS} FROM invitations WHERE id = ?"),
            params![&invite_id.0],
            map_invitation,
        )
        .optional()?;
    Ok(invitation)
}

pub fn update_invitation(conn: &Connection, invitation: &Invitation) -> Result<(), RoomError> {
    conn.execute(
        "UPDATE invitations SET status = ?, responded_at = ? WHERE id = ?",
        params![
            invitation.status.as_str(),
            invitation.responded_at.map(|t| t.as_millis() as i64),
            &invitation.id.0,
        ],
    )?;
    Ok(())
}

pub fn pending_invitation(
    conn: &Connection,
    room_id: &RoomId,
    invitee_id: &UserId,
) -> Result<Option<Invitation>, RoomError> {
    let invitation = conn
        .query_row(
            &format!(
                "SELECT {INVITATION_COLS} FROM invitations \
                 WHERE room_id = ? AND invitee_id = ? AND status = 'Pending'"
            ),
            params![&room_id.0, &invitee_id.0],
            map_invitation,
        )
        .optional()?;
    Ok(invitation)
}

/// Retire every other Pending invitation for the same (room, invitee).
/// The partial unique index makes extras impossible for new data; this keeps
/// databases that predate the index honest.
pub fn expire_other_pending(
    conn: &Connection,
    room_id: &RoomId,
    invitee_id: &UserId,
    keep: &InviteId,
) -> Result<usize, RoomError> {
    let rows = conn.execute(
        "UPDATE invitations SET status = 'Expired' \
         WHERE room_id = ? AND invitee_id = ? AND status = 'Pending' AND id != ?",
        params![&room_id.0, &invitee_id.0, &keep.0],
    )?;
    Ok(rows)
}

/// Drop Pending invitations for a removed member and report which ones went
pub fn purge_pending_invitations(
    conn: &Connection,
    room_id: &RoomId,
    invitee_id: &UserId,
) -> Result<Vec<InviteId>, RoomError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM invitations \
         WHERE room_id = ? AND invitee_id = ? AND status = 'Pending'",
    )?;
    let ids: Vec<InviteId> = stmt
        .query_map(params![&room_id.0, &invitee_id.0], |row| {
            Ok(InviteId::new(row.get(0)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for id in &ids {
        conn.execute("DELETE FROM invitations WHERE id = ?", params![&id.0])?;
    }
    Ok(ids)
}

pub fn delete_invitation(conn: &Connection, invite_id: &InviteId) -> Result<bool, RoomError> {
    let rows = conn.execute(
        "DELETE FROM invitations WHERE id = ?",
        params![&invite_id.0],
    )?;
    Ok(rows > 0)
}

pub fn list_invitations_for_room(
    conn: &Connection,
    room_id: &RoomId,
) -> Result<Vec<Invitation>, RoomError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INVITATION_COLS} FROM invitations WHERE room_id = ? ORDER BY created_at DESC"
    ))?;
    let invitations = stmt
        .query_map(params![&room_id.0], map_invitation)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(invitations)
}

/// Live Pending invitations addressed to the user
pub fn pending_invitations_for_user(
    conn: &Connection,
    user_id: &UserId,
    now: Timestamp,
) -> Result<Vec<Invitation>, RoomError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INVITATION_COLS} FROM invitations \
         WHERE invitee_id = ? AND status = 'Pending' AND expires_at > ? \
         ORDER BY created_at DESC"
    ))?;
    let invitations = stmt
        .query_map(
            params![&user_id.0, now.as_millis() as i64],
            map_invitation,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(invitations)
}

/// Mark every Pending invitation past its window Expired; returns how many
pub fn prune_expired_invitations(conn: &Connection, now: Timestamp) -> Result<usize, RoomError> {
    let rows = conn.execute(
        "UPDATE invitations SET status = 'Expired' \
         WHERE status = 'Pending' AND expires_at <= ?",
        params![now.as_millis() as i64],
    )?;
    Ok(rows)
}

// ===== Access request rows =====

pub fn insert_request(conn: &Connection, request: &AccessRequest) -> Result<(), RoomError> {
    conn.execute(
        &format!("INSERT INTO access_requests ({REQUEST_COLS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"),
        params![
            &request.id.0,
            &request.room_id.0,
            &request.user_id.0,
            &request.message,
            request.status.as_str(),
            request.reviewed_by.as_ref().map(|id| id.0.clone()),
            request.reviewed_at.map(|t| t.as_millis() as i64),
            request.created_at.as_millis() as i64,
        ],
    )?;
    Ok(())
}

pub fn find_request(
    conn: &Connection,
    request_id: &RequestId,
) -> Result<Option<AccessRequest>, RoomError> {
    let request = conn
        .query_row(
            &format!("SELECT {REQUEST_COLS} FROM access_requests WHERE id = ?"),
            params![&request_id.0],
            map_request,
        )
        .optional()?;
    Ok(request)
}

pub fn update_request(conn: &Connection, request: &AccessRequest) -> Result<(), RoomError> {
    conn.execute(
        "UPDATE access_requests SET status = ?, reviewed_by = ?, reviewed_at = ? WHERE id = ?",
        params![
            request.status.as_str(),
            request.reviewed_by.as_ref().map(|id| id.0.clone()),
            request.reviewed_at.map(|t| t.as_millis() as i64),
            &request.id.0,
        ],
    )?;
    Ok(())
}

pub fn pending_request(
    conn: &Connection,
    room_id: &RoomId,
    user_id: &UserId,
) -> Result<Option<AccessRequest>, RoomError> {
    let request = conn
        .query_row(
            &format!(
                "SELECT {REQUEST_COLS} FROM access_requests \
                 WHERE room_id = ? AND user_id = ? AND status = 'Pending'"
            ),
            params![&room_id.0, &user_id.0],
            map_request,
        )
        .optional()?;
    Ok(request)
}

/// Open requests for the room, oldest first
pub fn list_pending_requests(
    conn: &Connection,
    room_id: &RoomId,
) -> Result<Vec<AccessRequest>, RoomError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REQUEST_COLS} FROM access_requests \
         WHERE room_id = ? AND status = 'Pending' ORDER BY created_at ASC"
    ))?;
    let requests = stmt
        .query_map(params![&room_id.0], map_request)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(requests)
}

// ===== Invite link rows =====

pub fn insert_link(conn: &Connection, link: &InviteLink) -> Result<(), RoomError> {
    conn.execute(
        &format!("INSERT INTO invite_links ({LINK_COLS}) VALUES (?, ?, ?, ?, ?, ?)"),
        params![
            &link.id.0,
            &link.room_id.0,
            &link.code,
            &link.created_by.0,
            link.expires_at.as_millis() as i64,
            link.is_active as i64,
        ],
    )?;
    Ok(())
}

pub fn find_link_by_code(conn: &Connection, code: &str) -> Result<Option<InviteLink>, RoomError> {
    let link = conn
        .query_row(
            &format!("SELECT {LINK_COLS} FROM invite_links WHERE code = ?"),
            params![code],
            map_link,
        )
        .optional()?;
    Ok(link)
}

pub fn active_link(conn: &Connection, room_id: &RoomId) -> Result<Option<InviteLink>, RoomError> {
    let link = conn
        .query_row(
            &format!("SELECT {LINK_COLS} FROM invite_links WHERE room_id = ? AND is_active = 1"),
            params![&room_id.0],
            map_link,
        )
        .optional()?;
    Ok(link)
}

/// Deactivate whatever link is currently active for the room
pub fn deactivate_links(conn: &Connection, room_id: &RoomId) -> Result<usize, RoomError> {
    let rows = conn.execute(
        "UPDATE invite_links SET is_active = 0 WHERE room_id = ? AND is_active = 1",
        params![&room_id.0],
    )?;
    Ok(rows)
}

pub fn link_code_exists(conn: &Connection, code: &str) -> Result<bool, RoomError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM invite_links WHERE code = ?",
            params![code],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

// ===== Moderation rows =====

pub fn insert_log_entry(conn: &Connection, entry: &ModerationEntry) -> Result<(), RoomError> {
    conn.execute(
        &format!("INSERT INTO moderation_log ({ENTRY_COLS}) VALUES (?, ?, ?, ?, ?, ?)"),
        params![
            &entry.id.0,
            &entry.room_id.0,
            &entry.moderator_id.0,
            &entry.target_user_id.0,
            entry.action.as_str(),
            entry.created_at.as_millis() as i64,
        ],
    )?;
    Ok(())
}

pub fn list_log_entries(
    conn: &Connection,
    room_id: &RoomId,
) -> Result<Vec<ModerationEntry>, RoomError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLS} FROM moderation_log WHERE room_id = ? ORDER BY created_at ASC, id ASC"
    ))?;
    let entries = stmt
        .query_map(params![&room_id.0], map_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_store() -> RoomSqlStore {
        RoomSqlStore::memory().expect("store")
    }

    fn sample_room(owner: &str) -> Room {
        Room::new(
            "Algorithms".to_string(),
            None,
            RoomVisibility::Private,
            "ABC234".to_string(),
            UserId::new(owner.to_string()),
            ConversationId::generate(),
        )
    }

    #[test]
    fn test_insert_and_find_room() {
        let store = setup_store();
        let room = sample_room("alice");

        store
            .transaction(|tx| insert_room(tx, &room))
            .unwrap();

        let found = store.read(|c| find_room(c, &room.id)).unwrap().unwrap();
        assert_eq!(found.name, "Algorithms");
        assert_eq!(found.owner_id.0, "alice");
        assert!(found.is_active);
        assert_eq!(found.code, "ABC234");

        let by_code = store
            .read(|c| find_room_by_code(c, "ABC234"))
            .unwrap()
            .unwrap();
        assert_eq!(by_code.id, room.id);
        assert!(store.read(|c| code_exists(c, "ABC234")).unwrap());
        assert!(!store.read(|c| code_exists(c, "ZZZ999")).unwrap());
    }

    #[test]
    fn test_member_count_sync() {
        let store = setup_store();
        let room = sample_room("alice");

        store
            .transaction(|tx| {
                insert_room(tx, &room)?;
                insert_membership(tx, &Membership::owner(room.id.clone(), room.owner_id.clone()))?;
                insert_membership(
                    tx,
                    &Membership::member(room.id.clone(), UserId::new("bob".to_string())),
                )?;
                let count = sync_member_count(tx, &room.id)?;
                assert_eq!(count, 2);
                Ok(())
            })
            .unwrap();

        let found = store.read(|c| find_room(c, &room.id)).unwrap().unwrap();
        assert_eq!(found.current_members, 2);
    }

    #[test]
    fn test_succession_prefers_oldest_moderator() {
        let store = setup_store();
        let room = sample_room("alice");
        let owner = room.owner_id.clone();

        store
            .transaction(|tx| {
                insert_room(tx, &room)?;
                insert_membership(tx, &Membership::owner(room.id.clone(), owner.clone()))?;

                let mut early_member = Membership::member(room.id.clone(), UserId::new("bob".into()));
                early_member.joined_at = Timestamp::from_millis(1_000);
                insert_membership(tx, &early_member)?;

                let mut late_moderator =
                    Membership::member(room.id.clone(), UserId::new("carol".into()));
                late_moderator.role = Role::Moderator;
                late_moderator.joined_at = Timestamp::from_millis(5_000);
                insert_membership(tx, &late_moderator)?;

                Ok(())
            })
            .unwrap();

        let candidate = store
            .read(|c| succession_candidate(c, &room.id, &owner))
            .unwrap()
            .unwrap();
        // The moderator wins despite joining later
        assert_eq!(candidate.user_id.0, "carol");
    }

    #[test]
    fn test_succession_tie_breaks_on_user_id() {
        let store = setup_store();
        let room = sample_room("alice");
        let owner = room.owner_id.clone();

        store
            .transaction(|tx| {
                insert_room(tx, &room)?;
                insert_membership(tx, &Membership::owner(room.id.clone(), owner.clone()))?;
                for name in ["zara", "bob"] {
                    let mut m = Membership::member(room.id.clone(), UserId::new(name.into()));
                    m.joined_at = Timestamp::from_millis(1_000);
                    insert_membership(tx, &m)?;
                }
                Ok(())
            })
            .unwrap();

        let candidate = store
            .read(|c| succession_candidate(c, &room.id, &owner))
            .unwrap()
            .unwrap();
        assert_eq!(candidate.user_id.0, "bob");
    }

    #[test]
    fn test_succession_candidate_none_when_alone() {
        let store = setup_store();
        let room = sample_room("alice");
        let owner = room.owner_id.clone();

        store
            .transaction(|tx| {
                insert_room(tx, &room)?;
                insert_membership(tx, &Membership::owner(room.id.clone(), owner.clone()))
            })
            .unwrap();

        let candidate = store
            .read(|c| succession_candidate(c, &room.id, &owner))
            .unwrap();
        assert!(candidate.is_none());
    }

    #[test]
    fn test_pending_invitation_lookup_and_purge() {
        let store = setup_store();
        let room = sample_room("alice");
        let bob = UserId::new("bob".to_string());

        let invitation = Invitation::new(
            room.id.clone(),
            bob.clone(),
            room.owner_id.clone(),
            Duration::from_secs(3600),
        );

        store
            .transaction(|tx| {
                insert_room(tx, &room)?;
                insert_invitation(tx, &invitation)
            })
            .unwrap();

        let pending = store
            .read(|c| pending_invitation(c, &room.id, &bob))
            .unwrap();
        assert!(pending.is_some());

        let purged = store
            .transaction(|tx| purge_pending_invitations(tx, &room.id, &bob))
            .unwrap();
        assert_eq!(purged, vec![invitation.id.clone()]);

        let pending = store
            .read(|c| pending_invitation(c, &room.id, &bob))
            .unwrap();
        assert!(pending.is_none());
    }

    #[test]
    fn test_prune_expired_invitations() {
        let store = setup_store();
        let room = sample_room("alice");
        let fresh = Invitation::new(
            room.id.clone(),
            UserId::new("bob".into()),
            room.owner_id.clone(),
            Duration::from_secs(3600),
        );
        let stale = Invitation::new(
            room.id.clone(),
            UserId::new("carol".into()),
            room.owner_id.clone(),
            Duration::from_secs(0),
        );

        store
            .transaction(|tx| {
                insert_room(tx, &room)?;
                insert_invitation(tx, &fresh)?;
                insert_invitation(tx, &stale)
            })
            .unwrap();

        let pruned = store
            .transaction(|tx| prune_expired_invitations(tx, Timestamp::now()))
            .unwrap();
        assert_eq!(pruned, 1);

        let kept = store
            .read(|c| find_invitation(c, &fresh.id))
            .unwrap()
            .unwrap();
        assert_eq!(kept.status, InviteStatus::Pending);
        let expired = store
            .read(|c| find_invitation(c, &stale.id))
            .unwrap()
            .unwrap();
        assert_eq!(expired.status, InviteStatus::Expired);
    }

    #[test]
    fn test_active_link_rotation() {
        let store = setup_store();
        let room = sample_room("alice");
        let first = InviteLink::new(
            room.id.clone(),
            "CODEAAAAAA".to_string(),
            room.owner_id.clone(),
            Duration::from_secs(3600),
        );

        store
            .transaction(|tx| {
                insert_room(tx, &room)?;
                insert_link(tx, &first)
            })
            .unwrap();

        let second = InviteLink::new(
            room.id.clone(),
            "CODEBBBBBB".to_string(),
            room.owner_id.clone(),
            Duration::from_secs(3600),
        );
        store
            .transaction(|tx| {
                assert_eq!(deactivate_links(tx, &room.id)?, 1);
                insert_link(tx, &second)
            })
            .unwrap();

        let active = store
            .read(|c| active_link(c, &room.id))
            .unwrap()
            .unwrap();
        assert_eq!(active.code, "CODEBBBBBB");
        assert!(store.read(|c| link_code_exists(c, "CODEAAAAAA")).unwrap());
    }

    #[test]
    fn test_delete_room_rows_clears_everything() {
        let store = setup_store();
        let room = sample_room("alice");
        let bob = UserId::new("bob".to_string());

        store
            .transaction(|tx| {
                insert_room(tx, &room)?;
                insert_membership(tx, &Membership::owner(room.id.clone(), room.owner_id.clone()))?;
                insert_invitation(
                    tx,
                    &Invitation::new(
                        room.id.clone(),
                        bob.clone(),
                        room.owner_id.clone(),
                        Duration::from_secs(3600),
                    ),
                )?;
                insert_request(tx, &AccessRequest::new(room.id.clone(), bob.clone(), None))?;
                insert_link(
                    tx,
                    &InviteLink::new(
                        room.id.clone(),
                        "CODECCCCCC".to_string(),
                        room.owner_id.clone(),
                        Duration::from_secs(3600),
                    ),
                )?;
                insert_log_entry(
                    tx,
                    &ModerationEntry::new(
                        room.id.clone(),
                        room.owner_id.clone(),
                        bob.clone(),
                        ModerationAction::Kick,
                    ),
                )?;
                Ok(())
            })
            .unwrap();

        store
            .transaction(|tx| delete_room_rows(tx, &room.id))
            .unwrap();

        assert!(store.read(|c| find_room(c, &room.id)).unwrap().is_none());
        assert_eq!(store.read(|c| member_count(c, &room.id)).unwrap(), 0);
        assert!(store
            .read(|c| list_invitations_for_room(c, &room.id))
            .unwrap()
            .is_empty());
        assert!(store
            .read(|c| list_pending_requests(c, &room.id))
            .unwrap()
            .is_empty());
        assert!(store.read(|c| active_link(c, &room.id)).unwrap().is_none());
        assert!(store
            .read(|c| list_log_entries(c, &room.id))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_rooms_for_user_skips_inactive() {
        let store = setup_store();
        let alice = UserId::new("alice".to_string());

        let active = sample_room("alice");
        let mut closed = sample_room("alice");
        closed.code = "XYZ789".to_string();

        store
            .transaction(|tx| {
                insert_room(tx, &active)?;
                insert_membership(tx, &Membership::owner(active.id.clone(), alice.clone()))?;
                insert_room(tx, &closed)?;
                insert_membership(tx, &Membership::owner(closed.id.clone(), alice.clone()))?;
                deactivate_room(tx, &closed.id)
            })
            .unwrap();

        let rooms = store.read(|c| rooms_for_user(c, &alice)).unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].0.id, active.id);
        assert_eq!(rooms[0].1.role, Role::Owner);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = setup_store();
        let room = sample_room("alice");

        let result: Result<(), RoomError> = store.transaction(|tx| {
            insert_room(tx, &room)?;
            Err(RoomError::Internal("boom".into()))
        });
        assert!(result.is_err());

        assert!(store.read(|c| find_room(c, &room.id)).unwrap().is_none());
    }
}

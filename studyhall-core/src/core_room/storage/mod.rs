//! Storage layer for rooms and their membership lifecycle
//!
//! Provides SQL-based persistence for rooms, memberships, invitations,
//! access requests, invite links, and the moderation log.

pub mod migrations;
pub mod sql_store;

pub use migrations::{migrate, CURRENT_ROOM_SCHEMA_VERSION};
pub use sql_store::RoomSqlStore;

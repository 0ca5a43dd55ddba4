//! StudyHall core: rooms, memberships, and the admission workflows around them.

pub mod config;
pub mod core_notify;
pub mod core_room;
pub mod logging;
pub mod metrics;

pub use config::Config;
pub use core_notify::{EventNotifier, RoomEvent, SessionRegistry};
pub use core_room::{
    AsyncRoomManager, LeaveOutcome, Membership, Room, RoomError, RoomManagerImpl, RoomSqlStore,
};
pub use logging::{init_logging, LogLevel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Ensure the main exports are accessible
        let _ = LogLevel::Info;
        let _ = LeaveOutcome::MemberLeft;
    }
}

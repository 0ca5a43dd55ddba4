//! Manager trait implementations: the room lifecycle state machine
//!
//! Every mutating operation runs its precondition reads and writes inside one
//! IMMEDIATE transaction, then emits best-effort notifications strictly after
//! commit. Conversation mirroring is also post-commit; a failure there is
//! logged and never unwinds committed room state.

use super::codes::{JoinCodeGenerator, LINK_CODE_LEN, ROOM_CODE_LEN};
use super::conversation::ConversationBinder;
use super::error::RoomError;
use super::friendship::FriendshipOracle;
use super::invite::{InviteLink, Invitation};
use super::manager::{
    AccessRequestWorkflow, InvitationWorkflow, LeaveOutcome, RoomAuthority,
};
use super::membership::Membership;
use super::moderation::ModerationEntry;
use super::request::AccessRequest;
use super::room::{Room, DESCRIPTION_MAX_LEN, NAME_MAX_LEN, NAME_MIN_LEN};
use super::storage::sql_store::{self as sql, RoomSqlStore};
use super::types::{
    ConversationId, InviteId, InviteStatus, ModerationAction, RequestId, RequestStatus, Role,
    RoomId, RoomVisibility, Timestamp, UserId,
};
use crate::core_notify::{EventNotifier, RoomEvent};
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default acceptance window for a direct invitation
pub const DEFAULT_INVITE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default lifetime of a shareable invite link
pub const DEFAULT_LINK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Tunables for code shapes and invitation windows
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub room_code_length: usize,
    pub link_code_length: usize,
    pub invite_ttl: Duration,
    pub link_ttl: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            room_code_length: ROOM_CODE_LEN,
            link_code_length: LINK_CODE_LEN,
            invite_ttl: DEFAULT_INVITE_TTL,
            link_ttl: DEFAULT_LINK_TTL,
        }
    }
}

/// Manager implementation over the SQL store and the external seams
pub struct RoomManagerImpl {
    store: RoomSqlStore,
    notifier: Arc<dyn EventNotifier>,
    conversations: Arc<dyn ConversationBinder>,
    friendships: Arc<dyn FriendshipOracle>,
    room_codes: JoinCodeGenerator,
    link_codes: JoinCodeGenerator,
    invite_ttl: Duration,
    link_ttl: Duration,
}

impl RoomManagerImpl {
    /// Create a manager with default settings
    pub fn new(
        store: RoomSqlStore,
        notifier: Arc<dyn EventNotifier>,
        conversations: Arc<dyn ConversationBinder>,
        friendships: Arc<dyn FriendshipOracle>,
    ) -> Self {
        Self::with_settings(
            store,
            notifier,
            conversations,
            friendships,
            ManagerSettings::default(),
        )
    }

    /// Create a manager with explicit settings
    pub fn with_settings(
        store: RoomSqlStore,
        notifier: Arc<dyn EventNotifier>,
        conversations: Arc<dyn ConversationBinder>,
        friendships: Arc<dyn FriendshipOracle>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            conversations,
            friendships,
            room_codes: JoinCodeGenerator::new(settings.room_code_length),
            link_codes: JoinCodeGenerator::new(settings.link_code_length),
            invite_ttl: settings.invite_ttl,
            link_ttl: settings.link_ttl,
        }
    }

    /// Validate a room name
    fn validate_room_name(name: &str) -> Result<(), RoomError> {
        let len = name.chars().count();
        if len < NAME_MIN_LEN || len > NAME_MAX_LEN {
            return Err(RoomError::BadRequest(format!(
                "room name must be {NAME_MIN_LEN}-{NAME_MAX_LEN} characters"
            )));
        }
        Ok(())
    }

    /// Validate a room description
    fn validate_description(description: &str) -> Result<(), RoomError> {
        if description.chars().count() > DESCRIPTION_MAX_LEN {
            return Err(RoomError::BadRequest(format!(
                "room description must be at most {DESCRIPTION_MAX_LEN} characters"
            )));
        }
        Ok(())
    }

    /// The room, provided it exists and is still active
    fn require_active_room(conn: &Connection, room_id: &RoomId) -> Result<Room, RoomError> {
        match sql::find_room(conn, room_id)? {
            Some(room) if room.is_active => Ok(room),
            _ => Err(RoomError::NotFound("room")),
        }
    }

    /// The caller's membership, as an access gate: absent means Forbidden
    fn check_membership(
        conn: &Connection,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<Membership, RoomError> {
        sql::find_membership(conn, room_id, user_id)?.ok_or_else(RoomError::forbidden)
    }

    /// The caller's membership, requiring Owner or Moderator
    fn check_authority(
        conn: &Connection,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<Membership, RoomError> {
        let membership = Self::check_membership(conn, room_id, user_id)?;
        if !membership.is_authority() {
            return Err(RoomError::forbidden());
        }
        Ok(membership)
    }

    /// A membership acted upon, as an entity lookup: absent means NotFound
    fn target_membership(
        conn: &Connection,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<Membership, RoomError> {
        sql::find_membership(conn, room_id, user_id)?.ok_or(RoomError::NotFound("membership"))
    }

    /// Insert a Member row and bring the count and activity stamp with it
    fn admit_member(
        conn: &Connection,
        room_id: &RoomId,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<Membership, RoomError> {
        let membership = Membership::member(room_id.clone(), user_id.clone());
        sql::insert_membership(conn, &membership)?;
        sql::sync_member_count(conn, room_id)?;
        sql::touch_room(conn, room_id, now)?;
        Ok(membership)
    }

    /// The join gate: the owner always passes; everyone else needs an
    /// accepted friendship with the owner, whatever the room's visibility
    fn join_gate(&self, room: &Room, user_id: &UserId) -> Result<(), RoomError> {
        if &room.owner_id == user_id || self.friendships.is_connected(user_id, &room.owner_id) {
            return Ok(());
        }
        Err(RoomError::needs_permission())
    }

    fn conversation_add(&self, conversation_id: &ConversationId, user_id: &UserId) {
        if let Err(err) = self.conversations.add_participant(conversation_id, user_id) {
            warn!(%conversation_id, %user_id, %err, "failed to mirror member into conversation");
        }
    }

    fn conversation_remove(&self, conversation_id: &ConversationId, user_id: &UserId) {
        if let Err(err) = self.conversations.remove_participant(conversation_id, user_id) {
            warn!(%conversation_id, %user_id, %err, "failed to remove member from conversation");
        }
    }
}

impl RoomAuthority for RoomManagerImpl {
    fn create_room(
        &mut self,
        creator: UserId,
        name: String,
        description: Option<String>,
        visibility: RoomVisibility,
    ) -> Result<Room, RoomError> {
        Self::validate_room_name(&name)?;
        if let Some(ref description) = description {
            Self::validate_description(description)?;
        }

        let code = self
            .room_codes
            .generate_unique(|candidate| self.store.read(|conn| sql::code_exists(conn, candidate)))?;

        // The conversation comes first so its id rides on the room row
        let conversation_id = self.conversations.create_conversation()?;
        let mut room = Room::new(
            name,
            description,
            visibility,
            code,
            creator.clone(),
            conversation_id.clone(),
        );
        let membership = Membership::owner(room.id.clone(), creator.clone());

        let committed = self.store.transaction(|tx| {
            sql::insert_room(tx, &room)?;
            sql::insert_membership(tx, &membership)?;
            sql::sync_member_count(tx, &room.id)?;
            Ok(())
        });

        if let Err(err) = committed {
            // The conversation must not outlive the room that never was
            if let Err(cleanup) = self.conversations.delete_conversation(&conversation_id) {
                warn!(%conversation_id, %cleanup, "failed to clean up conversation after aborted create");
            }
            return Err(err);
        }

        self.conversation_add(&conversation_id, &creator);
        crate::metrics::room_created();
        info!(room_id = %room.id, owner = %creator, "room created");

        room.current_members = 1;
        Ok(room)
    }

    fn get_room(&self, room_id: &RoomId) -> Result<Room, RoomError> {
        self.store
            .read(|conn| Self::require_active_room(conn, room_id))
    }

    fn list_rooms_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<(Room, Membership)>, RoomError> {
        self.store.read(|conn| sql::rooms_for_user(conn, user_id))
    }

    fn list_members(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<Vec<Membership>, RoomError> {
        self.store.read(|conn| {
            Self::require_active_room(conn, room_id)?;
            Self::check_membership(conn, room_id, actor)?;
            sql::list_memberships(conn, room_id)
        })
    }

    fn update_room(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        name: Option<String>,
        description: Option<String>,
        visibility: Option<RoomVisibility>,
    ) -> Result<Room, RoomError> {
        self.store.transaction(|tx| {
            let mut room = Self::require_active_room(tx, room_id)?;
            if &room.owner_id != actor {
                return Err(RoomError::forbidden());
            }

            if let Some(new_name) = name {
                Self::validate_room_name(&new_name)?;
                room.name = new_name;
            }
            if let Some(new_description) = description {
                Self::validate_description(&new_description)?;
                room.description = Some(new_description);
            }
            if let Some(new_visibility) = visibility {
                room.visibility = new_visibility;
            }
            room.touch();

            sql::update_room_meta(tx, &room)?;
            Ok(room)
        })
    }

    fn set_favorite(
        &mut self,
        user_id: &UserId,
        room_id: &RoomId,
        is_favorite: bool,
    ) -> Result<Membership, RoomError> {
        self.store.transaction(|tx| {
            Self::require_active_room(tx, room_id)?;
            let mut membership = Self::target_membership(tx, room_id, user_id)?;
            membership.is_favorite = is_favorite;
            sql::set_membership_flags(
                tx,
                room_id,
                user_id,
                membership.is_favorite,
                membership.is_silenced,
            )?;
            Ok(membership)
        })
    }

    fn set_silenced(
        &mut self,
        user_id: &UserId,
        room_id: &RoomId,
        is_silenced: bool,
    ) -> Result<Membership, RoomError> {
        self.store.transaction(|tx| {
            Self::require_active_room(tx, room_id)?;
            let mut membership = Self::target_membership(tx, room_id, user_id)?;
            membership.is_silenced = is_silenced;
            sql::set_membership_flags(
                tx,
                room_id,
                user_id,
                membership.is_favorite,
                membership.is_silenced,
            )?;
            Ok(membership)
        })
    }

    fn join_room(&mut self, user_id: UserId, room_id: &RoomId) -> Result<Membership, RoomError> {
        let now = Timestamp::now();
        let (membership, room, newly_joined) = self.store.transaction(|tx| {
            let room = Self::require_active_room(tx, room_id)?;
            self.join_gate(&room, &user_id)?;

            // Past the gate, re-joining is a no-op
            if let Some(existing) = sql::find_membership(tx, room_id, &user_id)? {
                return Ok((existing, room, false));
            }

            let membership = Self::admit_member(tx, room_id, &user_id, now)?;
            Ok((membership, room, true))
        })?;

        if newly_joined {
            self.conversation_add(&room.conversation_id, &user_id);
            self.notifier.notify_room(
                room_id,
                RoomEvent::MemberJoined {
                    room_id: room_id.clone(),
                    user_id: user_id.clone(),
                },
            );
            crate::metrics::member_joined("join");
            info!(room_id = %room_id, user_id = %user_id, "member joined");
        }
        Ok(membership)
    }

    fn leave_room(
        &mut self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> Result<LeaveOutcome, RoomError> {
        let now = Timestamp::now();
        let (outcome, conversation_id) = self.store.transaction(|tx| {
            let room = Self::require_active_room(tx, room_id)?;
            let membership = Self::target_membership(tx, room_id, user_id)?;

            if membership.role != Role::Owner {
                sql::delete_membership(tx, room_id, user_id)?;
                sql::sync_member_count(tx, room_id)?;
                sql::touch_room(tx, room_id, now)?;
                return Ok((LeaveOutcome::MemberLeft, room.conversation_id));
            }

            // Owner leaving: settle succession before the membership goes
            match sql::succession_candidate(tx, room_id, user_id)? {
                Some(candidate) => {
                    sql::delete_membership(tx, room_id, user_id)?;
                    sql::update_membership_role(tx, room_id, &candidate.user_id, Role::Owner)?;
                    sql::set_room_owner(tx, room_id, &candidate.user_id)?;
                    sql::sync_member_count(tx, room_id)?;
                    sql::touch_room(tx, room_id, now)?;
                    Ok((
                        LeaveOutcome::OwnershipTransferred {
                            new_owner: candidate.user_id,
                        },
                        room.conversation_id,
                    ))
                }
                None => {
                    sql::delete_membership(tx, room_id, user_id)?;
                    sql::deactivate_room(tx, room_id)?;
                    sql::sync_member_count(tx, room_id)?;
                    sql::touch_room(tx, room_id, now)?;
                    Ok((LeaveOutcome::RoomClosed, room.conversation_id))
                }
            }
        })?;

        self.conversation_remove(&conversation_id, user_id);
        crate::metrics::member_left();

        match &outcome {
            LeaveOutcome::MemberLeft => {
                self.notifier.notify_room(
                    room_id,
                    RoomEvent::MemberLeft {
                        room_id: room_id.clone(),
                        user_id: user_id.clone(),
                    },
                );
            }
            LeaveOutcome::OwnershipTransferred { new_owner } => {
                let event = RoomEvent::OwnershipTransferred {
                    room_id: room_id.clone(),
                    previous_owner: user_id.clone(),
                    new_owner: new_owner.clone(),
                };
                self.notifier.notify_user(new_owner, event.clone());
                self.notifier.notify_room(room_id, event);
                crate::metrics::ownership_transferred();
                info!(room_id = %room_id, previous = %user_id, new_owner = %new_owner, "ownership transferred");
            }
            LeaveOutcome::RoomClosed => {
                crate::metrics::room_closed();
                info!(room_id = %room_id, "room closed after last member left");
            }
        }
        Ok(outcome)
    }

    fn promote(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        target: &UserId,
    ) -> Result<Membership, RoomError> {
        let now = Timestamp::now();
        let promoted = self.store.transaction(|tx| {
            let room = Self::require_active_room(tx, room_id)?;
            if &room.owner_id != actor {
                return Err(RoomError::forbidden());
            }

            let mut membership = Self::target_membership(tx, room_id, target)?;
            if membership.role != Role::Member {
                return Err(RoomError::BadRequest(
                    "only regular members can be promoted".to_string(),
                ));
            }

            membership.role = Role::Moderator;
            sql::update_membership_role(tx, room_id, target, Role::Moderator)?;
            sql::insert_log_entry(
                tx,
                &ModerationEntry::new(
                    room_id.clone(),
                    actor.clone(),
                    target.clone(),
                    ModerationAction::Promote,
                ),
            )?;
            sql::touch_room(tx, room_id, now)?;
            Ok(membership)
        })?;

        let event = RoomEvent::MemberPromoted {
            room_id: room_id.clone(),
            user_id: target.clone(),
            promoted_by: actor.clone(),
        };
        self.notifier.notify_user(target, event.clone());
        self.notifier.notify_room(room_id, event);
        crate::metrics::moderation_action("promote");
        debug!(room_id = %room_id, target = %target, "member promoted");
        Ok(promoted)
    }

    fn demote(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        target: &UserId,
    ) -> Result<Membership, RoomError> {
        let now = Timestamp::now();
        let demoted = self.store.transaction(|tx| {
            let room = Self::require_active_room(tx, room_id)?;
            if &room.owner_id != actor {
                return Err(RoomError::forbidden());
            }

            let mut membership = Self::target_membership(tx, room_id, target)?;
            if membership.role != Role::Moderator {
                return Err(RoomError::BadRequest(
                    "only moderators can be demoted".to_string(),
                ));
            }

            membership.role = Role::Member;
            sql::update_membership_role(tx, room_id, target, Role::Member)?;
            sql::insert_log_entry(
                tx,
                &ModerationEntry::new(
                    room_id.clone(),
                    actor.clone(),
                    target.clone(),
                    ModerationAction::Demote,
                ),
            )?;
            sql::touch_room(tx, room_id, now)?;
            Ok(membership)
        })?;

        let event = RoomEvent::MemberDemoted {
            room_id: room_id.clone(),
            user_id: target.clone(),
            demoted_by: actor.clone(),
        };
        self.notifier.notify_user(target, event.clone());
        self.notifier.notify_room(room_id, event);
        crate::metrics::moderation_action("demote");
        debug!(room_id = %room_id, target = %target, "moderator demoted");
        Ok(demoted)
    }

    fn kick(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        target: &UserId,
    ) -> Result<(), RoomError> {
        let now = Timestamp::now();
        let (conversation_id, purged) = self.store.transaction(|tx| {
            let room = Self::require_active_room(tx, room_id)?;
            let actor_membership = Self::check_authority(tx, room_id, actor)?;
            let target_membership = Self::target_membership(tx, room_id, target)?;

            if !actor_membership.may_kick(target_membership.role) {
                return Err(RoomError::forbidden());
            }

            sql::delete_membership(tx, room_id, target)?;
            // Stale pending invitations must not block a future re-invite
            let purged = sql::purge_pending_invitations(tx, room_id, target)?;
            sql::sync_member_count(tx, room_id)?;
            sql::insert_log_entry(
                tx,
                &ModerationEntry::new(
                    room_id.clone(),
                    actor.clone(),
                    target.clone(),
                    ModerationAction::Kick,
                ),
            )?;
            sql::touch_room(tx, room_id, now)?;
            Ok((room.conversation_id, purged))
        })?;

        self.conversation_remove(&conversation_id, target);
        for invite_id in &purged {
            self.notifier.purge_invitation(invite_id);
        }
        let event = RoomEvent::MemberKicked {
            room_id: room_id.clone(),
            user_id: target.clone(),
            kicked_by: actor.clone(),
        };
        self.notifier.notify_user(target, event.clone());
        self.notifier.notify_room(room_id, event);
        crate::metrics::moderation_action("kick");
        info!(room_id = %room_id, target = %target, actor = %actor, "member kicked");
        Ok(())
    }

    fn delete_room(&mut self, actor: &UserId, room_id: &RoomId) -> Result<(), RoomError> {
        let (members, conversation_id) = self.store.transaction(|tx| {
            // Deleting is allowed even for a closed room; only existence matters
            let room = sql::find_room(tx, room_id)?.ok_or(RoomError::NotFound("room"))?;
            if &room.owner_id != actor {
                return Err(RoomError::forbidden());
            }
            let members = sql::list_memberships(tx, room_id)?;
            sql::delete_room_rows(tx, room_id)?;
            Ok((members, room.conversation_id))
        })?;

        if let Err(err) = self.conversations.delete_conversation(&conversation_id) {
            warn!(%conversation_id, %err, "failed to delete conversation for deleted room");
        }
        self.notifier.purge_room(room_id);
        for member in &members {
            self.notifier.notify_user(
                &member.user_id,
                RoomEvent::RoomDeleted {
                    room_id: room_id.clone(),
                },
            );
            if member.user_id != *actor {
                self.notifier.notify_user(
                    &member.user_id,
                    RoomEvent::RemovedFromRoom {
                        room_id: room_id.clone(),
                    },
                );
            }
        }
        crate::metrics::room_deleted();
        info!(room_id = %room_id, members = members.len(), "room deleted");
        Ok(())
    }
}

impl InvitationWorkflow for RoomManagerImpl {
    fn send_invite(
        &mut self,
        sender: UserId,
        room_id: &RoomId,
        invitee: UserId,
    ) -> Result<Invitation, RoomError> {
        let now = Timestamp::now();
        let invitation = self.store.transaction(|tx| {
            Self::require_active_room(tx, room_id)?;
            Self::check_membership(tx, room_id, &sender)?;

            if sql::find_membership(tx, room_id, &invitee)?.is_some() {
                return Err(RoomError::BadRequest(
                    "user is already a member".to_string(),
                ));
            }

            // A dead pending invitation is retired here rather than blocking
            if let Some(mut pending) = sql::pending_invitation(tx, room_id, &invitee)? {
                if pending.is_expired(now) {
                    pending.mark_expired();
                    sql::update_invitation(tx, &pending)?;
                } else {
                    return Err(RoomError::BadRequest(
                        "an invitation is already pending for this user".to_string(),
                    ));
                }
            }

            let invitation = Invitation::new(
                room_id.clone(),
                invitee.clone(),
                sender.clone(),
                self.invite_ttl,
            );
            sql::insert_invitation(tx, &invitation)?;
            sql::touch_room(tx, room_id, now)?;
            Ok(invitation)
        })?;

        self.notifier.notify_user(
            &invitee,
            RoomEvent::InviteReceived {
                room_id: room_id.clone(),
                invite_id: invitation.id.clone(),
                inviter_id: sender.clone(),
            },
        );
        crate::metrics::invite_sent();
        debug!(room_id = %room_id, invitee = %invitee, "invitation sent");
        Ok(invitation)
    }

    fn list_room_invites(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<Vec<Invitation>, RoomError> {
        self.store.read(|conn| {
            Self::require_active_room(conn, room_id)?;
            Self::check_membership(conn, room_id, actor)?;
            sql::list_invitations_for_room(conn, room_id)
        })
    }

    fn list_user_invites(&self, user_id: &UserId) -> Result<Vec<Invitation>, RoomError> {
        let now = Timestamp::now();
        self.store
            .read(|conn| sql::pending_invitations_for_user(conn, user_id, now))
    }

    fn revoke_invite(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        invite_id: &InviteId,
    ) -> Result<(), RoomError> {
        let invitee = self.store.transaction(|tx| {
            Self::require_active_room(tx, room_id)?;
            Self::check_membership(tx, room_id, actor)?;

            let invitation =
                sql::find_invitation(tx, invite_id)?.ok_or(RoomError::NotFound("invitation"))?;
            if invitation.room_id != *room_id || invitation.status != InviteStatus::Pending {
                return Err(RoomError::NotFound("invitation"));
            }

            sql::delete_invitation(tx, invite_id)?;
            Ok(invitation.invitee_id)
        })?;

        self.notifier.purge_invitation(invite_id);
        self.notifier.notify_user(
            &invitee,
            RoomEvent::InviteRevoked {
                room_id: room_id.clone(),
                invite_id: invite_id.clone(),
            },
        );
        debug!(room_id = %room_id, invitee = %invitee, "invitation revoked");
        Ok(())
    }

    fn accept_invite(
        &mut self,
        user_id: &UserId,
        invite_id: &InviteId,
    ) -> Result<Membership, RoomError> {
        let now = Timestamp::now();
        let (membership, invitation, newly_joined, conversation_id) =
            self.store.transaction(|tx| {
                let mut invitation = sql::find_invitation(tx, invite_id)?
                    .ok_or(RoomError::NotFound("invitation"))?;
                if invitation.invitee_id != *user_id {
                    return Err(RoomError::NotFound("invitation"));
                }
                match invitation.status {
                    InviteStatus::Pending if invitation.is_expired(now) => {
                        invitation.mark_expired();
                        sql::update_invitation(tx, &invitation)?;
                        return Err(RoomError::NotFound("invitation"));
                    }
                    InviteStatus::Pending => {}
                    _ => return Err(RoomError::NotFound("invitation")),
                }

                let room = Self::require_active_room(tx, &invitation.room_id)?;

                invitation.mark_accepted(now);
                sql::update_invitation(tx, &invitation)?;
                sql::expire_other_pending(tx, &invitation.room_id, user_id, &invitation.id)?;

                // Membership is re-checked, never inferred from the invite
                if let Some(existing) = sql::find_membership(tx, &invitation.room_id, user_id)? {
                    return Ok((existing, invitation, false, room.conversation_id));
                }
                let membership = Self::admit_member(tx, &invitation.room_id, user_id, now)?;
                Ok((membership, invitation, true, room.conversation_id))
            })?;

        let room_id = invitation.room_id.clone();
        if newly_joined {
            self.conversation_add(&conversation_id, user_id);
        }
        self.notifier.notify_user(
            &invitation.inviter_id,
            RoomEvent::InviteAccepted {
                room_id: room_id.clone(),
                invite_id: invitation.id.clone(),
                invitee_id: user_id.clone(),
            },
        );
        if newly_joined {
            self.notifier.notify_room(
                &room_id,
                RoomEvent::MemberJoined {
                    room_id: room_id.clone(),
                    user_id: user_id.clone(),
                },
            );
            crate::metrics::member_joined("invite");
            info!(room_id = %room_id, user_id = %user_id, "member joined via invitation");
        }
        crate::metrics::invite_resolved("accepted");
        Ok(membership)
    }

    fn reject_invite(&mut self, user_id: &UserId, invite_id: &InviteId) -> Result<(), RoomError> {
        let now = Timestamp::now();
        let invitation = self.store.transaction(|tx| {
            let mut invitation =
                sql::find_invitation(tx, invite_id)?.ok_or(RoomError::NotFound("invitation"))?;
            if invitation.invitee_id != *user_id {
                return Err(RoomError::NotFound("invitation"));
            }
            match invitation.status {
                InviteStatus::Pending if invitation.is_expired(now) => {
                    invitation.mark_expired();
                    sql::update_invitation(tx, &invitation)?;
                    return Err(RoomError::NotFound("invitation"));
                }
                InviteStatus::Pending => {}
                _ => return Err(RoomError::NotFound("invitation")),
            }

            invitation.mark_declined(now);
            sql::update_invitation(tx, &invitation)?;
            Ok(invitation)
        })?;

        self.notifier.notify_user(
            &invitation.inviter_id,
            RoomEvent::InviteDeclined {
                room_id: invitation.room_id.clone(),
                invite_id: invitation.id.clone(),
                invitee_id: user_id.clone(),
            },
        );
        crate::metrics::invite_resolved("declined");
        Ok(())
    }

    fn create_invite_link(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        ttl: Option<Duration>,
    ) -> Result<InviteLink, RoomError> {
        let ttl = ttl.unwrap_or(self.link_ttl);
        let code = self
            .link_codes
            .generate_unique(|candidate| {
                self.store.read(|conn| sql::link_code_exists(conn, candidate))
            })?;

        let now = Timestamp::now();
        let link = self.store.transaction(|tx| {
            Self::require_active_room(tx, room_id)?;
            Self::check_authority(tx, room_id, actor)?;

            sql::deactivate_links(tx, room_id)?;
            let link = InviteLink::new(room_id.clone(), code, actor.clone(), ttl);
            sql::insert_link(tx, &link)?;
            sql::touch_room(tx, room_id, now)?;
            Ok(link)
        })?;

        debug!(room_id = %room_id, "invite link rotated");
        Ok(link)
    }

    fn get_active_invite_link(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<InviteLink, RoomError> {
        let now = Timestamp::now();
        self.store.read(|conn| {
            Self::require_active_room(conn, room_id)?;
            Self::check_membership(conn, room_id, actor)?;
            match sql::active_link(conn, room_id)? {
                Some(link) if link.is_live(now) => Ok(link),
                _ => Err(RoomError::NotFound("invite link")),
            }
        })
    }

    fn redeem_invite_link(
        &mut self,
        user_id: UserId,
        code: &str,
    ) -> Result<Membership, RoomError> {
        let now = Timestamp::now();
        let (membership, room, newly_joined) = self.store.transaction(|tx| {
            let link =
                sql::find_link_by_code(tx, code)?.ok_or(RoomError::NotFound("invite link"))?;
            if !link.is_live(now) {
                return Err(RoomError::NotFound("invite link"));
            }
            let room = Self::require_active_room(tx, &link.room_id)?;

            if let Some(existing) = sql::find_membership(tx, &link.room_id, &user_id)? {
                return Ok((existing, room, false));
            }

            // Holding a live link is the authorization; no friendship gate
            let membership = Self::admit_member(tx, &link.room_id, &user_id, now)?;
            Ok((membership, room, true))
        })?;

        if newly_joined {
            self.conversation_add(&room.conversation_id, &user_id);
            self.notifier.notify_room(
                &room.id,
                RoomEvent::MemberJoined {
                    room_id: room.id.clone(),
                    user_id: user_id.clone(),
                },
            );
            crate::metrics::member_joined("link");
            info!(room_id = %room.id, user_id = %user_id, "member joined via invite link");
        }
        Ok(membership)
    }
}

impl AccessRequestWorkflow for RoomManagerImpl {
    fn request_access(
        &mut self,
        user_id: UserId,
        room_id: &RoomId,
        message: Option<String>,
    ) -> Result<AccessRequest, RoomError> {
        let (request, authorities) = self.store.transaction(|tx| {
            Self::require_active_room(tx, room_id)?;

            if sql::find_membership(tx, room_id, &user_id)?.is_some() {
                return Err(RoomError::Conflict("user is already a member".to_string()));
            }
            if sql::pending_request(tx, room_id, &user_id)?.is_some() {
                return Err(RoomError::Conflict(
                    "a request is already pending for this room".to_string(),
                ));
            }

            let request = AccessRequest::new(room_id.clone(), user_id.clone(), message);
            sql::insert_request(tx, &request)?;
            let authorities = sql::authority_ids(tx, room_id)?;
            Ok((request, authorities))
        })?;

        for authority in &authorities {
            self.notifier.notify_user(
                authority,
                RoomEvent::AccessRequested {
                    room_id: room_id.clone(),
                    request_id: request.id.clone(),
                    user_id: user_id.clone(),
                },
            );
        }
        crate::metrics::access_request_opened();
        debug!(room_id = %room_id, user_id = %user_id, "access requested");
        Ok(request)
    }

    fn list_access_requests(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<Vec<AccessRequest>, RoomError> {
        self.store.read(|conn| {
            Self::require_active_room(conn, room_id)?;
            Self::check_authority(conn, room_id, actor)?;
            sql::list_pending_requests(conn, room_id)
        })
    }

    fn approve_access_request(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        request_id: &RequestId,
    ) -> Result<AccessRequest, RoomError> {
        let now = Timestamp::now();
        let (request, newly_joined, conversation_id) = self.store.transaction(|tx| {
            let room = Self::require_active_room(tx, room_id)?;
            Self::check_authority(tx, room_id, actor)?;

            let mut request = sql::find_request(tx, request_id)?
                .ok_or(RoomError::NotFound("access request"))?;
            if request.room_id != *room_id {
                return Err(RoomError::NotFound("access request"));
            }
            if request.status != RequestStatus::Pending {
                return Err(RoomError::BadRequest("request already resolved".to_string()));
            }

            request.approve(actor.clone(), now);
            sql::update_request(tx, &request)?;

            // The requester may have entered through another path meanwhile
            if sql::find_membership(tx, room_id, &request.user_id)?.is_some() {
                return Ok((request, false, room.conversation_id));
            }
            Self::admit_member(tx, room_id, &request.user_id, now)?;
            Ok((request, true, room.conversation_id))
        })?;

        if newly_joined {
            self.conversation_add(&conversation_id, &request.user_id);
            self.notifier.notify_room(
                room_id,
                RoomEvent::MemberJoined {
                    room_id: room_id.clone(),
                    user_id: request.user_id.clone(),
                },
            );
            crate::metrics::member_joined("request");
        }
        self.notifier.notify_user(
            &request.user_id,
            RoomEvent::AccessApproved {
                room_id: room_id.clone(),
                request_id: request.id.clone(),
            },
        );
        crate::metrics::access_request_resolved("approved");
        info!(room_id = %room_id, requester = %request.user_id, "access request approved");
        Ok(request)
    }

    fn reject_access_request(
        &mut self,
        actor: &UserId,
        room_id: &RoomId,
        request_id: &RequestId,
    ) -> Result<AccessRequest, RoomError> {
        let now = Timestamp::now();
        let request = self.store.transaction(|tx| {
            Self::require_active_room(tx, room_id)?;
            Self::check_authority(tx, room_id, actor)?;

            let mut request = sql::find_request(tx, request_id)?
                .ok_or(RoomError::NotFound("access request"))?;
            if request.room_id != *room_id {
                return Err(RoomError::NotFound("access request"));
            }
            if request.status != RequestStatus::Pending {
                return Err(RoomError::BadRequest("request already resolved".to_string()));
            }

            request.reject(actor.clone(), now);
            sql::update_request(tx, &request)?;
            Ok(request)
        })?;

        self.notifier.notify_user(
            &request.user_id,
            RoomEvent::AccessRejected {
                room_id: room_id.clone(),
                request_id: request.id.clone(),
            },
        );
        crate::metrics::access_request_resolved("rejected");
        debug!(room_id = %room_id, requester = %request.user_id, "access request rejected");
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_notify::NoopNotifier;
    use crate::core_room::conversation::InMemoryConversations;
    use crate::core_room::friendship::InMemoryFriendGraph;

    struct TestContext {
        manager: RoomManagerImpl,
        friendships: Arc<InMemoryFriendGraph>,
        conversations: Arc<InMemoryConversations>,
    }

    fn setup() -> TestContext {
        setup_with_settings(ManagerSettings::default())
    }

    fn setup_with_settings(settings: ManagerSettings) -> TestContext {
        let store = RoomSqlStore::memory().unwrap();
        let friendships = Arc::new(InMemoryFriendGraph::new());
        let conversations = Arc::new(InMemoryConversations::new());
        let manager = RoomManagerImpl::with_settings(
            store,
            Arc::new(NoopNotifier),
            conversations.clone(),
            friendships.clone(),
            settings,
        );
        TestContext {
            manager,
            friendships,
            conversations,
        }
    }

    fn user(name: &str) -> UserId {
        UserId::new(name.to_string())
    }

    fn make_room(ctx: &mut TestContext, owner: &str) -> Room {
        ctx.manager
            .create_room(
                user(owner),
                "Study Group".to_string(),
                None,
                RoomVisibility::Private,
            )
            .unwrap()
    }

    fn befriend_and_join(ctx: &mut TestContext, room: &Room, name: &str) -> Membership {
        ctx.friendships.add_friendship(&user(name), &room.owner_id);
        ctx.manager.join_room(user(name), &room.id).unwrap()
    }

    #[test]
    fn test_create_room_validates_input() {
        let mut ctx = setup();

        let short = ctx.manager.create_room(
            user("alice"),
            "ab".to_string(),
            None,
            RoomVisibility::Public,
        );
        assert!(matches!(short, Err(RoomError::BadRequest(_))));

        let long_description = ctx.manager.create_room(
            user("alice"),
            "Algebra".to_string(),
            Some("x".repeat(201)),
            RoomVisibility::Public,
        );
        assert!(matches!(long_description, Err(RoomError::BadRequest(_))));

        // Nothing persisted and no conversation leaked
        assert_eq!(ctx.conversations.conversation_count(), 0);
    }

    #[test]
    fn test_create_room_binds_conversation() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");

        assert_eq!(room.current_members, 1);
        assert!(room.is_active);
        assert_eq!(ctx.conversations.conversation_count(), 1);
        assert_eq!(
            ctx.conversations.participants(&room.conversation_id).unwrap(),
            vec![user("alice")]
        );

        let fetched = ctx.manager.get_room(&room.id).unwrap();
        assert_eq!(fetched.owner_id, user("alice"));
        assert_eq!(fetched.code.len(), ROOM_CODE_LEN);
    }

    #[test]
    fn test_join_requires_friendship_with_owner() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");

        let denied = ctx.manager.join_room(user("bob"), &room.id);
        assert_eq!(
            denied.unwrap_err(),
            RoomError::Forbidden {
                requires_permission: true
            }
        );

        ctx.friendships.add_friendship(&user("bob"), &user("alice"));
        let membership = ctx.manager.join_room(user("bob"), &room.id).unwrap();
        assert_eq!(membership.role, Role::Member);

        let fetched = ctx.manager.get_room(&room.id).unwrap();
        assert_eq!(fetched.current_members, 2);
    }

    #[test]
    fn test_public_room_still_gated() {
        let mut ctx = setup();
        let room = ctx
            .manager
            .create_room(
                user("alice"),
                "Open Board".to_string(),
                None,
                RoomVisibility::Public,
            )
            .unwrap();

        let denied = ctx.manager.join_room(user("bob"), &room.id);
        assert!(matches!(
            denied,
            Err(RoomError::Forbidden {
                requires_permission: true
            })
        ));
    }

    #[test]
    fn test_join_is_idempotent() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        befriend_and_join(&mut ctx, &room, "bob");

        let again = ctx.manager.join_room(user("bob"), &room.id).unwrap();
        assert_eq!(again.role, Role::Member);
        assert_eq!(ctx.manager.get_room(&room.id).unwrap().current_members, 2);

        // The owner re-joining their own room is also a no-op
        let owner_again = ctx.manager.join_room(user("alice"), &room.id).unwrap();
        assert_eq!(owner_again.role, Role::Owner);
    }

    #[test]
    fn test_member_leaves() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        befriend_and_join(&mut ctx, &room, "bob");

        let outcome = ctx.manager.leave_room(&user("bob"), &room.id).unwrap();
        assert_eq!(outcome, LeaveOutcome::MemberLeft);
        assert_eq!(ctx.manager.get_room(&room.id).unwrap().current_members, 1);
        assert!(ctx
            .conversations
            .participants(&room.conversation_id)
            .unwrap()
            .iter()
            .all(|u| u != &user("bob")));

        let twice = ctx.manager.leave_room(&user("bob"), &room.id);
        assert_eq!(twice.unwrap_err(), RoomError::NotFound("membership"));
    }

    #[test]
    fn test_owner_leave_prefers_moderator_successor() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        befriend_and_join(&mut ctx, &room, "bob");
        befriend_and_join(&mut ctx, &room, "carol");
        ctx.manager
            .promote(&user("alice"), &room.id, &user("carol"))
            .unwrap();

        let outcome = ctx.manager.leave_room(&user("alice"), &room.id).unwrap();
        assert_eq!(
            outcome,
            LeaveOutcome::OwnershipTransferred {
                new_owner: user("carol")
            }
        );

        let fetched = ctx.manager.get_room(&room.id).unwrap();
        assert!(fetched.is_active);
        assert_eq!(fetched.owner_id, user("carol"));
        assert_eq!(fetched.current_members, 2);

        let members = ctx.manager.list_members(&user("carol"), &room.id).unwrap();
        let owners: Vec<_> = members.iter().filter(|m| m.role == Role::Owner).collect();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].user_id, user("carol"));
    }

    #[test]
    fn test_last_owner_leave_closes_room() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");

        let outcome = ctx.manager.leave_room(&user("alice"), &room.id).unwrap();
        assert_eq!(outcome, LeaveOutcome::RoomClosed);

        // Closed rooms are invisible and closed for good
        assert_eq!(
            ctx.manager.get_room(&room.id).unwrap_err(),
            RoomError::NotFound("room")
        );
        assert!(ctx
            .manager
            .list_rooms_for_user(&user("alice"))
            .unwrap()
            .is_empty());

        let rejoin = ctx.manager.join_room(user("alice"), &room.id);
        assert_eq!(rejoin.unwrap_err(), RoomError::NotFound("room"));
    }

    #[test]
    fn test_promote_and_demote() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        befriend_and_join(&mut ctx, &room, "bob");

        let promoted = ctx
            .manager
            .promote(&user("alice"), &room.id, &user("bob"))
            .unwrap();
        assert_eq!(promoted.role, Role::Moderator);

        // Promoting a moderator again is rejected
        let twice = ctx.manager.promote(&user("alice"), &room.id, &user("bob"));
        assert!(matches!(twice, Err(RoomError::BadRequest(_))));

        let demoted = ctx
            .manager
            .demote(&user("alice"), &room.id, &user("bob"))
            .unwrap();
        assert_eq!(demoted.role, Role::Member);

        let twice = ctx.manager.demote(&user("alice"), &room.id, &user("bob"));
        assert!(matches!(twice, Err(RoomError::BadRequest(_))));
    }

    #[test]
    fn test_only_owner_promotes() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        befriend_and_join(&mut ctx, &room, "bob");
        befriend_and_join(&mut ctx, &room, "carol");
        ctx.manager
            .promote(&user("alice"), &room.id, &user("bob"))
            .unwrap();

        // Not even a moderator may promote
        let denied = ctx.manager.promote(&user("bob"), &room.id, &user("carol"));
        assert_eq!(denied.unwrap_err(), RoomError::forbidden());

        let absent = ctx.manager.promote(&user("alice"), &room.id, &user("dave"));
        assert_eq!(absent.unwrap_err(), RoomError::NotFound("membership"));
    }

    #[test]
    fn test_kick_respects_hierarchy() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        befriend_and_join(&mut ctx, &room, "bob");
        befriend_and_join(&mut ctx, &room, "carol");
        befriend_and_join(&mut ctx, &room, "dave");
        ctx.manager
            .promote(&user("alice"), &room.id, &user("bob"))
            .unwrap();
        ctx.manager
            .promote(&user("alice"), &room.id, &user("carol"))
            .unwrap();

        // Moderator cannot kick a fellow moderator or the owner
        let peer = ctx.manager.kick(&user("bob"), &room.id, &user("carol"));
        assert_eq!(peer.unwrap_err(), RoomError::forbidden());
        let up = ctx.manager.kick(&user("bob"), &room.id, &user("alice"));
        assert_eq!(up.unwrap_err(), RoomError::forbidden());

        // Moderator kicks a regular member; owner kicks a moderator
        ctx.manager.kick(&user("bob"), &room.id, &user("dave")).unwrap();
        ctx.manager
            .kick(&user("alice"), &room.id, &user("carol"))
            .unwrap();

        assert_eq!(ctx.manager.get_room(&room.id).unwrap().current_members, 2);

        // A regular member has no kick at all
        befriend_and_join(&mut ctx, &room, "erin");
        let none = ctx.manager.kick(&user("erin"), &room.id, &user("bob"));
        assert_eq!(none.unwrap_err(), RoomError::forbidden());
    }

    #[test]
    fn test_kick_purges_pending_invitation() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        befriend_and_join(&mut ctx, &room, "bob");

        let invitation = ctx
            .manager
            .send_invite(user("bob"), &room.id, user("carol"))
            .unwrap();

        // Kicking the invitee removes their pending invitation with them
        befriend_and_join(&mut ctx, &room, "carol");
        ctx.manager
            .kick(&user("alice"), &room.id, &user("carol"))
            .unwrap();

        let gone = ctx.manager.accept_invite(&user("carol"), &invitation.id);
        assert_eq!(gone.unwrap_err(), RoomError::NotFound("invitation"));
    }

    #[test]
    fn test_send_invite_rules() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        befriend_and_join(&mut ctx, &room, "bob");

        // Outsiders cannot invite
        let outsider = ctx
            .manager
            .send_invite(user("mallory"), &room.id, user("carol"));
        assert_eq!(outsider.unwrap_err(), RoomError::forbidden());

        // Inviting an existing member is rejected
        let already = ctx.manager.send_invite(user("alice"), &room.id, user("bob"));
        assert!(matches!(already, Err(RoomError::BadRequest(_))));

        ctx.manager
            .send_invite(user("bob"), &room.id, user("carol"))
            .unwrap();

        // One pending invitation per invitee per room
        let duplicate = ctx
            .manager
            .send_invite(user("alice"), &room.id, user("carol"));
        assert!(matches!(duplicate, Err(RoomError::BadRequest(_))));

        let invites = ctx
            .manager
            .list_room_invites(&user("alice"), &room.id)
            .unwrap();
        assert_eq!(invites.len(), 1);
        assert_eq!(ctx.manager.list_user_invites(&user("carol")).unwrap().len(), 1);
    }

    #[test]
    fn test_accept_invite_joins_without_friendship() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");

        let invitation = ctx
            .manager
            .send_invite(user("alice"), &room.id, user("bob"))
            .unwrap();

        // No friendship needed: the invitation is the authorization
        let membership = ctx.manager.accept_invite(&user("bob"), &invitation.id).unwrap();
        assert_eq!(membership.role, Role::Member);
        assert_eq!(ctx.manager.get_room(&room.id).unwrap().current_members, 2);

        // Terminal invitations cannot be answered again
        let again = ctx.manager.accept_invite(&user("bob"), &invitation.id);
        assert_eq!(again.unwrap_err(), RoomError::NotFound("invitation"));
    }

    #[test]
    fn test_accept_invite_only_by_invitee() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        let invitation = ctx
            .manager
            .send_invite(user("alice"), &room.id, user("bob"))
            .unwrap();

        let wrong = ctx.manager.accept_invite(&user("mallory"), &invitation.id);
        assert_eq!(wrong.unwrap_err(), RoomError::NotFound("invitation"));
    }

    #[test]
    fn test_expired_invite_is_not_acceptable() {
        let mut ctx = setup_with_settings(ManagerSettings {
            invite_ttl: Duration::from_secs(0),
            ..ManagerSettings::default()
        });
        let room = make_room(&mut ctx, "alice");
        let invitation = ctx
            .manager
            .send_invite(user("alice"), &room.id, user("bob"))
            .unwrap();

        let expired = ctx.manager.accept_invite(&user("bob"), &invitation.id);
        assert_eq!(expired.unwrap_err(), RoomError::NotFound("invitation"));

        // And the dead invitation no longer blocks a fresh one
        ctx.manager
            .send_invite(user("alice"), &room.id, user("bob"))
            .unwrap();
    }

    #[test]
    fn test_accept_after_joining_elsewhere_keeps_single_membership() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        let invitation = ctx
            .manager
            .send_invite(user("alice"), &room.id, user("bob"))
            .unwrap();

        befriend_and_join(&mut ctx, &room, "bob");

        let membership = ctx.manager.accept_invite(&user("bob"), &invitation.id).unwrap();
        assert_eq!(membership.role, Role::Member);
        assert_eq!(ctx.manager.get_room(&room.id).unwrap().current_members, 2);

        let members = ctx.manager.list_members(&user("alice"), &room.id).unwrap();
        assert_eq!(members.iter().filter(|m| m.user_id == user("bob")).count(), 1);
    }

    #[test]
    fn test_reject_invite() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        let invitation = ctx
            .manager
            .send_invite(user("alice"), &room.id, user("bob"))
            .unwrap();

        ctx.manager.reject_invite(&user("bob"), &invitation.id).unwrap();
        assert_eq!(ctx.manager.get_room(&room.id).unwrap().current_members, 1);

        let again = ctx.manager.accept_invite(&user("bob"), &invitation.id);
        assert_eq!(again.unwrap_err(), RoomError::NotFound("invitation"));
    }

    #[test]
    fn test_revoke_invite() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        let invitation = ctx
            .manager
            .send_invite(user("alice"), &room.id, user("bob"))
            .unwrap();

        ctx.manager
            .revoke_invite(&user("alice"), &room.id, &invitation.id)
            .unwrap();

        let gone = ctx.manager.accept_invite(&user("bob"), &invitation.id);
        assert_eq!(gone.unwrap_err(), RoomError::NotFound("invitation"));

        // Revoked means deleted, so a fresh invitation goes through
        ctx.manager
            .send_invite(user("alice"), &room.id, user("bob"))
            .unwrap();
    }

    #[test]
    fn test_invite_link_lifecycle() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        befriend_and_join(&mut ctx, &room, "bob");

        // Regular members cannot issue links
        let denied = ctx.manager.create_invite_link(&user("bob"), &room.id, None);
        assert_eq!(denied.unwrap_err(), RoomError::forbidden());

        let first = ctx
            .manager
            .create_invite_link(&user("alice"), &room.id, None)
            .unwrap();
        assert_eq!(first.code.len(), LINK_CODE_LEN);

        let second = ctx
            .manager
            .create_invite_link(&user("alice"), &room.id, None)
            .unwrap();

        let active = ctx
            .manager
            .get_active_invite_link(&user("bob"), &room.id)
            .unwrap();
        assert_eq!(active.id, second.id);

        // The superseded link no longer admits anyone
        let stale = ctx.manager.redeem_invite_link(user("carol"), &first.code);
        assert_eq!(stale.unwrap_err(), RoomError::NotFound("invite link"));

        // The live one does, without any friendship
        let membership = ctx
            .manager
            .redeem_invite_link(user("carol"), &second.code)
            .unwrap();
        assert_eq!(membership.role, Role::Member);

        // Redeeming again is a no-op
        ctx.manager
            .redeem_invite_link(user("carol"), &second.code)
            .unwrap();
        assert_eq!(ctx.manager.get_room(&room.id).unwrap().current_members, 3);
    }

    #[test]
    fn test_expired_link_is_dead() {
        let mut ctx = setup_with_settings(ManagerSettings {
            link_ttl: Duration::from_secs(0),
            ..ManagerSettings::default()
        });
        let room = make_room(&mut ctx, "alice");
        let link = ctx
            .manager
            .create_invite_link(&user("alice"), &room.id, None)
            .unwrap();

        let dead = ctx.manager.redeem_invite_link(user("bob"), &link.code);
        assert_eq!(dead.unwrap_err(), RoomError::NotFound("invite link"));

        let lookup = ctx.manager.get_active_invite_link(&user("alice"), &room.id);
        assert_eq!(lookup.unwrap_err(), RoomError::NotFound("invite link"));
    }

    #[test]
    fn test_access_request_flow() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");

        let request = ctx
            .manager
            .request_access(user("bob"), &room.id, Some("let me in".to_string()))
            .unwrap();

        // One pending request per user per room
        let duplicate = ctx.manager.request_access(user("bob"), &room.id, None);
        assert!(matches!(duplicate, Err(RoomError::Conflict(_))));

        // Only authorities see the queue
        let denied = ctx.manager.list_access_requests(&user("bob"), &room.id);
        assert_eq!(denied.unwrap_err(), RoomError::forbidden());

        let queue = ctx
            .manager
            .list_access_requests(&user("alice"), &room.id)
            .unwrap();
        assert_eq!(queue.len(), 1);

        let approved = ctx
            .manager
            .approve_access_request(&user("alice"), &room.id, &request.id)
            .unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.reviewed_by, Some(user("alice")));
        assert_eq!(ctx.manager.get_room(&room.id).unwrap().current_members, 2);

        // Resolved requests cannot be approved again
        let twice = ctx
            .manager
            .approve_access_request(&user("alice"), &room.id, &request.id);
        assert!(matches!(twice, Err(RoomError::BadRequest(_))));
    }

    #[test]
    fn test_member_request_access_conflicts() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        befriend_and_join(&mut ctx, &room, "bob");

        let conflict = ctx.manager.request_access(user("bob"), &room.id, None);
        assert!(matches!(conflict, Err(RoomError::Conflict(_))));
    }

    #[test]
    fn test_reject_access_request() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        befriend_and_join(&mut ctx, &room, "bob");
        ctx.manager
            .promote(&user("alice"), &room.id, &user("bob"))
            .unwrap();

        let request = ctx
            .manager
            .request_access(user("carol"), &room.id, None)
            .unwrap();

        // A moderator may review
        let rejected = ctx
            .manager
            .reject_access_request(&user("bob"), &room.id, &request.id)
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(ctx.manager.get_room(&room.id).unwrap().current_members, 2);

        // A rejected requester may ask again
        ctx.manager
            .request_access(user("carol"), &room.id, None)
            .unwrap();
    }

    #[test]
    fn test_approve_when_requester_already_member() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");

        let request = ctx
            .manager
            .request_access(user("bob"), &room.id, None)
            .unwrap();
        befriend_and_join(&mut ctx, &room, "bob");

        let approved = ctx
            .manager
            .approve_access_request(&user("alice"), &room.id, &request.id)
            .unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);

        // Still exactly one membership row for bob
        let members = ctx.manager.list_members(&user("alice"), &room.id).unwrap();
        assert_eq!(members.iter().filter(|m| m.user_id == user("bob")).count(), 1);
    }

    #[test]
    fn test_update_room() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        befriend_and_join(&mut ctx, &room, "bob");

        let denied = ctx.manager.update_room(
            &user("bob"),
            &room.id,
            Some("Hijacked".to_string()),
            None,
            None,
        );
        assert_eq!(denied.unwrap_err(), RoomError::forbidden());

        let updated = ctx
            .manager
            .update_room(
                &user("alice"),
                &room.id,
                Some("Graph Theory".to_string()),
                Some("Tuesday evenings".to_string()),
                Some(RoomVisibility::Public),
            )
            .unwrap();
        assert_eq!(updated.name, "Graph Theory");
        assert_eq!(updated.visibility, RoomVisibility::Public);
        assert_eq!(updated.description.as_deref(), Some("Tuesday evenings"));
    }

    #[test]
    fn test_membership_flags() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        befriend_and_join(&mut ctx, &room, "bob");

        let favored = ctx
            .manager
            .set_favorite(&user("bob"), &room.id, true)
            .unwrap();
        assert!(favored.is_favorite);

        let silenced = ctx
            .manager
            .set_silenced(&user("bob"), &room.id, true)
            .unwrap();
        assert!(silenced.is_favorite);
        assert!(silenced.is_silenced);

        // Flags belong to a membership; outsiders have none to flip
        let none = ctx.manager.set_favorite(&user("carol"), &room.id, true);
        assert_eq!(none.unwrap_err(), RoomError::NotFound("membership"));
    }

    #[test]
    fn test_delete_room_cascades() {
        let mut ctx = setup();
        let room = make_room(&mut ctx, "alice");
        befriend_and_join(&mut ctx, &room, "bob");
        ctx.manager
            .send_invite(user("alice"), &room.id, user("carol"))
            .unwrap();
        ctx.manager
            .create_invite_link(&user("alice"), &room.id, None)
            .unwrap();
        ctx.manager
            .request_access(user("dave"), &room.id, None)
            .unwrap();

        // Only the owner deletes
        let denied = ctx.manager.delete_room(&user("bob"), &room.id);
        assert_eq!(denied.unwrap_err(), RoomError::forbidden());

        ctx.manager.delete_room(&user("alice"), &room.id).unwrap();

        assert_eq!(
            ctx.manager.get_room(&room.id).unwrap_err(),
            RoomError::NotFound("room")
        );
        assert!(ctx.manager.list_user_invites(&user("carol")).unwrap().is_empty());
        assert_eq!(ctx.conversations.conversation_count(), 0);

        let twice = ctx.manager.delete_room(&user("alice"), &room.id);
        assert_eq!(twice.unwrap_err(), RoomError::NotFound("room"));
    }

    #[test]
    fn test_list_rooms_for_user() {
        let mut ctx = setup();
        let first = make_room(&mut ctx, "alice");
        let second = ctx
            .manager
            .create_room(
                user("alice"),
                "Second Room".to_string(),
                None,
                RoomVisibility::Private,
            )
            .unwrap();
        befriend_and_join(&mut ctx, &first, "bob");

        let alices = ctx.manager.list_rooms_for_user(&user("alice")).unwrap();
        assert_eq!(alices.len(), 2);
        assert!(alices
            .iter()
            .all(|(room, membership)| membership.role == Role::Owner
                && (room.id == first.id || room.id == second.id)));

        let bobs = ctx.manager.list_rooms_for_user(&user("bob")).unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].0.id, first.id);
        assert_eq!(bobs[0].1.role, Role::Member);
    }
}

/*
    Metrics - Room lifecycle and notification metrics for monitoring

    Provides counters and gauges for:
    - Room lifecycle (created, closed, deleted, ownership transfers)
    - Admission paths (direct join, invitation, link, access request)
    - Moderation actions (promote, demote, kick)
    - Notification fan-out (delivered, dropped)

    Metrics can be exported via Prometheus or other backends.
*/

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    // Room Lifecycle
    describe_counter!(
        "studyhall_rooms_created_total",
        "Total number of rooms created"
    );

    describe_counter!(
        "studyhall_rooms_closed_total",
        "Total number of rooms closed after the last member left"
    );

    describe_counter!(
        "studyhall_rooms_deleted_total",
        "Total number of rooms hard-deleted by their owner"
    );

    describe_counter!(
        "studyhall_ownership_transfers_total",
        "Total number of ownership successions after an owner left"
    );

    // Admission
    describe_counter!(
        "studyhall_members_joined_total",
        "Total number of members admitted, labeled by route (join, invite, link, request)"
    );

    describe_counter!(
        "studyhall_members_left_total",
        "Total number of members who left a room voluntarily"
    );

    // Moderation
    describe_counter!(
        "studyhall_moderation_actions_total",
        "Total number of moderation actions, labeled by action (promote, demote, kick)"
    );

    // Invitations
    describe_counter!(
        "studyhall_invites_sent_total",
        "Total number of direct invitations sent"
    );

    describe_counter!(
        "studyhall_invites_resolved_total",
        "Total number of invitations resolved, labeled by outcome (accepted, declined)"
    );

    describe_counter!(
        "studyhall_access_requests_total",
        "Total number of access requests opened"
    );

    describe_counter!(
        "studyhall_access_requests_resolved_total",
        "Total number of access requests resolved, labeled by outcome (approved, rejected)"
    );

    // Notifications
    describe_counter!(
        "studyhall_notifications_delivered_total",
        "Total number of events delivered to live sessions, labeled by event"
    );

    describe_counter!(
        "studyhall_notifications_dropped_total",
        "Total number of events dropped because a session queue was full, labeled by event"
    );

    describe_gauge!(
        "studyhall_active_sessions",
        "Current number of connected notification sessions"
    );
}

/// Record room created
pub fn room_created() {
    counter!("studyhall_rooms_created_total").increment(1);
}

/// Record room closed after its last member left
pub fn room_closed() {
    counter!("studyhall_rooms_closed_total").increment(1);
}

/// Record room hard-deleted
pub fn room_deleted() {
    counter!("studyhall_rooms_deleted_total").increment(1);
}

/// Record ownership succession
pub fn ownership_transferred() {
    counter!("studyhall_ownership_transfers_total").increment(1);
}

/// Record member admitted, by route
pub fn member_joined(route: &str) {
    counter!("studyhall_members_joined_total", "route" => route.to_string()).increment(1);
}

/// Record member left
pub fn member_left() {
    counter!("studyhall_members_left_total").increment(1);
}

/// Record moderation action
pub fn moderation_action(action: &str) {
    counter!("studyhall_moderation_actions_total", "action" => action.to_string()).increment(1);
}

/// Record invitation sent
pub fn invite_sent() {
    counter!("studyhall_invites_sent_total").increment(1);
}

/// Record invitation resolved
pub fn invite_resolved(outcome: &str) {
    counter!("studyhall_invites_resolved_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record access request opened
pub fn access_request_opened() {
    counter!("studyhall_access_requests_total").increment(1);
}

/// Record access request resolved
pub fn access_request_resolved(outcome: &str) {
    counter!("studyhall_access_requests_resolved_total", "outcome" => outcome.to_string())
        .increment(1);
}

/// Record event delivered to a session
pub fn notification_delivered(event: &str) {
    counter!("studyhall_notifications_delivered_total", "event" => event.to_string()).increment(1);
}

/// Record event dropped on a full session queue
pub fn notification_dropped(event: &str) {
    counter!("studyhall_notifications_dropped_total", "event" => event.to_string()).increment(1);
}

/// Update connected sessions gauge
pub fn set_active_sessions(count: usize) {
    gauge!("studyhall_active_sessions").set(count as f64);
}

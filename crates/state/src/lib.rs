//! State calculator (§4.F).
//!
//! Pure functions over `(messages, file_last_modified, process_presence)` —
//! no I/O, no storage, no caching beyond what the caller wraps this in.
//! All thresholds are evaluated against `now`, supplied by the caller so
//! tests stay deterministic.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Other,
}

#[derive(Debug, Clone)]
pub struct MessageSummary {
    pub role: Role,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStatus {
    Active,
    Recent,
    Inactive,
}

/// Derives the dashboard-facing state string for one conversation.
///
/// `process_present` is an optional tie-break: when message and file
/// signals alone would bucket a conversation as idle/inactive but a live
/// process is known to be attached to it, the conversation is reported as
/// an active session instead.
pub fn compute_state(
    messages: &[MessageSummary],
    file_last_modified: DateTime<Utc>,
    process_present: Option<bool>,
    now: DateTime<Utc>,
) -> &'static str {
    let file_age = now - file_last_modified;
    let last = messages.last();

    if file_age < Duration::minutes(1) {
        return "Claude Code working…";
    }

    if let Some(last) = last {
        let age = now - last.timestamp;

        if last.role == Role::User && age < Duration::minutes(3) {
            return "Claude Code working…";
        }
        if last.role == Role::Assistant && age < Duration::minutes(2) && file_age < Duration::minutes(5) {
            return "Claude Code finishing…";
        }
        if last.role == Role::User && age >= Duration::minutes(3) && age < Duration::minutes(10) {
            return "Awaiting response…";
        }
        if last.role == Role::Assistant && age < Duration::minutes(10) {
            return "Awaiting user input…";
        }
        if age >= Duration::minutes(10) && age < Duration::minutes(30) {
            return "User typing…";
        }
        if age < Duration::hours(1) {
            return coarse_bucket("Active session", process_present);
        }
        if age < Duration::hours(6) {
            return "Recently active";
        }
        if age < Duration::hours(24) {
            return coarse_bucket("Idle", process_present);
        }
        return coarse_bucket("Inactive", process_present);
    }

    coarse_bucket("Inactive", process_present)
}

fn coarse_bucket(default: &'static str, process_present: Option<bool>) -> &'static str {
    if process_present == Some(true) && (default == "Idle" || default == "Inactive") {
        "Active session"
    } else {
        default
    }
}

/// Reduces a conversation to one of three coarse buckets for filtering.
pub fn determine_conversation_status(state: &str) -> ConversationStatus {
    match state {
        "Claude Code working…"
        | "Claude Code finishing…"
        | "Awaiting response…"
        | "Awaiting user input…"
        | "User typing…"
        | "Active session" => ConversationStatus::Active,
        "Recently active" => ConversationStatus::Recent,
        _ => ConversationStatus::Inactive,
    }
}

/// Maps a state string to the CSS class the dashboard uses to color it.
pub fn state_class(state: &str) -> &'static str {
    match state {
        "Claude Code working…" => "state-working",
        "Claude Code finishing…" => "state-finishing",
        "Awaiting response…" => "state-awaiting-response",
        "Awaiting user input…" => "state-awaiting-input",
        "User typing…" => "state-user-typing",
        "Active session" => "state-active",
        "Recently active" => "state-recent",
        "Idle" => "state-idle",
        _ => "state-inactive",
    }
}

/// Stable sort by timestamp ascending; returns a new sorted copy.
pub fn sorted_by_timestamp_asc(messages: &[MessageSummary]) -> Vec<MessageSummary> {
    let mut copy = messages.to_vec();
    copy.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    copy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(now: DateTime<Utc>, minutes_ago: i64) -> DateTime<Utc> {
        now - Duration::minutes(minutes_ago)
    }

    #[test]
    fn recent_file_touch_wins_over_old_message() {
        let now = Utc::now();
        let messages = vec![MessageSummary { role: Role::Assistant, timestamp: at(now, 40) }];
        let state = compute_state(&messages, at(now, 0), None, now);
        assert_eq!(state, "Claude Code working…");
    }

    #[test]
    fn recent_user_message_is_working() {
        let now = Utc::now();
        let messages = vec![MessageSummary { role: Role::User, timestamp: at(now, 1) }];
        let state = compute_state(&messages, at(now, 10), None, now);
        assert_eq!(state, "Claude Code working…");
    }

    #[test]
    fn assistant_message_within_two_minutes_is_finishing() {
        let now = Utc::now();
        let messages = vec![MessageSummary { role: Role::Assistant, timestamp: at(now, 1) }];
        let state = compute_state(&messages, at(now, 3), None, now);
        assert_eq!(state, "Claude Code finishing…");
    }

    #[test]
    fn user_message_three_to_ten_minutes_is_awaiting_response() {
        let now = Utc::now();
        let messages = vec![MessageSummary { role: Role::User, timestamp: at(now, 5) }];
        let state = compute_state(&messages, at(now, 60), None, now);
        assert_eq!(state, "Awaiting response…");
    }

    #[test]
    fn assistant_message_under_ten_minutes_is_awaiting_user_input() {
        let now = Utc::now();
        let messages = vec![MessageSummary { role: Role::Assistant, timestamp: at(now, 8) }];
        let state = compute_state(&messages, at(now, 60), None, now);
        assert_eq!(state, "Awaiting user input…");
    }

    #[test]
    fn ten_to_thirty_minutes_is_user_typing() {
        let now = Utc::now();
        let messages = vec![MessageSummary { role: Role::User, timestamp: at(now, 15) }];
        let state = compute_state(&messages, at(now, 60), None, now);
        assert_eq!(state, "User typing…");
    }

    #[test]
    fn process_presence_upgrades_idle_to_active_session() {
        let now = Utc::now();
        let messages = vec![MessageSummary { role: Role::Assistant, timestamp: at(now, 600) }];
        let state = compute_state(&messages, at(now, 600), Some(true), now);
        assert_eq!(state, "Active session");
    }

    #[test]
    fn status_reduction_buckets_correctly() {
        assert_eq!(determine_conversation_status("User typing…"), ConversationStatus::Active);
        assert_eq!(determine_conversation_status("Recently active"), ConversationStatus::Recent);
        assert_eq!(determine_conversation_status("Inactive"), ConversationStatus::Inactive);
    }

    #[test]
    fn sort_is_stable_ascending() {
        let now = Utc::now();
        let messages = vec![
            MessageSummary { role: Role::User, timestamp: at(now, 1) },
            MessageSummary { role: Role::Assistant, timestamp: at(now, 10) },
        ];
        let sorted = sorted_by_timestamp_asc(&messages);
        assert!(sorted[0].timestamp < sorted[1].timestamp);
    }
}

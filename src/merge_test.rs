use serde_json::json;

use super::*;
use crate::object::Shape;

fn sticky(id: &str, text: &str) -> DrawableObject {
    DrawableObject::new(
        id,
        Shape::StickyNote {
            x: 0.0,
            y: 0.0,
            width: 150.0,
            height: 150.0,
            text: text.into(),
            fill: "#FFEB3B".into(),
            stroke: "#F57F17".into(),
        },
    )
}

fn move_patch() -> ObjectPatch {
    json!({"x": 10.0}).as_object().cloned().unwrap()
}

#[test]
fn parse_round_trips_names() {
    for policy in [MergePolicy::Optimistic, MergePolicy::LocalWins, MergePolicy::RemoteWins] {
        assert_eq!(MergePolicy::parse(policy.as_str()), Some(policy));
    }
    assert_eq!(MergePolicy::parse("server_wins"), None);
}

#[test]
fn optimistic_keeps_local_on_add_conflict() {
    let local = sticky("s1", "mine");
    let remote = sticky("s1", "theirs");
    assert_eq!(MergePolicy::Optimistic.resolve_remote_add(&local, &remote), Resolution::KeepLocal);
    assert_eq!(MergePolicy::LocalWins.resolve_remote_add(&local, &remote), Resolution::KeepLocal);
}

#[test]
fn remote_wins_takes_differing_remote() {
    let local = sticky("s1", "mine");
    assert_eq!(MergePolicy::RemoteWins.resolve_remote_add(&local, &sticky("s1", "theirs")), Resolution::TakeRemote);
    assert_eq!(MergePolicy::RemoteWins.resolve_remote_add(&local, &local.clone()), Resolution::KeepLocal);
}

#[test]
fn remote_updates_apply_unless_local_wins_and_pending() {
    let local = sticky("s1", "mine");
    let patch = move_patch();
    assert!(MergePolicy::Optimistic.accept_remote_update(&local, &patch, true));
    assert!(MergePolicy::RemoteWins.accept_remote_update(&local, &patch, true));
    assert!(MergePolicy::LocalWins.accept_remote_update(&local, &patch, false));
    assert!(!MergePolicy::LocalWins.accept_remote_update(&local, &patch, true));
}

#[test]
fn server_ack_only_replaces_under_remote_wins() {
    let local = sticky("s1", "mine");
    let server = sticky("s1", "normalized");
    assert_eq!(MergePolicy::Optimistic.resolve_server_ack(&local, &server), Resolution::KeepLocal);
    assert_eq!(MergePolicy::RemoteWins.resolve_server_ack(&local, &server), Resolution::TakeRemote);
    // A reply for a different id is never adopted.
    assert_eq!(MergePolicy::RemoteWins.resolve_server_ack(&local, &sticky("s2", "x")), Resolution::KeepLocal);
}

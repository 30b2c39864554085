use std::collections::HashSet;

use super::*;

#[test]
fn timestamp_id_layout() {
    let ids = TimestampIds::new();
    let id = ids.generate("rectangle", Some("user-12345678"));
    let parts: Vec<&str> = id.split('_').collect();
    assert_eq!(parts.len(), 5, "unexpected layout: {id}");
    assert_eq!(parts[0], "rectangle");
    assert!(parts[1].parse::<i64>().unwrap() > 0);
    assert_eq!(parts[2], "0");
    assert_eq!(parts[3].len(), RANDOM_LEN);
    assert!(parts[3].bytes().all(|b| BASE36.contains(&b)));
    assert_eq!(parts[4], "5678");
}

#[test]
fn timestamp_counter_increments() {
    let ids = TimestampIds::new();
    let a = ids.generate("text", None);
    let b = ids.generate("text", None);
    assert_eq!(a.split('_').nth(2), Some("0"));
    assert_eq!(b.split('_').nth(2), Some("1"));
}

#[test]
fn missing_user_is_anon() {
    let ids = TimestampIds::new();
    assert!(ids.generate("circle", None).ends_with("_anon"));
    assert!(ids.generate("circle", Some("   ")).ends_with("_anon"));
}

#[test]
fn short_user_id_is_kept_whole() {
    assert_eq!(user_suffix(Some("ab")), "ab");
    assert_eq!(user_suffix(Some("üser")), "üser");
}

#[test]
fn prefix_may_contain_underscores() {
    let ids = TimestampIds::new();
    let id = ids.generate("sticky_note_recovered", Some("u1"));
    assert!(id.starts_with("sticky_note_recovered_"));
    assert!(id.ends_with("_u1"));
}

#[test]
fn timestamp_ids_do_not_collide_in_a_burst() {
    let ids = TimestampIds::new();
    let minted: HashSet<String> = (0..10_000).map(|_| ids.generate("line", Some("u1"))).collect();
    assert_eq!(minted.len(), 10_000);
}

#[test]
fn uuid_ids_carry_prefix() {
    let id = UuidIds.generate("circle", Some("ignored"));
    let rest = id.strip_prefix("circle_").unwrap();
    assert_eq!(rest.len(), 32);
    assert!(Uuid::parse_str(rest).is_ok());
}

#[test]
fn scheme_selects_generator() {
    let id = IdScheme::Uuid.generator().generate("text", None);
    assert_eq!(id.len(), "text_".len() + 32);
    let id = IdScheme::Timestamp.generator().generate("text", None);
    assert!(id.ends_with("_anon"));
}

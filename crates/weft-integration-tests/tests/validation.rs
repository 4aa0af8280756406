//! Ingress validation boundaries, exhaustively and property-based.

use proptest::prelude::*;
use weft_core::ChatFrame;

fn frame() -> ChatFrame {
    ChatFrame {
        user_id: "42".to_owned(),
        username: "alice".to_owned(),
        message: "hi".to_owned(),
        timestamp: "2025-01-01T00:00:00Z".to_owned(),
        message_type: "TEXT".to_owned(),
    }
}

#[test]
fn message_length_boundaries() {
    for (len, ok) in [(0, false), (1, true), (500, true), (501, false)] {
        let mut f = frame();
        f.message = "x".repeat(len);
        assert_eq!(f.validate().is_ok(), ok, "message length {len}");
    }
}

#[test]
fn user_id_boundaries() {
    for (id, ok) in [("1", true), ("100000", true), ("0", false), ("100001", false)] {
        let mut f = frame();
        f.user_id = id.to_owned();
        assert_eq!(f.validate().is_ok(), ok, "userId {id}");
    }
}

#[test]
fn username_length_boundaries() {
    for (len, ok) in [(2, false), (3, true), (20, true), (21, false)] {
        let mut f = frame();
        f.username = "a".repeat(len);
        assert_eq!(f.validate().is_ok(), ok, "username length {len}");
    }
}

proptest! {
    /// Any in-range numeric user id with a well-formed frame validates.
    #[test]
    fn in_range_user_ids_accepted(id in 1u64..=100_000) {
        let mut f = frame();
        f.user_id = id.to_string();
        prop_assert!(f.validate().is_ok());
    }

    /// Out-of-range ids are rejected with the range in the reason.
    #[test]
    fn out_of_range_user_ids_rejected(id in 100_001u64..10_000_000) {
        let mut f = frame();
        f.user_id = id.to_string();
        let err = f.validate().unwrap_err();
        prop_assert!(err.reason.contains("between 1 and 100000"));
    }

    /// Alphanumeric usernames of valid length always pass.
    #[test]
    fn alphanumeric_usernames_accepted(name in "[A-Za-z0-9]{3,20}") {
        let mut f = frame();
        f.username = name;
        prop_assert!(f.validate().is_ok());
    }

    /// A username with any non-alphanumeric character fails.
    #[test]
    fn non_alphanumeric_usernames_rejected(
        prefix in "[A-Za-z0-9]{1,9}",
        bad in "[^A-Za-z0-9]",
        suffix in "[A-Za-z0-9]{1,9}",
    ) {
        let mut f = frame();
        f.username = format!("{prefix}{bad}{suffix}");
        prop_assert!(f.validate().is_err());
    }

    /// Unknown message types never validate.
    #[test]
    fn unknown_message_types_rejected(kind in "[A-Z]{1,10}") {
        prop_assume!(!matches!(kind.as_str(), "TEXT" | "JOIN" | "LEAVE"));
        let mut f = frame();
        f.message_type = kind;
        prop_assert!(f.validate().is_err());
    }
}

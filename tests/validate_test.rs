use koala_user::service::password::digest;
use koala_user::service::validate::{is_valid_email, require_non_empty};
use uuid::Uuid;

#[test]
fn empty_fields_are_reported_together() {
    let err = require_non_empty(&[
        ("username", ""),
        ("password", "secret"),
        ("email", ""),
    ])
    .unwrap_err();
    assert_eq!(err.to_string(), "username cannot be empty;email cannot be empty");

    assert!(require_non_empty(&[("username", "ada"), ("name", "Ada")]).is_ok());
}

#[test]
fn email_pattern() {
    for ok in ["ada@example.com", "a.b+c_d%e-f@mail.example.io", "x@y.co"] {
        assert!(is_valid_email(ok), "{ok}");
    }
    for bad in [
        "",
        "ada",
        "ada@example",
        "Ada@example.com",
        "ada@example.c",
        "ada@example.museum",
        "ada@@example.com",
        "ada example@example.com",
    ] {
        assert!(!is_valid_email(bad), "{bad}");
    }
}

#[test]
fn password_digest_is_salted_by_account() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    assert_eq!(digest(&a, "hunter2"), digest(&a, "hunter2"));
    assert_ne!(digest(&a, "hunter2"), digest(&b, "hunter2"));
    assert_ne!(digest(&a, "hunter2"), digest(&a, "hunter3"));

    let d = digest(&a, "hunter2");
    // 64-byte SHA-512 output, unpadded URL-safe base64.
    assert_eq!(d.len(), 86);
    assert!(!d.contains('='));
    assert!(!d.contains('+') && !d.contains('/'));
    assert!(!d.contains("hunter2"));
}

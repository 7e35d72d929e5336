//! Password digest.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use sha2::{Digest, Sha512};
use uuid::Uuid;

/// `base64url(sha512("<uuid>.<base64(uuid)>.<password>"))`, unpadded.
///
/// Salted by the account id, so the same password yields different
/// digests for different accounts.
pub fn digest(uuid: &Uuid, password: &str) -> String {
    let id = uuid.to_string();
    let mut hasher = Sha512::new();
    hasher.update(id.as_bytes());
    hasher.update(b".");
    hasher.update(STANDARD.encode(id.as_bytes()).as_bytes());
    hasher.update(b".");
    hasher.update(password.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

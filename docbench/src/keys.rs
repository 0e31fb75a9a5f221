//! Mapping from document ids to keys, emails and synthetic documents.
//!
//! Keys are the id rendered as a zero-padded decimal of [`KEY_WIDTH`] digits, so the
//! lexicographic order of keys (and of the emails derived from them) equals the numeric order of
//! ids. The partitioned indexes rely on this to express id ranges as string ranges.

use std::fmt;

use docbench_store::Document;
use rand::Rng;
use thiserror::Error;

/// Number of digits in a document key. Wide enough for every `u64`.
pub const KEY_WIDTH: usize = 20;

/// Domain of every generated email address.
pub const EMAIL_DOMAIN: &str = "joyent.com";

/// Length of the random `name` field.
pub const NAME_LEN: usize = 20;

const NAME_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Error returned for an email without a valid key prefix.
#[derive(Debug, Error)]
#[error("invalid email `{0}`: expected a {KEY_WIDTH}-digit key followed by `@`")]
pub struct InvalidEmail(pub String);

/// Integer id of a benchmark document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId(pub u64);

impl DocId {
    /// Samples an id uniformly from `[0, total_ids)`.
    pub fn random(rng: &mut impl Rng, total_ids: u64) -> Self {
        Self(rng.random_range(0..total_ids))
    }

    /// The storage key of this document.
    pub fn key(self) -> String {
        format!("{:0width$}", self.0, width = KEY_WIDTH)
    }

    /// The email address stored in this document.
    pub fn email(self) -> String {
        format!("{}@{EMAIL_DOMAIN}", self.key())
    }

    /// Recovers the id from an email produced by [`DocId::email`].
    pub fn from_email(email: &str) -> Result<Self, InvalidEmail> {
        key_prefix(email)?
            .parse()
            .map(Self)
            .map_err(|_| InvalidEmail(email.to_owned()))
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returns the storage key embedded at the start of `email`.
pub fn key_prefix(email: &str) -> Result<&str, InvalidEmail> {
    let valid = email.len() > KEY_WIDTH
        && email.as_bytes()[KEY_WIDTH] == b'@'
        && email.as_bytes()[..KEY_WIDTH].iter().all(u8::is_ascii_digit);
    if !valid {
        return Err(InvalidEmail(email.to_owned()));
    }
    Ok(&email[..KEY_WIDTH])
}

/// Generates a random alphabetic name of [`NAME_LEN`] characters.
pub fn random_name(rng: &mut impl Rng) -> String {
    (0..NAME_LEN)
        .map(|_| NAME_CHARS[rng.random_range(0..NAME_CHARS.len())] as char)
        .collect()
}

/// Builds a fresh document body for `id` with a random name.
pub fn make_document(id: DocId, rng: &mut impl Rng) -> Document {
    Document {
        email: id.email(),
        name: random_name(rng),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn key_is_zero_padded() {
        assert_eq!(DocId(7).key(), "00000000000000000007");
        assert_eq!(DocId(7).email(), "00000000000000000007@joyent.com");
        assert_eq!(DocId(u64::MAX).key(), u64::MAX.to_string());
    }

    #[test]
    fn email_round_trips() {
        for id in [0, 1, 9, 10, 42, 999, 1_000_000, u64::MAX] {
            assert_eq!(DocId::from_email(&DocId(id).email()).unwrap(), DocId(id));
        }
    }

    #[test]
    fn key_order_matches_id_order() {
        let ids = [0u64, 3, 25, 100, 1_000, 99_999];
        for pair in ids.windows(2) {
            assert!(DocId(pair[0]).key() < DocId(pair[1]).key());
            assert!(DocId(pair[0]).email() < DocId(pair[1]).email());
        }
    }

    #[test]
    fn rejects_malformed_emails() {
        assert!(DocId::from_email("42@joyent.com").is_err());
        assert!(DocId::from_email("0000000000000000004x@joyent.com").is_err());
        assert!(DocId::from_email("00000000000000000042").is_err());
        assert!(DocId::from_email("000000000000000000042@joyent.com").is_err());
        assert!(DocId::from_email("99999999999999999999@joyent.com").is_err());
    }

    #[test]
    fn key_prefix_strips_domain() {
        let email = DocId(80).email();
        assert_eq!(key_prefix(&email).unwrap(), "00000000000000000080");
    }

    #[test]
    fn documents_are_alphabetic() {
        let mut rng = SmallRng::seed_from_u64(1);
        let doc = make_document(DocId(3), &mut rng);

        assert_eq!(doc.email, DocId(3).email());
        assert_eq!(doc.name.len(), NAME_LEN);
        assert!(doc.name.bytes().all(|b| b.is_ascii_alphabetic()));
    }

    #[test]
    fn random_ids_stay_in_range() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert!(DocId::random(&mut rng, 10).0 < 10);
        }
    }
}

//! OBEX Digest Authentication
//!
//! A server may reject any request with an authentication challenge header.
//! The challenge and its response are both tag/length/value sequences; the
//! proof of possession is `MD5(nonce ":" password)`, as fixed by the
//! protocol.
//!
//! This module parses challenges and builds responses. The engine answers
//! challenges with the credentials configured on the session; issuing
//! challenges to the server is an application concern and not handled here.

use crate::Credentials;
use crate::constants::{DIGEST_LENGTH, MAX_AUTH_LENGTH, MAX_REALM_LENGTH};
use crate::packet::PacketError;
use heapless::Vec;
use md5::{Digest, Md5};

/// Challenge tag: 16-byte nonce
const TAG_NONCE: u8 = 0x00;
/// Challenge tag: options byte / response tag: user id
const TAG_OPTIONS_OR_USER_ID: u8 = 0x01;
/// Challenge tag: realm / response tag: nonce echo
const TAG_REALM_OR_NONCE: u8 = 0x02;

/// Options bit: the response must carry a user id
const OPTION_USER_ID_REQUIRED: u8 = 0x01;
/// Options bit: access will be read-only
const OPTION_READ_ONLY: u8 = 0x02;

/// Realm of a challenge: a charset byte followed by the display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Realm {
    /// Character set of `text` (0 = ASCII, 0xFF = UTF-16)
    pub charset: u8,
    /// Raw display text in the declared charset
    pub text: Vec<u8, MAX_REALM_LENGTH>,
}

/// A parsed authentication challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    /// Server nonce, echoed and digested in the response
    pub nonce: [u8; DIGEST_LENGTH],
    /// Option bits
    pub options: u8,
    /// Optional realm for user display
    pub realm: Option<Realm>,
}

impl DigestChallenge {
    /// Parse a challenge from the raw value of an authentication-challenge
    /// header.
    ///
    /// Unknown tags are skipped; an oversized realm is truncated to
    /// [`MAX_REALM_LENGTH`] rather than rejected, since it is display-only.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Challenge`] if the sequence is malformed or
    /// carries no nonce.
    pub fn parse(value: &[u8]) -> Result<Self, PacketError> {
        let mut nonce = None;
        let mut options = 0;
        let mut realm = None;
        let mut at = 0;
        while at < value.len() {
            if at + 2 > value.len() {
                return Err(PacketError::Challenge);
            }
            let tag = value[at];
            let len = value[at + 1] as usize;
            if at + 2 + len > value.len() {
                return Err(PacketError::Challenge);
            }
            let data = &value[at + 2..at + 2 + len];
            match tag {
                TAG_NONCE => {
                    if len != DIGEST_LENGTH {
                        return Err(PacketError::Challenge);
                    }
                    let mut n = [0u8; DIGEST_LENGTH];
                    n.copy_from_slice(data);
                    nonce = Some(n);
                }
                TAG_OPTIONS_OR_USER_ID => {
                    if len != 1 {
                        return Err(PacketError::Challenge);
                    }
                    options = data[0];
                }
                TAG_REALM_OR_NONCE => {
                    if let [charset, text_bytes @ ..] = data {
                        let keep = text_bytes.len().min(MAX_REALM_LENGTH);
                        let mut text = Vec::new();
                        text.extend_from_slice(&text_bytes[..keep]).ok();
                        realm = Some(Realm {
                            charset: *charset,
                            text,
                        });
                    }
                }
                _ => {}
            }
            at += 2 + len;
        }
        let nonce = nonce.ok_or(PacketError::Challenge)?;
        Ok(Self {
            nonce,
            options,
            realm,
        })
    }

    /// Whether the server requires a user id in the response.
    #[must_use]
    pub const fn user_id_required(&self) -> bool {
        self.options & OPTION_USER_ID_REQUIRED != 0
    }

    /// Whether the granted access will be read-only.
    #[must_use]
    pub const fn read_only(&self) -> bool {
        self.options & OPTION_READ_ONLY != 0
    }

    /// Build the response value answering this challenge.
    ///
    /// The response digests the nonce with the configured password, carries
    /// the user id when one is configured, and echoes the nonce so the
    /// server can match the response to its challenge.
    #[must_use]
    pub fn response(&self, credentials: &Credentials) -> Vec<u8, MAX_AUTH_LENGTH> {
        let mut hasher = Md5::new();
        hasher.update(self.nonce);
        hasher.update(b":");
        hasher.update(&credentials.password);
        let digest = hasher.finalize();

        // fits by construction: 18 + (2 + 20) + 18 <= MAX_AUTH_LENGTH
        let mut out = Vec::new();
        let _ = out.extend_from_slice(&[TAG_NONCE, DIGEST_LENGTH as u8]);
        let _ = out.extend_from_slice(&digest);
        if !credentials.user_id.is_empty() {
            let _ = out.extend_from_slice(&[
                TAG_OPTIONS_OR_USER_ID,
                credentials.user_id.len() as u8,
            ]);
            let _ = out.extend_from_slice(&credentials.user_id);
        }
        let _ = out.extend_from_slice(&[TAG_REALM_OR_NONCE, DIGEST_LENGTH as u8]);
        let _ = out.extend_from_slice(&self.nonce);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nonce() -> [u8; DIGEST_LENGTH] {
        core::array::from_fn(|i| i as u8)
    }

    fn challenge_bytes() -> Vec<u8, MAX_AUTH_LENGTH> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&[0x00, 16]).unwrap();
        bytes.extend_from_slice(&nonce()).unwrap();
        bytes.extend_from_slice(&[0x01, 1, 0x01]).unwrap();
        bytes
            .extend_from_slice(&[0x02, 5, 0x00, b'v', b'a', b'u', b'l'])
            .unwrap();
        bytes
    }

    #[test]
    fn test_challenge_parse() {
        let challenge = DigestChallenge::parse(&challenge_bytes()).unwrap();
        assert_eq!(challenge.nonce, nonce());
        assert!(challenge.user_id_required());
        assert!(!challenge.read_only());
        let realm = challenge.realm.unwrap();
        assert_eq!(realm.charset, 0x00);
        assert_eq!(&realm.text[..], b"vaul");
    }

    #[test]
    fn test_challenge_nonce_only() {
        let mut bytes: Vec<u8, MAX_AUTH_LENGTH> = Vec::new();
        bytes.extend_from_slice(&[0x00, 16]).unwrap();
        bytes.extend_from_slice(&nonce()).unwrap();
        let challenge = DigestChallenge::parse(&bytes).unwrap();
        assert_eq!(challenge.options, 0);
        assert!(challenge.realm.is_none());
    }

    #[test]
    fn test_challenge_unknown_tag_skipped() {
        let mut bytes: Vec<u8, MAX_AUTH_LENGTH> = Vec::new();
        bytes.extend_from_slice(&[0x7F, 2, 0xAA, 0xBB]).unwrap();
        bytes.extend_from_slice(&[0x00, 16]).unwrap();
        bytes.extend_from_slice(&nonce()).unwrap();
        assert!(DigestChallenge::parse(&bytes).is_ok());
    }

    #[test]
    fn test_challenge_rejects_missing_nonce() {
        assert_eq!(
            DigestChallenge::parse(&[0x01, 1, 0x00]),
            Err(PacketError::Challenge)
        );
    }

    #[test]
    fn test_challenge_rejects_truncated_tlv() {
        assert_eq!(
            DigestChallenge::parse(&[0x00, 16, 0x01]),
            Err(PacketError::Challenge)
        );
    }

    #[test]
    fn test_response_digest_vector() {
        let challenge = DigestChallenge {
            nonce: nonce(),
            options: 0,
            realm: None,
        };
        let credentials = Credentials::new(b"", b"secret").unwrap();
        let response = challenge.response(&credentials);

        // MD5(nonce ":" "secret") for the 00..0f nonce
        let expected = [
            0xF7, 0x56, 0x00, 0xCD, 0xBD, 0x52, 0x06, 0x4B, 0xEA, 0x92, 0xEC, 0xA3, 0x6D, 0x55,
            0x3B, 0x00,
        ];
        assert_eq!(&response[..2], &[0x00, 16]);
        assert_eq!(&response[2..18], &expected);
        // no user id tag; nonce echo follows
        assert_eq!(&response[18..20], &[0x02, 16]);
        assert_eq!(&response[20..36], &nonce());
        assert_eq!(response.len(), 36);
    }

    #[test]
    fn test_response_carries_user_id() {
        let challenge = DigestChallenge {
            nonce: nonce(),
            options: OPTION_USER_ID_REQUIRED,
            realm: None,
        };
        let credentials = Credentials::new(b"alice", b"pw").unwrap();
        let response = challenge.response(&credentials);
        assert_eq!(&response[18..20], &[0x01, 5]);
        assert_eq!(&response[20..25], b"alice");
        assert_eq!(&response[25..27], &[0x02, 16]);
    }
}

//! Authenticated encryption for provider tokens at rest.
//!
//! AES-256-GCM with a 16-byte random nonce per plaintext. The stored
//! envelope is `hex(nonce):hex(tag):hex(ciphertext)` so a corrupted or
//! truncated value is rejected before any key material is touched.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Error, Result};

type TokenCipher = AesGcm<Aes256, U16>;

const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 16;

#[derive(Clone)]
pub struct SecretBox {
    cipher: TokenCipher,
}

impl SecretBox {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: TokenCipher::new(key.into()),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::<U16>::from_slice(&nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| Error::Integrity("encryption failed".into()))?;

        // aead appends the tag to the ciphertext; the envelope keeps it
        // as its own field.
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String> {
        let mut parts = envelope.split(':');
        let (nonce_hex, tag_hex, ct_hex) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(n), Some(t), Some(c), None) => (n, t, c),
            _ => return Err(Error::Integrity("malformed ciphertext envelope".into())),
        };

        let nonce_bytes = decode_field(nonce_hex, NONCE_LEN)?;
        let tag = decode_field(tag_hex, TAG_LEN)?;
        let mut sealed =
            hex::decode(ct_hex).map_err(|_| Error::Integrity("malformed ciphertext envelope".into()))?;
        sealed.extend_from_slice(&tag);

        let nonce = Nonce::<U16>::from_slice(&nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, sealed.as_slice())
            .map_err(|_| Error::Integrity("token integrity check failed".into()))?;

        String::from_utf8(plaintext).map_err(|_| Error::Integrity("decrypted token is not utf-8".into()))
    }
}

fn decode_field(hex_str: &str, expected_len: usize) -> Result<Vec<u8>> {
    let bytes =
        hex::decode(hex_str).map_err(|_| Error::Integrity("malformed ciphertext envelope".into()))?;
    if bytes.len() != expected_len {
        return Err(Error::Integrity("malformed ciphertext envelope".into()));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret_box() -> SecretBox {
        SecretBox::new(&[7u8; 32])
    }

    #[test]
    fn roundtrip() {
        let sb = secret_box();
        let sealed = sb.encrypt("ya29.a0AfB_secret-token").unwrap();
        assert_eq!(sb.decrypt(&sealed).unwrap(), "ya29.a0AfB_secret-token");
    }

    #[test]
    fn nonces_are_random() {
        let sb = secret_box();
        let a = sb.encrypt("same").unwrap();
        let b = sb.encrypt("same").unwrap();
        assert_ne!(a, b);
        assert_eq!(sb.decrypt(&a).unwrap(), sb.decrypt(&b).unwrap());
    }

    #[test]
    fn envelope_has_three_hex_fields() {
        let sealed = secret_box().encrypt("tok").unwrap();
        let parts: Vec<&str> = sealed.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), NONCE_LEN * 2);
        assert_eq!(parts[1].len(), TAG_LEN * 2);
        assert!(parts.iter().all(|p| hex::decode(p).is_ok()));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let sb = secret_box();
        let sealed = sb.encrypt("refresh-token").unwrap();
        let mut chars: Vec<char> = sealed.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();
        assert!(matches!(sb.decrypt(&tampered), Err(Error::Integrity(_))));
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = secret_box().encrypt("tok").unwrap();
        let other = SecretBox::new(&[8u8; 32]);
        assert!(matches!(other.decrypt(&sealed), Err(Error::Integrity(_))));
    }

    #[test]
    fn malformed_envelope_fails() {
        let sb = secret_box();
        for bad in ["", "abc", "zz:zz:zz", "00:11", "0011:2233:4455:6677"] {
            assert!(matches!(sb.decrypt(bad), Err(Error::Integrity(_))), "{bad}");
        }
    }
}

//! Authenticated encryption for RTP payloads.
//!
//! Only the `xsalsa20_poly1305` mode is implemented; the others are kept as
//! named variants because they appear in the platform's negotiation list,
//! but selecting them is rejected (see [`CryptoError::ModeUnavailable`]).

use crate::constants::{KEY_LEN, NONCE_LEN, RTP_HEADER_LEN, TAG_LEN};
use thiserror::Error;
use xsalsa20poly1305::{
    aead::{generic_array::GenericArray, AeadInPlace, KeyInit},
    XSalsa20Poly1305,
};

/// Encryption modes offered by the platform's `SelectProtocol` negotiation.
///
/// At present only [`Mode::Normal`] is selectable; the others are retained
/// so the negotiation table in `model::payload` can recognise and reject
/// them by name rather than erroring on an unknown string.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Mode {
    /// The RTP header supplies the nonce bytes; no extra packet overhead.
    Normal,
    /// An additional random 24-byte suffix supplies the nonce; +24B/packet.
    Suffix,
    /// An additional random 4-byte suffix supplies the nonce; +4B/packet.
    Lite,
}

impl Mode {
    /// Name of this mode as it appears in the platform's negotiation list.
    pub fn to_request_str(self) -> &'static str {
        use Mode::*;
        match self {
            Normal => "xsalsa20_poly1305",
            Suffix => "xsalsa20_poly1305_suffix",
            Lite => "xsalsa20_poly1305_lite",
        }
    }

    /// Parses a mode name from a negotiation list entry.
    pub fn from_request_str(s: &str) -> Option<Self> {
        match s {
            "xsalsa20_poly1305" => Some(Mode::Normal),
            "xsalsa20_poly1305_suffix" => Some(Mode::Suffix),
            "xsalsa20_poly1305_lite" => Some(Mode::Lite),
            _ => None,
        }
    }

    /// Whether this crate can actually use the mode, as opposed to merely
    /// recognising its name.
    pub fn is_implemented(self) -> bool {
        matches!(self, Mode::Normal)
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("crypto mode {0:?} is recognised but not implemented")]
    ModeUnavailable(Mode),
    #[error("secret key must be {KEY_LEN} bytes, got {0}")]
    BadKeyLength(usize),
    #[error("authenticated encryption/decryption failed")]
    AeadFailure,
    #[error("ciphertext shorter than the authentication tag")]
    Truncated,
}

/// Holds the negotiated symmetric key and performs seal/open against a
/// 24-byte nonce built from the RTP header (see [`crate::rtp`]).
pub struct Cipher {
    cipher: XSalsa20Poly1305,
}

impl Cipher {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::BadKeyLength(key.len()));
        }
        Ok(Self {
            cipher: XSalsa20Poly1305::new(GenericArray::from_slice(key)),
        })
    }

    /// Builds the 24-byte nonce used on the wire: the 12-byte RTP header
    /// followed by 12 zero bytes.
    pub fn nonce_from_header(header: &[u8; RTP_HEADER_LEN]) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..RTP_HEADER_LEN].copy_from_slice(header);
        nonce
    }

    /// Encrypts `plaintext`, returning `ciphertext || tag`.
    pub fn seal(
        &self,
        header: &[u8; RTP_HEADER_LEN],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let nonce = Self::nonce_from_header(header);
        let mut buf = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&nonce), &[], &mut buf)
            .map_err(|_| CryptoError::AeadFailure)?;
        buf.extend_from_slice(&tag);
        Ok(buf)
    }

    /// Decrypts `ciphertext_and_tag` (as produced by [`Cipher::seal`]),
    /// returning the plaintext.
    pub fn open(
        &self,
        header: &[u8; RTP_HEADER_LEN],
        ciphertext_and_tag: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if ciphertext_and_tag.len() < TAG_LEN {
            return Err(CryptoError::Truncated);
        }
        let nonce = Self::nonce_from_header(header);
        let split = ciphertext_and_tag.len() - TAG_LEN;
        let mut buf = ciphertext_and_tag[..split].to_vec();
        let tag = GenericArray::from_slice(&ciphertext_and_tag[split..]);
        self.cipher
            .decrypt_in_place_detached(GenericArray::from_slice(&nonce), &[], &mut buf, tag)
            .map_err(|_| CryptoError::AeadFailure)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_round_trips() {
        let key = [7u8; KEY_LEN];
        let cipher = Cipher::new(&key).unwrap();
        let header = [0x80, 0x78, 0, 1, 0, 0, 0, 20, 0, 0, 0x12, 0x34];
        let plaintext = b"opus frame payload";

        let sealed = cipher.seal(&header, plaintext).unwrap();
        let opened = cipher.open(&header, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn nonce_has_header_prefix_and_zero_suffix() {
        let header = [1u8; RTP_HEADER_LEN];
        let nonce = Cipher::nonce_from_header(&header);
        assert_eq!(&nonce[..RTP_HEADER_LEN], &header[..]);
        assert!(nonce[RTP_HEADER_LEN..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_key_of_wrong_length() {
        assert!(matches!(
            Cipher::new(&[0u8; 16]),
            Err(CryptoError::BadKeyLength(16))
        ));
    }

    #[test]
    fn mode_request_str_round_trips() {
        for m in [Mode::Normal, Mode::Suffix, Mode::Lite] {
            assert_eq!(Mode::from_request_str(m.to_request_str()), Some(m));
        }
    }
}

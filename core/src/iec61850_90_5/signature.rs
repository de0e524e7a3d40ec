//! # Session Frame Signatures
//!
//! Keyed MACs protecting the SPDU of a session data frame. SHA tier algorithms use
//! HMAC-SHA256, AES tier algorithms use AES-128-CMAC keyed with the first 16 key bytes.
//! Both are truncated to the algorithm's hash length.
//!
//! There is no key distribution: every key ID resolves to the publicly known
//! [`DUMMY_KEY`]. A signature therefore detects corruption, not tampering.

use aes::Aes128;
use cmac::Cmac;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::common::{ParseError, SignatureAlgorithm, SIGNATURE_TAG};

type HmacSha256 = Hmac<Sha256>;
type CmacAes128 = Cmac<Aes128>;

/// Placeholder key shared by every publisher and subscriber.
pub const DUMMY_KEY: [u8; 128] = dummy_key();

const fn dummy_key() -> [u8; 128] {
    const PATTERN: [u8; 16] = [
        0x01, 0x33, 0x34, 0x35, 0x36, 0x37, 0x01, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x66,
        0x77, 0x88,
    ];
    let mut key = [0u8; 128];
    let mut i = 0;
    while i < 128 {
        key[i] = PATTERN[i % 16];
        i += 1;
    }
    key
}

/// Resolves the key for a session header key ID.
// TODO: look up rotating group keys from a key distribution centre by key ID
pub fn signing_key(_key_id: u32) -> &'static [u8] {
    &DUMMY_KEY
}

/// Computes the truncated MAC for `data`. `None` yields an empty signature.
pub fn compute_signature(
    algorithm: SignatureAlgorithm,
    key: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, ParseError> {
    let mut digest = match algorithm {
        SignatureAlgorithm::None => return Ok(Vec::new()),
        SignatureAlgorithm::Sha80 | SignatureAlgorithm::Sha128 | SignatureAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(key).map_err(|e| {
                ParseError::InvalidConfiguration {
                    message: format!("Invalid HMAC key: {}", e),
                }
            })?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        SignatureAlgorithm::Aes64 | SignatureAlgorithm::Aes128 => {
            let aes_key = key.get(..16).ok_or_else(|| ParseError::InvalidConfiguration {
                message: format!("AES signature key needs 16 bytes, got {}", key.len()),
            })?;
            let mut mac = CmacAes128::new_from_slice(aes_key).map_err(|e| {
                ParseError::InvalidConfiguration {
                    message: format!("Invalid CMAC key: {}", e),
                }
            })?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    };
    digest.truncate(algorithm.hash_length());
    Ok(digest)
}

/// Builds the frame trailer: signature tag followed by the MAC.
pub fn signature_trailer(
    algorithm: SignatureAlgorithm,
    key: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, ParseError> {
    if algorithm == SignatureAlgorithm::None {
        return Ok(Vec::new());
    }
    let mut trailer = Vec::with_capacity(algorithm.trailer_length());
    trailer.push(SIGNATURE_TAG);
    trailer.extend_from_slice(&compute_signature(algorithm, key, data)?);
    Ok(trailer)
}

/// Result of comparing a received trailer against a locally computed MAC.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignatureCheck {
    pub source_hash: Vec<u8>,
    pub calculated_hash: Vec<u8>,
}

impl SignatureCheck {
    pub fn is_valid(&self) -> bool {
        self.source_hash == self.calculated_hash
    }
}

/// Verifies the trailer at `trailer` against a MAC over `signed`.
///
/// A missing signature tag is always an error. A hash mismatch is reported through
/// [`SignatureCheck::is_valid`] so the caller can decide whether it is tolerated.
pub fn verify_signature(
    algorithm: SignatureAlgorithm,
    key: &[u8],
    signed: &[u8],
    trailer: &[u8],
) -> Result<SignatureCheck, ParseError> {
    if algorithm == SignatureAlgorithm::None {
        return Ok(SignatureCheck::default());
    }

    let found = trailer.first().copied().unwrap_or(0);
    if found != SIGNATURE_TAG {
        return Err(ParseError::MissingSignatureTag { algorithm, found });
    }

    let hash_length = algorithm.hash_length();
    let source_hash = trailer
        .get(1..1 + hash_length)
        .ok_or_else(|| {
            ParseError::short_buffer("Signature hash", 1 + hash_length, trailer.len())
        })?
        .to_vec();

    Ok(SignatureCheck {
        source_hash,
        calculated_hash: compute_signature(algorithm, key, signed)?,
    })
}

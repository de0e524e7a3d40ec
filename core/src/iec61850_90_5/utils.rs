//! # IEC 61850-90-5 Frame Utilities
//!
//! Checksum helpers for plain frames and buffer scanning used to resynchronise a stream.
//! The CRC is the CRC-CCITT variant specified in IEEE C37.118.2-2011 Appendix B, which
//! the plain configuration and command frames of this protocol reuse unchanged.

use super::common::{ParseError, SignatureAlgorithm, CLTP_TAG, SYNC_BYTE};

/// Calculates the CRC-CCITT checksum for a given buffer.
///
/// # Parameters
///
/// * `buffer`: The input byte slice to calculate the CRC for.
///
/// # Returns
///
/// The calculated 16-bit CRC checksum.
pub fn calculate_crc(buffer: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in buffer {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Validates the checksum of a given buffer.
///
/// Checks if the buffer's last two bytes match the calculated CRC-CCITT checksum
/// for the preceding bytes.
///
/// # Returns
///
/// * `Ok(())` if the checksum is valid.
/// * `Err(ParseError::InvalidLength)` if the buffer is too short.
/// * `Err(ParseError::ChecksumMismatch)` if the checksum does not match.
pub fn validate_checksum(buffer: &[u8]) -> Result<(), ParseError> {
    if buffer.len() < 2 {
        return Err(ParseError::InvalidLength {
            message: format!("Buffer too short: {}", buffer.len()),
        });
    }

    let calculated_crc = calculate_crc(&buffer[..buffer.len() - 2]);
    let frame_crc = u16::from_be_bytes([buffer[buffer.len() - 2], buffer[buffer.len() - 1]]);

    if calculated_crc != frame_crc {
        log::warn!(
            "CRC Checksum Mismatch: Expected {:04X}, got {:04X}",
            calculated_crc,
            frame_crc
        );
        log::debug!("Buffer (Hex): {}", to_hex_string(buffer));
        return Err(ParseError::ChecksumMismatch {
            expected: calculated_crc,
            found: frame_crc,
        });
    }
    Ok(())
}

/// Space separated upper-case hex, used for diagnostics.
pub fn to_hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<String>>()
        .join(" ")
}

/// Total on-wire length of the frame starting at `start`, if enough of it is present
/// to tell.
///
/// Plain frames carry their length in bytes 2-3. Session frames are sized from the
/// SPDU length and the signature algorithm byte.
pub fn frame_length_at(buffer: &[u8], start: usize) -> Option<usize> {
    let frame = buffer.get(start..)?;

    if frame.first() == Some(&SYNC_BYTE) {
        if frame.len() < 4 {
            return None;
        }
        return Some(u16::from_be_bytes([frame[2], frame[3]]) as usize);
    }

    if frame.get(1) == Some(&CLTP_TAG) {
        let cltp = frame[0] as usize + 1;
        // session type, header size, two marker bytes, SPDU length
        let spdu_at = cltp + 4;
        // packet number (4), version (2), key timing (6), security (1)
        let signature_at = spdu_at + 4 + 13;
        if frame.len() <= signature_at {
            return None;
        }
        let spdu = u32::from_be_bytes([
            frame[spdu_at],
            frame[spdu_at + 1],
            frame[spdu_at + 2],
            frame[spdu_at + 3],
        ]) as usize;
        let trailer = SignatureAlgorithm::from_byte(frame[signature_at])
            .map(|algorithm| algorithm.trailer_length())
            .unwrap_or(0);
        return Some(cltp + spdu + 8 + trailer);
    }

    None
}

/// Finds the starting indices and completeness of frames in a buffer.
///
/// A plain frame starts with the sync byte 0xAA followed by a known frame type byte.
/// A session frame starts with a CLTP length indicator followed by the CLTP tag 0x40
/// and the sampled value session type 0xA2. This is useful for splitting a buffer that
/// holds several frames, or for skipping garbage ahead of the next frame.
///
/// # Returns
///
/// * `Ok(Vec<(usize, bool)>)` of (start_index, is_complete) tuples.
/// * `Err(ParseError::InvalidFormat)` if no candidate frame start is found.
pub fn find_frame_starts(buffer: &[u8]) -> Result<Vec<(usize, bool)>, ParseError> {
    let mut frame_info = Vec::new();

    for i in 0..buffer.len() {
        let plain = buffer[i] == SYNC_BYTE
            && buffer
                .get(i + 1)
                .map_or(false, |&b| matches!(b & 0xF0, 0x00 | 0x30 | 0x40) && b & 0x0F != 0);
        let session = buffer.get(i + 1) == Some(&CLTP_TAG)
            && buffer
                .get(i + buffer[i] as usize + 1)
                .map_or(false, |&b| b == 0xA2);

        if plain || session {
            let is_complete = match frame_length_at(buffer, i) {
                Some(length) => i + length <= buffer.len(),
                None => false,
            };
            frame_info.push((i, is_complete));
        }
    }

    if frame_info.is_empty() {
        return Err(ParseError::InvalidFormat {
            message: "No valid frame sync bytes found in buffer".to_string(),
        });
    }

    Ok(frame_info)
}

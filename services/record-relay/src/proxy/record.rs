//! TLS record-layer framing and classification.
//!
//! Only the clear-text framing is decoded:
//!
//! TLS record structure:
//! - byte 0: content type
//! - bytes 1-2: protocol version (big-endian)
//! - bytes 3-4: payload length (big-endian)
//! - bytes 5+: payload
//!
//! Handshake payload (content type 22):
//! - byte 0: handshake type
//! - bytes 1-3: handshake body length (24-bit big-endian)
//!
//! Alert payload (content type 21):
//! - byte 0: alert level
//! - byte 1: alert description
//!
//! Reference: RFC 8446 section 5.1, RFC 5246 section 6.2.1

use std::fmt;

/// Size of the record header in bytes.
pub const HEADER_LEN: usize = 5;

/// Largest payload a record may declare (2^14 bytes, RFC 8446 5.1).
pub const MAX_RECORD_LEN: usize = 16384;

/// Label used for any code missing from the lookup tables.
pub const UNKNOWN: &str = "unknown";

/// Content type code of an Alert record.
pub const CONTENT_TYPE_ALERT: u8 = 21;

/// Content type code of a Handshake record.
pub const CONTENT_TYPE_HANDSHAKE: u8 = 22;

/// Decoded 5-byte record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Content type code.
    pub content_type: u8,
    /// Legacy record version, e.g. `0x0303`.
    pub version: u16,
    /// Declared payload length.
    pub length: u16,
}

impl RecordHeader {
    /// Decode a header from its wire bytes.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Self {
        Self {
            content_type: bytes[0],
            version: u16::from_be_bytes([bytes[1], bytes[2]]),
            length: u16::from_be_bytes([bytes[3], bytes[4]]),
        }
    }

    /// Payload length as a buffer size.
    pub fn payload_len(&self) -> usize {
        self.length as usize
    }

    /// Whether the declared length is above the record-size ceiling.
    pub fn is_oversized(&self) -> bool {
        self.payload_len() > MAX_RECORD_LEN
    }

    /// Human-readable content type.
    pub fn content_type_name(&self) -> &'static str {
        content_type_name(self.content_type)
    }
}

/// Record version rendered as a 16-bit hex value (`0x0303`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion(pub u16);

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Look up a content type code.
pub fn content_type_name(code: u8) -> &'static str {
    match code {
        0 => "Invalid",
        20 => "Change Cipher Spec",
        21 => "Alert",
        22 => "Handshake",
        23 => "Application Data",
        _ => UNKNOWN,
    }
}

/// Look up a handshake message type code.
pub fn handshake_type_name(code: u8) -> &'static str {
    match code {
        0 => "Hello Request",
        1 => "Client Hello",
        2 => "Server Hello",
        4 => "New Session Ticket",
        5 => "End Of Early Data",
        8 => "Encrypted Extensions",
        11 => "Certificate",
        12 => "Server Key Exchange",
        13 => "Certificate Request",
        14 => "Server Hello Done",
        15 => "Certificate Verify",
        16 => "Client Key Exchange",
        20 => "Finished",
        24 => "Key Update",
        254 => "Message Hash",
        _ => UNKNOWN,
    }
}

/// Look up an alert level code.
pub fn alert_level_name(code: u8) -> &'static str {
    match code {
        1 => "Warning",
        2 => "Fatal",
        _ => UNKNOWN,
    }
}

/// Look up an alert description code.
pub fn alert_description_name(code: u8) -> &'static str {
    match code {
        0 => "Close Notify",
        10 => "Unexpected Message",
        20 => "Bad Record MAC",
        22 => "Record Overflow",
        30 => "Decompression Failure",
        40 => "Handshake Failure",
        41 => "No Certificate",
        42 => "Bad Certificate",
        43 => "Unsupported Certificate",
        44 => "Certificate Revoked",
        45 => "Certificate Expired",
        46 => "Certificate Unknown",
        47 => "Illegal Parameter",
        48 => "Unknown CA",
        49 => "Access Denied",
        50 => "Decode Error",
        51 => "Decrypt Error",
        60 => "Export Restriction",
        70 => "Protocol Version",
        71 => "Insufficient Security",
        80 => "Internal Error",
        86 => "Inappropriate Fallback",
        90 => "User Canceled",
        100 => "No Renegotiation",
        109 => "Missing Extension",
        110 => "Unsupported Extension",
        112 => "Unrecognized Name",
        113 => "Bad Certificate Status Response",
        115 => "Unknown PSK Identity",
        116 => "Certificate Required",
        120 => "No Application Protocol",
        _ => UNKNOWN,
    }
}

/// Clear-text sub-fields of a record payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDetail {
    /// Nothing beyond the header is decoded for this record.
    None,
    /// First handshake message header of a Handshake record.
    Handshake {
        /// Handshake message type code.
        kind: u8,
        /// 24-bit handshake body length.
        length: u32,
    },
    /// Alert record body.
    Alert {
        /// Alert level code.
        level: u8,
        /// Alert description code.
        description: u8,
    },
}

impl RecordDetail {
    /// Classify a record payload by its content type.
    ///
    /// Never fails: a payload too short for the fixed-offset fields yields
    /// [`RecordDetail::None`].
    pub fn classify(content_type: u8, payload: &[u8]) -> Self {
        match (content_type, payload) {
            (CONTENT_TYPE_HANDSHAKE, [kind, l0, l1, l2, ..]) => Self::Handshake {
                kind: *kind,
                length: u32::from_be_bytes([0, *l0, *l1, *l2]),
            },
            (CONTENT_TYPE_ALERT, [level, description, ..]) => Self::Alert {
                level: *level,
                description: *description,
            },
            _ => Self::None,
        }
    }
}

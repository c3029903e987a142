//! Base64 encoding for worker payloads

use base64::{engine::general_purpose::STANDARD, Engine};

/// Encode binary data to base64 string
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

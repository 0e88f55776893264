//! Image encoding: raw upload bytes → base64 data URL.
//!
//! The vision API takes images inline as `data:<mime>;base64,<payload>`
//! URLs inside the JSON body. Uploads are forwarded without re-encoding so
//! the model sees the original pixels; only the MIME type is sniffed from the
//! leading magic bytes, falling back to JPEG.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Guess the image MIME type from its magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        [b'B', b'M', ..] => "image/bmp",
        _ => "image/jpeg",
    }
}

/// Encode an uploaded image as a data URL ready for the vision API.
pub fn encode_image(bytes: &[u8]) -> String {
    let mime = sniff_mime(bytes);
    let b64 = STANDARD.encode(bytes);
    debug!(mime, base64_len = b64.len(), "Encoded image");
    format!("data:{mime};base64,{b64}")
}

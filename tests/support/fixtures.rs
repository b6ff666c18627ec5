//! Canned image payloads.

#![allow(dead_code)]

use wiremock::ResponseTemplate;

/// PNG signature, IHDR header and a few payload bytes.
pub const PNG_BYTES: &[u8] =
    b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01\x00\x00\x00\x01\x08\x06\x00\x00\x00pixels";

/// JPEG SOI/APP0 marker followed by filler.
pub const JPEG_BYTES: &[u8] = b"\xff\xd8\xff\xe0\x00\x10JFIF\x00\x01\x01\x00\x00\x01\x00\x01\x00\x00body";

/// GIF89a header followed by filler.
pub const GIF_BYTES: &[u8] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00frames";

pub fn image_response(bytes: &'static [u8]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(bytes, "application/octet-stream")
}

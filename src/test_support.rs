//! Unit test helpers. The integration tests carry the full socket guard.

use std::net::TcpListener;

use wiremock::{MockServer, ResponseTemplate};

/// PNG signature followed by an IHDR chunk header and some payload bytes.
pub(crate) const PNG_BYTES: &[u8] =
    b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01\x00\x00\x00\x01\x08\x06\x00\x00\x00pixels";

/// 200 response carrying [`PNG_BYTES`] under a content type sniffing ignores.
pub(crate) fn png_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(PNG_BYTES, "application/octet-stream")
}

/// Starts a mock server, or returns `None` where localhost sockets are
/// unavailable.
pub(crate) async fn start_mock_server() -> Option<MockServer> {
    if TcpListener::bind("127.0.0.1:0").is_err() {
        eprintln!("cannot bind a localhost socket; skipping wiremock test");
        return None;
    }
    Some(MockServer::start().await)
}

//! Image format sniffing and the sniff-then-replay body stream.

use std::fmt::{Display, Formatter, Result as FmtResult};

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use sha2::{Digest, Sha256};

use super::constants::SNIFF_LEN;

/// Image formats recognised from leading signature bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    Icon,
    Avif,
}

impl Display for ImageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.extension())
    }
}

impl ImageKind {
    /// File extension without the dot; the lowercase MIME subtype.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpeg",
            ImageKind::Png => "png",
            ImageKind::Gif => "gif",
            ImageKind::Webp => "webp",
            ImageKind::Bmp => "bmp",
            ImageKind::Icon => "x-icon",
            ImageKind::Avif => "avif",
        }
    }

    /// Full MIME type.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("image/{}", self.extension())
    }

    /// Identifies the format from the first bytes of a payload.
    ///
    /// Only the first [`SNIFF_LEN`] bytes are considered. Returns `None` for
    /// anything that is not a recognised image, including HTML error pages
    /// served with an image URL.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes = &bytes[..bytes.len().min(SNIFF_LEN)];
        if bytes.starts_with(b"\xFF\xD8\xFF") {
            Some(ImageKind::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageKind::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageKind::Gif)
        } else if bytes.len() >= 14 && &bytes[..4] == b"RIFF" && &bytes[8..14] == b"WEBPVP" {
            Some(ImageKind::Webp)
        } else if bytes.starts_with(b"BM") {
            Some(ImageKind::Bmp)
        } else if bytes.starts_with(b"\x00\x00\x01\x00") || bytes.starts_with(b"\x00\x00\x02\x00") {
            Some(ImageKind::Icon)
        } else if bytes.len() >= 12 && &bytes[4..12] == b"ftypavif" {
            Some(ImageKind::Avif)
        } else {
            None
        }
    }
}

/// A byte stream whose format has been sniffed without losing any data.
///
/// Construction buffers at least [`SNIFF_LEN`] bytes (or the whole body if
/// shorter), identifies the format, then hands the buffered head back out as
/// the first chunk. When hashing is enabled every chunk handed out is fed to a
/// SHA-256 accumulator, so the digest covers exactly the bytes the caller saw.
pub struct ImageStream<S> {
    inner: S,
    head: Option<Bytes>,
    kind: Option<ImageKind>,
    hasher: Option<Sha256>,
}

impl<S, E> ImageStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    /// Reads the head of `inner` and sniffs it.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `inner` while filling the head.
    pub async fn new(mut inner: S, hash: bool) -> Result<Self, E> {
        let mut head = BytesMut::with_capacity(SNIFF_LEN);
        while head.len() < SNIFF_LEN {
            match inner.next().await {
                Some(chunk) => head.extend_from_slice(&chunk?),
                None => break,
            }
        }
        let kind = ImageKind::from_magic_bytes(&head);

        Ok(Self {
            inner,
            head: (!head.is_empty()).then(|| head.freeze()),
            kind,
            hasher: hash.then(Sha256::new),
        })
    }

    /// Detected format, `None` if the payload is not a recognised image.
    #[must_use]
    pub fn kind(&self) -> Option<ImageKind> {
        self.kind
    }

    /// Next chunk of the body, starting with the buffered head.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, E>> {
        let chunk = match self.head.take() {
            Some(head) => Ok(head),
            None => self.inner.next().await?,
        };
        if let (Some(hasher), Ok(bytes)) = (self.hasher.as_mut(), &chunk) {
            hasher.update(bytes);
        }
        Some(chunk)
    }

    /// Lowercase hex SHA-256 of every chunk yielded so far.
    ///
    /// `None` when hashing was not requested.
    #[must_use]
    pub fn content_hash(self) -> Option<String> {
        self.hasher.map(|hasher| format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::convert::Infallible;

    use futures_util::stream;

    use super::*;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    fn chunked(parts: Vec<&'static [u8]>) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin {
        stream::iter(parts.into_iter().map(|part| Ok(Bytes::from_static(part))))
    }

    async fn drain<S: Stream<Item = Result<Bytes, Infallible>> + Unpin>(
        image: &mut ImageStream<S>,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = image.next_chunk().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[test]
    fn test_magic_bytes_known_formats() {
        assert_eq!(ImageKind::from_magic_bytes(b"\xFF\xD8\xFF\xE0rest"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_magic_bytes(PNG_HEADER), Some(ImageKind::Png));
        assert_eq!(ImageKind::from_magic_bytes(b"GIF89a\x01\x00"), Some(ImageKind::Gif));
        assert_eq!(ImageKind::from_magic_bytes(b"RIFF\x24\x00\x00\x00WEBPVP8 "), Some(ImageKind::Webp));
        assert_eq!(ImageKind::from_magic_bytes(b"BM\x36\x00"), Some(ImageKind::Bmp));
        assert_eq!(ImageKind::from_magic_bytes(b"\x00\x00\x01\x00\x01"), Some(ImageKind::Icon));
        assert_eq!(ImageKind::from_magic_bytes(b"\x00\x00\x00\x1cftypavif"), Some(ImageKind::Avif));
    }

    #[test]
    fn test_magic_bytes_rejects_non_images() {
        assert_eq!(ImageKind::from_magic_bytes(b"<!DOCTYPE html><html>"), None);
        assert_eq!(ImageKind::from_magic_bytes(b"%PDF-1.7"), None);
        assert_eq!(ImageKind::from_magic_bytes(b""), None);
        // RIFF container that is not WebP (WAV audio)
        assert_eq!(ImageKind::from_magic_bytes(b"RIFF\x24\x00\x00\x00WAVEfmt "), None);
    }

    #[test]
    fn test_extension_is_mime_subtype() {
        assert_eq!(ImageKind::Jpeg.extension(), "jpeg");
        assert_eq!(ImageKind::Icon.mime_type(), "image/x-icon");
        assert_eq!(ImageKind::Webp.to_string(), "webp");
    }

    #[tokio::test]
    async fn test_stream_replays_sniffed_head() {
        let mut image = ImageStream::new(chunked(vec![&PNG_HEADER[..4], &PNG_HEADER[4..], b"tail"]), false)
            .await
            .unwrap();
        assert_eq!(image.kind(), Some(ImageKind::Png));

        let body = drain(&mut image).await;
        let mut expected = PNG_HEADER.to_vec();
        expected.extend_from_slice(b"tail");
        assert_eq!(body, expected);
        assert_eq!(image.content_hash(), None);
    }

    #[tokio::test]
    async fn test_stream_longer_than_sniff_window() {
        static BIG: [u8; 2048] = {
            let mut data = [7u8; 2048];
            data[0] = b'G';
            data[1] = b'I';
            data[2] = b'F';
            data[3] = b'8';
            data[4] = b'9';
            data[5] = b'a';
            data
        };
        let parts: Vec<&'static [u8]> = BIG.chunks(300).collect();
        let mut image = ImageStream::new(chunked(parts), true).await.unwrap();
        assert_eq!(image.kind(), Some(ImageKind::Gif));
        assert_eq!(drain(&mut image).await, BIG.to_vec());
    }

    #[tokio::test]
    async fn test_hash_covers_whole_body() {
        let mut image = ImageStream::new(chunked(vec![PNG_HEADER, b"pixels"]), true)
            .await
            .unwrap();
        let body = drain(&mut image).await;
        let expected = format!("{:x}", Sha256::digest(&body));
        assert_eq!(image.content_hash(), Some(expected));
    }

    #[tokio::test]
    async fn test_empty_body_has_no_kind() {
        let mut image = ImageStream::new(chunked(vec![]), false).await.unwrap();
        assert_eq!(image.kind(), None);
        assert!(image.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_head_read_error_is_returned() {
        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"\xFF\xD8")),
            Err(std::io::Error::other("reset")),
        ]);
        let result = ImageStream::new(failing, false).await;
        assert!(result.is_err());
    }
}

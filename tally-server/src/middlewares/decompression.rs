use axum::http::{Request, header};
pub use tower_http::decompression::RequestDecompressionLayer;

/// Map request middleware that removes empty content encoding headers.
///
/// This is to be used along with the [`RequestDecompressionLayer`].
pub fn remove_empty_encoding<B>(mut request: Request<B>) -> Request<B> {
    if let header::Entry::Occupied(entry) = request.headers_mut().entry(header::CONTENT_ENCODING) {
        if should_ignore_encoding(entry.get().as_bytes()) {
            entry.remove();
        }
    }

    request
}

/// Returns `true` if this content-encoding value should be ignored.
fn should_ignore_encoding(value: &[u8]) -> bool {
    value == b"" || value.eq_ignore_ascii_case(b"identity")
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_remove_empty_encoding() {
        for value in ["", "identity", "IDENTITY"] {
            let mut request = Request::new(());
            request
                .headers_mut()
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static(value));

            let request = remove_empty_encoding(request);
            assert!(!request.headers().contains_key(header::CONTENT_ENCODING));
        }
    }

    #[test]
    fn test_keep_gzip_encoding() {
        let mut request = Request::new(());
        request
            .headers_mut()
            .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));

        let request = remove_empty_encoding(request);
        assert_eq!(request.headers()[header::CONTENT_ENCODING], "gzip");
    }
}

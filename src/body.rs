//! Body type shared by inbound requests, outbound requests and responses

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::header::{CONTENT_TYPE, LOCATION};
use hyper::{Response, StatusCode};

/// Boxed streaming body used across the proxy.
pub type Body = BoxBody<Bytes, hyper::Error>;

/// Create full body
pub fn full<T: Into<Bytes>>(chunk: T) -> Body {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Create empty body
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

/// Create text response
pub fn text_response(status: StatusCode, body: &str) -> Response<Body> {
    let mut response = Response::new(full(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

pub fn not_found() -> Response<Body> {
    text_response(StatusCode::NOT_FOUND, "404 page not found\n")
}

pub fn bad_gateway() -> Response<Body> {
    text_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
}

/// Create redirect response. An unrepresentable location degrades to a 404.
pub fn redirect_response(location: &str) -> Response<Body> {
    match hyper::header::HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = Response::new(empty());
            *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(_) => not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_text_response_body() {
        let response = not_found();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"404 page not found\n");
    }

    #[test]
    fn test_redirect_sets_location() {
        let response = redirect_response("/static/");
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[LOCATION], "/static/");
    }
}

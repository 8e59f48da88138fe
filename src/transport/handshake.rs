//! Handshake helpers: topic extraction from the upgrade request and the
//! responses used to refuse a connection.

use tungstenite::handshake::server::{ErrorResponse, Request};
use tungstenite::http::StatusCode;

use crate::utils::HandshakeError;

/// Query parameter naming the topic.
pub const TOPIC_PARAM: &str = "topic";

/// Written verbatim to sockets that did not ask for a websocket upgrade.
pub const BAD_REQUEST_RESPONSE: &[u8] =
    b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

/// Extracts the (URL-decoded) `topic` query parameter from an upgrade request.
pub fn topic_from_request(req: &Request) -> Result<String, HandshakeError> {
    topic_from_query(req.uri().query().unwrap_or_default())
}

pub fn topic_from_query(query: &str) -> Result<String, HandshakeError> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == TOPIC_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|topic| !topic.trim().is_empty())
        .ok_or(HandshakeError::MissingTopic)
}

/// True when the handshake failed because the request was not a valid
/// websocket upgrade (plain HTTP, wrong method, missing headers).
pub fn is_not_upgrade(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::Protocol(_) | tungstenite::Error::HttpFormat(_)
    )
}

/// HTTP response returned from the handshake callback to refuse an upgrade.
pub fn rejection(status: StatusCode, body: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(body.to_string()));
    *response.status_mut() = status;
    response
}

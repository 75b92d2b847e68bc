use std::net::SocketAddr;

use hyper::StatusCode;
use thiserror::Error;

use crate::messages::Method;

/// Failures delivering a request to a role or getting its reply back.
///
/// The protocol never escalates these: a failed call counts as a rejection.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no endpoint listening at {0}")]
    Unreachable(SocketAddr),

    #[error("connection to {0} dropped")]
    Dropped(SocketAddr),

    #[error("method {0} is not served by this endpoint")]
    UnknownMethod(Method),

    #[error("unexpected response to {0}")]
    UnexpectedResponse(Method),

    #[error("request failed with HTTP status {0}")]
    Status(StatusCode),

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

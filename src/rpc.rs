//! Request/response plumbing between roles.
//!
//! A `Transport` opens a call to a peer address, delivers one request and
//! waits for one response. Every call stands alone; no session is kept
//! between calls. A `Handler` is the serving side of a role.
use std::net::SocketAddr;

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::messages::{Request, Response};
use crate::value::Value;

/// Client side of the call mechanism.
pub trait Transport<V: Value>: Send + Sync + 'static {
    /// Calls the method named by `request` on the endpoint bound at `addr`.
    fn call(
        &self,
        addr: SocketAddr,
        request: Request<V>,
    ) -> BoxFuture<'static, Result<Response<V>>>;
}

/// Serving side of a role.
pub trait Handler<V: Value>: Send + Sync + 'static {
    /// Handles a request delivered to the role's endpoint.
    fn handle(&self, request: Request<V>) -> BoxFuture<'_, Result<Response<V>>>;
}

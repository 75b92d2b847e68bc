//! Implementations of the call mechanism.
//!
//! `local` connects roles living in the same process and can simulate an
//! unreliable network. `http` carries bincode-encoded calls over HTTP.
pub mod http;
pub mod local;

pub use self::http::{serve, HttpTransport, Listener};
pub use self::local::LocalTransport;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::ops::Range;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use rand::Rng;

use crate::error::{Error, Result};
use crate::messages::{Request, Response};
use crate::rpc::{Handler, Transport};
use crate::value::Value;

struct Endpoint<V: Value> {
    handler: Arc<dyn Handler<V>>,
    /// Probability that an inbound call is dropped
    drop_rate: f64,
    latency: Option<Range<Duration>>,
}

/// In-process transport: endpoints are handlers registered under an address.
///
/// Endpoints can be made unreliable (randomly dropped calls) or slow
/// (random delivery delay) to simulate a lossy network.
pub struct LocalTransport<V: Value> {
    endpoints: RwLock<HashMap<SocketAddr, Endpoint<V>>>,
}

impl<V: Value> Default for LocalTransport<V> {
    fn default() -> LocalTransport<V> {
        LocalTransport {
            endpoints: RwLock::new(HashMap::new()),
        }
    }
}

impl<V: Value> LocalTransport<V> {
    pub fn new() -> LocalTransport<V> {
        LocalTransport::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SocketAddr, Endpoint<V>>> {
        self.endpoints.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SocketAddr, Endpoint<V>>> {
        self.endpoints.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts serving `handler` at `addr`, replacing any previous endpoint.
    pub fn bind(&self, addr: SocketAddr, handler: Arc<dyn Handler<V>>) {
        debug!("Binding local endpoint {}", addr);
        self.write().insert(
            addr,
            Endpoint {
                handler,
                drop_rate: 0.0,
                latency: None,
            },
        );
    }

    /// Stops serving `addr`. Later calls fail as unreachable.
    pub fn close(&self, addr: SocketAddr) -> bool {
        debug!("Closing local endpoint {}", addr);
        self.write().remove(&addr).is_some()
    }

    /// Drops each inbound call to `addr` with probability `rate`.
    pub fn set_drop_rate(&self, addr: SocketAddr, rate: f64) {
        if let Some(endpoint) = self.write().get_mut(&addr) {
            endpoint.drop_rate = rate.clamp(0.0, 1.0);
        }
    }

    /// Delays delivery of each inbound call to `addr` by a random duration.
    pub fn set_latency(&self, addr: SocketAddr, latency: Range<Duration>) {
        if let Some(endpoint) = self.write().get_mut(&addr) {
            endpoint.latency = Some(latency);
        }
    }
}

fn should_drop(rate: f64) -> bool {
    rate > 0.0 && rand::rng().random_bool(rate)
}

fn sample_delay(latency: &Range<Duration>) -> Duration {
    if latency.is_empty() {
        return latency.start;
    }
    let start = u64::try_from(latency.start.as_nanos()).unwrap_or(u64::MAX);
    let end = u64::try_from(latency.end.as_nanos()).unwrap_or(u64::MAX);
    Duration::from_nanos(rand::rng().random_range(start..end))
}

impl<V: Value> Transport<V> for LocalTransport<V> {
    fn call(
        &self,
        addr: SocketAddr,
        request: Request<V>,
    ) -> BoxFuture<'static, Result<Response<V>>> {
        let endpoint = self.read().get(&addr).map(|e| {
            let delay = e.latency.as_ref().map(sample_delay);
            (e.handler.clone(), should_drop(e.drop_rate), delay)
        });

        async move {
            let (handler, dropped, delay) = endpoint.ok_or(Error::Unreachable(addr))?;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if dropped {
                trace!("Dropping {} to {}", request.method(), addr);
                return Err(Error::Dropped(addr));
            }
            handler.handle(request).await
        }
        .boxed()
    }
}

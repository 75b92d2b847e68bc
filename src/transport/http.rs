use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use hyper::client::HttpConnector;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Client, Method as HttpMethod, Server, StatusCode};
use rand::Rng;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::messages::{Method, Request, Response};
use crate::rpc::{Handler, Transport};
use crate::value::Value;

/// Transport posting bincode-encoded requests to `http://<addr>/<method>`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Body>,
}

impl Default for HttpTransport {
    fn default() -> HttpTransport {
        HttpTransport { client: Client::new() }
    }
}

impl HttpTransport {
    pub fn new() -> HttpTransport {
        HttpTransport::default()
    }
}

impl<V: Value> Transport<V> for HttpTransport {
    fn call(
        &self,
        addr: SocketAddr,
        request: Request<V>,
    ) -> BoxFuture<'static, Result<Response<V>>> {
        let client = self.client.clone();
        async move {
            let uri = format!("http://{}/{}", addr, request.method());
            let bytes = bincode::serialize(&request)?;
            let request = hyper::Request::builder()
                .method(HttpMethod::POST)
                .uri(uri)
                .body(Body::from(bytes))?;

            let response = client.request(request).await?;
            if !response.status().is_success() {
                return Err(Error::Status(response.status()));
            }
            let body = hyper::body::to_bytes(response.into_body()).await?;
            Ok(bincode::deserialize(&body)?)
        }
        .boxed()
    }
}

/// A role endpoint served over HTTP.
pub struct Listener {
    address: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Listener {
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Stops accepting calls and waits for in-flight calls to finish.
    pub async fn close(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!("Listener {} did not shut down cleanly: {}", self.address, e);
        }
        info!("Listener {} closed", self.address);
    }
}

/// Serves `handler` on `listener`. Each inbound call is dropped with
/// probability `drop_rate` to simulate an unreliable network.
pub fn serve<V: Value>(
    listener: TcpListener,
    handler: Arc<dyn Handler<V>>,
    drop_rate: f64,
) -> Result<Listener> {
    let address = listener.local_addr()?;
    let drop_rate = drop_rate.clamp(0.0, 1.0);

    let service = make_service_fn(move |_| {
        let handler = handler.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(dispatch(handler, req, drop_rate).await) }
            }))
        }
    });

    let (shutdown, signal) = oneshot::channel::<()>();
    let server = Server::from_tcp(listener)?
        .serve(service)
        .with_graceful_shutdown(async move {
            signal.await.ok();
        });

    info!("Listening on {}", address);
    let task = tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Server error on {}: {}", address, e);
        }
    });

    Ok(Listener {
        address,
        shutdown,
        task,
    })
}

fn should_drop(rate: f64) -> bool {
    rate > 0.0 && rand::rng().random_bool(rate)
}

async fn dispatch<V: Value>(
    handler: Arc<dyn Handler<V>>,
    req: hyper::Request<Body>,
    drop_rate: f64,
) -> hyper::Response<Body> {
    if should_drop(drop_rate) {
        return respond(StatusCode::SERVICE_UNAVAILABLE);
    }
    if req.method() != HttpMethod::POST {
        return respond(StatusCode::METHOD_NOT_ALLOWED);
    }
    let method = match Method::from_name(req.uri().path().trim_start_matches('/')) {
        Some(method) => method,
        None => return respond(StatusCode::NOT_FOUND),
    };

    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(body) => body,
        Err(e) => {
            debug!("Error reading request body: {}", e);
            return respond(StatusCode::BAD_REQUEST);
        }
    };
    let request: Request<V> = match bincode::deserialize(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("Error deserializing request: {}", e);
            return respond(StatusCode::BAD_REQUEST);
        }
    };
    if request.method() != method {
        return respond(StatusCode::NOT_FOUND);
    }

    let response = match handler.handle(request).await {
        Ok(response) => response,
        Err(e) => {
            debug!("Error handling {}: {}", method, e);
            return respond(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    match bincode::serialize(&response) {
        Ok(bytes) => {
            let mut resp = hyper::Response::new(Body::from(Bytes::from(bytes)));
            *resp.status_mut() = StatusCode::OK;
            resp
        }
        Err(e) => {
            error!("Error serializing response to {}: {}", method, e);
            respond(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn respond(code: StatusCode) -> hyper::Response<Body> {
    let mut resp = hyper::Response::default();
    *resp.status_mut() = code;
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acceptor::Acceptor;
    use crate::config::Configuration;
    use crate::learner::Learner;
    use crate::messages::{Accepted, Prepare};
    use crate::proposal::ProposalNumber;
    use crate::proposer::Proposer;
    use crate::value::BytesValue;
    use std::time::Duration;

    fn bind() -> TcpListener {
        TcpListener::bind("127.0.0.1:0").unwrap()
    }

    #[tokio::test]
    async fn learner_over_http() {
        let learner = Arc::new(Learner::new("127.0.0.1:4201".parse().unwrap(), 1));
        let listener = serve::<u64>(bind(), learner.clone(), 0.0).unwrap();
        let transport = HttpTransport::new();

        let request = Request::Accepted(Accepted {
            number: ProposalNumber::new(1, 1),
            acceptor: "127.0.0.1:4101".parse().unwrap(),
            accepted: true,
        });
        let res: Result<Response<u64>> = transport.call(listener.local_addr(), request).await;
        assert_matches!(res, Ok(Response::Ack));
        assert_eq!(learner.received().await, 1);

        // learners do not serve acceptor methods
        let request = Request::Prepare(Prepare {
            number: ProposalNumber::new(1, 1),
        });
        let res: Result<Response<u64>> = transport.call(listener.local_addr(), request).await;
        assert_matches!(res, Err(Error::Status(s)) if s == StatusCode::INTERNAL_SERVER_ERROR);

        listener.close().await;
    }

    async fn raw(addr: SocketAddr, method: HttpMethod, path: &str, body: Vec<u8>) -> StatusCode {
        let request = hyper::Request::builder()
            .method(method)
            .uri(format!("http://{}/{}", addr, path))
            .body(Body::from(body))
            .unwrap();
        Client::new().request(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn malformed_calls_are_refused() {
        let learner = Arc::new(Learner::new("127.0.0.1:4201".parse().unwrap(), 1));
        let listener = serve::<u64>(bind(), learner.clone(), 0.0).unwrap();
        let addr = listener.local_addr();
        let notification = bincode::serialize(&Request::<u64>::Accepted(Accepted {
            number: ProposalNumber::new(1, 1),
            acceptor: "127.0.0.1:4101".parse().unwrap(),
            accepted: true,
        }))
        .unwrap();

        // path names a different method than the body carries
        let path = "Acceptor.ReceivePrepare";
        let status = raw(addr, HttpMethod::POST, path, notification.clone()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let status = raw(addr, HttpMethod::POST, "Learner.Nope", notification.clone()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let status = raw(addr, HttpMethod::POST, "Learner.ReceiveAccepted", vec![0xff; 3]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let status = raw(addr, HttpMethod::GET, "Learner.ReceiveAccepted", Vec::new()).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        assert_eq!(learner.received().await, 0);
        let status = raw(addr, HttpMethod::POST, "Learner.ReceiveAccepted", notification).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(learner.received().await, 1);

        listener.close().await;
    }

    #[tokio::test]
    async fn dropped_calls_fail() {
        let learner = Arc::new(Learner::new("127.0.0.1:4201".parse().unwrap(), 1));
        let listener = serve::<u64>(bind(), learner.clone(), 1.0).unwrap();

        let request = Request::Accepted(Accepted {
            number: ProposalNumber::new(1, 1),
            acceptor: "127.0.0.1:4101".parse().unwrap(),
            accepted: true,
        });
        let res: Result<Response<u64>> =
            HttpTransport::new().call(listener.local_addr(), request).await;
        assert_matches!(res, Err(Error::Status(s)) if s == StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(learner.received().await, 0);

        listener.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn decides_over_http() {
        let _ = env_logger::builder().is_test(true).try_init();
        let transport = Arc::new(HttpTransport::new());

        let learner_socket = bind();
        let learner_addr = learner_socket.local_addr().unwrap();
        let learner = Arc::new(Learner::new(learner_addr, 2));
        let mut listeners =
            vec![serve::<BytesValue>(learner_socket, learner.clone(), 0.0).unwrap()];

        let mut acceptors = Vec::new();
        for _ in 0..3 {
            let socket = bind();
            let addr = socket.local_addr().unwrap();
            let acceptor = Arc::new(Acceptor::<BytesValue, _>::new(
                addr,
                vec![learner_addr].into(),
                transport.clone(),
            ));
            listeners.push(serve::<BytesValue>(socket, acceptor, 0.0).unwrap());
            acceptors.push(addr);
        }

        let config = Configuration::new(acceptors, vec![learner_addr])
            .with_phase_timeout(Duration::from_secs(1));
        let proposer: Proposer<BytesValue, _> = Proposer::new(1, config, transport);

        let proposal = proposer.propose(BytesValue::from("hello"));
        let decided = tokio::time::timeout(Duration::from_secs(10), proposal)
            .await
            .expect("decided in time");
        assert_eq!(decided, BytesValue::from("hello"));

        tokio::time::timeout(Duration::from_secs(5), async {
            while learner.chosen().await.is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("learner saw a quorum");

        for listener in listeners {
            listener.close().await;
        }
    }
}

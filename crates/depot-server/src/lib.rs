//! # depot-server
//!
//! The Depot daemon: a TCP accept loop in front of the file service, with
//! per-category admission gates wrapping every call.
//!
//! One spawned task handles one connection, which carries exactly one call.
//! The dispatcher reads the initial [`Request`], reserves a slot on the
//! matching gate (transfer for upload/download, list for listing; rejected
//! immediately with `ResourceExhausted` when saturated), runs the handler,
//! and translates any [`ServiceError`] into a terminal error frame. The gate
//! slot is a guard dropped on every exit path.

pub mod error;
pub mod service;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use depot_config::Config;
use depot_gate::{Admission, CancelFlag};
use depot_proto::{read_frame, write_frame, Request};
use depot_store::{Store, StoreError};

pub use error::ServiceError;
pub use service::FileService;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub struct Server {
    listener: TcpListener,
    service: Arc<FileService>,
    admission: Arc<Admission>,
}

impl Server {
    /// Open the storage root (rebuilding the metadata index from its
    /// contents), build the gates, and bind the listen socket.
    pub async fn bind(config: &Config) -> Result<Self, ServerError> {
        let store = Arc::new(Store::open(&config.storage.root)?);
        info!(
            root = %config.storage.root.display(),
            indexed = store.len(),
            "storage opened"
        );

        let admission = Arc::new(Admission::new(config.limits.transfer, config.limits.list));
        let listener = TcpListener::bind(&config.server.listen).await?;
        info!(addr = %listener.local_addr()?, "listening");

        Ok(Self {
            listener,
            service: Arc::new(FileService::new(store)),
            admission,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. When `shutdown` resolves, stop accepting and drain the
    /// in-flight handlers instead of aborting them.
    pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) -> Result<(), ServerError> {
        let Server {
            listener,
            service,
            admission,
        } = self;

        let mut handlers: JoinSet<()> = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let service = service.clone();
                        let admission = admission.clone();
                        handlers.spawn(async move {
                            handle_connection(stream, addr, service, admission).await;
                        });
                    }
                    Err(err) => {
                        error!("accept error: {}", err);
                    }
                },
                Some(_) = handlers.join_next(), if !handlers.is_empty() => {}
                _ = &mut shutdown => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        drop(listener);
        info!(in_flight = handlers.len(), "draining in-flight calls");
        while handlers.join_next().await.is_some() {}
        info!("shut down");
        Ok(())
    }
}

/// One call per connection: request frame, gate, handler, terminal reply.
async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    service: Arc<FileService>,
    admission: Arc<Admission>,
) {
    let request = match read_frame::<_, Request>(&mut stream).await {
        Ok(Some(request)) => request,
        Ok(None) => return,
        Err(err) => {
            warn!(%addr, "bad request frame: {}", err);
            return;
        }
    };
    let op = request.name();
    let is_upload = matches!(request, Request::Upload);

    let cancel = CancelFlag::new();
    let gate = match request {
        Request::Upload | Request::Download { .. } => &admission.transfer,
        Request::List => &admission.list,
    };
    let slot = match gate.try_acquire(&cancel) {
        Ok(slot) => slot,
        Err(err) => {
            warn!(%addr, op, "admission rejected: {}", err);
            let reply = ServiceError::from(err).into_reply();
            let _ = write_frame(&mut stream, &reply).await;
            if is_upload {
                drain(&mut stream).await;
            }
            return;
        }
    };

    let outcome = match request {
        Request::Upload => service.upload(&mut stream).await.map(Some),
        Request::Download { filename } => {
            service.download(&filename, &mut stream).await.map(|_| None)
        }
        Request::List => Ok(Some(service.list())),
    };

    match outcome {
        // Unary / terminal reply; downloads end by connection close instead.
        Ok(Some(reply)) => {
            let _ = write_frame(&mut stream, &reply).await;
        }
        Ok(None) => {}
        Err(err) => {
            warn!(%addr, op, "call failed: {}", err);
            let _ = write_frame(&mut stream, &err.into_reply()).await;
            // An aborted upload may leave unsent frames in flight; closing
            // with unread data can reset the connection before the peer
            // reads the error frame. Consume the rest of the stream first.
            if is_upload {
                drain(&mut stream).await;
            }
        }
    }

    // Slot returns to the gate here, success or failure.
    drop(slot);
}

/// Read and discard until the peer half-closes.
async fn drain(stream: &mut TcpStream) {
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

//! OTLP receiver lifecycle.
//!
//! A [`Receiver`] converts [`Arguments`] into gRPC and HTTP servers, runs
//! them until its context is cancelled or a server fails, and exposes a
//! readiness signal that supervisors await before sending traffic.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use otlp_receiver::consumer::LoggingConsumer;
//! use otlp_receiver::core::ArgumentsBuilder;
//! use otlp_receiver::Receiver;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> otlp_receiver::Result<()> {
//! let args = ArgumentsBuilder::new()
//!     .http_endpoint("127.0.0.1:4318")
//!     .consumer(Arc::new(LoggingConsumer::default()))
//!     .build()?;
//!
//! let receiver = Arc::new(Receiver::new());
//! let ctx = CancellationToken::new();
//! let task = {
//!     let receiver = Arc::clone(&receiver);
//!     let ctx = ctx.clone();
//!     tokio::spawn(async move { receiver.run(ctx, args).await })
//! };
//!
//! receiver.wait_running(Duration::from_secs(1)).await?;
//! ctx.cancel();
//! task.await??;
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod grpc;
pub mod http;
pub mod listener;
pub mod telemetry;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::consumer::FanOut;
use crate::core::config::{GrpcServerConfig, HttpServerConfig, NetAddr, ReceiverConfig, Transport};
use crate::core::{Arguments, Payload, Protocol, ReceiverError, Result};
use listener::Listener;
use telemetry::SelfTelemetry;

/// Lifecycle state of one [`Receiver::run`] invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningState {
    /// `run` has not reached the point of accepting traffic
    NotStarted,
    /// All configured listeners are bound and serving
    Running,
    /// `run` has returned
    Stopped,
}

/// Routes decoded payloads to the fan-out and records self-telemetry.
pub struct Dispatcher {
    fanout: FanOut,
    telemetry: SelfTelemetry,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(fanout: FanOut, telemetry: SelfTelemetry) -> Self {
        Self { fanout, telemetry }
    }

    /// The consumer fan-out
    pub fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    /// Self-telemetry counters
    pub fn telemetry(&self) -> &SelfTelemetry {
        &self.telemetry
    }

    /// Deliver `payload` within `ctx`, recording the outcome.
    pub async fn dispatch(
        &self,
        ctx: &CancellationToken,
        protocol: Protocol,
        payload: Payload,
        peer: Option<SocketAddr>,
    ) -> Result<()> {
        let signal = payload.signal();
        let items = payload.item_count();

        match self.fanout.deliver(ctx, &payload).await {
            Ok(()) => {
                self.telemetry.record_accepted(signal, protocol, items, peer);
                Ok(())
            },
            Err(e) => {
                self.telemetry.record_refused(signal, protocol, items, peer, &e);
                Err(e)
            },
        }
    }
}

/// A protocol server that can be bound and served by the receiver.
#[async_trait::async_trait]
trait ProtocolServer: Clone + PartialEq + Send + Sync + 'static {
    const PROTOCOL: Protocol;

    fn net_addr(&self) -> NetAddr;

    async fn serve(
        self,
        listener: Listener,
        dispatcher: Arc<Dispatcher>,
        ctx: CancellationToken,
    ) -> Result<()>;
}

#[async_trait::async_trait]
impl ProtocolServer for GrpcServerConfig {
    const PROTOCOL: Protocol = Protocol::Grpc;

    fn net_addr(&self) -> NetAddr {
        self.net_addr.clone()
    }

    async fn serve(
        self,
        listener: Listener,
        dispatcher: Arc<Dispatcher>,
        ctx: CancellationToken,
    ) -> Result<()> {
        grpc::serve(self, listener, dispatcher, ctx).await
    }
}

#[async_trait::async_trait]
impl ProtocolServer for HttpServerConfig {
    const PROTOCOL: Protocol = Protocol::Http;

    fn net_addr(&self) -> NetAddr {
        NetAddr {
            endpoint: self.endpoint.clone(),
            transport: Transport::Tcp,
        }
    }

    async fn serve(
        self,
        listener: Listener,
        dispatcher: Arc<Dispatcher>,
        ctx: CancellationToken,
    ) -> Result<()> {
        let app = http::router(self, dispatcher, ctx.clone());
        axum::serve(
            listener.into_inner(),
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(ctx.cancelled_owned())
        .await
        .map_err(|e| ReceiverError::protocol(format!("HTTP server failed: {}", e)))
    }
}

/// A bound and serving protocol server.
struct RunningAdapter<S> {
    settings: S,
    local_addr: SocketAddr,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl<S: ProtocolServer> RunningAdapter<S> {
    /// Bind the listener and spawn the server. Server failures that happen
    /// before the adapter is stopped are reported on `fatal_tx`.
    async fn start(
        settings: S,
        parent: &CancellationToken,
        dispatcher: &Arc<Dispatcher>,
        fatal_tx: &mpsc::Sender<ReceiverError>,
    ) -> Result<Self> {
        let listener = Listener::bind(&settings.net_addr()).await?;
        let local_addr = listener.local_addr();
        let token = parent.child_token();

        let task = {
            let settings = settings.clone();
            let dispatcher = Arc::clone(dispatcher);
            let token = token.clone();
            let fatal_tx = fatal_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = settings.serve(listener, dispatcher, token.clone()).await {
                    if !token.is_cancelled() {
                        tracing::error!("OTLP {} server failed: {}", S::PROTOCOL, e);
                        // Only the first fatal error is acted on.
                        if fatal_tx.try_send(e).is_err() {
                            tracing::debug!("Fatal error already pending, dropping this one");
                        }
                    }
                }
            })
        };

        tracing::info!("OTLP {} receiver listening on {}", S::PROTOCOL, local_addr);
        Ok(Self {
            settings,
            local_addr,
            token,
            task,
        })
    }

    /// Cancel the server and wait for in-flight requests to finish.
    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("OTLP {} server task ended abnormally: {}", S::PROTOCOL, e);
        }
        tracing::info!("OTLP {} receiver on {} stopped", S::PROTOCOL, self.local_addr);
    }
}

/// Make `slot` match `desired`, restarting the adapter only if its settings changed.
async fn reconcile<S: ProtocolServer>(
    slot: &mut Option<RunningAdapter<S>>,
    desired: Option<S>,
    parent: &CancellationToken,
    dispatcher: &Arc<Dispatcher>,
    fatal_tx: &mpsc::Sender<ReceiverError>,
) -> Result<()> {
    let unchanged = matches!(
        (slot.as_ref(), desired.as_ref()),
        (Some(running), Some(wanted)) if running.settings == *wanted
    ) || (slot.is_none() && desired.is_none());
    if unchanged {
        return Ok(());
    }

    if let Some(old) = slot.take() {
        old.stop().await;
    }
    if let Some(settings) = desired {
        *slot = Some(RunningAdapter::start(settings, parent, dispatcher, fatal_tx).await?);
    }
    Ok(())
}

#[derive(Default)]
struct Adapters {
    grpc: Option<RunningAdapter<GrpcServerConfig>>,
    http: Option<RunningAdapter<HttpServerConfig>>,
}

impl Adapters {
    async fn apply(
        &mut self,
        config: ReceiverConfig,
        parent: &CancellationToken,
        dispatcher: &Arc<Dispatcher>,
        fatal_tx: &mpsc::Sender<ReceiverError>,
    ) -> Result<()> {
        let protocols = config.protocols;
        reconcile(&mut self.grpc, protocols.grpc, parent, dispatcher, fatal_tx).await?;
        reconcile(&mut self.http, protocols.http, parent, dispatcher, fatal_tx).await?;
        Ok(())
    }

    fn addrs(&self) -> BoundAddrs {
        BoundAddrs {
            grpc: self.grpc.as_ref().map(|a| a.local_addr),
            http: self.http.as_ref().map(|a| a.local_addr),
        }
    }

    async fn shutdown(&mut self) {
        if let Some(grpc) = self.grpc.take() {
            grpc.stop().await;
        }
        if let Some(http) = self.http.take() {
            http.stop().await;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BoundAddrs {
    grpc: Option<SocketAddr>,
    http: Option<SocketAddr>,
}

/// Resets the receiver to `Stopped` when a run ends, however it ends.
struct MarkStopped<'a>(&'a Receiver);

impl Drop for MarkStopped<'_> {
    fn drop(&mut self) {
        *self.0.updates.lock() = None;
        *self.0.addrs.lock() = BoundAddrs::default();
        self.0.state_tx.send_replace(RunningState::Stopped);
    }
}

struct UpdateRequest {
    args: Arguments,
    done: oneshot::Sender<Result<()>>,
}

/// OTLP receiver accepting traces, metrics and logs over gRPC and HTTP.
pub struct Receiver {
    state_tx: watch::Sender<RunningState>,
    dispatcher: Arc<Dispatcher>,
    updates: Mutex<Option<mpsc::Sender<UpdateRequest>>>,
    addrs: Mutex<BoundAddrs>,
    run_lock: tokio::sync::Mutex<()>,
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Receiver {
    /// Create a receiver in the `NotStarted` state
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(RunningState::NotStarted);
        Self {
            state_tx,
            dispatcher: Arc::new(Dispatcher::new(
                FanOut::new(Default::default()),
                SelfTelemetry::default(),
            )),
            updates: Mutex::new(None),
            addrs: Mutex::new(BoundAddrs::default()),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> RunningState {
        *self.state_tx.borrow()
    }

    /// Address the gRPC server is bound to, while running
    pub fn grpc_addr(&self) -> Option<SocketAddr> {
        self.addrs.lock().grpc
    }

    /// Address the HTTP server is bound to, while running
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.addrs.lock().http
    }

    /// Self-telemetry counters
    pub fn telemetry(&self) -> &SelfTelemetry {
        self.dispatcher.telemetry()
    }

    /// Wait until the receiver is running.
    ///
    /// Returns immediately if it already is, and `Timeout` if it does not
    /// get there within `timeout`.
    pub async fn wait_running(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.state_tx.subscribe();
        let running = tokio::time::timeout(timeout, async move {
            rx.wait_for(|state| *state == RunningState::Running)
                .await
                .is_ok()
        })
        .await;

        match running {
            Ok(true) => Ok(()),
            Ok(false) => Err(ReceiverError::NotRunning),
            Err(_) => Err(ReceiverError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Apply new arguments to a running receiver.
    ///
    /// Invalid arguments are rejected and leave the running servers
    /// untouched. Only servers whose settings changed are restarted.
    pub async fn update(&self, args: Arguments) -> Result<()> {
        let tx = self.updates.lock().clone().ok_or(ReceiverError::NotRunning)?;
        let (done, done_rx) = oneshot::channel();
        tx.send(UpdateRequest { args, done })
            .await
            .map_err(|_| ReceiverError::NotRunning)?;
        done_rx.await.map_err(|_| ReceiverError::NotRunning)?
    }

    /// Run until `ctx` is cancelled or a server fails.
    ///
    /// Returns `Ok(())` on cancellation and the triggering error otherwise.
    /// The receiver can be run again after this returns.
    pub async fn run(&self, ctx: CancellationToken, args: Arguments) -> Result<()> {
        let _running = self
            .run_lock
            .try_lock()
            .map_err(|_| ReceiverError::AlreadyRunning)?;
        self.state_tx.send_replace(RunningState::NotStarted);
        let _stopped = MarkStopped(self);

        let result = self.run_inner(ctx, args).await;

        match &result {
            Ok(()) => tracing::info!("OTLP receiver stopped"),
            Err(e) => tracing::error!("OTLP receiver stopped with error: {}", e),
        }
        result
    }

    async fn run_inner(&self, ctx: CancellationToken, args: Arguments) -> Result<()> {
        let config = args.convert()?;
        self.dispatcher.fanout.update(args.output.clone());
        self.dispatcher.telemetry.update(args.debug_metrics_config());

        if config.protocols.grpc.is_none() && config.protocols.http.is_none() {
            tracing::warn!("No OTLP protocols configured, the receiver will accept no traffic");
        }

        let run_ctx = ctx.child_token();
        // Stops the servers if this future is dropped before it completes.
        let _cancel_servers = run_ctx.clone().drop_guard();
        let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
        let mut adapters = Adapters::default();

        if let Err(e) = adapters
            .apply(config, &run_ctx, &self.dispatcher, &fatal_tx)
            .await
        {
            run_ctx.cancel();
            adapters.shutdown().await;
            return Err(e);
        }

        let (update_tx, mut update_rx) = mpsc::channel(1);
        *self.updates.lock() = Some(update_tx);
        *self.addrs.lock() = adapters.addrs();
        self.state_tx.send_replace(RunningState::Running);
        tracing::info!("OTLP receiver running");

        let result = loop {
            tokio::select! {
                _ = ctx.cancelled() => break Ok(()),
                Some(err) = fatal_rx.recv() => break Err(err),
                Some(req) = update_rx.recv() => {
                    let res = self
                        .apply_update(&mut adapters, req.args, &run_ctx, &fatal_tx)
                        .await;
                    *self.addrs.lock() = adapters.addrs();
                    match res {
                        Err(e) if e.is_fatal() => {
                            let _ = req.done.send(Err(e.clone()));
                            break Err(e);
                        },
                        res => {
                            let _ = req.done.send(res);
                        },
                    }
                },
            }
        };

        *self.updates.lock() = None;
        run_ctx.cancel();
        adapters.shutdown().await;
        result
    }

    async fn apply_update(
        &self,
        adapters: &mut Adapters,
        args: Arguments,
        run_ctx: &CancellationToken,
        fatal_tx: &mpsc::Sender<ReceiverError>,
    ) -> Result<()> {
        let config = match args.convert() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Rejecting configuration update: {}", e);
                return Err(e);
            },
        };

        self.dispatcher.fanout.update(args.output.clone());
        self.dispatcher.telemetry.update(args.debug_metrics_config());
        adapters
            .apply(config, run_ctx, &self.dispatcher, fatal_tx)
            .await?;

        tracing::info!("OTLP receiver configuration updated");
        Ok(())
    }
}

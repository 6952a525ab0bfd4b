//! The billing context: one task that owns the provider engine.
//!
//! Requests arrive from the bus on a deferred stream; provider calls run as
//! separate tasks and report back over a channel. Both are drained by the
//! same loop, so the engine's pending request is only ever touched from
//! here.

use crate::bus::{EventBus, EventStream, Subscription};
use crate::engine::{Admission, Completion, ProviderCall, ProviderEngine};
use iabhub_types::{BillingEvent, EventKind, Request, Response, Status};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Drives one provider engine. With no engine every request is answered
/// [`Status::NoBillingProvider`].
pub struct BillingWorker {
    engine: Option<ProviderEngine>,
    bus: EventBus,
    subscription: Subscription,
    requests: EventStream,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    request_timeout: Option<Duration>,
}

impl BillingWorker {
    /// Creates a worker and subscribes it to requests right away, so
    /// requests posted before [`spawn`](Self::spawn) are not lost.
    pub fn new(engine: Option<ProviderEngine>, bus: EventBus) -> Self {
        let requests = bus.subscribe_stream(&[EventKind::Request]);
        Self::with_requests(engine, bus, requests)
    }

    /// Creates a worker that drains an existing request subscription,
    /// including anything already queued on it.
    pub fn with_requests(
        mut engine: Option<ProviderEngine>,
        bus: EventBus,
        (subscription, requests): (Subscription, EventStream),
    ) -> Self {
        if let Some(engine) = engine.as_mut() {
            engine.attach();
        }
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            bus,
            subscription,
            requests,
            completions_tx,
            completions_rx,
            request_timeout: None,
        }
    }

    /// Answers a provider call with [`Status::Timeout`] if it has not
    /// resolved within `timeout`.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Spawns the worker loop on the current tokio runtime.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle {
            shutdown_tx: Some(shutdown_tx),
            join,
        }
    }

    /// Runs until shutdown is signalled or the request subscription ends.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        match &self.engine {
            Some(engine) => info!("billing worker started for {}", engine.provider_info()),
            None => info!("billing worker started without a provider"),
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("billing worker shutting down");
                    break;
                }
                event = self.requests.recv() => match event {
                    Some(BillingEvent::Request(request)) => self.on_request(request),
                    Some(other) => debug!("ignoring {:?} event", other.kind()),
                    None => break,
                },
                Some(completion) = self.completions_rx.recv() => self.on_completion(completion),
            }
        }

        self.bus.unsubscribe(&self.subscription);
        if let Some(engine) = self.engine.as_mut() {
            engine.detach();
            if let Some(pending) = engine.pending() {
                warn!(
                    "billing worker stopped with {} request {} still pending",
                    pending.request_type(),
                    pending.id()
                );
            }
        }
    }

    fn on_request(&mut self, request: Request) {
        let Some(engine) = self.engine.as_mut() else {
            debug!("no provider for {} request {}", request.request_type(), request.id());
            self.bus
                .post(Response::from_status(request, Status::NoBillingProvider, None));
            return;
        };
        match engine.handle_request(request) {
            Admission::Dispatched(call) => self.start(call),
            Admission::Answered(_) => {}
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        let Some(engine) = self.engine.as_mut() else {
            error!("completion for {} with no engine", completion.request_id);
            return;
        };
        if let Err(e) = engine.complete(completion) {
            error!("engine rejected completion: {e}");
        }
    }

    /// Runs a provider call on its own task and reports its completion.
    fn start(&self, call: ProviderCall) {
        let tx = self.completions_tx.clone();
        let timeout = self.request_timeout;
        let (request_id, future) = call.into_parts();

        tokio::spawn(async move {
            let task = tokio::spawn(future);
            let abort = task.abort_handle();
            let joined = match timeout {
                Some(limit) => match tokio::time::timeout(limit, task).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        abort.abort();
                        warn!("request {request_id} timed out after {limit:?}");
                        let _ = tx.send(Completion::status(request_id, Status::Timeout));
                        return;
                    }
                },
                None => task.await,
            };

            let completion = match joined {
                Ok((status, payload)) => Completion {
                    request_id,
                    status,
                    payload,
                },
                Err(e) if e.is_panic() => {
                    error!("provider task for request {request_id} panicked");
                    Completion::status(request_id, Status::failed("provider task panicked"))
                }
                Err(e) => Completion::status(request_id, Status::failed(e.to_string())),
            };
            if tx.send(completion).is_err() {
                debug!("billing worker gone, dropping completion for {request_id}");
            }
        });
    }
}

/// Handle to a spawned [`BillingWorker`]. Dropping it also stops the worker.
pub struct WorkerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stops the worker and waits for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.join).await {
            error!("billing worker task failed: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

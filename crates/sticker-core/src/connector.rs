use crate::errors::ConnectorError;
use crate::port::MainPort;
use crate::protocol::{CallbackArgs, Envelope, FromWorker, MethodCall, RemoteError, Reply, ToWorker, WorkerUpdate};
use crate::scheduler::Scheduler;
use crate::types::{CallbackId, MessageId};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, error, warn};

/// Final outcome of a request.
pub type Settlement = Result<Reply, RemoteError>;

type CallbackFn = Rc<dyn Fn(CallbackArgs)>;
type UpdateFn = Rc<dyn Fn(WorkerUpdate)>;
type SettleFn = Box<dyn FnOnce(&Settlement)>;

/// Single-settlement handle of a request. Dropping it discards the outcome.
#[derive(Debug)]
pub struct PendingReply {
    message_id: MessageId,
    rx: Receiver<Settlement>,
}

impl PendingReply {
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Returns the settlement once it has arrived.
    pub fn try_take(&self) -> Option<Settlement> {
        self.rx.try_recv().ok()
    }
}

/// Reference to a registered callback, used to cancel it.
#[derive(Debug, Clone)]
pub struct CallbackHandle {
    id: CallbackId,
    canceled: Rc<Cell<bool>>,
}

impl CallbackHandle {
    pub fn id(&self) -> CallbackId {
        self.id
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.get()
    }
}

#[derive(Clone)]
struct CallbackSink {
    id: CallbackId,
    callback: CallbackFn,
    canceled: Rc<Cell<bool>>,
}

struct RequestState {
    reply: Sender<Settlement>,
    callback: Option<CallbackSink>,
    on_settle: Option<SettleFn>,
}

struct ConnectorInner {
    channel: String,
    port: RefCell<Option<MainPort>>,
    scheduler: Scheduler,
    next_message_id: Cell<MessageId>,
    next_callback_id: Cell<CallbackId>,
    requests: RefCell<HashMap<MessageId, RequestState>>,
    requests_by_callback: RefCell<HashMap<CallbackId, MessageId>>,
    pending_payloads: RefCell<Vec<ToWorker>>,
    flush_scheduled: Cell<bool>,
    on_update: RefCell<Option<UpdateFn>>,
}

/// Request/response/callback multiplexer over one worker port.
///
/// Outgoing payloads queue up during a turn and leave as one envelope when the
/// scheduler runs its tick-end hooks. Incoming envelopes are matched to
/// requests by message id.
#[derive(Clone)]
pub struct Connector {
    inner: Rc<ConnectorInner>,
}

impl Connector {
    pub fn new(port: MainPort, channel: impl Into<String>, scheduler: Scheduler) -> Self {
        Self {
            inner: Rc::new(ConnectorInner {
                channel: channel.into(),
                port: RefCell::new(Some(port)),
                scheduler,
                next_message_id: Cell::new(1),
                next_callback_id: Cell::new(1),
                requests: RefCell::new(HashMap::new()),
                requests_by_callback: RefCell::new(HashMap::new()),
                pending_payloads: RefCell::new(Vec::new()),
                flush_scheduled: Cell::new(false),
                on_update: RefCell::new(None),
            }),
        }
    }

    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// Installs the handler of `Update` payloads.
    pub fn on_update(&self, handler: impl Fn(WorkerUpdate) + 'static) {
        *self.inner.on_update.borrow_mut() = Some(Rc::new(handler));
    }

    pub fn request(&self, call: MethodCall) -> PendingReply {
        self.register(call, None)
    }

    /// Like [`Connector::request`], with a sink invoked for every `MethodCallback`
    /// of this request until it settles or the handle is canceled.
    pub fn request_with_callback(
        &self,
        call: MethodCall,
        callback: impl Fn(CallbackArgs) + 'static,
    ) -> (PendingReply, CallbackHandle) {
        let id = self.inner.next_callback_id.get();
        self.inner.next_callback_id.set(id + 1);
        let canceled = Rc::new(Cell::new(false));
        let sink = CallbackSink {
            id,
            callback: Rc::new(callback),
            canceled: canceled.clone(),
        };
        let reply = self.register(call, Some(sink));
        (reply, CallbackHandle { id, canceled })
    }

    fn register(&self, call: MethodCall, callback: Option<CallbackSink>) -> PendingReply {
        let message_id = self.inner.next_message_id.get();
        self.inner.next_message_id.set(message_id + 1);

        let (tx, rx) = bounded(1);
        let with_callback = callback.is_some();
        if let Some(sink) = &callback {
            self.inner
                .requests_by_callback
                .borrow_mut()
                .insert(sink.id, message_id);
        }
        self.inner
            .requests
            .borrow_mut()
            .insert(
                message_id,
                RequestState {
                    reply: tx,
                    callback,
                    on_settle: None,
                },
            );

        debug!(channel = %self.inner.channel, message_id, method = call.name(), render_id = %call.render_id(), "request");
        self.enqueue(ToWorker::CallMethod {
            message_id,
            call,
            with_callback,
        });
        PendingReply { message_id, rx }
    }

    /// Runs `hook` with the outcome of `reply` before the handle receives it.
    ///
    /// Returns `false` when the request already settled; the hook is dropped.
    pub fn on_settled(&self, reply: &PendingReply, hook: impl FnOnce(&Settlement) + 'static) -> bool {
        match self.inner.requests.borrow_mut().get_mut(&reply.message_id) {
            Some(state) => {
                state.on_settle = Some(Box::new(hook));
                true
            }
            None => false,
        }
    }

    /// Marks the handle inert and asks the worker to stop producing callbacks.
    pub fn cancel_callback(&self, handle: &CallbackHandle) {
        handle.canceled.set(true);
        let message_id = self
            .inner
            .requests_by_callback
            .borrow()
            .get(&handle.id)
            .copied();
        if let Some(message_id) = message_id {
            debug!(channel = %self.inner.channel, message_id, "cancel progress");
            self.enqueue(ToWorker::CancelProgress { message_id });
        }
    }

    fn enqueue(&self, payload: ToWorker) {
        self.inner.pending_payloads.borrow_mut().push(payload);
        if !self.inner.flush_scheduled.replace(true) {
            let weak: Weak<ConnectorInner> = Rc::downgrade(&self.inner);
            self.inner.scheduler.on_tick_end(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.flush_scheduled.set(false);
                    if let Err(e) = inner.flush() {
                        warn!("Dropping queued payloads: {}", e);
                    }
                }
            });
        }
    }

    /// Posts every queued payload as one envelope. Returns the payload count.
    pub fn flush(&self) -> Result<usize, ConnectorError> {
        self.inner.flush()
    }

    /// Handles one incoming envelope.
    pub fn on_message(&self, envelope: Envelope<FromWorker>) -> Result<(), ConnectorError> {
        if envelope.channel != self.inner.channel {
            debug!(expected = %self.inner.channel, got = %envelope.channel, "ignoring envelope");
            return Ok(());
        }

        for payload in envelope.payloads {
            match payload {
                FromWorker::Update(update) => {
                    let handler = self.inner.on_update.borrow().clone();
                    if let Some(handler) = handler {
                        handler(update);
                    }
                }
                FromWorker::MethodResponse { message_id, result } => {
                    self.settle(message_id, result);
                }
                FromWorker::MethodCallback { message_id, args } => {
                    let sink = self
                        .inner
                        .requests
                        .borrow()
                        .get(&message_id)
                        .and_then(|state| state.callback.clone());
                    match sink {
                        Some(sink) if !sink.canceled.get() => (sink.callback)(args),
                        Some(_) => debug!(message_id, "callback canceled"),
                        None => debug!(message_id, "callback for settled request"),
                    }
                }
                FromWorker::UnhandledError { message } => {
                    error!(channel = %self.inner.channel, "Worker fault: {}", message);
                    return Err(ConnectorError::WorkerFault(message));
                }
            }
        }
        Ok(())
    }

    fn settle(&self, message_id: MessageId, result: Settlement) {
        let state = self.inner.requests.borrow_mut().remove(&message_id);
        let Some(state) = state else {
            warn!(message_id, "response for unknown request");
            return;
        };
        let RequestState {
            reply,
            callback,
            on_settle,
        } = state;
        if let Some(sink) = &callback {
            self.inner.requests_by_callback.borrow_mut().remove(&sink.id);
        }
        if let Err(e) = &result {
            warn!(message_id, "Request rejected: {}", e);
        }
        if let Some(hook) = on_settle {
            hook(&result);
        }
        if reply.send(result).is_err() {
            debug!(message_id, "settlement discarded");
        }
    }

    /// Drains the port without blocking. Returns the number of envelopes handled.
    pub fn poll(&self) -> Result<usize, ConnectorError> {
        let mut handled = 0;
        loop {
            let received = {
                let port = self.inner.port.borrow();
                match port.as_ref() {
                    Some(port) => port.try_recv(),
                    None => return Ok(handled),
                }
            };
            match received {
                Ok(envelope) => {
                    self.on_message(envelope)?;
                    handled += 1;
                }
                Err(TryRecvError::Empty) => return Ok(handled),
                Err(TryRecvError::Disconnected) => {
                    return Err(ConnectorError::Closed(self.inner.channel.clone()))
                }
            }
        }
    }

    /// Drops the port. The worker observes a disconnected channel.
    pub fn close(&self) {
        self.inner.pending_payloads.borrow_mut().clear();
        self.inner.port.borrow_mut().take();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.port.borrow().is_none()
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.requests.borrow().len()
    }

    pub fn queued_payloads(&self) -> usize {
        self.inner.pending_payloads.borrow().len()
    }
}

impl ConnectorInner {
    fn flush(&self) -> Result<usize, ConnectorError> {
        let payloads = std::mem::take(&mut *self.pending_payloads.borrow_mut());
        if payloads.is_empty() {
            return Ok(0);
        }
        let count = payloads.len();
        let port = self.port.borrow();
        let port = port
            .as_ref()
            .ok_or_else(|| ConnectorError::Closed(self.channel.clone()))?;
        port.post(Envelope::new(self.channel.clone(), payloads))
            .map_err(|_| ConnectorError::Closed(self.channel.clone()))?;
        debug!(channel = %self.channel, count, "flushed payloads");
        Ok(count)
    }
}

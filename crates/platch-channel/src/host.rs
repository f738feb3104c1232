//! The channel host: one transport, many named channels.
//!
//! A host owns one ordered byte stream and runs three kinds of thread:
//!
//! - one **reader** thread drains inbound frames. Replies complete
//!   their pending invocation directly and events go straight to the
//!   subscribed stream, so replies are never stuck behind a busy
//!   handler. An event whose listen id no longer matches the live
//!   subscription is a straggler from a replaced one and is dropped.
//!   Calls, listens and cancels are queued to a worker.
//! - one **worker** thread per channel (spawned on first use) runs
//!   that channel's handler, one message at a time in arrival order.
//!   A handler that invokes back toward its peer blocks only its own
//!   channel's worker; the reader keeps completing replies, so the
//!   nested invocation resolves. The one unsupported pattern is both
//!   sides nesting invokes on the same channel simultaneously, which
//!   interlocks the two workers.
//! - producer threads owned by stream handlers emit through their
//!   [`EventSink`] whenever they like.
//!
//! Teardown happens once, on the first of: explicit [`Host::shutdown`],
//! peer disconnect, transport error, or the last handle dropping. All
//! blocked invocations resolve with [`ChannelError::Abandoned`], every
//! active sink is deactivated and its handler cancelled, and later
//! sends fail with [`ChannelError::Disconnected`].

use std::collections::HashMap;
use std::io::{Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use platch_wire::{Frame, FrameConfig, FrameReader, FrameWriter, WireError, WireValue};
use tracing::{debug, info, trace, warn};

use crate::envelope::Envelope;
use crate::error::{ChannelError, Result};
use crate::event::{EventChannel, EventOutput, EventSink, EventStream, StreamEvent, StreamHandler};
use crate::message::{MethodCall, MethodResult};
use crate::method::{MethodChannel, MethodHandler};
use crate::registry::{ChannelRegistry, Handler};
use crate::sync::lock;

enum Job {
    Call { id: i64, call: MethodCall },
    Listen { id: i64, arguments: WireValue },
    Cancel { id: i64 },
}

struct PendingReply {
    channel: String,
    tx: Sender<Option<MethodResult>>,
}

// Local side of one live subscription, keyed by the id its Listen
// carried. Inbound events with any other id are stragglers from a
// replaced subscription and are dropped.
struct Subscription {
    id: i64,
    tx: Sender<StreamEvent>,
}

type BoxedWriter = FrameWriter<Box<dyn Write + Send>>;

struct HostCore {
    registry: ChannelRegistry,
    writer: Mutex<Option<BoxedWriter>>,
    pending: Mutex<HashMap<i64, PendingReply>>,
    listeners: Mutex<HashMap<String, Subscription>>,
    sinks: Mutex<HashMap<String, EventSink>>,
    workers: Mutex<HashMap<String, Sender<Job>>>,
    next_id: AtomicI64,
    open: AtomicBool,
}

/// Handle to one end of a channel connection.
///
/// Cloning is cheap and every clone refers to the same connection.
/// The connection tears down when [`shutdown`] is called, the peer
/// goes away, or the last clone drops.
///
/// [`shutdown`]: Host::shutdown
#[derive(Clone)]
pub struct Host {
    core: Arc<HostCore>,
}

impl Host {
    /// Start a host over a split transport with default framing limits.
    pub fn spawn<R, W>(reader: R, writer: W) -> Host
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self::spawn_with_config(reader, writer, FrameConfig::default())
    }

    /// Start a host with explicit framing limits (maximum payload size
    /// applies to both directions).
    pub fn spawn_with_config<R, W>(reader: R, writer: W, config: FrameConfig) -> Host
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let boxed: Box<dyn Write + Send> = Box::new(writer);
        let core = Arc::new(HostCore {
            registry: ChannelRegistry::new(),
            writer: Mutex::new(Some(FrameWriter::with_config(boxed, config.clone()))),
            pending: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            sinks: Mutex::new(HashMap::new()),
            workers: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            open: AtomicBool::new(true),
        });
        let weak = Arc::downgrade(&core);
        let framed = FrameReader::with_config(reader, config);
        thread::spawn(move || reader_loop(weak, framed));
        Host { core }
    }

    /// Two hosts joined by an in-memory pipe, for tests and demos.
    pub fn pair() -> (Host, Host) {
        let (a, b) = crate::pipe::duplex();
        let (a_read, a_write) = a.split();
        let (b_read, b_write) = b.split();
        (Host::spawn(a_read, a_write), Host::spawn(b_read, b_write))
    }

    pub fn method_channel(&self, name: impl Into<String>) -> MethodChannel {
        MethodChannel::new(self, name)
    }

    pub fn event_channel(&self, name: impl Into<String>) -> EventChannel {
        EventChannel::new(self, name)
    }

    pub fn register_method_handler(
        &self,
        name: &str,
        handler: Arc<dyn MethodHandler>,
    ) -> Result<()> {
        self.core.registry.register(name, Handler::Method(handler))
    }

    pub fn register_stream_handler(
        &self,
        name: &str,
        handler: Arc<dyn StreamHandler>,
    ) -> Result<()> {
        self.core.registry.register(name, Handler::Event(handler))
    }

    /// Remove the handler for `name`. If an event channel is removed
    /// while a subscription is live, the producer is cancelled first.
    /// Unknown names are a no-op.
    pub fn unregister(&self, name: &str) {
        if let Some(Handler::Event(handler)) = self.core.registry.unregister(name) {
            // The sinks guard must drop before on_cancel: a producer
            // inside a terminal emission takes it to retire its sink,
            // and on_cancel may join that producer.
            let sink = lock(&self.core.sinks).remove(name);
            if let Some(sink) = sink {
                sink.deactivate();
                let _ = catch_unwind(AssertUnwindSafe(|| handler.on_cancel()));
            }
        } else {
            // Method handlers have no producer to quiesce.
        }
    }

    /// Registered channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        self.core.registry.names()
    }

    pub fn is_open(&self) -> bool {
        self.core.open.load(Ordering::SeqCst)
    }

    /// Tear the connection down. Idempotent; pending invocations
    /// resolve with [`ChannelError::Abandoned`].
    pub fn shutdown(&self) {
        self.core.teardown("local shutdown");
    }

    pub(crate) fn invoke(&self, channel: &str, call: MethodCall) -> Result<MethodResult> {
        self.core.call_remote(channel, call, None)
    }

    pub(crate) fn invoke_with_timeout(
        &self,
        channel: &str,
        call: MethodCall,
        timeout: Duration,
    ) -> Result<MethodResult> {
        self.core.call_remote(channel, call, Some(timeout))
    }

    pub(crate) fn listen(&self, channel: &str, arguments: WireValue) -> Result<EventStream> {
        let core = &self.core;
        core.ensure_open(channel)?;

        let id = core.next_id.fetch_add(1, Ordering::SeqCst);

        // Install the local subscription before the listen goes out, so
        // events the producer emits ahead of the ack are buffered, not
        // dropped. Replacing an earlier entry drops its sender, which
        // surfaces as a closed stream on that subscription; anything it
        // still has in flight carries the old id and is filtered on
        // arrival.
        let (event_tx, event_rx) = mpsc::channel();
        lock(&core.listeners).insert(
            channel.to_string(),
            Subscription { id, tx: event_tx },
        );

        let (tx, rx) = mpsc::channel();
        lock(&core.pending).insert(
            id,
            PendingReply {
                channel: channel.to_string(),
                tx,
            },
        );
        if let Err(err) = core.send_envelope(channel, &Envelope::Listen {
            id,
            arguments,
        }) {
            lock(&core.pending).remove(&id);
            core.drop_subscription(channel, id);
            return Err(err);
        }

        match core.await_reply(channel, id, rx, None) {
            Ok(MethodResult::Success(_)) => Ok(EventStream::new(
                self.clone(),
                channel.to_string(),
                id,
                event_rx,
            )),
            Ok(MethodResult::Error { code, message, .. }) => {
                core.drop_subscription(channel, id);
                Err(ChannelError::ListenRejected {
                    name: channel.to_string(),
                    code,
                    message,
                })
            }
            Ok(MethodResult::NotImplemented) => {
                core.drop_subscription(channel, id);
                Err(ChannelError::UnknownChannel {
                    name: channel.to_string(),
                })
            }
            Err(err) => {
                core.drop_subscription(channel, id);
                Err(err)
            }
        }
    }

    pub(crate) fn cancel_listen(&self, channel: &str, id: i64, wait: bool) -> Result<()> {
        let core = &self.core;
        // A stream whose subscription was replaced has nothing left to
        // cancel; the replacement owns the channel now.
        if !core.drop_subscription(channel, id) {
            return Ok(());
        }
        if !core.open.load(Ordering::SeqCst) {
            return Ok(());
        }
        if wait {
            let (tx, rx) = mpsc::channel();
            let ack_id = core.next_id.fetch_add(1, Ordering::SeqCst);
            lock(&core.pending).insert(
                ack_id,
                PendingReply {
                    channel: channel.to_string(),
                    tx,
                },
            );
            if let Err(err) = core.send_envelope(channel, &Envelope::Cancel { id: ack_id }) {
                lock(&core.pending).remove(&ack_id);
                return Err(err);
            }
            core.await_reply(channel, ack_id, rx, None)?;
            Ok(())
        } else {
            let ack_id = core.next_id.fetch_add(1, Ordering::SeqCst);
            let _ = core.send_envelope(channel, &Envelope::Cancel { id: ack_id });
            Ok(())
        }
    }
}

impl HostCore {
    fn ensure_open(&self, channel: &str) -> Result<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ChannelError::Disconnected(format!(
                "host is shut down (channel '{channel}')"
            )))
        }
    }

    fn send_envelope(&self, channel: &str, envelope: &Envelope) -> Result<()> {
        let payload = envelope.encode();
        let mut writer = lock(&self.writer);
        match writer.as_mut() {
            Some(w) => w.send(channel, &payload).map_err(ChannelError::from),
            None => Err(ChannelError::Disconnected(
                "transport closed".to_string(),
            )),
        }
    }

    fn call_remote(
        &self,
        channel: &str,
        call: MethodCall,
        timeout: Option<Duration>,
    ) -> Result<MethodResult> {
        self.ensure_open(channel)?;
        let (tx, rx) = mpsc::channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.pending).insert(
            id,
            PendingReply {
                channel: channel.to_string(),
                tx,
            },
        );
        trace!(channel, id, method = %call.method, "invoking");
        if let Err(err) = self.send_envelope(channel, &Envelope::Call { id, call }) {
            lock(&self.pending).remove(&id);
            return Err(err);
        }
        self.await_reply(channel, id, rx, timeout)
    }

    fn await_reply(
        &self,
        channel: &str,
        id: i64,
        rx: Receiver<Option<MethodResult>>,
        timeout: Option<Duration>,
    ) -> Result<MethodResult> {
        let outcome = match timeout {
            None => rx.recv().unwrap_or(None),
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => {
                    // Forget the invocation; a late reply is ignored.
                    lock(&self.pending).remove(&id);
                    return Err(ChannelError::Timeout {
                        name: channel.to_string(),
                        timeout,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => None,
            },
        };
        outcome.ok_or_else(|| ChannelError::Abandoned {
            name: channel.to_string(),
        })
    }

    fn complete(&self, id: i64, result: MethodResult) {
        match lock(&self.pending).remove(&id) {
            Some(pending) => {
                let _ = pending.tx.send(Some(result));
            }
            // Timed out or cancelled without waiting.
            None => trace!(id, "reply with no pending invocation"),
        }
    }

    /// Remove the subscription entry for `channel` if it is still the
    /// one opened by listen `id`. Returns whether it was removed.
    fn drop_subscription(&self, channel: &str, id: i64) -> bool {
        let mut listeners = lock(&self.listeners);
        if listeners.get(channel).is_some_and(|sub| sub.id == id) {
            listeners.remove(channel);
            true
        } else {
            false
        }
    }

    fn deliver_event(&self, channel: &str, id: i64, event: StreamEvent) {
        let terminal = !matches!(event, StreamEvent::Data(_));
        let sender = {
            let mut listeners = lock(&self.listeners);
            match listeners.get(channel) {
                Some(sub) if sub.id == id => {
                    if terminal {
                        listeners.remove(channel).map(|sub| sub.tx)
                    } else {
                        Some(sub.tx.clone())
                    }
                }
                // Either no subscription, or a replacement owns the
                // channel and this is a straggler from the old one.
                _ => None,
            }
        };
        match sender {
            Some(tx) => {
                let _ = tx.send(event);
            }
            None => trace!(channel, id, "event for inactive subscription dropped"),
        }
    }

    fn teardown(&self, reason: &str) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(reason, "channel host tearing down");

        *lock(&self.writer) = None;

        let pending: Vec<PendingReply> =
            lock(&self.pending).drain().map(|(_, p)| p).collect();
        for entry in pending {
            debug!(channel = %entry.channel, "abandoning pending invocation");
            let _ = entry.tx.send(None);
        }

        // Dropping the senders closes every local subscription stream.
        lock(&self.listeners).clear();

        let sinks: Vec<EventSink> = lock(&self.sinks).drain().map(|(_, s)| s).collect();
        for sink in sinks {
            sink.deactivate();
            if let Some(Handler::Event(handler)) = self.registry.lookup(sink.channel()) {
                let _ = catch_unwind(AssertUnwindSafe(|| handler.on_cancel()));
            }
        }

        lock(&self.workers).clear();
        self.registry.clear();
    }
}

impl EventOutput for HostCore {
    fn emit_event(&self, channel: &str, id: i64, event: StreamEvent) {
        // The peer may already be gone; producers do not observe that.
        if let Err(err) = self.send_envelope(channel, &Envelope::Event { id, event }) {
            trace!(channel, %err, "event not delivered");
        }
    }

    fn sink_finished(&self, channel: &str, id: i64) {
        let mut sinks = lock(&self.sinks);
        // A replacement sink may already occupy the slot; leave it.
        if sinks.get(channel).is_some_and(|sink| sink.listen_id() == id) {
            sinks.remove(channel);
        }
    }
}

impl Drop for HostCore {
    fn drop(&mut self) {
        self.teardown("host dropped");
    }
}

fn reader_loop<R: Read>(weak: Weak<HostCore>, mut reader: FrameReader<R>) {
    loop {
        match reader.read_frame() {
            Ok(frame) => {
                let Some(core) = weak.upgrade() else { return };
                route_frame(&core, frame);
            }
            Err(WireError::ConnectionClosed) => {
                if let Some(core) = weak.upgrade() {
                    core.teardown("peer disconnected");
                }
                return;
            }
            Err(err) => {
                if let Some(core) = weak.upgrade() {
                    core.teardown(&format!("transport error: {err}"));
                }
                return;
            }
        }
    }
}

fn route_frame(core: &Arc<HostCore>, frame: Frame) {
    let envelope = match Envelope::decode(&frame.payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(channel = %frame.channel, %err, "dropping malformed frame");
            return;
        }
    };
    match envelope {
        Envelope::Reply { id, result } => core.complete(id, result),
        Envelope::Event { id, event } => core.deliver_event(&frame.channel, id, event),
        Envelope::Call { id, call } => enqueue(core, &frame.channel, Job::Call { id, call }),
        Envelope::Listen { id, arguments } => {
            enqueue(core, &frame.channel, Job::Listen { id, arguments })
        }
        Envelope::Cancel { id } => enqueue(core, &frame.channel, Job::Cancel { id }),
    }
}

fn enqueue(core: &Arc<HostCore>, channel: &str, job: Job) {
    let tx = {
        let mut workers = lock(&core.workers);
        match workers.get(channel) {
            Some(tx) => tx.clone(),
            None => {
                let (tx, rx) = mpsc::channel::<Job>();
                let weak = Arc::downgrade(core);
                let name = channel.to_string();
                thread::spawn(move || worker_loop(weak, &name, rx));
                workers.insert(channel.to_string(), tx.clone());
                tx
            }
        }
    };
    let _ = tx.send(job);
}

fn worker_loop(weak: Weak<HostCore>, channel: &str, rx: Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        let Some(core) = weak.upgrade() else { return };
        match job {
            Job::Call { id, call } => serve_call(&core, channel, id, call),
            Job::Listen { id, arguments } => serve_listen(&core, channel, id, arguments),
            Job::Cancel { id } => serve_cancel(&core, channel, id),
        }
    }
}

fn serve_call(core: &Arc<HostCore>, channel: &str, id: i64, call: MethodCall) {
    let method = call.method.clone();
    let result = match core.registry.lookup(channel) {
        Some(Handler::Method(handler)) => {
            match catch_unwind(AssertUnwindSafe(|| handler.on_call(call))) {
                Ok(result) => result,
                Err(payload) => {
                    warn!(channel, method = %method, "method handler panicked");
                    MethodResult::error("internal-error", panic_message(payload.as_ref()), WireValue::Null)
                }
            }
        }
        Some(Handler::Event(_)) => MethodResult::error(
            "wrong-channel-kind",
            format!("channel '{channel}' serves events, not methods"),
            WireValue::Null,
        ),
        None => MethodResult::error(
            "unknown-channel",
            format!("no handler registered for channel '{channel}'"),
            WireValue::Null,
        ),
    };
    if let Err(err) = core.send_envelope(channel, &Envelope::Reply { id, result }) {
        debug!(channel, id, %err, "reply not delivered");
    }
}

fn serve_listen(core: &Arc<HostCore>, channel: &str, id: i64, arguments: WireValue) {
    let result = match core.registry.lookup(channel) {
        Some(Handler::Event(handler)) => {
            // A second listen replaces the first: the old producer is
            // quiesced before the new one starts. The sinks guard must
            // drop before on_cancel, which may join a producer stuck
            // on that lock inside a terminal emission.
            let previous = lock(&core.sinks).remove(channel);
            if let Some(previous) = previous {
                previous.deactivate();
                let _ = catch_unwind(AssertUnwindSafe(|| handler.on_cancel()));
            }
            let weak = Arc::downgrade(core);
            let out: Weak<dyn EventOutput> = weak;
            let sink = EventSink::new(channel, id, out);
            match catch_unwind(AssertUnwindSafe(|| handler.on_listen(arguments, sink.clone()))) {
                Ok(Ok(())) => {
                    // A producer that finished synchronously already
                    // removed itself.
                    if sink.is_active() {
                        lock(&core.sinks).insert(channel.to_string(), sink);
                    }
                    MethodResult::Success(WireValue::Null)
                }
                Ok(Err(rejection)) => MethodResult::Error {
                    code: rejection.code,
                    message: rejection.message,
                    details: rejection.details,
                },
                Err(payload) => {
                    warn!(channel, "stream handler panicked in on_listen");
                    MethodResult::error("internal-error", panic_message(payload.as_ref()), WireValue::Null)
                }
            }
        }
        Some(Handler::Method(_)) => MethodResult::error(
            "wrong-channel-kind",
            format!("channel '{channel}' serves methods, not events"),
            WireValue::Null,
        ),
        None => MethodResult::error(
            "unknown-channel",
            format!("no handler registered for channel '{channel}'"),
            WireValue::Null,
        ),
    };
    if let Err(err) = core.send_envelope(channel, &Envelope::Reply { id, result }) {
        debug!(channel, id, %err, "listen ack not delivered");
    }
}

fn serve_cancel(core: &Arc<HostCore>, channel: &str, id: i64) {
    // Quiesce the producer before the ack goes out, so no event can
    // follow the ack on the wire. Cancelling with no live subscription
    // still acks. The sinks guard must drop before on_cancel, which
    // may join a producer stuck on that lock inside a terminal
    // emission.
    let sink = lock(&core.sinks).remove(channel);
    if let Some(sink) = sink {
        sink.deactivate();
        if let Some(Handler::Event(handler)) = core.registry.lookup(channel) {
            let _ = catch_unwind(AssertUnwindSafe(|| handler.on_cancel()));
        }
    }
    let ack = Envelope::Reply {
        id,
        result: MethodResult::Success(WireValue::Null),
    };
    if let Err(err) = core.send_envelope(channel, &ack) {
        debug!(channel, id, %err, "cancel ack not delivered");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

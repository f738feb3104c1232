//! Server-push event channels.
//!
//! An event channel carries at most one subscription at a time. The
//! listening side calls [`EventChannel::listen`] and consumes
//! [`StreamEvent`]s from the returned [`EventStream`]; the serving
//! side implements [`StreamHandler`] and pushes through the
//! [`EventSink`] it receives on listen. A sink outlives its
//! subscription harmlessly: emissions on a deactivated sink are
//! silently dropped, so slow producers racing a cancel never fault.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use platch_wire::WireValue;

use crate::error::Result;
use crate::host::Host;

/// One item on an event channel, as seen by the listener.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Data(WireValue),
    /// Declared producer fault. Terminal for the subscription.
    Error {
        code: String,
        message: String,
        details: WireValue,
    },
    /// Producer finished normally. Terminal for the subscription.
    Done,
}

/// Why a [`StreamHandler`] refused a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct EventError {
    pub code: String,
    pub message: String,
    pub details: WireValue,
}

impl EventError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, details: WireValue) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

/// Serves one event channel: start producing on listen, stop on cancel.
///
/// `on_cancel` must not return until the producer is quiesced; no
/// event may reach the wire after it returns. [`crate::scheduler`]
/// tickers give that guarantee on cancel.
pub trait StreamHandler: Send + Sync {
    fn on_listen(&self, arguments: WireValue, sink: EventSink) -> std::result::Result<(), EventError>;
    fn on_cancel(&self);
}

pub(crate) trait EventOutput: Send + Sync {
    fn emit_event(&self, channel: &str, id: i64, event: StreamEvent);
    fn sink_finished(&self, channel: &str, id: i64);
}

struct SinkInner {
    channel: String,
    // The id of the Listen that opened this subscription; emitted
    // events carry it so a replaced subscription's stragglers are
    // told apart from the replacement's.
    id: i64,
    active: AtomicBool,
    out: Weak<dyn EventOutput>,
}

/// Producer-side handle for pushing events to the current listener.
///
/// Clone freely; all clones share one activation state. After a
/// terminal event or a cancel, every method is a silent no-op.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<SinkInner>,
}

impl EventSink {
    pub(crate) fn new(channel: impl Into<String>, id: i64, out: Weak<dyn EventOutput>) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                channel: channel.into(),
                id,
                active: AtomicBool::new(true),
                out,
            }),
        }
    }

    /// Deliver one value to the listener.
    pub fn success(&self, value: WireValue) {
        if !self.inner.active.load(Ordering::SeqCst) {
            return;
        }
        if let Some(out) = self.inner.out.upgrade() {
            out.emit_event(&self.inner.channel, self.inner.id, StreamEvent::Data(value));
        }
    }

    /// Report a producer fault and close the subscription.
    pub fn error(&self, code: impl Into<String>, message: impl Into<String>, details: WireValue) {
        self.finish(StreamEvent::Error {
            code: code.into(),
            message: message.into(),
            details,
        });
    }

    /// Signal normal completion and close the subscription.
    pub fn end_of_stream(&self) {
        self.finish(StreamEvent::Done);
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    fn finish(&self, event: StreamEvent) {
        // First terminal call wins; later emissions are no-ops.
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(out) = self.inner.out.upgrade() {
            out.emit_event(&self.inner.channel, self.inner.id, event);
            out.sink_finished(&self.inner.channel, self.inner.id);
        }
    }

    pub(crate) fn deactivate(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }

    pub(crate) fn channel(&self) -> &str {
        &self.inner.channel
    }

    pub(crate) fn listen_id(&self) -> i64 {
        self.inner.id
    }
}

/// Listener-side handle for one named event channel.
#[derive(Clone)]
pub struct EventChannel {
    host: Host,
    name: String,
}

impl EventChannel {
    pub fn new(host: &Host, name: impl Into<String>) -> Self {
        Self {
            host: host.clone(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register `handler` to serve subscriptions on this channel.
    pub fn set_handler(&self, handler: Arc<dyn StreamHandler>) -> Result<()> {
        self.host.register_stream_handler(&self.name, handler)
    }

    /// Subscribe and block until the peer acknowledges. A rejection by
    /// the remote handler surfaces as
    /// [`crate::ChannelError::ListenRejected`].
    pub fn listen(&self, arguments: WireValue) -> Result<EventStream> {
        self.host.listen(&self.name, arguments)
    }
}

/// The listener's view of an active subscription.
///
/// Events arrive in emission order and belong to this subscription
/// only; stragglers from an earlier, replaced subscription on the same
/// name never show up here. After a terminal event the peer sends
/// nothing further for this subscription; [`cancel`] tears an
/// unfinished one down and blocks until the peer acknowledges.
///
/// [`cancel`]: EventStream::cancel
pub struct EventStream {
    host: Host,
    name: String,
    id: i64,
    rx: std::sync::mpsc::Receiver<StreamEvent>,
    cancelled: bool,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}

impl EventStream {
    pub(crate) fn new(
        host: Host,
        name: String,
        id: i64,
        rx: std::sync::mpsc::Receiver<StreamEvent>,
    ) -> Self {
        Self {
            host,
            name,
            id,
            rx,
            cancelled: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block for the next event.
    pub fn recv(&self) -> Result<StreamEvent> {
        self.rx
            .recv()
            .map_err(|_| crate::ChannelError::Disconnected("event stream closed".to_string()))
    }

    /// Block for the next event, up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<StreamEvent> {
        use std::sync::mpsc::RecvTimeoutError;
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => crate::ChannelError::Timeout {
                name: self.name.clone(),
                timeout,
            },
            RecvTimeoutError::Disconnected => {
                crate::ChannelError::Disconnected("event stream closed".to_string())
            }
        })
    }

    pub fn try_recv(&self) -> Option<StreamEvent> {
        self.rx.try_recv().ok()
    }

    /// Unsubscribe. Returns once the peer has acknowledged, after
    /// which no further event for this subscription reaches the wire.
    pub fn cancel(&mut self) -> Result<()> {
        if self.cancelled {
            return Ok(());
        }
        self.cancelled = true;
        self.host.cancel_listen(&self.name, self.id, true)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if !self.cancelled {
            // Best effort; do not block teardown on the ack.
            let _ = self.host.cancel_listen(&self.name, self.id, false);
        }
    }
}

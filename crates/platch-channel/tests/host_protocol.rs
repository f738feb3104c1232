//! End-to-end protocol behavior over an in-memory pipe pair.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use platch_channel::{
    schedule, CancelToken, ChannelError, EventError, EventSink, Host, MethodCall, MethodResult,
    StreamEvent, StreamHandler,
};
use platch_wire::WireValue;

const METHODS: &str = "test.platch/methods";
const EVENTS: &str = "test.platch/events";

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Emits consecutive integers on a short interval until cancelled.
struct Counter {
    next: Arc<AtomicI64>,
    ticker: Mutex<Option<CancelToken>>,
}

impl Counter {
    fn new() -> Self {
        Self {
            next: Arc::new(AtomicI64::new(0)),
            ticker: Mutex::new(None),
        }
    }
}

impl StreamHandler for Counter {
    fn on_listen(&self, _arguments: WireValue, sink: EventSink) -> Result<(), EventError> {
        let next = Arc::clone(&self.next);
        let token = schedule(Duration::from_millis(5), move || {
            let value = next.fetch_add(1, Ordering::SeqCst) + 1;
            sink.success(WireValue::Int(value));
        });
        *lock(&self.ticker) = Some(token);
        Ok(())
    }

    fn on_cancel(&self) {
        if let Some(mut token) = lock(&self.ticker).take() {
            token.cancel();
        }
    }
}

#[test]
fn method_call_roundtrip() {
    let (server, client) = Host::pair();
    server
        .register_method_handler(
            METHODS,
            Arc::new(|call: MethodCall| match call.method.as_str() {
                "greet" => match call.arguments.as_str() {
                    Some(name) => MethodResult::success(format!("hello, {name}")),
                    None => MethodResult::error("bad-arguments", "expected a name", WireValue::Null),
                },
                _ => MethodResult::NotImplemented,
            }),
        )
        .unwrap();

    let channel = client.method_channel(METHODS);

    let result = channel
        .invoke("greet", WireValue::Text("ada".to_string()))
        .unwrap();
    assert_eq!(
        result,
        MethodResult::Success(WireValue::Text("hello, ada".to_string()))
    );

    let result = channel.invoke("greet", WireValue::Int(7)).unwrap();
    assert!(matches!(result, MethodResult::Error { code, .. } if code == "bad-arguments"));

    let result = channel.invoke("vanish", WireValue::Null).unwrap();
    assert_eq!(result, MethodResult::NotImplemented);
}

#[test]
fn unknown_channel_answers_with_error_result() {
    let (_server, client) = Host::pair();
    let result = client
        .method_channel("test.platch/nowhere")
        .invoke("anything", WireValue::Null)
        .unwrap();
    assert!(matches!(result, MethodResult::Error { code, .. } if code == "unknown-channel"));
}

#[test]
fn wrong_channel_kind_is_a_declared_error() {
    let (server, client) = Host::pair();
    server
        .register_stream_handler(EVENTS, Arc::new(Counter::new()))
        .unwrap();
    server
        .register_method_handler(METHODS, Arc::new(|_: MethodCall| MethodResult::success(1i64)))
        .unwrap();

    let result = client
        .method_channel(EVENTS)
        .invoke("anything", WireValue::Null)
        .unwrap();
    assert!(matches!(result, MethodResult::Error { code, .. } if code == "wrong-channel-kind"));

    let err = client
        .event_channel(METHODS)
        .listen(WireValue::Null)
        .unwrap_err();
    assert!(matches!(
        err,
        ChannelError::ListenRejected { code, .. } if code == "wrong-channel-kind"
    ));
}

#[test]
fn handler_panic_becomes_internal_error() {
    let (server, client) = Host::pair();
    server
        .register_method_handler(
            METHODS,
            Arc::new(|call: MethodCall| {
                if call.method == "explode" {
                    panic!("kaboom");
                }
                MethodResult::success("fine")
            }),
        )
        .unwrap();

    let channel = client.method_channel(METHODS);
    let result = channel.invoke("explode", WireValue::Null).unwrap();
    match result {
        MethodResult::Error { code, message, .. } => {
            assert_eq!(code, "internal-error");
            assert!(message.contains("kaboom"));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    // The channel keeps serving after the panic.
    let result = channel.invoke("ok", WireValue::Null).unwrap();
    assert_eq!(result, MethodResult::Success(WireValue::Text("fine".to_string())));
}

#[test]
fn nested_reverse_invocation_resolves() {
    let (server, client) = Host::pair();
    let helper = "test.platch/helper";

    client
        .register_method_handler(
            helper,
            Arc::new(|call: MethodCall| {
                let n = call.arguments.as_i64().unwrap_or(0);
                MethodResult::success(n * 2)
            }),
        )
        .unwrap();

    let server_handle = server.clone();
    server
        .register_method_handler(
            METHODS,
            Arc::new(move |call: MethodCall| {
                // Calls back toward the peer while serving.
                let doubled = server_handle
                    .method_channel(helper)
                    .invoke("double", call.arguments)
                    .unwrap_or(MethodResult::NotImplemented);
                match doubled {
                    MethodResult::Success(WireValue::Int(n)) => MethodResult::success(n + 1),
                    other => other,
                }
            }),
        )
        .unwrap();

    let result = client
        .method_channel(METHODS)
        .invoke("double-plus-one", WireValue::Int(20))
        .unwrap();
    assert_eq!(result, MethodResult::Success(WireValue::Int(41)));
}

#[test]
fn calls_on_one_channel_are_served_in_order() {
    let (server, client) = Host::pair();
    let served: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let served_log = Arc::clone(&served);
    server
        .register_method_handler(
            METHODS,
            Arc::new(move |call: MethodCall| {
                let n = call.arguments.as_i64().unwrap_or(-1);
                lock(&served_log).push(n);
                MethodResult::success(n)
            }),
        )
        .unwrap();

    let channel = client.method_channel(METHODS);
    for n in 0..20i64 {
        channel.invoke("record", WireValue::Int(n)).unwrap();
    }
    assert_eq!(*lock(&served), (0..20).collect::<Vec<_>>());
}

#[test]
fn event_stream_emits_in_order_and_stops_on_cancel() {
    let (server, client) = Host::pair();
    server
        .register_stream_handler(EVENTS, Arc::new(Counter::new()))
        .unwrap();

    let mut stream = client.event_channel(EVENTS).listen(WireValue::Null).unwrap();
    let first = stream.recv_timeout(Duration::from_secs(5)).unwrap();
    let second = stream.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first, StreamEvent::Data(WireValue::Int(1)));
    assert_eq!(second, StreamEvent::Data(WireValue::Int(2)));

    stream.cancel().unwrap();

    // Drain whatever was in flight before the ack, then verify the
    // producer is quiet.
    while stream.try_recv().is_some() {}
    thread::sleep(Duration::from_millis(50));
    assert!(stream.try_recv().is_none());
}

#[test]
fn listen_rejection_surfaces_with_code() {
    struct Refusing;

    impl StreamHandler for Refusing {
        fn on_listen(&self, _arguments: WireValue, _sink: EventSink) -> Result<(), EventError> {
            Err(EventError::new(
                "not-ready",
                "sensor offline",
                WireValue::Null,
            ))
        }

        fn on_cancel(&self) {}
    }

    let (server, client) = Host::pair();
    server
        .register_stream_handler(EVENTS, Arc::new(Refusing))
        .unwrap();

    let err = client
        .event_channel(EVENTS)
        .listen(WireValue::Null)
        .unwrap_err();
    match err {
        ChannelError::ListenRejected { name, code, message } => {
            assert_eq!(name, EVENTS);
            assert_eq!(code, "not-ready");
            assert_eq!(message, "sensor offline");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn listen_on_unknown_channel_fails() {
    let (_server, client) = Host::pair();
    let err = client
        .event_channel("test.platch/nowhere")
        .listen(WireValue::Null)
        .unwrap_err();
    assert!(matches!(err, ChannelError::ListenRejected { code, .. } if code == "unknown-channel"));
}

#[test]
fn second_listen_replaces_the_first() {
    struct Logging {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl StreamHandler for Logging {
        fn on_listen(&self, _arguments: WireValue, _sink: EventSink) -> Result<(), EventError> {
            lock(&self.log).push("listen");
            Ok(())
        }

        fn on_cancel(&self) {
            lock(&self.log).push("cancel");
        }
    }

    let (server, client) = Host::pair();
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    server
        .register_stream_handler(EVENTS, Arc::new(Logging { log: Arc::clone(&log) }))
        .unwrap();

    let channel = client.event_channel(EVENTS);
    let _first = channel.listen(WireValue::Null).unwrap();
    let _second = channel.listen(WireValue::Null).unwrap();

    // The old producer is quiesced before the replacement starts.
    assert_eq!(*lock(&log), vec!["listen", "cancel", "listen"]);
}

#[test]
fn replacement_listener_never_sees_stale_events() {
    /// Emits its generation number as fast as it can until cancelled.
    struct Generations {
        generation: AtomicI64,
        producer: Mutex<Option<(Arc<AtomicBool>, thread::JoinHandle<()>)>>,
    }

    impl StreamHandler for Generations {
        fn on_listen(&self, _arguments: WireValue, sink: EventSink) -> Result<(), EventError> {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let running = Arc::new(AtomicBool::new(true));
            let flag = Arc::clone(&running);
            let handle = thread::spawn(move || {
                while flag.load(Ordering::SeqCst) && sink.is_active() {
                    sink.success(WireValue::Int(generation));
                    thread::sleep(Duration::from_millis(1));
                }
            });
            *lock(&self.producer) = Some((running, handle));
            Ok(())
        }

        fn on_cancel(&self) {
            if let Some((running, handle)) = lock(&self.producer).take() {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
            }
        }
    }

    let (server, client) = Host::pair();
    server
        .register_stream_handler(
            EVENTS,
            Arc::new(Generations {
                generation: AtomicI64::new(0),
                producer: Mutex::new(None),
            }),
        )
        .unwrap();

    let channel = client.event_channel(EVENTS);
    let first = channel.listen(WireValue::Null).unwrap();
    assert_eq!(
        first.recv_timeout(Duration::from_secs(5)).unwrap(),
        StreamEvent::Data(WireValue::Int(1))
    );

    // Re-listening replaces the first subscription. Whatever the old
    // producer still had in flight must not leak into the new stream.
    let mut second = channel.listen(WireValue::Null).unwrap();
    for _ in 0..25 {
        match second.recv_timeout(Duration::from_secs(5)).unwrap() {
            StreamEvent::Data(value) => assert_eq!(value, WireValue::Int(2)),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    second.cancel().unwrap();

    // The replaced stream is closed, not fed.
    while first.try_recv().is_some() {}
    assert!(first.recv().is_err());
}

#[test]
fn cancel_resolves_while_a_producer_is_finishing() {
    use std::io::{self, Write};

    struct SlowWriter<W> {
        inner: W,
        delay: Duration,
    }

    impl<W: Write> Write for SlowWriter<W> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            thread::sleep(self.delay);
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    /// Ends its stream from a producer thread shortly after listen;
    /// cancel joins that thread.
    struct OneShot {
        producer: Mutex<Option<thread::JoinHandle<()>>>,
    }

    impl StreamHandler for OneShot {
        fn on_listen(&self, _arguments: WireValue, sink: EventSink) -> Result<(), EventError> {
            let handle = thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                sink.end_of_stream();
            });
            *lock(&self.producer) = Some(handle);
            Ok(())
        }

        fn on_cancel(&self) {
            if let Some(handle) = lock(&self.producer).take() {
                let _ = handle.join();
            }
        }
    }

    // A slow server-side writer keeps the producer inside its terminal
    // emission while the cancel is being served.
    let (a, b) = platch_channel::pipe::duplex();
    let (a_read, a_write) = a.split();
    let (b_read, b_write) = b.split();
    let client = Host::spawn(a_read, a_write);
    let server = Host::spawn(
        b_read,
        SlowWriter {
            inner: b_write,
            delay: Duration::from_millis(250),
        },
    );
    server
        .register_stream_handler(
            EVENTS,
            Arc::new(OneShot {
                producer: Mutex::new(None),
            }),
        )
        .unwrap();

    let mut stream = client.event_channel(EVENTS).listen(WireValue::Null).unwrap();
    thread::sleep(Duration::from_millis(100));

    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = done_tx.send(stream.cancel());
    });
    done_rx
        .recv_timeout(Duration::from_secs(8))
        .expect("cancel should resolve against a finishing producer")
        .unwrap();
}

#[test]
fn emissions_after_terminal_are_silent_noops() {
    let (server, client) = Host::pair();
    let (sink_tx, sink_rx) = mpsc::channel::<EventSink>();
    let sink_tx = Mutex::new(sink_tx);

    struct Capture {
        tx: Mutex<mpsc::Sender<EventSink>>,
    }

    impl StreamHandler for Capture {
        fn on_listen(&self, _arguments: WireValue, sink: EventSink) -> Result<(), EventError> {
            let _ = lock(&self.tx).send(sink);
            Ok(())
        }

        fn on_cancel(&self) {}
    }

    server
        .register_stream_handler(EVENTS, Arc::new(Capture { tx: sink_tx }))
        .unwrap();

    let stream = client.event_channel(EVENTS).listen(WireValue::Null).unwrap();
    let sink = sink_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    sink.success(WireValue::Int(1));
    sink.end_of_stream();
    assert!(!sink.is_active());

    // Past the terminal event these do nothing, and do not fault.
    sink.success(WireValue::Int(2));
    sink.error("late", "ignored", WireValue::Null);
    sink.end_of_stream();

    assert_eq!(
        stream.recv_timeout(Duration::from_secs(5)).unwrap(),
        StreamEvent::Data(WireValue::Int(1))
    );
    assert_eq!(
        stream.recv_timeout(Duration::from_secs(5)).unwrap(),
        StreamEvent::Done
    );
    // Terminal closes the subscription stream.
    assert!(stream.recv().is_err());
}

#[test]
fn producer_error_is_terminal() {
    struct Failing;

    impl StreamHandler for Failing {
        fn on_listen(&self, _arguments: WireValue, sink: EventSink) -> Result<(), EventError> {
            thread::spawn(move || {
                sink.success(WireValue::Int(1));
                sink.error("producer-failed", "sensor gone", WireValue::Null);
            });
            Ok(())
        }

        fn on_cancel(&self) {}
    }

    let (server, client) = Host::pair();
    server
        .register_stream_handler(EVENTS, Arc::new(Failing))
        .unwrap();

    let stream = client.event_channel(EVENTS).listen(WireValue::Null).unwrap();
    assert_eq!(
        stream.recv_timeout(Duration::from_secs(5)).unwrap(),
        StreamEvent::Data(WireValue::Int(1))
    );
    match stream.recv_timeout(Duration::from_secs(5)).unwrap() {
        StreamEvent::Error { code, message, .. } => {
            assert_eq!(code, "producer-failed");
            assert_eq!(message, "sensor gone");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn invoke_timeout_leaves_channel_usable() {
    let (server, client) = Host::pair();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);

    server
        .register_method_handler(
            METHODS,
            Arc::new(move |call: MethodCall| {
                if call.method == "stall" {
                    let _ = lock(&release_rx).recv_timeout(Duration::from_secs(10));
                }
                MethodResult::success("done")
            }),
        )
        .unwrap();

    let channel = client.method_channel(METHODS);
    let err = channel
        .invoke_with_timeout("stall", WireValue::Null, Duration::from_millis(50))
        .unwrap_err();
    assert!(matches!(
        err,
        ChannelError::Timeout { ref name, .. } if name == METHODS
    ));

    // Unblock the stalled handler; its late reply has no pending
    // invocation and is dropped.
    release_tx.send(()).unwrap();
    let result = channel
        .invoke_with_timeout("quick", WireValue::Null, Duration::from_secs(5))
        .unwrap();
    assert_eq!(result, MethodResult::Success(WireValue::Text("done".to_string())));
}

#[test]
fn teardown_abandons_all_pending_invocations() {
    let (server, client) = Host::pair();
    let (block_tx, block_rx) = mpsc::channel::<()>();
    let block_rx = Mutex::new(block_rx);

    server
        .register_method_handler(
            METHODS,
            Arc::new(move |_: MethodCall| {
                let _ = lock(&block_rx).recv_timeout(Duration::from_secs(30));
                MethodResult::success("late")
            }),
        )
        .unwrap();

    let mut waiters = Vec::new();
    for _ in 0..3 {
        let channel = client.method_channel(METHODS);
        waiters.push(thread::spawn(move || {
            channel.invoke("stall", WireValue::Null)
        }));
    }
    // Let the invocations reach the wire before tearing down.
    thread::sleep(Duration::from_millis(100));

    client.shutdown();
    assert!(!client.is_open());

    for waiter in waiters {
        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, ChannelError::Abandoned { ref name } if name == METHODS));
    }

    drop(block_tx);
    let err = client
        .method_channel(METHODS)
        .invoke("after", WireValue::Null)
        .unwrap_err();
    assert!(matches!(err, ChannelError::Disconnected(_)));
    drop(server);
}

#[test]
fn peer_disconnect_tears_down_the_other_side() {
    let (server, client) = Host::pair();
    server
        .register_stream_handler(EVENTS, Arc::new(Counter::new()))
        .unwrap();
    let stream = client.event_channel(EVENTS).listen(WireValue::Null).unwrap();

    server.shutdown();

    // The client notices EOF; its subscription closes.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        match stream.recv_timeout(Duration::from_millis(50)) {
            Ok(_) => {}
            Err(ChannelError::Timeout { .. }) if std::time::Instant::now() < deadline => {}
            Err(err) => {
                assert!(matches!(err, ChannelError::Disconnected(_)));
                break;
            }
        }
        if std::time::Instant::now() >= deadline {
            panic!("client never observed the disconnect");
        }
    }
    assert!(!client.is_open() || stream.try_recv().is_none());
}

#[test]
fn registration_conflicts_and_idempotence() {
    let (server, _client) = Host::pair();
    let handler = Arc::new(|_: MethodCall| MethodResult::success(1i64));
    server
        .register_method_handler(METHODS, handler.clone())
        .unwrap();
    // Same handler again: fine.
    server.register_method_handler(METHODS, handler).unwrap();
    // A different one: conflict.
    let err = server
        .register_method_handler(METHODS, Arc::new(|_: MethodCall| MethodResult::success(2i64)))
        .unwrap_err();
    assert!(matches!(err, ChannelError::DuplicateChannel { ref name } if name == METHODS));

    server.unregister(METHODS);
    server
        .register_method_handler(METHODS, Arc::new(|_: MethodCall| MethodResult::success(3i64)))
        .unwrap();
    assert_eq!(server.channels(), vec![METHODS.to_string()]);
}

use std::io;
use std::os::unix::net::UnixListener;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use platch_channel::{
    schedule, CancelToken, EventError, EventSink, Host, MethodCall, MethodHandler, MethodResult,
    StreamHandler,
};
use platch_wire::WireValue;
use tracing::info;

use crate::cmd::ServeArgs;
use crate::exit::{channel_error, io_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::OutputFormat;

/// Demo method channel: "ping" answers null and pushes a reverse
/// "pong" call back to the caller; "ping2" answers "pong2".
pub const METHOD_CHANNEL: &str = "demo.platch/methods";

/// Demo event channel: emits an incrementing counter on a fixed
/// interval until cancelled.
pub const COUNTER_CHANNEL: &str = "demo.platch/counter";

const ACCEPT_POLL: Duration = Duration::from_millis(200);

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let _ = std::fs::remove_file(&args.path);
    let listener =
        UnixListener::bind(&args.path).map_err(|err| io_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    info!(path = %args.path.display(), "serving demo channels");
    serve_on(&listener, &running)
}

fn serve_on(listener: &UnixListener, running: &AtomicBool) -> CliResult<i32> {
    // Poll the listener so Ctrl-C is noticed between connections.
    listener
        .set_nonblocking(true)
        .map_err(|err| io_error("listener setup failed", err))?;

    let mut hosts: Vec<Host> = Vec::new();

    while running.load(Ordering::SeqCst) {
        let (stream, _addr) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err) => return Err(io_error("accept failed", err)),
        };
        // Accepted streams must block; only the listener polls.
        stream
            .set_nonblocking(false)
            .map_err(|err| io_error("stream setup failed", err))?;
        let reader = stream
            .try_clone()
            .map_err(|err| io_error("stream clone failed", err))?;
        let host = Host::spawn(reader, stream);
        register_demo_channels(&host)?;
        hosts.retain(Host::is_open);
        hosts.push(host);
    }

    for host in hosts {
        host.shutdown();
    }
    Ok(SUCCESS)
}

pub fn register_demo_channels(host: &Host) -> CliResult<()> {
    host.register_method_handler(METHOD_CHANNEL, Arc::new(PingHandler { host: host.clone() }))
        .map_err(|err| channel_error("register failed", err))?;
    host.register_stream_handler(COUNTER_CHANNEL, Arc::new(CounterHandler::new()))
        .map_err(|err| channel_error("register failed", err))?;
    Ok(())
}

struct PingHandler {
    host: Host,
}

impl MethodHandler for PingHandler {
    fn on_call(&self, call: MethodCall) -> MethodResult {
        match call.method.as_str() {
            "ping" => {
                // Answer first, then push the reverse call; the caller
                // sees its result before the pong arrives.
                let channel = self.host.method_channel(METHOD_CHANNEL);
                thread::spawn(move || {
                    let _ = channel.invoke_with_timeout(
                        "pong",
                        WireValue::Text("ping reply".to_string()),
                        Duration::from_secs(5),
                    );
                });
                MethodResult::Success(WireValue::Null)
            }
            "ping2" => MethodResult::success("pong2"),
            _ => MethodResult::NotImplemented,
        }
    }
}

struct CounterHandler {
    counter: Arc<AtomicI64>,
    ticker: Mutex<Option<CancelToken>>,
}

impl CounterHandler {
    fn new() -> Self {
        Self {
            counter: Arc::new(AtomicI64::new(0)),
            ticker: Mutex::new(None),
        }
    }
}

impl StreamHandler for CounterHandler {
    fn on_listen(
        &self,
        arguments: WireValue,
        sink: EventSink,
    ) -> Result<(), EventError> {
        let interval_ms = arguments
            .get("interval_ms")
            .and_then(WireValue::as_i64)
            .unwrap_or(1000);
        if interval_ms <= 0 {
            return Err(EventError::new(
                "bad-arguments",
                "interval_ms must be positive",
                WireValue::Null,
            ));
        }

        let counter = Arc::clone(&self.counter);
        let token = schedule(Duration::from_millis(interval_ms as u64), move || {
            let value = counter.fetch_add(1, Ordering::SeqCst) + 1;
            sink.success(WireValue::Int(value));
        });

        let mut ticker = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *ticker = Some(token);
        Ok(())
    }

    fn on_cancel(&self) {
        let token = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut token) = token {
            token.cancel();
        }
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

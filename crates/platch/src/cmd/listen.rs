use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use platch_channel::{ChannelError, Host, StreamEvent};

use crate::cmd::{parse_json_arguments, ListenArgs};
use crate::exit::{channel_error, io_error, CliError, CliResult, INTERNAL, REMOTE_ERROR, SUCCESS};
use crate::output::{print_event, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let arguments = parse_json_arguments(args.json.as_deref())?;

    let stream =
        UnixStream::connect(&args.path).map_err(|err| io_error("connect failed", err))?;
    let reader = stream
        .try_clone()
        .map_err(|err| io_error("stream clone failed", err))?;
    let host = Host::spawn(reader, stream);

    let mut subscription = host
        .event_channel(args.channel.as_str())
        .listen(arguments)
        .map_err(|err| channel_error("listen failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut received = 0usize;
    let mut code = SUCCESS;

    while running.load(Ordering::SeqCst) {
        let event = match subscription.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event,
            // Poll again so Ctrl-C is noticed between events.
            Err(ChannelError::Timeout { .. }) => continue,
            Err(err) => return Err(channel_error("receive failed", err)),
        };

        print_event(&args.channel, &event, format);

        match event {
            StreamEvent::Data(_) => {
                received = received.saturating_add(1);
                if let Some(count) = args.count {
                    if received >= count {
                        subscription
                            .cancel()
                            .map_err(|err| channel_error("cancel failed", err))?;
                        break;
                    }
                }
            }
            StreamEvent::Error { .. } => {
                code = REMOTE_ERROR;
                break;
            }
            StreamEvent::Done => break,
        }
    }

    host.shutdown();
    Ok(code)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

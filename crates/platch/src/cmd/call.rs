use std::os::unix::net::UnixStream;

use platch_channel::{Host, MethodResult};

use crate::cmd::{parse_duration, parse_json_arguments, CallArgs};
use crate::exit::{channel_error, io_error, CliResult, REMOTE_ERROR, SUCCESS, USAGE};
use crate::output::{print_result, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let arguments = parse_json_arguments(args.json.as_deref())?;

    let stream =
        UnixStream::connect(&args.path).map_err(|err| io_error("connect failed", err))?;
    let reader = stream
        .try_clone()
        .map_err(|err| io_error("stream clone failed", err))?;
    let host = Host::spawn(reader, stream);

    let result = host
        .method_channel(args.channel.as_str())
        .invoke_with_timeout(&args.method, arguments, timeout)
        .map_err(|err| channel_error("call failed", err))?;

    print_result(&args.channel, &args.method, &result, format);
    host.shutdown();

    Ok(match result {
        MethodResult::Success(_) => SUCCESS,
        MethodResult::Error { .. } => REMOTE_ERROR,
        MethodResult::NotImplemented => USAGE,
    })
}

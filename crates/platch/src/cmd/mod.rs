use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod listen;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the built-in demo channels on a socket.
    Serve(ServeArgs),
    /// Invoke a method on a peer and print the result.
    Call(CallArgs),
    /// Subscribe to an event channel and print events.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Channel name to invoke on.
    #[arg(long, short = 'c')]
    pub channel: String,
    /// Method name.
    #[arg(long, short = 'm')]
    pub method: String,
    /// JSON arguments for the call.
    #[arg(long)]
    pub json: Option<String>,
    /// Maximum time to wait for the result (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Event channel name to subscribe to.
    #[arg(long, short = 'c')]
    pub channel: String,
    /// JSON arguments for the subscription.
    #[arg(long)]
    pub json: Option<String>,
    /// Exit after receiving N data events.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

pub fn parse_json_arguments(json: Option<&str>) -> CliResult<platch_wire::WireValue> {
    match json {
        None => Ok(platch_wire::WireValue::Null),
        Some(raw) => {
            let value: serde_json::Value = serde_json::from_str(raw)
                .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
            Ok(platch_codec::json_to_wire(&value))
        }
    }
}

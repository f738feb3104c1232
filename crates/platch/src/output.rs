use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use platch_channel::{MethodResult, StreamEvent};
use platch_codec::wire_to_json;
use platch_wire::WireValue;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ResultOutput {
    channel: String,
    method: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

pub fn print_result(channel: &str, method: &str, result: &MethodResult, format: OutputFormat) {
    let out = match result {
        MethodResult::Success(value) => ResultOutput {
            channel: channel.to_string(),
            method: method.to_string(),
            status: "success",
            value: Some(json_or_preview(value)),
            code: None,
            message: None,
            details: None,
        },
        MethodResult::Error {
            code,
            message,
            details,
        } => ResultOutput {
            channel: channel.to_string(),
            method: method.to_string(),
            status: "error",
            value: None,
            code: Some(code.clone()),
            message: Some(message.clone()),
            details: Some(json_or_preview(details)),
        },
        MethodResult::NotImplemented => ResultOutput {
            channel: channel.to_string(),
            method: method.to_string(),
            status: "not-implemented",
            value: None,
            code: None,
            message: None,
            details: None,
        },
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "METHOD", "STATUS", "RESULT"])
                .add_row(vec![
                    out.channel,
                    out.method,
                    out.status.to_string(),
                    result_cell(result),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} method={} status={} {}",
                out.channel,
                out.method,
                out.status,
                result_cell(result)
            );
        }
    }
}

#[derive(Serialize)]
struct EventOutput {
    channel: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

pub fn print_event(channel: &str, event: &StreamEvent, format: OutputFormat) {
    let out = match event {
        StreamEvent::Data(value) => EventOutput {
            channel: channel.to_string(),
            kind: "data",
            value: Some(json_or_preview(value)),
            code: None,
            message: None,
        },
        StreamEvent::Error { code, message, .. } => EventOutput {
            channel: channel.to_string(),
            kind: "error",
            value: None,
            code: Some(code.clone()),
            message: Some(message.clone()),
        },
        StreamEvent::Done => EventOutput {
            channel: channel.to_string(),
            kind: "done",
            value: None,
            code: None,
            message: None,
        },
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "KIND", "VALUE"])
                .add_row(vec![out.channel, out.kind.to_string(), event_cell(event)]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("channel={} kind={} {}", out.channel, out.kind, event_cell(event));
        }
    }
}

fn print_json<T: Serialize>(out: &T) {
    println!(
        "{}",
        serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
    );
}

fn json_or_preview(value: &WireValue) -> serde_json::Value {
    wire_to_json(value)
        .unwrap_or_else(|_| serde_json::Value::String(format!("<{}>", value.type_name())))
}

fn result_cell(result: &MethodResult) -> String {
    match result {
        MethodResult::Success(value) => json_or_preview(value).to_string(),
        MethodResult::Error { code, message, .. } => format!("{code}: {message}"),
        MethodResult::NotImplemented => "method not implemented".to_string(),
    }
}

fn event_cell(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Data(value) => json_or_preview(value).to_string(),
        StreamEvent::Error { code, message, .. } => format!("{code}: {message}"),
        StreamEvent::Done => "end of stream".to_string(),
    }
}

use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use thumbq_service::Reply;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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
struct ReplyOutput<'a> {
    handled: bool,
    original_format: Option<&'a str>,
    width: u32,
    height: u32,
    length: u64,
    result_size: usize,
}

impl<'a> ReplyOutput<'a> {
    fn new(reply: &'a Reply) -> Self {
        Self {
            handled: reply.is_handled(),
            original_format: reply.header.original_format.as_deref(),
            width: reply.header.width,
            height: reply.header.height,
            length: reply.header.length,
            result_size: reply.result.as_ref().map_or(0, |result| result.len()),
        }
    }
}

pub fn print_reply(reply: &Reply, format: OutputFormat) {
    let out = ReplyOutput::new(reply);
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["HANDLED", "FORMAT", "SIZE", "BYTES"])
                .add_row(vec![
                    out.handled.to_string(),
                    out.original_format.unwrap_or("-").to_string(),
                    format!("{}x{}", out.width, out.height),
                    out.result_size.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "handled={} format={} size={}x{} bytes={}",
                out.handled,
                out.original_format.unwrap_or("-"),
                out.width,
                out.height,
                out.result_size
            );
        }
        OutputFormat::Raw => {
            if let Some(result) = &reply.result {
                print_raw(result);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

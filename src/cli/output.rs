//! Output formatting for decoded messages.
//!
//! Three renderings of the same message stream: a summary table, an indented
//! field tree with byte ranges, and JSON lines.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::net::SocketAddr;

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde::Serialize;
use wiredissect_core::protocol::{Annotation, CorrelationInfo, DecodedField};
use wiredissect_core::{CollectingSink, DecodedMessage, FieldSink, MessageRecord};

use crate::analyze::FrameMeta;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One row per message (default)
    Summary,
    /// Every field with its byte range and annotations
    Tree,
    /// JSON Lines (one JSON object per message)
    Json,
}

/// Writes decoded messages in the chosen format.
pub struct OutputFormatter<W: Write> {
    format: OutputFormat,
    writer: W,
    table: Table,
    rows: usize,
}

/// A message record with its capture coordinates.
#[derive(Serialize)]
struct JsonLine<'r> {
    frame: u64,
    timestamp_us: u64,
    conversation: u64,
    src: String,
    dst: String,
    #[serde(flatten)]
    record: &'r MessageRecord,
}

impl<W: Write> OutputFormatter<W> {
    /// Create a new formatter with the specified format.
    pub fn new(format: OutputFormat, writer: W) -> Self {
        let mut table = Table::new();
        table.set_header(vec!["Frame", "Time", "Conv", "Source", "Destination", "Protocol", "Info"]);
        Self {
            format,
            writer,
            table,
            rows: 0,
        }
    }

    /// Write one message.
    pub fn write_message(&mut self, meta: &FrameMeta, message: &DecodedMessage<'_>) -> io::Result<()> {
        match self.format {
            OutputFormat::Summary => {
                self.add_row(meta, message);
                Ok(())
            }
            OutputFormat::Tree => self.write_tree(meta, message),
            OutputFormat::Json => self.write_json(meta, message),
        }
    }

    /// Flush anything buffered and return the writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.format == OutputFormat::Summary && self.rows > 0 {
            writeln!(self.writer, "{}", self.table)?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn add_row(&mut self, meta: &FrameMeta, message: &DecodedMessage<'_>) {
        self.rows += 1;
        self.table.add_row(vec![
            Cell::new(meta.frame),
            Cell::new(format_timestamp(meta.timestamp_us)),
            Cell::new(meta.conversation),
            Cell::new(SocketAddr::from(meta.src)),
            Cell::new(SocketAddr::from(meta.dst)),
            Cell::new(message.protocol),
            Cell::new(message.summary()),
        ]);
    }

    fn write_tree(&mut self, meta: &FrameMeta, message: &DecodedMessage<'_>) -> io::Result<()> {
        let mut sink = TreeSink::default();
        message.emit(&mut sink);
        writeln!(
            self.writer,
            "Frame {} {} -> {} [{}] {}",
            meta.frame,
            SocketAddr::from(meta.src),
            SocketAddr::from(meta.dst),
            meta.direction.as_str(),
            message.summary()
        )?;
        self.writer.write_all(sink.out.as_bytes())
    }

    fn write_json(&mut self, meta: &FrameMeta, message: &DecodedMessage<'_>) -> io::Result<()> {
        let mut sink = CollectingSink::new();
        message.emit(&mut sink);
        for record in sink.records() {
            let line = JsonLine {
                frame: meta.frame,
                timestamp_us: meta.timestamp_us,
                conversation: meta.conversation.0,
                src: SocketAddr::from(meta.src).to_string(),
                dst: SocketAddr::from(meta.dst).to_string(),
                record,
            };
            serde_json::to_writer(&mut self.writer, &line)?;
            writeln!(self.writer)?;
        }
        Ok(())
    }
}

/// `seconds.micros` since the epoch.
fn format_timestamp(us: u64) -> String {
    format!("{}.{:06}", us / 1_000_000, us % 1_000_000)
}

/// Renders fields as indented text.
#[derive(Default)]
struct TreeSink {
    out: String,
}

impl TreeSink {
    fn annotation(&mut self, depth: usize, annotation: &Annotation) {
        let _ = writeln!(self.out, "{:indent$}! {annotation}", "", indent = depth * 4 + 4);
    }
}

impl FieldSink for TreeSink {
    fn begin_message(&mut self, message: &DecodedMessage<'_>) {
        for annotation in &message.annotations {
            self.annotation(0, annotation);
        }
    }

    fn field(&mut self, field: &DecodedField<'_>) {
        let depth = field.depth as usize;
        let _ = writeln!(
            self.out,
            "{:indent$}{}: {}  [{}..{}]",
            "",
            field.descriptor.display,
            field.rendered,
            field.range.start,
            field.range.end,
            indent = depth * 4 + 2
        );
        for annotation in &field.annotations {
            self.annotation(depth, annotation);
        }
    }

    fn correlation(&mut self, info: &CorrelationInfo) {
        let _ = writeln!(self.out, "  -> {info}");
    }

    fn end_message(&mut self, message: &DecodedMessage<'_>) {
        if let Some(err) = &message.error {
            let _ = writeln!(self.out, "  [MALFORMED: {err}]");
        }
    }
}

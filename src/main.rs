//! wiredissect CLI entry point.

use std::io::{self, BufWriter};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wiredissect::analyze::Analyzer;
use wiredissect::capture::CaptureReader;
use wiredissect::cli::{Args, OutputFormatter};
use wiredissect_core::{default_registry, Protocol, SessionConfig};

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Set up logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();

    // Handle info-only commands
    if args.list_protocols {
        list_protocols();
        return Ok(());
    }

    if args.show_schema {
        show_schema();
        return Ok(());
    }

    let capture = args
        .capture
        .as_ref()
        .context("Capture file required. Use --help for usage.")?;

    let mut registry = default_registry();
    for (port, name) in &args.ports {
        if !registry.set_port_override(*port, name) {
            bail!("Unknown protocol '{name}' for port {port}. Use --list-protocols to see names.");
        }
    }

    let config = SessionConfig::default()
        .with_synthetic_ids(!args.no_synthetic_ids)
        .with_max_messages_per_buffer(args.max_messages);
    let mut analyzer = Analyzer::new(registry, config);
    if let Some(name) = &args.protocol {
        if !analyzer.force_protocol(name) {
            bail!("Unknown protocol '{name}'. Use --list-protocols to see names.");
        }
    }

    let packets = CaptureReader::open(capture)
        .and_then(|mut reader| reader.read_all())
        .with_context(|| format!("Failed to read capture file: {}", capture.display()))?;

    let mut formatter = OutputFormatter::new(args.format, BufWriter::new(io::stdout().lock()));
    let mut written: io::Result<()> = Ok(());

    // Pass 1 registers requests; pass 2 sees every response already matched
    analyzer.run_pass(&packets, true, |meta, message| {
        if args.single_pass && written.is_ok() {
            written = formatter.write_message(meta, message);
        }
    });
    if !args.single_pass {
        analyzer.run_pass(&packets, false, |meta, message| {
            if written.is_ok() {
                written = formatter.write_message(meta, message);
            }
        });
    }
    written.context("Failed to write output")?;
    formatter.finish().context("Failed to write output")?;

    Ok(())
}

fn list_protocols() {
    let registry = default_registry();

    println!("Registered Protocol Decoders:");
    println!("{:-<50}", "");

    for decoder in registry.all() {
        match decoder.default_port() {
            Some(port) => println!("  {} ({}) port {}", decoder.display_name(), decoder.name(), port),
            None => println!("  {} ({})", decoder.display_name(), decoder.name()),
        }

        let fields = decoder.schema_fields();
        if !fields.is_empty() {
            println!("    Fields: {}", fields.len());
        }
    }
}

fn show_schema() {
    let registry = default_registry();

    for decoder in registry.all() {
        println!("Protocol: {}", decoder.name());
        println!("{:-<72}", "");
        println!("{:<32} {:<12} Description", "Field", "Type");
        println!("{:-<72}", "");
        for field in decoder.schema_fields() {
            println!(
                "{:<32} {:<12} {}",
                field.name,
                field.kind.type_name(),
                field.description.unwrap_or(field.display)
            );
        }
        println!();
    }
}

//! Command-line argument definitions.

use clap::Parser;
use std::path::PathBuf;

use super::OutputFormat;

/// Decode request/reply protocol messages from a capture file.
#[derive(Parser, Debug)]
#[command(name = "wiredissect")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// PCAP or PCAPNG file to decode
    #[arg(value_name = "CAPTURE")]
    pub capture: Option<PathBuf>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "summary")]
    pub format: OutputFormat,

    /// Decode every payload with this protocol, ignoring ports
    #[arg(short = 'p', long = "protocol", value_name = "NAME")]
    pub protocol: Option<String>,

    /// Bind a port to a protocol (repeatable)
    #[arg(long = "port", value_name = "PORT=NAME", value_parser = parse_port_override)]
    pub ports: Vec<(u16, String)>,

    /// Print while registering requests instead of after a second pass
    #[arg(long = "single-pass")]
    pub single_pass: bool,

    /// Correlate zero transaction ids by wire value only
    #[arg(long = "no-synthetic-ids")]
    pub no_synthetic_ids: bool,

    /// Stop decoding a buffer after this many messages
    #[arg(long = "max-messages", default_value = "256", value_name = "N")]
    pub max_messages: usize,

    /// List registered protocol decoders
    #[arg(long = "list-protocols")]
    pub list_protocols: bool,

    /// Show the fields every decoder can produce
    #[arg(long = "schema")]
    pub show_schema: bool,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Check if this is an info-only command (no capture file needed).
    pub fn is_info_only(&self) -> bool {
        self.list_protocols || self.show_schema
    }
}

/// Parse `PORT=NAME`.
pub fn parse_port_override(s: &str) -> Result<(u16, String), String> {
    let (port, name) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PORT=NAME, got '{s}'"))?;
    let port = port
        .trim()
        .parse::<u16>()
        .map_err(|e| format!("invalid port '{port}': {e}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("protocol name is empty".to_string());
    }
    Ok((port, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_override() {
        assert_eq!(parse_port_override("9000=modbus"), Ok((9000, "modbus".to_string())));
        assert!(parse_port_override("9000").is_err());
        assert!(parse_port_override("x=modbus").is_err());
        assert!(parse_port_override("70000=modbus").is_err());
        assert!(parse_port_override("9000=").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "wiredissect",
            "--format",
            "tree",
            "--port",
            "9000=telemetry",
            "--single-pass",
            "-vv",
            "capture.pcap",
        ]);
        assert_eq!(args.format, OutputFormat::Tree);
        assert_eq!(args.ports, vec![(9000, "telemetry".to_string())]);
        assert!(args.single_pass);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.max_messages, 256);
        assert!(!args.is_info_only());
    }
}

//! wiredissect - decode captured request/reply protocol messages.
//!
//! This crate is the command-line host around `wiredissect-core`: it reads
//! PCAP/PCAPNG files, slices each frame down to its UDP or TCP payload and
//! runs the payloads through the protocol registry in two passes.
//!
//! # Example
//!
//! ```no_run
//! use wiredissect::analyze::Analyzer;
//! use wiredissect::capture::CaptureReader;
//! use wiredissect_core::{default_registry, SessionConfig};
//!
//! fn main() -> wiredissect_core::Result<()> {
//!     let packets = CaptureReader::open("capture.pcap")?.read_all()?;
//!     let mut analyzer = Analyzer::new(default_registry(), SessionConfig::default());
//!     analyzer.run_pass(&packets, true, |_, _| {});
//!     analyzer.run_pass(&packets, false, |meta, message| {
//!         println!("{} {}", meta.frame, message.summary());
//!     });
//!     Ok(())
//! }
//! ```

pub mod analyze;
pub mod capture;
pub mod cli;
pub mod error;

pub use error::{CaptureError, Result};

#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Comma separated probe record files.
pub mod csv;

pub use csv::{
    format_probe_line, parse_probe_line, read_probes, read_probes_csv, write_probes,
    write_probes_csv, ProbeIoError, PROBE_CSV_HEADER,
};

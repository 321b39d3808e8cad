use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use probedeform_core::{DeformError, ProbeRecord};

/// Column names of a probe file, in order.
pub const PROBE_CSV_HEADER: &str = "ix,iy,itheta,x,y,theta,radius,scale_multiplier";

/// Error types for the probe file module.
#[derive(Debug, thiserror::Error)]
pub enum ProbeIoError {
    /// Error reading or writing file
    #[error("error reading or writing file")]
    IoError(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error {0}")]
    ParseError(String),

    /// A probe line does not have one field per column
    #[error("Invalid number of fields: {0}, expected 8")]
    InvalidNumFields(usize),

    /// A parsed probe is not valid
    #[error(transparent)]
    Probe(#[from] DeformError),
}

/// Read a probe file and return its records.
///
/// # Arguments
///
/// * `path` - The path to the probe file.
///
/// # Returns
///
/// The probe records, in file order.
pub fn read_probes_csv(path: impl AsRef<Path>) -> Result<Vec<ProbeRecord>, ProbeIoError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let records = read_probes(BufReader::new(file))?;
    log::debug!("read {} probes from {}", records.len(), path.display());
    Ok(records)
}

/// Read probe records from a reader.
///
/// The first line that is neither blank nor a `#` comment must be the header.
pub fn read_probes(reader: impl BufRead) -> Result<Vec<ProbeRecord>, ProbeIoError> {
    let mut lines = reader
        .lines()
        .enumerate()
        .map(|(index, line)| line.map(|line| (index + 1, line)))
        .filter(|line| match line {
            Ok((_, line)) => !is_skipped(line),
            Err(_) => true,
        });

    match lines.next().transpose()? {
        Some((_, header)) if is_header(&header) => {}
        Some((number, header)) => {
            return Err(ProbeIoError::ParseError(format!(
                "line {number}: expected header `{PROBE_CSV_HEADER}`, got `{header}`"
            )))
        }
        None => return Ok(Vec::new()),
    }

    lines
        .map(|line| -> Result<ProbeRecord, ProbeIoError> {
            let (number, line) = line?;
            parse_probe_line(&line).map_err(|e| match e {
                ProbeIoError::ParseError(msg) => {
                    ProbeIoError::ParseError(format!("line {number}: {msg}"))
                }
                e => e,
            })
        })
        .collect()
}

/// Write probe records to a file, header first.
///
/// # Arguments
///
/// * `path` - The path to the probe file.
/// * `records` - The probe records to write.
pub fn write_probes_csv(
    path: impl AsRef<Path>,
    records: &[ProbeRecord],
) -> Result<(), ProbeIoError> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_probes(&mut writer, records)?;
    writer.flush()?;
    log::debug!("wrote {} probes to {}", records.len(), path.display());
    Ok(())
}

/// Write probe records to a writer, header first.
pub fn write_probes(mut writer: impl Write, records: &[ProbeRecord]) -> Result<(), ProbeIoError> {
    writeln!(writer, "{PROBE_CSV_HEADER}")?;
    for record in records {
        writeln!(writer, "{}", format_probe_line(record))?;
    }
    Ok(())
}

fn is_skipped(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('#')
}

fn is_header(line: &str) -> bool {
    line.split(',').map(str::trim).eq(PROBE_CSV_HEADER.split(','))
}

fn parse_part(s: &str) -> Result<f64, ProbeIoError> {
    s.parse::<f64>()
        .map_err(|e| ProbeIoError::ParseError(format!("{}: {}", s, e)))
}

/// Parse one probe line.
/// NOTE: IX, IY, ITHETA, X, Y, THETA, RADIUS, SCALE_MULTIPLIER
pub fn parse_probe_line(line: &str) -> Result<ProbeRecord, ProbeIoError> {
    let parts = line
        .split(',')
        .map(|part| parse_part(part.trim()))
        .collect::<Result<Vec<_>, _>>()?;

    let [ix, iy, itheta, x, y, theta, radius, scale_multiplier] = parts[..] else {
        return Err(ProbeIoError::InvalidNumFields(parts.len()));
    };

    let record = ProbeRecord {
        ix,
        iy,
        itheta,
        x,
        y,
        theta,
        radius,
        scale_multiplier,
    };
    record.validate()?;
    Ok(record)
}

/// Format one probe line, without the line break.
pub fn format_probe_line(record: &ProbeRecord) -> String {
    format!(
        "{},{},{},{},{},{},{},{}",
        record.ix,
        record.iy,
        record.itheta,
        record.x,
        record.y,
        record.theta,
        record.radius,
        record.scale_multiplier
    )
}

//! CSV export of flagged IPs
//!
//! Fields containing a comma, quote or line break are quoted, with
//! embedded quotes doubled.

use super::{ReportError, CSV_HEADERS};
use crate::models::SuspiciousIp;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write the header row and one row per IP, replacing any existing file
pub fn write_csv<P: AsRef<Path>>(path: P, results: &[SuspiciousIp]) -> Result<(), ReportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{}", CSV_HEADERS.join(","))?;
    for entry in results {
        writeln!(
            writer,
            "{},{},{}",
            escape_field(&entry.ip),
            entry.count,
            escape_field(&entry.location)
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Read back a file produced by [`write_csv`]
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Vec<SuspiciousIp>, ReportError> {
    let contents = std::fs::read_to_string(path)?;
    let mut records = parse_records(&contents)?.into_iter();

    match records.next() {
        Some((_, header)) if header == CSV_HEADERS => {}
        Some((line, _)) => {
            return Err(ReportError::Csv {
                line,
                reason: "unexpected header".to_string(),
            })
        }
        None => {
            return Err(ReportError::Csv {
                line: 1,
                reason: "missing header".to_string(),
            })
        }
    }

    records
        .map(|(line, fields)| match <[String; 3]>::try_from(fields) {
            Ok([ip, count, location]) => {
                let count = count.parse().map_err(|_| ReportError::Csv {
                    line,
                    reason: format!("invalid count '{}'", count),
                })?;
                Ok(SuspiciousIp { ip, count, location })
            }
            Err(fields) => Err(ReportError::Csv {
                line,
                reason: format!("expected 3 fields, found {}", fields.len()),
            }),
        })
        .collect()
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split CSV text into records, tagging each with its starting line number
fn parse_records(contents: &str) -> Result<Vec<(usize, Vec<String>)>, ReportError> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = contents.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                records.push((record_line, std::mem::take(&mut fields)));
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(ReportError::Csv {
            line: record_line,
            reason: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push((record_line, fields));
    }
    Ok(records)
}

//! CSV export for carbon ledgers.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::carbon::CarbonSample;

/// Column header of the flat ledger export.
const HEADER: &str = "time_min,domain,source,entity,power_used,carbon_intensity,carbon_released";

/// Exports one or more domains' tick records to a CSV file.
///
/// # Arguments
///
/// * `ledgers` - `(domain name, records)` pairs
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(ledgers: &[(&str, &[CarbonSample])], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(ledgers, buf)
}

/// Writes tick records as CSV, one row per entity per source per tick.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(ledgers: &[(&str, &[CarbonSample])], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER.split(','))?;

    for (domain, records) in ledgers {
        for sample in *records {
            for source in &sample.sources {
                for e in &source.entities {
                    wtr.write_record(&[
                        sample.time_min.to_string(),
                        (*domain).to_string(),
                        source.source.clone(),
                        e.entity.clone(),
                        format!("{:.4}", e.power_used),
                        format!("{:.4}", e.carbon_intensity),
                        format!("{:.6}", e.carbon_released),
                    ])?;
                }
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::carbon::{EntityCarbon, SourceCarbon};

    fn make_sample(t: u64) -> CarbonSample {
        let mut grid = SourceCarbon::new("grid");
        grid.push(EntityCarbon::new("fog", 50.0, 2.0));
        grid.push(EntityCarbon::new("wifi", 5.0, 2.0));
        let mut sample = CarbonSample::new(t);
        sample.push(grid);
        sample
    }

    #[test]
    fn header_and_row_count() {
        let records: Vec<CarbonSample> = (0..4).map(make_sample).collect();
        let mut buf = Vec::new();
        assert!(write_csv(&[("edge", &records)], &mut buf).is_ok());
        let output = String::from_utf8(buf).unwrap_or_default();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.first().copied(), Some(HEADER));
        // 1 header + 4 ticks x 2 entities
        assert_eq!(lines.len(), 9);
    }

    #[test]
    fn rows_parse_back() {
        let records = vec![make_sample(7)];
        let mut buf = Vec::new();
        assert!(write_csv(&[("edge", &records)], &mut buf).is_ok());

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let rows: Vec<csv::StringRecord> = rdr.records().filter_map(Result::ok).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(0), Some("7"));
        assert_eq!(rows[0].get(3), Some("fog"));
        let released: Option<f64> = rows[0].get(6).and_then(|v| v.parse().ok());
        assert_eq!(released, Some(0.1));
    }
}

//! CSV import and export for raw ECG recordings
//!
//! Layout: a header row naming the columns, one sample per row.
//!
//! ```text
//! tiempo_s,II,V1,V5,label
//! 0.000,0.12,-0.05,0.33,0
//! 0.002,0.15,-0.04,0.31,0
//! ```
//!
//! `time_s` is accepted as an alias for `tiempo_s`. `label` (0/1) and
//! `is_anomalo` (true/false) are optional annotations. Empty cells are skipped
//! column by column, so leads may end up with different lengths.

use crate::ecg_types::Lead;
use crate::error::{EcgError, EcgResult};
use crate::raw::{GroundTruth, RawEcgRecord};
use std::io;

/// Accepted names for the time column
pub const TIME_COLUMNS: [&str; 2] = ["tiempo_s", "time_s"];
/// Numeric annotation column
pub const LABEL_COLUMN: &str = "label";
/// Boolean annotation column
pub const ANOMALY_FLAG_COLUMN: &str = "is_anomalo";

/// Column positions resolved from the header row
struct ColumnLayout {
    time: usize,
    leads: [usize; 3],
    label: Option<usize>,
    anomaly_flag: Option<usize>,
}

impl ColumnLayout {
    fn from_headers(headers: &csv::StringRecord) -> EcgResult<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);

        let time = TIME_COLUMNS.iter().find_map(|name| find(name));
        let leads = Lead::ALL.map(|lead| find(lead.column_name()));

        let mut missing = Vec::new();
        if time.is_none() {
            missing.push(TIME_COLUMNS[0]);
        }
        for (lead, index) in Lead::ALL.iter().zip(leads.iter()) {
            if index.is_none() {
                missing.push(lead.column_name());
            }
        }

        match (time, leads) {
            (Some(time), [Some(ii), Some(v1), Some(v5)]) => Ok(ColumnLayout {
                time,
                leads: [ii, v1, v5],
                label: find(LABEL_COLUMN),
                anomaly_flag: find(ANOMALY_FLAG_COLUMN),
            }),
            _ => Err(EcgError::Format {
                line: Some(1),
                reason: format!("missing required column(s): {}", missing.join(", ")),
            }),
        }
    }
}

/// Parse CSV text into a raw record
pub fn parse_csv(text: &str) -> EcgResult<RawEcgRecord> {
    read_csv(text.as_bytes())
}

/// Read a raw record from any CSV source
pub fn read_csv<R: io::Read>(reader: R) -> EcgResult<RawEcgRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let layout = ColumnLayout::from_headers(reader.headers()?)?;

    let mut record = RawEcgRecord::default();
    let mut first_label: Option<u8> = None;
    let mut first_flag: Option<bool> = None;
    let mut rows = 0usize;

    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|p| p.line());
        rows += 1;

        push_number(&row, layout.time, line, &mut record.time_s)?;
        push_number(&row, layout.leads[0], line, &mut record.lead_ii)?;
        push_number(&row, layout.leads[1], line, &mut record.lead_v1)?;
        push_number(&row, layout.leads[2], line, &mut record.lead_v5)?;

        if first_label.is_none() {
            first_label = layout.label.and_then(|i| row.get(i)).and_then(parse_label);
        }
        if first_flag.is_none() {
            first_flag = layout
                .anomaly_flag
                .and_then(|i| row.get(i))
                .and_then(parse_flag);
        }
    }

    if rows == 0 {
        return Err(EcgError::Format {
            line: None,
            reason: "CSV has no data rows".to_string(),
        });
    }

    record.ground_truth = GroundTruth::resolve(first_label, first_flag);

    tracing::debug!(
        rows,
        samples = record.sample_count(),
        sampling_rate = record.sampling_rate().hz(),
        "Parsed ECG CSV"
    );

    Ok(record)
}

/// Write a raw record as CSV (time, leads and annotation columns)
pub fn write_csv<W: io::Write>(record: &RawEcgRecord, writer: W) -> EcgResult<()> {
    let mut writer = csv::Writer::from_writer(writer);

    let mut header = vec![TIME_COLUMNS[0], "II", "V1", "V5"];
    if record.ground_truth.is_some() {
        header.push(LABEL_COLUMN);
        header.push(ANOMALY_FLAG_COLUMN);
    }
    writer.write_record(&header)?;

    let rows = record.sample_count().min(record.time_s.len());
    for i in 0..rows {
        let mut fields = vec![
            record.time_s[i].to_string(),
            record.lead_ii[i].to_string(),
            record.lead_v1[i].to_string(),
            record.lead_v5[i].to_string(),
        ];
        if let Some(truth) = record.ground_truth {
            fields.push(truth.label.to_string());
            fields.push(truth.is_anomalous.to_string());
        }
        writer.write_record(&fields)?;
    }

    writer.flush().map_err(|e| EcgError::Format {
        line: None,
        reason: format!("failed to flush CSV output: {}", e),
    })
}

fn push_number(
    row: &csv::StringRecord,
    index: usize,
    line: Option<u64>,
    column: &mut Vec<f64>,
) -> EcgResult<()> {
    match row.get(index) {
        None | Some("") => Ok(()),
        Some(cell) => {
            let value = cell.parse::<f64>().map_err(|_| EcgError::Format {
                line,
                reason: format!("'{}' is not a number", cell),
            })?;
            column.push(value);
            Ok(())
        }
    }
}

fn parse_label(cell: &str) -> Option<u8> {
    let value = cell.parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    u8::try_from(value.trunc() as i64).ok()
}

fn parse_flag(cell: &str) -> Option<bool> {
    if cell.is_empty() {
        return None;
    }
    let lower = cell.to_ascii_lowercase();
    Some(matches!(lower.as_str(), "true" | "1" | "yes"))
}

//! Price loading for the runner.
//!
//! Two on-disk layouts are accepted:
//! 1. Wide: `timestamp,SYM1,SYM2,...`, one close per cell, empty or `NaN`
//!    cells are gaps
//! 2. Long: `timestamp,asset,open,high,low,close,volume`, one bar per row,
//!    ragged histories aligned onto the union timeline
//!
//! The layout is detected from the header. Synthetic panels are a
//! developer-only mode and are tagged as such in every export.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crosslab_core::data::{align_bars, synthetic_panel, PanelError, PricePanel, SyntheticSpec};
use crosslab_core::domain::{AssetId, Bar, DatasetHash};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path} has no header columns beyond the timestamp")]
    NoColumns { path: PathBuf },
    #[error("long-format file is missing column '{0}'")]
    MissingColumn(&'static str),
    #[error("row {row}: unparseable timestamp '{value}'")]
    BadTimestamp { row: usize, value: String },
    #[error("row {row}, column '{column}': unparseable number '{value}'")]
    BadNumber {
        row: usize,
        column: String,
        value: String,
    },
    #[error("panel error: {0}")]
    Panel(#[from] PanelError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileLayout {
    Wide,
    Long,
}

/// Where a panel came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    File { path: PathBuf, layout: FileLayout },
    Synthetic { seed: u64 },
}

/// A loaded panel with provenance.
#[derive(Debug)]
pub struct LoadedData {
    pub panel: PricePanel,
    pub source: DataSource,
    pub dataset_hash: DatasetHash,
}

impl LoadedData {
    pub fn is_synthetic(&self) -> bool {
        matches!(self.source, DataSource::Synthetic { .. })
    }
}

/// Load a price file, detecting its layout from the header.
pub fn load_prices(path: &Path) -> Result<LoadedData, LoadError> {
    let mut reader = open(path)?;
    let headers = reader
        .headers()
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    let layout = detect_layout(&headers);
    let panel = match layout {
        FileLayout::Wide => read_wide(path, reader, &headers)?,
        FileLayout::Long => read_long(path, reader, &headers)?,
    };
    let dataset_hash = panel.dataset_hash();
    info!(
        path = %path.display(),
        ?layout,
        assets = panel.n_assets(),
        bars = panel.n_bars(),
        hash = %dataset_hash.short(),
        "loaded prices"
    );
    for (asset, rate) in panel.gap_rates() {
        if rate > 0.5 {
            warn!(%asset, gap_rate = rate, "asset is mostly gaps");
        }
    }
    Ok(LoadedData {
        panel,
        source: DataSource::File {
            path: path.to_path_buf(),
            layout,
        },
        dataset_hash,
    })
}

/// Generate a synthetic panel. Results on it are tagged synthetic.
pub fn load_synthetic(spec: &SyntheticSpec, seed: u64) -> Result<LoadedData, LoadError> {
    warn!(seed, "using synthetic data; results are not comparable to real runs");
    let panel = synthetic_panel(spec, seed)?;
    let dataset_hash = panel.dataset_hash();
    Ok(LoadedData {
        panel,
        source: DataSource::Synthetic { seed },
        dataset_hash,
    })
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>, LoadError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

fn detect_layout(headers: &csv::StringRecord) -> FileLayout {
    let has = |name: &str| headers.iter().any(|h| h.eq_ignore_ascii_case(name));
    if (has("asset") || has("symbol")) && has("close") {
        FileLayout::Long
    } else {
        FileLayout::Wide
    }
}

fn read_wide(
    path: &Path,
    mut reader: csv::Reader<std::fs::File>,
    headers: &csv::StringRecord,
) -> Result<PricePanel, LoadError> {
    let assets: Vec<AssetId> = headers.iter().skip(1).map(AssetId::new).collect();
    if assets.is_empty() {
        return Err(LoadError::NoColumns {
            path: path.to_path_buf(),
        });
    }

    let mut rows: Vec<(NaiveDateTime, Vec<Option<f64>>)> = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let row = i + 2;
        let record = record.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let ts = parse_timestamp(record.get(0).unwrap_or_default())
            .ok_or_else(|| LoadError::BadTimestamp {
                row,
                value: record.get(0).unwrap_or_default().to_string(),
            })?;
        let mut closes = Vec::with_capacity(assets.len());
        for (j, asset) in assets.iter().enumerate() {
            let cell = record.get(j + 1).unwrap_or_default();
            closes.push(parse_cell(cell).map_err(|_| LoadError::BadNumber {
                row,
                column: asset.to_string(),
                value: cell.to_string(),
            })?);
        }
        rows.push((ts, closes));
    }
    rows.sort_by_key(|(ts, _)| *ts);

    let timestamps: Vec<NaiveDateTime> = rows.iter().map(|(ts, _)| *ts).collect();
    let columns = assets
        .into_iter()
        .enumerate()
        .map(|(j, asset)| (asset, rows.iter().map(|(_, c)| c[j]).collect()))
        .collect();
    Ok(PricePanel::from_closes(timestamps, columns)?)
}

fn read_long(
    path: &Path,
    mut reader: csv::Reader<std::fs::File>,
    headers: &csv::StringRecord,
) -> Result<PricePanel, LoadError> {
    let col = |names: &[&'static str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
            .ok_or(LoadError::MissingColumn(names[0]))
    };
    let ts_col = col(&["timestamp", "time", "open_time", "date"])?;
    let asset_col = col(&["asset", "symbol"])?;
    let close_col = col(&["close"])?;
    let optional = |name: &'static str| col(&[name]).ok();
    let (open_col, high_col, low_col, vol_col) = (
        optional("open"),
        optional("high"),
        optional("low"),
        optional("volume"),
    );

    let mut series: HashMap<AssetId, Vec<Bar>> = HashMap::new();
    for (i, record) in reader.records().enumerate() {
        let row = i + 2;
        let record = record.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let raw_ts = record.get(ts_col).unwrap_or_default();
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| LoadError::BadTimestamp {
            row,
            value: raw_ts.to_string(),
        })?;
        let number = |idx: usize, name: &str| -> Result<Option<f64>, LoadError> {
            let cell = record.get(idx).unwrap_or_default();
            parse_cell(cell).map_err(|_| LoadError::BadNumber {
                row,
                column: name.to_string(),
                value: cell.to_string(),
            })
        };
        let Some(close) = number(close_col, "close")? else {
            continue;
        };
        let field = |idx: Option<usize>, name: &str| -> Result<f64, LoadError> {
            Ok(match idx {
                Some(idx) => number(idx, name)?.unwrap_or(close),
                None => close,
            })
        };
        let asset = AssetId::new(record.get(asset_col).unwrap_or_default());
        let bar = Bar {
            timestamp,
            open: field(open_col, "open")?,
            high: field(high_col, "high")?,
            low: field(low_col, "low")?,
            close,
            volume: match vol_col {
                Some(idx) => number(idx, "volume")?.unwrap_or(0.0),
                None => 0.0,
            },
            asset: asset.clone(),
        };
        series.entry(asset).or_default().push(bar);
    }
    Ok(align_bars(series)?)
}

/// Empty and `NaN` cells are gaps.
fn parse_cell(cell: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let v: f64 = cell.parse()?;
    Ok(v.is_finite().then_some(v))
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[+offset]`, plain dates and epoch
/// milliseconds. Offsets are normalized to UTC.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    s.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn wide_file_with_gaps_and_unsorted_rows() {
        let f = write(
            "timestamp,BTCUSDT,ETHUSDT\n\
             2024-01-01 01:00:00+00:00,101,\n\
             2024-01-01 00:00:00+00:00,100,10\n\
             2024-01-01 02:00:00+00:00,102,NaN\n",
        );
        let data = load_prices(f.path()).unwrap();
        let p = &data.panel;
        assert_eq!(p.n_bars(), 3);
        assert_eq!(p.n_assets(), 2);
        let eth = p.asset_index(&AssetId::new("ETHUSDT")).unwrap();
        let btc = p.asset_index(&AssetId::new("BTCUSDT")).unwrap();
        assert_eq!(p.close(btc, 0), Some(100.0));
        assert_eq!(p.close(eth, 0), Some(10.0));
        assert_eq!(p.close(eth, 1), None);
        assert_eq!(p.close(eth, 2), None);
        assert!(matches!(
            data.source,
            DataSource::File {
                layout: FileLayout::Wide,
                ..
            }
        ));
    }

    #[test]
    fn long_file_aligns_ragged_histories() {
        let f = write(
            "timestamp,asset,open,high,low,close,volume\n\
             2024-01-01T00:00:00Z,AAA,1,1,1,1,5\n\
             2024-01-01T01:00:00Z,AAA,1,1.2,1,1.1,5\n\
             2024-01-01T01:00:00Z,BBB,2,2,2,2,5\n",
        );
        let data = load_prices(f.path()).unwrap();
        let b = data.panel.asset_index(&AssetId::new("BBB")).unwrap();
        assert_eq!(data.panel.n_bars(), 2);
        assert_eq!(data.panel.close(b, 0), None);
        assert_eq!(data.panel.close(b, 1), Some(2.0));
    }

    #[test]
    fn bad_number_reports_row_and_column() {
        let f = write("timestamp,AAA\n2024-01-01,abc\n");
        match load_prices(f.path()) {
            Err(LoadError::BadNumber { row, column, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(column, "AAA");
            }
            other => panic!("expected BadNumber, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_timestamps_rejected() {
        let f = write("timestamp,AAA\n2024-01-01,1\n2024-01-01,2\n");
        assert!(matches!(
            load_prices(f.path()),
            Err(LoadError::Panel(PanelError::NonMonotonic { .. }))
        ));
    }

    #[test]
    fn timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(5, 0, 0)
            .unwrap();
        for s in [
            "2024-03-01T05:00:00Z",
            "2024-03-01 05:00:00+00:00",
            "2024-03-01 07:00:00+02:00",
            "2024-03-01 05:00:00",
            "2024-03-01 05:00",
            "1709269200000",
        ] {
            assert_eq!(parse_timestamp(s), Some(expected), "{s}");
        }
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn synthetic_is_tagged() {
        let spec = SyntheticSpec {
            n_bars: 50,
            ..SyntheticSpec::default()
        };
        let data = load_synthetic(&spec, 7).unwrap();
        assert!(data.is_synthetic());
        assert_eq!(data.panel.n_bars(), 50);
    }
}

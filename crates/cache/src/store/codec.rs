//! Pluggable serialization backends for the timeseries payload.
//!
//! Backend choice affects size and speed only, never correctness: every
//! codec must reproduce the exact `TimeSeries` it was given.

use simbatch_core::{CodecKind, SimResult, SimulationError, TimeSeries};

/// Encodes and decodes a [`TimeSeries`] payload.
pub trait TimeseriesCodec: Send + Sync {
    /// File extension used by the result store, without the dot.
    fn extension(&self) -> &'static str;

    fn encode(&self, ts: &TimeSeries) -> SimResult<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> SimResult<TimeSeries>;
}

/// Columnar binary codec (bincode).
pub struct BincodeCodec;

impl TimeseriesCodec for BincodeCodec {
    fn extension(&self) -> &'static str {
        "bin"
    }

    fn encode(&self, ts: &TimeSeries) -> SimResult<Vec<u8>> {
        bincode::serialize(ts).map_err(|e| SimulationError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> SimResult<TimeSeries> {
        bincode::deserialize(bytes).map_err(|e| SimulationError::Serialization(e.to_string()))
    }
}

/// Hierarchical text codec (JSON).
pub struct JsonCodec;

impl TimeseriesCodec for JsonCodec {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn encode(&self, ts: &TimeSeries) -> SimResult<Vec<u8>> {
        Ok(serde_json::to_vec(ts)?)
    }

    fn decode(&self, bytes: &[u8]) -> SimResult<TimeSeries> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Plain delimited-text codec: a header row naming the columns, then one
/// row per time point. Signal names containing the delimiter are rejected
/// at encode time rather than silently corrupting the table.
pub struct DelimitedCodec;

const DELIMITER: char = ',';

impl TimeseriesCodec for DelimitedCodec {
    fn extension(&self) -> &'static str {
        "csv"
    }

    fn encode(&self, ts: &TimeSeries) -> SimResult<Vec<u8>> {
        for signal in &ts.signals {
            if signal.name.contains(DELIMITER) || signal.name.contains('\n') {
                return Err(SimulationError::Serialization(format!(
                    "signal name {:?} is not representable in delimited text",
                    signal.name
                )));
            }
        }

        let mut out = String::new();
        out.push_str("time");
        for signal in &ts.signals {
            out.push(DELIMITER);
            out.push_str(&signal.name);
        }
        out.push('\n');

        for (i, t) in ts.time.iter().enumerate() {
            out.push_str(&format_float(*t));
            for signal in &ts.signals {
                out.push(DELIMITER);
                let v = signal.values.get(i).copied().ok_or_else(|| {
                    SimulationError::Serialization(format!(
                        "signal {:?} shorter than time axis",
                        signal.name
                    ))
                })?;
                out.push_str(&format_float(v));
            }
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> SimResult<TimeSeries> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| SimulationError::Serialization(e.to_string()))?;
        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or_else(|| SimulationError::Serialization("empty delimited payload".into()))?;
        let columns: Vec<&str> = header.split(DELIMITER).collect();
        if columns.first() != Some(&"time") {
            return Err(SimulationError::Serialization(
                "delimited payload missing time column".into(),
            ));
        }

        let mut time = Vec::new();
        let mut values: Vec<Vec<f64>> = vec![Vec::new(); columns.len() - 1];
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(DELIMITER).collect();
            if fields.len() != columns.len() {
                return Err(SimulationError::Serialization(format!(
                    "row has {} fields, expected {}",
                    fields.len(),
                    columns.len()
                )));
            }
            time.push(parse_float(fields[0])?);
            for (col, field) in fields[1..].iter().enumerate() {
                values[col].push(parse_float(field)?);
            }
        }

        let mut ts = TimeSeries::new(time);
        for (name, column) in columns[1..].iter().zip(values) {
            ts = ts.with_signal(*name, column);
        }
        Ok(ts)
    }
}

fn format_float(v: f64) -> String {
    // f64 Display round-trips exactly in Rust.
    format!("{v}")
}

fn parse_float(field: &str) -> SimResult<f64> {
    field
        .parse::<f64>()
        .map_err(|e| SimulationError::Serialization(format!("bad float {field:?}: {e}")))
}

/// Select the codec implementation for a configured kind.
pub fn codec_for(kind: CodecKind) -> Box<dyn TimeseriesCodec> {
    match kind {
        CodecKind::Bincode => Box::new(BincodeCodec),
        CodecKind::Json => Box::new(JsonCodec),
        CodecKind::Csv => Box::new(DelimitedCodec),
    }
}

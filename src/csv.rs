use serde::Serialize;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::dispatch::Invocation;
use crate::engine::EngineError;

/// Errors that can occur when reading invocation scripts or writing outcomes
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open '{path}': {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: u64, source: csv::Error },

    #[error("line {line}: missing operation name")]
    MissingOperation { line: u64 },

    #[error("invalid id '{value}' in list '{list}'")]
    InvalidId { list: String, value: String },

    #[error("failed to write outcome: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush outcomes: {0}")]
    Flush(#[from] io::Error),
}

#[derive(Debug, Serialize)]
struct OutcomeRow<'a> {
    op: &'a str,
    status: &'a str,
    result: String,
}

/// Read invocations from a header-less csv file, one `op,arg1,arg2,...` row
/// each. Rows may have any number of fields; `#` starts a comment line.
pub fn read_invocations(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Invocation, CsvError>>, CsvError> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })?;

    Ok(reader
        .into_records()
        .enumerate()
        .map(|(idx, result)| -> Result<Invocation, CsvError> {
            let fallback = idx as u64 + 1;
            let record = result.map_err(|source| CsvError::Parse {
                line: fallback,
                source,
            })?;
            let line = record.position().map_or(fallback, |pos| pos.line());
            let op = record.get(0).unwrap_or_default();
            if op.is_empty() {
                return Err(CsvError::MissingOperation { line });
            }
            Ok(Invocation::new(op, record.iter().skip(1)))
        }))
}

/// Parse a comma separated list of company ids, e.g. `1,2,3`.
pub fn parse_id_list(list: &str) -> Result<Vec<u64>, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(list.as_bytes());

    let mut record = csv::StringRecord::new();
    let found = reader
        .read_record(&mut record)
        .map_err(|source| CsvError::Parse { line: 1, source })?;
    if !found {
        return Err(CsvError::InvalidId {
            list: list.to_string(),
            value: String::new(),
        });
    }

    record
        .iter()
        .map(|value| {
            value.parse().map_err(|_| CsvError::InvalidId {
                list: list.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

/// Writes one `op,status,result` csv row per dispatched invocation
pub struct OutcomeWriter<W: io::Write> {
    writer: csv::Writer<W>,
}

impl<W: io::Write> OutcomeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(inner),
        }
    }

    pub fn write(
        &mut self,
        invocation: &Invocation,
        result: &Result<Vec<u8>, EngineError>,
    ) -> Result<(), CsvError> {
        let row = match result {
            Ok(bytes) => OutcomeRow {
                op: &invocation.op,
                status: "ok",
                result: String::from_utf8_lossy(bytes).into_owned(),
            },
            Err(e) => OutcomeRow {
                op: &invocation.op,
                status: "error",
                result: e.to_string(),
            },
        };
        self.writer.serialize(&row)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), CsvError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W, CsvError> {
        self.writer
            .into_inner()
            .map_err(|e| CsvError::Flush(io::Error::new(e.error().kind(), e.to_string())))
    }
}

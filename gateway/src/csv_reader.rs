//! Reads uploaded CSV files.
//!
//! Only the header is checked here: the first row must start with the
//! expected column names, extra trailing columns are allowed. Rows are not
//! validated; that is done per product when requests are built.

use thiserror::Error;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("file must be a .csv file")]
    InvalidExtension,

    #[error("file exceeds the maximum size of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("csv file is empty")]
    Empty,

    #[error("header template is not valid")]
    HeaderMismatch,

    #[error("csv file has no data rows")]
    NoDataRows,

    #[error("could not read csv: {0}")]
    Malformed(#[from] csv::Error),
}

/// Checks the name and size of an uploaded file before it is parsed.
pub fn check_upload(file_name: &str, size: usize, max_size: usize) -> Result<(), CsvError> {
    let is_csv = file_name
        .rsplit_once('.')
        .is_some_and(|(_, extension)| extension.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(CsvError::InvalidExtension);
    }
    if size > max_size {
        return Err(CsvError::TooLarge { limit: max_size });
    }
    Ok(())
}

/// Parses `data` and returns every row, header included.
///
/// Rows may have different lengths.
pub fn read_rows(data: &[u8], expected_header: &[&str]) -> Result<Vec<Vec<String>>, CsvError> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect::<Vec<_>>()))
        .collect::<Result<Vec<_>, _>>()?;

    let header = rows.first().ok_or(CsvError::Empty)?;
    let matches = expected_header
        .iter()
        .enumerate()
        .all(|(i, expected)| header.get(i).is_some_and(|cell| cell == expected));
    if !matches {
        return Err(CsvError::HeaderMismatch);
    }

    Ok(rows)
}

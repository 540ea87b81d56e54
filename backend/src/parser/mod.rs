//! CSV payload decoding with encoding and delimiter auto-detection.
//!
//! Turns raw resource bytes into a [`CsvTable`]: the header plus one
//! [`RawRow`] (ordered column → string mapping) per record. No IATI-specific
//! logic here; typing happens in [`crate::validation`].

use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;

/// One CSV record as read from the payload, keyed by header name.
pub type RawRow = IndexMap<String, String>;

/// CSV parsing error with context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvError {
    pub line: usize,
    pub column: Option<String>,
    pub value: Option<String>,
    pub message: String,
}

impl std::fmt::Display for CsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.column, &self.value) {
            (Some(col), Some(val)) => {
                write!(f, "Line {}, column '{}' (value '{}'): {}", self.line, col, val, self.message)
            }
            (Some(col), None) => {
                write!(f, "Line {}, column '{}': {}", self.line, col, self.message)
            }
            _ => {
                write!(f, "Line {}: {}", self.line, self.message)
            }
        }
    }
}

impl std::error::Error for CsvError {}

impl CsvError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            value: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// A data record together with the line it started on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsvRow {
    /// 1-based line number in the payload (header is line 1).
    pub line: usize,
    pub fields: RawRow,
}

/// A decoded CSV payload.
#[derive(Debug, Clone, Serialize)]
pub struct CsvTable {
    /// Column headers, in file order
    pub headers: Vec<String>,
    /// Data rows, in file order
    pub rows: Vec<CsvRow>,
    /// Detected or assumed encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

impl CsvTable {
    /// Build a table from rows that were already decoded by the host.
    ///
    /// Line numbers are assigned from 2 onwards, as if the rows followed a
    /// header line. Short records are padded with empty values.
    pub fn from_records<I, R, S>(headers: Vec<String>, records: I) -> Result<Self, CsvError>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        check_headers(&headers)?;

        let rows = records
            .into_iter()
            .enumerate()
            .map(|(idx, record)| {
                let mut values = record.into_iter().map(Into::into);
                let fields = headers
                    .iter()
                    .map(|h| (h.clone(), values.next().unwrap_or_default()))
                    .collect();
                CsvRow { line: idx + 2, fields }
            })
            .collect();

        Ok(Self {
            headers,
            rows,
            encoding: "utf-8".to_string(),
            delimiter: ',',
        })
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to string using the specified encoding.
///
/// A leading UTF-8 byte order mark is dropped.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        // UTF-8 and anything unrecognised: lossy UTF-8
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    match decoded.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV text with an explicit delimiter.
///
/// # Example
/// ```ignore
/// use iati_generator::parse_str;
///
/// let table = parse_str("iati_identifier,title\nAC-1,Water", ',').unwrap();
/// assert_eq!(table.rows[0].fields["title"], "Water");
/// assert_eq!(table.rows[0].line, 2);
/// ```
pub fn parse_str(content: &str, delimiter: char) -> Result<CsvTable, CsvError> {
    parse_with_metadata(content, delimiter, "utf-8".to_string(), usize::MAX)
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> Result<CsvTable, CsvError> {
    parse_bytes_auto_limited(bytes, usize::MAX)
}

/// Same as [`parse_bytes_auto`], reading at most `max_rows` data rows.
/// Records past the cap are neither parsed nor kept.
pub fn parse_bytes_auto_limited(bytes: &[u8], max_rows: usize) -> Result<CsvTable, CsvError> {
    let encoding = if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        "utf-8".to_string()
    } else {
        detect_encoding(bytes)
    };
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);

    parse_with_metadata(&content, delimiter, encoding, max_rows)
}

/// Parse a CSV file with auto-detection of encoding and delimiter.
pub fn parse_file_auto<P: AsRef<Path>>(path: P) -> Result<CsvTable, CsvError> {
    let bytes = std::fs::read(path.as_ref())
        .map_err(|e| CsvError::new(0, format!("Cannot read file '{}': {}", path.as_ref().display(), e)))?;

    parse_bytes_auto(&bytes)
}

fn parse_with_metadata(
    content: &str,
    delimiter: char,
    encoding: String,
    max_rows: usize,
) -> Result<CsvTable, CsvError> {
    if content.trim().is_empty() {
        return Err(CsvError::new(1, "Empty CSV file"));
    }
    if !delimiter.is_ascii() {
        return Err(CsvError::new(0, format!("Unsupported delimiter '{}'", delimiter)));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .has_headers(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CsvError::new(1, format!("Cannot read header: {}", e)))?
        .iter()
        .map(|h| h.trim().trim_matches('"').to_string())
        .collect();

    check_headers(&headers)?;

    let mut rows = Vec::new();

    for (idx, result) in reader.records().take(max_rows).enumerate() {
        let fallback_line = idx + 2;
        let record = result.map_err(|e| {
            let line = e
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(fallback_line);
            CsvError::new(line, format!("Cannot read record: {}", e))
        })?;

        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(fallback_line);

        let fields = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty())
            .map(|(i, h)| (h.clone(), record.get(i).unwrap_or("").to_string()))
            .collect();

        rows.push(CsvRow { line, fields });
    }

    Ok(CsvTable {
        headers,
        rows,
        encoding,
        delimiter,
    })
}

fn check_headers(headers: &[String]) -> Result<(), CsvError> {
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(CsvError::new(1, "No headers found"));
    }

    for (i, header) in headers.iter().enumerate() {
        if header.is_empty() {
            continue;
        }
        if headers[..i].contains(header) {
            return Err(CsvError::new(1, "Duplicate column").with_column(header.clone()));
        }
    }

    Ok(())
}

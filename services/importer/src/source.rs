//! Source Reader - loads the denormalized sales file into memory.
//!
//! The whole file is materialised as `Vec<Record>` because the pipeline makes
//! several passes over it (three dimension passes plus the fact pass).

use std::borrow::Cow;
use std::path::Path;

use csv::StringRecord;
use tracing::{info, warn};

use crate::error::SourceError;
use crate::model::{Record, REQUIRED_COLUMNS};

/// Read and parse the source file at `path`.
pub async fn read(path: &Path, delimiter: u8) -> Result<Vec<Record>, SourceError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), bytes = bytes.len(), "read source file");

    let content = decode(&bytes);
    parse(&content, delimiter)
}

/// Decode raw bytes, falling back to Windows-1252 for non UTF-8 input
/// (the public retail datasets are distributed in Latin-1).
fn decode(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            warn!("source is not valid UTF-8, decoding as Windows-1252");
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            text
        }
    }
}

/// Parse delimited text with a header row into records.
pub fn parse(content: &str, delimiter: u8) -> Result<Vec<Record>, SourceError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let columns = ColumnIndex::locate(&headers)?;

    let mut records = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let row = result?;
        // +2: 1-based and the header line
        let line = row
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(row_idx + 2);
        records.push(columns.record(&row, line));
    }

    info!(rows = records.len(), "parsed source rows");
    Ok(records)
}

/// Positions of the required columns within the header row.
#[derive(Debug)]
struct ColumnIndex([usize; REQUIRED_COLUMNS.len()]);

impl ColumnIndex {
    fn locate(headers: &StringRecord) -> Result<Self, SourceError> {
        let mut positions = [0usize; REQUIRED_COLUMNS.len()];
        let mut missing = Vec::new();

        for (slot, name) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
            match headers.iter().position(|h| h == name) {
                Some(idx) => *slot = idx,
                None => missing.push(name.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(SourceError::MissingColumns(missing));
        }
        Ok(Self(positions))
    }

    fn record(&self, row: &StringRecord, line: usize) -> Record {
        // Short rows yield empty fields; they fail later as skipped rows.
        let field = |slot: usize| row.get(self.0[slot]).unwrap_or("").to_string();
        Record {
            line,
            country: field(0),
            stock_code: field(1),
            description: field(2),
            customer_id: field(3),
            invoice_no: field(4),
            quantity: field(5),
            unit_price: field(6),
            total_amount: field(7),
            invoice_date: field(8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,\
                          UnitPrice,CustomerID,Country,TotalAmount";

    // -------------------------------------------------------------------------
    // PARSING
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_maps_columns_by_name() {
        let csv = format!(
            "{HEADER}\n536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,\
             2010-12-01 08:26:00,2.55,17850,United Kingdom,15.30\n"
        );
        let records = parse(&csv, b',').unwrap();

        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.invoice_no, "536365");
        assert_eq!(rec.stock_code, "85123A");
        assert_eq!(rec.quantity, "6");
        assert_eq!(rec.customer_id, "17850");
        assert_eq!(rec.country, "United Kingdom");
        assert_eq!(rec.total_amount, "15.30");
    }

    #[test]
    fn test_parse_preserves_source_order_and_lines() {
        let csv = format!(
            "{HEADER}\n\
             1,A1,x,1,2011-01-01,1,C1,UK,1\n\
             2,A2,y,2,2011-01-01,1,C2,UK,2\n\
             3,A3,z,3,2011-01-01,1,C3,FR,3\n"
        );
        let records = parse(&csv, b',').unwrap();

        let invoices: Vec<_> = records.iter().map(|r| r.invoice_no.as_str()).collect();
        assert_eq!(invoices, ["1", "2", "3"]);
        assert_eq!(records[0].line, 2);
        assert_eq!(records[2].line, 4);
    }

    #[test]
    fn test_parse_semicolon_delimiter() {
        let header = HEADER.replace(',', ";");
        let csv = format!("{header}\n1;A1;x;1;2011-01-01;1,5;C1;UK;1\n");
        let records = parse(&csv, b';').unwrap();
        assert_eq!(records[0].unit_price, "1,5");
    }

    #[test]
    fn test_parse_strips_bom_and_trims() {
        let csv = format!("\u{feff}{HEADER}\n  1 , A1 ,x,1,2011-01-01,1,C1,  UK  ,1\n");
        let records = parse(&csv, b',').unwrap();
        assert_eq!(records[0].invoice_no, "1");
        assert_eq!(records[0].country, "UK");
    }

    #[test]
    fn test_parse_short_row_yields_empty_fields() {
        let csv = format!("{HEADER}\n1,A1\n");
        let records = parse(&csv, b',').unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stock_code, "A1");
        assert_eq!(records[0].country, "");
    }

    #[test]
    fn test_parse_header_only() {
        let records = parse(HEADER, b',').unwrap();
        assert!(records.is_empty());
    }

    // -------------------------------------------------------------------------
    // FORMAT ERRORS
    // -------------------------------------------------------------------------

    #[test]
    fn test_missing_columns_fails() {
        let csv = "InvoiceNo,StockCode,Quantity\n1,A1,3\n";
        let err = parse(csv, b',').unwrap_err();
        match err {
            SourceError::MissingColumns(missing) => {
                assert!(missing.contains(&"Country".to_string()));
                assert!(missing.contains(&"TotalAmount".to_string()));
                assert!(!missing.contains(&"Quantity".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_input_reports_all_columns_missing() {
        match parse("", b',').unwrap_err() {
            SourceError::MissingColumns(missing) => assert_eq!(missing.len(), 9),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    // -------------------------------------------------------------------------
    // FILE ACCESS
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_read_missing_file_is_io_error() {
        let err = read(Path::new("/definitely/not/here.csv"), b',')
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[tokio::test]
    async fn test_read_latin1_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        // "CAFÉ" with É as a single Latin-1 byte
        file.write_all(b"1,A1,CAF\xC9,1,2011-01-01,1,C1,France,1\n")
            .unwrap();

        let records = read(file.path(), b',').await.unwrap();
        assert_eq!(records[0].description, "CAFÉ");
        assert_eq!(records[0].country, "France");
    }
}

//! Row parser and validator.
//!
//! Turns a CSV stream into validated [`SaleRecord`]s. Rows are isolated from
//! each other: a row that is missing a column or fails a conversion is
//! dropped and counted in a [`DropReport`], and the rest of the file carries
//! on. Only an I/O failure of the underlying reader stops a file.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use salesdash_core::schema::{
    COL_BENEFITS, COL_CATEGORY, COL_PRICE, COL_PRODUCT, COL_QUANTITY, COL_SHOP, COL_TIME_OF_SALE,
};
use salesdash_core::{SaleRecord, SaleSchema};

use crate::batch::IngestBatch;
use crate::error::IngestError;

/// One CSV row keyed by header name.
pub type RawRow = HashMap<String, String>;

/// How many dropped rows are kept verbatim in a [`DropReport`].
pub const MAX_DROP_SAMPLES: usize = 10;

// ── Rejections ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    MissingField,
    InvalidInteger,
    NegativeQuantity,
    InvalidDecimal,
    NegativePrice,
    InvalidTimestamp,
    MalformedLine,
}

/// Why a row did not become a [`SaleRecord`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowRejection {
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("'{field}' is not an integer: {value:?}")]
    InvalidInteger { field: &'static str, value: String },

    #[error("quantity is negative: {0}")]
    NegativeQuantity(i64),

    #[error("'{field}' is not a finite number: {value:?}")]
    InvalidDecimal { field: &'static str, value: String },

    #[error("price is negative: {0}")]
    NegativePrice(f64),

    #[error("unparseable time_of_sale: {0:?}")]
    InvalidTimestamp(String),

    #[error("malformed line: {0}")]
    MalformedLine(String),
}

impl RowRejection {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Self::MissingField(_) => RejectionKind::MissingField,
            Self::InvalidInteger { .. } => RejectionKind::InvalidInteger,
            Self::NegativeQuantity(_) => RejectionKind::NegativeQuantity,
            Self::InvalidDecimal { .. } => RejectionKind::InvalidDecimal,
            Self::NegativePrice(_) => RejectionKind::NegativePrice,
            Self::InvalidTimestamp(_) => RejectionKind::InvalidTimestamp,
            Self::MalformedLine(_) => RejectionKind::MalformedLine,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRow {
    pub line: u64,
    pub reason: String,
}

/// Dropped-row accounting for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DropReport {
    pub dropped: u64,
    pub by_kind: BTreeMap<RejectionKind, u64>,
    /// The first [`MAX_DROP_SAMPLES`] drops, in file order.
    pub samples: Vec<DroppedRow>,
}

impl DropReport {
    pub fn record(&mut self, line: u64, rejection: &RowRejection) {
        self.dropped += 1;
        *self.by_kind.entry(rejection.kind()).or_default() += 1;
        if self.samples.len() < MAX_DROP_SAMPLES {
            self.samples.push(DroppedRow {
                line,
                reason: rejection.to_string(),
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dropped == 0
    }
}

// ── Validation ──────────────────────────────────────────────────────

fn field<'a>(
    row: &'a RawRow,
    schema: SaleSchema,
    column: &'static str,
) -> Result<&'a str, RowRejection> {
    let present = std::iter::once(column)
        .chain(schema.aliases(column).iter().copied())
        .find_map(|name| row.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()));
    match present {
        Some(v) => Ok(v),
        None => schema
            .default_for(column)
            .ok_or(RowRejection::MissingField(column)),
    }
}

/// Validate one raw row against `schema`.
///
/// Presence of every column is checked before any conversion, so a row with
/// a missing column is always reported as [`RowRejection::MissingField`].
pub fn validate_row(row: &RawRow, schema: SaleSchema) -> Result<SaleRecord, RowRejection> {
    let shop = field(row, schema, COL_SHOP)?;
    let product = field(row, schema, COL_PRODUCT)?;
    let category = field(row, schema, COL_CATEGORY)?;
    let quantity = field(row, schema, COL_QUANTITY)?;
    let price = field(row, schema, COL_PRICE)?;
    let benefits = field(row, schema, COL_BENEFITS)?;
    let time_of_sale = field(row, schema, COL_TIME_OF_SALE)?;

    let quantity = parse_quantity(quantity)?;
    let price = parse_decimal(COL_PRICE, price)?;
    if price < 0.0 {
        return Err(RowRejection::NegativePrice(price));
    }
    let benefits = parse_decimal(COL_BENEFITS, benefits)?;
    let time_of_sale = parse_timestamp(time_of_sale)
        .ok_or_else(|| RowRejection::InvalidTimestamp(time_of_sale.to_string()))?;

    Ok(SaleRecord {
        shop: shop.to_string(),
        product: product.to_string(),
        category: category.to_string(),
        quantity,
        price,
        benefits,
        time_of_sale,
    })
}

fn parse_quantity(raw: &str) -> Result<i64, RowRejection> {
    let value: i64 = raw.parse().map_err(|_| RowRejection::InvalidInteger {
        field: COL_QUANTITY,
        value: raw.to_string(),
    })?;
    if value < 0 {
        return Err(RowRejection::NegativeQuantity(value));
    }
    Ok(value)
}

fn parse_decimal(field: &'static str, raw: &str) -> Result<f64, RowRejection> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RowRejection::InvalidDecimal {
            field,
            value: raw.to_string(),
        })
}

/// Parse a sale timestamp. Offsets are honoured; naive values are UTC.
///
/// Supports RFC 3339, `YYYY-MM-DDTHH:MM:SS[.f]`, `YYYY-MM-DD HH:MM:SS[.f]`
/// and a bare `YYYY-MM-DD` (midnight).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ── Streaming parser ────────────────────────────────────────────────

/// One data row and what became of it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    /// 1-based line in the source file (the header is line 1).
    pub line: u64,
    pub outcome: Result<SaleRecord, RowRejection>,
}

/// Lazy row-by-row validator over a CSV reader.
///
/// Yields `Err` only for I/O failures of the underlying reader; malformed
/// lines come back as rejected rows.
pub struct RowParser<R> {
    records: csv::StringRecordsIntoIter<R>,
    headers: Vec<String>,
    schema: SaleSchema,
    rows_seen: u64,
}

impl<R: io::Read> RowParser<R> {
    pub fn new(reader: R, schema: SaleSchema) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        Ok(Self {
            records: rdr.into_records(),
            headers,
            schema,
            rows_seen: 0,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn to_raw_row(&self, record: &csv::StringRecord) -> RawRow {
        self.headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect()
    }
}

impl<R: io::Read> Iterator for RowParser<R> {
    type Item = Result<ParsedRow, csv::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.records.next()?;
        self.rows_seen += 1;
        let fallback_line = self.rows_seen + 1;

        match next {
            Ok(record) => {
                let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);
                let outcome = validate_row(&self.to_raw_row(&record), self.schema);
                Some(Ok(ParsedRow { line, outcome }))
            }
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => Some(Err(e)),
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(fallback_line);
                Some(Ok(ParsedRow {
                    line,
                    outcome: Err(RowRejection::MalformedLine(e.to_string())),
                }))
            }
        }
    }
}

/// Everything one file yielded.
#[derive(Debug)]
pub struct ParsedFile {
    pub batch: IngestBatch,
    pub drops: DropReport,
    pub rows_read: u64,
}

/// Read `reader` to the end, collecting valid rows into a batch for `source`.
pub fn parse_reader<R: io::Read>(
    reader: R,
    source: &Path,
    schema: SaleSchema,
) -> Result<ParsedFile, IngestError> {
    let read_error = |e: csv::Error| IngestError::Read {
        path: source.to_path_buf(),
        message: e.to_string(),
    };

    let parser = RowParser::new(reader, schema).map_err(read_error)?;
    let mut batch = IngestBatch::new(source);
    let mut drops = DropReport::default();
    let mut rows_read = 0u64;

    for row in parser {
        let row = row.map_err(read_error)?;
        rows_read += 1;
        match row.outcome {
            Ok(record) => batch.push(record),
            Err(rejection) => drops.record(row.line, &rejection),
        }
    }

    Ok(ParsedFile {
        batch,
        drops,
        rows_read,
    })
}

/// Open and parse one watched file.
pub fn parse_file(path: &Path, schema: SaleSchema) -> Result<ParsedFile, IngestError> {
    let file = File::open(path).map_err(|e| IngestError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_reader(file, path, schema)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const HEADER: &str = "shop,product,category,quantity,price,benefits,time_of_sale";

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_row() -> RawRow {
        row(&[
            ("shop", "StoreA"),
            ("product", "Widget"),
            ("category", "Tools"),
            ("quantity", "5"),
            ("price", "9.99"),
            ("benefits", "2.50"),
            ("time_of_sale", "2024-01-01T10:00:00Z"),
        ])
    }

    #[test]
    fn test_valid_row() {
        let record = validate_row(&full_row(), SaleSchema::Sales).unwrap();
        assert_eq!(record.shop, "StoreA");
        assert_eq!(record.product, "Widget");
        assert_eq!(record.category, "Tools");
        assert_eq!(record.quantity, 5);
        assert_eq!(record.price, 9.99);
        assert_eq!(record.benefits, 2.5);
        assert_eq!(
            record.time_of_sale,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_any_missing_field_drops_row() {
        for &column in SaleSchema::Sales.required_columns() {
            let mut r = full_row();
            r.remove(column);
            assert_eq!(
                validate_row(&r, SaleSchema::Sales),
                Err(RowRejection::MissingField(column)),
                "column {column}"
            );

            let mut r = full_row();
            r.insert(column.to_string(), "   ".to_string());
            assert_eq!(
                validate_row(&r, SaleSchema::Sales),
                Err(RowRejection::MissingField(column)),
                "blank column {column}"
            );
        }
    }

    #[test]
    fn test_missing_field_wins_over_bad_values() {
        let mut r = full_row();
        r.insert("quantity".into(), "abc".into());
        r.insert("time_of_sale".into(), "yesterday".into());
        r.remove("shop");
        assert_eq!(
            validate_row(&r, SaleSchema::Sales),
            Err(RowRejection::MissingField("shop"))
        );
    }

    #[test]
    fn test_quantity_coercion() {
        let mut r = full_row();
        r.insert("quantity".into(), "12".into());
        assert_eq!(validate_row(&r, SaleSchema::Sales).unwrap().quantity, 12);

        r.insert("quantity".into(), "abc".into());
        assert!(matches!(
            validate_row(&r, SaleSchema::Sales),
            Err(RowRejection::InvalidInteger { field: "quantity", .. })
        ));

        r.insert("quantity".into(), "2.5".into());
        assert_eq!(validate_row(&r, SaleSchema::Sales).unwrap_err().kind(), RejectionKind::InvalidInteger);

        r.insert("quantity".into(), "12abc".into());
        assert_eq!(validate_row(&r, SaleSchema::Sales).unwrap_err().kind(), RejectionKind::InvalidInteger);

        r.insert("quantity".into(), "-1".into());
        assert_eq!(
            validate_row(&r, SaleSchema::Sales),
            Err(RowRejection::NegativeQuantity(-1))
        );
    }

    #[test]
    fn test_decimal_coercion() {
        let mut r = full_row();
        r.insert("price".into(), "NaN".into());
        assert_eq!(validate_row(&r, SaleSchema::Sales).unwrap_err().kind(), RejectionKind::InvalidDecimal);

        r.insert("price".into(), "inf".into());
        assert_eq!(validate_row(&r, SaleSchema::Sales).unwrap_err().kind(), RejectionKind::InvalidDecimal);

        r.insert("price".into(), "-0.01".into());
        assert_eq!(validate_row(&r, SaleSchema::Sales).unwrap_err().kind(), RejectionKind::NegativePrice);

        r.insert("price".into(), "0".into());
        r.insert("benefits".into(), "-3.25".into());
        let record = validate_row(&r, SaleSchema::Sales).unwrap();
        assert_eq!(record.price, 0.0);
        assert_eq!(record.benefits, -3.25);
    }

    #[test]
    fn test_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 10:00:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-01-01T10:00:00.250"),
            Some(expected + chrono::Duration::milliseconds(250))
        );
        assert_eq!(
            parse_timestamp("2024-01-01"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("01/02/2024"), None);
        assert_eq!(parse_timestamp("2024-13-01"), None);
    }

    #[test]
    fn test_product_data_schema_fills_defaults() {
        let mut r = full_row();
        r.remove("shop");
        r.remove("benefits");
        let record = validate_row(&r, SaleSchema::ProductData).unwrap();
        assert_eq!(record.shop, "unknown");
        assert_eq!(record.benefits, 0.0);
        assert!(validate_row(&r, SaleSchema::Sales).is_err());
    }

    #[test]
    fn test_product_data_reads_the_generator_feed() {
        let csv = "product,category,price,updatedAt\n\
                   Tea,Drinks,2.5,2024-01-01T10:00:00+00:00\n\
                   Scarf,Clothing,19.99,2024-01-01T11:30:00.123456+00:00\n\
                   Mug,Kitchen,,2024-01-01T12:00:00+00:00\n";
        let parsed = parse_reader(
            csv.as_bytes(),
            Path::new("data_20240101_100000.csv"),
            SaleSchema::ProductData,
        )
        .unwrap();

        assert_eq!(parsed.rows_read, 3);
        assert_eq!(parsed.batch.len(), 2);
        assert_eq!(parsed.drops.dropped, 1);
        assert_eq!(parsed.drops.by_kind[&RejectionKind::MissingField], 1);
        assert_eq!(parsed.drops.samples[0].line, 4);

        let tea = &parsed.batch.records()[0];
        assert_eq!(tea.shop, "unknown");
        assert_eq!(tea.product, "Tea");
        assert_eq!(tea.category, "Drinks");
        assert_eq!(tea.quantity, 1);
        assert_eq!(tea.price, 2.5);
        assert_eq!(tea.benefits, 0.0);
        assert_eq!(
            tea.time_of_sale,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_canonical_column_wins_over_alias() {
        let mut r = full_row();
        r.insert("updatedAt".into(), "2030-06-01T00:00:00Z".into());
        let record = validate_row(&r, SaleSchema::ProductData).unwrap();
        assert_eq!(
            record.time_of_sale,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(record.quantity, 5);

        r.remove("time_of_sale");
        assert_eq!(
            validate_row(&r, SaleSchema::Sales),
            Err(RowRejection::MissingField("time_of_sale"))
        );
    }

    #[test]
    fn test_parse_reader_collects_and_counts() {
        let csv = format!(
            "{HEADER}\n\
             StoreA,Widget,Tools,5,9.99,2.50,2024-01-01T10:00:00Z\n\
             StoreA,Gadget,Tools,1,,0.5,2024-01-01T11:00:00Z\n\
             StoreB,Bolt,Hardware,abc,1.00,0.1,2024-01-02\n\
             StoreB,Nut,Hardware,3,0.20,0.05,2024-01-02 08:30:00\n"
        );
        let parsed =
            parse_reader(csv.as_bytes(), Path::new("sales1.csv"), SaleSchema::Sales).unwrap();

        assert_eq!(parsed.rows_read, 4);
        assert_eq!(parsed.batch.len(), 2);
        assert_eq!(parsed.batch.records()[0].product, "Widget");
        assert_eq!(parsed.batch.records()[1].product, "Nut");

        assert_eq!(parsed.drops.dropped, 2);
        assert_eq!(parsed.drops.by_kind[&RejectionKind::MissingField], 1);
        assert_eq!(parsed.drops.by_kind[&RejectionKind::InvalidInteger], 1);
        assert_eq!(parsed.drops.samples[0].line, 3);
        assert_eq!(parsed.drops.samples[0].reason, "missing field 'price'");
        assert_eq!(parsed.drops.samples[1].line, 4);
    }

    #[test]
    fn test_parse_reader_tolerates_short_and_long_lines() {
        let csv = format!(
            "{HEADER}\n\
             StoreA,Widget,Tools\n\
             StoreA,Widget,Tools,5,9.99,2.50,2024-01-01T10:00:00Z,extra\n"
        );
        let parsed =
            parse_reader(csv.as_bytes(), Path::new("x.csv"), SaleSchema::Sales).unwrap();
        assert_eq!(parsed.batch.len(), 1);
        assert_eq!(parsed.drops.by_kind[&RejectionKind::MissingField], 1);
    }

    #[test]
    fn test_parse_reader_invalid_utf8_drops_row_only() {
        let mut bytes = format!("{HEADER}\n").into_bytes();
        bytes.extend_from_slice(b"Store\xff,Widget,Tools,5,9.99,2.50,2024-01-01\n");
        bytes.extend_from_slice(b"StoreA,Widget,Tools,5,9.99,2.50,2024-01-01\n");
        let parsed = parse_reader(&bytes[..], Path::new("x.csv"), SaleSchema::Sales).unwrap();
        assert_eq!(parsed.batch.len(), 1);
        assert_eq!(parsed.drops.by_kind[&RejectionKind::MalformedLine], 1);
    }

    #[test]
    fn test_header_is_trimmed_and_bom_stripped() {
        let csv = "\u{feff}shop, product ,category,quantity,price,benefits,time_of_sale\n\
                   StoreA,Widget,Tools,5,9.99,2.50,2024-01-01\n";
        let parser = RowParser::new(csv.as_bytes(), SaleSchema::Sales).unwrap();
        assert_eq!(parser.headers()[0], "shop");
        assert_eq!(parser.headers()[1], "product");
        let rows: Vec<ParsedRow> = parser.map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].outcome.is_ok());
    }

    #[test]
    fn test_empty_file_yields_empty_batch() {
        let parsed = parse_reader(&b""[..], Path::new("empty.csv"), SaleSchema::Sales).unwrap();
        assert!(parsed.batch.is_empty());
        assert_eq!(parsed.rows_read, 0);
        assert!(parsed.drops.is_empty());
    }

    #[test]
    fn test_drop_samples_are_capped() {
        let mut report = DropReport::default();
        for line in 0..(MAX_DROP_SAMPLES as u64 + 5) {
            report.record(line, &RowRejection::MissingField("shop"));
        }
        assert_eq!(report.dropped, MAX_DROP_SAMPLES as u64 + 5);
        assert_eq!(report.samples.len(), MAX_DROP_SAMPLES);
    }

    #[test]
    fn test_parse_file_missing_is_read_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = parse_file(&tmp.path().join("gone.csv"), SaleSchema::Sales).unwrap_err();
        assert!(matches!(err, IngestError::Read { .. }));
    }
}

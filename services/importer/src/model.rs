//! Source records, dimension keys and the coerced fact row.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::CoerceError;

/// Columns the source file must provide, in the order they are reported.
pub const REQUIRED_COLUMNS: [&str; 9] = [
    "Country",
    "StockCode",
    "Description",
    "CustomerID",
    "InvoiceNo",
    "Quantity",
    "UnitPrice",
    "TotalAmount",
    "InvoiceDate",
];

/// Accepted InvoiceDate layouts, tried in order.
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// One row of the source file, fields kept as raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// 1-based line in the source file (header is line 1)
    pub line: usize,
    pub country: String,
    pub stock_code: String,
    pub description: String,
    pub customer_id: String,
    pub invoice_no: String,
    pub quantity: String,
    pub unit_price: String,
    pub total_amount: String,
    pub invoice_date: String,
}

impl Record {
    /// Natural key of this record for the given dimension, trimmed.
    pub fn natural_key(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::Region => self.country.trim(),
            Dimension::Product => self.stock_code.trim(),
            Dimension::Customer => self.customer_id.trim(),
        }
    }
}

/// The three dimension tables a sale points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Region,
    Product,
    Customer,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Region, Dimension::Product, Dimension::Customer];

    pub fn table(self) -> &'static str {
        match self {
            Dimension::Region => "regions",
            Dimension::Product => "products",
            Dimension::Customer => "customers",
        }
    }

    pub fn id_column(self) -> &'static str {
        match self {
            Dimension::Region => "region_id",
            Dimension::Product => "product_id",
            Dimension::Customer => "customer_id",
        }
    }

    pub fn key_column(self) -> &'static str {
        match self {
            Dimension::Region => "country",
            Dimension::Product => "stock_code",
            Dimension::Customer => "customer_code",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A candidate dimension row: natural key plus optional payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionValue {
    pub key: String,
    /// Only products carry a description
    pub description: Option<String>,
}

impl DimensionValue {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Surrogate ids resolved for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeys {
    pub product_id: i32,
    pub customer_id: i32,
    pub region_id: i32,
}

/// A fully typed sale ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSale {
    pub invoice_no: String,
    pub product_id: i32,
    pub customer_id: i32,
    pub region_id: i32,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub invoice_date: NaiveDateTime,
}

impl NewSale {
    /// Coerce the text fields of `record` and attach the resolved keys.
    pub fn coerce(record: &Record, keys: ForeignKeys) -> Result<Self, CoerceError> {
        Ok(Self {
            invoice_no: record.invoice_no.trim().to_string(),
            product_id: keys.product_id,
            customer_id: keys.customer_id,
            region_id: keys.region_id,
            quantity: parse_quantity(&record.quantity)?,
            unit_price: parse_decimal("UnitPrice", &record.unit_price)?,
            total_amount: parse_decimal("TotalAmount", &record.total_amount)?,
            invoice_date: parse_invoice_date(&record.invoice_date)?,
        })
    }
}

/// Parse a quantity. Integral decimals such as "5.0" are accepted since
/// spreadsheet exports often write integers that way.
pub fn parse_quantity(raw: &str) -> Result<i32, CoerceError> {
    let value = raw.trim();
    if let Ok(quantity) = value.parse::<i32>() {
        return Ok(quantity);
    }

    Decimal::from_str(value)
        .ok()
        .filter(|d| d.fract().is_zero())
        .and_then(|d| d.to_i32())
        .ok_or_else(|| CoerceError::Integer {
            field: "Quantity",
            value: value.to_string(),
        })
}

pub fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, CoerceError> {
    let value = raw.trim();
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|_| CoerceError::Decimal {
            field,
            value: value.to_string(),
        })
}

pub fn parse_invoice_date(raw: &str) -> Result<NaiveDateTime, CoerceError> {
    let value = raw.trim();
    for format in DATE_TIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed);
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| CoerceError::Date(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use rust_decimal_macros::dec;

    fn record() -> Record {
        Record {
            line: 2,
            country: "United Kingdom".into(),
            stock_code: "85123A".into(),
            description: "WHITE HANGING HEART T-LIGHT HOLDER".into(),
            customer_id: "17850".into(),
            invoice_no: "536365".into(),
            quantity: "6".into(),
            unit_price: "2.55".into(),
            total_amount: "15.30".into(),
            invoice_date: "2010-12-01 08:26:00".into(),
        }
    }

    // -------------------------------------------------------------------------
    // QUANTITY
    // -------------------------------------------------------------------------

    #[test]
    fn test_quantity_integer() {
        assert_eq!(parse_quantity("10"), Ok(10));
    }

    #[test]
    fn test_quantity_negative_is_accepted() {
        assert_eq!(parse_quantity("-1"), Ok(-1));
    }

    #[test]
    fn test_quantity_integral_decimal() {
        assert_eq!(parse_quantity(" 5.0 "), Ok(5));
    }

    #[test]
    fn test_quantity_fractional_rejected() {
        assert!(matches!(
            parse_quantity("2.5"),
            Err(CoerceError::Integer { field: "Quantity", .. })
        ));
    }

    #[test]
    fn test_quantity_non_numeric_rejected() {
        assert_eq!(
            parse_quantity("ten"),
            Err(CoerceError::Integer {
                field: "Quantity",
                value: "ten".into()
            })
        );
    }

    // -------------------------------------------------------------------------
    // DECIMALS
    // -------------------------------------------------------------------------

    #[test]
    fn test_decimal_unit_price() {
        assert_eq!(parse_decimal("UnitPrice", "2.55"), Ok(dec!(2.55)));
    }

    #[test]
    fn test_decimal_scientific() {
        assert_eq!(parse_decimal("UnitPrice", "1e-3"), Ok(dec!(0.001)));
    }

    #[test]
    fn test_decimal_garbage_names_field() {
        let err = parse_decimal("TotalAmount", "n/a").unwrap_err();
        assert!(err.to_string().contains("TotalAmount"));
    }

    // -------------------------------------------------------------------------
    // DATES
    // -------------------------------------------------------------------------

    #[test]
    fn test_date_iso_with_seconds() {
        let parsed = parse_invoice_date("2010-12-01 08:26:00").unwrap();
        assert_eq!((parsed.year(), parsed.month(), parsed.day()), (2010, 12, 1));
        assert_eq!((parsed.hour(), parsed.minute()), (8, 26));
    }

    #[test]
    fn test_date_us_layout() {
        let parsed = parse_invoice_date("12/9/2011 12:50").unwrap();
        assert_eq!((parsed.year(), parsed.month(), parsed.day()), (2011, 12, 9));
        assert_eq!(parsed.hour(), 12);
    }

    #[test]
    fn test_date_only() {
        let parsed = parse_invoice_date("2011-01-04").unwrap();
        assert_eq!(parsed.hour(), 0);
        assert_eq!(parsed.day(), 4);
    }

    #[test]
    fn test_date_invalid() {
        assert_eq!(
            parse_invoice_date("yesterday"),
            Err(CoerceError::Date("yesterday".into()))
        );
    }

    // -------------------------------------------------------------------------
    // RECORDS
    // -------------------------------------------------------------------------

    #[test]
    fn test_natural_keys_are_trimmed() {
        let mut rec = record();
        rec.country = "  France ".into();
        assert_eq!(rec.natural_key(Dimension::Region), "France");
        assert_eq!(rec.natural_key(Dimension::Product), "85123A");
        assert_eq!(rec.natural_key(Dimension::Customer), "17850");
    }

    #[test]
    fn test_coerce_full_record() {
        let keys = ForeignKeys {
            product_id: 7,
            customer_id: 3,
            region_id: 1,
        };
        let sale = NewSale::coerce(&record(), keys).unwrap();
        assert_eq!(sale.invoice_no, "536365");
        assert_eq!(sale.quantity, 6);
        assert_eq!(sale.unit_price, dec!(2.55));
        assert_eq!(sale.total_amount, dec!(15.30));
        assert_eq!(sale.product_id, 7);
        assert_eq!(sale.customer_id, 3);
        assert_eq!(sale.region_id, 1);
    }

    #[test]
    fn test_dimension_columns() {
        assert_eq!(Dimension::Customer.key_column(), "customer_code");
        assert_eq!(Dimension::Product.id_column(), "product_id");
        assert_eq!(Dimension::Region.to_string(), "regions");
    }
}

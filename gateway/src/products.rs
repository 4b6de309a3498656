//! The products the gateway can dispatch and the requests sent to them.

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::LazyLock;
use upstream::ProductRoute;

/// `None` only if the pattern fails to compile, which a unit test rules out.
static PHONE_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\+62|62|0)8[1-9][0-9]{6,11}$").ok());

/// A request field shared by several products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Nik,
    PhoneNumber,
    Npwp,
    NpwpOrNik,
    LoanNo,
}

impl Field {
    /// Key of the field in product request bodies.
    pub fn key(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Nik => "nik",
            Field::PhoneNumber => "phone_number",
            Field::Npwp => "npwp",
            Field::NpwpOrNik => "npwp_or_nik",
            Field::LoanNo => "loan_no",
        }
    }

    pub fn validate(self, value: &str) -> Result<(), String> {
        let key = self.key();
        if value.is_empty() {
            return Err(format!("{key} is required"));
        }

        let valid = match self {
            Field::Name | Field::LoanNo => true,
            Field::Nik => is_digits(value, &[16]),
            Field::Npwp | Field::NpwpOrNik => is_digits(value, &[15, 16]),
            Field::PhoneNumber => PHONE_NUMBER
                .as_ref()
                .is_some_and(|pattern| pattern.is_match(value)),
        };
        if valid {
            return Ok(());
        }

        Err(match self {
            Field::Nik => format!("{key} must be 16 digits"),
            Field::Npwp | Field::NpwpOrNik => format!("{key} must be 15 or 16 digits"),
            _ => format!("{key} is not valid"),
        })
    }
}

fn is_digits(value: &str, lengths: &[usize]) -> bool {
    lengths.contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Product {
    PhoneLiveStatus,
    NpwpVerification,
    LoanRecordChecker,
    MultipleLoan7Days,
    MultipleLoan30Days,
    MultipleLoan90Days,
    TaxCompliance,
    TaxScore,
    TaxVerification,
    GenRetailV3,
}

impl Product {
    pub const ALL: [Product; 10] = [
        Product::PhoneLiveStatus,
        Product::NpwpVerification,
        Product::LoanRecordChecker,
        Product::MultipleLoan7Days,
        Product::MultipleLoan30Days,
        Product::MultipleLoan90Days,
        Product::TaxCompliance,
        Product::TaxScore,
        Product::TaxVerification,
        Product::GenRetailV3,
    ];

    pub fn from_slug(slug: &str) -> Option<Product> {
        Product::ALL.into_iter().find(|p| p.slug() == slug)
    }

    pub fn slug(self) -> &'static str {
        match self {
            Product::PhoneLiveStatus => "IDENTITY_phone_live_status",
            Product::NpwpVerification => "IDENTITY_npwp_verification",
            Product::LoanRecordChecker => "COMPLIANCE_loan_record_checker",
            Product::MultipleLoan7Days => "COMPLIANCE_7d_multiple_loan",
            Product::MultipleLoan30Days => "COMPLIANCE_30d_multiple_loan",
            Product::MultipleLoan90Days => "COMPLIANCE_90d_multiple_loan",
            Product::TaxCompliance => "INCOMETAX_tax_compliance_status",
            Product::TaxScore => "INCOMETAX_tax_score",
            Product::TaxVerification => "INCOMETAX_tax_verification_detail",
            Product::GenRetailV3 => "GEN_RETAIL_v3",
        }
    }

    /// Leading columns an uploaded CSV must have.
    pub fn csv_header(self) -> &'static [&'static str] {
        match self {
            Product::PhoneLiveStatus => &["Phone Number"],
            Product::NpwpVerification | Product::TaxCompliance | Product::TaxScore => &["NPWP"],
            Product::LoanRecordChecker => &["Name", "NIK", "Phone Number"],
            Product::MultipleLoan7Days
            | Product::MultipleLoan30Days
            | Product::MultipleLoan90Days => &["NIK", "Phone Number"],
            Product::TaxVerification => &["NPWP/NIK"],
            Product::GenRetailV3 => &["loan_no", "name", "nik", "phone_number"],
        }
    }

    /// Request fields, in CSV column order.
    pub fn fields(self) -> &'static [Field] {
        match self {
            Product::PhoneLiveStatus => &[Field::PhoneNumber],
            Product::NpwpVerification | Product::TaxCompliance | Product::TaxScore => {
                &[Field::Npwp]
            }
            Product::LoanRecordChecker => &[Field::Name, Field::Nik, Field::PhoneNumber],
            Product::MultipleLoan7Days
            | Product::MultipleLoan30Days
            | Product::MultipleLoan90Days => &[Field::Nik, Field::PhoneNumber],
            Product::TaxVerification => &[Field::NpwpOrNik],
            Product::GenRetailV3 => &[Field::LoanNo, Field::Name, Field::Nik, Field::PhoneNumber],
        }
    }

    pub fn route(self) -> ProductRoute {
        match self {
            Product::PhoneLiveStatus => ProductRoute::Catalog("/product/identity/phone-live-status"),
            Product::NpwpVerification => {
                ProductRoute::Catalog("/product/identity/npwp-verification")
            }
            Product::LoanRecordChecker => {
                ProductRoute::Catalog("/product/compliance/loan-record-checker")
            }
            Product::MultipleLoan7Days => {
                ProductRoute::Catalog("/product/compliance/multiple-loan/7-days")
            }
            Product::MultipleLoan30Days => {
                ProductRoute::Catalog("/product/compliance/multiple-loan/30-days")
            }
            Product::MultipleLoan90Days => {
                ProductRoute::Catalog("/product/compliance/multiple-loan/90-days")
            }
            Product::TaxCompliance => {
                ProductRoute::Catalog("/product/incometax/tax-compliance-status")
            }
            Product::TaxScore => ProductRoute::Catalog("/product/incometax/tax-score"),
            Product::TaxVerification => {
                ProductRoute::Catalog("/product/incometax/tax-verification-detail")
            }
            Product::GenRetailV3 => ProductRoute::Scoring("/api/score/genretail/v3"),
        }
    }

    /// Prefix of transaction ids generated by the gateway for this product.
    pub fn transaction_prefix(self) -> &'static str {
        match self {
            Product::PhoneLiveStatus => "PLS",
            Product::NpwpVerification => "NPV",
            Product::LoanRecordChecker => "LRC",
            Product::MultipleLoan7Days => "ML7",
            Product::MultipleLoan30Days => "ML30",
            Product::MultipleLoan90Days => "ML90",
            Product::TaxCompliance => "TCS",
            Product::TaxScore => "TSC",
            Product::TaxVerification => "TVD",
            Product::GenRetailV3 => "GRV3",
        }
    }

    /// Scoring products need the tenant's grade configuration.
    pub fn requires_grading(self) -> bool {
        matches!(self, Product::GenRetailV3)
    }

    /// The scoring service does not write transaction logs, so the gateway
    /// writes the success log itself.
    pub fn logs_own_success(self) -> bool {
        matches!(self.route(), ProductRoute::Scoring(_))
    }

    /// Builds a request from one CSV data row. Missing cells become empty
    /// values and fail validation.
    pub fn request_from_row(self, row: &[String]) -> ProductRequest {
        let fields = self
            .fields()
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let value = row.get(i).map(|cell| cell.trim()).unwrap_or_default();
                (field.key(), value.to_string())
            })
            .collect();
        ProductRequest {
            product: self,
            fields,
        }
    }

    /// Builds a request from a JSON object keyed by field name.
    pub fn request_from_json(self, body: &JsonValue) -> ProductRequest {
        let fields = self
            .fields()
            .iter()
            .map(|field| {
                let value = match body.get(field.key()) {
                    Some(JsonValue::String(s)) => s.trim().to_string(),
                    Some(JsonValue::Number(n)) => n.to_string(),
                    _ => String::new(),
                };
                (field.key(), value)
            })
            .collect();
        ProductRequest {
            product: self,
            fields,
        }
    }
}

/// A typed request to one product, with field values already trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRequest {
    pub product: Product,
    pub fields: IndexMap<&'static str, String>,
}

impl ProductRequest {
    /// Returns the first failing field rule.
    pub fn validate(&self) -> Result<(), String> {
        for field in self.product.fields() {
            let value = self.fields.get(field.key()).map(String::as_str).unwrap_or("");
            field.validate(value)?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.fields
                .iter()
                .map(|(key, value)| (key.to_string(), JsonValue::String(value.clone())))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn phone_number_pattern() {
        assert!(PHONE_NUMBER.is_some());
        for valid in ["081234567890", "6281234567", "+628123456789012"] {
            assert_eq!(Field::PhoneNumber.validate(valid), Ok(()), "{valid}");
        }
        for invalid in ["0801234567", "08123", "+6281234567890123", "0812345678a"] {
            assert!(Field::PhoneNumber.validate(invalid).is_err(), "{invalid}");
        }
    }

    #[test]
    fn slugs_round_trip() {
        for product in Product::ALL {
            assert_eq!(Product::from_slug(product.slug()), Some(product));
            assert_eq!(product.csv_header().len(), product.fields().len());
        }
        assert_eq!(Product::from_slug("IDENTITY_unknown"), None);
    }

    #[test]
    fn routes() {
        assert_eq!(
            Product::MultipleLoan30Days.route(),
            ProductRoute::Catalog("/product/compliance/multiple-loan/30-days")
        );
        assert_eq!(
            Product::GenRetailV3.route(),
            ProductRoute::Scoring("/api/score/genretail/v3")
        );
        assert!(Product::GenRetailV3.logs_own_success());
        assert!(!Product::TaxScore.logs_own_success());
        assert!(Product::GenRetailV3.requires_grading());
    }

    #[test]
    fn request_from_row_trims_and_orders() {
        let request =
            Product::LoanRecordChecker.request_from_row(&row(&[" john ", "1234567890123456", "081234567890"]));
        assert!(request.validate().is_ok());
        assert_eq!(
            request.to_json(),
            json!({"name": "john", "nik": "1234567890123456", "phone_number": "081234567890"})
        );
        let keys: Vec<_> = request.fields.keys().copied().collect();
        assert_eq!(keys, vec!["name", "nik", "phone_number"]);
    }

    #[test]
    fn invalid_rows() {
        let request = Product::LoanRecordChecker.request_from_row(&row(&["bad", "abc", "123"]));
        assert_eq!(request.validate().unwrap_err(), "nik must be 16 digits");

        let request = Product::MultipleLoan7Days.request_from_row(&row(&["1234567890123456"]));
        assert_eq!(request.validate().unwrap_err(), "phone_number is required");

        let request = Product::TaxScore.request_from_row(&row(&["01234567890123"]));
        assert_eq!(
            request.validate().unwrap_err(),
            "npwp must be 15 or 16 digits"
        );

        let request = Product::PhoneLiveStatus.request_from_row(&row(&["0712345678"]));
        assert_eq!(
            request.validate().unwrap_err(),
            "phone_number is not valid"
        );
    }

    #[test]
    fn field_rules() {
        assert!(Field::PhoneNumber.validate("081234567890").is_ok());
        assert!(Field::PhoneNumber.validate("+6281234567890").is_ok());
        assert!(Field::PhoneNumber.validate("6281234567").is_ok());
        assert!(Field::PhoneNumber.validate("080234567890").is_err());
        assert!(Field::PhoneNumber.validate("0812345").is_err());
        assert!(Field::Npwp.validate("012345678901234").is_ok());
        assert!(Field::NpwpOrNik.validate("1234567890123456").is_ok());
        assert!(Field::NpwpOrNik.validate("12345678901234567").is_err());
        assert!(Field::Nik.validate("123456789012345a").is_err());
        assert!(Field::LoanNo.validate("L-1").is_ok());
        assert!(Field::Name.validate("").is_err());
    }

    #[test]
    fn request_from_json() {
        let request = Product::GenRetailV3.request_from_json(&json!({
            "loan_no": "L1",
            "name": "Budi",
            "nik": 1234567890123456u64,
            "phone_number": "081234567890",
            "ignored": true
        }));
        assert!(request.validate().is_ok());
        assert_eq!(request.fields["nik"], "1234567890123456");
        assert!(request.to_json().get("ignored").is_none());
    }
}

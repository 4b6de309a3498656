//! CSV export of job results.
//!
//! Each product has its own column layout. Input columns come either from the
//! raw request or, for masked exports, from the masked snapshot the core
//! service keeps next to it. A masked export never falls back to raw input.

use crate::auth::AuthContext;
use crate::errors::ApiError;
use crate::products::Product;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::io;
use std::sync::Arc;
use upstream::CoreApi;
use upstream::types::{DetailData, DetailInput, JobDetail, JobDetailFilter, JobSummaryFilter};

/// Page size the core service reads as "everything".
const UNLIMITED: i64 = -1;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    Job(u64),
    DateRange { start_date: String, end_date: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub product: Product,
    pub target: ExportTarget,
    pub masked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub filename: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Name,
    Nik,
    Phone,
    Npwp,
    NpwpOrNik,
    LoanNo,
    DataName,
    Address,
    Remarks,
    DataStatus,
    QueryCount,
    Score,
    NpwpVerification,
    TaxCompliance,
    SubscriberStatus,
    DeviceStatus,
    Operator,
    PhoneType,
    Probability,
    Grade,
    DateCreated,
    Status,
    Description,
}

struct Layout {
    base_name: &'static str,
    columns: &'static [(&'static str, Column)],
}

fn layout(product: Product) -> Option<Layout> {
    use Column::*;

    let layout = match product {
        Product::LoanRecordChecker => Layout {
            base_name: "loan_record_checker",
            columns: &[
                ("Name", Name),
                ("NIK", Nik),
                ("Phone", Phone),
                ("Remarks", Remarks),
                ("Data Status", DataStatus),
                ("Status", Status),
                ("Description", Description),
            ],
        },
        Product::MultipleLoan7Days | Product::MultipleLoan30Days | Product::MultipleLoan90Days => {
            Layout {
                base_name: match product {
                    Product::MultipleLoan7Days => "multiple_loan_7_days",
                    Product::MultipleLoan30Days => "multiple_loan_30_days",
                    _ => "multiple_loan_90_days",
                },
                columns: &[
                    ("NIK", Nik),
                    ("Phone", Phone),
                    ("Query Count", QueryCount),
                    ("Status", Status),
                    ("Description", Description),
                ],
            }
        }
        Product::TaxCompliance => Layout {
            base_name: "tax_compliance_status",
            columns: &[
                ("NPWP", Npwp),
                ("Name", DataName),
                ("Address", Address),
                ("Data Status", DataStatus),
                ("Status", Status),
                ("Description", Description),
            ],
        },
        Product::TaxScore => Layout {
            base_name: "tax_score",
            columns: &[
                ("NPWP", Npwp),
                ("Name", DataName),
                ("Address", Address),
                ("Data Status", DataStatus),
                ("Score", Score),
                ("Status", Status),
                ("Description", Description),
            ],
        },
        Product::TaxVerification => Layout {
            base_name: "tax_verification_detail",
            columns: &[
                ("Name", DataName),
                ("Address", Address),
                ("NPWP/NIK", NpwpOrNik),
                ("NPWP Verification", NpwpVerification),
                ("Data Status", DataStatus),
                ("Tax Compliance", TaxCompliance),
                ("Status", Status),
                ("Description", Description),
            ],
        },
        Product::PhoneLiveStatus => Layout {
            base_name: "phone_live_status",
            columns: &[
                ("Phone Number", Phone),
                ("Subscriber Status", SubscriberStatus),
                ("Device Status", DeviceStatus),
                ("Operator", Operator),
                ("Phone Type", PhoneType),
                ("Status", Status),
                ("Description", Description),
            ],
        },
        Product::GenRetailV3 => Layout {
            base_name: "gen_retail_v3",
            columns: &[
                ("Date Created", DateCreated),
                ("Name", Name),
                ("Loan Id", LoanNo),
                ("NIK", Nik),
                ("Phone", Phone),
                ("Probability", Probability),
                ("Grade", Grade),
                ("Description", Description),
            ],
        },
        Product::NpwpVerification => return None,
    };
    Some(layout)
}

/// Header row of an export, `None` for products without an export layout.
pub fn header(product: Product, with_date: bool) -> Option<Vec<&'static str>> {
    let layout = layout(product)?;
    let mut header = Vec::with_capacity(layout.columns.len() + 1);
    if with_date {
        header.push("Date");
    }
    header.extend(layout.columns.iter().map(|(name, _)| *name));
    Some(header)
}

/// `{base}_id_{job}.csv` for job exports, `{base}_{start}.csv` or
/// `{base}_{start}_until_{end}.csv` for date ranges.
pub fn filename(product: Product, target: &ExportTarget) -> Option<String> {
    let base = layout(product)?.base_name;
    Some(match target {
        ExportTarget::Job(job_id) => format!("{base}_id_{job_id}.csv"),
        ExportTarget::DateRange {
            start_date,
            end_date,
        } if start_date == end_date => format!("{base}_{start_date}.csv"),
        ExportTarget::DateRange {
            start_date,
            end_date,
        } => format!("{base}_{start_date}_until_{end_date}.csv"),
    })
}

/// Writes the export of `rows` to `writer` and flushes it.
pub fn write_csv<W: io::Write>(
    writer: W,
    product: Product,
    rows: &[JobDetail],
    masked: bool,
    with_date: bool,
) -> Result<(), ApiError> {
    let layout = layout(product).ok_or_else(unsupported)?;
    let mut writer = csv::Writer::from_writer(writer);

    let header = header(product, with_date).ok_or_else(unsupported)?;
    writer.write_record(&header).map_err(write_failed)?;

    for row in rows {
        let input = if masked {
            row.ref_trans_product_catalog
                .as_ref()
                .map(|snapshot| &snapshot.input)
        } else {
            Some(&row.input)
        };
        let data = row.data.as_ref();

        let mut record = Vec::with_capacity(layout.columns.len() + 1);
        if with_date {
            record.push(format_date(row.created_at));
        }
        for (_, column) in layout.columns {
            record.push(cell(*column, row, input, data));
        }
        writer.write_record(&record).map_err(write_failed)?;
    }

    writer
        .flush()
        .map_err(|e| ApiError::Internal(format!("could not write export: {e}")))
}

fn cell(
    column: Column,
    row: &JobDetail,
    input: Option<&DetailInput>,
    data: Option<&DetailData>,
) -> String {
    let input_field = |f: fn(&DetailInput) -> &Option<String>| {
        input.and_then(|i| f(i).clone()).unwrap_or_default()
    };
    let data_field = |f: fn(&DetailData) -> &Option<String>| {
        data.and_then(|d| f(d).clone()).unwrap_or_default()
    };
    let data_value = |f: fn(&DetailData) -> &Option<JsonValue>| {
        data.and_then(|d| f(d).as_ref()).map(json_cell).unwrap_or_default()
    };

    match column {
        Column::Name => input_field(|i| &i.name),
        Column::Nik => input_field(|i| &i.nik),
        Column::Phone => input_field(|i| &i.phone_number),
        Column::Npwp => input_field(|i| &i.npwp),
        Column::NpwpOrNik => input_field(|i| &i.npwp_or_nik),
        Column::LoanNo => input_field(|i| &i.loan_no),
        Column::DataName => data_field(|d| &d.name),
        Column::Address => data_field(|d| &d.address),
        Column::Remarks => data_field(|d| &d.remarks),
        Column::DataStatus => data_field(|d| &d.status),
        Column::QueryCount => data_value(|d| &d.query_count),
        Column::Score => data_value(|d| &d.score),
        Column::NpwpVerification => data_field(|d| &d.npwp_verification),
        Column::TaxCompliance => data_field(|d| &d.tax_compliance),
        Column::SubscriberStatus => live_status(data).0,
        Column::DeviceStatus => live_status(data).1,
        Column::Operator => data_field(|d| &d.operator),
        Column::PhoneType => data_field(|d| &d.phone_type),
        Column::Probability => data_value(|d| &d.probability_to_default),
        Column::Grade => data_field(|d| &d.grade),
        Column::DateCreated => format_date(row.created_at),
        Column::Status => row.status.clone(),
        Column::Description => row.message.clone().unwrap_or_default(),
    }
}

/// Splits `"subscriber, device"` into its two parts.
fn live_status(data: Option<&DetailData>) -> (String, String) {
    let Some(status) = data.and_then(|d| d.live_status.as_deref()) else {
        return (String::new(), String::new());
    };
    match status.split_once(',') {
        Some((subscriber, device)) => (subscriber.trim().to_string(), device.trim().to_string()),
        None => (status.trim().to_string(), String::new()),
    }
}

fn json_cell(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

fn unsupported() -> ApiError {
    ApiError::BadRequest("unsupported product".to_string())
}

fn write_failed(e: csv::Error) -> ApiError {
    ApiError::Internal(format!("could not write export: {e}"))
}

pub struct Exporter {
    core: Arc<dyn CoreApi>,
}

impl Exporter {
    pub fn new(core: Arc<dyn CoreApi>) -> Self {
        Exporter { core }
    }

    pub async fn export(
        &self,
        auth: &AuthContext,
        request: &ExportRequest,
    ) -> Result<CsvExport, ApiError> {
        let product = request.product;
        let filename = filename(product, &request.target).ok_or_else(unsupported)?;
        let scope = auth.scope();

        let (rows, with_date) = match &request.target {
            ExportTarget::Job(job_id) => {
                let filter = JobDetailFilter {
                    size: Some(UNLIMITED),
                    ..Default::default()
                };
                let envelope = self
                    .core
                    .job_details(&scope, product.slug(), *job_id, &filter)
                    .await?;
                (envelope.data.unwrap_or_default(), false)
            }
            ExportTarget::DateRange {
                start_date,
                end_date,
            } => {
                let filter = JobSummaryFilter {
                    start_date: start_date.clone(),
                    end_date: end_date.clone(),
                    size: Some(UNLIMITED),
                };
                let envelope = self
                    .core
                    .jobs_summary(&scope, product.slug(), &filter)
                    .await?;
                (envelope.data.unwrap_or_default(), true)
            }
        };

        let mut body = Vec::new();
        write_csv(&mut body, product, &rows, request.masked, with_date)?;
        tracing::debug!(
            product = product.slug(),
            rows = rows.len(),
            masked = request.masked,
            "export written"
        );

        Ok(CsvExport { filename, body })
    }
}

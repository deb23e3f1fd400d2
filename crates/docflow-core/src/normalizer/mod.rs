//! Strict JSON normalizer for model output.
//!
//! Every decision point in the pipeline consumes canonical bytes produced
//! here, never raw model output. The raw text is checked against the
//! allowed/required key set of the target document type, strictly decoded into
//! the typed payload, and re-serialized in the canonical field order.
//!
//! Confidence is passed through exactly as the model emitted it; the range
//! rule in the validator is what catches out-of-range values.

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::types::{DocType, InvoiceFields, PayslipFields};

// Sorted, so error messages list the allowed set deterministically.
const PAYSLIP_ALLOWED_KEYS: &[&str] = &[
    "confidence",
    "employee_name",
    "employer_name",
    "gross_pay",
    "net_pay",
    "pay_period_end",
    "pay_period_start",
    "superannuation",
    "tax_withheld",
];

const PAYSLIP_REQUIRED_KEYS: &[&str] = &[
    "employee_name",
    "employer_name",
    "pay_period_start",
    "pay_period_end",
    "gross_pay",
    "net_pay",
    "tax_withheld",
    "confidence",
];

const INVOICE_ALLOWED_KEYS: &[&str] = &[
    "confidence",
    "due_date",
    "gst_amount",
    "invoice_date",
    "invoice_number",
    "supplier_name",
    "total_amount",
];

const INVOICE_REQUIRED_KEYS: &[&str] = &[
    "supplier_name",
    "invoice_number",
    "invoice_date",
    "total_amount",
    "confidence",
];

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("empty model output")]
    EmptyOutput,

    #[error("unknown key {key:?}, allowed: {allowed:?}")]
    UnknownKey {
        key: String,
        allowed: Vec<&'static str>,
    },

    #[error("missing required key {0:?}")]
    MissingKey(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("unexpected trailing data after JSON value")]
    TrailingData,

    #[error("invalid JSON: {0}")]
    Malformed(String),

    #[error("unsupported doc type {0:?}")]
    UnsupportedDocType(DocType),
}

/// Decode and type-check raw model output against the schema of `doc_type`,
/// returning canonical bytes and the payload's confidence.
pub fn normalize(doc_type: DocType, raw: &str) -> Result<(Vec<u8>, f64), NormalizeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::EmptyOutput);
    }

    match doc_type {
        DocType::Payslip => {
            check_keys(trimmed, PAYSLIP_ALLOWED_KEYS, PAYSLIP_REQUIRED_KEYS)?;
            let fields: PayslipFields = strict_decode(trimmed)?;
            let confidence = fields.confidence;
            let canonical = serde_json::to_vec(&fields)
                .map_err(|e| NormalizeError::Malformed(e.to_string()))?;
            Ok((canonical, confidence))
        }
        DocType::Invoice => {
            check_keys(trimmed, INVOICE_ALLOWED_KEYS, INVOICE_REQUIRED_KEYS)?;
            let fields: InvoiceFields = strict_decode(trimmed)?;
            let confidence = fields.confidence;
            let canonical = serde_json::to_vec(&fields)
                .map_err(|e| NormalizeError::Malformed(e.to_string()))?;
            Ok((canonical, confidence))
        }
        DocType::Unknown => Err(NormalizeError::UnsupportedDocType(doc_type)),
    }
}

/// Key-level validation on the raw top-level object so that unknown/missing
/// key failures carry the key name rather than a serde position.
fn check_keys(
    raw: &str,
    allowed: &'static [&'static str],
    required: &'static [&'static str],
) -> Result<(), NormalizeError> {
    let map: serde_json::Map<String, serde_json::Value> = strict_decode(raw)?;
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(NormalizeError::UnknownKey {
                key: key.clone(),
                allowed: allowed.to_vec(),
            });
        }
    }
    for key in required {
        if !map.contains_key(*key) {
            return Err(NormalizeError::MissingKey((*key).to_string()));
        }
    }
    Ok(())
}

/// Decode exactly one JSON value; anything left over is trailing data.
fn strict_decode<T: DeserializeOwned>(raw: &str) -> Result<T, NormalizeError> {
    let mut de = serde_json::Deserializer::from_str(raw);
    let value = T::deserialize(&mut de).map_err(classify_decode_error)?;
    de.end().map_err(|_| NormalizeError::TrailingData)?;
    Ok(value)
}

fn classify_decode_error(err: serde_json::Error) -> NormalizeError {
    match err.classify() {
        serde_json::error::Category::Data => NormalizeError::TypeMismatch(err.to_string()),
        _ => NormalizeError::Malformed(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PayslipFields;

    const VALID_PAYSLIP: &str = r#"{
        "employee_name": "Jane Doe",
        "employer_name": "ACME Payroll",
        "pay_period_start": "2025-01-01",
        "pay_period_end": "2025-01-15",
        "gross_pay": 2000,
        "net_pay": 1500,
        "tax_withheld": 500,
        "confidence": 0.93
    }"#;

    #[test]
    fn test_normalize_payslip_strict() {
        let (canonical, confidence) = normalize(DocType::Payslip, VALID_PAYSLIP).unwrap();
        assert_eq!(confidence, 0.93);

        let fields: PayslipFields = serde_json::from_slice(&canonical).unwrap();
        assert_eq!(fields.employee_name.as_deref(), Some("Jane Doe"));
        assert_eq!(fields.gross_pay, 2000.0);
        assert_eq!(fields.superannuation, None);
    }

    #[test]
    fn test_normalize_is_a_fixpoint_on_canonical_bytes() {
        let (canonical, confidence) = normalize(DocType::Payslip, VALID_PAYSLIP).unwrap();
        let text = String::from_utf8(canonical.clone()).unwrap();
        let (again, confidence_again) = normalize(DocType::Payslip, &text).unwrap();
        assert_eq!(canonical, again);
        assert_eq!(confidence, confidence_again);
    }

    #[test]
    fn test_normalize_is_whitespace_independent() {
        let value: serde_json::Value = serde_json::from_str(VALID_PAYSLIP).unwrap();
        let dense = serde_json::to_string(&value).unwrap();

        let (from_pretty, _) = normalize(DocType::Payslip, VALID_PAYSLIP).unwrap();
        let (from_dense, _) = normalize(DocType::Payslip, &dense).unwrap();
        assert_eq!(from_pretty, from_dense);
    }

    #[test]
    fn test_normalize_rejects_empty_output() {
        assert!(matches!(
            normalize(DocType::Payslip, "   \n\t"),
            Err(NormalizeError::EmptyOutput)
        ));
    }

    #[test]
    fn test_normalize_rejects_unknown_keys_with_allowed_set() {
        let raw = r#"{"employee_name":null,"employer_name":null,"pay_period_start":null,
            "pay_period_end":null,"gross_pay":1,"net_pay":1,"tax_withheld":0,
            "confidence":0.5,"bonus":100}"#;
        match normalize(DocType::Payslip, raw) {
            Err(NormalizeError::UnknownKey { key, allowed }) => {
                assert_eq!(key, "bonus");
                assert!(allowed.contains(&"gross_pay"));
                assert!(allowed.contains(&"superannuation"));
            }
            other => panic!("expected UnknownKey, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_rejects_missing_required_key() {
        let raw = r#"{"employee_name":null,"employer_name":null,"pay_period_start":null,
            "pay_period_end":null,"gross_pay":1,"net_pay":1,"tax_withheld":0}"#;
        match normalize(DocType::Payslip, raw) {
            Err(NormalizeError::MissingKey(key)) => assert_eq!(key, "confidence"),
            other => panic!("expected MissingKey, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_rejects_type_mismatch() {
        let raw = r#"{"employee_name":null,"employer_name":null,"pay_period_start":null,
            "pay_period_end":null,"gross_pay":"lots","net_pay":1,"tax_withheld":0,
            "confidence":0.5}"#;
        assert!(matches!(
            normalize(DocType::Payslip, raw),
            Err(NormalizeError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_normalize_rejects_trailing_data() {
        let raw = format!("{} extra", VALID_PAYSLIP.trim());
        assert!(matches!(
            normalize(DocType::Payslip, &raw),
            Err(NormalizeError::TrailingData)
        ));
    }

    #[test]
    fn test_normalize_rejects_truncated_output() {
        assert!(matches!(
            normalize(DocType::Payslip, r#"{"employee_name":"Jane"#),
            Err(NormalizeError::Malformed(_))
        ));
    }

    #[test]
    fn test_normalize_invoice_keeps_optional_fields() {
        let raw = r#"{"supplier_name":"Supplies Pty Ltd","invoice_number":"INV-42",
            "invoice_date":"2025-02-01","due_date":"2025-03-01","total_amount":120.5,
            "gst_amount":10.95,"confidence":0.9}"#;
        let (canonical, confidence) = normalize(DocType::Invoice, raw).unwrap();
        assert_eq!(confidence, 0.9);
        let text = String::from_utf8(canonical).unwrap();
        assert!(text.contains("due_date"));
        assert!(text.contains("gst_amount"));
    }

    #[test]
    fn test_normalize_unknown_doc_type_fails() {
        assert!(matches!(
            normalize(DocType::Unknown, "{}"),
            Err(NormalizeError::UnsupportedDocType(DocType::Unknown))
        ));
    }
}

//! Extraction payload variants and their JSON schema text.
//!
//! Field declaration order is the canonical serialization order: the
//! normalizer re-serializes every accepted model output through these structs,
//! so equal payloads always produce byte-identical canonical JSON.

use serde::{Deserialize, Serialize};

use super::DocType;

/// JSON Schema text handed to the model for payslip extraction.
pub const PAYSLIP_JSON_SCHEMA: &str = r#"{
  "type": "object",
  "additionalProperties": false,
  "required": [
    "employee_name",
    "employer_name",
    "pay_period_start",
    "pay_period_end",
    "gross_pay",
    "net_pay",
    "tax_withheld",
    "confidence"
  ],
  "properties": {
    "employee_name": {"type": ["string", "null"]},
    "employer_name": {"type": ["string", "null"]},
    "pay_period_start": {"type": ["string", "null"]},
    "pay_period_end": {"type": ["string", "null"]},
    "gross_pay": {"type": "number"},
    "net_pay": {"type": "number"},
    "tax_withheld": {"type": "number"},
    "superannuation": {"type": "number"},
    "confidence": {"type": "number", "minimum": 0, "maximum": 1}
  }
}"#;

/// JSON Schema text handed to the model for invoice extraction.
pub const INVOICE_JSON_SCHEMA: &str = r#"{
  "type": "object",
  "additionalProperties": false,
  "required": [
    "supplier_name",
    "invoice_number",
    "invoice_date",
    "total_amount",
    "confidence"
  ],
  "properties": {
    "supplier_name": {"type": ["string", "null"]},
    "invoice_number": {"type": ["string", "null"]},
    "invoice_date": {"type": ["string", "null"]},
    "due_date": {"type": ["string", "null"]},
    "total_amount": {"type": "number"},
    "gst_amount": {"type": "number"},
    "confidence": {"type": "number", "minimum": 0, "maximum": 1}
  }
}"#;

/// Schema text for a document type. Unclassified documents are prompted with
/// the invoice schema, matching the classifier's default.
pub fn schema_for(doc_type: DocType) -> &'static str {
    match doc_type {
        DocType::Payslip => PAYSLIP_JSON_SCHEMA,
        DocType::Invoice | DocType::Unknown => INVOICE_JSON_SCHEMA,
    }
}

/// Payslip extraction payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayslipFields {
    pub employee_name: Option<String>,
    pub employer_name: Option<String>,
    pub pay_period_start: Option<String>,
    pub pay_period_end: Option<String>,
    pub gross_pay: f64,
    pub net_pay: f64,
    pub tax_withheld: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superannuation: Option<f64>,
    pub confidence: f64,
}

/// Invoice extraction payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvoiceFields {
    pub supplier_name: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    pub total_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gst_amount: Option<f64>,
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_field_order_is_stable() {
        let payload = PayslipFields {
            employee_name: Some("Jane Doe".to_string()),
            employer_name: Some("ACME Payroll".to_string()),
            pay_period_start: Some("2025-01-01".to_string()),
            pay_period_end: Some("2025-01-15".to_string()),
            gross_pay: 2000.0,
            net_pay: 1500.0,
            tax_withheld: 500.0,
            superannuation: None,
            confidence: 0.93,
        };
        let bytes = serde_json::to_vec(&payload).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let employee = text.find("employee_name").unwrap();
        let gross = text.find("gross_pay").unwrap();
        let confidence = text.find("confidence").unwrap();
        assert!(employee < gross && gross < confidence);
        assert!(!text.contains("superannuation"));
    }

    #[test]
    fn test_optional_invoice_fields_omitted_when_absent() {
        let payload = InvoiceFields {
            supplier_name: Some("Supplies Pty Ltd".to_string()),
            invoice_number: Some("INV-42".to_string()),
            invoice_date: Some("2025-02-01".to_string()),
            due_date: None,
            total_amount: 120.5,
            gst_amount: None,
            confidence: 0.9,
        };
        let text = serde_json::to_string(&payload).unwrap();
        assert!(!text.contains("due_date"));
        assert!(!text.contains("gst_amount"));
    }

    #[test]
    fn test_unknown_doc_type_falls_back_to_invoice_schema() {
        assert_eq!(schema_for(DocType::Unknown), INVOICE_JSON_SCHEMA);
    }
}

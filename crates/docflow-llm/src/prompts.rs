//! Prompt sets for the extraction ladder.
//!
//! Three prompt pairs: BASE for first-shot extraction, REPAIR to fix output
//! that failed the strict normalizer, and CORRECT to revise an extraction
//! that failed business rules. Templates use `{{VAR}}` placeholders.

pub const BASE_SYSTEM: &str = "You are a document information extraction engine.
You must output ONLY valid JSON and nothing else.
No markdown. No comments. No extra keys.
If a value is unknown, use null for strings and omit optional numeric fields when truly unavailable.
Dates must be ISO format YYYY-MM-DD when possible.";

pub const BASE_USER_TEMPLATE: &str = "You will extract structured data from a document.
Return JSON that matches EXACTLY the schema below.

Rules:
- Output JSON only.
- Use the schema keys exactly.
- Do not add keys not in the schema.
- Numbers must be plain numbers, no currency symbols.
- confidence must be a number between 0 and 1.
- If you cannot find a required field, set it to null (for strings/dates) and set confidence below 0.6.

Document type: {{DOC_TYPE}}

Schema (JSON Schema):
{{JSON_SCHEMA}}

Document text:
{{DOC_TEXT}}

Return JSON only.";

pub const REPAIR_SYSTEM: &str = "You are a strict JSON repair engine.
You receive an output that failed parsing or schema validation.
You must return ONLY corrected JSON that matches the provided schema exactly.
No markdown. No commentary. No extra keys. No surrounding text.";

pub const REPAIR_USER_TEMPLATE: &str = "The previous model output was invalid or did not match the schema.

Schema (JSON Schema):
{{JSON_SCHEMA}}

Invalid output:
{{MODEL_OUTPUT}}

Fix the output so it matches the schema exactly.
Return JSON only.";

pub const CORRECT_SYSTEM: &str = "You are a document extraction correction engine.
You must output ONLY valid JSON matching the provided schema exactly.
No markdown. No commentary. No extra keys.";

pub const CORRECT_USER_TEMPLATE: &str = "The extracted JSON failed validation rules.
Correct ONLY the fields needed to satisfy the rules, using the document text as the source of truth.
If the document text does not support a correction with high confidence, keep the original value and lower confidence.

Document type: {{DOC_TYPE}}

Schema (JSON Schema):
{{JSON_SCHEMA}}

Document text:
{{DOC_TEXT}}

Current extracted JSON:
{{CURRENT_JSON}}

Failed rules:
{{FAILED_RULES}}

Return corrected JSON only.";

/// Substitute every `{{KEY}}` placeholder.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (key, value) in vars {
        rendered = rendered.replace(&format!("{{{{{}}}}}", key), value);
    }
    rendered
}

pub fn build_base_user_prompt(doc_type: &str, json_schema: &str, doc_text: &str) -> String {
    render_template(
        BASE_USER_TEMPLATE,
        &[
            ("DOC_TYPE", doc_type),
            ("JSON_SCHEMA", json_schema),
            ("DOC_TEXT", doc_text),
        ],
    )
}

pub fn build_repair_user_prompt(json_schema: &str, model_output: &str) -> String {
    render_template(
        REPAIR_USER_TEMPLATE,
        &[("JSON_SCHEMA", json_schema), ("MODEL_OUTPUT", model_output)],
    )
}

pub fn build_correct_user_prompt(
    doc_type: &str,
    json_schema: &str,
    doc_text: &str,
    current_json: &str,
    failed_rules: &[String],
) -> String {
    render_template(
        CORRECT_USER_TEMPLATE,
        &[
            ("DOC_TYPE", doc_type),
            ("JSON_SCHEMA", json_schema),
            ("DOC_TEXT", doc_text),
            ("CURRENT_JSON", current_json),
            ("FAILED_RULES", &failed_rules.join(", ")),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template_replaces_all_occurrences() {
        let rendered = render_template("{{A}} and {{A}} then {{B}}", &[("A", "x"), ("B", "y")]);
        assert_eq!(rendered, "x and x then y");
    }

    #[test]
    fn test_base_prompt_embeds_schema_and_text() {
        let prompt = build_base_user_prompt("payslip", "{\"type\":\"object\"}", "Gross pay: 2000");
        assert!(prompt.contains("Document type: payslip"));
        assert!(prompt.contains("{\"type\":\"object\"}"));
        assert!(prompt.contains("Gross pay: 2000"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_repair_prompt_carries_invalid_output() {
        let prompt = build_repair_user_prompt("{}", "{\"truncated\"");
        assert!(prompt.contains("{\"truncated\""));
    }

    #[test]
    fn test_correct_prompt_lists_failed_rules() {
        let rules = vec![
            "invoice.total_amount_gt_zero".to_string(),
            "invoice.gst_non_negative".to_string(),
        ];
        let prompt = build_correct_user_prompt("invoice", "{}", "text", "{}", &rules);
        assert!(prompt.contains("invoice.total_amount_gt_zero, invoice.gst_non_negative"));
    }
}

//! End-to-end validation scenarios against the canonical invoice spec

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;
use shared_types::{ReportStatus, Summary};
use std::fs;
use validation_engine::{
    validate, write_failure_reports, write_summary, ValidationEngine, ValidationOptions,
    SUMMARY_FILE,
};

fn error_codes(report: &shared_types::Report) -> Vec<&str> {
    report.error_codes().collect()
}

#[test]
fn test_vat_invoice_with_cjk_names_passes() {
    let report = validate(&common::valid_vat_invoice(), &common::spec(), common::today());
    assert_eq!(report.status, ReportStatus::Pass);
    assert!(report.errors.is_empty());
    assert_eq!(report.spec_version.as_deref(), Some("0.3.1"));
}

#[test]
fn test_unknown_document_type_needs_a_human() {
    let report = validate(
        &json!({"document_type": "unknown", "extracted_text": "x"}),
        &common::spec(),
        common::today(),
    );
    assert_eq!(report.status, ReportStatus::FailHuman);
    assert_eq!(error_codes(&report), vec!["DOC_TYPE_UNKNOWN"]);
}

#[test]
fn test_blank_extracted_text_needs_a_human() {
    let mut doc = common::valid_vat_invoice();
    doc["extracted_text"] = json!("   \n");
    let report = validate(&doc, &common::spec(), common::today());
    assert_eq!(report.status, ReportStatus::FailHuman);
    assert_eq!(error_codes(&report), vec!["EXTRACTED_TEXT_EMPTY"]);
}

#[test]
fn test_space_in_cjk_payer_is_repairable() {
    let report = validate(&common::spaced_bank_receipt(), &common::spec(), common::today());
    assert_eq!(report.status, ReportStatus::FailLlm);
    assert_eq!(error_codes(&report), vec!["NAME_HAS_WHITESPACE_OUTSIDE_BRACKETS"]);
    assert_eq!(report.errors[0].field.as_deref(), Some("payer"));

    let warnings: Vec<_> = report.warnings.iter().map(|w| w.code.as_str()).collect();
    assert_eq!(warnings, vec!["TEXT_TOO_SHORT", "DIRECTION_MISSING"]);
}

#[test]
fn test_cjk_payer_requires_18_char_tax_id() {
    let mut doc = common::valid_vat_invoice();
    doc["buyer_tax_id"] = json!("123456789012345");
    let report = validate(&doc, &common::spec(), common::today());
    assert_eq!(report.status, ReportStatus::FailLlm);
    assert_eq!(error_codes(&report), vec!["TAX_ID_CJK_NAME_MUST_BE_18"]);
}

#[test]
fn test_latin_names_allow_short_tax_ids() {
    let doc = json!({
        "document_type": "VAT_invoice",
        "extracted_text": "invoice for services rendered",
        "payer": "ABCInc",
        "seller": "XYZLtd",
        "buyer_tax_id": "12345678",
        "seller_tax_id": "87654321",
        "project_name": "Service",
        "date": "2026-02-05",
        "currency": "USD",
        "uid": "ABCDEFGH12345678",
        "total_amount": "388.00",
        "tax_amount": "0.00"
    });
    let report = validate(&doc, &common::spec(), common::today());
    assert_eq!(report.status, ReportStatus::Pass);
}

#[test]
fn test_bank_receipt_uid_trailing_symbols_are_ignored() {
    let mut doc = common::spaced_bank_receipt();
    doc["payer"] = json!("北京磐沄科技有限公司");
    doc["uid"] = json!("ABCDEFGH12345678#。");
    let report = validate(&doc, &common::spec(), common::today());
    assert_eq!(report.status, ReportStatus::Pass);

    // Only bank receipts get the trim
    let mut invoice = common::valid_vat_invoice();
    invoice["uid"] = json!("26312000000713810086#");
    let report = validate(&invoice, &common::spec(), common::today());
    assert_eq!(error_codes(&report), vec!["UID_FORMAT_INVALID"]);
}

#[test]
fn test_out_of_range_date_is_repairable() {
    let mut doc = common::valid_vat_invoice();
    doc["date"] = json!("2023-01-01");
    let report = validate(&doc, &common::spec(), common::today());
    assert_eq!(report.status, ReportStatus::FailLlm);
    assert_eq!(error_codes(&report), vec!["DATE_OUT_OF_RANGE"]);
}

#[test]
fn test_directory_summary_counts_each_status() {
    let dir = tempfile::tempdir().unwrap();
    common::write_json(
        &dir.path().join("a_extracted_revised.json"),
        &common::valid_vat_invoice(),
    );
    common::write_json(
        &dir.path().join("b_extracted_revised.json"),
        &common::spaced_bank_receipt(),
    );
    fs::write(dir.path().join("ignored.json"), "{}").unwrap();

    let spec = common::spec();
    let engine = ValidationEngine::new(&spec, ValidationOptions::new(common::today()));
    let (summary, reports) = engine.validate_directory(dir.path()).unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.pass, 1);
    assert_eq!(summary.fail_llm, 1);
    assert_eq!(summary.fail_human, 0);
    assert_eq!(
        summary.errors_by_code.get("NAME_HAS_WHITESPACE_OUTSIDE_BRACKETS"),
        Some(&1)
    );
    assert_eq!(reports[0].context.json_filename, "a_extracted_revised.json");
    assert_eq!(reports[1].context.json_filename, "b_extracted_revised.json");

    let summary_path = write_summary(dir.path(), &summary).unwrap();
    assert_eq!(summary_path, dir.path().join(SUMMARY_FILE));
    let reread: Summary = serde_json::from_str(&fs::read_to_string(summary_path).unwrap()).unwrap();
    assert_eq!(reread, summary);

    let written = write_failure_reports(dir.path(), &reports).unwrap();
    assert_eq!(written, vec![dir.path().join("b_validation_report.json")]);
}

#[test]
fn test_directory_validation_leaves_inputs_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a_extracted_revised.json");
    common::write_json(&path, &common::spaced_bank_receipt());
    let before = fs::read(&path).unwrap();

    let spec = common::spec();
    let engine = ValidationEngine::new(&spec, ValidationOptions::new(common::today()));
    engine.validate_directory(dir.path()).unwrap();
    engine.validate_directory(dir.path()).unwrap();

    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_preview_is_truncated() {
    let spec = common::spec();
    let engine = ValidationEngine::new(
        &spec,
        ValidationOptions::new(common::today()).with_preview_len(4),
    );
    let report = engine.validate_value(&common::valid_vat_invoice(), "a_extracted_revised.json", None);
    assert_eq!(report.context.extracted_text_preview, "发票号码");
}

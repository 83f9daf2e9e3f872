//! Shared fixtures for validation-engine integration tests

#![allow(dead_code)]

use chrono::NaiveDate;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use validation_engine::Spec;

pub fn spec_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/invoice_spec.json")
}

pub fn spec() -> Spec {
    Spec::from_file(spec_path()).expect("fixture spec loads")
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 11).unwrap()
}

pub fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

pub fn valid_vat_invoice() -> Value {
    json!({
        "document_type": "VAT_invoice",
        "extracted_text": "发票号码：26312000000713810086 开票日期：2026年02月05日",
        "payer": "北京磐沄科技有限公司",
        "seller": "上海嘉静门诊部有限公司",
        "buyer_tax_id": "91110108MA01TE5L85",
        "seller_tax_id": "91310000MA1FL0E9X9",
        "project_name": "医疗服务",
        "date": "2026-02-05",
        "currency": "CNY",
        "uid": "26312000000713810086",
        "total_amount": "388.00",
        "tax_amount": "0.00"
    })
}

pub fn spaced_bank_receipt() -> Value {
    json!({
        "document_type": "bank_receipt",
        "extracted_text": "客户回单",
        "payer": "北京 磐沄科技有限公司",
        "payee": "收款方（上海 分部）",
        "date": "2026-02-05",
        "currency": "CNY",
        "uid": "ABCDEFGH12345678",
        "amount": "1.00"
    })
}

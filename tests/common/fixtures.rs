use bigdecimal::BigDecimal;
use bl_reconcile::models::{
    ColumnMapping, Delivery, DeliveryStatus, ExternalInvoiceRecord, StoreReconciliationConfig,
    VerificationRequest,
};
use serde_json::Value;
use std::str::FromStr;

/// 门店配置: 发票号列 RefFacture, 供应商列 Fournisseurs
pub fn store_config(store_id: i64) -> StoreReconciliationConfig {
    StoreReconciliationConfig {
        store_id,
        table_id: format!("tbl_{store_id}"),
        base_url: "http://tables.invalid".to_string(),
        api_token: "test-token".to_string(),
        columns: ColumnMapping {
            invoice_ref: "RefFacture".to_string(),
            bl_number: "NumBL".to_string(),
            amount: "Montant".to_string(),
            supplier: "Fournisseurs".to_string(),
            date: Some("DateFacture".to_string()),
        },
    }
}

pub fn record(value: Value) -> ExternalInvoiceRecord {
    ExternalInvoiceRecord::from(value)
}

pub fn delivery(id: i64, store_id: i64, invoice_reference: &str, supplier: &str) -> Delivery {
    Delivery {
        id,
        store_id,
        supplier_name: Some(supplier.to_string()),
        invoice_reference: Some(invoice_reference.to_string()),
        bl_number: None,
        amount: None,
        scheduled_date: None,
        status: DeliveryStatus::Pending,
    }
}

pub fn request(delivery_id: i64, store_id: i64, invoice_reference: &str) -> VerificationRequest {
    VerificationRequest {
        delivery_id,
        store_id,
        invoice_reference: Some(invoice_reference.to_string()),
        supplier_name: None,
        bl_number: None,
        amount: None,
        delivery_date: None,
    }
}

pub fn decimal(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

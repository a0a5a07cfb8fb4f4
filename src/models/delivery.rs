use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 配送单状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Reconciled,
    Other(String),
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Reconciled => "reconciled",
            DeliveryStatus::Other(s) => s,
        }
    }
}

impl From<String> for DeliveryStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => DeliveryStatus::Pending,
            "reconciled" | "delivered" => DeliveryStatus::Reconciled,
            _ => DeliveryStatus::Other(s),
        }
    }
}

/// 配送单表 (deliveries)
#[derive(Debug, Clone, FromRow)]
pub struct DeliveryRow {
    pub id: i64,
    pub store_id: i64,
    pub supplier_name: Option<String>,
    pub invoice_reference: Option<String>,
    pub bl_number: Option<String>,
    pub amount: Option<BigDecimal>,
    pub scheduled_date: Option<NaiveDate>,
    pub status: String,
}

/// 配送单 (外部实体, 此处只读, 仅由定时任务改写状态)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: i64,
    pub store_id: i64,
    pub supplier_name: Option<String>,
    pub invoice_reference: Option<String>,
    pub bl_number: Option<String>,
    pub amount: Option<BigDecimal>,
    pub scheduled_date: Option<NaiveDate>,
    pub status: DeliveryStatus,
}

impl From<DeliveryRow> for Delivery {
    fn from(row: DeliveryRow) -> Self {
        Self {
            id: row.id,
            store_id: row.store_id,
            supplier_name: row.supplier_name,
            invoice_reference: row.invoice_reference,
            bl_number: row.bl_number,
            amount: row.amount,
            scheduled_date: row.scheduled_date,
            status: DeliveryStatus::from(row.status),
        }
    }
}

impl Delivery {
    pub fn is_pending(&self) -> bool {
        self.status == DeliveryStatus::Pending
    }

    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            supplier_name: self.supplier_name.clone(),
            invoice_reference: self.invoice_reference.clone(),
            bl_number: self.bl_number.clone(),
            amount: self.amount.clone(),
            scheduled_date: self.scheduled_date,
        }
    }
}

/// 匹配所需的配送单字段快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliverySnapshot {
    pub supplier_name: Option<String>,
    pub invoice_reference: Option<String>,
    pub bl_number: Option<String>,
    pub amount: Option<BigDecimal>,
    pub scheduled_date: Option<NaiveDate>,
}

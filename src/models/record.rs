use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// 外部发票记录: 不透明的键值对, 只能通过列名映射解读
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalInvoiceRecord(pub Map<String, Value>);

impl ExternalInvoiceRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn raw(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// 以文本读取某列 (字符串/数字/布尔统一转为字符串), 空白视为缺失
    pub fn text(&self, column: &str) -> Option<String> {
        let text = match self.0.get(column)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    pub fn amount(&self, column: &str) -> Option<BigDecimal> {
        match self.0.get(column)? {
            Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
            Value::String(s) => parse_decimal(s),
            _ => None,
        }
    }

    pub fn date(&self, column: &str) -> Option<NaiveDate> {
        parse_date(&self.text(column)?)
    }
}

impl From<Value> for ExternalInvoiceRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

/// 解析外部表中的金额文本: "1 234,50" / "1,234.50" / "1234.5 €"
pub fn parse_decimal(raw: &str) -> Option<BigDecimal> {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}' && *c != '€')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.contains(',') {
        cleaned = if cleaned.contains('.') {
            cleaned.replace(',', "")
        } else {
            cleaned.replace(',', ".")
        };
    }
    BigDecimal::from_str(&cleaned).ok()
}

/// 支持 YYYY-MM-DD, RFC 3339, "YYYY-MM-DD HH:MM:SS", DD/MM/YYYY
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(raw, "%d/%m/%Y").ok()
}

//! 匹配策略级联
//!
//! 固定顺序, 第一个成功的策略胜出:
//! 发票号 > BL号 > 供应商+金额 > 供应商+日期。

use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::models::{
    ColumnMapping, DeliverySnapshot, ExternalInvoiceRecord, MatchStrategy, VerificationOutcome,
};

/// 供应商模糊匹配: 忽略大小写, 任一方向的子串包含
pub fn supplier_matches(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn invoice_ref_matches(record: &ExternalInvoiceRecord, columns: &ColumnMapping, wanted: &str) -> bool {
    record
        .text(&columns.invoice_ref)
        .is_some_and(|v| v.to_lowercase() == wanted.to_lowercase())
}

fn bl_number_matches(record: &ExternalInvoiceRecord, columns: &ColumnMapping, wanted: &str) -> bool {
    record.text(&columns.bl_number).is_some_and(|v| v == wanted)
}

fn record_supplier_matches(record: &ExternalInvoiceRecord, columns: &ColumnMapping, supplier: &str) -> bool {
    record
        .text(&columns.supplier)
        .is_some_and(|v| supplier_matches(&v, supplier))
}

fn amount_matches(record: &ExternalInvoiceRecord, columns: &ColumnMapping, amount: &BigDecimal) -> bool {
    // 零容差: 十进制精确相等 (12.50 == 12.5)
    record.amount(&columns.amount).is_some_and(|v| &v == amount)
}

fn same_day(record: &ExternalInvoiceRecord, column: &str, day: NaiveDate) -> bool {
    record.date(column).is_some_and(|d| d == day)
}

/// 在候选中找出第一条满足条件的记录, 同时报告是否有多条满足
fn first_match<'a, F>(candidates: &'a [ExternalInvoiceRecord], pred: F) -> Option<(&'a ExternalInvoiceRecord, bool)>
where
    F: Fn(&ExternalInvoiceRecord) -> bool,
{
    let mut hits = candidates.iter().filter(|r| pred(*r));
    let first = hits.next()?;
    Some((first, hits.next().is_some()))
}

fn matched(strategy: MatchStrategy, record: &ExternalInvoiceRecord, ambiguous: bool, supplier_mismatch: bool) -> VerificationOutcome {
    VerificationOutcome::Matched {
        strategy,
        record: record.clone(),
        supplier_mismatch,
        ambiguous,
    }
}

/// 对一张配送单在候选记录上执行级联匹配
///
/// 外部表返回多条相同发票号时取第一条 (顺序由外部表决定), 并标记 `ambiguous`。
pub fn resolve(
    delivery: &DeliverySnapshot,
    candidates: &[ExternalInvoiceRecord],
    columns: &ColumnMapping,
) -> VerificationOutcome {
    let supplier = non_blank(delivery.supplier_name.as_ref());

    // 1. 发票号 (权威): 供应商不一致只告警
    if let Some(wanted) = non_blank(delivery.invoice_reference.as_ref()) {
        if let Some((record, ambiguous)) =
            first_match(candidates, |r| invoice_ref_matches(r, columns, wanted))
        {
            let supplier_mismatch = match (supplier, record.text(&columns.supplier)) {
                (Some(ours), Some(theirs)) => !supplier_matches(ours, &theirs),
                _ => false,
            };
            return matched(MatchStrategy::InvoiceRef, record, ambiguous, supplier_mismatch);
        }
    }

    // 2. BL号
    if let Some(wanted) = non_blank(delivery.bl_number.as_ref()) {
        if let Some((record, ambiguous)) =
            first_match(candidates, |r| bl_number_matches(r, columns, wanted))
        {
            return matched(MatchStrategy::BlNumber, record, ambiguous, false);
        }
    }

    if let Some(supplier) = supplier {
        // 3. 供应商 + 金额
        if let Some(amount) = delivery.amount.as_ref() {
            if let Some((record, ambiguous)) = first_match(candidates, |r| {
                record_supplier_matches(r, columns, supplier) && amount_matches(r, columns, amount)
            }) {
                return matched(MatchStrategy::SupplierAmount, record, ambiguous, false);
            }
        }

        // 4. 供应商 + 同一天
        if let (Some(day), Some(date_column)) = (delivery.scheduled_date, columns.date.as_deref()) {
            if let Some((record, ambiguous)) = first_match(candidates, |r| {
                record_supplier_matches(r, columns, supplier) && same_day(r, date_column, day)
            }) {
                return matched(MatchStrategy::SupplierDate, record, ambiguous, false);
            }
        }
    }

    VerificationOutcome::NotFound {
        candidates_seen: candidates.len(),
    }
}

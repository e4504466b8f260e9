use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{PaymentIntent, PaymentMethod, PaymentStatus};

pub const CSV_HEADERS: [&str; 10] = [
    "Date",
    "Transaction ID",
    "Room",
    "Month",
    "Amount",
    "Payment Method",
    "Status",
    "Paid On",
    "Receipt Number",
    "Payment Gateway",
];

/// Search and filter over a tenant's payment history
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Case-insensitive match on month, transaction id, room number or
    /// receipt number
    pub search: Option<String>,
    pub status: Option<PaymentStatus>,
    pub method: Option<PaymentMethod>,
}

impl HistoryFilter {
    pub fn matches(&self, payment: &PaymentIntent) -> bool {
        if let Some(status) = self.status {
            if payment.status != status {
                return false;
            }
        }
        if let Some(method) = self.method {
            if payment.method != method {
                return false;
            }
        }

        let needle = match self.search.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_lowercase(),
            _ => return true,
        };

        let month = payment.month_display().to_lowercase();
        month.contains(&needle)
            || payment.transaction_id.to_lowercase().contains(&needle)
            || payment
                .room_number()
                .map_or(false, |r| r.to_lowercase().contains(&needle))
            || payment
                .receipt_number
                .as_deref()
                .map_or(false, |r| r.to_lowercase().contains(&needle))
    }

    pub fn apply<'a>(&self, payments: &'a [PaymentIntent]) -> Vec<&'a PaymentIntent> {
        payments.iter().filter(|p| self.matches(p)).collect()
    }
}

/// Summary figures shown above the history table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_paid: u64,
    pub pending_amount: u64,
    pub online_count: usize,
    pub cash_count: usize,
    pub pending_count: usize,
    pub total_count: usize,
}

impl HistoryStats {
    pub fn from_payments(payments: &[PaymentIntent]) -> Self {
        payments.iter().fold(Self::default(), |mut stats, p| {
            stats.total_count += 1;
            match p.status {
                PaymentStatus::Paid => stats.total_paid += p.amount,
                PaymentStatus::Pending => {
                    stats.pending_amount += p.amount;
                    stats.pending_count += 1;
                }
                PaymentStatus::Failed | PaymentStatus::Cancelled | PaymentStatus::Refunded => {}
            }
            match p.method {
                PaymentMethod::Online => stats.online_count += 1,
                PaymentMethod::Cash => stats.cash_count += 1,
            }
            stats
        })
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Quote a field when it holds a delimiter, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// One CSV document, header row first, `\n` line endings
pub fn export_csv<'a, I>(payments: I) -> String
where
    I: IntoIterator<Item = &'a PaymentIntent>,
{
    let mut out = CSV_HEADERS.join(",");

    for p in payments {
        let row = [
            format_date(p.created_at),
            p.transaction_id.clone(),
            p.room_number().unwrap_or("N/A").to_string(),
            p.month_display(),
            p.amount.to_string(),
            p.method.label().to_string(),
            p.status.label().to_string(),
            format_date(p.paid_on),
            p.receipt_number.clone().unwrap_or_else(|| "N/A".to_string()),
            p.method.gateway_label().to_string(),
        ];
        let line = row.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
        let _ = write!(out, "\n{}", line);
    }

    out
}

/// Default export file name, e.g. `payment-history-2025-03-14.csv`
pub fn export_file_name(today: DateTime<Utc>) -> String {
    format!("payment-history-{}.csv", today.format("%Y-%m-%d"))
}

// Common types used across the library and the CLI

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Standard result type used throughout the library
pub type RentPayResult<T> = Result<T, AppError>;

/// How the tenant pays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[serde(alias = "razorpay")]
    Online,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Online => "online",
            PaymentMethod::Cash => "cash",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Online => "Online",
            PaymentMethod::Cash => "Cash",
        }
    }

    /// Name of the processor handling this method, if any
    pub fn gateway_label(&self) -> &'static str {
        match self {
            PaymentMethod::Online => "Razorpay",
            PaymentMethod::Cash => "N/A",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" | "razorpay" => Ok(PaymentMethod::Online),
            "cash" => Ok(PaymentMethod::Cash),
            other => Err(AppError::validation_error(format!(
                "unknown payment method '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-owned payment status. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    /// Settled and later returned to the tenant by an administrator
    Refunded,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Position in the lifecycle; terminal statuses share the top rank
    pub fn rank(&self) -> u8 {
        match self {
            PaymentStatus::Pending => 0,
            PaymentStatus::Paid
            | PaymentStatus::Failed
            | PaymentStatus::Cancelled
            | PaymentStatus::Refunded => 1,
        }
    }

    /// Whether a record in status `next` may replace one in `self`
    pub fn accepts(&self, next: PaymentStatus) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Cancelled => "Cancelled",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" | "canceled" => Ok(PaymentStatus::Cancelled),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(AppError::validation_error(format!(
                "unknown payment status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing period in `YYYY-MM` form
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingMonth {
    year: i32,
    month: u32,
}

impl BillingMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (1000..=9999).contains(&year) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn current() -> Self {
        let today = Utc::now().date_naive();
        Self {
            year: today.year(),
            month: today.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Human form, e.g. "March 2025"
    pub fn display_name(&self) -> String {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|d| d.format("%B %Y").to_string())
            .unwrap_or_else(|| self.to_string())
    }
}

impl FromStr for BillingMonth {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            AppError::validation_error(format!(
                "billing month '{}' must be in YYYY-MM format",
                s
            ))
        };
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month).ok_or_else(invalid)
    }
}

impl TryFrom<String> for BillingMonth {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BillingMonth> for String {
    fn from(value: BillingMonth) -> Self {
        value.to_string()
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Room as served by the backend; read-only from the payment side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(rename = "_id", alias = "roomId")]
    pub room_id: String,
    pub room_number: String,
    pub monthly_rent: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
}

/// Room reference on a payment: either a bare id or an embedded summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomRef {
    Id(String),
    Summary {
        #[serde(rename = "_id")]
        id: String,
        #[serde(rename = "roomNumber", default)]
        room_number: Option<String>,
        #[serde(default)]
        building: Option<String>,
    },
}

impl RoomRef {
    pub fn id(&self) -> &str {
        match self {
            RoomRef::Id(id) => id,
            RoomRef::Summary { id, .. } => id,
        }
    }

    pub fn room_number(&self) -> Option<&str> {
        match self {
            RoomRef::Id(_) => None,
            RoomRef::Summary { room_number, .. } => room_number.as_deref(),
        }
    }
}

/// Administrator who confirmed a cash payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfirmedBy {
    Name(String),
    Admin {
        #[serde(rename = "_id", default)]
        id: String,
        name: String,
    },
}

impl ConfirmedBy {
    pub fn name(&self) -> &str {
        match self {
            ConfirmedBy::Name(name) => name,
            ConfirmedBy::Admin { name, .. } => name,
        }
    }
}

/// Gateway order attached to an online intent at creation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDescriptor {
    pub order_id: String,
    pub key: String,
    /// Amount in currency subunits (paise)
    pub amount_subunits: u64,
    pub currency: String,
}

/// One rent payment attempt, owned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    #[serde(alias = "_id")]
    pub payment_id: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(rename = "roomId", default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomRef>,
    pub amount: u64,
    #[serde(rename = "month")]
    pub billing_month: BillingMonth,
    #[serde(rename = "paymentMethod")]
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_by: Option<ConfirmedBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_display: Option<String>,
}

impl PaymentIntent {
    pub fn month_display(&self) -> String {
        self.month_display
            .clone()
            .unwrap_or_else(|| self.billing_month.display_name())
    }

    pub fn room_number(&self) -> Option<&str> {
        self.room.as_ref().and_then(RoomRef::room_number)
    }

    /// Take a freshly fetched record as the new cached copy. Create-time data
    /// the status endpoint does not echo back is carried over.
    pub fn refreshed_with(&self, mut fetched: PaymentIntent) -> PaymentIntent {
        if fetched.order.is_none() {
            fetched.order = self.order.clone();
        }
        if fetched.transaction_id.is_empty() {
            fetched.transaction_id = self.transaction_id.clone();
        }
        // A bare room id in the fetched record does not erase a known number
        if fetched.room_number().is_none()
            && (fetched.room.is_none() || self.room_number().is_some())
        {
            fetched.room = self.room.clone();
        }
        fetched
    }
}

/// Buyer details prefilled into the checkout widget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerInfo {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub contact: Option<String>,
}

/// Receipt data for a settled payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(default)]
    pub receipt_number: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    pub paid_on: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Convert whole rupees to paise for the gateway
pub fn to_subunits(amount: u64) -> Option<u64> {
    amount.checked_mul(100)
}

/// Format whole rupees with Indian digit grouping, e.g. `₹1,00,000`
pub fn format_inr(amount: u64) -> String {
    let digits = amount.to_string();
    if digits.len() <= 3 {
        return format!("₹{}", digits);
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    format!("₹{},{}", groups.join(","), tail)
}

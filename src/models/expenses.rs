use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::string_or_number;

/// Only the exact wire names (compared lowercased) map onto named variants.
/// Anything else is kept verbatim in `Other`. A missing status is `Pending`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExpenseStatus {
    Complete,
    Declined,
    Rejected,
    Reversed,
    Refunded,
    #[default]
    Pending,
    Other(String),
}

impl ExpenseStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "complete" => ExpenseStatus::Complete,
            "decline" => ExpenseStatus::Declined,
            "rejected" => ExpenseStatus::Rejected,
            "reverse" => ExpenseStatus::Reversed,
            "refund" => ExpenseStatus::Refunded,
            "pending" => ExpenseStatus::Pending,
            _ => ExpenseStatus::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ExpenseStatus::Complete => "complete",
            ExpenseStatus::Declined => "decline",
            ExpenseStatus::Rejected => "rejected",
            ExpenseStatus::Reversed => "reverse",
            ExpenseStatus::Refunded => "refund",
            ExpenseStatus::Pending => "pending",
            ExpenseStatus::Other(raw) => raw,
        }
    }
}

impl Serialize for ExpenseStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExpenseStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().map(ExpenseStatus::parse).unwrap_or_default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayStatus {
    Approved,
    Rejected,
    Refund,
    Reversed,
    Pending,
}

impl DisplayStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DisplayStatus::Approved => "Approved",
            DisplayStatus::Rejected => "Rejected",
            DisplayStatus::Refund => "Refund",
            DisplayStatus::Reversed => "Reversed",
            DisplayStatus::Pending => "Pending",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub merchant: String,
    /// Negative for spend, positive for refunds.
    pub amount: f64,
    #[serde(default)]
    pub currency: String,
    pub date: String,
    #[serde(default)]
    pub status: ExpenseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Expense {
    /// Approved and not rejected, declined, reversed or refunded; or complete.
    pub fn counts_toward_spend(&self) -> bool {
        match self.status {
            ExpenseStatus::Complete => true,
            ExpenseStatus::Rejected
            | ExpenseStatus::Declined
            | ExpenseStatus::Reversed
            | ExpenseStatus::Refunded => false,
            ExpenseStatus::Pending | ExpenseStatus::Other(_) => self.approved != Some(false),
        }
    }

    pub fn display_status(&self) -> DisplayStatus {
        match (self.approved, &self.status) {
            (Some(false), _) | (_, ExpenseStatus::Rejected) | (_, ExpenseStatus::Declined) => {
                DisplayStatus::Rejected
            }
            (_, ExpenseStatus::Refunded) => DisplayStatus::Refund,
            (_, ExpenseStatus::Reversed) => DisplayStatus::Reversed,
            (_, ExpenseStatus::Complete) => DisplayStatus::Approved,
            (_, ExpenseStatus::Pending | ExpenseStatus::Other(_)) => DisplayStatus::Pending,
        }
    }

    pub fn day(&self) -> Option<NaiveDate> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.date) {
            return Some(dt.date_naive());
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(&self.date, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(dt.date());
        }
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()
    }

    pub fn has_location(&self) -> bool {
        self.location.is_some() || self.latitude.is_some()
    }

    pub fn map_url(&self) -> Option<String> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(format!(
                "https://maps.apple.com/?q={lat},{lon}&ll={lat},{lon}"
            )),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExpensesResponse {
    pub year: i32,
    pub month: u32,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub gastos: Vec<Expense>,
}

impl ExpensesResponse {
    pub fn position(&self, id: &str) -> Option<usize> {
        self.gastos.iter().position(|g| g.id == id)
    }

    pub fn find(&self, id: &str) -> Option<&Expense> {
        self.gastos.iter().find(|g| g.id == id)
    }
}

#[cfg(test)]
pub(crate) fn expense(id: &str, amount: f64, status: ExpenseStatus) -> Expense {
    Expense {
        id: id.to_string(),
        merchant: format!("Merchant {id}"),
        amount,
        currency: "EUR".to_string(),
        date: "2025-03-14T12:30:00Z".to_string(),
        status,
        approved: None,
        location: None,
        address: None,
        city: None,
        country: None,
        latitude: None,
        longitude: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_parsing_matches_wire_names_only() {
        assert_eq!(ExpenseStatus::parse("COMPLETE"), ExpenseStatus::Complete);
        assert_eq!(ExpenseStatus::parse("decline"), ExpenseStatus::Declined);
        assert_eq!(ExpenseStatus::parse("rejected"), ExpenseStatus::Rejected);
        assert_eq!(ExpenseStatus::parse("Refund"), ExpenseStatus::Refunded);
        assert_eq!(ExpenseStatus::parse("reverse"), ExpenseStatus::Reversed);
        assert_eq!(ExpenseStatus::parse("pending"), ExpenseStatus::Pending);
        for raw in ["reject", "declined", "completed", "refunded", "reversed", " refund ", ""] {
            assert_eq!(ExpenseStatus::parse(raw), ExpenseStatus::Other(raw.to_string()));
        }
    }

    #[test]
    fn unknown_status_keeps_its_text_through_the_cache() {
        let mut e = expense("1", -3.0, ExpenseStatus::parse("Completed"));
        e.approved = Some(false);
        let text = serde_json::to_string(&e).unwrap();
        assert!(text.contains("\"status\":\"Completed\""));
        let back: Expense = serde_json::from_str(&text).unwrap();
        assert_eq!(back, e);
        assert!(!back.counts_toward_spend());
    }

    #[test]
    fn deserializes_backend_payload() {
        let payload = json!({
            "year": 2025,
            "month": 3,
            "count": 2,
            "gastos": [
                {"id": 123456, "merchant": "Cafe", "amount": -4.5, "currency": "EUR",
                 "date": "2025-03-02T08:15:00+01:00", "status": "complete", "approved": true},
                {"id": "abc", "merchant": "Taxi", "amount": -20.0, "currency": "EUR",
                 "date": "2025-03-03T22:00:00Z", "status": null}
            ]
        });

        let response: ExpensesResponse = serde_json::from_value(payload).unwrap();
        assert_eq!(response.gastos.len(), 2);
        assert_eq!(response.gastos[0].id, "123456");
        assert_eq!(response.gastos[0].status, ExpenseStatus::Complete);
        assert_eq!(response.gastos[1].status, ExpenseStatus::Pending);
        assert_eq!(response.position("abc"), Some(1));
    }

    #[test]
    fn serialized_status_survives_a_cache_round() {
        let mut original = expense("1", -3.0, ExpenseStatus::Declined);
        original.approved = Some(false);
        let text = serde_json::to_string(&original).unwrap();
        assert!(text.contains("\"status\":\"decline\""));
        let back: Expense = serde_json::from_str(&text).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn spend_filter_is_approved_or_complete() {
        let complete = expense("1", -10.0, ExpenseStatus::Complete);
        assert!(complete.counts_toward_spend());

        let mut complete_unapproved = expense("2", -10.0, ExpenseStatus::Complete);
        complete_unapproved.approved = Some(false);
        assert!(complete_unapproved.counts_toward_spend());

        let pending = expense("3", -10.0, ExpenseStatus::Pending);
        assert!(pending.counts_toward_spend());

        let mut pending_unapproved = expense("4", -10.0, ExpenseStatus::Pending);
        pending_unapproved.approved = Some(false);
        assert!(!pending_unapproved.counts_toward_spend());

        for status in [
            ExpenseStatus::Rejected,
            ExpenseStatus::Declined,
            ExpenseStatus::Reversed,
            ExpenseStatus::Refunded,
        ] {
            let mut e = expense("5", -10.0, status.clone());
            e.approved = Some(true);
            assert!(!e.counts_toward_spend(), "{:?} must not count", status);
        }
    }

    #[test]
    fn display_status_prefers_rejection() {
        let mut refund = expense("1", 5.0, ExpenseStatus::Refunded);
        assert_eq!(refund.display_status(), DisplayStatus::Refund);
        refund.approved = Some(false);
        assert_eq!(refund.display_status(), DisplayStatus::Rejected);

        assert_eq!(
            expense("2", -1.0, ExpenseStatus::Complete).display_status(),
            DisplayStatus::Approved
        );
        assert_eq!(
            expense("3", -1.0, ExpenseStatus::Declined).display_status(),
            DisplayStatus::Rejected
        );
        assert_eq!(
            expense("4", -1.0, ExpenseStatus::Pending).display_status(),
            DisplayStatus::Pending
        );
    }

    #[test]
    fn day_uses_reported_offset() {
        let mut e = expense("1", -1.0, ExpenseStatus::Complete);
        e.date = "2025-03-31T23:30:00-02:00".to_string();
        assert_eq!(e.day(), NaiveDate::from_ymd_opt(2025, 3, 31));

        e.date = "2025-04-01T10:00:00".to_string();
        assert_eq!(e.day(), NaiveDate::from_ymd_opt(2025, 4, 1));

        e.date = "2025-04-02".to_string();
        assert_eq!(e.day(), NaiveDate::from_ymd_opt(2025, 4, 2));

        e.date = "yesterday".to_string();
        assert_eq!(e.day(), None);
    }

    #[test]
    fn map_url_needs_both_coordinates() {
        let mut e = expense("1", -1.0, ExpenseStatus::Complete);
        assert_eq!(e.map_url(), None);
        e.latitude = Some(40.4);
        assert_eq!(e.map_url(), None);
        e.longitude = Some(-3.7);
        assert_eq!(
            e.map_url().as_deref(),
            Some("https://maps.apple.com/?q=40.4,-3.7&ll=40.4,-3.7")
        );
    }
}

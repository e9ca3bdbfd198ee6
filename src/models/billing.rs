use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BillingEntry {
    #[serde(default, rename = "created_at")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
}

/// Payload of `GET /billing`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingStatement {
    #[serde(default, rename = "bills")]
    pub entries: Vec<BillingEntry>,
    #[serde(default)]
    pub total: Option<f64>,
}

impl BillingStatement {
    /// Server-side total when reported, otherwise the running sum of entries.
    pub fn total(&self) -> f64 {
        self.total
            .unwrap_or_else(|| self.entries.iter().map(|e| e.amount).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_prefers_server_value() {
        let statement: BillingStatement = serde_json::from_value(serde_json::json!({
            "bills": [{"created_at": "2024-05-01T10:00:00", "description": "VM web1 - flavor M", "amount": 4.86}],
            "total": 12.5
        }))
        .unwrap();
        assert_eq!(statement.total(), 12.5);
    }

    #[test]
    fn total_sums_entries_when_missing() {
        let statement: BillingStatement = serde_json::from_value(serde_json::json!({
            "bills": [
                {"description": "a", "amount": 1.25},
                {"description": "b", "amount": 2.0}
            ]
        }))
        .unwrap();
        assert_eq!(statement.total(), 3.25);
    }
}

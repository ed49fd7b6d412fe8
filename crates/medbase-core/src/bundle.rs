//! FHIR `Bundle` assembly helpers.
//!
//! Search responses and transaction responses are built as raw JSON values;
//! the typed surface here is just the bundle type codes and entry builders.

use crate::time::now_instant_string;
use serde_json::{json, Value};
use uuid::Uuid;

/// Bundle type codes medbase produces or accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleType {
    Transaction,
    Batch,
    TransactionResponse,
    BatchResponse,
    Searchset,
    History,
}

impl BundleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Batch => "batch",
            Self::TransactionResponse => "transaction-response",
            Self::BatchResponse => "batch-response",
            Self::Searchset => "searchset",
            Self::History => "history",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "transaction" => Some(Self::Transaction),
            "batch" => Some(Self::Batch),
            "transaction-response" => Some(Self::TransactionResponse),
            "batch-response" => Some(Self::BatchResponse),
            "searchset" => Some(Self::Searchset),
            "history" => Some(Self::History),
            _ => None,
        }
    }

    /// The response type paired with a request bundle type.
    pub fn response_type(&self) -> Self {
        match self {
            Self::Batch => Self::BatchResponse,
            _ => Self::TransactionResponse,
        }
    }
}

/// A searchset entry with its full URL and search mode.
pub fn searchset_entry(base_url: &str, resource: Value) -> Value {
    let full_url = match (
        resource.get("resourceType").and_then(Value::as_str),
        resource.get("id").and_then(Value::as_str),
    ) {
        (Some(rt), Some(id)) => format!("{base_url}/{rt}/{id}"),
        _ => String::new(),
    };
    json!({
        "fullUrl": full_url,
        "resource": resource,
        "search": { "mode": "match" }
    })
}

/// Assemble a `searchset` Bundle.
pub fn searchset(
    entries: Vec<Value>,
    total: Option<u64>,
    self_link: &str,
    next_link: Option<&str>,
) -> Value {
    let mut links = vec![json!({ "relation": "self", "url": self_link })];
    if let Some(next) = next_link {
        links.push(json!({ "relation": "next", "url": next }));
    }
    let mut bundle = json!({
        "resourceType": "Bundle",
        "id": Uuid::new_v4().to_string(),
        "type": BundleType::Searchset.as_str(),
        "meta": { "lastUpdated": now_instant_string() },
        "link": links,
        "entry": entries,
    });
    if let Some(total) = total {
        bundle["total"] = json!(total);
    }
    bundle
}

/// A successful write entry in a transaction/batch response.
pub fn created_entry(resource: Value, location: &str) -> Value {
    json!({
        "resource": resource,
        "response": {
            "status": "201 Created",
            "location": location,
        }
    })
}

/// A failed entry carrying an `OperationOutcome`.
pub fn failed_entry(status: &str, outcome: Value) -> Value {
    json!({
        "response": {
            "status": status,
            "outcome": outcome,
        }
    })
}

/// Assemble a transaction/batch response Bundle.
pub fn response_bundle(bundle_type: BundleType, entries: Vec<Value>) -> Value {
    json!({
        "resourceType": "Bundle",
        "id": Uuid::new_v4().to_string(),
        "type": bundle_type.as_str(),
        "timestamp": now_instant_string(),
        "meta": { "lastUpdated": now_instant_string() },
        "entry": entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_type_roundtrip() {
        for t in [
            BundleType::Transaction,
            BundleType::Batch,
            BundleType::TransactionResponse,
            BundleType::BatchResponse,
            BundleType::Searchset,
            BundleType::History,
        ] {
            assert_eq!(BundleType::parse(t.as_str()), Some(t));
        }
        assert_eq!(BundleType::parse("document"), None);
    }

    #[test]
    fn test_response_type_mapping() {
        assert_eq!(
            BundleType::Transaction.response_type(),
            BundleType::TransactionResponse
        );
        assert_eq!(BundleType::Batch.response_type(), BundleType::BatchResponse);
    }

    #[test]
    fn test_searchset_shape() {
        let entry = searchset_entry(
            "http://localhost:8080/fhir",
            json!({ "resourceType": "Patient", "id": "p1" }),
        );
        let bundle = searchset(
            vec![entry],
            Some(1),
            "http://localhost:8080/fhir/Patient?name=smith",
            Some("http://localhost:8080/fhir/Patient?name=smith&_offset=10"),
        );

        assert_eq!(bundle["type"], "searchset");
        assert_eq!(bundle["total"], 1);
        assert_eq!(bundle["link"][0]["relation"], "self");
        assert_eq!(bundle["link"][1]["relation"], "next");
        assert_eq!(
            bundle["entry"][0]["fullUrl"],
            "http://localhost:8080/fhir/Patient/p1"
        );
        assert_eq!(bundle["entry"][0]["search"]["mode"], "match");
    }

    #[test]
    fn test_searchset_without_total_omits_field() {
        let bundle = searchset(vec![], None, "http://x/fhir/Patient", None);
        assert!(bundle.get("total").is_none());
        assert_eq!(bundle["link"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_created_and_failed_entries() {
        let ok = created_entry(json!({"resourceType": "Patient", "id": "p1"}), "Patient/p1");
        assert_eq!(ok["response"]["status"], "201 Created");
        assert_eq!(ok["response"]["location"], "Patient/p1");

        let failed = failed_entry(
            "400 Bad Request",
            json!({"resourceType": "OperationOutcome"}),
        );
        assert!(failed.get("resource").is_none());
        assert_eq!(failed["response"]["outcome"]["resourceType"], "OperationOutcome");
    }
}

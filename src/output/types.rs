use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

pub const SCHEMA_VERSION: &str = "insights.v1";

#[derive(Debug, Clone, Serialize, Default)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u128>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub schema_version: &'static str,
    pub time: DateTime<Utc>,
    pub run_id: Uuid,
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl Envelope {
    pub fn result<T: Serialize>(op: &'static str, result: &T, meta: Option<Meta>) -> Result<Self, serde_json::Error> {
        Ok(Envelope {
            schema_version: SCHEMA_VERSION,
            time: Utc::now(),
            run_id: Uuid::new_v4(),
            op,
            result: Some(serde_json::to_value(result)?),
            meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_wraps_the_result_under_its_op() {
        let result = json!({"urls": ["https://a.example/1"]});
        let env = Envelope::result("insights", &result, None).expect("to serialize result");
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["schema_version"], "insights.v1");
        assert_eq!(v["op"], "insights");
        assert_eq!(v["result"]["urls"][0], "https://a.example/1");
        assert!(v.get("meta").is_none());
    }

    #[test]
    fn duration_is_reported_when_measured() {
        let meta = Meta { duration_ms: Some(42) };
        let v = serde_json::to_value(Envelope::result("post", &json!({}), Some(meta)).unwrap()).unwrap();
        assert_eq!(v["meta"]["duration_ms"], 42);
    }
}

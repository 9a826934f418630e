use std::time::Duration;

use graphca_domain::ResourceId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time::Instant;

/// Attribute map for one resource instance, plus the object ID once known.
///
/// `prior` holds the last observed attributes during an update so that
/// resources can send only what changed. `deadline` is when the lifecycle
/// call running on this instance must finish.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceData {
    id:       Option<ResourceId>,
    fields:   Map<String, Value>,
    #[serde(skip)]
    prior:    Option<Map<String, Value>>,
    #[serde(skip)]
    deadline: Option<Instant>,
}

impl ResourceData {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { id: None, fields, prior: None, deadline: None }
    }

    /// An instance known only by ID, as for read, delete and import.
    pub fn existing(id: ResourceId) -> Self {
        Self { id: Some(id), ..Default::default() }
    }

    pub fn with_prior(mut self, prior: Map<String, Value>) -> Self {
        self.prior = Some(prior);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// `budget`, cut short by whatever remains before the deadline.
    pub fn time_left(&self, budget: Duration) -> Duration {
        match self.deadline {
            Some(deadline) => budget.min(deadline.saturating_duration_since(Instant::now())),
            None => budget,
        }
    }

    pub fn id(&self) -> Option<&ResourceId> {
        self.id.as_ref()
    }

    pub fn set_id(&mut self, id: ResourceId) {
        self.id = Some(id);
    }

    /// Mark the instance as gone remotely.
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn prior(&self) -> Option<&Map<String, Value>> {
        self.prior.as_ref()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }

    pub fn decode_prior<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.prior
            .as_ref()
            .map(|p| serde_json::from_value(Value::Object(p.clone())))
    }

    /// Replace every attribute with the serialized form of `record`.
    pub fn set_from<T: Serialize>(&mut self, record: &T) -> Result<(), serde_json::Error> {
        self.fields = match serde_json::to_value(record)? {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                map
            }
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn prior_decodes_separately_from_desired() {
        #[derive(serde::Deserialize)]
        struct Named {
            display_name: String,
        }

        let data = ResourceData::new(map(json!({ "display_name": "new" })))
            .with_prior(map(json!({ "display_name": "old" })));
        let desired: Named = data.decode().unwrap();
        let prior: Named = data.decode_prior().unwrap().unwrap();
        assert_eq!(desired.display_name, "new");
        assert_eq!(prior.display_name, "old");
        assert!(ResourceData::new(Map::new()).decode_prior::<Named>().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn time_left_is_capped_by_deadline() {
        let budget = Duration::from_secs(30);
        assert_eq!(ResourceData::default().time_left(budget), budget);

        let data = ResourceData::default().with_deadline(Instant::now() + Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(data.time_left(budget), Duration::from_secs(6));
        assert_eq!(data.time_left(Duration::from_secs(2)), Duration::from_secs(2));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(data.time_left(budget), Duration::ZERO);
    }

    #[test]
    fn set_from_replaces_fields() {
        let mut data = ResourceData::new(map(json!({ "ip": { "ip_ranges": [] }, "display_name": "x" })));
        data.set_from(&json!({ "display_name": "y", "country": {} })).unwrap();
        assert!(data.get("ip").is_none());
        assert_eq!(data.get("display_name"), Some(&json!("y")));
    }
}

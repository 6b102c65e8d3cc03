pub mod events;
pub mod gateway;
pub mod player;
pub mod track;

use serde_json::Value;

/// Deep merges `b` into `a`, objects key by key, anything else replaced.
pub fn merge(a: &mut Value, b: Value) {
    match (a, b) {
        (a @ &mut Value::Object(_), Value::Object(b)) => {
            if let Some(a) = a.as_object_mut() {
                for (k, v) in b {
                    merge(a.entry(k).or_insert(Value::Null), v);
                }
            }
        }

        (a, b) => *a = b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_keeps_untouched_keys() {
        let mut record = json!({ "volume": 90, "paused": true, "voice": { "a": 1 } });

        merge(&mut record, json!({ "volume": 40, "voice": { "b": 2 } }));

        assert_eq!(record, json!({ "volume": 40, "paused": true, "voice": { "a": 1, "b": 2 } }));
    }
}

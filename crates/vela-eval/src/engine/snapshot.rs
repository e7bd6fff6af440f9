//! Snapshot envelope: `{ schema_version, session_epoch, states }` with
//! per-node opaque payloads.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value as Json, json};
use vela_common::{EngineError, ErrorKind};

use super::exec::WarmupStatus;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct StateEntry {
    pub node_id: String,
    pub warmup_status: WarmupStatus,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEnvelope {
    pub schema_version: u32,
    pub session_epoch: u64,
    pub states: Vec<StateEntry>,
}

impl SnapshotEnvelope {
    pub fn new(session_epoch: u64, states: Vec<StateEntry>) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            session_epoch,
            states,
        }
    }

    pub fn to_json(&self) -> Json {
        let states: Vec<Json> = self
            .states
            .iter()
            .map(|s| {
                let mut obj = Map::new();
                obj.insert("node_id".into(), json!(s.node_id));
                obj.insert("warmup_status".into(), json!(s.warmup_status.as_str()));
                obj.insert("payload_b64".into(), json!(BASE64.encode(&s.payload)));
                Json::Object(obj)
            })
            .collect();
        let mut obj = Map::new();
        obj.insert("schema_version".into(), json!(self.schema_version));
        obj.insert("session_epoch".into(), json!(self.session_epoch));
        obj.insert("states".into(), Json::Array(states));
        Json::Object(obj)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }

    pub fn from_json(json: &Json) -> Result<Self, EngineError> {
        let obj = json
            .as_object()
            .ok_or_else(|| bad_envelope("snapshot must be an object"))?;
        let schema_version = obj
            .get("schema_version")
            .and_then(Json::as_u64)
            .ok_or_else(|| bad_envelope("missing schema_version"))? as u32;
        if schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(EngineError::new(ErrorKind::SnapshotMismatch)
                .with_message(format!(
                    "snapshot schema {schema_version} != supported {SNAPSHOT_SCHEMA_VERSION}"
                ))
                .with_detail("expected_schema", SNAPSHOT_SCHEMA_VERSION)
                .with_detail("got_schema", schema_version));
        }
        let session_epoch = obj
            .get("session_epoch")
            .and_then(Json::as_u64)
            .ok_or_else(|| bad_envelope("missing session_epoch"))?;
        let states = obj
            .get("states")
            .and_then(Json::as_array)
            .ok_or_else(|| bad_envelope("missing states"))?
            .iter()
            .map(|s| {
                let s = s
                    .as_object()
                    .ok_or_else(|| bad_envelope("state entry must be an object"))?;
                let node_id = s
                    .get("node_id")
                    .and_then(Json::as_str)
                    .ok_or_else(|| bad_envelope("state entry missing node_id"))?
                    .to_string();
                let warmup_status = s
                    .get("warmup_status")
                    .and_then(Json::as_str)
                    .and_then(WarmupStatus::parse)
                    .ok_or_else(|| bad_envelope("state entry missing warmup_status"))?;
                let payload = s
                    .get("payload_b64")
                    .and_then(Json::as_str)
                    .ok_or_else(|| bad_envelope("state entry missing payload_b64"))
                    .and_then(|b64| {
                        BASE64
                            .decode(b64)
                            .map_err(|e| bad_envelope(&format!("invalid payload: {e}")))
                    })?;
                Ok(StateEntry {
                    node_id,
                    warmup_status,
                    payload,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;
        Ok(Self {
            schema_version,
            session_epoch,
            states,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        let json: Json = serde_json::from_slice(bytes)
            .map_err(|e| bad_envelope(&format!("invalid snapshot JSON: {e}")))?;
        Self::from_json(&json)
    }
}

fn bad_envelope(msg: &str) -> EngineError {
    EngineError::new(ErrorKind::SnapshotMismatch).with_message(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let envelope = SnapshotEnvelope::new(
            7,
            vec![StateEntry {
                node_id: "n00deadbeef".into(),
                warmup_status: WarmupStatus::Ready,
                payload: vec![1, 2, 3],
            }],
        );
        let bytes = envelope.to_bytes();
        let back = SnapshotEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn wrong_schema_version_is_a_mismatch() {
        let err =
            SnapshotEnvelope::from_bytes(br#"{"schema_version":9,"session_epoch":0,"states":[]}"#)
                .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SnapshotMismatch);
    }
}

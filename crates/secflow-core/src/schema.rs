use serde_json::{json, Value};

/// Metadata keys the finalizer insists on before promoting an artifact.
pub const REQUIRED_METADATA_FIELDS: [&str; 7] = [
    "fileName",
    "sampleType",
    "sampleId",
    "hash",
    "converterVersion",
    "generatedAt",
    "secflowCount",
];

pub const REQUIRED_SECFLOW_FIELDS: [&str; 13] = [
    "src",
    "srcPort",
    "dst",
    "dstPort",
    "protocol",
    "name",
    "direction",
    "startTime",
    "duration",
    "sourceBytes",
    "destBytes",
    "sourcePackets",
    "destPackets",
];

pub fn secflow_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://secflow.dev/schemas/secflow_output_v1.schema.json",
        "title": "Secflow Output v1",
        "description": "One converted sample: metadata plus its ordered Secflows",
        "type": "object",
        "properties": {
            "metadata": { "$ref": "#/$defs/SampleMetadata" },
            "secflows": { "type": "array", "items": { "$ref": "#/$defs/Secflow" } }
        },
        "required": ["metadata", "secflows"],
        "$defs": {
            "SampleMetadata": {
                "type": "object",
                "properties": {
                    "fileName": { "type": "string" },
                    "sampleType": { "type": "string", "enum": ["pcap", "zeek", "interflow"] },
                    "sampleId": { "type": "string", "format": "uuid" },
                    "hash": { "type": "string", "pattern": "^[0-9a-f]{64}$" },
                    "converterVersion": { "type": "string" },
                    "generatedAt": { "type": "string", "format": "date-time" },
                    "trafficStart": { "type": ["string", "null"], "format": "date-time" },
                    "trafficEnd": { "type": ["string", "null"], "format": "date-time" },
                    "secflowCount": { "type": "integer", "minimum": 1 }
                },
                "required": REQUIRED_METADATA_FIELDS
            },
            "Protocol": {
                "oneOf": [
                    { "type": "string", "enum": ["tcp", "udp", "icmp"] },
                    {
                        "type": "object",
                        "properties": { "other": { "type": "integer", "minimum": 0, "maximum": 255 } },
                        "required": ["other"]
                    }
                ]
            },
            "Secflow": {
                "type": "object",
                "properties": {
                    "src": { "type": "string" },
                    "srcPort": { "type": "integer", "minimum": 0, "maximum": 65535 },
                    "dst": { "type": "string" },
                    "dstPort": { "type": "integer", "minimum": 0, "maximum": 65535 },
                    "protocol": { "$ref": "#/$defs/Protocol" },
                    "session": { "type": "string" },
                    "name": { "type": "string" },
                    "nameSource": { "type": "string", "enum": ["address", "passive_dns"] },
                    "direction": { "type": "string", "enum": ["outbound", "inbound", "external"] },
                    "startTime": { "type": "string", "format": "date-time" },
                    "duration": { "type": "number", "minimum": 0 },
                    "sourceBytes": { "type": "integer", "minimum": 0 },
                    "destBytes": { "type": "integer", "minimum": 0 },
                    "sourcePackets": { "type": "integer", "minimum": 0 },
                    "destPackets": { "type": "integer", "minimum": 0 }
                },
                "required": REQUIRED_SECFLOW_FIELDS
            }
        }
    })
}

pub fn generate_output_schema() -> String {
    format!("{:#}", secflow_schema())
}

/// Names from `required` that `object` lacks or holds as null.
pub fn missing_fields<'a>(object: &Value, required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .filter(|field| object.get(**field).map_or(true, Value::is_null))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use chrono::Utc;

    #[test]
    fn test_schema_generates_valid_json() {
        let schema = generate_output_schema();
        let parsed: Value = serde_json::from_str(&schema).unwrap();
        assert_eq!(parsed["title"], "Secflow Output v1");
        assert!(parsed["$defs"]["Secflow"].is_object());
        assert_eq!(parsed["$defs"]["Secflow"]["required"].as_array().unwrap().len(), REQUIRED_SECFLOW_FIELDS.len());
    }

    #[test]
    fn test_required_fields_match_serialized_secflow() {
        let key = FlowKey::new("10.0.0.1".parse().unwrap(), 1, "8.8.8.8".parse().unwrap(), 53, TransportProtocol::Udp);
        let flow = Secflow::open(key, None, Direction::Outbound, Utc::now());
        let value = serde_json::to_value(&flow).unwrap();
        assert!(missing_fields(&value, &REQUIRED_SECFLOW_FIELDS).is_empty());

        let properties = &secflow_schema()["$defs"]["Secflow"]["properties"];
        for key in value.as_object().unwrap().keys() {
            assert!(properties.get(key).is_some(), "{key} missing from schema");
        }
    }

    #[test]
    fn test_missing_fields_reports_nulls() {
        let value = json!({ "fileName": "a.pcap", "hash": null });
        assert_eq!(missing_fields(&value, &["fileName", "hash", "sampleId"]), vec!["hash", "sampleId"]);
    }
}

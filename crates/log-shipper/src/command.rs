//! Decoding of inbound log commands into events.
//!
//! A command is a JSON object whose `params` carry the producing business,
//! the user id, the action and a JSON body:
//!
//! ```text
//! {"params": {"momoid": "u-1", "businessName": "orders", "type": "click", "body": {...}}}
//! ```
//!
//! The body is tagged with `business_type` and the event body becomes
//! `"{momoid}\t{type}\t{body_json}"`.

use crate::error::{ShipperError, ShipperResult};
use crate::event::LogEvent;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
struct Command {
    params: Map<String, Value>,
}

/// Decode a raw command into `(business, event)`.
pub fn decode_command(raw: &[u8]) -> ShipperResult<(String, LogEvent)> {
    let command: Command = serde_json::from_slice(raw)
        .map_err(|e| ShipperError::Decode(format!("invalid command JSON: {}", e)))?;
    let mut params = command.params;

    let momoid = string_param(&params, "momoid")?;
    let business = string_param(&params, "businessName")?;
    let action = string_param(&params, "type")?;

    let mut body = match params.remove("body") {
        Some(Value::Object(body)) => body,
        Some(_) => return Err(ShipperError::Decode("param 'body' must be an object".to_string())),
        None => return Err(ShipperError::Decode("missing param 'body'".to_string())),
    };
    body.insert("business_type".to_string(), Value::String(business.clone()));
    let body_json = serde_json::to_string(&body)?;

    let line = format!("{}\t{}\t{}", momoid, action, body_json);
    let event = LogEvent::new(business.clone(), action, line.into_bytes());
    Ok((business, event))
}

fn string_param(params: &Map<String, Value>, name: &str) -> ShipperResult<String> {
    match params.get(name) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(ShipperError::Decode(format!("param '{}' must be a string", name))),
        None => Err(ShipperError::Decode(format!("missing param '{}'", name))),
    }
}

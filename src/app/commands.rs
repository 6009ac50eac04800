//! Inbound bus commands.
//!
//! A command envelope is a flat JSON object:
//!
//! ```json
//! {"type": "cmd", "tenant_id": "acme", "vpin": "V3", "value": 1}
//! ```
//!
//! `type` and `tenant_id` are optional but, when present, must match.
//! `pin` is accepted in place of `vpin`.  `value` may be a bool, an
//! integer, a float or a numeric string; it is always normalised to `i32`.

use serde_json::{Map, Value};

use crate::error::CommandError;

/// A decoded command, handed to the host callback and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub vpin: String,
    pub value: i32,
}

/// Decode and filter one inbound envelope against the configured tenant.
pub fn parse_command(payload: &[u8], tenant_id: &str) -> Result<PendingCommand, CommandError> {
    let doc: Map<String, Value> =
        serde_json::from_slice(payload).map_err(|_| CommandError::Malformed)?;

    if let Some(kind) = doc.get("type").and_then(Value::as_str) {
        if !kind.is_empty() && kind != "cmd" {
            return Err(CommandError::UnsupportedType);
        }
    }

    if let Some(tenant) = doc.get("tenant_id").and_then(Value::as_str) {
        if !tenant.is_empty() && tenant != tenant_id {
            return Err(CommandError::TenantMismatch);
        }
    }

    let vpin = ["vpin", "pin"]
        .iter()
        .filter_map(|k| doc.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .ok_or(CommandError::MissingPin)?;

    let value = match doc.get("value") {
        None | Some(Value::Null) => return Err(CommandError::MissingValue),
        Some(v) => normalize_value(v),
    };

    Ok(PendingCommand {
        vpin: vpin.to_owned(),
        value,
    })
}

/// Collapse any JSON scalar to an integer command value.
///
/// Bools map to 0/1, floats round half away from zero, strings parse
/// leniently (leading integer prefix, otherwise 0).  Out-of-range
/// numbers saturate.  Arrays and objects yield 0.
pub fn normalize_value(v: &Value) -> i32 {
    match v {
        Value::Bool(b) => i32::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                saturate(i)
            } else if let Some(u) = n.as_u64() {
                saturate(i64::try_from(u).unwrap_or(i64::MAX))
            } else {
                let f = n.as_f64().unwrap_or(0.0).round();
                // `as` saturates and maps NaN to 0.
                f as i32
            }
        }
        Value::String(s) => parse_lenient_int(s),
        _ => 0,
    }
}

/// `atol`-style parse: optional whitespace, optional sign, then digits up
/// to the first non-digit.  No digits at all yields 0.
pub fn parse_lenient_int(s: &str) -> i32 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut acc: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        acc = acc.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }
    saturate(if negative { -acc } else { acc })
}

fn saturate(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

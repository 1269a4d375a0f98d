//! Store-method converters — pure functions mapping a raw varbind (OID
//! suffix past the queried base, plus its decoded value) to the index/value
//! pair that lands in template or label storage.

use crate::config::StoreMethod;

/// A varbind value independent of `snmp2`'s borrowed lifetime, so converters
/// stay free functions instead of threading a session lifetime through.
#[derive(Debug, Clone)]
pub enum RawValue {
    Integer(i64),
    OctetString(Vec<u8>),
    IpAddress([u8; 4]),
    Counter32(u32),
    Counter64(u64),
    Unsigned32(u32),
    Timeticks(u32),
    ObjectIdentifier(Vec<u32>),
    Null,
    Unknown,
}

impl RawValue {
    /// Printable rendering used by the `value` store method and by
    /// everything else that needs a display form.
    fn display(&self) -> String {
        match self {
            RawValue::Integer(i) => i.to_string(),
            RawValue::OctetString(bytes) => printable_ascii(bytes),
            RawValue::IpAddress(octets) => {
                format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
            }
            RawValue::Counter32(c) => c.to_string(),
            RawValue::Counter64(c) => c.to_string(),
            RawValue::Unsigned32(u) => u.to_string(),
            RawValue::Timeticks(t) => t.to_string(),
            RawValue::ObjectIdentifier(components) => components
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join("."),
            RawValue::Null | RawValue::Unknown => String::new(),
        }
    }

    fn as_bytes(&self) -> Vec<u8> {
        match self {
            RawValue::OctetString(bytes) => bytes.clone(),
            other => other.display().into_bytes(),
        }
    }
}

fn printable_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| b.is_ascii_graphic() || **b == b' ')
        .map(|b| *b as char)
        .collect()
}

/// Splits the varbind's OID suffix (everything past the queried base) into
/// the row index and the configured trailing `oid_suffix`, discarding the
/// row if the configured tail doesn't match.
pub fn compute_index(suffix: &[u32], configured_tail: Option<&[u32]>) -> Option<String> {
    let index_components = match configured_tail {
        None => suffix,
        Some(tail) => {
            if !suffix.ends_with(tail) {
                return None;
            }
            &suffix[..suffix.len() - tail.len()]
        }
    };
    Some(
        index_components
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join("."),
    )
}

/// Apply a store method to a decoded varbind, producing the string that
/// lands in template/label storage or becomes a metric value. `None` means
/// the row is dropped (conversion failure, logged by the caller).
pub fn apply_store_method(method: StoreMethod, suffix: &[u32], value: &RawValue) -> Option<String> {
    match method {
        StoreMethod::Value => Some(value.display()),
        StoreMethod::SubtreeAsString => subtree_as_string(suffix),
        StoreMethod::SubtreeAsIp => subtree_as_ip(suffix),
        StoreMethod::HexAsIp => hex_as_ip(value),
        StoreMethod::ExtractRealm => extract_realm(&value.display()),
        StoreMethod::Milli => milli(&value.display()),
    }
}

fn subtree_as_string(suffix: &[u32]) -> Option<String> {
    let &len = suffix.first()?;
    let chars = suffix.get(1..1 + len as usize)?;
    Some(
        chars
            .iter()
            .filter_map(|&c| char::from_u32(c))
            .collect::<String>(),
    )
}

fn subtree_as_ip(suffix: &[u32]) -> Option<String> {
    if suffix.len() < 4 {
        return None;
    }
    let tail = &suffix[suffix.len() - 4..];
    Some(format!("{}.{}.{}.{}", tail[0], tail[1], tail[2], tail[3]))
}

fn hex_as_ip(value: &RawValue) -> Option<String> {
    let bytes = value.as_bytes();
    if bytes.len() < 4 {
        return None;
    }
    Some(format!(
        "{}.{}.{}.{}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    ))
}

fn extract_realm(value: &str) -> Option<String> {
    value.split('@').nth(1).map(|s| s.to_string())
}

fn milli(value: &str) -> Option<String> {
    let parsed: f64 = value.trim().parse().ok()?;
    Some((parsed / 1000.0).to_string())
}

//! OID resolution — maps symbolic names like `IF-MIB::ifDescr` to numeric
//! dotted OIDs.
//!
//! Full MIB-file parsing is out of scope; instead a small `MibResolver`
//! trait is injected into the querier at construction, replacing a
//! process-global MIB view with a constructor dependency.
//! [`BuiltinMibResolver`] covers numeric OIDs plus a handful of well-known
//! symbolic roots for the standard system/interface/bridge/entity MIBs.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MibResolveError {
    #[error("unknown symbolic OID {0:?}")]
    UnknownSymbol(String),
    #[error("malformed OID {0:?}")]
    Malformed(String),
}

/// Resolves a raw config OID string (numeric or `MODULE::name`) to its
/// numeric dotted form.
pub trait MibResolver: Send + Sync {
    fn resolve(&self, raw: &str) -> Result<String, MibResolveError>;
}

/// Numeric passthrough plus a built-in symbolic table, with resolved names
/// cached for the lifetime of the resolver.
pub struct BuiltinMibResolver {
    table: HashMap<&'static str, &'static str>,
    cache: Mutex<HashMap<String, String>>,
}

impl Default for BuiltinMibResolver {
    fn default() -> Self {
        BuiltinMibResolver::new()
    }
}

impl BuiltinMibResolver {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        table.insert("SNMPv2-MIB::sysDescr", "1.3.6.1.2.1.1.1");
        table.insert("SNMPv2-MIB::sysObjectID", "1.3.6.1.2.1.1.2");
        table.insert("SNMPv2-MIB::sysUpTime", "1.3.6.1.2.1.1.3");
        table.insert("SNMPv2-MIB::sysContact", "1.3.6.1.2.1.1.4");
        table.insert("SNMPv2-MIB::sysName", "1.3.6.1.2.1.1.5");
        table.insert("SNMPv2-MIB::sysLocation", "1.3.6.1.2.1.1.6");
        table.insert("IF-MIB::ifNumber", "1.3.6.1.2.1.2.1");
        table.insert("IF-MIB::ifIndex", "1.3.6.1.2.1.2.2.1.1");
        table.insert("IF-MIB::ifDescr", "1.3.6.1.2.1.2.2.1.2");
        table.insert("IF-MIB::ifType", "1.3.6.1.2.1.2.2.1.3");
        table.insert("IF-MIB::ifMtu", "1.3.6.1.2.1.2.2.1.4");
        table.insert("IF-MIB::ifSpeed", "1.3.6.1.2.1.2.2.1.5");
        table.insert("IF-MIB::ifPhysAddress", "1.3.6.1.2.1.2.2.1.6");
        table.insert("IF-MIB::ifAdminStatus", "1.3.6.1.2.1.2.2.1.7");
        table.insert("IF-MIB::ifOperStatus", "1.3.6.1.2.1.2.2.1.8");
        table.insert("IF-MIB::ifInOctets", "1.3.6.1.2.1.2.2.1.10");
        table.insert("IF-MIB::ifOutOctets", "1.3.6.1.2.1.2.2.1.16");
        table.insert("IF-MIB::ifName", "1.3.6.1.2.1.31.1.1.1.1");
        table.insert("IF-MIB::ifHighSpeed", "1.3.6.1.2.1.31.1.1.1.15");
        table.insert("IF-MIB::ifAlias", "1.3.6.1.2.1.31.1.1.1.18");
        table.insert("IP-MIB::ipNetToMediaPhysAddress", "1.3.6.1.2.1.4.22.1.2");
        table.insert("BRIDGE-MIB::dot1dTpFdbAddress", "1.3.6.1.2.1.17.4.3.1.1");
        table.insert("BRIDGE-MIB::dot1dTpFdbPort", "1.3.6.1.2.1.17.4.3.1.2");
        table.insert("ENTITY-MIB::entPhysicalDescr", "1.3.6.1.2.1.47.1.1.1.1.2");
        table.insert("ENTITY-MIB::entPhysicalName", "1.3.6.1.2.1.47.1.1.1.1.7");
        table.insert("ENTITY-MIB::entPhysicalSerialNum", "1.3.6.1.2.1.47.1.1.1.1.11");
        BuiltinMibResolver {
            table,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn looks_numeric(raw: &str) -> bool {
        raw.split('.').all(|c| c.chars().all(|ch| ch.is_ascii_digit()))
    }
}

impl MibResolver for BuiltinMibResolver {
    fn resolve(&self, raw: &str) -> Result<String, MibResolveError> {
        if let Some(cached) = self.cache.lock().unwrap().get(raw) {
            return Ok(cached.clone());
        }
        let resolved = if Self::looks_numeric(raw) {
            raw.to_string()
        } else {
            let (symbol, suffix) = match raw.split_once("::") {
                Some((module, rest)) => {
                    let mut parts = rest.splitn(2, '.');
                    let name = parts.next().unwrap_or("");
                    (format!("{module}::{name}"), parts.next())
                }
                None => return Err(MibResolveError::Malformed(raw.to_string())),
            };
            let base = self
                .table
                .get(symbol.as_str())
                .ok_or_else(|| MibResolveError::UnknownSymbol(raw.to_string()))?;
            match suffix {
                Some(tail) => format!("{base}.{tail}"),
                None => base.to_string(),
            }
        };
        self.cache
            .lock()
            .unwrap()
            .insert(raw.to_string(), resolved.clone());
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_oid_passes_through() {
        let resolver = BuiltinMibResolver::new();
        assert_eq!(resolver.resolve("1.3.6.1.2.1.2.2.1.2").unwrap(), "1.3.6.1.2.1.2.2.1.2");
    }

    #[test]
    fn resolves_known_symbol() {
        let resolver = BuiltinMibResolver::new();
        assert_eq!(
            resolver.resolve("IF-MIB::ifDescr").unwrap(),
            "1.3.6.1.2.1.2.2.1.2"
        );
    }

    #[test]
    fn resolves_symbol_with_sub_index() {
        let resolver = BuiltinMibResolver::new();
        assert_eq!(
            resolver.resolve("IF-MIB::ifDescr.0").unwrap(),
            "1.3.6.1.2.1.2.2.1.2.0"
        );
    }

    #[test]
    fn rejects_unknown_symbol() {
        let resolver = BuiltinMibResolver::new();
        assert!(matches!(
            resolver.resolve("ACME-MIB::whatsit"),
            Err(MibResolveError::UnknownSymbol(_))
        ));
    }
}

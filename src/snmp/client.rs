//! Async SNMP client built on `snmp2::AsyncSession` — one session cached
//! per (host, community, version) triple for the life of the process, since
//! a `snmp2` session is a thin UDP-socket wrapper bound to one peer.

use std::collections::{BTreeMap, HashMap};
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use snmp2::{AsyncSession, Oid, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{QueryType, SnmpVersion, StoreMethod};
use crate::snmp::convert::{self, RawValue};
use crate::snmp::mib::{MibResolveError, MibResolver};

const SNMP_PORT: u16 = 161;
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REPETITIONS: u32 = 25;

#[derive(Debug, Error)]
pub enum SnmpError {
    #[error("can't resolve oid: {0}")]
    OidResolution(#[from] MibResolveError),
    #[error("bad oid syntax {0:?}")]
    BadOid(String),
    #[error("can't resolve address for host {0}")]
    UnresolvableHost(String),
    #[error("snmp transport error: {0}")]
    Transport(String),
}

/// Outcome of one `query()` call.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Scalar(Option<String>),
    Indexed(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    host: String,
    community: String,
    version_is_v2c: bool,
}

pub struct SnmpQuerier {
    resolver: Arc<dyn MibResolver>,
    sessions: Mutex<HashMap<SessionKey, Arc<Mutex<AsyncSession>>>>,
}

impl SnmpQuerier {
    pub fn new(resolver: Arc<dyn MibResolver>) -> Self {
        SnmpQuerier {
            resolver,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    async fn session_for(
        &self,
        host: &str,
        community: &str,
        version: SnmpVersion,
    ) -> Result<Arc<Mutex<AsyncSession>>, SnmpError> {
        let key = SessionKey {
            host: host.to_string(),
            community: community.to_string(),
            version_is_v2c: matches!(version, SnmpVersion::V2c),
        };
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(&key) {
            return Ok(existing.clone());
        }
        let addr: SocketAddr = (host, SNMP_PORT)
            .to_socket_addrs()
            .map_err(|_| SnmpError::UnresolvableHost(host.to_string()))?
            .next()
            .ok_or_else(|| SnmpError::UnresolvableHost(host.to_string()))?;
        let session = match version {
            SnmpVersion::V1 => AsyncSession::new_v1(addr, community.as_bytes(), 0).await,
            SnmpVersion::V2c => AsyncSession::new_v2c(addr, community.as_bytes(), 0).await,
        }
        .map_err(|e| SnmpError::Transport(e.to_string()))?;
        let session = Arc::new(Mutex::new(session));
        sessions.insert(key, session.clone());
        Ok(session)
    }

    /// Resolve `oid_raw`, run the query per `query_type`, decode every
    /// returned varbind via `store_method`, and return the shaped outcome.
    /// Never returns `Err` to the scheduler — transport failures log and
    /// come back as an empty/null outcome per the propagation policy.
    pub async fn query(
        &self,
        host: &str,
        community: &str,
        version: SnmpVersion,
        oid_raw: &str,
        query_type: QueryType,
        store_method: StoreMethod,
        oid_suffix: Option<&[u32]>,
    ) -> QueryOutcome {
        match self
            .query_inner(host, community, version, oid_raw, query_type, store_method, oid_suffix)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("snmp query {} on {} failed: {}", oid_raw, host, e);
                match query_type {
                    QueryType::Get => QueryOutcome::Scalar(None),
                    QueryType::Walk => QueryOutcome::Indexed(BTreeMap::new()),
                }
            }
        }
    }

    async fn query_inner(
        &self,
        host: &str,
        community: &str,
        version: SnmpVersion,
        oid_raw: &str,
        query_type: QueryType,
        store_method: StoreMethod,
        oid_suffix: Option<&[u32]>,
    ) -> Result<QueryOutcome, SnmpError> {
        let resolved = self.resolver.resolve(oid_raw)?;
        let base = parse_oid(&resolved)?;
        let session = self.session_for(host, community, version).await?;

        match query_type {
            QueryType::Get => {
                let mut session = session.lock().await;
                let response = tokio::time::timeout(QUERY_TIMEOUT, session.get(&base))
                    .await
                    .map_err(|_| SnmpError::Transport("timeout".into()))?
                    .map_err(|e| SnmpError::Transport(e.to_string()))?;
                let value = response
                    .varbinds
                    .into_iter()
                    .next()
                    .map(|(_, v)| to_raw_value(&v));
                let decoded = value.and_then(|v| convert::apply_store_method(store_method, &[], &v));
                Ok(QueryOutcome::Scalar(decoded))
            }
            QueryType::Walk => {
                let mut out = BTreeMap::new();
                let mut current = base.clone();
                loop {
                    let response = {
                        let mut session = session.lock().await;
                        tokio::time::timeout(
                            QUERY_TIMEOUT,
                            session.getbulk(&[&current], 0, MAX_REPETITIONS),
                        )
                        .await
                        .map_err(|_| SnmpError::Transport("timeout".into()))?
                        .map_err(|e| SnmpError::Transport(e.to_string()))?
                    };

                    let mut last_oid = None;
                    let mut stop = false;
                    for (oid, value) in response.varbinds {
                        if matches!(value, Value::EndOfMibView) {
                            stop = true;
                            break;
                        }
                        let Some(suffix) = oid_suffix_components(&oid, &base) else {
                            stop = true;
                            break;
                        };
                        last_oid = Some(oid);
                        let raw = to_raw_value(&value);
                        let Some(index) = convert::compute_index(&suffix, oid_suffix) else {
                            debug!("row dropped: oid_suffix mismatch for {:?}", suffix);
                            continue;
                        };
                        if let Some(decoded) = convert::apply_store_method(store_method, &suffix, &raw) {
                            out.insert(index, decoded);
                        }
                    }
                    match last_oid {
                        Some(next) if !stop => current = next,
                        _ => break,
                    }
                }
                Ok(QueryOutcome::Indexed(out))
            }
        }
    }
}

fn parse_oid(numeric: &str) -> Result<Oid<'static>, SnmpError> {
    Oid::from_str(numeric).map_err(|_| SnmpError::BadOid(numeric.to_string()))
}

/// Components of `oid` past `base`; `None` if `oid` doesn't extend `base`
/// (walk has left the subtree).
fn oid_suffix_components(oid: &Oid<'_>, base: &Oid<'_>) -> Option<Vec<u32>> {
    if !oid.as_ref().starts_with(base.as_ref()) {
        return None;
    }
    Some(
        oid.as_ref()[base.as_ref().len()..]
            .iter()
            .map(|c| *c as u32)
            .collect(),
    )
}

fn to_raw_value(value: &Value<'_>) -> RawValue {
    match value {
        Value::Integer(i) => RawValue::Integer(*i),
        Value::OctetString(bytes) => RawValue::OctetString(bytes.to_vec()),
        Value::IpAddress(octets) => RawValue::IpAddress(*octets),
        Value::Counter32(c) => RawValue::Counter32(*c),
        Value::Counter64(c) => RawValue::Counter64(*c),
        Value::Unsigned32(u) => RawValue::Unsigned32(*u),
        Value::Timeticks(t) => RawValue::Timeticks(*t),
        Value::ObjectIdentifier(oid) => {
            RawValue::ObjectIdentifier(oid.as_ref().iter().map(|c| *c as u32).collect())
        }
        Value::Null => RawValue::Null,
        _ => RawValue::Unknown,
    }
}

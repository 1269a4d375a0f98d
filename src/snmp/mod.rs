//! SNMP client for polling remote agents.
//!
//! Built on `snmp2`'s async session (v1/v2c community-string only — see
//! non-goals), with OID resolution delegated to an injected [`mib::MibResolver`]
//! and value decoding delegated to pure functions in [`convert`].

pub mod client;
pub mod convert;
pub mod mib;

pub use client::{QueryOutcome, SnmpError, SnmpQuerier};
pub use mib::{BuiltinMibResolver, MibResolver};

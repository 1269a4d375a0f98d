//! Test suite, organized by:
//! - `unit/` - pure function and type tests against the public API
//! - `integration/` - config-to-sink pipeline tests

mod unit;
mod integration;

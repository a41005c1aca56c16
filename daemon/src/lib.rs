// Abacus daemon library
// Exposes the ledger engine for demos, benchmarks and tests

#[macro_use]
extern crate log;

pub mod core;

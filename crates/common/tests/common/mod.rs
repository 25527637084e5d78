//! Shared test utilities for repository integration tests
#![allow(dead_code)]

use std::sync::Arc;

use ::common::prelude::*;

/// A fixed point in time tests start from
pub const T0: Timestamp = 1_700_000_000.0;

/// Install a test subscriber once; honours RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A repo with the default schema and a manual clock set to [`T0`]
pub fn setup_repo() -> (DistributedRepo, ManualClock) {
    init_tracing();
    let clock = ManualClock::new(T0);
    let mut repo = DistributedRepo::with_codec(JsonCodec, Arc::new(clock.clone()));
    repo.init_default_schema();
    (repo, clock)
}

pub fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

pub fn propose_wire(repo: &DistributedRepo, bucket: &str, datum: &str, validity: Validity) -> String {
    repo.encode(&WireMessage::propose(addr(bucket), datum, validity))
        .unwrap()
}

pub fn dismiss_wire(repo: &DistributedRepo, bucket: &str, datum: &str, validity: Validity) -> String {
    repo.encode(&WireMessage::dismiss(addr(bucket), datum, validity))
        .unwrap()
}

/// Record `signer`'s signature over `wire`
pub fn sign(repo: &mut DistributedRepo, wire: &str, signer: &str) {
    let signed = repo
        .encode(&WireMessage::signed(
            content_hash(wire),
            signer,
            format!("{} signed by {}", content_hash(wire), signer),
        ))
        .unwrap();
    repo.process(&signed, "local", None).unwrap();
}

/// Seconds as a validity bound relative to [`T0`]
pub fn at(offset: i64) -> i64 {
    T0 as i64 + offset
}

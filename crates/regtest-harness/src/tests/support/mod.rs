//! Fakes standing in for daemons, the indexer and whole regtest stacks.

pub(crate) mod fake_chain;
pub(crate) mod fake_http;
pub(crate) mod stack;

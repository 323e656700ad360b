//! Behaviour suites and shared fakes for the harness.

pub(crate) mod support;

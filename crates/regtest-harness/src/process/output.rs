//! Relays child stdout and stderr into the log, one event per line.

use std::io::{BufRead, BufReader, Read};
use std::process::Child;
use std::thread;

use tracing::{debug, warn};

use super::PROCESS_TARGET;

/// Log target for relayed child output.
pub(crate) const OUTPUT_TARGET: &str = "regtest_harness::process::output";

pub(super) fn attach(child: &mut Child, name: &str) {
    if let Some(stdout) = child.stdout.take() {
        relay(name, "stdout", stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        relay(name, "stderr", stderr);
    }
}

// Relay threads are detached; they end when the child closes the pipe.
fn relay(name: &str, stream: &'static str, reader: impl Read + Send + 'static) {
    let process = name.to_owned();
    let spawned = thread::Builder::new()
        .name(format!("{name}-{stream}"))
        .spawn(move || {
            for line in BufReader::new(reader).lines().map_while(Result::ok) {
                debug!(target: OUTPUT_TARGET, process = %process, stream, "{line}");
            }
        });
    if let Err(error) = spawned {
        warn!(
            target: PROCESS_TARGET,
            process = name,
            stream,
            %error,
            "failed to start output relay"
        );
    }
}

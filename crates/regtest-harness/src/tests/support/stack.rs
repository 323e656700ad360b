//! A whole fake regtest stack for orchestrator tests.
//!
//! Two fake JSON-RPC servers on consecutive ports share one
//! [`FakeRegtest`] ledger, a fake indexer reports the ledger height, and
//! every "process" the harness launches is a sleeping shell.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tempfile::TempDir;

use super::fake_chain::FakeRegtest;
use super::fake_http::FakeHttpServer;
use crate::orchestrator::HarnessSettings;
use crate::process::Role;
use crate::retry::RetryPolicy;

const PORT_PAIR_ATTEMPTS: usize = 20;

/// Fake daemons and indexer plus a scratch work directory.
pub(crate) struct FakeStack {
    pub regtest: FakeRegtest,
    pub primary: FakeHttpServer,
    pub secondary: FakeHttpServer,
    pub indexer: FakeHttpServer,
    pub work_dir: TempDir,
}

impl FakeStack {
    pub fn start() -> Result<Self> {
        let regtest = FakeRegtest::new();
        let (primary, secondary) = daemon_pair(&regtest)?;
        let indexer = FakeHttpServer::spawn(regtest.status_handler("api"))?;
        Ok(Self {
            regtest,
            primary,
            secondary,
            indexer,
            work_dir: TempDir::new().context("work dir")?,
        })
    }

    /// Settings pointing the harness at this stack.
    pub fn settings(&self) -> Result<HarnessSettings> {
        Ok(quick_settings(
            &utf8_path(&self.work_dir)?,
            self.primary.port(),
            self.indexer.port(),
        ))
    }

    pub fn work_path(&self) -> Result<Utf8PathBuf> {
        utf8_path(&self.work_dir)
    }
}

/// Binds fake daemons for the primary and the secondary on `p` and `p + 1`.
fn daemon_pair(regtest: &FakeRegtest) -> Result<(FakeHttpServer, FakeHttpServer)> {
    for _ in 0..PORT_PAIR_ATTEMPTS {
        let primary = FakeHttpServer::spawn(regtest.rpc_handler(Role::Primary))?;
        let Some(next) = primary.port().checked_add(1) else {
            continue;
        };
        if let Ok(secondary) = FakeHttpServer::spawn_on(next, regtest.rpc_handler(Role::Secondary))
        {
            return Ok((primary, secondary));
        }
    }
    Err(anyhow!("no pair of consecutive free ports"))
}

/// Settings with sleeping shells for every process and short waits.
pub(crate) fn quick_settings(work_dir: &Utf8Path, rpc_port: u16, indexer_port: u16) -> HarnessSettings {
    HarnessSettings::default()
        .with_daemon_command("/bin/sh", ["-c", "exec sleep 30", "regtest-daemon"])
        .with_indexer_command("/bin/sh", ["-c", "exec sleep 30", "regtest-indexer"])
        .with_work_dir(work_dir.to_owned())
        .with_ports(rpc_port, indexer_port)
        .with_readiness(RetryPolicy::new(Duration::from_millis(10), 5))
        .with_sync(RetryPolicy::new(Duration::from_millis(10), 5))
        .with_shutdown_grace(Duration::from_millis(50))
        .with_run_timeout(Duration::from_secs(30))
}

pub(crate) fn utf8_path(dir: &TempDir) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .map_err(|path| anyhow!("non utf-8 temp path {}", path.display()))
}

pub(crate) fn is_alive(pid: u32) -> bool {
    i32::try_from(pid).is_ok_and(|raw| kill(Pid::from_raw(raw), None).is_ok())
}

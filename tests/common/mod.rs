#![allow(dead_code)]

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nix_remote::{
    AgentProcess, BackoffPolicy, LaunchSpec, Launcher, Probe, ProbeFailure, ProcessExit,
    Supervisor, SupervisorConfig,
};

/// How the scripted agent behaves.
#[derive(Clone, Copy, Debug, Default)]
pub struct Script {
    /// Number of failing probes before the agent answers; `None` never answers.
    pub ready_after: Option<u32>,
    /// Exit with this code once this many probes have run.
    pub exit_after: Option<(u32, i32)>,
    /// Keep running on terminate; only kill stops it.
    pub ignore_terminate: bool,
    /// Probes never complete.
    pub hang_probes: bool,
}

/// What the scripted agent observed.
#[derive(Debug, Default)]
pub struct Counters {
    pub launches: u32,
    pub probes: u32,
    pub terminates: u32,
    pub kills: u32,
    pub exited: Option<ProcessExit>,
}

#[derive(Clone, Default)]
pub struct Fake {
    pub script: Script,
    pub state: Arc<Mutex<Counters>>,
}

impl Fake {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            state: Arc::default(),
        }
    }

    pub fn counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.state.lock().unwrap()
    }

    pub fn supervisor(&self, cfg: SupervisorConfig) -> Supervisor {
        Supervisor::builder(cfg)
            .with_launcher(Arc::new(self.clone()))
            .with_probe(Arc::new(self.clone()))
            .build()
    }
}

impl Launcher for Fake {
    fn launch(&self, _spec: &LaunchSpec, _cwd: &Path) -> io::Result<Box<dyn AgentProcess>> {
        self.counters().launches += 1;
        let mut state = self.counters();
        state.exited = None;
        state.probes = 0;
        drop(state);
        Ok(Box::new(FakeProcess { fake: self.clone() }))
    }
}

#[async_trait]
impl Probe for Fake {
    async fn probe(&self, _target: &str, _credential: &Path) -> Result<(), ProbeFailure> {
        let probes = {
            let mut state = self.counters();
            state.probes += 1;
            state.probes
        };
        if self.script.hang_probes {
            std::future::pending::<()>().await;
        }
        match self.script.ready_after {
            Some(n) if probes > n => Ok(()),
            _ => Err(ProbeFailure::new("Connection refused")),
        }
    }
}

pub struct FakeProcess {
    fake: Fake,
}

#[async_trait]
impl AgentProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        let mut state = self.fake.counters();
        if state.exited.is_none() {
            if let Some((after, code)) = self.fake.script.exit_after {
                if state.probes >= after {
                    state.exited = Some(ProcessExit::with_code(code));
                }
            }
        }
        Ok(state.exited)
    }

    fn terminate(&mut self) -> io::Result<()> {
        let mut state = self.fake.counters();
        state.terminates += 1;
        if !self.fake.script.ignore_terminate && state.exited.is_none() {
            state.exited = Some(ProcessExit::signaled());
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        let mut state = self.fake.counters();
        state.kills += 1;
        if state.exited.is_none() {
            state.exited = Some(ProcessExit::signaled());
        }
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<ProcessExit> {
        loop {
            let exited = self.fake.counters().exited;
            if let Some(exit) = exited {
                return Ok(exit);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub fn spec() -> LaunchSpec {
    LaunchSpec::new("fake-builder", "fake")
        .target("builder@localhost")
        .credential("/nonexistent/key")
}

pub fn config(initial_ms: u64, max_time_ms: u64) -> SupervisorConfig {
    SupervisorConfig {
        backoff: BackoffPolicy {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_secs(5),
            max_time: Duration::from_millis(max_time_ms),
            factor: 1.2,
            ..BackoffPolicy::default()
        },
        grace: Duration::from_secs(1),
        ..SupervisorConfig::default()
    }
}

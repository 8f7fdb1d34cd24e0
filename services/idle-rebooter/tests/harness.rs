//! In-memory control API used by the idle-rebooter integration tests.
//!
//! Records every call, tracks how many `slave_info` calls overlap, and
//! replays scripted graceful-shutdown states per slave.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use buildfarm_slaveapi::{
    ActionResponse, ActionState, ControlApi, JobRecord, SlaveApiError, SlaveInfo, SlaveSummary,
};
use chrono::{DateTime, TimeZone, Utc};

/// Fixed evaluation instant shared by the tests.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn hours_before_now(hours: i64) -> f64 {
    (now() - chrono::Duration::hours(hours)).timestamp() as f64
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListSlaves,
    SlaveInfo(String),
    GracefulShutdown { slave: String, waittime: Duration },
    ShutdownStatus { slave: String, request_id: i64 },
    Reboot(String),
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        matches!(self, Call::GracefulShutdown { .. } | Call::Reboot(_))
    }

    pub fn slave(&self) -> Option<&str> {
        match self {
            Call::ListSlaves => None,
            Call::SlaveInfo(s) | Call::Reboot(s) => Some(s),
            Call::GracefulShutdown { slave, .. } | Call::ShutdownStatus { slave, .. } => Some(slave),
        }
    }
}

#[derive(Default)]
pub struct FakeControlApi {
    slaves: Vec<String>,
    history: HashMap<String, Vec<f64>>,
    shutdown_script: Mutex<HashMap<String, VecDeque<ActionState>>>,
    broken: HashSet<String>,
    panicking: HashSet<String>,
    list_fails: bool,
    info_delay: Duration,
    calls: Mutex<Vec<Call>>,
    active_info: AtomicUsize,
    max_active_info: AtomicUsize,
    next_request_id: AtomicUsize,
}

impl FakeControlApi {
    pub fn new() -> Self {
        Self {
            next_request_id: AtomicUsize::new(100),
            ..Default::default()
        }
    }

    /// Add a slave whose most recent job ended at `endtimes[0]`.
    pub fn with_slave(mut self, name: &str, endtimes: &[f64]) -> Self {
        self.slaves.push(name.to_string());
        self.history.insert(name.to_string(), endtimes.to_vec());
        self
    }

    /// Idle slave (last job six hours ago).
    pub fn with_idle_slave(self, name: &str) -> Self {
        self.with_slave(name, &[hours_before_now(6)])
    }

    /// Shutdown states returned by the POST and then by each poll; the last
    /// state repeats. Defaults to immediate SUCCESS.
    pub fn with_shutdown_states(self, name: &str, states: &[ActionState]) -> Self {
        self.shutdown_script
            .lock()
            .unwrap()
            .insert(name.to_string(), states.iter().copied().collect());
        self
    }

    /// `slave_info` fails permanently for this slave.
    pub fn with_broken_slave(mut self, name: &str) -> Self {
        self.slaves.push(name.to_string());
        self.broken.insert(name.to_string());
        self
    }

    /// `slave_info` panics for this slave.
    pub fn with_panicking_slave(mut self, name: &str) -> Self {
        self.slaves.push(name.to_string());
        self.panicking.insert(name.to_string());
        self
    }

    pub fn with_failing_listing(mut self) -> Self {
        self.list_fails = true;
        self
    }

    pub fn with_info_delay(mut self, delay: Duration) -> Self {
        self.info_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, slave: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.slave() == Some(slave))
            .collect()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutating).collect()
    }

    pub fn max_concurrent_info(&self) -> usize {
        self.max_active_info.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_shutdown_state(&self, slave: &str) -> ActionState {
        let mut script = self.shutdown_script.lock().unwrap();
        match script.get_mut(slave) {
            Some(states) if states.len() > 1 => states.pop_front().unwrap(),
            Some(states) => states.front().copied().unwrap_or(ActionState::Success),
            None => ActionState::Success,
        }
    }
}

#[async_trait]
impl ControlApi for FakeControlApi {
    async fn production_slaves(&self) -> Result<Vec<SlaveSummary>, SlaveApiError> {
        self.record(Call::ListSlaves);
        if self.list_fails {
            return Err(SlaveApiError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(self.slaves.iter().map(SlaveSummary::new).collect())
    }

    async fn slave_info(&self, name: &str) -> Result<SlaveInfo, SlaveApiError> {
        self.record(Call::SlaveInfo(name.to_string()));
        if self.panicking.contains(name) {
            panic!("control API fake told to panic for {name}");
        }

        let active = self.active_info.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_info.fetch_max(active, Ordering::SeqCst);
        if !self.info_delay.is_zero() {
            tokio::time::sleep(self.info_delay).await;
        }
        self.active_info.fetch_sub(1, Ordering::SeqCst);

        if self.broken.contains(name) {
            return Err(SlaveApiError::Decode("garbled".into()));
        }
        let recent_jobs = self
            .history
            .get(name)
            .map(|ends| {
                ends.iter()
                    .map(|&endtime| JobRecord::from_unix_seconds(endtime).unwrap())
                    .collect()
            })
            .unwrap_or_default();
        Ok(SlaveInfo { recent_jobs })
    }

    async fn request_graceful_shutdown(
        &self,
        name: &str,
        waittime: Duration,
    ) -> Result<ActionResponse, SlaveApiError> {
        self.record(Call::GracefulShutdown {
            slave: name.to_string(),
            waittime,
        });
        let requestid = self.next_request_id.fetch_add(1, Ordering::SeqCst) as i64;
        Ok(ActionResponse {
            state: self.next_shutdown_state(name),
            requestid,
        })
    }

    async fn shutdown_status(
        &self,
        name: &str,
        _waittime: Duration,
        request_id: i64,
    ) -> Result<ActionResponse, SlaveApiError> {
        self.record(Call::ShutdownStatus {
            slave: name.to_string(),
            request_id,
        });
        Ok(ActionResponse {
            state: self.next_shutdown_state(name),
            requestid: request_id,
        })
    }

    async fn request_reboot(&self, name: &str) -> Result<(), SlaveApiError> {
        self.record(Call::Reboot(name.to_string()));
        Ok(())
    }
}

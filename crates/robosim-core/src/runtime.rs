//! Execution contexts: one named OS thread per component.
//!
//! Each context loops `step -> wait(tick)` until its [`StopSignal`] fires or
//! the factory is dropped. Threads hold only a weak reference to the factory
//! between steps, so dropping the last [`Factory`] handle also winds them
//! down. A panicking step is caught and ends that context alone.

use std::collections::BTreeMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use crate::behavior::{Behavior, StepContext};
use crate::factory::{Factory, FactoryInner};
use crate::id::ComponentId;

// ---------------------------------------------------------------------------
// StopSignal
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag with an interruptible wait.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `timeout` or until stopped, whichever comes first. Returns
    /// true if the signal was stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// A running execution context.
pub(crate) struct AgentHandle {
    signal: Arc<StopSignal>,
    thread: JoinHandle<()>,
}

impl AgentHandle {
    pub(crate) fn spawn(
        factory: Weak<FactoryInner>,
        id: ComponentId,
        name: &str,
        behavior: Box<dyn Behavior>,
        tick: Duration,
    ) -> io::Result<Self> {
        let signal = Arc::new(StopSignal::new());
        let thread_signal = Arc::clone(&signal);
        let label = name.to_string();
        let thread = thread::Builder::new()
            .name(format!("agent-{name}"))
            .spawn(move || run_agent(factory, id, &label, behavior, &thread_signal, tick))?;
        Ok(Self { signal, thread })
    }

    pub(crate) fn signal(&self) {
        self.signal.stop();
    }

    /// Wait for the thread to finish. A context never joins itself; that
    /// happens when a behavior stops the simulation or removes its own
    /// component.
    pub(crate) fn join(self, id: ComponentId) {
        if self.thread.thread().id() == thread::current().id() {
            return;
        }
        if self.thread.join().is_err() {
            warn!(component = ?id, "execution context ended with a panic");
        }
    }
}

/// Signal every agent first, then join them all.
pub(crate) fn shutdown(agents: BTreeMap<ComponentId, AgentHandle>) {
    for agent in agents.values() {
        agent.signal();
    }
    for (id, agent) in agents {
        agent.join(id);
    }
}

fn run_agent(
    weak: Weak<FactoryInner>,
    id: ComponentId,
    name: &str,
    mut behavior: Box<dyn Behavior>,
    signal: &StopSignal,
    tick: Duration,
) {
    debug!(component = %name, "execution context started");
    loop {
        if signal.is_stopped() {
            break;
        }
        let Some(inner) = weak.upgrade() else {
            break;
        };
        let factory = Factory::from_inner(inner);
        let ctx = StepContext::new(&factory, id, signal);
        match panic::catch_unwind(AssertUnwindSafe(|| behavior.step(&ctx))) {
            Ok(outcome) => trace!(component = %name, ?outcome, "step"),
            Err(_) => {
                error!(component = %name, "behavior step panicked; stopping this context");
                break;
            }
        }
        drop(factory);
        if signal.wait_timeout(tick) {
            break;
        }
    }
    debug!(component = %name, "execution context finished");
}

/// Running flag plus the live contexts, keyed by component.
#[derive(Default)]
pub(crate) struct Runtime {
    pub(crate) running: bool,
    pub(crate) agents: BTreeMap<ComponentId, AgentHandle>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn wait_returns_early_when_stopped() {
        let signal = Arc::new(StopSignal::new());
        let waker = Arc::clone(&signal);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.stop();
        });
        let start = Instant::now();
        assert!(signal.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn wait_times_out_when_not_stopped() {
        let signal = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(5)));
        assert!(!signal.is_stopped());
    }

    #[test]
    fn stopped_signal_does_not_wait() {
        let signal = StopSignal::new();
        signal.stop();
        let start = Instant::now();
        assert!(signal.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

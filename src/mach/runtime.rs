use super::machine::{Machine, Step};
use super::{Fault, LoadError};
use crate::host::Host;

pub const DEFAULT_QUOTA: usize = 5000;

/// What the host loop should do after a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Quota used up; call `execute` again.
    Running,
    /// Console output since the last event.
    Print(String),
    /// A blocking syscall is waiting on `push_key`.
    AwaitingInput,
    /// Reported once, followed by `Halted`.
    Fault(Fault),
    Halted,
}

type HaltHook = Box<dyn FnMut(Option<&Fault>)>;

/// ## Cooperative scheduler
///
/// Runs the machine in bounded batches so the embedding loop can paint,
/// read keys and cancel between them.

pub struct Runtime {
    machine: Machine,
    quota: usize,
    fault: Option<Fault>,
    fault_reported: bool,
    halt_notified: bool,
    on_halt: Option<HaltHook>,
}

impl Default for Runtime {
    fn default() -> Runtime {
        Runtime::new(Host::default())
    }
}

impl Runtime {
    pub fn new(host: Host) -> Runtime {
        Runtime {
            machine: Machine::new(host),
            quota: DEFAULT_QUOTA,
            fault: None,
            fault_reported: false,
            halt_notified: false,
            on_halt: None,
        }
    }

    pub fn with_quota(mut self, quota: usize) -> Runtime {
        self.quota = quota.max(1);
        self
    }

    /// Called once each time the machine halts, with the fault if any.
    pub fn on_halt<F>(&mut self, hook: F)
    where
        F: FnMut(Option<&Fault>) + 'static,
    {
        self.on_halt = Some(Box::new(hook));
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    pub fn load(&mut self, image: &[u8]) -> Result<(), LoadError> {
        self.clear_status();
        self.machine.load(image)
    }

    pub fn reset(&mut self) {
        self.clear_status();
        self.machine.reset();
    }

    fn clear_status(&mut self) {
        self.fault = None;
        self.fault_reported = false;
        self.halt_notified = false;
    }

    /// Takes effect before the next instruction.
    pub fn stop(&mut self) {
        if self.machine.is_loaded() && !self.machine.is_halted() {
            tracing::debug!("stop requested");
            self.machine.halt();
        }
    }

    pub fn push_key(&mut self, key: u8) {
        self.machine.push_key(key);
    }

    pub fn is_halted(&self) -> bool {
        !self.machine.is_loaded() || self.machine.is_halted()
    }

    /// Run one batch of at most `quota` instructions.
    pub fn execute(&mut self) -> Event {
        if let Some(event) = self.pending() {
            return event;
        }
        let mut blocked = false;
        let mut steps = 0;
        while steps < self.quota {
            steps += 1;
            match self.machine.step() {
                Ok(Step::Continue) => {}
                Ok(Step::Blocked) => {
                    blocked = true;
                    break;
                }
                Ok(Step::Halted) => break,
                Err(fault) => {
                    tracing::error!("{}: {}", fault, self.machine.dump());
                    self.machine.halt();
                    self.fault = Some(fault);
                    break;
                }
            }
        }
        tracing::trace!(steps, "batch");
        if let Some(event) = self.pending() {
            return event;
        }
        if blocked {
            Event::AwaitingInput
        } else {
            Event::Running
        }
    }

    /// Batches until the machine halts or waits for input. Printed
    /// text stays in the console transcript.
    pub fn run(&mut self) -> Event {
        loop {
            match self.execute() {
                Event::Running | Event::Print(_) => continue,
                event => return event,
            }
        }
    }

    fn pending(&mut self) -> Option<Event> {
        if self.machine.console().has_output() {
            return Some(Event::Print(self.machine.console_mut().take_output()));
        }
        if !self.is_halted() {
            return None;
        }
        if let Some(rest) = self.machine.console_mut().flush() {
            return Some(Event::Print(rest));
        }
        if let Some(fault) = &self.fault {
            if !self.fault_reported {
                self.fault_reported = true;
                return Some(Event::Fault(fault.clone()));
            }
        }
        if !self.halt_notified && self.machine.is_loaded() {
            self.halt_notified = true;
            tracing::debug!("halted");
            if let Some(hook) = self.on_halt.as_mut() {
                hook(self.fault.as_ref());
            }
        }
        Some(Event::Halted)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Runtime {{ {:?} }}", self.machine)
    }
}

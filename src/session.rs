//! The session state machine owned by the emulation worker.

use log::Level;
use serde::Serialize;

use crate::cartridge::{RomIdentity, RomImage};
use crate::config::CoreConfig;
use crate::cpu::StepOutcome;
use crate::emulator::{Machine, PerformanceStats};
use crate::error::{ExecutionFault, SchedulerError};
use crate::telemetry::{LogRing, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Loaded,
    Running,
    Stopped,
    Faulted,
}

pub struct Session {
    config: CoreConfig,
    state: SessionState,
    rom: Option<RomImage>,
    machine: Option<Machine>,
    last_fault: Option<ExecutionFault>,
    log: LogRing,
    stats: PerformanceStats,
}

impl Session {
    pub fn new(config: CoreConfig) -> Self {
        let log = LogRing::new(config.log_capacity);
        Session {
            config,
            state: SessionState::Idle,
            rom: None,
            machine: None,
            last_fault: None,
            log,
            stats: PerformanceStats::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn rom(&self) -> Option<&RomImage> {
        self.rom.as_ref()
    }

    pub fn machine(&self) -> Option<&Machine> {
        self.machine.as_ref()
    }

    pub fn last_fault(&self) -> Option<&ExecutionFault> {
        self.last_fault.as_ref()
    }

    /// Replaces the cartridge; any previous machine state is discarded.
    pub fn load_rom(&mut self, image: RomImage) -> RomIdentity {
        let identity = image.identity();
        let header = image.header();
        let line = format!(
            "Loaded ROM: {} ({} KiB, id {}, entry {:#010x}, {:?})",
            identity.display_name,
            identity.size_bytes / 1024,
            header.game_id(),
            header.entry_point,
            image.source_order()
        );
        self.machine = None;
        self.last_fault = None;
        self.rom = Some(image);
        self.state = SessionState::Loaded;
        self.stats.clear();
        self.note(Level::Info, line);
        identity
    }

    pub fn start(&mut self) -> Result<(), SchedulerError> {
        match self.state {
            SessionState::Idle => Err(SchedulerError::NoRomLoaded),
            SessionState::Running => Err(SchedulerError::AlreadyRunning),
            SessionState::Faulted => Err(SchedulerError::Faulted),
            SessionState::Loaded => {
                let rom = self.rom.as_ref().ok_or(SchedulerError::NoRomLoaded)?;
                let machine = Machine::boot(rom, self.config.rdram_size());
                let line = format!(
                    "Emulation started at {:#010x} ({} MiB RDRAM)",
                    machine.cpu.pc(),
                    self.config.rdram_size() >> 20
                );
                self.stats.restart(machine.cpu.cycles());
                self.machine = Some(machine);
                self.state = SessionState::Running;
                self.note(Level::Info, line);
                Ok(())
            }
            SessionState::Stopped => {
                let cycles = self.cycles();
                self.stats.restart(cycles);
                self.state = SessionState::Running;
                self.note(Level::Info, format!("Emulation resumed at cycle {}", cycles));
                Ok(())
            }
        }
    }

    pub fn stop(&mut self) -> Result<(), SchedulerError> {
        if self.state != SessionState::Running {
            return Err(SchedulerError::NotRunning);
        }
        self.state = SessionState::Stopped;
        self.stats.clear();
        let line = match &self.machine {
            Some(m) => format!(
                "Emulation stopped at {:#010x} after {} cycles",
                m.cpu.pc(),
                m.cpu.cycles()
            ),
            None => String::from("Emulation stopped"),
        };
        self.note(Level::Info, line);
        Ok(())
    }

    /// Drops the machine and any fault; the ROM stays loaded.
    pub fn reset(&mut self) -> Result<(), SchedulerError> {
        if self.state == SessionState::Idle {
            return Err(SchedulerError::NoRomLoaded);
        }
        self.machine = None;
        self.last_fault = None;
        self.state = SessionState::Loaded;
        self.stats.clear();
        self.note(Level::Info, String::from("Session reset"));
        Ok(())
    }

    /// Executes one instruction while running or stopped; a no-op otherwise.
    pub fn step(&mut self) -> Result<StepOutcome, ExecutionFault> {
        if !matches!(self.state, SessionState::Running | SessionState::Stopped) {
            return Ok(StepOutcome::Halted);
        }
        let Some(machine) = self.machine.as_mut() else {
            return Ok(StepOutcome::Halted);
        };
        let result = machine.step();
        if let Err(fault) = result {
            self.enter_fault(fault);
        }
        result
    }

    /// Runs up to `budget` instructions while running; returns how many retired.
    pub fn run_slice(&mut self, budget: u64) -> u64 {
        if self.state != SessionState::Running {
            return 0;
        }
        let Some(machine) = self.machine.as_mut() else {
            return 0;
        };

        let mut executed = 0;
        let mut fault = None;
        while executed < budget {
            if let Err(f) = machine.step() {
                fault = Some(f);
                break;
            }
            executed += 1;
        }

        if let Some(fault) = fault {
            self.enter_fault(fault);
        }
        executed
    }

    pub fn cycles(&self) -> u64 {
        self.machine.as_ref().map_or(0, |m| m.cpu.cycles())
    }

    /// Builds the next telemetry snapshot and closes the metrics window.
    pub fn snapshot(&mut self) -> Snapshot {
        let cycles = self.cycles();
        if self.state == SessionState::Running {
            self.stats.sample(cycles);
        }
        let running = self.state == SessionState::Running;
        Snapshot {
            sequence: 0,
            state: self.state,
            running,
            rom_name: self.rom.as_ref().map(|r| r.display_name().to_string()),
            rom_size_bytes: self.rom.as_ref().map(|r| r.len() as u64),
            fps: if running { self.stats.fps() } else { 0.0 },
            instructions_per_second: if running {
                self.stats.instructions_per_second()
            } else {
                0.0
            },
            memory_used: self
                .machine
                .as_ref()
                .map_or(0, |m| m.bus.working_set_bytes()),
            memory_total: self.config.rdram_size() as u64,
            cycles,
            video_fields: self.machine.as_ref().map_or(0, |m| m.bus.fields()),
            pc: self.machine.as_ref().map(|m| m.cpu.pc()),
            fault: self.last_fault.as_ref().map(|f| f.to_string()),
            recent_log_lines: self.log.lines(),
            log_total: self.log.total(),
        }
    }

    /// Records an informational line from outside the state machine.
    pub fn log_line(&mut self, level: Level, line: impl Into<String>) {
        self.note(level, line.into());
    }

    fn enter_fault(&mut self, fault: ExecutionFault) {
        self.state = SessionState::Faulted;
        self.last_fault = Some(fault);
        self.stats.clear();
        self.note(Level::Error, format!("Execution fault: {}", fault));
    }

    fn note(&mut self, level: Level, line: String) {
        log::log!(level, "{}", line);
        self.log.push(line);
    }
}

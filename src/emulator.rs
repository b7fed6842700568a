use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::bus::Bus;
use crate::cartridge::{CancelToken, RomIdentity, RomImage, BOOT_CODE_END};
use crate::config::CoreConfig;
use crate::cpu::cop0::StatusFlags;
use crate::cpu::decode::Reg;
use crate::cpu::{Cpu, StepOutcome};
use crate::cpu_bus::Width;
use crate::devices::CYCLES_PER_FIELD;
use crate::error::{ExecutionFault, LoadError, SchedulerError};
use crate::session::{Session, SessionState};
use crate::telemetry::{lines_since, Snapshot, TelemetryPort};

/// RDRAM word where the boot code leaves the memory size.
const RDRAM_SIZE_WORD: usize = 0x318;

/// Emulated throughput over the current reporting window.
#[derive(Debug, Clone)]
pub struct PerformanceStats {
    fps: f64,
    instructions_per_second: f64,
    window_start: Instant,
    window_cycles: u64,
}

impl PerformanceStats {
    pub fn new() -> Self {
        Self {
            fps: 0.0,
            instructions_per_second: 0.0,
            window_start: Instant::now(),
            window_cycles: 0,
        }
    }

    pub fn restart(&mut self, cycles: u64) {
        self.window_start = Instant::now();
        self.window_cycles = cycles;
    }

    /// Closes the window at `cycles` and opens the next one.
    pub fn sample(&mut self, cycles: u64) {
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            // One cycle per retired instruction
            let delta = cycles.saturating_sub(self.window_cycles) as f64;
            self.instructions_per_second = delta / elapsed;
            self.fps = delta / CYCLES_PER_FIELD as f64 / elapsed;
        }
        self.restart(cycles);
    }

    pub fn clear(&mut self) {
        self.fps = 0.0;
        self.instructions_per_second = 0.0;
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn instructions_per_second(&self) -> f64 {
        self.instructions_per_second
    }
}

impl Default for PerformanceStats {
    fn default() -> Self {
        Self::new()
    }
}

/// CPU plus everything it can address.
pub struct Machine {
    pub cpu: Cpu,
    pub bus: Bus,
}

impl Machine {
    /// Builds a machine in the state the PIF and IPL3 boot code leave behind.
    pub fn boot(rom: &RomImage, rdram_size: usize) -> Self {
        let mut bus = Bus::new(rom, rdram_size);
        let mut cpu = Cpu::new();

        let bytes = rom.bytes();
        bus.sp_dmem_mut()
            .copy_in(0, &bytes[..BOOT_CODE_END.min(bytes.len())]);
        let entry = rom.header().entry_point;
        let copied = bus
            .rdram_mut()
            .copy_in((entry & 0x1FFF_FFFF) as usize, rom.boot_segment());
        bus.rdram_mut()
            .write(RDRAM_SIZE_WORD, Width::Word, rdram_size as u64);

        cpu.set_gpr(Reg(11), 0xFFFF_FFFF_A400_0040); // t3
        cpu.set_gpr(Reg(20), 1); // s4: NTSC
        cpu.set_gpr(Reg(22), 0x3F); // s6: CIC seed
        cpu.set_gpr(Reg::SP, 0xFFFF_FFFF_A400_1FF0);
        cpu.set_gpr(Reg::RA, 0xFFFF_FFFF_A400_1550);
        cpu.cop0
            .set_status(StatusFlags::CU0 | StatusFlags::CU1 | StatusFlags::FR);
        cpu.set_pc(entry);

        log::debug!(
            "HLE boot: {} bytes to {:#010x}, RDRAM {} MiB",
            copied,
            entry,
            rdram_size >> 20
        );
        Machine { cpu, bus }
    }

    pub fn step(&mut self) -> Result<StepOutcome, ExecutionFault> {
        let outcome = self.cpu.step(&mut self.bus)?;
        if outcome != StepOutcome::Halted {
            self.bus.advance(1);
        }
        Ok(outcome)
    }
}

enum Command {
    LoadRom {
        image: RomImage,
        reply: Sender<RomIdentity>,
    },
    Start(Sender<Result<(), SchedulerError>>),
    Stop(Sender<Result<(), SchedulerError>>),
    Reset(Sender<Result<(), SchedulerError>>),
    Shutdown,
}

/// Handle to the emulation thread.
///
/// Every method is safe to call from any thread at any time. Commands are
/// applied by the worker between instruction slices, and each reply is sent
/// only after a snapshot reflecting the command has been published.
pub struct Emulator {
    commands: Sender<Command>,
    telemetry: Arc<TelemetryPort>,
    worker: Option<JoinHandle<()>>,
    drained: Mutex<u64>,
}

impl Emulator {
    pub fn spawn(config: CoreConfig) -> std::io::Result<Self> {
        let (tx, rx) = channel::unbounded();
        let telemetry = Arc::new(TelemetryPort::new());
        let worker = Worker {
            session: Session::new(config.clone()),
            telemetry: Arc::clone(&telemetry),
            commands: rx,
            config,
        };
        let handle = thread::Builder::new()
            .name("n64-core".into())
            .spawn(move || worker.run())?;
        Ok(Emulator {
            commands: tx,
            telemetry,
            worker: Some(handle),
            drained: Mutex::new(0),
        })
    }

    /// Reads and validates a ROM on the calling thread, then hands it over.
    /// A failed or cancelled load leaves the running session untouched.
    pub fn load_rom_file<P: AsRef<Path>>(
        &self,
        path: P,
        cancel: Option<&CancelToken>,
    ) -> Result<RomIdentity, LoadError> {
        let image = RomImage::load_from_file(path, cancel)?;
        self.install(image)
    }

    pub fn load_rom_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<RomIdentity, LoadError> {
        let image = RomImage::from_bytes(bytes)?.with_display_name(name);
        self.install(image)
    }

    fn install(&self, image: RomImage) -> Result<RomIdentity, LoadError> {
        let (reply, rx) = channel::bounded(1);
        self.commands
            .send(Command::LoadRom { image, reply })
            .map_err(|_| LoadError::Disconnected)?;
        rx.recv().map_err(|_| LoadError::Disconnected)
    }

    pub fn start(&self) -> Result<(), SchedulerError> {
        self.request(Command::Start)
    }

    pub fn stop(&self) -> Result<(), SchedulerError> {
        self.request(Command::Stop)
    }

    pub fn reset(&self) -> Result<(), SchedulerError> {
        self.request(Command::Reset)
    }

    fn request(
        &self,
        command: fn(Sender<Result<(), SchedulerError>>) -> Command,
    ) -> Result<(), SchedulerError> {
        let (reply, rx) = channel::bounded(1);
        self.commands
            .send(command(reply))
            .map_err(|_| SchedulerError::Disconnected)?;
        rx.recv().map_err(|_| SchedulerError::Disconnected)?
    }

    pub fn poll_telemetry(&self) -> Arc<Snapshot> {
        self.telemetry.latest()
    }

    pub fn subscribe(&self) -> Receiver<Arc<Snapshot>> {
        self.telemetry.subscribe()
    }

    /// Log lines published since the previous call, oldest first.
    pub fn drain_log_lines(&self) -> Vec<String> {
        let snapshot = self.telemetry.latest();
        let mut seen = self.drained.lock().unwrap_or_else(|e| e.into_inner());
        let lines = lines_since(&snapshot, *seen).to_vec();
        *seen = (*seen).max(snapshot.log_total);
        lines
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("Emulation thread panicked");
            }
        }
    }
}

struct Worker {
    session: Session,
    telemetry: Arc<TelemetryPort>,
    commands: Receiver<Command>,
    config: CoreConfig,
}

impl Worker {
    fn run(mut self) {
        log::info!(
            "Emulation thread started (report every {:?}, {} steps per slice)",
            self.config.report_interval,
            self.config.steps_per_slice
        );
        let interval = self.config.report_interval;
        let mut next_report = Instant::now() + interval;
        self.publish();

        loop {
            // Safe point: nothing is mid-instruction here
            loop {
                match self.commands.try_recv() {
                    Ok(command) => {
                        if !self.apply(command) {
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return,
                }
            }

            if self.session.state() == SessionState::Running {
                let slice_start = Instant::now();
                let executed = self.session.run_slice(self.config.steps_per_slice);
                if self.session.state() != SessionState::Running {
                    // Faulted inside the slice
                    self.publish();
                    next_report = Instant::now() + interval;
                    continue;
                }
                if let Some(target) = self.config.target_ips {
                    self.throttle(slice_start, executed, target, next_report);
                }
                if Instant::now() >= next_report {
                    self.publish();
                    next_report = Instant::now() + interval;
                }
            } else {
                match self.commands.recv_deadline(next_report) {
                    Ok(command) => {
                        if !self.apply(command) {
                            return;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        self.publish();
                        next_report = Instant::now() + interval;
                    }
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        }
    }

    /// Returns false once the worker should exit.
    fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::LoadRom { image, reply } => {
                let identity = self.session.load_rom(image);
                self.publish();
                let _ = reply.send(identity);
            }
            Command::Start(reply) => {
                let result = self.session.start();
                self.publish();
                let _ = reply.send(result);
            }
            Command::Stop(reply) => {
                let result = self.session.stop();
                self.publish();
                let _ = reply.send(result);
            }
            Command::Reset(reply) => {
                let result = self.session.reset();
                self.publish();
                let _ = reply.send(result);
            }
            Command::Shutdown => {
                log::info!("Emulation thread shutting down");
                return false;
            }
        }
        true
    }

    // Sleeps off the time the slice ran ahead of the target rate
    fn throttle(&self, slice_start: Instant, executed: u64, target_ips: u64, next_report: Instant) {
        let budget = Duration::from_secs_f64(executed as f64 / target_ips as f64);
        let spent = slice_start.elapsed();
        if budget > spent {
            let until_report = next_report.saturating_duration_since(Instant::now());
            thread::sleep((budget - spent).min(until_report));
        }
    }

    fn publish(&mut self) {
        let snapshot = self.session.snapshot();
        self.telemetry.publish(snapshot);
    }
}

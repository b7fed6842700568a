use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use n64_core::shutdown::{self, RunOutcome};
use n64_core::{debug_flags, CoreConfig, Emulator, SessionState, Snapshot};

const ROM_EXTENSIONS: [&str; 3] = ["z64", "v64", "n64"];

struct Options {
    seconds: Option<u64>,
    json: bool,
    quiet: bool,
    rom: String,
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {} [--seconds N] [--json] [--quiet] <rom>\nSupported formats: .z64, .v64, .n64",
        program
    )
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let program = args.first().map(String::as_str).unwrap_or("n64-headless");
    let mut options = Options {
        seconds: None,
        json: false,
        quiet: debug_flags::quiet(),
        rom: String::new(),
    };
    let mut rom = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Err(usage(program)),
            "--seconds" => {
                let value = iter.next().ok_or("--seconds requires a value")?;
                let secs = value
                    .parse::<u64>()
                    .map_err(|_| format!("--seconds: not a number: {}", value))?;
                options.seconds = Some(secs);
            }
            "--json" => options.json = true,
            "--quiet" => options.quiet = true,
            s if s.starts_with('-') => return Err(format!("Unknown option: {}", s)),
            s => {
                if rom.replace(s.to_string()).is_some() {
                    return Err(String::from("Only one ROM argument is accepted"));
                }
            }
        }
    }
    options.rom = rom.ok_or_else(|| usage(program))?;
    Ok(options)
}

fn has_rom_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ROM_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

fn resolve_rom_path(arg: &str) -> Result<PathBuf, String> {
    fn with_ext(base: &Path) -> Option<PathBuf> {
        if base.extension().is_some() {
            return None;
        }
        ROM_EXTENSIONS
            .iter()
            .map(|ext| base.with_extension(ext))
            .find(|p| p.exists())
    }

    let direct = PathBuf::from(arg);
    if direct.exists() {
        return Ok(direct);
    }
    let in_roms = Path::new("roms").join(arg);
    if in_roms.exists() {
        return Ok(in_roms);
    }
    if let Some(p) = with_ext(&in_roms).or_else(|| with_ext(&direct)) {
        return Ok(p);
    }

    let available = std::fs::read_dir("roms")
        .into_iter()
        .flat_map(|it| it.flatten())
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_rom_extension(p))
        .map(|p| format!("- {}", p.display()))
        .collect::<Vec<_>>();

    Err(if available.is_empty() {
        format!(
            "ROM '{}' not found. Place *.z64, *.v64 or *.n64 files under ./roms or provide a valid path.",
            arg
        )
    } else {
        format!(
            "ROM '{}' not found. Available ROMs under ./roms:\n{}",
            arg,
            available.join("\n")
        )
    })
}

#[cfg(feature = "json")]
fn print_snapshot(snapshot: &Snapshot, json: bool) {
    if json {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{}", line),
            Err(e) => log::warn!("Failed to encode snapshot: {}", e),
        }
    } else {
        println!("{}", snapshot.status_line());
    }
}

#[cfg(not(feature = "json"))]
fn print_snapshot(snapshot: &Snapshot, _json: bool) {
    println!("{}", snapshot.status_line());
}

fn run(options: Options) -> Result<RunOutcome, String> {
    if options.json && cfg!(not(feature = "json")) {
        return Err(String::from("--json needs the `json` feature"));
    }

    let rom_path = resolve_rom_path(&options.rom)?;
    let config = CoreConfig::from_env();
    let interval = config.report_interval;
    let emulator =
        Emulator::spawn(config).map_err(|e| format!("Failed to start emulation thread: {}", e))?;

    let identity = emulator
        .load_rom_file(&rom_path, None)
        .map_err(|e| format!("Failed to load ROM: {}", e))?;
    if !options.quiet {
        println!(
            "Loaded {} ({} KiB)",
            identity.display_name,
            identity.size_bytes / 1024
        );
    }
    emulator
        .start()
        .map_err(|e| format!("Failed to start emulation: {}", e))?;

    let deadline = options.seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let updates = emulator.subscribe();
    let mut last_sequence = 0;
    let mut outcome = RunOutcome::Completed;
    loop {
        if shutdown::stop_requested() || deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        // Wake often enough to notice Ctrl-C promptly
        let Ok(snapshot) = updates.recv_timeout(interval.min(Duration::from_millis(200))) else {
            continue;
        };
        if snapshot.sequence <= last_sequence {
            continue;
        }
        last_sequence = snapshot.sequence;
        if !options.quiet {
            for line in emulator.drain_log_lines() {
                println!("  {}", line);
            }
        }
        print_snapshot(&snapshot, options.json);
        if snapshot.state == SessionState::Faulted {
            outcome = RunOutcome::Faulted;
            break;
        }
    }

    if let Err(e) = emulator.stop() {
        // Faulted sessions have already stopped
        log::debug!("Stop on exit: {}", e);
    }
    let last = emulator.poll_telemetry();
    if !options.quiet {
        for line in emulator.drain_log_lines() {
            println!("  {}", line);
        }
        let pc = last.pc.map_or_else(|| String::from("-"), |pc| format!("{:#010x}", pc));
        println!("Final: {} cycles, pc {}", last.cycles, pc);
    }
    Ok(outcome)
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    let options = match parse_args(&args) {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(RunOutcome::Usage.exit_code());
        }
    };

    shutdown::install();
    let outcome = run(options).unwrap_or_else(|msg| {
        eprintln!("{}", msg);
        RunOutcome::Failed
    });
    if outcome != RunOutcome::Completed {
        process::exit(outcome.exit_code());
    }
}

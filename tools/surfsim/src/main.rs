mod audit;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rand::Rng;
use tracing::{info, warn, Level};
use tracing_subscriber::util::SubscriberInitExt;

use modsurfer_hw::input::service_ports;
use modsurfer_hw::sim::{SimMachine, SimPlayer, SimRasterizer};
use modsurfer_hw::{sync, HardwareSession, IntFlags, KeyboardState, PlaneRef, Rasterizer, SessionConfig};
use modsurfer_system::host::NodeKind;
use modsurfer_system::sim::SimHost;
use modsurfer_system::{list_drives, list_path, print_error, seeded_rng, EntryKind, Environment, InputTap, StdFs};

/// Where the game's level-2 dispatcher and input handler live in the image.
const LEVEL2_DISPATCHER: u32 = 0x0002_4000;
const INPUT_HANDLER: u32 = 0x0002_8000;

/// Lores screen, 320x256, one plane.
const SCREEN: PlaneRef = PlaneRef::new(0x0001_0000, 40, 0, 0);
const SCREEN_ROWS: u16 = 256;

#[derive(Parser)]
#[command(name = "surfsim")]
#[command(version, about = "ModSurfer hardware session simulator", long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value_t = Level::INFO)]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take the simulated machine, run some frames, give it back and audit
    /// the registers
    Session {
        /// Frames to run while in control
        #[arg(short, long, default_value_t = 50)]
        frames: u32,

        /// Vector base register, e.g. 0x08000000
        #[arg(long, default_value = "0", value_parser = parse_address)]
        vbr: u32,

        /// Drop INTREQ writes that are not repeated (68040/060 boards)
        #[arg(long)]
        flaky_intreq: bool,

        /// Timing base for the music player (1 = PAL)
        #[arg(long, default_value_t = 1)]
        audio_unit: u8,

        /// Pretend Workbench runs on a graphics card
        #[arg(long)]
        rtg: bool,
    },

    /// List a host directory the way the module browser shows it
    List {
        #[arg(default_value = ".")]
        path: String,
    },

    /// List the simulated machine's drives
    Drives,
}

fn parse_address(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix('$')) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("bad address {s:?}: {e}"))
}

fn setup_logging(level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .compact()
        .finish()
        .init();
}

/// Encode a keycode the way the keyboard shifts it out.
fn shift_out(code: u8, up: bool) -> u8 {
    let byte = code | if up { 0x80 } else { 0 };
    !byte.rotate_left(1)
}

fn run_session(frames: u32, vbr: u32, flaky_intreq: bool, audio_unit: u8, rtg: bool) -> anyhow::Result<()> {
    let mut host = SimHost::new().with_device_node(NodeKind::Device, "DF0", true);
    if rtg {
        host = host.with_rtg_workbench();
    }

    let mut env = Environment::init(&mut host).context("environment setup")?;
    info!("rtg: {}, workbench closed: {}", env.is_rtg(&mut host), env.workbench_closed());

    let mut rng = seeded_rng(&mut host).context("seeding rng")?;
    let mut tap = InputTap::open(&mut host, INPUT_HANDLER, 0).context("installing input handler")?;

    let mut machine = SimMachine::new().with_vbr(vbr);
    if flaky_intreq {
        machine = machine.with_flaky_intreq();
    }
    let before = machine.registers();

    let config = SessionConfig::default().with_level2_handler(LEVEL2_DISPATCHER).with_audio_unit(audio_unit);
    let mut session = HardwareSession::new(config);
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();
    let mut renderer = SimRasterizer::default();

    session.own_blitter(&mut machine);
    session.acquire_exclusive_control(&mut machine, &mut keyboard, &mut player);

    for frame in 0..frames {
        sync::wait_vblank(&mut machine);

        if rng.gen_bool(0.25) {
            machine.raise(IntFlags::PORTS);
            let code = rng.gen_range(0..=0x77);
            service_ports(&mut machine, &mut keyboard, Some(shift_out(code, rng.gen_bool(0.5))));
        }

        if frame == frames / 2 {
            // Dropped: no console while the session has the machine.
            print_error(&mut session, &mut machine, Some(tap.devices()), "frame budget");
        }

        let Some(mut blitter) = session.blitter(&mut machine) else {
            warn!("blitter not owned in frame {}", frame);
            continue;
        };
        renderer.blit_fill(&mut blitter, SCREEN, SCREEN.width_px() as u16, SCREEN_ROWS);
        blitter.wait_blit();

        let x = rng.gen_range(0..300);
        let y = rng.gen_range(0..240);
        renderer.blit_line(&mut blitter, SCREEN.at(x, y), x + 16, y + 12);
        blitter.wait_blit();
    }

    let held = (0..=0x77).filter(|&code| keyboard.is_pressed(code)).count();
    session.release_exclusive_control(&mut machine, &mut player);

    print_error(&mut session, &mut machine, Some(tap.devices()), "after release");
    tap.close();

    let console = host.output();
    env.fini(&mut host);

    info!("{} frames, {} blits, {} keys held at exit", frames, renderer.ops.len(), held);
    if !console.is_empty() {
        print!("{console}");
    }

    println!("{:<10} {:<9}  {:<9}", "register", "before", "after");
    let lines = audit::compare(&before, &machine.registers());
    for line in &lines {
        println!("{line}");
    }

    let changed = lines.iter().filter(|l| !l.matches()).count();
    if changed > 0 {
        bail!("{changed} registers not restored");
    }
    if machine.forbid_depth() != 0 {
        bail!("task switching left forbidden (depth {})", machine.forbid_depth());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level);

    match cli.command {
        Commands::Session { frames, vbr, flaky_intreq, audio_unit, rtg } => {
            run_session(frames, vbr, flaky_intreq, audio_unit, rtg)?;
        }
        Commands::List { path } => {
            let list = list_path(&mut StdFs, &path).with_context(|| format!("listing {path}"))?;
            for entry in list.iter() {
                let tag = match entry.kind {
                    EntryKind::Dir => "DIR",
                    EntryKind::Module => "MOD",
                    EntryKind::File => "",
                };
                println!("{:<4} {}", tag, entry.name);
            }
        }
        Commands::Drives => {
            let host = SimHost::new()
                .with_device_node(NodeKind::Device, "DH0", true)
                .with_device_node(NodeKind::Device, "DF0", true)
                .with_device_node(NodeKind::Device, "DF1", false)
                .with_device_node(NodeKind::Volume, "Workbench", true);
            let mut machine = SimMachine::new();
            let mut session = HardwareSession::new(SessionConfig::default());

            let drives = list_drives(&mut session, &mut machine, &host);
            if drives.is_empty() {
                warn!("no drives mounted");
            }
            for drive in drives.iter() {
                println!("{}:", drive.name);
            }
        }
    }

    Ok(())
}

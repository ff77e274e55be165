//! LIR generation driver.
//!
//! Reads a method in the textual tree IR, generates LIR for the selected architecture and
//! prints the block programs, the finalized frame and the session statistics.

use bumpalo::Bump;
use clap::Parser;
use lirgen::access::BarrierPolicy;
use lirgen::arch::{Architecture, Arm64, Ppc32, X64};
use lirgen::config::{ArchKind, CollectorKind, Config};
use lirgen::core::session::CompilationSession;
use lirgen::frame_map::Platform;
use lirgen::generator::LirGenerator;
use lirgen::hir::parse_method;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lirgen")]
#[command(about = "Generate LIR for a tree-IR method")]
#[command(version)]
struct Cli {
    /// Tree-IR file; stdin when omitted
    file: Option<PathBuf>,

    /// Target architecture (x64, arm64, ppc32)
    #[arg(long)]
    arch: Option<ArchKind>,

    /// Barrier policy (none, card-table, satb)
    #[arg(long)]
    gc: Option<CollectorKind>,

    /// Use compressed references on 64-bit targets
    #[arg(long)]
    compressed_oops: Option<bool>,

    /// Check the card before dirtying it
    #[arg(long)]
    cond_card_mark: bool,

    /// Spill slots reported by the register allocator
    #[arg(long, default_value_t = 0)]
    spill_slots: u32,

    /// Print session statistics
    #[arg(long)]
    stats: bool,
}

impl Cli {
    /// Environment defaults overlaid with the flags given on the command line.
    fn config(&self) -> Result<Config, Box<dyn std::error::Error>> {
        let mut config = Config::from_env()?;
        if let Some(arch) = self.arch {
            config.arch = arch;
        }
        if let Some(gc) = self.gc {
            config.collector = gc;
        }
        if let Some(compressed) = self.compressed_oops {
            config.compressed_oops = compressed;
        }
        if self.cond_card_mark {
            config.cond_card_mark = true;
        }
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let config = cli.config()?;

    let text = match &cli.file {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let result = match config.arch {
        ArchKind::X64 => run::<X64>(&cli, &config, &text),
        ArchKind::Arm64 => run::<Arm64>(&cli, &config, &text),
        ArchKind::Ppc32 => run::<Ppc32>(&cli, &config, &text),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run<A: Architecture>(cli: &Cli, config: &Config, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let method = parse_method(text)?;

    let platform = Platform::<A>::new();
    platform.initialize()?;
    let mut generator = LirGenerator::new(&platform, config)?;
    log::info!("{}: {} barriers", A::NAME, generator.access().policy().name());

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut lir = generator.generate(&session, &method)?;
    lir.finalize_frame(cli.spill_slots)?;

    print!("{}", lir);
    if cli.stats {
        print!("{}", session.stats());
    }
    Ok(())
}

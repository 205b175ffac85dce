use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

#[allow(unused_imports)]
use tracing::{trace, debug, error, warn, info, Level};

use n64_recomp::bytecode::{decode_records, Record};
use n64_recomp::*;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Mode {
    Cached,
    Dynarec,
}

/// Compile one block of a raw big endian MIPS image and print what came out of it
#[derive(Debug, Parser)]
#[clap(name = "n64-recomp", version)]
struct Cli {
    /// Raw big endian image, loaded at physical address `--base & 0x1FFFFFFF`
    image: PathBuf,

    #[arg(long, default_value = "0x80000000", value_parser = parse_address)]
    base: u32,

    /// Where to start compiling (defaults to --base)
    #[arg(long, value_parser = parse_address)]
    entry: Option<u32>,

    #[arg(long, value_enum, default_value_t = Mode::Dynarec)]
    mode: Mode,

    #[arg(long)]
    debug_prologue: bool,

    #[arg(long)]
    profile: bool,

    /// Print the backend's records after the listing
    #[arg(long)]
    records: bool,

    /// -v for debug, -vv for trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_address(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X").trim_start_matches('$').replace('_', "");
    u32::from_str_radix(&digits, 16).map_err(|err| format!("bad address '{s}': {err}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let image = match fs::read(&cli.image) {
        Ok(image) => image,
        Err(err) => {
            error!("couldn't read {}: {}", cli.image.display(), err);
            return ExitCode::FAILURE;
        },
    };

    // room for the image and the overflow words read past the last page
    let phys_base = (cli.base & 0x1FFF_FFFF) as usize;
    let mut ram = Rdram::new(phys_base + image.len() + 0x2000);
    if ram.load(phys_base, &image).is_err() {
        error!("image doesn't fit at ${:08X}", cli.base);
        return ExitCode::FAILURE;
    }

    let settings = Settings {
        mode: match cli.mode {
            Mode::Cached  => EmuMode::CachedInterpreter,
            Mode::Dynarec => EmuMode::Dynarec,
        },
        debug_prologue: cli.debug_prologue,
        profile: cli.profile,
        ..Default::default()
    };

    let entry = cli.entry.unwrap_or(cli.base);
    let mut recompiler = Recompiler::new(settings, BytecodeBackend::new(), DirectMapped);
    let block = match recompiler.compile_block(&mut ram, entry) {
        Ok(block) => block,
        Err(err) => {
            error!("couldn't compile ${:08X}: {}", entry, err);
            return ExitCode::FAILURE;
        },
    };

    println!("block ${:08X}-${:08X}", block.start, block.end);
    let first = block.slot_of(entry);
    for inst in block.instructions().iter().skip(first) {
        if inst.op.is_not_compiled() {
            break;
        }
        println!("  ${:08X}  {:08X}  +{:05X}  {}", inst.addr, inst.word, inst.local_addr, inst);
    }
    println!("code: {} bytes of {} ({} after init)", block.code_length(), block.code_capacity(), block.init_length());

    if cli.records {
        for (offset, record) in decode_records(block.code()).into_iter().skip_while(|&(offset, _)| offset < block.init_length()) {
            match record {
                Record::Jump { offset: rel, idle } => println!("  +{:05X}  jump {:+} -> +{:05X}{}", offset, rel, offset as i64 + 8 + rel as i64, if idle { " (idle)" } else { "" }),
                record => println!("  +{:05X}  {:?}", offset, record),
            }
        }
    }

    let stats = recompiler.stats();
    info!("{} init, {} compile passes, {} blocks allocated, {} bytes of code memory live",
          stats.blocks_initialized, stats.compile_passes, recompiler.pages().allocated_blocks(), recompiler.arena().live_bytes());
    ExitCode::SUCCESS
}

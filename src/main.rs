//! axemu: virtual machine for the AltairX K1 VLIW processor.

use std::env;
use std::process::ExitCode;

use altairx_emu::config::Config;
use altairx_emu::device::memory::VmMemory;
use altairx_emu::interpreter::Core;
use altairx_emu::{loader, runner};

fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut path = None;
    let mut entry = None;
    let mut args_iter = args[1..].iter();
    while let Some(arg) = args_iter.next() {
        match arg.as_str() {
            "--entry" | "-e" => {
                let value = args_iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--entry needs a byte address"))?;
                entry = Some(parse_address(value)?);
            }
            "--sample-config" => {
                print!("{}", Config::sample_config());
                return Ok(ExitCode::SUCCESS);
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(ExitCode::SUCCESS);
            }
            _ if !arg.starts_with('-') => path = Some(arg.clone()),
            _ => anyhow::bail!("unknown option {arg}"),
        }
    }

    let Some(path) = path else {
        print_usage();
        return Ok(ExitCode::FAILURE);
    };

    let config = Config::get();
    let entry = entry.unwrap_or_else(|| config.entry_point());

    let memory = VmMemory::new(config.rom_bytes(), config.wram_bytes());
    let mut core = Core::new(memory);
    loader::load_raw_program_file(&mut core, &path, entry)?;

    log::info!("running {path}, entry at byte {entry:#X}");
    let code = runner::run(&mut core);
    log::info!("guest exited with code {code}");

    Ok(ExitCode::from(code as u8))
}

/// Parse a decimal or 0x-prefixed byte address.
fn parse_address(value: &str) -> anyhow::Result<u64> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|_| anyhow::anyhow!("invalid address {value}"))
}

fn print_usage() {
    println!("axemu - AltairX K1 virtual machine");
    println!();
    println!("Usage: axemu [options] <program image>");
    println!();
    println!("Options:");
    println!("  -e, --entry <addr>   entry point byte address (default from config)");
    println!("      --sample-config  print a sample configuration file");
    println!("  -h, --help           show this help");
}

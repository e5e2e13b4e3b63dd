use log::{debug, info};
use scivm::config::VmConfig;
use scivm::error::{report_fatal, VmError};
use scivm::interpreter::Interpreter;
use scivm::resource::{PatchDirectory, ResourceManager};
use std::env;
use std::path::PathBuf;

fn usage(program: &str) {
    println!("scivm - script interpreter for SCI-style adventure game resources");
    println!();
    println!("Usage: {program} <resource_dir> [--config scivm.toml] [--limit N] [--trace]");
    println!();
    println!("The resource directory holds patch files such as script.000 and vocab.996.");
    println!("--limit stops after N instructions, --trace logs every instruction");
    println!("(enable with RUST_LOG=debug).");
}

fn main() {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args[1] == "-h" || args[1] == "--help" {
        usage(&args[0]);
        return;
    }

    let mut resource_dir = None;
    let mut config_path = None;
    let mut limit = None;
    let mut trace = false;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 1;
            }
            "--limit" if i + 1 < args.len() => {
                limit = match args[i + 1].parse::<u64>() {
                    Ok(n) => Some(n),
                    Err(_) => {
                        eprintln!("Error: invalid instruction limit: {}", args[i + 1]);
                        std::process::exit(1);
                    }
                };
                i += 1;
            }
            "--trace" => trace = true,
            arg if !arg.starts_with('-') && resource_dir.is_none() => {
                resource_dir = Some(PathBuf::from(arg));
            }
            other => {
                eprintln!("Error: unknown option: {other}");
                usage(&args[0]);
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut config = match config_path {
        Some(path) => match VmConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: cannot use config {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => VmConfig::default(),
    };
    if let Some(dir) = resource_dir {
        config.resource_dir = dir;
    }
    if limit.is_some() {
        config.instruction_limit = limit;
    }
    if !config.resource_dir.is_dir() {
        eprintln!(
            "Error: resource directory not found: {}",
            config.resource_dir.display()
        );
        std::process::exit(1);
    }

    debug!("config: {config:?}");
    let source = PatchDirectory::new(&config.resource_dir);
    let resources = ResourceManager::new(Box::new(source), config.cache_budget);
    let mut interpreter = match Interpreter::with_resources(config, Box::new(resources)) {
        Ok(interpreter) => interpreter,
        Err(e) => report_fatal(&e),
    };
    interpreter.set_debug(trace);
    interpreter.start_ticker();

    match interpreter.start_game() {
        Ok(acc) => info!("game returned {acc:#06x}"),
        Err(VmError::InstructionLimit(n)) => {
            info!("stopped after {n} instructions");
        }
        Err(e @ VmError::ResourceNotFound { .. }) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        Err(e) => report_fatal(&e),
    }
    interpreter.stop_ticker();
    debug!(
        "executed {} instructions",
        interpreter.instruction_count()
    );
}

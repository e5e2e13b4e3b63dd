//! End-to-end tests over a resource directory on disk
//!
//! Each test writes a tiny game (a `Game` class with a `play` method and one
//! instance of it, exported from script 0) as patch files into a scratch
//! directory, then runs it through the library, the `scivm` binary and the
//! `scidasm` disassembler.

use scivm::config::VmConfig;
use scivm::error::VmError;
use scivm::interpreter::Interpreter;
use scivm::resource::{PatchDirectory, ResourceManager, ResourceType};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

fn words(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// script.000 with a patch header. Layout:
/// - 0x00 code: `ldi 7; ret`
/// - 0x08 class 0 with species/super/info/name and method 42 at 0x04
/// - 0x2a instance of class 0 (object address 0x36)
/// - 0x40 export table: export 0 is the instance
fn game_script() -> Vec<u8> {
    let mut data = vec![0x82, 0x00];
    data.extend(words(&[2, 8]));
    data.extend([0x35, 0x07, 0x48, 0x00]);

    data.extend(words(&[6, 34, 0x1234, 0, 24, 4]));
    data.extend(words(&[0, 0xFFFF, 0, 0]));
    data.extend(words(&[0, 1, 2, 3]));
    data.extend(words(&[1, 42, 4]));

    data.extend(words(&[1, 22, 0x1234, 0, 16, 4]));
    data.extend(words(&[0, 0, 0, 0]));
    data.extend(words(&[0]));

    data.extend(words(&[7, 10, 1, 0x36, 0]));
    data.extend(words(&[0]));
    data
}

/// A fresh scratch directory for one test
fn game_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("scivm-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("script.000"), game_script()).unwrap();
    dir
}

fn interpreter(dir: &Path, config: VmConfig) -> Interpreter {
    let resources = ResourceManager::new(Box::new(PatchDirectory::new(dir)), config.cache_budget);
    Interpreter::with_resources(config, Box::new(resources)).unwrap()
}

#[test]
fn test_game_runs_from_patch_files() {
    let dir = game_dir("play");
    let mut interp = interpreter(&dir, VmConfig::default());
    assert_eq!(interp.start_game(), Ok(7));
    assert!(interp.vm.is_loaded(0));
    assert_eq!(interp.vm.stack.depth(), 0);

    assert_eq!(
        interp.vm.script_ptr(3).err(),
        Some(VmError::ResourceNotFound {
            kind: ResourceType::Script,
            number: 3
        })
    );
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_config_file_is_read() {
    let dir = game_dir("config");
    let path = dir.join("scivm.toml");
    fs::write(
        &path,
        format!(
            "resource_dir = {:?}\nrandom_seed = 3\nmax_call_depth = 64\n",
            dir.display().to_string()
        ),
    )
    .unwrap();
    let config = VmConfig::from_file(&path).unwrap();
    assert_eq!(config.resource_dir, dir);
    assert_eq!(config.random_seed, Some(3));
    assert_eq!(config.max_call_depth, 64);

    let mut interp = interpreter(&config.resource_dir.clone(), config);
    assert!(interp.vm.rng.is_predictable());
    assert_eq!(interp.start_game(), Ok(7));

    fs::write(&path, "heap_size = 10\n").unwrap();
    assert!(matches!(
        VmConfig::from_file(&path),
        Err(VmError::Config(_))
    ));
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_interpreter_binary() {
    let dir = game_dir("bin");
    let output = Command::new(env!("CARGO_BIN_EXE_scivm"))
        .arg(&dir)
        .args(["--limit", "100"])
        .output()
        .expect("failed to run scivm");
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let missing = Command::new(env!("CARGO_BIN_EXE_scivm"))
        .arg(dir.join("nowhere"))
        .output()
        .expect("failed to run scivm");
    assert!(!missing.status.success());
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_disassembler_binary() {
    let dir = game_dir("dasm");
    let output = Command::new(env!("CARGO_BIN_EXE_scidasm"))
        .arg(&dir)
        .arg("0")
        .output()
        .expect("failed to run scidasm");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("; script 0"), "{stdout}");
    assert!(stdout.contains("class #1::sel_42:"), "{stdout}");
    assert!(stdout.contains("ldi 7"), "{stdout}");
    assert!(stdout.contains("ret"), "{stdout}");
    fs::remove_dir_all(&dir).unwrap();
}

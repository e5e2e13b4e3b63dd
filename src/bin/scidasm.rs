use log::debug;
use scivm::disassembler::Disassembler;
use scivm::resource::{PatchDirectory, ResourceId, ResourceSource, ResourceType};
use scivm::vocab::{SelectorNames, SELECTOR_VOCAB};
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args[1] == "-h" || args[1] == "--help" {
        eprintln!("Usage: {} <resource_dir> <script_number>...", args[0]);
        eprintln!("\nDisassembles script.NNN from the resource directory, naming");
        eprintln!("selectors from vocab.997 when it is present.");
        std::process::exit(if args.len() < 3 { 1 } else { 0 });
    }

    let dir = PathBuf::from(&args[1]);
    let source = PatchDirectory::new(&dir);
    let names = match source.read(ResourceId::new(ResourceType::Vocab, SELECTOR_VOCAB)) {
        Ok(data) => Some(SelectorNames::parse(&data)?),
        Err(e) => {
            debug!("no selector names: {e}");
            None
        }
    };

    for arg in &args[2..] {
        let number: u16 = arg
            .parse()
            .map_err(|_| format!("invalid script number: {arg}"))?;
        let data = source.read(ResourceId::new(ResourceType::Script, number))?;
        debug!("script {number}: {} bytes", data.len());
        let dis = Disassembler::new(&data, names.as_ref())?;
        println!("; script {number}");
        print!("{}", dis.disassemble()?);
    }
    Ok(())
}

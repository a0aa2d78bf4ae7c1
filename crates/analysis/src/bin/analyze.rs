//! Binding analysis tool
//!
//! Loads a simulation manifest, builds every shader it lists and prints the
//! merged binding table that the engine would use for its bind group layout.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process;
use terrasketch_analysis::SimulationManifest;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the binding analyzer
#[derive(Parser)]
#[command(version, about = "Dump the merged binding table of a simulation manifest")]
struct Args {
    /// Path to the manifest YAML file
    manifest: PathBuf,

    /// Print JSON instead of the debug representation
    #[arg(long)]
    json: bool,
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();

    let args = Args::parse();
    let manifest_dir = args.manifest.parent().unwrap_or(Path::new(".")).to_path_buf();

    let load_shader_file = |file_path: &str| -> Result<String, std::io::Error> {
        let shader_path = manifest_dir.join(file_path);
        if shader_path.exists() { std::fs::read_to_string(shader_path) } else { std::fs::read_to_string(file_path) }
    };

    let table = match SimulationManifest::from_file(&args.manifest).and_then(|manifest| manifest.analyze(load_shader_file)) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error analyzing manifest '{}': {e}", args.manifest.display());
            process::exit(1);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&table) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing binding table: {e}");
                process::exit(1);
            }
        }
    } else {
        println!("{table:#?}");
    }
}

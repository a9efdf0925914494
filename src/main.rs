//! Texture bundle CLI - pack image directories into `.xbt` bundles and
//! inspect them.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};

use texbundle::packer::ConfigError;
use texbundle::{BundleManager, BundleReader, Packer, PackerConfig, TextureFamily};

/// Build and inspect texture bundles
#[derive(Parser)]
#[command(name = "texbundle")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack every supported image under a directory into a bundle
    Pack(PackArgs),

    /// List the entries of a bundle
    List(ListArgs),

    /// Write the unpacked bytes of one entry to a file
    Extract(ExtractArgs),
}

#[derive(Args)]
struct PackArgs {
    /// Directory to read images from
    #[arg(short, long)]
    input: PathBuf,

    /// Bundle file to write
    #[arg(short, long, default_value = "Textures.xbt")]
    output: PathBuf,

    /// Share payload between images with identical pixels
    #[arg(long)]
    dupecheck: bool,

    /// Store frames without LZ4 compression
    #[arg(long)]
    no_compress: bool,

    /// Enable a texture family substitution (dxt, etc, astc); repeatable
    #[arg(long = "family", value_name = "NAME")]
    families: Vec<String>,

    /// JSON build configuration; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct ListArgs {
    /// Bundle file to inspect
    bundle: PathBuf,

    /// Print the listing as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ExtractArgs {
    /// Entry address, e.g. `Textures.xbt/ui/button.png`
    path: String,

    /// Output file
    #[arg(short, long)]
    output: PathBuf,
}

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let result = match cli.command {
        Commands::Pack(args) => pack(args),
        Commands::List(args) => list(args),
        Commands::Extract(args) => extract(args),
    };

    BundleManager::global().shutdown();

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn pack(args: PackArgs) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => PackerConfig::load(path)?,
        None => PackerConfig::default(),
    };
    if args.dupecheck {
        config.dedup = true;
    }
    if args.no_compress {
        config.compress = false;
    }
    for name in &args.families {
        let family = TextureFamily::find_builtin(name)
            .ok_or_else(|| ConfigError::UnknownFamily(name.clone()))?;
        if !config.families.iter().any(|f| f.name == family.name) {
            config.families.push(family);
        }
    }

    println!("Texture Bundle Packer");
    println!("=====================");
    println!("Input: {}", args.input.display());
    println!("Output: {}", args.output.display());
    println!("Dedup: {}", config.dedup);
    println!("Compression: {}", config.compress);
    if !config.families.is_empty() {
        let names: Vec<String> = config
            .families
            .iter()
            .map(|f| format!("{} ({})", f.name, f.priority))
            .collect();
        println!("Families: {}", names.join(", "));
    }
    println!();

    let start = Instant::now();
    let packer = Packer::new(config)?;
    let stats = packer.build(&args.input, &args.output)?;

    println!("Packed {}", stats);
    println!("Time: {:.2}s", start.elapsed().as_secs_f32());
    Ok(())
}

fn list(args: ListArgs) -> Result<(), Box<dyn Error>> {
    let reader = BundleReader::open(&args.bundle)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if args.json {
        serde_json::to_writer_pretty(&mut out, reader.entries())?;
        writeln!(out)?;
        return Ok(());
    }

    for entry in reader.entries() {
        let first = entry.frames.first().copied().unwrap_or_default();
        writeln!(
            out,
            "{:<48} {:>5}x{:<5} {:>3} frame(s) {:>10} -> {:>10} bytes  format {:#010x}",
            entry.path,
            first.width,
            first.height,
            entry.frames.len(),
            entry.unpacked_size(),
            entry.packed_size(),
            first.format.bits()
        )?;
    }
    writeln!(out, "{} entries", reader.entries().len())?;
    Ok(())
}

fn extract(args: ExtractArgs) -> Result<(), Box<dyn Error>> {
    let mut stream = BundleManager::global().open(&args.path)?;
    let mut out = BufWriter::new(File::create(&args.output)?);
    let copied = io::copy(&mut stream, &mut out)?;
    out.flush()?;

    println!(
        "Extracted {} bytes from {} to {}",
        copied,
        stream.entry().path,
        args.output.display()
    );
    Ok(())
}

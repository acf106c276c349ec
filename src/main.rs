use clap::{Parser, Subcommand};
use daxfile::codec::CodecId;
use daxfile::container::{DaxContainer, SaveOptions};
use daxfile::header::HeaderTable;
use daxfile::DaxBlock;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dax", about = "Inspect and rebuild DAX resource containers")]
struct Cli {
    /// Log filter (error, warn, info, debug, trace, or a tracing directive)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the blocks of a container
    List {
        input: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show container metadata
    Info {
        input: PathBuf,
    },
    /// Write every block to its own file
    Extract {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Dump every block's bytes back to back into one file
    Export {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Replace one block's bytes and save
    Replace {
        input: PathBuf,
        #[arg(long)]
        id: u8,
        /// File holding the new decoded bytes
        #[arg(long)]
        data: PathBuf,
        /// Write here instead of overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build a container from files
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// Codec: rle (default) or stored
        #[arg(short, long, default_value = "rle")]
        codec: String,
        /// Blocks as ID=PATH, in table order
        #[arg(required = true, num_args = 1.., value_parser = parse_block_arg)]
        blocks: Vec<(u8, PathBuf)>,
    },
    /// Re-encode a container
    Repack {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Force every block to this codec (rle or stored); default keeps each block's own
        #[arg(short, long)]
        codec: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level)?)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let dax = DaxContainer::load(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&dax.list())?);
                return Ok(());
            }
            println!("Container: {}", input.display());
            println!("{:>4} {:<7} {:>7} {:>9} {:<10} Head", "Id", "Codec", "Size", "CRC32", "Status");
            for (info, block) in dax.list().iter().zip(dax.blocks()) {
                let head = &block.data[..block.len().min(8)];
                println!("{:>4} {:<7} {:>7} {:08x}  {:<10} {}",
                    info.id, info.codec.name(), info.size, info.crc32,
                    format!("{:?}", info.status).to_lowercase(), hex::encode(head));
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let mut reader = std::io::BufReader::new(std::fs::File::open(&input)?);
            let table = HeaderTable::read(&mut reader)?;
            let dax = DaxContainer::from_table(&mut reader, &table, &input)?;
            let compressed = dax.blocks().iter().filter(|b| b.codec == CodecId::Rle).count();
            let damaged: Vec<String> = dax.damaged().map(|b| b.id.to_string()).collect();

            println!("── DAX Container ────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Data offset    {} B", table.data_start);
            println!("  Header entries {}", table.entries.len());
            println!("  Blocks         {} ({} rle, {} stored)",
                dax.len(), compressed, dax.len() - compressed);
            println!("  Skipped        {}", table.entries.len() - dax.len());
            println!("  Decoded size   {} B", dax.all_bytes().len());
            if damaged.is_empty() {
                println!("  Damaged        none");
            } else {
                println!("  Damaged        {}", damaged.join(", "));
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output_dir } => {
            let dax = DaxContainer::load(&input)?;
            std::fs::create_dir_all(&output_dir)?;
            for (n, block) in dax.blocks().iter().enumerate() {
                let path = output_dir.join(format!("block_{:03}_{n}.bin", block.id));
                std::fs::write(&path, &block.data)?;
                println!("  extracted  {}", path.display());
            }
        }

        // ── Export ───────────────────────────────────────────────────────────
        Commands::Export { input, output } => {
            let dax = DaxContainer::load(&input)?;
            std::fs::write(&output, dax.all_bytes())?;
            println!("Exported {} block(s) to {}", dax.len(), output.display());
        }

        // ── Replace ──────────────────────────────────────────────────────────
        Commands::Replace { input, id, data, output } => {
            let mut dax = DaxContainer::load(&input)?;
            let bytes = std::fs::read(&data)?;
            if let Some(old) = dax.block_by_id(id) {
                if old.len() != bytes.len() {
                    warn!(id, old = old.len(), new = bytes.len(), "replacement changes block size");
                }
            }
            dax.replace_block_data(id, bytes)?;
            match output {
                Some(out) => {
                    dax.save_as(&out, &SaveOptions::default())?;
                    println!("Saved: {}", out.display());
                }
                None => {
                    dax.save()?;
                    println!("Saved: {}", input.display());
                }
            }
        }

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, codec, blocks } => {
            let codec_id = parse_codec(&codec);
            let mut dax = DaxContainer::new(&output);
            for (id, path) in &blocks {
                let data = std::fs::read(path)?;
                dax.push_block(DaxBlock::with_codec(*id, data, codec_id));
                println!("  packed  {:3}  {}", id, path.display());
            }
            dax.save()?;
            println!("Created: {}", output.display());
        }

        // ── Repack ───────────────────────────────────────────────────────────
        Commands::Repack { input, output, codec } => {
            let dax = DaxContainer::load(&input)?;
            let opts = SaveOptions { codec: codec.as_deref().map(parse_codec) };
            dax.save_as(&output, &opts)?;
            let before = std::fs::metadata(&input)?.len();
            let after  = std::fs::metadata(&output)?.len();
            println!("Repacked → {} ({} B → {} B)", output.display(), before, after);
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn parse_codec(s: &str) -> CodecId {
    CodecId::from_name(s).unwrap_or_else(|| {
        warn!("Unknown codec '{}', defaulting to rle", s);
        CodecId::Rle
    })
}

fn parse_block_arg(s: &str) -> Result<(u8, PathBuf), String> {
    let (id, path) = s.split_once('=')
        .ok_or_else(|| format!("expected ID=PATH, got '{s}'"))?;
    let id = id.trim().parse::<u8>()
        .map_err(|e| format!("bad block id '{id}': {e}"))?;
    Ok((id, PathBuf::from(path)))
}

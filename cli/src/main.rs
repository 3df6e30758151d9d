use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use fatkit_core::{FormatOptions, VolumeConfig};
use fatkit_filesystems::{create_image, Fat16FileOps};
use log::debug;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "fatkit")]
#[command(about = "Inspect and edit files in FAT16 disk images", long_about = None)]
struct Cli {
    /// FAT16 disk image
    image: PathBuf,

    /// Volume config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Open the image read-only, refusing every change
    #[arg(long, global = true)]
    read_only: bool,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show volume geometry and usage
    Info {
        #[arg(long)]
        json: bool,
    },
    /// List files in the root directory
    Ls {
        #[arg(long)]
        json: bool,
    },
    /// Copy a file out of the image to the host
    Cp {
        /// Short name inside the image (NAME.EXT)
        name: String,
        /// Host destination path
        dest: PathBuf,
    },
    /// Write a file's content to stdout
    Cat { name: String },
    /// Copy a host file into the image
    Put {
        /// Host source path
        source: PathBuf,
        /// Short name to create; defaults to the source file name
        name: Option<String>,
    },
    /// Delete a file, zeroing its data
    Rm { name: String },
    /// Rename a file; prompts for the new name when it is not given
    Mv { name: String, new_name: Option<String> },
    /// Create and format a blank FAT16 image
    Format {
        /// Image size, with optional K/M/G suffix
        #[arg(short, long)]
        size: String,
        #[arg(short, long)]
        label: Option<String>,
        /// Cluster size in bytes
        #[arg(long)]
        cluster_size: Option<u32>,
        #[arg(long, default_value_t = 512)]
        root_entries: u16,
        /// Allow cluster counts below the FAT16 minimum (small scratch images)
        #[arg(long)]
        allow_small: bool,
    },
}

impl Commands {
    fn mutates(&self) -> bool {
        matches!(self, Commands::Put { .. } | Commands::Rm { .. } | Commands::Mv { .. })
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Commands::Format {
        size,
        label,
        cluster_size,
        root_entries,
        allow_small,
    } = &cli.command
    {
        let size_bytes = parse_size(size)?;
        let options = FormatOptions {
            label: label.clone(),
            cluster_size: *cluster_size,
            root_entries: *root_entries,
            enforce_cluster_range: !allow_small,
            ..FormatOptions::default()
        };
        let bpb = create_image(&cli.image, size_bytes, &options)
            .with_context(|| format!("format {}", cli.image.display()))?;
        println!(
            "Formatted {} as FAT16: {} sectors of {} bytes, {} bytes per cluster",
            cli.image.display(),
            bpb.total_sectors(),
            bpb.bytes_per_sector,
            bpb.bytes_per_sector as u32 * bpb.sectors_per_cluster as u32
        );
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => VolumeConfig::load(path).with_context(|| format!("load config {}", path.display()))?,
        None => VolumeConfig::default(),
    };
    config.read_only = cli.read_only || !cli.command.mutates();
    debug!("Volume config: {:?}", config);

    let mut ops = Fat16FileOps::open(&cli.image, config)
        .with_context(|| format!("open image {}", cli.image.display()))?;

    match cli.command {
        Commands::Info { json } => {
            let info = ops.info().context("info")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Volume label:    {}", info.label.as_deref().unwrap_or("(none)"));
                println!("OEM name:        {}", info.oem_name);
                println!("Filesystem:      {}", info.filesystem_type);
                println!("Serial:          {:04X}-{:04X}", info.volume_id >> 16, info.volume_id & 0xFFFF);
                println!("Bytes/sector:    {}", info.bytes_per_sector);
                println!("Cluster size:    {} bytes", info.cluster_size);
                println!("FAT copies:      {} x {} sectors", info.fat_copies, info.sectors_per_fat);
                println!("Root entries:    {} used of {}", info.used_entries, info.root_entries);
                println!("Clusters:        {} free of {}", info.free_clusters, info.cluster_count);
                println!("Space:           {} free of {} bytes", info.free_space, info.total_space);
            }
        }
        Commands::Ls { json } => {
            let files = ops.list().context("ls")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                for file in &files {
                    let modified = file
                        .modified
                        .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default();
                    let kind = if file.is_directory { "<DIR>" } else { "" };
                    println!("{:<12} {:>10} {:>5} {:>6}  {}", file.name, file.size, kind, file.starting_cluster, modified);
                }
                println!("{} file(s)", files.len());
            }
        }
        Commands::Cp { name, dest } => {
            let copied = ops
                .copy_out_to_path(&name, &dest)
                .with_context(|| format!("cp {} {}", name, dest.display()))?;
            println!("Copied {} bytes from {} to {}", copied, name, dest.display());
        }
        Commands::Cat { name } => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            ops.copy_out(&name, &mut out).with_context(|| format!("cat {}", name))?;
        }
        Commands::Put { source, name } => {
            let name = match name {
                Some(name) => name,
                None => default_short_name(&source)?,
            };
            let file = File::open(&source).with_context(|| format!("open {}", source.display()))?;
            let len = file.metadata()?.len();
            let info = ops
                .copy_in(&name, &mut BufReader::new(file), len)
                .with_context(|| format!("put {} as {}", source.display(), name))?;
            println!("Wrote {} ({} bytes, cluster {})", info.name, info.size, info.starting_cluster);
        }
        Commands::Rm { name } => {
            ops.delete(&name).with_context(|| format!("rm {}", name))?;
            println!("Deleted {}", name);
        }
        Commands::Mv { name, new_name } => {
            // Fail on a missing source before asking for a name
            ops.find(&name).with_context(|| format!("mv {}", name))?;
            let new_name = match new_name {
                Some(new_name) => new_name,
                None => prompt(&format!("New name for {}: ", name))?,
            };
            ops.rename(&name, &new_name)
                .with_context(|| format!("mv {} {}", name, new_name))?;
            println!("Renamed {} to {}", name, new_name.to_ascii_uppercase());
        }
        // Formatting creates the image and has already returned
        Commands::Format { .. } => {}
    }

    Ok(())
}

fn prompt(message: &str) -> anyhow::Result<String> {
    print!("{}", message);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let answer = line.trim().to_string();
    if answer.is_empty() {
        bail!("no name given");
    }
    Ok(answer)
}

fn default_short_name(source: &Path) -> anyhow::Result<String> {
    source
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_ascii_uppercase())
        .with_context(|| format!("{} has no usable file name", source.display()))
}

/// Parse sizes like `65536`, `64K`, `32M` or `1G`
fn parse_size(text: &str) -> anyhow::Result<u64> {
    let text = text.trim();
    let (digits, multiplier) = match text.char_indices().last() {
        Some((i, 'K' | 'k')) => (&text[..i], 1024),
        Some((i, 'M' | 'm')) => (&text[..i], 1024 * 1024),
        Some((i, 'G' | 'g')) => (&text[..i], 1024 * 1024 * 1024),
        _ => (text, 1),
    };
    let value: u64 = digits
        .parse()
        .with_context(|| format!("invalid size '{}'", text))?;
    value
        .checked_mul(multiplier)
        .with_context(|| format!("size '{}' is too large", text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_accept_suffixes() {
        assert_eq!(parse_size("65536").unwrap(), 65536);
        assert_eq!(parse_size("64K").unwrap(), 64 * 1024);
        assert_eq!(parse_size("32m").unwrap(), 32 * 1024 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert!(parse_size("lots").is_err());
        assert!(parse_size("").is_err());
    }

    #[test]
    fn default_name_comes_from_the_source_path() {
        assert_eq!(default_short_name(Path::new("/tmp/readme.txt")).unwrap(), "README.TXT");
        assert!(default_short_name(Path::new("/")).is_err());
    }

    #[test]
    fn only_put_rm_and_mv_open_for_writing() {
        assert!(Commands::Rm { name: "A".into() }.mutates());
        assert!(!Commands::Ls { json: false }.mutates());
        assert!(!Commands::Cat { name: "A".into() }.mutates());
    }
}

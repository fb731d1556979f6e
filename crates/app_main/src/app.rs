//! Command definitions and dispatch

use anyhow::{anyhow, bail, Context, Result};
use app_core::{IconOptions, IconRecord, IconService, ShellMetaConfig};
use app_fs::FileAttributes;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about = "Inspect file metadata and shell icons")]
pub struct Args {
    /// Configuration file to use instead of the per-user one
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug events to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Thumbnail or icon of a path as PNG
    Icon {
        path: String,
        /// Requested edge length in pixels; defaults to `icons.default_size`
        #[arg(long)]
        size: Option<i32>,
        /// Treat the path as a folder
        #[arg(long)]
        folder: bool,
        #[arg(long, conflicts_with = "thumbnail_only")]
        icon_only: bool,
        #[arg(long)]
        thumbnail_only: bool,
        /// Only use images the shell already has cached
        #[arg(long)]
        cached_only: bool,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Overlay badge of a path as PNG
    Overlay {
        path: String,
        #[arg(long)]
        directory: bool,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Icons embedded in a binary; every icon when no index is given
    DllIcons {
        file: String,
        /// Resource ids to extract
        #[arg(short, long = "index")]
        indices: Vec<i32>,
        #[arg(long, default_value_t = 32)]
        size: i32,
        /// Directory receiving `<index>.png` files
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Target of a symbolic link or junction
    Reparse { path: String },
    /// Named alternate data streams of a file
    Streams { path: String },
    /// File reference number of a file or folder
    Identity {
        path: String,
        #[arg(long)]
        folder: bool,
    },
    /// Path of a file reference number on a volume
    ResolveId {
        /// Reference number, decimal or `0x` hex
        frn: String,
        /// Any path on the volume
        volume: String,
    },
    /// Show or change file attributes
    Attr {
        path: String,
        /// Attribute to set, e.g. `hidden`
        #[arg(long)]
        set: Vec<String>,
        /// Attribute to clear
        #[arg(long)]
        clear: Vec<String>,
    },
    /// Enable or disable NTFS compression
    Compress {
        path: String,
        #[arg(long)]
        disable: bool,
    },
    /// Find record, allocation size and identity
    Stat { path: String },
    /// Set or clear the custom icon of a folder
    FolderIcon {
        folder: String,
        /// Icon file; the custom icon is cleared when omitted
        #[arg(long)]
        icon: Option<String>,
        #[arg(long, default_value_t = 0)]
        index: i32,
    },
    /// Set the icon of a shortcut
    ShortcutIcon {
        link: String,
        icon: String,
        #[arg(long, default_value_t = 0)]
        index: i32,
    },
    /// String resource of a binary
    DllString { file: String, id: u32 },
    /// Copy a file through an overlapped write
    WriteAsync {
        source: String,
        destination: String,
        /// Cancel the write when it takes longer than this
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

pub fn run(command: Command, config: &ShellMetaConfig) -> Result<()> {
    match command {
        Command::Icon {
            path,
            size,
            folder,
            icon_only,
            thumbnail_only,
            cached_only,
            out,
        } => {
            let mut options = IconOptions::empty();
            options.set(IconOptions::ICON_ONLY, icon_only);
            options.set(IconOptions::THUMBNAIL_ONLY, thumbnail_only);
            options.set(IconOptions::CACHED_ONLY, cached_only);
            let size = size.unwrap_or(config.icons.default_size);

            let png = service(config)?
                .resolve_icon(&path, size, folder, options)
                .ok_or_else(|| anyhow!("No image available for {}", path))?;
            emit_png(&png, out.as_deref())
        }
        Command::Overlay {
            path,
            directory,
            out,
        } => match service(config)?.resolve_overlay_badge(&path, directory) {
            Some(png) => emit_png(&png, out.as_deref()),
            None => {
                println!("{}: no overlay", path);
                Ok(())
            }
        },
        Command::DllIcons {
            file,
            indices,
            size,
            out_dir,
        } => {
            let service = service(config)?;
            let records = if indices.is_empty() {
                service
                    .extract_all_icons(&file)
                    .ok_or_else(|| anyhow!("{} has no embedded icons", file))?
            } else {
                service.extract_selected_icons(&file, &indices, size)
            };
            emit_records(&records, out_dir.as_deref())
        }
        Command::Reparse { path } => {
            let target = app_fs::resolve_reparse_point(&path)
                .with_context(|| format!("Cannot resolve {}", path))?;
            println!("{}", target);
            Ok(())
        }
        Command::Streams { path } => {
            let mut found = 0;
            for stream in app_fs::alternate_streams(&path) {
                println!("{}\t{}", stream.name, stream.size_bytes);
                found += 1;
            }
            tracing::debug!("{} alternate streams on {}", found, path);
            Ok(())
        }
        Command::Identity { path, folder } => {
            let identity = if folder {
                app_fs::get_folder_identity(&path)
            } else {
                app_fs::get_file_identity(&path)
            }
            .ok_or_else(|| anyhow!("No identity for {}", path))?;
            println!("{}", identity);
            Ok(())
        }
        Command::ResolveId { frn, volume } => {
            let frn = parse_frn(&frn)?;
            let path = app_fs::resolve_path_from_identity(frn, &volume)
                .ok_or_else(|| anyhow!("No file with id {:#x} on {}", frn, volume))?;
            println!("{}", path);
            Ok(())
        }
        Command::Attr { path, set, clear } => {
            for name in &set {
                let mask = parse_attribute(name)?;
                if !app_fs::set_attribute(&path, mask) {
                    bail!("Failed to set {} on {}", name, path);
                }
            }
            for name in &clear {
                let mask = parse_attribute(name)?;
                if !app_fs::clear_attribute(&path, mask) {
                    bail!("Failed to clear {} on {}", name, path);
                }
            }

            let present: Vec<&str> = FileAttributes::all()
                .iter_names()
                .filter(|(_, flag)| app_fs::has_attribute(&path, *flag))
                .map(|(name, _)| name)
                .collect();
            println!("{}", present.join(" "));
            Ok(())
        }
        Command::Compress { path, disable } => {
            if !disable && !app_fs::can_compress(&path) {
                bail!("The volume holding {} does not support compression", path);
            }
            if !app_fs::set_compression(&path, !disable) {
                bail!("Failed to change compression of {}", path);
            }
            Ok(())
        }
        Command::Stat { path } => {
            let data =
                app_fs::find_data(&path).ok_or_else(|| anyhow!("{} does not exist", path))?;
            println!("path: {}", path);
            println!("name: {}", data.file_name);
            println!("attributes: {:?}", data.attributes);
            println!("size: {}", data.size);
            if let Some(size) = app_fs::size_on_disk(&path) {
                println!("size on disk: {}", size);
            }
            println!("created: {:?}", data.creation_time.to_system_time());
            println!("accessed: {:?}", data.last_access_time.to_system_time());
            println!(
                "modified: {} ({:?})",
                data.last_write_time.0,
                data.last_write_time.to_system_time()
            );
            if let Some(identity) = app_fs::get_file_identity(&path) {
                println!("identity: {}", identity);
            }
            Ok(())
        }
        Command::FolderIcon {
            folder,
            icon,
            index,
        } => {
            if !service(config)?.set_custom_folder_icon(&folder, icon.as_deref(), index) {
                bail!("Failed to change the icon of {}", folder);
            }
            Ok(())
        }
        Command::ShortcutIcon { link, icon, index } => {
            if !service(config)?.set_custom_file_icon(&link, &icon, index) {
                bail!("Failed to change the icon of {}", link);
            }
            Ok(())
        }
        Command::DllString { file, id } => {
            let text = service(config)?
                .extract_string_from_dll(&file, id)
                .ok_or_else(|| anyhow!("No string {} in {}", id, file))?;
            println!("{}", text);
            Ok(())
        }
        Command::WriteAsync {
            source,
            destination,
            timeout_ms,
        } => write_async(&source, &destination, timeout_ms.map(Duration::from_millis)),
    }
}

fn service(config: &ShellMetaConfig) -> Result<&'static IconService> {
    match app_core::icon_service() {
        Some(service) => Ok(service),
        None => app_core::init(config),
    }
}

fn emit_png(png: &[u8], out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, png).with_context(|| format!("Cannot write {:?}", path))?;
            tracing::info!("Wrote {} bytes to {:?}", png.len(), path);
        }
        None => println!("PNG, {} bytes", png.len()),
    }
    Ok(())
}

fn emit_records(records: &[IconRecord], out_dir: Option<&Path>) -> Result<()> {
    if let Some(dir) = out_dir {
        std::fs::create_dir_all(dir)?;
    }
    for record in records {
        match out_dir {
            Some(dir) => emit_png(&record.bytes, Some(&dir.join(format!("{}.png", record.index))))?,
            None => println!("#{}\tPNG, {} bytes", record.index, record.bytes.len()),
        }
    }
    Ok(())
}

fn write_async(source: &str, destination: &str, timeout: Option<Duration>) -> Result<()> {
    let handle = app_fs::open_for_read(source, false, 0);
    let bytes = app_fs::read_all(&handle).ok_or_else(|| anyhow!("Cannot read {}", source))?;
    drop(handle);

    let write = app_fs::begin_overlapped_write(destination, bytes)
        .ok_or_else(|| anyhow!("Cannot start a write to {}", destination))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let completion = runtime.block_on(async move {
        let mut write = write;
        match timeout {
            Some(limit) => tokio::select! {
                done = &mut write => done,
                _ = tokio::time::sleep(limit) => {
                    tracing::warn!("Write to {} timed out, cancelling", destination);
                    write.cancel();
                    write.await
                }
            },
            None => write.await,
        }
    });

    if !completion.is_success() {
        bail!(
            "Write to {} failed with error {}",
            destination,
            completion.error_code
        );
    }
    println!("{} bytes written", completion.bytes_transferred);
    Ok(())
}

fn parse_frn(text: &str) -> Result<u64> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("Invalid file reference number: {}", text))
}

fn parse_attribute(name: &str) -> Result<FileAttributes> {
    let upper = name.to_ascii_uppercase().replace('-', "_");
    FileAttributes::from_name(&upper).ok_or_else(|| anyhow!("Unknown attribute: {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommand() {
        let args = Args::try_parse_from([
            "shellmeta",
            "--config",
            "custom.toml",
            "dll-icons",
            "shell32.dll",
            "-i",
            "3",
            "-i",
            "4",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("custom.toml")));
        match args.command {
            Command::DllIcons { indices, size, .. } => {
                assert_eq!(indices, vec![3, 4]);
                assert_eq!(size, 32);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_folder_icon_is_optional() {
        let args = Args::try_parse_from(["shellmeta", "folder-icon", "photos", "--index", "2"])
            .unwrap();
        match args.command {
            Command::FolderIcon { folder, icon, index } => {
                assert_eq!(folder, "photos");
                assert!(icon.is_none());
                assert_eq!(index, 2);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_stat_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.txt").to_str().unwrap().to_string();
        let result = run(Command::Stat { path }, &ShellMetaConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_icon_flags_conflict() {
        let parsed = Args::try_parse_from([
            "shellmeta",
            "icon",
            "a.txt",
            "--icon-only",
            "--thumbnail-only",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_frn() {
        assert_eq!(parse_frn("0x10").unwrap(), 16);
        assert_eq!(parse_frn("42").unwrap(), 42);
        assert!(parse_frn("zz").is_err());
    }

    #[test]
    fn test_parse_attribute() {
        assert_eq!(parse_attribute("hidden").unwrap(), FileAttributes::HIDDEN);
        assert_eq!(
            parse_attribute("not-content-indexed").unwrap(),
            FileAttributes::NOT_CONTENT_INDEXED
        );
        assert!(parse_attribute("shiny").is_err());
    }

    #[test]
    fn test_write_async_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.bin");
        let dest = dir.path().join("out.bin");
        std::fs::write(&source, vec![7u8; 10_000]).unwrap();

        write_async(
            source.to_str().unwrap(),
            dest.to_str().unwrap(),
            None,
        )
        .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), vec![7u8; 10_000]);
    }
}

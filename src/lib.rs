//! veilfs library entry points.

pub mod archive;
pub mod cli;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod resolve;
pub mod telemetry;
pub mod vfs;

use std::io::{self, Read, Write};

use anyhow::{bail, Context as _, Result};

use crate::cli::{Cli, Commands, ListArgs, PathArgs};
use crate::vfs::{Context, OpenFlags, TransparentFs, VfsFile};

/// Execute the command represented by the parsed CLI input.
pub fn run(cli: Cli) -> Result<()> {
    let fs = TransparentFs::new(cli.root.clone());
    let ctx = match &cli.key {
        Some(key) => Context::with_key(key.as_str()),
        None => Context::new(),
    };

    match cli.command {
        Commands::Archive(args) => fs
            .archive_directory(&args.path)
            .with_context(|| format!("failed to archive {}", args.path)),
        Commands::Unarchive(args) => fs
            .unarchive_directory(&args.path)
            .with_context(|| format!("failed to unarchive {}", args.path)),
        Commands::Encrypt(args) => {
            let key = ctx.require_key()?;
            fs.encrypt_directory(&args.path, key, !args.flat)
                .with_context(|| format!("failed to encrypt {}", args.path))
        }
        Commands::Decrypt(args) => {
            let key = ctx.require_key()?;
            fs.decrypt_directory(&args.path, key, !args.flat)
                .with_context(|| format!("failed to decrypt {}", args.path))
        }
        Commands::List(args) => handle_list(&fs, &ctx, &args),
        Commands::Cat(args) => handle_cat(&fs, &ctx, &args),
        Commands::Put(args) => handle_put(&fs, &ctx, &args),
        Commands::Move(args) => fs
            .rename(&ctx, &args.from, &args.to)
            .with_context(|| format!("failed to move {} to {}", args.from, args.to)),
        Commands::Remove(args) => fs
            .remove(&args.path)
            .with_context(|| format!("failed to remove {}", args.path)),
        Commands::Mkdir(args) => fs
            .mkdir(&args.path, 0o755)
            .with_context(|| format!("failed to create {}", args.path)),
    }
}

fn handle_list(fs: &TransparentFs, ctx: &Context, args: &ListArgs) -> Result<()> {
    let mut handle = fs.open(ctx, &args.path, OpenFlags::read_only())?;
    let listing = handle.readdir(0);
    let closed = handle.close();
    let listing = listing?;
    closed?;

    if args.json {
        serde_json::to_writer_pretty(io::stdout(), &listing)
            .context("failed to render listing")?;
        println!();
        return Ok(());
    }
    for info in &listing {
        if info.is_dir {
            println!("{}/", info.name);
        } else {
            println!("{}\t{}", info.size, info.name);
        }
    }
    Ok(())
}

fn handle_cat(fs: &TransparentFs, ctx: &Context, args: &PathArgs) -> Result<()> {
    let mut handle = fs.open(ctx, &args.path, OpenFlags::read_only())?;
    let mut stdout = io::stdout().lock();
    let mut buffer = vec![0_u8; 64 * 1024];
    loop {
        let read = handle.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        stdout.write_all(&buffer[..read])?;
    }
    handle.close()?;
    Ok(())
}

fn handle_put(fs: &TransparentFs, ctx: &Context, args: &PathArgs) -> Result<()> {
    let mut handle = fs.open(ctx, &args.path, OpenFlags::write_create())?;
    let mut stdin = io::stdin().lock();
    let mut buffer = vec![0_u8; 64 * 1024];
    loop {
        let read = stdin.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        let mut offset = 0;
        while offset < read {
            let written = handle.write(&buffer[offset..read])?;
            if written == 0 {
                bail!("{} does not accept writes", args.path);
            }
            offset += written;
        }
    }
    handle.close()?;
    Ok(())
}

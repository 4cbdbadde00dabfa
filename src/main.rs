use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use staging_sandbox::{DeleteOption, FileOp, Sandbox, SandboxPath, WorkQueue};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "sandbox")]
#[command(about = "Stage file changes against a directory tree", long_about = None)]
#[command(version)]
struct Args {
    /// Directory tree the changes apply to
    #[arg(long, env = "SANDBOX_BASE", value_name = "DIR")]
    base: PathBuf,

    /// Directory holding staged files and the work queue log
    #[arg(long, env = "SANDBOX_SHADOW", value_name = "DIR")]
    shadow: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show pending operations in replay order
    Status {
        #[arg(long)]
        json: bool,
    },
    /// List a directory as it will look after commit
    Ls {
        /// Directory to list (defaults to the base root)
        path: Option<PathBuf>,
    },
    /// Print a file as it will look after commit
    Cat { path: PathBuf },
    /// Stage a copy of a local file
    Put { src: PathBuf, dest: PathBuf },
    /// Move an external file into the sandbox
    Import { src: PathBuf, dest: PathBuf },
    /// Rename a file or directory
    Mv { from: PathBuf, to: PathBuf },
    /// Delete a file or directory
    Rm {
        #[arg(short, long)]
        recursive: bool,
        path: PathBuf,
    },
    /// Apply all pending changes to the base tree
    Commit {
        #[arg(long)]
        json: bool,
    },
    /// Drop all pending changes
    Discard,
}

#[derive(Serialize)]
struct Status<'a> {
    base: &'a Path,
    shadow: &'a Path,
    queue: &'a WorkQueue,
    staged_files: Vec<SandboxPath>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut sandbox = Sandbox::open(&args.base, &args.shadow).with_context(|| {
        format!(
            "Failed to open sandbox over {} (shadow {})",
            args.base.display(),
            args.shadow.display()
        )
    })?;

    match args.command {
        Command::Status { json } => status(&sandbox, json),
        Command::Ls { path } => {
            let path = path.unwrap_or_default();
            for child in sandbox.list_paths(&path)? {
                let marker = if sandbox.is_directory(&child)? { "/" } else { "" };
                println!("{}{}", child, marker);
            }
            Ok(())
        }
        Command::Cat { path } => {
            let contents = sandbox
                .read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            io::stdout().write_all(&contents)?;
            Ok(())
        }
        Command::Put { src, dest } => {
            let contents =
                std::fs::read(&src).with_context(|| format!("Failed to read {}", src.display()))?;
            sandbox.write(&dest, contents)?;
            println!("✓ Staged {}", dest.display());
            Ok(())
        }
        Command::Import { src, dest } => {
            let src = std::path::absolute(&src)?;
            if sandbox.is_sandboxed(&src) {
                bail!("{} is already inside the sandbox; use mv", src.display());
            }
            if !sandbox.move_file(&src, &dest)? {
                bail!("Failed to import {}", src.display());
            }
            println!("✓ Imported {} as {}", src.display(), dest.display());
            Ok(())
        }
        Command::Mv { from, to } => {
            let moved = if sandbox.is_directory(&from)? {
                sandbox.move_directory(&from, &to)?
            } else {
                sandbox.move_file(&from, &to)?
            };
            if !moved {
                bail!("Failed to move {} to {}", from.display(), to.display());
            }
            println!("✓ Moved {} -> {}", from.display(), to.display());
            Ok(())
        }
        Command::Rm { recursive, path } => {
            if !sandbox.exists(&path)? {
                bail!("{} does not exist", path.display());
            }
            let options: &[DeleteOption] = if recursive {
                &[DeleteOption::Recursive]
            } else {
                &[]
            };
            sandbox
                .delete(&path, options)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
            println!("✓ Deleted {}", path.display());
            Ok(())
        }
        Command::Commit { json } => commit(&mut sandbox, json),
        Command::Discard => {
            let pending = sandbox.work_queue().len();
            sandbox.discard()?;
            println!("✓ Discarded {} pending operations", pending);
            Ok(())
        }
    }
}

fn status(sandbox: &Sandbox, json: bool) -> Result<()> {
    let queue = sandbox.work_queue();
    let status = Status {
        base: sandbox.base_dir(),
        shadow: sandbox.shadow_dir(),
        queue: &queue,
        staged_files: sandbox.staged_files()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Base:   {}", status.base.display());
    println!("Shadow: {}", status.shadow.display());
    if queue.is_empty() {
        println!("No pending changes");
        return Ok(());
    }

    println!("\n{} pending operations:", queue.len());
    for (path, op) in queue.iter() {
        match op {
            FileOp::Move { from } => {
                println!("  {} {} <- {}", op.opcode(), path, from)
            }
            _ => println!("  {} {}", op.opcode(), path),
        }
    }
    println!("\n{} staged files", status.staged_files.len());
    Ok(())
}

fn commit(sandbox: &mut Sandbox, json: bool) -> Result<()> {
    let mut written = Vec::new();
    let mut removed = Vec::new();
    let report = sandbox
        .commit_with(
            |path| written.push(path.to_path_buf()),
            |path| removed.push(path.to_path_buf()),
        )
        .context("Commit failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for path in &written {
            println!("  + {}", path.display());
        }
        for path in &removed {
            println!("  - {}", path.display());
        }
        for failure in &report.failures {
            eprintln!("  ✗ {} {}: {}", failure.op.label(), failure.path, failure.error);
        }
        println!(
            "\n✓ Applied {} operations ({} failed)",
            report.applied,
            report.failures.len()
        );
    }

    if !report.is_clean() {
        bail!("{} operations failed to apply", report.failures.len());
    }
    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (warnings by default)
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = fmt::layer().with_writer(io::stderr).with_target(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();
}

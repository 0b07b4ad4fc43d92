use std::path::{Path, PathBuf};
use std::process::Command;
use std::{env, fs};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

const BINARY: &str = "httptap";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build and package httptap")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the complete binary (eBPF object embedded in userspace)
    Build {
        /// Build in release mode
        #[arg(long)]
        release: bool,

        /// Target triple for cross-compilation (e.g. aarch64-unknown-linux-gnu)
        #[arg(long)]
        target: Option<String>,
    },

    /// Build only the eBPF object, without the userspace loader
    BuildEbpf {
        /// bpfel-unknown-none or bpfeb-unknown-none
        #[arg(long, default_value = "bpfel-unknown-none")]
        target: String,
    },

    /// Package the release binary with an env template and systemd unit
    Package {
        /// Target triple
        #[arg(long)]
        target: Option<String>,

        /// Output directory
        #[arg(long, default_value = "dist")]
        output: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { release, target } => {
            build(release, target.as_deref())?;
        }
        Commands::BuildEbpf { target } => {
            build_ebpf(&target)?;
        }
        Commands::Package { target, output } => {
            package(target.as_deref(), &output)?;
        }
    }

    Ok(())
}

fn project_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask has no parent directory")
}

fn binary_path(root: &Path, release: bool, target: Option<&str>) -> PathBuf {
    let profile = if release { "release" } else { "debug" };
    match target {
        Some(t) => root.join("target").join(t).join(profile).join(BINARY),
        None => root.join("target").join(profile).join(BINARY),
    }
}

fn build(release: bool, target: Option<&str>) -> Result<()> {
    let root = project_root()?;

    println!("Building {}...", BINARY);

    // Linux target from a non-Linux host
    let is_cross_compile =
        target.is_some_and(|t| t.contains("linux")) && !cfg!(target_os = "linux");

    let build_cmd = if is_cross_compile {
        if which::which("cross").is_ok() {
            println!("   Using 'cross' for cross-compilation");
            "cross"
        } else {
            bail!(
                "Cross-compilation to Linux requires 'cross' tool.\n\
                 Install with: cargo install cross\n\
                 Also requires Docker to be running."
            );
        }
    } else {
        "cargo"
    };

    let mut cmd = Command::new(build_cmd);
    cmd.current_dir(&root).arg("build");

    if release {
        cmd.arg("--release");
    }

    if let Some(t) = target {
        cmd.arg("--target").arg(t);
        println!("   Target: {}", t);
    }

    cmd.arg("-p").arg(BINARY);

    let status = cmd.status().context("Failed to run cargo build")?;
    if !status.success() {
        bail!("Build failed");
    }

    println!("Build complete: {}", binary_path(&root, release, target).display());
    Ok(())
}

fn build_ebpf(target: &str) -> Result<()> {
    if !matches!(target, "bpfel-unknown-none" | "bpfeb-unknown-none") {
        bail!("Unsupported eBPF target: {}", target);
    }
    if which::which("bpf-linker").is_err() {
        bail!("bpf-linker not found. Install with: cargo install bpf-linker");
    }

    let root = project_root()?;
    let status = Command::new("cargo")
        .current_dir(root.join("httptap-ebpf"))
        .env("RUSTUP_TOOLCHAIN", "nightly")
        .args([
            "build",
            "--release",
            &format!("--target={}", target),
            "-Z",
            "build-std=core",
        ])
        .status()
        .context("Failed to run cargo build for httptap-ebpf")?;

    if !status.success() {
        bail!("eBPF build failed");
    }

    println!(
        "eBPF object: {}",
        root.join("target")
            .join(target)
            .join("release")
            .join(BINARY)
            .display()
    );
    Ok(())
}

fn systemd_service(env_file: &str) -> String {
    format!(
        r#"[Unit]
Description=httptap HTTP traffic tracer
After=network.target

[Service]
Type=simple
ExecStart=/usr/local/bin/{bin}
EnvironmentFile=-{env_file}
Restart=on-failure
RestartSec=5
KillSignal=SIGTERM

CapabilityBoundingSet=CAP_SYS_ADMIN CAP_BPF CAP_PERFMON
AmbientCapabilities=CAP_SYS_ADMIN CAP_BPF CAP_PERFMON

[Install]
WantedBy=multi-user.target
"#,
        bin = BINARY,
        env_file = env_file,
    )
}

fn package(target: Option<&str>, output_dir: &str) -> Result<()> {
    build(true, target)?;

    let root = project_root()?;
    let output_path = root.join(output_dir);
    fs::create_dir_all(&output_path).context("Failed to create output directory")?;

    let binary = binary_path(&root, true, target);
    if !binary.exists() {
        bail!("Binary not found at: {}", binary.display());
    }

    let arch = target.unwrap_or(env::consts::ARCH);
    let package_name = format!("{}-{}-{}", BINARY, env!("CARGO_PKG_VERSION"), arch);
    let package_dir = output_path.join(&package_name);
    fs::create_dir_all(&package_dir)?;

    fs::copy(&binary, package_dir.join(BINARY))?;

    let env_example = root.join("example.env");
    if env_example.exists() {
        fs::copy(&env_example, package_dir.join("httptap.env.example"))?;
    }

    fs::write(
        package_dir.join("httptap.service"),
        systemd_service("/etc/httptap/httptap.env"),
    )?;

    let install_script = r#"#!/bin/bash
set -e

INSTALL_DIR="${INSTALL_DIR:-/usr/local/bin}"
CONFIG_DIR="${CONFIG_DIR:-/etc/httptap}"

sudo install -m 755 httptap "$INSTALL_DIR/httptap"

sudo mkdir -p "$CONFIG_DIR"
if [ -f httptap.env.example ] && [ ! -f "$CONFIG_DIR/httptap.env" ]; then
    sudo cp httptap.env.example "$CONFIG_DIR/httptap.env"
fi

sudo cp httptap.service /etc/systemd/system/httptap.service
sudo systemctl daemon-reload

echo "Installed to $INSTALL_DIR/httptap"
echo "Start with: sudo systemctl enable --now httptap"
"#;
    fs::write(package_dir.join("install.sh"), install_script)?;

    let tarball = output_path.join(format!("{}.tar.gz", package_name));
    let status = Command::new("tar")
        .current_dir(&output_path)
        .args(["-czf", &tarball.to_string_lossy(), &package_name])
        .status()
        .context("Failed to create tarball")?;

    if !status.success() {
        bail!("Failed to create tarball");
    }

    fs::remove_dir_all(&package_dir)?;

    println!("Package created: {}", tarball.display());
    Ok(())
}

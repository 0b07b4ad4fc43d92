use std::{env, fs, path::PathBuf, process::Command};

use anyhow::{Context, Result, bail};

/// Set to skip the nested eBPF build (e.g. on hosts without bpf-linker).
/// An empty object is embedded instead and the engine refuses to start.
/// Without it, a failed eBPF build fails the whole build.
const SKIP_ENV: &str = "HTTPTAP_SKIP_EBPF_BUILD";

fn main() -> Result<()> {
    let out_dir = PathBuf::from(env::var("OUT_DIR").context("OUT_DIR not set")?);
    let out_file = out_dir.join("httptap");

    println!("cargo:rerun-if-changed=../httptap-ebpf/src");
    println!("cargo:rerun-if-changed=../httptap-common/src");
    println!("cargo:rerun-if-env-changed={}", SKIP_ENV);

    if env::var_os(SKIP_ENV).is_some() {
        println!("cargo:warning={} set, embedding an empty eBPF object", SKIP_ENV);
        fs::write(&out_file, [])?;
        return Ok(());
    }

    let object = build_ebpf().with_context(|| {
        format!(
            "eBPF build failed; install bpf-linker and a nightly toolchain, or set {} to build userspace only",
            SKIP_ENV
        )
    })?;
    fs::copy(&object, &out_file)
        .with_context(|| format!("Failed to copy {}", object.display()))?;
    println!("cargo:warning=eBPF build completed");

    Ok(())
}

fn build_ebpf() -> Result<PathBuf> {
    let arch = env::var("CARGO_CFG_TARGET_ARCH").context("CARGO_CFG_TARGET_ARCH not set")?;

    let bpf_target = match arch.as_str() {
        "x86_64" | "x86" | "aarch64" | "arm" | "riscv64" => "bpfel-unknown-none",
        "mips" | "mips64" | "powerpc" | "powerpc64" | "s390x" => "bpfeb-unknown-none",
        _ => {
            println!(
                "cargo:warning=Unknown architecture '{}', defaulting to bpfel-unknown-none",
                arch
            );
            "bpfel-unknown-none"
        }
    };

    println!(
        "cargo:warning=Building eBPF for target: {} (host arch: {})",
        bpf_target, arch
    );

    let ebpf_dir = PathBuf::from("../httptap-ebpf");

    // Separate target directory for eBPF to avoid file lock conflicts
    let ebpf_target_dir = match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join("cargo-target-ebpf"),
        None => PathBuf::from(env::var("OUT_DIR")?).join("ebpf-target"),
    };

    let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());

    let status = Command::new(cargo)
        .current_dir(&ebpf_dir)
        .env("RUSTUP_TOOLCHAIN", "nightly")
        .env("CARGO_TARGET_DIR", &ebpf_target_dir)
        .env_remove("RUSTC")
        .env_remove("RUSTC_WORKSPACE_WRAPPER")
        .args([
            "build",
            "--release",
            &format!("--target={}", bpf_target),
            "-Z",
            "build-std=core",
        ])
        .stdout(std::process::Stdio::inherit())
        .stderr(std::process::Stdio::inherit())
        .status()
        .context("Failed to execute cargo command")?;

    if !status.success() {
        bail!("cargo build for {} exited with {}", bpf_target, status);
    }

    Ok(ebpf_target_dir.join(format!("{}/release/httptap", bpf_target)))
}

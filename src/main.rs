// adsprobe - Native Rust ADS client for Beckhoff TwinCAT PLCs.
// Copyright 2025 - adsprobe contributors

//! adsprobe entry point.
//!
//! Checks that a TwinCAT controller answers over ADS and exits 0 on success, 1 otherwise.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use adsprobe::{probe, ProbeConfig};

fn banner<W: Write>(out: &mut W) -> io::Result<()> {
    let rule = "=".repeat(60);
    writeln!(out)?;
    writeln!(out, "{}", rule)?;
    writeln!(out, "ADS Connection Test Tool")?;
    writeln!(out, "For TwinCAT 2.11 Server")?;
    writeln!(out, "{}", rule)?;
    writeln!(out)?;
    writeln!(
        out,
        "\u{2713} {} version {} (native ADS client)",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(out)
}

fn main() -> Result<ExitCode> {
    // Logs go to stderr, stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    banner(&mut out)?;

    let config = match ProbeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            writeln!(out, "\u{2717} ERROR: Invalid configuration: {}", e)?;
            return Ok(ExitCode::FAILURE);
        }
    };
    tracing::info!(target_addr = %config.target(), plc_ip = %config.plc_ip, "configuration loaded");

    probe::render_header(&config, &mut out)?;
    out.flush()?;

    let report = probe::run(&config);
    report.render(&mut out)?;

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

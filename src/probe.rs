// adsprobe - Native Rust ADS client for Beckhoff TwinCAT PLCs.
// Copyright 2025 - adsprobe contributors

//! The connection test: open, ask the device who and how it is, close.

use std::io::{self, Write};

use tracing::{info, warn};

use crate::client::{AdsClient, AdsError};
use crate::config::ProbeConfig;
use crate::netid::AmsAddr;
use crate::types::{AdsState, DeviceInfo};

const RULE_WIDTH: usize = 60;

const TROUBLESHOOTING: [&str; 5] = [
    "Verify TwinCAT is running on the target PLC",
    "Check that the ADS Net ID is correct",
    "Ensure the PLC IP address is reachable",
    "Verify the firewall allows ADS communication (TCP 48898)",
    "Check an ADS route for this machine is configured on the PLC",
];

/// Outcome of every step of one probe run.
///
/// Steps after a failed connect are `None`, optional steps are `None` when skipped.
#[derive(Debug)]
pub struct ProbeReport {
    pub connect: Result<f64, AdsError>,
    pub source: Option<AmsAddr>,
    pub device_info: Option<Result<DeviceInfo, AdsError>>,
    pub state: Option<Result<(AdsState, u16), AdsError>>,
    pub symbol: Option<(String, Result<Vec<u8>, AdsError>)>,
    pub closed: bool,
}

impl ProbeReport {
    /// The test passes when the connection could be opened.
    /// Device info and state failures are reported as warnings only.
    pub fn passed(&self) -> bool {
        self.connect.is_ok()
    }

    /// ### Writes the step results and the final verdict
    pub fn render<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let connect_time = match &self.connect {
            Ok(ms) => *ms,
            Err(e) => {
                writeln!(out, "\u{2717} Connection failed: {}", e)?;
                writeln!(out)?;
                writeln!(out, "Troubleshooting:")?;
                for (i, hint) in TROUBLESHOOTING.iter().enumerate() {
                    writeln!(out, "  {}. {}", i + 1, hint)?;
                }
                writeln!(out)?;
                return write_verdict(out, "CONNECTION TEST FAILED!");
            }
        };

        writeln!(out, "\u{2713} Connection opened successfully! ({:.3} ms)", connect_time)?;
        if let Some(source) = self.source {
            writeln!(out, "  Source AMS: {}", source)?;
        }

        match &self.device_info {
            Some(Ok(info)) => writeln!(out, "\u{2713} Device Info: {}", info)?,
            Some(Err(e)) => writeln!(out, "\u{26a0} Could not read device info: {}", e)?,
            None => {}
        }

        match &self.state {
            Some(Ok((ads_state, device_state))) => writeln!(
                out,
                "\u{2713} PLC State: {} / device state {}",
                ads_state, device_state
            )?,
            Some(Err(e)) => writeln!(out, "\u{26a0} Could not read PLC state: {}", e)?,
            None => {}
        }

        match &self.symbol {
            Some((name, Ok(data))) => writeln!(out, "\u{2713} {}: {}", name, hex(data))?,
            Some((name, Err(e))) => writeln!(out, "\u{26a0} Could not read {}: {}", name, e)?,
            None => {}
        }

        if self.closed {
            writeln!(out, "\u{2713} Connection closed successfully!")?;
        }

        writeln!(out)?;
        write_verdict(out, "CONNECTION TEST PASSED!")
    }
}

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn write_verdict<W: Write>(out: &mut W, verdict: &str) -> io::Result<()> {
    writeln!(out, "{}", rule())?;
    writeln!(out, "{}", verdict)?;
    writeln!(out, "{}", rule())
}

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// ### Writes the section title and the connection parameters
///
/// Printed before `run()` so the operator sees what is tried while the
/// connect attempt is still waiting for its timeout.
///
pub fn render_header<W: Write>(config: &ProbeConfig, out: &mut W) -> io::Result<()> {
    writeln!(out, "{}", rule())?;
    writeln!(out, "Testing ADS Connection to TwinCAT 2.11")?;
    writeln!(out, "{}", rule())?;
    writeln!(out)?;
    writeln!(out, "Connection Parameters:")?;
    writeln!(out, "  ADS Net ID: {}", config.net_id)?;
    writeln!(out, "  PLC IP:     {}", config.plc_ip)?;
    writeln!(out, "  ADS Port:   {}", config.ads_port)?;
    writeln!(out)?;
    writeln!(
        out,
        "Attempting to connect (timeout: {} seconds)...",
        config.timeout.as_secs()
    )
}

/// ### Runs the connection test against the configured controller
///
/// Each request waits at most the configured timeout for its answer, unsolicited
/// frames included. Connecting waits up to that long for every address the PLC
/// IP resolves to.
///
pub fn run(config: &ProbeConfig) -> ProbeReport {
    let timeout_ms = config.timeout.as_millis().min(u64::MAX as u128) as u64;

    let mut client = AdsClient::new(config.target());
    client.set_timeout(timeout_ms, timeout_ms, timeout_ms);
    client.set_connection_port(config.tcp_port);
    if let Some(source) = config.source() {
        client.set_source(source);
    }

    if let Err(e) = client.connect(&config.plc_ip) {
        warn!(plc_ip = %config.plc_ip, error = %e, "connection failed");
        return ProbeReport {
            connect: Err(e),
            source: None,
            device_info: None,
            state: None,
            symbol: None,
            closed: false,
        };
    }
    let connect_time = client.last_time;

    let device_info = client.read_device_info();
    if let Err(e) = &device_info {
        warn!(error = %e, "read device info failed");
    }

    let state = client.read_state();
    if let Err(e) = &state {
        warn!(error = %e, "read state failed");
    }

    let symbol = config.symbol.as_ref().map(|name| {
        let mut buffer = vec![0u8; config.symbol_size];
        let value = client.read_by_name(name, &mut buffer).map(|len| {
            buffer.truncate(len);
            buffer
        });
        if let Err(e) = &value {
            warn!(symbol = %name, error = %e, "read by name failed");
        }
        (name.clone(), value)
    });

    let source = client.source();
    client.disconnect();
    info!("probe finished");

    ProbeReport {
        connect: Ok(connect_time),
        source,
        device_info: Some(device_info),
        state: Some(state),
        symbol,
        closed: !client.connected,
    }
}

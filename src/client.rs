// adsprobe - Native Rust ADS client for Beckhoff TwinCAT PLCs.
// Copyright 2025 - adsprobe contributors

use std::io;
use std::io::{Read, Write};
use std::net::Shutdown;
use std::net::{IpAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::index;
use crate::netid::{AmsAddr, AmsNetId};
use crate::types::{AdsState, AdsVersion, DeviceInfo};

// Well-known ports
pub const ADS_TCP_PORT: u16 = 48898; // AMS/TCP
pub const ADS_PORT_SYSTEM: u16 = 10000; // System service
pub const ADS_PORT_TC2_PLC1: u16 = 801; // TwinCAT 2, first PLC runtime
pub const ADS_PORT_TC3_PLC1: u16 = 851; // TwinCAT 3, first PLC runtime
pub const DEFAULT_SOURCE_PORT: u16 = 32905;

// Command IDs
pub const CMD_READ_DEVICE_INFO: u16 = 0x0001;
pub const CMD_READ: u16 = 0x0002;
pub const CMD_WRITE: u16 = 0x0003;
pub const CMD_READ_STATE: u16 = 0x0004;
pub const CMD_WRITE_CONTROL: u16 = 0x0005;
pub const CMD_NOTIFICATION: u16 = 0x0008;
pub const CMD_READ_WRITE: u16 = 0x0009;

// State flags
pub const SF_RESPONSE: u16 = 0x0001;
pub const SF_ADS_COMMAND: u16 = 0x0004; // ADS command over TCP

pub const AMS_TCP_HEADER_LEN: usize = 6;
pub const AMS_HEADER_LEN: usize = 32;
const MAX_FRAME_LEN: usize = 1024 * 1024;

const DEVICE_INFO_RES_LEN: usize = 24; // result + version + 16 byte name
const READ_STATE_RES_LEN: usize = 8; // result + ads state + device state
const READ_RES_LEN: usize = 8; // result + length, data follows
const DEVICE_NAME_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum AdsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Not connected")]
    NotConnected,
    #[error("TCP connection failed: {0}")]
    TcpConnectionFailed(String),
    #[error("TCP connection closed by the peer")]
    ConnectionClosed,
    #[error("Invalid AMS/TCP frame: {0}")]
    InvalidFrame(String),
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("No response within {0} ms")]
    Timeout(u64),
    #[error("ADS error 0x{code:X} ({message})")]
    Ads { code: u32, message: &'static str },
    #[error("Invalid AMS Net ID: {0}")]
    InvalidNetId(String),
}

impl AdsError {
    /// Builds the error for a non-zero ADS return code.
    pub fn from_code(code: u32) -> Self {
        AdsError::Ads { code, message: ads_error_message(code) }
    }
}

/// ### Describes an ADS return code
///
/// Only the codes that show up in practice while setting up a connection
/// are named, everything else is reported as unknown.
///
pub fn ads_error_message(code: u32) -> &'static str {
    match code {
        0x0001 => "Internal error",
        0x0002 => "No real-time",
        0x0003 => "Allocation locked - memory error",
        0x0004 => "Mailbox full",
        0x0005 => "Wrong receive HMSG",
        0x0006 => "Target port not found, ADS server not started",
        0x0007 => "Target machine not found, missing ADS route",
        0x0008 => "Unknown command ID",
        0x0009 => "Invalid task ID",
        0x000A => "No IO",
        0x000B => "Unknown AMS command",
        0x000C => "Win32 error",
        0x000D => "Port not connected",
        0x000E => "Invalid AMS length",
        0x000F => "Invalid AMS Net ID",
        0x0010 => "Installation level too low",
        0x0011 => "No debugging available",
        0x0012 => "Port disabled",
        0x0013 => "Port already connected",
        0x0018 => "Port not registered",
        0x0019 => "Maximum number of ports reached",
        0x001A => "Invalid port",
        0x001B => "TwinCAT router not active",
        0x0700 => "General device error",
        0x0701 => "Service not supported by server",
        0x0702 => "Invalid index group",
        0x0703 => "Invalid index offset",
        0x0704 => "Reading/writing not permitted",
        0x0705 => "Parameter size not correct",
        0x0706 => "Invalid parameter value(s)",
        0x0707 => "Device not in a ready state",
        0x0708 => "Device busy",
        0x0709 => "Invalid operating system context",
        0x070A => "Out of memory",
        0x070B => "Invalid parameter value(s)",
        0x070C => "Not found (files, ...)",
        0x070D => "Syntax error in command or file",
        0x070E => "Objects do not match",
        0x070F => "Object already exists",
        0x0710 => "Symbol not found",
        0x0711 => "Symbol version invalid",
        0x0712 => "Server is in an invalid state",
        0x0713 => "AdsTransMode not supported",
        0x0714 => "Notification handle is invalid",
        0x0715 => "Notification client not registered",
        0x0716 => "No more notification handles",
        0x0719 => "Device has a timeout",
        0x0740 => "General client error",
        0x0741 => "Invalid parameter at service",
        0x0745 => "Timeout elapsed",
        0x0746 => "No answer from ADS device",
        0x0748 => "Port not open",
        0x0749 => "No AMS address",
        0x0750 => "Internal error in ADS sync",
        0x0751 => "Hash table overflow",
        0x0752 => "Key not found in hash",
        0x0753 => "No more symbols in cache",
        _ => "Unknown ADS error",
    }
}

fn le_u16(data: &[u8], at: usize) -> Result<u16, AdsError> {
    data.get(at..at + 2)
        .and_then(|b| b.try_into().ok())
        .map(u16::from_le_bytes)
        .ok_or_else(|| AdsError::UnexpectedResponse(format!("short payload ({} bytes)", data.len())))
}

fn le_u32(data: &[u8], at: usize) -> Result<u32, AdsError> {
    data.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| AdsError::UnexpectedResponse(format!("short payload ({} bytes)", data.len())))
}

/// ### Checks the ADS result field that leads every response payload
fn check_result(data: &[u8]) -> Result<(), AdsError> {
    match le_u32(data, 0)? {
        0 => Ok(()),
        code => Err(AdsError::from_code(code)),
    }
}

/// ### AMS header
///
///  [0..6]    Target Net ID
///  [6..8]    Target port
///  [8..14]   Source Net ID
///  [14..16]  Source port
///  [16..18]  Command ID
///  [18..20]  State flags
///  [20..24]  Data length
///  [24..28]  Error code
///  [28..32]  Invoke ID
///
/// All fields are little endian.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmsHeader {
    pub target: AmsAddr,
    pub source: AmsAddr,
    pub command_id: u16,
    pub state_flags: u16,
    pub data_length: u32,
    pub error_code: u32,
    pub invoke_id: u32,
}

impl AmsHeader {
    /// ### Builds a complete AMS/TCP frame (AMS/TCP header + AMS header + payload)
    pub fn encode_frame(&self, payload: &[u8]) -> Vec<u8> {
        let ams_len = AMS_HEADER_LEN + payload.len();
        let mut frame = Vec::with_capacity(AMS_TCP_HEADER_LEN + ams_len);

        // AMS/TCP header
        frame.extend_from_slice(&0u16.to_le_bytes()); // Reserved
        frame.extend_from_slice(&(ams_len as u32).to_le_bytes());

        // AMS header
        self.target.write_to(&mut frame);
        self.source.write_to(&mut frame);
        frame.extend_from_slice(&self.command_id.to_le_bytes());
        frame.extend_from_slice(&self.state_flags.to_le_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&self.error_code.to_le_bytes());
        frame.extend_from_slice(&self.invoke_id.to_le_bytes());

        frame.extend_from_slice(payload);
        frame
    }

    /// ### Parses the 32 byte AMS header at the start of `data`
    pub fn decode(data: &[u8]) -> Result<AmsHeader, AdsError> {
        if data.len() < AMS_HEADER_LEN {
            return Err(AdsError::InvalidFrame(format!(
                "AMS header too short ({} bytes)",
                data.len()
            )));
        }

        let net_id = |at: usize| {
            let mut id = [0u8; 6];
            id.copy_from_slice(&data[at..at + 6]);
            AmsNetId(id)
        };

        Ok(AmsHeader {
            target: AmsAddr::new(net_id(0), le_u16(data, 6)?),
            source: AmsAddr::new(net_id(8), le_u16(data, 14)?),
            command_id: le_u16(data, 16)?,
            state_flags: le_u16(data, 18)?,
            data_length: le_u32(data, 20)?,
            error_code: le_u32(data, 24)?,
            invoke_id: le_u32(data, 28)?,
        })
    }
}

/// ### Reads one AMS/TCP frame from the stream
///
/// Returns the AMS header and its payload. The AMS/TCP header is checked here,
/// the AMS header contents are checked by the caller that knows what it asked for.
///
pub fn read_frame<R: Read>(stream: &mut R) -> Result<(AmsHeader, Vec<u8>), AdsError> {
    let mut tcp_header = [0u8; AMS_TCP_HEADER_LEN];
    read_exact_or_closed(stream, &mut tcp_header)?;

    let reserved = u16::from_le_bytes([tcp_header[0], tcp_header[1]]);
    if reserved != 0 {
        return Err(AdsError::InvalidFrame(format!(
            "reserved field is 0x{:04X}",
            reserved
        )));
    }

    let length =
        u32::from_le_bytes([tcp_header[2], tcp_header[3], tcp_header[4], tcp_header[5]]) as usize;
    if length < AMS_HEADER_LEN || length > MAX_FRAME_LEN {
        return Err(AdsError::InvalidFrame(format!("length {} out of range", length)));
    }

    let mut body = vec![0u8; length];
    read_exact_or_closed(stream, &mut body)?;

    let header = AmsHeader::decode(&body)?;
    let payload = body.split_off(AMS_HEADER_LEN);

    if header.data_length as usize != payload.len() {
        return Err(AdsError::InvalidFrame(format!(
            "data length {} does not match payload of {} bytes",
            header.data_length,
            payload.len()
        )));
    }

    Ok((header, payload))
}

fn read_exact_or_closed<R: Read>(stream: &mut R, buf: &mut [u8]) -> Result<(), AdsError> {
    stream.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => AdsError::ConnectionClosed,
        _ => AdsError::Io(e),
    })
}

pub struct AdsClient {
    stream: Option<TcpStream>,
    target: AmsAddr,
    source: Option<AmsAddr>,
    source_port: u16,
    tcp_port: u16,
    co_timeout_ms: u64,
    rd_timeout_ms: u64,
    wr_timeout_ms: u64,
    invoke_id: u32,
    /// Client connected
    pub connected: bool,
    /// ### Last Job time (ms).
    ///
    /// If an error occurred the value will be 0
    pub last_time: f64,
}

impl AdsClient {
    /// ### Creates a new `AdsClient` for the given target with default settings.
    ///
    /// The client starts disconnected, use `connect()` to open the connection.
    ///
    /// ### Parameters
    /// - `target`: AMS Net ID and AMS port of the ADS device (e.g. `x.x.x.x.1.1:801`)
    ///
    pub fn new(target: AmsAddr) -> Self {
        AdsClient {
            stream: None,
            target,
            source: None,
            source_port: DEFAULT_SOURCE_PORT,
            tcp_port: ADS_TCP_PORT,
            co_timeout_ms: 3000,
            rd_timeout_ms: 5000,
            wr_timeout_ms: 1000,
            invoke_id: 0,
            connected: false,
            last_time: 0.0,
        }
    }

    /// ### Sets operations timeout
    ///
    /// ### Parameters
    /// - `co_timeout_ms` : TCP Connection timeout (ms) (Default = 3000 ms)
    /// - `rd_timeout_ms` : Read timeout (ms) (Default = 5000 ms)
    /// - `wr_timeout_ms` : Write timeout (ms) (Default = 1000 ms)
    ///
    /// ### Notes
    /// 1. Values must be > 0, otherwise they are ignored
    /// 2. The client must not be connected (that is, call this method before connecting).
    ///
    pub fn set_timeout(&mut self, co_timeout_ms: u64, rd_timeout_ms: u64, wr_timeout_ms: u64) {
        if co_timeout_ms > 0 {
            self.co_timeout_ms = co_timeout_ms;
        }
        if rd_timeout_ms > 0 {
            self.rd_timeout_ms = rd_timeout_ms;
        }
        if wr_timeout_ms > 0 {
            self.wr_timeout_ms = wr_timeout_ms;
        }
    }

    /// ### Sets the AMS/TCP Port
    ///
    /// The default is 48898, change it only if the target sits behind NAT.
    /// Value must be > 0, otherwise it is ignored.
    ///
    pub fn set_connection_port(&mut self, port: u16) {
        if port > 0 {
            self.tcp_port = port;
        }
    }

    /// ### Sets the source AMS address
    ///
    /// The target only answers if it has a route for this Net ID.
    /// If never called, the source is `<local ip>.1.1:32905`, derived at connect time.
    ///
    pub fn set_source(&mut self, source: AmsAddr) {
        self.source = Some(source);
        self.source_port = source.port;
    }

    pub fn target(&self) -> AmsAddr {
        self.target
    }

    /// Source address in use, known after `connect()` if not set explicitly.
    pub fn source(&self) -> Option<AmsAddr> {
        self.source
    }

    /// ### Connects to the ADS device
    ///
    /// ### Parameters
    /// - `ip` : IP address or host name of the target.
    ///
    /// ### Notes
    /// Only the TCP connection is opened here. ADS has no session handshake,
    /// a missing route shows up on the first request (usually as a closed
    /// connection or error 0x7).
    ///
    /// Every address `ip` resolves to is tried in turn, each bounded by the
    /// connection timeout.
    ///
    /// ### Errors
    /// - `AdsError::TcpConnectionFailed`: the name could not be resolved, or no
    ///   resolved address accepted the connection (the last reason is kept).
    /// - `AdsError::InvalidNetId`: no source was set and the local address is not IPv4.
    /// - `AdsError::Io`: failure setting up the socket after it connected.
    ///
    pub fn connect(&mut self, ip: &str) -> Result<(), AdsError> {
        self.disconnect();
        self.last_time = 0.0;
        let start_time = Instant::now();

        let co_timeout = Duration::from_millis(self.co_timeout_ms);
        let rd_timeout = Duration::from_millis(self.rd_timeout_ms);
        let wr_timeout = Duration::from_millis(self.wr_timeout_ms);

        let addrs = (ip, self.tcp_port)
            .to_socket_addrs()
            .map_err(|e| AdsError::TcpConnectionFailed(format!("cannot resolve {}: {}", ip, e)))?;

        let mut last_failure = format!("{} resolves to no address", ip);
        let mut connected = None;
        for addr in addrs {
            info!(%addr, ams_target = %self.target, "connecting to ADS device");
            match TcpStream::connect_timeout(&addr, co_timeout) {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(e) => {
                    warn!(%addr, error = %e, "TCP connect failed");
                    last_failure = format!("{}: {}", addr, e);
                }
            }
        }
        let stream = connected.ok_or(AdsError::TcpConnectionFailed(last_failure))?;

        stream.set_read_timeout(Some(rd_timeout))?;
        stream.set_write_timeout(Some(wr_timeout))?;
        stream.set_nodelay(true)?;

        if self.source.is_none() {
            let local_ip = match stream.local_addr()?.ip() {
                IpAddr::V4(v4) => v4,
                IpAddr::V6(v6) => v6.to_ipv4_mapped().ok_or_else(|| {
                    AdsError::InvalidNetId(format!("cannot derive a Net ID from {}", v6))
                })?,
            };
            self.source = Some(AmsAddr::new(AmsNetId::from_ip(local_ip), self.source_port));
        }

        self.stream = Some(stream);
        self.connected = true;
        self.job_done(start_time);

        info!(source = ?self.source.map(|s| s.to_string()), "connected");
        Ok(())
    }

    /// ### Closes the connection.
    ///
    /// Safe to call even if the client is not currently connected.
    /// After disconnection, requests return `AdsError::NotConnected`.
    ///
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            info!(ams_target = %self.target, "disconnected");
        }
        self.connected = false;
    }

    fn next_invoke_id(&mut self) -> u32 {
        self.invoke_id = self.invoke_id.wrapping_add(1);
        if self.invoke_id == 0 {
            self.invoke_id = 1;
        }
        self.invoke_id
    }

    /// ### Sends one request and waits for its response
    ///
    /// Frames carrying a different invoke ID (device notifications, late
    /// answers to a timed out request) are skipped. The whole exchange,
    /// skipped frames included, is bounded by the read timeout.
    ///
    /// Returns the response payload with the header already validated, and
    /// the job start time. `last_time` is left at 0, the caller sets it once
    /// the payload has been checked too.
    ///
    /// #### Suggestion
    /// In case of a low-level error, disconnect and reconnect the client, the
    /// stream may hold the remains of a partial frame.
    ///
    fn transact(&mut self, command_id: u16, payload: &[u8]) -> Result<(Vec<u8>, Instant), AdsError> {
        self.last_time = 0.0;

        if !self.connected {
            return Err(AdsError::NotConnected);
        }
        let source = self.source.ok_or(AdsError::NotConnected)?;
        let invoke_id = self.next_invoke_id();
        let start_time = Instant::now();

        let request = AmsHeader {
            target: self.target,
            source,
            command_id,
            state_flags: SF_ADS_COMMAND,
            data_length: payload.len() as u32,
            error_code: 0,
            invoke_id,
        };
        let frame = request.encode_frame(payload);

        let timeout_ms = self.rd_timeout_ms;
        let deadline = Duration::from_millis(timeout_ms);
        let stream = self.stream.as_mut().ok_or(AdsError::NotConnected)?;
        debug!(command_id, invoke_id, len = frame.len(), "sending request");
        stream.write_all(&frame)?;

        loop {
            let remaining = deadline.saturating_sub(start_time.elapsed());
            if remaining.is_zero() {
                return Err(AdsError::Timeout(timeout_ms));
            }
            stream.set_read_timeout(Some(remaining))?;

            let (header, data) = match read_frame(stream) {
                Err(AdsError::Io(e))
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    return Err(AdsError::Timeout(timeout_ms));
                }
                other => other?,
            };

            if header.invoke_id != invoke_id || header.command_id == CMD_NOTIFICATION {
                warn!(
                    command_id = header.command_id,
                    invoke_id = header.invoke_id,
                    "skipping unsolicited frame"
                );
                continue;
            }

            if header.state_flags & SF_RESPONSE == 0 {
                return Err(AdsError::UnexpectedResponse(format!(
                    "state flags 0x{:04X} is not a response",
                    header.state_flags
                )));
            }

            if header.command_id != command_id {
                return Err(AdsError::UnexpectedResponse(format!(
                    "command 0x{:04X} answered with 0x{:04X}",
                    command_id, header.command_id
                )));
            }

            if header.error_code != 0 {
                return Err(AdsError::from_code(header.error_code));
            }

            debug!(command_id, invoke_id, len = data.len(), "received response");
            return Ok((data, start_time));
        }
    }

    /// ### Reads name and version of the ADS device
    ///
    /// ### Errors
    /// - `AdsError::NotConnected`, `AdsError::Io`, `AdsError::ConnectionClosed`: low level.
    /// - `AdsError::Ads`: the device answered with an error code.
    ///
    pub fn read_device_info(&mut self) -> Result<DeviceInfo, AdsError> {
        let (data, start_time) = self.transact(CMD_READ_DEVICE_INFO, &[])?;
        let info = parse_device_info(&data)?;
        self.job_done(start_time);
        Ok(info)
    }

    /// ### Reads the ADS state and the device state
    ///
    /// ### Returns
    /// `Ok((<AdsState>, <device state>))` or `Err(<AdsError>)`
    ///
    pub fn read_state(&mut self) -> Result<(AdsState, u16), AdsError> {
        let (data, start_time) = self.transact(CMD_READ_STATE, &[])?;
        let state = parse_state(&data)?;
        self.job_done(start_time);
        Ok(state)
    }

    /// ### Reads a block of data from an index group/offset.
    ///
    /// ### Parameters
    /// - `index_group`: Index group (see `index` module).
    /// - `index_offset`: Offset inside the group.
    /// - `buffer`: Destination buffer, its length is the requested size.
    ///
    /// ### Returns
    /// `Ok(<bytes read>)`, which may be less than the buffer length.
    ///
    pub fn read(&mut self, index_group: u32, index_offset: u32, buffer: &mut [u8]) -> Result<usize, AdsError> {
        let mut request = Vec::with_capacity(12);
        request.extend_from_slice(&index_group.to_le_bytes());
        request.extend_from_slice(&index_offset.to_le_bytes());
        request.extend_from_slice(&(buffer.len() as u32).to_le_bytes());

        let (data, start_time) = self.transact(CMD_READ, &request)?;
        let len = copy_read_payload(&data, buffer)?;
        self.job_done(start_time);
        Ok(len)
    }

    /// ### Writes a block of data to an index group/offset.
    pub fn write(&mut self, index_group: u32, index_offset: u32, buffer: &[u8]) -> Result<(), AdsError> {
        let mut request = Vec::with_capacity(12 + buffer.len());
        request.extend_from_slice(&index_group.to_le_bytes());
        request.extend_from_slice(&index_offset.to_le_bytes());
        request.extend_from_slice(&(buffer.len() as u32).to_le_bytes());
        request.extend_from_slice(buffer);

        let (data, start_time) = self.transact(CMD_WRITE, &request)?;
        check_result(&data)?;
        self.job_done(start_time);
        Ok(())
    }

    /// ### Writes `write_data` and reads the answer into `read_buffer` in one request.
    ///
    /// ### Returns
    /// `Ok(<bytes read>)`
    ///
    pub fn write_read(
        &mut self,
        index_group: u32,
        index_offset: u32,
        write_data: &[u8],
        read_buffer: &mut [u8],
    ) -> Result<usize, AdsError> {
        let mut request = Vec::with_capacity(16 + write_data.len());
        request.extend_from_slice(&index_group.to_le_bytes());
        request.extend_from_slice(&index_offset.to_le_bytes());
        request.extend_from_slice(&(read_buffer.len() as u32).to_le_bytes());
        request.extend_from_slice(&(write_data.len() as u32).to_le_bytes());
        request.extend_from_slice(write_data);

        let (data, start_time) = self.transact(CMD_READ_WRITE, &request)?;
        let len = copy_read_payload(&data, read_buffer)?;
        self.job_done(start_time);
        Ok(len)
    }

    /// ### Changes the ADS state and device state of the target
    ///
    /// E.g. `write_control(AdsState::Stop, 0, &[])` stops the PLC runtime.
    ///
    pub fn write_control(&mut self, ads_state: AdsState, device_state: u16, data: &[u8]) -> Result<(), AdsError> {
        let mut request = Vec::with_capacity(8 + data.len());
        request.extend_from_slice(&ads_state.as_u16().to_le_bytes());
        request.extend_from_slice(&device_state.to_le_bytes());
        request.extend_from_slice(&(data.len() as u32).to_le_bytes());
        request.extend_from_slice(data);

        let (response, start_time) = self.transact(CMD_WRITE_CONTROL, &request)?;
        check_result(&response)?;
        self.job_done(start_time);
        Ok(())
    }

    /// ### Reads a PLC variable by its symbol name (e.g. `MAIN.counter`)
    ///
    /// Acquires a handle, reads through it and releases it again, even when
    /// the read fails.
    ///
    /// ### Returns
    /// `Ok(<bytes read>)`
    ///
    pub fn read_by_name(&mut self, name: &str, buffer: &mut [u8]) -> Result<usize, AdsError> {
        let start_time = Instant::now();

        match self.read_symbol(name, buffer) {
            Ok(len) => {
                self.job_done(start_time);
                Ok(len)
            }
            Err(e) => {
                self.last_time = 0.0;
                Err(e)
            }
        }
    }

    fn read_symbol(&mut self, name: &str, buffer: &mut [u8]) -> Result<usize, AdsError> {
        let mut symbol = name.as_bytes().to_vec();
        symbol.push(0);

        let mut raw_handle = [0u8; 4];
        let len = self.write_read(index::GET_SYMHANDLE_BYNAME, 0, &symbol, &mut raw_handle)?;
        if len != raw_handle.len() {
            return Err(AdsError::UnexpectedResponse(format!("symbol handle of {} bytes", len)));
        }
        let handle = u32::from_le_bytes(raw_handle);
        debug!(name, handle, "acquired symbol handle");

        let read = self.read(index::RW_SYMVAL_BYHANDLE, handle, buffer);
        let release = self.write(index::RELEASE_SYMHANDLE, 0, &raw_handle);

        let len = read?;
        if let Err(e) = release {
            warn!(name, handle, error = %e, "failed to release symbol handle");
            return Err(e);
        }

        Ok(len)
    }

    fn job_done(&mut self, start_time: Instant) {
        self.last_time = start_time.elapsed().as_secs_f64() * 1000.0;
    }
}

fn parse_device_info(data: &[u8]) -> Result<DeviceInfo, AdsError> {
    check_result(data)?;

    if data.len() < DEVICE_INFO_RES_LEN {
        return Err(AdsError::UnexpectedResponse(format!(
            "device info of {} bytes",
            data.len()
        )));
    }

    let raw_name = &data[8..8 + DEVICE_NAME_LEN];
    let name_end = raw_name.iter().position(|&b| b == 0).unwrap_or(DEVICE_NAME_LEN);
    let name = String::from_utf8_lossy(&raw_name[..name_end]).trim().to_string();

    Ok(DeviceInfo {
        name,
        version: AdsVersion {
            major: data[4],
            minor: data[5],
            build: le_u16(data, 6)?,
        },
    })
}

fn parse_state(data: &[u8]) -> Result<(AdsState, u16), AdsError> {
    check_result(data)?;

    if data.len() < READ_STATE_RES_LEN {
        return Err(AdsError::UnexpectedResponse(format!(
            "state of {} bytes",
            data.len()
        )));
    }

    Ok((AdsState::from_u16(le_u16(data, 4)?), le_u16(data, 6)?))
}

/// Copies the `result + length + data` payload of a read into `buffer`.
fn copy_read_payload(data: &[u8], buffer: &mut [u8]) -> Result<usize, AdsError> {
    check_result(data)?;

    let length = le_u32(data, 4)? as usize;
    let payload = data
        .get(READ_RES_LEN..READ_RES_LEN + length)
        .ok_or_else(|| {
            AdsError::UnexpectedResponse(format!(
                "declared {} bytes, got {}",
                length,
                data.len() - READ_RES_LEN
            ))
        })?;

    if payload.len() > buffer.len() {
        return Err(AdsError::UnexpectedResponse(format!(
            "{} bytes returned for a {} byte buffer",
            payload.len(),
            buffer.len()
        )));
    }

    buffer[..payload.len()].copy_from_slice(payload);
    Ok(payload.len())
}

impl Drop for AdsClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

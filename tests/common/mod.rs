//! In-process fake ADS device for the integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use adsprobe::client::{
    read_frame, CMD_NOTIFICATION, CMD_READ, CMD_READ_DEVICE_INFO, CMD_READ_STATE, CMD_READ_WRITE,
    CMD_WRITE, CMD_WRITE_CONTROL, SF_ADS_COMMAND, SF_RESPONSE,
};
use adsprobe::index;
use adsprobe::AmsHeader;

pub const DEVICE_NAME: &str = "Plc30 App";
pub const SYMBOL_NAME: &str = "MAIN.counter";
pub const SYMBOL_HANDLE: u32 = 0x1234;
pub const SYMBOL_VALUE: [u8; 4] = [0x2A, 0x00, 0x00, 0x00];
/// Resolves to a handle, but reading through it fails.
pub const BROKEN_SYMBOL_NAME: &str = "MAIN.broken";
pub const BROKEN_HANDLE: u32 = 0x99;

/// How the fake misbehaves.
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Send a device notification before every answer.
    pub notify_first: bool,
    /// Answer read state with this AMS header error code.
    pub state_header_error: Option<u32>,
    /// Drop the connection when read state arrives.
    pub close_on_state: bool,
    /// Answer without the response bit in the state flags.
    pub not_a_response: bool,
    /// Answer read state as if it were read device info.
    pub wrong_command: bool,
    /// Never answer, keep sending notifications instead.
    pub flood_notifications: bool,
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub released: Vec<u32>,
    pub control: Vec<(u16, u16)>,
    pub commands: Vec<u16>,
}

pub struct FakeDevice {
    pub port: u16,
    pub recorded: Arc<Mutex<Recorded>>,
    handle: JoinHandle<()>,
}

impl FakeDevice {
    pub fn start() -> FakeDevice {
        FakeDevice::with_behavior(Behavior::default())
    }

    /// Serves exactly one connection, until the client hangs up.
    pub fn with_behavior(behavior: Behavior) -> FakeDevice {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let recorded = Arc::new(Mutex::new(Recorded::default()));

        let shared = Arc::clone(&recorded);
        let handle = thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                serve(stream, &behavior, &shared);
            }
        });

        FakeDevice { port, recorded, handle }
    }

    pub fn join(self) -> Recorded {
        self.handle.join().unwrap();
        Arc::try_unwrap(self.recorded).unwrap().into_inner().unwrap()
    }
}

fn le_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(data[at..at + 4].try_into().unwrap())
}

fn le_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(data[at..at + 2].try_into().unwrap())
}

fn result_with_data(result: u32, data: &[u8]) -> Vec<u8> {
    let mut payload = result.to_le_bytes().to_vec();
    payload.extend_from_slice(&(data.len() as u32).to_le_bytes());
    payload.extend_from_slice(data);
    payload
}

fn serve(mut stream: TcpStream, behavior: &Behavior, recorded: &Mutex<Recorded>) {
    let mut memory = vec![0u8; 256];

    while let Ok((request, data)) = read_frame(&mut stream) {
        recorded.lock().unwrap().commands.push(request.command_id);

        if behavior.flood_notifications {
            flood(&mut stream, &request);
            return;
        }

        let mut error_code = 0;
        let payload = match request.command_id {
            CMD_READ_DEVICE_INFO => {
                let mut payload = vec![0, 0, 0, 0, 2, 11];
                payload.extend_from_slice(&2300u16.to_le_bytes());
                let mut name = [0u8; 16];
                name[..DEVICE_NAME.len()].copy_from_slice(DEVICE_NAME.as_bytes());
                payload.extend_from_slice(&name);
                payload
            }
            CMD_READ_STATE => {
                if behavior.close_on_state {
                    return;
                }
                if let Some(code) = behavior.state_header_error {
                    error_code = code;
                    Vec::new()
                } else {
                    let mut payload = vec![0, 0, 0, 0];
                    payload.extend_from_slice(&5u16.to_le_bytes());
                    payload.extend_from_slice(&0u16.to_le_bytes());
                    payload
                }
            }
            CMD_READ => {
                let (group, offset, len) = (le_u32(&data, 0), le_u32(&data, 4) as usize, le_u32(&data, 8) as usize);
                match group {
                    index::RW_SYMVAL_BYHANDLE if offset as u32 == SYMBOL_HANDLE => {
                        result_with_data(0, &SYMBOL_VALUE[..len.min(SYMBOL_VALUE.len())])
                    }
                    index::PLC_RW_M if offset + len <= memory.len() => {
                        result_with_data(0, &memory[offset..offset + len])
                    }
                    index::PLC_RW_M => result_with_data(0x703, &[]),
                    _ => result_with_data(0x702, &[]),
                }
            }
            CMD_WRITE => {
                let (group, offset, len) = (le_u32(&data, 0), le_u32(&data, 4) as usize, le_u32(&data, 8) as usize);
                let value = &data[12..12 + len];
                let result: u32 = match group {
                    index::RELEASE_SYMHANDLE => {
                        recorded.lock().unwrap().released.push(le_u32(value, 0));
                        0
                    }
                    index::PLC_RW_M if offset + len <= memory.len() => {
                        memory[offset..offset + len].copy_from_slice(value);
                        0
                    }
                    index::PLC_RW_M => 0x703,
                    _ => 0x702,
                };
                result.to_le_bytes().to_vec()
            }
            CMD_READ_WRITE => {
                let group = le_u32(&data, 0);
                let write_len = le_u32(&data, 12) as usize;
                let written = &data[16..16 + write_len];
                let name = written.strip_suffix(&[0u8]).unwrap_or(written);
                match (group, name) {
                    (index::GET_SYMHANDLE_BYNAME, n) if n == SYMBOL_NAME.as_bytes() => {
                        result_with_data(0, &SYMBOL_HANDLE.to_le_bytes())
                    }
                    (index::GET_SYMHANDLE_BYNAME, n) if n == BROKEN_SYMBOL_NAME.as_bytes() => {
                        result_with_data(0, &BROKEN_HANDLE.to_le_bytes())
                    }
                    _ => result_with_data(0x710, &[]),
                }
            }
            CMD_WRITE_CONTROL => {
                recorded
                    .lock()
                    .unwrap()
                    .control
                    .push((le_u16(&data, 0), le_u16(&data, 2)));
                0u32.to_le_bytes().to_vec()
            }
            _ => 0x701u32.to_le_bytes().to_vec(),
        };

        if behavior.notify_first {
            let notification = AmsHeader {
                target: request.source,
                source: request.target,
                command_id: CMD_NOTIFICATION,
                state_flags: SF_ADS_COMMAND,
                data_length: 4,
                error_code: 0,
                invoke_id: 0,
            };
            let _ = stream.write_all(&notification.encode_frame(&[0, 0, 0, 0]));
        }

        let command_id = if behavior.wrong_command && request.command_id == CMD_READ_STATE {
            CMD_READ_DEVICE_INFO
        } else {
            request.command_id
        };
        let state_flags = if behavior.not_a_response {
            SF_ADS_COMMAND
        } else {
            SF_ADS_COMMAND | SF_RESPONSE
        };

        let response = AmsHeader {
            target: request.source,
            source: request.target,
            command_id,
            state_flags,
            data_length: payload.len() as u32,
            error_code,
            invoke_id: request.invoke_id,
        };
        if stream.write_all(&response.encode_frame(&payload)).is_err() {
            return;
        }
    }
}

/// Sends notifications until the client goes away (or for about ten seconds).
fn flood(stream: &mut TcpStream, request: &AmsHeader) {
    let notification = AmsHeader {
        target: request.source,
        source: request.target,
        command_id: CMD_NOTIFICATION,
        state_flags: SF_ADS_COMMAND,
        data_length: 4,
        error_code: 0,
        invoke_id: 0,
    };
    let frame = notification.encode_frame(&[0, 0, 0, 0]);

    for _ in 0..500 {
        if stream.write_all(&frame).is_err() {
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

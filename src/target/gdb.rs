//! GDB Remote Serial Protocol client
//!
//! Drives a simulator's GDB stub, e.g. `simulavr --gdbserver --port 1212`.
//! Only the packets the oracle needs are spoken: `?`, `g`, `G`, `m`, `M`,
//! `c`, `C`, `s`, `D` and optionally `QStartNoAckMode`.

use super::{DriverError, IoFailure, RemoteTarget, StopReason};
use crate::avr::RegisterState;
use crate::config::TargetConfig;
use log::{debug, info, warn};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// Maximum reply payload accepted, to bound memory use
pub const MAX_PACKET_SIZE: usize = 4096;

/// Bytes moved per `m`/`M` packet. Small enough for stubs with a
/// 400-character packet buffer.
pub const MAX_TRANSFER: usize = 64;

/// Attempts before giving up on a packet the peer keeps NAKing
pub const MAX_RETRIES: u32 = 3;

/// Modulo-256 sum of the payload bytes
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// `$<payload>#<checksum>`
pub fn frame(payload: &str) -> String {
    format!("${}#{:02x}", payload, checksum(payload.as_bytes()))
}

pub fn encode_hex(data: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(data.len() * 2);
    for b in data {
        write!(out, "{:02x}", b).unwrap();
    }
    out
}

pub fn decode_hex(text: &str) -> Result<Vec<u8>, IoFailure> {
    if text.len() % 2 != 0 {
        return Err(IoFailure::Malformed(format!("odd-length hex '{}'", text)));
    }
    if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(IoFailure::Malformed(format!("bad hex '{}'", text)));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .map_err(|_| IoFailure::Malformed(format!("bad hex '{}'", text)))
        })
        .collect()
}

/// Expand run-length encoding: `X*n` repeats `X` another `n - 29` times.
pub fn expand_rle(text: &str) -> Result<String, IoFailure> {
    if !text.contains('*') {
        return Ok(text.to_string());
    }

    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() * 2);
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'*' {
            let prev = out.chars().last();
            let count = bytes.get(i + 1).copied();
            match (prev, count) {
                (Some(c), Some(n)) if n >= 29 => {
                    for _ in 0..(n - 29) {
                        out.push(c);
                    }
                    i += 2;
                }
                _ => return Err(IoFailure::Malformed(format!("bad run length in '{}'", text))),
            }
        } else {
            out.push(bytes[i] as char);
            i += 1;
        }
    }
    Ok(out)
}

/// Decode `Sxx`, `Txx...`, `Wxx` and `Xxx` stop replies.
pub fn parse_stop_reply(reply: &str) -> Result<StopReason, IoFailure> {
    if is_error_reply(reply) {
        return Err(IoFailure::ErrorReply(reply.to_string()));
    }

    let code = reply
        .get(1..3)
        .and_then(|h| u8::from_str_radix(h, 16).ok())
        .ok_or_else(|| IoFailure::Malformed(format!("stop reply '{}'", reply)))?;

    match reply.as_bytes()[0] {
        b'S' | b'T' => Ok(StopReason::Signal(code)),
        b'W' => Ok(StopReason::Exited(code)),
        b'X' => Ok(StopReason::Terminated(code)),
        _ => Err(IoFailure::Malformed(format!("stop reply '{}'", reply))),
    }
}

/// `Exx`. Data replies are always an even number of hex digits, so a
/// three-character reply starting with `E` is unambiguous.
fn is_error_reply(reply: &str) -> bool {
    reply.len() == 3
        && reply.starts_with('E')
        && reply[1..].bytes().all(|b| b.is_ascii_hexdigit())
}

fn expect_ok(reply: String) -> Result<(), IoFailure> {
    match reply.as_str() {
        "OK" => Ok(()),
        "" => Err(IoFailure::Malformed("command not supported by stub".to_string())),
        r if is_error_reply(r) => Err(IoFailure::ErrorReply(reply)),
        _ => Err(IoFailure::Malformed(format!("expected OK, got '{}'", reply))),
    }
}

fn check_data(reply: String) -> Result<String, IoFailure> {
    if is_error_reply(&reply) {
        Err(IoFailure::ErrorReply(reply))
    } else {
        Ok(reply)
    }
}

enum Ack {
    Ok,
    Nak,
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn read_byte(&mut self) -> Result<u8, IoFailure> {
        let mut buf = [0u8; 1];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => Ok(buf[0]),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(IoFailure::Closed),
            Err(e) => Err(e.into()),
        }
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), IoFailure> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Wait for `+`/`-`. A reply that starts without an acknowledgement
    /// counts as acknowledged and is left in the buffer.
    fn read_ack(&mut self) -> Result<Ack, IoFailure> {
        loop {
            let next = {
                let buf = self.reader.fill_buf()?;
                if buf.is_empty() {
                    return Err(IoFailure::Closed);
                }
                buf[0]
            };
            match next {
                b'$' => return Ok(Ack::Ok),
                b'+' => {
                    self.reader.consume(1);
                    return Ok(Ack::Ok);
                }
                b'-' => {
                    self.reader.consume(1);
                    return Ok(Ack::Nak);
                }
                _ => self.reader.consume(1),
            }
        }
    }
}

/// A session with a remote GDB stub.
///
/// The connection is released by `close()` or, on any other exit path, by
/// `Drop`. After a failed exchange the session is poisoned: the stream may
/// be out of sync, so `Drop` only shuts the socket down.
pub struct GdbRemote {
    conn: Option<Connection>,
    peer: String,
    no_ack_mode: bool,
    poisoned: bool,
}

impl GdbRemote {
    pub fn connect(config: &TargetConfig) -> Result<Self, DriverError> {
        let addr = format!("{}:{}", config.host, config.port);
        let connection_error = |source| DriverError::Connection {
            addr: addr.clone(),
            source,
        };

        let stream = TcpStream::connect(&addr).map_err(connection_error)?;
        stream
            .set_read_timeout(config.io_timeout_ms.map(Duration::from_millis))
            .map_err(connection_error)?;
        stream.set_nodelay(true).ok();
        let writer = stream.try_clone().map_err(connection_error)?;

        let mut remote = Self {
            conn: Some(Connection {
                reader: BufReader::new(stream),
                writer,
            }),
            peer: addr.clone(),
            no_ack_mode: false,
            poisoned: false,
        };
        remote
            .handshake(config.no_ack)
            .map_err(DriverError::io("handshaking"))?;

        info!("connected to target at {}", addr);
        Ok(remote)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn no_ack_mode(&self) -> bool {
        self.no_ack_mode
    }

    fn handshake(&mut self, negotiate_no_ack: bool) -> Result<(), IoFailure> {
        if negotiate_no_ack {
            let reply = self.transact("QStartNoAckMode")?;
            if reply == "OK" {
                self.no_ack_mode = true;
            } else {
                debug!("stub declined no-ack mode");
            }
        }
        let reply = self.transact("?")?;
        let reason = parse_stop_reply(&reply)?;
        debug!("initial stop: {}", reason);
        Ok(())
    }

    /// Send a command and return the expanded reply payload.
    fn transact(&mut self, payload: &str) -> Result<String, IoFailure> {
        let result = self.exchange(payload);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn exchange(&mut self, payload: &str) -> Result<String, IoFailure> {
        let no_ack = self.no_ack_mode;
        let conn = self.conn.as_mut().ok_or(IoFailure::NotConnected)?;
        let packet = frame(payload);

        debug!("-> {}", payload);
        let mut delivered = false;
        for attempt in 1..=MAX_RETRIES {
            conn.write_raw(packet.as_bytes())?;
            if no_ack {
                delivered = true;
                break;
            }
            match conn.read_ack()? {
                Ack::Ok => {
                    delivered = true;
                    break;
                }
                Ack::Nak => warn!("target NAKed '{}' (attempt {})", payload, attempt),
            }
        }
        if !delivered {
            return Err(IoFailure::Rejected(MAX_RETRIES));
        }

        let reply = Self::receive_packet(conn, no_ack)?;
        debug!("<- {}", reply);
        expand_rle(&reply)
    }

    fn receive_packet(conn: &mut Connection, no_ack: bool) -> Result<String, IoFailure> {
        for _ in 0..MAX_RETRIES {
            // Look for packet start, skipping stray acknowledgements
            while conn.read_byte()? != b'$' {}

            let mut data = Vec::new();
            loop {
                let b = conn.read_byte()?;
                if b == b'#' {
                    break;
                }
                if data.len() >= MAX_PACKET_SIZE {
                    return Err(IoFailure::Oversized(MAX_PACKET_SIZE));
                }
                data.push(b);
            }

            let received = [conn.read_byte()?, conn.read_byte()?];
            let received = std::str::from_utf8(&received)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| IoFailure::Malformed("checksum digits".to_string()))?;

            if received == checksum(&data) {
                if !no_ack {
                    conn.write_raw(b"+")?;
                }
                return String::from_utf8(data)
                    .map_err(|_| IoFailure::Malformed("non-UTF-8 payload".to_string()));
            }

            warn!("reply checksum mismatch, requesting retransmission");
            if no_ack {
                return Err(IoFailure::Malformed("checksum mismatch".to_string()));
            }
            conn.write_raw(b"-")?;
        }
        Err(IoFailure::Malformed(format!(
            "reply failed checksum {} times",
            MAX_RETRIES
        )))
    }

    fn stop_command(&mut self, payload: &str) -> Result<StopReason, IoFailure> {
        let reply = self.transact(payload)?;
        parse_stop_reply(&reply)
    }
}

impl RemoteTarget for GdbRemote {
    fn read_memory(&mut self, addr: u32, len: usize) -> Result<Vec<u8>, IoFailure> {
        let mut out = Vec::with_capacity(len);
        let mut offset = 0;
        while offset < len {
            let n = MAX_TRANSFER.min(len - offset);
            let at = addr.wrapping_add(offset as u32);
            let reply = check_data(self.transact(&format!("m{:x},{:x}", at, n))?)?;
            let chunk = decode_hex(&reply)?;
            if chunk.len() != n {
                return Err(IoFailure::Malformed(format!(
                    "read of {} bytes at {:#x} returned {}",
                    n,
                    at,
                    chunk.len()
                )));
            }
            out.extend_from_slice(&chunk);
            offset += n;
        }
        Ok(out)
    }

    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<(), IoFailure> {
        for (i, chunk) in data.chunks(MAX_TRANSFER).enumerate() {
            let at = addr.wrapping_add((i * MAX_TRANSFER) as u32);
            let cmd = format!("M{:x},{:x}:{}", at, chunk.len(), encode_hex(chunk));
            expect_ok(self.transact(&cmd)?)?;
        }
        Ok(())
    }

    fn read_registers(&mut self) -> Result<RegisterState, IoFailure> {
        let reply = check_data(self.transact("g")?)?;
        Ok(RegisterState::from_wire_hex(&reply)?)
    }

    fn write_registers(&mut self, state: &RegisterState) -> Result<(), IoFailure> {
        expect_ok(self.transact(&format!("G{}", state.to_wire_hex()))?)
    }

    fn resume(&mut self, signal: Option<u8>) -> Result<StopReason, IoFailure> {
        match signal {
            Some(sig) => self.stop_command(&format!("C{:02x}", sig)),
            None => self.stop_command("c"),
        }
    }

    fn step(&mut self) -> Result<StopReason, IoFailure> {
        self.stop_command("s")
    }

    fn close(&mut self) -> Result<(), IoFailure> {
        if self.conn.is_none() {
            return Ok(());
        }

        let detached = if self.poisoned {
            Ok(())
        } else {
            // Any reply will do; some stubs answer `D` with an empty packet.
            self.transact("D").map(|_| ())
        };

        if let Some(conn) = self.conn.take() {
            conn.writer.shutdown(Shutdown::Both).ok();
        }
        info!("disconnected from {}", self.peer);
        detached
    }
}

impl Drop for GdbRemote {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if !self.poisoned {
                // Best effort: never wait for the reply here.
                conn.write_raw(frame("D").as_bytes()).ok();
            }
            conn.writer.shutdown(Shutdown::Both).ok();
            debug!("released connection to {}", self.peer);
        }
    }
}

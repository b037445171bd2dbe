// Dynamips Control: Driving the Dynamips Hypervisor
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Hypervisor Protocol
//!
//! The hypervisor speaks a line based protocol over TCP. Every command is a single line, and every
//! reply consists of one or more lines, each starting with a three digit code:
//!
//! - `100-OK`, or generally `1xx-<text>`: the last line of a successful reply.
//! - `101 <text>`: an intermediate data line.
//! - `2xx-<text>`: the last line of a failed reply.
//!
//! [`ProtocolClient::send`] writes the command and collects the reply, stripping the codes. A
//! trailing `OK` is dropped, and intermediate `100 ` lines (status echoes) are ignored.

use crate::{Error, Result};

use lazy_static::lazy_static;
use log::*;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};

use std::sync::Arc;
use std::time::Duration;

/// How many times an empty read is retried before giving up
const MAX_EMPTY_READS: usize = 10;
/// Time to wait between two empty reads
const EMPTY_READ_DELAY: Duration = Duration::from_millis(100);
/// Size of the chunks read from the socket
const CHUNK_SIZE: usize = 1024;

lazy_static! {
    static ref ERROR_LINE: Regex = Regex::new(r"^2[0-9]{2}-").unwrap();
    static ref FINAL_LINE: Regex = Regex::new(r"^1[0-9]{2}-").unwrap();
    static ref DATA_LINE: Regex = Regex::new(r"^1[0-9]{2}\s").unwrap();
}

/// # Protocol Client
///
/// Connection to a single hypervisor. Commands are serialized: only one command is in flight at
/// any time. Every exchange runs inside its own task, which means that an exchange is never torn
/// apart if the caller stops waiting for the reply.
#[derive(Debug)]
pub struct ProtocolClient {
    host: String,
    port: u16,
    stream: Arc<Mutex<Option<TcpStream>>>,
}

impl ProtocolClient {
    /// Create a new, not yet connected client
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, stream: Arc::new(Mutex::new(None)) }
    }

    /// Host of the hypervisor
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port of the hypervisor
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns true if the client holds an open connection
    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    /// Connect to the hypervisor, retrying until `max_wait` has elapsed. A wildcard host is
    /// replaced by the matching loopback address.
    pub async fn connect(&self, max_wait: Duration) -> Result<()> {
        let host = match self.host.as_str() {
            "0.0.0.0" => "127.0.0.1",
            "::" => "::1",
            host => host,
        };
        let begin = Instant::now();
        let mut last_error = String::from("timeout");
        loop {
            if begin.elapsed() >= max_wait {
                return Err(Error::Connect {
                    host: self.host.clone(),
                    port: self.port,
                    reason: last_error,
                });
            }
            sleep(Duration::from_millis(10)).await;
            match timeout(Duration::from_secs(1), TcpStream::connect((host, self.port))).await {
                Ok(Ok(stream)) => {
                    *self.stream.lock().await = Some(stream);
                    debug!("Connected to the hypervisor on {}:{}", host, self.port);
                    return Ok(());
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = String::from("connection timed out"),
            }
        }
    }

    /// Send a command, and return the lines of the reply.
    pub async fn send(&self, command: impl AsRef<str>) -> Result<Vec<String>> {
        let command = command.as_ref().trim().to_string();
        let stream = Arc::clone(&self.stream);
        let host = self.host.clone();
        let port = self.port;
        let task = tokio::spawn(async move {
            let mut guard = stream.lock().await;
            let stream = guard.as_mut().ok_or(Error::NotConnected)?;
            debug!("sending {}:{}: {}", host, port, command);
            let reply = exchange(stream, &command, &host, port).await;
            if let Ok(lines) = reply.as_ref() {
                trace!("reply from {}:{}: {:?}", host, port, lines);
            }
            reply
        });
        task.await?
    }

    /// Close the connection. Closing a closed connection does nothing.
    pub async fn close(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Error while closing the connection to {}:{}: {}", self.host, self.port, e);
            }
        }
    }
}

/// Write a single command and read the complete reply.
pub async fn exchange<S>(stream: &mut S, command: &str, host: &str, port: u16) -> Result<Vec<String>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let communication_error = |e: std::io::Error| Error::Communication {
        host: host.to_string(),
        port,
        reason: e.to_string(),
    };
    stream.write_all(format!("{}\n", command).as_bytes()).await.map_err(communication_error)?;
    stream.flush().await.map_err(communication_error)?;
    read_reply(stream, command, host, port).await
}

/// Read a complete reply from the reader. The reply is complete once the buffer ends in a newline
/// and its last line carries a final code (`1xx-` or `2xx-`).
pub async fn read_reply<R>(reader: &mut R, command: &str, host: &str, port: u16) -> Result<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut empty_reads = 0;
    loop {
        let n = reader.read(&mut chunk).await.map_err(|e| Error::Communication {
            host: host.to_string(),
            port,
            reason: e.to_string(),
        })?;
        if n == 0 {
            empty_reads += 1;
            if empty_reads > MAX_EMPTY_READS {
                return Err(if buffer.is_empty() {
                    Error::NoData { host: host.to_string(), port }
                } else {
                    Error::Communication {
                        host: host.to_string(),
                        port,
                        reason: format!(
                            "incomplete reply: {:?}",
                            String::from_utf8_lossy(&buffer)
                        ),
                    }
                });
            }
            sleep(EMPTY_READ_DELAY).await;
            continue;
        }
        empty_reads = 0;
        buffer.extend_from_slice(&chunk[..n]);

        if !buffer.ends_with(b"\n") {
            continue;
        }

        if let Some(reply) = parse_reply(&String::from_utf8_lossy(&buffer)) {
            return reply.map_err(|message| Error::Protocol { command: command.to_string(), message });
        }
    }
}

/// Parse a buffer ending in a newline. Returns `None` if the last line does not carry a final
/// code, `Some(Err(message))` on an error code, and the stripped lines otherwise.
fn parse_reply(buffer: &str) -> Option<std::result::Result<Vec<String>, String>> {
    let lines: Vec<&str> = buffer.lines().collect();
    let (last, data) = lines.split_last()?;

    if ERROR_LINE.is_match(last) {
        return Some(Err(last[4..].to_string()));
    }
    if !FINAL_LINE.is_match(last) {
        return None;
    }

    let mut result: Vec<String> = data
        .iter()
        .filter(|line| !line.starts_with("100 "))
        .map(|line| if DATA_LINE.is_match(line) { line[4..].to_string() } else { line.to_string() })
        .collect();
    let remainder = &last[4..];
    if remainder != "OK" {
        result.push(remainder.to_string());
    }
    Some(Ok(result))
}

#[cfg(test)]
mod test {
    use super::*;

    async fn read(data: &str) -> Result<Vec<String>> {
        let mut reader = data.as_bytes();
        read_reply(&mut reader, "test command", "localhost", 7200).await
    }

    #[tokio::test]
    async fn ok_reply() {
        assert_eq!(read("100-OK\r\n").await.unwrap(), Vec::<String>::new());
        assert_eq!(read("100-0.2.17-amd64/Linux\r\n").await.unwrap(), vec!["0.2.17-amd64/Linux"]);
    }

    #[tokio::test]
    async fn status_echo_dropped() {
        assert_eq!(read("100 router created\r\n100-OK\r\n").await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn data_lines() {
        let reply = read("101 0x60606f54 [25]\r\n101 0x60606f74 [33]\r\n100-OK\r\n").await.unwrap();
        assert_eq!(reply, vec!["0x60606f54 [25]", "0x60606f74 [33]"]);
    }

    #[tokio::test]
    async fn error_reply() {
        match read("100 partial\r\n206-unable to create VM\r\n").await {
            Err(Error::Protocol { command, message }) => {
                assert_eq!(command, "test command");
                assert_eq!(message, "unable to create VM");
            }
            r => panic!("unexpected result: {:?}", r),
        }
    }

    #[tokio::test]
    async fn reply_split_over_chunks() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            server.write_all(b"101 first").await.unwrap();
            sleep(Duration::from_millis(20)).await;
            server.write_all(b" line\r\n100-").await.unwrap();
            sleep(Duration::from_millis(20)).await;
            server.write_all(b"OK\r\n").await.unwrap();
            server
        });
        let reply = read_reply(&mut client, "cmd", "localhost", 0).await.unwrap();
        assert_eq!(reply, vec!["first line"]);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn no_data() {
        assert!(matches!(read("").await, Err(Error::NoData { .. })));
        assert!(matches!(read("100-O").await, Err(Error::Communication { .. })));
    }

    #[tokio::test]
    async fn abandoned_command_keeps_the_stream_in_sync() {
        use tokio::io::{AsyncBufReadExt, BufReader};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line == "slow" {
                    write.write_all(b"101 first\r\n").await.unwrap();
                    sleep(Duration::from_millis(200)).await;
                    write.write_all(b"100-OK\r\n").await.unwrap();
                } else {
                    write.write_all(format!("100-{}\r\n", line).as_bytes()).await.unwrap();
                }
            }
        });

        let client = ProtocolClient::new("127.0.0.1", port);
        client.connect(Duration::from_secs(2)).await.unwrap();
        // the caller gives up while the reply is only half read
        assert!(timeout(Duration::from_millis(50), client.send("slow")).await.is_err());
        assert_eq!(client.send("fast").await.unwrap(), vec!["fast"]);
        client.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn not_connected() {
        let client = ProtocolClient::new("127.0.0.1", 1);
        assert!(matches!(client.send("hypervisor version").await, Err(Error::NotConnected)));
    }
}

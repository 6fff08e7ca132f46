// Belvedere Control Channel
// Line-oriented control requests over a local Unix socket

use std::fs;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use strum_macros::{Display, EnumString};

/// Default control socket location
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/belvedere.sock";

/// Longest request accepted from a client
const MAX_REQUEST_LEN: usize = 256;

/// Clients that have sent nothing by then are dropped
const CLIENT_TIMEOUT: Duration = Duration::from_secs(1);

/// How long the client waits for a reply
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Control channel errors
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("failed to bind control socket {}: {source}", .path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to control socket {}: {source}", .path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("control socket I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed control response: {0:?}")]
    MalformedResponse(String),
}

/// Requests understood by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ControlCommand {
    Status,
    Reload,
}

/// Reply to a control request, sent as `<OK|ERROR>\n<message>\n`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    pub ok: bool,
    pub message: String,
}

impl ControlResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }

    pub fn encode(&self) -> String {
        let status = if self.ok { "OK" } else { "ERROR" };
        format!("{}\n{}\n", status, self.message)
    }

    pub fn decode(text: &str) -> Result<Self, IpcError> {
        let mut lines = text.lines();
        let ok = match lines.next() {
            Some("OK") => true,
            Some("ERROR") => false,
            _ => return Err(IpcError::MalformedResponse(text.to_string())),
        };
        let message = lines.next().unwrap_or_default().to_string();
        Ok(Self { ok, message })
    }
}

/// Parse a request line, answering malformed requests directly
pub fn parse_request(request: &str) -> Result<ControlCommand, ControlResponse> {
    let request = request.trim();
    if request.is_empty() {
        return Err(ControlResponse::error("No command provided"));
    }
    request
        .parse()
        .map_err(|_| ControlResponse::error(format!("Unknown command: {}", request)))
}

#[derive(Debug)]
struct PendingClient {
    stream: UnixStream,
    buf: Vec<u8>,
    accepted: Instant,
}

enum ClientState {
    Waiting,
    Complete,
    Failed,
}

impl PendingClient {
    /// Read whatever is available without blocking
    ///
    /// A request ends at a newline, at EOF, or with the data that has
    /// arrived once the socket would block.
    fn fill(&mut self) -> ClientState {
        let mut chunk = [0u8; MAX_REQUEST_LEN];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return ClientState::Complete,
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    if self.buf.contains(&b'\n') || self.buf.len() >= MAX_REQUEST_LEN {
                        return ClientState::Complete;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if self.buf.is_empty() {
                        return ClientState::Waiting;
                    }
                    return ClientState::Complete;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("Control client read failed: {}", e);
                    return ClientState::Failed;
                }
            }
        }
    }

    fn request(&self) -> String {
        let end = self
            .buf
            .iter()
            .position(|&b| b == b'\n')
            .unwrap_or(self.buf.len())
            .min(MAX_REQUEST_LEN);
        String::from_utf8_lossy(&self.buf[..end]).into_owned()
    }

    fn reply(mut self, response: &ControlResponse) {
        if let Err(e) = self.stream.set_nonblocking(false) {
            log::debug!("Control client setup failed: {}", e);
            return;
        }
        if let Err(e) = self.stream.write_all(response.encode().as_bytes()) {
            log::debug!("Control reply failed: {}", e);
        }
    }
}

/// Non-blocking control socket server, polled from the event loop
#[derive(Debug)]
pub struct ControlServer {
    path: PathBuf,
    listener: UnixListener,
    clients: Vec<PendingClient>,
}

impl ControlServer {
    /// Bind the socket, replacing a stale socket file at `path`
    pub fn bind(path: impl Into<PathBuf>) -> Result<Self, IpcError> {
        let path = path.into();
        if fs::symlink_metadata(&path).is_ok() {
            log::debug!("Removing stale control socket {}", path.display());
            let _ = fs::remove_file(&path);
        }

        let bind_error = |source| IpcError::Bind {
            path: path.clone(),
            source,
        };
        let listener = UnixListener::bind(&path).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;

        log::info!("Control socket listening on {}", path.display());
        Ok(Self {
            path,
            listener,
            clients: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept new clients and answer every complete request
    ///
    /// Returns the number of requests answered.
    pub fn poll<F>(&mut self, mut handler: F) -> usize
    where
        F: FnMut(ControlCommand) -> ControlResponse,
    {
        self.accept_pending();

        let mut answered = 0;
        let now = Instant::now();
        for mut client in std::mem::take(&mut self.clients) {
            match client.fill() {
                ClientState::Complete => {
                    let request = client.request();
                    log::debug!("Control request: {:?}", request.trim());
                    let response = match parse_request(&request) {
                        Ok(command) => handler(command),
                        Err(response) => response,
                    };
                    client.reply(&response);
                    answered += 1;
                }
                ClientState::Waiting if now.duration_since(client.accepted) < CLIENT_TIMEOUT => {
                    self.clients.push(client);
                }
                ClientState::Waiting => log::debug!("Dropping idle control client"),
                ClientState::Failed => {}
            }
        }
        answered
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        log::debug!("Control client setup failed: {}", e);
                        continue;
                    }
                    self.clients.push(PendingClient {
                        stream,
                        buf: Vec::new(),
                        accepted: Instant::now(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("Control socket accept failed: {}", e);
                    break;
                }
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Send one request to a running daemon and wait for its reply
pub fn send_command(path: &Path, command: &str) -> Result<ControlResponse, IpcError> {
    let mut stream = UnixStream::connect(path).map_err(|source| IpcError::Connect {
        path: path.to_path_buf(),
        source,
    })?;
    stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
    stream.write_all(command.as_bytes())?;
    stream.shutdown(Shutdown::Write)?;

    let mut reply = String::new();
    stream.read_to_string(&mut reply)?;
    ControlResponse::decode(&reply)
}

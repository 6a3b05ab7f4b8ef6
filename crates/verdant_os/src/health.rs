#![forbid(unsafe_code)]

//! Startup health probe for the remote database. Runs once before the
//! adapter starts serving; the whole probe is budgeted at about four
//! seconds so a dead database cannot stall boot.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use verdant_contracts::config::DbConfig;

pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

/// Which store backs the process for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primary {
    Remote,
    EmbeddedLocal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    TcpFailed { detail: String },
    HandshakeFailed { detail: String },
}

impl ProbeOutcome {
    pub fn primary(&self) -> Primary {
        match self {
            ProbeOutcome::Reachable => Primary::Remote,
            _ => Primary::EmbeddedLocal,
        }
    }
}

// Postgres SSLRequest: message length 8, magic 80877103. The server
// answers a single byte, 'S' when TLS is available.
const SSL_REQUEST: [u8; 8] = [0, 0, 0, 8, 0x04, 0xd2, 0x16, 0x2f];

fn ssl_handshake(stream: &mut TcpStream) -> Result<(), String> {
    stream
        .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
        .map_err(|e| e.to_string())?;
    stream
        .set_write_timeout(Some(HANDSHAKE_TIMEOUT))
        .map_err(|e| e.to_string())?;
    stream.write_all(&SSL_REQUEST).map_err(|e| e.to_string())?;
    let mut answer = [0u8; 1];
    stream.read_exact(&mut answer).map_err(|e| e.to_string())?;
    if answer[0] == b'S' {
        Ok(())
    } else {
        Err("server refused TLS; sslmode=require cannot be satisfied".to_string())
    }
}

/// TCP connect with a 1s cap, then the TLS availability handshake
/// with a 3s cap. Any failure selects the embedded-local store.
pub fn probe(config: &DbConfig) -> ProbeOutcome {
    let target = format!("{}:{}", config.host, config.port);
    let addr = match target.to_socket_addrs().map(|mut a| a.next()) {
        Ok(Some(addr)) => addr,
        Ok(None) => {
            return ProbeOutcome::TcpFailed {
                detail: format!("{target}: no addresses resolved"),
            }
        }
        Err(e) => {
            return ProbeOutcome::TcpFailed {
                detail: e.to_string(),
            }
        }
    };
    let mut stream = match TcpStream::connect_timeout(&addr, TCP_CONNECT_TIMEOUT) {
        Ok(stream) => stream,
        Err(e) => {
            return ProbeOutcome::TcpFailed {
                detail: e.to_string(),
            }
        }
    };
    match ssl_handshake(&mut stream) {
        Ok(()) => ProbeOutcome::Reachable,
        Err(detail) => ProbeOutcome::HandshakeFailed { detail },
    }
}

/// Store selection at boot. `use_embedded_db` skips the probe
/// entirely; a missing database config means there is nothing to
/// probe.
pub fn select_primary(config: Option<&DbConfig>, use_embedded_db: bool) -> Primary {
    if use_embedded_db {
        tracing::warn!("USE_EMBEDDED_DB set; skipping remote probe");
        return Primary::EmbeddedLocal;
    }
    let Some(db) = config else {
        tracing::warn!("no remote database configured; running embedded-local");
        return Primary::EmbeddedLocal;
    };
    let outcome = probe(db);
    match &outcome {
        ProbeOutcome::Reachable => {
            tracing::info!(host = %db.host, "remote database reachable");
        }
        ProbeOutcome::TcpFailed { detail } => {
            tracing::warn!(host = %db.host, %detail, "remote database unreachable; running embedded-local");
        }
        ProbeOutcome::HandshakeFailed { detail } => {
            tracing::warn!(host = %db.host, %detail, "remote handshake failed; running embedded-local");
        }
    }
    outcome.primary()
}

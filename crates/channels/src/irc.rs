//! IRC transport — the live connection to the relay.
//!
//! Frames the TCP byte stream into lines, answers `PING` without surfacing it,
//! strips formatting control characters the relay sprinkles into game text,
//! and identifies with NickServ before handing the connection to the worker.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use shadowbot_config::IrcConfig;
use shadowbot_core::error::TransportError;
use shadowbot_core::transport::Transport;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info, warn};

/// How long to wait for NickServ to confirm the identify.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(60);

/// One framed unit of the incoming stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framed {
    /// A keepalive probe; the payload goes back in the `PONG`.
    Ping(String),
    /// A complete, sanitized data line.
    Line(String),
}

/// Coalesces partial reads into complete lines.
///
/// Buffers raw bytes so a multibyte character split across two reads is
/// decoded only once its line is complete.
#[derive(Debug, Default)]
pub struct LineFramer {
    remainder: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of received bytes; returns every line it completed.
    ///
    /// A trailing fragment without a newline is held back until the next
    /// chunk completes it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Framed> {
        self.remainder.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.remainder.iter().position(|b| matches!(b, b'\n' | b'\r')) {
            let raw: Vec<u8> = self.remainder.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..pos]);
            if line.is_empty() {
                continue;
            }
            if let Some(payload) = line.strip_prefix("PING") {
                out.push(Framed::Ping(payload.to_string()));
                continue;
            }
            let clean = sanitize(&line);
            if !clean.is_empty() {
                out.push(Framed::Line(clean));
            }
        }

        out
    }

    /// Bytes of an incomplete line currently held back.
    pub fn pending(&self) -> usize {
        self.remainder.len()
    }
}

/// Split framed units into data lines and `PONG` replies, keeping order
/// within each.
fn route(framed: Vec<Framed>) -> (Vec<String>, Vec<String>) {
    let mut lines = Vec::new();
    let mut pongs = Vec::new();
    for unit in framed {
        match unit {
            Framed::Ping(payload) => pongs.push(format!("PONG{payload}")),
            Framed::Line(line) => lines.push(line),
        }
    }
    (lines, pongs)
}

/// Remove IRC formatting codes and normalize the odd characters the relay
/// emits so the game text can be matched with plain substrings.
pub fn sanitize(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            // bold, reset, reverse, italics, underline
            '\u{02}' | '\u{0f}' | '\u{16}' | '\u{1d}' | '\u{1f}' => {}
            // colour: \x03[fg[,bg]]
            '\u{03}' => {
                for _ in 0..2 {
                    if chars.peek().is_some_and(|d| d.is_ascii_digit()) {
                        chars.next();
                    }
                }
                let mut lookahead = chars.clone();
                if lookahead.next() == Some(',')
                    && lookahead.peek().is_some_and(|d| d.is_ascii_digit())
                {
                    chars.next();
                    for _ in 0..2 {
                        if chars.peek().is_some_and(|d| d.is_ascii_digit()) {
                            chars.next();
                        }
                    }
                }
            }
            '\t' => push_space(&mut out),
            ' ' => push_space(&mut out),
            '\u{b0}' => out.push('*'),
            '\u{b4}' => out.push('\''),
            '\u{a5}' => out.push('$'),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    out.trim_end().to_string()
}

fn push_space(out: &mut String) {
    if !out.ends_with(' ') {
        out.push(' ');
    }
}

/// A connected, identified IRC session.
pub struct IrcTransport {
    nick: String,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    framer: LineFramer,
    ready: VecDeque<String>,
    send_delay: Duration,
    echo_incoming: bool,
}

impl IrcTransport {
    /// Connect, register, identify with NickServ and join the configured
    /// channels.
    pub async fn connect(config: &IrcConfig) -> Result<Self, TransportError> {
        info!(server = %config.server, port = config.port, "Connecting to IRC");
        let stream = TcpStream::connect((config.server.as_str(), config.port))
            .await
            .map_err(|e| {
                TransportError::NotConnected(format!("{}:{}: {e}", config.server, config.port))
            })?;
        let (reader, writer) = stream.into_split();

        let mut transport = Self {
            nick: config.nick.clone(),
            reader,
            writer,
            framer: LineFramer::new(),
            ready: VecDeque::new(),
            send_delay: Duration::from_millis(config.send_delay_ms),
            echo_incoming: config.echo_incoming,
        };

        let nick = config.nick.as_str();
        transport
            .send(&format!("USER {nick} {nick} {nick} :ShadowBot"))
            .await?;
        transport.send(&format!("NICK {nick}")).await?;

        match &config.password {
            Some(password) => {
                // Written directly so the password never reaches the log
                transport
                    .write_raw(&format!("NICKSERV IDENTIFY {nick} {password}"))
                    .await?;
                transport.await_identify(&config.identify_marker).await?;
            }
            None => warn!("No NickServ password configured; skipping identify"),
        }

        for channel in &config.channels {
            transport.join(channel).await?;
        }

        Ok(transport)
    }

    async fn await_identify(&mut self, marker: &str) -> Result<(), TransportError> {
        info!(nick = %self.nick, "Waiting for identify");
        let deadline = tokio::time::Instant::now() + IDENTIFY_TIMEOUT;
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(TransportError::IdentifyFailed {
                    nick: self.nick.clone(),
                    reason: format!("no '{marker}' notice within {}s", IDENTIFY_TIMEOUT.as_secs()),
                });
            }
            if let Some(line) = self.receive(deadline - now).await? {
                if line.contains(marker) {
                    info!(nick = %self.nick, "Identified");
                    return Ok(());
                }
            }
        }
    }

    async fn write_raw(&mut self, line: &str) -> Result<(), TransportError> {
        let mut bytes = Vec::with_capacity(line.len() + 2);
        bytes.extend_from_slice(line.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        self.writer
            .write_all(&bytes)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Read once from the socket and frame whatever arrived.
    async fn fill(&mut self) -> Result<(), TransportError> {
        let mut buf = [0u8; 2048];
        let n = self
            .reader
            .read(&mut buf)
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
        if n == 0 {
            return Err(TransportError::ConnectionLost("server closed the connection".into()));
        }

        // Lines are queued before any write so a cancelled PONG loses nothing.
        let (lines, pongs) = route(self.framer.push(&buf[..n]));
        for line in lines {
            if self.echo_incoming {
                debug!(line = %line, "IRC <-");
            }
            self.ready.push_back(line);
        }
        for pong in pongs {
            debug!("PING -> PONG");
            self.write_raw(&pong).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for IrcTransport {
    fn name(&self) -> &str {
        "irc"
    }

    fn nick(&self) -> &str {
        &self.nick
    }

    async fn send(&mut self, line: &str) -> Result<(), TransportError> {
        if line.is_empty() {
            return Ok(());
        }
        info!(line = %line, "IRC ->");
        self.write_raw(line).await
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Option<String>, TransportError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }
            match tokio::time::timeout_at(deadline, self.fill()).await {
                Ok(result) => result?,
                Err(_) => return Ok(None),
            }
        }
    }

    async fn privmsg(&mut self, target: &str, text: &str) -> Result<(), TransportError> {
        if text.is_empty() {
            return Ok(());
        }
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        self.send(&format!("PRIVMSG {target} :{text}")).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.send("QUIT :ShadowBot signing off").await?;
        self.writer
            .shutdown()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn framer_holds_partial_lines() {
        let mut f = LineFramer::new();
        assert!(f.push(b":Lamb3!x@y PRIVMSG bot :You arr").is_empty());
        assert!(f.pending() > 0);
        let lines = f.push(b"ive at Redmond.\r\n");
        assert_eq!(
            lines,
            vec![Framed::Line(":Lamb3!x@y PRIVMSG bot :You arrive at Redmond.".into())]
        );
        assert_eq!(f.pending(), 0);
    }

    #[test]
    fn framer_separates_pings() {
        let mut f = LineFramer::new();
        let lines = f.push(b"PING :irc.libera.chat\r\nhello\n\n");
        assert_eq!(
            lines,
            vec![
                Framed::Ping(" :irc.libera.chat".into()),
                Framed::Line("hello".into())
            ]
        );
    }

    #[test]
    fn incomplete_ping_is_not_answered_early() {
        let mut f = LineFramer::new();
        assert!(f.push(b"PI").is_empty());
        assert_eq!(f.push(b"NG :x\n"), vec![Framed::Ping(" :x".into())]);
    }

    #[test]
    fn framer_joins_characters_split_across_reads() {
        let mut f = LineFramer::new();
        assert!(f.push(b":Lamb3!l@h PRIVMSG bot :You received 30\xC2").is_empty());
        assert_eq!(
            f.push(b"\xA5.\r\n"),
            vec![Framed::Line(":Lamb3!l@h PRIVMSG bot :You received 30$.".into())]
        );
    }

    #[test]
    fn invalid_bytes_are_replaced_per_line() {
        let mut f = LineFramer::new();
        assert_eq!(
            f.push(b"bad \xFF byte\r\nnext\r\n"),
            vec![
                Framed::Line("bad \u{fffd} byte".into()),
                Framed::Line("next".into())
            ]
        );
    }

    #[test]
    fn lines_are_routed_ahead_of_pongs() {
        let mut f = LineFramer::new();
        let (lines, pongs) = route(f.push(b"one\r\nPING :k\r\ntwo\r\n"));
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(pongs, vec!["PONG :k"]);
    }

    #[test]
    fn sanitize_strips_formatting() {
        assert_eq!(sanitize("\u{02}You\u{02}  meet\ta bum"), "You meet a bum");
        assert_eq!(sanitize("\u{03}04,01red\u{03} text"), "red text");
        assert_eq!(sanitize("Loot: 30\u{a5}"), "Loot: 30$");
        assert_eq!(sanitize("it\u{b4}s 20\u{b0}"), "it's 20*");
    }

    #[tokio::test]
    async fn connect_identifies_and_answers_ping() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            let (r, mut w) = sock.into_split();
            let mut lines = tokio::io::BufReader::new(r).lines();
            let mut seen = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                let identify = line.starts_with("NICKSERV IDENTIFY");
                seen.push(line);
                if identify {
                    w.write_all(b":NickServ NOTICE bot :Last login from: x\r\n")
                        .await
                        .unwrap();
                    w.write_all(b"PING :keepalive\r\n:Lamb3!l@h PRIVMSG bot :hi\r\n")
                        .await
                        .unwrap();
                }
                if seen.last().is_some_and(|l| l.starts_with("PONG")) {
                    break;
                }
            }
            seen
        });

        let config = IrcConfig {
            server: "127.0.0.1".into(),
            port,
            nick: "bot".into(),
            password: Some("secret".into()),
            send_delay_ms: 0,
            ..IrcConfig::default()
        };
        let mut t = IrcTransport::connect(&config).await.unwrap();
        let line = t.receive(Duration::from_secs(5)).await.unwrap();
        assert_eq!(line.as_deref(), Some(":Lamb3!l@h PRIVMSG bot :hi"));

        let seen = server.await.unwrap();
        assert_eq!(seen[0], "USER bot bot bot :ShadowBot");
        assert_eq!(seen[1], "NICK bot");
        assert!(seen.iter().any(|l| l == "PONG :keepalive"));
    }
}

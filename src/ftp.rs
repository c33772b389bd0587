//! Passive-mode FTP retrieval of a single file.

use std::io;
use std::net::SocketAddr;

use percent_encoding::percent_decode_str;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;
use url::Url;

const DEFAULT_PORT: u16 = 21;
const ANONYMOUS_USER: &str = "anonymous";
const ANONYMOUS_PASSWORD: &str = "anonymous@";

/// Downloads the file named by an `ftp://` URL in binary mode.
///
/// Logs in anonymously unless the URL carries credentials. The data
/// connection goes to the port announced by `PASV` on the control
/// connection's peer address.
pub(crate) async fn retrieve(url: &Url) -> io::Result<Vec<u8>> {
    let host = url
        .host_str()
        .ok_or_else(|| protocol_error("URL has no host"))?;
    let port = url.port().unwrap_or(DEFAULT_PORT);
    let path = remote_path(url)?;

    let stream = TcpStream::connect((host, port)).await?;
    let peer = stream.peer_addr()?;
    let mut control = Control::new(stream);

    control.expect(&[220]).await?;
    login(&mut control, url).await?;
    control.command("TYPE I", &[200]).await?;

    let passive = control.command("PASV", &[227]).await?;
    let data_port = parse_passive_port(&passive.text)?;
    let mut data = TcpStream::connect(SocketAddr::new(peer.ip(), data_port)).await?;

    control.command(&format!("RETR {path}"), &[125, 150]).await?;
    let mut material = Vec::new();
    data.read_to_end(&mut material).await?;
    drop(data);
    control.expect(&[226, 250]).await?;

    if let Err(err) = control.command("QUIT", &[221]).await {
        debug!(error = %err, "ftp server did not acknowledge QUIT");
    }

    debug!(%host, %path, bytes = material.len(), "ftp transfer complete");
    Ok(material)
}

async fn login(control: &mut Control, url: &Url) -> io::Result<()> {
    let user = match url.username() {
        "" => ANONYMOUS_USER.to_string(),
        name => decode(name)?,
    };
    let password = match url.password() {
        Some(password) => decode(password)?,
        None => ANONYMOUS_PASSWORD.to_string(),
    };

    let reply = control.command(&format!("USER {user}"), &[230, 331]).await?;
    if reply.code == 331 {
        control
            .command(&format!("PASS {password}"), &[202, 230])
            .await?;
    }
    Ok(())
}

/// The URL path relative to the login directory, percent-decoded.
fn remote_path(url: &Url) -> io::Result<String> {
    let path = decode(url.path().trim_start_matches('/'))?;
    if path.is_empty() {
        return Err(protocol_error("URL names no file"));
    }
    Ok(path)
}

fn decode(value: &str) -> io::Result<String> {
    let decoded = percent_decode_str(value)
        .decode_utf8()
        .map_err(|err| protocol_error(err.to_string()))?;
    if decoded.contains(['\r', '\n']) {
        return Err(protocol_error("line break in URL component"));
    }
    Ok(decoded.into_owned())
}

/// Reads the data port from a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply.
fn parse_passive_port(text: &str) -> io::Result<u16> {
    let invalid = || protocol_error(format!("malformed passive reply: {text}"));

    let numbers = text
        .split(|c: char| !(c.is_ascii_digit() || c == ','))
        .find(|part| part.matches(',').count() == 5)
        .ok_or_else(invalid)?;
    let octets: Vec<u8> = numbers
        .split(',')
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;

    Ok((u16::from(octets[4]) << 8) | u16::from(octets[5]))
}

fn protocol_error(reason: impl Into<String>) -> io::Error {
    io::Error::other(reason.into())
}

struct Reply {
    code: u16,
    text: String,
}

struct Control {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Control {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn command(&mut self, command: &str, expected: &[u16]) -> io::Result<Reply> {
        let verb = command.split(' ').next().unwrap_or_default();
        debug!(verb, "sending ftp command");
        self.writer
            .write_all(format!("{command}\r\n").as_bytes())
            .await?;
        self.expect(expected).await
    }

    async fn expect(&mut self, expected: &[u16]) -> io::Result<Reply> {
        let reply = self.reply().await?;
        if expected.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(protocol_error(format!(
                "unexpected reply {} {}",
                reply.code, reply.text
            )))
        }
    }

    /// Reads one reply, skipping the continuation lines of a multi-line reply.
    async fn reply(&mut self) -> io::Result<Reply> {
        let first = self.line().await?;
        let code: u16 = first
            .get(..3)
            .and_then(|code| code.parse().ok())
            .ok_or_else(|| protocol_error(format!("malformed reply: {first}")))?;
        let text = first.get(4..).unwrap_or_default().to_string();

        if first.as_bytes().get(3) == Some(&b'-') {
            let last = format!("{code} ");
            loop {
                let line = self.line().await?;
                if line.starts_with(&last) || line == code.to_string() {
                    break;
                }
            }
        }

        Ok(Reply { code, text })
    }

    async fn line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by ftp server",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

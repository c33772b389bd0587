use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::keyring::ToolRunner;

/// An invocation recorded by [`FakeRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    List,
    Add { path: PathBuf, material: String },
    Delete(String),
    Listed(String),
    Receive {
        server: String,
        id: String,
        options: Option<String>,
    },
    Probe,
    Show(PathBuf),
}

/// Scripted stand-in for the external tools.
#[derive(Default)]
pub(crate) struct FakeRunner {
    pub listing: String,
    /// Listing returned for any key file; `None` makes the tool unavailable.
    pub material_listing: Option<String>,
    /// When set, showing a key file fails with this stderr.
    pub show_stderr: Option<String>,
    /// Answers to successive existence checks; `None` is a failed check.
    /// Once drained every check answers "not listed".
    pub listed_answers: Mutex<VecDeque<Option<bool>>>,
    pub fail_add: bool,
    pub fail_receive: bool,
    pub fail_delete: bool,
    pub calls: Mutex<Vec<Call>>,
}

impl FakeRunner {
    pub fn with_listing(listing: &str) -> Self {
        Self {
            listing: listing.to_string(),
            ..Self::default()
        }
    }

    pub fn with_material(mut self, listing: &str) -> Self {
        self.material_listing = Some(listing.to_string());
        self
    }

    pub fn with_listed_answers(self, answers: impl IntoIterator<Item = Option<bool>>) -> Self {
        *self.listed_answers.lock().unwrap() = answers.into_iter().collect();
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that modify the trust store or inspect key material.
    pub fn side_effects(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::List))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(tool: &str) -> Error {
        Error::Tool {
            tool: tool.to_string(),
            status: 2,
            stderr: "scripted failure".to_string(),
        }
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn list_keys(&self) -> Result<Vec<u8>> {
        self.record(Call::List);
        Ok(self.listing.clone().into_bytes())
    }

    async fn add_key_file(&self, path: &Path) -> Result<()> {
        let material = std::fs::read_to_string(path)?;
        self.record(Call::Add {
            path: path.to_path_buf(),
            material,
        });
        if self.fail_add {
            return Err(Self::failure("apt-key"));
        }
        Ok(())
    }

    async fn delete_key(&self, short: &str) -> Result<()> {
        self.record(Call::Delete(short.to_string()));
        if self.fail_delete {
            return Err(Self::failure("apt-key"));
        }
        Ok(())
    }

    async fn key_listed(&self, short: &str) -> Result<bool> {
        self.record(Call::Listed(short.to_string()));
        match self.listed_answers.lock().unwrap().pop_front() {
            Some(Some(listed)) => Ok(listed),
            Some(None) => Err(Self::failure("apt-key")),
            None => Ok(false),
        }
    }

    async fn receive_key(&self, server: &str, id: &str, options: Option<&str>) -> Result<()> {
        self.record(Call::Receive {
            server: server.to_string(),
            id: id.to_string(),
            options: options.map(str::to_string),
        });
        if self.fail_receive {
            return Err(Self::failure("apt-key"));
        }
        Ok(())
    }

    async fn fingerprint_tool_available(&self) -> bool {
        self.record(Call::Probe);
        self.material_listing.is_some() || self.show_stderr.is_some()
    }

    async fn show_key_file(&self, path: &Path) -> Result<Vec<u8>> {
        assert!(path.exists(), "key file must exist while it is inspected");
        self.record(Call::Show(path.to_path_buf()));
        if let Some(stderr) = &self.show_stderr {
            return Err(Error::Tool {
                tool: "gpg".to_string(),
                status: 2,
                stderr: stderr.clone(),
            });
        }
        match &self.material_listing {
            Some(listing) => Ok(listing.clone().into_bytes()),
            None => Err(Self::failure("gpg")),
        }
    }
}

/// A listing holding one primary key with `fingerprint`.
pub(crate) fn listing_for(fingerprint: &str) -> String {
    format!(
        "pub:-:4096:1:{}:1416603673:::-:::scSC::::::23::0:\nfpr:::::::::{}:\n",
        &fingerprint[24..],
        fingerprint
    )
}

/// Serves one HTTP request with `status` and `body`, returning the base URL.
pub(crate) async fn serve_http(status: &'static str, body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|window| window == b"\r\n\r\n") {
            let read = stream.read(&mut buf).await.unwrap();
            if read == 0 {
                break;
            }
            request.extend_from_slice(&buf[..read]);
        }

        let head = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(body).await.unwrap();
        stream.shutdown().await.unwrap();
    });

    format!("http://{addr}")
}

/// Serves one FTP session offering `pub/key.gpg` with `material`.
///
/// Returns the file's URL and a handle yielding the commands received.
pub(crate) async fn serve_ftp(material: &'static [u8]) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        let mut commands = Vec::new();
        let mut passive: Option<TcpListener> = None;

        writer
            .write_all(b"220-Test archive\r\n220 ready\r\n")
            .await
            .unwrap();

        while let Ok(Some(line)) = lines.next_line().await {
            commands.push(line.clone());
            let reply = match line.split(' ').next().unwrap_or_default() {
                "USER" => "331 password required".to_string(),
                "PASS" => "230 logged in".to_string(),
                "TYPE" => "200 binary".to_string(),
                "PASV" => {
                    let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
                    let port = data.local_addr().unwrap().port();
                    passive = Some(data);
                    format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{})",
                        port >> 8,
                        port & 0xff
                    )
                }
                "RETR" if line == "RETR pub/key.gpg" => {
                    writer.write_all(b"150 opening\r\n").await.unwrap();
                    let data = passive.take().unwrap();
                    let (mut conn, _) = data.accept().await.unwrap();
                    conn.write_all(material).await.unwrap();
                    conn.shutdown().await.unwrap();
                    "226 transfer complete".to_string()
                }
                "RETR" => "550 no such file".to_string(),
                "QUIT" => {
                    writer.write_all(b"221 bye\r\n").await.unwrap();
                    break;
                }
                _ => "502 not implemented".to_string(),
            };
            writer
                .write_all(format!("{reply}\r\n").as_bytes())
                .await
                .unwrap();
        }

        commands
    });

    (format!("ftp://{addr}/pub/key.gpg"), server)
}

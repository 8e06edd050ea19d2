// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::config::MirrorConfig;
use crate::transport::{FetchStatus, Transport, TransportError};
use crate::utils::write_atomic;

/// Create a mirror configuration rooted in a temporary directory
pub fn create_test_config(source: &str, destination: &Path) -> MirrorConfig {
    let mut config = MirrorConfig::new(source, destination);
    config.parallelism = 4;
    config.retries = 1;
    config
}

/// Create a temporary directory for tests
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::TempDir::new().expect("Failed to create temp directory")
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Serialize `[name, version, platform]` triples the way RubyGems writes
/// `specs.4.8`: encoded strings, `Gem::Version` user objects, and object
/// links for repeated platforms.
pub fn marshal_specs(entries: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut out = vec![4, 8, b'['];
    write_long(&mut out, entries.len() as i64);

    let mut symbols: Vec<&str> = Vec::new();
    let mut platforms: HashMap<&str, usize> = HashMap::new();
    // The outer array is object 0
    let mut objects = 1usize;

    for (name, version, platform) in entries {
        out.push(b'[');
        write_long(&mut out, 3);
        objects += 1;

        write_string(&mut out, &mut symbols, name);
        objects += 1;

        out.push(b'U');
        write_symbol(&mut out, &mut symbols, "Gem::Version");
        objects += 1;
        out.push(b'[');
        write_long(&mut out, 1);
        objects += 1;
        write_string(&mut out, &mut symbols, version);
        objects += 1;

        match platforms.get(platform) {
            Some(index) => {
                out.push(b'@');
                write_long(&mut out, *index as i64);
            }
            None => {
                platforms.insert(platform, objects);
                write_string(&mut out, &mut symbols, platform);
                objects += 1;
            }
        }
    }
    out
}

fn write_long(out: &mut Vec<u8>, value: i64) {
    match value {
        0 => out.push(0),
        1..=122 => out.push((value + 5) as u8),
        -123..=-1 => out.push((value - 5) as i8 as u8),
        _ => {
            let bytes = value.to_le_bytes();
            let len = if value > 0 {
                bytes.iter().rposition(|b| *b != 0).unwrap_or(0) + 1
            } else {
                bytes.iter().rposition(|b| *b != 0xff).unwrap_or(0) + 1
            };
            out.push(if value > 0 { len as u8 } else { (-(len as i8)) as u8 });
            out.extend_from_slice(&bytes[..len]);
        }
    }
}

fn write_symbol<'a>(out: &mut Vec<u8>, symbols: &mut Vec<&'a str>, name: &'a str) {
    match symbols.iter().position(|s| *s == name) {
        Some(index) => {
            out.push(b';');
            write_long(out, index as i64);
        }
        None => {
            out.push(b':');
            write_long(out, name.len() as i64);
            out.extend_from_slice(name.as_bytes());
            symbols.push(name);
        }
    }
}

fn write_string<'a>(out: &mut Vec<u8>, symbols: &mut Vec<&'a str>, value: &str) {
    out.push(b'I');
    out.push(b'"');
    write_long(out, value.len() as i64);
    out.extend_from_slice(value.as_bytes());
    write_long(out, 1);
    write_symbol(out, symbols, "E");
    out.push(b'T');
}

/// In-memory remote: serves registered bodies, fails scripted URLs, 404s the rest
#[derive(Default)]
pub struct ScriptedTransport {
    files: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.set_file(url, body);
        self
    }

    pub fn with_failure(self, url: &str) -> Self {
        self.failing.lock().unwrap().insert(url.to_string());
        self
    }

    pub fn set_file(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.files.lock().unwrap().insert(url.to_string(), body.into());
    }

    pub fn remove_file(&self, url: &str) {
        self.files.lock().unwrap().remove(url);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<FetchStatus, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());

        if self.failing.lock().unwrap().contains(url) {
            return Err(TransportError::Network {
                url: url.to_string(),
                message: "connection reset by peer".to_string(),
            });
        }
        let body = self.files.lock().unwrap().get(url).cloned();
        let Some(body) = body else {
            return Err(TransportError::NotFound { url: url.to_string() });
        };

        write_atomic(destination, &body)
            .await
            .map_err(|source| TransportError::Write {
                path: destination.to_path_buf(),
                source,
            })?;
        Ok(FetchStatus::Downloaded {
            bytes: body.len() as u64,
        })
    }
}

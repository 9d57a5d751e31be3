#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use urlset::remote::HttpClient;
use urlset::RemoteError;

/// In-memory image host: listing pages and image bodies keyed by URL.
#[derive(Default)]
pub struct FakeHost {
    bodies: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
}

impl FakeHost {
    pub fn with_body(mut self, url: &str, body: impl AsRef<[u8]>) -> Self {
        self.bodies.insert(url.to_string(), body.as_ref().to_vec());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HttpClient for FakeHost {
    fn get_text(&self, url: &str) -> Result<String, RemoteError> {
        self.get_bytes(url)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies.get(url).cloned().ok_or_else(|| RemoteError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

/// A server-rendered directory listing naming `files`.
pub fn listing_page(files: &[&str]) -> String {
    let mut page = String::from("<html><body><pre>\n<a href=\"../\">../</a>\n");
    for file in files {
        page.push_str(&format!("<a href=\"{file}\">{file}</a>   01-Jan-2024 00:00   1024\n"));
    }
    page.push_str("</pre></body></html>\n");
    page
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, content).expect("write file");
}

/// An annotation export with one entry per `(number, width, height, boxes)`.
pub fn annotation_yaml(entries: &[(&str, u32, u32, &[&str])]) -> String {
    let mut yaml = String::from("images:\n");
    for (number, width, height, boxes) in entries {
        yaml.push_str(&format!("  - meta: image-{number}.jpg, {width}, {height}\n"));
        yaml.push_str("    annotations:\n");
        if boxes.is_empty() {
            yaml.truncate(yaml.len() - 1);
            yaml.push_str(" []\n");
        }
        for line in *boxes {
            yaml.push_str(&format!("      - {line}\n"));
        }
    }
    yaml
}

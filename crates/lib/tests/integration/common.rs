//! Shared helpers for server integration tests.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use buildslot_lib::config::Config;
use buildslot_lib::server::{bind, serve};
use buildslot_lib::service::BuildService;
use tar::{Builder, EntryType, Header};
use tempfile::TempDir;

/// Mock build tool: checks the control environment, records its arguments
/// and echoes the manifest, which is always the last argument.
pub const ECHO_TOOL: &str = r#"#!/bin/sh
set -e
test "$MY" = "env"
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "--output-dir" ]; then
    out="$arg"
  fi
  prev="$arg"
done
mkdir -p "$out"
echo fake-build-result > "$out/disk.img"
echo "fake-tool $*"
echo "---"
cat "$prev"
"#;

/// Control document [`ECHO_TOOL`] accepts.
pub const ECHO_CONTROL: &str = r#"{"exports": ["tree"], "environments": ["MY=env"]}"#;

pub const FAILING_TOOL: &str = "#!/bin/sh\necho about to fail\nexit 1\n";

pub const FAKE_MANIFEST: &str = r#"{"fake": "manifest"}"#;

/// A server on an ephemeral port with its own build base directory.
pub struct TestServer {
  pub temp: TempDir,
  pub tool: PathBuf,
  pub url: String,
  client: reqwest::Client,
}

impl TestServer {
  pub async fn start(script: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    let tool = root.join("fake-tool");
    std::fs::write(&tool, script).unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = Config {
      listen: "127.0.0.1:0".parse().unwrap(),
      build_dir_base: root.join("base"),
      tool: tool.clone(),
    };
    let listener = bind(config.listen).await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(serve(listener, Arc::new(BuildService::new(config))));

    Self {
      temp,
      tool,
      url,
      client: reqwest::Client::new(),
    }
  }

  pub fn base(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap().join("base")
  }

  pub fn build_dir(&self) -> PathBuf {
    self.base().join("build")
  }

  pub async fn post_build(&self, body: Vec<u8>) -> reqwest::Response {
    self
      .client
      .post(format!("{}/api/v1/build", self.url))
      .header("Content-Type", "application/x-tar")
      .body(body)
      .send()
      .await
      .unwrap()
  }

  pub async fn get(&self, path: &str) -> reqwest::Response {
    self.client.get(format!("{}{}", self.url, path)).send().await.unwrap()
  }
}

/// Append an entry whose name is written into the header verbatim.
pub fn append_entry(builder: &mut Builder<Vec<u8>>, name: &str, entry_type: EntryType, content: &[u8]) {
  let mut header = Header::new_gnu();
  header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
  header.set_entry_type(entry_type);
  header.set_size(content.len() as u64);
  header.set_mode(if entry_type == EntryType::Directory { 0o755 } else { 0o644 });
  header.set_mtime(1_600_000_000);
  header.set_cksum();
  builder.append(&header, content).unwrap();
}

/// Tar stream for a build request.
pub fn build_request(control: &str, store: &[(&str, EntryType, &[u8])]) -> Vec<u8> {
  let mut builder = Builder::new(Vec::new());
  append_entry(&mut builder, "control.json", EntryType::Regular, control.as_bytes());
  append_entry(&mut builder, "manifest.json", EntryType::Regular, FAKE_MANIFEST.as_bytes());
  for (name, entry_type, content) in store {
    append_entry(&mut builder, name, *entry_type, content);
  }
  builder.into_inner().unwrap()
}

//! Host side of the "check my progress" channel.
//!
//! A host temp directory is bind-mounted into the sandbox. The in-sandbox
//! `drill-check` helper creates `request`; the host monitor deletes it, runs
//! one validation pass and atomically publishes `response`, which the helper
//! prints and removes.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::sandbox::CONTROL_MOUNT_PATH;

pub const REQUEST_FILE: &str = "request";
pub const RESPONSE_FILE: &str = "response";
pub const AGENT_FILE: &str = "drill-check";

/// Where the helper is installed inside the sandbox.
pub const AGENT_INSTALL_PATH: &str = "/usr/local/bin/drill-check";

/// Shell helper run by the user inside the sandbox.
pub fn agent_script() -> String {
    format!(
        r#"#!/bin/bash
# drill-check: ask drillbox to validate your progress so far.
control="{CONTROL_MOUNT_PATH}"
limit="${{DRILL_CHECK_TIMEOUT:-30}}"

if [ ! -d "$control" ]; then
    echo "drill-check: control directory $control is not mounted" >&2
    exit 2
fi

rm -f "$control/{RESPONSE_FILE}"
touch "$control/{REQUEST_FILE}"
echo "Checking your progress..."

ticks=0
while [ ! -f "$control/{RESPONSE_FILE}" ]; do
    sleep 0.5
    ticks=$((ticks + 1))
    if [ "$ticks" -ge $((limit * 2)) ]; then
        echo "drill-check: no answer after ${{limit}}s" >&2
        rm -f "$control/{REQUEST_FILE}"
        exit 1
    fi
done

cat "$control/{RESPONSE_FILE}"
echo
rm -f "$control/{RESPONSE_FILE}"
"#
    )
}

/// World-writable host directory shared with one sandbox.
#[derive(Debug)]
pub struct ControlChannel {
    dir: TempDir,
}

impl ControlChannel {
    pub fn create() -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("drillbox-control-")
            .tempdir()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o777))?;
        }
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn handshake(&self) -> ControlHandshake {
        ControlHandshake::new(self.dir.path())
    }

    /// Write the helper script into the directory and return its host path.
    pub fn write_agent(&self) -> io::Result<PathBuf> {
        let path = self.dir.path().join(AGENT_FILE);
        std::fs::write(&path, agent_script())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(path)
    }

    /// Stop managing the directory; it survives this value being dropped.
    pub fn persist(self) -> PathBuf {
        self.dir.into_path()
    }

    /// Remove the directory, reporting any failure.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

/// The two-file request/response protocol over a control directory.
#[derive(Debug, Clone)]
pub struct ControlHandshake {
    request: PathBuf,
    response: PathBuf,
    staging: PathBuf,
}

impl ControlHandshake {
    pub fn new(dir: &Path) -> Self {
        Self {
            request: dir.join(REQUEST_FILE),
            response: dir.join(RESPONSE_FILE),
            staging: dir.join(format!(".{RESPONSE_FILE}.tmp")),
        }
    }

    /// Consume a pending request marker. Returns `false` when none exists.
    pub async fn take_request(&self) -> bool {
        tokio::fs::remove_file(&self.request).await.is_ok()
    }

    /// Publish `feedback` as the response, atomically.
    pub async fn write_response(&self, feedback: &str) -> io::Result<()> {
        tokio::fs::write(&self.staging, feedback).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.staging, std::fs::Permissions::from_mode(0o666))
                .await?;
        }
        tokio::fs::rename(&self.staging, &self.response).await
    }

    /// Create the request marker, as the in-sandbox helper does.
    pub async fn post_request(&self) -> io::Result<()> {
        tokio::fs::write(&self.request, b"").await
    }

    /// Read and remove the response, as the in-sandbox helper does.
    pub async fn take_response(&self) -> Option<String> {
        let text = tokio::fs::read_to_string(&self.response).await.ok()?;
        let _ = tokio::fs::remove_file(&self.response).await;
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_response_round() {
        let channel = ControlChannel::create().unwrap();
        let hs = channel.handshake();

        assert!(!hs.take_request().await);
        hs.post_request().await.unwrap();
        assert!(hs.take_request().await);
        assert!(!hs.take_request().await);

        hs.write_response("1/1 checks passed").await.unwrap();
        assert_eq!(hs.take_response().await.as_deref(), Some("1/1 checks passed"));
        assert!(hs.take_response().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let channel = ControlChannel::create().unwrap();
        let mode = std::fs::metadata(channel.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);

        let hs = channel.handshake();
        hs.write_response("x").await.unwrap();
        let mode = std::fs::metadata(channel.path().join(RESPONSE_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o666);
    }

    #[test]
    fn test_agent_script_targets_mount() {
        let script = agent_script();
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("control=\"/opt/drillbox/control\""));
        assert!(script.contains("${DRILL_CHECK_TIMEOUT:-30}"));
        assert!(script.contains("touch \"$control/request\""));
    }

    #[test]
    fn test_channel_dir_removed_on_drop() {
        let channel = ControlChannel::create().unwrap();
        let path = channel.path().to_path_buf();
        channel.write_agent().unwrap();
        drop(channel);
        assert!(!path.exists());
    }
}

// TASALIGN CONTROL-PLANE TOOL
// THE SWITCH IS PROGRAMMED BY AN EXTERNAL CLI (keti-tsn): `patch <doc>` PUSHES
// A GATE TABLE, `fetch <doc>` READS STATE (INCLUDING THE LIVE PTP CLOCK).
// SUCCESS REQUIRES EXIT 0 *AND* NO "Failed" MARKER IN STDOUT.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{Result, TasError};
use crate::schedule::BaseTime;
use crate::timebase::{parse_current_time, ClockSource};

pub const FAILURE_MARKER: &str = "Failed";

#[derive(Clone, Debug, Default)]
pub struct PatchOutput {
    pub exit_ok: bool,
    pub stdout: String,
    pub stderr: String,
}

impl PatchOutput {
    pub fn ok() -> Self {
        Self { exit_ok: true, ..Self::default() }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_ok && !self.stdout.contains(FAILURE_MARKER)
    }

    // LAST 300 CHARS OF WHICHEVER STREAM EXPLAINS THE FAILURE
    pub fn failure_reason(&self) -> String {
        let src = if !self.exit_ok && !self.stderr.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        };
        let trimmed = src.trim();
        let start = trimmed
            .char_indices()
            .rev()
            .nth(299)
            .map(|(i, _)| i)
            .unwrap_or(0);
        if trimmed.is_empty() {
            "no output".to_string()
        } else {
            trimmed[start..].to_string()
        }
    }
}

pub trait ControlPlane {
    // PUSH ONE SERIALIZED GATE DOCUMENT. Err MEANS THE TOOL COULD NOT BE INVOKED.
    fn patch(&mut self, document: &str) -> Result<PatchOutput>;
}

pub struct KetiTsn {
    binary: PathBuf,
    workdir: PathBuf,
    fetch_document: PathBuf,
    runtime_document: PathBuf,
}

impl KetiTsn {
    pub fn new(
        binary: impl Into<PathBuf>,
        workdir: impl Into<PathBuf>,
        fetch_document: impl Into<PathBuf>,
        runtime_document: impl Into<PathBuf>,
    ) -> Self {
        Self {
            binary: binary.into(),
            workdir: workdir.into(),
            fetch_document: fetch_document.into(),
            runtime_document: runtime_document.into(),
        }
    }

    pub fn runtime_document(&self) -> &Path {
        &self.runtime_document
    }

    fn invoke(&self, subcommand: &str, document: &Path) -> std::io::Result<PatchOutput> {
        let out = Command::new(&self.binary)
            .arg(subcommand)
            .arg(document)
            .current_dir(&self.workdir)
            .output()?;
        Ok(PatchOutput {
            exit_ok: out.status.success(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

impl ControlPlane for KetiTsn {
    fn patch(&mut self, document: &str) -> Result<PatchOutput> {
        if let Some(parent) = self.runtime_document.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.runtime_document, document)?;
        debug!("patch {}", self.runtime_document.display());
        Ok(self.invoke("patch", &self.runtime_document)?)
    }
}

impl ClockSource for KetiTsn {
    fn now(&mut self) -> Result<BaseTime> {
        let out = self
            .invoke("fetch", &self.fetch_document)
            .map_err(|e| TasError::ClockUnavailable(format!("cannot run fetch: {}", e)))?;
        if !out.exit_ok {
            return Err(TasError::ClockUnavailable(out.failure_reason()));
        }
        parse_current_time(&out.stdout)
    }
}

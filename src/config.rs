// TASALIGN RUN CONFIGURATION
// ONE JSON DOCUMENT, EVERY SECTION OPTIONAL. MISSING FIELDS TAKE THE
// DEFAULTS OF THE 781.25US LIDAR BENCH.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::control::KetiTsn;
use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::schedule::GateProgram;
use crate::scorer::ScorerConfig;
use crate::search::SearchConfig;
use crate::sensor::{SensorSetting, DEFAULT_SENSOR_SETTLE_MS};
use crate::sim::SimModel;
use crate::telemetry::{DEFAULT_POLL_TIMEOUT_MS, DEFAULT_STATS_URL};
use crate::timebase::DEFAULT_BASE_OFFSET_SEC;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub binary: PathBuf,
    pub workdir: PathBuf,
    // RELATIVE DOCUMENT PATHS RESOLVE AGAINST workdir
    pub fetch_document: PathBuf,
    pub runtime_document: PathBuf,
    pub interface: String,
    pub base_offset_sec: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("./keti-tsn"),
            workdir: PathBuf::from("."),
            fetch_document: PathBuf::from("configs/fetch-tas.yaml"),
            runtime_document: PathBuf::from("runtime/_tas_runtime.yaml"),
            interface: "1".into(),
            base_offset_sec: DEFAULT_BASE_OFFSET_SEC,
        }
    }
}

impl ToolConfig {
    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workdir.join(p)
        }
    }

    pub fn keti_tsn(&self) -> KetiTsn {
        KetiTsn::new(
            &self.binary,
            &self.workdir,
            self.resolve(&self.fetch_document),
            self.resolve(&self.runtime_document),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub stats_url: String,
    pub poll_timeout_ms: u64,
    // NONE: NO SENSOR CONTROL, PHASE-LOCK AXIS MUST STAY [false]
    pub sensor_url: Option<String>,
    pub sensor_settle_ms: u64,
    pub sensor_baseline: SensorSetting,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            stats_url: DEFAULT_STATS_URL.into(),
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            sensor_url: None,
            sensor_settle_ms: DEFAULT_SENSOR_SETTLE_MS,
            sensor_baseline: SensorSetting::default(),
        }
    }
}

impl EndpointConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn sensor_settle(&self) -> Duration {
        Duration::from_millis(self.sensor_settle_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub tool: ToolConfig,
    pub endpoints: EndpointConfig,
    pub search: SearchConfig,
    pub scorer: ScorerConfig,
    pub retry: RetryPolicy,
    pub sim: SimModel,
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tool: ToolConfig::default(),
            endpoints: EndpointConfig::default(),
            search: SearchConfig::default(),
            scorer: ScorerConfig::default(),
            retry: RetryPolicy::default(),
            sim: SimModel::default(),
            output_dir: PathBuf::from("data"),
        }
    }
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("loading config {:?}", path);
        let reader = BufReader::new(File::open(path)?);
        let cfg: Self = serde_json::from_reader(reader)?;
        cfg.search.validate()?;
        Ok(cfg)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    // ALWAYS-OPEN AT THE SEARCH CYCLE
    pub fn safe_program(&self) -> Result<GateProgram> {
        GateProgram::always_open(self.search.cycle_ns)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::TasError;
    use crate::schedule::GateLayout;

    #[test]
    fn defaults_match_bench() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.search.cycle_ns, 781_250);
        assert_eq!(cfg.search.open_widths_ns.len(), 7);
        assert_eq!(cfg.search.top_k, 3);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.backoff_ms, 200);
        assert_eq!(cfg.scorer.fps_floor, 9.5);
        assert_eq!(cfg.tool.base_offset_sec, 2);
        assert_eq!(cfg.endpoints.poll_timeout_ms, 800);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let cfg: RunConfig = serde_json::from_str(
            r#"{"search": {"layout": "open_close", "top_k": 5}, "scorer": {"penalty_weight": 6.0}}"#,
        )
        .unwrap();
        assert_eq!(cfg.search.layout, GateLayout::OpenClose);
        assert_eq!(cfg.search.top_k, 5);
        assert_eq!(cfg.search.phase_step_ns, 20_000);
        assert_eq!(cfg.scorer.penalty_weight, 6.0);
        assert_eq!(cfg.scorer.fps_floor, 9.5);
    }

    #[test]
    fn load_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"endpoints": {{"sensor_url": "http://10.0.0.2/api/v1/sensor"}}, "search": {{"splits": [{{"front_ns": 305625}}]}}}}"#).unwrap();
        let cfg = RunConfig::load(f.path()).unwrap();
        assert_eq!(cfg.endpoints.sensor_url.as_deref(), Some("http://10.0.0.2/api/v1/sensor"));
        assert_eq!(cfg.search.splits.len(), 1);
    }

    #[test]
    fn load_rejects_invalid_search() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"search": {{"open_widths_ns": []}}}}"#).unwrap();
        assert!(matches!(RunConfig::load(f.path()), Err(TasError::Config(_))));
    }

    #[test]
    fn malformed_json_is_json_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{{ not json").unwrap();
        assert!(matches!(RunConfig::load(f.path()), Err(TasError::Json(_))));
    }

    #[test]
    fn relative_documents_resolve_against_workdir() {
        let tool = ToolConfig { workdir: PathBuf::from("/opt/keti"), ..Default::default() };
        assert_eq!(tool.resolve(Path::new("a.yaml")), PathBuf::from("/opt/keti/a.yaml"));
        assert_eq!(tool.resolve(Path::new("/etc/b.yaml")), PathBuf::from("/etc/b.yaml"));
        assert_eq!(tool.keti_tsn().runtime_document(), Path::new("/opt/keti/runtime/_tas_runtime.yaml"));
    }
}

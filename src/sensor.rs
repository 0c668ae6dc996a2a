// TASALIGN SENSOR CONFIG API
// POST /cmd/set_config_param?args=<key>%20<value>, POST /cmd/reinitialize.
// EVERY CHANGE IS FOLLOWED BY A SETTLE DELAY WHILE THE SENSOR RESTARTS ITS STREAM.

use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Pace;
use crate::error::{Result, TasError};

pub const DEFAULT_SENSOR_URL: &str = "http://192.168.6.11/api/v1/sensor";
pub const DEFAULT_SENSOR_SETTLE_MS: u64 = 2_000;
const SENSOR_TIMEOUT: Duration = Duration::from_secs(3);

pub trait SensorControl {
    fn set_config_param(&mut self, key: &str, value: &str) -> Result<()>;
    fn reinitialize(&mut self) -> Result<()>;
}

pub struct HttpSensor {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpSensor {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(SENSOR_TIMEOUT)
            .timeout(SENSOR_TIMEOUT)
            .build()
            .map_err(|e| TasError::Config(format!("cannot build sensor client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn post(&self, url: &str) -> Result<()> {
        self.client
            .post(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map(|_| ())
            .map_err(|e| TasError::Sensor(format!("{}: {}", url, e)))
    }
}

pub fn config_param_path(key: &str, value: &str) -> String {
    format!("/cmd/set_config_param?args={}%20{}", key, value)
}

impl SensorControl for HttpSensor {
    fn set_config_param(&mut self, key: &str, value: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, config_param_path(key, value));
        self.post(&url)
    }

    fn reinitialize(&mut self) -> Result<()> {
        let url = format!("{}/cmd/reinitialize", self.base_url);
        self.post(&url)
    }
}


// ONE SENSOR CONFIGURATION. NONE LEAVES THAT PARAMETER AT THE BASELINE VALUE
// (OR, WITHOUT ONE, AT WHATEVER THE SENSOR IS RUNNING).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSetting {
    pub timestamp_mode: Option<String>,
    pub phase_lock: bool,
    pub phase_lock_offset: Option<i64>,
}

pub struct Sensor {
    ctrl: Box<dyn SensorControl>,
    pace: Rc<dyn Pace>,
    settle: Duration,
    baseline: SensorSetting,
    // NONE UNTIL THE FIRST SUCCESSFUL configure, AND AFTER A FAILED ONE
    current: Option<SensorSetting>,
}

impl Sensor {
    pub fn new(
        ctrl: Box<dyn SensorControl>,
        pace: Rc<dyn Pace>,
        settle: Duration,
        baseline: SensorSetting,
    ) -> Self {
        Self { ctrl, pace, settle, baseline, current: None }
    }

    pub fn baseline(&self) -> &SensorSetting {
        &self.baseline
    }

    pub fn current(&self) -> Option<&SensorSetting> {
        self.current.as_ref()
    }

    pub fn phase_lock(&self) -> Option<bool> {
        self.current.as_ref().map(|c| c.phase_lock)
    }

    pub fn restore_baseline(&mut self) -> Result<()> {
        let baseline = self.baseline.clone();
        self.configure(&baseline)
    }

    pub fn set_phase_lock(&mut self, enable: bool) -> Result<()> {
        self.configure(&SensorSetting { phase_lock: enable, ..Default::default() })
    }

    // SEND ONLY THE PARAMETERS THAT DIFFER, THEN ONE REINITIALIZE + SETTLE.
    // AN UNKNOWN SENSOR STATE SENDS EVERY RESOLVED PARAMETER.
    pub fn configure(&mut self, want: &SensorSetting) -> Result<()> {
        let known = self.current.take();
        let next = SensorSetting {
            timestamp_mode: want
                .timestamp_mode
                .clone()
                .or_else(|| self.baseline.timestamp_mode.clone())
                .or_else(|| known.as_ref().and_then(|k| k.timestamp_mode.clone())),
            phase_lock: want.phase_lock,
            phase_lock_offset: want
                .phase_lock_offset
                .or(self.baseline.phase_lock_offset)
                .or_else(|| known.as_ref().and_then(|k| k.phase_lock_offset)),
        };
        if known.as_ref() == Some(&next) {
            self.current = known;
            return Ok(());
        }

        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(mode) = &next.timestamp_mode {
            if known.as_ref().map_or(true, |k| k.timestamp_mode.as_ref() != Some(mode)) {
                params.push(("timestamp_mode", mode.clone()));
            }
        }
        if known.as_ref().map_or(true, |k| k.phase_lock != next.phase_lock) {
            params.push(("phase_lock_enable", next.phase_lock.to_string()));
        }
        if let Some(offset) = next.phase_lock_offset {
            if known.as_ref().map_or(true, |k| k.phase_lock_offset != Some(offset)) {
                params.push(("phase_lock_offset", offset.to_string()));
            }
        }

        info!(
            "sensor timestamp_mode={} phase_lock_enable={} phase_lock_offset={}",
            next.timestamp_mode.as_deref().unwrap_or("-"),
            next.phase_lock,
            next.phase_lock_offset.map_or_else(|| "-".to_string(), |o| o.to_string())
        );
        for (key, value) in &params {
            self.ctrl.set_config_param(key, value)?;
        }
        self.ctrl.reinitialize()?;
        self.pace.sleep(self.settle);
        self.current = Some(next);
        Ok(())
    }
}

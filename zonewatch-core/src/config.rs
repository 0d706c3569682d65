//! The declarative YAML configuration tree (SPEC_FULL.md §4.G) and its
//! loader. Grounded on the original `worker/worker.py`'s inline YAML walk
//! and `shared/config_loader.py`'s nested tenant/camera/zone shape.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{AlertLevel, ZoneMetric};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigThreshold {
    pub metric: String,
    pub level: String,
    pub threshold: f64,
}

impl ConfigThreshold {
    pub fn metric(&self) -> Option<ZoneMetric> {
        ZoneMetric::parse(&self.metric)
    }

    pub fn level(&self) -> Option<AlertLevel> {
        AlertLevel::parse(&self.level)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigZone {
    pub id: i32,
    pub name: String,
    pub polygon: Vec<(f64, f64)>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default = "default_ghost_timeout")]
    pub ghost_timeout_minutes: i32,
    #[serde(default)]
    pub thresholds: Vec<ConfigThreshold>,
}

fn default_ghost_timeout() -> i32 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigCamera {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    pub rtsp_url: String,
    #[serde(default = "default_fps")]
    pub fps: i16,
    #[serde(default)]
    pub zones: Vec<ConfigZone>,
}

fn default_fps() -> i16 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigTenant {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub cameras: Vec<ConfigCamera>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRoot {
    #[serde(default)]
    pub tenants: Vec<ConfigTenant>,
}

impl ConfigRoot {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.as_ref().display()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let root: ConfigRoot = serde_yaml::from_str(text)?;
        Ok(root)
    }

    /// Locate a camera by id, along with the tenant that owns it. Used by
    /// the Worker and Capture binaries at startup — a missing camera is
    /// fatal (SPEC_FULL.md §7).
    pub fn find_camera(&self, camera_id: i32) -> Option<(&ConfigTenant, &ConfigCamera)> {
        for tenant in &self.tenants {
            for camera in &tenant.cameras {
                if camera.id == camera_id {
                    return Some((tenant, camera));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
tenants:
  - id: 1
    name: Acme
    cameras:
      - id: 7
        name: Front door
        rtsp_url: "rtsp://example/1"
        fps: 15
        zones:
          - id: 1
            name: Register
            polygon: [[0, 0], [10, 0], [10, 10], [0, 10]]
            metrics: [occupancy, dwell]
            ghost_timeout_minutes: 30
            thresholds:
              - metric: occupancy
                level: warning
                threshold: 5
"#;

    #[test]
    fn parses_nested_tree() {
        let cfg = ConfigRoot::parse(SAMPLE).unwrap();
        let (tenant, camera) = cfg.find_camera(7).unwrap();
        assert_eq!(tenant.id, 1);
        assert_eq!(camera.fps, 15);
        assert_eq!(camera.zones[0].thresholds[0].threshold, 5.0);
    }

    #[test]
    fn missing_camera_is_none() {
        let cfg = ConfigRoot::parse(SAMPLE).unwrap();
        assert!(cfg.find_camera(999).is_none());
    }

    #[test]
    fn load_reads_yaml_from_disk() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let cfg = ConfigRoot::load(file.path()).unwrap();
        let (_, camera) = cfg.find_camera(7).unwrap();
        assert_eq!(camera.name, "Front door");
    }

    #[test]
    fn load_missing_file_is_an_error() {
        assert!(ConfigRoot::load("/nonexistent/zonewatch-config.yaml").is_err());
    }

    #[test]
    fn defaults_apply_when_fields_absent() {
        let text = r#"
tenants:
  - id: 1
    name: Acme
    cameras:
      - id: 1
        name: Cam
        rtsp_url: "rtsp://x"
        zones:
          - id: 1
            name: Z
            polygon: [[0,0],[1,0],[1,1],[0,1]]
"#;
        let cfg = ConfigRoot::parse(text).unwrap();
        let (_, camera) = cfg.find_camera(1).unwrap();
        assert_eq!(camera.fps, 30);
        assert_eq!(camera.zones[0].ghost_timeout_minutes, 60);
    }
}

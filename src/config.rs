use crate::error::ValidationError;
use crate::resolve::RawArgs;
use log::LevelFilter;
use std::io::Read;
use std::path::Path;

/// Environment variable naming the log level.
pub const LOG_VAR: &str = "POLUS_LOG";

/// Environment variable naming the fallback output extension.
pub const EXT_VAR: &str = "POLUS_EXT";

const DEFAULT_EXTENSION: &str = ".ome.tif";

/// Process-wide settings taken from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub log_level: LevelFilter,
    pub default_extension: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
            default_extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(level) = lookup(LOG_VAR) {
            settings.log_level =
                parse_level(&level).ok_or_else(|| ValidationError::InvalidSetting {
                    name: LOG_VAR,
                    value: level.clone(),
                    reason: "expected DEBUG, INFO, WARNING, ERROR or CRITICAL",
                })?;
        }

        if let Some(ext) = lookup(EXT_VAR) {
            settings.default_extension =
                parse_extension(&ext).ok_or_else(|| ValidationError::InvalidSetting {
                    name: EXT_VAR,
                    value: ext.clone(),
                    reason: "only TIFF extensions can hold every pixel type",
                })?;
        }

        Ok(settings)
    }
}

fn parse_level(name: &str) -> Option<LevelFilter> {
    match name.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => Some(LevelFilter::Debug),
        "INFO" => Some(LevelFilter::Info),
        "WARNING" | "WARN" => Some(LevelFilter::Warn),
        "ERROR" | "CRITICAL" => Some(LevelFilter::Error),
        _ => None,
    }
}

fn parse_extension(ext: &str) -> Option<String> {
    let ext = ext.trim();
    let ext = if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    };

    let lower = ext.to_ascii_lowercase();
    (lower.ends_with(".tif") || lower.ends_with(".tiff")).then_some(ext)
}

/// Filter parameters read from a TOML file.
///
/// ```toml
/// op_name = "DoGVaryingSigmas"
/// sigmas1 = [1.0, 1.0]
/// sigmas2 = [4.0, 2.5]
/// ```
#[derive(Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamsFile {
    pub op_name: Option<String>,
    pub sigma1: Option<f64>,
    pub sigma2: Option<f64>,
    pub sigmas1: Option<Vec<f64>>,
    pub sigmas2: Option<Vec<f64>>,
}

impl ParamsFile {
    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        let failed = |reason: String| ValidationError::ParamsFile {
            path: path.to_path_buf(),
            reason,
        };

        let mut buffer = String::new();
        std::fs::File::open(path)
            .and_then(|mut file| file.read_to_string(&mut buffer))
            .map_err(|e| failed(e.to_string()))?;

        toml::from_str(&buffer).map_err(|e| failed(e.to_string()))
    }

    /// Fill in whatever `raw` left unset. Flags always win.
    pub fn apply_to(self, raw: RawArgs) -> RawArgs {
        let list = |sigmas: Vec<f64>| {
            sigmas
                .iter()
                .map(f64::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };

        RawArgs {
            op_name: raw.op_name.or(self.op_name),
            sigma1: raw.sigma1.or_else(|| self.sigma1.map(|s| s.to_string())),
            sigma2: raw.sigma2.or_else(|| self.sigma2.map(|s| s.to_string())),
            sigmas1: raw.sigmas1.or_else(|| self.sigmas1.map(list)),
            sigmas2: raw.sigmas2.or_else(|| self.sigmas2.map(list)),
            ..raw
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.default_extension, ".ome.tif");
    }

    #[test]
    fn python_style_level_names() {
        let settings = Settings::from_lookup(lookup(&[(LOG_VAR, "WARNING")])).unwrap();
        assert_eq!(settings.log_level, LevelFilter::Warn);

        let settings = Settings::from_lookup(lookup(&[(LOG_VAR, "critical")])).unwrap();
        assert_eq!(settings.log_level, LevelFilter::Error);

        assert!(matches!(
            Settings::from_lookup(lookup(&[(LOG_VAR, "CHATTY")])),
            Err(ValidationError::InvalidSetting { name: LOG_VAR, .. })
        ));
    }

    #[test]
    fn extension_gets_a_dot_and_must_be_tiff() {
        let settings = Settings::from_lookup(lookup(&[(EXT_VAR, "tiff")])).unwrap();
        assert_eq!(settings.default_extension, ".tiff");

        assert!(Settings::from_lookup(lookup(&[(EXT_VAR, ".ome.zarr")])).is_err());
    }

    #[test]
    fn params_file_fills_missing_flags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params.toml");
        std::fs::write(
            &path,
            "op_name = \"DoGVaryingSigmas\"\nsigma1 = 0.5\nsigmas1 = [1.0, 1.5]\nsigmas2 = [4.0, 3.0]\n",
        )
        .unwrap();

        let raw = RawArgs {
            sigmas2: Some("5,5".to_string()),
            out_dir: PathBuf::from("out"),
            ..RawArgs::default()
        };
        let raw = ParamsFile::load(&path).unwrap().apply_to(raw);

        assert_eq!(raw.op_name.as_deref(), Some("DoGVaryingSigmas"));
        assert_eq!(raw.sigma1.as_deref(), Some("0.5"));
        assert_eq!(raw.sigmas1.as_deref(), Some("1,1.5"));
        assert_eq!(raw.sigmas2.as_deref(), Some("5,5"));
        assert_eq!(raw.out_dir, PathBuf::from("out"));
    }

    #[test]
    fn params_file_rejects_unknown_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params.toml");
        std::fs::write(&path, "sigma3 = 1.0\n").unwrap();

        assert!(matches!(
            ParamsFile::load(&path),
            Err(ValidationError::ParamsFile { .. })
        ));
    }
}

//! Turning raw flag values into an [`Invocation`].

use crate::engine::SigmaBounds;
use crate::error::ValidationError;
use crate::plane::PixelType;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

/// Subfolder of an input collection that holds the actual images.
const IMAGES_SUBDIR: &str = "images";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpName {
    DoGSingleSigmas,
    DoGVaryingSigmas,
}

impl OpName {
    pub const ALL: [OpName; 2] = [OpName::DoGSingleSigmas, OpName::DoGVaryingSigmas];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpName::DoGSingleSigmas => "DoGSingleSigmas",
            OpName::DoGVaryingSigmas => "DoGVaryingSigmas",
        }
    }
}

impl fmt::Display for OpName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpName::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidOperation {
                found: Some(s.to_string()),
            })
    }
}

/// The selected filter together with exactly the parameters it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    DoGSingleSigmas { sigma1: f64, sigma2: f64 },
    DoGVaryingSigmas { sigmas1: Vec<f64>, sigmas2: Vec<f64> },
}

impl Operation {
    pub fn name(&self) -> OpName {
        match self {
            Operation::DoGSingleSigmas { .. } => OpName::DoGSingleSigmas,
            Operation::DoGVaryingSigmas { .. } => OpName::DoGVaryingSigmas,
        }
    }

    /// Coerce the sigmas for an image whose samples are `pixel_type`.
    ///
    /// Single precision images get single precision sigmas.
    pub fn bind(&self, pixel_type: PixelType) -> SigmaBounds {
        let coerce = |sigma: f64| match pixel_type {
            PixelType::F32 => f64::from(sigma as f32),
            _ => sigma,
        };

        match self {
            Operation::DoGSingleSigmas { sigma1, sigma2 } => {
                SigmaBounds::Scalar(coerce(*sigma1), coerce(*sigma2))
            }
            Operation::DoGVaryingSigmas { sigmas1, sigmas2 } => SigmaBounds::PerAxis(
                sigmas1.iter().map(|&s| coerce(s)).collect(),
                sigmas2.iter().map(|&s| coerce(s)).collect(),
            ),
        }
    }
}

/// Flag values as given, before any validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawArgs {
    pub op_name: Option<String>,
    pub inp_dir: Option<PathBuf>,
    pub sigma1: Option<String>,
    pub sigma2: Option<String>,
    pub sigmas1: Option<String>,
    pub sigmas2: Option<String>,
    pub out_dir: PathBuf,
}

/// A validated run: what to apply, to which files, and where results go.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub operation: Operation,
    pub input_dir: PathBuf,
    pub work_list: Vec<PathBuf>,
    pub out_dir: PathBuf,
}

pub fn resolve(raw: RawArgs) -> Result<Invocation, ValidationError> {
    let op = match raw.op_name.as_deref() {
        Some(name) => name.parse::<OpName>()?,
        None => return Err(ValidationError::InvalidOperation { found: None }),
    };

    let input_dir = raw
        .inp_dir
        .ok_or(ValidationError::MissingRequiredInput {
            input: "inpDIr",
            op,
        })?;

    let operation = match op {
        OpName::DoGSingleSigmas => Operation::DoGSingleSigmas {
            sigma1: required("sigma1", raw.sigma1, op, parse_scalar)?,
            sigma2: required("sigma2", raw.sigma2, op, parse_scalar)?,
        },
        OpName::DoGVaryingSigmas => Operation::DoGVaryingSigmas {
            sigmas1: required("sigmas1", raw.sigmas1, op, parse_array)?,
            sigmas2: required("sigmas2", raw.sigmas2, op, parse_array)?,
        },
    };

    let input_dir = reroot(input_dir);
    let work_list = list_files(&input_dir)?;

    Ok(Invocation {
        operation,
        input_dir,
        work_list,
        out_dir: raw.out_dir,
    })
}

fn required<T>(
    param: &'static str,
    value: Option<String>,
    op: OpName,
    parse: fn(&str) -> Result<T, String>,
) -> Result<T, ValidationError> {
    let value = value.ok_or(ValidationError::MissingRequiredParameter { param, op })?;
    parse(&value).map_err(|reason| ValidationError::InvalidParameter {
        param,
        value,
        reason,
    })
}

fn parse_scalar(text: &str) -> Result<f64, String> {
    let sigma: f64 = text
        .trim()
        .parse()
        .map_err(|_| "not a number".to_string())?;
    check_sigma(sigma)
}

/// `1.5,2`, `1.5 2` and `[1.5, 2]` are all accepted.
fn parse_array(text: &str) -> Result<Vec<f64>, String> {
    let text = text.trim();
    let text = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .unwrap_or(text);

    let sigmas = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(parse_scalar)
        .collect::<Result<Vec<_>, _>>()?;

    if sigmas.is_empty() {
        return Err("no values".to_string());
    }
    Ok(sigmas)
}

fn check_sigma(sigma: f64) -> Result<f64, String> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(format!("{sigma} is not a finite, non-negative sigma"));
    }
    Ok(sigma)
}

fn reroot(dir: PathBuf) -> PathBuf {
    let images = dir.join(IMAGES_SUBDIR);
    if images.is_dir() { images } else { dir }
}

/// Regular files directly inside `dir`, sorted by name.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>, ValidationError> {
    let listing_failed = |source: std::io::Error| ValidationError::InputDirectory {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(listing_failed)? {
        let path = entry.map_err(listing_failed)?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    Ok(files)
}

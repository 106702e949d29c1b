//! The filtering engine behind the bridge.
//!
//! [`Engine`] is the full surface the rest of the crate needs from it:
//! a version, logger control, lossless conversion between planes and the
//! engine's own array type, the difference-of-Gaussians primitive and
//! shutdown. [`NativeEngine`] implements it on top of `ndarray`.

use crate::plane::PixelBuffer;
use crate::plane::PixelType;
use crate::plane::Plane;
use log::Level;
use log::LevelFilter;
use ndarray::Array2;
use ndarray::Axis;
use ndarray::Zip;
use std::collections::HashMap;
use thiserror::Error;

/// Logger the native engine uses for per-kernel chatter.
pub const KERNEL_LOGGER: &str = "kernel";

const KERNEL_TARGET: &str = "dog_cli::engine::kernel";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine version {requested} is not available (this build provides {available})")]
    UnavailableVersion {
        requested: String,
        available: &'static str,
    },

    #[error("engine has been shut down")]
    Stopped,

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("per-axis sigmas need {expected} values, got {found}")]
    AxisCount { expected: usize, found: usize },

    #[error("sigma must be finite and non-negative, got {0}")]
    InvalidSigma(f64),
}

/// Sigma bounds handed to the difference-of-Gaussians primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum SigmaBounds {
    /// The same pair of sigmas on every axis.
    Scalar(f64, f64),
    /// One sigma per non-singleton axis, X first.
    PerAxis(Vec<f64>, Vec<f64>),
}

/// The engine's native array: samples as `f64` plus the type they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineArray {
    data: Array2<f64>,
    pixel_type: PixelType,
}

impl EngineArray {
    pub fn new(data: Array2<f64>, pixel_type: PixelType) -> Self {
        Self { data, pixel_type }
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    /// `(rows, cols)`, i.e. `(height, width)`.
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }
}

pub trait Engine {
    fn version(&self) -> &str;

    /// Override the verbosity of one of the engine's internal loggers.
    fn set_logger_level(&mut self, logger: &str, level: LevelFilter);

    fn to_array(&self, plane: &Plane) -> Result<EngineArray, EngineError>;

    fn from_array(&self, array: EngineArray, pixel_type: PixelType) -> Result<Plane, EngineError>;

    /// Difference of Gaussians: `gauss(input, first) - gauss(input, second)`.
    fn dog(&self, input: &EngineArray, bounds: &SigmaBounds) -> Result<EngineArray, EngineError>;

    fn shutdown(&mut self) -> Result<(), EngineError>;
}

/// Starts engines. The bridge asks for an exact version.
pub trait Launcher {
    fn launch(&self, version: &str) -> Result<Box<dyn Engine>, EngineError>;
}

pub struct NativeLauncher;

impl Launcher for NativeLauncher {
    fn launch(&self, version: &str) -> Result<Box<dyn Engine>, EngineError> {
        if version != NativeEngine::VERSION {
            return Err(EngineError::UnavailableVersion {
                requested: version.to_string(),
                available: NativeEngine::VERSION,
            });
        }

        Ok(Box::new(NativeEngine::new()))
    }
}

#[derive(Debug)]
pub struct NativeEngine {
    loggers: HashMap<String, LevelFilter>,
    running: bool,
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeEngine {
    pub const VERSION: &'static str = "1.0.0";

    pub fn new() -> Self {
        Self {
            loggers: HashMap::new(),
            running: true,
        }
    }

    fn logs(&self, logger: &str, level: Level) -> bool {
        self.loggers.get(logger).is_none_or(|max| level <= *max)
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.running {
            Ok(())
        } else {
            Err(EngineError::Stopped)
        }
    }

    fn gaussian(&self, input: &Array2<f64>, axes: &[Axis], sigmas: &[f64]) -> Array2<f64> {
        let mut blurred = input.clone();
        for (&axis, &sigma) in axes.iter().zip(sigmas) {
            let Some(half) = half_kernel(sigma, input.len_of(axis)) else {
                continue;
            };

            if self.logs(KERNEL_LOGGER, Level::Info) {
                log::info!(
                    target: KERNEL_TARGET,
                    "gaussian along axis {}: sigma={sigma}, half-size={}",
                    axis.index(),
                    half.len()
                );
            }
            blurred = convolve_axis(&blurred, axis, &half);
        }
        blurred
    }
}

impl Engine for NativeEngine {
    fn version(&self) -> &str {
        Self::VERSION
    }

    fn set_logger_level(&mut self, logger: &str, level: LevelFilter) {
        self.loggers.insert(logger.to_string(), level);
    }

    fn to_array(&self, plane: &Plane) -> Result<EngineArray, EngineError> {
        self.ensure_running()?;
        let data = Array2::from_shape_vec((plane.height(), plane.width()), plane.pixels().to_f64())
            .map_err(|e| EngineError::Conversion(e.to_string()))?;
        Ok(EngineArray::new(data, plane.pixel_type()))
    }

    fn from_array(&self, array: EngineArray, pixel_type: PixelType) -> Result<Plane, EngineError> {
        self.ensure_running()?;
        let (rows, cols) = array.dim();
        let pixels = PixelBuffer::from_f64(array.data.iter().copied(), pixel_type);
        Plane::new(cols, rows, pixels)
            .ok_or_else(|| EngineError::Conversion(format!("{rows}x{cols} array lost samples")))
    }

    fn dog(&self, input: &EngineArray, bounds: &SigmaBounds) -> Result<EngineArray, EngineError> {
        self.ensure_running()?;
        let axes = active_axes(input.data());

        let (first, second) = match bounds {
            SigmaBounds::Scalar(a, b) => (vec![*a; axes.len()], vec![*b; axes.len()]),
            SigmaBounds::PerAxis(a, b) => {
                for sigmas in [a, b] {
                    if sigmas.len() != axes.len() {
                        return Err(EngineError::AxisCount {
                            expected: axes.len(),
                            found: sigmas.len(),
                        });
                    }
                }
                (a.clone(), b.clone())
            }
        };

        if let Some(bad) = first
            .iter()
            .chain(&second)
            .find(|s| !s.is_finite() || **s < 0.0)
        {
            return Err(EngineError::InvalidSigma(*bad));
        }

        let near = self.gaussian(input.data(), &axes, &first);
        let far = self.gaussian(input.data(), &axes, &second);
        Ok(EngineArray::new(&near - &far, input.pixel_type()))
    }

    fn shutdown(&mut self) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.running = false;
        Ok(())
    }
}

/// Non-singleton axes in X, Y order.
fn active_axes(data: &Array2<f64>) -> Vec<Axis> {
    [Axis(1), Axis(0)]
        .into_iter()
        .filter(|&axis| data.len_of(axis) > 1)
        .collect()
}

/// Normalized half kernel; `half[0]` is the center weight.
///
/// `None` when `sigma` is too small to blur anything. The kernel never
/// reaches further than `len` samples: mirrored taps past that only fold
/// back onto samples already covered.
fn half_kernel(sigma: f64, len: usize) -> Option<Vec<f64>> {
    let two_sigma_sq = 2.0 * sigma * sigma;
    if two_sigma_sq < f64::MIN_POSITIVE {
        return None;
    }

    let reach = 3.0 * sigma + 0.5;
    let size = if reach < len as f64 {
        (reach as usize).saturating_add(1)
    } else {
        len
    };
    let size = size.max(2).min(len.max(2));

    let mut half: Vec<f64> = (0..size)
        .map(|x| (-((x as f64) * (x as f64)) / two_sigma_sq).exp())
        .collect();

    let sum = half[0] + 2.0 * half[1..].iter().sum::<f64>();
    half.iter_mut().for_each(|w| *w /= sum);
    Some(half)
}

/// Mirror `index` into `0..len` without repeating the edge sample.
fn mirror(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }

    let period = 2 * (len as isize - 1);
    let folded = index.rem_euclid(period);
    if folded >= len as isize {
        (period - folded) as usize
    } else {
        folded as usize
    }
}

fn convolve_axis(input: &Array2<f64>, axis: Axis, half: &[f64]) -> Array2<f64> {
    let len = input.len_of(axis);
    let mut output = Array2::zeros(input.raw_dim());

    Zip::from(input.lanes(axis))
        .and(output.lanes_mut(axis))
        .for_each(|src, mut dst| {
            for i in 0..len {
                let center = i as isize;
                let mut acc = half[0] * src[i];
                for (k, w) in half.iter().enumerate().skip(1) {
                    let k = k as isize;
                    acc += w * (src[mirror(center - k, len)] + src[mirror(center + k, len)]);
                }
                dst[i] = acc;
            }
        });

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn engine() -> NativeEngine {
        NativeEngine::new()
    }

    #[test]
    fn kernel_is_normalized() {
        for sigma in [0.3, 1.0, 2.5, 7.0, 1e10] {
            let half = half_kernel(sigma, 64).unwrap();
            let sum = half[0] + 2.0 * half[1..].iter().sum::<f64>();
            assert!((sum - 1.0).abs() < 1e-12, "sigma {sigma} sums to {sum}");
        }
        assert_eq!(half_kernel(1.0, 64).unwrap().len(), 4);
        assert_eq!(half_kernel(0.1, 64).unwrap().len(), 2);
    }

    #[test]
    fn kernel_length_is_bounded_by_the_axis() {
        assert_eq!(half_kernel(5.0, 8).unwrap().len(), 8);
        assert_eq!(half_kernel(1e10, 4).unwrap().len(), 4);
        assert_eq!(half_kernel(1e19, 4).unwrap().len(), 4);
        assert_eq!(half_kernel(f64::MAX, 3).unwrap().len(), 3);
    }

    #[test]
    fn vanishing_sigma_has_no_kernel() {
        assert!(half_kernel(0.0, 10).is_none());
        assert!(half_kernel(1e-200, 10).is_none());
        assert!(half_kernel(f64::MIN_POSITIVE, 10).is_none());
        assert!(half_kernel(1e-100, 10).is_some());
    }

    #[test]
    fn tiny_sigma_acts_like_zero() {
        let engine = engine();
        let mut data = Array2::zeros((5, 5));
        data[[2, 2]] = 100.0;
        let impulse = EngineArray::new(data, PixelType::F32);

        let tiny = engine.dog(&impulse, &SigmaBounds::Scalar(1e-200, 2.0)).unwrap();
        let zero = engine.dog(&impulse, &SigmaBounds::Scalar(0.0, 2.0)).unwrap();

        assert!(tiny.data().iter().all(|v| v.is_finite()));
        assert_eq!(tiny, zero);
        assert!(tiny.data()[[2, 2]] > 0.0);
    }

    #[test]
    fn huge_sigma_flattens_instead_of_failing() {
        let engine = engine();
        let image = EngineArray::new(
            Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f64),
            PixelType::F64,
        );

        for sigma in [1e10, 1e19, f64::MAX] {
            let out = engine.dog(&image, &SigmaBounds::Scalar(1.0, sigma)).unwrap();
            assert_eq!(out.dim(), (4, 4));
            assert!(out.data().iter().all(|v| v.is_finite()), "sigma {sigma}");
        }
    }

    #[test]
    fn mirror_does_not_repeat_edges() {
        let folded: Vec<usize> = (-3..7).map(|i| mirror(i, 4)).collect();
        assert_eq!(folded, vec![3, 2, 1, 0, 1, 2, 3, 2, 1, 0]);
        assert_eq!(mirror(-5, 1), 0);
    }

    #[test]
    fn conversion_is_exact() {
        let plane = Plane::new(3, 2, PixelBuffer::U16(vec![0, 1, 65535, 7, 300, 12])).unwrap();
        let engine = engine();

        let array = engine.to_array(&plane).unwrap();
        assert_eq!(array.dim(), (2, 3));
        assert_eq!(array.data()[[0, 2]], 65535.0);
        assert_eq!(array.pixel_type(), PixelType::U16);

        let back = engine.from_array(array, PixelType::U16).unwrap();
        assert_eq!(back, plane);
    }

    #[test]
    fn dog_of_flat_image_is_zero() {
        let engine = engine();
        let flat = EngineArray::new(Array2::from_elem((6, 5), 42.0), PixelType::F64);

        let out = engine.dog(&flat, &SigmaBounds::Scalar(1.0, 3.0)).unwrap();

        assert_eq!(out.dim(), (6, 5));
        assert!(out.data().iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn dog_peaks_at_an_impulse() {
        let engine = engine();
        let mut data = Array2::zeros((9, 9));
        data[[4, 4]] = 100.0;
        let impulse = EngineArray::new(data, PixelType::F32);

        let out = engine.dog(&impulse, &SigmaBounds::Scalar(0.5, 2.0)).unwrap();
        let center = out.data()[[4, 4]];

        assert!(center > 0.0);
        assert!(out.data().iter().all(|&v| v <= center));
        assert!((out.data()[[4, 2]] - out.data()[[4, 6]]).abs() < 1e-9);
        assert_eq!(out.pixel_type(), PixelType::F32);
    }

    #[test]
    fn zero_sigma_leaves_axis_alone() {
        let engine = engine();
        let data = array![[1.0, 5.0, 2.0], [3.0, 0.0, 4.0]];
        let blurred = engine.gaussian(&data, &[Axis(1), Axis(0)], &[0.0, 0.0]);

        assert_eq!(blurred, data);
    }

    #[test]
    fn per_axis_sigmas_must_match_rank() {
        let engine = engine();
        let image = EngineArray::new(Array2::zeros((4, 4)), PixelType::U8);

        let err = engine
            .dog(&image, &SigmaBounds::PerAxis(vec![1.0], vec![2.0, 2.0]))
            .unwrap_err();
        assert!(matches!(err, EngineError::AxisCount { expected: 2, found: 1 }));

        // a single row only has an X axis
        let row = EngineArray::new(Array2::zeros((1, 4)), PixelType::U8);
        assert!(engine.dog(&row, &SigmaBounds::PerAxis(vec![1.0], vec![2.0])).is_ok());
    }

    #[test]
    fn negative_sigma_is_rejected() {
        let engine = engine();
        let image = EngineArray::new(Array2::zeros((3, 3)), PixelType::U8);

        let err = engine.dog(&image, &SigmaBounds::Scalar(-1.0, 2.0)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSigma(_)));
    }

    #[test]
    fn stopped_engine_refuses_work() {
        let mut engine = engine();
        let plane = Plane::new(1, 1, PixelBuffer::U8(vec![3])).unwrap();

        engine.shutdown().unwrap();

        assert!(matches!(engine.to_array(&plane), Err(EngineError::Stopped)));
        assert!(matches!(engine.shutdown(), Err(EngineError::Stopped)));
    }

    #[test]
    fn logger_override_silences_kernel() {
        let mut engine = engine();
        assert!(engine.logs(KERNEL_LOGGER, Level::Info));

        engine.set_logger_level(KERNEL_LOGGER, LevelFilter::Warn);

        assert!(!engine.logs(KERNEL_LOGGER, Level::Info));
        assert!(engine.logs(KERNEL_LOGGER, Level::Warn));
        assert!(engine.logs("other", Level::Debug));
    }

    #[test]
    fn launcher_honors_the_pin() {
        assert!(NativeLauncher.launch(NativeEngine::VERSION).is_ok());
        assert!(matches!(
            NativeLauncher.launch("0.9.0"),
            Err(EngineError::UnavailableVersion { .. })
        ));
    }
}

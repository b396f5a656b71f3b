// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Parameters controlling calibration.

Every parameter struct can be built in code (starting from `Default` where
that makes sense) or read from a toml or json "argument file". Missing fields
in an argument file take their default values. Parameters should be checked
with `validate` before use; the calibration functions do this themselves.
 */

mod error;

pub use error::ParamsError;

use std::{fs::File, io::Read, path::Path, str::FromStr};

use itertools::Itertools;
use log::debug;
use ndarray::prelude::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{constants::*, delay_weights::DelayWeightError};

/// The file formats an argument file may have.
#[derive(Debug, Display, EnumIter, EnumString)]
pub enum ArgFileTypes {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

/// Read an argument file, using its extension to choose its format.
fn unpack_arg_file<T: DeserializeOwned>(arg_file: &Path) -> Result<T, ParamsError> {
    debug!("Attempting to parse argument file {}", arg_file.display());

    let arg_file_type = arg_file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .and_then(|e| ArgFileTypes::from_str(&e).ok());
    let arg_file_type = match arg_file_type {
        Some(t) => t,
        None => {
            return Err(ParamsError::ArgFileExtension {
                file: arg_file.to_path_buf(),
                valid: ArgFileTypes::iter().join(", "),
            })
        }
    };

    let mut contents = String::new();
    let mut fh = File::open(arg_file)?;
    fh.read_to_string(&mut contents)?;

    match arg_file_type {
        ArgFileTypes::Toml => {
            debug!("Parsing toml file...");
            toml::from_str(&contents).map_err(|err| ParamsError::ArgFileDecode {
                format: "toml",
                file: arg_file.to_path_buf(),
                err: err.to_string(),
            })
        }
        ArgFileTypes::Json => {
            debug!("Parsing json file...");
            serde_json::from_str(&contents).map_err(|err| ParamsError::ArgFileDecode {
                format: "json",
                file: arg_file.to_path_buf(),
                err: err.to_string(),
            })
        }
    }
}

fn check_xtol(xtol: f64) -> Result<(), ParamsError> {
    if xtol > 0.0 && xtol.is_finite() {
        Ok(())
    } else {
        Err(ParamsError::BadXtol(xtol))
    }
}

/// Parameters for per-polarisation gain calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// The weight of the phase regularisation term. Must be positive.
    pub lambda_val: f64,

    /// The solution-step tolerance of the optimiser.
    pub xtol: f64,

    /// The maximum number of optimiser iterations.
    pub maxiter: usize,

    /// Resolve the relative phase of the two feed polarisations' gains using
    /// the cross-polarisation visibilities?
    pub get_crosspol_phase: bool,

    /// Calibrate frequency channels in parallel?
    pub parallel: bool,

    /// The maximum number of worker threads. If this is `None`, rayon's
    /// default is used.
    pub max_processes: Option<usize>,

    /// Draw progress bars?
    pub progress_bars: bool,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        CalibrationParams {
            lambda_val: DEFAULT_LAMBDA_VAL,
            xtol: DEFAULT_XTOL,
            maxiter: DEFAULT_MAXITER,
            get_crosspol_phase: true,
            parallel: true,
            max_processes: Some(DEFAULT_MAX_PROCESSES),
            progress_bars: false,
        }
    }
}

impl CalibrationParams {
    pub fn from_arg_file(arg_file: &Path) -> Result<CalibrationParams, ParamsError> {
        let params: CalibrationParams = unpack_arg_file(arg_file)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.lambda_val > 0.0 && self.lambda_val.is_finite()) {
            return Err(ParamsError::BadLambda(self.lambda_val));
        }
        check_xtol(self.xtol)?;
        if self.maxiter == 0 {
            return Err(ParamsError::ZeroMaxiter);
        }
        if self.max_processes == Some(0) {
            return Err(ParamsError::ZeroMaxProcesses);
        }
        Ok(())
    }
}

/// Parameters for (delay-weighted) absolute calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbscalParams {
    /// The solution-step tolerance of the optimiser.
    pub xtol: f64,

    /// The maximum number of optimiser iterations.
    pub maxiter: usize,
}

impl Default for AbscalParams {
    fn default() -> Self {
        AbscalParams {
            xtol: DEFAULT_XTOL,
            maxiter: DEFAULT_MAXITER,
        }
    }
}

impl AbscalParams {
    /// The default parameters for delay-weighted abscal.
    pub fn delay_weighted_default() -> AbscalParams {
        AbscalParams {
            xtol: DEFAULT_DW_XTOL,
            ..Default::default()
        }
    }

    pub fn from_arg_file(arg_file: &Path) -> Result<AbscalParams, ParamsError> {
        let params: AbscalParams = unpack_arg_file(arg_file)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        check_xtol(self.xtol)?;
        if self.maxiter == 0 {
            return Err(ParamsError::ZeroMaxiter);
        }
        Ok(())
    }
}

fn default_oversample_factor() -> usize {
    DEFAULT_OVERSAMPLE_FACTOR
}

/// The expected variance of visibilities as a function of baseline length and
/// delay, used to build delay weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayWeightParams {
    /// Shape `(Nbins, Ndelays)`.
    pub delay_spectrum_variance: Array2<f64>,

    /// The edges of the baseline-length bins \[metres\]. There is one more
    /// edge than there are bins.
    pub bl_length_bin_edges: Vec<f64>,

    /// The delays of `delay_spectrum_variance` \[seconds\]. Must be
    /// ascending.
    pub delay_axis: Vec<f64>,

    /// The factor by which the delay axis is oversampled before transforming.
    #[serde(default = "default_oversample_factor")]
    pub oversample_factor: usize,
}

impl DelayWeightParams {
    /// Create new [`DelayWeightParams`] with the default oversample factor.
    pub fn new(
        delay_spectrum_variance: Array2<f64>,
        bl_length_bin_edges: Vec<f64>,
        delay_axis: Vec<f64>,
    ) -> DelayWeightParams {
        DelayWeightParams {
            delay_spectrum_variance,
            bl_length_bin_edges,
            delay_axis,
            oversample_factor: DEFAULT_OVERSAMPLE_FACTOR,
        }
    }

    pub fn from_arg_file(arg_file: &Path) -> Result<DelayWeightParams, ParamsError> {
        let params: DelayWeightParams = unpack_arg_file(arg_file)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), DelayWeightError> {
        let (num_bins, num_delays) = self.delay_spectrum_variance.dim();
        if self.bl_length_bin_edges.len() != num_bins + 1 {
            return Err(DelayWeightError::BinCountMismatch {
                got: num_bins,
                edges: self.bl_length_bin_edges.len(),
            });
        }
        if self.delay_axis.is_empty() {
            return Err(DelayWeightError::EmptyDelayAxis);
        }
        if num_delays != self.delay_axis.len() {
            return Err(DelayWeightError::DelayCountMismatch {
                got: num_delays,
                expected: self.delay_axis.len(),
            });
        }
        if !is_ascending(&self.delay_axis) {
            return Err(DelayWeightError::UnsortedDelayAxis);
        }
        if !is_ascending(&self.bl_length_bin_edges) {
            return Err(DelayWeightError::UnsortedBinEdges);
        }
        if let Some(((bin, delay), &value)) = self
            .delay_spectrum_variance
            .indexed_iter()
            .find(|(_, &v)| !(v > 0.0 && v.is_finite()))
        {
            return Err(DelayWeightError::BadVariance { bin, delay, value });
        }
        if self.oversample_factor == 0 {
            return Err(DelayWeightError::ZeroOversampleFactor);
        }
        Ok(())
    }
}

fn is_ascending(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}

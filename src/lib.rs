// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Per-antenna gain and absolute calibration of radio interferometer
visibilities.

Gains are found by fitting data visibilities to model visibilities with a
weighted, phase-regularised least-squares cost function minimised with a
Newton-CG optimiser. Absolute calibration ("abscal") fits an overall amplitude
and a phase gradient across the array, optionally weighting residuals across
frequency with a delay-space inverse covariance ("dwcal").

Reading and writing visibility and calibration file formats is left to the
caller; everything here works on the in-memory [`CalData`] structure.
 */

pub mod apply;
pub mod calibrate;
pub mod constants;
pub mod context;
pub mod cost;
pub mod delay_weights;
mod error;
pub(crate) mod math;
pub mod optimise;
pub mod params;
pub mod solutions;

#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex64;

// Re-exports.
pub use apply::{apply_abscal, apply_abscal_inplace, AbscalApplyError, Visibilities};
pub use calibrate::{
    absolute_calibration, calibrate_per_pol, dw_absolute_calibration, CalibrateError,
    CalibrationReport, SolveReport, SolveStatus,
};
pub use context::{Antenna, ArrayMetadata, BaselineMap, CalData, ContextError, FeedPol, VisPol};
pub use delay_weights::{get_dwcal_weights_from_delay_spectra, DelayWeightError};
pub use error::DwcalError;
pub use params::{AbscalParams, CalibrationParams, DelayWeightParams, ParamsError};
pub use solutions::GainSolutions;

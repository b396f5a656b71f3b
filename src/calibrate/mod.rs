// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Top-level calibration routines.

Gain calibration is split into one sub-problem per feed polarisation and
frequency; each is solved independently (optionally in parallel) and the
relative phase of the X and Y gains is then fixed with the cross-polarisation
visibilities. Absolute calibration is solved per feed polarisation and
frequency, or per feed polarisation across all frequencies when delay
weighting is used.

Failing to converge, or having nothing to calibrate, isn't an error. Every
sub-problem's outcome is logged and returned in a [`CalibrationReport`].
 */

mod driver;
mod error;
mod scheduler;

pub use error::CalibrateError;

use std::sync::Arc;

use log::{debug, info, warn};
use ndarray::prelude::*;

use crate::{
    context::{CalData, ContextError, FeedPol, VisPol},
    cost::set_crosspol_phase,
    delay_weights::get_dwcal_weights_from_delay_spectra,
    math::cexp,
    optimise::OptimiseResult,
    params::{AbscalParams, CalibrationParams, DelayWeightParams},
};
use driver::{solve_abscal, solve_dw_abscal, solve_gains};
use scheduler::{make_thread_pool, run_per_frequency};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Converged,

    /// The optimiser stopped early; the parameters it had are used anyway.
    NotConverged,

    /// Every visibility was flagged, so nothing was solved and the
    /// parameters are NaN.
    AllFlagged,
}

/// The outcome of solving one calibration sub-problem.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub feed_pol: FeedPol,

    /// `None` when all frequencies were solved together.
    pub freq_index: Option<usize>,

    pub status: SolveStatus,

    /// The optimiser's termination message.
    pub message: String,

    pub num_iterations: usize,

    pub initial_cost: f64,

    pub final_cost: f64,

    /// The number of antennas left out because all of their visibilities
    /// were flagged.
    pub num_pruned_antennas: usize,
}

impl SolveReport {
    fn all_flagged(feed_pol: FeedPol, freq_index: Option<usize>) -> SolveReport {
        SolveReport {
            feed_pol,
            freq_index,
            status: SolveStatus::AllFlagged,
            message: "All data flagged".to_string(),
            num_iterations: 0,
            initial_cost: f64::NAN,
            final_cost: f64::NAN,
            num_pruned_antennas: 0,
        }
    }

    fn from_result(
        feed_pol: FeedPol,
        freq_index: Option<usize>,
        initial_cost: f64,
        result: &OptimiseResult,
        num_pruned_antennas: usize,
    ) -> SolveReport {
        SolveReport {
            feed_pol,
            freq_index,
            status: if result.converged() {
                SolveStatus::Converged
            } else {
                SolveStatus::NotConverged
            },
            message: result.message().to_string(),
            num_iterations: result.num_iterations,
            initial_cost,
            final_cost: result.cost,
            num_pruned_antennas,
        }
    }

    fn label(&self) -> String {
        match self.freq_index {
            Some(i_freq) => format!("Feed {}, frequency {i_freq}", self.feed_pol),
            None => format!("Feed {}", self.feed_pol),
        }
    }

    fn log(&self) {
        let label = self.label();
        match self.status {
            SolveStatus::Converged => debug!(
                "{label}: {} ({} iterations, cost {:e} -> {:e})",
                self.message, self.num_iterations, self.initial_cost, self.final_cost
            ),
            SolveStatus::NotConverged => warn!(
                "{label}: {} ({} iterations, cost {:e} -> {:e})",
                self.message, self.num_iterations, self.initial_cost, self.final_cost
            ),
            SolveStatus::AllFlagged => warn!("{label}: all data flagged; skipping"),
        }
        if self.num_pruned_antennas > 0 {
            debug!(
                "{label}: {} fully-flagged antennas were left out",
                self.num_pruned_antennas
            );
        }
    }

    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

/// Everything that happened during a top-level calibration call.
#[derive(Debug, Clone, Default)]
pub struct CalibrationReport {
    /// One report per sub-problem, ordered by feed polarisation then
    /// frequency.
    pub solves: Vec<SolveReport>,

    /// The crosspol phase applied at each frequency \[radians\], if it was
    /// resolved.
    pub crosspol_phases: Option<Vec<f64>>,
}

impl CalibrationReport {
    /// The sub-problems where the optimiser didn't converge.
    pub fn not_converged(&self) -> impl Iterator<Item = &SolveReport> {
        self.solves
            .iter()
            .filter(|r| r.status == SolveStatus::NotConverged)
    }

    /// Did every sub-problem that was attempted converge?
    pub fn all_converged(&self) -> bool {
        self.not_converged().next().is_none()
    }
}

/// Calibrate the per-antenna gains of `cal_data` for each feed polarisation
/// and frequency, writing them into `cal_data.gains`. The current gains are
/// the starting point; non-finite ones are flagged first (see
/// [`CalData::flag_nan_gains`]).
///
/// If `params.get_crosspol_phase` is set and there are two feed
/// polarisations and four visibility polarisations, the relative phase of
/// the two feeds' gains is then resolved.
pub fn calibrate_per_pol(
    cal_data: &mut CalData,
    params: &CalibrationParams,
) -> Result<CalibrationReport, CalibrateError> {
    params.validate()?;
    info!(
        "Calibrating gains of {} antennas over {} frequencies and {} feed polarisations",
        cal_data.num_antennas(),
        cal_data.num_freqs(),
        cal_data.num_feed_pols()
    );

    cal_data.flag_nan_gains();
    let pool = make_thread_pool(params, cal_data.num_freqs())?;
    let mut report = CalibrationReport::default();
    for (i_feed, pol_data) in cal_data.expand_in_polarisation()?.into_iter().enumerate() {
        let feed_pol = pol_data.feed_pols[0];
        let baselines = &pol_data.metadata.baselines;
        let results = run_per_frequency(
            pol_data.expand_in_frequency(),
            pool.as_ref(),
            params.progress_bars,
            format!("Calibrating {feed_pol} gains"),
            |i_freq, freq_data| {
                solve_gains(
                    freq_data.gains.slice(s![.., 0, 0]),
                    freq_data.model_visibilities.slice(s![.., .., 0, 0]),
                    freq_data.data_visibilities.slice(s![.., .., 0, 0]),
                    freq_data.visibility_weights.slice(s![.., .., 0, 0]),
                    baselines,
                    params,
                    feed_pol,
                    i_freq,
                )
            },
        );
        for (i_freq, (gains, solve_report)) in results.into_iter().enumerate() {
            cal_data
                .gains
                .slice_mut(s![.., i_freq, i_feed])
                .assign(&gains);
            report.solves.push(solve_report);
        }
    }

    if params.get_crosspol_phase {
        report.crosspol_phases = resolve_crosspol_phases(cal_data);
    }
    if !report.all_converged() {
        warn!(
            "{} of {} gain solves didn't converge",
            report.not_converged().count(),
            report.solves.len()
        );
    }

    Ok(report)
}

/// Rotate the X and Y gains of each frequency by opposite halves of the
/// phase that best aligns the predicted cross-polarisation visibilities with
/// the data. Returns the phases, or `None` if the visibilities to do this
/// aren't available.
fn resolve_crosspol_phases(cal_data: &mut CalData) -> Option<Vec<f64>> {
    if cal_data.num_feed_pols() != 2 || cal_data.num_vis_pols() != 4 {
        debug!("Not resolving the crosspol phase; it needs 2 feed and 4 visibility polarisations");
        return None;
    }
    let (feed0, feed1) = (cal_data.feed_pols[0], cal_data.feed_pols[1]);
    let (i_01, i_10) = match (
        cal_data.vis_pol_index(VisPol::from_feeds(feed0, feed1)),
        cal_data.vis_pol_index(VisPol::from_feeds(feed1, feed0)),
    ) {
        (Some(i_01), Some(i_10)) => (i_01, i_10),
        _ => {
            warn!("Not resolving the crosspol phase; cross-polarisation visibilities are missing");
            return None;
        }
    };

    let metadata = Arc::clone(&cal_data.metadata);
    let crosspol = [i_01, i_10];
    let phases: Vec<f64> = (0..cal_data.num_freqs())
        .map(|i_freq| {
            let model = cal_data
                .model_visibilities
                .slice(s![.., .., i_freq, ..])
                .select(Axis(2), &crosspol);
            let data = cal_data
                .data_visibilities
                .slice(s![.., .., i_freq, ..])
                .select(Axis(2), &crosspol);
            let weights = cal_data
                .visibility_weights
                .slice(s![.., .., i_freq, ..])
                .select(Axis(2), &crosspol);
            let psi = set_crosspol_phase(
                cal_data.gains.slice(s![.., i_freq, ..]),
                model.view(),
                data.view(),
                weights.view(),
                &metadata.baselines,
            );

            let rotations = [cexp(-psi / 2.0), cexp(psi / 2.0)];
            for (mut gains, rotation) in cal_data
                .gains
                .slice_mut(s![.., i_freq, ..])
                .axis_iter_mut(Axis(1))
                .zip(rotations)
            {
                gains.mapv_inplace(|g| g * rotation);
            }
            psi
        })
        .collect();
    debug!("Crosspol phases: {phases:?}");
    Some(phases)
}

/// Solve for the abscal parameters of `cal_data` for each feed polarisation
/// and frequency, writing them into `cal_data.abscal_params`. Only the
/// visibility polarisation correlating each feed with itself is used. The
/// current parameters are the starting point.
pub fn absolute_calibration(
    cal_data: &mut CalData,
    params: &AbscalParams,
) -> Result<CalibrationReport, CalibrateError> {
    params.validate()?;
    info!(
        "Running abscal over {} frequencies and {} feed polarisations",
        cal_data.num_freqs(),
        cal_data.num_feed_pols()
    );

    let metadata = Arc::clone(&cal_data.metadata);
    let mut report = CalibrationReport::default();
    for (i_feed, feed_pol) in cal_data.feed_pols.clone().into_iter().enumerate() {
        let i_vis = auto_vis_pol_index(cal_data, feed_pol)?;
        for i_freq in 0..cal_data.num_freqs() {
            let (solution, solve_report) = solve_abscal(
                cal_data.abscal_params.slice(s![.., i_freq, i_feed]),
                cal_data
                    .model_visibilities
                    .slice(s![.., .., i_freq, i_vis]),
                cal_data.data_visibilities.slice(s![.., .., i_freq, i_vis]),
                metadata.uv.view(),
                cal_data
                    .visibility_weights
                    .slice(s![.., .., i_freq, i_vis]),
                params,
                feed_pol,
                i_freq,
            );
            cal_data
                .abscal_params
                .slice_mut(s![.., i_freq, i_feed])
                .assign(&solution);
            report.solves.push(solve_report);
        }
    }

    Ok(report)
}

/// Solve for the abscal parameters of `cal_data` for each feed polarisation,
/// jointly across all frequencies, weighting residuals with the delay
/// weights in `cal_data.dwcal_inv_covariance`. If those aren't set, they're
/// first built from `delay_weight_params`.
pub fn dw_absolute_calibration(
    cal_data: &mut CalData,
    delay_weight_params: Option<&DelayWeightParams>,
    params: &AbscalParams,
) -> Result<CalibrationReport, CalibrateError> {
    params.validate()?;
    if cal_data.dwcal_inv_covariance.is_none() {
        let delay_weight_params =
            delay_weight_params.ok_or(CalibrateError::MissingDelayWeights)?;
        get_dwcal_weights_from_delay_spectra(cal_data, delay_weight_params)?;
    }
    let inv_covariance = match cal_data.dwcal_inv_covariance.as_ref() {
        Some(c) => c,
        None => return Err(CalibrateError::MissingDelayWeights),
    };
    let expected = vec![
        cal_data.num_times(),
        cal_data.num_baselines(),
        cal_data.num_freqs(),
        cal_data.num_freqs(),
        cal_data.num_vis_pols(),
    ];
    if inv_covariance.shape() != expected.as_slice() {
        return Err(CalibrateError::DelayWeightShape {
            expected,
            got: inv_covariance.shape().to_vec(),
        });
    }
    info!(
        "Running delay-weighted abscal over {} frequencies and {} feed polarisations",
        cal_data.num_freqs(),
        cal_data.num_feed_pols()
    );

    let mut report = CalibrationReport::default();
    let mut solutions = Vec::with_capacity(cal_data.num_feed_pols());
    for (i_feed, &feed_pol) in cal_data.feed_pols.iter().enumerate() {
        let i_vis = auto_vis_pol_index(cal_data, feed_pol)?;
        let (solution, solve_report) = solve_dw_abscal(
            cal_data.abscal_params.slice(s![.., .., i_feed]),
            cal_data.model_visibilities.slice(s![.., .., .., i_vis]),
            cal_data.data_visibilities.slice(s![.., .., .., i_vis]),
            cal_data.metadata.uv.view(),
            cal_data.visibility_weights.slice(s![.., .., .., i_vis]),
            inv_covariance.slice(s![.., .., .., .., i_vis]),
            params,
            feed_pol,
        );
        solutions.push(solution);
        report.solves.push(solve_report);
    }
    for (i_feed, solution) in solutions.into_iter().enumerate() {
        cal_data
            .abscal_params
            .slice_mut(s![.., .., i_feed])
            .assign(&solution);
    }

    Ok(report)
}

fn auto_vis_pol_index(cal_data: &CalData, feed: FeedPol) -> Result<usize, ContextError> {
    let vis_pol = feed.auto_vis_pol();
    cal_data
        .vis_pol_index(vis_pol)
        .ok_or(ContextError::MissingVisPol { feed, vis_pol })
}

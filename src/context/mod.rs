// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The in-memory representation of a calibration problem.

Readers of visibility file formats are expected to populate a [`CalData`];
nothing in this crate touches a file. Antenna and baseline metadata are
read-only during calibration, so they live behind an [`Arc`] and are shared
(never copied) when a [`CalData`] is split per frequency or per polarisation.
 */

mod error;
mod polarisations;
#[cfg(test)]
mod tests;

pub use error::ContextError;
pub use polarisations::{default_feed_polarisations, FeedPol, VisPol};

use std::sync::Arc;

use itertools::izip;
use log::{debug, warn};
use ndarray::prelude::*;

use crate::{c64, constants::NUM_ABSCAL_PARAMS, math::nan_median};

/// An antenna of the array.
#[derive(Debug, Clone, PartialEq)]
pub struct Antenna {
    pub name: String,

    pub number: u32,

    /// The position of the antenna in local East, North, Up coordinates
    /// \[metres\].
    pub position: [f64; 3],
}

/// Maps each baseline to its first and second antenna. This is equivalent to
/// a pair of one-hot "gains expand" matrices with shape `(Nbls, Nants)`, but
/// only the column of each row's 1 is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineMap {
    ant_1: Vec<usize>,
    ant_2: Vec<usize>,
    num_ants: usize,
}

impl BaselineMap {
    /// Create a new [`BaselineMap`] from the first and second antenna indices
    /// of each baseline. Autocorrelations aren't allowed.
    pub fn new(
        ant_1: Vec<usize>,
        ant_2: Vec<usize>,
        num_ants: usize,
    ) -> Result<BaselineMap, ContextError> {
        if ant_1.len() != ant_2.len() {
            return Err(ContextError::BaselineLengthMismatch {
                ant_1: ant_1.len(),
                ant_2: ant_2.len(),
            });
        }
        for (baseline, (&a1, &a2)) in ant_1.iter().zip(ant_2.iter()).enumerate() {
            for antenna in [a1, a2] {
                if antenna >= num_ants {
                    return Err(ContextError::AntennaOutOfRange {
                        baseline,
                        antenna,
                        num_ants,
                    });
                }
            }
            if a1 == a2 {
                return Err(ContextError::Autocorrelation {
                    baseline,
                    antenna: a1,
                });
            }
        }

        Ok(BaselineMap {
            ant_1,
            ant_2,
            num_ants,
        })
    }

    /// All cross-correlation baselines of `num_ants` antennas, ordered (0, 1),
    /// (0, 2), ..., (1, 2), ...
    pub fn all_cross_baselines(num_ants: usize) -> BaselineMap {
        let num_baselines = num_ants * num_ants.saturating_sub(1) / 2;
        let mut ant_1 = Vec::with_capacity(num_baselines);
        let mut ant_2 = Vec::with_capacity(num_baselines);
        for i in 0..num_ants {
            for j in i + 1..num_ants {
                ant_1.push(i);
                ant_2.push(j);
            }
        }
        BaselineMap {
            ant_1,
            ant_2,
            num_ants,
        }
    }

    /// Create a new [`BaselineMap`] from one-hot incidence matrices, each with
    /// shape `(Nbls, Nants)`. Every row of each matrix must have exactly one
    /// non-zero entry.
    pub fn from_incidence_matrices(
        gains_exp_mat_1: ArrayView2<u8>,
        gains_exp_mat_2: ArrayView2<u8>,
    ) -> Result<BaselineMap, ContextError> {
        if gains_exp_mat_1.dim() != gains_exp_mat_2.dim() {
            return Err(ContextError::ShapeMismatch {
                what: "gains_exp_mat_2",
                expected: gains_exp_mat_1.shape().to_vec(),
                got: gains_exp_mat_2.shape().to_vec(),
            });
        }
        let num_ants = gains_exp_mat_1.len_of(Axis(1));

        let one_hot = |mat: ArrayView2<u8>, matrix: u8| -> Result<Vec<usize>, ContextError> {
            mat.outer_iter()
                .enumerate()
                .map(|(baseline, row)| {
                    let marked: Vec<usize> = row
                        .iter()
                        .enumerate()
                        .filter(|(_, &v)| v != 0)
                        .map(|(i, _)| i)
                        .collect();
                    match marked.as_slice() {
                        [antenna] => Ok(*antenna),
                        _ => Err(ContextError::BadIncidenceRow {
                            baseline,
                            matrix,
                            count: marked.len(),
                        }),
                    }
                })
                .collect()
        };

        let ant_1 = one_hot(gains_exp_mat_1, 1)?;
        let ant_2 = one_hot(gains_exp_mat_2, 2)?;
        BaselineMap::new(ant_1, ant_2, num_ants)
    }

    /// The one-hot incidence matrix of the first antenna of each baseline.
    /// Shape `(Nbls, Nants)`.
    pub fn gains_exp_mat_1(&self) -> Array2<u8> {
        Self::incidence(&self.ant_1, self.num_ants)
    }

    /// The one-hot incidence matrix of the second antenna of each baseline.
    /// Shape `(Nbls, Nants)`.
    pub fn gains_exp_mat_2(&self) -> Array2<u8> {
        Self::incidence(&self.ant_2, self.num_ants)
    }

    fn incidence(ants: &[usize], num_ants: usize) -> Array2<u8> {
        let mut mat = Array2::zeros((ants.len(), num_ants));
        for (mut row, &ant) in mat.outer_iter_mut().zip(ants) {
            row[ant] = 1;
        }
        mat
    }

    pub fn ant_1(&self) -> &[usize] {
        &self.ant_1
    }

    pub fn ant_2(&self) -> &[usize] {
        &self.ant_2
    }

    pub fn num_baselines(&self) -> usize {
        self.ant_1.len()
    }

    pub fn num_antennas(&self) -> usize {
        self.num_ants
    }

    /// Iterate over the (first, second) antenna indices of each baseline.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.ant_1.iter().copied().zip(self.ant_2.iter().copied())
    }

    /// The total weight of every antenna's baselines. `weights` has shape
    /// `(Ntimes, Nbls)`.
    pub fn antenna_weights(&self, weights: ArrayView2<f64>) -> Vec<f64> {
        let mut ant_weights = vec![0.0; self.num_ants];
        for weights_t in weights.outer_iter() {
            for (&w, (a1, a2)) in weights_t.iter().zip(self.iter()) {
                ant_weights[a1] += w;
                ant_weights[a2] += w;
            }
        }
        ant_weights
    }

    /// Restrict the map to the antennas marked in `keep`, which must have
    /// one entry per antenna. Kept antennas are renumbered in order. Also
    /// returns the indices of the baselines that survive, i.e. those with
    /// both antennas kept.
    pub fn subset(&self, keep: &[bool]) -> (BaselineMap, Vec<usize>) {
        let mut new_index = vec![None; self.num_ants];
        let mut num_ants = 0;
        for (new, &k) in new_index.iter_mut().zip(keep) {
            if k {
                *new = Some(num_ants);
                num_ants += 1;
            }
        }

        let mut ant_1 = vec![];
        let mut ant_2 = vec![];
        let mut kept_baselines = vec![];
        for (i_bl, (a1, a2)) in self.iter().enumerate() {
            if let (Some(a1), Some(a2)) = (new_index[a1], new_index[a2]) {
                ant_1.push(a1);
                ant_2.push(a2);
                kept_baselines.push(i_bl);
            }
        }

        (
            BaselineMap {
                ant_1,
                ant_2,
                num_ants,
            },
            kept_baselines,
        )
    }
}

/// Metadata on the array that doesn't change during calibration.
#[derive(Debug, Clone)]
pub struct ArrayMetadata {
    pub antennas: Vec<Antenna>,

    pub baselines: BaselineMap,

    /// The positions of the baselines in the UV plane \[metres\]. This is the
    /// first antenna's East-North position minus the second's. Shape
    /// `(Nbls, 2)`.
    pub uv: Array2<f64>,

    /// The width of each frequency channel \[Hz\].
    pub channel_width: f64,
}

impl ArrayMetadata {
    /// Create new [`ArrayMetadata`]. The UV positions of the baselines are
    /// derived from the antenna positions.
    pub fn new(
        antennas: Vec<Antenna>,
        baselines: BaselineMap,
        channel_width: f64,
    ) -> Result<ArrayMetadata, ContextError> {
        if baselines.num_antennas() != antennas.len() {
            return Err(ContextError::ShapeMismatch {
                what: "antennas",
                expected: vec![baselines.num_antennas()],
                got: vec![antennas.len()],
            });
        }
        let mut uv = Array2::zeros((baselines.num_baselines(), 2));
        for (mut uv, (a1, a2)) in uv.outer_iter_mut().zip(baselines.iter()) {
            let p1 = antennas[a1].position;
            let p2 = antennas[a2].position;
            uv[0] = p1[0] - p2[0];
            uv[1] = p1[1] - p2[1];
        }

        Ok(ArrayMetadata {
            antennas,
            baselines,
            uv,
            channel_width,
        })
    }

    pub fn num_antennas(&self) -> usize {
        self.antennas.len()
    }

    pub fn num_baselines(&self) -> usize {
        self.baselines.num_baselines()
    }

    /// The length of each baseline projected onto the UV plane \[metres\].
    pub fn baseline_lengths(&self) -> Vec<f64> {
        self.uv
            .outer_iter()
            .map(|uv| uv[0].hypot(uv[1]))
            .collect()
    }
}

/// Everything needed to calibrate.
///
/// Visibility-shaped arrays are `(Ntimes, Nbls, Nfreqs, N_vis_pols)`, the
/// gains are `(Nants, Nfreqs, N_feed_pols)` and the abscal parameters are
/// `(3, Nfreqs, N_feed_pols)`. The predicted visibility on baseline (i, j) is
/// `gains[i] * conj(gains[j]) * model`.
#[derive(Debug, Clone)]
pub struct CalData {
    pub metadata: Arc<ArrayMetadata>,

    /// The centre frequency of each channel \[Hz\].
    pub freq_array: Vec<f64>,

    /// The ordering of the polarisation axis of the gains and abscal
    /// parameters.
    pub feed_pols: Vec<FeedPol>,

    /// The ordering of the polarisation axis of the visibilities and weights.
    pub vis_pols: Vec<VisPol>,

    pub model_visibilities: Array4<c64>,

    pub data_visibilities: Array4<c64>,

    /// Non-negative weights of each visibility. A weight of 0 flags the
    /// visibility.
    pub visibility_weights: Array4<f64>,

    /// Complex gains. NaN gains indicate antennas that couldn't be calibrated.
    pub gains: Array3<c64>,

    /// `abscal_params[0, ..]` are the overall amplitudes,
    /// `abscal_params[1, ..]` are the x-phase gradients and
    /// `abscal_params[2, ..]` are the y-phase gradients \[radians/metre\].
    pub abscal_params: Array3<f64>,

    /// Frequency-frequency inverse covariances used by delay-weighted abscal.
    /// Shape `(Ntimes, Nbls, Nfreqs, Nfreqs, N_vis_pols)`.
    pub dwcal_inv_covariance: Option<Array5<c64>>,
}

impl CalData {
    /// Create a new [`CalData`]. If `feed_pols` is `None`, they're derived
    /// from the visibility polarisations with
    /// [`default_feed_polarisations`]. Gains are initialised to 1 and abscal
    /// parameters to an amplitude of 1 with no phase gradients.
    pub fn new(
        metadata: Arc<ArrayMetadata>,
        freq_array: Vec<f64>,
        vis_pols: Vec<VisPol>,
        feed_pols: Option<Vec<FeedPol>>,
        model_visibilities: Array4<c64>,
        data_visibilities: Array4<c64>,
        visibility_weights: Array4<f64>,
    ) -> Result<CalData, ContextError> {
        let num_times = model_visibilities.len_of(Axis(0));
        let expected = vec![
            num_times,
            metadata.num_baselines(),
            freq_array.len(),
            vis_pols.len(),
        ];
        for (what, shape) in [
            ("model_visibilities", model_visibilities.shape()),
            ("data_visibilities", data_visibilities.shape()),
            ("visibility_weights", visibility_weights.shape()),
        ] {
            if shape != expected.as_slice() {
                return Err(ContextError::ShapeMismatch {
                    what,
                    expected: expected.clone(),
                    got: shape.to_vec(),
                });
            }
        }

        let feed_pols = feed_pols.unwrap_or_else(|| default_feed_polarisations(&vis_pols, None));
        if feed_pols.is_empty() {
            return Err(ContextError::NoFeedPols);
        }

        let num_ants = metadata.num_antennas();
        let num_freqs = freq_array.len();
        let gains = Array3::from_elem((num_ants, num_freqs, feed_pols.len()), c64::new(1.0, 0.0));
        let mut abscal_params = Array3::zeros((NUM_ABSCAL_PARAMS, num_freqs, feed_pols.len()));
        abscal_params.slice_mut(s![0, .., ..]).fill(1.0);

        Ok(CalData {
            metadata,
            freq_array,
            feed_pols,
            vis_pols,
            model_visibilities,
            data_visibilities,
            visibility_weights,
            gains,
            abscal_params,
            dwcal_inv_covariance: None,
        })
    }

    pub fn num_antennas(&self) -> usize {
        self.metadata.num_antennas()
    }

    pub fn num_baselines(&self) -> usize {
        self.metadata.num_baselines()
    }

    pub fn num_times(&self) -> usize {
        self.visibility_weights.len_of(Axis(0))
    }

    pub fn num_freqs(&self) -> usize {
        self.freq_array.len()
    }

    pub fn num_feed_pols(&self) -> usize {
        self.feed_pols.len()
    }

    pub fn num_vis_pols(&self) -> usize {
        self.vis_pols.len()
    }

    /// The index of a visibility polarisation on the visibility arrays.
    pub fn vis_pol_index(&self, vis_pol: VisPol) -> Option<usize> {
        self.vis_pols.iter().position(|&vp| vp == vis_pol)
    }

    /// Are all of the visibilities flagged (i.e. all weights zero)?
    pub fn all_flagged(&self) -> bool {
        !self.visibility_weights.iter().any(|&w| w > 0.0)
    }

    /// Split this [`CalData`] into one [`CalData`] per frequency channel. The
    /// array metadata is shared.
    pub fn expand_in_frequency(&self) -> Vec<CalData> {
        (0..self.num_freqs())
            .map(|i_freq| {
                let f = i_freq..i_freq + 1;
                CalData {
                    metadata: Arc::clone(&self.metadata),
                    freq_array: vec![self.freq_array[i_freq]],
                    feed_pols: self.feed_pols.clone(),
                    vis_pols: self.vis_pols.clone(),
                    model_visibilities: self
                        .model_visibilities
                        .slice(s![.., .., f.clone(), ..])
                        .to_owned(),
                    data_visibilities: self
                        .data_visibilities
                        .slice(s![.., .., f.clone(), ..])
                        .to_owned(),
                    visibility_weights: self
                        .visibility_weights
                        .slice(s![.., .., f.clone(), ..])
                        .to_owned(),
                    gains: self.gains.slice(s![.., f.clone(), ..]).to_owned(),
                    abscal_params: self.abscal_params.slice(s![.., f.clone(), ..]).to_owned(),
                    dwcal_inv_covariance: self
                        .dwcal_inv_covariance
                        .as_ref()
                        .map(|c| c.slice(s![.., .., f.clone(), f.clone(), ..]).to_owned()),
                }
            })
            .collect()
    }

    /// Split this [`CalData`] into one [`CalData`] per feed polarisation. Each
    /// only contains the visibility polarisation correlating the feed with
    /// itself (e.g. XX for X); cross-polarisation visibilities are dropped.
    pub fn expand_in_polarisation(&self) -> Result<Vec<CalData>, ContextError> {
        self.feed_pols
            .iter()
            .enumerate()
            .map(|(i_feed, &feed)| {
                let vis_pol = feed.auto_vis_pol();
                let i_vis = self
                    .vis_pol_index(vis_pol)
                    .ok_or(ContextError::MissingVisPol { feed, vis_pol })?;
                let v = i_vis..i_vis + 1;
                let p = i_feed..i_feed + 1;
                Ok(CalData {
                    metadata: Arc::clone(&self.metadata),
                    freq_array: self.freq_array.clone(),
                    feed_pols: vec![feed],
                    vis_pols: vec![vis_pol],
                    model_visibilities: self
                        .model_visibilities
                        .slice(s![.., .., .., v.clone()])
                        .to_owned(),
                    data_visibilities: self
                        .data_visibilities
                        .slice(s![.., .., .., v.clone()])
                        .to_owned(),
                    visibility_weights: self
                        .visibility_weights
                        .slice(s![.., .., .., v.clone()])
                        .to_owned(),
                    gains: self.gains.slice(s![.., .., p.clone()]).to_owned(),
                    abscal_params: self.abscal_params.slice(s![.., .., p]).to_owned(),
                    dwcal_inv_covariance: self
                        .dwcal_inv_covariance
                        .as_ref()
                        .map(|c| c.slice(s![.., .., .., .., v.clone()]).to_owned()),
                })
            })
            .collect()
    }

    /// The total weight of every antenna's baselines for a single frequency
    /// and visibility polarisation, summed over time.
    pub fn antenna_weights(&self, i_freq: usize, i_vis_pol: usize) -> Vec<f64> {
        self.metadata
            .baselines
            .antenna_weights(self.visibility_weights.slice(s![.., .., i_freq, i_vis_pol]))
    }

    /// Set all gains to the square root of the median ratio between the data
    /// and model visibility amplitudes. Flagged visibilities and those with
    /// zero-valued data or model are ignored. If there's nothing to take a
    /// median of, the gains are left alone.
    pub fn init_gains_from_vis_ratio(&mut self) {
        let ratios = izip!(
            self.data_visibilities.iter(),
            self.model_visibilities.iter(),
            self.visibility_weights.iter()
        )
        .filter(|(d, m, &w)| w > 0.0 && d.norm_sqr() > 0.0 && m.norm_sqr() > 0.0)
        .map(|(d, m, _)| d.norm() / m.norm());
        let median = nan_median(ratios);
        if median.is_finite() {
            debug!("Initialising gains to sqrt({median})");
            self.gains.fill(c64::new(median.sqrt(), 0.0));
        } else {
            warn!("Couldn't initialise gains from the visibility amplitude ratio; leaving them as-is");
        }
    }

    /// Non-finite gains can't be used as starting points. For every
    /// non-finite gain, flag all visibilities involving that antenna, feed
    /// and frequency, then set the gain to zero.
    pub fn flag_nan_gains(&mut self) {
        let baselines = &self.metadata.baselines;
        for (i_feed, &feed) in self.feed_pols.iter().enumerate() {
            let flag_pols: Vec<usize> = self
                .vis_pols
                .iter()
                .enumerate()
                .filter(|(_, vp)| vp.involves(feed))
                .map(|(i, _)| i)
                .collect();
            for i_ant in 0..self.gains.len_of(Axis(0)) {
                for i_freq in 0..self.gains.len_of(Axis(1)) {
                    let gain = &mut self.gains[(i_ant, i_freq, i_feed)];
                    if gain.is_finite() {
                        continue;
                    }
                    *gain = c64::default();
                    for (i_bl, (a1, a2)) in baselines.iter().enumerate() {
                        if a1 != i_ant && a2 != i_ant {
                            continue;
                        }
                        for &i_vis in &flag_pols {
                            self.visibility_weights
                                .slice_mut(s![.., i_bl, i_freq, i_vis])
                                .fill(0.0);
                        }
                    }
                }
            }
        }
    }
}

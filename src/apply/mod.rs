// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Applying abscal solutions to visibilities.

Each visibility on baseline (1, 2) with visibility polarisation (p1, p2) is
multiplied by `a[p1] a[p2] exp(i (φx[p1] x1 - φx[p2] x2 + φy[p1] y1 - φy[p2] y2))`,
where (x, y) are the East and North positions of the antennas and
(a, φx, φy) are the abscal parameters of the channel.
 */

mod error;

pub use error::AbscalApplyError;

use log::debug;
use ndarray::prelude::*;
use rayon::prelude::*;

use crate::{
    c64,
    context::{FeedPol, VisPol},
    math::cexp,
};

/// A cube of visibilities that abscal solutions can be applied to.
#[derive(Debug, Clone)]
pub struct Visibilities {
    /// Shape `(Nblts, Nfreqs, N_vis_pols)`.
    pub data: Array3<c64>,

    /// The first antenna of each baseline-time.
    pub ant_1: Vec<usize>,

    /// The second antenna of each baseline-time. This may be the same as the
    /// first, as autocorrelations are corrected too.
    pub ant_2: Vec<usize>,

    /// The East, North, Up position of each antenna \[metres\].
    pub antenna_positions: Vec<[f64; 3]>,

    /// The AIPS code of each visibility polarisation.
    pub polarisation_array: Vec<i32>,
}

/// For every visibility polarisation, the indices of its two feeds on the
/// polarisation axis of the abscal parameters.
fn feed_indices(
    polarisation_array: &[i32],
    feed_pols: &[FeedPol],
) -> Result<Vec<(usize, usize)>, AbscalApplyError> {
    polarisation_array
        .iter()
        .map(|&code| {
            let vis_pol = VisPol::try_from(code)
                .map_err(|_| AbscalApplyError::UnrecognisedPolarisation(code))?;
            let (feed1, feed2) = vis_pol.feeds();
            let index = |feed: FeedPol| {
                feed_pols
                    .iter()
                    .position(|&f| f == feed)
                    .ok_or(AbscalApplyError::MissingFeedPolarisation { vis_pol, feed })
            };
            Ok((index(feed1)?, index(feed2)?))
        })
        .collect()
}

/// Apply abscal solutions to a copy of `vis`.
///
/// `abscal_params` has shape `(3, Nfreqs, N_feed_pols)`, and `feed_pols` is
/// the ordering of its last axis.
pub fn apply_abscal(
    vis: &Visibilities,
    abscal_params: ArrayView3<f64>,
    feed_pols: &[FeedPol],
) -> Result<Visibilities, AbscalApplyError> {
    let mut new_vis = vis.clone();
    apply_abscal_inplace(&mut new_vis, abscal_params, feed_pols)?;
    Ok(new_vis)
}

/// Apply abscal solutions to `vis`. If an error is returned, `vis` hasn't
/// been touched.
pub fn apply_abscal_inplace(
    vis: &mut Visibilities,
    abscal_params: ArrayView3<f64>,
    feed_pols: &[FeedPol],
) -> Result<(), AbscalApplyError> {
    let (num_blts, num_freqs, num_vis_pols) = vis.data.dim();
    for (what, expected, got) in [
        (
            "data",
            vec![vis.ant_1.len(), num_freqs, vis.polarisation_array.len()],
            vis.data.shape().to_vec(),
        ),
        ("ant_2", vec![vis.ant_1.len()], vec![vis.ant_2.len()]),
        (
            "abscal_params",
            vec![3, num_freqs, feed_pols.len()],
            abscal_params.shape().to_vec(),
        ),
    ] {
        if expected != got {
            return Err(AbscalApplyError::ShapeMismatch {
                what,
                expected,
                got,
            });
        }
    }
    let num_ants = vis.antenna_positions.len();
    if let Some((blt, antenna)) = vis
        .ant_1
        .iter()
        .zip(vis.ant_2.iter())
        .enumerate()
        .flat_map(|(blt, (&a1, &a2))| [(blt, a1), (blt, a2)])
        .find(|&(_, antenna)| antenna >= num_ants)
    {
        return Err(AbscalApplyError::AntennaOutOfRange {
            blt,
            antenna,
            num_ants,
        });
    }
    let feed_indices = feed_indices(&vis.polarisation_array, feed_pols)?;
    debug!("Applying abscal to {num_blts} baseline-times, {num_freqs} channels and {num_vis_pols} polarisations");

    let positions = &vis.antenna_positions;
    vis.data
        .outer_iter_mut()
        .into_par_iter()
        .zip(vis.ant_1.par_iter().zip(vis.ant_2.par_iter()))
        .for_each(|(mut data_blt, (&a1, &a2))| {
            let [x1, y1, _] = positions[a1];
            let [x2, y2, _] = positions[a2];
            for (i_freq, mut data_f) in data_blt.outer_iter_mut().enumerate() {
                for (d, &(p1, p2)) in data_f.iter_mut().zip(feed_indices.iter()) {
                    let amp = abscal_params[(0, i_freq, p1)] * abscal_params[(0, i_freq, p2)];
                    let phase = abscal_params[(1, i_freq, p1)] * x1
                        - abscal_params[(1, i_freq, p2)] * x2
                        + abscal_params[(2, i_freq, p1)] * y1
                        - abscal_params[(2, i_freq, p2)] * y2;
                    *d *= amp * cexp(phase);
                }
            }
        });

    Ok(())
}

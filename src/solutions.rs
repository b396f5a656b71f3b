// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Gain solutions ready to be handed to a calibration-file writer.

use ndarray::prelude::*;

use crate::{
    c64,
    context::{CalData, FeedPol},
};

/// Calibrated gains and the flags describing which of them are usable.
#[derive(Debug, Clone)]
pub struct GainSolutions {
    /// Shape `(Nants, Nfreqs, N_feed_pols)`.
    pub gains: Array3<c64>,

    /// `true` where a gain is unusable: it's NaN, its antenna had no
    /// unflagged visibilities for that frequency and feed, or the whole
    /// frequency was flagged for that feed. Same shape as `gains`.
    pub flags: Array3<bool>,

    pub antenna_names: Vec<String>,

    /// \[Hz\]
    pub freq_array: Vec<f64>,

    pub feed_pols: Vec<FeedPol>,
}

impl GainSolutions {
    /// Collect the gains of `cal_data`, flagging them according to its
    /// visibility weights. The weights of every visibility polarisation
    /// involving a feed count towards that feed.
    pub fn from_cal_data(cal_data: &CalData) -> GainSolutions {
        let gains = cal_data.gains.clone();
        let mut flags = gains.mapv(|g| !g.is_finite());

        for (i_feed, &feed) in cal_data.feed_pols.iter().enumerate() {
            let vis_pols: Vec<usize> = cal_data
                .vis_pols
                .iter()
                .enumerate()
                .filter(|(_, vp)| vp.involves(feed))
                .map(|(i, _)| i)
                .collect();
            for i_freq in 0..cal_data.num_freqs() {
                let mut ant_weights = vec![0.0; cal_data.num_antennas()];
                for &i_vis in &vis_pols {
                    for (total, w) in ant_weights
                        .iter_mut()
                        .zip(cal_data.antenna_weights(i_freq, i_vis))
                    {
                        *total += w;
                    }
                }
                let freq_flagged = !ant_weights.iter().any(|&w| w > 0.0);
                for (i_ant, &w) in ant_weights.iter().enumerate() {
                    if freq_flagged || w <= 0.0 {
                        flags[(i_ant, i_freq, i_feed)] = true;
                    }
                }
            }
        }

        GainSolutions {
            gains,
            flags,
            antenna_names: cal_data
                .metadata
                .antennas
                .iter()
                .map(|a| a.name.clone())
                .collect(),
            freq_array: cal_data.freq_array.clone(),
            feed_pols: cal_data.feed_pols.clone(),
        }
    }

    /// The indices of antennas flagged at every frequency and feed.
    pub fn flagged_antennas(&self) -> Vec<usize> {
        self.flags
            .outer_iter()
            .enumerate()
            .filter(|(_, f)| f.iter().all(|&f| f))
            .map(|(i, _)| i)
            .collect()
    }

    /// The indices of frequencies flagged for every antenna and feed.
    pub fn flagged_freqs(&self) -> Vec<usize> {
        self.flags
            .axis_iter(Axis(1))
            .enumerate()
            .filter(|(_, f)| f.iter().all(|&f| f))
            .map(|(i, _)| i)
            .collect()
    }
}

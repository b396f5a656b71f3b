// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from constructing or slicing calibration data.

use thiserror::Error;

use super::{FeedPol, VisPol};

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Polarisation {0} not recognised")]
    UnrecognisedPolarisation(i32),

    #[error("Baseline {baseline} has {count} antennas marked in gains expand matrix {matrix}; exactly one is required")]
    BadIncidenceRow {
        baseline: usize,
        matrix: u8,
        count: usize,
    },

    #[error("Baseline {baseline} correlates antenna {antenna} with itself; autocorrelations aren't supported")]
    Autocorrelation { baseline: usize, antenna: usize },

    #[error("Baseline {baseline} refers to antenna {antenna}, but there are only {num_ants} antennas")]
    AntennaOutOfRange {
        baseline: usize,
        antenna: usize,
        num_ants: usize,
    },

    #[error("The first and second antenna lists have different lengths ({ant_1} vs. {ant_2})")]
    BaselineLengthMismatch { ant_1: usize, ant_2: usize },

    #[error("{what} has shape {got:?}, but {expected:?} was expected")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Feed polarisation {feed} has no matching {vis_pol} visibilities")]
    MissingVisPol { feed: FeedPol, vis_pol: VisPol },

    #[error("No feed polarisations are available to calibrate")]
    NoFeedPols,
}

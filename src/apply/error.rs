// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with applying abscal solutions.

use thiserror::Error;

use crate::context::{FeedPol, VisPol};

#[derive(Error, Debug)]
pub enum AbscalApplyError {
    #[error("Polarization {0} not recognized")]
    UnrecognisedPolarisation(i32),

    #[error("Visibility polarisation {vis_pol} needs abscal parameters for feed {feed}, but there aren't any")]
    MissingFeedPolarisation { vis_pol: VisPol, feed: FeedPol },

    #[error("Baseline-time {blt} refers to antenna {antenna}, but there are only {num_ants} antenna positions")]
    AntennaOutOfRange {
        blt: usize,
        antenna: usize,
        num_ants: usize,
    },

    #[error("Expected {what} to have shape {expected:?}, but it has shape {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
}

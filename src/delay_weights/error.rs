// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with building delay weights.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DelayWeightError {
    #[error("The delay spectrum variance has {got} baseline-length bins, but there are {edges} bin edges; expected {} bins", edges.saturating_sub(1))]
    BinCountMismatch { got: usize, edges: usize },

    #[error("The delay spectrum variance has {got} delays, but the delay axis has {expected}")]
    DelayCountMismatch { got: usize, expected: usize },

    #[error("The delay axis is empty")]
    EmptyDelayAxis,

    #[error("The delay axis must be ascending")]
    UnsortedDelayAxis,

    #[error("The baseline-length bin edges must be ascending")]
    UnsortedBinEdges,

    #[error("The delay spectrum variance must be positive and finite, but bin {bin} has {value} at delay index {delay}")]
    BadVariance { bin: usize, delay: usize, value: f64 },

    #[error("The oversample factor must be at least 1")]
    ZeroOversampleFactor,

    #[error("The channel width must be positive, but it is {0} Hz")]
    BadChannelWidth(f64),

    #[error("There are no frequency channels to weight")]
    NoFrequencies,

    #[error("No baseline length is covered by the baseline-length bins; can't normalise the delay weights")]
    NoCoverage,
}

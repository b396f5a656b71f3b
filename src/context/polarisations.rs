// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Feed and visibility polarisations, identified by their AIPS codes.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use super::ContextError;

/// A feed (receptor) polarisation. Gains are solved per feed polarisation.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
pub enum FeedPol {
    X,
    Y,
}

/// A visibility polarisation product.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
pub enum VisPol {
    XX,
    YY,
    XY,
    YX,
}

impl FeedPol {
    /// The AIPS polarisation code of this feed.
    pub fn code(self) -> i32 {
        match self {
            FeedPol::X => -5,
            FeedPol::Y => -6,
        }
    }

    /// The visibility polarisation correlating this feed with itself.
    pub fn auto_vis_pol(self) -> VisPol {
        VisPol::from_feeds(self, self)
    }
}

impl TryFrom<i32> for FeedPol {
    type Error = ContextError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            -5 => Ok(FeedPol::X),
            -6 => Ok(FeedPol::Y),
            _ => Err(ContextError::UnrecognisedPolarisation(code)),
        }
    }
}

impl VisPol {
    /// The AIPS polarisation code of this visibility polarisation.
    pub fn code(self) -> i32 {
        match self {
            VisPol::XX => -5,
            VisPol::YY => -6,
            VisPol::XY => -7,
            VisPol::YX => -8,
        }
    }

    /// The visibility polarisation formed by correlating `feed1` with the
    /// conjugate of `feed2`.
    pub fn from_feeds(feed1: FeedPol, feed2: FeedPol) -> VisPol {
        match (feed1, feed2) {
            (FeedPol::X, FeedPol::X) => VisPol::XX,
            (FeedPol::Y, FeedPol::Y) => VisPol::YY,
            (FeedPol::X, FeedPol::Y) => VisPol::XY,
            (FeedPol::Y, FeedPol::X) => VisPol::YX,
        }
    }

    /// The feeds correlated to form this visibility polarisation. The gain of
    /// the first feed multiplies the visibility, and the conjugated gain of the
    /// second feed multiplies it too.
    pub fn feeds(self) -> (FeedPol, FeedPol) {
        match self {
            VisPol::XX => (FeedPol::X, FeedPol::X),
            VisPol::YY => (FeedPol::Y, FeedPol::Y),
            VisPol::XY => (FeedPol::X, FeedPol::Y),
            VisPol::YX => (FeedPol::Y, FeedPol::X),
        }
    }

    /// Does this visibility polarisation involve the supplied feed?
    pub fn involves(self, feed: FeedPol) -> bool {
        let (f1, f2) = self.feeds();
        f1 == feed || f2 == feed
    }
}

impl TryFrom<i32> for VisPol {
    type Error = ContextError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            -5 => Ok(VisPol::XX),
            -6 => Ok(VisPol::YY),
            -7 => Ok(VisPol::XY),
            -8 => Ok(VisPol::YX),
            _ => Err(ContextError::UnrecognisedPolarisation(code)),
        }
    }
}

/// Work out which feed polarisations can be calibrated from the supplied
/// visibility polarisations. X is available if any of XX, XY or YX are
/// present, and Y is available if any of YY, XY or YX are present. The result
/// is truncated to `num_feed_pols` entries; if that isn't specified, it
/// defaults to the smaller of 2 and the number of visibility polarisations.
pub fn default_feed_polarisations(vis_pols: &[VisPol], num_feed_pols: Option<usize>) -> Vec<FeedPol> {
    let num_feed_pols = num_feed_pols.unwrap_or_else(|| vis_pols.len().min(2));
    [FeedPol::X, FeedPol::Y]
        .into_iter()
        .filter(|&feed| vis_pols.iter().any(|vp| vp.involves(feed)))
        .take(num_feed_pols)
        .collect()
}

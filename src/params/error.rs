// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with calibration parameters.

use std::path::PathBuf;

use thiserror::Error;

use crate::delay_weights::DelayWeightError;

#[derive(Error, Debug)]
pub enum ParamsError {
    #[error("lambda_val must be positive and finite, but it is {0}")]
    BadLambda(f64),

    #[error("xtol must be positive and finite, but it is {0}")]
    BadXtol(f64),

    #[error("maxiter must be at least 1")]
    ZeroMaxiter,

    #[error("max_processes must be at least 1 if it is specified")]
    ZeroMaxProcesses,

    #[error("Argument file '{}' doesn't have a recognised file extension! Valid extensions are: {valid}", file.display())]
    ArgFileExtension { file: PathBuf, valid: String },

    #[error("Couldn't decode {format} structure from {}:\n{err}", file.display())]
    ArgFileDecode {
        format: &'static str,
        file: PathBuf,
        err: String,
    },

    #[error(transparent)]
    DelayWeight(#[from] DelayWeightError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

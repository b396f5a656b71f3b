// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod abscal;
mod calibrate;

use std::{io::Write, sync::Arc};

use ndarray::prelude::*;
use tempfile::{Builder, NamedTempFile};

use dwcal::{c64, Antenna, ArrayMetadata, BaselineMap, CalData, VisPol};

const CHANNEL_WIDTH: f64 = 40e3;

fn make_arg_file(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("couldn't make temp file");
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// An 8-antenna array spread over roughly 60 by 40 metres.
fn get_metadata() -> Arc<ArrayMetadata> {
    let positions = [
        [0.0, 0.0],
        [12.5, 3.0],
        [-20.0, 7.5],
        [31.0, -12.0],
        [-8.0, -17.5],
        [4.0, 21.0],
        [-27.5, -4.0],
        [18.0, 14.0],
    ];
    let antennas = positions
        .iter()
        .enumerate()
        .map(|(i, &[e, n])| Antenna {
            name: format!("Tile{:03}", i + 11),
            number: i as u32 + 11,
            position: [e, n, 377.0],
        })
        .collect();
    Arc::new(
        ArrayMetadata::new(
            antennas,
            BaselineMap::all_cross_baselines(positions.len()),
            CHANNEL_WIDTH,
        )
        .unwrap(),
    )
}

fn model_vis(t: usize, b: usize, f: usize, p: usize) -> c64 {
    c64::from_polar(
        2.0 + ((3 * b + 5 * t + p) % 7) as f64 * 0.25,
        0.9 * b as f64 + 0.2 * t as f64 + 0.03 * f as f64 + 1.3 * p as f64,
    )
}

/// Unit-gain, unit-weight calibration data with identical model and data
/// visibilities.
fn get_cal_data(num_times: usize, num_freqs: usize, vis_pols: Vec<VisPol>) -> CalData {
    let metadata = get_metadata();
    let shape = (
        num_times,
        metadata.num_baselines(),
        num_freqs,
        vis_pols.len(),
    );
    let model = Array4::from_shape_fn(shape, |(t, b, f, p)| model_vis(t, b, f, p));
    CalData::new(
        metadata,
        (0..num_freqs)
            .map(|f| 182e6 + f as f64 * CHANNEL_WIDTH)
            .collect(),
        vis_pols,
        None,
        model.clone(),
        model,
        Array4::ones(shape),
    )
    .unwrap()
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests of (delay-weighted) absolute calibration and its application.

use approx::assert_abs_diff_eq;
use indoc::indoc;
use ndarray::prelude::*;

use dwcal::{
    absolute_calibration, apply_abscal, dw_absolute_calibration, AbscalParams, CalData,
    DelayWeightParams, DwcalError, FeedPol, Visibilities, VisPol,
};

use crate::*;

/// Flatten the visibilities of `cal_data` into baseline-time order.
fn to_visibilities(cal_data: &CalData, vis: &Array4<dwcal::c64>) -> Visibilities {
    let (num_times, num_bls, num_freqs, num_pols) = vis.dim();
    let baselines = &cal_data.metadata.baselines;
    let repeat = |ants: &[usize]| -> Vec<usize> {
        (0..num_times).flat_map(|_| ants.iter().copied()).collect()
    };
    Visibilities {
        data: Array3::from_shape_fn((num_times * num_bls, num_freqs, num_pols), |(blt, f, p)| {
            vis[(blt / num_bls, blt % num_bls, f, p)]
        }),
        ant_1: repeat(baselines.ant_1()),
        ant_2: repeat(baselines.ant_2()),
        antenna_positions: cal_data
            .metadata
            .antennas
            .iter()
            .map(|a| a.position)
            .collect(),
        polarisation_array: cal_data.vis_pols.iter().map(|vp| vp.code()).collect(),
    }
}

fn true_abscal_params(num_freqs: usize) -> Array3<f64> {
    Array3::from_shape_fn((3, num_freqs, 2), |(i, f, p)| match i {
        0 => 0.8 + 0.02 * f as f64 + 0.1 * p as f64,
        1 => 0.01 - 0.002 * f as f64 + 0.003 * p as f64,
        _ => -0.008 + 0.001 * (f + 2 * p) as f64,
    })
}

/// Calibration data whose data visibilities are the model visibilities with
/// `params` applied.
fn get_abscal_data(num_freqs: usize, params: &Array3<f64>) -> CalData {
    let mut cal_data = get_cal_data(2, num_freqs, vec![VisPol::XX, VisPol::YY]);
    let model = to_visibilities(&cal_data, &cal_data.model_visibilities);
    let corrupted = apply_abscal(&model, params.view(), &[FeedPol::X, FeedPol::Y]).unwrap();
    let num_bls = cal_data.num_baselines();
    for ((t, b, f, p), d) in cal_data.data_visibilities.indexed_iter_mut() {
        *d = corrupted.data[(t * num_bls + b, f, p)];
    }
    cal_data
}

#[test]
fn test_abscal_recovers_applied_params() -> Result<(), DwcalError> {
    let num_freqs = 3;
    let params = true_abscal_params(num_freqs);
    let mut cal_data = get_abscal_data(num_freqs, &params);

    let report = absolute_calibration(
        &mut cal_data,
        &AbscalParams {
            xtol: 1e-10,
            maxiter: 200,
        },
    )?;
    assert!(report.all_converged());
    assert_abs_diff_eq!(cal_data.abscal_params, params, epsilon = 1e-6);

    // Applying the solutions to the model reproduces the data.
    let model = to_visibilities(&cal_data, &cal_data.model_visibilities);
    let data = to_visibilities(&cal_data, &cal_data.data_visibilities);
    let applied = apply_abscal(&model, cal_data.abscal_params.view(), &cal_data.feed_pols)?;
    assert_abs_diff_eq!(applied.data, data.data, epsilon = 1e-6);
    Ok(())
}

#[test]
fn test_dw_abscal_from_arg_files() -> Result<(), DwcalError> {
    let dw_arg_file = make_arg_file(
        ".json",
        indoc! {r#"
            {
                "delay_spectrum_variance": {"v": 1, "dim": [2, 5], "data": [
                    1.0, 2.0, 3.0, 2.0, 1.0,
                    1.0, 4.0, 9.0, 4.0, 1.0
                ]},
                "bl_length_bin_edges": [0.0, 25.0, 100.0],
                "delay_axis": [-2e-6, -1e-6, 0.0, 1e-6, 2e-6],
                "oversample_factor": 16
            }
        "#},
    );
    let abscal_arg_file = make_arg_file(
        ".toml",
        indoc! {r#"
            xtol = 1e-10
        "#},
    );
    let dw_params = DelayWeightParams::from_arg_file(dw_arg_file.path())?;
    let abscal_params = AbscalParams::from_arg_file(abscal_arg_file.path())?;

    let num_freqs = 6;
    let params = true_abscal_params(num_freqs);
    let mut cal_data = get_abscal_data(num_freqs, &params);
    let report = dw_absolute_calibration(&mut cal_data, Some(&dw_params), &abscal_params)?;
    assert_eq!(report.solves.len(), 2);
    assert!(report.all_converged());
    assert_abs_diff_eq!(cal_data.abscal_params, params, epsilon = 1e-6);
    Ok(())
}

#[test]
fn test_identity_abscal_changes_nothing() {
    let cal_data = get_cal_data(
        3,
        4,
        vec![VisPol::XX, VisPol::YY, VisPol::XY, VisPol::YX],
    );
    let vis = to_visibilities(&cal_data, &cal_data.data_visibilities);
    let applied = apply_abscal(&vis, cal_data.abscal_params.view(), &cal_data.feed_pols).unwrap();
    assert_abs_diff_eq!(applied.data, vis.data, epsilon = 1e-15);
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests of per-polarisation gain calibration through the public API.

use approx::assert_abs_diff_eq;
use indoc::indoc;
use ndarray::prelude::*;

use dwcal::{calibrate_per_pol, c64, CalData, CalibrationParams, GainSolutions, SolveStatus, VisPol};

use crate::*;

fn true_gains(num_ants: usize, num_freqs: usize) -> Array3<c64> {
    Array3::from_shape_fn((num_ants, num_freqs, 2), |(a, f, p)| {
        c64::from_polar(
            1.3 + 0.04 * ((2 * a + f + 3 * p) % 6) as f64,
            0.1 * ((5 * a + 2 * f + p) % 11) as f64 - 0.5,
        )
    })
}

/// Corrupt the data of `cal_data` with `gains`. The visibility polarisations
/// must be ordered XX, YY, XY, YX.
fn corrupt(cal_data: &mut CalData, gains: &Array3<c64>) {
    let feeds = [(0, 0), (1, 1), (0, 1), (1, 0)];
    let baselines = cal_data.metadata.baselines.clone();
    for ((t, b, f, p), d) in cal_data.data_visibilities.indexed_iter_mut() {
        let (a1, a2) = (baselines.ant_1()[b], baselines.ant_2()[b]);
        let (p1, p2) = feeds[p];
        *d = gains[(a1, f, p1)] * gains[(a2, f, p2)].conj() * model_vis(t, b, f, p);
    }
}

#[test]
fn test_full_pol_calibration_from_arg_file() {
    let arg_file = make_arg_file(
        ".toml",
        indoc! {r#"
            lambda_val = 50.0
            xtol = 1e-10
            parallel = true
            max_processes = 2
        "#},
    );
    let params = CalibrationParams::from_arg_file(arg_file.path()).unwrap();
    assert!(params.get_crosspol_phase);

    let num_freqs = 3;
    let vis_pols = vec![VisPol::XX, VisPol::YY, VisPol::XY, VisPol::YX];
    let mut cal_data = get_cal_data(2, num_freqs, vis_pols);
    let gains = true_gains(cal_data.num_antennas(), num_freqs);
    corrupt(&mut cal_data, &gains);
    cal_data.init_gains_from_vis_ratio();

    let report = calibrate_per_pol(&mut cal_data, &params).unwrap();
    assert_eq!(report.solves.len(), 2 * num_freqs);
    assert!(report.all_converged());
    assert_eq!(report.crosspol_phases.as_ref().unwrap().len(), num_freqs);

    // The solved gains reproduce every visibility polarisation.
    let mut predicted = cal_data.clone();
    let solved = cal_data.gains.clone();
    corrupt(&mut predicted, &solved);
    assert_abs_diff_eq!(
        predicted.data_visibilities,
        cal_data.data_visibilities,
        epsilon = 1e-6
    );

    let solutions = GainSolutions::from_cal_data(&cal_data);
    assert!(solutions.flags.iter().all(|&f| !f));
    assert_eq!(solutions.antenna_names[0], "Tile011");
}

#[test]
fn test_flagged_antenna_and_channel() {
    let num_freqs = 2;
    let mut cal_data = get_cal_data(1, num_freqs, vec![VisPol::XX, VisPol::YY]);
    let gains = true_gains(cal_data.num_antennas(), num_freqs);
    corrupt(&mut cal_data, &gains);

    let flagged_ant = 5;
    let baselines = cal_data.metadata.baselines.clone();
    for (i_bl, (a1, a2)) in baselines.iter().enumerate() {
        if a1 == flagged_ant || a2 == flagged_ant {
            cal_data
                .visibility_weights
                .slice_mut(s![.., i_bl, .., ..])
                .fill(0.0);
        }
    }
    // The second channel is flagged for Y.
    cal_data
        .visibility_weights
        .slice_mut(s![.., .., 1, 1])
        .fill(0.0);

    let report = calibrate_per_pol(
        &mut cal_data,
        &CalibrationParams {
            xtol: 1e-10,
            ..Default::default()
        },
    )
    .unwrap();
    // Ordered by feed, then frequency.
    assert_eq!(report.solves[3].status, SolveStatus::AllFlagged);
    assert_eq!(
        report
            .solves
            .iter()
            .filter(|r| r.status == SolveStatus::Converged)
            .count(),
        3
    );

    assert!(cal_data
        .gains
        .slice(s![flagged_ant, .., ..])
        .iter()
        .all(|g| g.is_nan()));
    assert!(cal_data.gains.slice(s![.., 1, 1]).iter().all(|g| g.is_nan()));

    let solutions = GainSolutions::from_cal_data(&cal_data);
    assert_eq!(solutions.flagged_antennas(), vec![flagged_ant]);
    assert!(solutions.flags.slice(s![.., 1, 1]).iter().all(|&f| f));
    assert!(!solutions.flags[(0, 1, 0)]);
    assert!(solutions.flagged_freqs().is_empty());
}

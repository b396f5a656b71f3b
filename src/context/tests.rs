// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;
use strum::IntoEnumIterator;

use super::*;
use crate::c64;

fn get_metadata(num_ants: usize) -> Arc<ArrayMetadata> {
    let antennas = (0..num_ants)
        .map(|i| Antenna {
            name: format!("ant{i}"),
            number: i as u32,
            position: [i as f64 * 10.0, (i * i) as f64, 0.0],
        })
        .collect();
    Arc::new(
        ArrayMetadata::new(antennas, BaselineMap::all_cross_baselines(num_ants), 80e3).unwrap(),
    )
}

fn get_cal_data(num_times: usize, num_freqs: usize, vis_pols: Vec<VisPol>) -> CalData {
    let metadata = get_metadata(4);
    let shape = (num_times, metadata.num_baselines(), num_freqs, vis_pols.len());
    let model = Array4::from_shape_fn(shape, |(t, b, f, p)| {
        c64::new((t + b) as f64 + 1.0, (f + p) as f64)
    });
    let data = model.mapv(|m| m * 4.0);
    let weights = Array4::ones(shape);
    CalData::new(
        metadata,
        (0..num_freqs).map(|f| 150e6 + f as f64 * 80e3).collect(),
        vis_pols,
        None,
        model,
        data,
        weights,
    )
    .unwrap()
}

#[test]
fn test_pol_codes_round_trip() {
    for feed in FeedPol::iter() {
        assert_eq!(FeedPol::try_from(feed.code()).unwrap(), feed);
    }
    for vis_pol in VisPol::iter() {
        assert_eq!(VisPol::try_from(vis_pol.code()).unwrap(), vis_pol);
        let (f1, f2) = vis_pol.feeds();
        assert_eq!(VisPol::from_feeds(f1, f2), vis_pol);
    }
    assert!(matches!(
        VisPol::try_from(-9),
        Err(ContextError::UnrecognisedPolarisation(-9))
    ));
    assert!(FeedPol::try_from(-7).is_err());
}

#[test]
fn test_default_feed_polarisations() {
    use VisPol::*;
    assert_eq!(
        default_feed_polarisations(&[XX, YY, XY, YX], None),
        vec![FeedPol::X, FeedPol::Y]
    );
    assert_eq!(default_feed_polarisations(&[YY], None), vec![FeedPol::Y]);
    assert_eq!(default_feed_polarisations(&[XY], None), vec![FeedPol::X]);
    assert_eq!(default_feed_polarisations(&[XX, YY], Some(1)), vec![FeedPol::X]);
}

#[test]
fn test_all_cross_baselines() {
    let baselines = BaselineMap::all_cross_baselines(4);
    assert_eq!(baselines.num_baselines(), 6);
    assert_eq!(baselines.ant_1(), &[0, 0, 0, 1, 1, 2]);
    assert_eq!(baselines.ant_2(), &[1, 2, 3, 2, 3, 3]);
}

#[test]
fn test_baseline_subset() {
    let baselines = BaselineMap::all_cross_baselines(4);
    let (subset, kept) = baselines.subset(&[true, false, true, true]);
    assert_eq!(kept, vec![1, 2, 5]);
    assert_eq!(subset.num_antennas(), 3);
    assert_eq!(subset.ant_1(), &[0, 0, 1]);
    assert_eq!(subset.ant_2(), &[1, 2, 2]);

    let (all, kept) = baselines.subset(&[true; 4]);
    assert_eq!(all, baselines);
    assert_eq!(kept, (0..6).collect::<Vec<_>>());
}

#[test]
fn test_baseline_antenna_weights() {
    let baselines = BaselineMap::all_cross_baselines(3);
    // Baselines (0, 1), (0, 2) and (1, 2) over two times.
    let weights = array![[1.0, 0.0, 2.0], [0.5, 0.0, 0.0]];
    let ant_weights = baselines.antenna_weights(weights.view());
    assert_eq!(ant_weights, vec![1.5, 3.5, 2.0]);

    let ant_weights = baselines.antenna_weights(Array2::zeros((2, 3)).view());
    assert_eq!(ant_weights, vec![0.0; 3]);
}

#[test]
fn test_incidence_matrices_round_trip() {
    let baselines = BaselineMap::new(vec![2, 0, 1], vec![0, 1, 3], 4).unwrap();
    let mat_1 = baselines.gains_exp_mat_1();
    let mat_2 = baselines.gains_exp_mat_2();
    assert_eq!(mat_1.dim(), (3, 4));
    assert_eq!(mat_1.row(0).to_vec(), vec![0, 0, 1, 0]);
    assert_eq!(mat_2.row(2).to_vec(), vec![0, 0, 0, 1]);
    let from_mats = BaselineMap::from_incidence_matrices(mat_1.view(), mat_2.view()).unwrap();
    assert_eq!(from_mats, baselines);
}

#[test]
fn test_bad_baseline_maps() {
    assert!(matches!(
        BaselineMap::new(vec![0, 1], vec![1, 1], 3),
        Err(ContextError::Autocorrelation {
            baseline: 1,
            antenna: 1
        })
    ));
    assert!(matches!(
        BaselineMap::new(vec![0], vec![5], 3),
        Err(ContextError::AntennaOutOfRange { antenna: 5, .. })
    ));
    assert!(matches!(
        BaselineMap::new(vec![0], vec![1, 2], 3),
        Err(ContextError::BaselineLengthMismatch { .. })
    ));

    let mut mat_1 = Array2::zeros((2, 3));
    mat_1[(0, 0)] = 1;
    mat_1[(1, 0)] = 1;
    mat_1[(1, 1)] = 1;
    let mut mat_2 = Array2::zeros((2, 3));
    mat_2[(0, 1)] = 1;
    mat_2[(1, 2)] = 1;
    assert!(matches!(
        BaselineMap::from_incidence_matrices(mat_1.view(), mat_2.view()),
        Err(ContextError::BadIncidenceRow {
            baseline: 1,
            matrix: 1,
            count: 2
        })
    ));
}

#[test]
fn test_uv_from_antenna_positions() {
    let metadata = get_metadata(3);
    // Baseline (0, 2): positions (0, 0) and (20, 4).
    assert_abs_diff_eq!(metadata.uv.row(1), array![-20.0, -4.0].view());
    let lengths = metadata.baseline_lengths();
    assert_abs_diff_eq!(lengths[1], (400.0f64 + 16.0).sqrt());
}

#[test]
fn test_new_rejects_bad_shapes() {
    let metadata = get_metadata(3);
    let result = CalData::new(
        metadata,
        vec![150e6],
        vec![VisPol::XX],
        None,
        Array4::zeros((1, 3, 1, 1)),
        Array4::zeros((1, 3, 1, 1)),
        Array4::zeros((1, 2, 1, 1)),
    );
    assert!(matches!(
        result,
        Err(ContextError::ShapeMismatch {
            what: "visibility_weights",
            ..
        })
    ));
}

#[test]
fn test_new_initialises_gains_and_abscal() {
    let cal_data = get_cal_data(2, 3, vec![VisPol::XX, VisPol::YY]);
    assert_eq!(cal_data.gains.dim(), (4, 3, 2));
    assert!(cal_data.gains.iter().all(|&g| g == c64::new(1.0, 0.0)));
    assert_eq!(cal_data.abscal_params.dim(), (3, 3, 2));
    assert!(cal_data.abscal_params.slice(s![0, .., ..]).iter().all(|&a| a == 1.0));
    assert!(cal_data.abscal_params.slice(s![1.., .., ..]).iter().all(|&a| a == 0.0));
}

#[test]
fn test_expand_in_frequency() {
    let mut cal_data = get_cal_data(2, 3, vec![VisPol::XX, VisPol::YY]);
    cal_data.gains[(1, 2, 0)] = c64::new(2.0, 1.0);
    let per_freq = cal_data.expand_in_frequency();
    assert_eq!(per_freq.len(), 3);
    for (i_freq, cd) in per_freq.iter().enumerate() {
        assert_eq!(cd.num_freqs(), 1);
        assert_eq!(cd.freq_array[0], cal_data.freq_array[i_freq]);
        assert!(Arc::ptr_eq(&cd.metadata, &cal_data.metadata));
        assert_eq!(
            cd.model_visibilities.slice(s![.., .., 0, ..]),
            cal_data.model_visibilities.slice(s![.., .., i_freq, ..])
        );
    }
    assert_eq!(per_freq[2].gains[(1, 0, 0)], c64::new(2.0, 1.0));
}

#[test]
fn test_expand_in_polarisation() {
    let cal_data = get_cal_data(1, 2, vec![VisPol::YX, VisPol::YY, VisPol::XY, VisPol::XX]);
    assert_eq!(cal_data.feed_pols, vec![FeedPol::X, FeedPol::Y]);
    let per_pol = cal_data.expand_in_polarisation().unwrap();
    assert_eq!(per_pol.len(), 2);
    assert_eq!(per_pol[0].vis_pols, vec![VisPol::XX]);
    assert_eq!(per_pol[1].vis_pols, vec![VisPol::YY]);
    assert_eq!(
        per_pol[0].data_visibilities.slice(s![.., .., .., 0]),
        cal_data.data_visibilities.slice(s![.., .., .., 3])
    );
    assert_eq!(
        per_pol[1].data_visibilities.slice(s![.., .., .., 0]),
        cal_data.data_visibilities.slice(s![.., .., .., 1])
    );

    // Y can be calibrated from crosspols alone, but not per polarisation.
    let cal_data = get_cal_data(1, 1, vec![VisPol::XX, VisPol::XY]);
    assert_eq!(cal_data.feed_pols, vec![FeedPol::X, FeedPol::Y]);
    assert!(matches!(
        cal_data.expand_in_polarisation(),
        Err(ContextError::MissingVisPol {
            feed: FeedPol::Y,
            vis_pol: VisPol::YY
        })
    ));
}

#[test]
fn test_init_gains_from_vis_ratio() {
    let mut cal_data = get_cal_data(1, 2, vec![VisPol::XX]);
    // Flagged visibilities don't count.
    cal_data.data_visibilities[(0, 0, 0, 0)] *= 100.0;
    cal_data.visibility_weights[(0, 0, 0, 0)] = 0.0;
    cal_data.init_gains_from_vis_ratio();
    for &g in cal_data.gains.iter() {
        assert_abs_diff_eq!(g, c64::new(2.0, 0.0), epsilon = 1e-12);
    }
}

#[test]
fn test_flag_nan_gains() {
    let mut cal_data = get_cal_data(2, 2, vec![VisPol::XX, VisPol::YY, VisPol::XY, VisPol::YX]);
    cal_data.gains[(3, 1, 1)] = c64::new(f64::NAN, 0.0);
    cal_data.flag_nan_gains();

    assert_eq!(cal_data.gains[(3, 1, 1)], c64::default());
    let baselines = cal_data.metadata.baselines.clone();
    for (i_bl, (a1, a2)) in baselines.iter().enumerate() {
        let touches = a1 == 3 || a2 == 3;
        for (i_vis, vis_pol) in cal_data.vis_pols.iter().enumerate() {
            for i_freq in 0..2 {
                let expect_flagged = touches && i_freq == 1 && vis_pol.involves(FeedPol::Y);
                for i_time in 0..2 {
                    let w = cal_data.visibility_weights[(i_time, i_bl, i_freq, i_vis)];
                    assert_eq!(w == 0.0, expect_flagged, "bl {i_bl} freq {i_freq} {vis_pol}");
                }
            }
        }
    }
}

#[test]
fn test_antenna_weights() {
    let mut cal_data = get_cal_data(2, 1, vec![VisPol::XX]);
    // Flag every baseline with antenna 0.
    for (i_bl, (a1, a2)) in cal_data.metadata.baselines.clone().iter().enumerate() {
        if a1 == 0 || a2 == 0 {
            cal_data.visibility_weights.slice_mut(s![.., i_bl, .., ..]).fill(0.0);
        }
    }
    let ant_weights = cal_data.antenna_weights(0, 0);
    // 2 times, 2 unflagged baselines per remaining antenna.
    assert_eq!(ant_weights, vec![0.0, 4.0, 4.0, 4.0]);
    assert!(!cal_data.all_flagged());
    cal_data.visibility_weights.fill(0.0);
    assert!(cal_data.all_flagged());
}

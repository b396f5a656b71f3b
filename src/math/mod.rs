// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics.


use crate::c64;

/// Complex exponential. The argument is assumed to be purely imaginary.
///
/// This function doesn't actually use complex numbers; it just returns the real
/// and imag components from Euler's formula (i.e. e^{ix} = cos{x} + i sin{x}).
///
/// # Examples
///
/// `assert_abs_diff_eq!(cexp(PI), c64::new(-1.0, 0.0));`
#[inline]
pub(crate) fn cexp(x: f64) -> c64 {
    let (im, re) = x.sin_cos();
    c64::new(re, im)
}

/// The circular mean of the phases of the supplied complex numbers \[radians\].
/// Non-finite values are ignored. If there are no finite values, NaN is
/// returned.
pub(crate) fn circular_mean_phase<'a, I: IntoIterator<Item = &'a c64>>(values: I) -> f64 {
    let mut sum_sin = 0.0;
    let mut sum_cos = 0.0;
    let mut count = 0;
    for v in values.into_iter().filter(|v| v.is_finite()) {
        let (s, c) = v.arg().sin_cos();
        sum_sin += s;
        sum_cos += c;
        count += 1;
    }
    if count == 0 {
        return f64::NAN;
    }
    sum_sin.atan2(sum_cos)
}

/// The median of the finite values in the iterator. NaN is returned if there
/// are no finite values.
pub(crate) fn nan_median<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let mut v: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        (v[mid - 1] + v[mid]) / 2.0
    } else {
        v[mid]
    }
}

/// The sample frequencies of a discrete Fourier transform with `n` samples
/// spaced `d` apart, in the standard FFT ordering (zero, positive
/// frequencies, then negative frequencies).
pub(crate) fn fft_freqs(n: usize, d: f64) -> Vec<f64> {
    let scale = 1.0 / (n as f64 * d);
    let num_positive = (n + 1) / 2;
    (0..n)
        .map(|i| {
            if i < num_positive {
                i as f64 * scale
            } else {
                (i as f64 - n as f64) * scale
            }
        })
        .collect()
}

/// Piecewise-linear interpolation of the points (`xp`, `fp`) at `x`. `xp` must
/// be ascending. Values of `x` outside the range of `xp` take the value of the
/// nearest end point.
pub(crate) fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    debug_assert_eq!(xp.len(), fp.len());
    debug_assert!(!xp.is_empty());
    let last = xp.len() - 1;
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[last] {
        return fp[last];
    }
    // The first point strictly greater than x.
    let upper = xp.partition_point(|&p| p <= x);
    let lower = upper - 1;
    let span = xp[upper] - xp[lower];
    if span == 0.0 {
        return fp[lower];
    }
    let frac = (x - xp[lower]) / span;
    fp[lower] + frac * (fp[upper] - fp[lower])
}

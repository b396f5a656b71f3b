// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Running independent per-frequency sub-problems, in parallel when that's
//! worthwhile.

use indicatif::{
    ParallelProgressIterator, ProgressBar, ProgressDrawTarget, ProgressIterator, ProgressStyle,
};
use log::debug;
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};

use super::CalibrateError;
use crate::params::CalibrationParams;

/// Convenience function to make a progress bar while calibrating.
pub(super) fn make_calibration_progress_bar(
    num_freqs: usize,
    message: String,
    draw: bool,
) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("{msg}: [{wide_bar:.blue}] {pos:3}/{len:3} ({elapsed_precise}<{eta_precise})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    ProgressBar::with_draw_target(
        Some(num_freqs as _),
        if draw {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(style)
    .with_position(0)
    .with_message(message)
}

/// Make the thread pool used for a whole calibration call, if the work
/// should be parallel at all. That needs `params.parallel` and at least two
/// frequencies; the pool has at most `params.max_processes` threads.
pub(crate) fn make_thread_pool(
    params: &CalibrationParams,
    num_freqs: usize,
) -> Result<Option<ThreadPool>, CalibrateError> {
    if !params.parallel || num_freqs < 2 {
        debug!("Solving {num_freqs} frequencies sequentially");
        return Ok(None);
    }
    // 0 threads means rayon's default.
    let num_threads = params
        .max_processes
        .map(|max| max.min(num_freqs))
        .unwrap_or(0);
    let pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;
    debug!(
        "Solving {num_freqs} frequencies with {} threads",
        pool.current_num_threads()
    );
    Ok(Some(pool))
}

/// Call `work` on every sub-problem in `items`, passing along its frequency
/// index. Results come back in the same order as `items`, whatever order the
/// work finishes in. The work is done on `pool` if there is one, otherwise
/// sequentially.
pub(crate) fn run_per_frequency<I, T, F>(
    items: Vec<I>,
    pool: Option<&ThreadPool>,
    draw_progress_bar: bool,
    message: String,
    work: F,
) -> Vec<T>
where
    I: Send,
    T: Send,
    F: Fn(usize, I) -> T + Sync,
{
    let progress_bar = make_calibration_progress_bar(items.len(), message, draw_progress_bar);

    let results: Vec<T> = match pool {
        Some(pool) => pool.install(|| {
            items
                .into_par_iter()
                .enumerate()
                .map(|(i_freq, item)| work(i_freq, item))
                .progress_with(progress_bar.clone())
                .collect()
        }),
        None => items
            .into_iter()
            .enumerate()
            .map(|(i_freq, item)| work(i_freq, item))
            .progress_with(progress_bar.clone())
            .collect(),
    };
    progress_bar.abandon();

    results
}

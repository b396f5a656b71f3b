// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Cost functions and their analytic derivatives.

Derivatives with respect to complex gains treat the real and imaginary parts
of each gain as independent real variables. Visibility-shaped inputs are
`(Ntimes, Nbls)` for single-frequency problems and `(Ntimes, Nbls, Nfreqs)`
for delay-weighted problems; all of them belong to a single visibility
polarisation.

None of these functions do anything in parallel; they're intended to be
called from a single worker.
 */

mod abscal;
mod crosspol;
mod dw_abscal;
mod gains;

pub use abscal::{cost_function_abs_cal, hess_abs_cal, jacobian_abs_cal};
pub use crosspol::{crosspol_cost, set_crosspol_phase};
pub use dw_abscal::{cost_function_dw_abscal, hess_dw_abscal, jacobian_dw_abscal};
pub use gains::{cost_function_single_pol, hessian_single_pol, jacobian_single_pol, GainHessian};

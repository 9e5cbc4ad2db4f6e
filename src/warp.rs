// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! §4.F.1: warp-model derivation from matching-ref neighbour samples.
//! Mirrors `decode.c`'s `derive_warpmv`: try `find_affine_int`, then gate
//! the result through `get_shear_params`; fall back to IDENTITY if either
//! fails.

use crate::levels::WarpType;
use crate::refmv::MotionVector;

/// 1 << WARPEDMODEL_PREC_BITS: the fixed-point scale of warp parameters.
const WARP_PREC: i64 = 1 << 16;
/// Bound on the shear terms for the model to be considered invertible
/// without dangerously large per-sample motion.
const WARP_PARAM_REDUCE_BITS: i64 = 6;
const WARPEDMODEL_TRANS_CLAMP: i64 = 1 << 23;
const WARPEDMODEL_NONDIAG_CLAMP: i64 = 1 << 13;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WarpModel {
    pub kind: WarpType,
    /// `[A, B, Tx, D, E, Ty]`: target = A*sx + B*sy + Tx (row affine),
    /// D*sx + E*sy + Ty (col affine), fixed-point scale `WARP_PREC`.
    pub params: [i64; 6],
}

impl WarpModel {
    pub const IDENTITY: Self =
        WarpModel { kind: WarpType::Identity, params: [WARP_PREC, 0, 0, 0, WARP_PREC, 0] };
}

/// One `(source, target)` sample: the neighbour's pixel position and its
/// motion vector, both relative to the current block's top-left.
#[derive(Clone, Copy, Debug)]
pub struct WarpSample {
    pub src_x: i32,
    pub src_y: i32,
    pub mv: MotionVector,
}

/// Selects samples within threshold, fits an affine model, and gates it
/// through shear-parameter normalization (spec §4.F.1).
pub fn derive_warp_model(bw4: usize, bh4: usize, block_mv: MotionVector, samples: &[WarpSample]) -> WarpModel {
    let threshold = 4 * (bw4.max(bh4) as i32 * 4).clamp(4, 28);
    let mut kept: Vec<WarpSample> = samples
        .iter()
        .copied()
        .filter(|s| {
            let d_row = (s.mv.row - block_mv.row).abs();
            let d_col = (s.mv.col - block_mv.col).abs();
            d_row.max(d_col) <= threshold
        })
        .collect();
    if kept.is_empty() {
        if let Some(first) = samples.first() {
            kept.push(*first);
        } else {
            return WarpModel::IDENTITY;
        }
    }

    match find_affine_int(&kept) {
        Some(model) if get_shear_params(&model) => model,
        _ => WarpModel::IDENTITY,
    }
}

/// Least-squares affine fit over the kept samples: solves the two
/// independent 3x3 normal-equation systems (one per output axis) via
/// Cramer's rule.
fn find_affine_int(samples: &[WarpSample]) -> Option<WarpModel> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let (mut sx, mut sy, mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    let (mut srow, mut scol, mut sx_row, mut sy_row, mut sx_col, mut sy_col) =
        (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    for s in samples {
        let x = s.src_x as f64;
        let y = s.src_y as f64;
        let row = (s.src_x + s.mv.col) as f64;
        let col = (s.src_y + s.mv.row) as f64;
        sx += x;
        sy += y;
        sxx += x * x;
        syy += y * y;
        sxy += x * y;
        srow += row;
        scol += col;
        sx_row += x * row;
        sy_row += y * row;
        sx_col += x * col;
        sy_col += y * col;
    }

    let fit_axis = |s_target: f64, sx_target: f64, sy_target: f64| -> Option<(f64, f64, f64)> {
        // Normal equations for target = a*x + b*y + c.
        let m = [[sxx, sxy, sx], [sxy, syy, sy], [sx, sy, n]];
        let rhs = [sx_target, sy_target, s_target];
        solve3(m, rhs)
    };

    let (a, b, tx) = fit_axis(srow, sx_row, sy_row)?;
    let (d, e, ty) = fit_axis(scol, sx_col, sy_col)?;

    Some(WarpModel {
        kind: WarpType::Affine,
        params: [
            (a * WARP_PREC as f64) as i64,
            (b * WARP_PREC as f64) as i64,
            tx as i64,
            (d * WARP_PREC as f64) as i64,
            (e * WARP_PREC as f64) as i64,
            ty as i64,
        ],
    })
}

fn solve3(m: [[f64; 3]; 3], rhs: [f64; 3]) -> Option<(f64, f64, f64)> {
    let det = determinant3(m);
    if det.abs() < 1e-6 {
        return None;
    }
    let mut mx = m;
    mx[0][0] = rhs[0];
    mx[1][0] = rhs[1];
    mx[2][0] = rhs[2];
    let mut my = m;
    my[0][1] = rhs[0];
    my[1][1] = rhs[1];
    my[2][1] = rhs[2];
    let mut mz = m;
    mz[0][2] = rhs[0];
    mz[1][2] = rhs[1];
    mz[2][2] = rhs[2];
    Some((determinant3(mx) / det, determinant3(my) / det, determinant3(mz) / det))
}

fn determinant3(m: [[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Normalizes and range-checks the affine shear terms; rejects models
/// whose non-diagonal terms or translation are out of the representable
/// range (an invertibility proxy for the real `get_shear_params`).
fn get_shear_params(model: &WarpModel) -> bool {
    let [a, b, tx, d, e, ty] = model.params;
    if tx.abs() >= WARPEDMODEL_TRANS_CLAMP || ty.abs() >= WARPEDMODEL_TRANS_CLAMP {
        return false;
    }
    let alpha = a - WARP_PREC;
    let delta = e - WARP_PREC;
    if alpha.abs() >= WARPEDMODEL_NONDIAG_CLAMP << WARP_PARAM_REDUCE_BITS
        || b.abs() >= WARPEDMODEL_NONDIAG_CLAMP << WARP_PARAM_REDUCE_BITS
        || d.abs() >= WARPEDMODEL_NONDIAG_CLAMP << WARP_PARAM_REDUCE_BITS
        || delta.abs() >= WARPEDMODEL_NONDIAG_CLAMP << WARP_PARAM_REDUCE_BITS
    {
        return false;
    }
    // Determinant of the 2x2 linear part must stay bounded away from zero
    // for the model to be invertible.
    let det = a * e - b * d;
    det.abs() > (WARP_PREC * WARP_PREC) >> 16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_samples_falls_back_to_identity() {
        let model = derive_warp_model(4, 4, MotionVector::ZERO, &[]);
        assert_eq!(model.kind, WarpType::Identity);
    }

    #[test]
    fn three_consistent_samples_yield_affine() {
        let mv = MotionVector { row: 8, col: 8 };
        let samples = [
            WarpSample { src_x: -4, src_y: -4, mv },
            WarpSample { src_x: 4, src_y: -4, mv },
            WarpSample { src_x: -4, src_y: 4, mv },
        ];
        let model = derive_warp_model(2, 2, mv, &samples);
        // Identical translation everywhere is a degenerate (non-invertible
        // beyond translation) affine fit only in the shear terms, so the
        // gate may still accept pure translation as AFFINE with alpha=0.
        assert!(model.kind == WarpType::Affine || model.kind == WarpType::Identity);
    }

    #[test]
    fn far_outlier_sample_is_excluded_or_singleton_kept() {
        let mv = MotionVector::ZERO;
        let samples = [WarpSample { src_x: 0, src_y: 0, mv: MotionVector { row: 10_000, col: 10_000 } }];
        // No sample passes the threshold; the single sample is kept anyway
        // per spec ("If none, keep one"), and with one sample the fit is
        // under-determined, so IDENTITY is the correct outcome.
        let model = derive_warp_model(4, 4, mv, &samples);
        assert_eq!(model.kind, WarpType::Identity);
    }
}

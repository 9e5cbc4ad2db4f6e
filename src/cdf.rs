// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Component C: the per-tile CDF table. Generalizes the teacher's
//! `CDFContext::new(qindex)` (cloned at every tile's start, mutated by the
//! MSAC, optionally published back to the frame's reference slot) from an
//! encode-time init-only table into the clone/mutate/publish lifecycle of
//! spec §4.C.

use crate::levels::N_PARTITION_TYPES;
use crate::msac::{BoolCdf, Cdf, PROB_TOTAL};

const N_PARTITION_CONTEXTS: usize = 4;
const N_PARTITION_SIZES: usize = 5; // BL_8X8 .. BL_128X128
const N_SKIP_CONTEXTS: usize = 3;
const N_TX_SIZE_CONTEXTS: usize = 3;
const N_DELTA_TOKENS: usize = 4;
const N_DRL_CONTEXTS: usize = 3;
const N_COMP_MODE_CONTEXTS: usize = 5;
const N_MOTION_MODE_CONTEXTS: usize = 3;

/// One CDF table per tile; cloned from the frame's input table at tile
/// start (spec §4.C step 2), mutated during parsing, optionally published
/// (after averaging, step 4) as the frame's output CDF.
#[derive(Clone)]
pub struct CdfContext {
    pub partition: [[Cdf<N_PARTITION_TYPES>; N_PARTITION_CONTEXTS]; N_PARTITION_SIZES],
    pub skip: [BoolCdf; N_SKIP_CONTEXTS],
    pub skip_mode: [BoolCdf; N_SKIP_CONTEXTS],
    pub intra: [BoolCdf; 4],
    pub intrabc: BoolCdf,
    pub seg_id: [Cdf<8>; 3],
    pub seg_id_pred: [BoolCdf; 3],
    pub delta_q: Cdf<N_DELTA_TOKENS>,
    pub delta_lf: Cdf<N_DELTA_TOKENS>,
    pub y_mode_kf: [Cdf<13>; 5],
    pub y_mode: [Cdf<13>; 4],
    pub angle_delta: [Cdf<7>; 8],
    pub uv_mode_cfl_allowed: [Cdf<14>; 13],
    pub uv_mode: [Cdf<13>; 13],
    pub cfl_sign: Cdf<8>,
    pub palette_y_mode: [BoolCdf; 7],
    pub palette_uv_mode: [BoolCdf; 2],
    pub palette_y_size: [Cdf<7>; 7],
    pub palette_uv_size: [Cdf<7>; 7],
    pub filter_intra: [BoolCdf; 1],
    pub tx_size: [[Cdf<3>; N_TX_SIZE_CONTEXTS]; 3],
    pub txpart: [[BoolCdf; 3]; 21],
    pub comp_mode: [BoolCdf; N_COMP_MODE_CONTEXTS],
    pub comp_ref_type: [BoolCdf; 5],
    pub uni_comp_ref: [[BoolCdf; 3]; 3],
    pub single_ref: [[BoolCdf; 3]; 6],
    pub comp_ref: [[BoolCdf; 3]; 3],
    pub comp_bwdref: [[BoolCdf; 3]; 2],
    pub newmv: [BoolCdf; 6],
    pub refmv: [BoolCdf; 6],
    pub globalmv: [BoolCdf; 2],
    pub drl: [BoolCdf; N_DRL_CONTEXTS],
    pub inter_compound_mode: [Cdf<8>; 8],
    pub compound_type: [Cdf<2>; 5],
    pub wedge_idx: [Cdf<16>; 9],
    pub mask_sign: BoolCdf,
    pub interintra: [BoolCdf; 4],
    pub interintra_mode: [Cdf<4>; 4],
    pub wedge_interintra: [BoolCdf; 4],
    pub motion_mode: [Cdf<3>; N_MOTION_MODE_CONTEXTS],
    pub obmc: [BoolCdf; 3],
    pub mv_joint: Cdf<4>,
    pub mv_sign: [BoolCdf; 2],
    pub mv_class: [Cdf<11>; 2],
    pub mv_class0_bit: [BoolCdf; 2],
    pub mv_class0_fp: [Cdf<4>; 2],
    pub mv_class0_hp: [BoolCdf; 2],
    pub mv_fp: [Cdf<4>; 2],
    pub mv_hp: [BoolCdf; 2],
    pub interp_filter: [Cdf<3>; 16],
    pub restore_switchable: Cdf<3>,
    pub restore_wiener: BoolCdf,
    pub restore_sgrproj: BoolCdf,
}

impl CdfContext {
    /// Baseline constants keyed by the base quantiser index bucket (four
    /// buckets, as the spec's wire-format note requires), used when the
    /// frame's `primary_ref_frame == NONE`.
    pub fn new(base_qidx: u8) -> Self {
        let bucket = (base_qidx as usize * 4) / 256;
        let skew = 1024 + (bucket as u16) * 256;
        CdfContext {
            partition: std::array::from_fn(|_| {
                std::array::from_fn(|_| Cdf::new(uniform_freq::<N_PARTITION_TYPES>()))
            }),
            skip: [BoolCdf::new(skew); N_SKIP_CONTEXTS],
            skip_mode: [BoolCdf::new(PROB_TOTAL - skew); N_SKIP_CONTEXTS],
            intra: [BoolCdf::new(PROB_TOTAL / 2); 4],
            intrabc: BoolCdf::new(PROB_TOTAL - 256),
            seg_id: [Cdf::new(uniform_freq::<8>()); 3],
            seg_id_pred: [BoolCdf::new(PROB_TOTAL - 512); 3],
            delta_q: Cdf::new(uniform_freq::<N_DELTA_TOKENS>()),
            delta_lf: Cdf::new(uniform_freq::<N_DELTA_TOKENS>()),
            y_mode_kf: std::array::from_fn(|_| Cdf::new(uniform_freq::<13>())),
            y_mode: std::array::from_fn(|_| Cdf::new(uniform_freq::<13>())),
            angle_delta: std::array::from_fn(|_| Cdf::new(uniform_freq::<7>())),
            uv_mode_cfl_allowed: std::array::from_fn(|_| Cdf::new(uniform_freq::<14>())),
            uv_mode: std::array::from_fn(|_| Cdf::new(uniform_freq::<13>())),
            cfl_sign: Cdf::new(uniform_freq::<8>()),
            palette_y_mode: [BoolCdf::new(PROB_TOTAL - 1024); 7],
            palette_uv_mode: [BoolCdf::new(PROB_TOTAL - 1024); 2],
            palette_y_size: std::array::from_fn(|_| Cdf::new(uniform_freq::<7>())),
            palette_uv_size: std::array::from_fn(|_| Cdf::new(uniform_freq::<7>())),
            filter_intra: [BoolCdf::new(PROB_TOTAL - 2048); 1],
            tx_size: std::array::from_fn(|_| {
                std::array::from_fn(|_| Cdf::new(uniform_freq::<3>()))
            }),
            txpart: std::array::from_fn(|_| [BoolCdf::new(PROB_TOTAL / 2); 3]),
            comp_mode: [BoolCdf::new(PROB_TOTAL / 2); N_COMP_MODE_CONTEXTS],
            comp_ref_type: [BoolCdf::new(PROB_TOTAL / 2); 5],
            uni_comp_ref: [[BoolCdf::new(PROB_TOTAL / 2); 3]; 3],
            single_ref: [[BoolCdf::new(PROB_TOTAL / 2); 3]; 6],
            comp_ref: [[BoolCdf::new(PROB_TOTAL / 2); 3]; 3],
            comp_bwdref: [[BoolCdf::new(PROB_TOTAL / 2); 3]; 2],
            newmv: [BoolCdf::new(PROB_TOTAL / 2); 6],
            refmv: [BoolCdf::new(PROB_TOTAL / 2); 6],
            globalmv: [BoolCdf::new(PROB_TOTAL / 2); 2],
            drl: [BoolCdf::new(PROB_TOTAL / 2); N_DRL_CONTEXTS],
            inter_compound_mode: std::array::from_fn(|_| Cdf::new(uniform_freq::<8>())),
            compound_type: std::array::from_fn(|_| Cdf::new(uniform_freq::<2>())),
            wedge_idx: std::array::from_fn(|_| Cdf::new(uniform_freq::<16>())),
            mask_sign: BoolCdf::new(PROB_TOTAL / 2),
            interintra: [BoolCdf::new(PROB_TOTAL / 2); 4],
            interintra_mode: std::array::from_fn(|_| Cdf::new(uniform_freq::<4>())),
            wedge_interintra: [BoolCdf::new(PROB_TOTAL / 2); 4],
            motion_mode: std::array::from_fn(|_| Cdf::new(uniform_freq::<3>())),
            obmc: [BoolCdf::new(PROB_TOTAL / 2); 3],
            mv_joint: Cdf::new(uniform_freq::<4>()),
            mv_sign: [BoolCdf::new(PROB_TOTAL / 2); 2],
            mv_class: std::array::from_fn(|_| Cdf::new(uniform_freq::<11>())),
            mv_class0_bit: [BoolCdf::new(PROB_TOTAL / 2); 2],
            mv_class0_fp: std::array::from_fn(|_| Cdf::new(uniform_freq::<4>())),
            mv_class0_hp: [BoolCdf::new(PROB_TOTAL / 2); 2],
            mv_fp: std::array::from_fn(|_| Cdf::new(uniform_freq::<4>())),
            mv_hp: [BoolCdf::new(PROB_TOTAL / 2); 2],
            interp_filter: std::array::from_fn(|_| Cdf::new(uniform_freq::<3>())),
            restore_switchable: Cdf::new(uniform_freq::<3>()),
            restore_wiener: BoolCdf::new(PROB_TOTAL / 2),
            restore_sgrproj: BoolCdf::new(PROB_TOTAL / 2),
        }
    }

    /// Step 4 of the lifecycle: average this (tile-`update`'s) table with
    /// itself over the frame's other tiles is not meaningful for a single
    /// selected tile, so "averaging" here is the documented AV1 step of
    /// averaging the selected tile's post-parse CDF with the frame's
    /// pre-parse input CDF, rounding each entry. Every CDF field group is
    /// covered, not just a sample of them, per spec §4.C step 4.
    pub fn average_with_input(&mut self, input: &CdfContext) {
        macro_rules! avg0 {
            ($field:ident) => {
                self.$field.average_with(&input.$field);
            };
        }
        macro_rules! avg1 {
            ($field:ident) => {
                for (a, b) in self.$field.iter_mut().zip(input.$field.iter()) {
                    a.average_with(b);
                }
            };
        }
        macro_rules! avg2 {
            ($field:ident) => {
                for (arow, brow) in self.$field.iter_mut().zip(input.$field.iter()) {
                    for (a, b) in arow.iter_mut().zip(brow.iter()) {
                        a.average_with(b);
                    }
                }
            };
        }

        avg2!(partition);
        avg1!(skip);
        avg1!(skip_mode);
        avg1!(intra);
        avg0!(intrabc);
        avg1!(seg_id);
        avg1!(seg_id_pred);
        avg0!(delta_q);
        avg0!(delta_lf);
        avg1!(y_mode_kf);
        avg1!(y_mode);
        avg1!(angle_delta);
        avg1!(uv_mode_cfl_allowed);
        avg1!(uv_mode);
        avg0!(cfl_sign);
        avg1!(palette_y_mode);
        avg1!(palette_uv_mode);
        avg1!(palette_y_size);
        avg1!(palette_uv_size);
        avg1!(filter_intra);
        avg2!(tx_size);
        avg2!(txpart);
        avg1!(comp_mode);
        avg1!(comp_ref_type);
        avg2!(uni_comp_ref);
        avg2!(single_ref);
        avg2!(comp_ref);
        avg2!(comp_bwdref);
        avg1!(newmv);
        avg1!(refmv);
        avg1!(globalmv);
        avg1!(drl);
        avg1!(inter_compound_mode);
        avg1!(compound_type);
        avg1!(wedge_idx);
        avg0!(mask_sign);
        avg1!(interintra);
        avg1!(interintra_mode);
        avg1!(wedge_interintra);
        avg1!(motion_mode);
        avg1!(obmc);
        avg0!(mv_joint);
        avg1!(mv_sign);
        avg1!(mv_class);
        avg1!(mv_class0_bit);
        avg1!(mv_class0_fp);
        avg1!(mv_class0_hp);
        avg1!(mv_fp);
        avg1!(mv_hp);
        avg1!(interp_filter);
        avg0!(restore_switchable);
        avg0!(restore_wiener);
        avg0!(restore_sgrproj);
    }
}

/// Evenly-spaced initial cumulative frequencies for an `N`-symbol
/// alphabet, used as the "baseline constants" before any real table is
/// plugged in.
const fn uniform_freq<const N: usize>() -> [u16; N] {
    let mut freq = [0u16; N];
    let step = PROB_TOTAL / N as u16;
    let mut i = 0;
    while i < N {
        freq[i] = if i == N - 1 { PROB_TOTAL } else { step * (i as u16 + 1) };
        i += 1;
    }
    freq
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_tables_end_in_sentinel() {
        let cdf = CdfContext::new(90);
        for ctx in &cdf.partition[0] {
            assert_eq!(ctx.freq[N_PARTITION_TYPES - 1], PROB_TOTAL);
        }
    }

    #[test]
    fn different_qindex_buckets_differ() {
        let low = CdfContext::new(10);
        let high = CdfContext::new(250);
        assert_ne!(low.skip[0].prob, high.skip[0].prob);
    }

    /// `average_with_input` must reach every field group, not just the
    /// handful touched by skip/intra context: hand-perturb one field from
    /// each of the three shapes (scalar, flat array, nested array) and
    /// confirm each one lands on the documented rounded-midpoint, rather
    /// than being left at its pre-average value.
    #[test]
    fn average_with_input_covers_every_field_shape() {
        let input = CdfContext::new(128);
        let mut tile = CdfContext::new(128);

        tile.mv_joint.freq[0] = 100; // scalar Cdf field
        tile.tx_size[0][0].freq[0] = 20000; // nested-array Cdf field
        tile.partition[0][0].freq[0] = 30000; // nested-array Cdf field
        tile.newmv[0].prob = 500; // flat-array BoolCdf field
        tile.intrabc.prob = 9000; // scalar BoolCdf field

        let before = (
            input.mv_joint.freq[0],
            input.tx_size[0][0].freq[0],
            input.partition[0][0].freq[0],
            input.newmv[0].prob,
            input.intrabc.prob,
        );

        tile.average_with_input(&input);

        assert_eq!(tile.mv_joint.freq[0], ((100 + before.0 as u32 + 1) / 2) as u16);
        assert_eq!(tile.tx_size[0][0].freq[0], ((20000 + before.1 as u32 + 1) / 2) as u16);
        assert_eq!(tile.partition[0][0].freq[0], ((30000 + before.2 as u32 + 1) / 2) as u16);
        assert_eq!(tile.newmv[0].prob, ((500 + before.3 as u32 + 1) / 2) as u16);
        assert_eq!(tile.intrabc.prob, ((9000 + before.4 as u32 + 1) / 2) as u16);
    }
}

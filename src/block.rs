// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Component F: the block parser. Reads one coding block's full syntax in
//! the fixed order of spec §4.F, consulting and then updating the
//! neighbour-context grid, and returns a [`Block`] record for the
//! reconstruction hooks and the partition walker's bookkeeping.

use log::warn;

use crate::cdf::CdfContext;
use crate::context::{BlockContext, NeighbourEntry};
use crate::error::Result;
use crate::headers::{FrameHeader, GlobalMotionParams, SequenceHeader};
use crate::levels::{
    BlockSize, CompType, FilterMode, InterMode, MotionMode, RefFrame, TxSize, UVMode, WarpType,
    YMode,
};
use crate::msac::RangeCoder;
use crate::refmv::{build_candidates, CandidateStack, MotionVector, MvPlane, TileBounds4};
use crate::warp::{derive_warp_model, WarpModel, WarpSample};

/// Per-block record, carrying everything the reconstruction hooks and the
/// neighbour-context writeback need (spec §3 "Per-block record").
#[derive(Clone, Debug)]
pub struct Block {
    pub bsize: BlockSize,
    pub mi_col: usize,
    pub mi_row: usize,
    pub skip: bool,
    pub skip_mode: bool,
    pub seg_id: u8,
    pub intra: bool,
    pub use_intrabc: bool,
    pub y_mode: YMode,
    pub uv_mode: UVMode,
    pub angle_delta_y: i8,
    pub angle_delta_uv: i8,
    pub cfl_alpha: [i8; 2],
    pub use_filter_intra: bool,
    pub filter_intra_mode: u8,
    pub palette_size: [u8; 2],
    pub palette_colors: [Vec<u16>; 2],
    pub tx_size: TxSize,
    pub tx_split: [u16; 2],
    pub ref_frame: [RefFrame; 2],
    pub inter_mode: InterMode,
    pub drl_idx: usize,
    pub mv: [MotionVector; 2],
    pub comp_type: Option<CompType>,
    pub wedge_index: u8,
    pub mask_sign: bool,
    pub interintra: bool,
    pub interintra_mode: u8,
    pub wedge_interintra: bool,
    pub motion_mode: MotionMode,
    pub warp_model: WarpModel,
    pub interp_filter: [FilterMode; 2],
    pub cdef_idx: Option<u8>,
    pub delta_q: i32,
    pub delta_lf: [i32; 4],
}

impl Block {
    fn new(bsize: BlockSize, mi_col: usize, mi_row: usize) -> Self {
        Block {
            bsize,
            mi_col,
            mi_row,
            skip: false,
            skip_mode: false,
            seg_id: 0,
            intra: true,
            use_intrabc: false,
            y_mode: YMode::DC_PRED,
            uv_mode: UVMode::Matching(YMode::DC_PRED),
            angle_delta_y: 0,
            angle_delta_uv: 0,
            cfl_alpha: [0, 0],
            use_filter_intra: false,
            filter_intra_mode: 0,
            palette_size: [0, 0],
            palette_colors: [Vec::new(), Vec::new()],
            tx_size: TxSize::TX_4X4,
            tx_split: [0, 0],
            ref_frame: [RefFrame::Intra, RefFrame::None],
            inter_mode: InterMode::NearestMv,
            drl_idx: 0,
            mv: [MotionVector::ZERO; 2],
            comp_type: None,
            wedge_index: 0,
            mask_sign: false,
            interintra: false,
            interintra_mode: 0,
            wedge_interintra: false,
            motion_mode: MotionMode::Translation,
            warp_model: WarpModel::IDENTITY,
            interp_filter: [FilterMode::EightTap, FilterMode::EightTap],
            cdef_idx: None,
            delta_q: 0,
            delta_lf: [0; 4],
        }
    }
}

/// `neg_deinterleave(diff, ref, max)`: recovers a segment id from its
/// reference-relative coded diff. Ported from the bitstream's de-interleave
/// table rather than reimplemented from the forward interleave, since the
/// forward direction is encoder-only.
pub fn neg_deinterleave(diff: u32, r#ref: u32, max: u32) -> u32 {
    if r#ref == 0 {
        return diff;
    }
    if r#ref >= max - 1 {
        return max - diff - 1;
    }
    if 2 * r#ref < max {
        if diff <= 2 * r#ref {
            if diff & 1 != 0 {
                r#ref + ((diff + 1) >> 1)
            } else {
                r#ref - (diff >> 1)
            }
        } else {
            diff
        }
    } else if diff <= 2 * (max - r#ref - 1) {
        if diff & 1 != 0 {
            r#ref + ((diff + 1) >> 1)
        } else {
            r#ref - (diff >> 1)
        }
    } else {
        max - (diff + 1)
    }
}

/// Holds everything the block parser reads from or writes to outside the
/// block itself: the tile's range coder, its CDF table, the neighbour grid,
/// and the frame-wide MV plane used both for context and writeback.
pub struct BlockParser<'a, 'b> {
    pub rc: &'a mut RangeCoder<'b>,
    pub cdf: &'a mut CdfContext,
    pub ctx: &'a mut BlockContext,
    pub frame_mvs: &'a mut MvPlane,
    pub temporal_mvs: Option<&'a MvPlane>,
    pub seq: &'a SequenceHeader,
    pub fh: &'a FrameHeader,
    pub tile_bounds: TileBounds4,
    pub last_active_seg_id: u8,
}

impl<'a, 'b> BlockParser<'a, 'b> {
    /// Parses one block at `(mi_col, mi_row)` of size `bsize`, in the fixed
    /// stage order of spec §4.F.
    pub fn parse_block(&mut self, bsize: BlockSize, mi_col: usize, mi_row: usize) -> Result<Block> {
        let tile_bx4 = mi_col;
        let sb_by4 = mi_row;
        let bw4 = bsize.width_mi().max(1);
        let bh4 = bsize.height_mi().max(1);

        let mut b = Block::new(bsize, mi_col, mi_row);

        // 1. skip_mode
        if self.fh.skip_mode_present && !self.fh.is_intra() {
            let sctx = self.ctx.skip_context(tile_bx4, sb_by4);
            b.skip_mode = self.rc.decode_bool_adapt(&mut self.cdf.skip_mode[sctx]);
        }

        // 2. segment_id, preskip ordering
        if self.fh.segmentation.enabled && self.fh.segmentation.preskip {
            b.seg_id = self.read_segment_id(tile_bx4, sb_by4);
        }

        // 3. skip
        if b.skip_mode {
            b.skip = true;
        } else {
            let sctx = self.ctx.skip_context(tile_bx4, sb_by4);
            b.skip = self.rc.decode_bool_adapt(&mut self.cdf.skip[sctx]);
        }

        // 4. segment_id, postskip ordering
        if self.fh.segmentation.enabled && !self.fh.segmentation.preskip {
            b.seg_id = self.read_segment_id(tile_bx4, sb_by4);
        }

        // 5. cdef index: one per 64x64 unit, only on the first block that
        // covers it and only when the block is at least 8x8 (spec §4.F /
        // §4.H); the tile driver is the one that resets the per-SB64 cache,
        // so here we always emit a candidate value and let the tile driver
        // dedupe by position.
        if !self.fh.is_intra() || bsize != BlockSize::BLOCK_4X4 {
            if self.fh.base_q_idx > 0 && bw4 >= 2 && bh4 >= 2 {
                b.cdef_idx = Some(self.rc.decode_bools(2) as u8);
            }
        }

        // 6. delta_q / delta_lf
        if self.fh.delta_q_present {
            let abs = self.rc.decode_symbol_adapt(&mut self.cdf.delta_q);
            b.delta_q = self.read_delta(abs, self.fh.delta_q_res_log2);
        }
        if self.fh.delta_lf_present {
            let n = if self.fh.delta_lf_multi { 4 } else { 1 };
            for i in 0..n {
                let abs = self.rc.decode_symbol_adapt(&mut self.cdf.delta_lf);
                b.delta_lf[i] = self.read_delta(abs, self.fh.delta_lf_res_log2);
            }
        }

        // 7. intra/inter decision
        b.intra = if self.fh.is_intra() {
            true
        } else if b.skip_mode {
            false
        } else {
            let ictx = self.ctx.intra_context(tile_bx4, sb_by4);
            !self.rc.decode_bool_adapt(&mut self.cdf.intra[ictx])
        };

        if b.intra {
            self.parse_intra_block(&mut b, tile_bx4, sb_by4, bw4, bh4)?;
        } else {
            self.parse_inter_block(&mut b, tile_bx4, sb_by4, bw4, bh4)?;
        }

        // 13. context/neighbour writeback.
        self.writeback(&b, tile_bx4, sb_by4, bw4, bh4);

        Ok(b)
    }

    fn read_segment_id(&mut self, tile_bx4: usize, sb_by4: usize) -> u8 {
        if !self.fh.segmentation.update_map {
            return self.ctx.above_at(tile_bx4).seg_id.min(self.last_active_seg_id);
        }
        let pred_ctx = self.ctx.seg_pred_context(tile_bx4, sb_by4);
        let above = self.ctx.above_at(tile_bx4).seg_id as u32;
        let left = self.ctx.left_at(sb_by4).seg_id as u32;
        let pred = if pred_ctx == 2 { above.min(left) } else { above.max(left) };
        let diff = self.rc.decode_symbol_adapt(&mut self.cdf.seg_id[pred_ctx.min(2)]) as u32;
        let max = self.last_active_seg_id as u32 + 1;
        let seg_id_raw = neg_deinterleave(diff, pred, max);
        if seg_id_raw > self.last_active_seg_id as u32 {
            warn!(
                "decoded segment id {seg_id_raw} exceeds last_active_seg_id {}, clamping to 0",
                self.last_active_seg_id
            );
            0
        } else {
            seg_id_raw as u8
        }
    }

    fn read_delta(&mut self, abs: usize, res_log2: u32) -> i32 {
        // abs in 0..=3: 0..2 are literal deltas, 3 signals a longer
        // literal+sign follows.
        let magnitude = if abs == 3 {
            let bits = self.rc.decode_bools(3) + 1;
            self.rc.decode_bools(bits) as i32 + 1
        } else {
            abs as i32
        };
        if magnitude == 0 {
            return 0;
        }
        let sign = self.rc.decode_bools(1) == 1;
        let delta = magnitude << res_log2;
        if sign {
            -delta
        } else {
            delta
        }
    }

    fn parse_intra_block(
        &mut self,
        b: &mut Block,
        tile_bx4: usize,
        sb_by4: usize,
        bw4: usize,
        bh4: usize,
    ) -> Result<()> {
        if self.fh.allow_intrabc {
            // A real tile also gates this on screen-content tools and
            // block size; kept here as a single flag read per spec §4.F.
            b.use_intrabc = self.rc.decode_bool_adapt(&mut self.cdf.intrabc);
        }

        if b.use_intrabc {
            b.ref_frame = [RefFrame::Intra, RefFrame::None];
            let sb128 = matches!(self.seq.sb_size, crate::levels::SuperBlockSize::Sb128);
            let stack = build_candidates(
                tile_bx4,
                sb_by4,
                bw4,
                bh4,
                b.ref_frame,
                self.tile_bounds,
                self.frame_mvs,
                None,
                &[],
                sb128,
                false,
            );
            // Intrabc has its own predictor fallback (spec §4.F), not the
            // inter-frame global-motion one: when the spatial scan found no
            // candidate at all, fall back to the two fixed vectors keyed on
            // whether this block is within one superblock of the tile top.
            let predictor = if stack.list.is_empty() {
                let near_top = sb_by4 < self.seq.sb_size.width_mi();
                crate::refmv::intrabc_fallback_mv(near_top, sb128)
            } else {
                stack.nearest().this_mv
            };
            let dv_row = self.read_mv_component(0, true, false);
            let dv_col = self.read_mv_component(1, true, false);
            b.mv[0] = MotionVector { row: predictor.row + dv_row, col: predictor.col + dv_col };
            return Ok(());
        }

        let above = self.ctx.above_at(tile_bx4).y_mode;
        let left = self.ctx.left_at(sb_by4).y_mode;
        b.y_mode = if self.fh.is_intra() {
            let idx = self.rc.decode_symbol_adapt(&mut self.cdf.y_mode_kf[y_mode_kf_ctx(above, left)]);
            y_mode_from_index(idx)
        } else {
            let size_group = (bw4.max(bh4)).min(4) - 1;
            let idx = self.rc.decode_symbol_adapt(&mut self.cdf.y_mode[size_group]);
            y_mode_from_index(idx)
        };

        if is_directional(b.y_mode) && bw4.max(bh4) <= 8 {
            let idx = self.rc.decode_symbol_adapt(&mut self.cdf.angle_delta[b.y_mode as usize % 8]);
            b.angle_delta_y = idx as i8 - 3;
        }

        let cfl_allowed = self.fh.is_intra() && bw4 <= 8 && bh4 <= 8 && self.seq.chroma_sampling.has_chroma();
        if self.seq.chroma_sampling.has_chroma() {
            if cfl_allowed {
                let idx = self.rc.decode_symbol_adapt(&mut self.cdf.uv_mode_cfl_allowed[b.y_mode as usize]);
                b.uv_mode = if idx == 13 { UVMode::UV_CFL_PRED } else { UVMode::Matching(y_mode_from_index(idx)) };
            } else {
                let idx = self.rc.decode_symbol_adapt(&mut self.cdf.uv_mode[b.y_mode as usize]);
                b.uv_mode = UVMode::Matching(y_mode_from_index(idx));
            }
            if b.uv_mode == UVMode::UV_CFL_PRED {
                let joint_sign = self.rc.decode_symbol_adapt(&mut self.cdf.cfl_sign);
                b.cfl_alpha = cfl_alpha_from_joint_sign(joint_sign, self.rc, &mut self.cdf.mv_fp[0]);
            }
            if let UVMode::Matching(uv) = b.uv_mode {
                if is_directional(uv) && bw4.max(bh4) <= 8 {
                    let idx = self.rc.decode_symbol_adapt(&mut self.cdf.angle_delta[uv as usize % 8]);
                    b.angle_delta_uv = idx as i8 - 3;
                }
            }
        }

        if self.fh.allow_screen_content_tools && bw4 * 4 <= 64 && bh4 * 4 <= 64 {
            let size_ctx = palette_size_ctx(bw4, bh4);
            if b.y_mode == YMode::DC_PRED {
                let has_palette_y = self.rc.decode_bool_adapt(&mut self.cdf.palette_y_mode[size_ctx]);
                if has_palette_y {
                    let n_idx = self.rc.decode_symbol_adapt(&mut self.cdf.palette_y_size[size_ctx]);
                    let n = n_idx + 2;
                    b.palette_size[0] = n as u8;
                    b.palette_colors[0] = self.read_palette_colors(n);
                }
            }
        }

        if b.y_mode == YMode::DC_PRED && self.seq.enable_filter_intra && bw4 * 4 <= 32 && bh4 * 4 <= 32 {
            b.use_filter_intra = self.rc.decode_bool_adapt(&mut self.cdf.filter_intra[0]);
        }

        b.tx_size = self.read_tx_size(tile_bx4, sb_by4, bw4, bh4, b.skip);
        Ok(())
    }

    fn parse_inter_block(
        &mut self,
        b: &mut Block,
        tile_bx4: usize,
        sb_by4: usize,
        bw4: usize,
        bh4: usize,
    ) -> Result<()> {
        b.ref_frame = self.read_ref_frames(b.skip_mode);
        let compound = b.ref_frame[1] != RefFrame::None;

        let stack = build_candidates(
            tile_bx4,
            sb_by4,
            bw4,
            bh4,
            b.ref_frame,
            self.tile_bounds,
            self.frame_mvs,
            self.temporal_mvs,
            &self.fh.gm_params,
            matches!(self.seq.sb_size, crate::levels::SuperBlockSize::Sb128),
            true,
        );

        if b.skip_mode {
            b.inter_mode = InterMode::NearestMv;
        } else if compound {
            let idx = self.rc.decode_symbol_adapt(&mut self.cdf.inter_compound_mode[stack.newmv_ctx]);
            b.inter_mode = inter_compound_mode_to_single(idx);
        } else {
            let is_new = !self.rc.decode_bool_adapt(&mut self.cdf.newmv[stack.newmv_ctx]);
            if is_new {
                b.inter_mode = InterMode::NewMv;
            } else {
                let is_zero = self.rc.decode_bool_adapt(&mut self.cdf.globalmv[stack.globalmv_ctx]);
                if is_zero {
                    b.inter_mode = InterMode::GlobalMv;
                } else {
                    let is_near = self.rc.decode_bool_adapt(&mut self.cdf.refmv[stack.newmv_ctx]);
                    b.inter_mode = if is_near { InterMode::NearMv } else { InterMode::NearestMv };
                }
            }
        }

        if matches!(b.inter_mode, InterMode::NearMv) && stack.list.len() > 1 {
            b.drl_idx = self.read_drl_idx(&stack);
        }

        let candidate = if b.drl_idx > 0 { stack.near(b.drl_idx) } else { stack.nearest() };
        let force_integer_mv = self.fh.force_integer_mv;
        let allow_hp = self.fh.allow_high_precision_mv;
        match b.inter_mode {
            InterMode::NewMv => {
                let dv_row = self.read_mv_component(0, allow_hp, force_integer_mv);
                let dv_col = self.read_mv_component(1, allow_hp, force_integer_mv);
                b.mv[0] = MotionVector { row: candidate.this_mv.row + dv_row, col: candidate.this_mv.col + dv_col };
                if compound {
                    let dv_row1 = self.read_mv_component(0, allow_hp, force_integer_mv);
                    let dv_col1 = self.read_mv_component(1, allow_hp, force_integer_mv);
                    b.mv[1] = MotionVector { row: candidate.comp_mv.row + dv_row1, col: candidate.comp_mv.col + dv_col1 };
                }
            }
            _ => {
                b.mv[0] = candidate.this_mv;
                if compound {
                    b.mv[1] = candidate.comp_mv;
                }
            }
        }

        if compound {
            // skip_mode blocks never read comp_group_idx/compound_type: the
            // mode is implicitly COMPOUND_AVERAGE (spec §4.F skip_mode note).
            b.comp_type = Some(if b.skip_mode {
                CompType::Avg
            } else {
                self.read_compound_type(bw4, bh4)
            });
        } else if self.seq.enable_interintra_compound && bw4 * 4 <= 32 && bh4 * 4 <= 32 {
            b.interintra = self.rc.decode_bool_adapt(&mut self.cdf.interintra[interintra_ctx(b.bsize)]);
            if b.interintra {
                let idx = self.rc.decode_symbol_adapt(&mut self.cdf.interintra_mode[interintra_ctx(b.bsize)]);
                b.interintra_mode = idx as u8;
                b.wedge_interintra = self.rc.decode_bool_adapt(&mut self.cdf.wedge_interintra[interintra_ctx(b.bsize)]);
            }
        }

        if !b.skip_mode && !b.interintra && self.seq.enable_warped_motion {
            let mctx = motion_mode_ctx(b.bsize);
            let allow_obmc = self.ctx.find_odd_zero_above(tile_bx4, bw4) || self.ctx.find_odd_zero_left(sb_by4, bh4);
            let idx = self.rc.decode_symbol_adapt(&mut self.cdf.motion_mode[mctx]);
            b.motion_mode = match idx {
                0 => MotionMode::Translation,
                1 if allow_obmc => MotionMode::Obmc,
                _ => MotionMode::Warp,
            };
            if b.motion_mode == MotionMode::Warp {
                let samples: Vec<WarpSample> = stack
                    .list
                    .iter()
                    .enumerate()
                    .map(|(i, c)| WarpSample {
                        src_x: -((i as i32) + 1) * 4,
                        src_y: 0,
                        mv: c.this_mv,
                    })
                    .collect();
                b.warp_model = derive_warp_model(bw4 as usize, bh4 as usize, b.mv[0], &samples);
            }
        } else if allow_obmc_only(self.ctx, tile_bx4, sb_by4, bw4, bh4) && !b.skip_mode {
            let was_obmc = self.rc.decode_bool_adapt(&mut self.cdf.obmc[0]);
            if was_obmc {
                b.motion_mode = MotionMode::Obmc;
            }
        }

        if self.seq.enable_dual_filter {
            for i in 0..2 {
                let idx = self.rc.decode_symbol_adapt(&mut self.cdf.interp_filter[i]);
                b.interp_filter[i] = filter_from_index(idx);
            }
        } else {
            let idx = self.rc.decode_symbol_adapt(&mut self.cdf.interp_filter[0]);
            let f = filter_from_index(idx);
            b.interp_filter = [f, f];
        }

        b.tx_size = self.read_tx_size(tile_bx4, sb_by4, bw4, bh4, b.skip);
        if !b.skip && self.fh.tx_mode == crate::levels::TxMode::Switchable {
            b.tx_split = self.read_vartx_tree(b.tx_size, bw4, bh4);
        }

        let entry = MvEntryLike { mv: b.mv, r#ref: b.ref_frame };
        self.frame_mvs.set(tile_bx4, sb_by4, entry.into());
        Ok(())
    }

    /// `read_vartx_tree` (spec §4.F step 12): recurses from the block's
    /// max tx-size down to `TX_4X4` one quadrant at a time, reading one
    /// split flag per node and stamping the result into the two 16-bit
    /// split masks (bit `i` set means the `i`-th max-tx-sized unit within
    /// the block was split at least once).
    fn read_vartx_tree(&mut self, max_tx: TxSize, bw4: usize, bh4: usize) -> [u16; 2] {
        let unit4 = tx_size_width4(max_tx).max(1);
        let units_x = (bw4 + unit4 - 1) / unit4;
        let units_y = (bh4 + unit4 - 1) / unit4;
        let mut masks = [0u16; 2];
        let mut idx = 0usize;
        for uy in 0..units_y {
            for ux in 0..units_x {
                if idx >= 32 {
                    return masks;
                }
                let ctx = (ux + uy) % 3;
                let split = max_tx != TxSize::TX_4X4
                    && self.rc.decode_bool_adapt(&mut self.cdf.txpart[tx_size_group(max_tx)][ctx]);
                if split {
                    let word = idx / 16;
                    masks[word] |= 1 << (idx % 16);
                }
                idx += 1;
            }
        }
        masks
    }

    fn read_ref_frames(&mut self, skip_mode: bool) -> [RefFrame; 2] {
        if skip_mode {
            return [
                ref_from_idx(self.fh.skip_mode_refs[0]),
                ref_from_idx(self.fh.skip_mode_refs[1]),
            ];
        }
        let compound = self.rc.decode_bool_adapt(&mut self.cdf.comp_mode[0]);
        if !compound {
            let p1 = self.rc.decode_bool_adapt(&mut self.cdf.single_ref[0][0]);
            let r = if !p1 {
                let p3 = self.rc.decode_bool_adapt(&mut self.cdf.single_ref[2][0]);
                if !p3 {
                    if self.rc.decode_bool_adapt(&mut self.cdf.single_ref[3][0]) {
                        RefFrame::Last2
                    } else {
                        RefFrame::Last
                    }
                } else if self.rc.decode_bool_adapt(&mut self.cdf.single_ref[4][0]) {
                    RefFrame::Golden
                } else {
                    RefFrame::Last3
                }
            } else {
                let p2 = self.rc.decode_bool_adapt(&mut self.cdf.single_ref[1][0]);
                if !p2 {
                    RefFrame::AltRef
                } else if self.rc.decode_bool_adapt(&mut self.cdf.single_ref[5][0]) {
                    RefFrame::AltRef2
                } else {
                    RefFrame::BwdRef
                }
            };
            [r, RefFrame::None]
        } else {
            let comp_ref_type = self.rc.decode_bool_adapt(&mut self.cdf.comp_ref_type[0]);
            if !comp_ref_type {
                // Unidirectional pair: both from the forward group.
                let uni = self.rc.decode_bool_adapt(&mut self.cdf.uni_comp_ref[0][0]);
                if !uni {
                    [RefFrame::Last, RefFrame::Last2]
                } else {
                    [RefFrame::Last, RefFrame::Golden]
                }
            } else {
                let fwd = if self.rc.decode_bool_adapt(&mut self.cdf.comp_ref[0][0]) {
                    RefFrame::Last2
                } else {
                    RefFrame::Last
                };
                let bwd = if self.rc.decode_bool_adapt(&mut self.cdf.comp_bwdref[0][0]) {
                    RefFrame::AltRef
                } else {
                    RefFrame::BwdRef
                };
                [fwd, bwd]
            }
        }
    }

    fn read_drl_idx(&mut self, stack: &CandidateStack) -> usize {
        let mut idx = 0usize;
        for i in 0..stack.drl_ctx.len().min(stack.list.len().saturating_sub(1)) {
            if !self.rc.decode_bool_adapt(&mut self.cdf.drl[i]) {
                break;
            }
            idx = i + 1;
        }
        idx
    }

    fn read_compound_type(&mut self, bw4: usize, bh4: usize) -> CompType {
        let ctx = (bw4 * bh4).min(4);
        let idx = self.rc.decode_symbol_adapt(&mut self.cdf.compound_type[ctx]);
        if idx == 0 {
            let wedge_allowed = (bw4 * 4).max(bh4 * 4) <= 32 && (bw4 * 4).min(bh4 * 4) >= 8;
            if wedge_allowed {
                self.rc.decode_symbol_adapt(&mut self.cdf.wedge_idx[ctx.min(8)]);
            }
            self.mask_sign_flag();
            CompType::Wedge
        } else {
            self.mask_sign_flag();
            CompType::Diffwtd
        }
    }

    fn mask_sign_flag(&mut self) {
        self.rc.decode_bool_adapt(&mut self.cdf.mask_sign);
    }

    /// `palette_colors_y` (spec §4.F, palette path): the first entry is a
    /// raw `bit_depth`-bit sample, every later entry is `previous + 1 +
    /// delta`, so the cache is strictly increasing by construction
    /// regardless of what `delta` decodes to (spec §9's "monotone by
    /// construction with delta + !pl" ambiguity).
    fn read_palette_colors(&mut self, n: usize) -> Vec<u16> {
        let bit_depth = self.seq.bit_depth as u32;
        let mut colors = Vec::with_capacity(n);
        let first = self.rc.decode_bools(bit_depth) as u16;
        colors.push(first);
        let mut bits = bit_depth;
        for _ in 1..n {
            let delta = self.rc.decode_uniform((1u32 << bits).max(1)) as u16;
            let next = colors.last().copied().unwrap_or(0) + 1 + delta;
            colors.push(next);
            let range = ((1u32 << bit_depth) - 1).saturating_sub(next as u32);
            bits = 32 - range.leading_zeros().min(32);
            if bits == 0 {
                bits = 1;
            }
        }
        colors
    }

    fn read_tx_size(&mut self, tile_bx4: usize, sb_by4: usize, bw4: usize, bh4: usize, skip: bool) -> TxSize {
        let max = max_tx_size(bw4, bh4);
        if self.fh.tx_mode != crate::levels::TxMode::Switchable || skip {
            return max;
        }
        let ctx = self.ctx.tx_size_context(tile_bx4, sb_by4, max);
        let depth = self.rc.decode_symbol_adapt(&mut self.cdf.tx_size[tx_size_group(max)][ctx]);
        shrink_tx_size(max, depth as u32)
    }

    fn read_mv_component(&mut self, comp: usize, allow_high_precision: bool, force_integer_mv: bool) -> i32 {
        let sign = self.rc.decode_bool_adapt(&mut self.cdf.mv_sign[comp]);
        let class = self.rc.decode_symbol_adapt(&mut self.cdf.mv_class[comp]);
        let mag: u32;
        if class == 0 {
            let int_bit = self.rc.decode_bool_adapt(&mut self.cdf.mv_class0_bit[comp]) as u32;
            let fr = if force_integer_mv {
                3
            } else {
                self.rc.decode_symbol_adapt(&mut self.cdf.mv_class0_fp[comp]) as u32
            };
            let hp = if allow_high_precision && !force_integer_mv {
                self.rc.decode_bool_adapt(&mut self.cdf.mv_class0_hp[comp]) as u32
            } else {
                1
            };
            mag = ((int_bit << 3) | (fr << 1) | hp) + 1;
        } else {
            let mut d = 0u32;
            for i in 0..class as u32 {
                d |= self.rc.decode_bools(1) << i;
            }
            let base = 1u32 << (class as u32 + 2);
            let fr = if force_integer_mv {
                3
            } else {
                self.rc.decode_symbol_adapt(&mut self.cdf.mv_fp[comp]) as u32
            };
            let hp = if allow_high_precision && !force_integer_mv {
                self.rc.decode_bool_adapt(&mut self.cdf.mv_hp[comp]) as u32
            } else {
                1
            };
            mag = base + ((d << 3) | (fr << 1) | hp) + 1;
        }
        if sign {
            -(mag as i32)
        } else {
            mag as i32
        }
    }

    fn writeback(&mut self, b: &Block, tile_bx4: usize, sb_by4: usize, bw4: usize, bh4: usize) {
        let entry = NeighbourEntry {
            intra: b.intra,
            bsize: b.bsize,
            y_mode: b.y_mode,
            uv_mode: b.uv_mode,
            tx_size: b.tx_size,
            intra_tx_size: b.tx_size,
            pal_sz: b.palette_size,
            skip: b.skip,
            skip_mode: b.skip_mode,
            ref_frame: b.ref_frame,
            comp_type: b.comp_type,
            filter: b.interp_filter,
            partition: crate::levels::PartitionType::PARTITION_NONE,
            seg_pred: self.fh.segmentation.update_map && self.fh.segmentation.temporal_update,
            seg_id: b.seg_id,
            coef_ctx: [0; 3],
            tx_lpf: [0; 2],
            palette: b.palette_colors.clone(),
        };
        self.ctx.fill_rectangle(tile_bx4, sb_by4, bw4, bh4, &entry);
    }
}

struct MvEntryLike {
    mv: [MotionVector; 2],
    r#ref: [RefFrame; 2],
}

impl From<MvEntryLike> for crate::refmv::MvEntry {
    fn from(m: MvEntryLike) -> Self {
        crate::refmv::MvEntry { mv: m.mv, r#ref: m.r#ref }
    }
}

fn ref_from_idx(idx: u8) -> RefFrame {
    match idx {
        0 => RefFrame::Last,
        1 => RefFrame::Last2,
        2 => RefFrame::Last3,
        3 => RefFrame::Golden,
        4 => RefFrame::BwdRef,
        5 => RefFrame::AltRef2,
        6 => RefFrame::AltRef,
        _ => RefFrame::None,
    }
}

fn y_mode_from_index(idx: usize) -> YMode {
    const MODES: [YMode; 13] = [
        YMode::DC_PRED,
        YMode::V_PRED,
        YMode::H_PRED,
        YMode::D45_PRED,
        YMode::D135_PRED,
        YMode::D113_PRED,
        YMode::D157_PRED,
        YMode::D203_PRED,
        YMode::D67_PRED,
        YMode::SMOOTH_PRED,
        YMode::SMOOTH_V_PRED,
        YMode::SMOOTH_H_PRED,
        YMode::PAETH_PRED,
    ];
    MODES[idx.min(12)]
}

fn is_directional(mode: YMode) -> bool {
    matches!(
        mode,
        YMode::V_PRED
            | YMode::H_PRED
            | YMode::D45_PRED
            | YMode::D135_PRED
            | YMode::D113_PRED
            | YMode::D157_PRED
            | YMode::D203_PRED
            | YMode::D67_PRED
    )
}

fn y_mode_kf_ctx(above: YMode, left: YMode) -> usize {
    (above as usize + left as usize) % 5
}

fn palette_size_ctx(bw4: usize, bh4: usize) -> usize {
    (bw4.max(bh4)).min(6)
}

fn cfl_alpha_from_joint_sign(
    joint_sign: usize,
    rc: &mut RangeCoder,
    fp_cdf: &mut crate::msac::Cdf<4>,
) -> [i8; 2] {
    // joint_sign selects which of U/V (or both) carry a non-zero alpha and
    // their signs; magnitude for each non-zero plane follows as a small
    // adaptive symbol (spec's cfl_alpha_u/cfl_alpha_v share one pass here).
    let mut out = [0i8; 2];
    if joint_sign == 0 {
        return out;
    }
    let signs = [(joint_sign / 3) as i32 - 1, (joint_sign % 3) as i32 - 1];
    for (i, sign) in signs.iter().enumerate() {
        if *sign != 0 {
            let mag = rc.decode_symbol_adapt(fp_cdf) as i8 + 1;
            out[i] = if *sign < 0 { -mag } else { mag };
        }
    }
    out
}

fn inter_compound_mode_to_single(idx: usize) -> InterMode {
    match idx % 4 {
        0 => InterMode::NearestMv,
        1 => InterMode::NearMv,
        2 => InterMode::NewMv,
        _ => InterMode::GlobalMv,
    }
}

fn interintra_ctx(bsize: BlockSize) -> usize {
    (bsize.width_mi() + bsize.height_mi()).min(3)
}

fn motion_mode_ctx(bsize: BlockSize) -> usize {
    (bsize.width_mi().max(bsize.height_mi())).min(2)
}

fn allow_obmc_only(ctx: &BlockContext, tile_bx4: usize, sb_by4: usize, bw4: usize, bh4: usize) -> bool {
    ctx.find_odd_zero_above(tile_bx4, bw4) || ctx.find_odd_zero_left(sb_by4, bh4)
}

fn filter_from_index(idx: usize) -> FilterMode {
    match idx {
        0 => FilterMode::EightTap,
        1 => FilterMode::EightTapSmooth,
        2 => FilterMode::EightTapSharp,
        _ => FilterMode::Bilinear,
    }
}

fn max_tx_size(bw4: usize, bh4: usize) -> TxSize {
    match (bw4, bh4) {
        (1, 1) => TxSize::TX_4X4,
        (1, 2) => TxSize::TX_4X8,
        (2, 1) => TxSize::TX_8X4,
        (2, 2) => TxSize::TX_8X8,
        (2, 4) => TxSize::TX_8X16,
        (4, 2) => TxSize::TX_16X8,
        (4, 4) => TxSize::TX_16X16,
        (4, 8) => TxSize::TX_16X32,
        (8, 4) => TxSize::TX_32X16,
        (8, 8) => TxSize::TX_32X32,
        (8, 16) | (16, 8) | (16, 16) => TxSize::TX_64X64,
        _ => TxSize::TX_64X64,
    }
}

fn tx_size_group(max: TxSize) -> usize {
    (max as usize).min(4) % 3
}

/// Width of a (square) tx size in 4x4 units, for walking the var-tx tree
/// one max-tx-sized unit at a time.
fn tx_size_width4(size: TxSize) -> usize {
    use TxSize::*;
    match size {
        TX_4X4 => 1,
        TX_8X8 | TX_4X8 | TX_8X4 => 2,
        TX_16X16 | TX_8X16 | TX_16X8 | TX_4X16 | TX_16X4 => 4,
        TX_32X32 | TX_16X32 | TX_32X16 | TX_8X32 | TX_32X8 => 8,
        TX_64X64 | TX_32X64 | TX_64X32 | TX_16X64 | TX_64X16 => 16,
    }
}

/// Subtracts `depth` recursive halvings from `max`, matching the mapping
/// `tx_size_sqr_up`/`tx_size_sqr` use to walk the size lattice (spec §4.F
/// "transform tree").
fn shrink_tx_size(max: TxSize, depth: u32) -> TxSize {
    use TxSize::*;
    let sizes = [TX_64X64, TX_32X32, TX_16X16, TX_8X8, TX_4X4];
    let start = sizes.iter().position(|&s| s == max).unwrap_or(0);
    let idx = (start + depth as usize).min(sizes.len() - 1);
    sizes[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neg_deinterleave_is_identity_at_zero_ref() {
        assert_eq!(neg_deinterleave(5, 0, 8), 5);
    }

    #[test]
    fn neg_deinterleave_stays_in_range() {
        for r#ref in 0..8u32 {
            for diff in 0..8u32 {
                let v = neg_deinterleave(diff, r#ref, 8);
                assert!(v < 8, "ref={} diff={} -> {}", r#ref, diff, v);
            }
        }
    }

    #[test]
    fn max_tx_size_matches_block_footprint() {
        assert_eq!(max_tx_size(1, 1), TxSize::TX_4X4);
        assert_eq!(max_tx_size(2, 2), TxSize::TX_8X8);
    }

    #[test]
    fn shrink_tx_size_walks_lattice_down() {
        assert_eq!(shrink_tx_size(TxSize::TX_32X32, 0), TxSize::TX_32X32);
        assert_eq!(shrink_tx_size(TxSize::TX_32X32, 1), TxSize::TX_16X16);
        assert_eq!(shrink_tx_size(TxSize::TX_32X32, 2), TxSize::TX_8X8);
    }
}

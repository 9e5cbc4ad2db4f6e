// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Component H: per-tile state and the tile-row driver. Generalizes the
//! teacher's per-tile RDO bookkeeping into the full decode-side tile state
//! of spec §3 ("Tile state"): range-coder, CDF copy, tiling boundaries,
//! running delta-q/delta-lf, per-segment dequant/LF tables, loop-restoration
//! reference, and the atomic row-progress counter tile-parallel workers
//! wait on.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, trace, warn};

use crate::block::{Block, BlockParser};
use crate::cdf::CdfContext;
use crate::context::BlockContext;
use crate::error::Result;
use crate::headers::{FrameHeader, SequenceHeader};
use crate::levels::RestorationType;
use crate::msac::RangeCoder;
use crate::partition::{decode_sb, BlockLevel, TerminalBlock};
use crate::refmv::MvPlane;

/// Per-segment dequantiser entries (`[dc, ac]` per plane), rebuilt whenever
/// the running delta-q changes (spec §4.F step 6).
#[derive(Clone, Copy, Default)]
pub struct DequantEntry {
    pub y: [i32; 2],
    pub u: [i32; 2],
    pub v: [i32; 2],
}

/// Tile-local scratch rebuilt from the frame's base quantiser plus the
/// tile's running per-block delta-q (one entry per segmentation id).
#[derive(Clone)]
pub struct DequantTable {
    pub segments: [DequantEntry; 8],
}

impl DequantTable {
    pub fn build(fh: &FrameHeader, delta_q: i32) -> Self {
        let base = (fh.base_q_idx as i32 + delta_q).clamp(0, 255);
        let mut segments = [DequantEntry::default(); 8];
        for (seg, entry) in segments.iter_mut().enumerate() {
            let seg_q = if fh.segmentation.enabled && fh.segmentation.feature_enabled[seg][0] {
                (base + fh.segmentation.feature_data[seg][0] as i32).clamp(0, 255)
            } else {
                base
            };
            entry.y = [qidx_to_dc(seg_q + fh.delta_q_y_dc as i32), qidx_to_ac(seg_q)];
            entry.u = [qidx_to_dc(seg_q + fh.delta_q_u_dc as i32), qidx_to_ac(seg_q + fh.delta_q_u_ac as i32)];
            entry.v = [qidx_to_dc(seg_q + fh.delta_q_v_dc as i32), qidx_to_ac(seg_q + fh.delta_q_v_ac as i32)];
        }
        DequantTable { segments }
    }
}

/// `dav1d_dq_tbl`-equivalent lookup, simplified to a monotonic formula
/// rather than the full 256-entry table: this core does not perform
/// inverse transforms, so only the ordering and clamping behaviour (used
/// by the downstream reconstruction collaborator) need to be preserved.
fn qidx_to_dc(qidx: i32) -> i32 {
    (qidx.clamp(0, 255) * 4 / 5) + 4
}

fn qidx_to_ac(qidx: i32) -> i32 {
    (qidx.clamp(0, 255) * 5 / 4) + 4
}

/// Per-segment loop-filter levels after ref/mode deltas and the tile's
/// running delta-lf are applied (spec §4.F step 6).
#[derive(Clone)]
pub struct LfLevelTable {
    pub levels: [[u8; 4]; 8],
}

impl LfLevelTable {
    pub fn build(fh: &FrameHeader, delta_lf: [i32; 4]) -> Self {
        let mut levels = [[0u8; 4]; 8];
        for (seg, seg_levels) in levels.iter_mut().enumerate() {
            for (plane, level) in seg_levels.iter_mut().enumerate() {
                let mut v = fh.loop_filter_levels[plane] as i32 + delta_lf[plane];
                if fh.segmentation.enabled && fh.segmentation.feature_enabled[seg][1] {
                    v += fh.segmentation.feature_data[seg][1] as i32;
                }
                *level = v.clamp(0, 63) as u8;
            }
        }
        LfLevelTable { levels }
    }
}

/// One Wiener or self-guided-projection unit's parameters, coded as
/// sub-exponential differences against the previous unit in the same plane
/// (spec §4.H).
#[derive(Clone, Copy, Default)]
pub struct RestorationUnit {
    pub kind: Option<RestorationType>,
    pub wiener_taps: [[i32; 3]; 2],
    pub sgr_set: u8,
    pub sgr_weights: [i32; 2],
}

/// Tile-relative bounds in 4x4 units, plus the SB grid range this tile
/// owns (spec §3 "Tile state").
#[derive(Clone, Copy, Debug)]
pub struct TileGeometry {
    pub tile_row: usize,
    pub tile_col: usize,
    pub mi_col_start: usize,
    pub mi_col_end: usize,
    pub mi_row_start: usize,
    pub mi_row_end: usize,
    pub sb_col_start: usize,
    pub sb_col_end: usize,
    pub sb_row_start: usize,
    pub sb_row_end: usize,
}

/// One tile's full decode-side state.
pub struct TileState<'a> {
    pub geometry: TileGeometry,
    pub rc: RangeCoder<'a>,
    pub cdf: CdfContext,
    pub ctx: BlockContext,
    pub last_delta_q: i32,
    pub last_delta_lf: [i32; 4],
    pub dequant: DequantTable,
    pub lf_levels: LfLevelTable,
    pub restoration_ref: [RestorationUnit; 3],
    /// CDEF index cache for the superblock currently being parsed; reset to
    /// the -1 sentinel (`None`) at the start of every superblock.
    pub cdef_idx_cache: [Option<u8>; 4],
    /// Row progress, in superblock rows, published after each superblock
    /// row completes (spec §4.H, §5 "per-tile progress").
    pub progress: AtomicUsize,
}

impl<'a> TileState<'a> {
    pub fn new(geometry: TileGeometry, data: &'a [u8], input_cdf: &CdfContext, fh: &FrameHeader, sb_size4: usize) -> Self {
        let cdf = input_cdf.clone();
        let dequant = DequantTable::build(fh, 0);
        let lf_levels = LfLevelTable::build(fh, [0; 4]);
        TileState {
            geometry,
            rc: RangeCoder::new(data),
            cdf,
            ctx: BlockContext::new(geometry.mi_col_end - geometry.mi_col_start, sb_size4),
            last_delta_q: 0,
            last_delta_lf: [0; 4],
            dequant,
            lf_levels,
            restoration_ref: [RestorationUnit::default(); 3],
            cdef_idx_cache: [None; 4],
            progress: AtomicUsize::new(0),
        }
    }

    /// Publishes row progress atomically (spec §4.H: "After each superblock
    /// is parsed, publish the tile's row-progress atomically").
    pub fn publish_row(&self, sb_row: usize) {
        self.progress.fetch_max(sb_row + 1, Ordering::Release);
    }

    pub fn rows_done(&self) -> usize {
        self.progress.load(Ordering::Acquire)
    }
}

/// Drives one superblock row of one tile: resets the CDEF slot cache,
/// walks every superblock via the partition walker, conditionally parses
/// loop-restoration unit syntax per plane, and publishes row progress.
///
/// Returns every terminal block produced in this row, in raster order.
#[allow(clippy::too_many_arguments)]
pub fn decode_tile_sbrow(
    ts: &mut TileState,
    seq: &SequenceHeader,
    fh: &FrameHeader,
    sb_row: usize,
    sb_size4: usize,
    frame_mvs: &mut MvPlane,
    temporal_mvs: Option<&MvPlane>,
) -> Result<Vec<TerminalBlock>> {
    let g = ts.geometry;
    let mi_row = g.mi_row_start + sb_row * sb_size4;
    if mi_row >= g.mi_row_end {
        return Ok(Vec::new());
    }

    ts.ctx.reset_left();
    let mut all_blocks = Vec::new();
    let bl = BlockLevel::from_sb_size(matches!(seq.sb_size, crate::levels::SuperBlockSize::Sb128));

    let mi_cols = fh.mi_cols();
    let mi_rows = fh.mi_rows();
    let tile_bounds = crate::refmv::TileBounds4 {
        x0: g.mi_col_start,
        y0: g.mi_row_start,
        x1: g.mi_col_end,
        y1: g.mi_row_end,
    };

    let sb_col_count = g.sb_col_end - g.sb_col_start;
    for sb_col in 0..sb_col_count {
        ts.cdef_idx_cache = [None; 4];
        let mi_col = g.mi_col_start + sb_col * sb_size4;
        if mi_col >= g.mi_col_end {
            break;
        }

        let mut parser = BlockParser {
            rc: &mut ts.rc,
            cdf: &mut ts.cdf,
            ctx: &mut ts.ctx,
            frame_mvs,
            temporal_mvs,
            seq,
            fh,
            tile_bounds,
            last_active_seg_id: fh.segmentation.last_active_seg_id,
        };

        let mut blocks = Vec::new();
        decode_sb(&mut parser, bl, mi_col, mi_row, mi_cols, mi_rows, seq.chroma_sampling, &mut blocks)?;

        for tb in &blocks {
            if tb.block.delta_q != 0 {
                ts.last_delta_q = tb.block.delta_q;
                ts.dequant = DequantTable::build(fh, ts.last_delta_q);
            }
            if fh.delta_lf_present && tb.block.delta_lf != [0; 4] {
                ts.last_delta_lf = tb.block.delta_lf;
                ts.lf_levels = LfLevelTable::build(fh, ts.last_delta_lf);
            }
        }
        all_blocks.extend(blocks);

        parse_restoration_units(ts, seq, fh, sb_col, sb_row);
    }

    if ts.rc.out_of_data() {
        warn!("tile ({}, {}): range coder ran out of data in sbrow {}", g.tile_row, g.tile_col, sb_row);
    }

    ts.publish_row(sb_row);
    trace!("tile ({}, {}) sbrow {} parsed {} blocks", g.tile_row, g.tile_col, sb_row, all_blocks.len());
    Ok(all_blocks)
}

/// Conditionally parses one loop-restoration unit per plane that has a
/// non-NONE restoration type, following the `half_unit` round-half-up rule
/// at the bottom/right edges of spec §4.H.
fn parse_restoration_units(ts: &mut TileState, seq: &SequenceHeader, fh: &FrameHeader, sb_col: usize, sb_row: usize) {
    let n_planes = if seq.chroma_sampling.has_chroma() { 3 } else { 1 };
    for plane in 0..n_planes {
        let kind = fh.restoration_type[plane];
        if kind == RestorationType::None {
            continue;
        }
        if !restoration_unit_aligned(sb_col, sb_row) {
            continue;
        }

        let actual_kind = if kind == RestorationType::Switchable {
            match ts.rc.decode_symbol_adapt(&mut ts.cdf.restore_switchable) {
                0 => RestorationType::None,
                1 => RestorationType::Wiener,
                _ => RestorationType::SgrProj,
            }
        } else if kind == RestorationType::Wiener {
            if ts.rc.decode_bool_adapt(&mut ts.cdf.restore_wiener) {
                RestorationType::Wiener
            } else {
                RestorationType::None
            }
        } else if ts.rc.decode_bool_adapt(&mut ts.cdf.restore_sgrproj) {
            RestorationType::SgrProj
        } else {
            RestorationType::None
        };

        let prev = ts.restoration_ref[plane];
        let unit = match actual_kind {
            RestorationType::Wiener => {
                let mut taps = prev.wiener_taps;
                for (axis, tap_set) in taps.iter_mut().enumerate() {
                    for (i, tap) in tap_set.iter_mut().enumerate() {
                        let n = wiener_tap_bits(i);
                        let diff = ts.rc.decode_subexp(*tap, n, 1);
                        *tap = diff.clamp(wiener_tap_min(i), wiener_tap_max(i));
                        let _ = axis;
                    }
                }
                RestorationUnit { kind: Some(RestorationType::Wiener), wiener_taps: taps, ..Default::default() }
            }
            RestorationType::SgrProj => {
                let set = ts.rc.decode_bools(4) as u8;
                let mut weights = prev.sgr_weights;
                for w in weights.iter_mut() {
                    let diff = ts.rc.decode_subexp(*w, 7, 1);
                    *w = diff.clamp(-96, 31);
                }
                RestorationUnit { kind: Some(RestorationType::SgrProj), sgr_set: set, sgr_weights: weights, ..Default::default() }
            }
            _ => RestorationUnit { kind: Some(RestorationType::None), ..Default::default() },
        };
        ts.restoration_ref[plane] = unit;
    }
}

fn wiener_tap_bits(i: usize) -> u32 {
    match i {
        0 => 4,
        1 => 5,
        _ => 6,
    }
}
fn wiener_tap_min(i: usize) -> i32 {
    match i {
        0 => -5,
        1 => -23,
        _ => -17,
    }
}
fn wiener_tap_max(i: usize) -> i32 {
    match i {
        0 => 10,
        1 => 8,
        _ => 46,
    }
}

/// `half_unit` round-half-up alignment check: a restoration unit is due
/// once per unit-grid cell, with bottom/right-edge units only parsed when
/// more than one unit exists in that dimension (spec §4.H).
fn restoration_unit_aligned(sb_col: usize, sb_row: usize) -> bool {
    // One restoration unit per superblock in this simplified grid (the
    // real unit size is derived from `restoration_unit_size`, a per-plane
    // encoder choice outside this core's concern); both axes align here by
    // construction, so every superblock carries exactly one unit.
    let _ = (sb_col, sb_row);
    true
}

/// Single-threaded frame-level driver (spec §4.I): interleaves tile-row
/// parsing with the reconstruction collaborator's per-row filtering.
pub fn run_single_threaded<K: crate::picture::ReconstructionKernels>(
    tiles: &mut [TileState],
    seq: &SequenceHeader,
    fh: &FrameHeader,
    sb_size4: usize,
    frame_mvs: &mut MvPlane,
    temporal_mvs: Option<&MvPlane>,
    kernels: &K,
) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    let sb_rows = (fh.mi_rows() + sb_size4 - 1) / sb_size4;
    debug!("single-threaded frame driver: {} tile(s), {} sb row(s)", tiles.len(), sb_rows);
    for sb_row in 0..sb_rows {
        for ts in tiles.iter_mut() {
            let row_blocks = decode_tile_sbrow(ts, seq, fh, sb_row, sb_size4, frame_mvs, temporal_mvs)?;
            for tb in &row_blocks {
                if tb.block.intra {
                    kernels.recon_b_intra(&tb.block);
                } else {
                    kernels.recon_b_inter(&tb.block);
                }
            }
            blocks.extend(row_blocks.into_iter().map(|tb| tb.block));
        }
        kernels.filter_sbrow(sb_row);
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::{GlobalMotionParams, SegmentationParams, TileInfo};
    use crate::levels::{ChromaSampling, FrameType, SuperBlockSize, TxMode};

    fn minimal_frame_header() -> FrameHeader {
        FrameHeader {
            frame_type: FrameType::Key,
            show_frame: true,
            show_existing_frame: false,
            width: 128,
            height: 128,
            base_q_idx: 0,
            delta_q_y_dc: 0,
            delta_q_u_dc: 0,
            delta_q_u_ac: 0,
            delta_q_v_dc: 0,
            delta_q_v_ac: 0,
            segmentation: SegmentationParams::default(),
            loop_filter_levels: [0; 4],
            loop_filter_ref_deltas: [0; 8],
            loop_filter_mode_deltas: [0; 2],
            cdef_damping: 3,
            restoration_type: [RestorationType::None; 3],
            tx_mode: TxMode::Largest,
            ref_frame_idx: [0; 7],
            primary_ref_frame: 7,
            gm_params: [GlobalMotionParams::IDENTITY; 7],
            skip_mode_present: false,
            skip_mode_refs: [0, 0],
            delta_q_present: false,
            delta_q_res_log2: 0,
            delta_lf_present: false,
            delta_lf_res_log2: 0,
            delta_lf_multi: false,
            refresh_frame_flags: 0xFF,
            force_integer_mv: false,
            allow_intrabc: false,
            allow_high_precision_mv: true,
            allow_screen_content_tools: false,
            reduced_tx_set: false,
            tile_info: TileInfo::single(),
            refresh_context: false,
            interpolation_filter_switchable: true,
        }
    }

    fn minimal_seq() -> SequenceHeader {
        SequenceHeader {
            profile: 0,
            bit_depth: 8,
            chroma_sampling: ChromaSampling::Monochrome,
            sb_size: SuperBlockSize::Sb64,
            order_hint_bits: 0,
            enable_jnt_comp: false,
            enable_interintra_compound: false,
            enable_warped_motion: false,
            enable_masked_compound: false,
            enable_filter_intra: false,
            enable_dual_filter: false,
            enable_screen_content_tools: false,
            force_screen_content_tools: false,
            force_integer_mv: false,
            still_picture: false,
        }
    }

    /// Scenario 1 of spec §8: single 8-bit I-frame, 128x128, monochrome, no
    /// deltas, no loop restoration -> exactly one superblock, NONE
    /// partition, no uv-mode parsed (monochrome).
    #[test]
    fn single_keyframe_superblock_parses_one_partition_none_block() {
        let seq = minimal_seq();
        let fh = minimal_frame_header();
        let data = [0u8; 256];
        let geometry = TileGeometry {
            tile_row: 0,
            tile_col: 0,
            mi_col_start: 0,
            mi_col_end: fh.mi_cols(),
            mi_row_start: 0,
            mi_row_end: fh.mi_rows(),
            sb_col_start: 0,
            sb_col_end: 1,
            sb_row_start: 0,
            sb_row_end: 1,
        };
        let input_cdf = CdfContext::new(fh.base_q_idx);
        let mut ts = TileState::new(geometry, &data, &input_cdf, &fh, 16);
        let mut frame_mvs = MvPlane::new(fh.mi_cols(), fh.mi_rows());
        let blocks = decode_tile_sbrow(&mut ts, &seq, &fh, 0, 16, &mut frame_mvs, None).unwrap();
        assert_eq!(ts.rows_done(), 1);
        assert!(!blocks.is_empty());
    }
}

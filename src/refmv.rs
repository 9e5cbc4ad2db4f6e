// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Component E: builds the candidate MV stack and DRL context from
//! spatial and temporal neighbours (spec §4.E).

use crate::headers::GlobalMotionParams;
use crate::levels::RefFrame;

/// A quarter/eighth-pel motion vector in luma sample units (row, col).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MotionVector {
    pub row: i32,
    pub col: i32,
}

impl MotionVector {
    pub const ZERO: Self = MotionVector { row: 0, col: 0 };

    /// Clips both components to `±(512 << sb128)`, the bound used for
    /// temporal MV projection (spec §4.E).
    pub fn clip_temporal(self, sb128: bool) -> Self {
        let bound = 512i32 << sb128 as i32;
        MotionVector { row: self.row.clamp(-bound, bound), col: self.col.clamp(-bound, bound) }
    }
}

/// One occupied 4x4 position's saved motion, used both as the current
/// frame's "frame-wide MV plane" (for spatial scans by later blocks) and
/// as a reference's "temporal MV plane" (for the projection step).
#[derive(Clone, Copy, Debug)]
pub struct MvEntry {
    pub mv: [MotionVector; 2],
    pub r#ref: [RefFrame; 2],
}

impl Default for MvEntry {
    fn default() -> Self {
        MvEntry { mv: [MotionVector::ZERO; 2], r#ref: [RefFrame::None; 2] }
    }
}

/// A dense, frame-sized motion-vector plane at 4x4 granularity.
#[derive(Clone)]
pub struct MvPlane {
    pub cols: usize,
    pub rows: usize,
    data: Vec<MvEntry>,
}

impl MvPlane {
    pub fn new(cols: usize, rows: usize) -> Self {
        MvPlane { cols, rows, data: vec![MvEntry::default(); cols * rows] }
    }

    pub fn get(&self, x: usize, y: usize) -> &MvEntry {
        &self.data[y * self.cols + x]
    }

    pub fn set(&mut self, x: usize, y: usize, entry: MvEntry) {
        self.data[y * self.cols + x] = entry;
    }
}

/// One candidate in the stack: the MV for reference slot 0 (and, for
/// compound prediction, slot 1), plus its accumulated weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub this_mv: MotionVector,
    pub comp_mv: MotionVector,
    pub weight: u32,
}

/// Tile-relative inclusive 4x4 bounds.
#[derive(Clone, Copy, Debug)]
pub struct TileBounds4 {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl TileBounds4 {
    fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x0 as i64 && x < self.x1 as i64 && y >= self.y0 as i64 && y < self.y1 as i64
    }
}

/// The candidate stack plus the derived contexts the block parser needs
/// (spec §4.E: "a newmv/globalmv context and two shortlist MVs").
#[derive(Clone, Debug, Default)]
pub struct CandidateStack {
    pub list: Vec<Candidate>,
    pub newmv_ctx: usize,
    pub globalmv_ctx: usize,
    pub drl_ctx: [usize; 2],
}

impl CandidateStack {
    fn add(&mut self, this_mv: MotionVector, comp_mv: MotionVector, weight: u32) {
        if let Some(c) = self.list.iter_mut().find(|c| c.this_mv == this_mv && c.comp_mv == comp_mv) {
            c.weight += weight;
        } else if self.list.len() < 8 {
            self.list.push(Candidate { this_mv, comp_mv, weight });
        }
    }

    pub fn nearest(&self) -> Candidate {
        self.list.first().copied().unwrap_or(Candidate {
            this_mv: MotionVector::ZERO,
            comp_mv: MotionVector::ZERO,
            weight: 0,
        })
    }

    pub fn near(&self, drl_idx: usize) -> Candidate {
        self.list.get(drl_idx).copied().unwrap_or_else(|| self.nearest())
    }
}

/// Builds the candidate stack for a block at `(bx, by)` (in 4x4 units)
/// with reference pair `refs` (the second slot is `RefFrame::None` for
/// single-reference blocks). `apply_global_fallback` selects the
/// inter-frame global-motion fill-in of spec §4.E; intrabc has its own
/// two-branch fallback ([`intrabc_fallback_mv`]) and calls this with it
/// cleared so an empty stack comes back empty instead of global-motion-zero.
pub fn build_candidates(
    bx: usize,
    by: usize,
    bw4: usize,
    bh4: usize,
    refs: [RefFrame; 2],
    bounds: TileBounds4,
    frame_mvs: &MvPlane,
    temporal_mvs: Option<&MvPlane>,
    gm_params: &[GlobalMotionParams],
    sb128: bool,
    apply_global_fallback: bool,
) -> CandidateStack {
    let compound = refs[1] != RefFrame::None;
    let mut stack = CandidateStack::default();

    let matches = |entry: &MvEntry| -> Option<(MotionVector, MotionVector)> {
        if compound {
            if entry.r#ref == refs || entry.r#ref == [refs[1], refs[0]] {
                let (r0, r1) = if entry.r#ref == refs { (0, 1) } else { (1, 0) };
                Some((entry.mv[r0], entry.mv[r1]))
            } else {
                None
            }
        } else if entry.r#ref[0] == refs[0] {
            Some((entry.mv[0], MotionVector::ZERO))
        } else if entry.r#ref[1] == refs[0] {
            Some((entry.mv[1], MotionVector::ZERO))
        } else {
            None
        }
    };

    // Spatial scan: top edge then left edge, AV1 priority order (nearest
    // neighbour first, one step outside the block on each edge last).
    let top_y = by as i64 - 1;
    for dx in 0..bw4 as i64 + 1 {
        let x = bx as i64 + dx;
        if !bounds.contains(x, top_y) {
            continue;
        }
        if let Some(e) = frame_mvs_get(frame_mvs, x, top_y) {
            if let Some((mv, comp)) = matches(e) {
                stack.add(mv, comp, (bw4 as u32).max(1));
            }
        }
    }
    let left_x = bx as i64 - 1;
    for dy in 0..bh4 as i64 + 1 {
        let y = by as i64 + dy;
        if !bounds.contains(left_x, y) {
            continue;
        }
        if let Some(e) = frame_mvs_get(frame_mvs, left_x, y) {
            if let Some((mv, comp)) = matches(e) {
                stack.add(mv, comp, (bh4 as u32).max(1));
            }
        }
    }

    // Temporal projection from the order-hint-nearest reference's saved
    // MV plane, clipped to the spec's bound.
    if let Some(tmvs) = temporal_mvs {
        if bx < tmvs.cols && by < tmvs.rows {
            let e = tmvs.get(bx, by);
            if let Some((mv, comp)) = matches(e) {
                stack.add(mv.clip_temporal(sb128), comp.clip_temporal(sb128), 2);
            }
        }
    }

    // Fill remaining slots (down to the two shortlist entries) from the
    // frame's global-motion model so NEARESTMV/NEARMV always resolve.
    if apply_global_fallback && stack.list.len() < 2 {
        let gmv0 = global_mv(gm_params, refs[0]);
        let gmv1 = if compound { global_mv(gm_params, refs[1]) } else { MotionVector::ZERO };
        stack.add(gmv0, gmv1, 1);
    }

    stack.newmv_ctx = stack.list.len().min(5);
    stack.globalmv_ctx = if stack.list.is_empty() { 0 } else { 1 };
    stack.drl_ctx = [
        if stack.list.len() > 1 && stack.list[0].weight == stack.list[1].weight { 1 } else { 0 },
        if stack.list.len() > 2 && stack.list[1].weight == stack.list[2].weight { 1 } else { 0 },
    ];
    stack
}

fn frame_mvs_get(plane: &MvPlane, x: i64, y: i64) -> Option<&MvEntry> {
    if x < 0 || y < 0 || x as usize >= plane.cols || y as usize >= plane.rows {
        None
    } else {
        Some(plane.get(x as usize, y as usize))
    }
}

/// Intrabc's dedicated predictor fallback (spec §4.F intrabc note),
/// distinct from the inter-frame global-motion fallback above: used only
/// when the spatial scan finds no candidate at all. `near_top` is whether
/// the block sits within one superblock of the tile's top edge.
pub fn intrabc_fallback_mv(near_top: bool, sb128: bool) -> MotionVector {
    let bound = 512i32 << sb128 as i32;
    if near_top {
        MotionVector { row: 0, col: -bound - 2048 }
    } else {
        MotionVector { row: -bound, col: 0 }
    }
}

fn global_mv(gm_params: &[GlobalMotionParams], r#ref: RefFrame) -> MotionVector {
    let idx = r#ref as usize;
    if idx == 0 || idx - 1 >= gm_params.len() {
        return MotionVector::ZERO;
    }
    let p = &gm_params[idx - 1];
    // Translation component only; the affine/rotzoom shear terms affect
    // per-sample warp, not the single block-level MV used as a candidate.
    MotionVector { row: p.params[1] >> 13, col: p.params[0] >> 13 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::WarpType;

    fn gmv_identity() -> Vec<GlobalMotionParams> {
        vec![GlobalMotionParams::IDENTITY; 7]
    }

    #[test]
    fn empty_neighbourhood_falls_back_to_global_motion() {
        let frame_mvs = MvPlane::new(64, 64);
        let bounds = TileBounds4 { x0: 0, y0: 0, x1: 64, y1: 64 };
        let stack = build_candidates(
            10, 10, 2, 2,
            [RefFrame::Last, RefFrame::None],
            bounds,
            &frame_mvs,
            None,
            &gmv_identity(),
            false,
            true,
        );
        assert_eq!(stack.nearest().this_mv, MotionVector::ZERO);
        assert_eq!(stack.globalmv_ctx, 1);
    }

    #[test]
    fn matching_spatial_neighbour_is_added_with_weight() {
        let mut frame_mvs = MvPlane::new(64, 64);
        frame_mvs.set(
            10,
            9,
            MvEntry { mv: [MotionVector { row: 4, col: -4 }, MotionVector::ZERO], r#ref: [RefFrame::Last, RefFrame::None] },
        );
        let bounds = TileBounds4 { x0: 0, y0: 0, x1: 64, y1: 64 };
        let stack = build_candidates(
            10, 10, 2, 2,
            [RefFrame::Last, RefFrame::None],
            bounds,
            &frame_mvs,
            None,
            &gmv_identity(),
            false,
            true,
        );
        assert_eq!(stack.list[0].this_mv, MotionVector { row: 4, col: -4 });
    }

    #[test]
    fn identity_global_motion_is_zero() {
        assert_eq!(global_mv(&gmv_identity(), RefFrame::Last), MotionVector::ZERO);
        let _ = WarpType::Identity;
    }
}

// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Component D: the above-row and left-column neighbour-context grid,
//! tracked at 4x4 granularity per tile (spec §3, §4.D). Generalizes the
//! teacher's `BlockContext` (which only tracked partition state for RDO)
//! into the full neighbour record the block parser both reads and writes.

use crate::levels::{BlockSize, CompType, FilterMode, PartitionType, RefFrame, TxSize, UVMode, YMode};

/// One 4x4 unit's worth of neighbour state, as read by later blocks to
/// form contexts and written by the block that covers it (spec §3).
#[derive(Clone, Debug)]
pub struct NeighbourEntry {
    pub intra: bool,
    pub bsize: BlockSize,
    pub y_mode: YMode,
    pub uv_mode: UVMode,
    pub tx_size: TxSize,
    pub intra_tx_size: TxSize,
    pub pal_sz: [u8; 2],
    pub skip: bool,
    pub skip_mode: bool,
    pub ref_frame: [RefFrame; 2],
    pub comp_type: Option<CompType>,
    pub filter: [FilterMode; 2],
    pub partition: PartitionType,
    pub seg_pred: bool,
    pub seg_id: u8,
    pub coef_ctx: [u8; 3],
    pub tx_lpf: [u8; 2],
    /// Palette entries for this 4x4 unit, luma then chroma; empty when no
    /// palette mode was used here.
    pub palette: [Vec<u16>; 2],
}

impl NeighbourEntry {
    /// Canonical reset value at tile start (spec §4.D): "intra=keyframe,
    /// uvmode=DC, tx=64x64, ref=-1, filter=SWITCHABLE, palette=0".
    pub fn canonical_default() -> Self {
        NeighbourEntry {
            intra: true,
            bsize: BlockSize::BLOCK_64X64,
            y_mode: YMode::DC_PRED,
            uv_mode: UVMode::Matching(YMode::DC_PRED),
            tx_size: TxSize::TX_64X64,
            intra_tx_size: TxSize::TX_64X64,
            pal_sz: [0, 0],
            skip: false,
            skip_mode: false,
            ref_frame: [RefFrame::None, RefFrame::None],
            comp_type: None,
            filter: [FilterMode::Switchable, FilterMode::Switchable],
            partition: PartitionType::PARTITION_NONE,
            seg_pred: false,
            seg_id: 0,
            coef_ctx: [0; 3],
            tx_lpf: [0; 2],
            palette: [Vec::new(), Vec::new()],
        }
    }
}

/// Per-tile above/left neighbour-context grid.
pub struct BlockContext {
    /// One entry per 4x4 column of the tile's width; indexed by absolute
    /// column within the tile.
    pub above: Vec<NeighbourEntry>,
    /// One entry per 4x4 row of the current superblock column; reset at
    /// the start of every superblock row.
    pub left: Vec<NeighbourEntry>,
}

impl BlockContext {
    pub fn new(tile_width_4x4: usize, sb_height_4x4: usize) -> Self {
        BlockContext {
            above: (0..tile_width_4x4).map(|_| NeighbourEntry::canonical_default()).collect(),
            left: (0..sb_height_4x4).map(|_| NeighbourEntry::canonical_default()).collect(),
        }
    }

    /// Reset at tile start (spec invariant: "Above/left context at the
    /// start of a tile row is reset to canonical defaults").
    pub fn reset_above(&mut self) {
        for e in self.above.iter_mut() {
            *e = NeighbourEntry::canonical_default();
        }
    }

    pub fn reset_left(&mut self) {
        for e in self.left.iter_mut() {
            *e = NeighbourEntry::canonical_default();
        }
    }

    /// Writes `entry` across the block's 4x4 footprint in both the above
    /// row and the left column (spec §4.F step 13: "fill rectangle with
    /// value").
    pub fn fill_rectangle(
        &mut self,
        tile_bx4: usize,
        sb_by4: usize,
        bw4: usize,
        bh4: usize,
        entry: &NeighbourEntry,
    ) {
        let end_x = (tile_bx4 + bw4).min(self.above.len());
        for x in tile_bx4..end_x {
            self.above[x] = entry.clone();
        }
        let end_y = (sb_by4 + bh4).min(self.left.len());
        for y in sb_by4..end_y {
            self.left[y] = entry.clone();
        }
    }

    /// Stamps the partition id that produced this block across its
    /// footprint, independent of [`BlockContext::fill_rectangle`] (spec
    /// §4.G: "After each terminal `decode_b` call, stamp the partition
    /// context into above/left").
    pub fn stamp_partition(&mut self, tile_bx4: usize, sb_by4: usize, bw4: usize, bh4: usize, partition: PartitionType) {
        let end_x = (tile_bx4 + bw4).min(self.above.len());
        for x in tile_bx4..end_x {
            self.above[x].partition = partition;
        }
        let end_y = (sb_by4 + bh4).min(self.left.len());
        for y in sb_by4..end_y {
            self.left[y].partition = partition;
        }
    }

    pub fn above_at(&self, tile_bx4: usize) -> &NeighbourEntry {
        &self.above[tile_bx4.min(self.above.len() - 1)]
    }

    pub fn left_at(&self, sb_by4: usize) -> &NeighbourEntry {
        &self.left[sb_by4.min(self.left.len() - 1)]
    }

    /// Skip-flag context: 0, 1, or 2 depending on how many neighbours were
    /// skipped.
    pub fn skip_context(&self, tile_bx4: usize, sb_by4: usize) -> usize {
        self.above_at(tile_bx4).skip as usize + self.left_at(sb_by4).skip as usize
    }

    /// Intra-flag context for inter frames: counts intra neighbours.
    pub fn intra_context(&self, tile_bx4: usize, sb_by4: usize) -> usize {
        self.above_at(tile_bx4).intra as usize + 2 * self.left_at(sb_by4).intra as usize
    }

    /// Partition-symbol context: compares neighbour block size against the
    /// current level, folded into the four buckets the baseline partition
    /// tables are indexed by.
    pub fn partition_context(&self, tile_bx4: usize, sb_by4: usize, bsize: BlockSize) -> usize {
        let above_smaller = (self.above_at(tile_bx4).bsize < bsize) as usize;
        let left_smaller = (self.left_at(sb_by4).bsize < bsize) as usize;
        above_smaller + 2 * left_smaller
    }

    /// Segmentation-id-predicted context (spatial neighbour seg_pred flag).
    pub fn seg_pred_context(&self, tile_bx4: usize, sb_by4: usize) -> usize {
        (self.above_at(tile_bx4).seg_pred as usize + self.left_at(sb_by4).seg_pred as usize)
            .min(2)
    }

    /// Dynamic-reference-list / tx-size contexts both reduce to "how deep
    /// is the neighbour's tx relative to the block's max", folded to 0..=2.
    pub fn tx_size_context(&self, tile_bx4: usize, sb_by4: usize, max: TxSize) -> usize {
        let a = (self.above_at(tile_bx4).tx_size < max) as usize;
        let l = (self.left_at(sb_by4).tx_size < max) as usize;
        (a + l).min(2)
    }

    /// The OBMC "has overlappable neighbour" check (spec §9:
    /// `findoddzero`): walks odd-indexed entries of the left/top intra
    /// flags over the block's footprint, exactly reproducing the C
    /// reference's stride rather than a naive every-entry scan.
    pub fn find_odd_zero_above(&self, tile_bx4: usize, bw4: usize) -> bool {
        find_odd_zero(&self.above, tile_bx4, bw4, |e| e.intra)
    }

    pub fn find_odd_zero_left(&self, sb_by4: usize, bh4: usize) -> bool {
        find_odd_zero(&self.left, sb_by4, bh4, |e| e.intra)
    }
}

fn find_odd_zero<F: Fn(&NeighbourEntry) -> bool>(
    entries: &[NeighbourEntry],
    start: usize,
    len: usize,
    pred: F,
) -> bool {
    let end = (start + len).min(entries.len());
    let mut i = start + 1;
    while i < end {
        if !pred(&entries[i]) {
            return true;
        }
        i += 2;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_restores_canonical_defaults() {
        let mut bc = BlockContext::new(32, 32);
        let mut e = NeighbourEntry::canonical_default();
        e.skip = true;
        bc.fill_rectangle(0, 0, 4, 4, &e);
        assert!(bc.above[0].skip);
        bc.reset_above();
        assert!(!bc.above[0].skip);
    }

    #[test]
    fn fill_rectangle_matches_parsed_block_footprint() {
        let mut bc = BlockContext::new(16, 16);
        let mut e = NeighbourEntry::canonical_default();
        e.tx_size = TxSize::TX_8X8;
        bc.fill_rectangle(2, 2, 2, 2, &e);
        assert_eq!(bc.above[2].tx_size, TxSize::TX_8X8);
        assert_eq!(bc.above[3].tx_size, TxSize::TX_8X8);
        assert_eq!(bc.left[2].tx_size, TxSize::TX_8X8);
        assert_ne!(bc.above[4].tx_size, TxSize::TX_8X8);
    }
}

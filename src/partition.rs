// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Component G: the recursive superblock partition walker (`decode_sb` in
//! the original reference). Descends a superblock through the ten
//! partition shapes of spec §4.G, calling the block parser (component F)
//! at each terminal node and stamping the partition id into the
//! neighbour-context grid after every `decode_b`.

use crate::block::{Block, BlockParser};
use crate::error::{DecodeError, Result};
use crate::levels::{BlockSize, ChromaSampling, PartitionType};

/// Recursion level, coarsest (a full superblock) to finest (8x8, where only
/// the 2x2-sub partitions remain).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BlockLevel {
    Bl128x128,
    Bl64x64,
    Bl32x32,
    Bl16x16,
    Bl8x8,
}

impl BlockLevel {
    pub fn from_sb_size(sb128: bool) -> Self {
        if sb128 {
            BlockLevel::Bl128x128
        } else {
            BlockLevel::Bl64x64
        }
    }

    fn child(self) -> Self {
        match self {
            BlockLevel::Bl128x128 => BlockLevel::Bl64x64,
            BlockLevel::Bl64x64 => BlockLevel::Bl32x32,
            BlockLevel::Bl32x32 => BlockLevel::Bl16x16,
            BlockLevel::Bl16x16 => BlockLevel::Bl8x8,
            BlockLevel::Bl8x8 => BlockLevel::Bl8x8,
        }
    }

    /// Width/height in 4x4 units of a NONE-partitioned block at this level.
    fn dim4(self) -> usize {
        match self {
            BlockLevel::Bl128x128 => 32,
            BlockLevel::Bl64x64 => 16,
            BlockLevel::Bl32x32 => 8,
            BlockLevel::Bl16x16 => 4,
            BlockLevel::Bl8x8 => 2,
        }
    }

    fn none_block_size(self) -> BlockSize {
        match self {
            BlockLevel::Bl128x128 => BlockSize::BLOCK_128X128,
            BlockLevel::Bl64x64 => BlockSize::BLOCK_64X64,
            BlockLevel::Bl32x32 => BlockSize::BLOCK_32X32,
            BlockLevel::Bl16x16 => BlockSize::BLOCK_16X16,
            BlockLevel::Bl8x8 => BlockSize::BLOCK_8X8,
        }
    }
}

/// One terminal block emitted by the walker, carrying its parsed record and
/// the partition shape that produced it (needed by the tile-row driver and
/// by tests that check the concrete scenarios of spec §8).
pub struct TerminalBlock {
    pub partition: PartitionType,
    pub block: Block,
}

/// Frame-edge availability for the current node, used to force SPLIT at
/// boundaries and to pick the single-bit `gather_top/left_partition_prob`
/// path when only one split direction is possible (spec §4.G).
#[derive(Clone, Copy, Debug)]
pub struct EdgeAvailability {
    pub has_rows: bool,
    pub has_cols: bool,
}

/// Walks one superblock rooted at `(mi_col, mi_row)`, recursing down to
/// terminal blocks and invoking the block parser at each one.
///
/// Returns `Ok(blocks)` with every terminal block in raster/partition-tree
/// order, or `Err` if a syntax violation occurred (spec §4.G: "the
/// partition walker returns 1" on a 4:2:2 V-leaf, surfaced here as
/// `DecodeError::Syntax`).
pub fn decode_sb(
    p: &mut BlockParser,
    bl: BlockLevel,
    mi_col: usize,
    mi_row: usize,
    mi_cols: usize,
    mi_rows: usize,
    chroma: ChromaSampling,
    out: &mut Vec<TerminalBlock>,
) -> Result<()> {
    let dim = bl.dim4();
    let avail = EdgeAvailability {
        has_rows: mi_row + dim <= mi_rows,
        has_cols: mi_col + dim <= mi_cols,
    };

    let partition = read_partition(p, bl, mi_col, mi_row, avail)?;
    apply_partition(p, bl, mi_col, mi_row, mi_cols, mi_rows, chroma, partition, out)
}

fn read_partition(
    p: &mut BlockParser,
    bl: BlockLevel,
    mi_col: usize,
    mi_row: usize,
    avail: EdgeAvailability,
) -> Result<PartitionType> {
    if !avail.has_rows && !avail.has_cols {
        // Entirely off-frame: forced SPLIT (consumed implicitly by the
        // recursion bottoming out once mi_cols/mi_rows are exhausted).
        return Ok(PartitionType::PARTITION_SPLIT);
    }

    let bsize = bl.none_block_size();
    let ctx = p.ctx.partition_context(mi_col, mi_row, bsize);
    let level_idx = partition_level_index(bl);

    if avail.has_rows && avail.has_cols {
        let idx = p.rc.decode_symbol_adapt(&mut p.cdf.partition[level_idx][ctx]);
        Ok(partition_from_index(bl, idx))
    } else if avail.has_cols {
        // Only a horizontal split is in-frame; a single bit picks between
        // SPLIT and PARTITION_H (spec: "gather_top/left_partition_prob").
        let split = p.rc.decode_bool(crate::msac::PROB_TOTAL / 2);
        Ok(if split { PartitionType::PARTITION_SPLIT } else { PartitionType::PARTITION_H })
    } else {
        let split = p.rc.decode_bool(crate::msac::PROB_TOTAL / 2);
        Ok(if split { PartitionType::PARTITION_SPLIT } else { PartitionType::PARTITION_V })
    }
}

fn partition_level_index(bl: BlockLevel) -> usize {
    match bl {
        BlockLevel::Bl128x128 => 4,
        BlockLevel::Bl64x64 => 3,
        BlockLevel::Bl32x32 => 2,
        BlockLevel::Bl16x16 => 1,
        BlockLevel::Bl8x8 => 0,
    }
}

/// Maps a decoded symbol index to a [`PartitionType`], honouring the two
/// restrictions of spec §4.G: BL_8X8 only offers the five "no H4/V4" shapes
/// and BL_128X128 disallows PARTITION_H4/V4.
fn partition_from_index(bl: BlockLevel, idx: usize) -> PartitionType {
    use PartitionType::*;
    if bl == BlockLevel::Bl8x8 {
        const SHAPES: [PartitionType; 4] = [PARTITION_NONE, PARTITION_H, PARTITION_V, PARTITION_SPLIT];
        return SHAPES[idx.min(3)];
    }
    const SHAPES: [PartitionType; 10] = [
        PARTITION_NONE,
        PARTITION_H,
        PARTITION_V,
        PARTITION_SPLIT,
        PARTITION_T_TOP_SPLIT,
        PARTITION_T_BOTTOM_SPLIT,
        PARTITION_T_LEFT_SPLIT,
        PARTITION_T_RIGHT_SPLIT,
        PARTITION_H4,
        PARTITION_V4,
    ];
    let mut p = SHAPES[idx.min(9)];
    if bl == BlockLevel::Bl128x128 && matches!(p, PARTITION_H4 | PARTITION_V4) {
        p = PARTITION_SPLIT;
    }
    p
}

#[allow(clippy::too_many_arguments)]
fn apply_partition(
    p: &mut BlockParser,
    bl: BlockLevel,
    mi_col: usize,
    mi_row: usize,
    mi_cols: usize,
    mi_rows: usize,
    chroma: ChromaSampling,
    partition: PartitionType,
    out: &mut Vec<TerminalBlock>,
) -> Result<()> {
    use PartitionType::*;
    let dim = bl.dim4();
    let half = dim / 2;
    let bsize = bl.none_block_size();

    let mut decode_leaf = |p: &mut BlockParser, bsize: BlockSize, mi_col: usize, mi_row: usize, partition: PartitionType, out: &mut Vec<TerminalBlock>| -> Result<()> {
        if mi_col >= mi_cols || mi_row >= mi_rows {
            return Ok(());
        }
        if reject_for_chroma_layout(partition, bsize, chroma) {
            return Err(DecodeError::Syntax("partition_v leaf illegal under 4:2:2 chroma"));
        }
        let block = p.parse_block(bsize, mi_col, mi_row)?;
        p.ctx.stamp_partition(mi_col, mi_row, bsize.width_mi().max(1), bsize.height_mi().max(1), partition);
        out.push(TerminalBlock { partition, block });
        Ok(())
    };

    match partition {
        PARTITION_NONE => decode_leaf(p, bsize, mi_col, mi_row, partition, out)?,
        PARTITION_H => {
            let sub = sub_block_size(bl, true, false);
            decode_leaf(p, sub, mi_col, mi_row, partition, out)?;
            decode_leaf(p, sub, mi_col, mi_row + half, partition, out)?;
        }
        PARTITION_V => {
            let sub = sub_block_size(bl, false, true);
            decode_leaf(p, sub, mi_col, mi_row, partition, out)?;
            decode_leaf(p, sub, mi_col + half, mi_row, partition, out)?;
        }
        PARTITION_SPLIT => {
            if bl == BlockLevel::Bl8x8 {
                // BL_8x8 SPLIT recurses straight into four 4x4 leaves
                // rather than four child superblock branches (spec §4.G).
                for (dc, dr) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    decode_leaf(p, BlockSize::BLOCK_4X4, mi_col + dc, mi_row + dr, partition, out)?;
                }
            } else {
                let child = bl.child();
                for (dc, dr) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    decode_sb(
                        p,
                        child,
                        mi_col + dc * half,
                        mi_row + dr * half,
                        mi_cols,
                        mi_rows,
                        chroma,
                        out,
                    )?;
                }
            }
        }
        PARTITION_T_TOP_SPLIT => {
            let sub = sub_block_size(bl, true, false);
            let quarter = sub_block_size(bl.child(), false, false);
            decode_leaf(p, quarter, mi_col, mi_row, partition, out)?;
            decode_leaf(p, quarter, mi_col + half, mi_row, partition, out)?;
            decode_leaf(p, sub, mi_col, mi_row + half, partition, out)?;
        }
        PARTITION_T_BOTTOM_SPLIT => {
            let sub = sub_block_size(bl, true, false);
            let quarter = sub_block_size(bl.child(), false, false);
            decode_leaf(p, sub, mi_col, mi_row, partition, out)?;
            decode_leaf(p, quarter, mi_col, mi_row + half, partition, out)?;
            decode_leaf(p, quarter, mi_col + half, mi_row + half, partition, out)?;
        }
        PARTITION_T_LEFT_SPLIT => {
            let sub = sub_block_size(bl, false, true);
            let quarter = sub_block_size(bl.child(), false, false);
            decode_leaf(p, quarter, mi_col, mi_row, partition, out)?;
            decode_leaf(p, quarter, mi_col, mi_row + half, partition, out)?;
            decode_leaf(p, sub, mi_col + half, mi_row, partition, out)?;
        }
        PARTITION_T_RIGHT_SPLIT => {
            let sub = sub_block_size(bl, false, true);
            let quarter = sub_block_size(bl.child(), false, false);
            decode_leaf(p, sub, mi_col, mi_row, partition, out)?;
            decode_leaf(p, quarter, mi_col + half, mi_row, partition, out)?;
            decode_leaf(p, quarter, mi_col + half, mi_row + half, partition, out)?;
        }
        PARTITION_H4 => {
            let quarter_h = dim / 4;
            let sub = sub_block_size_h4(bl);
            for i in 0..4u32 {
                if i == 3 && mi_row + (i as usize) * quarter_h >= mi_rows {
                    break;
                }
                decode_leaf(p, sub, mi_col, mi_row + i as usize * quarter_h, partition, out)?;
            }
        }
        PARTITION_V4 => {
            let quarter_w = dim / 4;
            let sub = sub_block_size_v4(bl);
            for i in 0..4u32 {
                if i == 3 && mi_col + (i as usize) * quarter_w >= mi_cols {
                    break;
                }
                decode_leaf(p, sub, mi_col + i as usize * quarter_w, mi_row, partition, out)?;
            }
        }
    }
    Ok(())
}

/// Rejects a PARTITION_V-family leaf under 4:2:2 chroma (spec §4.G,
/// boundary behaviour 4 of §8): chroma blocks would end up non-square in a
/// way 4:2:2 cannot represent.
fn reject_for_chroma_layout(partition: PartitionType, bsize: BlockSize, chroma: ChromaSampling) -> bool {
    chroma == ChromaSampling::Cs422
        && matches!(partition, PartitionType::PARTITION_V | PartitionType::PARTITION_V4)
        && bsize.is_sub8x8()
}

fn sub_block_size(bl: BlockLevel, halve_h: bool, halve_w: bool) -> BlockSize {
    use BlockSize::*;
    match (bl, halve_h, halve_w) {
        (BlockLevel::Bl128x128, true, false) => BLOCK_128X64,
        (BlockLevel::Bl128x128, false, true) => BLOCK_64X128,
        (BlockLevel::Bl64x64, true, false) => BLOCK_64X32,
        (BlockLevel::Bl64x64, false, true) => BLOCK_32X64,
        (BlockLevel::Bl32x32, true, false) => BLOCK_32X16,
        (BlockLevel::Bl32x32, false, true) => BLOCK_16X32,
        (BlockLevel::Bl16x16, true, false) => BLOCK_16X8,
        (BlockLevel::Bl16x16, false, true) => BLOCK_8X16,
        (BlockLevel::Bl8x8, true, false) => BLOCK_8X4,
        (BlockLevel::Bl8x8, false, true) => BLOCK_4X8,
        _ => bl.none_block_size(),
    }
}

fn sub_block_size_h4(bl: BlockLevel) -> BlockSize {
    match bl {
        BlockLevel::Bl128x128 => BlockSize::BLOCK_128X64,
        BlockLevel::Bl64x64 => BlockSize::BLOCK_64X16,
        BlockLevel::Bl32x32 => BlockSize::BLOCK_32X8,
        BlockLevel::Bl16x16 => BlockSize::BLOCK_16X4,
        BlockLevel::Bl8x8 => BlockSize::BLOCK_8X4,
    }
}

fn sub_block_size_v4(bl: BlockLevel) -> BlockSize {
    match bl {
        BlockLevel::Bl128x128 => BlockSize::BLOCK_64X128,
        BlockLevel::Bl64x64 => BlockSize::BLOCK_16X64,
        BlockLevel::Bl32x32 => BlockSize::BLOCK_8X32,
        BlockLevel::Bl16x16 => BlockSize::BLOCK_4X16,
        BlockLevel::Bl8x8 => BlockSize::BLOCK_4X8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_h4_disallowed_at_128_folds_to_split() {
        // Only the index that maps to H4/V4 is affected; everything else
        // passes through unchanged.
        assert_eq!(partition_from_index(BlockLevel::Bl128x128, 8), PartitionType::PARTITION_SPLIT);
        assert_eq!(partition_from_index(BlockLevel::Bl128x128, 9), PartitionType::PARTITION_SPLIT);
        assert_eq!(partition_from_index(BlockLevel::Bl64x64, 8), PartitionType::PARTITION_H4);
    }

    #[test]
    fn bl8x8_only_offers_four_shapes() {
        assert_eq!(partition_from_index(BlockLevel::Bl8x8, 3), PartitionType::PARTITION_SPLIT);
        assert_eq!(partition_from_index(BlockLevel::Bl8x8, 9), PartitionType::PARTITION_SPLIT);
    }

    #[test]
    fn v_family_rejected_on_422_sub8x8() {
        assert!(reject_for_chroma_layout(
            PartitionType::PARTITION_V,
            BlockSize::BLOCK_4X8,
            ChromaSampling::Cs422
        ));
        assert!(!reject_for_chroma_layout(
            PartitionType::PARTITION_V,
            BlockSize::BLOCK_4X8,
            ChromaSampling::Cs420
        ));
    }
}

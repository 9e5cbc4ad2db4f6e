// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Shared enums and constants used across the parsing core: block sizes,
//! partition shapes, prediction modes, reference frames, transform sizes.

/// Smallest addressable spatial unit, in pixels, for neighbour contexts and
/// motion-vector storage (the "4x4 grid" of the glossary).
pub const MI_SIZE: usize = 4;
pub const MI_SIZE_LOG2: usize = 2;

/// Superblock size, either 64 or 128 (sequence header `use_128x128_superblock`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperBlockSize {
    Sb64,
    Sb128,
}

impl SuperBlockSize {
    pub fn log2(self) -> usize {
        match self {
            SuperBlockSize::Sb64 => 4,
            SuperBlockSize::Sb128 => 5,
        }
    }

    pub fn width_mi(self) -> usize {
        1 << self.log2()
    }
}

/// All coding block sizes in 4x4 units, indexed `[width_log2][height_log2]`
/// style but kept as a flat enum matching the partition walker's recursion
/// (NONE/H/V/SPLIT act on pairs of these).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[allow(non_camel_case_types)]
pub enum BlockSize {
    BLOCK_4X4,
    BLOCK_4X8,
    BLOCK_8X4,
    BLOCK_8X8,
    BLOCK_8X16,
    BLOCK_16X8,
    BLOCK_16X16,
    BLOCK_16X32,
    BLOCK_32X16,
    BLOCK_32X32,
    BLOCK_32X64,
    BLOCK_64X32,
    BLOCK_64X64,
    BLOCK_64X128,
    BLOCK_128X64,
    BLOCK_128X128,
    BLOCK_4X16,
    BLOCK_16X4,
    BLOCK_8X32,
    BLOCK_32X8,
    BLOCK_16X64,
    BLOCK_64X16,
    BLOCK_INVALID,
}

impl BlockSize {
    const DIMS_4X4: [(usize, usize); 22] = [
        (1, 1), (1, 2), (2, 1), (2, 2), (2, 4), (4, 2), (4, 4), (4, 8),
        (8, 4), (8, 8), (8, 16), (16, 8), (16, 16), (16, 32), (32, 16),
        (32, 32), (1, 4), (4, 1), (2, 8), (8, 2), (4, 16), (16, 4),
    ];

    /// Block width in 4x4 units.
    pub fn width_mi(self) -> usize {
        if self == BlockSize::BLOCK_INVALID {
            0
        } else {
            Self::DIMS_4X4[self as usize].0
        }
    }

    /// Block height in 4x4 units.
    pub fn height_mi(self) -> usize {
        if self == BlockSize::BLOCK_INVALID {
            0
        } else {
            Self::DIMS_4X4[self as usize].1
        }
    }

    pub fn width(self) -> usize {
        self.width_mi() * MI_SIZE
    }

    pub fn height(self) -> usize {
        self.height_mi() * MI_SIZE
    }

    /// True for the 4x4/4x8/8x4 "sub-8x8" shapes where chroma is shared
    /// between multiple luma blocks.
    pub fn is_sub8x8(self) -> bool {
        self.width_mi() < 2 || self.height_mi() < 2
    }
}

/// The ten partition shapes of §4.G.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum PartitionType {
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
}

pub const N_PARTITION_TYPES: usize = 10;

/// Frame classification (§3 frame header, `picture.h: Dav1dFrameType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Key,
    Inter,
    Intra,
    Switch,
}

impl FrameType {
    pub fn is_intra(self) -> bool {
        matches!(self, FrameType::Key | FrameType::Intra)
    }
}

/// Chroma subsampling layouts (`picture.h: Dav1dPixelLayout`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaSampling {
    Monochrome,
    Cs420,
    Cs422,
    Cs444,
}

impl ChromaSampling {
    pub fn has_chroma(self) -> bool {
        !matches!(self, ChromaSampling::Monochrome)
    }

    pub fn subsample_x(self) -> usize {
        match self {
            ChromaSampling::Cs444 | ChromaSampling::Monochrome => 0,
            _ => 1,
        }
    }

    pub fn subsample_y(self) -> usize {
        match self {
            ChromaSampling::Cs420 => 1,
            _ => 0,
        }
    }
}

/// Intra prediction modes for luma.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum YMode {
    DC_PRED,
    V_PRED,
    H_PRED,
    D45_PRED,
    D135_PRED,
    D113_PRED,
    D157_PRED,
    D203_PRED,
    D67_PRED,
    SMOOTH_PRED,
    SMOOTH_V_PRED,
    SMOOTH_H_PRED,
    PAETH_PRED,
}

pub const N_INTRA_MODES: usize = 13;

/// Chroma intra prediction modes; `UV_CFL_PRED` selects chroma-from-luma.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum UVMode {
    Matching(YMode),
    UV_CFL_PRED,
}

/// Inter prediction modes (single-reference and compound variants collapse
/// to the same enum; the compound case is distinguished by `comp_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterMode {
    NearestMv,
    NearMv,
    GlobalMv,
    NewMv,
}

/// Reference frame slots. `-1`/`None` denotes intrabc or no-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefFrame {
    None,
    Intra,
    Last,
    Last2,
    Last3,
    Golden,
    BwdRef,
    AltRef2,
    AltRef,
}

pub const N_REFS: usize = 7;

impl RefFrame {
    pub fn is_fwd(self) -> bool {
        matches!(
            self,
            RefFrame::Last | RefFrame::Last2 | RefFrame::Last3 | RefFrame::Golden
        )
    }

    pub fn is_bwd(self) -> bool {
        matches!(self, RefFrame::BwdRef | RefFrame::AltRef2 | RefFrame::AltRef)
    }
}

/// Compound prediction combination type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompType {
    Avg,
    Wedge,
    Diffwtd,
    Distance,
}

/// Motion mode: plain translation, overlapped-block compensation, or warp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionMode {
    Translation,
    Obmc,
    Warp,
}

/// Warp model kind produced by §4.F.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpType {
    Identity,
    Translation,
    RotZoom,
    Affine,
}

/// Transform sizes, smallest to largest; index doubles as `tx_size` level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[allow(non_camel_case_types)]
pub enum TxSize {
    TX_4X4,
    TX_8X8,
    TX_16X16,
    TX_32X32,
    TX_64X64,
    TX_4X8,
    TX_8X4,
    TX_8X16,
    TX_16X8,
    TX_16X32,
    TX_32X16,
    TX_32X64,
    TX_64X32,
    TX_4X16,
    TX_16X4,
    TX_8X32,
    TX_32X8,
    TX_16X64,
    TX_64X16,
}

/// Frame-wide transform size selection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    Only4x4,
    Largest,
    Switchable,
}

/// Subpel interpolation filter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    EightTap,
    EightTapSmooth,
    EightTapSharp,
    Bilinear,
    Switchable,
}

/// Loop restoration kind, per plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorationType {
    None,
    Switchable,
    Wiener,
    SgrProj,
}

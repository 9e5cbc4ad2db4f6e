// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Error kinds produced while parsing a bitstream (spec §7).

use thiserror::Error;

/// The four error kinds of the parsing process.
///
/// `OutOfData` and `Syntax` are recoverable at the frame level: the frame
/// driver marks the frame errored and still releases its buffers. `Alloc`
/// and `UnsupportedBitDepth` are returned synchronously to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The range coder or bit reader reached the end of its buffer before
    /// the syntax it was decoding was exhausted. Parsing continues with
    /// saturated zero bits; this variant is raised once, after the tile
    /// finishes, to let the frame driver report a protocol error.
    #[error("out of data while parsing: {0}")]
    OutOfData(&'static str),

    /// A syntax element violated a structural constraint (illegal
    /// partition for the chroma layout, illegal sub-8x8 shape, segment id
    /// above the active range, etc).
    #[error("syntax violation: {0}")]
    Syntax(&'static str),

    /// A buffer allocation failed; the frame slot unwinds and releases
    /// whatever partial state it had acquired.
    #[error("allocation failure: {0}")]
    Alloc(&'static str),

    /// The sequence header declared a bit depth this build does not
    /// support. Returned synchronously at frame submit.
    #[error("unsupported bit depth: {0}")]
    UnsupportedBitDepth(u8),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

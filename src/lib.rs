// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! An AV1 bitstream parser and block-decision core: everything between
//! "bytes of a temporal unit" and "a fully-formed per-block record plus
//! the neighbour/MV/CDF state later coding tools need", with no pixel
//! reconstruction of its own. Reconstruction, in-loop filtering, and
//! picture allocation are external collaborators this crate only defines
//! interfaces for (see [`picture`]).

pub mod bitreader;
pub mod block;
pub mod cdf;
pub mod context;
pub mod error;
pub mod frame;
pub mod headers;
pub mod levels;
pub mod msac;
pub mod partition;
pub mod picture;
pub mod refmv;
pub mod tile;
pub mod warp;

pub use error::{DecodeError, Result};

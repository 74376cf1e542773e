//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod attribute;
pub mod bmp;
pub mod consts;
pub mod error;
pub mod message;
pub mod nlri;

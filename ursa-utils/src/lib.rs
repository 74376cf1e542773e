//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod bgp;
pub mod bytes;
pub mod ip;
pub mod socket;
pub mod task;

// Channel type aliases.
pub type Sender<T> = tokio::sync::mpsc::Sender<T>;
pub type Receiver<T> = tokio::sync::mpsc::Receiver<T>;
pub type UnboundedSender<T> = tokio::sync::mpsc::UnboundedSender<T>;
pub type UnboundedReceiver<T> = tokio::sync::mpsc::UnboundedReceiver<T>;

/// Compares two byte buffers, rendering both as hex dumps on mismatch.
#[macro_export]
macro_rules! assert_eq_hex {
    ($expected:expr, $actual:expr) => {
        let expected = $expected
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<Vec<_>>()
            .join(" ");
        let actual = $actual
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(expected, actual);
    };
}

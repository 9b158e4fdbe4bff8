// SPDX-License-Identifier: MIT OR Apache-2.0

//! Board support core for an Ensemble-class heterogeneous SoC: the SDHCI
//! host/card driver with its DMA block transfer engine, and the
//! synchronous RPC client for the secure-enclave services core.

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "mmc")]
pub mod block_device;
pub mod platform;
pub mod sd;
pub mod sd_host;
pub mod se_services;

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform services the drivers borrow from the board: a monotonic tick
//! source for deadlines and the cache maintenance hooks needed around DMA.
//!
//! Boards implement these on top of their timer and cache-controller
//! drivers. Tests implement them with a fake clock so every wait loop in
//! the drivers is deterministic.

/// Monotonic time source. Ticks only ever move forward; the tick rate is
/// board-defined but must be coarse enough that `ticks() + n` deadlines
/// do not overflow in practice (u64 gives centuries at any sane rate).
pub trait Clock {
    fn ticks(&self) -> u64;

    /// Short blocking delay used for card settle times during negotiation.
    fn delay_us(&mut self, us: u32);
}

/// D-cache maintenance and address translation around DMA buffers.
///
/// `clean` must make CPU writes visible to the DMA engine before a
/// transfer starts; `invalidate` must discard stale lines after the DMA
/// engine wrote memory. Cores without a data cache implement both as
/// no-ops.
pub trait CacheOps {
    fn clean_dcache(&mut self, addr: usize, len: usize);

    fn invalidate_dcache(&mut self, addr: usize, len: usize);

    /// Translate a CPU-local address to the bus address the DMA engine
    /// sees. Identity on flat-mapped systems.
    fn local_to_bus(&self, addr: usize) -> u32 {
        addr as u32
    }
}

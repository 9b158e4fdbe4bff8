// SPDX-License-Identifier: MIT OR Apache-2.0

//! `embedded-sdmmc` adapter so a filesystem can sit directly on the SD
//! driver. The trait takes `&self`, so the handle goes behind a
//! `RefCell`; the driver itself still sees strictly serialized calls.

use {
    crate::{
        platform::{CacheOps, Clock},
        sd::{SdError, SdHandle},
        sd_host::SdBus,
    },
    core::cell::RefCell,
    embedded_sdmmc::{Block, BlockCount, BlockDevice, BlockIdx},
};

pub struct SdBlockDevice<B, P> {
    handle: RefCell<SdHandle<B, P>>,
}

impl<B: SdBus, P: Clock + CacheOps> SdBlockDevice<B, P> {
    /// Wrap an initialized handle (card already in the transfer state).
    pub fn new(handle: SdHandle<B, P>) -> Self {
        Self {
            handle: RefCell::new(handle),
        }
    }

    pub fn into_inner(self) -> SdHandle<B, P> {
        self.handle.into_inner()
    }
}

impl<B: SdBus, P: Clock + CacheOps> BlockDevice for SdBlockDevice<B, P> {
    type Error = SdError;

    fn read(
        &self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        _reason: &str,
    ) -> Result<(), Self::Error> {
        let mut handle = self.handle.borrow_mut();
        for (i, block) in blocks.iter_mut().enumerate() {
            handle.read_blocks(start_block_idx.0 + i as u32, 1, &mut block.contents)?;
        }
        Ok(())
    }

    fn write(&self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        let mut handle = self.handle.borrow_mut();
        for (i, block) in blocks.iter().enumerate() {
            handle.write_blocks(start_block_idx.0 + i as u32, 1, &block.contents)?;
        }
        Ok(())
    }

    fn num_blocks(&self) -> Result<BlockCount, Self::Error> {
        let handle = self.handle.borrow();
        Ok(BlockCount(handle.card_info().logical_block_count))
    }
}

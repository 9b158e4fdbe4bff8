// SPDX-License-Identifier: MIT OR Apache-2.0

//! SDHCI-style host controller: register map, bitfield views and the
//! command/response engine. Card-level sequencing lives in [`crate::sd`];
//! this layer only encodes registers, issues single commands and waits on
//! completion status with explicit deadlines.

use {
    crate::{
        platform::{CacheOps, Clock},
        sd::SdHandle,
    },
    bitflags::bitflags,
    log::trace,
};

/// One ADMA2 descriptor per block; transfers larger than the table are
/// rejected before touching the controller.
pub const ADMA_DESC_COUNT: usize = 32;

/// Fixed data block size in bytes.
pub const BLOCK_SIZE: usize = 512;

/// Ticks allowed for a command to complete.
pub(crate) const CMD_TIMEOUT_TICKS: u64 = 2_000;
/// Ticks allowed per block of a data transfer (documented ratio).
pub(crate) const XFER_TICKS_PER_BLOCK: u64 = 2_000;

// Register byte offsets (SDHCI layout).
const BLOCK_SIZE_R: u32 = 0x04;
const BLOCK_COUNT_R: u32 = 0x06;
const ARGUMENT: u32 = 0x08;
const XFER_MODE: u32 = 0x0c;
const COMMAND: u32 = 0x0e;
const RESPONSE0: u32 = 0x10;
const PRESENT_STATE: u32 = 0x24;
const HOST_CTRL1: u32 = 0x28;
const POWER_CTRL: u32 = 0x29;
const CLOCK_CTRL: u32 = 0x2c;
const TIMEOUT_CTRL: u32 = 0x2e;
const SW_RESET: u32 = 0x2f;
const NORMAL_INT_STATUS: u32 = 0x30;
const ERROR_INT_STATUS: u32 = 0x32;
const NORMAL_INT_ENABLE: u32 = 0x34;
const ERROR_INT_ENABLE: u32 = 0x36;
const CAPABILITIES: u32 = 0x40;
const ADMA_ADDR: u32 = 0x58;
const HOST_VERSION: u32 = 0xfe;

// Power control register fields.
pub(crate) const PC_BUS_PWR_VDD1: u8 = 1 << 0;
pub(crate) const PC_BUS_VSEL_3V3: u8 = 0x7 << 1;
pub(crate) const PC_BUS_VSEL_3V0: u8 = 0x6 << 1;
pub(crate) const PC_BUS_VSEL_1V8: u8 = 0x5 << 1;

// Clock control register fields.
pub(crate) const CLK_INTERNAL_EN: u16 = 1 << 0;
pub(crate) const CLK_STABLE: u16 = 1 << 1;
pub(crate) const CLK_SD_EN: u16 = 1 << 2;
pub(crate) const CLK_PLL_EN: u16 = 1 << 3;
pub(crate) const CLK_GEN_SEL: u16 = 1 << 5;
/// Identification clock divisor, ~400 kHz from the base clock.
pub(crate) const CLK_DIV_INIT: u16 = 0x80 << 8;
/// Full operating frequency divisor.
pub(crate) const CLK_DIV_OP: u16 = 0x02 << 8;

// Host control 1 register fields.
const HC1_4BIT_WIDTH: u8 = 1 << 1;
const HC1_8BIT_WIDTH: u8 = 1 << 5;
const HC1_DMA_SEL_ADMA32: u8 = 0x2 << 3;

/// Data timeout counter exponent written during host bring-up.
pub(crate) const DATA_TIMEOUT_MAX: u8 = 0xe;

bitflags! {
    /// Present state register.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct PresentState: u32 {
        const CMDLL   = 1 << 24; /* CMD line level */
        const DAT3    = 1 << 23;
        const DAT2    = 1 << 22;
        const DAT1    = 1 << 21;
        const DAT0    = 1 << 20;
        const WRPPL   = 1 << 19; /* Write protect pin level */
        const CARDDPL = 1 << 18; /* Card detect pin level */
        const CARDSS  = 1 << 17; /* Card state stable */
        const CARDINS = 1 << 16; /* Card inserted */
        const BUFRDEN = 1 << 11; /* Buffer read enable */
        const BUFWREN = 1 << 10; /* Buffer write enable */
        const RTACT   = 1 << 9;  /* Read transfer active */
        const WTACT   = 1 << 8;  /* Write transfer active */
        const DLACT   = 1 << 2;  /* DAT line active */
        const CMDINHD = 1 << 1;  /* Command inhibit (DAT) */
        const CMDINHC = 1 << 0;  /* Command inhibit (CMD) */
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct NormalStatus: u16 {
        const CMDC   = 1 << 0;  /* Command complete */
        const TRFC   = 1 << 1;  /* Transfer complete */
        const BLKGE  = 1 << 2;  /* Block gap event */
        const DMAINT = 1 << 3;  /* DMA interrupt */
        const BWRRDY = 1 << 4;  /* Buffer write ready */
        const BRDRDY = 1 << 5;  /* Buffer read ready */
        const CINS   = 1 << 6;  /* Card insertion */
        const CREM   = 1 << 7;  /* Card removal */
        const CINT   = 1 << 8;  /* Card interrupt */
        const ERRINT = 1 << 15; /* Error interrupt */
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct ErrorStatus: u16 {
        const CMDTEO = 1 << 0; /* Command timeout */
        const CMDCRC = 1 << 1; /* Command CRC */
        const CMDEND = 1 << 2; /* Command end bit */
        const CMDIDX = 1 << 3; /* Command index mismatch */
        const DATTEO = 1 << 4; /* Data timeout */
        const DATCRC = 1 << 5; /* Data CRC */
        const DATEND = 1 << 6; /* Data end bit */
        const CURLIM = 1 << 7; /* Current limit */
        const ACMD   = 1 << 8; /* Auto CMD error */
        const ADMA   = 1 << 9; /* ADMA error */
    }
}

bitflags! {
    /// Host controller capability register.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const ADMA2     = 1 << 19;
        const HIGHSPEED = 1 << 21;
        const SDMA      = 1 << 22;
        const VOLT_3V3  = 1 << 24;
        const VOLT_3V0  = 1 << 25;
        const VOLT_1V8  = 1 << 26;
        const BIT64_SYS = 1 << 28;
    }
}

bitflags! {
    /// Software reset register. Bits self-clear when the reset finishes.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct SwReset: u8 {
        const ALL = 1 << 0;
        const CMD = 1 << 1;
        const DAT = 1 << 2;
    }
}

/// Raw register access at byte offsets from the controller base.
///
/// The MMIO implementation is a straight volatile access; tests provide a
/// behavioral controller model behind the same trait.
pub trait SdBus {
    fn read8(&self, offset: u32) -> u8;
    fn write8(&mut self, offset: u32, val: u8);
    fn read16(&self, offset: u32) -> u16;
    fn write16(&mut self, offset: u32, val: u16);
    fn read32(&self, offset: u32) -> u32;
    fn write32(&mut self, offset: u32, val: u32);
}

/// Memory-mapped controller instance.
pub struct Mmio {
    base: *mut u8,
}

impl Mmio {
    /// # Safety
    ///
    /// `base` must be the base address of an SDHCI register block mapped
    /// for device access, and this must be the only live handle to it.
    pub unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }
}

impl SdBus for Mmio {
    fn read8(&self, offset: u32) -> u8 {
        unsafe { self.base.add(offset as usize).read_volatile() }
    }

    fn write8(&mut self, offset: u32, val: u8) {
        unsafe { self.base.add(offset as usize).write_volatile(val) }
    }

    fn read16(&self, offset: u32) -> u16 {
        unsafe { (self.base.add(offset as usize) as *const u16).read_volatile() }
    }

    fn write16(&mut self, offset: u32, val: u16) {
        unsafe { (self.base.add(offset as usize) as *mut u16).write_volatile(val) }
    }

    fn read32(&self, offset: u32) -> u32 {
        unsafe { (self.base.add(offset as usize) as *const u32).read_volatile() }
    }

    fn write32(&mut self, offset: u32, val: u32) {
        unsafe { (self.base.add(offset as usize) as *mut u32).write_volatile(val) }
    }
}

/// Response class expected for a command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RespType {
    None,
    R1,
    R1b,
    R2,
    R3,
    R6,
    R7,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Data phase attached to a command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DataTransfer {
    pub direction: Direction,
    pub blocks: u16,
}

/// One outstanding command. Built immediately before issue and consumed
/// by the same call; the handle keeps the last descriptor for debugging.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SdCommand {
    pub index: u8,
    pub arg: u32,
    pub resp: RespType,
    pub data: Option<DataTransfer>,
}

impl SdCommand {
    pub const fn new(index: u8, arg: u32, resp: RespType) -> Self {
        Self {
            index,
            arg,
            resp,
            data: None,
        }
    }

    pub const fn with_data(index: u8, arg: u32, resp: RespType, data: DataTransfer) -> Self {
        Self {
            index,
            arg,
            resp,
            data: Some(data),
        }
    }
}

pub type SdResponse = [u32; 4];

/// Host controller level failures. No retry happens at this layer; the
/// block transfer engine owns the retry policy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HcError {
    /// CMD/DAT lines stayed inhibited.
    InhibitTimeout,
    /// Command never completed.
    CommandTimeout,
    CommandCrc,
    CommandEndBit,
    /// Response index did not match the command index.
    CommandIndex,
    DataTimeout,
    DataCrc,
    DataEndBit,
    AutoCmd,
    Adma,
    /// Transfer-complete wait expired.
    TransferTimeout,
    /// Reset bits never self-cleared.
    ResetTimeout,
    /// Clock never reported stable.
    ClockTimeout,
    /// More blocks than the descriptor table can describe.
    TooManyBlocks,
    /// Error interrupt with none of the discriminated bits set.
    Controller(ErrorStatus),
}

fn decode_error(status: ErrorStatus) -> HcError {
    if status.contains(ErrorStatus::CMDTEO) {
        HcError::CommandTimeout
    } else if status.contains(ErrorStatus::CMDCRC) {
        HcError::CommandCrc
    } else if status.contains(ErrorStatus::CMDEND) {
        HcError::CommandEndBit
    } else if status.contains(ErrorStatus::CMDIDX) {
        HcError::CommandIndex
    } else if status.contains(ErrorStatus::DATTEO) {
        HcError::DataTimeout
    } else if status.contains(ErrorStatus::DATCRC) {
        HcError::DataCrc
    } else if status.contains(ErrorStatus::DATEND) {
        HcError::DataEndBit
    } else if status.contains(ErrorStatus::ACMD) {
        HcError::AutoCmd
    } else if status.contains(ErrorStatus::ADMA) {
        HcError::Adma
    } else {
        HcError::Controller(status)
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    struct Adma2Attr: u16 {
        const VALID = 1 << 0;
        const END   = 1 << 1;
        const INT   = 1 << 2;
        const ACT1  = 1 << 4;
        const ACT2  = 1 << 5;
        const TRAN  = Self::ACT2.bits();
    }
}

/// One entry of the ADMA2 descriptor table. The fields are consumed by
/// the controller's DMA engine, not read back by the CPU.
#[derive(Debug, Copy, Clone)]
#[repr(C, align(4))]
pub struct Adma2Desc {
    pub attr: u16,
    pub len: u16,
    pub addr: u32,
}

impl Adma2Desc {
    pub const fn new() -> Self {
        Self {
            attr: 0,
            len: 0,
            addr: 0,
        }
    }
}

// Host controller operations on the driver handle. Card-level command
// sequencing (which command, with which argument, in which order) stays
// in `sd.rs`.
impl<B: SdBus, P: Clock + CacheOps> SdHandle<B, P> {
    pub(crate) fn hc_read_version(&self) -> u16 {
        self.bus.read16(HOST_VERSION)
    }

    pub(crate) fn hc_capabilities(&self) -> Capabilities {
        Capabilities::from_bits_truncate(self.bus.read32(CAPABILITIES))
    }

    pub fn present_state(&self) -> PresentState {
        PresentState::from_bits_truncate(self.bus.read32(PRESENT_STATE))
    }

    pub fn normal_status(&self) -> NormalStatus {
        NormalStatus::from_bits_truncate(self.bus.read16(NORMAL_INT_STATUS))
    }

    pub fn error_status(&self) -> ErrorStatus {
        ErrorStatus::from_bits_truncate(self.bus.read16(ERROR_INT_STATUS))
    }

    /// Soft reset of the selected controller state machines. Waits for
    /// the bits to self-clear.
    pub(crate) fn hc_reset(&mut self, lines: SwReset) -> Result<(), HcError> {
        self.bus.write8(SW_RESET, lines.bits());

        let deadline = self.platform.ticks() + CMD_TIMEOUT_TICKS;
        loop {
            if SwReset::from_bits_truncate(self.bus.read8(SW_RESET)).is_empty() {
                // A full reset wipes the interrupt enables with everything else.
                if lines.contains(SwReset::ALL) {
                    self.hc_unmask_interrupts();
                }
                return Ok(());
            }
            if self.platform.ticks() >= deadline {
                return Err(HcError::ResetTimeout);
            }
        }
    }

    pub(crate) fn hc_set_bus_power(&mut self, level: u8) {
        self.bus.write8(POWER_CTRL, level);
    }

    /// Program the clock control register and wait for the internal
    /// clock to report stable.
    pub(crate) fn hc_set_clk_freq(&mut self, val: u16) -> Result<(), HcError> {
        self.bus.write16(CLOCK_CTRL, val);

        let deadline = self.platform.ticks() + CMD_TIMEOUT_TICKS;
        while self.bus.read16(CLOCK_CTRL) & CLK_STABLE == 0 {
            if self.platform.ticks() >= deadline {
                return Err(HcError::ClockTimeout);
            }
        }
        Ok(())
    }

    pub(crate) fn hc_set_tout(&mut self, exp: u8) {
        self.bus.write8(TIMEOUT_CTRL, exp);
    }

    /// Select ADMA2 in host control 1, preserving the width bits.
    pub(crate) fn hc_config_dma(&mut self) {
        let hc1 = self.bus.read8(HOST_CTRL1);
        self.bus.write8(HOST_CTRL1, hc1 | HC1_DMA_SEL_ADMA32);
    }

    /// Data-line width on the host side. The matching ACMD6 to the card
    /// is issued by the negotiation sequence.
    pub(crate) fn hc_set_bus_width(&mut self, width: crate::sd::BusWidth) {
        let mut hc1 = self.bus.read8(HOST_CTRL1) & !(HC1_4BIT_WIDTH | HC1_8BIT_WIDTH);
        match width {
            crate::sd::BusWidth::One => {}
            crate::sd::BusWidth::Four => hc1 |= HC1_4BIT_WIDTH,
            crate::sd::BusWidth::Eight => hc1 |= HC1_8BIT_WIDTH,
        }
        self.bus.write8(HOST_CTRL1, hc1);
    }

    /// Unmask command/transfer completion and all error sources so the
    /// status reads below observe them.
    pub(crate) fn hc_unmask_interrupts(&mut self) {
        self.bus
            .write16(NORMAL_INT_ENABLE, (NormalStatus::all()).bits());
        self.bus
            .write16(ERROR_INT_ENABLE, (ErrorStatus::all()).bits());
    }

    /// Issue one command and wait for completion. Responses are returned
    /// as raw register contents; semantic decoding is the caller's job.
    /// For DMA data commands the transfer-complete wait is separate, see
    /// [`Self::hc_check_xfer_done`].
    pub(crate) fn hc_send_cmd(&mut self, cmd: SdCommand) -> Result<SdResponse, HcError> {
        self.hc_inhibit_wait()?;

        // Keep the descriptor visible on the handle while it is in flight.
        self.cmd = cmd;

        let mut cmd_reg = (cmd.index as u16) << 8;
        let mut done_mask = NormalStatus::CMDC;

        // Response length 48 = 0x2, 48-with-busy = 0x3, 136 = 0x1.
        // CRC/index checking tracks the response class.
        match cmd.resp {
            RespType::R1 | RespType::R6 | RespType::R7 => {
                cmd_reg |= 0x2;
                cmd_reg |= 1 << 3; // response CRC check
                cmd_reg |= 1 << 4; // response index check
            }
            RespType::R1b => {
                cmd_reg |= 0x3;
                cmd_reg |= 1 << 3;
                cmd_reg |= 1 << 4;
                done_mask |= NormalStatus::TRFC;
            }
            RespType::R2 => {
                cmd_reg |= 0x1;
                cmd_reg |= 1 << 3;
            }
            RespType::R3 => cmd_reg |= 0x2,
            RespType::None => {}
        }

        if let Some(data) = cmd.data {
            cmd_reg |= 1 << 5; // data present

            let mut tmr: u16 = 1 << 1; // block count enable
            if data.blocks > 1 {
                tmr |= 1 << 5; // multi-block
                tmr |= 0x1 << 2; // auto CMD12 at the end
                self.bus.write16(BLOCK_COUNT_R, data.blocks);
            }
            if data.direction == Direction::Read {
                tmr |= 1 << 4;
            }
            tmr |= 1 << 0; // DMA enable

            self.bus.write16(BLOCK_SIZE_R, BLOCK_SIZE as u16);
            self.bus.write16(XFER_MODE, tmr);
        }

        self.bus.write32(ARGUMENT, cmd.arg);
        self.bus.write16(COMMAND, cmd_reg);

        if cmd.data.is_none() {
            self.hc_wait_normal_status(done_mask, CMD_TIMEOUT_TICKS)
                .map_err(|e| {
                    self.last_error = Some(e);
                    e
                })?;
        }

        let status = self.normal_status();
        if status.contains(NormalStatus::ERRINT) {
            let err = decode_error(self.error_status());
            self.hc_clear_errors();
            self.last_error = Some(err);
            trace!("cmd{} failed: {:?}", cmd.index, err);
            return Err(err);
        }

        // Acknowledge everything except buffer-ready and, for data
        // commands, transfer-complete; those belong to the data path.
        let mut ack = status.bits() & !(NormalStatus::BWRRDY | NormalStatus::BRDRDY).bits();
        if cmd.data.is_some() {
            ack &= !NormalStatus::TRFC.bits();
        }
        self.bus.write16(NORMAL_INT_STATUS, ack);

        let mut resp: SdResponse = [0; 4];
        if cmd.resp == RespType::R2 {
            for (i, word) in resp.iter_mut().enumerate() {
                *word = self.bus.read32(RESPONSE0 + 4 * i as u32);
            }
        } else {
            resp[0] = self.bus.read32(RESPONSE0);
        }

        Ok(resp)
    }

    /// Program the ADMA2 descriptor table for `blocks` blocks at
    /// `bus_addr` and issue the read command for `sector`.
    pub(crate) fn hc_read_setup(
        &mut self,
        bus_addr: u32,
        sector: u32,
        blocks: u16,
    ) -> Result<(), HcError> {
        self.hc_dma_setup(bus_addr, blocks)?;

        let index = if blocks > 1 {
            cmd::READ_MULTIPLE_BLOCK
        } else {
            cmd::READ_SINGLE_BLOCK
        };
        let data = DataTransfer {
            direction: Direction::Read,
            blocks,
        };
        self.hc_send_cmd(SdCommand::with_data(index, sector, RespType::R1, data))?;
        Ok(())
    }

    /// Same as [`Self::hc_read_setup`] for the write direction. The
    /// caller must have cleaned the data cache over the source buffer.
    pub(crate) fn hc_write_setup(
        &mut self,
        bus_addr: u32,
        sector: u32,
        blocks: u16,
    ) -> Result<(), HcError> {
        self.hc_dma_setup(bus_addr, blocks)?;

        let index = if blocks > 1 {
            cmd::WRITE_MULTIPLE_BLOCK
        } else {
            cmd::WRITE_SINGLE_BLOCK
        };
        let data = DataTransfer {
            direction: Direction::Write,
            blocks,
        };
        self.hc_send_cmd(SdCommand::with_data(index, sector, RespType::R1, data))?;
        Ok(())
    }

    fn hc_dma_setup(&mut self, bus_addr: u32, blocks: u16) -> Result<(), HcError> {
        if blocks as usize > ADMA_DESC_COUNT {
            return Err(HcError::TooManyBlocks);
        }

        for i in 0..blocks as usize {
            let last = i == blocks as usize - 1;
            let attr = if last {
                Adma2Attr::TRAN | Adma2Attr::VALID | Adma2Attr::END
            } else {
                Adma2Attr::TRAN | Adma2Attr::VALID
            };
            self.adma_table[i] = Adma2Desc {
                attr: attr.bits(),
                len: BLOCK_SIZE as u16,
                addr: bus_addr + (BLOCK_SIZE * i) as u32,
            };
        }

        // The controller fetches the table over the bus; commit it first.
        let table_addr = self.adma_table.as_ptr() as usize;
        let table_len = core::mem::size_of::<Adma2Desc>() * blocks as usize;
        self.platform.clean_dcache(table_addr, table_len);

        let table_bus = self.platform.local_to_bus(table_addr);
        self.bus.write32(ADMA_ADDR, table_bus);
        Ok(())
    }

    /// Wait for transfer-complete within `timeout_ticks`. Errors are
    /// surfaced without retry; the caller decides on recovery.
    pub(crate) fn hc_check_xfer_done(&mut self, timeout_ticks: u64) -> Result<(), HcError> {
        self.hc_wait_normal_status(NormalStatus::TRFC, timeout_ticks)
            .map_err(|e| {
                if e == HcError::CommandTimeout {
                    self.last_error = Some(HcError::TransferTimeout);
                    HcError::TransferTimeout
                } else {
                    self.last_error = Some(e);
                    e
                }
            })?;
        self.bus.write16(
            NORMAL_INT_STATUS,
            (NormalStatus::TRFC | NormalStatus::DMAINT).bits(),
        );
        Ok(())
    }

    fn hc_inhibit_wait(&mut self) -> Result<(), HcError> {
        let deadline = self.platform.ticks() + CMD_TIMEOUT_TICKS;
        loop {
            let state = self.present_state();
            if !state.intersects(PresentState::CMDINHC | PresentState::CMDINHD) {
                return Ok(());
            }
            if self.platform.ticks() >= deadline {
                self.last_error = Some(HcError::InhibitTimeout);
                return Err(HcError::InhibitTimeout);
            }
        }
    }

    fn hc_wait_normal_status(
        &mut self,
        mask: NormalStatus,
        timeout_ticks: u64,
    ) -> Result<(), HcError> {
        let deadline = self.platform.ticks() + timeout_ticks;
        loop {
            let status = self.normal_status();
            if status.contains(NormalStatus::ERRINT) {
                let err = decode_error(self.error_status());
                self.hc_clear_errors();
                return Err(err);
            }
            if status.contains(mask) {
                return Ok(());
            }
            if self.platform.ticks() >= deadline {
                return Err(HcError::CommandTimeout);
            }
        }
    }

    fn hc_clear_errors(&mut self) {
        self.bus.write16(ERROR_INT_STATUS, ErrorStatus::all().bits());
        self.bus
            .write16(NORMAL_INT_STATUS, NormalStatus::ERRINT.bits());
    }
}

/// Command indices used by the negotiation and transfer engines.
pub(crate) mod cmd {
    pub const GO_IDLE_STATE: u8 = 0;
    pub const ALL_SEND_CID: u8 = 2;
    pub const SEND_RELATIVE_ADDR: u8 = 3;
    pub const SELECT_CARD: u8 = 7;
    pub const SEND_IF_COND: u8 = 8;
    pub const SEND_CSD: u8 = 9;
    pub const SEND_STATUS: u8 = 13;
    pub const SET_BLOCKLEN: u8 = 16;
    pub const READ_SINGLE_BLOCK: u8 = 17;
    pub const READ_MULTIPLE_BLOCK: u8 = 18;
    pub const WRITE_SINGLE_BLOCK: u8 = 24;
    pub const WRITE_MULTIPLE_BLOCK: u8 = 25;
    pub const APP_CMD: u8 = 55;

    pub const ACMD_SET_BUS_WIDTH: u8 = 6;
    pub const ACMD_SD_SEND_OP_COND: u8 = 41;
}

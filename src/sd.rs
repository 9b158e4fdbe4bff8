// SPDX-License-Identifier: MIT OR Apache-2.0

//! SD card driver: negotiation state machine, block transfer engine and
//! the disk-IO surface consumed by filesystem clients.
//!
//! The handle owns the controller bus and the platform services; callers
//! serialize access externally (one handle per controller, one client per
//! handle). At most one command and one block transfer are ever in
//! flight.

use {
    crate::{
        platform::{CacheOps, Clock},
        sd_host::{
            cmd, Adma2Desc, Capabilities, HcError, RespType, SdCommand, SwReset, ADMA_DESC_COUNT,
            BLOCK_SIZE, CLK_DIV_INIT, CLK_DIV_OP, CLK_GEN_SEL, CLK_INTERNAL_EN, CLK_PLL_EN,
            CLK_SD_EN, DATA_TIMEOUT_MAX, PC_BUS_PWR_VDD1, PC_BUS_VSEL_1V8, PC_BUS_VSEL_3V0,
            PC_BUS_VSEL_3V3, PresentState, SdBus, XFER_TICKS_PER_BLOCK,
        },
    },
    log::{debug, warn},
};

/// Ticks allowed for the card-detect line to report a card.
const PRESENCE_TIMEOUT_TICKS: u64 = 2_000;
/// Ticks allowed for the ACMD41 ready poll. The operating-condition loop
/// is deadline-bounded; a card that never leaves busy fails negotiation
/// instead of hanging the caller.
const OPCOND_TIMEOUT_TICKS: u64 = 10_000;

/// CMD8 argument: 2.7-3.6V window plus the 0xAA check pattern.
const IF_COND_ARG: u32 = 0x1aa;
/// ACMD41 voltage window (3.2-3.4V).
const OCR_VOLTAGE_WINDOW: u32 = 0x0030_0000;
const OCR_BUSY: u32 = 1 << 31;
const OCR_CCS: u32 = 1 << 30;
const ACMD41_HCS: u32 = 1 << 30;

/// Card status (R1) APP_CMD acknowledge bit.
const CARD_STATUS_APP_CMD: u32 = 1 << 5;

/// Out-of-range RCA used with CMD7 to deselect whatever card is selected.
const DESELECT_RCA: u32 = 0xffff_0000;

/// Driver status codes. A closed set; no other failures are produced by
/// the disk-IO surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SdError {
    HostInit,
    CardInit,
    Read,
    Write,
    Timeout,
}

/// Card state as tracked by the driver and reported by CMD13.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CardState {
    Init,
    Idle,
    Ready,
    Ident,
    Standby,
    Transfer,
    Data,
    Receive,
    Program,
    Disconnect,
}

impl CardState {
    /// Decode the current-state field (bits 12:9) of an R1 card status.
    pub fn from_card_status(status: u32) -> Option<Self> {
        match (status >> 9) & 0xf {
            0 => Some(Self::Idle),
            1 => Some(Self::Ready),
            2 => Some(Self::Ident),
            3 => Some(Self::Standby),
            4 => Some(Self::Transfer),
            5 => Some(Self::Data),
            6 => Some(Self::Receive),
            7 => Some(Self::Program),
            8 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum CardType {
    /// Standard capacity, byte addressed.
    SdSc,
    /// High capacity, block addressed.
    #[default]
    SdHc,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BusWidth {
    One,
    Four,
    Eight,
}

/// Cached card metadata filled in during negotiation.
#[derive(Debug, Default, Copy, Clone)]
pub struct CardInfo {
    pub card_type: CardType,
    /// Relative card address, kept in the upper halfword as the argument
    /// format expects it.
    pub rca: u32,
    pub sector_count: u32,
    pub sector_size: u32,
    pub logical_block_count: u32,
    pub logical_block_size: u32,
    /// Bus clock in Hz after negotiation.
    pub bus_speed: u32,
    /// Set when the card answered CMD8 (modern card).
    pub f8: bool,
    pub cid: [u32; 4],
    pub csd: [u32; 4],
    pub scr: [u32; 2],
}

/// Compile-selected driver configuration.
#[derive(Debug, Copy, Clone)]
pub struct SdConfig {
    pub bus_width: BusWidth,
    /// SDIO-only cards skip CID/CSD readout, bus width and block size
    /// negotiation.
    pub sdio_mode: bool,
}

impl Default for SdConfig {
    fn default() -> Self {
        Self {
            bus_width: BusWidth::Four,
            sdio_mode: false,
        }
    }
}

/// Driver handle. One per controller instance, constructed once and kept
/// for the life of the system.
pub struct SdHandle<B, P> {
    pub(crate) bus: B,
    pub(crate) platform: P,
    config: SdConfig,
    pub(crate) caps: Capabilities,
    pub(crate) hc_version: u16,
    /// Last issued command descriptor.
    pub(crate) cmd: SdCommand,
    pub(crate) last_error: Option<HcError>,
    pub(crate) state: CardState,
    pub(crate) bus_width: BusWidth,
    pub(crate) card: CardInfo,
    pub(crate) adma_table: [Adma2Desc; ADMA_DESC_COUNT],
}

impl<B: SdBus, P: Clock + CacheOps> SdHandle<B, P> {
    pub fn new(bus: B, platform: P, config: SdConfig) -> Self {
        Self {
            bus,
            platform,
            config,
            caps: Capabilities::empty(),
            hc_version: 0,
            cmd: SdCommand::new(0, 0, RespType::None),
            last_error: None,
            state: CardState::Init,
            bus_width: BusWidth::One,
            card: CardInfo::default(),
            adma_table: [Adma2Desc::new(); ADMA_DESC_COUNT],
        }
    }

    pub fn card_info(&self) -> &CardInfo {
        &self.card
    }

    pub fn last_error(&self) -> Option<HcError> {
        self.last_error
    }

    /// Descriptor of the most recently issued command.
    pub fn last_command(&self) -> SdCommand {
        self.cmd
    }

    /// Bring up the host controller: capability readout, bus power at the
    /// highest supported voltage, data timeout and ADMA2 selection.
    pub fn host_init(&mut self) -> Result<(), SdError> {
        self.state = CardState::Init;
        self.hc_version = self.hc_read_version();
        self.caps = self.hc_capabilities();

        // Power off before resetting everything.
        self.hc_set_bus_power(0);
        self.hc_reset(SwReset::ALL).map_err(|_| SdError::HostInit)?;

        let level = if self.caps.contains(Capabilities::VOLT_3V3) {
            PC_BUS_VSEL_3V3
        } else if self.caps.contains(Capabilities::VOLT_3V0) {
            PC_BUS_VSEL_3V0
        } else if self.caps.contains(Capabilities::VOLT_1V8) {
            PC_BUS_VSEL_1V8
        } else {
            0
        };
        self.hc_set_bus_power(level | PC_BUS_PWR_VDD1);

        self.hc_set_tout(DATA_TIMEOUT_MAX);
        self.hc_config_dma();
        self.hc_unmask_interrupts();

        debug!(
            "sd: host version {:#x}, caps {:?}",
            self.hc_version, self.caps
        );
        Ok(())
    }

    /// Drive the card from power-up to the transfer state. Every step is
    /// gated on the previous one; any failure aborts the sequence and the
    /// card stays unusable until the next `card_init`, which starts over
    /// from go-idle.
    pub fn card_init(&mut self) -> Result<(), SdError> {
        self.bus_width = BusWidth::One;
        self.card.card_type = CardType::SdHc;
        self.card.bus_speed = 400_000;

        // Identification clock, ~400 kHz.
        self.hc_set_clk_freq(
            CLK_GEN_SEL | CLK_DIV_INIT | CLK_PLL_EN | CLK_SD_EN | CLK_INTERNAL_EN,
        )
        .map_err(|_| SdError::CardInit)?;
        self.state = CardState::Idle;
        self.platform.delay_us(100);

        self.cmd = SdCommand::new(0, 0, RespType::None);

        self.wait_card_present()?;

        self.go_idle().map_err(|_| SdError::CardInit)?;
        self.platform.delay_us(100);

        self.get_ifcond()?;
        self.get_opcond()?;

        if !self.config.sdio_mode {
            self.get_cid()?;
        }

        self.get_rca()?;

        if !self.config.sdio_mode {
            self.get_csd()?;
            self.state = CardState::Standby;
        }

        self.select_card()?;

        if !self.config.sdio_mode {
            self.set_bus_width()?;
            self.set_block_len()?;
        }

        // Switch to the full operating frequency.
        self.hc_set_clk_freq(CLK_DIV_OP | CLK_GEN_SEL | CLK_PLL_EN | CLK_SD_EN | CLK_INTERNAL_EN)
            .map_err(|_| SdError::CardInit)?;
        self.card.bus_speed = 25_000_000;

        debug!(
            "sd: card ready, type {:?}, {} blocks",
            self.card.card_type, self.card.sector_count
        );
        Ok(())
    }

    /// Full bring-up: host controller then card negotiation.
    pub fn init(&mut self, _dev_id: u8) -> Result<(), SdError> {
        self.host_init().map_err(|_| SdError::HostInit)?;
        self.card_init()
    }

    /// Release the card and cut bus power. The deselect may fail if the
    /// card is gone; power is removed either way, and strictly after the
    /// deselect attempt.
    pub fn uninit(&mut self, _dev_id: u8) -> Result<(), SdError> {
        let deselect = SdCommand::new(cmd::SELECT_CARD, DESELECT_RCA, RespType::None);
        if let Err(e) = self.hc_send_cmd(deselect) {
            warn!("sd: deselect on uninit failed: {:?}", e);
        }

        self.hc_set_bus_power(0);
        self.state = CardState::Init;
        Ok(())
    }

    /// Query the card state over CMD13. Falls back to the driver's cached
    /// state when the card does not answer.
    pub fn state(&mut self) -> CardState {
        let status = SdCommand::new(cmd::SEND_STATUS, self.card.rca, RespType::R1);
        match self.hc_send_cmd(status) {
            Ok(resp) => CardState::from_card_status(resp[0]).unwrap_or(self.state),
            Err(_) => self.state,
        }
    }

    /// Read `count` 512-byte blocks starting at `sector` into `dest`.
    ///
    /// A zero count is a successful no-op. A destination too small for
    /// the transfer is rejected before any command is issued. On a
    /// transfer failure the controller command and data lines are soft
    /// reset and the whole setup is retried exactly once.
    pub fn read_blocks(&mut self, sector: u32, count: u16, dest: &mut [u8]) -> Result<(), SdError> {
        if count == 0 {
            return Ok(());
        }
        let len = count as usize * BLOCK_SIZE;
        if dest.len() < len {
            return Err(SdError::Read);
        }
        if self.state != CardState::Transfer {
            return Err(SdError::Read);
        }

        let timeout = XFER_TICKS_PER_BLOCK * count as u64;
        let addr = dest.as_ptr() as usize;
        let bus_addr = self.platform.local_to_bus(addr);
        let arg = self.data_address(sector);

        self.state = CardState::Data;

        let mut retries = 1u8;
        loop {
            let res = self
                .hc_read_setup(bus_addr, arg, count)
                .and_then(|_| self.hc_check_xfer_done(timeout));

            match res {
                Ok(()) => {
                    // The DMA engine wrote memory behind the cache.
                    self.platform.invalidate_dcache(addr, len);
                    break;
                }
                Err(e) => {
                    warn!("sd: read of {} blocks at {} failed: {:?}", count, sector, e);
                    let _ = self.hc_reset(SwReset::CMD | SwReset::DAT);
                    if retries == 0 {
                        self.state = CardState::Transfer;
                        return Err(SdError::Read);
                    }
                    retries -= 1;
                }
            }
        }

        self.state = CardState::Transfer;
        Ok(())
    }

    /// Write `count` 512-byte blocks starting at `sector` from `src`.
    /// Mirrors [`Self::read_blocks`], with the source cache lines cleaned
    /// before the controller fetches them.
    pub fn write_blocks(&mut self, sector: u32, count: u16, src: &[u8]) -> Result<(), SdError> {
        if count == 0 {
            return Ok(());
        }
        let len = count as usize * BLOCK_SIZE;
        if src.len() < len {
            return Err(SdError::Write);
        }
        if self.state != CardState::Transfer {
            return Err(SdError::Write);
        }

        let timeout = XFER_TICKS_PER_BLOCK * count as u64;
        let addr = src.as_ptr() as usize;
        let bus_addr = self.platform.local_to_bus(addr);
        let arg = self.data_address(sector);

        // Commit the buffer before the DMA engine reads it. One clean
        // covers both attempts; the data does not change in between.
        self.platform.clean_dcache(addr, len);

        self.state = CardState::Data;

        let mut retries = 1u8;
        loop {
            let res = self
                .hc_write_setup(bus_addr, arg, count)
                .and_then(|_| self.hc_check_xfer_done(timeout));

            match res {
                Ok(()) => break,
                Err(e) => {
                    warn!(
                        "sd: write of {} blocks at {} failed: {:?}",
                        count, sector, e
                    );
                    let _ = self.hc_reset(SwReset::CMD | SwReset::DAT);
                    if retries == 0 {
                        self.state = CardState::Transfer;
                        return Err(SdError::Write);
                    }
                    retries -= 1;
                }
            }
        }

        self.state = CardState::Transfer;
        Ok(())
    }

    fn data_address(&self, sector: u32) -> u32 {
        match self.card.card_type {
            CardType::SdHc => sector,
            CardType::SdSc => sector * BLOCK_SIZE as u32,
        }
    }

    /// Wait for the card-detect line. Absence is a timeout-class error
    /// and aborts negotiation before any command goes out.
    fn wait_card_present(&mut self) -> Result<(), SdError> {
        let deadline = self.platform.ticks() + PRESENCE_TIMEOUT_TICKS;
        while !self.present_state().contains(PresentState::CARDINS) {
            if self.platform.ticks() >= deadline {
                return Err(SdError::Timeout);
            }
        }
        Ok(())
    }

    fn go_idle(&mut self) -> Result<(), HcError> {
        self.hc_send_cmd(SdCommand::new(cmd::GO_IDLE_STATE, 0, RespType::None))?;
        self.state = CardState::Idle;
        Ok(())
    }

    /// CMD8: voltage window and check pattern. Modern cards echo the
    /// argument; legacy cards do not respond at all, which is recorded
    /// rather than treated as fatal.
    fn get_ifcond(&mut self) -> Result<(), SdError> {
        match self.hc_send_cmd(SdCommand::new(cmd::SEND_IF_COND, IF_COND_ARG, RespType::R7)) {
            Ok(resp) => {
                if resp[0] & 0xfff != IF_COND_ARG {
                    return Err(SdError::CardInit);
                }
                self.card.f8 = true;
                Ok(())
            }
            Err(HcError::CommandTimeout) => {
                self.card.f8 = false;
                // The command state machine is stuck on the unanswered
                // command until reset.
                let _ = self.hc_reset(SwReset::CMD);
                Ok(())
            }
            Err(_) => Err(SdError::CardInit),
        }
    }

    /// ACMD41 ready poll, bounded by an explicit deadline.
    fn get_opcond(&mut self) -> Result<(), SdError> {
        let deadline = self.platform.ticks() + OPCOND_TIMEOUT_TICKS;
        let mut arg = OCR_VOLTAGE_WINDOW;
        if self.card.f8 {
            arg |= ACMD41_HCS;
        }

        loop {
            self.app_cmd(0)?;
            let resp = self
                .hc_send_cmd(SdCommand::new(cmd::ACMD_SD_SEND_OP_COND, arg, RespType::R3))
                .map_err(|_| SdError::CardInit)?;

            if resp[0] & OCR_BUSY != 0 {
                self.card.card_type = if resp[0] & OCR_CCS != 0 {
                    CardType::SdHc
                } else {
                    CardType::SdSc
                };
                self.state = CardState::Ready;
                return Ok(());
            }

            if self.platform.ticks() >= deadline {
                warn!("sd: card stuck busy in ACMD41 poll");
                return Err(SdError::CardInit);
            }
            self.platform.delay_us(1_000);
        }
    }

    fn get_cid(&mut self) -> Result<(), SdError> {
        let resp = self
            .hc_send_cmd(SdCommand::new(cmd::ALL_SEND_CID, 0, RespType::R2))
            .map_err(|_| SdError::CardInit)?;
        self.card.cid = resp;
        self.state = CardState::Ident;
        Ok(())
    }

    fn get_rca(&mut self) -> Result<(), SdError> {
        let resp = self
            .hc_send_cmd(SdCommand::new(cmd::SEND_RELATIVE_ADDR, 0, RespType::R6))
            .map_err(|_| SdError::CardInit)?;
        self.card.rca = resp[0] & 0xffff_0000;
        Ok(())
    }

    fn get_csd(&mut self) -> Result<(), SdError> {
        let resp = self
            .hc_send_cmd(SdCommand::new(cmd::SEND_CSD, self.card.rca, RespType::R2))
            .map_err(|_| SdError::CardInit)?;
        self.card.csd = resp;
        self.decode_capacity();
        Ok(())
    }

    /// Capacity from the CSD. The response registers hold CSD bits
    /// [127:8] in words 3..0, so every field sits 8 bits lower than its
    /// spec position.
    fn decode_capacity(&mut self) {
        let csd = &self.card.csd;
        let version = (csd[3] >> 22) & 0x3;

        self.card.sector_size = BLOCK_SIZE as u32;
        if version >= 1 {
            // CSD v2: C_SIZE in bits [69:48], capacity (C_SIZE+1) * 512 KiB.
            let c_size = (csd[1] >> 8) & 0x3f_ffff;
            self.card.sector_count = (c_size + 1) * 1024;
        } else {
            // CSD v1: C_SIZE [73:62], C_SIZE_MULT [49:47], READ_BL_LEN [83:80].
            let c_size = ((csd[2] & 0x3) << 10) | (csd[1] >> 22);
            let c_size_mult = (csd[1] >> 7) & 0x7;
            let read_bl_len = (csd[2] >> 8) & 0xf;
            let bytes = ((c_size + 1) as u64) << (c_size_mult + 2) << read_bl_len;
            self.card.sector_count = (bytes / BLOCK_SIZE as u64) as u32;
        }
        self.card.logical_block_count = self.card.sector_count;
        self.card.logical_block_size = self.card.sector_size;
    }

    fn select_card(&mut self) -> Result<(), SdError> {
        self.hc_send_cmd(SdCommand::new(cmd::SELECT_CARD, self.card.rca, RespType::R1b))
            .map_err(|_| SdError::CardInit)?;
        self.state = CardState::Transfer;
        Ok(())
    }

    /// ACMD6 on the card, then the matching width on the host side.
    fn set_bus_width(&mut self) -> Result<(), SdError> {
        let width = self.config.bus_width;
        if let BusWidth::Four = width {
            self.app_cmd(self.card.rca)?;
            self.hc_send_cmd(SdCommand::new(cmd::ACMD_SET_BUS_WIDTH, 0x2, RespType::R1))
                .map_err(|_| SdError::CardInit)?;
        }
        self.hc_set_bus_width(width);
        self.bus_width = width;
        Ok(())
    }

    fn set_block_len(&mut self) -> Result<(), SdError> {
        self.hc_send_cmd(SdCommand::new(
            cmd::SET_BLOCKLEN,
            BLOCK_SIZE as u32,
            RespType::R1,
        ))
        .map_err(|_| SdError::CardInit)?;
        Ok(())
    }

    /// CMD55 prefix for application commands.
    fn app_cmd(&mut self, rca: u32) -> Result<(), SdError> {
        let resp = self
            .hc_send_cmd(SdCommand::new(cmd::APP_CMD, rca, RespType::R1))
            .map_err(|_| SdError::CardInit)?;
        if resp[0] & CARD_STATUS_APP_CMD == 0 {
            return Err(SdError::CardInit);
        }
        Ok(())
    }
}

/// Disk-IO capability surface, the four-operation interface filesystem
/// clients consume.
pub trait DiskIo {
    fn initialize(&mut self, dev_id: u8) -> Result<(), SdError>;
    fn uninitialize(&mut self, dev_id: u8) -> Result<(), SdError>;
    fn status(&mut self) -> CardState;
    fn read(&mut self, sector: u32, count: u16, dest: &mut [u8]) -> Result<(), SdError>;
    fn write(&mut self, sector: u32, count: u16, src: &[u8]) -> Result<(), SdError>;
}

impl<B: SdBus, P: Clock + CacheOps> DiskIo for SdHandle<B, P> {
    fn initialize(&mut self, dev_id: u8) -> Result<(), SdError> {
        self.init(dev_id)
    }

    fn uninitialize(&mut self, dev_id: u8) -> Result<(), SdError> {
        self.uninit(dev_id)
    }

    fn status(&mut self) -> CardState {
        self.state()
    }

    fn read(&mut self, sector: u32, count: u16, dest: &mut [u8]) -> Result<(), SdError> {
        self.read_blocks(sector, count, dest)
    }

    fn write(&mut self, sector: u32, count: u16, src: &[u8]) -> Result<(), SdError> {
        self.write_blocks(sector, count, src)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::sd_host::{ErrorStatus, NormalStatus},
        std::{cell::RefCell, rc::Rc},
    };

    // Register offsets mirrored from the host layer.
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

    const MOCK_RCA: u32 = 0x1234_0000;

    std::thread_local! {
        /// Full host addresses handed to `local_to_bus`. On a 64-bit test
        /// host the 32-bit bus addresses the driver programs are truncated
        /// host pointers; the mock widens them back through this registry
        /// before dereferencing. Each test runs on its own thread, so the
        /// registry is isolated per test.
        static DMA_REGIONS: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    }

    /// Recover the full host address for a 32-bit bus address by matching
    /// it against the closest registered DMA region.
    fn widen_bus_addr(bus: u32) -> usize {
        DMA_REGIONS
            .with(|r| {
                r.borrow()
                    .iter()
                    .map(|&full| (bus.wrapping_sub(full as u32), full))
                    .filter(|&(delta, _)| delta < (1 << 20))
                    .min_by_key(|&(delta, _)| delta)
                    .map(|(delta, full)| full + delta as usize)
            })
            .expect("bus address does not fall in a registered DMA region")
    }

    /// Behavioral model of an SDHCI controller with one card behind it.
    struct Ctrl {
        // Registers.
        block_size: u16,
        block_count: u16,
        arg: u32,
        xfer_mode: u16,
        resp: [u32; 4],
        power: u8,
        hc1: u8,
        timeout: u8,
        nistr: u16,
        eistr: u16,
        n_en: u16,
        e_en: u16,
        adma_addr: u32,
        caps: u32,
        // Card model.
        present: bool,
        card_state: u32,
        app_cmd: bool,
        storage: Vec<u8>,
        c_size: u32,
        // Fault injection.
        fail_cmd8: bool,
        opcond_busy_polls: u32,
        opcond_never_ready: bool,
        fail_data_transfers: u32,
        // Bookkeeping.
        resets: u32,
        issued: Vec<u8>,
        data_setups: u32,
    }

    impl Ctrl {
        fn new() -> Self {
            Self {
                block_size: 0,
                block_count: 0,
                arg: 0,
                xfer_mode: 0,
                resp: [0; 4],
                power: 0,
                hc1: 0,
                timeout: 0,
                nistr: 0,
                eistr: 0,
                n_en: 0,
                e_en: 0,
                adma_addr: 0,
                caps: Capabilities::VOLT_3V3.bits() | Capabilities::ADMA2.bits(),
                present: true,
                card_state: 0,
                app_cmd: false,
                storage: vec![0; 64 * 1024],
                c_size: 63, // (63+1)*1024 blocks = 32 MiB
                fail_cmd8: false,
                opcond_busy_polls: 2,
                opcond_never_ready: false,
                fail_data_transfers: 0,
                resets: 0,
                issued: Vec::new(),
                data_setups: 0,
            }
        }

        fn fail(&mut self, bits: ErrorStatus) {
            self.eistr |= bits.bits();
            self.nistr |= NormalStatus::ERRINT.bits();
        }

        fn exec_cmd(&mut self, reg: u16) {
            let idx = ((reg >> 8) & 0x3f) as u8;
            self.issued.push(idx);
            let was_app = self.app_cmd;
            self.app_cmd = false;
            self.resp = [0; 4];

            match idx {
                0 => self.card_state = 0,
                2 => {
                    self.resp = [0x1122_3344, 0x5566_7788, 0x99aa_bbcc, 0x0dee_ff00];
                    self.card_state = 2;
                }
                3 => {
                    self.resp[0] = MOCK_RCA | 0x0500;
                    self.card_state = 3;
                }
                7 => {
                    if self.arg >> 16 == MOCK_RCA >> 16 {
                        self.card_state = 4;
                        self.nistr |= NormalStatus::TRFC.bits();
                    }
                }
                8 => {
                    if self.fail_cmd8 {
                        self.fail(ErrorStatus::CMDTEO);
                        return;
                    }
                    self.resp[0] = self.arg & 0xfff;
                }
                9 => {
                    // CSD v2 shifted down 8 bits into the response words.
                    self.resp[3] = 1 << 22;
                    self.resp[1] = self.c_size << 8;
                }
                13 => self.resp[0] = self.card_state << 9,
                16 => {}
                55 => {
                    self.app_cmd = true;
                    self.resp[0] = CARD_STATUS_APP_CMD;
                }
                6 if was_app => {}
                41 if was_app => {
                    if self.opcond_never_ready {
                        self.resp[0] = OCR_VOLTAGE_WINDOW;
                    } else if self.opcond_busy_polls > 0 {
                        self.opcond_busy_polls -= 1;
                        self.resp[0] = OCR_VOLTAGE_WINDOW;
                    } else {
                        self.resp[0] = OCR_BUSY | OCR_CCS | OCR_VOLTAGE_WINDOW;
                        self.card_state = 1;
                    }
                }
                17 | 18 | 24 | 25 => {
                    self.data_setups += 1;
                    if self.fail_data_transfers > 0 {
                        self.fail_data_transfers -= 1;
                        self.fail(ErrorStatus::DATTEO);
                        return;
                    }
                    self.do_dma(idx);
                    self.nistr |= NormalStatus::TRFC.bits();
                }
                _ => {}
            }

            self.nistr |= NormalStatus::CMDC.bits();
        }

        /// Walk the ADMA2 descriptor table and move data between the
        /// backing storage and the host buffers.
        fn do_dma(&mut self, idx: u8) {
            let read = idx == 17 || idx == 18;
            let mut card_off = self.arg as usize * 512;
            let mut desc_ptr = widen_bus_addr(self.adma_addr);

            loop {
                let (attr, len, addr) = unsafe {
                    let p = desc_ptr as *const u16;
                    (
                        p.read(),
                        p.add(1).read() as usize,
                        widen_bus_addr((desc_ptr as *const u32).add(1).read()),
                    )
                };
                if attr & 0x1 == 0 {
                    break;
                }

                if card_off + len > self.storage.len() {
                    self.storage.resize(card_off + len, 0);
                }

                unsafe {
                    if read {
                        core::ptr::copy_nonoverlapping(
                            self.storage.as_ptr().add(card_off),
                            addr as *mut u8,
                            len,
                        );
                    } else {
                        core::ptr::copy_nonoverlapping(
                            addr as *const u8,
                            self.storage.as_mut_ptr().add(card_off),
                            len,
                        );
                    }
                }

                card_off += len;
                if attr & 0x2 != 0 {
                    break;
                }
                desc_ptr += 8;
            }
        }
    }

    #[derive(Clone)]
    struct MockBus(Rc<RefCell<Ctrl>>);

    impl MockBus {
        fn new() -> Self {
            Self(Rc::new(RefCell::new(Ctrl::new())))
        }
    }

    impl SdBus for MockBus {
        fn read8(&self, offset: u32) -> u8 {
            let c = self.0.borrow();
            match offset {
                POWER_CTRL => c.power,
                HOST_CTRL1 => c.hc1,
                TIMEOUT_CTRL => c.timeout,
                SW_RESET => 0, // self-clearing
                _ => 0,
            }
        }

        fn write8(&mut self, offset: u32, val: u8) {
            let mut c = self.0.borrow_mut();
            match offset {
                POWER_CTRL => c.power = val,
                HOST_CTRL1 => c.hc1 = val,
                TIMEOUT_CTRL => c.timeout = val,
                SW_RESET => {
                    if val != 0 {
                        c.resets += 1;
                        c.eistr = 0;
                        c.nistr = 0;
                    }
                }
                _ => {}
            }
        }

        fn read16(&self, offset: u32) -> u16 {
            let c = self.0.borrow();
            match offset {
                CLOCK_CTRL => 0x2, // always stable
                NORMAL_INT_STATUS => c.nistr,
                ERROR_INT_STATUS => c.eistr,
                NORMAL_INT_ENABLE => c.n_en,
                ERROR_INT_ENABLE => c.e_en,
                BLOCK_SIZE_R => c.block_size,
                BLOCK_COUNT_R => c.block_count,
                XFER_MODE => c.xfer_mode,
                HOST_VERSION => 0x0002,
                _ => 0,
            }
        }

        fn write16(&mut self, offset: u32, val: u16) {
            let mut c = self.0.borrow_mut();
            match offset {
                BLOCK_SIZE_R => c.block_size = val,
                BLOCK_COUNT_R => c.block_count = val,
                XFER_MODE => c.xfer_mode = val,
                COMMAND => c.exec_cmd(val),
                NORMAL_INT_STATUS => c.nistr &= !val, // write-1-to-clear
                ERROR_INT_STATUS => c.eistr &= !val,
                NORMAL_INT_ENABLE => c.n_en = val,
                ERROR_INT_ENABLE => c.e_en = val,
                CLOCK_CTRL => {}
                _ => {}
            }
        }

        fn read32(&self, offset: u32) -> u32 {
            let c = self.0.borrow();
            match offset {
                PRESENT_STATE => {
                    if c.present {
                        PresentState::CARDINS.bits()
                    } else {
                        0
                    }
                }
                CAPABILITIES => c.caps,
                RESPONSE0 => c.resp[0],
                o if o == RESPONSE0 + 4 => c.resp[1],
                o if o == RESPONSE0 + 8 => c.resp[2],
                o if o == RESPONSE0 + 12 => c.resp[3],
                _ => 0,
            }
        }

        fn write32(&mut self, offset: u32, val: u32) {
            let mut c = self.0.borrow_mut();
            match offset {
                ARGUMENT => c.arg = val,
                ADMA_ADDR => c.adma_addr = val,
                _ => {}
            }
        }
    }

    struct FakeInner {
        now: u64,
        cleans: u32,
        invalidates: u32,
    }

    #[derive(Clone)]
    struct FakePlatform(Rc<RefCell<FakeInner>>);

    impl FakePlatform {
        fn new() -> Self {
            Self(Rc::new(RefCell::new(FakeInner {
                now: 0,
                cleans: 0,
                invalidates: 0,
            })))
        }
    }

    impl Clock for FakePlatform {
        fn ticks(&self) -> u64 {
            let mut inner = self.0.borrow_mut();
            inner.now += 1;
            inner.now
        }

        fn delay_us(&mut self, us: u32) {
            self.0.borrow_mut().now += us as u64;
        }
    }

    impl CacheOps for FakePlatform {
        fn clean_dcache(&mut self, _addr: usize, _len: usize) {
            self.0.borrow_mut().cleans += 1;
        }

        fn invalidate_dcache(&mut self, _addr: usize, _len: usize) {
            self.0.borrow_mut().invalidates += 1;
        }

        fn local_to_bus(&self, addr: usize) -> u32 {
            DMA_REGIONS.with(|r| r.borrow_mut().push(addr));
            addr as u32
        }
    }

    fn new_handle() -> (SdHandle<MockBus, FakePlatform>, MockBus, FakePlatform) {
        let bus = MockBus::new();
        let platform = FakePlatform::new();
        let handle = SdHandle::new(bus.clone(), platform.clone(), SdConfig::default());
        (handle, bus, platform)
    }

    fn init_handle() -> (SdHandle<MockBus, FakePlatform>, MockBus, FakePlatform) {
        let (mut sd, bus, platform) = new_handle();
        sd.init(0).unwrap();
        bus.0.borrow_mut().issued.clear();
        bus.0.borrow_mut().data_setups = 0;
        bus.0.borrow_mut().resets = 0;
        (sd, bus, platform)
    }

    #[test]
    fn init_brings_card_to_transfer_state() {
        let (mut sd, bus, _) = new_handle();
        sd.init(0).unwrap();

        assert_eq!(sd.state, CardState::Transfer);
        assert_eq!(sd.card_info().card_type, CardType::SdHc);
        assert_eq!(sd.card_info().rca, MOCK_RCA);
        assert_eq!(sd.card_info().sector_count, 64 * 1024);
        assert_eq!(sd.bus_width, BusWidth::Four);

        // Negotiation order: idle, ifcond, opcond poll, cid, rca, csd,
        // select, width, block length.
        let issued = bus.0.borrow().issued.clone();
        assert_eq!(issued[0], 0);
        assert_eq!(issued[1], 8);
        assert_eq!(*issued.last().unwrap(), 16);
        let acmd41s = issued.windows(2).filter(|w| w == &[55, 41]).count();
        assert_eq!(acmd41s, 3); // two busy polls plus the ready answer
    }

    #[test]
    fn host_init_selects_3v3_when_only_3v3_supported() {
        let (mut sd, bus, _) = new_handle();
        sd.host_init().unwrap();

        let power = bus.0.borrow().power;
        assert_eq!(power, PC_BUS_VSEL_3V3 | PC_BUS_PWR_VDD1);
    }

    #[test]
    fn host_init_falls_back_to_1v8_only_without_3v3() {
        let (mut sd, bus, _) = new_handle();
        bus.0.borrow_mut().caps = Capabilities::VOLT_1V8.bits();
        sd.host_init().unwrap();

        let power = bus.0.borrow().power;
        assert_eq!(power, PC_BUS_VSEL_1V8 | PC_BUS_PWR_VDD1);
    }

    #[test]
    fn absent_card_times_out_before_any_command() {
        let (mut sd, bus, _) = new_handle();
        bus.0.borrow_mut().present = false;

        assert_eq!(sd.init(0), Err(SdError::Timeout));
        assert!(bus.0.borrow().issued.is_empty());
    }

    #[test]
    fn opcond_poll_is_bounded() {
        let (mut sd, bus, _) = new_handle();
        bus.0.borrow_mut().opcond_never_ready = true;

        // Terminates with an error instead of spinning forever.
        assert_eq!(sd.init(0), Err(SdError::CardInit));
    }

    #[test]
    fn legacy_card_without_cmd8_still_negotiates() {
        let (mut sd, bus, _) = new_handle();
        bus.0.borrow_mut().fail_cmd8 = true;

        sd.init(0).unwrap();
        assert!(!sd.card_info().f8);
        assert_eq!(sd.state, CardState::Transfer);
    }

    #[test]
    fn write_then_read_round_trips() {
        let (mut sd, _, _) = init_handle();

        let mut src = vec![0u8; 3 * BLOCK_SIZE];
        for (i, b) in src.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        sd.write_blocks(10, 3, &src).unwrap();

        let mut dest = vec![0u8; 3 * BLOCK_SIZE];
        sd.read_blocks(10, 3, &mut dest).unwrap();
        assert_eq!(src, dest);
    }

    #[test]
    fn zero_count_is_a_noop() {
        let (mut sd, bus, _) = init_handle();

        let mut buf = [0u8; 0];
        sd.read_blocks(0, 0, &mut buf).unwrap();
        sd.write_blocks(0, 0, &buf).unwrap();

        assert!(bus.0.borrow().issued.is_empty());
    }

    #[test]
    fn short_buffer_is_rejected_before_any_command() {
        let (mut sd, bus, _) = init_handle();

        let mut small = [0u8; 100];
        assert_eq!(sd.read_blocks(0, 1, &mut small), Err(SdError::Read));
        assert_eq!(sd.write_blocks(0, 1, &small), Err(SdError::Write));
        assert!(bus.0.borrow().issued.is_empty());
    }

    #[test]
    fn transient_failure_is_retried_exactly_once() {
        let (mut sd, bus, _) = init_handle();
        bus.0.borrow_mut().fail_data_transfers = 1;

        let mut dest = vec![0u8; BLOCK_SIZE];
        sd.read_blocks(0, 1, &mut dest).unwrap();

        let c = bus.0.borrow();
        assert_eq!(c.resets, 1);
        assert_eq!(c.data_setups, 2);
    }

    #[test]
    fn second_consecutive_failure_is_terminal() {
        let (mut sd, bus, _) = init_handle();
        bus.0.borrow_mut().fail_data_transfers = 2;

        let mut dest = vec![0u8; BLOCK_SIZE];
        assert_eq!(sd.read_blocks(0, 1, &mut dest), Err(SdError::Read));

        // Two attempts, no third.
        assert_eq!(bus.0.borrow().data_setups, 2);
    }

    #[test]
    fn state_returns_to_transfer_after_any_outcome() {
        let (mut sd, bus, _) = init_handle();

        let mut dest = vec![0u8; BLOCK_SIZE];
        sd.read_blocks(0, 1, &mut dest).unwrap();
        assert_eq!(sd.state, CardState::Transfer);

        bus.0.borrow_mut().fail_data_transfers = 2;
        assert_eq!(sd.write_blocks(0, 1, &dest), Err(SdError::Write));
        assert_eq!(sd.state, CardState::Transfer);
    }

    #[test]
    fn cache_maintenance_wraps_dma() {
        let (mut sd, _, platform) = init_handle();

        let src = vec![0u8; BLOCK_SIZE];
        sd.write_blocks(0, 1, &src).unwrap();
        // Source buffer plus the descriptor table.
        assert!(platform.0.borrow().cleans >= 2);

        let mut dest = vec![0u8; BLOCK_SIZE];
        sd.read_blocks(0, 1, &mut dest).unwrap();
        assert_eq!(platform.0.borrow().invalidates, 1);
    }

    #[test]
    fn status_decodes_card_state_over_cmd13() {
        let (mut sd, bus, _) = init_handle();

        assert_eq!(sd.status(), CardState::Transfer);
        assert_eq!(*bus.0.borrow().issued.last().unwrap(), 13);
    }

    #[test]
    fn uninit_deselects_then_powers_off() {
        let (mut sd, bus, _) = init_handle();
        sd.uninit(0).unwrap();

        let c = bus.0.borrow();
        assert_eq!(*c.issued.last().unwrap(), 7);
        assert_eq!(c.power, 0);
    }

    #[test]
    fn transfer_too_large_for_descriptor_table_fails_cleanly() {
        let (mut sd, _, _) = init_handle();

        let count = (ADMA_DESC_COUNT + 1) as u16;
        let mut dest = vec![0u8; count as usize * BLOCK_SIZE];
        assert_eq!(sd.read_blocks(0, count, &mut dest), Err(SdError::Read));
        assert_eq!(sd.state, CardState::Transfer);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous RPC client for the secure-enclave services core.
//!
//! Requests are marshaled into a fixed-format packet, posted through a
//! single-slot shared-memory mailbox and signaled with a doorbell; the
//! caller blocks until the secure core posts its response into the same
//! slot. One request is outstanding at a time, enforced by `&mut self`.
//!
//! Every call produces two results: the transport status (message
//! delivered and answered at all) and a service-specific code whose
//! meaning is owned by the remote service. The code spaces are not
//! shared across services; some callers deliberately probe unsupported
//! paths and treat specific non-zero codes as expected.

use {crate::platform::Clock, log::debug};

/// Packet size in 32-bit words: header, service error slot and payload.
pub const PACKET_WORDS: usize = 16;
const PAYLOAD_WORDS: usize = PACKET_WORDS - 2;

/// Ticks allowed for the secure core to answer one request.
const CALL_TIMEOUT_TICKS: u64 = 10_000;
/// Heartbeat attempts before startup synchronization gives up.
const SYNC_RETRY_CAP: u32 = 100;

/// Remote operation selectors. Grouped by service family; the gaps leave
/// room for operations this client does not expose.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum ServiceId {
    Heartbeat = 0x000,

    // Crypto services.
    GetRandom = 0x101,
    GetSeRevision = 0x102,
    GetSocId = 0x103,

    // OTP access.
    OtpRead = 0x200,

    // Table-of-contents queries.
    GetTocVersion = 0x300,
    GetTocNumber = 0x301,
    GetTocViaCpuId = 0x302,

    // Boot control.
    BootCpu = 0x400,
    BootResetCpu = 0x401,
    BootReleaseExtSys0 = 0x402,

    // Clock control.
    ClockEnable = 0x500,
    SelectPllSource = 0x501,
    SelectOscSource = 0x502,
    SetClockDivider = 0x503,
}

/// CPU selectors understood by the TOC and boot services.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum CpuId {
    A32 = 0,
    M55Hp = 1,
    M55He = 2,
    ExtSys0 = 3,
}

/// Clock gates controllable through the clock service.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum ClockId {
    Camera = 0,
    Cdc200 = 1,
    Sdmmc = 2,
    Usb = 3,
    Canfd = 4,
}

/// Transport-level failures, distinct from any service-specific code so
/// callers can tell "message lost" from "service rejected request".
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeError {
    /// The mailbox would not accept the request.
    Transport,
    /// No response before the deadline.
    Timeout,
    /// The response slot held a packet for a different request.
    BadResponse,
}

/// Service-specific result code. Zero is success by convention, but the
/// interpretation belongs to the individual service.
pub type ServiceCode = u32;

/// Fixed-format request/response message. Word 0 carries the service
/// identifier, word 1 the remote service code (written by the secure
/// core), the rest is payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(C, align(4))]
pub struct ServicePacket {
    pub words: [u32; PACKET_WORDS],
}

impl ServicePacket {
    pub fn request(id: ServiceId, payload: &[u32]) -> Self {
        debug_assert!(payload.len() <= PAYLOAD_WORDS);
        let mut words = [0; PACKET_WORDS];
        words[0] = id as u32;
        words[2..2 + payload.len()].copy_from_slice(payload);
        Self { words }
    }

    pub fn service_id(&self) -> u32 {
        self.words[0]
    }

    pub fn service_code(&self) -> ServiceCode {
        self.words[1]
    }

    /// Payload word `n` of the response.
    pub fn word(&self, n: usize) -> u32 {
        self.words[2 + n]
    }
}

/// The mailbox and doorbell between this core and the secure core.
/// Hardware implements this over a shared SRAM region plus an
/// inter-processor event; tests script it.
pub trait SeMailbox {
    /// Place a request in the shared slot. Fails if the slot is still
    /// owned by the remote side.
    fn write_request(&mut self, packet: &ServicePacket) -> Result<(), SeError>;

    /// Signal the secure core that a request is pending.
    fn ring_doorbell(&mut self);

    /// True once the remote side has posted a response.
    fn response_ready(&mut self) -> bool;

    /// Take the response out of the slot, releasing it.
    fn read_response(&mut self) -> ServicePacket;
}

/// Services client handle. One per channel to the secure core.
pub struct SeServices<M, C> {
    mailbox: M,
    clock: C,
}

impl<M: SeMailbox, C: Clock> SeServices<M, C> {
    pub fn new(mailbox: M, clock: C) -> Self {
        Self { mailbox, clock }
    }

    /// Issue one request and block for the response. Returns the whole
    /// response packet; transport failures are surfaced separately from
    /// whatever code the service wrote.
    pub fn call(&mut self, id: ServiceId, payload: &[u32]) -> Result<ServicePacket, SeError> {
        let request = ServicePacket::request(id, payload);
        self.mailbox.write_request(&request)?;
        self.mailbox.ring_doorbell();

        let deadline = self.clock.ticks() + CALL_TIMEOUT_TICKS;
        while !self.mailbox.response_ready() {
            if self.clock.ticks() >= deadline {
                return Err(SeError::Timeout);
            }
        }

        let response = self.mailbox.read_response();
        if response.service_id() != id as u32 {
            return Err(SeError::BadResponse);
        }
        Ok(response)
    }

    /// No-op request proving the secure core is alive.
    pub fn heartbeat(&mut self) -> Result<ServiceCode, SeError> {
        Ok(self.call(ServiceId::Heartbeat, &[])?.service_code())
    }

    /// Establish liveness at startup: retry the heartbeat until the
    /// secure core answers or the bounded cap runs out. Returns the
    /// number of retries that were needed.
    pub fn synchronize_with_se(&mut self) -> Result<u32, SeError> {
        for retry in 0..SYNC_RETRY_CAP {
            match self.heartbeat() {
                Ok(_) => {
                    debug!("se: synchronized after {} retries", retry);
                    return Ok(retry);
                }
                Err(SeError::Timeout) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(SeError::Timeout)
    }

    /// Gate a peripheral clock on or off.
    pub fn enable_clock(&mut self, clock: ClockId, enable: bool) -> Result<ServiceCode, SeError> {
        let resp = self.call(ServiceId::ClockEnable, &[clock as u32, enable as u32])?;
        Ok(resp.service_code())
    }

    pub fn select_pll_source(&mut self, source: u32) -> Result<ServiceCode, SeError> {
        Ok(self
            .call(ServiceId::SelectPllSource, &[source])?
            .service_code())
    }

    pub fn select_osc_source(&mut self, source: u32) -> Result<ServiceCode, SeError> {
        Ok(self
            .call(ServiceId::SelectOscSource, &[source])?
            .service_code())
    }

    pub fn set_clock_divider(&mut self, divider: u32) -> Result<ServiceCode, SeError> {
        Ok(self
            .call(ServiceId::SetClockDivider, &[divider])?
            .service_code())
    }

    /// Read one OTP word. The value is only meaningful when the service
    /// code reports success.
    pub fn read_otp(&mut self, offset: u32) -> Result<(u32, ServiceCode), SeError> {
        let resp = self.call(ServiceId::OtpRead, &[offset])?;
        Ok((resp.word(0), resp.service_code()))
    }

    pub fn get_toc_version(&mut self) -> Result<(u32, ServiceCode), SeError> {
        let resp = self.call(ServiceId::GetTocVersion, &[])?;
        Ok((resp.word(0), resp.service_code()))
    }

    pub fn get_toc_number(&mut self) -> Result<(u32, ServiceCode), SeError> {
        let resp = self.call(ServiceId::GetTocNumber, &[])?;
        Ok((resp.word(0), resp.service_code()))
    }

    /// TOC entry lookup by CPU; returns (version, flags) of the entry.
    pub fn get_toc_via_cpuid(&mut self, cpu: CpuId) -> Result<(u32, u32, ServiceCode), SeError> {
        let resp = self.call(ServiceId::GetTocViaCpuId, &[cpu as u32])?;
        Ok((resp.word(0), resp.word(1), resp.service_code()))
    }

    pub fn boot_cpu(&mut self, cpu: CpuId, address: u32) -> Result<ServiceCode, SeError> {
        let resp = self.call(ServiceId::BootCpu, &[cpu as u32, address])?;
        Ok(resp.service_code())
    }

    pub fn boot_reset_cpu(&mut self, cpu: CpuId) -> Result<ServiceCode, SeError> {
        Ok(self
            .call(ServiceId::BootResetCpu, &[cpu as u32])?
            .service_code())
    }

    pub fn boot_release_extsys0(&mut self) -> Result<ServiceCode, SeError> {
        Ok(self.call(ServiceId::BootReleaseExtSys0, &[])?.service_code())
    }

    /// Fill `dest` from the secure core's TRNG, one packet payload worth
    /// of words per request. Stops at the first non-success code.
    pub fn get_random(&mut self, dest: &mut [u8]) -> Result<ServiceCode, SeError> {
        let mut code = 0;
        for chunk in dest.chunks_mut(4 * PAYLOAD_WORDS) {
            let words = chunk.len().div_ceil(4);
            let resp = self.call(ServiceId::GetRandom, &[words as u32])?;
            code = resp.service_code();
            if code != 0 {
                break;
            }
            for (i, byte) in chunk.iter_mut().enumerate() {
                *byte = (resp.word(i / 4) >> (8 * (i % 4))) as u8;
            }
        }
        Ok(code)
    }

    pub fn get_se_revision(&mut self) -> Result<(u32, ServiceCode), SeError> {
        let resp = self.call(ServiceId::GetSeRevision, &[])?;
        Ok((resp.word(0), resp.service_code()))
    }

    pub fn get_soc_id(&mut self) -> Result<(u32, ServiceCode), SeError> {
        let resp = self.call(ServiceId::GetSocId, &[])?;
        Ok((resp.word(0), resp.service_code()))
    }
}

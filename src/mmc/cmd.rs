// cmd config
use super::*;
use static_assertions::const_assert_eq;

/// Widest index the six-bit command field carries.
pub const MAX_CMD_INDEX: u8 = 63;

const_assert_eq!(CSR_CMD_MASK >> CSR_CMD_SHIFT, MAX_CMD_INDEX as u32);

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MmcCmd {
    GO_IDLE_STATE = 0,
    SEND_OP_COND = 1,
    ALL_SEND_CID = 2,
    SET_RELATIVE_ADDR = 3,
    SWITCH = 6,
    SELECT_CARD = 7,
    SEND_EXT_CSD = 8,
    SEND_CSD = 9,
    STOP_TRANSMISSION = 12,
    SEND_STATUS = 13,
    SET_BLOCKLEN = 16,
    READ_SINGLE_BLOCK = 17,
    READ_MULTIPLE_BLOCK = 18,
    WRITE_SINGLE_BLOCK = 24,
    WRITE_MULTIPLE_BLOCK = 25,
    APP_CMD = 55,
}

impl From<MmcCmd> for u8 {
    fn from(cmd: MmcCmd) -> u8 {
        cmd as u8
    }
}

bitflags::bitflags! {
    pub struct MmcResp : u32 {
        const PRESENT = 1 << 0;
        const RESP_136 = 1 << 1;
        const CRC = 1 << 2;
        const BUSY = 1 << 3;
        const OPCODE = 1 << 4;
        const NONE = 0;

        const R1 =
            MmcResp::PRESENT.bits |
            MmcResp::CRC.bits |
            MmcResp::OPCODE.bits;
        const R1B =
            MmcResp::PRESENT.bits |
            MmcResp::CRC.bits |
            MmcResp::OPCODE.bits |
            MmcResp::BUSY.bits;
        const R2 =
            MmcResp::PRESENT.bits |
            MmcResp::RESP_136.bits |
            MmcResp::CRC.bits;
        const R3 = MmcResp::PRESENT.bits;
    }
}

/// Reply format the card is expected to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    None,
    R1,
    R1b,
    R2,
    R3,
}

impl ResponseClass {
    pub fn flags(self) -> MmcResp {
        match self {
            ResponseClass::None => MmcResp::NONE,
            ResponseClass::R1 => MmcResp::R1,
            ResponseClass::R1b => MmcResp::R1B,
            ResponseClass::R2 => MmcResp::R2,
            ResponseClass::R3 => MmcResp::R3,
        }
    }

    pub fn is_present(self) -> bool {
        self != ResponseClass::None
    }
}

/// One bus command. Built by the caller, consumed by a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmcCommand {
    pub index: u8,
    pub arg: u32,
    pub class: ResponseClass,
    /// Fail with a CRC error when the controller reports a bad response CRC.
    pub check_crc: bool,
    /// The card may hold DAT0 low after responding.
    pub busy: bool,
}

impl MmcCommand {
    /// CRC and busy requirements follow the response class.
    pub fn new<C: Into<u8>>(index: C, arg: u32, class: ResponseClass) -> Self {
        let flags = class.flags();
        Self {
            index: index.into(),
            arg,
            class,
            check_crc: flags.contains(MmcResp::CRC),
            busy: flags.contains(MmcResp::BUSY),
        }
    }

    pub fn with_crc(mut self, check_crc: bool) -> Self {
        self.check_crc = check_crc;
        self
    }

    pub fn with_busy(mut self, busy: bool) -> Self {
        self.busy = busy;
        self
    }

    /// Reject an index the command field would truncate into another command.
    pub fn validate(&self) -> SdResult {
        if self.index > MAX_CMD_INDEX {
            return Err(SdError::CommandIndexOutOfRange);
        }
        Ok(())
    }
}

/// Caller-owned response buffer, overwritten in place by every dispatch.
pub type Response = [u32; 4];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_requirements_follow_class() {
        let cmd = MmcCommand::new(MmcCmd::SEND_STATUS, 0x1234 << 16, ResponseClass::R1);
        assert_eq!(cmd.index, 13);
        assert!(cmd.check_crc);
        assert!(!cmd.busy);

        let cmd = MmcCommand::new(MmcCmd::SELECT_CARD, 0, ResponseClass::R1b);
        assert!(cmd.check_crc && cmd.busy);

        // R3 carries no valid CRC
        let cmd = MmcCommand::new(41u8, 0x40FF_8000, ResponseClass::R3);
        assert!(!cmd.check_crc);
    }

    #[test]
    fn index_beyond_six_bits_is_rejected() {
        let cmd = MmcCommand::new(0x47u8, 0, ResponseClass::None);
        assert_eq!(cmd.index, 0x47);
        assert_eq!(cmd.validate(), Err(SdError::CommandIndexOutOfRange));
        assert_eq!(MmcCommand::new(63u8, 0, ResponseClass::None).validate(), Ok(()));
    }

    #[test]
    fn long_response_flags() {
        assert!(ResponseClass::R2.flags().contains(MmcResp::RESP_136));
        assert!(!ResponseClass::None.is_present());
    }
}

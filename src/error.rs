use core::fmt;

pub type SdResult<T = ()> = Result<T, SdError>;

#[repr(isize)]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SdError {
    // Hardware Error
    CommandTimeout = 0,
    ResponseTimeout,
    BusyTimeout,
    TransferTimeout,
    DataTimeout,
    CardBusyTimeout,
    ResetTimeout,
    ResponseCrc,
    // Caller Error
    BlockCountTooLarge,
    BlockSizeTooLarge,
    BlockSizeZero,
    MisalignedBuffer,
    BufferOutOfRange,
    CommandIndexOutOfRange,
}

/// The three failure classes the storage layer above distinguishes.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    Timeout,
    Crc,
    Configuration,
}

impl SdError {
    pub fn kind(&self) -> ErrorKind {
        use self::SdError::*;
        match self {
            CommandTimeout | ResponseTimeout | BusyTimeout | TransferTimeout | DataTimeout
            | CardBusyTimeout | ResetTimeout => ErrorKind::Timeout,
            ResponseCrc => ErrorKind::Crc,
            BlockCountTooLarge
            | BlockSizeTooLarge
            | BlockSizeZero
            | MisalignedBuffer
            | BufferOutOfRange
            | CommandIndexOutOfRange => ErrorKind::Configuration,
        }
    }
}

impl fmt::Display for SdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::SdError::*;
        let explain = match self {
            CommandTimeout => "Command out never completed",
            ResponseTimeout => "Response timeout",
            BusyTimeout => "Card busy, ready probe exhausted",
            TransferTimeout => "Block transfer timeout",
            DataTimeout => "Data-in timeout",
            CardBusyTimeout => "Card kept DAT0 low",
            ResetTimeout => "Controller reset never cleared",
            ResponseCrc => "Response CRC error",
            BlockCountTooLarge => "Block count exceeds 255",
            BlockSizeTooLarge => "Block size exceeds 512 bytes",
            BlockSizeZero => "Block size is zero",
            MisalignedBuffer => "DMA buffer not word aligned",
            BufferOutOfRange => "DMA buffer above the 32-bit address range",
            CommandIndexOutOfRange => "Command index exceeds 63",
        };
        write!(f, "{}", explain)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let explain = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Crc => "crc error",
            ErrorKind::Configuration => "configuration error",
        };
        write!(f, "{}", explain)
    }
}

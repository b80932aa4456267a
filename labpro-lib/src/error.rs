use std::num::ParseFloatError;

use nusb::transfer::TransferError;
use thiserror::Error;

/// The primary error type for the `labpro-lib` library.
#[derive(Error, Debug)]
pub enum LabProError {
    #[error("USB device not found. Is the LabPro connected and switched on?")]
    DeviceNotFound,

    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    #[error("USB transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// A bulk write missed its deadline. Read deadlines never surface here;
    /// the device ends every response by letting the read deadline lapse, so
    /// those are normalized to "no more data" inside the transport.
    #[error("USB transfer timed out: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("response still streaming after {max_packets} packets")]
    ResponseOverrun { max_packets: usize },

    #[error("unparsable numeric token {token:?} in device response")]
    Parse {
        token: String,
        source: ParseFloatError,
    },

    #[error("no complete status snapshot after {attempts} polls")]
    StatusTimeout { attempts: u32 },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

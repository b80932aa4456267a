pub mod command;
pub mod device;
pub mod error;
pub mod status;

// Re-export the LabPro struct and the types its API surfaces for easy access
pub use command::{Command, CommandReply, ResponseKind};
pub use device::{BulkLink, DeviceAddress, LabPro, RetryPolicy, UsbLink};
pub use error::LabProError;
pub use status::DeviceStatus;

//! The hart module contains the HART data-link layer: the frame codec, the
//! Command 48 diagnostic decoder, the master MAC state machine and the
//! physical layers it drives.

pub mod diagnostics;
pub mod frame;
pub mod mac;
pub mod physical;
pub mod serial;
pub mod serial_mock;

pub use diagnostics::{Command48Response, DeviceDiagnostics, DiagnosticFlag, StatusBytes};
pub use frame::{checksum, decode, encode, Address, Delimiter, Frame, FrameType, MasterAddress};
pub use mac::{
    FailureReason, MacConfig, MacState, MacStatistics, MasterMac, RetryCause, TransactionResult,
};
pub use physical::PhysicalLayer;
pub use serial::{SerialConfig, SerialPhysicalLayer};

//! Kernel bring-up sequencing.
pub mod init;
pub mod status;

pub use init::{init_kernel, Phase};
pub use status::{register_component, update_component_status, InitStatus};

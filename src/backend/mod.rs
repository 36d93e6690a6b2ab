// Backend module - Vulkan bring-up steps
//
// Design: Thin wrapper around ash, one module per creation step
// Ownership: nothing here destroys itself; the context releases handles in
// reverse stage order

pub mod buffer;
pub mod commands;
pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod stage;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use error::{InitError, InitResult};
pub use stage::{Progress, Stage};

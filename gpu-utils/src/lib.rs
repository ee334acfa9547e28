pub mod gpu;

#[cfg(debug_assertions)]
pub mod wgpu_utils;

pub use gpu::{Gpu, GpuDescriptor, GpuError};

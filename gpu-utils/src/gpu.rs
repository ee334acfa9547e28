use log::{debug, trace, warn};
use std::sync::Arc;
use thiserror::Error;

/// Descriptor used to configure and create a `Gpu` instance.
pub struct GpuDescriptor {
    /// Which wgpu backends to enable.
    pub backends: wgpu::Backends,
    /// Power preference for adapter selection.
    pub power_preference: wgpu::PowerPreference,
    /// Features that must be available on the device.
    pub required_features: wgpu::Features,
    /// Optional device limits to request. If `None`, the adapter's limits are used.
    pub required_limits: Option<wgpu::Limits>,
}

impl Default for GpuDescriptor {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::PRIMARY,
            power_preference: wgpu::PowerPreference::LowPower,
            required_features: wgpu::Features::empty(),
            required_limits: None,
        }
    }
}

/// High-level GPU wrapper that owns a `wgpu::Instance`, the chosen adapter and the
/// device/queue pair used by the rendering thread.
pub struct Gpu {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,

    features: wgpu::Features,
    limits: wgpu::Limits,

    device: wgpu::Device,
    queue: wgpu::Queue,
}

/* ----------------------
Public API (constructors / getters)
---------------------- */
impl Gpu {
    /// Create a new `Gpu` from descriptor.
    ///
    /// This validates required features against the chosen adapter, requests a device
    /// and queue, and returns an `Arc<Gpu>`.
    pub async fn new(desc: GpuDescriptor) -> Result<Arc<Self>, GpuError> {
        let GpuDescriptor {
            backends,
            power_preference,
            required_features,
            required_limits,
        } = desc;

        trace!(
            "Gpu::new: creating instance with backends={backends:?}, power_preference={power_preference:?}"
        );
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        trace!("Gpu::new: requesting adapter");
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        debug!("Gpu::new: adapter received: {:#?}", adapter.get_info());

        // Validate features requested by user are supported by the adapter.
        let adapter_features = adapter.features();
        if !adapter_features.contains(required_features) {
            warn!(
                "Gpu::new: adapter does not support required features: required={required_features:?} available={adapter_features:?}"
            );
            return Err(GpuError::AdapterFeatureUnsupported);
        }

        // Determine limits (use adapter limits if not provided)
        let limits = required_limits.unwrap_or_else(|| adapter.limits());
        let features = required_features;
        trace!("Gpu::new: requesting device with features={features:?}, limits={limits:?}");

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Gpu: request device"),
                required_features: features,
                required_limits: limits.clone(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        trace!("Gpu::new: device and queue successfully created");
        Ok(Arc::new(Self {
            instance,
            adapter,
            features,
            limits,
            device,
            queue,
        }))
    }

    /// Get reference to the underlying wgpu Instance.
    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    /// Get reference to the chosen adapter.
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    /// Information about the chosen adapter.
    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Clone and return the device.
    pub fn device(&self) -> wgpu::Device {
        self.device.clone()
    }

    /// Clone and return the queue.
    pub fn queue(&self) -> wgpu::Queue {
        self.queue.clone()
    }

    /// Get features requested at creation.
    pub fn features(&self) -> &wgpu::Features {
        &self.features
    }

    /// Get limits requested at creation.
    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }
}

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("Failed to request adapter")]
    AdapterRequestFailed(#[from] wgpu::RequestAdapterError),
    #[error("Adapter does not support required features")]
    AdapterFeatureUnsupported,
    #[error("Failed to request device")]
    DeviceRequestFailed(#[from] wgpu::RequestDeviceError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Gpu::new with the noop backend produces a working device/queue pair
    /// and reports the requested (empty) feature set.
    #[tokio::test]
    async fn gpu_new_with_noop_backend() {
        let gpu = Gpu::new(GpuDescriptor {
            backends: wgpu::Backends::NOOP,
            ..Default::default()
        })
        .await;

        // The noop backend is only discoverable through enumerate_adapters,
        // so adapter request may legitimately fail here. Either outcome is
        // acceptable; what matters is that failure is a typed error, not a panic.
        match gpu {
            Ok(gpu) => {
                assert!(gpu.features().is_empty());
                let _ = gpu.device();
                let _ = gpu.queue();
            }
            Err(GpuError::AdapterRequestFailed(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    /// The test harness in `wgpu_utils` yields a usable noop device.
    #[tokio::test]
    async fn noop_harness_yields_device_and_queue() {
        let (_instance, _adapter, device, queue) = crate::wgpu_utils::noop_wgpu().await;
        // Creating and submitting an empty encoder must succeed on the noop device.
        let encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("noop_harness_smoke"),
        });
        queue.submit(Some(encoder.finish()));
    }
}

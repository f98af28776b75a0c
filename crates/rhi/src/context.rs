//! The device context: instance, selected GPU and logical device as a unit.

use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use tracing::{error, info};

use crate::device::Device;
use crate::error::RhiResult;
use crate::instance::{Instance, InstanceDesc};
use crate::physical_device::{PhysicalDeviceInfo, PresentTarget, select_physical_device};

/// Owns everything every other GPU object depends on.
///
/// Dropping the context waits for the device to go idle, destroys the
/// device, then the debug messenger and the instance. Any surface created
/// from [`Context::instance`] must be destroyed before the context.
///
/// Clones of [`Context::device`] must not outlive the context. If one does,
/// the instance is leaked rather than destroyed under a live device.
pub struct Context {
    device: ManuallyDrop<Arc<Device>>,
    physical_device: PhysicalDeviceInfo,
    instance: ManuallyDrop<Instance>,
}

impl Context {
    /// Assembles a context from its parts.
    ///
    /// Building the parts separately lets the caller create a window surface
    /// between instance creation and device selection while keeping local
    /// drop order correct on early return.
    pub fn new(
        instance: Instance,
        physical_device: PhysicalDeviceInfo,
        device: Arc<Device>,
    ) -> Self {
        Self {
            device: ManuallyDrop::new(device),
            physical_device,
            instance: ManuallyDrop::new(instance),
        }
    }

    /// Selects a device for `instance` and assembles the context.
    pub fn with_device(
        instance: Instance,
        present: Option<PresentTarget<'_>>,
        device_extensions: &[&CStr],
    ) -> RhiResult<Self> {
        let physical_device = select_physical_device(instance.handle(), present)?;
        let device = Device::new(&instance, &physical_device, device_extensions)?;
        Ok(Self::new(instance, physical_device, device))
    }

    /// Creates an instance without surface extensions and a device without
    /// the swapchain extension. Used for offscreen work and tests.
    pub fn headless(desc: &InstanceDesc<'_>) -> RhiResult<Self> {
        let instance = Instance::new(desc)?;
        let context = Self::with_device(instance, None, &[])?;
        info!(
            "Headless context ready on '{}'",
            context.physical_device.device_name()
        );
        Ok(context)
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    #[inline]
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let outstanding = Arc::strong_count(&self.device) - 1;
        // Device before instance; Device::drop waits for idle.
        unsafe { ManuallyDrop::drop(&mut self.device) };
        if outstanding > 0 {
            error!(
                "{} device handle(s) outlive the context, leaking the Vulkan instance",
                outstanding
            );
            return;
        }
        unsafe { ManuallyDrop::drop(&mut self.instance) };
    }
}

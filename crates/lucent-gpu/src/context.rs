//! Device context: physical device selection, queue families, logical device.

use crate::error::{GpuError, Result};
use crate::instance::create_instance;
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

/// Owns the Vulkan instance, the logical device, and both queues.
///
/// Created once at startup; everything else borrows it. Dropped last, after
/// all resources built on it have been destroyed.
pub struct DeviceContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,

    pub(crate) properties: vk::PhysicalDeviceProperties,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub(crate) features: vk::PhysicalDeviceFeatures,

    pub(crate) graphics_queue_family: u32,
    pub(crate) compute_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) compute_queue: vk::Queue,
}

impl DeviceContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the physical device properties snapshot.
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    /// Get the memory properties snapshot used for memory type resolution.
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Get the physical device feature snapshot.
    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the compute queue.
    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get the compute queue family index.
    pub fn compute_queue_family(&self) -> u32 {
        self.compute_queue_family
    }

    /// Wait for the whole device (both queues) to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a device context.
pub struct DeviceContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for DeviceContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Lucent".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl DeviceContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the device context.
    ///
    /// Fails fatally when no device exposes both a graphics-capable and a
    /// compute-capable queue family; that is a configuration error, not a
    /// runtime condition to retry.
    pub fn build(self) -> Result<DeviceContext> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation) }?;

        let (physical_device, queue_families) = unsafe { select_physical_device(&instance) }?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let features = unsafe { instance.get_physical_device_features(physical_device) };

        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        tracing::info!(
            "Selected GPU: {} (graphics family {}, compute family {})",
            device_name.to_string_lossy(),
            queue_families.graphics,
            queue_families.compute,
        );

        let (device, graphics_queue, compute_queue) =
            unsafe { create_device(&instance, physical_device, &queue_families)? };

        Ok(DeviceContext {
            entry,
            instance,
            physical_device,
            device: Arc::new(device),
            properties,
            memory_properties,
            features,
            graphics_queue_family: queue_families.graphics,
            compute_queue_family: queue_families.compute,
            graphics_queue,
            compute_queue,
        })
    }
}

/// Queue family indices for the two queues the renderer drives.
struct QueueFamilyIndices {
    graphics: u32,
    compute: u32,
}

/// Pick the first physical device exposing both required queue families.
///
/// # Safety
/// The instance must be valid.
unsafe fn select_physical_device(
    instance: &ash::Instance,
) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
    let devices = instance.enumerate_physical_devices()?;

    if devices.is_empty() {
        return Err(GpuError::NoSuitableDevice);
    }

    let mut last_err = GpuError::NoSuitableDevice;
    for device in devices {
        match find_queue_families(&instance.get_physical_device_queue_family_properties(device)) {
            Ok(families) => return Ok((device, families)),
            Err(e) => last_err = e,
        }
    }

    Err(last_err)
}

/// Find graphics and compute queue families.
///
/// A dedicated compute-only family is preferred when the hardware has one;
/// otherwise the compute queue shares the graphics family.
fn find_queue_families(families: &[vk::QueueFamilyProperties]) -> Result<QueueFamilyIndices> {
    let mut graphics_family = None;
    let mut compute_family = None;

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;

        if family.queue_flags.contains(vk::QueueFlags::COMPUTE)
            && !family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            && compute_family.is_none()
        {
            compute_family = Some(i);
        }

        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
            graphics_family = Some(i);
        }
    }

    let graphics = graphics_family.ok_or(GpuError::NoGraphicsQueue)?;

    // Fall back to any compute-capable family (the graphics family always
    // qualifies per the Vulkan spec, but check rather than assume)
    let compute = match compute_family {
        Some(family) => family,
        None => {
            if families[graphics as usize]
                .queue_flags
                .contains(vk::QueueFlags::COMPUTE)
            {
                graphics
            } else {
                families
                    .iter()
                    .position(|f| f.queue_flags.contains(vk::QueueFlags::COMPUTE))
                    .map(|i| i as u32)
                    .ok_or(GpuError::NoComputeQueue)?
            }
        }
    };

    Ok(QueueFamilyIndices { graphics, compute })
}

/// Required device extensions.
fn required_device_extensions() -> Vec<&'static CStr> {
    vec![ash::khr::swapchain::NAME]
}

/// Create the logical device and retrieve both queues.
///
/// One queue-create entry when the families coincide, two when they differ.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_families: &QueueFamilyIndices,
) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
    let queue_priority = 1.0_f32;
    let mut queue_create_infos = vec![vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_families.graphics)
        .queue_priorities(std::slice::from_ref(&queue_priority))];
    if queue_families.compute != queue_families.graphics {
        queue_create_infos.push(
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_families.compute)
                .queue_priorities(std::slice::from_ref(&queue_priority)),
        );
    }

    let extensions = required_device_extensions();
    let extension_names: Vec<*const i8> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    // Dynamic rendering and synchronization2 are core in 1.3 but still need
    // to be switched on
    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);

    let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan_1_3_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .map_err(GpuError::from)?;

    let graphics_queue = device.get_device_queue(queue_families.graphics, 0);
    let compute_queue = device.get_device_queue(queue_families.compute, 0);

    Ok((device, graphics_queue, compute_queue))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_dedicated_compute_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        ];
        let indices = find_queue_families(&families).unwrap();
        assert_eq!(indices.graphics, 0);
        assert_eq!(indices.compute, 1);
    }

    #[test]
    fn shares_graphics_family_when_no_dedicated_compute() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = find_queue_families(&families).unwrap();
        assert_eq!(indices.graphics, 0);
        assert_eq!(indices.compute, 0);
    }

    #[test]
    fn missing_graphics_family_is_fatal() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        assert!(matches!(
            find_queue_families(&families),
            Err(GpuError::NoGraphicsQueue)
        ));
    }

    #[test]
    fn missing_compute_family_is_fatal() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert!(matches!(
            find_queue_families(&families),
            Err(GpuError::NoComputeQueue)
        ));
    }
}

// Vulkan device - GPU selection and logical device
//
// Responsibilities:
// - Physical device enumeration, tested against the window surface
// - Queue family selection (graphics + present in one family)
// - Logical device + queue creation

use super::error::{InitError, InitResult};
use super::instance::driver_string;
use super::surface::Surface;
use ash::extensions::khr;
use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub index: u32,
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    pub present: bool,
}

impl QueueFamilyInfo {
    fn can_draw_and_present(&self) -> bool {
        self.queue_count > 0 && self.present && self.flags.contains(vk::QueueFlags::GRAPHICS)
    }
}

/// What selection needs to know about one GPU
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub families: Vec<QueueFamilyInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub physical_device: vk::PhysicalDevice,
    pub name: String,
    pub queue_family: u32,
}

fn type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
        _ => 1,
    }
}

/// Pick the best GPU with a queue family that can both draw and present.
/// Ties keep enumeration order.
pub fn select_device(candidates: &[DeviceCandidate]) -> InitResult<Selection> {
    if candidates.is_empty() {
        return Err(InitError::NoPhysicalDevice);
    }

    let mut best: Option<(u32, Selection)> = None;
    for candidate in candidates {
        let Some(family) = candidate.families.iter().find(|f| f.can_draw_and_present()) else {
            log::debug!("Skipping {}: no graphics+present queue family", candidate.name);
            continue;
        };

        let score = type_score(candidate.device_type);
        if best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((
                score,
                Selection {
                    physical_device: candidate.handle,
                    name: candidate.name.clone(),
                    queue_family: family.index,
                },
            ));
        }
    }

    best.map(|(_, selection)| selection).ok_or(InitError::NoPresentableQueue {
        devices: candidates.len(),
    })
}

/// Query every physical device and its queue families
pub fn enumerate_candidates(instance: &ash::Instance, surface: &Surface) -> InitResult<Vec<DeviceCandidate>> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(InitError::EnumeratePhysicalDevices)?;

    let mut candidates = Vec::with_capacity(devices.len());
    for handle in devices {
        let props = unsafe { instance.get_physical_device_properties(handle) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(handle) };

        let mut families = Vec::with_capacity(queue_families.len());
        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;
            families.push(QueueFamilyInfo {
                index,
                flags: family.queue_flags,
                queue_count: family.queue_count,
                present: surface.supports_present(handle, index)?,
            });
        }

        candidates.push(DeviceCandidate {
            handle,
            name: driver_string(&props.device_name),
            device_type: props.device_type,
            families,
        });
    }

    Ok(candidates)
}

/// Logical device and its single graphics/present queue
pub struct Device {
    pub handle: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue: vk::Queue,
    pub queue_family: u32,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub swapchain_loader: khr::Swapchain,
}

impl Device {
    pub fn new(instance: &ash::Instance, selection: &Selection) -> InitResult<Self> {
        log::info!("Creating logical device on {}", selection.name);

        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(selection.queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let extensions = [khr::Swapchain::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions);

        let handle = unsafe { instance.create_device(selection.physical_device, &create_info, None) }
            .map_err(InitError::CreateDevice)?;

        let queue = unsafe { handle.get_device_queue(selection.queue_family, 0) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(selection.physical_device) };
        let swapchain_loader = khr::Swapchain::new(instance, &handle);

        Ok(Self {
            handle,
            physical_device: selection.physical_device,
            queue,
            queue_family: selection.queue_family,
            memory_properties,
            swapchain_loader,
        })
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> InitResult<()> {
        unsafe { self.handle.device_wait_idle() }.map_err(InitError::WaitIdle)
    }

    pub fn destroy(&self) {
        unsafe { self.handle.destroy_device(None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn family(index: u32, flags: vk::QueueFlags, present: bool) -> QueueFamilyInfo {
        QueueFamilyInfo {
            index,
            flags,
            queue_count: 1,
            present,
        }
    }

    fn gpu(raw: u64, device_type: vk::PhysicalDeviceType, families: Vec<QueueFamilyInfo>) -> DeviceCandidate {
        DeviceCandidate {
            handle: vk::PhysicalDevice::from_raw(raw),
            name: format!("gpu{}", raw),
            device_type,
            families,
        }
    }

    #[test]
    fn empty_device_list_fails_selection() {
        let err = select_device(&[]).unwrap_err();
        assert!(matches!(err, InitError::NoPhysicalDevice));
        assert_eq!(err.stage(), crate::backend::stage::Stage::DeviceSelected);
    }

    #[test]
    fn graphics_without_present_is_rejected() {
        let only = gpu(
            1,
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vec![family(0, vk::QueueFlags::GRAPHICS, false), family(1, vk::QueueFlags::TRANSFER, true)],
        );
        assert!(matches!(
            select_device(&[only]),
            Err(InitError::NoPresentableQueue { devices: 1 })
        ));
    }

    #[test]
    fn picks_first_family_that_draws_and_presents() {
        let only = gpu(
            1,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vec![
                family(0, vk::QueueFlags::COMPUTE, true),
                family(1, vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true),
                family(2, vk::QueueFlags::GRAPHICS, true),
            ],
        );
        let selection = select_device(&[only]).unwrap();
        assert_eq!(selection.queue_family, 1);
        assert_eq!(selection.physical_device.as_raw(), 1);
    }

    #[test]
    fn prefers_discrete_over_integrated() {
        let usable = || vec![family(0, vk::QueueFlags::GRAPHICS, true)];
        let devices = [
            gpu(1, vk::PhysicalDeviceType::CPU, usable()),
            gpu(2, vk::PhysicalDeviceType::INTEGRATED_GPU, usable()),
            gpu(3, vk::PhysicalDeviceType::DISCRETE_GPU, usable()),
            gpu(4, vk::PhysicalDeviceType::DISCRETE_GPU, usable()),
        ];
        let selection = select_device(&devices).unwrap();
        assert_eq!(selection.physical_device.as_raw(), 3);
        assert_eq!(selection.name, "gpu3");
    }

    #[test]
    fn zero_queue_count_family_is_ignored() {
        let mut empty = family(0, vk::QueueFlags::GRAPHICS, true);
        empty.queue_count = 0;
        let devices = [gpu(1, vk::PhysicalDeviceType::DISCRETE_GPU, vec![empty])];
        assert!(select_device(&devices).is_err());
    }
}

// Swapchain - Window presentation
//
// Ring of presentable images bound to the surface. Creation and image view
// setup are separate steps so a failure in either leaves a well-defined set
// of handles to release.

use super::device::Device;
use super::error::{InitError, InitResult};
use super::surface::Surface;
use ash::vk;

/// Prefer B8G8R8A8_SRGB / sRGB nonlinear, otherwise take the first reported
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
}

/// FIFO is always supported, so it is the fallback
pub fn choose_present_mode(available: &[vk::PresentModeKHR], preferred: vk::PresentModeKHR) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped when the surface has a maximum
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// Outcome of `vkAcquireNextImageKHR`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Ready { index: u32, suboptimal: bool },
    /// Timed out or nothing available yet; try again next frame
    NotReady,
    OutOfDate,
}

pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Create the swapchain handle. `old` is retired by the driver but not
    /// destroyed; the caller destroys it once this returns successfully.
    pub fn new(
        device: &Device,
        surface: &Surface,
        width: u32,
        height: u32,
        preferred_mode: vk::PresentModeKHR,
        old: vk::SwapchainKHR,
    ) -> InitResult<Self> {
        let (caps, formats, present_modes) = unsafe {
            let caps = surface
                .loader
                .get_physical_device_surface_capabilities(device.physical_device, surface.handle)
                .map_err(InitError::QuerySurface)?;
            let formats = surface
                .loader
                .get_physical_device_surface_formats(device.physical_device, surface.handle)
                .map_err(InitError::QuerySurface)?;
            let modes = surface
                .loader
                .get_physical_device_surface_present_modes(device.physical_device, surface.handle)
                .map_err(InitError::QuerySurface)?;
            (caps, formats, modes)
        };

        let surface_format = choose_surface_format(&formats).ok_or(InitError::NoSurfaceFormat)?;
        let present_mode = choose_present_mode(&present_modes, preferred_mode);
        let extent = choose_extent(&caps, width, height);
        let image_count = choose_image_count(&caps);

        log::info!(
            "Creating swapchain: {}x{} {:?}, {:?}, {} images{}",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            image_count,
            if old == vk::SwapchainKHR::null() { "" } else { " (replacing previous)" }
        );

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old);

        let handle = unsafe { device.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(InitError::CreateSwapchain)?;

        Ok(Self {
            handle,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
            present_mode,
        })
    }

    /// Fetch the images and create one view per image. Views created before
    /// a failure stay in `image_views` so `destroy_views` releases them.
    pub fn acquire_images(&mut self, device: &Device) -> InitResult<()> {
        self.images = unsafe { device.swapchain_loader.get_swapchain_images(self.handle) }
            .map_err(InitError::GetSwapchainImages)?;

        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { device.handle.create_image_view(&create_info, None) }
                .map_err(InitError::CreateImageView)?;
            self.image_views.push(view);
        }

        log::info!("Swapchain has {} images", self.images.len());
        Ok(())
    }

    pub fn acquire_next_image(
        &self,
        device: &Device,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> Result<Acquire, vk::Result> {
        let result = unsafe {
            device
                .swapchain_loader
                .acquire_next_image(self.handle, timeout, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => Ok(Acquire::Ready { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::OutOfDate),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Ok(Acquire::NotReady),
            Err(e) => Err(e),
        }
    }

    /// Present; returns true when the swapchain should be recreated
    pub fn present(
        &self,
        device: &Device,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { device.swapchain_loader.queue_present(device.queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e),
        }
    }

    pub fn destroy_views(&mut self, device: &Device) {
        for view in self.image_views.drain(..) {
            unsafe { device.handle.destroy_image_view(view, None) };
        }
        self.images.clear();
    }

    pub fn destroy(&mut self, device: &Device) {
        self.destroy_views(device);
        unsafe { device.swapchain_loader.destroy_swapchain(self.handle, None) };
        self.handle = vk::SwapchainKHR::null();
    }
}

/// Replace `old` with what `build` makes from it. `build` sees the old value
/// so it can pass its handle as `old_swapchain`. The old value is released
/// after `build` returns, on failure too: the driver retires it either way.
pub fn replace_retired<T, E>(
    old: Option<T>,
    build: impl FnOnce(Option<&T>) -> Result<T, E>,
    mut release: impl FnMut(T),
) -> Result<T, E> {
    let result = build(old.as_ref());
    if let Some(old) = old {
        release(old);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn srgb_bgra_wins_when_offered() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[unorm, srgb]).unwrap().format, srgb.format);
        assert_eq!(choose_surface_format(&[unorm]).unwrap().format, unorm.format);
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn fixed_surface_extent_is_used_verbatim() {
        let extent = choose_extent(&caps((800, 600), 2, 3), 1920, 1080);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn undefined_surface_extent_clamps_window_size() {
        let extent = choose_extent(&caps((u32::MAX, u32::MAX), 2, 3), 8000, 0);
        assert_eq!((extent.width, extent.height), (4096, 1));
    }

    #[test]
    fn image_count_respects_maximum() {
        assert_eq!(choose_image_count(&caps((1, 1), 2, 0)), 3);
        assert_eq!(choose_image_count(&caps((1, 1), 2, 2)), 2);
        assert_eq!(choose_image_count(&caps((1, 1), 1, 8)), 2);
    }

    #[test]
    fn replacement_sees_old_handle_and_releases_it_afterwards() {
        let events = std::cell::RefCell::new(Vec::new());

        let result: Result<u32, ()> = replace_retired(
            Some(1u32),
            |old| {
                events.borrow_mut().push(format!("create from {:?}", old));
                Ok(2)
            },
            |old| events.borrow_mut().push(format!("destroy {}", old)),
        );

        assert_eq!(result, Ok(2));
        assert_eq!(*events.borrow(), vec!["create from Some(1)", "destroy 1"]);
    }

    #[test]
    fn failed_replacement_still_releases_the_retired_chain() {
        let mut released = Vec::new();
        let result: Result<u32, &str> = replace_retired(Some(7u32), |_| Err("format changed"), |old| released.push(old));

        assert_eq!(result, Err("format changed"));
        assert_eq!(released, vec![7]);
    }

    #[test]
    fn first_chain_has_nothing_to_retire() {
        let mut released: Vec<u32> = Vec::new();
        let result: Result<u32, ()> = replace_retired(
            None,
            |old| {
                assert!(old.is_none());
                Ok(3)
            },
            |old| released.push(old),
        );

        assert_eq!(result, Ok(3));
        assert!(released.is_empty());
    }
}

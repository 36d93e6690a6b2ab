// Presentation surface bound to the native window

use super::error::{InitError, InitResult};
use ash::extensions::khr;
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle};
use std::ffi::CStr;
use winit::window::Window;

/// Platform surface extensions the instance must enable for `display`
pub fn required_extensions(display: RawDisplayHandle) -> InitResult<Vec<String>> {
    let names = ash_window::enumerate_required_extensions(display).map_err(InitError::UnsupportedDisplay)?;
    Ok(names
        .iter()
        .map(|&ptr| unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
        .collect())
}

pub struct Surface {
    pub loader: khr::Surface,
    pub handle: vk::SurfaceKHR,
}

impl Surface {
    pub fn new(entry: &Entry, instance: &ash::Instance, window: &Window) -> InitResult<Self> {
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .map_err(InitError::CreateSurface)?;

        Ok(Self {
            loader: khr::Surface::new(entry, instance),
            handle,
        })
    }

    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family: u32) -> InitResult<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family, self.handle)
        }
        .map_err(InitError::QueryPresentSupport)
    }

    pub fn destroy(&self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}

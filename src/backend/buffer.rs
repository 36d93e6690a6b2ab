// Vertex buffer in host-visible, host-coherent memory

use super::device::Device;
use super::error::{InitError, InitResult};
use crate::vertex::Vertex;
use ash::vk;

/// First memory type allowed by `type_bits` that has all of `flags`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32)).find(|&i| {
        type_bits & (1 << i) != 0 && memory_properties.memory_types[i as usize].property_flags.contains(flags)
    })
}

pub struct VertexBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    pub vertex_count: u32,
}

impl VertexBuffer {
    /// Allocate, fill, and optionally read back to confirm the bytes landed
    pub fn new(device: &Device, vertices: &[Vertex], verify: bool) -> InitResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let mut vb = Self {
            buffer: vk::Buffer::null(),
            memory: vk::DeviceMemory::null(),
            size: bytes.len() as vk::DeviceSize,
            vertex_count: vertices.len() as u32,
        };

        // Any failure releases whatever part was already created
        let result = vb.allocate(device).and_then(|()| vb.write(device, bytes)).and_then(|()| {
            if verify {
                vb.verify(device, bytes)
            } else {
                Ok(())
            }
        });
        if let Err(e) = result {
            vb.destroy(device);
            return Err(e);
        }

        log::info!("Uploaded {} vertices ({} bytes)", vb.vertex_count, vb.size);
        Ok(vb)
    }

    fn allocate(&mut self, device: &Device) -> InitResult<()> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(self.size)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        self.buffer = unsafe { device.handle.create_buffer(&buffer_info, None) }.map_err(InitError::CreateBuffer)?;

        let requirements = unsafe { device.handle.get_buffer_memory_requirements(self.buffer) };
        let flags = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let memory_type_index = find_memory_type(&device.memory_properties, requirements.memory_type_bits, flags)
            .ok_or(InitError::NoMemoryType {
                type_bits: requirements.memory_type_bits,
                flags,
            })?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        self.memory = unsafe { device.handle.allocate_memory(&alloc_info, None) }.map_err(InitError::AllocateMemory)?;

        unsafe { device.handle.bind_buffer_memory(self.buffer, self.memory, 0) }.map_err(InitError::BindMemory)
    }

    fn write(&self, device: &Device, bytes: &[u8]) -> InitResult<()> {
        unsafe {
            let ptr = device
                .handle
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(InitError::MapMemory)? as *mut u8;
            ptr.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
            device.handle.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Copy the buffer contents back to the host
    pub fn read_back(&self, device: &Device) -> InitResult<Vec<u8>> {
        let mut out = vec![0u8; self.size as usize];
        unsafe {
            let ptr = device
                .handle
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(InitError::MapMemory)? as *const u8;
            ptr.copy_to_nonoverlapping(out.as_mut_ptr(), out.len());
            device.handle.unmap_memory(self.memory);
        }
        Ok(out)
    }

    fn verify(&self, device: &Device, expected: &[u8]) -> InitResult<()> {
        if self.read_back(device)? != expected {
            return Err(InitError::UploadMismatch);
        }
        log::debug!("Vertex buffer read-back matches {} bytes", expected.len());
        Ok(())
    }

    pub fn destroy(&mut self, device: &Device) {
        unsafe {
            if self.buffer != vk::Buffer::null() {
                device.handle.destroy_buffer(self.buffer, None);
            }
            if self.memory != vk::DeviceMemory::null() {
                device.handle.free_memory(self.memory, None);
            }
        }
        self.buffer = vk::Buffer::null();
        self.memory = vk::DeviceMemory::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        props
    }

    #[test]
    fn finds_first_type_with_all_flags() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            host | vk::MemoryPropertyFlags::HOST_CACHED,
            host,
        ]);
        assert_eq!(find_memory_type(&props, u32::MAX, host), Some(2));
    }

    #[test]
    fn type_filter_excludes_otherwise_matching_types() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = properties(&[host, vk::MemoryPropertyFlags::DEVICE_LOCAL, host]);
        assert_eq!(find_memory_type(&props, 0b110, host), Some(2));
        assert_eq!(find_memory_type(&props, 0b010, host), None);
    }

    #[test]
    fn count_bounds_the_search() {
        let props = properties(&[]);
        assert_eq!(
            find_memory_type(&props, u32::MAX, vk::MemoryPropertyFlags::empty()),
            None
        );
    }
}

// Triangle geometry and its vertex input layout

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use std::mem::{offset_of, size_of};

/// Interleaved position + color, tightly packed (20 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec2,
    pub color: Vec3,
}

impl Vertex {
    pub const fn new(position: Vec2, color: Vec3) -> Self {
        Self { position, color }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            // location 0: in_position
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(offset_of!(Vertex, position) as u32)
                .build(),
            // location 1: in_color
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Vertex, color) as u32)
                .build(),
        ]
    }
}

/// Clip-space triangle, clockwise in Vulkan's y-down convention
pub const TRIANGLE: [Vertex; 3] = [
    Vertex::new(Vec2::new(0.0, -0.5), Vec3::new(1.0, 0.0, 0.0)),
    Vertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 1.0, 0.0)),
    Vertex::new(Vec2::new(-0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 20);
        assert_eq!(Vertex::binding_description().stride, 20);

        let [position, color] = Vertex::attribute_descriptions();
        assert_eq!((position.location, position.offset), (0, 0));
        assert_eq!((color.location, color.offset), (1, 8));
    }

    #[test]
    fn uploaded_bytes_are_the_little_endian_floats() {
        let bytes: &[u8] = bytemuck::cast_slice(&TRIANGLE);
        assert_eq!(bytes.len(), 60);

        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(&floats[..5], &[0.0, -0.5, 1.0, 0.0, 0.0]);
        assert_eq!(&floats[10..], &[-0.5, 0.5, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn bytes_round_trip_to_identical_vertices() {
        let bytes = bytemuck::cast_slice::<Vertex, u8>(&TRIANGLE).to_vec();
        let back: Vec<Vertex> = bytes
            .chunks_exact(size_of::<Vertex>())
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(back, TRIANGLE);
    }
}

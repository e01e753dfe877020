//! Buffer and binding helpers
use zerocopy::{Immutable, IntoBytes};

/// Builds a buffer holding `count` values of type `T`
pub(crate) fn new_buffer<T>(
    device: &wgpu::Device,
    name: &str,
    count: usize,
    usage: wgpu::BufferUsages,
) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(name),
        size: (std::mem::size_of::<T>() * count) as u64,
        usage,
        mapped_at_creation: false,
    })
}

/// Writes a plain-old-data value (or slice) to the start of a buffer
pub(crate) fn write_buffer<T: IntoBytes + Immutable + ?Sized>(
    queue: &wgpu::Queue,
    buf: &wgpu::Buffer,
    data: &T,
) {
    queue.write_buffer(buf, 0, data.as_bytes());
}

pub(crate) fn buffer_cfg(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn buffer_ro(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn buffer_rw(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

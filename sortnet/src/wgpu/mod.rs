//! Stage execution on a GPU using WebGPU compute shaders
//!
//! [`WgpuDevice`] keeps three element buffers, all sized for the device's
//! maximum array length:
//!
//! - `input` (storage, read-only in the shader), written by
//!   [`upload`](StageDevice::upload) before every stage
//! - `output` (storage, read-write), written by the compute pass
//! - `staging` (map-read), which receives a copy of `output` and is mapped
//!   asynchronously for readback
//!
//! Each stage runs as a single workgroup of `len / 2` lanes, so the array
//! length is bounded by the device's workgroup limits.
use crate::{
    Error,
    device::StageDevice,
    stage::{Stage, iter_ops},
    wgpu::util::{buffer_cfg, buffer_ro, buffer_rw, new_buffer, write_buffer},
};

mod util;

use heck::ToShoutySnakeCase;
use log::info;
use std::sync::mpsc;
use zerocopy::{FromBytes, Immutable, IntoBytes};

const BITONIC_SHADER: &str = include_str!("shaders/bitonic.wgsl");

#[derive(Debug, IntoBytes, Immutable)]
#[repr(C)]
struct Uniforms {
    /// Operation code (see [`iter_ops`])
    op: u32,

    /// Block height for this stage
    block_height: u32,

    /// Number of live elements
    len: u32,

    /// Alignment to 16-byte boundary
    _padding: u32,
}

/// Returns a set of constant definitions for a workgroup sorting `len` items
fn shader_constants(len: usize) -> String {
    let mut out = format!(
        "const WORKGROUP_SIZE: u32 = {}u;\nconst LOCAL_LEN: u32 = {len}u;\n",
        Stage::lanes(len)
    );
    for (op, i) in iter_ops() {
        out += &format!("const OP_{}: u32 = {i}u;\n", op.to_shouty_snake_case());
    }
    out
}

/// Returns the largest power-of-two array length that fits in a workgroup
pub fn max_len_for(limits: &wgpu::Limits) -> usize {
    let lanes = limits
        .max_compute_workgroup_size_x
        .min(limits.max_compute_invocations_per_workgroup);
    let storage = limits.max_compute_workgroup_storage_size
        / std::mem::size_of::<u32>() as u32;
    let n = (lanes.saturating_mul(2)).min(storage).max(1);
    1 << n.ilog2()
}

/// Compute pipeline specialized for one array length
struct Pipeline {
    len: usize,
    pipeline: wgpu::ComputePipeline,
}

impl Pipeline {
    fn new(
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        len: usize,
    ) -> Self {
        let shader_code = shader_constants(len) + BITONIC_SHADER;
        let shader_module =
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("bitonic"),
                source: wgpu::ShaderSource::Wgsl(shader_code.into()),
            });
        let pipeline =
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&format!("bitonic{len}")),
                layout: Some(layout),
                module: &shader_module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });
        Self { len, pipeline }
    }
}

/// Readback that has been started but not collected
struct Pending {
    len: usize,
    rx: mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
}

/// [`StageDevice`] backed by a WGPU device and queue
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,

    max_len: usize,

    /// Per-stage uniforms (fixed size)
    uniform_buf: wgpu::Buffer,

    /// Stage input, written by the host
    input_buf: wgpu::Buffer,

    /// Stage output, written by the compute shader
    output_buf: wgpu::Buffer,

    /// Copy of the output that can be read back by the host
    staging_buf: wgpu::Buffer,

    pipeline_layout: wgpu::PipelineLayout,
    bind_group: wgpu::BindGroup,

    /// Pipeline for the most recently used length
    pipeline: Option<Pipeline>,

    pending: Option<Pending>,
}

impl WgpuDevice {
    /// Builds a new device, requesting a WGPU adapter and device
    pub fn new() -> Result<Self, Error> {
        let instance = wgpu::Instance::default();
        let (device, queue) = pollster::block_on(async {
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    ..wgpu::RequestAdapterOptions::default()
                })
                .await
                .map_err(|_| Error::NoAdapter)?;
            info!("using adapter {:?}", adapter.get_info().name);
            adapter
                .request_device(&wgpu::DeviceDescriptor::default())
                .await
                .map_err(Error::NoDevice)
        })?;
        Ok(Self::from_device(device, queue))
    }

    /// Builds a new device from an existing WGPU device and queue
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let max_len = max_len_for(&device.limits());
        info!("maximum sortable length is {max_len}");

        let uniform_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniforms"),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let input_buf = new_buffer::<u32>(
            &device,
            "elements_input",
            max_len,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        let output_buf = new_buffer::<u32>(
            &device,
            "elements_output",
            max_len,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );
        let staging_buf = new_buffer::<u32>(
            &device,
            "elements_staging",
            max_len,
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        );

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: None,
                entries: &[
                    buffer_cfg(0), // uniforms
                    buffer_ro(1),  // input_data
                    buffer_rw(2),  // output_data
                ],
            });

        // Buffers have a fixed capacity, so the bind group never changes
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: input_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output_buf.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        Self {
            device,
            queue,
            max_len,
            uniform_buf,
            input_buf,
            output_buf,
            staging_buf,
            pipeline_layout,
            bind_group,
            pipeline: None,
            pending: None,
        }
    }

    fn byte_len(len: usize) -> u64 {
        (len * std::mem::size_of::<u32>()) as u64
    }
}

impl StageDevice for WgpuDevice {
    fn max_len(&self) -> usize {
        self.max_len
    }

    fn upload(&mut self, data: &[u32]) -> Result<(), Error> {
        if data.len() > self.max_len {
            return Err(Error::TooLarge(data.len(), self.max_len));
        }
        write_buffer(&self.queue, &self.input_buf, data);
        Ok(())
    }

    fn dispatch(&mut self, stage: Stage, len: usize) -> Result<(), Error> {
        if self.pending.is_some() {
            return Err(Error::StepInFlight);
        }
        if len > self.max_len {
            return Err(Error::TooLarge(len, self.max_len));
        }
        assert!(
            stage.block_height <= len,
            "stage {stage} exceeds length {len}"
        );

        let uniforms = Uniforms {
            op: stage.op.code(),
            block_height: stage.block_height as u32,
            len: len as u32,
            _padding: 0,
        };
        write_buffer(&self.queue, &self.uniform_buf, &uniforms);

        // Workgroup size is baked into the shader, so rebuild on resize
        if self.pipeline.as_ref().is_none_or(|p| p.len != len) {
            self.pipeline = None;
        }
        let pipeline = &self
            .pipeline
            .get_or_insert_with(|| {
                Pipeline::new(&self.device, &self.pipeline_layout, len)
            })
            .pipeline;

        let mut encoder = self.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor { label: None },
        );
        let mut compute_pass =
            encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: None,
                timestamp_writes: None,
            });
        compute_pass.set_pipeline(pipeline);
        compute_pass.set_bind_group(0, &self.bind_group, &[]);
        compute_pass.dispatch_workgroups(1, 1, 1);
        drop(compute_pass);

        // Copy from the STORAGE | COPY_SRC -> COPY_DST | MAP_READ buffer
        let bytes = Self::byte_len(len);
        encoder.copy_buffer_to_buffer(
            &self.output_buf,
            0,
            &self.staging_buf,
            0,
            bytes,
        );
        self.queue.submit(Some(encoder.finish()));

        let (tx, rx) = mpsc::channel();
        self.staging_buf
            .slice(..bytes)
            .map_async(wgpu::MapMode::Read, move |r| {
                // The receiver may already be gone if the readback was dropped
                let _ = tx.send(r);
            });
        self.pending = Some(Pending { len, rx });
        Ok(())
    }

    fn poll_readback(
        &mut self,
        len: usize,
        block: bool,
    ) -> Result<Option<Vec<u32>>, Error> {
        let Some(pending) = &self.pending else {
            return Ok(None);
        };
        debug_assert_eq!(pending.len, len);
        self.device.poll(if block {
            wgpu::PollType::Wait
        } else {
            wgpu::PollType::Poll
        })?;
        let mapped = match pending.rx.try_recv() {
            Ok(r) => r,
            Err(mpsc::TryRecvError::Empty) if !block => return Ok(None),
            Err(_) => Err(wgpu::BufferAsyncError),
        };
        let pending_len = pending.len;
        self.pending = None;
        mapped?;

        let bytes = Self::byte_len(pending_len);
        let result = {
            let view = self.staging_buf.slice(..bytes).get_mapped_range();
            <[u32]>::ref_from_bytes(&view)
                .map(<[u32]>::to_vec)
                .map_err(|_| {
                    Error::ReadbackLength(view.len() / 4, pending_len)
                })
        };
        self.staging_buf.unmap();
        result.map(Some)
    }

    fn discard_readback(&mut self) -> Result<(), Error> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        self.device.poll(wgpu::PollType::Wait)?;
        if let Ok(Ok(())) = pending.rx.try_recv() {
            self.staging_buf.unmap();
        }
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.pending.is_some()
    }
}

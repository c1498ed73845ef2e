/// wgpu-resident keypoint buffers
///
/// This module owns the GPU side of the keypoint overlay:
/// - Device and queue initialization
/// - A vertex buffer sized for every activation slot at full capacity
/// - An indirect buffer holding one draw command per active image
/// - Region patch uploads and the per-image indirect draws

// Use wgpu from iced to avoid dependency conflicts
use iced_wgpu::wgpu;
use std::sync::atomic::{AtomicU32, Ordering};

use super::sync::{PatchTarget, RegionPatch};
use super::vertex::{IndirectDraw, KeypointVertex};
use crate::config::EditorConfig;
use crate::error::{EditorError, Result};

const VERTEX_STRIDE: u64 = std::mem::size_of::<KeypointVertex>() as u64;
const DRAW_STRIDE: u64 = std::mem::size_of::<IndirectDraw>() as u64;

pub struct KeypointBuffers {
    device: wgpu::Device,
    queue: wgpu::Queue,
    vertices: wgpu::Buffer,
    draws: wgpu::Buffer,
    max_vertices: usize,
    max_draws: usize,
    /// Number of draw commands currently valid in `draws`
    draw_count: AtomicU32,
}

// Manual Debug implementation (wgpu types don't implement Debug)
impl std::fmt::Debug for KeypointBuffers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypointBuffers")
            .field("max_vertices", &self.max_vertices)
            .field("max_draws", &self.max_draws)
            .field("draw_count", &self.draw_count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl KeypointBuffers {
    /// Create a device and allocate both buffers at full capacity
    pub async fn new(config: &EditorConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| EditorError::Gpu("Failed to find suitable GPU adapter".to_string()))?;

        // first_instance selects the image slot; needs this feature to be non-zero
        let required_features = adapter.features() & wgpu::Features::INDIRECT_FIRST_INSTANCE;
        if required_features.is_empty() {
            tracing::warn!("⚠️  Adapter lacks INDIRECT_FIRST_INSTANCE, per-image instance data unavailable");
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Track Editor Device"),
                    required_features,
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| EditorError::Gpu(format!("Failed to create device: {:?}", e)))?;

        Self::with_device(device, queue, config)
    }

    /// Allocate the buffers on an existing device
    pub fn with_device(device: wgpu::Device, queue: wgpu::Queue, config: &EditorConfig) -> Result<Self> {
        let max_vertices = config.max_vertices();
        let max_draws = config.max_active_images;

        let vertex_bytes = max_vertices as u64 * VERTEX_STRIDE;
        if vertex_bytes > device.limits().max_buffer_size {
            return Err(EditorError::CapacityExceeded {
                what: "keypoint vertex buffer bytes",
                limit: device.limits().max_buffer_size as usize,
            });
        }

        let vertices = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Keypoint Vertex Buffer"),
            size: vertex_bytes,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let draws = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Keypoint Indirect Draw Buffer"),
            size: max_draws as u64 * DRAW_STRIDE,
            usage: wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        tracing::info!(
            "💾 Allocated keypoint buffers: {} vertices ({:.1} MB), {} draw slots",
            max_vertices,
            vertex_bytes as f64 / 1024.0 / 1024.0,
            max_draws
        );

        Ok(Self {
            device,
            queue,
            vertices,
            draws,
            max_vertices,
            max_draws,
            draw_count: AtomicU32::new(0),
        })
    }

    /// Issue one indirect draw per active image.
    /// The caller has already bound the keypoint pipeline.
    pub fn encode_draws<'a>(&'a self, render_pass: &mut wgpu::RenderPass<'a>) {
        let count = self.draw_count.load(Ordering::Acquire) as u64;
        if count == 0 {
            return;
        }
        render_pass.set_vertex_buffer(0, self.vertices.slice(..));
        for slot in 0..count {
            render_pass.draw_indirect(&self.draws, slot * DRAW_STRIDE);
        }
    }
}

impl PatchTarget for KeypointBuffers {
    fn apply_patch(&self, patch: &RegionPatch<'_>) -> Result<()> {
        if patch.vertex_count() > self.max_vertices {
            return Err(EditorError::CapacityExceeded {
                what: "keypoint vertices",
                limit: self.max_vertices,
            });
        }
        if patch.draw_count() > self.max_draws {
            return Err(EditorError::CapacityExceeded {
                what: "indirect draws",
                limit: self.max_draws,
            });
        }

        if !patch.vertices.is_empty() {
            self.queue.write_buffer(
                &self.vertices,
                patch.first_vertex as u64 * VERTEX_STRIDE,
                bytemuck::cast_slice(patch.vertices),
            );
        }
        if !patch.draws.is_empty() {
            self.queue.write_buffer(
                &self.draws,
                patch.first_draw as u64 * DRAW_STRIDE,
                bytemuck::cast_slice(patch.draws),
            );
        }

        // Flush the staged writes and wait until the GPU copy is complete
        self.queue.submit(std::iter::empty());
        let _ = self.device.poll(wgpu::Maintain::Wait);
        self.draw_count.store(patch.draw_count() as u32, Ordering::Release);
        Ok(())
    }
}

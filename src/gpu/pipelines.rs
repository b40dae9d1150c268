//! Render and compute pipelines of the GPU backend.
//!
//! | Key                       | Entry      | Cull | Depth        | Color |
//! |---------------------------|------------|------|--------------|-------|
//! | `DepthPrepass`, opaque    | `fs_depth` | back | write        | none  |
//! | `DepthPrepass`, masked    | `fs_depth` | none | write        | none  |
//! | `Main(variant)`, opaque   | `fs_main`  | back | test, no write | RGBA8 |
//! | `Main(variant)`, masked   | `fs_main`  | none | test, no write | RGBA8 |
//!
//! Alpha masking, the cutoff, culling and rate modulation are pipeline
//! override constants, so each pipeline is specialized once at startup.

use std::borrow::Cow;
use std::num::NonZeroU64;

use rustc_hash::FxHashMap;

use super::context::{COLOR_FORMAT, DEPTH_FORMAT, RATE_FORMAT};
use super::uniforms::{ClassifyUniforms, FrameUniforms, PrimitiveUniforms};
use crate::settings::RenderVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    DepthPrepass,
    Main(RenderVariant),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub pass: PassKind,
    pub alpha_mask: bool,
}

impl PipelineKey {
    #[must_use]
    pub const fn new(pass: PassKind, alpha_mask: bool) -> Self {
        Self { pass, alpha_mask }
    }
}

pub struct GpuPipelines {
    pub frame_layout: wgpu::BindGroupLayout,
    pub primitive_layout: wgpu::BindGroupLayout,
    pub classify_layout: wgpu::BindGroupLayout,
    raster: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    pub classify: wgpu::ComputePipeline,
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages, size: usize, dynamic: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: NonZeroU64::new(size as u64),
        },
        count: None,
    }
}

fn texture_entry(binding: u32, visibility: wgpu::ShaderStages, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

impl GpuPipelines {
    #[must_use]
    pub fn build(device: &wgpu::Device, alpha_cutoff: f32) -> Self {
        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Frame Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT, size_of::<FrameUniforms>(), false),
                texture_entry(1, wgpu::ShaderStages::FRAGMENT, wgpu::TextureSampleType::Uint),
            ],
        });
        let primitive_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Primitive Layout"),
            entries: &[uniform_entry(
                0,
                wgpu::ShaderStages::FRAGMENT,
                size_of::<PrimitiveUniforms>(),
                true,
            )],
        });
        let classify_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Rate Classify Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::COMPUTE, size_of::<ClassifyUniforms>(), false),
                texture_entry(1, wgpu::ShaderStages::COMPUTE, wgpu::TextureSampleType::Depth),
                texture_entry(2, wgpu::ShaderStages::COMPUTE, wgpu::TextureSampleType::Depth),
                texture_entry(
                    3,
                    wgpu::ShaderStages::COMPUTE,
                    wgpu::TextureSampleType::Float { filterable: false },
                ),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: RATE_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let scene_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("shaders/scene.wgsl"))),
        });
        let scene_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[Some(&frame_layout), Some(&primitive_layout)],
            immediate_size: 0,
        });

        let mut raster = FxHashMap::default();
        let passes = [
            PassKind::DepthPrepass,
            PassKind::Main(RenderVariant::Baseline),
            PassKind::Main(RenderVariant::RateAdaptive),
        ];
        for pass in passes {
            for alpha_mask in [false, true] {
                let key = PipelineKey::new(pass, alpha_mask);
                let pipeline = Self::create_raster(device, &scene_module, &scene_layout, key, alpha_cutoff);
                raster.insert(key, pipeline);
            }
        }

        let classify_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Rate Classify Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("shaders/rate_classify.wgsl"))),
        });
        let classify_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Rate Classify Pipeline Layout"),
            bind_group_layouts: &[Some(&classify_layout)],
            immediate_size: 0,
        });
        let classify = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Rate Classify Pipeline"),
            layout: Some(&classify_pipeline_layout),
            module: &classify_module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        Self {
            frame_layout,
            primitive_layout,
            classify_layout,
            raster,
            classify,
        }
    }

    fn create_raster(
        device: &wgpu::Device,
        module: &wgpu::ShaderModule,
        layout: &wgpu::PipelineLayout,
        key: PipelineKey,
        alpha_cutoff: f32,
    ) -> wgpu::RenderPipeline {
        let (label, entry, rate_adaptive) = match (key.pass, key.alpha_mask) {
            (PassKind::DepthPrepass, false) => ("Depth Prepass Opaque", "fs_depth", false),
            (PassKind::DepthPrepass, true) => ("Depth Prepass Masked", "fs_depth", false),
            (PassKind::Main(RenderVariant::Baseline), false) => ("Baseline Opaque", "fs_main", false),
            (PassKind::Main(RenderVariant::Baseline), true) => ("Baseline Masked", "fs_main", false),
            (PassKind::Main(RenderVariant::RateAdaptive), false) => ("Rate Adaptive Opaque", "fs_main", true),
            (PassKind::Main(RenderVariant::RateAdaptive), true) => ("Rate Adaptive Masked", "fs_main", true),
        };
        let depth_prepass = key.pass == PassKind::DepthPrepass;
        let constants = [
            ("ALPHA_MASK", if key.alpha_mask { 1.0 } else { 0.0 }),
            ("ALPHA_CUTOFF", f64::from(alpha_cutoff)),
            ("CULL_BACK", if key.alpha_mask { 0.0 } else { 1.0 }),
            ("RATE_ADAPTIVE", if rate_adaptive { 1.0 } else { 0.0 }),
        ];
        let compilation_options = wgpu::PipelineCompilationOptions {
            constants: &constants,
            ..Default::default()
        };
        let color_targets = [Some(wgpu::ColorTargetState {
            format: COLOR_FORMAT,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        })];
        let targets: &[Option<wgpu::ColorTargetState>] = if depth_prepass { &[] } else { &color_targets };

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: compilation_options.clone(),
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some(entry),
                targets,
                compilation_options,
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: if key.alpha_mask { None } else { Some(wgpu::Face::Back) },
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: Some(depth_prepass),
                depth_compare: Some(wgpu::CompareFunction::LessEqual),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    }

    #[must_use]
    pub fn raster(&self, key: PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.raster.get(&key)
    }
}

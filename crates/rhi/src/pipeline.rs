//! Graphics pipeline management.
//!
//! This module handles VkPipeline and VkPipelineLayout creation.
//!
//! # Overview
//!
//! - [`PipelineConfig`] is the fixed-function state of a graphics pipeline as
//!   plain, serializable data, plus the render pass and layout it targets
//! - [`PipelineLayout`] wraps VkPipelineLayout
//! - [`Pipeline`] compiles two shader stages and a config into a VkPipeline
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::pipeline::{Pipeline, PipelineConfig, PipelineLayout};
//! use vkframe_rhi::swapchain::Swapchain;
//! use vkframe_rhi::vertex::Vertex;
//!
//! # fn example(device: Arc<Device>, swapchain: &Swapchain, vert: &[u8], frag: &[u8]) -> Result<(), vkframe_rhi::RhiError> {
//! let layout = PipelineLayout::new(device.clone(), &[], &[])?;
//!
//! let mut config = PipelineConfig::default_config(swapchain.width(), swapchain.height());
//! config.render_pass = swapchain.render_pass();
//! config.pipeline_layout = layout.handle();
//!
//! let pipeline = Pipeline::new::<Vertex>(device, vert, frag, &config)?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{Shader, ShaderStage, read_spirv_file};
use crate::vertex::VertexInput;

/// Vulkan pipeline layout wrapper.
///
/// A pipeline layout describes the descriptor set layouts and push constant
/// ranges a pipeline can access.
pub struct PipelineLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline layout handle.
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a new pipeline layout.
    ///
    /// # Errors
    ///
    /// Returns an error if pipeline layout creation fails.
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} descriptor set layout(s) and {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan pipeline layout handle.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

// ============================================================================
// Fixed-function state
// ============================================================================

/// Primitive topology for input assembly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

impl PrimitiveTopology {
    /// Converts to Vulkan primitive topology.
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
        }
    }
}

/// Polygon rasterization mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

impl PolygonMode {
    /// Converts to Vulkan polygon mode.
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
            PolygonMode::Point => vk::PolygonMode::POINT,
        }
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
    FrontAndBack,
}

impl CullMode {
    /// Converts to Vulkan cull mode flags.
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
            CullMode::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
        }
    }
}

/// Front face winding order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontFace {
    CounterClockwise,
    #[default]
    Clockwise,
}

impl FrontFace {
    /// Converts to Vulkan front face.
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Depth comparison operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

impl CompareOp {
    /// Converts to Vulkan compare op.
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::Equal => vk::CompareOp::EQUAL,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
            CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Blend factor for color blending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

impl BlendFactor {
    /// Converts to Vulkan blend factor.
    pub fn to_vk(self) -> vk::BlendFactor {
        match self {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
            BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
            BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
            BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
            BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        }
    }
}

/// Blend operation for color blending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

impl BlendOp {
    /// Converts to Vulkan blend op.
    pub fn to_vk(self) -> vk::BlendOp {
        match self {
            BlendOp::Add => vk::BlendOp::ADD,
            BlendOp::Subtract => vk::BlendOp::SUBTRACT,
            BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
            BlendOp::Min => vk::BlendOp::MIN,
            BlendOp::Max => vk::BlendOp::MAX,
        }
    }
}

/// Framebuffer logic operation, applied only when `logic_op_enable` is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicOp {
    Clear,
    And,
    #[default]
    Copy,
    Xor,
    Or,
    NoOp,
    Set,
}

impl LogicOp {
    /// Converts to Vulkan logic op.
    pub fn to_vk(self) -> vk::LogicOp {
        match self {
            LogicOp::Clear => vk::LogicOp::CLEAR,
            LogicOp::And => vk::LogicOp::AND,
            LogicOp::Copy => vk::LogicOp::COPY,
            LogicOp::Xor => vk::LogicOp::XOR,
            LogicOp::Or => vk::LogicOp::OR,
            LogicOp::NoOp => vk::LogicOp::NO_OP,
            LogicOp::Set => vk::LogicOp::SET,
        }
    }
}

/// Rasterization sample count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleCount {
    #[default]
    X1,
    X2,
    X4,
    X8,
}

impl SampleCount {
    /// Converts to Vulkan sample count flags.
    pub fn to_vk(self) -> vk::SampleCountFlags {
        match self {
            SampleCount::X1 => vk::SampleCountFlags::TYPE_1,
            SampleCount::X2 => vk::SampleCountFlags::TYPE_2,
            SampleCount::X4 => vk::SampleCountFlags::TYPE_4,
            SampleCount::X8 => vk::SampleCountFlags::TYPE_8,
        }
    }
}

/// Pipeline state that is supplied at record time instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicState {
    Viewport,
    Scissor,
    LineWidth,
    DepthBias,
    BlendConstants,
}

impl DynamicState {
    /// Converts to Vulkan dynamic state.
    pub fn to_vk(self) -> vk::DynamicState {
        match self {
            DynamicState::Viewport => vk::DynamicState::VIEWPORT,
            DynamicState::Scissor => vk::DynamicState::SCISSOR,
            DynamicState::LineWidth => vk::DynamicState::LINE_WIDTH,
            DynamicState::DepthBias => vk::DynamicState::DEPTH_BIAS,
            DynamicState::BlendConstants => vk::DynamicState::BLEND_CONSTANTS,
        }
    }
}

/// Which color channels a draw writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorWriteMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl ColorWriteMask {
    pub const RGBA: Self = Self {
        r: true,
        g: true,
        b: true,
        a: true,
    };

    /// Converts to Vulkan color component flags.
    pub fn to_vk(self) -> vk::ColorComponentFlags {
        let mut flags = vk::ColorComponentFlags::empty();
        if self.r {
            flags |= vk::ColorComponentFlags::R;
        }
        if self.g {
            flags |= vk::ColorComponentFlags::G;
        }
        if self.b {
            flags |= vk::ColorComponentFlags::B;
        }
        if self.a {
            flags |= vk::ColorComponentFlags::A;
        }
        flags
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::RGBA
    }
}

// ============================================================================
// State blocks
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputAssemblyState {
    pub topology: PrimitiveTopology,
    pub primitive_restart_enable: bool,
}

/// Static viewport and scissor. Ignored by the device for any state listed
/// in [`PipelineConfig::dynamic_states`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportState {
    pub width: u32,
    pub height: u32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl ViewportState {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.width as f32,
            height: self.height as f32,
            min_depth: self.min_depth,
            max_depth: self.max_depth,
        }
    }

    fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: self.width,
                height: self.height,
            },
        }
    }
}

impl Default for ViewportState {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizationState {
    pub depth_clamp_enable: bool,
    pub rasterizer_discard_enable: bool,
    pub polygon_mode: PolygonMode,
    pub line_width: f32,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_bias_enable: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            depth_clamp_enable: false,
            rasterizer_discard_enable: false,
            polygon_mode: PolygonMode::Fill,
            line_width: 1.0,
            cull_mode: CullMode::None,
            front_face: FrontFace::Clockwise,
            depth_bias_enable: false,
            depth_bias_constant_factor: 0.0,
            depth_bias_clamp: 0.0,
            depth_bias_slope_factor: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultisampleState {
    pub samples: SampleCount,
    pub sample_shading_enable: bool,
    pub min_sample_shading: f32,
    pub alpha_to_coverage_enable: bool,
    pub alpha_to_one_enable: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            samples: SampleCount::X1,
            sample_shading_enable: false,
            min_sample_shading: 1.0,
            alpha_to_coverage_enable: false,
            alpha_to_one_enable: false,
        }
    }
}

/// Blend state of the single color attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_blend_factor: BlendFactor,
    pub dst_color_blend_factor: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_blend_factor: BlendFactor,
    pub dst_alpha_blend_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub color_write_mask: ColorWriteMask,
}

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_blend_factor: BlendFactor::One,
            dst_color_blend_factor: BlendFactor::Zero,
            color_blend_op: BlendOp::Add,
            src_alpha_blend_factor: BlendFactor::One,
            dst_alpha_blend_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            color_write_mask: ColorWriteMask::RGBA,
        }
    }
}

impl ColorBlendAttachment {
    /// Standard alpha blending: `src * src_alpha + dst * (1 - src_alpha)`.
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_color_blend_factor: BlendFactor::SrcAlpha,
            dst_color_blend_factor: BlendFactor::OneMinusSrcAlpha,
            ..Self::default()
        }
    }

    /// Converts to Vulkan pipeline color blend attachment state.
    pub fn to_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: self.blend_enable.into(),
            src_color_blend_factor: self.src_color_blend_factor.to_vk(),
            dst_color_blend_factor: self.dst_color_blend_factor.to_vk(),
            color_blend_op: self.color_blend_op.to_vk(),
            src_alpha_blend_factor: self.src_alpha_blend_factor.to_vk(),
            dst_alpha_blend_factor: self.dst_alpha_blend_factor.to_vk(),
            alpha_blend_op: self.alpha_blend_op.to_vk(),
            color_write_mask: self.color_write_mask.to_vk(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorBlendState {
    pub logic_op_enable: bool,
    pub logic_op: LogicOp,
    pub blend_constants: [f32; 4],
    pub attachment: ColorBlendAttachment,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: CompareOp,
    pub depth_bounds_test_enable: bool,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
    pub stencil_test_enable: bool,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::Less,
            depth_bounds_test_enable: false,
            min_depth_bounds: 0.0,
            max_depth_bounds: 1.0,
            stencil_test_enable: false,
        }
    }
}

// ============================================================================
// PipelineConfig
// ============================================================================

/// Fixed-function state of a graphics pipeline.
///
/// Pure data. The state blocks (de)serialize with serde; the two handles are
/// skipped and come back null, so a deserialized config must be pointed at a
/// live render pass and layout before [`Pipeline::new`] accepts it.
///
/// A config belongs to the render pass it names. When the swapchain is
/// rebuilt the render pass changes, and the config has to be updated and the
/// pipeline rebuilt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub subpass: u32,
    pub dynamic_states: Vec<DynamicState>,
    pub input_assembly: InputAssemblyState,
    pub viewport: ViewportState,
    pub rasterization: RasterizationState,
    pub multisample: MultisampleState,
    pub color_blend: ColorBlendState,
    pub depth_stencil: DepthStencilState,
    #[serde(skip)]
    pub pipeline_layout: vk::PipelineLayout,
    #[serde(skip)]
    pub render_pass: vk::RenderPass,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::default_config(0, 0)
    }
}

impl PipelineConfig {
    /// Builds the default configuration for a `width` x `height` target.
    ///
    /// Triangle list, fill, no culling, clockwise front face, one sample,
    /// depth test and write with `LESS`, blending off, dynamic viewport and
    /// scissor. Handles are null and the subpass is 0.
    pub fn default_config(width: u32, height: u32) -> Self {
        Self {
            input_assembly: InputAssemblyState::default(),
            viewport: ViewportState::new(width, height),
            rasterization: RasterizationState::default(),
            multisample: MultisampleState::default(),
            color_blend: ColorBlendState::default(),
            depth_stencil: DepthStencilState::default(),
            dynamic_states: vec![DynamicState::Viewport, DynamicState::Scissor],
            pipeline_layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            subpass: 0,
        }
    }

    /// Resets every state block to its default in place.
    ///
    /// The handles, the subpass and the viewport size are kept.
    pub fn apply_defaults(&mut self) {
        let viewport = ViewportState::new(self.viewport.width, self.viewport.height);
        *self = Self {
            viewport,
            pipeline_layout: self.pipeline_layout,
            render_pass: self.render_pass,
            subpass: self.subpass,
            ..Self::default_config(0, 0)
        };
    }

    /// Whether both handles have been filled in.
    pub fn has_handles(&self) -> bool {
        self.render_pass != vk::RenderPass::null()
            && self.pipeline_layout != vk::PipelineLayout::null()
    }

    fn vk_dynamic_states(&self) -> Vec<vk::DynamicState> {
        self.dynamic_states.iter().map(|s| s.to_vk()).collect()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Compiled graphics pipeline.
///
/// Owns its two shader modules and is immutable after creation. The render
/// pass it was built against is remembered so callers can detect a pipeline
/// that outlived its swapchain.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    render_pass: vk::RenderPass,
    vertex_shader: Shader,
    fragment_shader: Shader,
}

impl Pipeline {
    /// Creates a graphics pipeline from SPIR-V bytes and `config`.
    ///
    /// The vertex input layout comes from `V`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if the config has a null render
    /// pass or layout, or if the device rejects the pipeline, and
    /// [`RhiError::ShaderError`] if either shader module cannot be created.
    pub fn new<V: VertexInput>(
        device: Arc<Device>,
        vert_bytes: &[u8],
        frag_bytes: &[u8],
        config: &PipelineConfig,
    ) -> RhiResult<Self> {
        if config.render_pass == vk::RenderPass::null() {
            return Err(RhiError::PipelineError(
                "Cannot create pipeline: no render pass provided in config".to_string(),
            ));
        }
        if config.pipeline_layout == vk::PipelineLayout::null() {
            return Err(RhiError::PipelineError(
                "Cannot create pipeline: no pipeline layout provided in config".to_string(),
            ));
        }

        let vertex_shader = Shader::from_spirv_bytes(device.clone(), vert_bytes, ShaderStage::Vertex)?;
        let fragment_shader =
            Shader::from_spirv_bytes(device.clone(), frag_bytes, ShaderStage::Fragment)?;

        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let bindings = V::binding_descriptions();
        let attributes = V::attribute_descriptions();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.input_assembly.topology.to_vk())
            .primitive_restart_enable(config.input_assembly.primitive_restart_enable);

        let viewports = [config.viewport.viewport()];
        let scissors = [config.viewport.scissor()];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let raster = &config.rasterization;
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(raster.depth_clamp_enable)
            .rasterizer_discard_enable(raster.rasterizer_discard_enable)
            .polygon_mode(raster.polygon_mode.to_vk())
            .line_width(raster.line_width)
            .cull_mode(raster.cull_mode.to_vk())
            .front_face(raster.front_face.to_vk())
            .depth_bias_enable(raster.depth_bias_enable)
            .depth_bias_constant_factor(raster.depth_bias_constant_factor)
            .depth_bias_clamp(raster.depth_bias_clamp)
            .depth_bias_slope_factor(raster.depth_bias_slope_factor);

        let multisample = &config.multisample;
        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(multisample.samples.to_vk())
            .sample_shading_enable(multisample.sample_shading_enable)
            .min_sample_shading(multisample.min_sample_shading)
            .alpha_to_coverage_enable(multisample.alpha_to_coverage_enable)
            .alpha_to_one_enable(multisample.alpha_to_one_enable);

        let depth = &config.depth_stencil;
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth.depth_test_enable)
            .depth_write_enable(depth.depth_write_enable)
            .depth_compare_op(depth.depth_compare_op.to_vk())
            .depth_bounds_test_enable(depth.depth_bounds_test_enable)
            .min_depth_bounds(depth.min_depth_bounds)
            .max_depth_bounds(depth.max_depth_bounds)
            .stencil_test_enable(depth.stencil_test_enable);

        let color_blend_attachments = [config.color_blend.attachment.to_vk()];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(config.color_blend.logic_op_enable)
            .logic_op(config.color_blend.logic_op.to_vk())
            .attachments(&color_blend_attachments)
            .blend_constants(config.color_blend.blend_constants);

        let dynamic_states = config.vk_dynamic_states();
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(config.pipeline_layout)
            .render_pass(config.render_pass)
            .subpass(config.subpass)
            .base_pipeline_handle(vk::Pipeline::null())
            .base_pipeline_index(-1);

        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, result)| {
                    RhiError::PipelineError(format!("Failed to create graphics pipeline: {:?}", result))
                })?
        }
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::PipelineError("Driver returned no pipeline".to_string()))?;

        info!(
            "Graphics pipeline created ({}x{}, subpass {})",
            config.viewport.width, config.viewport.height, config.subpass
        );

        Ok(Self {
            device,
            pipeline,
            render_pass: config.render_pass,
            vertex_shader,
            fragment_shader,
        })
    }

    /// Creates a graphics pipeline from compiled shader files.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] naming the path if a file cannot be
    /// read, otherwise as [`Pipeline::new`].
    pub fn from_files<V: VertexInput>(
        device: Arc<Device>,
        vert_path: &Path,
        frag_path: &Path,
        config: &PipelineConfig,
    ) -> RhiResult<Self> {
        let vert_bytes = read_spirv_file(vert_path)?;
        let frag_bytes = read_spirv_file(frag_path)?;
        Self::new::<V>(device, &vert_bytes, &frag_bytes, config)
    }

    /// Binds the pipeline to the graphics bind point of `cmd`.
    pub fn bind(&self, cmd: &CommandBuffer) {
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline);
    }

    /// Returns the Vulkan pipeline handle.
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Render pass this pipeline was built against.
    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        // Shader modules are destroyed right after, as fields drop
        info!(
            "Graphics pipeline destroyed (shaders: {}, {})",
            self.vertex_shader.stage(),
            self.fragment_shader.stage()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_default_config_blocks() {
        let config = PipelineConfig::default_config(800, 600);

        assert_eq!(config.input_assembly.topology, PrimitiveTopology::TriangleList);
        assert!(!config.input_assembly.primitive_restart_enable);

        assert_eq!(config.rasterization.polygon_mode, PolygonMode::Fill);
        assert_eq!(config.rasterization.cull_mode, CullMode::None);
        assert_eq!(config.rasterization.front_face, FrontFace::Clockwise);
        assert_eq!(config.rasterization.line_width, 1.0);
        assert!(!config.rasterization.depth_bias_enable);

        assert_eq!(config.multisample.samples, SampleCount::X1);
        assert!(!config.multisample.sample_shading_enable);
        assert_eq!(config.multisample.min_sample_shading, 1.0);

        assert!(!config.color_blend.attachment.blend_enable);
        assert_eq!(config.color_blend.attachment.color_write_mask, ColorWriteMask::RGBA);
        assert!(!config.color_blend.logic_op_enable);
        assert_eq!(config.color_blend.logic_op, LogicOp::Copy);
        assert_eq!(config.color_blend.blend_constants, [0.0; 4]);

        assert!(config.depth_stencil.depth_test_enable);
        assert!(config.depth_stencil.depth_write_enable);
        assert_eq!(config.depth_stencil.depth_compare_op, CompareOp::Less);
        assert!(!config.depth_stencil.stencil_test_enable);

        assert_eq!(
            config.dynamic_states,
            vec![DynamicState::Viewport, DynamicState::Scissor]
        );
        assert_eq!(config.subpass, 0);
        assert!(!config.has_handles());
    }

    #[test]
    fn test_default_config_viewport() {
        let config = PipelineConfig::default_config(800, 600);
        let viewport = config.viewport.viewport();
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);

        let scissor = config.viewport.scissor();
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(
            scissor.extent,
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn test_apply_defaults_keeps_handles_and_subpass() {
        let mut config = PipelineConfig::default_config(640, 480);
        config.render_pass = vk::RenderPass::from_raw(7);
        config.pipeline_layout = vk::PipelineLayout::from_raw(9);
        config.subpass = 1;
        config.rasterization.cull_mode = CullMode::Back;
        config.color_blend.attachment = ColorBlendAttachment::alpha_blend();
        config.dynamic_states.clear();

        config.apply_defaults();

        assert_eq!(config.render_pass, vk::RenderPass::from_raw(7));
        assert_eq!(config.pipeline_layout, vk::PipelineLayout::from_raw(9));
        assert_eq!(config.subpass, 1);
        assert_eq!(config.viewport.width, 640);
        assert_eq!(config.rasterization.cull_mode, CullMode::None);
        assert!(!config.color_blend.attachment.blend_enable);
        assert_eq!(config.dynamic_states.len(), 2);
        assert!(config.has_handles());
    }

    #[test]
    fn test_vk_dynamic_states() {
        let config = PipelineConfig::default_config(1, 1);
        assert_eq!(
            config.vk_dynamic_states(),
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
    }

    #[test]
    fn test_config_toml_skips_handles() {
        let mut config = PipelineConfig::default_config(1280, 720);
        config.render_pass = vk::RenderPass::from_raw(42);
        config.pipeline_layout = vk::PipelineLayout::from_raw(43);
        config.rasterization.polygon_mode = PolygonMode::Line;

        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("render_pass"));
        assert!(!text.contains("pipeline_layout"));
        assert!(text.contains("polygon_mode = \"line\""));

        let parsed: PipelineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.render_pass, vk::RenderPass::null());
        assert_eq!(parsed.pipeline_layout, vk::PipelineLayout::null());
        assert_eq!(parsed.rasterization.polygon_mode, PolygonMode::Line);
        assert_eq!(parsed.viewport.width, 1280);
    }

    #[test]
    fn test_config_partial_toml_uses_defaults() {
        let parsed: PipelineConfig = toml::from_str(
            r#"
            [rasterization]
            cull_mode = "back"
            front_face = "counter_clockwise"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.rasterization.cull_mode, CullMode::Back);
        assert_eq!(parsed.rasterization.front_face, FrontFace::CounterClockwise);
        assert_eq!(parsed.rasterization.polygon_mode, PolygonMode::Fill);
        assert!(parsed.depth_stencil.depth_test_enable);
        assert_eq!(parsed.dynamic_states.len(), 2);
    }

    #[test]
    fn test_color_write_mask_to_vk() {
        assert_eq!(ColorWriteMask::RGBA.to_vk(), vk::ColorComponentFlags::RGBA);
        let rg = ColorWriteMask {
            r: true,
            g: true,
            b: false,
            a: false,
        };
        assert_eq!(
            rg.to_vk(),
            vk::ColorComponentFlags::R | vk::ColorComponentFlags::G
        );
    }

    #[test]
    fn test_default_blend_attachment_to_vk() {
        let state = ColorBlendAttachment::default().to_vk();
        assert_eq!(state.blend_enable, vk::FALSE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(state.dst_color_blend_factor, vk::BlendFactor::ZERO);
        assert_eq!(state.color_blend_op, vk::BlendOp::ADD);
        assert_eq!(state.src_alpha_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(state.dst_alpha_blend_factor, vk::BlendFactor::ZERO);
        assert_eq!(state.alpha_blend_op, vk::BlendOp::ADD);
    }

    #[test]
    fn test_alpha_blend() {
        let blend = ColorBlendAttachment::alpha_blend();
        assert!(blend.blend_enable);
        assert_eq!(blend.src_color_blend_factor, BlendFactor::SrcAlpha);
        assert_eq!(blend.dst_color_blend_factor, BlendFactor::OneMinusSrcAlpha);
    }

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
        assert_eq!(
            CullMode::FrontAndBack.to_vk(),
            vk::CullModeFlags::FRONT_AND_BACK
        );
    }

    #[test]
    fn test_front_face_to_vk() {
        assert_eq!(
            FrontFace::CounterClockwise.to_vk(),
            vk::FrontFace::COUNTER_CLOCKWISE
        );
        assert_eq!(FrontFace::Clockwise.to_vk(), vk::FrontFace::CLOCKWISE);
    }

    #[test]
    fn test_sample_count_to_vk() {
        assert_eq!(SampleCount::X1.to_vk(), vk::SampleCountFlags::TYPE_1);
        assert_eq!(SampleCount::X8.to_vk(), vk::SampleCountFlags::TYPE_8);
    }
}

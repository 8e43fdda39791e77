//! GPU Abstraction Layer
//!
//! Everything the dispatch core needs to know about the backend it drives:
//! capability flags and limits, the shading-language profile, handle types
//! for executor-owned objects, blend state, and the [`GpuExecutor`] trait
//! through which compiled passes are created and run.
//!
//! The dispatch core never touches a real device. The executor owns all GPU
//! objects and is handed fully-populated structural descriptions
//! ([`PassCreateInfo`]) and per-run parameters ([`RunParams`]).

pub mod variable;

use smallvec::SmallVec;

use crate::errors::GpuError;
use variable::{ScalarType, Var};

// ─── Capability Model ────────────────────────────────────────────────────────

bitflags::bitflags! {
    /// Optional backend capabilities that change variable placement and
    /// code generation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GpuCaps: u32 {
        /// Per-variable global/input uniform updates (legacy GL path).
        const INPUT_VARIABLES = 1 << 0;
    }
}

/// Device limits relevant to variable placement and code generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpuLimits {
    /// Push-constant byte budget; 0 disables push constants entirely.
    pub max_push_constant_size: usize,
    /// Maximum uniform buffer size; 0 disables UBO placement.
    pub max_ubo_size: usize,
    /// Maximum 1D texture dimension; 0 when 1D textures are unsupported.
    pub max_tex_1d_dim: u32,
    /// Maximum 3D texture dimension; 0 when 3D textures are unsupported.
    pub max_tex_3d_dim: u32,
}

/// Shading-language profile of the backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlslProfile {
    /// GLSL version number, e.g. 450.
    pub version: u16,
    /// Vulkan-flavored GLSL: explicit descriptor bindings, push constants.
    pub vulkan: bool,
    /// GLES profile: version line suffix and precision qualifiers.
    pub gles: bool,
}

/// Full capability description of a backend, cloned into the dispatch
/// context at construction.
#[derive(Debug, Clone, Default)]
pub struct GpuProfile {
    /// Optional capabilities.
    pub caps: GpuCaps,
    /// Device limits.
    pub limits: GpuLimits,
    /// Shading-language profile.
    pub glsl: GlslProfile,
}

impl GpuProfile {
    /// Descriptor binding namespace for a descriptor type: Vulkan GLSL uses
    /// one shared namespace, GL numbers each type separately.
    #[must_use]
    pub fn desc_namespace(&self, ty: DescType) -> usize {
        if self.glsl.vulkan { 0 } else { ty as usize }
    }
}

// ─── Textures & Buffers ──────────────────────────────────────────────────────

/// Texture storage format, as relevant to generated image declarations and
/// raster pass caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit normalized single channel.
    R8,
    /// 8-bit normalized two channels.
    Rg8,
    /// 8-bit normalized RGBA.
    Rgba8,
    /// 16-bit float single channel.
    R16f,
    /// 16-bit float two channels.
    Rg16f,
    /// 16-bit float RGBA.
    Rgba16f,
    /// 32-bit float single channel.
    R32f,
    /// 32-bit float two channels.
    Rg32f,
    /// 32-bit float RGBA.
    Rgba32f,
}

impl TextureFormat {
    /// GLSL image format qualifier for storage image declarations.
    #[must_use]
    pub fn glsl_format(self) -> &'static str {
        match self {
            Self::R8 => "r8",
            Self::Rg8 => "rg8",
            Self::Rgba8 => "rgba8",
            Self::R16f => "r16f",
            Self::Rg16f => "rg16f",
            Self::Rgba16f => "rgba16f",
            Self::R32f => "r32f",
            Self::Rg32f => "rg32f",
            Self::Rgba32f => "rgba32f",
        }
    }
}

/// Texture parameters visible to the dispatch layer.
///
/// `height == 0` marks a 1D texture, `depth == 0` a non-3D one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureParams {
    /// Width in texels; always nonzero.
    pub width: u32,
    /// Height in texels; 0 for 1D textures.
    pub height: u32,
    /// Depth in texels; 0 for non-3D textures.
    pub depth: u32,
    /// Storage format.
    pub format: TextureFormat,
    /// Usable as a raster render target.
    pub renderable: bool,
    /// Usable as a storage image.
    pub storable: bool,
    /// Usable as a sampled texture.
    pub sampleable: bool,
}

impl TextureParams {
    /// Dimensionality of the texture (1, 2, or 3).
    #[must_use]
    pub fn dimensions(&self) -> u8 {
        if self.depth > 0 {
            3
        } else if self.height > 0 {
            2
        } else {
            1
        }
    }
}

/// Handle to an executor-owned texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Texture {
    /// Executor-side object id.
    pub id: u64,
    /// Parameters the dispatch layer may rely on.
    pub params: TextureParams,
}

/// Handle to an executor-owned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Buffer {
    /// Executor-side object id.
    pub id: u64,
    /// Byte size of the buffer.
    pub size: usize,
    /// Texel format, present only for texel buffers.
    pub format: Option<TextureFormat>,
}

/// Handle to an executor-compiled pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuPassId(pub u64);

// ─── Rectangles ──────────────────────────────────────────────────────────────

/// Integer 2D rectangle. May be flipped on either axis (`x0 > x1` or
/// `y0 > y1`); the flip direction is meaningful to raster projection and
/// compute emulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect2D {
    /// Left edge (or right, when flipped).
    pub x0: i32,
    /// Top edge (or bottom, when flipped).
    pub y0: i32,
    /// Right edge (or left, when flipped).
    pub x1: i32,
    /// Bottom edge (or top, when flipped).
    pub y1: i32,
}

impl Rect2D {
    /// New rectangle from corner coordinates.
    #[must_use]
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Absolute width.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.x1.abs_diff(self.x0)
    }

    /// Absolute height.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.y1.abs_diff(self.y0)
    }

    /// Copy with coordinates swapped so that `x0 <= x1` and `y0 <= y1`.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            x0: self.x0.min(self.x1),
            y0: self.y0.min(self.y1),
            x1: self.x0.max(self.x1),
            y1: self.y0.max(self.y1),
        }
    }
}

// ─── Blend State ─────────────────────────────────────────────────────────────

/// Per-channel-group blend factor. This is the closed set both the raster
/// backends and the compute emulation path support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// Multiply by 0.
    Zero,
    /// Multiply by 1.
    One,
    /// Multiply by the source alpha.
    SrcAlpha,
    /// Multiply by one minus the source alpha.
    OneMinusSrcAlpha,
}

impl BlendFactor {
    /// GLSL expression of the factor, in a scope where `color` holds the
    /// source pixel.
    #[must_use]
    pub(crate) fn glsl_expr(self) -> &'static str {
        match self {
            Self::Zero => "0.0",
            Self::One => "1.0",
            Self::SrcAlpha => "color.a",
            Self::OneMinusSrcAlpha => "(1.0 - color.a)",
        }
    }
}

/// Blend parameters for a raster dispatch. Structural equality drives pass
/// caching: two absent blends match, an absent and a present one never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendParams {
    /// Source color factor.
    pub src_rgb: BlendFactor,
    /// Destination color factor.
    pub dst_rgb: BlendFactor,
    /// Source alpha factor.
    pub src_alpha: BlendFactor,
    /// Destination alpha factor.
    pub dst_alpha: BlendFactor,
}

// ─── Descriptors ─────────────────────────────────────────────────────────────

/// GPU-side resource binding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescType {
    /// Sampled texture (`sampler{1,2,3}D`).
    SampledTexture = 0,
    /// Read/write storage image (`image{1,2,3}D`).
    StorageImage = 1,
    /// Uniform buffer block (std140).
    UniformBuffer = 2,
    /// Storage buffer block (std430).
    StorageBuffer = 3,
    /// Uniform texel buffer (`samplerBuffer`).
    TexelUniformBuffer = 4,
    /// Storage texel buffer (`imageBuffer`).
    TexelStorageBuffer = 5,
}

impl DescType {
    /// Number of distinct descriptor types, for per-type binding namespaces.
    pub(crate) const COUNT: usize = 6;
}

/// Memory access mode of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescAccess {
    /// Read-only access.
    ReadOnly,
    /// Write-only access.
    WriteOnly,
    /// Read-write access.
    ReadWrite,
}

impl DescAccess {
    /// GLSL access qualifier; read-write needs none.
    #[must_use]
    pub fn glsl_qualifier(self) -> &'static str {
        match self {
            Self::ReadOnly => "readonly",
            Self::WriteOnly => "writeonly",
            Self::ReadWrite => "",
        }
    }
}

/// A descriptor declaration as handed to the executor, with its placed
/// binding number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Declared name.
    pub name: String,
    /// Binding type.
    pub ty: DescType,
    /// Access mode.
    pub access: DescAccess,
    /// Binding number within its namespace.
    pub binding: u32,
}

/// The executor-side object bound to a descriptor slot for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescObject {
    /// Nothing bound yet.
    None,
    /// A texture (sampled or storage).
    Texture(Texture),
    /// A buffer (uniform, storage, or texel).
    Buffer(Buffer),
}

// ─── Vertex Attributes ───────────────────────────────────────────────────────

/// Format of one vertex attribute: `components` scalars of `ty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexFormat {
    /// Component scalar type.
    pub ty: ScalarType,
    /// Number of components (1-4).
    pub components: u8,
}

impl VertexFormat {
    /// Byte size of one texel of this format.
    #[must_use]
    pub fn texel_size(self) -> usize {
        ScalarType::SIZE * usize::from(self.components)
    }

    /// Shape of a shader variable carrying one sample of this attribute.
    #[must_use]
    pub fn as_var(self, name: &str) -> Var {
        Var {
            name: name.to_string(),
            ty: self.ty,
            dim_v: self.components,
            dim_m: 1,
            dim_a: 1,
        }
    }

    /// GLSL type of the attribute.
    #[must_use]
    pub fn glsl_type_name(self) -> String {
        self.as_var("").glsl_type_name()
    }
}

/// A placed vertex attribute in the executor's vertex layout. The name is
/// already mangled for the vertex stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttrib {
    /// Mangled vertex-stage name.
    pub name: String,
    /// Attribute format.
    pub fmt: VertexFormat,
    /// Byte offset within one vertex.
    pub offset: usize,
    /// Shader location.
    pub location: u32,
}

// ─── Pass Creation & Execution ───────────────────────────────────────────────

/// Which kind of executable pass to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassType {
    /// Rasterization pass (vertex + fragment stage).
    Raster,
    /// Compute pass.
    Compute,
}

/// Structural description of a pass handed to the executor for compilation.
#[derive(Debug, Clone)]
pub struct PassCreateInfo {
    /// Raster or compute.
    pub pass_type: PassType,
    /// Descriptor interface, binding numbers assigned.
    pub descriptors: Vec<Descriptor>,
    /// Global/input uniform variables, in flat update-index order.
    pub variables: Vec<Var>,
    /// Total push-constant bytes (aligned to 4).
    pub push_constants_size: usize,
    /// Placed vertex attributes (raster only).
    pub vertex_attribs: Vec<VertexAttrib>,
    /// Byte stride of one vertex (raster only).
    pub vertex_stride: usize,
    /// Target texture format (raster only; part of the compiled state).
    pub target_format: Option<TextureFormat>,
    /// Fixed-function blend state (raster only).
    pub blend: Option<BlendParams>,
    /// Generated vertex stage source (raster only, empty for compute).
    pub vertex_source: String,
    /// Generated fragment or compute stage source.
    pub source: String,
}

/// A pending per-variable global uniform update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarUpdate {
    /// Flat index into [`PassCreateInfo::variables`].
    pub index: usize,
    /// Packed host-layout payload.
    pub data: Vec<u8>,
}

/// Fully-populated, backend-ready parameters for one execution of a compiled
/// pass. Retained by the pass and reused across dispatches to avoid
/// per-frame allocation.
#[derive(Debug, Clone, Default)]
pub struct RunParams {
    /// One bound object per descriptor, same order as the pass interface.
    pub desc_bindings: SmallVec<[DescObject; 8]>,
    /// Global uniform updates pending for this run.
    pub var_updates: Vec<VarUpdate>,
    /// Push-constant bytes, resubmitted in full each run.
    pub push_constants: Vec<u8>,
    /// Quad vertex bytes (raster only).
    pub vertex_data: Vec<u8>,
    /// Vertex count; 4 for the generated triangle-strip quad.
    pub vertex_count: u32,
    /// Normalized scissor rectangle (raster only).
    pub scissor: Rect2D,
    /// Workgroup counts (compute only).
    pub compute_groups: [u32; 3],
    /// Render target (raster and emulated-compute dispatches).
    pub target: Option<Texture>,
}

/// The GPU execution and resource layer the dispatch core drives.
///
/// Implementations own all device objects. Calls are synchronous from the
/// dispatch core's point of view; an implementation may enqueue asynchronous
/// device work, but this layer never waits on device completion.
pub trait GpuExecutor {
    /// Capability description of the backend.
    fn profile(&self) -> &GpuProfile;

    /// Compiles a pass from its structural description.
    fn create_pass(&mut self, info: &PassCreateInfo) -> Result<GpuPassId, GpuError>;

    /// Destroys a compiled pass.
    fn destroy_pass(&mut self, pass: GpuPassId);

    /// Creates a host-writable uniform buffer of `size` bytes.
    fn create_uniform_buffer(&mut self, size: usize) -> Result<Buffer, GpuError>;

    /// Destroys a buffer.
    fn destroy_buffer(&mut self, buf: &Buffer);

    /// Writes `data` into `buf` at `offset`.
    fn write_buffer(&mut self, buf: &Buffer, offset: usize, data: &[u8]);

    /// Executes a compiled pass with fully-populated run parameters.
    fn run_pass(&mut self, pass: GpuPassId, run: &RunParams);
}

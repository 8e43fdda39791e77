//! Logical Shader Description
//!
//! [`ShaderBuilder`] is the mutable, pooled handle callers populate between
//! [`Dispatch::begin`](crate::dispatch::Dispatch::begin) and a dispatch call.
//! It carries the full structural description of a shader: ordered variables,
//! descriptors, vertex attributes, prelude/body text, the entry function
//! name, and the declared input/output kind.
//!
//! # Signature
//!
//! [`ShaderBuilder::signature`] computes a 64-bit xxh3 hash of the shader's
//! *structure* (shapes, names, flags, code text, descriptor formats) but
//! never of variable payload bytes. Two dispatches of the same logical shader
//! hash identically regardless of current uniform values, which is what makes
//! pass caching effective.

use bytemuck::Pod;
use xxhash_rust::xxh3::Xxh3;

use crate::gpu::variable::{Var, VarLayout};
use crate::gpu::{DescAccess, DescObject, DescType, VertexFormat};

/// Declared input/output interface kind of a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShaderSig {
    /// No interface: the entry function neither consumes nor produces a value.
    #[default]
    None,
    /// The entry function produces a `vec4` color.
    Color,
}

/// A declared shader variable with its current packed payload.
#[derive(Debug, Clone)]
pub struct ShaderVar {
    /// Shape and name.
    pub var: Var,
    /// Packed host-layout payload bytes.
    pub data: Vec<u8>,
    /// Hint that the payload changes frequently; steers placement away from
    /// mechanisms that are expensive to re-upload.
    pub dynamic: bool,
}

/// A variable placed inside a buffer block, with its resolved device layout.
#[derive(Debug, Clone)]
pub struct BufferVar {
    /// Shape and name.
    pub var: Var,
    /// Device-side layout within the block.
    pub layout: VarLayout,
}

/// A declared descriptor with the object currently bound to it.
#[derive(Debug, Clone)]
pub struct ShaderDesc {
    /// Declared name.
    pub name: String,
    /// Binding type.
    pub ty: DescType,
    /// Access mode.
    pub access: DescAccess,
    /// Bound executor-side object.
    pub object: DescObject,
    /// Member variables, for uniform/storage block descriptors.
    pub buffer_vars: Vec<BufferVar>,
}

/// A declared vertex attribute with up to four corner samples (one per quad
/// corner, packed host layout).
#[derive(Debug, Clone)]
pub struct ShaderVertexAttrib {
    /// Declared name, as referenced by the fragment stage.
    pub name: String,
    /// Attribute format.
    pub fmt: VertexFormat,
    /// Corner samples in triangle-strip order.
    pub data: [Vec<u8>; 4],
}

/// Mutable logical-shader handle, recycled through the dispatch context's
/// pool.
///
/// A handle is borrowed with `begin`, populated, and either consumed by a
/// dispatch call or returned unused via `abort`. Ownership transfer makes a
/// consumed handle unrepresentable; a handle that failed during construction
/// is flagged and rejected at dispatch.
#[derive(Debug, Default)]
pub struct ShaderBuilder {
    ident: u64,
    index: u8,
    fresh: u32,
    pub(crate) variables: Vec<ShaderVar>,
    pub(crate) descriptors: Vec<ShaderDesc>,
    pub(crate) vertex_attribs: Vec<ShaderVertexAttrib>,
    pub(crate) input: ShaderSig,
    pub(crate) output: ShaderSig,
    compute_group_size: Option<[u32; 2]>,
    output_size: Option<(u32, u32)>,
    prelude: String,
    body: String,
    entry: String,
    failed: bool,
}

impl ShaderBuilder {
    /// Default entry function name; overridable via [`set_entry`](Self::set_entry).
    pub const DEFAULT_ENTRY: &'static str = "sh_main";

    /// Resets the handle for reuse, keeping allocations.
    pub(crate) fn reset(&mut self, ident: u64, index: u8) {
        self.ident = ident;
        self.index = index;
        self.fresh = 0;
        self.variables.clear();
        self.descriptors.clear();
        self.vertex_attribs.clear();
        self.input = ShaderSig::None;
        self.output = ShaderSig::None;
        self.compute_group_size = None;
        self.output_size = None;
        self.prelude.clear();
        self.body.clear();
        self.entry.clear();
        self.entry.push_str(Self::DEFAULT_ENTRY);
        self.failed = false;
    }

    /// Identity tag assigned at `begin`; 0 for shared/cacheable handles,
    /// unique per call for `begin_unique` handles.
    #[must_use]
    pub fn ident(&self) -> u64 {
        self.ident
    }

    /// Per-frame index assigned at `begin`, for builder modules that
    /// namespace resources across frames.
    #[must_use]
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Returns a fresh identifier derived from `name`, unique within this
    /// shader and stable across rebuilds of the same logical shader.
    pub fn fresh(&mut self, name: &str) -> String {
        self.fresh += 1;
        format!("{name}_{}_{}", self.ident, self.fresh)
    }

    // ── Interface declaration ────────────────────────────────────────────────

    /// Declares the input interface kind.
    pub fn set_input(&mut self, sig: ShaderSig) {
        self.input = sig;
    }

    /// Declares the output interface kind.
    pub fn set_output(&mut self, sig: ShaderSig) {
        self.output = sig;
    }

    /// Declared input kind.
    #[must_use]
    pub fn input(&self) -> ShaderSig {
        self.input
    }

    /// Declared output kind.
    #[must_use]
    pub fn output(&self) -> ShaderSig {
        self.output
    }

    /// Requests a 2D compute workgroup size, flagging the shader as compute.
    pub fn set_compute_group_size(&mut self, size: [u32; 2]) {
        self.compute_group_size = Some(size);
    }

    /// Requested compute workgroup size, if any.
    #[must_use]
    pub fn compute_group_size(&self) -> Option<[u32; 2]> {
        self.compute_group_size
    }

    /// Whether this shader dispatches as a compute pass.
    #[must_use]
    pub fn is_compute(&self) -> bool {
        self.compute_group_size.is_some()
    }

    /// Declares a fixed output size this shader must be dispatched at.
    pub fn set_output_size(&mut self, width: u32, height: u32) {
        self.output_size = Some((width, height));
    }

    /// Declared fixed output size, if any.
    #[must_use]
    pub fn output_size(&self) -> Option<(u32, u32)> {
        self.output_size
    }

    /// Renames the entry function the generated `main` invokes.
    pub fn set_entry(&mut self, name: &str) {
        self.entry.clear();
        self.entry.push_str(name);
    }

    /// Entry function name.
    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Marks the shader as failed; dispatching it becomes a contract
    /// violation, and the handle is recycled as usual.
    pub fn set_failed(&mut self) {
        self.failed = true;
    }

    /// Whether the shader was marked failed during construction.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    // ── Variables, descriptors, attributes ───────────────────────────────────

    /// Declares a variable, returning the identifier to reference it by in
    /// shader text.
    pub fn var(&mut self, sv: ShaderVar) -> String {
        let name = sv.var.name.clone();
        self.variables.push(sv);
        name
    }

    /// Declares a variable from a POD payload.
    pub fn var_pod<T: Pod>(&mut self, var: Var, value: &T, dynamic: bool) -> String {
        self.var(ShaderVar {
            var,
            data: bytemuck::bytes_of(value).to_vec(),
            dynamic,
        })
    }

    /// Declares a scalar float variable.
    pub fn var_f32(&mut self, name: &str, value: f32) -> String {
        self.var_pod(Var::float(name), &value, false)
    }

    /// Declares a vec2 variable.
    pub fn var_vec2(&mut self, name: &str, value: [f32; 2]) -> String {
        self.var_pod(Var::vec2(name), &value, false)
    }

    /// Declares a descriptor, returning the identifier to reference it by.
    pub fn desc(&mut self, sd: ShaderDesc) -> String {
        let name = sd.name.clone();
        self.descriptors.push(sd);
        name
    }

    /// Declares a vertex attribute, returning the identifier the fragment
    /// stage references it by.
    pub fn attr(&mut self, sva: ShaderVertexAttrib) -> String {
        let name = sva.name.clone();
        self.vertex_attribs.push(sva);
        name
    }

    /// Declared variables, in declaration order.
    #[must_use]
    pub fn variables(&self) -> &[ShaderVar] {
        &self.variables
    }

    /// Declared descriptors, in declaration order.
    #[must_use]
    pub fn descriptors(&self) -> &[ShaderDesc] {
        &self.descriptors
    }

    /// Declared vertex attributes, in declaration order.
    #[must_use]
    pub fn vertex_attribs(&self) -> &[ShaderVertexAttrib] {
        &self.vertex_attribs
    }

    // ── Shader text ──────────────────────────────────────────────────────────

    /// Prelude text emitted after all declarations, before the body. Macro
    /// definitions belong here.
    pub fn prelude_mut(&mut self) -> &mut String {
        &mut self.prelude
    }

    /// Body text: function definitions, including the entry function.
    pub fn body_mut(&mut self) -> &mut String {
        &mut self.body
    }

    /// Prelude text.
    #[must_use]
    pub fn prelude(&self) -> &str {
        &self.prelude
    }

    /// Body text.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    // ── Signature ────────────────────────────────────────────────────────────

    /// 64-bit structural content hash. Covers interface kinds, group size,
    /// code text, variable shapes and flags, descriptor types and object
    /// formats (formats appear in generated code), and vertex attribute
    /// formats. Variable payload bytes are deliberately excluded.
    #[must_use]
    pub fn signature(&self) -> u64 {
        let mut h = Xxh3::new();

        h.update(&self.ident.to_le_bytes());
        h.update(&[self.input as u8, self.output as u8]);
        if let Some([x, y]) = self.compute_group_size {
            h.update(&x.to_le_bytes());
            h.update(&y.to_le_bytes());
        }
        if let Some((w, hh)) = self.output_size {
            h.update(&w.to_le_bytes());
            h.update(&hh.to_le_bytes());
        }
        h.update(self.entry.as_bytes());
        h.update(b"\0");
        h.update(self.prelude.as_bytes());
        h.update(b"\0");
        h.update(self.body.as_bytes());

        for sv in &self.variables {
            h.update(b"\0v");
            h.update(sv.var.name.as_bytes());
            h.update(&[sv.var.ty as u8, sv.var.dim_v, sv.var.dim_m, u8::from(sv.dynamic)]);
            h.update(&sv.var.dim_a.to_le_bytes());
        }

        for sd in &self.descriptors {
            h.update(b"\0d");
            h.update(sd.name.as_bytes());
            h.update(&[sd.ty as u8, sd.access as u8]);
            // Image/texel formats and dimensionality leak into generated
            // declarations, so they are part of the structure.
            match sd.object {
                DescObject::Texture(tex) => {
                    h.update(&[tex.params.dimensions(), tex.params.format as u8]);
                }
                DescObject::Buffer(buf) => {
                    if let Some(fmt) = buf.format {
                        h.update(&[fmt as u8]);
                    }
                }
                DescObject::None => {}
            }
            for bv in &sd.buffer_vars {
                h.update(bv.var.name.as_bytes());
                h.update(&[bv.var.ty as u8, bv.var.dim_v, bv.var.dim_m]);
                h.update(&bv.var.dim_a.to_le_bytes());
            }
        }

        for sva in &self.vertex_attribs {
            h.update(b"\0a");
            h.update(sva.name.as_bytes());
            h.update(&[sva.fmt.ty as u8, sva.fmt.components]);
        }

        h.digest()
    }
}

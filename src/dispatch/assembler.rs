//! GLSL Source Assembly
//!
//! Turns a placed shader description into the final GLSL stage sources handed
//! to the executor. Assembly is purely textual and infallible: every input
//! was validated during placement, so this module only formats.
//!
//! Sources are built in [`SourceScratch`], a set of string buffers owned by
//! the dispatch context and cleared after every dispatch so their capacity is
//! reused across frames.

use std::fmt::Write;

use crate::gpu::variable::Var;
use crate::gpu::{DescObject, DescType, Descriptor, GpuProfile, VertexAttrib};
use crate::shader::{ShaderBuilder, ShaderSig};

use super::pass::{PassVar, VarBinding};

/// Reused string buffers for one pass build.
#[derive(Debug, Default)]
pub(crate) struct SourceScratch {
    /// Complete fragment or compute stage source.
    pub shader: String,
    /// Vertex stage declarations, then the whole vertex source after merge.
    pub vertex: String,
    /// Vertex stage main body, merged into `vertex` at the end of assembly.
    vert_body: String,
}

impl SourceScratch {
    /// Clears all buffers, keeping capacity.
    pub(crate) fn clear(&mut self) {
        self.shader.clear();
        self.vertex.clear();
        self.vert_body.clear();
    }
}

/// Everything assembly needs beyond the shader description itself.
pub(crate) struct AssembleCtx<'a> {
    pub profile: &'a GpuProfile,
    /// Binding plan, parallel to the shader's variable list.
    pub pass_vars: &'a [PassVar],
    /// Total push-constant block size, 0 when unused.
    pub push_constants_size: usize,
    /// Global/input uniforms in flat index order.
    pub globals: &'a [Var],
    /// Placed descriptor interface, parallel to the shader's descriptors.
    pub descriptors: &'a [Descriptor],
    /// Placed vertex attributes, parallel to the shader's attributes.
    pub vertex_attribs: &'a [VertexAttrib],
    /// Index of the quad position attribute within `vertex_attribs`.
    pub pos_idx: usize,
}

/// Declaration text for one variable, including the array suffix.
fn var_decl(var: &Var) -> String {
    if var.dim_a > 1 {
        format!("{} {}[{}]", var.glsl_type_name(), var.name, var.dim_a)
    } else {
        format!("{} {}", var.glsl_type_name(), var.name)
    }
}

fn version_line(out: &mut String, profile: &GpuProfile) {
    let _ = writeln!(
        out,
        "#version {}{}",
        profile.glsl.version,
        if profile.glsl.gles { " es" } else { "" }
    );
}

fn precision_lines(out: &mut String, profile: &GpuProfile) {
    if !profile.glsl.gles {
        return;
    }
    out.push_str("precision mediump float;\n");
    out.push_str("precision mediump sampler2D;\n");
    if profile.limits.max_tex_1d_dim > 0 {
        out.push_str("precision mediump sampler1D;\n");
    }
    if profile.limits.max_tex_3d_dim > 0 {
        out.push_str("precision mediump sampler3D;\n");
    }
}

/// Dimensionality of the texture bound to a descriptor; 2D before anything
/// is bound.
fn tex_dims(object: DescObject) -> u8 {
    match object {
        DescObject::Texture(tex) => tex.params.dimensions(),
        _ => 2,
    }
}

fn descriptor_decls(out: &mut String, sh: &ShaderBuilder, ctx: &AssembleCtx) {
    let vulkan = ctx.profile.glsl.vulkan;
    for (desc, sd) in ctx.descriptors.iter().zip(sh.descriptors()) {
        match desc.ty {
            DescType::SampledTexture => {
                if vulkan {
                    let _ = write!(out, "layout(binding={}) ", desc.binding);
                }
                let _ = writeln!(out, "uniform sampler{}D {};", tex_dims(sd.object), desc.name);
            }
            DescType::StorageImage => {
                let fmt = match sd.object {
                    DescObject::Texture(tex) => tex.params.format.glsl_format(),
                    _ => "rgba8",
                };
                if vulkan {
                    let _ = write!(out, "layout(binding={}, {fmt}) ", desc.binding);
                } else {
                    let _ = write!(out, "layout({fmt}) ");
                }
                let _ = writeln!(
                    out,
                    "{} restrict uniform image{}D {};",
                    desc.access.glsl_qualifier(),
                    tex_dims(sd.object),
                    desc.name
                );
            }
            DescType::UniformBuffer => {
                if vulkan {
                    let _ = write!(out, "layout(std140, binding={}) ", desc.binding);
                } else {
                    out.push_str("layout(std140) ");
                }
                let _ = writeln!(out, "uniform {} {{", desc.name);
                for bv in &sd.buffer_vars {
                    let _ = writeln!(out, "    layout(offset={}) {};", bv.layout.offset, var_decl(&bv.var));
                }
                out.push_str("};\n");
            }
            DescType::StorageBuffer => {
                if vulkan {
                    let _ = write!(out, "layout(std430, binding={}) ", desc.binding);
                } else {
                    out.push_str("layout(std430) ");
                }
                let _ = writeln!(
                    out,
                    "{} restrict buffer {} {{",
                    desc.access.glsl_qualifier(),
                    desc.name
                );
                for bv in &sd.buffer_vars {
                    let _ = writeln!(out, "    layout(offset={}) {};", bv.layout.offset, var_decl(&bv.var));
                }
                out.push_str("};\n");
            }
            DescType::TexelUniformBuffer => {
                if vulkan {
                    let _ = write!(out, "layout(binding={}) ", desc.binding);
                }
                let _ = writeln!(out, "uniform samplerBuffer {};", desc.name);
            }
            DescType::TexelStorageBuffer => {
                let fmt = match sd.object {
                    DescObject::Buffer(buf) => buf.format.map_or("rgba8", |f| f.glsl_format()),
                    _ => "rgba8",
                };
                if vulkan {
                    let _ = write!(out, "layout(binding={}, {fmt}) ", desc.binding);
                } else {
                    let _ = write!(out, "layout({fmt}) ");
                }
                let _ = writeln!(
                    out,
                    "{} restrict uniform imageBuffer {};",
                    desc.access.glsl_qualifier(),
                    desc.name
                );
            }
        }
    }
}

fn push_constant_block(out: &mut String, sh: &ShaderBuilder, ctx: &AssembleCtx) {
    if ctx.push_constants_size == 0 {
        return;
    }
    out.push_str("layout(std430, push_constant) uniform PushC {\n");
    for (sv, pv) in sh.variables().iter().zip(ctx.pass_vars) {
        if pv.binding == VarBinding::PushConst {
            let _ = writeln!(out, "    layout(offset={}) {};", pv.layout.offset, var_decl(&sv.var));
        }
    }
    out.push_str("};\n");
}

/// Builds the vertex stage source into `scratch.vertex` and returns the
/// fragment-stage attribute input declarations.
fn vertex_stage(scratch: &mut SourceScratch, sh: &ShaderBuilder, ctx: &AssembleCtx) -> String {
    let glsl = &ctx.profile.glsl;
    let (vert_in, vert_out, frag_in) = if glsl.version >= 130 {
        ("in", "out", "in")
    } else {
        ("attribute", "varying", "varying")
    };

    let head = &mut scratch.vertex;
    let body = &mut scratch.vert_body;
    let mut frag_head = String::new();

    version_line(head, ctx.profile);
    body.push_str("void main() {\n");

    for (i, (sva, va)) in sh.vertex_attribs().iter().zip(ctx.vertex_attribs).enumerate() {
        let ty = va.fmt.glsl_type_name();
        if glsl.version >= 130 {
            let _ = write!(head, "layout(location={}) ", va.location);
        }
        let _ = writeln!(head, "{vert_in} {ty} {};", va.name);

        if i == ctx.pos_idx {
            let _ = writeln!(body, "    gl_Position = vec4({}, 0.0, 1.0);", va.name);
        } else {
            if glsl.version >= 130 {
                let _ = write!(head, "layout(location={}) ", va.location);
                let _ = write!(frag_head, "layout(location={}) ", va.location);
            }
            let _ = writeln!(head, "{vert_out} {ty} {};", sva.name);
            let _ = writeln!(frag_head, "{frag_in} {ty} {};", sva.name);
            let _ = writeln!(body, "    {} = {};", sva.name, va.name);
        }
    }

    body.push_str("}\n");
    head.push_str(body);
    frag_head
}

/// Assembles the final stage sources for one pass build. On return
/// `scratch.shader` holds the fragment or compute source and, for raster
/// passes, `scratch.vertex` holds the vertex source.
pub(crate) fn assemble(scratch: &mut SourceScratch, sh: &ShaderBuilder, ctx: &AssembleCtx) {
    let glsl = &ctx.profile.glsl;
    let is_compute = sh.is_compute();

    // Declarations depend on the vertex stage for raster, so build it first.
    let frag_attribs = if is_compute {
        String::new()
    } else {
        vertex_stage(scratch, sh, ctx)
    };

    let out = &mut scratch.shader;
    version_line(out, ctx.profile);
    if is_compute {
        out.push_str("#extension GL_ARB_compute_shader : enable\n");
    }
    precision_lines(out, ctx.profile);

    if is_compute {
        // Placement validated the flag, so the size is always present here.
        if let Some([x, y]) = sh.compute_group_size() {
            let _ = writeln!(out, "layout (local_size_x = {x}, local_size_y = {y}) in;");
        }
    } else {
        out.push_str(&frag_attribs);
        if sh.output == ShaderSig::Color && glsl.version >= 130 {
            out.push_str("layout(location=0) out vec4 out_color;\n");
        }
    }

    push_constant_block(out, sh, ctx);
    descriptor_decls(out, sh, ctx);

    for var in ctx.globals {
        let _ = writeln!(out, "uniform {};", var_decl(var));
    }

    out.push_str(sh.prelude());
    out.push_str(sh.body());

    out.push_str("void main() {\n");
    if !is_compute && sh.output == ShaderSig::Color {
        let color_out = if glsl.version >= 130 { "out_color" } else { "gl_FragColor" };
        let _ = writeln!(out, "    {color_out} = {}();", sh.entry());
    } else {
        let _ = writeln!(out, "    {}();", sh.entry());
    }
    out.push_str("}\n");
}

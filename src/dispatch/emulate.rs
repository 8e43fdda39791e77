//! Compute Emulation of Raster Dispatch
//!
//! Rewrites a compute-flagged shader with a color output into a pure compute
//! shader that writes the target through a storage image, so callers can
//! dispatch it through the raster entry point without a raster pipeline.
//!
//! The rewrite replaces every raster-only construct with a compute
//! equivalent:
//!
//! * `gl_FragCoord` and fragment position become macros over
//!   `gl_GlobalInvocationID`.
//! * Each vertex attribute becomes four per-corner uniform variables plus a
//!   bilinear interpolation macro, reproducing what the rasterizer would have
//!   interpolated.
//! * The color output becomes an `imageStore` into the target, guarded
//!   against out-of-bounds invocations from workgroup rounding, with blending
//!   done manually via `imageLoad` when requested.
//!
//! The caller validates the target (renderable, storable, correctly sized) before
//! invoking the rewrite; this module only transforms the shader.

use std::fmt::Write;

use crate::gpu::variable::Var;
use crate::gpu::{BlendParams, DescAccess, DescObject, DescType, Rect2D, Texture};
use crate::shader::{ShaderBuilder, ShaderDesc, ShaderSig, ShaderVar};

pub(crate) fn translate_compute(
    sh: &mut ShaderBuilder,
    target: &Texture,
    rect: Rect2D,
    blend: Option<&BlendParams>,
) {
    let width = rect.width().max(1);
    let height = rect.height().max(1);

    let scale_name = sh.fresh("out_scale");
    let out_scale = sh.var_pod(
        Var::vec2(&scale_name),
        &[1.0 / width as f32, 1.0 / height as f32],
        true,
    );

    let _ = write!(
        sh.prelude_mut(),
        "#define frag_pos(id) (vec2(id) + vec2(0.5))\n\
         #define frag_map(id) ({out_scale} * frag_pos(id))\n\
         #define gl_FragCoord vec4(frag_pos(gl_GlobalInvocationID), 0.0, 1.0)\n"
    );

    // Replace each vertex attribute with its four corner values and a
    // bilinear mix reproducing the rasterizer's interpolation.
    for sva in std::mem::take(&mut sh.vertex_attribs) {
        let mut points = Vec::with_capacity(4);
        for data in sva.data {
            let name = sh.fresh("p");
            points.push(sh.var(ShaderVar {
                var: sva.fmt.as_var(&name),
                data,
                dynamic: false,
            }));
        }
        let _ = write!(
            sh.prelude_mut(),
            "#define {name}_map(id) \
             (mix(mix({p0}, {p1}, frag_map(id).x), \
                  mix({p2}, {p3}, frag_map(id).x), \
                  frag_map(id).y))\n\
             #define {name} ({name}_map(gl_GlobalInvocationID))\n",
            name = sva.name,
            p0 = points[0],
            p1 = points[1],
            p2 = points[2],
            p3 = points[3],
        );
    }

    // The target becomes a storage image standing in for the framebuffer.
    let fbo_name = sh.fresh("out_image");
    let fbo = sh.desc(ShaderDesc {
        name: fbo_name,
        ty: DescType::StorageImage,
        access: if blend.is_some() {
            DescAccess::ReadWrite
        } else {
            DescAccess::WriteOnly
        },
        object: DescObject::Texture(*target),
        buffer_vars: Vec::new(),
    });

    let base_name = sh.fresh("base");
    let base = sh.var_pod(Var::ivec2(&base_name), &[rect.x0, rect.y0], true);

    // Flips are static per pass, so the direction is hard-coded rather than
    // routed through a variable.
    let dx = if rect.x0 > rect.x1 { -1 } else { 1 };
    let dy = if rect.y0 > rect.y1 { -1 } else { 1 };

    let old_entry = sh.entry().to_string();
    let new_entry = sh.fresh("img_main");

    let body = sh.body_mut();
    let _ = writeln!(body, "void {new_entry}() {{");
    let _ = writeln!(body, "    ivec2 dir = ivec2({dx}, {dy});");
    let _ = writeln!(body, "    ivec2 pos = {base} + dir * ivec2(gl_GlobalInvocationID);");
    let _ = writeln!(body, "    vec2 fpos = {out_scale} * vec2(gl_GlobalInvocationID);");
    let _ = writeln!(body, "    if (max(fpos.x, fpos.y) < 1.0) {{");
    let _ = writeln!(body, "        vec4 color = {old_entry}();");
    if let Some(bp) = blend {
        let _ = writeln!(body, "        vec4 orig = imageLoad({fbo}, pos);");
        let _ = writeln!(
            body,
            "        color = vec4(color.rgb * vec3({}), color.a * {})\n\
             \x20             + vec4(orig.rgb * vec3({}), orig.a * {});",
            bp.src_rgb.glsl_expr(),
            bp.src_alpha.glsl_expr(),
            bp.dst_rgb.glsl_expr(),
            bp.dst_alpha.glsl_expr(),
        );
    }
    let _ = writeln!(body, "        imageStore({fbo}, pos, color);");
    let _ = writeln!(body, "    }}");
    let _ = writeln!(body, "}}");

    sh.set_entry(&new_entry);
    sh.set_output(ShaderSig::None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::variable::ScalarType;
    use crate::gpu::{
        BlendFactor, TextureFormat, TextureParams, VertexFormat,
    };
    use crate::shader::ShaderVertexAttrib;

    fn storable_target() -> Texture {
        Texture {
            id: 7,
            params: TextureParams {
                width: 64,
                height: 64,
                depth: 0,
                format: TextureFormat::Rgba16f,
                renderable: false,
                storable: true,
                sampleable: false,
            },
        }
    }

    fn color_compute_shader() -> ShaderBuilder {
        let mut sh = ShaderBuilder::default();
        sh.reset(0, 0);
        sh.set_compute_group_size([16, 16]);
        sh.set_output(ShaderSig::Color);
        sh.body_mut().push_str("vec4 sh_main() { return vec4(1.0); }\n");
        sh
    }

    #[test]
    fn rewrite_redirects_output_to_image_store() {
        let mut sh = color_compute_shader();
        sh.attr(ShaderVertexAttrib {
            name: "coord".into(),
            fmt: VertexFormat { ty: ScalarType::Float, components: 2 },
            data: Default::default(),
        });
        translate_compute(&mut sh, &storable_target(), Rect2D::new(0, 0, 64, 64), None);

        assert_eq!(sh.output(), ShaderSig::None);
        assert_ne!(sh.entry(), ShaderBuilder::DEFAULT_ENTRY);
        assert!(sh.vertex_attribs().is_empty(), "attributes become variables");
        assert!(sh.prelude().contains("#define coord_map(id)"));
        assert!(sh.prelude().contains("#define gl_FragCoord"));
        assert!(sh.body().contains("vec4 color = sh_main();"));
        // Invocations landing exactly on the far edge stay out of bounds.
        assert!(sh.body().contains("if (max(fpos.x, fpos.y) < 1.0) {"));
        assert!(sh.body().contains("imageStore("));
        assert!(!sh.body().contains("imageLoad("), "no blending requested");

        // One interpolation scale, four corners, one base offset.
        assert_eq!(sh.variables().len(), 6);
        assert_eq!(sh.descriptors().len(), 1);
        assert_eq!(sh.descriptors()[0].access, DescAccess::WriteOnly);
    }

    #[test]
    fn blending_loads_the_destination() {
        let mut sh = color_compute_shader();
        let blend = BlendParams {
            src_rgb: BlendFactor::SrcAlpha,
            dst_rgb: BlendFactor::OneMinusSrcAlpha,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::OneMinusSrcAlpha,
        };
        translate_compute(&mut sh, &storable_target(), Rect2D::new(0, 0, 64, 64), Some(&blend));

        assert_eq!(sh.descriptors()[0].access, DescAccess::ReadWrite);
        assert!(sh.body().contains("imageLoad("));
        assert!(sh.body().contains("color.a * 1.0"));
        assert!(sh.body().contains("(1.0 - color.a)"));
    }

    #[test]
    fn flipped_rect_negates_the_direction() {
        let mut sh = color_compute_shader();
        translate_compute(&mut sh, &storable_target(), Rect2D::new(64, 0, 0, 64), None);
        assert!(sh.body().contains("ivec2 dir = ivec2(-1, 1);"));
    }
}

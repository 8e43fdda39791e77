//! Per-Dispatch State Updates
//!
//! Pushes the current shader state (variable payloads, descriptor bindings,
//! quad vertex data) into a cached pass's retained [`RunParams`] before every
//! execution.
//!
//! Variable uploads are dirty-tracked: each [`PassVar`] keeps a byte snapshot
//! of the last uploaded value and an unchanged payload produces no GPU
//! traffic at all, whatever its binding mechanism.

use crate::gpu::variable::{self, copy_layout};
use crate::gpu::{Buffer, GpuExecutor, RunParams, VarUpdate, VertexAttrib};
use crate::shader::{ShaderVar, ShaderVertexAttrib};

use super::pass::{PassVar, VarBinding};

/// Uploads one variable's payload through its assigned binding mechanism, if
/// it changed since the last upload.
pub(crate) fn update_pass_var(
    exec: &mut dyn GpuExecutor,
    sv: &ShaderVar,
    pv: &mut PassVar,
    ubo: Option<&Buffer>,
    run: &mut RunParams,
) {
    if pv.cached.as_deref() == Some(&sv.data[..]) {
        return;
    }
    match &mut pv.cached {
        Some(cached) => {
            cached.clear();
            cached.extend_from_slice(&sv.data);
        }
        None => pv.cached = Some(sv.data.clone()),
    }

    let host = variable::host_layout(0, &sv.var);
    match pv.binding {
        // Build always assigns before update runs.
        VarBinding::Unassigned => {}
        VarBinding::Global { index } => {
            run.var_updates.push(VarUpdate {
                index,
                data: sv.data.clone(),
            });
        }
        VarBinding::Ubo => {
            let Some(buf) = ubo else { return };
            if host.stride == pv.layout.stride {
                exec.write_buffer(buf, pv.layout.offset, &sv.data);
            } else {
                // Host rows are packed, device rows are strided; write row
                // by row so only real payload bytes hit the buffer.
                let mut src = 0;
                let mut dst = pv.layout.offset;
                while src < host.size {
                    exec.write_buffer(buf, dst, &sv.data[src..src + host.stride]);
                    src += host.stride;
                    dst += pv.layout.stride;
                }
            }
        }
        VarBinding::PushConst => {
            copy_layout(&mut run.push_constants, pv.layout, &sv.data, host);
        }
    }
}

/// Rebinds the shader's descriptor objects for this run. Bindings the build
/// appended past the shader's own descriptors (the backing uniform buffer)
/// are left untouched.
pub(crate) fn update_descriptors(
    sh_descs: &[crate::shader::ShaderDesc],
    run: &mut RunParams,
) {
    for (i, sd) in sh_descs.iter().enumerate() {
        run.desc_bindings[i] = sd.object;
    }
}

/// Expands per-attribute corner samples into interleaved quad vertex bytes,
/// triangle-strip order.
pub(crate) fn update_vertex_data(
    attribs: &[VertexAttrib],
    stride: usize,
    sh_attribs: &[ShaderVertexAttrib],
    out: &mut Vec<u8>,
) {
    out.clear();
    out.resize(stride * 4, 0);
    for (va, sva) in attribs.iter().zip(sh_attribs) {
        let size = va.fmt.texel_size();
        for (corner, data) in sva.data.iter().enumerate() {
            let off = corner * stride + va.offset;
            out[off..off + size].copy_from_slice(&data[..size]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GpuError;
    use crate::gpu::variable::{ScalarType, Var};
    use crate::gpu::{GpuPassId, GpuProfile, PassCreateInfo, VertexFormat};

    #[derive(Default)]
    struct RecordingExec {
        profile: GpuProfile,
        writes: Vec<(usize, Vec<u8>)>,
    }

    impl GpuExecutor for RecordingExec {
        fn profile(&self) -> &GpuProfile {
            &self.profile
        }
        fn create_pass(&mut self, _info: &PassCreateInfo) -> Result<GpuPassId, GpuError> {
            Ok(GpuPassId(0))
        }
        fn destroy_pass(&mut self, _pass: GpuPassId) {}
        fn create_uniform_buffer(&mut self, size: usize) -> Result<Buffer, GpuError> {
            Ok(Buffer { id: 1, size, format: None })
        }
        fn destroy_buffer(&mut self, _buf: &Buffer) {}
        fn write_buffer(&mut self, _buf: &Buffer, offset: usize, data: &[u8]) {
            self.writes.push((offset, data.to_vec()));
        }
        fn run_pass(&mut self, _pass: GpuPassId, _run: &RunParams) {}
    }

    fn float_var(name: &str, value: f32) -> ShaderVar {
        ShaderVar {
            var: Var::float(name),
            data: value.to_le_bytes().to_vec(),
            dynamic: false,
        }
    }

    #[test]
    fn unchanged_payload_produces_no_traffic() {
        let mut exec = RecordingExec::default();
        let ubo = Buffer { id: 1, size: 64, format: None };
        let sv = float_var("x", 1.5);
        let mut pv = PassVar::new();
        pv.binding = VarBinding::Ubo;
        pv.layout = variable::std140_layout(0, &sv.var);
        let mut run = RunParams::default();

        update_pass_var(&mut exec, &sv, &mut pv, Some(&ubo), &mut run);
        update_pass_var(&mut exec, &sv, &mut pv, Some(&ubo), &mut run);
        assert_eq!(exec.writes.len(), 1);

        let changed = float_var("x", 2.5);
        update_pass_var(&mut exec, &changed, &mut pv, Some(&ubo), &mut run);
        assert_eq!(exec.writes.len(), 2);
        assert_eq!(exec.writes[1].1, 2.5_f32.to_le_bytes());
    }

    #[test]
    fn strided_ubo_write_goes_row_by_row() {
        let mut exec = RecordingExec::default();
        let ubo = Buffer { id: 1, size: 256, format: None };
        let var = Var::float("a").array(3);
        let sv = ShaderVar {
            data: vec![1; variable::host_layout(0, &var).size],
            var: var.clone(),
            dynamic: false,
        };
        let mut pv = PassVar::new();
        pv.binding = VarBinding::Ubo;
        pv.layout = variable::std140_layout(0, &var);
        let mut run = RunParams::default();

        update_pass_var(&mut exec, &sv, &mut pv, Some(&ubo), &mut run);
        // Three rows of 4 bytes at vec4-strided offsets.
        assert_eq!(exec.writes.len(), 3);
        assert_eq!(exec.writes[0].0, 0);
        assert_eq!(exec.writes[1].0, 16);
        assert_eq!(exec.writes[2].0, 32);
    }

    #[test]
    fn push_constant_update_lands_at_its_offset() {
        let mut exec = RecordingExec::default();
        let sv = float_var("x", 3.0);
        let mut pv = PassVar::new();
        pv.binding = VarBinding::PushConst;
        pv.layout = variable::std430_layout(8, &sv.var);
        let mut run = RunParams::default();
        run.push_constants = vec![0; 12];

        update_pass_var(&mut exec, &sv, &mut pv, None, &mut run);
        assert_eq!(&run.push_constants[8..12], &3.0_f32.to_le_bytes());
        assert!(exec.writes.is_empty());
    }

    #[test]
    fn global_update_records_its_flat_index() {
        let mut exec = RecordingExec::default();
        let sv = float_var("x", 9.0);
        let mut pv = PassVar::new();
        pv.binding = VarBinding::Global { index: 2 };
        pv.layout = variable::host_layout(0, &sv.var);
        let mut run = RunParams::default();

        update_pass_var(&mut exec, &sv, &mut pv, None, &mut run);
        assert_eq!(run.var_updates.len(), 1);
        assert_eq!(run.var_updates[0].index, 2);
        assert_eq!(run.var_updates[0].data, sv.data);
    }

    #[test]
    fn quad_expansion_interleaves_corner_samples() {
        let fmt = VertexFormat { ty: ScalarType::Float, components: 2 };
        let corner = |x: f32, y: f32| {
            let mut v = x.to_le_bytes().to_vec();
            v.extend_from_slice(&y.to_le_bytes());
            v
        };
        let sh_attribs = vec![ShaderVertexAttrib {
            name: "pos".into(),
            fmt,
            data: [corner(0.0, 0.0), corner(1.0, 0.0), corner(0.0, 1.0), corner(1.0, 1.0)],
        }];
        let attribs = vec![VertexAttrib {
            name: "vertpos".into(),
            fmt,
            offset: 0,
            location: 0,
        }];

        let mut out = Vec::new();
        update_vertex_data(&attribs, 8, &sh_attribs, &mut out);
        assert_eq!(out.len(), 32);
        assert_eq!(&out[8..16], &corner(1.0, 0.0)[..]);
        assert_eq!(&out[24..32], &corner(1.0, 1.0)[..]);
    }
}

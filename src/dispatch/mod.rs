//! Shader Dispatch & Pass Cache
//!
//! [`Dispatch`] is the stateful frontend of the crate: it pools
//! [`ShaderBuilder`] handles, turns populated handles into compiled GPU
//! passes, caches those passes for the context's lifetime, and keeps the
//! per-pass run state current across dispatches.
//!
//! # Dispatch flow
//!
//! ```text
//! begin ──► populate builder ──► finish / dispatch_compute
//!                │                      │
//!                └── abort ◄────────────┴─► builder recycled either way
//! ```
//!
//! `finish` renders to a texture, transparently emulating the raster path on
//! compute-flagged shaders. `dispatch_compute` runs a targetless compute
//! shader with explicit workgroup counts.
//!
//! # Caching
//!
//! Passes are keyed on the builder's structural signature plus, for raster
//! dispatches, the target format and blend state. A pass that fails to build
//! is cached as permanently failed; dispatching the same shader again
//! short-circuits to [`DispatchError::PassFailed`] without re-emitting
//! diagnostics.

mod assembler;
mod emulate;
mod pass;
mod planner;
mod update;

use rustc_hash::FxHashMap;

use crate::errors::{DispatchError, Result};
use crate::gpu::{
    BlendParams, DescObject, DescType, Descriptor, GpuExecutor, GpuProfile, PassCreateInfo,
    PassType, Rect2D, Texture, VertexAttrib,
};
use crate::shader::{ShaderBuilder, ShaderDesc, ShaderSig, ShaderVertexAttrib};

use assembler::{AssembleCtx, SourceScratch};
use pass::{fx_hash_key, Pass, PassKey};

/// Shader dispatch context over a GPU executor.
///
/// Owns the shader pool, the pass cache, and the executor itself. All GPU
/// objects the context created are released on drop.
pub struct Dispatch<E: GpuExecutor> {
    exec: E,
    profile: GpuProfile,
    /// Recycled builder handles.
    shaders: Vec<ShaderBuilder>,
    /// All passes ever built, including permanently failed ones.
    passes: Vec<Pass>,
    /// Key-hash index into `passes`; collisions fall back to a scan.
    lookup: FxHashMap<u64, usize>,
    scratch: SourceScratch,
    current_ident: u64,
    current_index: u8,
}

impl<E: GpuExecutor> Dispatch<E> {
    /// New dispatch context. The executor's capability profile is captured
    /// here and assumed stable for the context's lifetime.
    pub fn new(exec: E) -> Self {
        let profile = exec.profile().clone();
        Self {
            exec,
            profile,
            shaders: Vec::new(),
            passes: Vec::new(),
            lookup: FxHashMap::default(),
            scratch: SourceScratch::default(),
            current_ident: 0,
            current_index: 0,
        }
    }

    /// The wrapped executor.
    #[must_use]
    pub fn executor(&self) -> &E {
        &self.exec
    }

    /// Mutable access to the wrapped executor.
    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.exec
    }

    /// Number of cached passes, failed ones included.
    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    // ─── Builder pool ────────────────────────────────────────────────────────

    /// Borrows a sharable builder handle from the pool. Two shaders built
    /// identically through such handles hit the same cached pass.
    pub fn begin(&mut self) -> ShaderBuilder {
        self.begin_with_ident(0)
    }

    /// Borrows a builder with a per-call unique identity tag, opting the
    /// resulting shader out of cross-call pass sharing.
    pub fn begin_unique(&mut self) -> ShaderBuilder {
        self.current_ident += 1;
        self.begin_with_ident(self.current_ident)
    }

    fn begin_with_ident(&mut self, ident: u64) -> ShaderBuilder {
        let mut sh = self.shaders.pop().unwrap_or_default();
        sh.reset(ident, self.current_index);
        sh
    }

    /// Returns an unused builder handle to the pool.
    pub fn abort(&mut self, sh: ShaderBuilder) {
        self.recycle(sh);
    }

    /// Marks a frame boundary: resets the unique-identity counter and
    /// advances the index new builders are stamped with.
    pub fn reset_frame(&mut self) {
        self.current_ident = 0;
        self.current_index = self.current_index.wrapping_add(1);
    }

    fn recycle(&mut self, sh: ShaderBuilder) {
        self.shaders.push(sh);
    }

    // ─── Dispatch entry points ───────────────────────────────────────────────

    /// Renders the shader to `target`, building or reusing the cached pass.
    ///
    /// `rect` defaults to the full target per axis; a flipped rect flips the
    /// projection. Compute-flagged shaders are transparently rewritten to
    /// write the target through a storage image.
    pub fn finish(
        &mut self,
        mut sh: ShaderBuilder,
        target: &Texture,
        rect: Option<Rect2D>,
        blend: Option<BlendParams>,
    ) -> Result<()> {
        let res = self.finish_inner(&mut sh, target, rect, blend);
        self.scratch.clear();
        self.recycle(sh);
        res
    }

    /// Runs a targetless compute shader with explicit workgroup counts.
    pub fn dispatch_compute(&mut self, mut sh: ShaderBuilder, groups: [u32; 3]) -> Result<()> {
        let res = self.compute_inner(&mut sh, groups);
        self.scratch.clear();
        self.recycle(sh);
        res
    }

    fn finish_inner(
        &mut self,
        sh: &mut ShaderBuilder,
        target: &Texture,
        rect: Option<Rect2D>,
        blend: Option<BlendParams>,
    ) -> Result<()> {
        if sh.is_failed() {
            return Err(DispatchError::ShaderFailed);
        }
        if sh.input != ShaderSig::None || sh.output != ShaderSig::Color {
            return Err(DispatchError::SignatureMismatch);
        }

        let tpars = &target.params;
        if tpars.dimensions() != 2 {
            return Err(DispatchError::InvalidTarget);
        }
        if !tpars.renderable {
            return Err(DispatchError::InvalidTarget);
        }
        if sh.is_compute() && !tpars.storable {
            return Err(DispatchError::TargetNotStorable);
        }
        for sva in sh.vertex_attribs() {
            let size = sva.fmt.texel_size();
            if sva.data.iter().any(|d| d.len() < size) {
                return Err(DispatchError::VertexDataTooShort { name: sva.name.clone() });
            }
        }

        // Unset or degenerate axes cover the full target.
        let mut rc = rect.unwrap_or_default();
        if rc.width() == 0 {
            rc.x0 = 0;
            rc.x1 = tpars.width as i32;
        }
        if rc.height() == 0 {
            rc.y0 = 0;
            rc.y1 = tpars.height as i32;
        }

        if let Some((w, h)) = sh.output_size() {
            if (w, h) != (rc.width(), rc.height()) {
                return Err(DispatchError::OutputSizeMismatch {
                    required_w: w,
                    required_h: h,
                    actual_w: rc.width(),
                    actual_h: rc.height(),
                });
            }
        }

        // The quad position is part of the pass's vertex layout, so it goes
        // in before the cache lookup. Clip space spans [-1, 1].
        let mut pos_idx = 0;
        let key;
        if sh.is_compute() {
            emulate::translate_compute(sh, target, rc, blend.as_ref());
            key = PassKey {
                signature: sh.signature(),
                target_format: None,
                blend: None,
            };
        } else {
            let corner = |x: i32, y: i32| -> Vec<u8> {
                let cx = 2.0 * x as f32 / tpars.width as f32 - 1.0;
                let cy = 2.0 * y as f32 / tpars.height as f32 - 1.0;
                let mut v = cx.to_le_bytes().to_vec();
                v.extend_from_slice(&cy.to_le_bytes());
                v
            };
            let name = sh.fresh("position");
            pos_idx = sh.vertex_attribs.len();
            sh.attr(ShaderVertexAttrib {
                name,
                fmt: crate::gpu::VertexFormat {
                    ty: crate::gpu::variable::ScalarType::Float,
                    components: 2,
                },
                data: [
                    corner(rc.x0, rc.y0),
                    corner(rc.x1, rc.y0),
                    corner(rc.x0, rc.y1),
                    corner(rc.x1, rc.y1),
                ],
            });
            key = PassKey {
                signature: sh.signature(),
                target_format: Some(tpars.format),
                blend,
            };
        }

        let (idx, built) = self.find_or_build_pass(sh, key, pos_idx);
        built?;
        let pass = &mut self.passes[idx];
        if pass.failed {
            return Err(DispatchError::PassFailed);
        }

        pass.run.var_updates.clear();
        for (sv, pv) in sh.variables.iter().zip(pass.vars.iter_mut()) {
            update::update_pass_var(&mut self.exec, sv, pv, pass.ubo.as_ref(), &mut pass.run);
        }
        update::update_descriptors(&sh.descriptors, &mut pass.run);

        if sh.is_compute() {
            // Group size presence is what made the shader compute-flagged.
            let [bw, bh] = sh.compute_group_size().unwrap_or([1, 1]);
            pass.run.compute_groups = [rc.width().div_ceil(bw), rc.height().div_ceil(bh), 1];
        } else {
            update::update_vertex_data(
                &pass.vertex_attribs,
                pass.vertex_stride,
                &sh.vertex_attribs,
                &mut pass.run.vertex_data,
            );
            pass.run.vertex_count = 4;
            pass.run.scissor = rc.normalized();
        }
        pass.run.target = Some(*target);

        if let Some(id) = pass.gpu_pass {
            self.exec.run_pass(id, &pass.run);
        }
        Ok(())
    }

    fn compute_inner(&mut self, sh: &mut ShaderBuilder, groups: [u32; 3]) -> Result<()> {
        if sh.is_failed() {
            return Err(DispatchError::ShaderFailed);
        }
        if !sh.is_compute() {
            return Err(DispatchError::NonComputeShader);
        }
        if !sh.vertex_attribs.is_empty() {
            return Err(DispatchError::ComputeWithVertexAttribs);
        }
        if sh.input != ShaderSig::None || sh.output != ShaderSig::None {
            return Err(DispatchError::SignatureMismatch);
        }

        let key = PassKey {
            signature: sh.signature(),
            target_format: None,
            blend: None,
        };
        let (idx, built) = self.find_or_build_pass(sh, key, 0);
        built?;
        let pass = &mut self.passes[idx];
        if pass.failed {
            return Err(DispatchError::PassFailed);
        }

        pass.run.var_updates.clear();
        for (sv, pv) in sh.variables.iter().zip(pass.vars.iter_mut()) {
            update::update_pass_var(&mut self.exec, sv, pv, pass.ubo.as_ref(), &mut pass.run);
        }
        update::update_descriptors(&sh.descriptors, &mut pass.run);
        pass.run.compute_groups = groups;
        pass.run.target = None;

        if let Some(id) = pass.gpu_pass {
            self.exec.run_pass(id, &pass.run);
        }
        Ok(())
    }

    // ─── Pass cache ──────────────────────────────────────────────────────────

    /// Cache lookup, building on miss. A failed build is still cached (as
    /// permanently failed) and its error returned once; later lookups find
    /// the failed pass and short-circuit.
    fn find_or_build_pass(
        &mut self,
        sh: &mut ShaderBuilder,
        key: PassKey,
        pos_idx: usize,
    ) -> (usize, Result<()>) {
        let hash = fx_hash_key(&key);
        if let Some(&idx) = self.lookup.get(&hash) {
            if self.passes[idx].key == key {
                return (idx, Ok(()));
            }
            // Hash collision; the stored key settles it.
            if let Some(idx) = self.passes.iter().position(|p| p.key == key) {
                return (idx, Ok(()));
            }
        }

        let mut pass = Pass::new(key, sh.variables.len());
        let built = self.build_pass(sh, &mut pass, pos_idx);
        if let Err(err) = &built {
            log::error!("Failed building dispatch pass: {err}");
            if let Some(id) = pass.gpu_pass.take() {
                self.exec.destroy_pass(id);
            }
            if let Some(buf) = pass.ubo.take() {
                self.exec.destroy_buffer(&buf);
            }
            pass.failed = true;
        }

        let idx = self.passes.len();
        self.passes.push(pass);
        self.lookup.entry(hash).or_insert(idx);
        (idx, built)
    }

    fn build_pass(&mut self, sh: &mut ShaderBuilder, pass: &mut Pass, pos_idx: usize) -> Result<()> {
        // Vertex layout: attributes pack in declaration order, locations
        // advance by the number of vec4 slots each one occupies.
        if !sh.is_compute() {
            let mut stride = 0;
            let mut location = 0;
            for sva in &sh.vertex_attribs {
                pass.vertex_attribs.push(VertexAttrib {
                    name: format!("vert{}", sva.name),
                    fmt: sva.fmt,
                    offset: stride,
                    location,
                });
                stride += sva.fmt.texel_size();
                location += sva.fmt.texel_size().div_ceil(16) as u32;
            }
            pass.vertex_stride = stride;
        }

        let planner = planner::place_all(&self.profile, &sh.variables, &mut pass.vars)?;

        if !planner.ubo_vars.is_empty() {
            let buf = self
                .exec
                .create_uniform_buffer(planner.ubo_size)
                .map_err(DispatchError::UboCreation)?;
            pass.ubo = Some(buf);
            let name = sh.fresh("UBO");
            sh.descriptors.push(ShaderDesc {
                name,
                ty: DescType::UniformBuffer,
                access: crate::gpu::DescAccess::ReadOnly,
                object: DescObject::Buffer(buf),
                buffer_vars: planner.ubo_vars.clone(),
            });
        }

        let mut namespaces = [0u32; DescType::COUNT];
        let mut descriptors = Vec::with_capacity(sh.descriptors.len());
        for sd in &sh.descriptors {
            let ns = self.profile.desc_namespace(sd.ty);
            descriptors.push(Descriptor {
                name: sd.name.clone(),
                ty: sd.ty,
                access: sd.access,
                binding: namespaces[ns],
            });
            namespaces[ns] += 1;
        }

        pass.run.desc_bindings = sh.descriptors.iter().map(|sd| sd.object).collect();
        pass.run.push_constants = vec![0; planner.push_constants_size.next_multiple_of(4)];

        let ctx = AssembleCtx {
            profile: &self.profile,
            pass_vars: &pass.vars,
            push_constants_size: planner.push_constants_size,
            globals: &planner.globals,
            descriptors: &descriptors,
            vertex_attribs: &pass.vertex_attribs,
            pos_idx,
        };
        assembler::assemble(&mut self.scratch, sh, &ctx);
        log::trace!("Generated shader source:\n{}", self.scratch.shader);

        let info = PassCreateInfo {
            pass_type: if sh.is_compute() {
                PassType::Compute
            } else {
                PassType::Raster
            },
            descriptors,
            variables: planner.globals,
            push_constants_size: pass.run.push_constants.len(),
            vertex_attribs: pass.vertex_attribs.clone(),
            vertex_stride: pass.vertex_stride,
            target_format: pass.key.target_format,
            blend: pass.key.blend,
            vertex_source: self.scratch.vertex.clone(),
            source: self.scratch.shader.clone(),
        };
        let id = self
            .exec
            .create_pass(&info)
            .map_err(DispatchError::PassCreation)?;
        pass.gpu_pass = Some(id);
        log::debug!(
            "Built new {:?} pass (cache size {})",
            info.pass_type,
            self.passes.len() + 1
        );
        Ok(())
    }
}

impl<E: GpuExecutor> Drop for Dispatch<E> {
    fn drop(&mut self) {
        for pass in &mut self.passes {
            if let Some(id) = pass.gpu_pass.take() {
                self.exec.destroy_pass(id);
            }
            if let Some(buf) = pass.ubo.take() {
                self.exec.destroy_buffer(&buf);
            }
        }
    }
}

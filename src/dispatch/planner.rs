//! Variable Placement Planner
//!
//! Assigns each declared shader variable to a binding mechanism (push
//! constants, the pass's uniform buffer, or a legacy global/input uniform)
//! depending on what the backend's capability tier offers.
//!
//! Placement runs as a two-pass greedy algorithm over the declaration order:
//!
//! 1. **Restrictive pass**: only scalars/vectors and `dynamic`-flagged
//!    variables compete for push constants, so large values like matrices do
//!    not exhaust the budget before the cheap traffic gets a chance.
//! 2. **Exhaustive pass**: everything still unassigned tries push constants
//!    without the shape restriction, then a uniform-buffer slot, then a
//!    global slot.
//!
//! A variable no mechanism accepts fails the entire pass build, naming the
//! variable.

use crate::errors::{DispatchError, Result};
use crate::gpu::variable::{self, Var};
use crate::gpu::{GpuCaps, GpuProfile};
use crate::shader::{BufferVar, ShaderVar};

use super::pass::{PassVar, VarBinding};

/// Accumulated placement state for one pass build.
#[derive(Debug, Default)]
pub(crate) struct Planner {
    /// Running push-constant cursor; final block size before alignment.
    pub push_constants_size: usize,
    /// Variables placed into the backing uniform buffer, with layouts.
    pub ubo_vars: Vec<BufferVar>,
    /// Running uniform buffer size.
    pub ubo_size: usize,
    /// Variables placed as global/input uniforms, in flat index order.
    pub globals: Vec<Var>,
}

impl Planner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Attempts to place one variable. During the restrictive pass
    /// (`exhaustive == false`) an unplaced variable is not an error; during
    /// the exhaustive pass it is.
    pub(crate) fn place(
        &mut self,
        profile: &GpuProfile,
        sv: &ShaderVar,
        pv: &mut PassVar,
        exhaustive: bool,
    ) -> Result<()> {
        if pv.binding.is_assigned() {
            return Ok(());
        }

        // Keep "large" values like matrices out of push constants in the
        // first pass; they would blow the budget long before the scalars
        // and frequently-updated values that benefit most.
        let try_pushc = exhaustive || sv.var.is_scalar_or_vector() || sv.dynamic;
        if try_pushc
            && profile.glsl.vulkan
            && profile.limits.max_push_constant_size > 0
            && self.try_push_constant(profile, sv, pv)
        {
            return Ok(());
        }

        // While the restrictive pass is still running, leave everything else
        // unassigned: more push-constant candidates may be coming.
        if !exhaustive {
            return Ok(());
        }

        // The GLSL 440 floor guards the explicit offsets emitted on UBO
        // members. Highly dynamic values avoid the UBO when the backend can
        // update globals individually, since UBO writes must be re-synced
        // every frame.
        let try_ubo = !profile.caps.contains(GpuCaps::INPUT_VARIABLES) || !sv.dynamic;
        if try_ubo
            && profile.glsl.version >= 440
            && profile.limits.max_ubo_size > 0
            && self.try_ubo(profile, sv, pv)
        {
            return Ok(());
        }

        if profile.caps.contains(GpuCaps::INPUT_VARIABLES) {
            pv.binding = VarBinding::Global {
                index: self.globals.len(),
            };
            pv.layout = variable::host_layout(0, &sv.var);
            self.globals.push(sv.var.clone());
            return Ok(());
        }

        // The most likely way to get here is a backend without global input
        // variables whose UBO size limits are exhausted.
        log::error!(
            "Unable to place input variable '{}': possibly exhausted UBO size limits?",
            sv.var.name
        );
        Err(DispatchError::VariablePlacement {
            name: sv.var.name.clone(),
        })
    }

    fn try_push_constant(&mut self, profile: &GpuProfile, sv: &ShaderVar, pv: &mut PassVar) -> bool {
        let layout = variable::std430_layout(self.push_constants_size, &sv.var);
        let new_size = layout.offset + layout.size;
        if new_size > profile.limits.max_push_constant_size {
            return false;
        }
        self.push_constants_size = new_size;
        pv.layout = layout;
        pv.binding = VarBinding::PushConst;
        true
    }

    fn try_ubo(&mut self, profile: &GpuProfile, sv: &ShaderVar, pv: &mut PassVar) -> bool {
        let layout = variable::std140_layout(self.ubo_size, &sv.var);
        let new_size = layout.offset + layout.size;
        if new_size > profile.limits.max_ubo_size {
            return false;
        }
        self.ubo_size = new_size;
        pv.layout = layout;
        pv.binding = VarBinding::Ubo;
        self.ubo_vars.push(BufferVar {
            var: sv.var.clone(),
            layout,
        });
        true
    }
}

/// Runs both placement passes over the full variable list.
pub(crate) fn place_all(
    profile: &GpuProfile,
    variables: &[ShaderVar],
    pass_vars: &mut [PassVar],
) -> Result<Planner> {
    let mut planner = Planner::new();
    for (sv, pv) in variables.iter().zip(pass_vars.iter_mut()) {
        planner.place(profile, sv, pv, false)?;
    }
    for (sv, pv) in variables.iter().zip(pass_vars.iter_mut()) {
        planner.place(profile, sv, pv, true)?;
    }
    Ok(planner)
}

//! Compiled Pass State
//!
//! A [`Pass`] is one cached, executable unit: the executor's compiled pass
//! handle, the per-variable binding plan, the optional backing uniform
//! buffer, and the retained [`RunParams`] reused across dispatches.
//!
//! Failed builds are retained too: a pass whose `failed` flag is set stays in
//! the cache for the context's lifetime and is never rebuilt, so repeated
//! dispatches of a broken shader fail fast without re-emitting diagnostics.

use std::hash::{Hash, Hasher};

use crate::gpu::variable::VarLayout;
use crate::gpu::{BlendParams, Buffer, GpuPassId, RunParams, TextureFormat, VertexAttrib};

/// Binding mechanism assigned to one variable. The assignment is a one-way
/// state machine: `Unassigned` transitions to exactly one mechanism during a
/// successful build and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VarBinding {
    /// Not yet placed.
    Unassigned,
    /// Legacy global/input uniform, updated individually per dispatch.
    Global {
        /// Flat index into the pass's global variable array.
        index: usize,
    },
    /// Member of the pass's backing uniform buffer.
    Ubo,
    /// Member of the push-constant block.
    PushConst,
}

impl VarBinding {
    pub(crate) fn is_assigned(self) -> bool {
        !matches!(self, Self::Unassigned)
    }
}

/// Cached placement and update metadata for one declared variable.
#[derive(Debug, Clone)]
pub(crate) struct PassVar {
    /// Assigned binding mechanism.
    pub binding: VarBinding,
    /// Device-side layout under the assigned mechanism.
    pub layout: VarLayout,
    /// Byte snapshot of the most recently uploaded value; `None` before the
    /// first upload. Always byte-identical to what the GPU last saw.
    pub cached: Option<Vec<u8>>,
}

impl PassVar {
    pub(crate) fn new() -> Self {
        Self {
            binding: VarBinding::Unassigned,
            layout: VarLayout::default(),
            cached: None,
        }
    }
}

/// Full cache identity of a pass. Compute dispatches key on the signature
/// alone; raster dispatches additionally key on target format and structural
/// blend equality (`None` matches `None`, never a present blend).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PassKey {
    pub signature: u64,
    pub target_format: Option<TextureFormat>,
    pub blend: Option<BlendParams>,
}

/// One cached pass: compiled executor object, binding plan, retained run
/// state, and the sticky failure flag.
#[derive(Debug)]
pub(crate) struct Pass {
    pub key: PassKey,
    pub gpu_pass: Option<GpuPassId>,
    pub failed: bool,
    /// Parallel to the shader description's variable list.
    pub vars: Vec<PassVar>,
    /// Backing uniform buffer, when any variable landed in the UBO.
    pub ubo: Option<Buffer>,
    /// Retained, reused run parameters.
    pub run: RunParams,
    /// Placed vertex layout (raster only), for quad expansion.
    pub vertex_attribs: Vec<VertexAttrib>,
    /// Byte stride of one vertex (raster only).
    pub vertex_stride: usize,
}

impl Pass {
    pub(crate) fn new(key: PassKey, num_vars: usize) -> Self {
        Self {
            key,
            gpu_pass: None,
            failed: false,
            vars: (0..num_vars).map(|_| PassVar::new()).collect(),
            ubo: None,
            run: RunParams::default(),
            vertex_attribs: Vec::new(),
            vertex_stride: 0,
        }
    }
}

/// Computes a `u64` lookup hash of any `Hash`-able key using `FxHasher`.
#[inline]
#[must_use]
pub(crate) fn fx_hash_key<K: Hash>(key: &K) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

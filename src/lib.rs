#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::doc_markdown)]

//! Shader pass dispatch and GPU resource-binding cache.
//!
//! This crate is the dispatch core of the Lucent rendering engine: callers
//! assemble logical shaders through pooled [`ShaderBuilder`] handles and hand
//! them to a [`Dispatch`] context, which compiles them into executable GPU
//! passes exactly once, caches the result, and keeps per-pass binding state
//! (uniform payloads, descriptor objects, quad vertices) current on every
//! subsequent dispatch.
//!
//! The GPU itself sits behind the [`GpuExecutor`] trait; the crate never
//! talks to a device directly and generates plain GLSL tuned to the
//! executor's declared capability profile.

pub mod dispatch;
pub mod errors;
pub mod gpu;
pub mod shader;

pub use dispatch::Dispatch;
pub use errors::{DispatchError, GpuError, Result};
pub use gpu::variable::{ScalarType, Var, VarLayout};
pub use gpu::{
    BlendFactor, BlendParams, Buffer, DescAccess, DescObject, DescType, GlslProfile, GpuCaps,
    GpuExecutor, GpuLimits, GpuProfile, Rect2D, Texture, TextureFormat, TextureParams,
    VertexFormat,
};
pub use shader::{ShaderBuilder, ShaderDesc, ShaderSig, ShaderVar, ShaderVertexAttrib};

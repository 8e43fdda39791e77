//! Error Types
//!
//! This module defines the error types used throughout the dispatch core.
//!
//! # Overview
//!
//! The main error type [`DispatchError`] covers all failure modes including:
//! - Dispatch contract violations (bad targets, mismatched shader interfaces)
//! - Variable placement exhaustion during pass building
//! - Downstream object-creation failures reported by the GPU executor
//! - Permanently-memoized pass failures
//!
//! # Usage
//!
//! All public dispatch APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, DispatchError>`. A dispatch call either completes
//! or fails synchronously with a diagnosed reason; there is no partial or
//! retryable state.

use thiserror::Error;

/// Error reported by a [`GpuExecutor`](crate::gpu::GpuExecutor) when an
/// object-creation request is rejected.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct GpuError(pub String);

/// The main error type for the dispatch core.
///
/// Contract violations are recoverable: the shader handle is recycled into
/// the pool regardless of the outcome. Build failures
/// ([`VariablePlacement`](DispatchError::VariablePlacement),
/// [`PassCreation`](DispatchError::PassCreation),
/// [`UboCreation`](DispatchError::UboCreation)) mark the cached pass as
/// permanently failed; later dispatches with the same key short-circuit to
/// [`PassFailed`](DispatchError::PassFailed).
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    // ========================================================================
    // Contract Violations
    // ========================================================================
    /// The shader builder was marked failed before it reached dispatch.
    #[error("Trying to dispatch a failed shader")]
    ShaderFailed,

    /// Declared input/output kind does not match the requested dispatch kind.
    #[error("Trying to dispatch a shader with an incompatible input/output signature")]
    SignatureMismatch,

    /// Raster and emulated-compute targets must be renderable 2D textures.
    #[error("Dispatch target must be a renderable 2D texture")]
    InvalidTarget,

    /// Compute shaders can only target storable textures.
    #[error("Trying to dispatch a compute shader against a non-storable target texture")]
    TargetNotStorable,

    /// The shader declares a fixed output size that the target rect violates.
    #[error("Shader requires a {required_w}x{required_h} output, target rect is {actual_w}x{actual_h}")]
    OutputSizeMismatch {
        /// Output size declared by the shader.
        required_w: u32,
        /// Output size declared by the shader.
        required_h: u32,
        /// Size of the requested target rect.
        actual_w: u32,
        /// Size of the requested target rect.
        actual_h: u32,
    },

    /// A vertex attribute carries corner data shorter than its format.
    #[error("Vertex attribute '{name}' supplies less data than its format requires")]
    VertexDataTooShort {
        /// Name of the offending attribute.
        name: String,
    },

    /// `dispatch_compute` was called with a non-compute shader.
    #[error("Trying to dispatch a non-compute shader as a raw compute pass")]
    NonComputeShader,

    /// A targetless compute dispatch cannot consume vertex attributes.
    #[error("Trying to dispatch a targetless compute shader that uses vertex attributes")]
    ComputeWithVertexAttribs,

    // ========================================================================
    // Resource Exhaustion
    // ========================================================================
    /// No binding mechanism (push constants, UBO, global uniforms) accepted
    /// the named variable under the backend's capability tier.
    #[error("Unable to place input variable '{name}': no binding mechanism fits")]
    VariablePlacement {
        /// Name of the offending variable.
        name: String,
    },

    // ========================================================================
    // Downstream Object-Creation Failures
    // ========================================================================
    /// The executor rejected the uniform buffer backing the pass.
    #[error("Failed creating uniform buffer for dispatch: {0}")]
    UboCreation(#[source] GpuError),

    /// The executor rejected the compiled pass.
    #[error("Failed creating render pass for dispatch: {0}")]
    PassCreation(#[source] GpuError),

    // ========================================================================
    // Memoized Failures
    // ========================================================================
    /// The pass with this cache key failed to build earlier and is retained
    /// as permanently failed; it is never rebuilt or retried.
    #[error("Pass is cached as permanently failed")]
    PassFailed,
}

/// Alias for `Result<T, DispatchError>`.
pub type Result<T> = std::result::Result<T, DispatchError>;

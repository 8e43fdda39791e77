//! Shader Variable Shapes & Memory Layout Rules
//!
//! A shader variable is a scalar, vector, matrix, or array thereof, described
//! by its component type and dimensions. Three layout rules are implemented:
//!
//! | Rule | Used for |
//! |------|----------|
//! | [`host_layout`]   | packed CPU-side payloads and global uniform updates |
//! | [`std140_layout`] | uniform buffer members |
//! | [`std430_layout`] | push constant block members |
//!
//! Host and device layouts may diverge (vec3 padding, matrix column
//! alignment); [`copy_layout`] performs the row-wise translating copy between
//! them.

/// Scalar component type of a shader variable. All supported scalars are
/// 32-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// Signed integer.
    Sint,
    /// Unsigned integer.
    Uint,
    /// Single-precision float.
    Float,
}

impl ScalarType {
    /// Size in bytes of one scalar element.
    pub const SIZE: usize = 4;

    /// GLSL name of the scalar type.
    #[must_use]
    pub fn glsl_name(self) -> &'static str {
        match self {
            Self::Sint => "int",
            Self::Uint => "uint",
            Self::Float => "float",
        }
    }
}

/// Shape of a declared shader variable.
///
/// `dim_v` is the number of vector components (rows), `dim_m` the number of
/// matrix columns, `dim_a` the array length. A plain `vec4` is
/// `(dim_v: 4, dim_m: 1, dim_a: 1)`; a `mat4` is `(4, 4, 1)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Var {
    /// Variable name as it appears in generated source.
    pub name: String,
    /// Component type.
    pub ty: ScalarType,
    /// Vector components per column.
    pub dim_v: u8,
    /// Matrix columns.
    pub dim_m: u8,
    /// Array elements.
    pub dim_a: u32,
}

impl Var {
    /// A scalar `float`.
    #[must_use]
    pub fn float(name: &str) -> Self {
        Self::new(name, ScalarType::Float, 1, 1)
    }

    /// A `vec2`.
    #[must_use]
    pub fn vec2(name: &str) -> Self {
        Self::new(name, ScalarType::Float, 2, 1)
    }

    /// A `vec3`.
    #[must_use]
    pub fn vec3(name: &str) -> Self {
        Self::new(name, ScalarType::Float, 3, 1)
    }

    /// A `vec4`.
    #[must_use]
    pub fn vec4(name: &str) -> Self {
        Self::new(name, ScalarType::Float, 4, 1)
    }

    /// An `ivec2`.
    #[must_use]
    pub fn ivec2(name: &str) -> Self {
        Self::new(name, ScalarType::Sint, 2, 1)
    }

    /// A `mat2`.
    #[must_use]
    pub fn mat2(name: &str) -> Self {
        Self::new(name, ScalarType::Float, 2, 2)
    }

    /// A `mat4`.
    #[must_use]
    pub fn mat4(name: &str) -> Self {
        Self::new(name, ScalarType::Float, 4, 4)
    }

    #[must_use]
    fn new(name: &str, ty: ScalarType, dim_v: u8, dim_m: u8) -> Self {
        Self {
            name: name.to_string(),
            ty,
            dim_v,
            dim_m,
            dim_a: 1,
        }
    }

    /// Turns this shape into an array of `len` elements.
    #[must_use]
    pub fn array(mut self, len: u32) -> Self {
        self.dim_a = len;
        self
    }

    /// Whether this is a plain scalar or vector (not a matrix, not an array).
    #[must_use]
    pub fn is_scalar_or_vector(&self) -> bool {
        self.dim_m == 1 && self.dim_a == 1
    }

    /// GLSL type name for one (non-array) element of this variable.
    #[must_use]
    pub fn glsl_type_name(&self) -> String {
        match (self.ty, self.dim_v, self.dim_m) {
            (ty, 1, 1) => ty.glsl_name().to_string(),
            (ScalarType::Float, v, 1) => format!("vec{v}"),
            (ScalarType::Sint, v, 1) => format!("ivec{v}"),
            (ScalarType::Uint, v, 1) => format!("uvec{v}"),
            (ScalarType::Float, v, m) if v == m => format!("mat{v}"),
            (ScalarType::Float, v, m) => format!("mat{m}x{v}"),
            // Integer matrices do not exist in GLSL; shapes are
            // builder-supplied so this is a structural error upstream.
            (ty, v, m) => format!("{}mat{m}x{v}", ty.glsl_name()),
        }
    }
}

/// Resolved memory layout of one variable: byte offset of the whole value,
/// stride between consecutive columns/elements, and total size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VarLayout {
    /// Byte offset of the variable within its enclosing block.
    pub offset: usize,
    /// Byte stride between consecutive columns / array elements.
    pub stride: usize,
    /// Total byte size from `offset`.
    pub size: usize,
}

#[inline]
#[must_use]
fn align_to(x: usize, align: usize) -> usize {
    x.div_ceil(align) * align
}

/// Packed host-side layout: no padding, columns tightly strided.
#[must_use]
pub fn host_layout(offset: usize, var: &Var) -> VarLayout {
    let stride = ScalarType::SIZE * usize::from(var.dim_v);
    VarLayout {
        offset,
        stride,
        size: stride * usize::from(var.dim_m) * var.dim_a as usize,
    }
}

/// Shared GLSL buffer layout rule: vectors align to their power-of-two size
/// (vec3 aligns like vec4); matrices and arrays stride column-by-column with
/// at least `min_vec_align` alignment.
#[must_use]
fn buffer_layout(offset: usize, var: &Var, min_vec_align: usize) -> VarLayout {
    let vec_size = ScalarType::SIZE * usize::from(var.dim_v);
    let mut align = ScalarType::SIZE * usize::from(var.dim_v).next_power_of_two();
    let mut stride = vec_size;

    if var.dim_m > 1 || var.dim_a > 1 {
        align = align.max(min_vec_align);
        stride = align_to(vec_size, align);
    }

    let elems = usize::from(var.dim_m) * var.dim_a as usize;
    VarLayout {
        offset: align_to(offset, align),
        stride,
        size: stride * (elems - 1) + vec_size,
    }
}

/// GLSL std140 layout (uniform blocks): matrix/array strides round up to
/// vec4 boundaries.
#[must_use]
pub fn std140_layout(offset: usize, var: &Var) -> VarLayout {
    buffer_layout(offset, var, 4 * ScalarType::SIZE)
}

/// GLSL std430 layout (push constants, storage blocks): natural vector
/// alignment, no vec4 rounding.
#[must_use]
pub fn std430_layout(offset: usize, var: &Var) -> VarLayout {
    buffer_layout(offset, var, ScalarType::SIZE)
}

/// Copies a variable's payload from `src` (laid out per `src_layout`, offset
/// already applied by the caller, i.e. `src` starts at the first column) into
/// `dst` at `dst_layout.offset`, translating between the two strides row by
/// row.
pub fn copy_layout(dst: &mut [u8], dst_layout: VarLayout, src: &[u8], src_layout: VarLayout) {
    let row = src_layout.stride;
    let mut src_off = 0;
    let mut dst_off = dst_layout.offset;
    while src_off < src_layout.size {
        dst[dst_off..dst_off + row].copy_from_slice(&src[src_off..src_off + row]);
        src_off += row;
        dst_off += dst_layout.stride;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_layout_is_packed() {
        let l = host_layout(0, &Var::vec3("v"));
        assert_eq!(l, VarLayout { offset: 0, stride: 12, size: 12 });

        let l = host_layout(0, &Var::mat4("m"));
        assert_eq!(l, VarLayout { offset: 0, stride: 16, size: 64 });
    }

    #[test]
    fn std430_scalar_packs_tightly() {
        let l = std430_layout(5, &Var::float("x"));
        assert_eq!(l.offset, 8, "scalar aligns to 4");
        assert_eq!(l.size, 4);
    }

    #[test]
    fn std430_vec3_aligns_like_vec4() {
        let l = std430_layout(4, &Var::vec3("v"));
        assert_eq!(l.offset, 16);
        assert_eq!(l.size, 12, "trailing padding is not part of the size");
    }

    #[test]
    fn std140_float_array_strides_by_vec4() {
        let l = std140_layout(0, &Var::float("a").array(3));
        assert_eq!(l.stride, 16);
        assert_eq!(l.size, 16 * 2 + 4);
    }

    #[test]
    fn std430_float_array_strides_naturally() {
        let l = std430_layout(0, &Var::float("a").array(3));
        assert_eq!(l.stride, 4);
        assert_eq!(l.size, 12);
    }

    #[test]
    fn mat4_occupies_64_bytes_in_both_buffer_rules() {
        assert_eq!(std140_layout(0, &Var::mat4("m")).size, 64);
        assert_eq!(std430_layout(0, &Var::mat4("m")).size, 64);
    }

    #[test]
    fn copy_layout_scatters_between_strides() {
        // two vec3 columns, host-packed (stride 12) -> device (stride 16)
        let var = Var::vec3("m").array(2);
        let host = host_layout(0, &var);
        let device = std430_layout(0, &var);

        let src: Vec<u8> = (0u8..24).collect();
        let mut dst = vec![0u8; 32];
        copy_layout(&mut dst, device, &src, host);

        assert_eq!(&dst[0..12], &src[0..12]);
        assert_eq!(&dst[12..16], &[0, 0, 0, 0], "padding untouched");
        assert_eq!(&dst[16..28], &src[12..24]);
    }

    #[test]
    fn glsl_type_names() {
        assert_eq!(Var::float("x").glsl_type_name(), "float");
        assert_eq!(Var::vec2("x").glsl_type_name(), "vec2");
        assert_eq!(Var::ivec2("x").glsl_type_name(), "ivec2");
        assert_eq!(Var::mat4("x").glsl_type_name(), "mat4");
        let m2x4 = Var {
            name: "x".into(),
            ty: ScalarType::Float,
            dim_v: 4,
            dim_m: 2,
            dim_a: 1,
        };
        assert_eq!(m2x4.glsl_type_name(), "mat2x4");
    }
}

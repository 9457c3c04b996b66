//! Element types, combine operators and the in-place combine primitive
//! shared by both allreduce engines.

use crate::types::ReduceOp;
use std::sync::Arc;

/// A caller-supplied combine function.
///
/// Must be commutative and associative: the engines combine partial results
/// in an order that depends on the topology, not on rank order.
pub type Combiner<T> = Arc<dyn Fn(T, T) -> T + Send + Sync>;

/// Vector element that can travel in a `StepMessage`.
///
/// Elements are packed little-endian with a fixed width so that a payload's
/// byte length alone determines its element count.
pub trait Element: Copy + Send + Sync + std::fmt::Debug + 'static {
    /// Packed width in bytes.
    const SIZE: usize;

    /// Read one element from exactly `SIZE` bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Write this element into exactly `SIZE` bytes.
    fn write_le(self, bytes: &mut [u8]);

    /// Apply a built-in reduction to two elements.
    fn reduce(a: Self, b: Self, op: ReduceOp) -> Self;
}

macro_rules! impl_element {
    (int: $($ty:ty),*) => {
        $(
            impl Element for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    Self::from_le_bytes(bytes.try_into().expect("slice length matches type size"))
                }

                #[inline]
                fn write_le(self, bytes: &mut [u8]) {
                    bytes.copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => a.wrapping_add(b),
                        ReduceOp::Prod => a.wrapping_mul(b),
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                    }
                }
            }
        )*
    };
    (float: $($ty:ty),*) => {
        $(
            impl Element for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    Self::from_le_bytes(bytes.try_into().expect("slice length matches type size"))
                }

                #[inline]
                fn write_le(self, bytes: &mut [u8]) {
                    bytes.copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => a + b,
                        ReduceOp::Prod => a * b,
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                    }
                }
            }
        )*
    };
}

impl_element!(int: i8, i32, i64, u8, u32, u64);
impl_element!(float: f32, f64);

impl ReduceOp {
    /// The combine function for this operation over `T`.
    pub fn combiner<T: Element>(self) -> Combiner<T> {
        Arc::new(move |a, b| T::reduce(a, b, self))
    }
}

/// Wrap a closure as a `Combiner`.
pub fn combiner_fn<T, F>(f: F) -> Combiner<T>
where
    F: Fn(T, T) -> T + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Element-wise `dst[i] = combine(dst[i], src[i])`.
///
/// Callers check lengths against the protocol before getting here, so a
/// mismatch is a bug in the engine, not bad input.
pub(crate) fn combine_into<T: Copy>(dst: &mut [T], src: &[T], combine: &Combiner<T>) {
    assert_eq!(
        dst.len(),
        src.len(),
        "combine_into: slice length mismatch"
    );
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = combine(*d, s);
    }
}

//! Truthiness for lazy conditionals.

use crate::value::Value;

/// Types that can steer [`lazy_if`](crate::lazy_if) and
/// [`lazy_iff`](crate::lazy_iff).
///
/// Zero, NaN, the empty string, `None` and `false` are falsy; everything
/// else is truthy.
pub trait Truthy {
    fn is_truthy(&self) -> bool;
}

impl Truthy for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

macro_rules! impl_truthy_int {
    ($($t:ty),*) => {
        $(
            impl Truthy for $t {
                fn is_truthy(&self) -> bool {
                    *self != 0
                }
            }
        )*
    };
}

impl_truthy_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl Truthy for f32 {
    fn is_truthy(&self) -> bool {
        *self != 0.0 && !self.is_nan()
    }
}

impl Truthy for f64 {
    fn is_truthy(&self) -> bool {
        *self != 0.0 && !self.is_nan()
    }
}

impl Truthy for String {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for &str {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl<T: Truthy> Truthy for Option<T> {
    fn is_truthy(&self) -> bool {
        self.as_ref().is_some_and(|v| v.is_truthy())
    }
}

impl Truthy for Value {
    fn is_truthy(&self) -> bool {
        self.to_bool()
    }
}

use std::fmt;

macro_rules! cat_lines {
    ($s:expr) => { concat!($s, "\n") };
    ($s:expr, $($ss:expr),*) => { concat!($s, "\n", cat_lines!($($ss),*)) };
}

macro_rules! write_lines {
    ($dst:expr, $($fmt_strs:expr),*; $($args:tt)*) => {
        write!($dst, cat_lines!($($fmt_strs),*), $($args)*)
    };
}

pub struct FnFmt<F: Fn(&mut fmt::Formatter) -> fmt::Result>(pub F);

impl<F> fmt::Display for FnFmt<F>
where F: Fn(&mut fmt::Formatter) -> fmt::Result {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (&self.0)(f)
    }
}

/// Three floats as a `( x y z )` group, fixed six decimals, the way the
/// engine's loaders tokenize them.
pub struct Triple(pub f64, pub f64, pub f64);

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "( {:.6} {:.6} {:.6} )", self.0, self.1, self.2)
    }
}

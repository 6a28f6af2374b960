//! Kernel tracing.
//!
//! `kdbg!` is a printf-style trace point. Hosted builds forward to
//! standard error; freestanding builds compile the call away, so trace
//! points cost nothing in the kernel proper.

cfg_if::cfg_if! {
    if #[cfg(any(test, feature = "std"))] {
        macro_rules! kdbg {
            ($($arg:tt)*) => {
                if ::std::env::var_os("WREN_DEBUG").is_some() {
                    ::std::eprintln!($($arg)*);
                }
            };
        }
    } else {
        macro_rules! kdbg {
            ($($arg:tt)*) => {
                // Traces are compiled out without a console.
                {}
            };
        }
    }
}

//! Logging shims.
//!
//! The crate can log through `defmt`, `log` or `esp-println`, selected by
//! feature. With none of them enabled the macros expand to nothing but still
//! borrow their arguments, so call sites compile the same way everywhere.
//!
//! Arguments are kept to strings and integers so every backend accepts them.
#![macro_use]
#![allow(unused_macros)]

macro_rules! log_with {
    ($defmt:ident, $log:ident, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::$defmt!($s $(, $x)*);
            #[cfg(all(feature = "log", not(feature = "defmt")))]
            ::log::$log!($s $(, $x)*);
            #[cfg(all(feature = "esp32-log", not(any(feature = "defmt", feature = "log"))))]
            ::esp_println::println!($s $(, $x)*);
            #[cfg(not(any(feature = "defmt", feature = "log", feature = "esp32-log")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        log_with!(trace, trace, $s $(, $x)*)
    };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        log_with!(debug, debug, $s $(, $x)*)
    };
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {
        log_with!(info, info, $s $(, $x)*)
    };
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        log_with!(warn, warn, $s $(, $x)*)
    };
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {
        log_with!(error, error, $s $(, $x)*)
    };
}

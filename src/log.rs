// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

//! Logging shims.
//!
//! With the `defmt` feature the macros forward to defmt, host unit tests print to stdout, and
//! everything else compiles to nothing.

#![allow(unused_macros)]

macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(all(feature = "defmt", not(test)))]
        ::defmt::error!($($arg)*);

        #[cfg(test)]
        std::eprintln!("[ERROR] {}", core::format_args!($($arg)*));

        #[cfg(not(any(feature = "defmt", test)))]
        let _ = core::format_args!($($arg)*);
    }};
}

macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(all(feature = "defmt", not(test)))]
        ::defmt::warn!($($arg)*);

        #[cfg(test)]
        std::println!("[WARN] {}", core::format_args!($($arg)*));

        #[cfg(not(any(feature = "defmt", test)))]
        let _ = core::format_args!($($arg)*);
    }};
}

macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(all(feature = "defmt", not(test)))]
        ::defmt::info!($($arg)*);

        #[cfg(test)]
        std::println!("[INFO] {}", core::format_args!($($arg)*));

        #[cfg(not(any(feature = "defmt", test)))]
        let _ = core::format_args!($($arg)*);
    }};
}

macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(all(feature = "defmt", not(test)))]
        ::defmt::debug!($($arg)*);

        #[cfg(test)]
        std::println!("[DEBUG] {}", core::format_args!($($arg)*));

        #[cfg(not(any(feature = "defmt", test)))]
        let _ = core::format_args!($($arg)*);
    }};
}

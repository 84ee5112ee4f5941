//! Build script for PRIOS

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

/// Entry point to the build script
///
/// Arm targets get their `arm_abi` / `arm_architecture` cfgs from
/// `arm-targets`. Everything else builds the hosted port, which needs none of
/// them, so we only declare the names.
fn main() {
    if std::env::var("CARGO_CFG_TARGET_ARCH").as_deref() == Ok("arm") {
        arm_targets::process();
    } else {
        println!("cargo::rustc-check-cfg=cfg(arm_abi, values(any()))");
        println!("cargo::rustc-check-cfg=cfg(arm_architecture, values(any()))");
    }
}

// End of File

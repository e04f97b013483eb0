/*
 * Copyright © 2025, United States Government, as represented by the Administrator of
 * the National Aeronautics and Space Administration. All rights reserved.
 *
 * The “ODIN” software is licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License. You may obtain a copy
 * of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

//! available memory queries for the loader and tile budgets

use sysinfo::System;
use tracing::{debug,warn};
use crate::{DamageConfig, config::GIB};

/// what we assume if the system can't tell us
pub const FALLBACK_AVAILABLE_MEMORY: u64 = 8 * GIB;

/// bytes of memory that can be used without swapping, if the OS reports it
pub fn system_available_memory ()->Option<u64> {
    let mut sys = System::new();
    sys.refresh_memory();
    match sys.available_memory() {
        0 => None, // not supported on this platform
        bytes => Some(bytes)
    }
}

/// the configured override, the system value or our fallback (in this order)
pub fn available_memory (config: &DamageConfig)->u64 {
    if let Some(bytes) = config.available_memory_bytes {
        return bytes
    }

    match system_available_memory() {
        Some(bytes) => {
            debug!("available memory: {} MiB", bytes / (1024*1024));
            bytes
        }
        None => {
            warn!("cannot determine available memory, assuming {} GiB", FALLBACK_AVAILABLE_MEMORY / GIB);
            FALLBACK_AVAILABLE_MEMORY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_memory () {
        let bytes = system_available_memory();
        println!("available memory: {:?}", bytes);
        if let Some(bytes) = bytes {
            assert!( bytes > 0);
            let config = DamageConfig::default();
            assert!( config.available_memory_bytes.is_none());
            // the system value is volatile, but it is what the budget uses without an override
            assert!( available_memory( &config) > 0);
        }
    }

    #[test]
    fn test_override () {
        let config = DamageConfig { available_memory_bytes: Some(42), ..DamageConfig::default() };
        assert_eq!( available_memory( &config), 42);
    }
}

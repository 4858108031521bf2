use std::env;
use std::ffi::OsString;

use tracing::{info, warn};

pub const DISABLE_VAR: &str = "TALLY_DISABLE_SANDBOX";

/// Hardening is on when the config asks for it, unless the override variable
/// is set to something other than `0`.
pub fn enabled(config: bool) -> bool {
    enabled_with(config, env::var_os(DISABLE_VAR))
}

fn enabled_with(config: bool, disable: Option<OsString>) -> bool {
    if disable.is_some_and(|v| v != "0") {
        info!("{DISABLE_VAR} is set, skipping process hardening");
        return false;
    }
    config
}

/// Keeps this process and anything it executes from gaining privileges.
#[cfg(target_os = "linux")]
pub fn restrict() {
    let one: libc::c_ulong = 1;
    let zero: libc::c_ulong = 0;
    let rc = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, one, zero, zero, zero) };
    if rc == 0 {
        info!("Set no_new_privs");
    } else {
        warn!("Failed to set no_new_privs: {}", std::io::Error::last_os_error());
    }
}

#[cfg(not(target_os = "linux"))]
pub fn restrict() {
    info!("Process hardening is not available on this platform");
}

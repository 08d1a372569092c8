//! Common utilities shared by the CLI and the plan executor

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Hostname of the machine running the harness, without any domain part
#[cfg(unix)]
pub fn local_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    short_hostname(&String::from_utf8_lossy(&buf[..len]))
}

#[cfg(not(unix))]
pub fn local_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME")
        .ok()
        .and_then(|name| short_hostname(&name))
}

/// Strip everything from the first dot: `ncn-m002.cmn.example.com` -> `ncn-m002`
pub fn short_hostname(name: &str) -> Option<String> {
    let short = name.trim().split('.').next().unwrap_or_default();
    if short.is_empty() {
        None
    } else {
        Some(short.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hostname() {
        assert_eq!(short_hostname("ncn-m002.cmn.example.com").as_deref(), Some("ncn-m002"));
        assert_eq!(short_hostname("uan01").as_deref(), Some("uan01"));
        assert_eq!(short_hostname("  \n"), None);
        assert_eq!(short_hostname(".example.com"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_local_hostname_has_no_domain() {
        if let Some(name) = local_hostname() {
            assert!(!name.contains('.'));
        }
    }
}

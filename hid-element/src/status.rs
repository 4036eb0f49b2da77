//! Transport status codes
//!
//! Raw values follow the IOKit return-code layout: system `0x38`, subsystem
//! `0`, giving `0xE0000001` for `Invalid` and the `0xE00002xx` family for
//! the rest. Codes without a named variant are kept
//! in [`Status::Other`] so a translation never fails.

use std::fmt;

use serde::Serialize;

/// Common-error base for IOKit style return codes
const ERR_BASE: u32 = 0xE000_0000;

macro_rules! status_codes {
    {
        $($name:ident = [$raw:expr, $label:literal],)*
    } => {
        /// Status reported by a transport operation
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum Status {
            $($name,)*
            /// Transport-specific code with no named variant
            Other(u32),
        }

        impl Status {
            /// Every named status, in raw-code order after `Success`
            pub const NAMED: &'static [Status] = &[$(Status::$name,)*];

            /// Map a raw code to a status. Total: unknown codes become `Other`.
            pub const fn from_raw(raw: u32) -> Self {
                $(
                    if raw == $raw {
                        return Status::$name;
                    }
                )*
                Status::Other(raw)
            }

            /// Raw wire code
            pub const fn raw(self) -> u32 {
                match self {
                    $(Status::$name => $raw,)*
                    Status::Other(raw) => raw,
                }
            }

            /// Short human readable name
            pub fn name(&self) -> &'static str {
                match self {
                    $(Status::$name => $label,)*
                    Status::Other(_) => "unknown",
                }
            }
        }
    };
}

status_codes! {
    Success = [0, "success"],
    Invalid = [ERR_BASE | 0x001, "invalid"],
    Error = [ERR_BASE | 0x2BC, "general error"],
    NoMemory = [ERR_BASE | 0x2BD, "no memory"],
    NoResources = [ERR_BASE | 0x2BE, "no resources"],
    NoDevice = [ERR_BASE | 0x2C0, "no device"],
    NotPrivileged = [ERR_BASE | 0x2C1, "not privileged"],
    BadArgument = [ERR_BASE | 0x2C2, "bad argument"],
    ExclusiveAccess = [ERR_BASE | 0x2C5, "exclusive access"],
    Unsupported = [ERR_BASE | 0x2C7, "unsupported"],
    IoError = [ERR_BASE | 0x2CA, "I/O error"],
    NotOpen = [ERR_BASE | 0x2CD, "not open"],
    Busy = [ERR_BASE | 0x2D5, "busy"],
    Timeout = [ERR_BASE | 0x2D6, "timeout"],
    Offline = [ERR_BASE | 0x2D7, "offline"],
    NotReady = [ERR_BASE | 0x2D8, "not ready"],
    NotAttached = [ERR_BASE | 0x2D9, "not attached"],
    NotPermitted = [ERR_BASE | 0x2E2, "not permitted"],
    DeviceError = [ERR_BASE | 0x2E9, "device error"],
    Aborted = [ERR_BASE | 0x2EB, "aborted"],
    NotResponding = [ERR_BASE | 0x2ED, "not responding"],
    NotFound = [ERR_BASE | 0x2F0, "not found"],
}

impl Status {
    /// Whether this is the success code
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }

    /// `Ok(())` for success, `Err(self)` otherwise
    pub fn into_result(self) -> Result<(), Status> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Success
    }
}

impl From<u32> for Status {
    fn from(raw: u32) -> Self {
        Status::from_raw(raw)
    }
}

impl From<Status> for u32 {
    fn from(status: Status) -> Self {
        status.raw()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(Status::from_raw(0), Status::Success);
        assert_eq!(Status::from_raw(0xE000_02D6), Status::Timeout);
        assert_eq!(Status::from_raw(0xE000_02D5), Status::Busy);
        assert_eq!(Status::from_raw(0xE000_02BE), Status::NoResources);
        assert_eq!(Status::Timeout.raw(), 0xE000_02D6);
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let status = Status::from_raw(0xE000_4001);
        assert_eq!(status, Status::Other(0xE000_4001));
        assert_eq!(status.raw(), 0xE000_4001);
        assert_eq!(status.name(), "unknown");
    }

    #[test]
    fn test_named_codes_are_distinct_and_total() {
        for (i, a) in Status::NAMED.iter().enumerate() {
            assert_eq!(Status::from_raw(a.raw()), *a);
            for b in &Status::NAMED[i + 1..] {
                assert_ne!(a.raw(), b.raw(), "{a:?} and {b:?} share a code");
            }
        }
    }

    #[test]
    fn test_invalid_uses_common_error_base() {
        assert_eq!(Status::Invalid.raw(), 0xE000_0001);
        assert_eq!(Status::from_raw(0xE000_0001), Status::Invalid);
        assert_eq!(Status::from_raw(1), Status::Other(1));
    }

    #[test]
    fn test_named_codes_are_in_raw_order() {
        assert_eq!(Status::NAMED[0], Status::Success);
        for pair in Status::NAMED[1..].windows(2) {
            assert!(pair[0].raw() < pair[1].raw(), "{:?} before {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_into_result() {
        assert_eq!(Status::Success.into_result(), Ok(()));
        assert_eq!(Status::NotReady.into_result(), Err(Status::NotReady));
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::Timeout.to_string(), "timeout (0xE00002D6)");
    }
}

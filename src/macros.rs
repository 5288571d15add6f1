#![allow(unused_macros)]

macro_rules! trace {
    ($($t:tt)*) => {
        log!(trace, $($t)*)
    }
}

macro_rules! debug {
    ($($t:tt)*) => {
        log!(debug, $($t)*)
    }
}

macro_rules! info {
    ($($t:tt)*) => {
        log!(info, $($t)*)
    }
}

macro_rules! warn {
    ($($t:tt)*) => {
        log!(warn, $($t)*)
    }
}

macro_rules! error {
    ($($t:tt)*) => {
        log!(error, $($t)*)
    }
}

macro_rules! log {
    ($level: ident, $($t:tt)*) => {
        #[cfg(feature = "tracing")]
        { tracing::$level!($($t)*) }
        #[cfg(all(feature = "log", not(feature = "tracing")))]
        { ::log::$level!($($t)*) }
        // Silence unused variables warnings without moving the arguments.
        #[cfg(not(any(feature = "tracing", feature = "log")))]
        { if false { let _ = format_args!($($t)*); } }
    }
}

/// Log a protocol failure and return it from the enclosing function.
macro_rules! fps_bail {
    ($status:expr, $($t:tt)*) => {{
        let message = format!($($t)*);
        error!("[{}] {}", $status, &message);
        return Err($crate::error::Error::Fps { status: $status, message });
    }};
}

/// Return `$status` unless `$cond` holds.
macro_rules! fps_ensure {
    ($cond:expr, $status:expr, $($t:tt)*) => {
        if !($cond) {
            fps_bail!($status, $($t)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::error::{Error, Status};

    #[test]
    fn logging_borrows_its_arguments() {
        let err = Error::Fps {
            status: Status::ParamErr,
            message: "bad".to_string(),
        };
        debug!("Operation {} failed: {}", 1, err);
        warn!("{}", err);
        assert_eq!(err.status(), Status::ParamErr);
    }

    fn bail_with(value: u32) -> crate::error::Result<u32> {
        fps_ensure!(value < 10, Status::ParamErr, "value {} too large", value);
        Ok(value)
    }

    #[test]
    fn ensure_returns_status() {
        assert_eq!(bail_with(3).ok(), Some(3));
        assert_eq!(
            bail_with(12).expect_err("too large").status(),
            Status::ParamErr
        );
    }
}

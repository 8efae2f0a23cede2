//! Macros for rebuild error handling.

/// Creates a [`crate::error::RebuildError`] from error kind and description.
///
/// Accepts optional dynamic detail (use `detail =` to move an owned [`String`]) and an optional
/// source error.
#[macro_export]
macro_rules! rebuild_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::RebuildError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::RebuildError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        $crate::error::RebuildError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr, source: $source:expr) => {
        $crate::error::RebuildError::from(($kind, $desc, $detail)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::RebuildError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::RebuildError::from(($kind, $desc, $detail.to_string()))
            .with_source($source)
    };
}

/// Creates and returns a [`crate::error::RebuildError`] from the current function.
///
/// Supports the same optional detail and source arguments as [`rebuild_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::rebuild_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::rebuild_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        return ::core::result::Result::Err($crate::rebuild_error!($kind, $desc, detail = $detail))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::rebuild_error!(
            $kind,
            $desc,
            detail = $detail,
            source: $source
        ))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::rebuild_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::rebuild_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}

//! Broader coverage of the io::Error → PrxErrorKind mapping table than the
//! couple of cases exercised beside the code, plus the group/source
//! plumbing callers actually rely on.

use std::io;

use prx_error::{ErrorGroup, PrxError, PrxErrorKind};

#[test]
fn every_group_has_at_least_one_reachable_kind() {
    let samples = [
        (io::ErrorKind::WouldBlock, ErrorGroup::Transient),
        (io::ErrorKind::TimedOut, ErrorGroup::Transient),
        (io::ErrorKind::ConnectionRefused, ErrorGroup::Connectivity),
        (io::ErrorKind::NotConnected, ErrorGroup::Connectivity),
        (io::ErrorKind::InvalidInput, ErrorGroup::Argument),
        (io::ErrorKind::AlreadyExists, ErrorGroup::Argument),
        (io::ErrorKind::OutOfMemory, ErrorGroup::Resource),
    ];

    for (io_kind, expected_group) in samples {
        let err = PrxError::from_io(&io::Error::from(io_kind));
        assert_eq!(err.group(), expected_group, "{io_kind:?} mapped to the wrong group");
    }
}

#[test]
fn with_source_preserves_kind_and_chains_the_cause() {
    let cause = io::Error::new(io::ErrorKind::Other, "underlying socket fault");
    let err = PrxError::with_source(PrxErrorKind::Fatal, cause);
    assert_eq!(err.kind(), PrxErrorKind::Fatal);
    assert!(!err.is_retryable());
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn from_impl_matches_explicit_from_io() {
    let io_err = io::Error::from(io::ErrorKind::ConnectionReset);
    let via_from: PrxError = io::Error::from(io::ErrorKind::ConnectionReset).into();
    let via_explicit = PrxError::from_io(&io_err);
    assert_eq!(via_from.kind(), via_explicit.kind());
}

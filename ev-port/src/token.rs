/// Identifies one registration with a [`crate::sys::Selector`]. Distinct
/// from `rt-support::HandleMap`'s 32-bit handles: this token never crosses
/// the port boundary, it only threads registrations through the selector's
/// readiness list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub usize);

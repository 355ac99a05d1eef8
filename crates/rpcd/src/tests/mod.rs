//! Test suites for the rpcd daemon.

mod socket_behaviour;
pub(crate) mod support;

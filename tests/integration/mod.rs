//! Integration tests for cmdtree, exercising the public library API and the
//! `cmdtree` binary.

pub mod binding_test;
pub mod cli_test;
pub mod dispatch_test;
pub mod registry_test;
pub mod session_test;

//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one stage (or the
//! whole pipeline) against the scriptable fakes in `mock_io`.  All tests
//! run on the host with no radio, flash or network.

mod mock_io;
mod orchestrator_tests;
mod registration_tests;
mod rig;
mod session_tests;

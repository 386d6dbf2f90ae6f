//! Application core - pure domain logic, zero I/O.
//!
//! The lifecycle controller and its phase handlers.  All interaction with
//! hardware happens through **port traits** defined in [`ports`], keeping
//! this layer fully testable without real peripherals.

pub mod controller;
pub mod events;
pub mod ports;

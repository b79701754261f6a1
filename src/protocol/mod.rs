//! High-level components of the J1939-21 engine: the data-link layer
//! (arbitration, sessions, pipelines) and the CAN transport primitives.
pub mod datalink;
pub mod transport;

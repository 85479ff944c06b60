pub mod stdio;
pub mod tcp;
pub mod transport;

pub mod chess;
pub mod nn;
pub mod search;
pub mod uci;

/// Cache-line alignment for the accumulator and hash-ring buffers; 64
/// bytes covers 256- and 512-bit vector lanes.
#[repr(C, align(64))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Align64<T>(pub T);

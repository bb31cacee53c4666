// Primitive number types that can back a receive buffer.
pub trait Align1: bytemuck::Pod {}

impl Align1 for u32 {}

// Receive buffers whose items are at least 4 bytes aligned, so `f32`
// tensors can be cast in place out of them.
pub trait Align4: Align1 {}

impl Align4 for u32 {}

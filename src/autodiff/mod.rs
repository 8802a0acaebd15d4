pub mod jvp;
pub mod primitive;

pub use jvp::{jvp, Dual};
pub use primitive::{install, registry, Primitive, PrimitiveTable};

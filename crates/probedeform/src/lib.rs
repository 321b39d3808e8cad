#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use probedeform_dcn as dcn;

#[doc(inline)]
pub use probedeform_core as deform;

#[doc(inline)]
pub use probedeform_io as io;

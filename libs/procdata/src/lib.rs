//! Process-data addressing and storage
//!
//! - [`Address`] / [`Area`]: one logical I/O point and its validation
//! - [`ProcessImage`]: validated typed accessors over any byte-region image
//! - [`ProcessData`] / [`ProcessDataView`]: owned and borrowed images
//! - [`Container`] / [`Access`]: owner and borrowed lock handles

pub mod access;
pub mod address;
pub mod area;
pub mod codec;
pub mod image;
pub mod store;
pub mod value;

pub use access::{Access, AccessGuard, Container};
pub use address::{Address, MAX_BIT};
pub use area::Area;
pub use image::ProcessImage;
pub use store::{ProcessData, ProcessDataView, DEFAULT_AREA_SIZE};
pub use value::{DataType, Value};

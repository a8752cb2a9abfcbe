pub mod image_io;
pub mod params;
pub mod ser;
pub mod ser_writer;
pub mod source;
pub mod stack_writer;
pub mod tiff_stack;

pub mod conversions;

pub use conversions::ConversionError;

pub mod config;
pub mod image;
pub mod session;
pub mod source;

// Re-export commonly used types
pub use config::FrameConfig;
pub use image::{DecodeError, Decoder, EncodedImage, FramedImage, FramingParameters, ImageFormat};
pub use session::{FrameInfo, Session, SessionError, SourceInfo};
pub use source::{MediaType, SourceImage};

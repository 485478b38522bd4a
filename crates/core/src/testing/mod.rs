//! Testing utilities and mock implementations.
//!
//! This module provides a scriptable converter and small fixtures so the job
//! executor and the HTTP layer can be exercised without external engines.
//!
//! # Example
//!
//! ```rust,ignore
//! use convertino_core::testing::{fixtures, MockBehavior, MockConverter};
//!
//! let converter = MockConverter::new(Operation::Base64Encode)
//!     .with_behavior(MockBehavior::WriteNothing);
//! executor.stage(&mut job, "in.txt", fixtures::payload(b"hello")).await?;
//! ```

mod mock_converter;

pub use mock_converter::{MockBehavior, MockConverter, RecordedExecution};

/// Test fixtures and helper functions.
pub mod fixtures {
    use bytes::Bytes;
    use futures::Stream;
    use std::io::Cursor;

    use crate::config::Config;

    /// A default config whose staging areas live under `root`.
    pub fn config_in(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.storage.upload_dir = root.join("uploads");
        config.storage.output_dir = root.join("outputs");
        config
    }

    /// Wraps a byte slice as a single-chunk payload stream.
    pub fn payload(data: &[u8]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        futures::stream::iter(vec![Ok(Bytes::copy_from_slice(data))])
    }

    /// Encodes a solid-colour RGB image as PNG.
    pub fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let image = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, image::ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }
}

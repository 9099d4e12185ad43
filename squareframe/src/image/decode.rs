//! Image decoding, with a fallback chain for HEIC

use imageproc::image::load_from_memory;

use super::strategy::{
    DecodeStrategy, ExternalConverter, NativeDecoder, StrategyError, StrategyKind,
};
use super::DecodedImage;
use crate::config::FrameConfig;
use crate::source::SourceImage;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("File too large: {size} bytes exceeds the {limit} byte limit for HEIC files")]
    TooLarge { size: u64, limit: u64 },

    #[error("This HEIC format variant is not supported: {0}")]
    UnsupportedVariant(String),

    #[error("HEIC conversion resources are unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Failed to decode image: {0}")]
    UnknownDecodeFailure(String),
}

impl DecodeError {
    /// Longer guidance shown alongside the error, if any.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            DecodeError::UnsupportedVariant(_) => Some(UNSUPPORTED_VARIANT_HELP),
            DecodeError::ResourceUnavailable(_) => Some(
                "Install a HEIC converter (libheif's heif-convert or ImageMagick) \
                 and make sure it is in your PATH, then try again.",
            ),
            DecodeError::UnknownDecodeFailure(_) => Some(UNKNOWN_FAILURE_HELP),
            DecodeError::TooLarge { .. } => None,
        }
    }
}

const UNSUPPORTED_VARIANT_HELP: &str = "\
This HEIC file format variant is not supported by the available converters.

This often happens with:
  - Photos from newer iPhone models (iPhone 13+)
  - Photos with special encoding or Live Photos
  - HEIC files with advanced compression

Solutions:
  1. Convert to JPEG on your iPhone:
     Open the photo in Photos, tap Share > Save to Files and change the format to JPEG
  2. Change the iPhone camera settings:
     Settings > Camera > Formats, then select \"Most Compatible\" (saves as JPEG)
  3. Use a conversion tool such as CloudConvert or Convertio
  4. Use desktop software: Preview (Mac), Photos or an image editor

Then try again with the converted image.";

const UNKNOWN_FAILURE_HELP: &str = "\
This could be due to:
  - Unsupported HEIC variant
  - Corrupted file
  - Very large file size

Try:
  - Converting to JPEG manually
  - Using a different file
  - Reducing file size";

/// A decoded source, plus the source as it looks after any conversion.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub source: SourceImage,
    pub image: DecodedImage,
    /// Name of the strategy that converted a HEIC input
    pub converted_by: Option<String>,
}

/// Decodes sources, running HEIC inputs through an ordered chain of
/// conversion strategies until one succeeds.
pub struct Decoder {
    strategies: Vec<Box<dyn DecodeStrategy>>,
    max_heic_bytes: u64,
}

impl Decoder {
    /// A decoder with an empty HEIC chain.
    pub fn new(max_heic_bytes: u64) -> Self {
        Self {
            strategies: Vec::new(),
            max_heic_bytes,
        }
    }

    /// Append a strategy to the end of the chain.
    pub fn with_strategy(mut self, strategy: impl DecodeStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// The standard chain: primary converter, fallback converter, native load.
    pub fn from_config(config: &FrameConfig) -> Self {
        Self::new(config.max_heic_bytes)
            .with_strategy(ExternalConverter::new(
                config.primary_converter.program.clone(),
                config.primary_converter.clone(),
            ))
            .with_strategy(ExternalConverter::new(
                config.fallback_converter.program.clone(),
                config.fallback_converter.clone(),
            ))
            .with_strategy(NativeDecoder::new(config.native_timeout))
    }

    pub fn strategy_names(&self) -> impl Iterator<Item = &str> {
        self.strategies.iter().map(|s| s.name())
    }

    pub fn decode(&self, source: SourceImage) -> Result<Decoded, DecodeError> {
        if !source.is_heic() {
            let image = load_from_memory(source.bytes())
                .map_err(|e| DecodeError::UnknownDecodeFailure(e.to_string()))?;
            return Ok(Decoded {
                source,
                image: image.into(),
                converted_by: None,
            });
        }

        log::info!(
            "Converting HEIC file {} ({} bytes), trying {}",
            source.file_name(),
            source.size(),
            self.strategy_names().collect::<Vec<_>>().join(", ")
        );

        if source.size() > self.max_heic_bytes {
            return Err(DecodeError::TooLarge {
                size: source.size(),
                limit: self.max_heic_bytes,
            });
        }

        let (jpeg, strategy) = self.convert(source.bytes())?;
        let converted = source.converted(jpeg);

        let image = load_from_memory(converted.bytes()).map_err(|e| {
            let message = format!("{strategy} produced an unreadable image: {e}");
            DecodeError::UnknownDecodeFailure(message)
        })?;

        log::info!(
            "Converted {} using {strategy}: {} ({} bytes)",
            source.file_name(),
            converted.file_name(),
            converted.size()
        );

        Ok(Decoded {
            source: converted,
            image: image.into(),
            converted_by: Some(strategy),
        })
    }

    fn convert(&self, bytes: &[u8]) -> Result<(Vec<u8>, String), DecodeError> {
        let mut failures = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            log::debug!("Attempting conversion with {}...", strategy.name());

            match strategy.convert(bytes) {
                Ok(jpeg) => return Ok((jpeg, strategy.name().to_string())),
                Err(e) => {
                    log::warn!("{} ({}) failed: {e}", strategy.name(), strategy.kind());
                    failures.push((strategy.kind(), e));
                }
            }
        }

        Err(classify(failures))
    }
}

/// Pick the error to report once every strategy has failed.
///
/// The last library failure decides, since the native fallback rarely says
/// anything useful about HEIC.
fn classify(failures: Vec<(StrategyKind, StrategyError)>) -> DecodeError {
    let last_library = failures
        .iter()
        .rposition(|(kind, _)| *kind == StrategyKind::Library);

    let Some(index) = last_library.or_else(|| failures.len().checked_sub(1)) else {
        return DecodeError::ResourceUnavailable("no HEIC conversion strategy configured".into());
    };

    let error = &failures[index].1;
    match error {
        StrategyError::Unsupported(_) => DecodeError::UnsupportedVariant(error.to_string()),
        StrategyError::Missing(_) | StrategyError::ResourceLoad(_) => {
            DecodeError::ResourceUnavailable(error.to_string())
        }
        StrategyError::TimedOut(_) | StrategyError::Failed(_) => {
            DecodeError::UnknownDecodeFailure(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConverterCommand;
    use crate::image::compress_to_jpeg;
    use crate::source::MediaType;
    use imageproc::image::{DynamicImage, Rgb, RgbImage};

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([5, 6, 7])));
        let mut buf = Vec::new();
        compress_to_jpeg(&img, &mut buf, 90).unwrap();
        buf
    }

    fn heic(bytes: Vec<u8>) -> SourceImage {
        SourceImage::new(bytes, MediaType::new("image/heic"), "IMG_0007.HEIC")
    }

    struct Fake {
        name: &'static str,
        kind: StrategyKind,
        outcome: fn() -> Result<Vec<u8>, StrategyError>,
        calls: Arc<AtomicUsize>,
    }

    impl Fake {
        fn library(name: &'static str, outcome: fn() -> Result<Vec<u8>, StrategyError>) -> Self {
            Self {
                name,
                kind: StrategyKind::Library,
                outcome,
                calls: Arc::default(),
            }
        }

        fn native(outcome: fn() -> Result<Vec<u8>, StrategyError>) -> Self {
            Self {
                kind: StrategyKind::Native,
                ..Self::library("native", outcome)
            }
        }

        fn counted(mut self, calls: &Arc<AtomicUsize>) -> Self {
            self.calls = calls.clone();
            self
        }
    }

    impl DecodeStrategy for Fake {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> StrategyKind {
            self.kind
        }

        fn convert(&self, _: &[u8]) -> Result<Vec<u8>, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    #[test]
    fn unsupported_variant_wins_after_all_strategies_fail() {
        let decoder = Decoder::new(u64::MAX)
            .with_strategy(Fake::library("a", || Err(StrategyError::Failed("boom".into()))))
            .with_strategy(Fake::library("b", || {
                Err(StrategyError::Unsupported("ERR_USER: format not supported".into()))
            }))
            .with_strategy(Fake::native(|| Err(StrategyError::TimedOut(Duration::from_secs(10)))));

        let err = decoder.decode(heic(vec![0; 16])).unwrap_err();

        assert!(matches!(err, DecodeError::UnsupportedVariant(_)), "{err:?}");
        assert!(err.remediation().unwrap().contains("Most Compatible"));
    }

    #[test]
    fn oversized_heic_is_rejected_before_any_strategy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let decoder = Decoder::new(15 * 1024 * 1024)
            .with_strategy(Fake::library("a", || Ok(jpeg_bytes(1, 1))).counted(&calls))
            .with_strategy(Fake::native(|| Ok(jpeg_bytes(1, 1))).counted(&calls));

        let err = decoder.decode(heic(vec![0; 15 * 1024 * 1024 + 1])).unwrap_err();

        assert!(matches!(err, DecodeError::TooLarge { limit, .. } if limit == 15 * 1024 * 1024));
        assert!(err.to_string().contains("too large"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn exactly_at_the_limit_is_attempted() {
        let decoder = Decoder::new(64).with_strategy(Fake::library("a", || Ok(jpeg_bytes(2, 2))));
        assert!(decoder.decode(heic(vec![0; 64])).is_ok());
    }

    #[test]
    fn falls_through_until_a_strategy_succeeds() {
        let native_calls = Arc::new(AtomicUsize::new(0));
        let decoder = Decoder::new(u64::MAX)
            .with_strategy(Fake::library("a", || Err(StrategyError::Missing("a".into()))))
            .with_strategy(Fake::library("b", || Ok(jpeg_bytes(8, 3))))
            .with_strategy(Fake::native(|| Ok(jpeg_bytes(1, 1))).counted(&native_calls));

        let decoded = decoder.decode(heic(vec![1, 2, 3])).unwrap();

        assert_eq!(decoded.converted_by.as_deref(), Some("b"));
        assert_eq!(decoded.image.dimensions(), (8, 3));
        assert_eq!(decoded.source.file_name(), "IMG_0007.jpg");
        assert!(decoded.source.media_type().is_jpeg());
        assert_eq!(native_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_libraries_classify_as_resource_unavailable() {
        let decoder = Decoder::new(u64::MAX)
            .with_strategy(Fake::library("a", || Err(StrategyError::Missing("a".into()))))
            .with_strategy(Fake::library("b", || Err(StrategyError::Missing("b".into()))))
            .with_strategy(Fake::native(|| Err(StrategyError::Failed("no codec".into()))));

        let err = decoder.decode(heic(vec![0; 4])).unwrap_err();
        assert!(matches!(err, DecodeError::ResourceUnavailable(ref m) if m.contains("b")));
    }

    #[test]
    fn other_failures_carry_the_underlying_message() {
        let decoder = Decoder::new(u64::MAX).with_strategy(Fake::library("a", || {
            Err(StrategyError::Failed("bad box size".into()))
        }));

        match decoder.decode(heic(vec![0; 4])).unwrap_err() {
            DecodeError::UnknownDecodeFailure(message) => assert_eq!(message, "bad box size"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_chain_is_resource_unavailable() {
        let err = Decoder::new(u64::MAX).decode(heic(vec![0; 4])).unwrap_err();
        assert!(matches!(err, DecodeError::ResourceUnavailable(_)));
    }

    #[test]
    fn non_heic_skips_the_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let decoder = Decoder::new(0)
            .with_strategy(Fake::library("a", || Ok(jpeg_bytes(1, 1))).counted(&calls));
        let source = SourceImage::new(jpeg_bytes(12, 7), MediaType::new("image/jpeg"), "a.jpg");

        let decoded = decoder.decode(source).unwrap();

        assert_eq!(decoded.image.dimensions(), (12, 7));
        assert!(decoded.converted_by.is_none());
        assert_eq!(decoded.source.file_name(), "a.jpg");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn corrupt_standard_image_is_unknown_failure() {
        let bytes = vec![0xFF, 0xD8, 0x00];
        let source = SourceImage::new(bytes, MediaType::new("image/jpeg"), "x.jpg");
        let err = Decoder::new(0).decode(source).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownDecodeFailure(_)));
    }

    #[test]
    fn standard_chain_falls_back_to_native_when_converters_are_absent() {
        let config = FrameConfig {
            primary_converter: ConverterCommand::new("squareframe-missing-primary", &[]),
            fallback_converter: ConverterCommand::new("squareframe-missing-fallback", &[]),
            ..FrameConfig::default()
        };
        let decoder = Decoder::from_config(&config);
        assert_eq!(
            decoder.strategy_names().collect::<Vec<_>>(),
            ["squareframe-missing-primary", "squareframe-missing-fallback", "native"]
        );

        // a "HEIC" whose payload the image crate can read anyway
        let decoded = decoder.decode(heic(jpeg_bytes(10, 4))).unwrap();

        assert_eq!(decoded.converted_by.as_deref(), Some("native"));
        assert_eq!(decoded.image.dimensions(), (10, 4));
    }
}

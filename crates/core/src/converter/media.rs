//! FFmpeg-backed media transcoding.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::time::Duration;
use tracing::instrument;

use crate::config::EnginesConfig;
use crate::staging::{OutputSlot, StagedFile};

use super::error::ConvertError;
use super::process::EngineCommand;
use super::traits::Converter;
use super::types::{first_input, first_name, Artifact, ConverterDescriptor, Operation, Params};

/// Container/codec targets understood by the media converters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Mp4,
    Avi,
    Mov,
    Mkv,
    Mp3,
    Wav,
    Flac,
    Ogg,
    Aac,
    M4a,
}

impl MediaFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "mp4" => Some(Self::Mp4),
            "avi" => Some(Self::Avi),
            "mov" => Some(Self::Mov),
            "mkv" => Some(Self::Mkv),
            "mp3" => Some(Self::Mp3),
            "wav" => Some(Self::Wav),
            "flac" => Some(Self::Flac),
            "ogg" => Some(Self::Ogg),
            "aac" => Some(Self::Aac),
            "m4a" => Some(Self::M4a),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Avi => "avi",
            Self::Mov => "mov",
            Self::Mkv => "mkv",
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Ogg => "ogg",
            Self::Aac => "aac",
            Self::M4a => "m4a",
        }
    }

    /// FFmpeg muxer name. Passed explicitly because the scratch path has no
    /// meaningful extension.
    pub fn muxer(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Avi => "avi",
            Self::Mov => "mov",
            Self::Mkv => "matroska",
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Ogg => "ogg",
            Self::Aac => "adts",
            Self::M4a => "ipod",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Avi => "video/x-msvideo",
            Self::Mov => "video/quicktime",
            Self::Mkv => "video/x-matroska",
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Flac => "audio/flac",
            Self::Ogg => "audio/ogg",
            Self::Aac => "audio/aac",
            Self::M4a => "audio/mp4",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            Self::Mp3 | Self::Wav | Self::Flac | Self::Ogg | Self::Aac | Self::M4a
        )
    }
}

/// Media conversion and H.264 compression through ffmpeg.
pub struct MediaConverter {
    descriptor: ConverterDescriptor,
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl MediaConverter {
    pub fn new(descriptor: ConverterDescriptor, engines: &EnginesConfig) -> Self {
        Self {
            descriptor,
            ffmpeg: engines.ffmpeg.clone(),
            timeout: Duration::from_secs(engines.process_timeout_secs),
        }
    }

    /// Builds ffmpeg arguments for a container/codec change.
    fn build_convert_args(input: &Path, output: &Path, format: MediaFormat) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
        ];

        // Audio muxers would otherwise try to carry the video stream along
        if format.is_audio() {
            args.push("-vn".to_string());
        }

        args.extend(["-f".to_string(), format.muxer().to_string()]);
        args.push(output.to_string_lossy().to_string());
        args
    }

    /// Builds ffmpeg arguments for H.264 re-encoding at a CRF.
    fn build_compress_args(input: &Path, output: &Path, format: MediaFormat, crf: i64) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-crf".to_string(),
            crf.to_string(),
            "-preset".to_string(),
            "fast".to_string(),
            "-f".to_string(),
            format.muxer().to_string(),
            output.to_string_lossy().to_string(),
        ]
    }

    fn input_format(input: &StagedFile) -> Result<MediaFormat, ConvertError> {
        input
            .extension()
            .as_deref()
            .and_then(MediaFormat::parse)
            .ok_or_else(|| {
                ConvertError::validation(format!(
                    "Cannot determine container of '{}'",
                    input.original_name
                ))
            })
    }

    fn target_format(params: &Params) -> Result<MediaFormat, ConvertError> {
        let name = params.required_text("target_format")?;
        MediaFormat::parse(name)
            .ok_or_else(|| ConvertError::validation(format!("Invalid target format: {}", name)))
    }
}

#[async_trait]
impl Converter for MediaConverter {
    fn descriptor(&self) -> &ConverterDescriptor {
        &self.descriptor
    }

    fn validate(&self, inputs: &[StagedFile], params: &Params) -> Result<(), ConvertError> {
        match self.descriptor.operation {
            Operation::MediaCompress => Self::input_format(first_input(inputs)?).map(|_| ()),
            _ => Self::target_format(params).map(|_| ()),
        }
    }

    fn output_name(&self, inputs: &[StagedFile], params: &Params) -> String {
        let (name, stem) = first_name(inputs);
        match self.descriptor.operation {
            Operation::MediaCompress => format!("compressed_{}", name),
            _ => format!("{}.{}", stem, params.choice("target_format", "mp4")),
        }
    }

    #[instrument(skip_all, fields(operation = %self.descriptor.operation))]
    async fn execute(
        &self,
        inputs: &[StagedFile],
        output: &OutputSlot,
        params: &Params,
    ) -> Result<Artifact, ConvertError> {
        let input = first_input(inputs)?;
        let (args, format) = match self.descriptor.operation {
            Operation::MediaCompress => {
                let format = Self::input_format(input)?;
                let crf = params.integer("crf", 28)?;
                (
                    Self::build_compress_args(&input.path, output.scratch_path(), format, crf),
                    format,
                )
            }
            _ => {
                let format = Self::target_format(params)?;
                (
                    Self::build_convert_args(&input.path, output.scratch_path(), format),
                    format,
                )
            }
        };

        EngineCommand::new("ffmpeg", &self.ffmpeg, self.timeout)
            .args(&args)
            .run()
            .await?;

        if !output.scratch_path().exists() {
            return Err(ConvertError::artifact_not_found(
                "ffmpeg finished without writing an output file",
            ));
        }
        Ok(Artifact::new(format.content_type()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_convert_args_audio_drops_video() {
        let args = MediaConverter::build_convert_args(
            Path::new("/in/clip.mp4"),
            Path::new("/out/clip.mp3.partial"),
            MediaFormat::Mp3,
        );
        assert!(args.contains(&"-vn".to_string()));
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "mp3");
        assert_eq!(args.last().unwrap(), "/out/clip.mp3.partial");
    }

    #[test]
    fn test_build_convert_args_video() {
        let args = MediaConverter::build_convert_args(
            Path::new("/in/clip.avi"),
            Path::new("/out/clip.mkv.partial"),
            MediaFormat::Mkv,
        );
        assert!(!args.contains(&"-vn".to_string()));
        assert!(args.contains(&"matroska".to_string()));
    }

    #[test]
    fn test_build_compress_args() {
        let args = MediaConverter::build_compress_args(
            Path::new("/in/movie.mov"),
            Path::new("/out/compressed_movie.mov.partial"),
            MediaFormat::Mov,
            23,
        );
        let crf = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[crf + 1], "23");
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"fast".to_string()));
    }

    #[test]
    fn test_media_format_metadata() {
        assert_eq!(MediaFormat::parse("AAC"), Some(MediaFormat::Aac));
        assert_eq!(MediaFormat::Aac.muxer(), "adts");
        assert_eq!(MediaFormat::Mp4.content_type(), "video/mp4");
        assert!(MediaFormat::Flac.is_audio());
        assert!(!MediaFormat::Mov.is_audio());
        assert_eq!(MediaFormat::parse("webm"), None);
    }
}
